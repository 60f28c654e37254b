use kube::{
    api::{Patch, Resource},
    core::ClusterResourceScope,
    Api, Client, Error,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};
use std::{clone::Clone, fmt::Debug};

use super::FINALIZER_NAME;

/// Adds the finalizer record into a cluster-scoped `T` kind of resource. If
/// the finalizer already exists, this action has no effect.
///
/// # Arguments:
/// - `client` - Kubernetes client to modify the `GroupSync` resource with.
/// - `name` - Name of the `GroupSync` resource to modify. Existence is not verified.
///
/// Note: Does not check for resource's existence for simplicity.
pub async fn add<T: Clone + Resource + Serialize + DeserializeOwned + Debug>(
    client: Client,
    name: &str,
) -> Result<T, Error>
where
    <T as Resource>::DynamicType: Default,
    T: Resource<Scope = ClusterResourceScope>,
{
    let api: Api<T> = Api::all(client);
    let finalizer: Value = json!({
        "metadata": {
            "finalizers": [FINALIZER_NAME]
        }
    });
    let patch: Patch<&Value> = Patch::Merge(&finalizer);
    Ok(api.patch(name, &Default::default(), &patch).await?)
}

/// Removes all finalizers from a cluster-scoped `T` resource. If there are
/// no finalizers already, this action has no effect.
///
/// # Arguments:
/// - `client` - Kubernetes client to modify the `GroupSync` resource with.
/// - `name` - Name of the `GroupSync` resource to modify. Existence is not verified.
///
/// Note: Does not check for resource's existence for simplicity.
pub async fn delete<T: Clone + Resource + Serialize + DeserializeOwned + Debug>(
    client: Client,
    name: &str,
) -> Result<T, Error>
where
    <T as Resource>::DynamicType: Default,
    T: Resource<Scope = ClusterResourceScope>,
{
    let api: Api<T> = Api::all(client);
    let finalizer: Value = json!({
        "metadata": {
            "finalizers": null
        }
    });
    let patch: Patch<&Value> = Patch::Merge(&finalizer);
    Ok(api.patch(name, &Default::default(), &patch).await?)
}
