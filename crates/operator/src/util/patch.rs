use super::MANAGER_NAME;
use group_sync_types::{GroupSync, GroupSyncStatus};
use kube::{
    api::{Patch, PatchParams, Resource},
    core::ClusterResourceScope,
    Api, Client, Error,
};
use serde::{de::DeserializeOwned, Serialize};
use std::{clone::Clone, fmt::Debug};

pub trait Object<S> {
    /// Returns a mutable reference to the status object, initializing
    /// it with the default value if it does not exist.
    fn mut_status(&mut self) -> &mut S;
}

impl Object<GroupSyncStatus> for GroupSync {
    fn mut_status(&mut self) -> &mut GroupSyncStatus {
        if self.status.is_some() {
            return self.status.as_mut().unwrap();
        }
        self.status = Some(Default::default());
        self.status.as_mut().unwrap()
    }
}

/// Patch the resource's status object with the provided function. The
/// function is passed a mutable reference to the status object, which is
/// to be mutated in-place. Move closures are supported.
///
/// Diffs a cloned+mutated copy against the original and applies the result
/// as a JSON patch via server-side apply, generalized to a cluster-scoped
/// resource (`GroupSync` has no namespace).
pub async fn patch_status<
    S,
    T: Clone + Resource + Object<S> + Serialize + DeserializeOwned + Debug,
>(
    client: Client,
    instance: &T,
    f: impl FnOnce(&mut S),
) -> Result<T, Error>
where
    <T as Resource>::DynamicType: Default,
    T: Resource<Scope = ClusterResourceScope>,
{
    let patch = Patch::Json::<T>({
        let mut modified = instance.clone();
        f(modified.mut_status());
        json_patch::diff(
            &serde_json::to_value(instance).unwrap(),
            &serde_json::to_value(&modified).unwrap(),
        )
    });
    let name = instance.meta().name.as_deref().unwrap();
    let api: Api<T> = Api::all(client);
    Ok(api
        .patch_status(name, &PatchParams::apply(MANAGER_NAME), &patch)
        .await?)
}
