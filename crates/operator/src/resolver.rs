//! Secret/Config Resolver. Resolves an [`ObjectRef`] to raw text —
//! either the value of a single `key`, or the full key→value mapping when
//! `key` is absent. Purely a synchronous-from-the-caller's-perspective read
//! against the external store; no caching beyond what Kubernetes itself
//! does via the `kube::Api` client.

use crate::error::ResolveError;
use async_trait::async_trait;
use group_sync_types::{ObjectRef, ObjectRefKind};
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::{Api, Client};
use std::collections::BTreeMap;

/// Outcome of a resolve: either the text for `key`, or the resource's full
/// mapping when `ObjectRef::key` was absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedValue {
    Single(String),
    Mapping(BTreeMap<String, String>),
}

impl ResolvedValue {
    /// Returns the value for a single expected key regardless of which
    /// variant this is, which is the common case for adapters that
    /// resolved a reference with an explicit `key`.
    pub fn into_single(self) -> Option<String> {
        match self {
            ResolvedValue::Single(v) => Some(v),
            ResolvedValue::Mapping(mut m) => m.remove("value"),
        }
    }
}

#[async_trait]
pub trait SecretResolver: Send + Sync {
    async fn resolve(&self, reference: &ObjectRef) -> Result<ResolvedValue, ResolveError>;
}

pub struct KubeSecretResolver {
    client: Client,
}

impl KubeSecretResolver {
    pub fn new(client: Client) -> Self {
        KubeSecretResolver { client }
    }
}

fn decode_secret_data(data: &BTreeMap<String, k8s_openapi::ByteString>) -> BTreeMap<String, String> {
    data.iter()
        .map(|(k, v)| (k.clone(), String::from_utf8_lossy(&v.0).into_owned()))
        .collect()
}

#[async_trait]
impl SecretResolver for KubeSecretResolver {
    async fn resolve(&self, reference: &ObjectRef) -> Result<ResolvedValue, ResolveError> {
        let kind_label = match reference.kind {
            ObjectRefKind::Secret => "Secret",
            ObjectRefKind::ConfigMap => "ConfigMap",
        };
        let values = match reference.kind {
            ObjectRefKind::Secret => {
                let api: Api<Secret> = Api::namespaced(self.client.clone(), &reference.namespace);
                let secret = api
                    .get(&reference.name)
                    .await
                    .map_err(|source| resolve_not_found_or_kube("Secret", reference, source))?;
                decode_secret_data(&secret.data.unwrap_or_default())
            }
            ObjectRefKind::ConfigMap => {
                let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), &reference.namespace);
                let cm = api
                    .get(&reference.name)
                    .await
                    .map_err(|source| resolve_not_found_or_kube("ConfigMap", reference, source))?;
                cm.data.unwrap_or_default()
            }
        };

        match &reference.key {
            Some(key) => values
                .get(key)
                .cloned()
                .map(ResolvedValue::Single)
                .ok_or_else(|| ResolveError::KeyMissing {
                    kind: kind_label,
                    namespace: reference.namespace.clone(),
                    name: reference.name.clone(),
                    key: key.clone(),
                }),
            None => Ok(ResolvedValue::Mapping(values)),
        }
    }
}

fn resolve_not_found_or_kube(kind: &'static str, reference: &ObjectRef, source: kube::Error) -> ResolveError {
    if let kube::Error::Api(ref resp) = source {
        if resp.code == 404 {
            return ResolveError::NotFound {
                kind,
                namespace: reference.namespace.clone(),
                name: reference.name.clone(),
            };
        }
    }
    ResolveError::Kube(source)
}
