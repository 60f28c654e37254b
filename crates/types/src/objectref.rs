use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Reference to a key (or the whole map) inside a [`Secret`](k8s_openapi::api::core::v1::Secret)
/// or [`ConfigMap`](k8s_openapi::api::core::v1::ConfigMap). Resolved by the
/// Secret/Config Resolver component into raw bytes or a full key→value map
/// when [`key`](ObjectRef::key) is absent.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
pub struct ObjectRef {
    /// Kind of the referent. Defaults to `Secret`.
    #[serde(default)]
    pub kind: ObjectRefKind,

    /// Name of the referent.
    pub name: String,

    /// Namespace of the referent.
    pub namespace: String,

    /// Key within the referent's data map to resolve. If absent, the
    /// resolver returns the entire data map instead of a single value.
    pub key: Option<String>,
}

/// The two kinds of object a [`ObjectRef`] may point at.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq, JsonSchema)]
pub enum ObjectRefKind {
    #[default]
    Secret,
    ConfigMap,
}
