use std::collections::BTreeMap;

/// Annotation key every adapter stamps with the URL host it fetched from.
pub const ANNOTATION_SOURCE_HOST: &str = "sync.source.host";

/// Annotation key every adapter stamps with the provider-native stable
/// identifier for the group.
pub const ANNOTATION_SOURCE_UID: &str = "sync.source.uid";

/// Reserved label asserting `(run, provider)` ownership of a platform group.
pub const LABEL_SYNC_PROVIDER: &str = "sync-provider";

/// Reserved annotation recording the RFC-3339 UTC time of the last
/// successful write to a platform group.
pub const ANNOTATION_SYNC_TIME: &str = "sync-time";

/// In-memory result of one adapter's [`Sync`](crate) call: a group and its
/// members as the provider named them, destined to become (or update) a
/// [`crate::platform_group::PlatformGroup`] of the same name. Lives only for
/// the duration of one reconciliation cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteGroup {
    /// Destined to become the platform group name.
    pub name: String,

    /// Opaque, provider-stable identifier for this group.
    pub uid: String,

    /// Host of the source URL; used as a label for cross-provider
    /// collision detection and diagnostics.
    pub host: String,

    pub annotations: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,

    /// Usernames in adapter emission order.
    pub users: Vec<String>,
}

impl RemoteGroup {
    pub fn new(name: impl Into<String>, uid: impl Into<String>, host: impl Into<String>) -> Self {
        let host = host.into();
        let uid = uid.into();
        let mut annotations = BTreeMap::new();
        annotations.insert(ANNOTATION_SOURCE_HOST.to_owned(), host.clone());
        annotations.insert(ANNOTATION_SOURCE_UID.to_owned(), uid.clone());
        RemoteGroup {
            name: name.into(),
            uid,
            host,
            annotations,
            labels: BTreeMap::new(),
            users: Vec::new(),
        }
    }
}
