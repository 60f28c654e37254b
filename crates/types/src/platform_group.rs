use std::collections::BTreeMap;

/// The external platform's identity group record — keyed by `name`,
/// cluster-wide unique. Mutated only through the Reconciliation Engine's
/// upsert/prune steps. The concrete store this is read from/written
/// to is an external collaborator; this struct is the shape the core
/// exchanges with it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlatformGroup {
    pub name: String,

    /// Platform-assigned stable identifier. `None` until the first
    /// successful upsert; the engine records it back for use by prune.
    pub uid: Option<String>,

    pub users: Vec<String>,
    pub annotations: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
}

impl PlatformGroup {
    pub fn new(name: impl Into<String>) -> Self {
        PlatformGroup {
            name: name.into(),
            ..Default::default()
        }
    }
}
