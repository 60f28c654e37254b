use std::time::Duration;

pub mod finalizer;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod patch;

pub(crate) mod messages;

/// Default interval for requeuing a `GroupSync` that is not on a cron
/// schedule (event-driven only) or whose cycle just failed.
pub(crate) const DEFAULT_REQUEUE_INTERVAL: Duration = Duration::from_secs(60);

/// Upper bound of the random jitter added to an event-driven requeue, to
/// avoid many `GroupSync` objects reconciling in lockstep.
pub(crate) const REQUEUE_JITTER: Duration = Duration::from_secs(5);

/// Name of the kubernetes resource manager used for server-side apply.
pub(crate) const MANAGER_NAME: &str = "group-sync-operator";

/// Name of the finalizer the controller places on every `GroupSync`.
pub(crate) const FINALIZER_NAME: &str = "groupsync.redhatcop.redhat.io/finalizer";
