use lazy_static::lazy_static;
use prometheus::{register_counter_vec, register_gauge_vec, CounterVec, GaugeVec};

/// The controller's metrics, registered once at process start and shared
/// behind the `METRICS` static. This domain has exactly one controller
/// (`GroupSync`), so there is exactly one of these, named after the fixed
/// metric surface below rather than parameterized by a controller tag.
pub struct Metrics {
    /// `group_sync_successful_syncs_count` — incremented once per provider
    /// per cycle that completed without error.
    pub successful_syncs_count: CounterVec,

    /// `group_sync_unsuccessful_syncs_count` — incremented once per
    /// provider per cycle that ended in an aggregated error.
    pub unsuccessful_syncs_count: CounterVec,

    /// `group_sync_number_groups` — count of platform groups upserted by a
    /// provider in its most recent cycle.
    pub number_groups: GaugeVec,

    /// `group_pruned_number_groups` — count of platform groups deleted by
    /// a provider's prune pass in its most recent cycle.
    pub pruned_number_groups: GaugeVec,

    /// `group_sync_error` — `1` while a provider's most recent cycle ended
    /// in error, `0` once it next succeeds. A gauge, not a counter: readers
    /// care about current error state, not a running total.
    pub sync_error: GaugeVec,

    /// `group_sync_next_scheduled_sync` — unix timestamp of the next
    /// cron-driven cycle, labelled only by `namespace,name`.
    pub next_scheduled_sync: GaugeVec,
}

impl Metrics {
    fn new() -> Self {
        Metrics {
            successful_syncs_count: register_counter_vec!(
                "group_sync_successful_syncs_count",
                "Number of provider syncs that completed without error.",
                &["namespace", "name", "provider"]
            )
            .unwrap(),
            unsuccessful_syncs_count: register_counter_vec!(
                "group_sync_unsuccessful_syncs_count",
                "Number of provider syncs that ended in an aggregated error.",
                &["namespace", "name", "provider"]
            )
            .unwrap(),
            number_groups: register_gauge_vec!(
                "group_sync_number_groups",
                "Number of platform groups upserted in the most recent cycle.",
                &["namespace", "name", "provider"]
            )
            .unwrap(),
            pruned_number_groups: register_gauge_vec!(
                "group_pruned_number_groups",
                "Number of platform groups deleted by the prune pass in the most recent cycle.",
                &["namespace", "name", "provider"]
            )
            .unwrap(),
            sync_error: register_gauge_vec!(
                "group_sync_error",
                "Whether a provider's most recent cycle ended in error (1) or not (0).",
                &["namespace", "name", "provider"]
            )
            .unwrap(),
            next_scheduled_sync: register_gauge_vec!(
                "group_sync_next_scheduled_sync",
                "Unix timestamp of the next cron-scheduled sync.",
                &["namespace", "name"]
            )
            .unwrap(),
        }
    }
}

lazy_static! {
    pub static ref METRICS: Metrics = Metrics::new();
}
