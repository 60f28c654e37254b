use crate::provider::ProviderSpec;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// `GroupSync` is the cluster-scoped custom resource that declares which
/// identity providers to reconcile platform groups against. Cluster-scoped
/// (not namespaced) because the groups it produces are themselves
/// cluster-wide, matching the upstream `redhat-cop/group-sync-operator`
/// CRD this is modeled on.
#[derive(CustomResource, Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "groupsync.redhatcop.redhat.io",
    version = "v1alpha1",
    kind = "GroupSync",
    plural = "groupsyncs",
    derive = "PartialEq",
    status = "GroupSyncStatus"
)]
#[kube(derive = "Default")]
#[kube(
    printcolumn = "{\"jsonPath\": \".status.lastSyncSuccessTime\", \"name\": \"LAST SYNC\", \"type\": \"date\" }"
)]
pub struct GroupSyncSpec {
    /// Ordered sequence of providers to reconcile, each with a unique
    /// `name`. Order determines reconciliation order within a cycle.
    pub providers: Vec<ProviderSpec>,

    /// Standard 5-field cron expression. Absent means event-driven only
    /// (the controller still reconciles on spec changes, just never on
    /// a timer).
    pub schedule: Option<String>,

    /// When true, remote groups whose name is not a valid DNS-1035 label
    /// are skipped rather than upserted.
    #[serde(rename = "excludeInvalidGroupNames")]
    pub exclude_invalid_group_names: Option<bool>,
}

/// Status subresource for [`GroupSync`].
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct GroupSyncStatus {
    /// Typed conditions keyed by [`ConditionType`].
    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// Timestamp (RFC 3339, UTC) of the last fully successful cycle.
    #[serde(rename = "lastSyncSuccessTime")]
    pub last_sync_success_time: Option<String>,

    /// RFC 3339 timestamp of the next scheduled cron-driven sync, mirrored
    /// into the `group_sync_next_scheduled_sync` gauge.
    #[serde(rename = "nextScheduledSync")]
    pub next_scheduled_sync: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: ConditionType,
    pub status: ConditionStatus,
    pub reason: String,
    pub message: String,
    #[serde(rename = "lastTransitionTime")]
    pub last_transition_time: String,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum ConditionType {
    ReconcileSuccess,
    ReconcileError,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl GroupSyncStatus {
    /// Replaces (or inserts) the condition of the given type, setting
    /// `lastTransitionTime` to `now` only if the status actually changed.
    pub fn set_condition(
        &mut self,
        type_: ConditionType,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
        now: &str,
    ) {
        if let Some(existing) = self.conditions.iter_mut().find(|c| c.type_ == type_) {
            let reason = reason.into();
            let message = message.into();
            if existing.status != status || existing.reason != reason {
                existing.last_transition_time = now.to_owned();
            }
            existing.status = status;
            existing.reason = reason;
            existing.message = message;
        } else {
            self.conditions.push(Condition {
                type_,
                status,
                reason: reason.into(),
                message: message.into(),
                last_transition_time: now.to_owned(),
            });
        }
    }
}
