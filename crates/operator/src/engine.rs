//! Reconciliation Engine. For one provider's `RemoteGroup` output,
//! upserts matching platform groups under the ownership rules below, then
//! prunes groups the provider no longer reports (when `prune=true`).

use crate::adapters::common::is_dns1035_label;
use crate::clock::Clock;
use crate::error::Error;
use crate::store::PlatformGroupStore;
use chrono::SecondsFormat;
use group_sync_types::{
    PlatformGroup, RemoteGroup, ANNOTATION_SYNC_TIME, LABEL_SYNC_PROVIDER,
};
use std::collections::HashSet;

/// Outcome of reconciling one provider's output against the platform group
/// store. `store_errors` holds only `PlatformStoreFailure`s — ownership
/// conflicts and invalid names are recovered locally (logged) and never
/// appear here.
#[derive(Debug, Default)]
pub struct ProviderReconcileReport {
    pub groups_synced: usize,
    pub groups_pruned: usize,
    pub store_errors: Vec<Error>,
}

impl ProviderReconcileReport {
    pub fn is_err(&self) -> bool {
        !self.store_errors.is_empty()
    }
}

/// Builds the reserved `sync-provider` label value for a `(groupSyncName,
/// providerName)` pair.
pub fn provider_label(group_sync_name: &str, provider_name: &str) -> String {
    format!("{group_sync_name}_{provider_name}")
}

/// Runs the nine-step upsert algorithm for every group in `groups`, then
/// the prune pass when `prune` is set. Providers are expected to be
/// processed strictly sequentially by the caller;
/// this function itself only guarantees ordering within the one provider
/// it's given.
pub async fn reconcile_provider(
    group_sync_name: &str,
    provider_name: &str,
    groups: Vec<RemoteGroup>,
    exclude_invalid_group_names: bool,
    prune: bool,
    store: &dyn PlatformGroupStore,
    clock: &dyn Clock,
) -> ProviderReconcileReport {
    let label = provider_label(group_sync_name, provider_name);
    let mut report = ProviderReconcileReport::default();
    let mut synced_uids: HashSet<String> = HashSet::new();

    for remote in groups {
        // Step 1: DNS-1035 validity gate.
        if exclude_invalid_group_names && !is_dns1035_label(&remote.name) {
            tracing::info!(provider = provider_name, group = %remote.name, "skipping group with invalid name");
            continue;
        }

        // Step 2: fetch existing.
        let existing = match store.get(&remote.name).await {
            Ok(existing) => existing,
            Err(err) => {
                report.store_errors.push(err);
                continue;
            }
        };

        // Step 3: ownership check.
        let mut platform = match existing {
            None => PlatformGroup::new(remote.name.clone()),
            Some(existing) => {
                let owner = existing.labels.get(LABEL_SYNC_PROVIDER).map(String::as_str);
                if owner != Some(label.as_str()) {
                    tracing::warn!(
                        provider = provider_name,
                        group = %remote.name,
                        expected = %label,
                        found = owner.unwrap_or("<none>"),
                        "did not match expected provider label",
                    );
                    continue;
                }
                existing
            }
        };

        // Steps 4-5: merge annotations/labels, remote wins on conflicts.
        for (k, v) in &remote.annotations {
            platform.annotations.insert(k.clone(), v.clone());
        }
        for (k, v) in &remote.labels {
            platform.labels.insert(k.clone(), v.clone());
        }

        // Steps 6-8: ownership label, sync-time, authoritative user replace.
        platform.labels.insert(LABEL_SYNC_PROVIDER.to_owned(), label.clone());
        platform
            .annotations
            .insert(ANNOTATION_SYNC_TIME.to_owned(), clock.now().to_rfc3339_opts(SecondsFormat::Secs, true));
        platform.users = remote.users.clone();

        // Step 9: upsert, recording the platform UID for prune.
        match store.upsert(&platform).await {
            Ok(stored) => {
                if let Some(uid) = stored.uid {
                    synced_uids.insert(uid);
                }
                report.groups_synced += 1;
            }
            Err(err) => report.store_errors.push(err),
        }
    }

    if prune {
        match store.list_by_label(&format!("{LABEL_SYNC_PROVIDER}={label}")).await {
            Ok(owned) => {
                for group in owned {
                    let keep = group.uid.as_ref().map(|uid| synced_uids.contains(uid)).unwrap_or(false);
                    if keep {
                        continue;
                    }
                    match store.delete(&group.name).await {
                        Ok(()) => report.groups_pruned += 1,
                        Err(err) => report.store_errors.push(err),
                    }
                }
            }
            Err(err) => report.store_errors.push(err),
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::store::fake::InMemoryGroupStore;
    use chrono::{TimeZone, Utc};

    fn clock() -> FixedClock {
        FixedClock(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap())
    }

    fn group(name: &str, uid: &str, users: &[&str]) -> RemoteGroup {
        let mut g = RemoteGroup::new(name, uid, "idp.example.com");
        g.users = users.iter().map(|s| s.to_string()).collect();
        g
    }

    #[tokio::test]
    async fn upsert_stamps_ownership_label_and_sync_time() {
        let store = InMemoryGroupStore::new();
        let clock = clock();
        let report = reconcile_provider(
            "run", "kc", vec![group("eng", "u1", &["alice"])], false, false, &store, &clock,
        )
        .await;
        assert_eq!(report.groups_synced, 1);
        assert!(!report.is_err());
        let snapshot = store.snapshot();
        let eng = &snapshot["eng"];
        assert_eq!(eng.labels["sync-provider"], "run_kc");
        assert!(eng.annotations.contains_key("sync-time"));
        assert_eq!(eng.users, vec!["alice"]);
    }

    #[tokio::test]
    async fn cross_provider_collision_is_skipped_not_overwritten() {
        // S3: providers `a` (kc) and `b` (github) both emit `dev`; `a` runs
        // first, `b`'s write is skipped, and `dev.users` stays `a`'s.
        let store = InMemoryGroupStore::new();
        let clock = clock();
        reconcile_provider("run", "a", vec![group("dev", "u1", &["alice"])], false, false, &store, &clock).await;
        let report = reconcile_provider("run", "b", vec![group("dev", "u2", &["bob"])], false, false, &store, &clock).await;
        assert_eq!(report.groups_synced, 0);
        let snapshot = store.snapshot();
        assert_eq!(snapshot["dev"].users, vec!["alice"]);
        assert_eq!(snapshot["dev"].labels["sync-provider"], "run_a");
    }

    #[tokio::test]
    async fn invalid_name_is_skipped_when_flag_set() {
        let store = InMemoryGroupStore::new();
        let clock = clock();
        let report = reconcile_provider(
            "run", "kc", vec![group("1bad", "u1", &["alice"])], true, false, &store, &clock,
        )
        .await;
        assert_eq!(report.groups_synced, 0);
        assert!(store.snapshot().is_empty());
    }

    #[tokio::test]
    async fn prune_deletes_groups_absent_from_latest_sync() {
        // S4: cycle 1 syncs {g1,g2,g3}; g3 drops out upstream; cycle 2
        // syncs {g1,g2}; after cycle 2 only {g1,g2} remain owned.
        let store = InMemoryGroupStore::new();
        let clock = clock();
        reconcile_provider(
            "run",
            "okta",
            vec![group("g1", "u1", &[]), group("g2", "u2", &[]), group("g3", "u3", &[])],
            false,
            true,
            &store,
            &clock,
        )
        .await;
        assert_eq!(store.snapshot().len(), 3);

        let report = reconcile_provider(
            "run",
            "okta",
            vec![group("g1", "u1", &[]), group("g2", "u2", &[])],
            false,
            true,
            &store,
            &clock,
        )
        .await;
        assert_eq!(report.groups_pruned, 1);
        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.contains_key("g1"));
        assert!(snapshot.contains_key("g2"));
        assert!(!snapshot.contains_key("g3"));
    }

    #[tokio::test]
    async fn no_prune_leaves_stale_groups_in_place() {
        let store = InMemoryGroupStore::new();
        let clock = clock();
        reconcile_provider("run", "okta", vec![group("g1", "u1", &[])], false, false, &store, &clock).await;
        reconcile_provider("run", "okta", vec![], false, false, &store, &clock).await;
        assert!(store.snapshot().contains_key("g1"));
    }

    #[tokio::test]
    async fn ordering_matches_adapter_emission_order() {
        let store = InMemoryGroupStore::new();
        let clock = clock();
        let report = reconcile_provider(
            "run",
            "kc",
            vec![group("first", "u1", &["a"]), group("second", "u2", &["b"])],
            false,
            false,
            &store,
            &clock,
        )
        .await;
        assert_eq!(report.groups_synced, 2);
    }
}
