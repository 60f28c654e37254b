//! Provider Lifecycle State Machine: `Unborn -> Defaulted ->
//! Validated -> Bound -> Synced | Failed`, driven once per adapter per
//! cycle. A `Failed` provider never aborts its peers.

use crate::adapters::ProviderAdapter;
use crate::error::Error;
use crate::resolver::SecretResolver;
use group_sync_types::RemoteGroup;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Outcome of running one provider through its lifecycle this cycle.
pub enum ProviderOutcome {
    /// Reached `Synced` with its full remote-group enumeration.
    Synced(Vec<RemoteGroup>),

    /// Failed at `Validate`, `Bind`, or `Sync`.
    Failed(Error),

    /// `Init()` mutated the spec ("defaults-on-first-observation"). The
    /// caller must persist the defaulted spec and abort the whole cycle —
    /// this loses one cycle deliberately, so visible state matches
    /// effective state.
    DefaultsChanged,
}

/// Drives `adapter` through `Init -> Validate -> Bind -> Sync`, stopping
/// at the first transition that doesn't succeed.
pub async fn run_provider(
    adapter: &mut dyn ProviderAdapter,
    resolver: Arc<dyn SecretResolver>,
    cancel: CancellationToken,
) -> ProviderOutcome {
    if adapter.init() {
        return ProviderOutcome::DefaultsChanged;
    }
    if let Err(err) = adapter.validate() {
        return ProviderOutcome::Failed(Error::Config(err));
    }
    if let Err(err) = adapter.bind(resolver).await {
        return ProviderOutcome::Failed(Error::Adapter(err));
    }
    match adapter.sync(cancel).await {
        Ok(groups) => ProviderOutcome::Synced(groups),
        Err(err) => ProviderOutcome::Failed(Error::Adapter(err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AdapterError, ConfigError};
    use crate::resolver::ResolvedValue;
    use async_trait::async_trait;
    use group_sync_types::ObjectRef;

    struct FakeAdapter {
        init_changed: bool,
        validate_err: bool,
        fail_sync: bool,
    }

    #[async_trait]
    impl ProviderAdapter for FakeAdapter {
        fn provider_name(&self) -> &str {
            "fake"
        }

        fn prune(&self) -> bool {
            false
        }

        fn init(&mut self) -> bool {
            self.init_changed
        }

        fn validate(&self) -> Result<(), ConfigError> {
            if self.validate_err {
                Err(ConfigError::NoProviders)
            } else {
                Ok(())
            }
        }

        async fn bind(&mut self, _resolver: Arc<dyn SecretResolver>) -> Result<(), AdapterError> {
            Ok(())
        }

        async fn sync(&self, _cancel: CancellationToken) -> Result<Vec<RemoteGroup>, AdapterError> {
            if self.fail_sync {
                Err(AdapterError::AuthFailure("nope".to_owned()))
            } else {
                Ok(vec![RemoteGroup::new("g", "u", "h")])
            }
        }
    }

    struct NullResolver;

    #[async_trait]
    impl SecretResolver for NullResolver {
        async fn resolve(&self, _reference: &ObjectRef) -> Result<ResolvedValue, crate::error::ResolveError> {
            unreachable!("fake adapters never resolve credentials")
        }
    }

    #[tokio::test]
    async fn init_changed_aborts_the_cycle() {
        let mut adapter = FakeAdapter {
            init_changed: true,
            validate_err: false,
            fail_sync: false,
        };
        let outcome = run_provider(&mut adapter, Arc::new(NullResolver), CancellationToken::new()).await;
        assert!(matches!(outcome, ProviderOutcome::DefaultsChanged));
    }

    #[tokio::test]
    async fn validate_failure_is_isolated_to_this_provider() {
        let mut adapter = FakeAdapter {
            init_changed: false,
            validate_err: true,
            fail_sync: false,
        };
        let outcome = run_provider(&mut adapter, Arc::new(NullResolver), CancellationToken::new()).await;
        assert!(matches!(outcome, ProviderOutcome::Failed(Error::Config(_))));
    }

    #[tokio::test]
    async fn sync_failure_surfaces_as_adapter_error() {
        let mut adapter = FakeAdapter {
            init_changed: false,
            validate_err: false,
            fail_sync: true,
        };
        let outcome = run_provider(&mut adapter, Arc::new(NullResolver), CancellationToken::new()).await;
        assert!(matches!(outcome, ProviderOutcome::Failed(Error::Adapter(_))));
    }

    #[tokio::test]
    async fn successful_run_returns_remote_groups() {
        let mut adapter = FakeAdapter {
            init_changed: false,
            validate_err: false,
            fail_sync: false,
        };
        let outcome = run_provider(&mut adapter, Arc::new(NullResolver), CancellationToken::new()).await;
        match outcome {
            ProviderOutcome::Synced(groups) => assert_eq!(groups.len(), 1),
            _ => panic!("expected Synced"),
        }
    }
}
