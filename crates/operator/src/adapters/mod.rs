//! Provider Adapters. One module per IdP, each implementing
//! [`ProviderAdapter`] — a trait object rather than an inheritance
//! hierarchy. `adapters::common` holds the rules
//! shared by every adapter: allow-list filtering and DNS-1035 validation.

pub mod azure;
pub mod common;
pub mod github;
pub mod gitlab;
pub mod ibm_security_verify;
pub mod keycloak;
pub mod ldap;
pub mod okta;

use crate::error::{AdapterError, ConfigError};
use crate::resolver::SecretResolver;
use async_trait::async_trait;
use group_sync_types::RemoteGroup;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// The "provider capability" contract every adapter exposes.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn provider_name(&self) -> &str;

    fn prune(&self) -> bool;

    /// Applies defaults into the adapter's copy of its spec. Returns
    /// whether it mutated anything, per the `Unborn -> Defaulted`
    /// transition: a `true` here means the caller must persist the
    /// defaulted spec and abort the cycle.
    fn init(&mut self) -> bool;

    /// Verifies credentials/CAs/URLs/provider-specific constraints
    /// without any network I/O.
    fn validate(&self) -> Result<(), ConfigError>;

    /// Constructs the authenticated client; acquires tokens where
    /// applicable. Tokens/caches built here live only for one cycle.
    async fn bind(&mut self, resolver: Arc<dyn SecretResolver>) -> Result<(), AdapterError>;

    /// Performs one full enumeration to completion — every page, every
    /// sub-group — returning the adapter's complete `RemoteGroup` view.
    async fn sync(&self, cancel: CancellationToken) -> Result<Vec<RemoteGroup>, AdapterError>;
}
