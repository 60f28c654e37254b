//! Domain error taxonomy. One `thiserror` enum per layer boundary: a flat
//! enum with `#[from]` conversions, split here by layer instead of by
//! controller since this operator has only one.

use std::fmt;

/// Rejected `GroupSyncSpec` — surfaces as a single aggregated condition; no
/// providers run for the cycle that produced it.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no providers configured")]
    NoProviders,

    #[error("provider {0:?} is malformed: {1}")]
    ProviderMalformed(String, group_sync_types::ProviderMalformed),

    #[error("duplicate provider name {0:?}")]
    DuplicateProviderName(String),

    #[error("invalid cron expression {0:?}: {1}")]
    InvalidSchedule(String, cron::error::Error),

    #[error("malformed URL {0:?}: {1}")]
    MalformedUrl(String, url::ParseError),

    #[error("LDAP provider {0:?} does not specify exactly one schema")]
    LdapSchemaMissing(String),
}

/// Failure resolving a `SecretRef`/`ConfigMapRef` to its value(s).
/// Per-provider; prevents that provider's `Bind`.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: &'static str,
        namespace: String,
        name: String,
    },

    #[error("{kind} {namespace}/{name} has no key {key:?}")]
    KeyMissing {
        kind: &'static str,
        namespace: String,
        name: String,
        key: String,
    },

    #[error("kubernetes reported error: {0}")]
    Kube(#[from] kube::Error),
}

/// Failure inside a provider adapter's `Bind`/`Sync`. Per-provider
/// unless otherwise noted.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("credentials rejected by the identity provider: {0}")]
    AuthFailure(String),

    #[error("transport or TLS failure: {0}")]
    Transport(String),

    #[error("ldap error: {0}")]
    Ldap(#[from] ldap3::LdapError),

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("http middleware error: {0}")]
    HttpMiddleware(#[from] reqwest_middleware::Error),

    #[error("remote returned malformed data or an unexpected status: {0}")]
    ProviderProtocol(String),

    #[error("failed to sign GitHub App JWT: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("resolving provider credentials: {0}")]
    Resolve(#[from] ResolveError),
}

/// Per-group/per-cycle error surfaced by the reconciliation engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("group {group:?} is owned by a different provider: expected {expected:?}, found {found:?}")]
    OwnershipConflict {
        group: String,
        expected: String,
        found: String,
    },

    #[error("group name {0:?} is not a valid DNS-1035 label")]
    InvalidName(String),

    #[error("platform group store failed for group {group:?}: {source}")]
    PlatformStoreFailure {
        group: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("kubernetes reported error: {0}")]
    Kube(#[from] kube::Error),
}

/// Errors accumulated across every provider in one cycle, keyed by provider
/// name. `Display` joins member messages rather than nesting
/// `Box<dyn Error>` chains.
#[derive(Debug)]
pub struct AggregateError {
    pub errors: Vec<(String, Error)>,
}

impl AggregateError {
    pub fn new() -> Self {
        AggregateError { errors: Vec::new() }
    }

    pub fn push(&mut self, provider: impl Into<String>, err: Error) {
        self.errors.push((provider.into(), err));
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

impl Default for AggregateError {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .errors
            .iter()
            .map(|(name, err)| format!("{name}: {err}"))
            .collect::<Vec<_>>()
            .join("; ");
        write!(f, "{joined}")
    }
}

impl std::error::Error for AggregateError {}

/// Errors accumulated while building the [`crate::registry::Registry`] from
/// a `GroupSyncSpec` — one entry per provider that failed `ConfigInvalid`
/// validation.
#[derive(Debug)]
pub struct AggregateConfigError {
    pub errors: Vec<(String, ConfigError)>,
}

impl fmt::Display for AggregateConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .errors
            .iter()
            .map(|(name, err)| format!("{name}: {err}"))
            .collect::<Vec<_>>()
            .join("; ");
        write!(f, "{joined}")
    }
}

impl std::error::Error for AggregateConfigError {}

/// Top-level failure from [`crate::registry::build`]: either a single
/// spec-level `ConfigInvalid` (no providers run) or the aggregate of
/// per-provider `ProviderMalformed` errors.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error(transparent)]
    Spec(#[from] ConfigError),
    #[error(transparent)]
    Providers(#[from] AggregateConfigError),
}
