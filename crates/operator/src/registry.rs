//! Syncer Registry. Given a `GroupSyncSpec`, constructs the correct
//! adapter per named provider and aggregates validation errors rather than
//! stopping at the first malformed entry.

use crate::adapters::{
    azure::AzureAdapter, github::GithubAdapter, gitlab::GitlabAdapter,
    ibm_security_verify::IbmSecurityVerifyAdapter, keycloak::KeycloakAdapter, ldap::LdapAdapter,
    okta::OktaAdapter, ProviderAdapter,
};
use crate::error::{AggregateConfigError, ConfigError, RegistryError};
use crate::scheduler::validate_cron_expr;
use group_sync_types::{GroupSyncSpec, ProviderVariantRef};
use std::collections::HashSet;

/// One constructed adapter plus the bits of its `ProviderSpec` the engine
/// and scheduler need without reaching back into the spec itself.
pub struct RegisteredProvider {
    pub name: String,
    pub prune: bool,
    pub adapter: Box<dyn ProviderAdapter>,
}

/// Validates the spec-level constraints that gate the whole cycle before
/// any provider is constructed: zero providers, a duplicate provider name
/// (not in the upstream source, a deliberate addition; see DESIGN.md),
/// and an unparseable cron expression.
pub fn validate_spec(spec: &GroupSyncSpec) -> Result<(), ConfigError> {
    if spec.providers.is_empty() {
        return Err(ConfigError::NoProviders);
    }
    let mut seen = HashSet::new();
    for provider in &spec.providers {
        if !seen.insert(provider.name.as_str()) {
            return Err(ConfigError::DuplicateProviderName(provider.name.clone()));
        }
    }
    if let Some(expr) = &spec.schedule {
        validate_cron_expr(expr).map_err(|e| ConfigError::InvalidSchedule(expr.clone(), e))?;
    }
    Ok(())
}

/// Constructs one adapter per `Provider` in `spec.providers`, preserving
/// spec order (ordering is load-bearing for reconciliation). Every
/// `ProviderMalformed` failure is collected into a single
/// `AggregateConfigError` instead of aborting on the first one.
pub fn build(spec: &GroupSyncSpec) -> Result<Vec<RegisteredProvider>, RegistryError> {
    validate_spec(spec)?;

    let mut registered = Vec::new();
    let mut aggregate = AggregateConfigError { errors: Vec::new() };

    for provider in &spec.providers {
        match provider.variant() {
            Ok(variant) => {
                let prune = variant.common().prune.unwrap_or(false);
                let adapter: Box<dyn ProviderAdapter> = match variant {
                    ProviderVariantRef::Ldap(s) => Box::new(LdapAdapter::new(provider.name.clone(), s.clone())),
                    ProviderVariantRef::Keycloak(s) => {
                        Box::new(KeycloakAdapter::new(provider.name.clone(), s.clone()))
                    }
                    ProviderVariantRef::Azure(s) => Box::new(AzureAdapter::new(provider.name.clone(), s.clone())),
                    ProviderVariantRef::Github(s) => Box::new(GithubAdapter::new(provider.name.clone(), s.clone())),
                    ProviderVariantRef::Gitlab(s) => Box::new(GitlabAdapter::new(provider.name.clone(), s.clone())),
                    ProviderVariantRef::Okta(s) => Box::new(OktaAdapter::new(provider.name.clone(), s.clone())),
                    ProviderVariantRef::IbmSecurityVerify(s) => {
                        Box::new(IbmSecurityVerifyAdapter::new(provider.name.clone(), s.clone()))
                    }
                };
                registered.push(RegisteredProvider {
                    name: provider.name.clone(),
                    prune,
                    adapter,
                });
            }
            Err(malformed) => {
                aggregate.errors.push((
                    provider.name.clone(),
                    ConfigError::ProviderMalformed(provider.name.clone(), malformed),
                ));
            }
        }
    }

    if !aggregate.errors.is_empty() {
        return Err(RegistryError::Providers(aggregate));
    }
    Ok(registered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use group_sync_types::{OktaProviderSpec, ProviderSpec};

    fn okta_provider(name: &str) -> ProviderSpec {
        ProviderSpec {
            name: name.to_owned(),
            okta: Some(OktaProviderSpec {
                url: "https://example.okta.com".to_owned(),
                app_id: "app".to_owned(),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn empty_providers_is_rejected() {
        let spec = GroupSyncSpec::default();
        assert!(matches!(validate_spec(&spec), Err(ConfigError::NoProviders)));
    }

    #[test]
    fn duplicate_provider_names_are_rejected() {
        let spec = GroupSyncSpec {
            providers: vec![okta_provider("dup"), okta_provider("dup")],
            ..Default::default()
        };
        assert!(matches!(
            validate_spec(&spec),
            Err(ConfigError::DuplicateProviderName(n)) if n == "dup"
        ));
    }

    #[test]
    fn invalid_cron_is_rejected() {
        let spec = GroupSyncSpec {
            providers: vec![okta_provider("p")],
            schedule: Some("not a cron expression".to_owned()),
            ..Default::default()
        };
        assert!(matches!(validate_spec(&spec), Err(ConfigError::InvalidSchedule(_, _))));
    }

    #[test]
    fn builds_one_adapter_per_provider_in_order() {
        let spec = GroupSyncSpec {
            providers: vec![okta_provider("a"), okta_provider("b")],
            ..Default::default()
        };
        let registered = build(&spec).unwrap();
        assert_eq!(registered.len(), 2);
        assert_eq!(registered[0].name, "a");
        assert_eq!(registered[1].name, "b");
    }

    #[test]
    fn malformed_providers_are_aggregated_not_short_circuited() {
        let spec = GroupSyncSpec {
            providers: vec![
                ProviderSpec {
                    name: "no-variant".to_owned(),
                    ..Default::default()
                },
                ProviderSpec {
                    name: "also-bad".to_owned(),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        match build(&spec) {
            Err(RegistryError::Providers(agg)) => assert_eq!(agg.errors.len(), 2),
            Err(RegistryError::Spec(e)) => panic!("expected aggregated provider errors, got spec error {e}"),
            Ok(_) => panic!("expected aggregated provider errors, got Ok"),
        }
    }
}
