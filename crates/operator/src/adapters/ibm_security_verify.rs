//! IBM Security Verify adapter. OAuth 2.0 client-credentials
//! against the tenant's token endpoint, then one SCIM `GET /v2.0/Groups/{id}`
//! call per configured [`IsvGroupSpec`]. First-level members only —
//! sub-groups are never expanded, unlike Keycloak/Azure.

use super::common::{build_http_client, filter_allowed, url_host};
use super::ProviderAdapter;
use crate::error::{AdapterError, ConfigError};
use crate::resolver::{ResolvedValue, SecretResolver};
use async_trait::async_trait;
use group_sync_types::{IbmSecurityVerifyProviderSpec, RemoteGroup};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const MAX_RETRIES: u32 = 10;

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct ScimGroup {
    #[serde(rename = "displayName")]
    display_name: String,
    #[serde(default)]
    members: Vec<ScimMember>,
}

#[derive(Deserialize)]
struct ScimMember {
    value: String,
    display: Option<String>,
    #[serde(rename = "type")]
    type_: Option<String>,
}

pub struct IbmSecurityVerifyAdapter {
    name: String,
    spec: IbmSecurityVerifyProviderSpec,
    http: Option<ClientWithMiddleware>,
    token: Option<String>,
}

impl IbmSecurityVerifyAdapter {
    pub fn new(name: String, spec: IbmSecurityVerifyProviderSpec) -> Self {
        IbmSecurityVerifyAdapter {
            name,
            spec,
            http: None,
            token: None,
        }
    }

    fn http(&self) -> &ClientWithMiddleware {
        self.http.as_ref().expect("bind() must run before sync()")
    }

    async fn fetch_group(&self, id: &str) -> Result<ScimGroup, AdapterError> {
        let url = format!(
            "{}/v2.0/Groups/{}?membershipType=firstLevelUsersAndGroups",
            self.spec.url.trim_end_matches('/'),
            id
        );
        let resp = self
            .http()
            .get(&url)
            .bearer_auth(self.token.as_deref().unwrap_or_default())
            .send()
            .await?;
        let resp = resp.error_for_status().map_err(AdapterError::Http)?;
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl ProviderAdapter for IbmSecurityVerifyAdapter {
    fn provider_name(&self) -> &str {
        &self.name
    }

    fn prune(&self) -> bool {
        self.spec.common.prune.unwrap_or(false)
    }

    fn init(&mut self) -> bool {
        false
    }

    fn validate(&self) -> Result<(), ConfigError> {
        url::Url::parse(&self.spec.url).map_err(|e| ConfigError::MalformedUrl(self.name.clone(), e))?;
        if self.spec.groups.is_empty() {
            return Err(ConfigError::ProviderMalformed(
                self.name.clone(),
                group_sync_types::ProviderMalformed::NoVariant(
                    "ibmSecurityVerify provider requires at least one entry in groups".to_owned(),
                ),
            ));
        }
        Ok(())
    }

    async fn bind(&mut self, resolver: Arc<dyn SecretResolver>) -> Result<(), AdapterError> {
        let credentials = self.spec.common.credentials.as_ref().ok_or_else(|| {
            AdapterError::AuthFailure("ibmSecurityVerify provider requires credentials".to_owned())
        })?;
        let values = resolver.resolve(credentials).await?;
        let map = match values {
            ResolvedValue::Mapping(m) => m,
            ResolvedValue::Single(_) => BTreeMap::new(),
        };
        let client_id = map
            .get("clientId")
            .ok_or_else(|| AdapterError::AuthFailure("missing clientId".to_owned()))?;
        let client_secret = map
            .get("clientSecret")
            .ok_or_else(|| AdapterError::AuthFailure("missing clientSecret".to_owned()))?;

        let base = build_http_client(self.spec.common.insecure.unwrap_or(false), None)?;
        let token_url = format!("{}/v1.0/endpoint/default/token", self.spec.url.trim_end_matches('/'));
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", client_id.as_str()),
            ("client_secret", client_secret.as_str()),
        ];
        let resp: TokenResponse = base
            .post(&token_url)
            .form(&form)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| AdapterError::AuthFailure(e.to_string()))?
            .json()
            .await?;

        // Wraps the bound client in a retrying transport (max 10 retries,
        // exponential backoff) — the only adapter that needs one, since
        // the SCIM endpoint is the flakiest of the bunch.
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(MAX_RETRIES);
        self.http = Some(
            ClientBuilder::new(base)
                .with(RetryTransientMiddleware::new_with_policy(retry_policy))
                .build(),
        );
        self.token = Some(resp.access_token);
        Ok(())
    }

    async fn sync(&self, _cancel: CancellationToken) -> Result<Vec<RemoteGroup>, AdapterError> {
        let host = url_host(&self.spec.url);
        let mut out = Vec::new();
        for spec_group in &self.spec.groups {
            let scim = self.fetch_group(&spec_group.id).await?;
            if scim.display_name != spec_group.name {
                tracing::warn!(
                    provider = %self.name,
                    id = %spec_group.id,
                    expected = %spec_group.name,
                    found = %scim.display_name,
                    "ibmSecurityVerify group displayName disagrees with configured name; using the returned value",
                );
            }
            let name = scim.display_name.replace(' ', "-");
            let users = scim
                .members
                .into_iter()
                .filter(|m| !matches!(m.type_.as_deref(), Some("Group")))
                .map(|m| m.display.unwrap_or(m.value))
                .collect();
            let mut remote = RemoteGroup::new(name, spec_group.id.clone(), host.clone());
            remote.users = users;
            out.push(remote);
        }
        Ok(filter_allowed(out, self.spec.common.allowed_groups_set()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_with_spaces_becomes_dashed_platform_name() {
        assert_eq!("Group One".replace(' ', "-"), "Group-One");
    }
}
