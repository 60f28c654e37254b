//! Azure AD / Microsoft Graph adapter. Client-credentials auth
//! against the configured authority, then either a `baseGroups` expansion
//! or a full listing, followed by transitive member enumeration.

use super::common::{build_http_client, filter_allowed, url_host};
use super::ProviderAdapter;
use crate::error::{AdapterError, ConfigError};
use crate::resolver::{ResolvedValue, SecretResolver};
use async_trait::async_trait;
use group_sync_types::{AzureProviderSpec, RemoteGroup};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const GRAPH_PAGE_SIZE: u32 = 999;
const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";
const GRAPH_ROOT: &str = "https://graph.microsoft.com/v1.0";

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct GraphPage {
    value: Vec<Value>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

pub struct AzureAdapter {
    name: String,
    spec: AzureProviderSpec,
    http: Option<reqwest::Client>,
    token: Option<String>,
}

impl AzureAdapter {
    pub fn new(name: String, spec: AzureProviderSpec) -> Self {
        AzureAdapter {
            name,
            spec,
            http: None,
            token: None,
        }
    }

    fn http(&self) -> &reqwest::Client {
        self.http.as_ref().expect("bind() must run before sync()")
    }

    async fn graph_get_paginated(&self, url: String) -> Result<Vec<Value>, AdapterError> {
        let mut out = Vec::new();
        let mut next = Some(url);
        while let Some(url) = next {
            let page: GraphPage = self
                .http()
                .get(&url)
                .bearer_auth(self.token.as_deref().unwrap_or_default())
                .send()
                .await?
                .error_for_status()
                .map_err(AdapterError::Http)?
                .json()
                .await?;
            out.extend(page.value);
            next = page.next_link;
        }
        Ok(out)
    }

    async fn base_group_id(&self, display_name: &str) -> Result<String, AdapterError> {
        let url = format!(
            "{GRAPH_ROOT}/groups?$filter=displayName eq '{}'",
            display_name.replace('\'', "''")
        );
        let matches = self.graph_get_paginated(url).await?;
        match matches.len() {
            1 => matches[0]
                .get("id")
                .and_then(Value::as_str)
                .map(str::to_owned)
                .ok_or_else(|| AdapterError::ProviderProtocol("group result missing id".to_owned())),
            0 => Err(AdapterError::ProviderProtocol(format!(
                "base group {display_name:?} not found"
            ))),
            n => Err(AdapterError::ProviderProtocol(format!(
                "base group {display_name:?} ambiguous: {n} matches"
            ))),
        }
    }

    async fn group_to_remote(&self, group: &Value) -> Result<Option<RemoteGroup>, AdapterError> {
        let id = group
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| AdapterError::ProviderProtocol("group missing id".to_owned()))?;
        let display_name = group.get("displayName").and_then(Value::as_str).unwrap_or("");
        if display_name.is_empty() {
            tracing::warn!(provider = %self.name, id, "skipping azure group with empty displayName");
            return Ok(None);
        }

        let members = self
            .graph_get_paginated(format!(
                "{GRAPH_ROOT}/groups/{id}/transitiveMembers?$top={GRAPH_PAGE_SIZE}"
            ))
            .await?;

        let attrs = self
            .spec
            .user_name_attributes
            .clone()
            .unwrap_or_else(|| vec!["userPrincipalName".to_owned()]);
        let mut users = Vec::new();
        for member in &members {
            let is_user = member
                .get("@odata.type")
                .and_then(Value::as_str)
                .map(|t| t.ends_with("#microsoft.graph.user"))
                .unwrap_or(false);
            if !is_user {
                continue;
            }
            if let Some(username) = attrs
                .iter()
                .find_map(|attr| member.get(attr).and_then(Value::as_str))
            {
                users.push(username.to_owned());
            }
        }

        let host = url_host(&self.spec.authority.clone().unwrap_or_else(|| DEFAULT_AUTHORITY.to_owned()));
        let mut remote = RemoteGroup::new(display_name, id, host);
        remote.users = users;
        Ok(Some(remote))
    }
}

#[async_trait]
impl ProviderAdapter for AzureAdapter {
    fn provider_name(&self) -> &str {
        &self.name
    }

    fn prune(&self) -> bool {
        self.spec.common.prune.unwrap_or(false)
    }

    fn init(&mut self) -> bool {
        let mut changed = false;
        if self.spec.authority.is_none() {
            self.spec.authority = Some(DEFAULT_AUTHORITY.to_owned());
            changed = true;
        }
        if self.spec.user_name_attributes.is_none() {
            self.spec.user_name_attributes = Some(vec!["userPrincipalName".to_owned()]);
            changed = true;
        }
        changed
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.spec.tenant_id.is_none() {
            return Err(ConfigError::ProviderMalformed(
                self.name.clone(),
                group_sync_types::ProviderMalformed::NoVariant("azure provider requires tenantID".to_owned()),
            ));
        }
        Ok(())
    }

    async fn bind(&mut self, resolver: Arc<dyn SecretResolver>) -> Result<(), AdapterError> {
        let credentials = self
            .spec
            .common
            .credentials
            .as_ref()
            .ok_or_else(|| AdapterError::AuthFailure("azure provider requires credentials".to_owned()))?;
        let values = resolver.resolve(credentials).await?;
        let map = match values {
            ResolvedValue::Mapping(m) => m,
            ResolvedValue::Single(_) => BTreeMap::new(),
        };
        let tenant_id = map
            .get("AZURE_TENANT_ID")
            .cloned()
            .or_else(|| self.spec.tenant_id.clone())
            .ok_or_else(|| AdapterError::AuthFailure("missing AZURE_TENANT_ID".to_owned()))?;
        let client_id = map
            .get("AZURE_CLIENT_ID")
            .ok_or_else(|| AdapterError::AuthFailure("missing AZURE_CLIENT_ID".to_owned()))?;
        let client_secret = map
            .get("AZURE_CLIENT_SECRET")
            .ok_or_else(|| AdapterError::AuthFailure("missing AZURE_CLIENT_SECRET".to_owned()))?;

        let http = build_http_client(self.spec.common.insecure.unwrap_or(false), None)?;
        let authority = self.spec.authority.clone().unwrap_or_else(|| DEFAULT_AUTHORITY.to_owned());
        let token_url = format!("{}/{}/oauth2/v2.0/token", authority.trim_end_matches('/'), tenant_id);
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", client_id.as_str()),
            ("client_secret", client_secret.as_str()),
            ("scope", "https://graph.microsoft.com/.default"),
        ];
        let resp: TokenResponse = http
            .post(&token_url)
            .form(&form)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| AdapterError::AuthFailure(e.to_string()))?
            .json()
            .await?;

        self.http = Some(http);
        self.token = Some(resp.access_token);
        Ok(())
    }

    async fn sync(&self, _cancel: CancellationToken) -> Result<Vec<RemoteGroup>, AdapterError> {
        let groups = if let Some(base_groups) = &self.spec.base_groups {
            let mut out = Vec::new();
            for name in base_groups {
                let id = self.base_group_id(name).await?;
                // Direct members only: `/members`, not `/transitiveMembers`.
                // A base group's expansion stops at its immediate
                // group-type children; full transitive user enumeration
                // happens per resulting group below.
                let members = self
                    .graph_get_paginated(format!("{GRAPH_ROOT}/groups/{id}/members?$top={GRAPH_PAGE_SIZE}"))
                    .await?;
                out.push(serde_json::json!({"id": id, "displayName": name}));
                for member in members {
                    let is_group = member
                        .get("@odata.type")
                        .and_then(Value::as_str)
                        .map(|t| t.ends_with("#microsoft.graph.group"))
                        .unwrap_or(false);
                    if is_group {
                        out.push(member);
                    }
                }
            }
            out
        } else {
            let mut url = format!("{GRAPH_ROOT}/groups?$top={GRAPH_PAGE_SIZE}");
            if let Some(filter) = &self.spec.filter {
                url.push_str(&format!("&$filter={}", filter));
            }
            self.graph_get_paginated(url).await?
        };

        let mut remotes = Vec::new();
        for group in &groups {
            if let Some(remote) = self.group_to_remote(group).await? {
                remotes.push(remote);
            }
        }

        Ok(filter_allowed(remotes, self.spec.common.allowed_groups_set()))
    }
}
