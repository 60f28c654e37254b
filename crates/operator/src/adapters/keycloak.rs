//! Keycloak adapter. Authenticates to `loginRealm` (default
//! `master`), lists groups in `realm` with paginated `first/max` queries,
//! and descends into sub-groups when `scope=sub`.

use super::common::{build_http_client, filter_allowed, url_host};
use super::ProviderAdapter;
use crate::error::{AdapterError, ConfigError};
use crate::resolver::{ResolvedValue, SecretResolver};
use async_trait::async_trait;
use group_sync_types::{KeycloakProviderSpec, KeycloakSubGroupProcessing, RemoteGroup};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const PAGE_SIZE: u32 = 100;

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize, Clone)]
struct KeycloakGroup {
    id: String,
    name: String,
    #[serde(default)]
    path: String,
    #[serde(default)]
    attributes: BTreeMap<String, Vec<String>>,
    #[serde(default, rename = "subGroupCount")]
    sub_group_count: u32,
}

#[derive(Deserialize)]
struct KeycloakUser {
    username: String,
}

pub struct KeycloakAdapter {
    name: String,
    spec: KeycloakProviderSpec,
    http: Option<reqwest::Client>,
    token: Option<String>,
}

impl KeycloakAdapter {
    pub fn new(name: String, spec: KeycloakProviderSpec) -> Self {
        KeycloakAdapter {
            name,
            spec,
            http: None,
            token: None,
        }
    }

    fn http(&self) -> &reqwest::Client {
        self.http.as_ref().expect("bind() must run before sync()")
    }

    async fn list_members(&self, group_id: &str) -> Result<Vec<String>, AdapterError> {
        let mut users = Vec::new();
        let mut first = 0u32;
        loop {
            let url = format!(
                "{}/admin/realms/{}/groups/{}/members?first={}&max={}",
                self.spec.url.trim_end_matches('/'),
                self.spec.realm,
                group_id,
                first,
                PAGE_SIZE
            );
            let page: Vec<KeycloakUser> = self
                .http()
                .get(&url)
                .bearer_auth(self.token.as_deref().unwrap_or_default())
                .send()
                .await?
                .error_for_status()
                .map_err(AdapterError::Http)?
                .json()
                .await?;
            let got = page.len() as u32;
            users.extend(page.into_iter().map(|u| u.username));
            if got < PAGE_SIZE {
                break;
            }
            first += PAGE_SIZE;
        }
        Ok(users)
    }

    async fn list_children(&self, group_id: &str) -> Result<Vec<KeycloakGroup>, AdapterError> {
        let url = format!(
            "{}/admin/realms/{}/groups/{}/children?briefRepresentation=false",
            self.spec.url.trim_end_matches('/'),
            self.spec.realm,
            group_id
        );
        Ok(self
            .http()
            .get(&url)
            .bearer_auth(self.token.as_deref().unwrap_or_default())
            .send()
            .await?
            .error_for_status()
            .map_err(AdapterError::Http)?
            .json()
            .await?)
    }

    /// Recursively descends into `group`'s sub-groups (only reachable when
    /// `scope=sub`), emitting one `RemoteGroup` per node and, for `flat`
    /// processing, promoting child members into the parent's user list.
    /// Returns a manually boxed future (rather than a plain `async fn`) so
    /// the self-recursive call below type-checks.
    fn descend<'a>(
        &'a self,
        group: KeycloakGroup,
        ancestry: &'a [String],
        parent: Option<&'a str>,
        out: &'a mut Vec<RemoteGroup>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Vec<String>, AdapterError>> + Send + 'a>> {
        Box::pin(self.descend_inner(group, ancestry, parent, out))
    }

    async fn descend_inner(
        &self,
        group: KeycloakGroup,
        ancestry: &[String],
        parent: Option<&str>,
        out: &mut Vec<RemoteGroup>,
    ) -> Result<Vec<String>, AdapterError> {
        let processing = self.spec.sub_group_processing.unwrap_or_default();
        let separator = self.spec.sub_group_join_separator.as_deref().unwrap_or("/");

        let native_name = group.name.clone();
        if matches!(processing, KeycloakSubGroupProcessing::Join) && native_name.contains(separator) {
            return Err(AdapterError::ProviderProtocol(format!(
                "group {native_name:?} name already contains the join separator {separator:?} (SeparatorInName)"
            )));
        }

        let platform_name = match processing {
            KeycloakSubGroupProcessing::Flat => native_name.clone(),
            KeycloakSubGroupProcessing::Join => {
                let mut parts = ancestry.to_vec();
                parts.push(native_name.clone());
                parts.join(separator)
            }
        };

        let mut own_members = self.list_members(&group.id).await?;

        let children = if matches!(self.spec.scope.unwrap_or_default(), group_sync_types::KeycloakScope::Sub)
            && group.sub_group_count > 0
        {
            self.list_children(&group.id).await?
        } else {
            Vec::new()
        };

        let mut child_ancestry = ancestry.to_vec();
        child_ancestry.push(native_name.clone());
        let mut child_names = Vec::new();
        let mut promoted_members = Vec::new();
        for child in children {
            child_names.push(child.name.clone());
            let child_members = self.descend(child, &child_ancestry, Some(&native_name), out).await?;
            if matches!(processing, KeycloakSubGroupProcessing::Flat) {
                promoted_members.extend(child_members);
            }
        }
        own_members.extend(promoted_members);

        let host = url_host(&self.spec.url);
        let mut remote = RemoteGroup::new(platform_name, group.id.clone(), host.clone());
        remote.users = own_members.clone();
        if !child_names.is_empty() {
            remote
                .annotations
                .insert("hierarchy_children".to_owned(), child_names.join(","));
        }
        if let Some(p) = parent {
            remote.annotations.insert("hierarchy_parent".to_owned(), p.to_owned());
        }
        for (key, values) in &group.attributes {
            if is_valid_annotation_key(key) {
                remote.annotations.insert(key.clone(), values.join(","));
            } else {
                tracing::warn!(provider = %self.name, group = %group.path, key, "skipping keycloak attribute with invalid annotation key");
            }
        }
        out.push(remote);

        Ok(own_members)
    }
}

fn is_valid_annotation_key(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= 253
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/'))
}

#[async_trait]
impl ProviderAdapter for KeycloakAdapter {
    fn provider_name(&self) -> &str {
        &self.name
    }

    fn prune(&self) -> bool {
        self.spec.common.prune.unwrap_or(false)
    }

    fn init(&mut self) -> bool {
        let mut changed = false;
        if self.spec.login_realm.is_none() {
            self.spec.login_realm = Some("master".to_owned());
            changed = true;
        }
        changed
    }

    fn validate(&self) -> Result<(), ConfigError> {
        url::Url::parse(&self.spec.url).map_err(|e| ConfigError::MalformedUrl(self.name.clone(), e))?;
        // The upstream source silently treats an empty join separator as
        // string concatenation. Rejected here instead as a validation
        // error.
        if matches!(self.spec.sub_group_processing, Some(KeycloakSubGroupProcessing::Join))
            && self.spec.sub_group_join_separator.as_deref() == Some("")
        {
            return Err(ConfigError::ProviderMalformed(
                self.name.clone(),
                group_sync_types::ProviderMalformed::NoVariant(
                    "subGroupJoinSeparator must not be empty when subGroupProcessing=join".to_owned(),
                ),
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
            .ok_or_else(|| AdapterError::AuthFailure("keycloak provider requires credentials".to_owned()))?;
        let values = resolver.resolve(credentials).await?;
        let map = match values {
            ResolvedValue::Mapping(m) => m,
            ResolvedValue::Single(_) => BTreeMap::new(),
        };
        let username = map
            .get("username")
            .ok_or_else(|| AdapterError::AuthFailure("missing username".to_owned()))?;
        let password = map
            .get("password")
            .ok_or_else(|| AdapterError::AuthFailure("missing password".to_owned()))?;

        let http = build_http_client(self.spec.common.insecure.unwrap_or(false), None)?;
        let login_realm = self.spec.login_realm.as_deref().unwrap_or("master");
        let token_url = format!(
            "{}/realms/{}/protocol/openid-connect/token",
            self.spec.url.trim_end_matches('/'),
            login_realm
        );
        let form = [
            ("grant_type", "password"),
            ("client_id", "admin-cli"),
            ("username", username.as_str()),
            ("password", password.as_str()),
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
        let mut roots = Vec::new();
        let mut first = 0u32;
        loop {
            let url = format!(
                "{}/admin/realms/{}/groups?first={}&max={}&briefRepresentation=false",
                self.spec.url.trim_end_matches('/'),
                self.spec.realm,
                first,
                PAGE_SIZE
            );
            let page: Vec<KeycloakGroup> = self
                .http()
                .get(&url)
                .bearer_auth(self.token.as_deref().unwrap_or_default())
                .send()
                .await?
                .error_for_status()
                .map_err(AdapterError::Http)?
                .json()
                .await?;
            let got = page.len() as u32;
            roots.extend(page);
            if got < PAGE_SIZE {
                break;
            }
            first += PAGE_SIZE;
        }

        let mut out = Vec::new();
        for root in roots {
            self.descend(root, &[], None, &mut out).await?;
        }

        Ok(filter_allowed(out, self.spec.common.allowed_groups_set()))
    }
}
