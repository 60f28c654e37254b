//! Okta adapter. Enumerates groups assigned to an application,
//! fetches full group details in parallel (one outstanding request per
//! group), then lists active users per group.

use super::common::{build_http_client, filter_allowed, url_host};
use super::ProviderAdapter;
use crate::error::{AdapterError, ConfigError};
use crate::resolver::{ResolvedValue, SecretResolver};
use async_trait::async_trait;
use futures::future::join_all;
use group_sync_types::{OktaProviderSpec, RemoteGroup};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const DEFAULT_PAGE_LIMIT: u32 = 1000;

#[derive(Deserialize, Clone)]
struct AppGroupAssignment {
    id: String,
}

#[derive(Deserialize)]
struct OktaUser {
    status: String,
    profile: Value,
}

pub struct OktaAdapter {
    name: String,
    spec: OktaProviderSpec,
    http: Option<reqwest::Client>,
    token: Option<String>,
}

impl OktaAdapter {
    pub fn new(name: String, spec: OktaProviderSpec) -> Self {
        OktaAdapter {
            name,
            spec,
            http: None,
            token: None,
        }
    }

    fn http(&self) -> &reqwest::Client {
        self.http.as_ref().expect("bind() must run before sync()")
    }

    fn auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header(
            "Authorization",
            format!("SSWS {}", self.token.as_deref().unwrap_or_default()),
        )
    }

    async fn fetch_group_detail(&self, id: &str) -> Result<Value, AdapterError> {
        let url = format!("{}/api/v1/groups/{}", self.spec.url.trim_end_matches('/'), id);
        let resp: Value = self
            .auth(self.http().get(&url))
            .send()
            .await?
            .error_for_status()
            .map_err(AdapterError::Http)?
            .json()
            .await?;
        Ok(resp)
    }

    async fn list_active_users(&self, id: &str) -> Result<Vec<String>, AdapterError> {
        let profile_key = self.spec.profile_key.as_deref().unwrap_or("login");
        let extract_login_username = self.spec.extract_login_username.unwrap_or(false);
        let mut users = Vec::new();
        let limit = self.spec.page_limit.unwrap_or(DEFAULT_PAGE_LIMIT);
        let mut url = format!(
            "{}/api/v1/groups/{}/users?limit={}",
            self.spec.url.trim_end_matches('/'),
            id,
            limit
        );
        loop {
            let resp = self.auth(self.http().get(&url)).send().await?;
            let next_link = resp
                .headers()
                .get("link")
                .and_then(|h| h.to_str().ok())
                .and_then(parse_next_link);
            let page: Vec<OktaUser> = resp
                .error_for_status()
                .map_err(AdapterError::Http)?
                .json()
                .await?;
            for user in page {
                if user.status != "ACTIVE" {
                    continue;
                }
                if let Some(value) = user.profile.get(profile_key).and_then(Value::as_str) {
                    let value = if extract_login_username {
                        value.split('@').next().unwrap_or(value)
                    } else {
                        value
                    };
                    users.push(value.to_owned());
                }
            }
            match next_link {
                Some(next) => url = next,
                None => break,
            }
        }
        Ok(users)
    }
}

fn parse_next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|part| {
        let mut segments = part.split(';');
        let url_part = segments.next()?.trim();
        let is_next = segments.any(|s| s.trim() == r#"rel="next""#);
        if is_next {
            Some(url_part.trim_start_matches('<').trim_end_matches('>').to_owned())
        } else {
            None
        }
    })
}

#[async_trait]
impl ProviderAdapter for OktaAdapter {
    fn provider_name(&self) -> &str {
        &self.name
    }

    fn prune(&self) -> bool {
        self.spec.common.prune.unwrap_or(false)
    }

    fn init(&mut self) -> bool {
        let mut changed = false;
        if self.spec.page_limit.is_none() {
            self.spec.page_limit = Some(DEFAULT_PAGE_LIMIT);
            changed = true;
        }
        if self.spec.profile_key.is_none() {
            self.spec.profile_key = Some("login".to_owned());
            changed = true;
        }
        changed
    }

    fn validate(&self) -> Result<(), ConfigError> {
        url::Url::parse(&self.spec.url).map_err(|e| ConfigError::MalformedUrl(self.name.clone(), e))?;
        Ok(())
    }

    async fn bind(&mut self, resolver: Arc<dyn SecretResolver>) -> Result<(), AdapterError> {
        let credentials = self
            .spec
            .common
            .credentials
            .as_ref()
            .ok_or_else(|| AdapterError::AuthFailure("okta provider requires credentials".to_owned()))?;
        let values = resolver.resolve(credentials).await?;
        let map = match values {
            ResolvedValue::Mapping(m) => m,
            ResolvedValue::Single(v) => {
                let mut m = BTreeMap::new();
                m.insert("okta-api-token".to_owned(), v);
                m
            }
        };
        let token = map
            .get("okta-api-token")
            .ok_or_else(|| AdapterError::AuthFailure("missing okta-api-token".to_owned()))?;

        self.http = Some(build_http_client(self.spec.common.insecure.unwrap_or(false), None)?);
        self.token = Some(token.clone());
        Ok(())
    }

    async fn sync(&self, _cancel: CancellationToken) -> Result<Vec<RemoteGroup>, AdapterError> {
        let limit = self.spec.page_limit.unwrap_or(DEFAULT_PAGE_LIMIT);
        let mut assignments: Vec<AppGroupAssignment> = Vec::new();
        let mut url = format!(
            "{}/api/v1/apps/{}/groups?limit={}",
            self.spec.url.trim_end_matches('/'),
            self.spec.app_id,
            limit
        );
        loop {
            let resp = self.auth(self.http().get(&url)).send().await?;
            let next_link = resp
                .headers()
                .get("link")
                .and_then(|h| h.to_str().ok())
                .and_then(parse_next_link);
            let page: Vec<AppGroupAssignment> = resp
                .error_for_status()
                .map_err(AdapterError::Http)?
                .json()
                .await?;
            assignments.extend(page);
            match next_link {
                Some(next) => url = next,
                None => break,
            }
        }

        // One outstanding request per group, all awaited together. A failed fetch is logged and its
        // group dropped from the groups fetched so far, but the adapter still reports `IncompleteFetch`
        // below rather than silently returning a partial success — a caller that swallowed this would
        // otherwise read it as a clean sync and, with prune=true, delete the still-valid platform group
        // whose detail fetch merely timed out.
        let details = join_all(assignments.iter().map(|a| self.fetch_group_detail(&a.id))).await;
        let mut incomplete = false;
        let mut groups = Vec::new();
        for (assignment, detail) in assignments.iter().zip(details) {
            match detail {
                Ok(detail) => groups.push((assignment.id.clone(), detail)),
                Err(err) => {
                    incomplete = true;
                    tracing::warn!(provider = %self.name, group_id = %assignment.id, %err, "failed to fetch okta group detail");
                }
            }
        }

        let host = url_host(&self.spec.url);
        let mut out = Vec::new();
        for (id, detail) in groups {
            let name = detail
                .get("profile")
                .and_then(|p| p.get("name"))
                .and_then(Value::as_str)
                .unwrap_or(&id)
                .to_owned();
            let users = self.list_active_users(&id).await?;
            let mut remote = RemoteGroup::new(name, id, host.clone());
            remote.users = users;
            out.push(remote);
        }

        if incomplete {
            return Err(AdapterError::ProviderProtocol(
                "IncompleteFetch: one or more group detail fetches failed".to_owned(),
            ));
        }

        Ok(filter_allowed(out, self.spec.common.allowed_groups_set()))
    }
}
