//! GitLab adapter. Lists top-level groups, then each one's
//! descendant groups, then members per group (scope `one` vs `sub`).

use super::common::{build_http_client, filter_allowed, url_host};
use super::ProviderAdapter;
use crate::error::{AdapterError, ConfigError};
use crate::resolver::{ResolvedValue, SecretResolver};
use async_trait::async_trait;
use group_sync_types::{GitlabProviderSpec, GitlabScope, GitlabTokenType, RemoteGroup};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const PAGE_SIZE: u32 = 100;

#[derive(Deserialize, Clone)]
struct GitlabGroup {
    id: u64,
    name: String,
    full_path: String,
}

#[derive(Deserialize)]
struct GitlabMember {
    username: String,
}

#[derive(Deserialize)]
struct SessionResponse {
    private_token: String,
}

pub struct GitlabAdapter {
    name: String,
    spec: GitlabProviderSpec,
    http: Option<reqwest::Client>,
    auth_header: Option<(&'static str, String)>,
}

impl GitlabAdapter {
    pub fn new(name: String, spec: GitlabProviderSpec) -> Self {
        GitlabAdapter {
            name,
            spec,
            http: None,
            auth_header: None,
        }
    }

    fn http(&self) -> &reqwest::Client {
        self.http.as_ref().expect("bind() must run before sync()")
    }

    fn request(&self, url: &str) -> reqwest::RequestBuilder {
        let req = self.http().get(url);
        match &self.auth_header {
            Some(("PRIVATE-TOKEN", v)) => req.header("PRIVATE-TOKEN", v),
            Some((_, v)) => req.bearer_auth(v),
            None => req,
        }
    }

    async fn list_paginated<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<Vec<T>, AdapterError> {
        let mut out = Vec::new();
        let mut page = 1u32;
        loop {
            let sep = if path.contains('?') { '&' } else { '?' };
            let url = format!(
                "{}/api/v4/{}{}per_page={PAGE_SIZE}&page={page}",
                self.spec.url.trim_end_matches('/'),
                path,
                sep
            );
            let chunk: Vec<T> = self
                .request(&url)
                .send()
                .await?
                .error_for_status()
                .map_err(AdapterError::Http)?
                .json()
                .await?;
            let got = chunk.len() as u32;
            out.extend(chunk);
            if got < PAGE_SIZE {
                break;
            }
            page += 1;
        }
        Ok(out)
    }

    async fn members_of(&self, group: &GitlabGroup) -> Result<Vec<String>, AdapterError> {
        let endpoint = match self.spec.scope.unwrap_or_default() {
            GitlabScope::Sub => "members/all",
            GitlabScope::One => "members",
        };
        let members: Vec<GitlabMember> = self
            .list_paginated(&format!("groups/{}/{endpoint}", group.id))
            .await?;
        Ok(members.into_iter().map(|m| m.username).collect())
    }
}

#[async_trait]
impl ProviderAdapter for GitlabAdapter {
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
        Ok(())
    }

    async fn bind(&mut self, resolver: Arc<dyn SecretResolver>) -> Result<(), AdapterError> {
        let credentials = self
            .spec
            .common
            .credentials
            .as_ref()
            .ok_or_else(|| AdapterError::AuthFailure("gitlab provider requires credentials".to_owned()))?;
        let values = resolver.resolve(credentials).await?;
        let map = match values {
            ResolvedValue::Mapping(m) => m,
            ResolvedValue::Single(_) => BTreeMap::new(),
        };

        let http = build_http_client(self.spec.common.insecure.unwrap_or(false), None)?;

        self.auth_header = Some(if let (Some(username), Some(password)) = (map.get("username"), map.get("password")) {
            // Mirrors `go-gitlab`'s `NewBasicAuthClient`: exchange
            // username+password for a session private token via the
            // (legacy) session endpoint, then authenticate subsequent
            // calls with that token like a personal access token.
            let session_url = format!("{}/api/v4/session", self.spec.url.trim_end_matches('/'));
            let session: SessionResponse = http
                .post(&session_url)
                .form(&[("login", username.as_str()), ("password", password.as_str())])
                .send()
                .await?
                .error_for_status()
                .map_err(|e| AdapterError::AuthFailure(e.to_string()))?
                .json()
                .await?;
            ("PRIVATE-TOKEN", session.private_token)
        } else if let Some(token) = map.get("token") {
            match self.spec.token_type.unwrap_or_default() {
                GitlabTokenType::Personal | GitlabTokenType::Job => ("PRIVATE-TOKEN", token.clone()),
                GitlabTokenType::Oauth => ("Bearer", token.clone()),
            }
        } else {
            return Err(AdapterError::AuthFailure(
                "gitlab credentials need username+password or token".to_owned(),
            ));
        });
        self.http = Some(http);
        Ok(())
    }

    async fn sync(&self, _cancel: CancellationToken) -> Result<Vec<RemoteGroup>, AdapterError> {
        let top_level: Vec<GitlabGroup> = self
            .list_paginated("groups?top_level_only=true")
            .await?;

        let mut all_groups = Vec::new();
        for group in &top_level {
            all_groups.push(group.clone());
            let descendants: Vec<GitlabGroup> = self
                .list_paginated(&format!("groups/{}/descendant_groups", group.id))
                .await?;
            all_groups.extend(descendants);
        }

        let host = url_host(&self.spec.url);
        let mut out = Vec::new();
        for group in &all_groups {
            let users = self.members_of(group).await?;
            let mut remote = RemoteGroup::new(group.full_path.clone(), group.id.to_string(), host.clone());
            remote.users = users;
            out.push(remote);
        }

        Ok(filter_allowed(out, self.spec.common.allowed_groups_set()))
    }
}
