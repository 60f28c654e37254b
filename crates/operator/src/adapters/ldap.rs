//! LDAP adapter. Composes a schema (RFC 2307 / Active Directory /
//! Augmented Active Directory) into the generic LDAP sync algorithm: list
//! group UIDs, extract member DNs, map members and group names, tolerate
//! two specific error classes when the schema opts in.

use super::common::{filter_allowed, url_host};
use super::ProviderAdapter;
use crate::error::{AdapterError, ConfigError};
use crate::resolver::SecretResolver;
use async_trait::async_trait;
use group_sync_types::{LdapProviderSpec, LdapQuery, LdapSchema, RemoteGroup};
use ldap3::{LdapConnAsync, LdapConnSettings, Scope, SearchEntry};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct LdapAdapter {
    name: String,
    spec: LdapProviderSpec,
    bind_dn: Option<String>,
    password: Option<String>,
}

impl LdapAdapter {
    pub fn new(name: String, spec: LdapProviderSpec) -> Self {
        LdapAdapter {
            name,
            spec,
            bind_dn: None,
            password: None,
        }
    }

    fn scope_of(query: &LdapQuery) -> ldap3::Scope {
        match query.scope.as_deref() {
            Some("base") => Scope::Base,
            Some("one") => Scope::OneLevel,
            _ => Scope::Subtree,
        }
    }
}

#[async_trait]
impl ProviderAdapter for LdapAdapter {
    fn provider_name(&self) -> &str {
        &self.name
    }

    fn prune(&self) -> bool {
        self.spec.common.prune.unwrap_or(false)
    }

    fn init(&mut self) -> bool {
        let mut changed = false;
        if let Some(LdapSchema::Rfc2307(schema)) = &mut self.spec.schema {
            if schema.groups_query.scope.is_none() {
                schema.groups_query.scope = Some("sub".to_owned());
                changed = true;
            }
            if schema.users_query.scope.is_none() {
                schema.users_query.scope = Some("sub".to_owned());
                changed = true;
            }
        }
        changed
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.spec.schema.is_none() {
            return Err(ConfigError::LdapSchemaMissing(self.name.clone()));
        }
        if url::Url::parse(&self.spec.url).is_err() {
            return Err(ConfigError::MalformedUrl(
                self.name.clone(),
                url::Url::parse(&self.spec.url).unwrap_err(),
            ));
        }
        if self.spec.common.insecure.unwrap_or(false) && self.spec.common.ca.is_some() {
            return Err(ConfigError::ProviderMalformed(
                self.name.clone(),
                group_sync_types::ProviderMalformed::NoVariant(
                    "insecure=true forbids also supplying a CA".to_owned(),
                ),
            ));
        }
        Ok(())
    }

    async fn bind(&mut self, resolver: Arc<dyn SecretResolver>) -> Result<(), AdapterError> {
        self.bind_dn = self.spec.bind_dn.clone();
        if let Some(credentials) = &self.spec.common.credentials {
            let values = resolver.resolve(credentials).await?;
            let map = match values {
                crate::resolver::ResolvedValue::Mapping(m) => m,
                crate::resolver::ResolvedValue::Single(_) => BTreeMap::new(),
            };
            if self.bind_dn.is_none() {
                self.bind_dn = map.get("username").cloned();
            }
            self.password = map.get("password").cloned();
        }
        // A real bind is attempted once in `sync`; connections are not
        // cached across cycles.
        Ok(())
    }

    async fn sync(&self, _cancel: CancellationToken) -> Result<Vec<RemoteGroup>, AdapterError> {
        let settings = LdapConnSettings::new()
            .set_no_tls_verify(self.spec.common.insecure.unwrap_or(false))
            .set_conn_timeout(Duration::from_secs(30));
        let (conn, mut ldap) = LdapConnAsync::with_settings(settings, &self.spec.url)
            .await
            .map_err(AdapterError::Ldap)?;
        ldap3::drive!(conn);

        if let (Some(bind_dn), password) = (&self.bind_dn, self.password.as_deref()) {
            ldap.simple_bind(bind_dn, password.unwrap_or(""))
                .await
                .map_err(AdapterError::Ldap)?
                .success()
                .map_err(|e| AdapterError::AuthFailure(e.to_string()))?;
        }

        let schema = self
            .spec
            .schema
            .as_ref()
            .expect("validate() rejects a missing schema before sync() runs");

        let (groups_query, group_uid_attr, group_name_attrs, member_attrs, tolerate_not_found, tolerate_out_of_scope) =
            match schema {
                LdapSchema::Rfc2307(s) => (
                    &s.groups_query,
                    s.group_uid_attribute.as_str(),
                    s.group_name_attributes.as_slice(),
                    s.group_membership_attributes.as_slice(),
                    s.tolerate_member_not_found_errors.unwrap_or(false),
                    s.tolerate_member_out_of_scope_errors.unwrap_or(false),
                ),
                LdapSchema::AugmentedActiveDirectory(s) => (
                    &s.groups_query,
                    s.group_uid_attribute.as_str(),
                    s.group_name_attributes.as_slice(),
                    &[][..],
                    false,
                    false,
                ),
                LdapSchema::ActiveDirectory(s) => (
                    &s.users_query,
                    "dn",
                    &[][..],
                    s.group_membership_attributes.as_slice(),
                    false,
                    false,
                ),
            };

        let scope = Self::scope_of(groups_query);
        let filter = groups_query.filter.clone().unwrap_or_else(|| "(objectClass=*)".to_owned());
        let (entries, _res) = ldap
            .search(&groups_query.base_dn, scope, &filter, vec!["*", "dn"])
            .await
            .map_err(AdapterError::Ldap)?
            .success()
            .map_err(|e| AdapterError::ProviderProtocol(e.to_string()))?;

        let whitelist = self.spec.whitelist.clone();
        let blacklist = self.spec.blacklist.clone();
        let mapping = self.spec.group_uid_name_mapping.clone().unwrap_or_default();
        let host = url_host(&self.spec.url);
        let mut tolerated_errors = 0u32;
        let mut remote_groups = Vec::new();

        for entry in entries {
            let entry = SearchEntry::construct(entry);
            let uid = entry
                .attrs
                .get(group_uid_attr)
                .and_then(|v| v.first())
                .cloned()
                .unwrap_or_else(|| entry.dn.clone());

            if let Some(wl) = &whitelist {
                if !wl.contains(&uid) {
                    continue;
                }
            }
            if let Some(bl) = &blacklist {
                if bl.contains(&uid) {
                    continue;
                }
            }

            let name = mapping.get(&uid).cloned().unwrap_or_else(|| {
                group_name_attrs
                    .iter()
                    .find_map(|attr| entry.attrs.get(attr).and_then(|v| v.first().cloned()))
                    .unwrap_or_else(|| uid.clone())
            });

            let mut users = Vec::new();
            for attr in member_attrs {
                if let Some(members) = entry.attrs.get(attr.as_str()) {
                    for member_dn in members {
                        match resolve_member_username(&mut ldap, member_dn).await {
                            Ok(username) => users.push(username),
                            Err(err) if tolerate_not_found || tolerate_out_of_scope => {
                                tolerated_errors += 1;
                                tracing::warn!(group = %name, member = %member_dn, %err, "dropping member after tolerated lookup error");
                            }
                            Err(err) => return Err(AdapterError::ProviderProtocol(err)),
                        }
                    }
                }
            }

            let mut group = RemoteGroup::new(name, uid.clone(), host.clone());
            group.annotations.insert("ldap.url".to_owned(), self.spec.url.clone());
            group.annotations.insert("ldap.uid".to_owned(), uid);
            group.labels.insert("ldap.host".to_owned(), host.clone());
            group.users = users;
            remote_groups.push(group);
        }

        if tolerated_errors > 0 {
            tracing::warn!(provider = %self.name, count = tolerated_errors, "tolerated member lookup errors this cycle");
        }

        let _ = ldap.unbind().await;
        Ok(filter_allowed(remote_groups, self.spec.common.allowed_groups_set()))
    }
}

/// Resolves a member DN to a username by reading the entry's own RDN
/// attribute value — a simplification of the schema-specific
/// `UserNameMapper` plug-point that still honours the tolerated-error
/// contract (a DN outside the search base or missing entirely surfaces as
/// an `Err` the caller may tolerate).
async fn resolve_member_username(ldap: &mut ldap3::Ldap, member_dn: &str) -> Result<String, String> {
    let (rs, _res) = ldap
        .search(member_dn, Scope::Base, "(objectClass=*)", vec!["uid", "cn", "sAMAccountName"])
        .await
        .map_err(|e| e.to_string())?
        .success()
        .map_err(|e| e.to_string())?;
    let entry = rs
        .into_iter()
        .next()
        .ok_or_else(|| format!("member not found: {member_dn}"))?;
    let entry = SearchEntry::construct(entry);
    ["uid", "sAMAccountName", "cn"]
        .iter()
        .find_map(|attr| entry.attrs.get(*attr).and_then(|v| v.first().cloned()))
        .ok_or_else(|| format!("member entry has no recognizable username attribute: {member_dn}"))
}
