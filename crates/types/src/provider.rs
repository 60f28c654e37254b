use crate::objectref::ObjectRef;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Fields shared by every provider kind. Flattened into each variant's
/// spec struct rather than hoisted onto [`ProviderSpec`] directly, mirroring
/// how the upstream Go CRD embeds `ProviderRef` into each of
/// `LDAPProvider`/`KeycloakProvider`/etc.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct CommonProviderSpec {
    /// Reference to a CA certificate to add to the trust root set used
    /// when dialing this provider. Mutually exclusive with `insecure=true`.
    pub ca: Option<ObjectRef>,

    /// Reference to credentials for this provider. Required by every
    /// provider kind except where the provider-specific docs say otherwise
    /// (e.g. LDAP's `password` is optional for anonymous binds).
    pub credentials: Option<ObjectRef>,

    /// Disables TLS certificate verification entirely. Forbids also
    /// supplying `ca`.
    pub insecure: Option<bool>,

    /// Allow-list of remote group names. Empty/absent means "all groups".
    #[serde(rename = "allowedGroups")]
    pub allowed_groups: Option<Vec<String>>,

    /// When true, platform groups owned by this provider that are no
    /// longer present in the provider's most recent `Sync` output are
    /// deleted at the end of the reconciliation cycle.
    pub prune: Option<bool>,
}

impl CommonProviderSpec {
    pub fn allowed_groups_set(&self) -> Option<std::collections::HashSet<&str>> {
        self.allowed_groups
            .as_ref()
            .filter(|v| !v.is_empty())
            .map(|v| v.iter().map(String::as_str).collect())
    }
}

/// LDAP schema selector. Exactly one of RFC 2307, Active Directory, or
/// Augmented Active Directory semantics is used to build the
/// `GroupLister`/`GroupMemberExtractor`/`GroupNameMapper`/`UserNameMapper`
/// plug-points.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum LdapSchema {
    Rfc2307(Rfc2307Schema),
    ActiveDirectory(ActiveDirectorySchema),
    AugmentedActiveDirectory(AugmentedActiveDirectorySchema),
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct Rfc2307Schema {
    #[serde(rename = "groupsQuery")]
    pub groups_query: LdapQuery,
    #[serde(rename = "groupUIDAttribute")]
    pub group_uid_attribute: String,
    #[serde(rename = "groupNameAttributes")]
    pub group_name_attributes: Vec<String>,
    #[serde(rename = "groupMembershipAttributes")]
    pub group_membership_attributes: Vec<String>,
    #[serde(rename = "usersQuery")]
    pub users_query: LdapQuery,
    #[serde(rename = "userUIDAttribute")]
    pub user_uid_attribute: String,
    #[serde(rename = "userNameAttributes")]
    pub user_name_attributes: Vec<String>,
    #[serde(rename = "tolerateMemberNotFoundErrors")]
    pub tolerate_member_not_found_errors: Option<bool>,
    #[serde(rename = "tolerateMemberOutOfScopeErrors")]
    pub tolerate_member_out_of_scope_errors: Option<bool>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct ActiveDirectorySchema {
    #[serde(rename = "usersQuery")]
    pub users_query: LdapQuery,
    #[serde(rename = "groupMembershipAttributes")]
    pub group_membership_attributes: Vec<String>,
    #[serde(rename = "userNameAttributes")]
    pub user_name_attributes: Vec<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct AugmentedActiveDirectorySchema {
    #[serde(rename = "groupsQuery")]
    pub groups_query: LdapQuery,
    #[serde(rename = "groupUIDAttribute")]
    pub group_uid_attribute: String,
    #[serde(rename = "groupNameAttributes")]
    pub group_name_attributes: Vec<String>,
    #[serde(rename = "usersQuery")]
    pub users_query: LdapQuery,
    #[serde(rename = "userNameAttributes")]
    pub user_name_attributes: Vec<String>,
}

/// An LDAP search query: base DN, scope, optional filter, optional
/// page size, and deref policy.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct LdapQuery {
    #[serde(rename = "baseDN")]
    pub base_dn: String,
    pub scope: Option<String>,
    pub filter: Option<String>,
    #[serde(rename = "derefAliases")]
    pub deref_aliases: Option<String>,
    #[serde(rename = "pageSize")]
    pub page_size: Option<u32>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct LdapProviderSpec {
    #[serde(flatten)]
    pub common: CommonProviderSpec,

    pub url: String,

    #[serde(rename = "bindDN")]
    pub bind_dn: Option<String>,

    pub schema: Option<LdapSchema>,

    /// Explicit UID→platform-name overrides, consulted before the
    /// schema's own `GroupNameMapper`.
    #[serde(rename = "groupUIDNameMapping")]
    pub group_uid_name_mapping: Option<std::collections::BTreeMap<String, String>>,

    /// Intersect the group listing with this set of UIDs before fetching.
    pub whitelist: Option<Vec<String>>,

    /// Remove these UIDs from the group listing before fetching.
    pub blacklist: Option<Vec<String>>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq, JsonSchema)]
pub enum KeycloakScope {
    One,
    #[default]
    Sub,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq, JsonSchema)]
pub enum KeycloakSubGroupProcessing {
    #[default]
    Flat,
    Join,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct KeycloakProviderSpec {
    #[serde(flatten)]
    pub common: CommonProviderSpec,

    pub url: String,

    pub realm: String,

    #[serde(rename = "loginRealm")]
    pub login_realm: Option<String>,

    pub scope: Option<KeycloakScope>,

    #[serde(rename = "subGroupProcessing")]
    pub sub_group_processing: Option<KeycloakSubGroupProcessing>,

    #[serde(rename = "subGroupJoinSeparator")]
    pub sub_group_join_separator: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct AzureProviderSpec {
    #[serde(flatten)]
    pub common: CommonProviderSpec,

    #[serde(rename = "tenantID")]
    pub tenant_id: Option<String>,

    pub authority: Option<String>,

    pub filter: Option<String>,

    #[serde(rename = "baseGroups")]
    pub base_groups: Option<Vec<String>>,

    #[serde(rename = "userNameAttributes")]
    pub user_name_attributes: Option<Vec<String>>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct GithubProviderSpec {
    #[serde(flatten)]
    pub common: CommonProviderSpec,

    pub organization: String,

    pub url: Option<String>,

    #[serde(rename = "mapByScimId")]
    pub map_by_scim_id: Option<bool>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq, JsonSchema)]
pub enum GitlabTokenType {
    #[default]
    Oauth,
    Personal,
    Job,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq, JsonSchema)]
pub enum GitlabScope {
    One,
    #[default]
    Sub,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct GitlabProviderSpec {
    #[serde(flatten)]
    pub common: CommonProviderSpec,

    pub url: String,

    #[serde(rename = "tokenType")]
    pub token_type: Option<GitlabTokenType>,

    pub scope: Option<GitlabScope>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct OktaProviderSpec {
    #[serde(flatten)]
    pub common: CommonProviderSpec,

    pub url: String,

    #[serde(rename = "appId")]
    pub app_id: String,

    #[serde(rename = "pageLimit")]
    pub page_limit: Option<u32>,

    #[serde(rename = "profileKey")]
    pub profile_key: Option<String>,

    #[serde(rename = "extractLoginUsername")]
    pub extract_login_username: Option<bool>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
pub struct IsvGroupSpec {
    pub id: String,
    pub name: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct IbmSecurityVerifyProviderSpec {
    #[serde(flatten)]
    pub common: CommonProviderSpec,

    pub url: String,

    pub groups: Vec<IsvGroupSpec>,
}

/// A single entry in [`crate::GroupSyncSpec::providers`]. Structurally a
/// "tagged union over the closed set" of seven provider kinds, encoded
/// (mirroring the upstream CRD) as one optional field per kind rather
/// than as a `serde`-level enum, so the CRD schema stays a flat object.
/// [`ProviderSpec::variant`] validates that exactly one field is set and
/// returns the active variant as a real sum type.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct ProviderSpec {
    /// Unique name for this provider entry within the `GroupSyncSpec`.
    /// Used to build the `sync-provider` ownership label.
    pub name: String,

    pub ldap: Option<LdapProviderSpec>,
    pub keycloak: Option<KeycloakProviderSpec>,
    pub azure: Option<AzureProviderSpec>,
    pub github: Option<GithubProviderSpec>,
    pub gitlab: Option<GitlabProviderSpec>,
    pub okta: Option<OktaProviderSpec>,
    #[serde(rename = "ibmSecurityVerify")]
    pub ibm_security_verify: Option<IbmSecurityVerifyProviderSpec>,
}

/// The validated, active variant of a [`ProviderSpec`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Ldap,
    Keycloak,
    Azure,
    Github,
    Gitlab,
    Okta,
    IbmSecurityVerify,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProviderKind::Ldap => "ldap",
            ProviderKind::Keycloak => "keycloak",
            ProviderKind::Azure => "azure",
            ProviderKind::Github => "github",
            ProviderKind::Gitlab => "gitlab",
            ProviderKind::Okta => "okta",
            ProviderKind::IbmSecurityVerify => "ibmSecurityVerify",
        };
        write!(f, "{}", s)
    }
}

/// Borrowed view of the active variant, returned by [`ProviderSpec::variant`].
pub enum ProviderVariantRef<'a> {
    Ldap(&'a LdapProviderSpec),
    Keycloak(&'a KeycloakProviderSpec),
    Azure(&'a AzureProviderSpec),
    Github(&'a GithubProviderSpec),
    Gitlab(&'a GitlabProviderSpec),
    Okta(&'a OktaProviderSpec),
    IbmSecurityVerify(&'a IbmSecurityVerifyProviderSpec),
}

impl<'a> ProviderVariantRef<'a> {
    pub fn kind(&self) -> ProviderKind {
        match self {
            ProviderVariantRef::Ldap(_) => ProviderKind::Ldap,
            ProviderVariantRef::Keycloak(_) => ProviderKind::Keycloak,
            ProviderVariantRef::Azure(_) => ProviderKind::Azure,
            ProviderVariantRef::Github(_) => ProviderKind::Github,
            ProviderVariantRef::Gitlab(_) => ProviderKind::Gitlab,
            ProviderVariantRef::Okta(_) => ProviderKind::Okta,
            ProviderVariantRef::IbmSecurityVerify(_) => ProviderKind::IbmSecurityVerify,
        }
    }

    pub fn common(&self) -> &'a CommonProviderSpec {
        match self {
            ProviderVariantRef::Ldap(s) => &s.common,
            ProviderVariantRef::Keycloak(s) => &s.common,
            ProviderVariantRef::Azure(s) => &s.common,
            ProviderVariantRef::Github(s) => &s.common,
            ProviderVariantRef::Gitlab(s) => &s.common,
            ProviderVariantRef::Okta(s) => &s.common,
            ProviderVariantRef::IbmSecurityVerify(s) => &s.common,
        }
    }
}

/// Error returned by [`ProviderSpec::variant`] when zero or more than one
/// variant field is set.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ProviderMalformed {
    #[error("provider {0:?} has no variant set (expected exactly one of ldap, keycloak, azure, github, gitlab, okta, ibmSecurityVerify)")]
    NoVariant(String),

    #[error("provider {0:?} has more than one variant set: {1:?}")]
    MultipleVariants(String, Vec<ProviderKind>),
}

impl ProviderSpec {
    /// Determines and returns the single active variant. A missing or
    /// ambiguous variant selection is a `ProviderMalformed` error.
    pub fn variant(&self) -> Result<ProviderVariantRef<'_>, ProviderMalformed> {
        let mut found: Vec<ProviderVariantRef<'_>> = Vec::new();
        if let Some(s) = &self.ldap {
            found.push(ProviderVariantRef::Ldap(s));
        }
        if let Some(s) = &self.keycloak {
            found.push(ProviderVariantRef::Keycloak(s));
        }
        if let Some(s) = &self.azure {
            found.push(ProviderVariantRef::Azure(s));
        }
        if let Some(s) = &self.github {
            found.push(ProviderVariantRef::Github(s));
        }
        if let Some(s) = &self.gitlab {
            found.push(ProviderVariantRef::Gitlab(s));
        }
        if let Some(s) = &self.okta {
            found.push(ProviderVariantRef::Okta(s));
        }
        if let Some(s) = &self.ibm_security_verify {
            found.push(ProviderVariantRef::IbmSecurityVerify(s));
        }
        match found.len() {
            0 => Err(ProviderMalformed::NoVariant(self.name.clone())),
            1 => Ok(found.into_iter().next().unwrap()),
            _ => Err(ProviderMalformed::MultipleVariants(
                self.name.clone(),
                found.iter().map(|v| v.kind()).collect(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> ProviderSpec {
        ProviderSpec {
            name: "p".to_owned(),
            ..Default::default()
        }
    }

    #[test]
    fn no_variant_is_malformed() {
        assert_eq!(
            base().variant().unwrap_err(),
            ProviderMalformed::NoVariant("p".to_owned())
        );
    }

    #[test]
    fn exactly_one_variant_is_ok() {
        let mut p = base();
        p.okta = Some(OktaProviderSpec {
            url: "https://example.okta.com".to_owned(),
            app_id: "app".to_owned(),
            ..Default::default()
        });
        assert_eq!(p.variant().unwrap().kind(), ProviderKind::Okta);
    }

    #[test]
    fn multiple_variants_is_malformed() {
        let mut p = base();
        p.okta = Some(OktaProviderSpec {
            url: "https://example.okta.com".to_owned(),
            app_id: "app".to_owned(),
            ..Default::default()
        });
        p.github = Some(GithubProviderSpec {
            organization: "org".to_owned(),
            ..Default::default()
        });
        match p.variant().unwrap_err() {
            ProviderMalformed::MultipleVariants(name, kinds) => {
                assert_eq!(name, "p");
                assert_eq!(kinds.len(), 2);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }
}
