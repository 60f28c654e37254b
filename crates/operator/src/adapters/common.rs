//! Rules shared by every adapter.

use group_sync_types::RemoteGroup;
use std::collections::HashSet;

/// Applies the `allowedGroups` allow-list: an empty/absent set means "all
/// groups", matching `CommonProviderSpec::allowed_groups_set`.
pub fn filter_allowed(groups: Vec<RemoteGroup>, allowed: Option<HashSet<&str>>) -> Vec<RemoteGroup> {
    match allowed {
        None => groups,
        Some(names) => groups
            .into_iter()
            .filter(|g| names.contains(g.name.as_str()))
            .collect(),
    }
}

/// A DNS-1035 label: `[a-z]([-a-z0-9]*[a-z0-9])?`, max 63 characters.
/// Mirrors the platform's own admission rule for object names, consulted
/// when `excludeInvalidGroupNames` is set.
pub fn is_dns1035_label(name: &str) -> bool {
    if name.is_empty() || name.len() > 63 {
        return false;
    }
    let bytes = name.as_bytes();
    let first_ok = bytes[0].is_ascii_lowercase();
    let last_ok = {
        let last = bytes[bytes.len() - 1];
        last.is_ascii_lowercase() || last.is_ascii_digit()
    };
    let middle_ok = bytes
        .iter()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-');
    first_ok && last_ok && middle_ok
}

/// Extracts the host component of a URL for the `sync.source.host`
/// annotation every adapter must stamp.
pub fn url_host(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_owned))
        .unwrap_or_else(|| url.to_owned())
}

/// Builds the `reqwest::Client` shared by every HTTP-based adapter.
/// `insecure` disables verification entirely (and is mutually exclusive
/// with `ca`, enforced at validation time); otherwise a supplied CA is
/// added on top of the system roots.
pub fn build_http_client(insecure: bool, ca_pem: Option<&[u8]>) -> reqwest::Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder().danger_accept_invalid_certs(insecure);
    if let Some(pem) = ca_pem {
        if let Ok(cert) = reqwest::Certificate::from_pem(pem) {
            builder = builder.add_root_certificate(cert);
        }
    }
    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dns1035_accepts_simple_label() {
        assert!(is_dns1035_label("engineering"));
        assert!(is_dns1035_label("team-42"));
    }

    #[test]
    fn dns1035_rejects_uppercase_and_leading_digit() {
        assert!(!is_dns1035_label("Engineering"));
        assert!(!is_dns1035_label("1team"));
        assert!(!is_dns1035_label(""));
        assert!(!is_dns1035_label("trailing-"));
    }

    #[test]
    fn filter_allowed_passes_through_when_absent() {
        let groups = vec![RemoteGroup::new("a", "1", "h"), RemoteGroup::new("b", "2", "h")];
        assert_eq!(filter_allowed(groups.clone(), None).len(), 2);
        let allowed: HashSet<&str> = ["a"].into_iter().collect();
        assert_eq!(filter_allowed(groups, Some(allowed)).len(), 1);
    }
}
