//! Hostname resolution.
//!
//! A member's hostname is either a literal from configuration or derived
//! from its IP address in the `ip-10-1-2-3` style. Derived names are
//! expanded once per configured prefix (`ip`, `api`, ...) so one member
//! can be reachable under several service labels that all point at the
//! same address.

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::error::ReconcileError;
use crate::types::Member;

/// Reserved configuration token selecting private-IP-derived hostnames.
pub const PRIVATE_NAME_TOKEN: &str = "_PrivateDnsName_";

/// Reserved configuration token selecting public-IP-derived hostnames.
pub const PUBLIC_NAME_TOKEN: &str = "_PublicDnsName_";

/// How hostnames are produced for a member, resolved once from the
/// configured hostname string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HostnameSource {
    /// A fixed hostname shared by the whole fleet (e.g. `update-dns-test`).
    Literal(String),
    /// Derive from the member's display name, or its private IP when no
    /// display name is set.
    DerivedPrivate,
    /// Derive from the member's public IP.
    DerivedPublic,
}

impl HostnameSource {
    /// Parse a configured hostname string. Anything that is not one of
    /// the two reserved tokens is a literal.
    pub fn parse(raw: &str) -> Self {
        match raw {
            PRIVATE_NAME_TOKEN => HostnameSource::DerivedPrivate,
            PUBLIC_NAME_TOKEN => HostnameSource::DerivedPublic,
            other => HostnameSource::Literal(other.to_string()),
        }
    }
}

/// `10.1.2.3` -> `10-1-2-3`.
fn dashed(ip: Ipv4Addr) -> String {
    ip.to_string().replace('.', "-")
}

/// Check one DNS label: 1-63 chars, lowercase letters, digits and
/// hyphens, no leading or trailing hyphen.
pub fn is_valid_label(label: &str) -> bool {
    if label.is_empty() || label.len() > 63 {
        return false;
    }
    if label.starts_with('-') || label.ends_with('-') {
        return false;
    }
    label
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Resolve the hostname set for one member and one transition.
///
/// `effective_ip` is the address the caller settled on for this event:
/// the live address on join, possibly a tag-cached one on leave. It is
/// only consulted for IP-derived names.
///
/// Duplicate prefixes were rejected at configuration time and are not
/// re-validated here.
pub fn resolve(
    member: &Member,
    source: &HostnameSource,
    prefixes: &[String],
    effective_ip: Option<Ipv4Addr>,
) -> Result<Vec<String>, ReconcileError> {
    match source {
        HostnameSource::Literal(name) => Ok(vec![name.clone()]),
        HostnameSource::DerivedPrivate => {
            if let Some(name) = &member.display_name {
                // A display name wins over the IP form; prefixes only
                // apply to IP-derived labels. Unlike config literals it
                // comes from the directory, so the grammar is checked
                // here rather than at load time.
                if !is_valid_label(name) {
                    return Err(ReconcileError::Resolution {
                        member_id: member.id.clone(),
                        reason: format!("display name {:?} is not a valid DNS label", name),
                    });
                }
                return Ok(vec![name.clone()]);
            }
            let ip = effective_ip.ok_or_else(|| ReconcileError::Resolution {
                member_id: member.id.clone(),
                reason: "no private IP available to derive a hostname".into(),
            })?;
            Ok(expand_prefixes(ip, prefixes))
        }
        HostnameSource::DerivedPublic => {
            let ip = effective_ip.ok_or_else(|| ReconcileError::Resolution {
                member_id: member.id.clone(),
                reason: "no public IP available to derive a hostname".into(),
            })?;
            Ok(expand_prefixes(ip, prefixes))
        }
    }
}

fn expand_prefixes(ip: Ipv4Addr, prefixes: &[String]) -> Vec<String> {
    prefixes
        .iter()
        .map(|prefix| format!("{}-{}", prefix, dashed(ip)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(display_name: Option<&str>) -> Member {
        Member {
            id: "i-1".into(),
            display_name: display_name.map(String::from),
            ..Default::default()
        }
    }

    fn ip(s: &str) -> Ipv4Addr {
        s.parse().unwrap()
    }

    #[test]
    fn literal_ignores_prefixes() {
        let names = resolve(
            &member(None),
            &HostnameSource::Literal("db".into()),
            &["ip".into(), "api".into()],
            Some(ip("10.1.2.3")),
        )
        .unwrap();
        assert_eq!(names, vec!["db"]);
    }

    #[test]
    fn private_derived_uses_dashed_ip() {
        let names = resolve(
            &member(None),
            &HostnameSource::DerivedPrivate,
            &["ip".into()],
            Some(ip("10.1.2.3")),
        )
        .unwrap();
        assert_eq!(names, vec!["ip-10-1-2-3"]);
    }

    #[test]
    fn display_name_wins_over_prefixes() {
        let names = resolve(
            &member(Some("web-1")),
            &HostnameSource::DerivedPrivate,
            &["ip".into(), "api".into()],
            Some(ip("10.1.2.3")),
        )
        .unwrap();
        assert_eq!(names, vec!["web-1"]);
    }

    #[test]
    fn invalid_display_name_is_resolution_error() {
        for name in ["Bad_Name", "web 1", "-web", "Upper"] {
            let err = resolve(
                &member(Some(name)),
                &HostnameSource::DerivedPrivate,
                &["ip".into()],
                Some(ip("10.1.2.3")),
            )
            .unwrap_err();
            assert!(!err.is_retryable(), "{} should be terminal", name);
            assert!(err.to_string().contains("display name"));
        }
    }

    #[test]
    fn one_hostname_per_prefix() {
        let names = resolve(
            &member(None),
            &HostnameSource::DerivedPublic,
            &["ip".into(), "api".into(), "web".into()],
            Some(ip("80.90.1.1")),
        )
        .unwrap();
        assert_eq!(names, vec!["ip-80-90-1-1", "api-80-90-1-1", "web-80-90-1-1"]);
    }

    #[test]
    fn missing_public_ip_is_resolution_error() {
        let err = resolve(
            &member(None),
            &HostnameSource::DerivedPublic,
            &["ip".into()],
            None,
        )
        .unwrap_err();
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("public IP"));
    }

    #[test]
    fn reserved_tokens_parse_to_variants() {
        assert_eq!(
            HostnameSource::parse("_PrivateDnsName_"),
            HostnameSource::DerivedPrivate
        );
        assert_eq!(
            HostnameSource::parse("_PublicDnsName_"),
            HostnameSource::DerivedPublic
        );
        assert_eq!(
            HostnameSource::parse("update-dns-test"),
            HostnameSource::Literal("update-dns-test".into())
        );
    }

    #[test]
    fn label_grammar() {
        assert!(is_valid_label("ip-10-1-2-3"));
        assert!(is_valid_label("a"));
        assert!(!is_valid_label(""));
        assert!(!is_valid_label("-leading"));
        assert!(!is_valid_label("trailing-"));
        assert!(!is_valid_label("Upper"));
        assert!(!is_valid_label("dot.ted"));
        assert!(!is_valid_label(&"x".repeat(64)));
        assert!(is_valid_label(&"x".repeat(63)));
    }
}
