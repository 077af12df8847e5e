//! Port topology: groups site descriptors by listening port.
//!
//! # Responsibilities
//! - Normalize ports and reject invalid ones
//! - Reject two descriptors sharing a `(port, host)` pair
//! - Order each group specific hosts first, wildcard last
//! - Reject ports mixing TLS and plaintext descriptors
//!
//! # Design Decisions
//! - Every group is validated before the result is returned, so a single bad
//!   port fails startup before any listener binds
//! - Groups are returned in ascending port order for deterministic startup

use std::collections::{BTreeMap, HashSet};

use crate::config::schema::{SiteDescriptor, TlsConfig};
use crate::config::validation::{normalize_port, ValidationError};

/// All site descriptors sharing one listening port.
#[derive(Debug, Clone)]
pub struct PortGroup {
    pub port: u16,
    /// Specific hosts first, then the wildcard (if any).
    pub sites: Vec<SiteDescriptor>,
}

impl PortGroup {
    /// TLS material for this port. Uniform across the group once validated,
    /// so the first descriptor's block is used.
    pub fn tls(&self) -> Option<&TlsConfig> {
        self.sites.first().and_then(|s| s.ssl.as_ref())
    }

    pub fn is_tls(&self) -> bool {
        self.tls().is_some()
    }

    /// True if any descriptor on this port enables hot reload.
    pub fn hot_reload_enabled(&self) -> bool {
        self.sites.iter().any(|s| s.hot_reload)
    }
}

/// Validate descriptors and group them by port.
pub fn build(
    sites: Vec<SiteDescriptor>,
    env_port: Option<&str>,
) -> Result<Vec<PortGroup>, ValidationError> {
    let mut seen: HashSet<(u16, String)> = HashSet::new();
    let mut by_port: BTreeMap<u16, Vec<SiteDescriptor>> = BTreeMap::new();

    for site in sites {
        let port = normalize_port(&site, env_port)?;
        if !seen.insert((port, site.host_key())) {
            return Err(ValidationError::DuplicateHost {
                host: site.display_host().to_string(),
                port,
            });
        }
        by_port.entry(port).or_default().push(site);
    }

    let groups: Vec<PortGroup> = by_port
        .into_iter()
        .map(|(port, sites)| {
            let (mut specific, wildcard): (Vec<_>, Vec<_>) =
                sites.into_iter().partition(|s| !s.is_wildcard());
            specific.extend(wildcard);
            PortGroup { port, sites: specific }
        })
        .collect();

    for group in &groups {
        let with_tls = group.sites.iter().filter(|s| s.ssl.is_some()).count();
        if with_tls != 0 && with_tls != group.sites.len() {
            return Err(ValidationError::MixedTls { port: group.port });
        }
    }

    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn site(host: Option<&str>, port: i64) -> SiteDescriptor {
        SiteDescriptor {
            host: host.map(str::to_string),
            port: Some(port),
            ..Default::default()
        }
    }

    fn tls() -> TlsConfig {
        TlsConfig {
            key: PathBuf::from("key.pem"),
            cert: PathBuf::from("cert.pem"),
            ca: None,
        }
    }

    #[test]
    fn wildcard_sorted_last() {
        let groups = build(vec![site(Some("*"), 80), site(Some("a.com"), 80)], None).unwrap();
        assert_eq!(groups.len(), 1);
        let hosts: Vec<_> = groups[0].sites.iter().map(|s| s.display_host()).collect();
        assert_eq!(hosts, vec!["a.com", "*"]);
    }

    #[test]
    fn specific_hosts_keep_relative_order() {
        let groups = build(
            vec![
                site(None, 80),
                site(Some("b.com"), 80),
                site(Some("a.com"), 80),
            ],
            None,
        )
        .unwrap();
        let hosts: Vec<_> = groups[0].sites.iter().map(|s| s.display_host()).collect();
        assert_eq!(hosts, vec!["b.com", "a.com", "*"]);
    }

    #[test]
    fn groups_by_port() {
        let groups = build(
            vec![site(Some("a.com"), 9000), site(Some("a.com"), 8000), site(None, 9000)],
            None,
        )
        .unwrap();
        let ports: Vec<_> = groups.iter().map(|g| g.port).collect();
        assert_eq!(ports, vec![8000, 9000]);
        assert_eq!(groups[1].sites.len(), 2);
    }

    #[test]
    fn duplicate_host_rejected() {
        let err = build(vec![site(Some("a.com"), 80), site(Some("A.com"), 80)], None).unwrap_err();
        assert_eq!(
            err,
            ValidationError::DuplicateHost {
                host: "A.com".into(),
                port: 80
            }
        );
    }

    #[test]
    fn two_hostless_sites_rejected() {
        let a = SiteDescriptor::default();
        let b = SiteDescriptor::default();
        let err = build(vec![a, b], None).unwrap_err();
        assert!(matches!(err, ValidationError::DuplicateHost { port: 8080, .. }));
    }

    #[test]
    fn hostless_and_star_collide() {
        let err = build(vec![site(None, 80), site(Some("*"), 80)], None).unwrap_err();
        assert!(matches!(err, ValidationError::DuplicateHost { .. }));
    }

    #[test]
    fn mixed_tls_rejected() {
        let mut secure = site(Some("a.com"), 443);
        secure.ssl = Some(tls());
        let plain = site(Some("b.com"), 443);

        let err = build(vec![secure, plain], None).unwrap_err();
        assert_eq!(err, ValidationError::MixedTls { port: 443 });
    }

    #[test]
    fn uniform_tls_accepted() {
        let mut a = site(Some("a.com"), 443);
        a.ssl = Some(tls());
        let mut b = site(None, 443);
        b.ssl = Some(tls());

        let groups = build(vec![a, b, site(None, 80)], None).unwrap();
        assert!(!groups[0].is_tls());
        assert!(groups[1].is_tls());
    }

    #[test]
    fn env_port_applies_to_portless_sites() {
        let groups = build(vec![SiteDescriptor::default()], Some("7000")).unwrap();
        assert_eq!(groups[0].port, 7000);
    }

    #[test]
    fn invalid_port_fails_whole_build() {
        let err = build(vec![site(None, 80), site(Some("a.com"), 70_000)], None).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidPort { .. }));
    }
}
