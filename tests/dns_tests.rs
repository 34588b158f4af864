use anyhow::Result;
use ldapper::dns::{base_dn_from_fqdn, derive_base_dn, DnsResolver, NameResolver};
use std::cell::RefCell;
use std::collections::HashMap;
use std::net::Ipv4Addr;

/// In-memory resolver that records every lookup it is asked for
#[derive(Default)]
struct MockResolver {
    ptr: HashMap<Ipv4Addr, String>,
    fqdn: HashMap<String, String>,
    lookups: RefCell<Vec<String>>,
}

impl MockResolver {
    fn with_ptr(mut self, ip: [u8; 4], name: &str) -> Self {
        self.ptr.insert(Ipv4Addr::from(ip), name.to_string());
        self
    }

    fn with_fqdn(mut self, host: &str, fqdn: &str) -> Self {
        self.fqdn.insert(host.to_string(), fqdn.to_string());
        self
    }
}

impl NameResolver for MockResolver {
    async fn reverse(&self, ip: Ipv4Addr) -> Option<String> {
        self.lookups.borrow_mut().push(format!("reverse {}", ip));
        self.ptr.get(&ip).cloned()
    }

    async fn qualify(&self, host: &str) -> Option<String> {
        self.lookups.borrow_mut().push(format!("qualify {}", host));
        self.fqdn.get(host).cloned()
    }
}

#[tokio::test]
async fn test_fqdn_used_directly() {
    let resolver = MockResolver::default();

    let base = derive_base_dn(&resolver, "dc1.corp.example.com").await;
    assert_eq!(base.as_deref(), Some("dc=corp,dc=example,dc=com"));
    assert!(resolver.lookups.borrow().is_empty());
}

#[tokio::test]
async fn test_ip_reverse_resolved() {
    let resolver = MockResolver::default().with_ptr([10, 0, 0, 5], "dc1.corp.example.com");

    let base = derive_base_dn(&resolver, "10.0.0.5").await;
    assert_eq!(base.as_deref(), Some("dc=corp,dc=example,dc=com"));
    assert_eq!(*resolver.lookups.borrow(), vec!["reverse 10.0.0.5".to_string()]);
}

#[tokio::test]
async fn test_short_reverse_name_is_qualified() {
    let resolver = MockResolver::default()
        .with_ptr([10, 0, 0, 5], "dc1")
        .with_fqdn("dc1", "dc1.corp.local");

    let base = derive_base_dn(&resolver, "10.0.0.5").await;
    assert_eq!(base.as_deref(), Some("dc=corp,dc=local"));
    assert_eq!(resolver.lookups.borrow().len(), 2);
}

#[tokio::test]
async fn test_short_host_name_is_qualified() {
    let resolver = MockResolver::default().with_fqdn("dc1.corp", "dc1.corp.example.com");

    let base = derive_base_dn(&resolver, " dc1.corp ").await;
    assert_eq!(base.as_deref(), Some("dc=corp,dc=example,dc=com"));
}

#[tokio::test]
async fn test_missing_reverse_record_yields_none() {
    let resolver = MockResolver::default();
    assert_eq!(derive_base_dn(&resolver, "192.168.1.1").await, None);
}

#[tokio::test]
async fn test_failed_qualification_yields_none() {
    let resolver = MockResolver::default();
    assert_eq!(derive_base_dn(&resolver, "dc1").await, None);
}

#[tokio::test]
async fn test_out_of_range_octets_yield_none() {
    let resolver = MockResolver::default();
    assert_eq!(derive_base_dn(&resolver, "300.1.1.1").await, None);
    assert!(resolver.lookups.borrow().is_empty());
}

#[tokio::test]
async fn test_qualified_name_without_domain_yields_none() {
    let resolver = MockResolver::default().with_fqdn("dc1", "dc1");
    assert_eq!(derive_base_dn(&resolver, "dc1").await, None);
}

#[test]
fn test_base_dn_from_fqdn() {
    assert_eq!(
        base_dn_from_fqdn("dc1.corp.example.com.").as_deref(),
        Some("dc=corp,dc=example,dc=com")
    );
    assert_eq!(base_dn_from_fqdn("dc1.corp").as_deref(), Some("dc=corp"));
    assert_eq!(base_dn_from_fqdn("dc1"), None);
    assert_eq!(base_dn_from_fqdn("dc1..com"), None);
}

#[tokio::test]
async fn test_dns_resolver_creation() -> Result<()> {
    // Only checks that system configuration can be read, no lookups are made
    if std::path::Path::new("/etc/resolv.conf").exists() {
        let _resolver = DnsResolver::new()?;
    }
    Ok(())
}
