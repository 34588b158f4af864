use anyhow::{anyhow, Result};
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use tracing::{debug, warn};
use trust_dns_resolver::system_conf::read_system_conf;
use trust_dns_resolver::TokioAsyncResolver as AsyncResolver;

/// Name lookups needed to derive a search base from a server address
///
/// Both lookups report failure as `None`; callers never see resolver errors.
#[allow(async_fn_in_trait)]
pub trait NameResolver {
    /// Reverse lookup of an IPv4 address to a host name
    async fn reverse(&self, ip: Ipv4Addr) -> Option<String>;

    /// Qualifies a short host name into a fully qualified domain name
    async fn qualify(&self, host: &str) -> Option<String>;
}

pub struct DnsResolver {
    resolver: AsyncResolver,
}

impl DnsResolver {
    pub fn new() -> Result<Self> {
        // System configuration carries the search domains needed to qualify short names
        let (config, mut opts) =
            read_system_conf().map_err(|e| anyhow!("Failed to read resolver configuration: {}", e))?;
        opts.timeout = Duration::from_secs(5);
        opts.attempts = 2;

        Ok(Self {
            resolver: AsyncResolver::tokio(config, opts),
        })
    }

    async fn reverse_ip(&self, ip: IpAddr) -> Option<String> {
        match self.resolver.reverse_lookup(ip).await {
            Ok(lookup) => lookup
                .iter()
                .map(|ptr| ptr.to_string().trim_end_matches('.').to_string())
                .find(|name| !name.is_empty()),
            Err(e) => {
                debug!("Reverse lookup failed for {}: {}", ip, e);
                None
            }
        }
    }
}

impl NameResolver for DnsResolver {
    async fn reverse(&self, ip: Ipv4Addr) -> Option<String> {
        self.reverse_ip(IpAddr::V4(ip)).await
    }

    async fn qualify(&self, host: &str) -> Option<String> {
        let lookup = match self.resolver.lookup_ip(host).await {
            Ok(lookup) => lookup,
            Err(e) => {
                debug!("Forward lookup failed for {}: {}", host, e);
                return None;
            }
        };

        // Prefer the canonical name behind the address, fall back to the
        // name the search list actually resolved
        if let Some(ip) = lookup.iter().next() {
            if let Some(name) = self.reverse_ip(ip).await {
                return Some(name);
            }
        }

        let queried = lookup.query().name().to_string();
        let queried = queried.trim_end_matches('.');
        (!queried.is_empty()).then(|| queried.to_string())
    }
}

/// Four dot-separated groups of one to three digits
fn is_dotted_quad(address: &str) -> bool {
    let octets: Vec<&str> = address.split('.').collect();
    octets.len() == 4
        && octets
            .iter()
            .all(|o| (1..=3).contains(&o.len()) && o.chars().all(|c| c.is_ascii_digit()))
}

/// Derives an LDAP search base (`dc=corp,dc=example,dc=com`) from a server address
///
/// A dotted-quad address is first reverse resolved. A name with fewer than
/// two dots is then qualified through the resolver. The first label of the
/// resulting FQDN (the host itself) is dropped and the remaining labels
/// become `dc=` components.
///
/// # Returns
/// * `Option<String>` - The derived base, or `None` when any lookup fails or
///   the name has no domain part. Callers must then ask for an explicit base.
///
/// # Examples
/// ```
/// use ldapper::dns::base_dn_from_fqdn;
///
/// assert_eq!(
///     base_dn_from_fqdn("dc1.corp.example.com").as_deref(),
///     Some("dc=corp,dc=example,dc=com")
/// );
/// ```
pub async fn derive_base_dn<R: NameResolver + ?Sized>(resolver: &R, address: &str) -> Option<String> {
    let address = address.trim();
    debug!("Deriving base DN from server address {}", address);

    let mut host = if is_dotted_quad(address) {
        let Ok(ip) = address.parse::<Ipv4Addr>() else {
            warn!("{} looks like an IPv4 address but is not one", address);
            return None;
        };
        resolver.reverse(ip).await?
    } else {
        address.to_string()
    };

    if host.is_empty() {
        return None;
    }

    if host.matches('.').count() < 2 {
        host = resolver.qualify(&host).await?;
    }

    let base = base_dn_from_fqdn(&host);
    debug!("Derived base DN {:?} from host {}", base, host);
    base
}

/// Turns a host FQDN into the `dc=` base of its domain
pub fn base_dn_from_fqdn(fqdn: &str) -> Option<String> {
    let labels: Vec<&str> = fqdn.trim_end_matches('.').split('.').skip(1).collect();

    if labels.is_empty() || labels.iter().any(|label| label.is_empty()) {
        return None;
    }

    Some(format!("dc={}", labels.join(",dc=")))
}
