//! Directory search capability
//!
//! The paged search driver talks to the directory only through the
//! [`Directory`] trait. [`LdapDirectory`] is the `ldap3` implementation: it
//! connects over LDAPS, STARTTLS or plaintext, binds, and issues subtree
//! searches carrying the Simple Paged Results control
//! (OID 1.2.840.113556.1.4.319).

use base64::{engine::general_purpose::STANDARD, Engine as _};
use ldap3::controls::{ControlParser, PagedResults};
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, LdapError, Scope, SearchEntry, SearchResult};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::SessionError;

/// Simple Paged Results control OID
pub const PAGED_RESULTS_OID: &str = "1.2.840.113556.1.4.319";

/// Request every user attribute and every operational attribute
const ALL_ATTRIBUTES: [&str; 2] = ["*", "+"];

/// Attribute name to values, as returned by the server
pub type AttributeMap = BTreeMap<String, Vec<String>>;

/// One directory entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
    pub dn: String,
    pub attributes: AttributeMap,
}

impl Record {
    pub fn new(dn: &str) -> Self {
        Self {
            dn: dn.to_string(),
            attributes: AttributeMap::new(),
        }
    }

    pub fn with_attribute(mut self, name: &str, values: &[&str]) -> Self {
        self.attributes
            .insert(name.to_string(), values.iter().map(|v| v.to_string()).collect());
        self
    }
}

/// One page pulled from the directory
///
/// An empty `cursor` means the server has no further pages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageResult {
    pub cursor: Vec<u8>,
    pub records: Vec<Record>,
}

/// Parameters of a single page fetch
#[derive(Debug, Clone, Copy)]
pub struct PageRequest<'a> {
    pub base: &'a str,
    pub filter: &'a str,
    pub page_size: u32,
    /// Empty on the first fetch of a session
    pub cursor: &'a [u8],
}

/// A bound directory connection able to run paged subtree searches
#[allow(async_fn_in_trait)]
pub trait Directory {
    /// Fetches up to `request.page_size` records, resuming from `request.cursor`
    async fn search_page(&mut self, request: &PageRequest<'_>) -> Result<PageResult, SessionError>;

    /// Unbinds and releases the connection
    async fn close(&mut self);
}

/// Transport security for the directory connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encryption {
    /// Port 389, no TLS
    Plain,
    /// Port 389, STARTTLS attempted with plaintext fallback
    StartTls,
    /// Port 636, TLS from the first byte
    Ldaps,
}

impl Encryption {
    pub fn port(self) -> u16 {
        match self {
            Encryption::Ldaps => 636,
            Encryption::Plain | Encryption::StartTls => 389,
        }
    }

    fn scheme(self) -> &'static str {
        match self {
            Encryption::Ldaps => "ldaps",
            Encryption::Plain | Encryption::StartTls => "ldap",
        }
    }
}

impl TryFrom<u8> for Encryption {
    type Error = String;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        match level {
            1 => Ok(Encryption::Plain),
            2 => Ok(Encryption::StartTls),
            3 => Ok(Encryption::Ldaps),
            other => Err(format!("unknown encryption level {}", other)),
        }
    }
}

/// Everything needed to open and bind a directory session
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Servers tried in order until one accepts a connection
    pub servers: Vec<String>,
    pub encryption: Encryption,
    /// Bind name, usually `DOMAIN\user`
    pub bind_user: String,
    pub password: String,
    pub timeout: Duration,
}

/// `ldap3`-backed directory session
pub struct LdapDirectory {
    ldap: Ldap,
    server: String,
}

impl LdapDirectory {
    /// Connects to the first reachable server and binds
    ///
    /// A failed STARTTLS negotiation is logged and the same server is
    /// retried in plaintext. A bind failure ends the attempt immediately.
    pub async fn connect(options: &ConnectOptions) -> Result<Self, SessionError> {
        let mut last_error = SessionError::Connect {
            server: String::new(),
            message: "no servers configured".to_string(),
        };

        for server in &options.servers {
            match Self::open(server, options).await {
                Ok(mut ldap) => {
                    bind(&mut ldap, &options.bind_user, &options.password).await?;
                    info!("Bound to {} as {}", server, options.bind_user);
                    return Ok(Self {
                        ldap,
                        server: server.clone(),
                    });
                }
                Err(e) => {
                    warn!("{}", e);
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }

    async fn open(server: &str, options: &ConnectOptions) -> Result<Ldap, SessionError> {
        let encryption = options.encryption;
        let url = format!("{}://{}:{}", encryption.scheme(), server, encryption.port());

        let settings = LdapConnSettings::new()
            .set_conn_timeout(options.timeout)
            .set_no_tls_verify(true)
            .set_starttls(encryption == Encryption::StartTls);

        debug!("Connecting to {}", url);
        match LdapConnAsync::with_settings(settings, &url).await {
            Ok((conn, ldap)) => {
                spawn_driver(conn);
                Ok(ldap)
            }
            Err(e) if encryption == Encryption::StartTls => {
                warn!("NOTICE: Unable to use STARTTLS with {} ({}), falling back to plaintext", server, e);
                let settings = LdapConnSettings::new()
                    .set_conn_timeout(options.timeout)
                    .set_no_tls_verify(true);
                let (conn, ldap) = LdapConnAsync::with_settings(settings, &url)
                    .await
                    .map_err(|e| connect_error(server, e))?;
                spawn_driver(conn);
                Ok(ldap)
            }
            Err(e) => Err(connect_error(server, e)),
        }
    }

    pub fn server(&self) -> &str {
        &self.server
    }
}

impl Directory for LdapDirectory {
    async fn search_page(&mut self, request: &PageRequest<'_>) -> Result<PageResult, SessionError> {
        let control = PagedResults {
            size: i32::try_from(request.page_size).unwrap_or(i32::MAX),
            cookie: request.cursor.to_vec(),
        };

        let SearchResult(entries, result) = self
            .ldap
            .with_controls(control)
            .search(request.base, Scope::Subtree, request.filter, ALL_ATTRIBUTES.to_vec())
            .await
            .map_err(|e| SessionError::Search(e.to_string()))?;

        // rc=4 (sizeLimitExceeded) still carries a usable page
        if result.rc != 0 && result.rc != 4 {
            return Err(SessionError::Rejected {
                rc: result.rc,
                text: result.text,
            });
        }

        let cursor = result
            .ctrls
            .iter()
            .find(|ctrl| ctrl.1.ctype == PAGED_RESULTS_OID)
            .and_then(|ctrl| ctrl.1.val.as_deref())
            .map(|val| PagedResults::parse(val).cookie)
            .unwrap_or_default();

        let records = entries
            .into_iter()
            .filter(|entry| !entry.is_ref() && !entry.is_intermediate())
            .map(|entry| record_from_entry(SearchEntry::construct(entry)))
            .collect();

        Ok(PageResult { cursor, records })
    }

    async fn close(&mut self) {
        if let Err(e) = self.ldap.unbind().await {
            debug!("Unbind from {} failed: {}", self.server, e);
        }
    }
}

async fn bind(ldap: &mut Ldap, user: &str, password: &str) -> Result<(), SessionError> {
    let bind_error = |message: String| SessionError::Bind {
        user: user.to_string(),
        message,
    };

    ldap.simple_bind(user, password)
        .await
        .map_err(|e| bind_error(e.to_string()))?
        .success()
        .map_err(|e| bind_error(e.to_string()))?;
    Ok(())
}

/// Runs the connection's I/O loop for the lifetime of the session
fn spawn_driver(conn: LdapConnAsync) {
    tokio::spawn(async move {
        if let Err(e) = conn.drive().await {
            debug!("LDAP connection closed with error: {}", e);
        }
    });
}

fn connect_error(server: &str, err: LdapError) -> SessionError {
    SessionError::Connect {
        server: server.to_string(),
        message: err.to_string(),
    }
}

/// Flattens a search entry, base64-encoding binary values
fn record_from_entry(entry: SearchEntry) -> Record {
    let mut attributes: AttributeMap = entry.attrs.into_iter().collect();

    for (name, values) in entry.bin_attrs {
        attributes
            .entry(name)
            .or_default()
            .extend(values.iter().map(|v| STANDARD.encode(v)));
    }

    Record {
        dn: entry.dn,
        attributes,
    }
}
