//! Paged search driver
//!
//! Runs one filter against a [`Directory`] page by page:
//! - clamps the page size and shrinks it as the record cap approaches
//! - projects each record onto the requested attributes
//! - stops at the record cap, on an empty cursor, or when the server starts
//!   replaying results from the beginning
//! - sleeps between pages when throttling is configured
//!
//! Active Directory has been seen to keep handing out non-empty paging
//! cookies after the last page and restart the result set. The driver
//! remembers the first DN it emitted and ends the session when that DN
//! comes back.

use std::collections::HashSet;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::catalog::IDENTIFYING_ATTRIBUTE;
use crate::directory::{Directory, PageRequest, Record};
use crate::error::SessionError;
use crate::rate_limit::PageThrottle;

/// Informational events surfaced to the operator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// The record cap was hit, more results may exist
    CapReached { limit: u32 },
    /// The search matched nothing
    ZeroResults,
    /// The session failed, payload is the rendered error
    SessionError(String),
}

/// Destination for emitted records and notices
pub trait RecordSink {
    fn record(&mut self, record: &Record) -> std::io::Result<()>;

    fn notice(&mut self, notice: &Notice);
}

/// Paging limits for a search session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOptions {
    pub page_size: u32,
    /// 0 means unlimited
    pub max_records: u32,
    pub delay_ms: u64,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            page_size: 10,
            max_records: 100,
            delay_ms: 0,
        }
    }
}

/// Case-insensitive attribute selection
///
/// An empty projection keeps every attribute. A non-empty one always keeps
/// the identifying attribute as well.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Projection {
    names: HashSet<String>,
}

impl Projection {
    pub fn new<S: AsRef<str>>(attributes: &[S]) -> Self {
        let mut names: HashSet<String> = attributes
            .iter()
            .map(|a| a.as_ref().to_lowercase())
            .filter(|a| !a.is_empty())
            .collect();

        if !names.is_empty() {
            names.insert(IDENTIFYING_ATTRIBUTE.to_string());
        }
        Self { names }
    }

    pub fn is_all(&self) -> bool {
        self.names.is_empty()
    }

    /// Drops unselected attributes, keeping the server's spelling of names
    pub fn apply(&self, mut record: Record) -> Record {
        if !self.is_all() {
            record
                .attributes
                .retain(|name, _| self.names.contains(&name.to_lowercase()));
        }
        record
    }
}

/// What a search should run
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub base: String,
    pub filter: String,
    pub projection: Projection,
}

/// Outcome of a completed session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchSummary {
    pub records: usize,
    pub pages: usize,
    pub cap_reached: bool,
    pub loop_detected: bool,
}

/// State of one search invocation
struct SearchSession {
    cursor: Vec<u8>,
    page_size: u32,
    max_records: u32,
    count: usize,
    pages: usize,
    first_dn: Option<String>,
    cap_reached: bool,
    loop_detected: bool,
}

impl SearchSession {
    fn new(options: &SearchOptions) -> Self {
        let mut page_size = options.page_size.max(1);
        if options.max_records > 0 {
            page_size = page_size.min(options.max_records);
        }

        Self {
            cursor: Vec::new(),
            page_size,
            max_records: options.max_records,
            count: 0,
            pages: 0,
            first_dn: None,
            cap_reached: false,
            loop_detected: false,
        }
    }

    /// Returns `false` when `dn` is the first record coming around again
    fn admit(&mut self, dn: &str) -> bool {
        match &self.first_dn {
            None => {
                self.first_dn = Some(dn.to_string());
                true
            }
            Some(first) if first == dn => {
                self.loop_detected = true;
                false
            }
            Some(_) => true,
        }
    }

    fn at_cap(&self) -> bool {
        self.max_records > 0 && self.count >= self.max_records as usize
    }

    /// Shrinks the page size toward the remaining cap
    ///
    /// Returns `false` instead of producing a zero-sized request.
    fn advance_page_size(&mut self) -> bool {
        if self.max_records == 0 {
            return true;
        }

        let remaining = (self.max_records as usize).saturating_sub(self.count);
        if remaining == 0 {
            self.cap_reached = true;
            return false;
        }
        self.page_size = self.page_size.min(remaining as u32);
        true
    }

    fn summary(&self) -> SearchSummary {
        SearchSummary {
            records: self.count,
            pages: self.pages,
            cap_reached: self.cap_reached,
            loop_detected: self.loop_detected,
        }
    }
}

/// Drives paged searches with a fixed set of limits
#[derive(Debug, Clone, Default)]
pub struct PagedSearchDriver {
    options: SearchOptions,
}

impl PagedSearchDriver {
    pub fn new(options: SearchOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &SearchOptions {
        &self.options
    }

    /// Runs a search to completion and releases the directory
    ///
    /// The directory is closed on every exit path, including errors.
    /// Directory and sink failures end the session and are returned as is,
    /// nothing is retried.
    pub async fn run<D, S>(
        &self,
        mut directory: D,
        query: &SearchQuery,
        sink: &mut S,
    ) -> Result<SearchSummary, SessionError>
    where
        D: Directory,
        S: RecordSink + ?Sized,
    {
        let span = info_span!("search_session", id = %Uuid::new_v4());
        let outcome = self
            .drive(&mut directory, query, sink)
            .instrument(span)
            .await;
        directory.close().await;
        outcome
    }

    async fn drive<D, S>(
        &self,
        directory: &mut D,
        query: &SearchQuery,
        sink: &mut S,
    ) -> Result<SearchSummary, SessionError>
    where
        D: Directory,
        S: RecordSink + ?Sized,
    {
        let mut session = SearchSession::new(&self.options);
        let mut throttle = PageThrottle::new(self.options.delay_ms);

        info!(
            "Searching {} with filter {} (page size {}, max records {})",
            query.base, query.filter, session.page_size, session.max_records
        );

        loop {
            let page = directory
                .search_page(&PageRequest {
                    base: &query.base,
                    filter: &query.filter,
                    page_size: session.page_size,
                    cursor: &session.cursor,
                })
                .await?;
            session.pages += 1;

            debug!(
                "Page {} returned {} records, cursor {} bytes",
                session.pages,
                page.records.len(),
                page.cursor.len()
            );

            for record in page.records {
                let record = query.projection.apply(record);

                if !session.admit(&record.dn) {
                    warn!("Server returned {} again, ending paged search", record.dn);
                    break;
                }

                session.count += 1;
                sink.record(&record)?;

                if session.at_cap() {
                    session.cap_reached = true;
                    break;
                }
            }

            if session.loop_detected || session.cap_reached {
                break;
            }

            session.cursor = page.cursor;
            if session.cursor.is_empty() || !session.advance_page_size() {
                break;
            }

            throttle.pause().await;
        }

        if session.cap_reached {
            sink.notice(&Notice::CapReached {
                limit: session.max_records,
            });
        }
        if session.count == 0 {
            sink.notice(&Notice::ZeroResults);
        }

        info!(
            "Search finished: {} records over {} pages ({} throttle pauses)",
            session.count,
            session.pages,
            throttle.pauses()
        );
        Ok(session.summary())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_clamps_page_size() {
        let session = SearchSession::new(&SearchOptions {
            page_size: 0,
            max_records: 0,
            delay_ms: 0,
        });
        assert_eq!(session.page_size, 1);

        let session = SearchSession::new(&SearchOptions {
            page_size: 50,
            max_records: 5,
            delay_ms: 0,
        });
        assert_eq!(session.page_size, 5);
    }

    #[test]
    fn test_advance_page_size_never_reaches_zero() {
        let mut session = SearchSession::new(&SearchOptions {
            page_size: 10,
            max_records: 25,
            delay_ms: 0,
        });

        session.count = 20;
        assert!(session.advance_page_size());
        assert_eq!(session.page_size, 5);

        session.count = 25;
        assert!(!session.advance_page_size());
        assert!(session.cap_reached);
    }

    #[test]
    fn test_admit_detects_first_dn_replay() {
        let mut session = SearchSession::new(&SearchOptions::default());
        assert!(session.admit("cn=a"));
        assert!(session.admit("cn=b"));
        assert!(!session.admit("cn=a"));
        assert!(session.loop_detected);
    }

    #[test]
    fn test_projection_keeps_identifying_attribute() {
        let projection = Projection::new(&["MAIL"]);
        let record = Record::new("cn=a,dc=corp")
            .with_attribute("cn", &["a"])
            .with_attribute("mail", &["a@corp"])
            .with_attribute("description", &["x"]);

        let projected = projection.apply(record);
        let names: Vec<&str> = projected.attributes.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["cn", "mail"]);
    }
}
