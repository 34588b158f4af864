//! Command-line interface for ldapper
//!
//! Parses connection, search and output options with clap and turns them
//! into the configuration types used by the library:
//!
//! - [`ConnectOptions`] for the directory session
//! - [`SearchOptions`] for the paged search driver
//! - the canned-search address or raw filter, plus preseeded answers
//!
//! The help epilog lists the canned-search catalog, so the parser is built
//! at runtime from a [`CatalogTree`] via [`parse_args`].

use clap::{CommandFactory, FromArgMatches, Parser};
use std::io::{self, BufRead, Stderr, StdinLock, Write};
use std::time::Duration;
use tracing::debug;

use crate::catalog::{CatalogTree, Prompter};
use crate::directory::{ConnectOptions, Encryption};
use crate::output::OutputFormat;
use crate::search::SearchOptions;

const DEFAULT_MAX_RECORDS: u32 = 100;
const DEFAULT_PAGE_SIZE: u32 = 10;

/// Connection timeout applied to every server attempt
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Main command-line interface structure for ldapper
///
/// # Examples
///
/// ```no_run
/// use clap::Parser;
/// use ldapper::cli::Cli;
///
/// let cli = Cli::parse_from([
///     "ldapper", "-D", "CORP", "-U", "auditor", "-P", "secret",
///     "-S", "10.0.0.5", "-s", "1",
/// ]);
/// assert_eq!(cli.search, "1");
/// ```
#[derive(Parser, Debug)]
#[command(
    name = "ldapper",
    about = "AD LDAP command line searching that doesn't suck",
    version
)]
pub struct Cli {
    /// Domain
    #[arg(short = 'D', long)]
    pub domain: String,

    /// Username
    #[arg(short = 'U', long)]
    pub user: String,

    /// Password
    #[arg(short = 'P', long)]
    pub password: String,

    /// DC IP or resolvable name (can be a comma-delimited list, tried in order)
    #[arg(short = 'S', long)]
    pub server: String,

    /// Base DN, typically "dc=" followed by the domain name with periods replaced by ",dc=".
    /// Derived via DNS from the first server when not provided
    #[arg(short = 'b', long, default_value = "")]
    pub basedn: String,

    /// LDAP search filter, or the number of a canned search from the list below
    #[arg(short = 's', long)]
    pub search: String,

    /// Maximum records to return, 0 means all
    #[arg(short = 'm', long, default_value_t = 100, allow_negative_numbers = true)]
    pub maxrecords: i64,

    /// Number of records to pull per page, should be <= max records
    #[arg(short = 'p', long, default_value_t = 10, allow_negative_numbers = true)]
    pub pagesize: i64,

    /// Millisecond delay between paging requests
    #[arg(short = 'd', long, default_value_t = 0)]
    pub delay: u64,

    /// Output format
    #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Plain)]
    pub format: OutputFormat,

    /// 3) LDAPS on 636; 2) 389 with STARTTLS, falling back to plaintext; 1) 389 plaintext
    #[arg(short = 'n', long, default_value_t = 3, value_parser = clap::value_parser!(u8).range(1..=3))]
    pub encryption: u8,

    /// Answers for canned searches that prompt for input, in prompt order
    #[arg(short = 'a', long, num_args = 0..)]
    pub advanced: Vec<String>,

    /// Attributes to return (defaults to all)
    #[arg(value_name = "ATTRIBUTE")]
    pub attributes: Vec<String>,
}

impl Cli {
    /// Server list with surrounding whitespace and empty items removed
    pub fn servers(&self) -> Vec<String> {
        self.server
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    }

    /// Down-level logon name used for the bind
    pub fn bind_user(&self) -> String {
        format!("{}\\{}", self.domain, self.user)
    }

    pub fn encryption(&self) -> Encryption {
        Encryption::try_from(self.encryption).unwrap_or(Encryption::Ldaps)
    }

    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            servers: self.servers(),
            encryption: self.encryption(),
            bind_user: self.bind_user(),
            password: self.password.clone(),
            timeout: CONNECT_TIMEOUT,
        }
    }

    /// Paging limits with out-of-range values replaced by the defaults
    ///
    /// A negative record cap becomes 100, a page size of zero or less becomes 10.
    pub fn search_options(&self) -> SearchOptions {
        let max_records = if self.maxrecords < 0 {
            DEFAULT_MAX_RECORDS
        } else {
            u32::try_from(self.maxrecords).unwrap_or(u32::MAX)
        };
        let page_size = if self.pagesize <= 0 {
            DEFAULT_PAGE_SIZE
        } else {
            u32::try_from(self.pagesize).unwrap_or(u32::MAX)
        };

        SearchOptions {
            page_size,
            max_records,
            delay_ms: self.delay,
        }
    }
}

/// Parses process arguments with the catalog listing as help epilog
pub fn parse_args(catalog: &CatalogTree) -> Cli {
    let matches = Cli::command().after_help(catalog.render_help()).get_matches();
    Cli::from_arg_matches(&matches).unwrap_or_else(|e| e.exit())
}

/// Writes prompts to one stream and reads answers line by line from another
///
/// The binary uses [`LinePrompter::stdio`], prompting on stderr so stdout
/// only carries results.
pub struct LinePrompter<R: BufRead, W: Write> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> LinePrompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl LinePrompter<StdinLock<'static>, Stderr> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stderr())
    }
}

impl<R: BufRead, W: Write> Prompter for LinePrompter<R, W> {
    fn ask(&mut self, question: &str, _pattern: &str) -> Option<String> {
        // A prompt that cannot be shown still gets its answer read
        if let Err(e) = write!(self.output, "{}: ", question).and_then(|()| self.output.flush()) {
            debug!("Failed to write prompt {:?}: {}", question, e);
        }

        let mut line = String::new();
        match self.input.read_line(&mut line) {
            Ok(0) => None,
            Err(e) => {
                debug!("Failed to read answer to {:?}: {}", question, e);
                None
            }
            Ok(_) => {
                // Only the line terminator is dropped, boundary spaces are meaningful
                let trimmed = line.strip_suffix('\n').unwrap_or(&line);
                let trimmed = trimmed.strip_suffix('\r').unwrap_or(trimmed);
                Some(trimmed.to_string())
            }
        }
    }
}
