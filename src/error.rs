//! Error categories shared across the crate
//!
//! Every failure that crosses a module boundary is one of these. Transport
//! and resolver errors are converted where they happen so callers only ever
//! see a categorized error.

use thiserror::Error;

/// Errors produced while building or resolving the canned-search catalog
#[derive(Error, Debug)]
pub enum CatalogError {
    /// The selection address does not exist in the catalog
    #[error("no such canned search: {0}")]
    NotFound(String),

    /// Interactive input ended before a prompt received a valid answer
    #[error("input closed while waiting for an answer to \"{0}\"")]
    PromptClosed(String),

    /// A prompt's validation pattern does not compile
    #[error("invalid validation pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// A filter template's placeholders do not line up with its prompts
    #[error("filter template {template:?} uses placeholders {placeholders:?} but declares {prompts} prompt(s)")]
    PlaceholderMismatch {
        template: String,
        placeholders: Vec<usize>,
        prompts: usize,
    },
}

/// Errors that end a directory session
#[derive(Error, Debug)]
pub enum SessionError {
    /// No configured server accepted a connection
    #[error("unable to connect to {server}: {message}")]
    Connect { server: String, message: String },

    /// The server refused the supplied credentials
    #[error("bind failed for {user}: {message}")]
    Bind { user: String, message: String },

    /// The search request could not be completed on the wire
    #[error("search failed: {0}")]
    Search(String),

    /// The server answered the search with a non-success result code
    #[error("server rejected search (rc={rc}): {text}")]
    Rejected { rc: u32, text: String },

    /// Records could not be written to the output
    #[error("failed to write results: {0}")]
    Output(#[from] std::io::Error),
}
