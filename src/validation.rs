use regex::Regex;

/// Host name pattern used by prompts that ask for a computer name
pub const HOSTNAME_PATTERN: &str = r"^(([a-zA-Z0-9]|[a-zA-Z0-9][a-zA-Z0-9\-]*[a-zA-Z0-9])\.)*([A-Za-z0-9]|[A-Za-z0-9][A-Za-z0-9\-]*[A-Za-z0-9])$";

/// Pattern accepting any non-empty answer
pub const NON_EMPTY_PATTERN: &str = ".+";

/// Validation pattern attached to a catalog prompt
///
/// Patterns match from the start of the answer but are not implicitly
/// anchored at the end: `.+` accepts any answer whose first character is
/// not a newline. Patterns that need a full match carry their own `$`.
#[derive(Debug, Clone)]
pub struct AnswerPattern {
    source: String,
    regex: Regex,
}

impl AnswerPattern {
    /// Compiles a validation pattern
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        let regex = Regex::new(&format!("^(?:{})", pattern))?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    /// The pattern as authored
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Checks a raw, unescaped answer against the pattern
    pub fn matches(&self, answer: &str) -> bool {
        self.regex.is_match(answer)
    }
}

/// Checks whether a `--search` value selects a canned search
///
/// Anything made only of digits and dots that ends in a digit is an
/// address; everything else is treated as a raw LDAP filter.
pub fn is_catalog_address(search: &str) -> bool {
    !search.is_empty()
        && search.ends_with(|c: char| c.is_ascii_digit())
        && search.chars().all(|c| c.is_ascii_digit() || c == '.')
}

/// Parses a dotted catalog address into 1-based components
///
/// Returns `None` when the address is empty, has an empty component
/// (`"1..2"`, `".3"`), or contains a zero, zero-padded (`"01"`) or
/// non-numeric component. Only the form the listing prints is accepted.
pub fn parse_address(address: &str) -> Option<Vec<usize>> {
    if address.is_empty() {
        return None;
    }

    address
        .split('.')
        .map(|part| {
            if part.is_empty() || part.starts_with('0') || !part.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            part.parse::<usize>().ok()
        })
        .collect()
}
