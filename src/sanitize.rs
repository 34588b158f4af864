// src/sanitize.rs
//
// Escaping of operator-supplied search terms before they are spliced into
// LDAP filter templates.

/// Escapes a raw search term for safe embedding in an LDAP search filter
///
/// Every escaped character is written as an RFC 4515 `\XX` hex escape, the
/// only escape form filter parsers accept:
/// - filter metacharacters: parentheses, asterisk, backslash and NUL
/// - DN and attribute-value delimiters: comma, hash, plus, angle brackets,
///   semicolon, double quote and equals
///
/// Leading and trailing spaces are escaped one by one (`\20`) because the
/// server trims unescaped boundary whitespace before matching. Interior
/// spaces and all other characters, including non-ASCII text, pass through
/// unchanged.
///
/// # Arguments
/// * `raw` - The term exactly as the operator typed it
///
/// # Returns
/// * `String` - The escaped term
///
/// # Examples
/// ```
/// use ldapper::sanitize::escape_filter_value;
///
/// assert_eq!(escape_filter_value("a,b"), "a\\2cb");
/// assert_eq!(escape_filter_value(" x "), "\\20x\\20");
/// ```
pub fn escape_filter_value(raw: &str) -> String {
    let chars: Vec<char> = raw.chars().collect();
    let leading = chars.iter().take_while(|&&c| c == ' ').count();

    // An all-space term has no interior, every space is a leading one
    let trailing = if leading == chars.len() {
        0
    } else {
        chars.iter().rev().take_while(|&&c| c == ' ').count()
    };
    let interior_end = chars.len() - trailing;

    let mut escaped = String::with_capacity(raw.len() + 2 * (leading + trailing) + 8);

    for (index, &c) in chars.iter().enumerate() {
        match c {
            ' ' if index < leading || index >= interior_end => escaped.push_str("\\20"),
            '\\' | ',' | '#' | '+' | '<' | '>' | ';' | '"' | '=' | '(' | ')' | '*' | '\0' => {
                escaped.push_str(&format!("\\{:02x}", c as u32));
            }
            _ => escaped.push(c),
        }
    }

    escaped
}
