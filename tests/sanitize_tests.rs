use ldapper::sanitize::escape_filter_value;

const HOSTILE_TERMS: [&str; 9] = [
    "Smith, John",
    " admin",
    "admin  ",
    "C:\\x",
    "*)(objectClass=*",
    "<\"#+>;=",
    "a\0b",
    "   ",
    " Zoë;Ålesund ",
];

#[test]
fn test_terms_without_special_characters_are_unchanged() {
    for term in ["jsmith", "Domain Admins", "Ünïcødé ñame", "日本語", "a.b-c_d@corp"] {
        assert_eq!(escape_filter_value(term), term);
    }
}

#[test]
fn test_boundary_spaces_escaped_individually() {
    // Two leading and two trailing spaces, interior space untouched
    assert_eq!(escape_filter_value("  x y  "), "\\20\\20x y\\20\\20");
    assert_eq!(escape_filter_value("  x  "), "\\20\\20x\\20\\20");
}

#[test]
fn test_comma_escaped_letters_untouched() {
    assert_eq!(escape_filter_value("a,b"), "a\\2cb");
}

#[test]
fn test_backslash_escaped_as_hex() {
    assert_eq!(escape_filter_value("DOMAIN\\user"), "DOMAIN\\5cuser");
    assert_eq!(escape_filter_value("\\,"), "\\5c\\2c");
}

#[test]
fn test_injection_attempt_is_neutralized() {
    let escaped = escape_filter_value("*)(objectClass=*");
    assert!(!escaped.contains('('));
    assert!(!escaped.contains(')'));
    assert!(!escaped.contains('*'));
    assert_eq!(escaped, "\\2a\\29\\28objectClass\\3d\\2a");
}

#[test]
fn test_unicode_next_to_escapes() {
    assert_eq!(escape_filter_value(" Zoë;Ålesund "), "\\20Zoë\\3bÅlesund\\20");
}

#[test]
fn test_escaped_terms_parse_as_filter_values() {
    for term in HOSTILE_TERMS {
        let filter = format!("(cn={})", escape_filter_value(term));
        assert!(
            ldap3::parse_filter(&filter).is_ok(),
            "Filter for {:?} does not parse: {}",
            term,
            filter
        );
    }
}

#[test]
fn test_escaped_terms_stay_one_equality_match() {
    // An escaped term can never add clauses to the surrounding filter
    for term in HOSTILE_TERMS {
        let escaped = escape_filter_value(term);
        let single = format!("(cn={})", escaped);
        let nested = format!("(&(objectClass=user)(cn={}))", escaped);
        assert!(ldap3::parse_filter(&single).is_ok());
        assert!(ldap3::parse_filter(&nested).is_ok());
        assert!(!escaped.contains(['(', ')', '*', '\0']));
    }
}
