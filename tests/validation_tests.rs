#[path = "../src/validation.rs"]
mod validation;
use validation::{is_catalog_address, parse_address, AnswerPattern, HOSTNAME_PATTERN, NON_EMPTY_PATTERN};

#[test]
fn test_parse_valid_addresses() {
    assert_eq!(parse_address("3"), Some(vec![3]));
    assert_eq!(parse_address("9.2"), Some(vec![9, 2]));
    assert_eq!(parse_address("10.1.4"), Some(vec![10, 1, 4]));
}

#[test]
fn test_parse_invalid_addresses() {
    assert_eq!(parse_address(""), None);
    assert_eq!(parse_address("0"), None); // Addresses are 1-based
    assert_eq!(parse_address("9.0"), None);
    assert_eq!(parse_address("1..2"), None);
    assert_eq!(parse_address(".3"), None);
    assert_eq!(parse_address("3."), None);
    assert_eq!(parse_address("a"), None);
    assert_eq!(parse_address("-1"), None);
    assert_eq!(parse_address("+1"), None);
    assert_eq!(parse_address("01"), None); // Only the printed form selects
    assert_eq!(parse_address("001.1"), None);
    assert_eq!(parse_address("9.02"), None);
}

#[test]
fn test_catalog_address_detection() {
    assert!(is_catalog_address("1"));
    assert!(is_catalog_address("9.2"));
    assert!(is_catalog_address(".9")); // Selects, then fails to resolve
    assert!(!is_catalog_address("9."));
    assert!(!is_catalog_address("(objectClass=user)"));
    assert!(!is_catalog_address(""));
}

#[test]
fn test_non_empty_pattern_is_prefix_match() {
    let pattern = AnswerPattern::new(NON_EMPTY_PATTERN).unwrap();
    assert!(pattern.matches("x"));
    assert!(pattern.matches(" "));
    assert!(!pattern.matches(""));
    assert_eq!(pattern.as_str(), ".+");
}

#[test]
fn test_pattern_not_matched_mid_string() {
    let pattern = AnswerPattern::new("[0-9]+").unwrap();
    assert!(pattern.matches("42abc"));
    assert!(!pattern.matches("abc42"));
}

#[test]
fn test_hostname_pattern() {
    let pattern = AnswerPattern::new(HOSTNAME_PATTERN).unwrap();
    assert!(pattern.matches("ws01"));
    assert!(pattern.matches("ws-01.corp.example.com"));
    assert!(!pattern.matches("-ws01"));
    assert!(!pattern.matches("ws01."));
    assert!(!pattern.matches("ws 01"));
    assert!(!pattern.matches("ws01)(cn=*"));
}

#[test]
fn test_invalid_pattern_rejected() {
    assert!(AnswerPattern::new("(unclosed").is_err());
}
