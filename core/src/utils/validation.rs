//! Name validation
//!
//! Database names are checked before any request is built, so an invalid
//! name never reaches the network.

use regex::Regex;
use std::sync::OnceLock;

use crate::error::{CouchError, Result};

/// Prefix of design document ids
pub const DESIGN_PREFIX: &str = "_design/";

fn database_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-z][a-z0-9_$()+-/]+$").expect("database name pattern is valid")
    })
}

fn language_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("language pattern is valid"))
}

/// Check a database name against `^[a-z][a-z0-9_$()+-/]+$`
pub fn validate_database_name(name: &str) -> Result<()> {
    if database_name_pattern().is_match(name) {
        Ok(())
    } else {
        Err(CouchError::Validation(format!(
            "Invalid database specified: {:?}",
            name
        )))
    }
}

/// Check a design document language tag
pub fn validate_language(language: &str) -> Result<()> {
    if language_pattern().is_match(language) {
        Ok(())
    } else {
        Err(CouchError::Validation(format!(
            "Invalid design document language: {:?}",
            language
        )))
    }
}

/// Whether `id` names a design document
pub fn is_design_document_id(id: &str) -> bool {
    id.starts_with(DESIGN_PREFIX)
}

/// Full design document id for `name`, adding the prefix when missing
pub fn design_document_id(name: &str) -> String {
    if is_design_document_id(name) {
        name.to_string()
    } else {
        format!("{}{}", DESIGN_PREFIX, name)
    }
}

/// Remove carriage returns and newlines, as map/reduce sources are sent on one line
pub fn strip_line_breaks(source: &str) -> String {
    source.chars().filter(|c| !matches!(c, '\r' | '\n')).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case("testdb")]
    #[case("couchunittest")]
    #[case("a1")]
    #[case("my_db$(x)+y-z")]
    #[case("team/projects")]
    fn test_valid_database_names(#[case] name: &str) {
        assert!(validate_database_name(name).is_ok());
    }

    #[rstest]
    #[case("")]
    #[case("a")]
    #[case("TestDb")]
    #[case("1db")]
    #[case("_users")]
    #[case("db name")]
    #[case("db?x")]
    fn test_invalid_database_names(#[case] name: &str) {
        match validate_database_name(name) {
            Err(CouchError::Validation(msg)) => assert!(msg.contains("Invalid database")),
            other => panic!("Expected Validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_design_document_ids() {
        assert!(is_design_document_id("_design/blog"));
        assert!(!is_design_document_id("blog"));
        assert_eq!(design_document_id("blog"), "_design/blog");
        assert_eq!(design_document_id("_design/blog"), "_design/blog");
    }

    #[test]
    fn test_language_tags() {
        assert!(validate_language("javascript").is_ok());
        assert!(validate_language("erlang_native-2").is_ok());
        assert!(validate_language("").is_err());
        assert!(validate_language("java script").is_err());
    }

    #[test]
    fn test_strip_line_breaks() {
        assert_eq!(
            strip_line_breaks("function(doc) {\r\n  emit(doc._id, null);\n}"),
            "function(doc) {  emit(doc._id, null);}"
        );
    }

    proptest! {
        #[test]
        fn lowercase_names_are_accepted(name in "[a-z][a-z0-9_]{1,30}") {
            prop_assert!(validate_database_name(&name).is_ok());
        }

        #[test]
        fn names_with_uppercase_are_rejected(prefix in "[a-z]{1,5}", upper in "[A-Z]{1,5}") {
            let name = format!("{}{}", prefix, upper);
            prop_assert!(validate_database_name(&name).is_err());
        }
    }
}
