//! Cheap classification of statement text before it is sent to a driver.

use std::sync::LazyLock;

use regex::Regex;

static SELECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[ \t\r\n]*select\s")
        .unwrap_or_else(|err| panic!("invalid select pattern: {err}"))
});

/// Returns true when the statement has no ASCII word characters at all.
pub fn is_blank(sql: &str) -> bool {
    !sql.chars().any(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Returns true when the statement starts with `SELECT`, ignoring case and any
/// leading blank lines or spaces.
pub fn is_select(sql: &str) -> bool {
    SELECT.is_match(sql)
}
