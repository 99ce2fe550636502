//! Helpers for the colon-separated micro-syntax rule values are written in.

use super::error::RuleError;

pub(crate) fn split_on_colon(value: &str) -> Vec<&str> {
    if value.is_empty() {
        return Vec::new();
    }
    value.split(':').collect()
}

pub(crate) fn parse_int(name: &str, token: &str) -> Result<i64, RuleError> {
    token
        .trim()
        .parse()
        .map_err(|_| RuleError::invalid(name, format!("expected an integer, got '{token}'")))
}

pub(crate) fn parse_count(name: &str, token: &str) -> Result<u32, RuleError> {
    let n = parse_int(name, token)?;
    u32::try_from(n).map_err(|_| RuleError::invalid(name, format!("count cannot be negative: {n}")))
}

pub(crate) fn parse_bool(name: &str, token: &str) -> Result<bool, RuleError> {
    match token.trim().to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(RuleError::invalid(
            name,
            format!("expected true or false, got '{token}'"),
        )),
    }
}

/// Splits a leading integer count off a list: `"2:a:b"` gives `(Some(2), [a, b])`.
pub(crate) fn leading_count<'a>(tokens: &[&'a str]) -> (Option<i64>, Vec<&'a str>) {
    match tokens.first().and_then(|t| t.parse::<i64>().ok()) {
        Some(n) => (Some(n), tokens[1..].to_vec()),
        None => (None, tokens.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leading_count_is_optional() {
        assert_eq!(leading_count(&["3", "Tank"]), (Some(3), vec!["Tank"]));
        assert_eq!(leading_count(&["Tank", "3"]), (None, vec!["Tank", "3"]));
    }

    #[test]
    fn empty_value_has_no_tokens() {
        assert!(split_on_colon("").is_empty());
        assert_eq!(split_on_colon("a::b"), vec!["a", "", "b"]);
    }

    #[test]
    fn negative_counts_are_rejected() {
        assert!(parse_count("c", "-1").is_err());
        assert_eq!(parse_count("c", "4"), Ok(4));
        assert_eq!(parse_bool("c", "TRUE"), Ok(true));
    }
}
