//! Validation for values formatted into SQL text.
//!
//! Table names and partition ids end up inside DDL and `INSERT INTO FUNCTION`
//! statements where bind parameters are not available.

use regex::Regex;
use std::sync::LazyLock;

use crate::error::{Error, Result};

const IDENTIFIER_PATTERN: &str = r"^[A-Za-z_][0-9A-Za-z_]{0,127}$";
const PARTITION_PATTERN: &str = r"^[0-9A-Za-z_\-]{1,128}$";

static IDENTIFIER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(IDENTIFIER_PATTERN).expect("invalid identifier pattern"));

static PARTITION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(PARTITION_PATTERN).expect("invalid partition pattern"));

/// Accept a database or table name.
pub fn sql_identifier(name: &str) -> Result<&str> {
    if IDENTIFIER_REGEX.is_match(name) {
        Ok(name)
    } else {
        Err(Error::InvalidIdentifier(name.to_string()))
    }
}

/// Accept a partition value or partition id (`2024-01-01`, `20240101`).
pub fn partition_id(value: &str) -> Result<&str> {
    if PARTITION_REGEX.is_match(value) {
        Ok(value)
    } else {
        Err(Error::InvalidIdentifier(value.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_identifier() {
        assert!(sql_identifier("otel_traces").is_ok());
        assert!(sql_identifier("_tmp1").is_ok());
        assert!(sql_identifier("1table").is_err());
        assert!(sql_identifier("otel_traces; DROP TABLE x").is_err());
        assert!(sql_identifier("").is_err());
    }

    #[test]
    fn test_partition_id() {
        assert!(partition_id("2024-01-01").is_ok());
        assert!(partition_id("20240101").is_ok());
        assert!(partition_id("2024-01-01'").is_err());
        assert!(partition_id("").is_err());
    }
}
