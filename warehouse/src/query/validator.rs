use common::Error;
use common::Result;

pub const EMPTY_QUERY_MESSAGE: &str = "Please enter a SQL query.";
pub const REJECTED_QUERY_MESSAGE: &str =
    "Only single-statement read-only SELECT queries are allowed.";

const ALLOWED_PREFIXES: [&str; 2] = ["select", "with"];

const DENY_LIST: [&str; 13] = [
    "insert", "update", "delete", "drop", "alter", "truncate", "create", "replace", "rename",
    "grant", "revoke", "outfile", "dumpfile",
];

/// Lexical gate for ad hoc queries.
///
/// A query passes when, after trimming and lowercasing, it starts with
/// `select` or `with`, contains no `;` at all, and contains none of the
/// deny-listed words *as substrings*. This is a best-effort filter, not a
/// security boundary:
///
/// * False positives: identifiers that embed a denied word (`created_at`,
///   `last_update`, `is_deleted`) and any `;` inside a string literal or
///   comment are rejected.
/// * False negatives: `SELECT ... INTO @var`, `LOCK IN SHARE MODE` reads and
///   side-effecting functions such as `SLEEP()` or `GET_LOCK()` all pass.
///
/// Real protection belongs to a read-only database account.
pub struct QuerySafetyValidator;

impl QuerySafetyValidator {
    /// Returns the trimmed query when it is acceptable.
    pub fn validate(sql: &str) -> Result<&str> {
        let trimmed = sql.trim();
        if trimmed.is_empty() {
            return Err(Error::Validation(EMPTY_QUERY_MESSAGE.to_string()));
        }

        let lowered = trimmed.to_lowercase();
        let read_only = ALLOWED_PREFIXES.iter().any(|p| lowered.starts_with(p))
            && !lowered.contains(';')
            && !DENY_LIST.iter().any(|word| lowered.contains(word));

        if read_only {
            Ok(trimmed)
        } else {
            Err(Error::Validation(REJECTED_QUERY_MESSAGE.to_string()))
        }
    }

    pub fn is_allowed(sql: &str) -> bool {
        Self::validate(sql).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_select_and_with() {
        assert_eq!(QuerySafetyValidator::validate("  SELECT 1 ").unwrap(), "SELECT 1");
        assert!(QuerySafetyValidator::is_allowed(
            "WITH t AS (SELECT * FROM FactSales) SELECT * FROM t"
        ));
        assert!(QuerySafetyValidator::is_allowed("select * from CustomerDim"));
    }

    #[test]
    fn test_rejects_writes_and_multiple_statements() {
        for sql in [
            "DROP TABLE FactSales",
            "SELECT 1; DROP TABLE x",
            "SELECT 1;",
            "SHOW TABLES",
            "SELECT * FROM t INTO OUTFILE '/tmp/x'",
            "with x as (select 1) delete from t",
        ] {
            let err = QuerySafetyValidator::validate(sql).unwrap_err();
            assert_eq!(err.to_string(), REJECTED_QUERY_MESSAGE, "{}", sql);
        }
    }

    #[test]
    fn test_substring_matching_rejects_innocent_identifiers() {
        assert!(!QuerySafetyValidator::is_allowed("SELECT created_at FROM orders"));
        assert!(!QuerySafetyValidator::is_allowed("SELECT 'a;b' AS label"));
    }

    #[test]
    fn test_empty_query_has_its_own_message() {
        for sql in ["", "   \n\t"] {
            let err = QuerySafetyValidator::validate(sql).unwrap_err();
            assert!(matches!(err, Error::Validation(ref m) if m == EMPTY_QUERY_MESSAGE));
        }
    }
}
