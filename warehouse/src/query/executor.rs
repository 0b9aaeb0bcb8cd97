use common::Result;
use common::db::{ResultSet, SqlConnection, SqlValue};
use serde::Serialize;
use tracing::{debug, warn};

use super::validator::QuerySafetyValidator;

pub const NO_RESULT_SET_MESSAGE: &str = "Query executed (no result set).";

/// What an ad hoc query produced. Exactly one of these per query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueryOutcome {
    Rows {
        columns: Vec<String>,
        rows: Vec<Vec<SqlValue>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        note: Option<String>,
    },
    NoResultSet {
        message: String,
    },
    /// The backend refused the statement; its message is passed on untouched.
    Error {
        message: String,
    },
}

impl QueryOutcome {
    fn from_result(result: Result<Option<ResultSet>>, note: Option<String>) -> Self {
        match result {
            Ok(Some(rs)) => QueryOutcome::Rows {
                columns: rs.columns,
                rows: rs.rows,
                note,
            },
            Ok(None) => QueryOutcome::NoResultSet {
                message: NO_RESULT_SET_MESSAGE.to_string(),
            },
            Err(e) => QueryOutcome::Error {
                message: e.to_string(),
            },
        }
    }

    pub fn row_count(&self) -> usize {
        match self {
            QueryOutcome::Rows { rows, .. } => rows.len(),
            _ => 0,
        }
    }
}

pub struct QueryExecutor {
    row_limit: usize,
}

impl QueryExecutor {
    pub fn new(row_limit: usize) -> Self {
        Self { row_limit }
    }

    /// Appends the row cap unless the query already mentions ` limit `.
    pub fn apply_limit(&self, sql: &str) -> (String, Option<String>) {
        if sql.to_lowercase().contains(" limit ") {
            (sql.to_string(), None)
        } else {
            (
                format!("{} LIMIT {}", sql, self.row_limit),
                Some(format!(
                    "No LIMIT detected — automatically added: LIMIT {}",
                    self.row_limit
                )),
            )
        }
    }

    /// Validates, caps and runs an ad hoc query.
    ///
    /// Rejected queries come back as [`common::Error::Validation`] and never
    /// reach the connection. Backend failures are an outcome, not an error.
    pub async fn run(&self, conn: &dyn SqlConnection, sql: &str) -> Result<QueryOutcome> {
        let sql = QuerySafetyValidator::validate(sql)?;
        let (capped, note) = self.apply_limit(sql);
        debug!(store = conn.name(), sql = %capped, "Running ad hoc query");

        let outcome = QueryOutcome::from_result(conn.run_text(&capped).await, note);
        match &outcome {
            QueryOutcome::Error { message } => {
                warn!(store = conn.name(), "Query failed: {}", message)
            }
            _ => debug!(store = conn.name(), rows = outcome.row_count(), "Query finished"),
        }
        Ok(outcome)
    }

    /// Runs trusted SQL as is, with neither validation nor row cap.
    pub async fn run_uncapped(conn: &dyn SqlConnection, sql: &str) -> QueryOutcome {
        QueryOutcome::from_result(conn.run_text(sql).await, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Error;
    use common::db::memory::MemoryConnection;

    fn big_table(rows: i64) -> MemoryConnection {
        MemoryConnection::new("warehouse").with_table(
            "FactSales",
            &["FactID", "Quantity"],
            (1..=rows).map(|i| vec![SqlValue::Int(i), SqlValue::Int(1)]).collect(),
        )
    }

    #[tokio::test]
    async fn test_missing_limit_is_added_with_note() {
        let conn = big_table(250);
        let outcome = QueryExecutor::new(200)
            .run(&conn, "SELECT * FROM FactSales")
            .await
            .unwrap();

        assert_eq!(outcome.row_count(), 200);
        let QueryOutcome::Rows { note, columns, .. } = outcome else {
            panic!("expected rows");
        };
        assert_eq!(columns, vec!["FactID", "Quantity"]);
        assert_eq!(
            note.as_deref(),
            Some("No LIMIT detected — automatically added: LIMIT 200")
        );
        assert_eq!(conn.statements(), vec!["SELECT * FROM FactSales LIMIT 200"]);
    }

    #[tokio::test]
    async fn test_explicit_limit_is_kept() {
        let conn = big_table(250);
        let outcome = QueryExecutor::new(200)
            .run(&conn, "select * from FactSales limit 5")
            .await
            .unwrap();

        assert_eq!(outcome.row_count(), 5);
        assert!(matches!(outcome, QueryOutcome::Rows { note: None, .. }));
    }

    #[tokio::test]
    async fn test_rejected_query_never_reaches_backend() {
        let conn = big_table(1);
        let err = QueryExecutor::new(200)
            .run(&conn, "DELETE FROM FactSales")
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Validation(_)));
        assert!(conn.statements().is_empty());
    }

    #[tokio::test]
    async fn test_backend_error_is_passed_through() {
        let conn = big_table(1);
        let outcome = QueryExecutor::new(200)
            .run(&conn, "SELECT * FROM Missing")
            .await
            .unwrap();

        assert_eq!(
            outcome,
            QueryOutcome::Error {
                message: "Table 'Missing' doesn't exist".to_string()
            }
        );
    }

    #[test]
    fn test_statement_without_result_set() {
        let outcome = QueryOutcome::from_result(Ok(None), None);
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            serde_json::json!({"kind": "no_result_set", "message": NO_RESULT_SET_MESSAGE})
        );
    }
}
