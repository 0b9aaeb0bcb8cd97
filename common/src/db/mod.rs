//! Relational store access shared by the ETL pipeline and the query gateway.
//!
//! Everything above this module talks to a [`SqlConnection`]; the MySQL
//! backend lives in [`mysql`] and an in-memory backend for tests in
//! `memory` (behind the `testing` feature).

#[cfg(any(test, feature = "testing"))]
pub mod memory;
pub mod mysql;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

use crate::config::Settings;
use crate::retry::retry_with_backoff;
use crate::{Error, Result};

pub use mysql::MySqlConnection;

/// A single cell value as returned by, or bound to, a statement.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Int(n) => Some(*n),
            SqlValue::UInt(n) => i64::try_from(*n).ok(),
            SqlValue::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            SqlValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Numeric view; DECIMAL columns arrive as text and are parsed here.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SqlValue::Int(n) => Some(*n as f64),
            SqlValue::UInt(n) => Some(*n as f64),
            SqlValue::Float(f) => Some(*f),
            SqlValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Calendar date of the value. DATETIME values and `YYYY-MM-DD[ hh:mm:ss]`
    /// text both reduce to their date part.
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            SqlValue::Date(d) => Some(*d),
            SqlValue::DateTime(dt) => Some(dt.date()),
            SqlValue::Text(s) => {
                let s = s.trim();
                let day = s.get(..10).unwrap_or(s);
                NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
            }
            _ => None,
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => write!(f, "NULL"),
            SqlValue::Int(n) => write!(f, "{}", n),
            SqlValue::UInt(n) => write!(f, "{}", n),
            SqlValue::Float(v) => write!(f, "{}", v),
            SqlValue::Text(s) => write!(f, "{}", s),
            SqlValue::Bytes(b) => write!(f, "{}", String::from_utf8_lossy(b)),
            SqlValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            SqlValue::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Float(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(v: NaiveDate) -> Self {
        SqlValue::Date(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// Column names plus rows of raw cells, in the order the backend produced them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
}

impl ResultSet {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// One live session against a relational store.
///
/// Statements are issued one at a time and each commits on its own; session
/// state such as `FOREIGN_KEY_CHECKS` persists between calls.
#[async_trait]
pub trait SqlConnection: Send + Sync {
    /// Store name used in logs and error messages.
    fn name(&self) -> &str;

    /// Round trip to the server without touching any table.
    async fn ping(&self) -> Result<()>;

    /// Runs a parameterised statement and returns the affected row count.
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64>;

    /// Runs a parameterised query and collects its rows.
    async fn fetch(&self, sql: &str, params: &[SqlValue]) -> Result<ResultSet>;

    /// Runs free text as-is. `None` when the statement yields no result set.
    async fn run_text(&self, sql: &str) -> Result<Option<ResultSet>>;
}

/// Selector for one of the three configured stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum StoreId {
    Warehouse,
    Db1,
    Db2,
}

impl StoreId {
    pub const ALL: [StoreId; 3] = [StoreId::Warehouse, StoreId::Db1, StoreId::Db2];

    pub fn as_str(&self) -> &'static str {
        match self {
            StoreId::Warehouse => "warehouse",
            StoreId::Db1 => "db1",
            StoreId::Db2 => "db2",
        }
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoreId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "warehouse" | "dw" => Ok(StoreId::Warehouse),
            "db1" | "source-1" | "source1" => Ok(StoreId::Db1),
            "db2" | "source-2" | "source2" => Ok(StoreId::Db2),
            other => Err(Error::InvalidInput(format!("Unknown store '{}'", other))),
        }
    }
}

impl TryFrom<String> for StoreId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<StoreId> for String {
    fn from(value: StoreId) -> Self {
        value.as_str().to_string()
    }
}

/// The three long-lived sessions, opened once and handed to the core.
#[derive(Clone)]
pub struct Connections {
    pub warehouse: Arc<dyn SqlConnection>,
    pub db1: Arc<dyn SqlConnection>,
    pub db2: Arc<dyn SqlConnection>,
}

impl Connections {
    pub fn new(
        warehouse: Arc<dyn SqlConnection>,
        db1: Arc<dyn SqlConnection>,
        db2: Arc<dyn SqlConnection>,
    ) -> Self {
        Self { warehouse, db1, db2 }
    }

    /// Opens all three stores. Any store that stays unreachable after the
    /// configured retries fails the whole call with [`Error::Connection`].
    pub async fn connect(settings: &Settings) -> Result<Self> {
        let mut opened = Vec::with_capacity(StoreId::ALL.len());
        for store in StoreId::ALL {
            let db = settings.database(store);
            let conn = retry_with_backoff(
                settings.connect.retries,
                settings.connect.base_delay_ms,
                || MySqlConnection::connect(store.as_str(), db),
            )
            .await?;
            info!(store = %store, target = %db.redacted(), "Connected");
            opened.push(Arc::new(conn) as Arc<dyn SqlConnection>);
        }

        let mut opened = opened.into_iter();
        match (opened.next(), opened.next(), opened.next()) {
            (Some(warehouse), Some(db1), Some(db2)) => Ok(Self::new(warehouse, db1, db2)),
            _ => Err(Error::Other("store list out of sync".to_string())),
        }
    }

    pub fn get(&self, store: StoreId) -> &Arc<dyn SqlConnection> {
        match store {
            StoreId::Warehouse => &self.warehouse,
            StoreId::Db1 => &self.db1,
            StoreId::Db2 => &self.db2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_id_parsing() {
        assert_eq!("warehouse".parse::<StoreId>().unwrap(), StoreId::Warehouse);
        assert_eq!("DB1".parse::<StoreId>().unwrap(), StoreId::Db1);
        assert_eq!("source-2".parse::<StoreId>().unwrap(), StoreId::Db2);
        assert!("db3".parse::<StoreId>().is_err());
    }

    #[test]
    fn test_store_id_serde() {
        let store: StoreId = serde_json::from_str("\"source-1\"").unwrap();
        assert_eq!(store, StoreId::Db1);
        assert_eq!(serde_json::to_string(&StoreId::Warehouse).unwrap(), "\"warehouse\"");
    }

    #[test]
    fn test_value_conversions() {
        assert_eq!(SqlValue::Text("12.50".into()).as_f64(), Some(12.5));
        assert_eq!(SqlValue::UInt(4).as_i64(), Some(4));
        assert_eq!(SqlValue::Null.as_i64(), None);

        let day = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        assert_eq!(SqlValue::Text("2024-01-02".into()).as_date(), Some(day));
        assert_eq!(SqlValue::Text("2024-01-02 13:45:00".into()).as_date(), Some(day));
        assert_eq!(
            SqlValue::DateTime(day.and_hms_opt(8, 0, 0).unwrap()).as_date(),
            Some(day)
        );
        assert_eq!(SqlValue::Text("yesterday".into()).as_date(), None);
    }

    #[test]
    fn test_value_serializes_raw() {
        let row = vec![
            SqlValue::Int(1),
            SqlValue::Null,
            SqlValue::Text("Alice".into()),
            SqlValue::Date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()),
        ];
        assert_eq!(
            serde_json::to_string(&row).unwrap(),
            r#"[1,null,"Alice","2024-01-01"]"#
        );
    }
}
