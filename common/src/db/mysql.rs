use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use mysql_async::prelude::*;
use mysql_async::{Conn, Opts, Row};
use tokio::sync::Mutex;
use tracing::debug;

use super::{ResultSet, SqlConnection, SqlValue};
use crate::config::DatabaseConfig;
use crate::{Error, Result};

/// A single MySQL session.
///
/// One session rather than a pool: session variables set by one statement
/// (the reset's `FOREIGN_KEY_CHECKS`) must be visible to the next.
pub struct MySqlConnection {
    name: String,
    conn: Mutex<Conn>,
}

impl MySqlConnection {
    pub async fn connect(name: &str, config: &DatabaseConfig) -> Result<Self> {
        let url = config.connection_url()?;
        let opts = Opts::from_url(url.as_str())
            .map_err(|e| Error::connection(name, format!("invalid connection settings: {}", e)))?;

        let mut conn = Conn::new(opts)
            .await
            .map_err(|e| Error::connection(name, e))?;
        conn.ping().await.map_err(|e| Error::connection(name, e))?;

        Ok(Self {
            name: name.to_string(),
            conn: Mutex::new(conn),
        })
    }
}

fn value_to_sql(value: &SqlValue) -> mysql_async::Value {
    match value {
        SqlValue::Null => mysql_async::Value::NULL,
        SqlValue::Int(n) => mysql_async::Value::from(*n),
        SqlValue::UInt(n) => mysql_async::Value::from(*n),
        SqlValue::Float(f) => mysql_async::Value::from(*f),
        SqlValue::Text(s) => mysql_async::Value::from(s.clone()),
        SqlValue::Bytes(b) => mysql_async::Value::from(b.clone()),
        SqlValue::Date(d) => {
            mysql_async::Value::Date(d.year() as u16, d.month() as u8, d.day() as u8, 0, 0, 0, 0)
        }
        SqlValue::DateTime(dt) => {
            let date = dt.date();
            let time = dt.time();
            mysql_async::Value::Date(
                date.year() as u16,
                date.month() as u8,
                date.day() as u8,
                time.hour() as u8,
                time.minute() as u8,
                time.second() as u8,
                time.nanosecond() / 1000,
            )
        }
    }
}

fn mysql_value_to_value(val: mysql_async::Value) -> SqlValue {
    match val {
        mysql_async::Value::NULL => SqlValue::Null,
        mysql_async::Value::Bytes(b) => match String::from_utf8(b) {
            Ok(s) => SqlValue::Text(s),
            Err(e) => SqlValue::Bytes(e.into_bytes()),
        },
        mysql_async::Value::Int(n) => SqlValue::Int(n),
        mysql_async::Value::UInt(n) => SqlValue::UInt(n),
        mysql_async::Value::Float(f) => SqlValue::Float(f as f64),
        mysql_async::Value::Double(d) => SqlValue::Float(d),
        mysql_async::Value::Date(year, month, day, hour, min, sec, micro) => {
            let Some(date) = NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32) else {
                // Zero dates ('0000-00-00') have no calendar equivalent
                return SqlValue::Text(format!("{:04}-{:02}-{:02}", year, month, day));
            };
            if hour == 0 && min == 0 && sec == 0 && micro == 0 {
                SqlValue::Date(date)
            } else {
                let time = NaiveTime::from_hms_micro_opt(hour as u32, min as u32, sec as u32, micro)
                    .unwrap_or(NaiveTime::MIN);
                SqlValue::DateTime(NaiveDateTime::new(date, time))
            }
        }
        mysql_async::Value::Time(neg, days, hours, minutes, seconds, micros) => {
            let total_hours = days * 24 + hours as u32;
            SqlValue::Text(format!(
                "{}{:02}:{:02}:{:02}.{:06}",
                if neg { "-" } else { "" },
                total_hours,
                minutes,
                seconds,
                micros
            ))
        }
    }
}

fn row_to_values(row: Row) -> Vec<SqlValue> {
    (0..row.len())
        .map(|i| {
            let val: mysql_async::Value = row.get(i).unwrap_or(mysql_async::Value::NULL);
            mysql_value_to_value(val)
        })
        .collect()
}

#[async_trait]
impl SqlConnection for MySqlConnection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.lock().await;
        conn.ping().await?;
        Ok(())
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        let mut conn = self.conn.lock().await;
        let mysql_params: Vec<mysql_async::Value> = params.iter().map(value_to_sql).collect();

        if mysql_params.is_empty() {
            // DDL and session statements go through the text protocol
            conn.query_drop(sql).await?;
        } else {
            conn.exec_drop(sql, mysql_params).await?;
        }

        let affected = conn.affected_rows();
        debug!(store = %self.name, affected, "{}", sql);
        Ok(affected)
    }

    async fn fetch(&self, sql: &str, params: &[SqlValue]) -> Result<ResultSet> {
        let mut conn = self.conn.lock().await;
        let mysql_params: Vec<mysql_async::Value> = params.iter().map(value_to_sql).collect();

        let mut result = conn.exec_iter(sql, mysql_params).await?;
        let columns = result
            .columns_ref()
            .iter()
            .map(|c| c.name_str().to_string())
            .collect();
        let rows: Vec<Row> = result.collect().await?;

        debug!(store = %self.name, rows = rows.len(), "{}", sql);
        Ok(ResultSet {
            columns,
            rows: rows.into_iter().map(row_to_values).collect(),
        })
    }

    async fn run_text(&self, sql: &str) -> Result<Option<ResultSet>> {
        let mut conn = self.conn.lock().await;

        let mut result = conn.query_iter(sql).await?;
        let columns: Vec<String> = result
            .columns_ref()
            .iter()
            .map(|c| c.name_str().to_string())
            .collect();

        if columns.is_empty() {
            result.drop_result().await?;
            return Ok(None);
        }

        let rows: Vec<Row> = result.collect().await?;
        Ok(Some(ResultSet {
            columns,
            rows: rows.into_iter().map(row_to_values).collect(),
        }))
    }
}
