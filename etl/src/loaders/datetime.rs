use chrono::NaiveDate;
use common::Result;
use common::db::{SqlConnection, SqlValue};
use std::collections::BTreeSet;

use crate::key_map::KeyMap;
use crate::report::{RunLog, StepSummary};
use crate::sources::SourceConnections;

const INSERT_DATE: &str = "INSERT INTO DatetimeDim (FullDate) VALUES (?)";
const READ_DATE_KEYS: &str = "SELECT DateID, FullDate FROM DatetimeDim ORDER BY DateID";

pub struct DatetimeLoader;

impl DatetimeLoader {
    /// Inserts the union of both sources' purchase dates, ascending, each
    /// exactly once. Surrogate keys therefore follow date order.
    pub async fn load(
        sources: SourceConnections<'_>,
        warehouse: &dyn SqlConnection,
        log: &mut RunLog,
    ) -> Result<StepSummary> {
        let mut summary = StepSummary::default();
        let mut dates = BTreeSet::new();

        for (source, conn) in sources.iter() {
            let columns = &source.layout().purchases;
            let distinct = match conn.fetch(&columns.distinct_dates_sql(), &[]).await {
                Ok(rs) => rs,
                Err(e) => {
                    log.failure(format!(
                        "Reading purchase dates from {}.{} failed: {}",
                        source, columns.table, e
                    ));
                    summary.failed += 1;
                    continue;
                }
            };

            for row in &distinct.rows {
                match row.first().and_then(|v| v.as_date()) {
                    Some(date) => {
                        dates.insert(date);
                    }
                    None => {
                        log.warning(format!(
                            "Skipped unreadable purchase date {} in {}.{}",
                            row.first().map(|v| v.to_string()).unwrap_or_default(),
                            source,
                            columns.table
                        ));
                        summary.skipped += 1;
                    }
                }
            }
        }

        let mut inserted = 0;
        for date in &dates {
            let result = warehouse.execute(INSERT_DATE, &[SqlValue::Date(*date)]).await;
            match &result {
                Ok(_) => inserted += 1,
                Err(e) => log.failure(format!("Inserting date {} failed: {}", date, e)),
            }
            summary.record(&result);
        }

        log.success(format!(
            "Loaded {} of {} distinct dates into DatetimeDim",
            inserted,
            dates.len()
        ));
        Ok(summary)
    }

    pub async fn read_keys(warehouse: &dyn SqlConnection) -> Result<KeyMap<NaiveDate>> {
        let rows = warehouse.fetch(READ_DATE_KEYS, &[]).await?;
        Ok(rows
            .rows
            .iter()
            .filter_map(|row| match row.as_slice() {
                [id, date] => Some((date.as_date()?, id.as_i64()?)),
                _ => None,
            })
            .collect())
    }
}
