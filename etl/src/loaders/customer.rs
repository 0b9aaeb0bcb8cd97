use common::Result;
use common::db::SqlConnection;

use super::read_name_keys;
use crate::key_map::KeyMap;
use crate::models::CustomerRow;
use crate::report::{RunLog, StepSummary};
use crate::sources::SourceConnections;

const INSERT_CUSTOMER: &str = "INSERT INTO CustomerDim (FullName, Phone, Email) VALUES (?, ?, ?)";
const READ_CUSTOMER_KEYS: &str = "SELECT CustomerID, FullName FROM CustomerDim ORDER BY CustomerID";

pub struct CustomerLoader;

impl CustomerLoader {
    /// Copies every customer of both sources into `CustomerDim`, db1 first.
    /// Nothing is deduplicated here.
    pub async fn load(
        sources: SourceConnections<'_>,
        warehouse: &dyn SqlConnection,
        log: &mut RunLog,
    ) -> Result<StepSummary> {
        let mut summary = StepSummary::default();

        for (source, conn) in sources.iter() {
            let columns = &source.layout().customers;
            let extracted = match conn.fetch(&columns.extract_sql(), &[]).await {
                Ok(rs) => rs,
                Err(e) => {
                    log.failure(format!("Reading {} from {} failed: {}", columns.table, source, e));
                    summary.failed += 1;
                    continue;
                }
            };

            let mut inserted = 0;
            for row in &extracted.rows {
                let Some(customer) = CustomerRow::from_source(row) else {
                    summary.skipped += 1;
                    continue;
                };
                let result = warehouse.execute(INSERT_CUSTOMER, &customer.params()).await;
                match &result {
                    Ok(_) => inserted += 1,
                    Err(e) => log.failure(format!(
                        "Inserting customer {:?} from {} failed: {}",
                        customer.full_name.as_deref().unwrap_or("NULL"),
                        source,
                        e
                    )),
                }
                summary.record(&result);
            }

            log.success(format!(
                "Loaded {} of {} customers from {}.{} into CustomerDim",
                inserted,
                extracted.len(),
                source,
                columns.table
            ));
        }

        Ok(summary)
    }

    /// FullName → CustomerID. Customers sharing a name collapse onto the
    /// highest CustomerID.
    pub async fn read_keys(warehouse: &dyn SqlConnection) -> Result<KeyMap<String>> {
        read_name_keys(warehouse, READ_CUSTOMER_KEYS).await
    }
}
