use common::Result;
use common::db::SqlConnection;

use super::read_name_keys;
use crate::key_map::KeyMap;
use crate::models::ProductRow;
use crate::report::{RunLog, StepSummary};
use crate::sources::SourceConnections;

const INSERT_PRODUCT: &str =
    "INSERT INTO ProductDim (ProductName, Category, UnitPrice) VALUES (?, ?, ?)";
const READ_PRODUCT_KEYS: &str = "SELECT ProductID, ProductName FROM ProductDim ORDER BY ProductID";

pub struct ProductLoader;

impl ProductLoader {
    /// Copies every product (db1) and item (db2) into `ProductDim`.
    pub async fn load(
        sources: SourceConnections<'_>,
        warehouse: &dyn SqlConnection,
        log: &mut RunLog,
    ) -> Result<StepSummary> {
        let mut summary = StepSummary::default();

        for (source, conn) in sources.iter() {
            let columns = &source.layout().products;
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
                let Some(product) = ProductRow::from_source(row) else {
                    summary.skipped += 1;
                    continue;
                };
                let result = warehouse.execute(INSERT_PRODUCT, &product.params()).await;
                match &result {
                    Ok(_) => inserted += 1,
                    Err(e) => log.failure(format!(
                        "Inserting product {:?} from {} failed: {}",
                        product.product_name.as_deref().unwrap_or("NULL"),
                        source,
                        e
                    )),
                }
                summary.record(&result);
            }

            log.success(format!(
                "Loaded {} of {} products from {}.{} into ProductDim",
                inserted,
                extracted.len(),
                source,
                columns.table
            ));
        }

        Ok(summary)
    }

    /// ProductName → ProductID, last inserted wins on equal names.
    pub async fn read_keys(warehouse: &dyn SqlConnection) -> Result<KeyMap<String>> {
        read_name_keys(warehouse, READ_PRODUCT_KEYS).await
    }
}
