use common::Error;
use common::Result;
use common::db::SqlConnection;
use std::collections::HashMap;

use super::KeyMaps;
use crate::models::{FactRow, PurchaseRecord, normalize_name};
use crate::report::{RunLog, StepSummary};
use crate::sources::SourceSystem;

const INSERT_FACT: &str = "INSERT INTO FactSales \
    (ProductID, CustomerID, DateID, BranchID, Quantity, Revenue) VALUES (?, ?, ?, ?, ?, ?)";

/// Source-local id → natural name, loaded once per source.
#[derive(Debug, Default)]
struct NameLookup {
    customers: HashMap<i64, String>,
    products: HashMap<i64, String>,
}

pub struct FactLoader;

impl FactLoader {
    /// Loads one source's purchases into `FactSales`.
    ///
    /// Rows whose customer, product or date cannot be resolved are skipped
    /// with a warning; the rest of the batch still loads. Failing to read the
    /// source at all is returned as an error.
    pub async fn load(
        source: SourceSystem,
        conn: &dyn SqlConnection,
        warehouse: &dyn SqlConnection,
        keys: &KeyMaps,
        log: &mut RunLog,
    ) -> Result<StepSummary> {
        let layout = source.layout();
        let lookup = Self::load_names(source, conn).await?;
        let purchases = conn.fetch(&layout.purchases.extract_sql(), &[]).await?;

        let mut summary = StepSummary::default();
        for (index, row) in purchases.rows.iter().enumerate() {
            let fact = PurchaseRecord::from_source(row)
                .ok_or_else(|| Error::Other("unexpected column count".to_string()))
                .and_then(|record| Self::resolve(source, &record, &lookup, keys));

            let fact = match fact {
                Ok(fact) => fact,
                Err(e) => {
                    log.warning(format!(
                        "Skipped {}.{} row {}: {}",
                        source,
                        layout.purchases.table,
                        index + 1,
                        e
                    ));
                    summary.skipped += 1;
                    continue;
                }
            };

            let result = warehouse.execute(INSERT_FACT, &fact.params()).await;
            if let Err(e) = &result {
                log.failure(format!(
                    "Inserting {}.{} row {} into FactSales failed: {}",
                    source,
                    layout.purchases.table,
                    index + 1,
                    e
                ));
            }
            summary.record(&result);
        }

        log.success(format!(
            "Loaded {} of {} purchases from {}.{} into FactSales (BranchID {})",
            summary.succeeded,
            purchases.len(),
            source,
            layout.purchases.table,
            source.branch_id()
        ));
        Ok(summary)
    }

    /// One query per entity instead of one per purchase row. When a source
    /// repeats an id, its first row wins.
    async fn load_names(source: SourceSystem, conn: &dyn SqlConnection) -> Result<NameLookup> {
        let layout = source.layout();
        let mut lookup = NameLookup::default();

        let customers = conn.fetch(&layout.customers.lookup_sql(), &[]).await?;
        for row in &customers.rows {
            if let [id, name] = row.as_slice() {
                if let (Some(id), Some(name)) = (id.as_i64(), normalize_name(name)) {
                    lookup.customers.entry(id).or_insert(name);
                }
            }
        }

        let products = conn.fetch(&layout.products.lookup_sql(), &[]).await?;
        for row in &products.rows {
            if let [id, name] = row.as_slice() {
                if let (Some(id), Some(name)) = (id.as_i64(), normalize_name(name)) {
                    lookup.products.entry(id).or_insert(name);
                }
            }
        }

        Ok(lookup)
    }

    fn resolve(
        source: SourceSystem,
        record: &PurchaseRecord,
        lookup: &NameLookup,
        keys: &KeyMaps,
    ) -> Result<FactRow> {
        let customer_name = record
            .customer_id
            .and_then(|id| lookup.customers.get(&id))
            .ok_or_else(|| unresolved("customer id", record.customer_id))?;
        let product_name = record
            .product_id
            .and_then(|id| lookup.products.get(&id))
            .ok_or_else(|| unresolved("product id", record.product_id))?;

        let customer_id = keys
            .customers
            .get(customer_name.as_str())
            .ok_or_else(|| unresolved("customer", Some(customer_name)))?;
        let product_id = keys
            .products
            .get(product_name.as_str())
            .ok_or_else(|| unresolved("product", Some(product_name)))?;
        let date_id = record
            .purchased_on
            .and_then(|date| keys.dates.get(&date))
            .ok_or_else(|| unresolved("date", Some(&record.raw_date)))?;

        Ok(FactRow {
            product_id,
            customer_id,
            date_id,
            branch_id: source.branch_id(),
            quantity: record.quantity,
            revenue: record.amount,
        })
    }
}

fn unresolved<T: ToString>(dimension: &str, key: Option<T>) -> Error {
    Error::RowResolution {
        dimension: dimension.to_string(),
        key: key.map(|k| k.to_string()).unwrap_or_else(|| "NULL".to_string()),
    }
}
