use common::Error;
use common::Result;
use common::db::{SqlConnection, StoreId};
use etl::schema::WAREHOUSE_TABLES;
use etl::sources::SourceSystem;
use serde::Serialize;

use super::executor::{QueryExecutor, QueryOutcome};

/// The tables of one store and the query a console starts from.
#[derive(Debug, Clone, Serialize)]
pub struct StoreTables {
    pub store: StoreId,
    pub tables: Vec<&'static str>,
    pub default_query: &'static str,
}

/// Read-only browsing of a fixed list of tables per store. Only names from
/// that list are ever spliced into SQL.
pub struct TableBrowser;

impl TableBrowser {
    pub fn tables(store: StoreId) -> &'static [&'static str] {
        match store {
            StoreId::Warehouse => &WAREHOUSE_TABLES,
            StoreId::Db1 => SourceSystem::Db1.layout().tables,
            StoreId::Db2 => SourceSystem::Db2.layout().tables,
        }
    }

    pub fn default_query(store: StoreId) -> &'static str {
        match store {
            StoreId::Warehouse => "SELECT * FROM FactSales",
            StoreId::Db1 => "SELECT * FROM Customer",
            StoreId::Db2 => "SELECT * FROM Customers",
        }
    }

    pub fn describe(store: StoreId) -> StoreTables {
        StoreTables {
            store,
            tables: Self::tables(store).to_vec(),
            default_query: Self::default_query(store),
        }
    }

    /// Every row of `table`, uncapped.
    pub async fn browse(
        conn: &dyn SqlConnection,
        store: StoreId,
        table: &str,
    ) -> Result<QueryOutcome> {
        let known = Self::tables(store)
            .iter()
            .find(|t| **t == table)
            .ok_or_else(|| Error::NotFound(format!("table '{}' in {}", table, store)))?;

        Ok(QueryExecutor::run_uncapped(conn, &format!("SELECT * FROM `{}`", known)).await)
    }
}
