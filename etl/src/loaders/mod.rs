//! Dimension and fact loaders.
//!
//! Each dimension loader inserts its rows and can read its own key map back
//! from the warehouse; the fact loader consumes those key maps.

mod branch;
mod customer;
mod datetime;
mod fact;
mod product;

pub use branch::BranchLoader;
pub use customer::CustomerLoader;
pub use datetime::DatetimeLoader;
pub use fact::FactLoader;
pub use product::ProductLoader;

use chrono::NaiveDate;
use common::Result;
use common::db::SqlConnection;

use crate::key_map::KeyMap;

/// Key maps of the three dimensions the fact loader resolves by natural key.
/// Branches need none: their keys are fixed per source.
#[derive(Debug, Clone, Default)]
pub struct KeyMaps {
    pub customers: KeyMap<String>,
    pub products: KeyMap<String>,
    pub dates: KeyMap<NaiveDate>,
}

impl KeyMaps {
    /// Reads all three maps back from the freshly loaded warehouse.
    pub async fn rebuild(warehouse: &dyn SqlConnection) -> Result<Self> {
        Ok(Self {
            customers: CustomerLoader::read_keys(warehouse).await?,
            products: ProductLoader::read_keys(warehouse).await?,
            dates: DatetimeLoader::read_keys(warehouse).await?,
        })
    }
}

/// Reads `(surrogate, natural name)` pairs into a map, in surrogate order.
async fn read_name_keys(warehouse: &dyn SqlConnection, sql: &str) -> Result<KeyMap<String>> {
    let rows = warehouse.fetch(sql, &[]).await?;
    Ok(rows
        .rows
        .iter()
        .filter_map(|row| match row.as_slice() {
            [id, name] => Some((crate::models::normalize_name(name)?, id.as_i64()?)),
            _ => None,
        })
        .collect())
}
