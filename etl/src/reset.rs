use common::Error;
use common::Result;
use common::db::SqlConnection;

use crate::report::{RunLog, StepSummary};
use crate::schema::WAREHOUSE_TABLES;

const SUSPEND_FK_CHECKS: &str = "SET FOREIGN_KEY_CHECKS=0";
const RESTORE_FK_CHECKS: &str = "SET FOREIGN_KEY_CHECKS=1";

pub struct WarehouseResetter;

impl WarehouseResetter {
    /// Empties every warehouse table with foreign-key checks suspended.
    ///
    /// Checks are switched back on afterwards whatever happened to the
    /// individual truncates.
    pub async fn reset(warehouse: &dyn SqlConnection, log: &mut RunLog) -> Result<StepSummary> {
        let mut summary = StepSummary::default();

        let suspended = Self::run(warehouse, SUSPEND_FK_CHECKS).await;
        match &suspended {
            Ok(_) => log.success("Foreign key checks suspended"),
            Err(e) => log.failure(e.to_string()),
        }
        summary.record(&suspended);

        for table in WAREHOUSE_TABLES {
            let truncated = Self::run(warehouse, &format!("TRUNCATE TABLE {}", table)).await;
            match &truncated {
                Ok(_) => log.success(format!("Truncated {}", table)),
                Err(e) => log.failure(e.to_string()),
            }
            summary.record(&truncated);
        }

        let restored = Self::run(warehouse, RESTORE_FK_CHECKS).await;
        match &restored {
            Ok(_) => log.success("Foreign key checks restored"),
            Err(e) => log.failure(e.to_string()),
        }
        summary.record(&restored);

        Ok(summary)
    }

    async fn run(warehouse: &dyn SqlConnection, statement: &str) -> Result<u64> {
        warehouse
            .execute(statement, &[])
            .await
            .map_err(|e| Error::Reset {
                statement: statement.to_string(),
                message: e.to_string(),
            })
    }
}
