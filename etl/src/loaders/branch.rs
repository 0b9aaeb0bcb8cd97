use common::Result;
use common::db::{SqlConnection, SqlValue};

use crate::report::{RunLog, StepSummary};
use crate::sources::SourceSystem;

const INSERT_BRANCH: &str = "INSERT INTO BranchDim (City, Province, Country) VALUES (?, ?, ?)";

pub struct BranchLoader;

impl BranchLoader {
    /// Inserts one fixed branch per source, in source order, so that db1's
    /// branch gets key 1 and db2's key 2.
    pub async fn load(warehouse: &dyn SqlConnection, log: &mut RunLog) -> Result<StepSummary> {
        let mut summary = StepSummary::default();

        for source in SourceSystem::ALL {
            let seed = source.branch();
            let result = warehouse
                .execute(
                    INSERT_BRANCH,
                    &[
                        SqlValue::from(seed.city),
                        SqlValue::from(seed.province),
                        SqlValue::from(seed.country),
                    ],
                )
                .await;
            if let Err(e) = &result {
                log.failure(format!("Inserting branch for {} failed: {}", source, e));
            }
            summary.record(&result);
        }

        log.success(format!("Loaded {} rows into BranchDim", summary.succeeded));
        Ok(summary)
    }
}
