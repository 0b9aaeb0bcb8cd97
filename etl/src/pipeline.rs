use common::db::SqlConnection;
use common::{Error, Result};
use serde::Serialize;
use std::fmt;
use std::ops::ControlFlow;

use crate::loaders::{
    BranchLoader, CustomerLoader, DatetimeLoader, FactLoader, KeyMaps, ProductLoader,
};
use crate::report::{LogEntry, LogStatus, RunLog, StepSummary};
use crate::reset::WarehouseResetter;
use crate::schema::SchemaProvisioner;
use crate::sources::{SourceConnections, SourceSystem};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Provision,
    Reset,
    LoadBranches,
    LoadCustomers,
    LoadProducts,
    LoadDates,
    BuildKeyMaps,
    LoadFacts(SourceSystem),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    Continue,
    Abort,
}

impl Step {
    /// What the run does when this step as a whole returns an error.
    /// Statement-level failures never reach here; steps log those themselves.
    pub fn on_failure(self) -> FailurePolicy {
        match self {
            // Without key maps no fact row can be resolved
            Step::BuildKeyMaps => FailurePolicy::Abort,
            _ => FailurePolicy::Continue,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Provision => write!(f, "Ensuring warehouse tables exist"),
            Step::Reset => write!(f, "Resetting warehouse data"),
            Step::LoadBranches => write!(f, "Loading BranchDim"),
            Step::LoadCustomers => write!(f, "Loading CustomerDim"),
            Step::LoadProducts => write!(f, "Loading ProductDim"),
            Step::LoadDates => write!(f, "Loading DatetimeDim"),
            Step::BuildKeyMaps => write!(f, "Building key maps"),
            Step::LoadFacts(source) => write!(f, "Loading FactSales from {}", source),
        }
    }
}

/// Outcome of one full ETL run.
#[derive(Debug, Clone, Serialize)]
pub struct EtlReport {
    pub completed: bool,
    pub log: Vec<LogEntry>,
    pub facts_loaded: usize,
    pub facts_skipped: usize,
}

impl EtlReport {
    fn finish(log: RunLog, completed: bool, facts: StepSummary) -> Self {
        Self {
            completed,
            log: log.into_entries(),
            facts_loaded: facts.succeeded,
            facts_skipped: facts.skipped,
        }
    }

    /// Report of a run that could not start, e.g. an unreachable store.
    pub fn not_started(reason: impl fmt::Display) -> Self {
        let mut log = RunLog::new();
        log.failure(reason.to_string());
        Self::finish(log, false, StepSummary::default())
    }

    /// The log as display lines, status marker included.
    pub fn lines(&self) -> Vec<String> {
        self.log.iter().map(|e| e.to_string()).collect()
    }

    pub fn failures(&self) -> usize {
        self.log
            .iter()
            .filter(|e| e.status == LogStatus::Failure)
            .count()
    }
}

/// Full-refresh ETL from both operational stores into the warehouse.
///
/// Every statement is awaited before the next is issued and each commits on
/// its own; a run that stops part way leaves the warehouse partially loaded.
pub struct EtlOrchestrator<'a> {
    sources: SourceConnections<'a>,
    warehouse: &'a dyn SqlConnection,
}

impl<'a> EtlOrchestrator<'a> {
    pub fn new(
        db1: &'a dyn SqlConnection,
        db2: &'a dyn SqlConnection,
        warehouse: &'a dyn SqlConnection,
    ) -> Self {
        Self {
            sources: SourceConnections { db1, db2 },
            warehouse,
        }
    }

    /// Every store must answer a ping first. An unreachable store fails the
    /// run with a single connection line and nothing is touched.
    pub async fn run(&self) -> EtlReport {
        if let Err(e) = self.check_connections().await {
            return EtlReport::not_started(e);
        }

        let mut log = RunLog::new();
        let mut facts = StepSummary::default();

        let step = Step::Provision;
        log.info(format!("{}...", step));
        let result = SchemaProvisioner::provision(self.warehouse, &mut log).await;
        if settle(step, result, &mut log).is_break() {
            return EtlReport::finish(log, false, facts);
        }

        let step = Step::Reset;
        log.info(format!("{}...", step));
        let result = WarehouseResetter::reset(self.warehouse, &mut log).await;
        if settle(step, result, &mut log).is_break() {
            return EtlReport::finish(log, false, facts);
        }

        let step = Step::LoadBranches;
        log.info(format!("{}...", step));
        let result = BranchLoader::load(self.warehouse, &mut log).await;
        if settle(step, result, &mut log).is_break() {
            return EtlReport::finish(log, false, facts);
        }

        let step = Step::LoadCustomers;
        log.info(format!("{}...", step));
        let result = CustomerLoader::load(self.sources, self.warehouse, &mut log).await;
        if settle(step, result, &mut log).is_break() {
            return EtlReport::finish(log, false, facts);
        }

        let step = Step::LoadProducts;
        log.info(format!("{}...", step));
        let result = ProductLoader::load(self.sources, self.warehouse, &mut log).await;
        if settle(step, result, &mut log).is_break() {
            return EtlReport::finish(log, false, facts);
        }

        let step = Step::LoadDates;
        log.info(format!("{}...", step));
        let result = DatetimeLoader::load(self.sources, self.warehouse, &mut log).await;
        if settle(step, result, &mut log).is_break() {
            return EtlReport::finish(log, false, facts);
        }

        let step = Step::BuildKeyMaps;
        log.info(format!("{}...", step));
        let result = KeyMaps::rebuild(self.warehouse).await;
        let ControlFlow::Continue(Some(keys)) = settle(step, result, &mut log) else {
            return EtlReport::finish(log, false, facts);
        };
        log.success(format!(
            "Key maps built: {} customers, {} products, {} dates",
            keys.customers.len(),
            keys.products.len(),
            keys.dates.len()
        ));

        for source in SourceSystem::ALL {
            let step = Step::LoadFacts(source);
            log.info(format!("{}...", step));
            let conn = self.sources.get(source);
            let result = FactLoader::load(source, conn, self.warehouse, &keys, &mut log).await;
            match settle(step, result, &mut log) {
                ControlFlow::Continue(Some(summary)) => {
                    facts.succeeded += summary.succeeded;
                    facts.failed += summary.failed;
                    facts.skipped += summary.skipped;
                }
                ControlFlow::Continue(None) => {}
                ControlFlow::Break(()) => return EtlReport::finish(log, false, facts),
            }
        }

        log.success("ETL COMPLETE!");
        EtlReport::finish(log, true, facts)
    }

    async fn check_connections(&self) -> Result<()> {
        let stores = [self.warehouse, self.sources.db1, self.sources.db2];
        for conn in stores {
            conn.ping()
                .await
                .map_err(|e| Error::connection(conn.name(), e))?;
        }
        Ok(())
    }
}

/// Applies the step's failure policy to its result.
fn settle<T>(step: Step, result: Result<T>, log: &mut RunLog) -> ControlFlow<(), Option<T>> {
    match result {
        Ok(value) => ControlFlow::Continue(Some(value)),
        Err(e) => match step.on_failure() {
            FailurePolicy::Continue => {
                log.failure(format!("{} failed, continuing: {}", step, e));
                ControlFlow::Continue(None)
            }
            FailurePolicy::Abort => {
                log.failure(format!("{} failed: {}", step, e));
                log.failure("ETL ABORTED");
                ControlFlow::Break(())
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_key_map_failure_aborts() {
        assert_eq!(Step::BuildKeyMaps.on_failure(), FailurePolicy::Abort);
        for step in [
            Step::Provision,
            Step::Reset,
            Step::LoadBranches,
            Step::LoadCustomers,
            Step::LoadProducts,
            Step::LoadDates,
            Step::LoadFacts(SourceSystem::Db1),
        ] {
            assert_eq!(step.on_failure(), FailurePolicy::Continue, "{}", step);
        }
    }

    #[test]
    fn test_settle_logs_and_continues() {
        let mut log = RunLog::new();
        let flow = settle::<()>(
            Step::LoadFacts(SourceSystem::Db2),
            Err(Error::Execution("Table 'Purchase' doesn't exist".into())),
            &mut log,
        );

        assert_eq!(flow, ControlFlow::Continue(None));
        assert_eq!(
            log.entries()[0].to_string(),
            "❌ Loading FactSales from db2 failed, continuing: Table 'Purchase' doesn't exist"
        );
    }

    #[test]
    fn test_not_started_report() {
        let report = EtlReport::not_started("Connection to warehouse failed: refused");
        assert!(!report.completed);
        assert_eq!(report.lines(), vec!["❌ Connection to warehouse failed: refused"]);
        assert_eq!(report.failures(), 1);
    }
}
