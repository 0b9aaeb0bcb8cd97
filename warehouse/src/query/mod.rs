pub mod browse;
pub mod executor;
pub mod validator;

pub use browse::{StoreTables, TableBrowser};
pub use executor::{QueryExecutor, QueryOutcome};
pub use validator::QuerySafetyValidator;
