use thiserror::Error;
use url::ParseError;

pub mod config;
pub mod db;
pub mod retry;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),

    #[error("Lock error: {0}")]
    Lock(#[from] tokio::sync::TryLockError),

    #[error("Connection to {store} failed: {message}")]
    Connection { store: String, message: String },

    #[error("Provisioning {table} failed: {message}")]
    Provisioning { table: String, message: String },

    #[error("Reset statement `{statement}` failed: {message}")]
    Reset { statement: String, message: String },

    #[error("Unresolved {dimension} key '{key}'")]
    RowResolution { dimension: String, key: String },

    #[error("{0}")]
    Validation(String),

    // Carries the backend's own error text untouched
    #[error("{0}")]
    Execution(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn connection(store: impl Into<String>, message: impl ToString) -> Self {
        Error::Connection {
            store: store.into(),
            message: message.to_string(),
        }
    }
}

impl From<mysql_async::Error> for Error {
    fn from(err: mysql_async::Error) -> Self {
        match err {
            // The server's own message, without the driver's code/state wrapper
            mysql_async::Error::Server(server) => Error::Execution(server.message),
            other => Error::Execution(other.to_string()),
        }
    }
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Self {
        Error::InvalidInput(format!("URL parse error: {}", err))
    }
}
