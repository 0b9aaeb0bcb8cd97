use config::{Config, ConfigError};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::db::StoreId;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub db1: DatabaseConfig,
    pub db2: DatabaseConfig,
    pub warehouse: DatabaseConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub connect: ConnectConfig,
    #[serde(default = "default_api_host")]
    pub api_host: String,
    #[serde(default = "default_api_port")]
    pub api_port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    #[serde(default = "default_mysql_port")]
    pub port: u16,
    pub user: String,
    #[serde(default)]
    pub password: String,
    pub database: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct QueryConfig {
    /// Cap appended to ad hoc queries that carry no LIMIT of their own.
    #[serde(default = "default_row_limit")]
    pub row_limit: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConnectConfig {
    #[serde(default = "default_connect_retries")]
    pub retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            row_limit: default_row_limit(),
        }
    }
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            retries: default_connect_retries(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

fn default_api_host() -> String {
    "127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
    3000
}

fn default_mysql_port() -> u16 {
    3306
}

fn default_row_limit() -> usize {
    200
}

fn default_connect_retries() -> u32 {
    2
}

fn default_base_delay_ms() -> u64 {
    250
}

impl DatabaseConfig {
    /// Builds a `mysql://` URL with user and password percent-encoded.
    pub fn connection_url(&self) -> crate::Result<Url> {
        let mut url = Url::parse(&format!(
            "mysql://{}:{}/{}",
            self.host, self.port, self.database
        ))?;
        url.set_username(&self.user)
            .map_err(|_| crate::Error::InvalidInput(format!("invalid user '{}'", self.user)))?;
        if !self.password.is_empty() {
            url.set_password(Some(&self.password))
                .map_err(|_| crate::Error::InvalidInput("invalid password".to_string()))?;
        }
        Ok(url)
    }

    /// `user@host:port/database`, safe for logs.
    pub fn redacted(&self) -> String {
        format!("{}@{}:{}/{}", self.user, self.host, self.port, self.database)
    }
}

impl Settings {
    pub fn new(path: &str) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        // Build the configuration
        let config = builder.build()?;

        let settings: Settings = config.try_deserialize()?;

        debug!(
            db1 = %settings.db1.redacted(),
            db2 = %settings.db2.redacted(),
            warehouse = %settings.warehouse.redacted(),
            row_limit = settings.query.row_limit,
            "Loaded settings"
        );

        Ok(settings)
    }

    pub fn database(&self, store: StoreId) -> &DatabaseConfig {
        match store {
            StoreId::Warehouse => &self.warehouse,
            StoreId::Db1 => &self.db1,
            StoreId::Db2 => &self.db2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    const MINIMAL: &str = r#"
[db1]
host = "localhost"
user = "shop1"
password = "p@ss word"
database = "database1"

[db2]
host = "localhost"
port = 3307
user = "shop2"
database = "database2"

[warehouse]
host = "dw.internal"
user = "dw"
password = "secret"
database = "datawarehouse"
"#;

    #[test]
    fn test_settings_defaults() {
        let file = write_config(MINIMAL);
        let settings = Settings::new(file.path().to_str().unwrap()).unwrap();

        assert_eq!(settings.db1.port, 3306);
        assert_eq!(settings.db2.port, 3307);
        assert_eq!(settings.query.row_limit, 200);
        assert_eq!(settings.connect.retries, 2);
        assert_eq!(settings.api_port, 3000);
        assert_eq!(settings.database(StoreId::Warehouse).database, "datawarehouse");
    }

    #[test]
    fn test_connection_url_encodes_credentials() {
        let file = write_config(MINIMAL);
        let settings = Settings::new(file.path().to_str().unwrap()).unwrap();

        let url = settings.db1.connection_url().unwrap();
        assert_eq!(url.scheme(), "mysql");
        assert_eq!(url.username(), "shop1");
        assert_eq!(url.password(), Some("p%40ss%20word"));
        assert_eq!(url.path(), "/database1");

        let no_password = settings.db2.connection_url().unwrap();
        assert_eq!(no_password.password(), None);
        assert_eq!(no_password.port(), Some(3307));
    }

    #[test]
    fn test_redacted_hides_password() {
        let file = write_config(MINIMAL);
        let settings = Settings::new(file.path().to_str().unwrap()).unwrap();

        let shown = settings.warehouse.redacted();
        assert_eq!(shown, "dw@dw.internal:3306/datawarehouse");
        assert!(!shown.contains("secret"));
    }
}
