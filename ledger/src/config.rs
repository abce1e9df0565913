//! Ledger configuration.

use std::time::Duration;

/// Default number of entries per history page.
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Database connection settings.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
    pub ssl_mode: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: "password".to_string(),
            name: "balance".to_string(),
            ssl_mode: "disable".to_string(),
        }
    }
}

impl DatabaseConfig {
    /// Build a connection URL from the parts.
    pub fn url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            self.user, self.password, self.host, self.port, self.name, self.ssl_mode
        )
    }
}

/// Ledger engine and store configuration.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Entries per history page.
    pub page_size: u32,
    /// Database URL.
    pub database_url: String,
    /// Maximum pooled connections.
    pub max_connections: u32,
    /// How long to wait for a pooled connection.
    pub acquire_timeout: Duration,
    /// Per-statement timeout applied to every connection.
    pub statement_timeout: Duration,
    /// How long a statement may wait on a row lock.
    pub lock_timeout: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            database_url: DatabaseConfig::default().url(),
            max_connections: 10,
            acquire_timeout: Duration::from_secs(5),
            statement_timeout: Duration::from_secs(5),
            lock_timeout: Duration::from_secs(2),
        }
    }
}

impl LedgerConfig {
    /// Load configuration from environment variables.
    ///
    /// `DATABASE_URL` wins over the individual `DB_*` parts.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("DATABASE_URL") {
            config.database_url = url;
        } else {
            let mut db = DatabaseConfig::default();
            if let Ok(host) = std::env::var("DB_HOST") {
                db.host = host;
            }
            if let Some(port) = env_parse("DB_PORT") {
                db.port = port;
            }
            if let Ok(user) = std::env::var("DB_USER") {
                db.user = user;
            }
            if let Ok(password) = std::env::var("DB_PASSWORD") {
                db.password = password;
            }
            if let Ok(name) = std::env::var("DB_NAME") {
                db.name = name;
            }
            if let Ok(ssl_mode) = std::env::var("DB_SSL") {
                db.ssl_mode = ssl_mode;
            }
            config.database_url = db.url();
        }

        if let Some(page_size) = env_parse("PAGINATION_NUM") {
            config.page_size = page_size;
        }

        if let Some(max) = env_parse("DB_MAX_CONNECTIONS") {
            config.max_connections = max;
        }

        if let Some(ms) = env_parse("DB_STATEMENT_TIMEOUT_MS") {
            config.statement_timeout = Duration::from_millis(ms);
        }

        if let Some(ms) = env_parse("DB_LOCK_TIMEOUT_MS") {
            config.lock_timeout = Duration::from_millis(ms);
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.page_size == 0 {
            return Err("Page size must be positive".to_string());
        }

        if self.database_url.is_empty() {
            return Err("Database URL cannot be empty".to_string());
        }

        if self.max_connections == 0 {
            return Err("Max connections must be positive".to_string());
        }

        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|value| value.parse().ok())
}
