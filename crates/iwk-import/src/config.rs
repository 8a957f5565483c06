//! Configuration management

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::geocoder::DEFAULT_GEOCODING_BASE_URL;

// ============================================================================
// Import Pipeline Constants
// ============================================================================

/// Default number of concurrent enrichment workers.
pub const DEFAULT_WORKERS: usize = 10;

/// Default capacity of the queue between the producer and the workers.
pub const DEFAULT_JOB_QUEUE_CAPACITY: usize = 100;

/// Default capacity of the queue between the workers and the aggregator.
pub const DEFAULT_RESULT_QUEUE_CAPACITY: usize = 100;

/// Default number of orders persisted per store call.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Upper bound on the batch size, so one multi-row insert (10 binds per
/// order) stays under the Postgres limit of 65535 bind parameters.
pub const MAX_BATCH_SIZE: usize = 6_500;

/// Default admission rate of rows per second.
pub const DEFAULT_RATE_PER_SECOND: u32 = 20;

/// Default state an order must resolve to in order to be served.
pub const DEFAULT_REQUIRED_STATE: &str = "New York";

/// Default jurisdiction for the last step of the tax rate fallback.
pub const DEFAULT_TAX_JURISDICTION: &str = "New York State";

// ============================================================================
// Application Constants
// ============================================================================

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/iwk";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

/// Default minimum database connections in the pool.
pub const DEFAULT_DATABASE_MIN_CONNECTIONS: u32 = 2;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default geocoding request timeout in seconds.
pub const DEFAULT_GEOCODING_TIMEOUT_SECS: u64 = 10;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub geocoding: GeocodingConfig,
    pub import: ImportConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
}

/// Geocoding API configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct GeocodingConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl std::fmt::Debug for GeocodingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeocodingConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl DatabaseConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl GeocodingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Import pipeline tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportConfig {
    pub workers: usize,
    pub job_queue_capacity: usize,
    pub result_queue_capacity: usize,
    pub batch_size: usize,
    pub rate_per_second: u32,
    pub required_state: String,
    pub default_tax_jurisdiction: String,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            job_queue_capacity: DEFAULT_JOB_QUEUE_CAPACITY,
            result_queue_capacity: DEFAULT_RESULT_QUEUE_CAPACITY,
            batch_size: DEFAULT_BATCH_SIZE,
            rate_per_second: DEFAULT_RATE_PER_SECOND,
            required_state: DEFAULT_REQUIRED_STATE.to_string(),
            default_tax_jurisdiction: DEFAULT_TAX_JURISDICTION.to_string(),
        }
    }
}

impl ImportConfig {
    /// Read `IMPORT_*` variables, keeping the default for anything unset or unparsable
    pub fn from_env() -> Self {
        Self {
            workers: env_or("IMPORT_WORKERS", DEFAULT_WORKERS),
            job_queue_capacity: env_or("IMPORT_JOB_QUEUE_CAPACITY", DEFAULT_JOB_QUEUE_CAPACITY),
            result_queue_capacity: env_or(
                "IMPORT_RESULT_QUEUE_CAPACITY",
                DEFAULT_RESULT_QUEUE_CAPACITY,
            ),
            batch_size: env_or("IMPORT_BATCH_SIZE", DEFAULT_BATCH_SIZE),
            rate_per_second: env_or("IMPORT_RATE_PER_SECOND", DEFAULT_RATE_PER_SECOND),
            required_state: std::env::var("IMPORT_REQUIRED_STATE")
                .unwrap_or_else(|_| DEFAULT_REQUIRED_STATE.to_string()),
            default_tax_jurisdiction: std::env::var("IMPORT_DEFAULT_TAX_JURISDICTION")
                .unwrap_or_else(|_| DEFAULT_TAX_JURISDICTION.to_string()),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.workers == 0 {
            anyhow::bail!("Import workers must be greater than 0");
        }

        if self.job_queue_capacity == 0 || self.result_queue_capacity == 0 {
            anyhow::bail!("Import queue capacities must be greater than 0");
        }

        if self.batch_size == 0 {
            anyhow::bail!("Import batch size must be greater than 0");
        }

        if self.batch_size > MAX_BATCH_SIZE {
            anyhow::bail!(
                "Import batch size ({}) cannot exceed {}",
                self.batch_size,
                MAX_BATCH_SIZE
            );
        }

        if self.rate_per_second == 0 {
            anyhow::bail!("Import rate must be greater than 0 rows per second");
        }

        if self.required_state.trim().is_empty() {
            anyhow::bail!("Required state cannot be empty");
        }

        if self.default_tax_jurisdiction.trim().is_empty() {
            anyhow::bail!("Default tax jurisdiction cannot be empty");
        }

        Ok(())
    }
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config {
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
                max_connections: env_or(
                    "DATABASE_MAX_CONNECTIONS",
                    DEFAULT_DATABASE_MAX_CONNECTIONS,
                ),
                min_connections: env_or(
                    "DATABASE_MIN_CONNECTIONS",
                    DEFAULT_DATABASE_MIN_CONNECTIONS,
                ),
                connect_timeout_secs: env_or(
                    "DATABASE_CONNECT_TIMEOUT",
                    DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                ),
            },
            geocoding: GeocodingConfig {
                api_key: std::env::var("GEOCODING_API_KEY").unwrap_or_default(),
                base_url: std::env::var("GEOCODING_BASE_URL")
                    .unwrap_or_else(|_| DEFAULT_GEOCODING_BASE_URL.to_string()),
                timeout_secs: env_or("GEOCODING_TIMEOUT_SECS", DEFAULT_GEOCODING_TIMEOUT_SECS),
            },
            import: ImportConfig::from_env(),
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        // Validate database URL
        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        // Validate connection pool settings
        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be greater than 0");
        }

        if self.database.min_connections > self.database.max_connections {
            anyhow::bail!(
                "Database min_connections ({}) cannot exceed max_connections ({})",
                self.database.min_connections,
                self.database.max_connections
            );
        }

        // Validate geocoding settings
        if self.geocoding.api_key.trim().is_empty() {
            anyhow::bail!("GEOCODING_API_KEY must be set");
        }

        if self.geocoding.base_url.is_empty() {
            anyhow::bail!("Geocoding base URL cannot be empty");
        }

        if self.geocoding.timeout_secs == 0 {
            anyhow::bail!("Geocoding timeout must be greater than 0");
        }

        self.import.validate()
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
