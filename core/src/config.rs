//! Configuration loading
//!
//! Sources are layered, later ones winning:
//! 1. Built-in defaults
//! 2. Config file (`pagesweep.toml` in the working directory, or the path given
//!    by `PAGESWEEP_CONFIG_PATH` / the builder)
//! 3. Environment variables: `PAGESWEEP_DATABASE_URL`, and nested keys with a
//!    double underscore, e.g. `PAGESWEEP_BATCH__TIME_LIMIT_SECS`
//! 4. Explicit builder overrides (CLI flags)
//!
//! A `.env` file is loaded first if present.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

const ENV_PREFIX: &str = "PAGESWEEP";
const DEFAULT_CONFIG_FILE: &str = "pagesweep";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("database URL is not set (use --database-url, PAGESWEEP_DATABASE_URL or database.url)")]
    MissingDatabaseUrl,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub batch: BatchConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchConfig {
    /// Wall-clock budget per slice, in seconds.
    pub time_limit_secs: f64,
    /// Wiki namespace swept by a pass.
    pub namespace: i32,
}

impl BatchConfig {
    /// Budget per slice. Zero, negative or NaN settings mean one item per slice.
    pub fn budget(&self) -> Duration {
        if self.time_limit_secs.is_nan() || self.time_limit_secs <= 0.0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(self.time_limit_secs).unwrap_or(Duration::MAX)
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Load with no overrides.
    pub fn load() -> Result<Self, ConfigError> {
        Self::builder().build()
    }

    /// Database URL, present once loading has validated it.
    pub fn database_url(&self) -> Result<&str, ConfigError> {
        self.database
            .url
            .as_deref()
            .ok_or(ConfigError::MissingDatabaseUrl)
    }
}

#[derive(Debug, Default)]
pub struct ConfigBuilder {
    database_url: Option<String>,
    config_path: Option<PathBuf>,
    time_limit_secs: Option<f64>,
    namespace: Option<i32>,
}

impl ConfigBuilder {
    pub fn database_url(mut self, url: Option<String>) -> Self {
        self.database_url = url;
        self
    }

    pub fn config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    pub fn time_limit_secs(mut self, secs: Option<f64>) -> Self {
        self.time_limit_secs = secs;
        self
    }

    pub fn namespace(mut self, namespace: Option<i32>) -> Self {
        self.namespace = namespace;
        self
    }

    pub fn build(self) -> Result<Config, ConfigError> {
        let _ = dotenvy::dotenv();

        let config_path = self.config_path.or_else(|| {
            std::env::var(format!("{ENV_PREFIX}_CONFIG_PATH"))
                .ok()
                .map(PathBuf::from)
        });

        let file = match config_path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let loaded: Config = config::Config::builder()
            .set_default("database.max_connections", 5_i64)?
            .set_default("database.min_connections", 1_i64)?
            .set_default("database.acquire_timeout_secs", 10_i64)?
            .set_default("database.idle_timeout_secs", 600_i64)?
            .set_default("database.max_lifetime_secs", 1800_i64)?
            .set_default("batch.time_limit_secs", 0.2_f64)?
            .set_default("batch.namespace", 0_i64)?
            .add_source(file)
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .set_override_option(
                "database.url",
                std::env::var(format!("{ENV_PREFIX}_DATABASE_URL")).ok(),
            )?
            .set_override_option("database.url", self.database_url)?
            .set_override_option("batch.time_limit_secs", self.time_limit_secs)?
            .set_override_option("batch.namespace", self.namespace.map(i64::from))?
            .build()?
            .try_deserialize()?;

        loaded.database_url()?;

        if loaded.batch.budget().is_zero() {
            tracing::warn!(
                time_limit_secs = loaded.batch.time_limit_secs,
                "Non-positive time limit, each slice will process a single page"
            );
        }

        Ok(loaded)
    }
}
