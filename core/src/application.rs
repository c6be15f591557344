//! Application wiring
//!
//! Builds the config, the database pool and the sweep service from
//! [`InitOptions`]. Everything that talks to the outside world is created
//! here so the driver itself stays free of globals.

use anyhow::{Context, Result};
use sqlx::PgPool;
use std::sync::Arc;

use crate::config::Config;
use crate::db;
use crate::processor::{ItemProcessor, LogProcessor, TouchProcessor};
use crate::services::SweepService;
use crate::source::PgItemSource;

/// The application instance with all services
pub struct Application {
    pub config: Config,
    pub pool: PgPool,
    pub sweep_service: SweepService,
}

impl Application {
    /// Create a new Application instance (pure instantiation, no I/O)
    pub fn new(config: Config, pool: PgPool, dry_run: bool) -> Self {
        let namespace = config.batch.namespace;
        let source = Arc::new(PgItemSource::new(pool.clone(), namespace));
        let processor: Arc<dyn ItemProcessor> = if dry_run {
            Arc::new(LogProcessor)
        } else {
            Arc::new(TouchProcessor::new(pool.clone(), namespace))
        };

        Self {
            sweep_service: SweepService::new(source, processor, config.batch.budget()),
            config,
            pool,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

/// Options for initializing the application
#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    /// Database URL (overrides config file and env vars)
    pub database_url: Option<String>,

    /// Config file path (overrides default search)
    pub config_path: Option<String>,

    /// Per-slice time limit in seconds (overrides config)
    pub time_limit_secs: Option<f64>,

    /// Wiki namespace to sweep (overrides config)
    pub namespace: Option<i32>,

    /// Only log visited pages instead of touching them
    pub dry_run: bool,
}

/// Builder for constructing InitOptions
#[derive(Default)]
pub struct InitBuilder {
    options: InitOptions,
}

impl InitBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.options.database_url = Some(url.into());
        self
    }

    pub fn config_path(mut self, path: impl Into<String>) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn time_limit_secs(mut self, secs: f64) -> Self {
        self.options.time_limit_secs = Some(secs);
        self
    }

    pub fn namespace(mut self, namespace: i32) -> Self {
        self.options.namespace = Some(namespace);
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.options.dry_run = dry_run;
        self
    }

    pub async fn init(self) -> Result<Application> {
        initialize(self.options).await
    }
}

/// Load config, connect, check the page table, and build the application.
pub async fn initialize(options: InitOptions) -> Result<Application> {
    let config = Config::builder()
        .database_url(options.database_url)
        .config_path(options.config_path.map(std::path::PathBuf::from))
        .time_limit_secs(options.time_limit_secs)
        .namespace(options.namespace)
        .build()
        .context("Failed to load configuration")?;

    let pool = db::create_pool(&config.database).await?;
    db::check_page_table(&pool).await?;

    tracing::debug!(
        namespace = config.batch.namespace,
        time_limit_secs = config.batch.time_limit_secs,
        dry_run = options.dry_run,
        "Application initialized"
    );

    Ok(Application::new(config, pool, options.dry_run))
}
