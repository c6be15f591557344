//! Per-item processing
//!
//! Processors never return errors to the driver. Anything that goes wrong
//! with a single page is reported as [`ItemOutcome::Failed`], which the driver
//! logs and counts before moving on to the next page.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;

use crate::types::Item;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// The item was processed.
    Done,
    /// The item was looked at but needed no work.
    Skipped(String),
    /// Processing failed; the pass continues regardless.
    Failed(String),
}

/// Transformation applied to every item of a pass.
///
/// Implementations must be idempotent: items may be seen more than once when
/// a slice is retried or two passes overlap.
#[async_trait]
pub trait ItemProcessor: Send + Sync {
    async fn process(&self, item: &Item) -> ItemOutcome;
}

/// Processor that only logs what it visits. Used for dry runs.
#[derive(Debug, Clone, Default)]
pub struct LogProcessor;

#[async_trait]
impl ItemProcessor for LogProcessor {
    async fn process(&self, item: &Item) -> ItemOutcome {
        tracing::info!(item = %item, "Visiting page");
        ItemOutcome::Done
    }
}

/// Processor that bumps `page_touched` so the wiki re-renders the page.
#[derive(Clone)]
pub struct TouchProcessor {
    pool: PgPool,
    namespace: i32,
}

impl TouchProcessor {
    pub fn new(pool: PgPool, namespace: i32) -> Self {
        Self { pool, namespace }
    }
}

#[async_trait]
impl ItemProcessor for TouchProcessor {
    async fn process(&self, item: &Item) -> ItemOutcome {
        let result = sqlx::query(
            r#"
            UPDATE page
            SET page_touched = $1
            WHERE page_namespace = $2 AND page_title = $3
            "#,
        )
        .bind(Utc::now())
        .bind(self.namespace)
        .bind(&item.title)
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) if done.rows_affected() == 0 => {
                ItemOutcome::Skipped("page no longer exists".to_string())
            }
            Ok(_) => ItemOutcome::Done,
            Err(err) => ItemOutcome::Failed(err.to_string()),
        }
    }
}
