use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use sqlx::PgPool;

use super::{ItemSource, Limit, SourceError};
use crate::types::Item;

/// Pages of one namespace from a MediaWiki `page` table, ordered by `page_id`.
#[derive(Clone)]
pub struct PgItemSource {
    pool: PgPool,
    namespace: i32,
}

impl PgItemSource {
    pub fn new(pool: PgPool, namespace: i32) -> Self {
        Self { pool, namespace }
    }
}

#[async_trait]
impl ItemSource for PgItemSource {
    async fn count(&self) -> Result<u64, SourceError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM page WHERE page_namespace = $1
            "#,
        )
        .bind(self.namespace)
        .fetch_one(&self.pool)
        .await?;

        Ok(u64::try_from(count).unwrap_or(0))
    }

    fn fetch(&self, offset: u64, limit: Limit) -> BoxStream<'_, Result<Item, SourceError>> {
        let offset = i64::try_from(offset).unwrap_or(i64::MAX);
        // NULL means no limit to Postgres.
        let limit = limit
            .as_option()
            .map(|n| i64::try_from(n).unwrap_or(i64::MAX));

        sqlx::query_scalar::<_, String>(
            r#"
            SELECT page_title FROM page
            WHERE page_namespace = $1
            ORDER BY page_id ASC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(self.namespace)
        .bind(limit)
        .bind(offset)
        .fetch(&self.pool)
        .map(|row| row.map(Item::new).map_err(SourceError::from))
        .boxed()
    }
}
