// Item source abstraction
//
// A source exposes one logical partition of the collection (one wiki
// namespace) in a fixed order. The driver needs only two operations:
// - count the partition once per pass
// - stream the records starting at an offset

mod memory;
mod postgres;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::types::Item;

pub use memory::MemorySource;
pub use postgres::PgItemSource;

/// Upper bound for a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    Unbounded,
    At(u64),
}

impl Limit {
    pub fn as_option(self) -> Option<u64> {
        match self {
            Limit::Unbounded => None,
            Limit::At(n) => Some(n),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("source unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait ItemSource: Send + Sync {
    /// Number of items in the partition.
    async fn count(&self) -> Result<u64, SourceError>;

    /// Items in source order, starting at `offset`.
    ///
    /// The stream is lazy. Ordering must be identical across calls within a
    /// pass or resumption by offset skips or repeats items.
    fn fetch(&self, offset: u64, limit: Limit) -> BoxStream<'_, Result<Item, SourceError>>;
}
