use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::{Arc, RwLock};

use super::{ItemSource, Limit, SourceError};
use crate::types::Item;

/// In-memory source backed by a shared vector of items.
///
/// Cloning shares the underlying items, so a test can mutate the collection
/// between slices with [`MemorySource::push`] or [`MemorySource::truncate`].
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    items: Arc<RwLock<Vec<Item>>>,
}

impl MemorySource {
    pub fn new(items: Vec<Item>) -> Self {
        Self {
            items: Arc::new(RwLock::new(items)),
        }
    }

    /// Source with `count` items titled `Page_0`, `Page_1`, ...
    pub fn with_pages(count: usize) -> Self {
        Self::new((0..count).map(|i| Item::new(format!("Page_{i}"))).collect())
    }

    pub fn push(&self, item: Item) {
        self.write().push(item);
    }

    pub fn truncate(&self, len: usize) {
        self.write().truncate(len);
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<Item>> {
        self.items.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<Item>> {
        self.items.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ItemSource for MemorySource {
    async fn count(&self) -> Result<u64, SourceError> {
        Ok(self.read().len() as u64)
    }

    fn fetch(&self, offset: u64, limit: Limit) -> BoxStream<'_, Result<Item, SourceError>> {
        // Snapshot the slice so the stream doesn't hold the lock across awaits.
        let items = self.read();
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(items.len());
        let end = match limit.as_option() {
            Some(n) => start
                .saturating_add(usize::try_from(n).unwrap_or(usize::MAX))
                .min(items.len()),
            None => items.len(),
        };
        let snapshot: Vec<Item> = items[start..end].to_vec();

        stream::iter(snapshot.into_iter().map(Ok)).boxed()
    }
}
