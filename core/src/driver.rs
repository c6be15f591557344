//! Time-boxed batch driver
//!
//! One call to [`run_slice`] is one slice of a pass: it walks the source from
//! the resume offset, processing items one at a time, until either the
//! collection is exhausted or the budget is spent. The budget is checked only
//! between items, so an item that is already running always completes and a
//! slice over a non-empty remainder always makes progress.
//!
//! Nothing is kept between slices. The returned [`PassResult`] carries all
//! the state needed to continue, and the caller decides when (or whether) to
//! run the next slice.

use futures::StreamExt;
use std::time::Duration;
use tokio::time::Instant;

use crate::processor::{ItemOutcome, ItemProcessor};
use crate::source::{ItemSource, Limit, SourceError};
use crate::types::{PassResult, ResumeState};

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("failed to count items")]
    Count(#[source] SourceError),

    #[error("failed to fetch items at offset {offset}")]
    Fetch {
        offset: u64,
        #[source]
        source: SourceError,
    },
}

/// Run one slice of a pass starting from `state`.
///
/// On error no result is produced and `state` stays valid for a retry.
pub async fn run_slice<S, P>(
    source: &S,
    processor: &P,
    state: ResumeState,
    budget: Duration,
) -> Result<PassResult, DriverError>
where
    S: ItemSource + ?Sized,
    P: ItemProcessor + ?Sized,
{
    let started = Instant::now();

    let mut total = match state.total {
        Some(total) => total,
        None => {
            let total = source.count().await.map_err(DriverError::Count)?;
            tracing::info!(total, "Counted items for new pass");
            total
        }
    };

    let mut offset = state.offset;
    let mut last_processed = None;
    let mut processed = 0u64;
    let mut failed = 0u64;

    if offset >= total {
        // Nothing left. A forged offset past the end is pulled back to it.
        offset = total;
    } else {
        let mut items = source.fetch(offset, Limit::Unbounded);
        let mut exhausted = false;

        loop {
            let Some(next) = items.next().await else {
                exhausted = true;
                break;
            };
            let item = next.map_err(|source| DriverError::Fetch { offset, source })?;

            match processor.process(&item).await {
                ItemOutcome::Done => {}
                ItemOutcome::Skipped(reason) => {
                    tracing::debug!(item = %item, offset, %reason, "Item skipped");
                }
                ItemOutcome::Failed(reason) => {
                    failed += 1;
                    tracing::warn!(item = %item, offset, %reason, "Item processing failed");
                }
            }

            offset += 1;
            processed += 1;
            last_processed = Some(item);

            // Items added after the pass was counted are left for the next pass.
            if offset >= total || started.elapsed() >= budget {
                break;
            }
        }

        if exhausted && offset < total {
            tracing::warn!(
                offset,
                total,
                "Source ran out before the counted total, ending pass early"
            );
            total = offset;
        }
    }

    let finished = offset >= total;
    let reload_count = if finished {
        state.reload_count
    } else {
        state.reload_count.saturating_add(1)
    };

    tracing::info!(
        offset,
        total,
        reload_count,
        processed,
        failed,
        finished,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Slice done"
    );

    Ok(PassResult {
        last_processed,
        new_offset: offset,
        total,
        reload_count,
        finished,
        processed,
        failed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;
    use crate::types::Item;
    use async_trait::async_trait;
    use futures::stream::{self, BoxStream, StreamExt};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /* ===================== Helpers ===================== */

    /// Processor that takes a fixed amount of (paused) time per item.
    #[derive(Default)]
    struct TimedProcessor {
        per_item: Duration,
        fail_on: Option<&'static str>,
        seen: Mutex<Vec<String>>,
    }

    impl TimedProcessor {
        fn new(per_item: Duration) -> Self {
            Self {
                per_item,
                ..Default::default()
            }
        }

        fn seen(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ItemProcessor for TimedProcessor {
        async fn process(&self, item: &Item) -> ItemOutcome {
            tokio::time::sleep(self.per_item).await;
            self.seen.lock().unwrap().push(item.title.clone());
            if self.fail_on == Some(item.title.as_str()) {
                return ItemOutcome::Failed("boom".to_string());
            }
            ItemOutcome::Done
        }
    }

    /// Source that fails once when asked to fetch at `fail_at`, then recovers.
    struct FlakySource {
        inner: MemorySource,
        fail_at: u64,
        failed: AtomicBool,
    }

    #[async_trait]
    impl ItemSource for FlakySource {
        async fn count(&self) -> Result<u64, SourceError> {
            self.inner.count().await
        }

        fn fetch(&self, offset: u64, limit: Limit) -> BoxStream<'_, Result<Item, SourceError>> {
            if offset == self.fail_at && !self.failed.swap(true, Ordering::SeqCst) {
                return stream::once(async {
                    Err(SourceError::Unavailable("connection reset".to_string()))
                })
                .boxed();
            }
            self.inner.fetch(offset, limit)
        }
    }

    /// Source whose stream breaks after yielding a few items.
    struct BrokenStreamSource {
        inner: MemorySource,
        good_items: usize,
    }

    #[async_trait]
    impl ItemSource for BrokenStreamSource {
        async fn count(&self) -> Result<u64, SourceError> {
            self.inner.count().await
        }

        fn fetch(&self, offset: u64, limit: Limit) -> BoxStream<'_, Result<Item, SourceError>> {
            self.inner
                .fetch(offset, limit)
                .take(self.good_items)
                .chain(stream::once(async {
                    Err(SourceError::Unavailable("stream dropped".to_string()))
                }))
                .boxed()
        }
    }

    struct DownSource;

    #[async_trait]
    impl ItemSource for DownSource {
        async fn count(&self) -> Result<u64, SourceError> {
            Err(SourceError::Unavailable("down".to_string()))
        }

        fn fetch(&self, _offset: u64, _limit: Limit) -> BoxStream<'_, Result<Item, SourceError>> {
            stream::empty().boxed()
        }
    }

    /// Feed each result back in until the pass finishes.
    async fn run_pass<S: ItemSource>(
        source: &S,
        processor: &TimedProcessor,
        budget: Duration,
    ) -> Vec<PassResult> {
        let mut results = Vec::new();
        let mut state = ResumeState::fresh();
        loop {
            let result = run_slice(source, processor, state, budget).await.unwrap();
            let next = result.next_state();
            results.push(result);
            match next {
                Some(next) => state = next,
                None => return results,
            }
        }
    }

    /* ===================== Scenarios ===================== */

    #[tokio::test(start_paused = true)]
    async fn test_two_items_per_slice() {
        let source = MemorySource::with_pages(5);
        let processor = TimedProcessor::new(Duration::from_secs(1));

        let results = run_pass(&source, &processor, Duration::from_millis(1500)).await;

        let offsets: Vec<u64> = results.iter().map(|r| r.new_offset).collect();
        let reloads: Vec<u64> = results.iter().map(|r| r.reload_count).collect();
        let finished: Vec<bool> = results.iter().map(|r| r.finished).collect();
        assert_eq!(offsets, vec![2, 4, 5]);
        assert_eq!(reloads, vec![1, 2, 2]);
        assert_eq!(finished, vec![false, false, true]);

        let expected: Vec<String> = (0..5).map(|i| format!("Page_{i}")).collect();
        assert_eq!(processor.seen(), expected);
        assert_eq!(results[2].last_processed, Some(Item::new("Page_4")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_collection_finishes_immediately() {
        let source = MemorySource::with_pages(0);
        let processor = TimedProcessor::new(Duration::from_secs(1));

        let result = run_slice(&source, &processor, ResumeState::fresh(), Duration::from_secs(1))
            .await
            .unwrap();

        assert!(result.finished);
        assert_eq!(result.new_offset, 0);
        assert_eq!(result.total, 0);
        assert_eq!(result.reload_count, 0);
        assert_eq!(result.last_processed, None);
        assert!(result.next_state().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unlimited_budget_single_slice() {
        let source = MemorySource::with_pages(20);
        let processor = TimedProcessor::new(Duration::from_secs(60));

        let results = run_pass(&source, &processor, Duration::MAX).await;

        assert_eq!(results.len(), 1);
        assert!(results[0].finished);
        assert_eq!(results[0].new_offset, 20);
        assert_eq!(results[0].reload_count, 0);
        assert_eq!(results[0].processed, 20);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_failure_then_retry_from_same_state() {
        let source = FlakySource {
            inner: MemorySource::with_pages(10),
            fail_at: 3,
            failed: AtomicBool::new(false),
        };
        let processor = TimedProcessor::new(Duration::from_secs(1));
        let state = ResumeState {
            offset: 3,
            total: Some(10),
            reload_count: 1,
        };

        let err = run_slice(&source, &processor, state, Duration::from_millis(2500))
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::Fetch { offset: 3, .. }));
        assert!(processor.seen().is_empty());

        let result = run_slice(&source, &processor, state, Duration::from_millis(2500))
            .await
            .unwrap();
        assert_eq!(result.new_offset, 6);
        assert_eq!(processor.seen(), vec!["Page_3", "Page_4", "Page_5"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_error_mid_slice_aborts() {
        let source = BrokenStreamSource {
            inner: MemorySource::with_pages(10),
            good_items: 2,
        };
        let processor = TimedProcessor::new(Duration::from_millis(10));
        let state = ResumeState {
            offset: 3,
            total: Some(10),
            reload_count: 0,
        };

        let err = run_slice(&source, &processor, state, Duration::MAX)
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::Fetch { offset: 5, .. }));
        assert_eq!(processor.seen(), vec!["Page_3", "Page_4"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_count_failure() {
        let processor = TimedProcessor::new(Duration::ZERO);
        let err = run_slice(&DownSource, &processor, ResumeState::fresh(), Duration::MAX)
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::Count(_)));
    }

    /* ===================== Budget ===================== */

    #[tokio::test(start_paused = true)]
    async fn test_budget_exceeded_on_first_item_still_progresses() {
        let source = MemorySource::with_pages(3);
        let processor = TimedProcessor::new(Duration::from_secs(10));

        let result = run_slice(&source, &processor, ResumeState::fresh(), Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(result.new_offset, 1);
        assert_eq!(result.processed, 1);
        assert!(!result.finished);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_budget_processes_one_item_per_slice() {
        let source = MemorySource::with_pages(4);
        let processor = TimedProcessor::new(Duration::ZERO);

        let results = run_pass(&source, &processor, Duration::ZERO).await;

        let offsets: Vec<u64> = results.iter().map(|r| r.new_offset).collect();
        assert_eq!(offsets, vec![1, 2, 3, 4]);
        assert_eq!(results.last().unwrap().reload_count, 3);
    }

    /* ===================== Properties ===================== */

    #[tokio::test(start_paused = true)]
    async fn test_offsets_monotonic_and_terminate() {
        let cases = [(1, 5, 1), (7, 100, 250), (13, 30, 95), (25, 1, 1000)];
        for (pages, per_item_ms, budget_ms) in cases {
            let source = MemorySource::with_pages(pages);
            let processor = TimedProcessor::new(Duration::from_millis(per_item_ms));

            let results = run_pass(&source, &processor, Duration::from_millis(budget_ms)).await;

            assert!(results.len() <= pages);
            let mut previous = 0;
            for result in &results {
                assert!(result.new_offset > previous);
                previous = result.new_offset;
            }
            let last = results.last().unwrap();
            assert!(last.finished);
            assert_eq!(last.new_offset, last.total);
            assert_eq!(last.total, pages as u64);
            assert_eq!(processor.seen().len(), pages);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_reload_count_strictly_increases_while_suspended() {
        let source = MemorySource::with_pages(6);
        let processor = TimedProcessor::new(Duration::from_secs(1));

        let results = run_pass(&source, &processor, Duration::ZERO).await;

        for pair in results.windows(2) {
            if !pair[1].finished {
                assert!(pair[1].reload_count > pair[0].reload_count);
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_soft_failures_do_not_stop_the_slice() {
        let source = MemorySource::with_pages(4);
        let processor = TimedProcessor {
            per_item: Duration::ZERO,
            fail_on: Some("Page_1"),
            ..Default::default()
        };

        let result = run_slice(&source, &processor, ResumeState::fresh(), Duration::MAX)
            .await
            .unwrap();

        assert!(result.finished);
        assert_eq!(result.new_offset, 4);
        assert_eq!(result.processed, 4);
        assert_eq!(result.failed, 1);
    }

    /* ===================== Collection drift ===================== */

    #[tokio::test(start_paused = true)]
    async fn test_total_is_fixed_for_the_pass() {
        let source = MemorySource::with_pages(3);
        let processor = TimedProcessor::new(Duration::from_secs(1));

        let first = run_slice(&source, &processor, ResumeState::fresh(), Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(first.total, 3);

        source.push(Item::new("Late_1"));
        source.push(Item::new("Late_2"));

        let second = run_slice(&source, &processor, first.next_state().unwrap(), Duration::MAX)
            .await
            .unwrap();
        assert!(second.finished);
        assert_eq!(second.total, 3);
        assert_eq!(second.new_offset, 3);
        assert!(!processor.seen().contains(&"Late_1".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shrunken_collection_ends_pass() {
        let source = MemorySource::with_pages(5);
        let processor = TimedProcessor::new(Duration::from_secs(1));

        let budget = Duration::from_millis(1500);
        let first = run_slice(&source, &processor, ResumeState::fresh(), budget)
            .await
            .unwrap();
        assert_eq!(first.new_offset, 2);

        source.truncate(3);

        let second = run_slice(&source, &processor, first.next_state().unwrap(), Duration::MAX)
            .await
            .unwrap();
        assert!(second.finished);
        assert_eq!(second.new_offset, 3);
        assert_eq!(second.total, 3);
        assert_eq!(second.reload_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_offset_past_total_finishes_at_total() {
        let source = MemorySource::with_pages(10);
        let processor = TimedProcessor::new(Duration::ZERO);
        let state = ResumeState {
            offset: 8,
            total: Some(5),
            reload_count: 4,
        };

        let result = run_slice(&source, &processor, state, Duration::MAX).await.unwrap();
        assert!(result.finished);
        assert_eq!(result.new_offset, 5);
        assert_eq!(result.reload_count, 4);
        assert!(processor.seen().is_empty());
    }
}
