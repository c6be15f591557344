use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use crate::codec::{self, Decoded};
use crate::driver;
use crate::processor::ItemProcessor;
use crate::source::ItemSource;
use crate::stats::{CompletionReport, Progress};
use crate::types::{PassResult, ResumeState};

/// What the caller gets back after a slice.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SliceOutcome {
    /// More work remains. `next` must be sent back unchanged to continue.
    Suspended {
        progress: Progress,
        next: BTreeMap<&'static str, String>,
        token: String,
        #[serde(skip)]
        state: ResumeState,
    },
    /// The pass is done.
    Complete {
        progress: Progress,
        report: CompletionReport,
    },
}

impl SliceOutcome {
    fn from_result(result: &PassResult, budget: Duration) -> Result<Self> {
        let progress = Progress::from_result(result);

        let outcome = match result.next_state() {
            Some(state) => SliceOutcome::Suspended {
                progress,
                next: codec::encode(&state),
                token: codec::encode_query(&state)?,
                state,
            },
            None => SliceOutcome::Complete {
                progress,
                report: CompletionReport::new(result.total, result.reload_count, budget),
            },
        };
        Ok(outcome)
    }

    pub fn progress(&self) -> &Progress {
        match self {
            SliceOutcome::Suspended { progress, .. } | SliceOutcome::Complete { progress, .. } => {
                progress
            }
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, SliceOutcome::Complete { .. })
    }
}

/// Orchestrates slices: decodes the inbound round-trip fields, runs the
/// driver, and turns the result into the next round trip or a report.
#[derive(Clone)]
pub struct SweepService {
    source: Arc<dyn ItemSource>,
    processor: Arc<dyn ItemProcessor>,
    budget: Duration,
}

impl SweepService {
    pub fn new(
        source: Arc<dyn ItemSource>,
        processor: Arc<dyn ItemProcessor>,
        budget: Duration,
    ) -> Self {
        Self {
            source,
            processor,
            budget,
        }
    }

    /// Number of items a fresh pass would cover.
    pub async fn count(&self) -> Result<u64> {
        self.source.count().await.context("Failed to count pages")
    }

    /// Run one slice from inbound round-trip fields.
    pub async fn run_slice(&self, fields: &HashMap<String, String>) -> Result<SliceOutcome> {
        self.run_decoded(codec::decode(fields)).await
    }

    /// Run one slice from a query-style token; `None` starts a new pass.
    pub async fn run_token(&self, token: Option<&str>) -> Result<SliceOutcome> {
        let decoded = token.map(codec::decode_query).unwrap_or(Decoded::FreshStart);
        self.run_decoded(decoded).await
    }

    async fn run_decoded(&self, decoded: Decoded) -> Result<SliceOutcome> {
        if decoded.is_fresh() {
            tracing::info!(budget_secs = self.budget.as_secs_f64(), "Starting new pass");
        }
        self.run_state(decoded.into_state()).await
    }

    async fn run_state(&self, state: ResumeState) -> Result<SliceOutcome> {
        let retry_token = codec::encode_query(&state)?;
        let result = driver::run_slice(
            self.source.as_ref(),
            self.processor.as_ref(),
            state,
            self.budget,
        )
        .await
        .with_context(|| format!("Slice failed; retry with: {}", retry_token))?;

        SliceOutcome::from_result(&result, self.budget)
    }

    /// Run slices back to back until the pass completes.
    ///
    /// `on_slice` sees every outcome, including the last. With `max_slices`
    /// set, stops early and returns the suspended outcome to resume from.
    pub async fn run_until_complete(
        &self,
        token: Option<&str>,
        max_slices: Option<u64>,
        mut on_slice: impl FnMut(&SliceOutcome),
    ) -> Result<SliceOutcome> {
        let mut outcome = self.run_token(token).await?;
        let mut slices = 1u64;
        on_slice(&outcome);

        while let SliceOutcome::Suspended { state, .. } = &outcome {
            if max_slices.is_some_and(|max| slices >= max) {
                break;
            }
            outcome = self.run_state(*state).await?;
            slices += 1;
            on_slice(&outcome);
        }

        Ok(outcome)
    }
}
