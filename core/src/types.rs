use serde::{Deserialize, Serialize};

/// A single page record as yielded by an item source.
///
/// The driver only cares about an item's position in the stream; the title is
/// what processors act on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Item {
    pub title: String,
}

impl Item {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
        }
    }
}

impl std::fmt::Display for Item {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.title)
    }
}

/// Where the next slice starts.
///
/// `total` is `None` only before the first slice of a pass has counted the
/// collection. Once known it is carried unchanged for the rest of the pass.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ResumeState {
    pub offset: u64,
    pub total: Option<u64>,
    pub reload_count: u64,
}

impl ResumeState {
    /// State at the beginning of a new pass.
    pub fn fresh() -> Self {
        Self::default()
    }
}

/// Outcome of one slice.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PassResult {
    pub last_processed: Option<Item>,
    pub new_offset: u64,
    pub total: u64,
    pub reload_count: u64,
    pub finished: bool,

    /// Items attempted during this slice.
    pub processed: u64,
    /// Items whose processor reported a soft failure during this slice.
    pub failed: u64,
}

impl PassResult {
    /// State to hand back to the client, or `None` once the pass is complete.
    pub fn next_state(&self) -> Option<ResumeState> {
        if self.finished {
            return None;
        }

        Some(ResumeState {
            offset: self.new_offset,
            total: Some(self.total),
            reload_count: self.reload_count,
        })
    }
}
