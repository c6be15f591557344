//! Resume state round-trip encoding
//!
//! The resume state travels through the client between slices, so everything
//! decoded here comes from an untrusted channel. Numbers that fail to parse
//! become zero instead of errors: a tampered field can at worst restart or
//! shorten a pass, never crash it.
//!
//! Field names are `offset`, `total` and `reloadCount`. The short names `s`,
//! `e` and `r` used by older reload forms are accepted on input as well.

use std::collections::{BTreeMap, HashMap};

use crate::types::ResumeState;

pub const OFFSET_FIELD: &str = "offset";
pub const TOTAL_FIELD: &str = "total";
pub const RELOAD_COUNT_FIELD: &str = "reloadCount";

const OFFSET_ALIAS: &str = "s";
const TOTAL_ALIAS: &str = "e";
const RELOAD_COUNT_ALIAS: &str = "r";

/// Result of decoding inbound round-trip fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoded {
    /// No offset was supplied: start a new pass.
    FreshStart,
    /// Continue an existing pass from the given state.
    Continue(ResumeState),
}

impl Decoded {
    /// Collapse into the state the driver should start from.
    pub fn into_state(self) -> ResumeState {
        match self {
            Decoded::FreshStart => ResumeState::fresh(),
            Decoded::Continue(state) => state,
        }
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self, Decoded::FreshStart)
    }
}

/// Decode inbound fields into a resume state.
pub fn decode(fields: &HashMap<String, String>) -> Decoded {
    let Some(raw_offset) = lookup(fields, OFFSET_FIELD, OFFSET_ALIAS) else {
        return Decoded::FreshStart;
    };

    let offset = parse_count(OFFSET_FIELD, raw_offset);
    let total = lookup(fields, TOTAL_FIELD, TOTAL_ALIAS).map(|raw| parse_count(TOTAL_FIELD, raw));
    let reload_count = lookup(fields, RELOAD_COUNT_FIELD, RELOAD_COUNT_ALIAS)
        .map(|raw| parse_count(RELOAD_COUNT_FIELD, raw))
        .unwrap_or(0);

    Decoded::Continue(ResumeState {
        offset,
        total,
        reload_count,
    })
}

/// Encode a resume state as the flat field mapping sent back to the client.
///
/// An unknown total encodes as `0`; states taken from a `PassResult` always
/// carry a known total.
pub fn encode(state: &ResumeState) -> BTreeMap<&'static str, String> {
    let mut fields = BTreeMap::new();
    fields.insert(OFFSET_FIELD, state.offset.to_string());
    fields.insert(TOTAL_FIELD, state.total.unwrap_or(0).to_string());
    fields.insert(RELOAD_COUNT_FIELD, state.reload_count.to_string());
    fields
}

/// Render a resume state as a form-encoded `key=value&...` token.
pub fn encode_query(state: &ResumeState) -> Result<String, serde_urlencoded::ser::Error> {
    // Fixed order keeps tokens stable for humans copying them around.
    let pairs: &[(&str, u64)] = &[
        (OFFSET_FIELD, state.offset),
        (TOTAL_FIELD, state.total.unwrap_or(0)),
        (RELOAD_COUNT_FIELD, state.reload_count),
    ];
    serde_urlencoded::to_string(pairs)
}

/// Parse a form-encoded `key=value&...` token. A leading `?` is ignored.
pub fn decode_query(token: &str) -> Decoded {
    decode(&query_fields(token))
}

/// Split a form-encoded token into percent-decoded fields. Later duplicates
/// win; a bare key maps to an empty value.
pub fn query_fields(token: &str) -> HashMap<String, String> {
    let token = token.trim();
    let token = token.strip_prefix('?').unwrap_or(token);

    serde_urlencoded::from_str(token).unwrap_or_else(|err| {
        tracing::debug!(token, error = %err, "Unreadable resume token, starting over");
        HashMap::new()
    })
}

fn lookup<'a>(fields: &'a HashMap<String, String>, name: &str, alias: &str) -> Option<&'a str> {
    fields
        .get(name)
        .or_else(|| fields.get(alias))
        .map(String::as_str)
}

fn parse_count(field: &str, raw: &str) -> u64 {
    match raw.trim().parse::<u64>() {
        Ok(value) => value,
        Err(err) => {
            tracing::debug!(field, raw, error = %err, "Malformed resume field, using 0");
            0
        }
    }
}
