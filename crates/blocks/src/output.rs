use jiff::Timestamp;
use serde::Serialize;

use crate::breakpoint::BreakKind;

/// A destination-sized piece of assistant text ready for a single send.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Block {
    /// The block text, markdown intact.
    pub content: String,
    /// Position in the emission order, monotonic per streamer.
    pub index: u64,
    /// Whether this is the first block of the stream.
    pub is_first: bool,
    /// Whether this is the final block of the stream.
    pub is_last: bool,
    /// The boundary the block was cut at.
    pub break_kind: BreakKind,
    /// When the block was emitted.
    pub timestamp: Timestamp,
}

/// An incremental full-content snapshot for destinations that edit in place.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamingUpdate {
    /// The complete response text so far.
    pub full_content: String,
    /// The text added since the previous update.
    pub delta: String,
    /// Position in the update order, monotonic per streamer.
    pub index: u64,
}

/// One unit of shaped output leaving a streamer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamerOutput {
    /// A complete block (block and batch modes).
    Block(Block),
    /// A progressive update (streaming mode).
    Update(StreamingUpdate),
}

/// End-of-stream report produced exactly once by `complete()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CompletedRunSummary {
    /// Blocks or updates emitted over the stream's lifetime.
    pub total_blocks: u64,
    /// Characters emitted across all blocks or updates.
    pub total_chars: u64,
    /// Wall-clock time from first push to completion, in milliseconds.
    pub duration_ms: u64,
}
