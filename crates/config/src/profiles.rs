use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How shaped output is delivered to a destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// Complete destination-sized blocks as they become ready.
    Block,
    /// Progressive full-content snapshots with deltas.
    Streaming,
    /// Everything retained and emitted as blocks on completion.
    Batch,
}

/// A channel profile registration from the configuration file.
///
/// Entries merge over the built-in profile set: an entry named like a
/// built-in replaces it, any other name registers a new profile.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProfileConfig {
    /// Maximum characters per block. Unset means unbounded.
    pub max_chars: Option<usize>,
    /// Maximum lines per block. Unset means unbounded.
    pub max_lines: Option<usize>,
    /// Characters withheld before a block may be emitted.
    pub min_chars: usize,
    /// Whether the destination can edit an already-sent message.
    pub supports_edit: bool,
    /// Whether the destination renders markdown.
    pub supports_markdown: bool,
    /// Idle gap under which small adjacent chunks are merged. Zero disables
    /// coalescing and makes streaming updates immediate.
    #[serde(deserialize_with = "duration_str::deserialize_duration")]
    pub coalesce_gap: Duration,
    /// Delivery mode used when the caller does not pick one.
    pub default_mode: DeliveryMode,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            max_chars: None,
            max_lines: None,
            min_chars: 1,
            supports_edit: true,
            supports_markdown: true,
            coalesce_gap: Duration::ZERO,
            default_mode: DeliveryMode::Streaming,
        }
    }
}
