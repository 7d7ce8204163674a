use std::time::{Duration, Instant};

use config::DeliveryMode;
use jiff::Timestamp;

use crate::breakpoint::BreakKind;
use crate::buffer::BufferKind;
use crate::chunker::{Chunker, ChunkerConfig, TextChunk};
use crate::coalescer::{Coalescer, CoalescerConfig};
use crate::output::{Block, StreamerOutput, StreamingUpdate};
use crate::profile::ChannelProfile;

const UNBOUNDED_COALESCE_CAP: usize = 4096;

/// Emission bookkeeping owned by the façade so it survives handler swaps:
/// indices stay monotonic and `is_first` is emitted exactly once per
/// streamer instance.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct Cursor {
    pub next_index: u64,
    pub emitted_any: bool,
}

impl Cursor {
    fn block(&mut self, chunk: TextChunk, is_last: bool) -> StreamerOutput {
        let index = self.next_index;
        self.next_index += 1;

        let is_first = !self.emitted_any;
        self.emitted_any = true;

        StreamerOutput::Block(Block {
            content: chunk.content,
            index,
            is_first,
            is_last,
            break_kind: chunk.break_kind,
            timestamp: Timestamp::now(),
        })
    }

    fn update(&mut self, full_content: String, delta: String) -> StreamerOutput {
        let index = self.next_index;
        self.next_index += 1;
        self.emitted_any = true;

        StreamerOutput::Update(StreamingUpdate {
            full_content,
            delta,
            index,
        })
    }
}

fn chunker_config(profile: &ChannelProfile, protect_fences: bool, buffer: BufferKind) -> ChunkerConfig {
    ChunkerConfig {
        min_chars: profile.min_chars,
        max_chars: profile.max_chars,
        max_lines: profile.max_lines,
        protect_fences,
        buffer,
    }
}

fn coalescer_config(profile: &ChannelProfile) -> CoalescerConfig {
    let max_size = profile.max_chars.unwrap_or(UNBOUNDED_COALESCE_CAP);

    CoalescerConfig {
        gap: profile.coalesce_gap,
        max_size,
        min_passthrough: max_size / 2,
    }
}

/// One of the three delivery contracts sharing the push/flush/complete
/// shape.
#[derive(Debug)]
pub(crate) enum ModeHandler {
    Block(BlockMode),
    Streaming(StreamingMode),
    Batch(BatchMode),
}

impl ModeHandler {
    pub(crate) fn new(
        mode: DeliveryMode,
        profile: &ChannelProfile,
        protect_fences: bool,
        buffer: BufferKind,
    ) -> Self {
        match mode {
            DeliveryMode::Block => Self::Block(BlockMode {
                chunker: Chunker::new(chunker_config(profile, protect_fences, buffer)),
                coalescer: Coalescer::new(coalescer_config(profile)),
            }),
            DeliveryMode::Streaming => Self::Streaming(StreamingMode {
                full: String::new(),
                pending: String::new(),
                last_emit: None,
                throttle: profile.coalesce_gap,
                immediate: profile.coalesce_gap.is_zero(),
            }),
            DeliveryMode::Batch => Self::Batch(BatchMode {
                content: String::new(),
                chunker_config: chunker_config(profile, protect_fences, buffer),
            }),
        }
    }

    pub(crate) fn mode(&self) -> DeliveryMode {
        match self {
            Self::Block(_) => DeliveryMode::Block,
            Self::Streaming(_) => DeliveryMode::Streaming,
            Self::Batch(_) => DeliveryMode::Batch,
        }
    }

    pub(crate) fn push(&mut self, text: &str, now: Instant, cursor: &mut Cursor) -> Vec<StreamerOutput> {
        match self {
            Self::Block(mode) => mode.push(text, now, cursor),
            Self::Streaming(mode) => mode.push(text, now, cursor),
            Self::Batch(mode) => {
                mode.content.push_str(text);
                Vec::new()
            }
        }
    }

    pub(crate) fn flush(&mut self, now: Instant, cursor: &mut Cursor) -> Vec<StreamerOutput> {
        match self {
            Self::Block(mode) => mode.drain(now, cursor, false),
            Self::Streaming(mode) => mode.flush(cursor),
            // Batch retains everything until completion.
            Self::Batch(_) => Vec::new(),
        }
    }

    pub(crate) fn complete(&mut self, now: Instant, cursor: &mut Cursor) -> Vec<StreamerOutput> {
        match self {
            Self::Block(mode) => {
                let mut out = mode.drain(now, cursor, true);

                // Nothing was pending: emit an empty terminal block so
                // exactly one block carries is_last.
                if out.is_empty() && cursor.emitted_any {
                    out.push(cursor.block(empty_chunk(), true));
                }

                out
            }
            Self::Streaming(mode) => vec![mode.emit(cursor)],
            Self::Batch(mode) => mode.complete(cursor),
        }
    }

    /// Appends text without emitting. Used to transfer buffered state into a
    /// freshly built handler on reconfiguration.
    pub(crate) fn seed(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }

        match self {
            Self::Block(mode) => mode.chunker.seed(text),
            Self::Streaming(mode) => {
                mode.full.push_str(text);
                mode.pending.push_str(text);
            }
            Self::Batch(mode) => mode.content.push_str(text),
        }
    }

    /// Removes and returns everything buffered but not yet emitted.
    pub(crate) fn take_unread(&mut self) -> String {
        match self {
            Self::Block(mode) => {
                let mut unread = mode.coalescer.take_pending_content().unwrap_or_default();

                if let Some(chunk) = mode.chunker.flush() {
                    unread.push_str(&chunk.content);
                }

                unread
            }
            Self::Streaming(mode) => std::mem::take(&mut mode.pending),
            Self::Batch(mode) => std::mem::take(&mut mode.content),
        }
    }

    pub(crate) fn buffered_len(&self) -> usize {
        match self {
            Self::Block(mode) => mode.chunker.buffered_len() + mode.coalescer.pending_len(),
            Self::Streaming(mode) => mode.pending.chars().count(),
            Self::Batch(mode) => mode.content.chars().count(),
        }
    }

    pub(crate) fn in_fence(&self) -> bool {
        match self {
            Self::Block(mode) => mode.chunker.in_fence(),
            Self::Streaming(_) | Self::Batch(_) => false,
        }
    }
}

fn empty_chunk() -> TextChunk {
    TextChunk {
        content: String::new(),
        break_kind: BreakKind::Hard,
        contains_fence: false,
        partial_fence: false,
    }
}

/// Emits complete blocks as they become ready.
#[derive(Debug)]
pub(crate) struct BlockMode {
    chunker: Chunker,
    coalescer: Coalescer,
}

impl BlockMode {
    fn push(&mut self, text: &str, now: Instant, cursor: &mut Cursor) -> Vec<StreamerOutput> {
        let mut ready = Vec::new();

        for chunk in self.chunker.push(text) {
            ready.extend(self.coalescer.push(chunk, now));
        }

        ready.into_iter().map(|chunk| cursor.block(chunk, false)).collect()
    }

    /// Drains chunker then coalescer; `mark_last` tags the final block.
    fn drain(&mut self, now: Instant, cursor: &mut Cursor, mark_last: bool) -> Vec<StreamerOutput> {
        let mut ready = Vec::new();

        if let Some(chunk) = self.chunker.flush() {
            ready.extend(self.coalescer.push(chunk, now));
        }

        ready.extend(self.coalescer.flush());

        let last_index = ready.len().saturating_sub(1);

        ready
            .into_iter()
            .enumerate()
            .map(|(i, chunk)| cursor.block(chunk, mark_last && i == last_index))
            .collect()
    }
}

/// Accumulates full content and emits throttled snapshot updates.
#[derive(Debug)]
pub(crate) struct StreamingMode {
    full: String,
    pending: String,
    last_emit: Option<Instant>,
    throttle: Duration,
    immediate: bool,
}

impl StreamingMode {
    fn push(&mut self, text: &str, now: Instant, cursor: &mut Cursor) -> Vec<StreamerOutput> {
        self.full.push_str(text);
        self.pending.push_str(text);

        let due = match self.last_emit {
            Some(last) => now.duration_since(last) >= self.throttle,
            None => true,
        };

        if self.immediate || due {
            self.last_emit = Some(now);
            return vec![self.emit(cursor)];
        }

        Vec::new()
    }

    fn flush(&mut self, cursor: &mut Cursor) -> Vec<StreamerOutput> {
        if self.pending.is_empty() {
            return Vec::new();
        }

        vec![self.emit(cursor)]
    }

    fn emit(&mut self, cursor: &mut Cursor) -> StreamerOutput {
        cursor.update(self.full.clone(), std::mem::take(&mut self.pending))
    }
}

/// Retains everything and emits all blocks at completion.
#[derive(Debug)]
pub(crate) struct BatchMode {
    content: String,
    chunker_config: ChunkerConfig,
}

impl BatchMode {
    fn complete(&mut self, cursor: &mut Cursor) -> Vec<StreamerOutput> {
        let mut chunker = Chunker::new(self.chunker_config.clone());

        let mut chunks = chunker.push(&std::mem::take(&mut self.content));
        chunks.extend(chunker.flush());

        let last_index = chunks.len().saturating_sub(1);

        chunks
            .into_iter()
            .enumerate()
            .map(|(i, chunk)| cursor.block(chunk, i == last_index))
            .collect()
    }
}
