use std::time::Instant;

use config::DeliveryMode;
use jiff::Timestamp;
use serde::Serialize;

use crate::buffer::BufferKind;
use crate::error::StreamerError;
use crate::mode::{Cursor, ModeHandler};
use crate::output::{CompletedRunSummary, StreamerOutput};
use crate::profile::ChannelProfile;

/// Construction knobs for a [`BlockStreamer`].
#[derive(Debug, Clone)]
pub struct StreamerOptions {
    /// Delivery mode override; `None` uses the profile's default.
    pub mode: Option<DeliveryMode>,
    /// Whether code fences are protected from splitting.
    pub protect_fences: bool,
    /// Backing storage for the chunker's buffer.
    pub buffer: BufferKind,
}

impl StreamerOptions {
    /// The default option set: profile default mode, fences protected.
    pub fn new() -> Self {
        Self {
            mode: None,
            protect_fences: true,
            buffer: BufferKind::default(),
        }
    }
}

impl Default for StreamerOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time view of a streamer's progress.
#[derive(Debug, Clone, Serialize)]
pub struct StreamerState {
    /// Characters buffered but not yet emitted.
    pub buffered: usize,
    /// Units (blocks or updates) emitted so far.
    pub emitted: u64,
    /// The active delivery mode.
    pub mode: DeliveryMode,
    /// Whether the buffered tail sits inside an unclosed code fence.
    pub in_code_fence: bool,
    /// Whether `complete` has run.
    pub is_complete: bool,
    /// Whether `abort` has run.
    pub is_aborted: bool,
}

/// Cumulative streamer statistics.
#[derive(Debug, Clone, Serialize)]
pub struct StreamerStats {
    /// Characters accepted through `push`.
    pub total_input_chars: u64,
    /// Units (blocks or updates) emitted.
    pub total_output_blocks: u64,
    /// Characters emitted across all units.
    pub total_output_chars: u64,
    /// Mean characters per emitted unit.
    pub avg_block_size: f64,
    /// Wall-clock time from first push until now or termination.
    pub duration_ms: u64,
    /// When the first push happened.
    pub start_time: Option<Timestamp>,
    /// When the stream completed or aborted.
    pub end_time: Option<Timestamp>,
}

/// The result of completing a streamer.
#[derive(Debug)]
pub struct Completion {
    /// Final outputs drained from the mode handler.
    pub outputs: Vec<StreamerOutput>,
    /// The end-of-stream report; `None` on repeated or post-abort calls.
    pub summary: Option<CompletedRunSummary>,
}

/// Shapes one run's text stream for one destination.
///
/// Owned by whichever subsystem created it (typically one per SSE blocks
/// request or per channel delivery) and discarded with its connection.
#[derive(Debug)]
pub struct BlockStreamer {
    profile: ChannelProfile,
    explicit_mode: Option<DeliveryMode>,
    protect_fences: bool,
    buffer: BufferKind,
    handler: ModeHandler,
    cursor: Cursor,
    input_chars: u64,
    output_chars: u64,
    started: Option<(Instant, Timestamp)>,
    ended: Option<(Instant, Timestamp)>,
    completed: bool,
    aborted: bool,
}

impl BlockStreamer {
    /// Creates a streamer using the profile's default delivery mode.
    pub fn new(profile: ChannelProfile) -> Self {
        Self::with_options(profile, StreamerOptions::new())
    }

    /// Creates a streamer with explicit options.
    pub fn with_options(profile: ChannelProfile, options: StreamerOptions) -> Self {
        let mode = options.mode.unwrap_or(profile.default_mode);
        let handler = ModeHandler::new(mode, &profile, options.protect_fences, options.buffer);

        Self {
            profile,
            explicit_mode: options.mode,
            protect_fences: options.protect_fences,
            buffer: options.buffer,
            handler,
            cursor: Cursor::default(),
            input_chars: 0,
            output_chars: 0,
            started: None,
            ended: None,
            completed: false,
            aborted: false,
        }
    }

    /// The active delivery mode.
    pub fn mode(&self) -> DeliveryMode {
        self.handler.mode()
    }

    /// The active profile.
    pub fn profile(&self) -> &ChannelProfile {
        &self.profile
    }

    /// Feeds stream text and returns every unit that became ready.
    pub fn push(&mut self, text: &str) -> Result<Vec<StreamerOutput>, StreamerError> {
        if self.completed || self.aborted {
            return Err(StreamerError::CompletedStream);
        }

        if self.started.is_none() {
            self.started = Some((Instant::now(), Timestamp::now()));
        }

        self.input_chars += text.chars().count() as u64;

        let outputs = self.handler.push(text, Instant::now(), &mut self.cursor);
        self.account(&outputs);

        Ok(outputs)
    }

    /// Drains whatever the mode handler can emit early. Never marks a block
    /// as last.
    pub fn flush(&mut self) -> Vec<StreamerOutput> {
        if self.completed || self.aborted {
            return Vec::new();
        }

        let outputs = self.handler.flush(Instant::now(), &mut self.cursor);
        self.account(&outputs);

        outputs
    }

    /// Finishes the stream: drains the handler, marks the final unit last,
    /// and produces the run summary. Idempotent; a no-op after `abort`.
    pub fn complete(&mut self) -> Completion {
        if self.completed || self.aborted {
            return Completion {
                outputs: Vec::new(),
                summary: None,
            };
        }

        let outputs = self.handler.complete(Instant::now(), &mut self.cursor);
        self.account(&outputs);

        self.completed = true;
        self.ended = Some((Instant::now(), Timestamp::now()));

        let summary = CompletedRunSummary {
            total_blocks: self.cursor.next_index,
            total_chars: self.output_chars,
            duration_ms: self.duration_ms(),
        };

        Completion {
            outputs,
            summary: Some(summary),
        }
    }

    /// Discards pending content and stops the stream. Idempotent; a no-op
    /// after `complete`.
    pub fn abort(&mut self) {
        if self.completed || self.aborted {
            return;
        }

        drop(self.handler.take_unread());

        self.aborted = true;
        self.ended = Some((Instant::now(), Timestamp::now()));
    }

    /// Switches to a different profile mid-stream. The unread buffer carries
    /// over; the new budgets apply to subsequent pushes only and already
    /// emitted blocks keep their size.
    pub fn set_profile(&mut self, profile: ChannelProfile) {
        log::debug!("Switching stream to profile '{}' mid-flight", profile.name);

        self.profile = profile;
        self.rebuild_handler();
    }

    /// Applies new options mid-stream, rebuilding the mode handler with the
    /// unread buffer carried over.
    pub fn configure(&mut self, options: StreamerOptions) {
        self.explicit_mode = options.mode;
        self.protect_fences = options.protect_fences;
        self.buffer = options.buffer;
        self.rebuild_handler();
    }

    /// The current progress view.
    pub fn state(&self) -> StreamerState {
        StreamerState {
            buffered: self.handler.buffered_len(),
            emitted: self.cursor.next_index,
            mode: self.handler.mode(),
            in_code_fence: self.handler.in_fence(),
            is_complete: self.completed,
            is_aborted: self.aborted,
        }
    }

    /// Cumulative statistics.
    pub fn stats(&self) -> StreamerStats {
        let total_output_blocks = self.cursor.next_index;

        let avg_block_size = if total_output_blocks == 0 {
            0.0
        } else {
            self.output_chars as f64 / total_output_blocks as f64
        };

        StreamerStats {
            total_input_chars: self.input_chars,
            total_output_blocks,
            total_output_chars: self.output_chars,
            avg_block_size,
            duration_ms: self.duration_ms(),
            start_time: self.started.map(|(_, ts)| ts),
            end_time: self.ended.map(|(_, ts)| ts),
        }
    }

    fn rebuild_handler(&mut self) {
        let unread = self.handler.take_unread();
        let mode = self.explicit_mode.unwrap_or(self.profile.default_mode);

        self.handler = ModeHandler::new(mode, &self.profile, self.protect_fences, self.buffer);
        self.handler.seed(&unread);
    }

    fn account(&mut self, outputs: &[StreamerOutput]) {
        for output in outputs {
            let chars = match output {
                StreamerOutput::Block(block) => block.content.chars().count(),
                StreamerOutput::Update(update) => update.delta.chars().count(),
            };

            self.output_chars += chars as u64;
        }
    }

    fn duration_ms(&self) -> u64 {
        let Some((started, _)) = self.started else {
            return 0;
        };

        let end = self.ended.map(|(instant, _)| instant).unwrap_or_else(Instant::now);

        end.duration_since(started).as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breakpoint::BreakKind;
    use crate::profile::ProfileRegistry;

    fn profile(name: &str) -> ChannelProfile {
        ProfileRegistry::with_defaults().resolve(name).unwrap()
    }

    fn custom(min_chars: usize, max_chars: usize, mode: DeliveryMode) -> ChannelProfile {
        ChannelProfile {
            name: "custom".to_string(),
            max_chars: Some(max_chars),
            max_lines: None,
            min_chars,
            supports_edit: true,
            supports_markdown: true,
            coalesce_gap: std::time::Duration::ZERO,
            default_mode: mode,
        }
    }

    fn blocks(outputs: &[StreamerOutput]) -> Vec<&crate::Block> {
        outputs
            .iter()
            .map(|output| match output {
                StreamerOutput::Block(block) => block,
                StreamerOutput::Update(_) => unreachable!("expected a block"),
            })
            .collect()
    }

    #[test]
    fn paragraph_split_scenario() {
        let mut streamer = BlockStreamer::with_options(
            custom(100, 500, DeliveryMode::Block),
            StreamerOptions::new(),
        );

        let text = format!("{}.\n\n{}", "a".repeat(200), "b".repeat(200));
        let outputs = streamer.push(&text).unwrap();

        let blocks = blocks(&outputs);
        assert!(!blocks.is_empty());
        assert_eq!(blocks[0].break_kind, BreakKind::Paragraph);
        assert!(blocks[0].content.ends_with(".\n\n"));
        assert!(blocks[0].is_first);
    }

    #[test]
    fn fence_integrity_under_tight_budget() {
        let mut discord = profile("discord");
        discord.default_mode = DeliveryMode::Block;

        let mut streamer = BlockStreamer::new(discord);

        let fence = "```python\ndef hello():\n  pass\n```";
        let mut outputs = streamer.push(fence).unwrap();
        outputs.extend(streamer.complete().outputs);

        let blocks = blocks(&outputs);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].content, fence);
        assert_eq!(blocks[0].content.matches("```").count() % 2, 0);
        assert!(blocks[0].is_first);
        assert!(blocks[0].is_last);
    }

    #[test]
    fn streaming_mode_accumulation() {
        let mut streamer = BlockStreamer::with_options(
            profile("telegram"),
            StreamerOptions {
                mode: Some(DeliveryMode::Streaming),
                ..StreamerOptions::new()
            },
        );

        let mut updates = Vec::new();

        for piece in ["Hello ", "World", "!"] {
            for output in streamer.push(piece).unwrap() {
                match output {
                    StreamerOutput::Update(update) => updates.push(update),
                    StreamerOutput::Block(_) => unreachable!("expected updates"),
                }
            }
        }

        let completion = streamer.complete();
        for output in completion.outputs {
            match output {
                StreamerOutput::Update(update) => updates.push(update),
                StreamerOutput::Block(_) => unreachable!("expected updates"),
            }
        }

        let last = updates.last().unwrap();
        assert_eq!(last.full_content, "Hello World!");

        let concatenated: String = updates.iter().map(|u| u.delta.as_str()).collect();
        assert_eq!(concatenated, "Hello World!");

        for pair in updates.windows(2) {
            assert!(pair[1].index > pair[0].index);
        }
    }

    #[test]
    fn block_budget_is_respected() {
        let mut streamer = BlockStreamer::with_options(
            custom(10, 50, DeliveryMode::Block),
            StreamerOptions::new(),
        );

        let mut outputs = streamer.push(&"word ".repeat(40)).unwrap();
        outputs.extend(streamer.complete().outputs);

        for block in blocks(&outputs) {
            assert!(block.content.chars().count() <= 50, "block exceeded budget");
        }
    }

    #[test]
    fn exactly_one_first_and_one_last() {
        let mut streamer = BlockStreamer::with_options(
            custom(5, 40, DeliveryMode::Block),
            StreamerOptions::new(),
        );

        let mut outputs = streamer.push("One sentence here. Another one follows. ").unwrap();
        outputs.extend(streamer.push("And a third for good measure. ").unwrap());
        outputs.extend(streamer.complete().outputs);

        let blocks = blocks(&outputs);
        assert_eq!(blocks.iter().filter(|b| b.is_first).count(), 1);
        assert_eq!(blocks.iter().filter(|b| b.is_last).count(), 1);

        let indices: Vec<u64> = blocks.iter().map(|b| b.index).collect();
        let expected: Vec<u64> = (0..blocks.len() as u64).collect();
        assert_eq!(indices, expected);
    }

    #[test]
    fn batch_mode_emits_everything_at_completion() {
        let mut streamer = BlockStreamer::with_options(
            custom(5, 30, DeliveryMode::Batch),
            StreamerOptions::new(),
        );

        assert!(streamer.push("First part. ").unwrap().is_empty());
        assert!(streamer.push("Second part. ").unwrap().is_empty());
        assert!(streamer.flush().is_empty());

        let completion = streamer.complete();
        let blocks = blocks(&completion.outputs);

        assert!(!blocks.is_empty());
        assert!(blocks.last().unwrap().is_last);

        let all: String = blocks.iter().map(|b| b.content.as_str()).collect();
        assert_eq!(all, "First part. Second part. ");
    }

    #[test]
    fn push_after_complete_fails() {
        let mut streamer = BlockStreamer::new(profile("web"));

        streamer.push("hello").unwrap();
        streamer.complete();

        assert_eq!(streamer.push("more"), Err(StreamerError::CompletedStream));
    }

    #[test]
    fn complete_is_idempotent() {
        let mut streamer = BlockStreamer::new(profile("web"));

        streamer.push("hello").unwrap();

        let first = streamer.complete();
        assert!(first.summary.is_some());

        let second = streamer.complete();
        assert!(second.outputs.is_empty());
        assert!(second.summary.is_none());
    }

    #[test]
    fn abort_then_complete_is_a_no_op() {
        let mut streamer = BlockStreamer::new(profile("web"));

        streamer.push("hello").unwrap();
        streamer.abort();

        let completion = streamer.complete();
        assert!(completion.outputs.is_empty());
        assert!(completion.summary.is_none());
        assert!(streamer.state().is_aborted);
        assert!(!streamer.state().is_complete);
    }

    #[test]
    fn complete_then_abort_is_a_no_op() {
        let mut streamer = BlockStreamer::new(profile("web"));

        streamer.push("hello").unwrap();
        streamer.complete();
        streamer.abort();

        assert!(streamer.state().is_complete);
        assert!(!streamer.state().is_aborted);
    }

    #[test]
    fn flush_never_marks_last() {
        let mut streamer = BlockStreamer::with_options(
            custom(1, 100, DeliveryMode::Block),
            StreamerOptions::new(),
        );

        streamer.push("pending text without a break").unwrap();
        let outputs = streamer.flush();

        for block in blocks(&outputs) {
            assert!(!block.is_last);
        }
    }

    #[test]
    fn profile_switch_carries_the_unread_buffer() {
        let mut streamer = BlockStreamer::with_options(
            custom(100, 500, DeliveryMode::Block),
            StreamerOptions::new(),
        );

        // Withheld: below min_chars.
        assert!(streamer.push("carried ").unwrap().is_empty());

        streamer.set_profile(custom(1, 500, DeliveryMode::Block));

        let completion = streamer.complete();
        let all: String = blocks(&completion.outputs)
            .iter()
            .map(|b| b.content.as_str())
            .collect();

        assert_eq!(all, "carried ");
    }

    #[test]
    fn indices_stay_monotonic_across_reconfigure() {
        let mut streamer = BlockStreamer::with_options(
            custom(1, 20, DeliveryMode::Block),
            StreamerOptions::new(),
        );

        let mut outputs = streamer.push("First sentence here. ").unwrap();

        streamer.configure(StreamerOptions {
            mode: Some(DeliveryMode::Block),
            ..StreamerOptions::new()
        });

        outputs.extend(streamer.push("Second sentence now. ").unwrap());
        outputs.extend(streamer.complete().outputs);

        let blocks = blocks(&outputs);
        assert!(blocks.len() >= 2);

        for pair in blocks.windows(2) {
            assert!(pair[1].index > pair[0].index);
        }

        assert_eq!(blocks.iter().filter(|b| b.is_first).count(), 1);
    }

    #[test]
    fn stats_track_io_and_duration() {
        let mut streamer = BlockStreamer::new(profile("console"));

        streamer.push("12345").unwrap();
        let completion = streamer.complete();

        let stats = streamer.stats();
        assert_eq!(stats.total_input_chars, 5);
        assert!(stats.total_output_blocks >= 1);
        assert!(stats.start_time.is_some());
        assert!(stats.end_time.is_some());

        let summary = completion.summary.unwrap();
        assert_eq!(summary.total_chars, 5);
    }

    #[test]
    fn summary_totals_match_emitted_output() {
        let mut streamer = BlockStreamer::with_options(
            custom(5, 40, DeliveryMode::Block),
            StreamerOptions::new(),
        );

        let mut outputs = streamer.push("Alpha beta. Gamma delta. Epsilon zeta. ").unwrap();
        let completion = streamer.complete();
        outputs.extend(completion.outputs);

        let summary = completion.summary.unwrap();
        let emitted_chars: usize = blocks(&outputs).iter().map(|b| b.content.chars().count()).sum();

        assert_eq!(summary.total_chars as usize, emitted_chars);
        assert_eq!(summary.total_blocks as usize, outputs.len());
    }
}
