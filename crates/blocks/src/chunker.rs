use crate::breakpoint::{BreakKind, find_break_point};
use crate::buffer::{BufferKind, TextBuffer, byte_index_for_char};
use crate::fence::FenceTracker;

/// Sizing and protection knobs for a [`Chunker`].
#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    /// Characters withheld before a chunk may be emitted.
    pub min_chars: usize,
    /// Upper character bound per chunk. `None` means unbounded; chunks then
    /// only split at structural breaks.
    pub max_chars: Option<usize>,
    /// Upper line bound per chunk.
    pub max_lines: Option<usize>,
    /// Whether unclosed code fences withhold emission until overflow.
    pub protect_fences: bool,
    /// Backing storage for the internal buffer.
    pub buffer: BufferKind,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            min_chars: 1,
            max_chars: None,
            max_lines: None,
            protect_fences: true,
            buffer: BufferKind::default(),
        }
    }
}

/// A piece of text cut from the stream, annotated for downstream shaping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// The cut text, delimiters included.
    pub content: String,
    /// The boundary kind the cut landed on.
    pub break_kind: BreakKind,
    /// Whether the content contains fence marker lines.
    pub contains_fence: bool,
    /// Whether the content cuts through an unclosed fence. Only set by the
    /// forced overflow path and by a flush inside a fence.
    pub partial_fence: bool,
}

impl TextChunk {
    /// Character count of the content.
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }
}

/// Cuts buffered stream text into chunks that respect the configured budgets
/// and never split a code fence, except when a fence alone exceeds the
/// character budget.
#[derive(Debug)]
pub struct Chunker {
    config: ChunkerConfig,
    buffer: TextBuffer,
    fences: FenceTracker,
}

impl Chunker {
    /// Creates an empty chunker.
    pub fn new(config: ChunkerConfig) -> Self {
        let buffer = TextBuffer::new(config.buffer);

        Self {
            config,
            buffer,
            fences: FenceTracker::new(),
        }
    }

    /// Appends text and returns every chunk that became ready.
    pub fn push(&mut self, text: &str) -> Vec<TextChunk> {
        self.buffer.append(text);
        self.fences.update(text);

        let mut out = Vec::new();

        while let Some(chunk) = self.next_chunk() {
            out.push(chunk);
        }

        out
    }

    /// Appends text without attempting any emission. Used when transferring
    /// buffered state between handlers.
    pub(crate) fn seed(&mut self, text: &str) {
        self.buffer.append(text);
        self.fences.update(text);
    }

    /// Drains any remaining content as a final hard-break chunk.
    pub fn flush(&mut self) -> Option<TextChunk> {
        if self.buffer.is_empty() {
            return None;
        }

        let partial_fence = self.fences.in_fence();
        let content = self.buffer.consume(self.buffer.len());
        self.fences.reset();

        Some(TextChunk {
            contains_fence: contains_fence_marker(&content),
            content,
            break_kind: BreakKind::Hard,
            partial_fence,
        })
    }

    /// Number of characters waiting in the buffer.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether the buffered tail sits inside an unclosed fence.
    pub fn in_fence(&self) -> bool {
        self.fences.in_fence()
    }

    fn next_chunk(&mut self) -> Option<TextChunk> {
        let buffered = self.buffer.len();

        if buffered == 0 || buffered < self.config.min_chars {
            return None;
        }

        let max = self.config.max_chars.unwrap_or(usize::MAX);

        if self.config.protect_fences && self.fences.in_fence() {
            // Fence integrity is sacrificed only when the fence itself
            // overflows the budget.
            if buffered >= max {
                return Some(self.cut(max, BreakKind::Hard, true));
            }

            return None;
        }

        let window_end = self.window_end(buffered, max);

        let break_point = {
            let window = self.buffer.peek(window_end);
            find_break_point(&window, self.config.min_chars, window_end)
        };

        match break_point {
            Some((pos, kind)) => Some(self.cut(pos, kind, false)),
            // No structural break: forced cut once the window is saturated
            // (text exists beyond it), otherwise wait for more text.
            None if window_end < buffered || buffered >= max => Some(self.cut(window_end, BreakKind::Hard, false)),
            None => None,
        }
    }

    /// The exclusive end of the split window: the character budget, further
    /// capped at the line budget when one is set.
    fn window_end(&self, buffered: usize, max: usize) -> usize {
        let mut end = buffered.min(max);

        if let Some(max_lines) = self.config.max_lines {
            let window = self.buffer.peek(end);

            if let Some(cap) = position_after_line(&window, max_lines) {
                end = end.min(cap);
            }
        }

        end
    }

    fn cut(&mut self, chars: usize, break_kind: BreakKind, partial_fence: bool) -> TextChunk {
        let content = self.buffer.consume(chars);

        // Re-establish fence state over the unread suffix.
        self.fences.reset();
        self.fences.update(&self.buffer.peek_all());

        TextChunk {
            contains_fence: contains_fence_marker(&content),
            content,
            break_kind,
            partial_fence,
        }
    }
}

/// Character position just after the `lines`-th newline, if that many full
/// lines exist.
fn position_after_line(text: &str, lines: usize) -> Option<usize> {
    let mut seen = 0;

    for (pos, c) in text.chars().enumerate() {
        if c == '\n' {
            seen += 1;

            if seen == lines {
                return Some(pos + 1);
            }
        }
    }

    None
}

/// Whether any line of `text` starts (after indentation) with a fence
/// marker.
fn contains_fence_marker(text: &str) -> bool {
    text.lines().any(|line| {
        let body = line.trim_start_matches([' ', '\t']);

        body.starts_with("```") || body.starts_with("~~~")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker(min: usize, max: usize) -> Chunker {
        Chunker::new(ChunkerConfig {
            min_chars: min,
            max_chars: Some(max),
            ..ChunkerConfig::default()
        })
    }

    #[test]
    fn withholds_below_min_chars() {
        let mut chunker = chunker(100, 500);

        assert!(chunker.push("short text. ").is_empty());
        assert_eq!(chunker.buffered_len(), 12);
    }

    #[test]
    fn splits_at_paragraph_boundary() {
        let mut chunker = chunker(100, 500);

        let text = format!("{}.\n\n{}", "a".repeat(200), "b".repeat(200));
        let chunks = chunker.push(&text);

        assert_eq!(chunks[0].break_kind, BreakKind::Paragraph);
        assert!(chunks[0].content.ends_with(".\n\n"));
    }

    #[test]
    fn hard_cut_when_no_break_fits() {
        let mut chunker = chunker(10, 50);

        let chunks = chunker.push(&"x".repeat(120));

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].break_kind, BreakKind::Hard);
        assert_eq!(chunks[0].char_len(), 50);
        assert_eq!(chunker.buffered_len(), 20);
    }

    #[test]
    fn fence_is_withheld_until_closed() {
        let mut chunker = chunker(10, 2000);

        let chunks = chunker.push("```python\ndef hello():\n  pass\n");
        assert!(chunks.is_empty());
        assert!(chunker.in_fence());

        let chunks = chunker.push("```\nAnd that is the function.\n\n");
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].contains_fence);
        assert!(!chunks[0].partial_fence);
        assert_eq!(chunks[0].content.matches("```").count(), 2);
    }

    #[test]
    fn oversized_fence_forces_a_hard_cut() {
        let mut chunker = chunker(10, 40);

        let chunks = chunker.push(&format!("```\n{}\n", "y".repeat(60)));

        assert_eq!(chunks[0].break_kind, BreakKind::Hard);
        assert_eq!(chunks[0].char_len(), 40);
        assert!(chunks[0].partial_fence);
    }

    #[test]
    fn rescan_treats_remainder_fresh_after_forced_cut() {
        let mut chunker = chunker(10, 40);

        // The forced cut sacrifices the fence; the rescan starts over from
        // the unread suffix, which contains no marker.
        chunker.push(&format!("```\n{}\n", "y".repeat(60)));
        assert!(!chunker.in_fence());

        chunker.push("```js\n");
        assert!(chunker.in_fence());
    }

    #[test]
    fn flush_drains_remaining_content() {
        let mut chunker = chunker(100, 500);

        chunker.push("leftover");
        let chunk = chunker.flush().unwrap();

        assert_eq!(chunk.content, "leftover");
        assert_eq!(chunk.break_kind, BreakKind::Hard);
        assert_eq!(chunker.buffered_len(), 0);
        assert!(chunker.flush().is_none());
    }

    #[test]
    fn flush_inside_fence_marks_partial() {
        let mut chunker = chunker(100, 5000);

        chunker.push("```\nunfinished");
        let chunk = chunker.flush().unwrap();

        assert!(chunk.partial_fence);
        assert!(chunk.contains_fence);
    }

    #[test]
    fn line_budget_caps_the_window() {
        let mut chunker = Chunker::new(ChunkerConfig {
            min_chars: 1,
            max_chars: Some(2000),
            max_lines: Some(2),
            ..ChunkerConfig::default()
        });

        let chunks = chunker.push("one\ntwo\nthree\nfour\n");

        assert!(!chunks.is_empty());
        assert!(chunks[0].content.lines().count() <= 2);
    }

    #[test]
    fn markdown_document_chunks_keep_fences_balanced() {
        let mut chunker = chunker(10, 200);

        let text = indoc::indoc! {r#"
            Intro paragraph that says hello.

            ```rust
            fn main() {}
            ```

            Closing words.
        "#};

        let mut chunks = chunker.push(text);
        chunks.extend(chunker.flush());

        assert!(chunks[0].content.ends_with("hello.\n\n"));
        assert_eq!(chunks[0].break_kind, BreakKind::Paragraph);

        for chunk in &chunks {
            assert_eq!(chunk.content.matches("```").count() % 2, 0, "unbalanced fence in chunk");
        }

        let rejoined: String = chunks.iter().map(|chunk| chunk.content.as_str()).collect();
        assert_eq!(rejoined, text);
    }

    #[test]
    fn unbounded_profile_still_splits_at_breaks() {
        let mut chunker = Chunker::new(ChunkerConfig::default());

        let chunks = chunker.push("Hello world.\n\nNext");

        assert!(!chunks.is_empty());
        assert_eq!(chunks[0].break_kind, BreakKind::Paragraph);
    }
}
