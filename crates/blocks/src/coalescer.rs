use std::time::{Duration, Instant};

use crate::chunker::TextChunk;

/// Merging thresholds for a [`Coalescer`].
#[derive(Debug, Clone)]
pub struct CoalescerConfig {
    /// Maximum idle time between chunks that still merges them. Zero
    /// disables coalescing entirely.
    pub gap: Duration,
    /// Combined size cap; a merge that would exceed it flushes the pending
    /// chunk first.
    pub max_size: usize,
    /// Chunks at least this large pass straight through, displacing any
    /// pending chunk.
    pub min_passthrough: usize,
}

/// Merges small adjacent chunks arriving in quick succession.
///
/// There is no internal timer; the pending chunk leaves either on a later
/// push or through [`Coalescer::flush`], which the owner calls on drain and
/// completion.
#[derive(Debug)]
pub struct Coalescer {
    config: CoalescerConfig,
    pending: Option<TextChunk>,
    pending_chars: usize,
    last_arrival: Option<Instant>,
}

impl Coalescer {
    /// Creates an empty coalescer.
    pub fn new(config: CoalescerConfig) -> Self {
        Self {
            config,
            pending: None,
            pending_chars: 0,
            last_arrival: None,
        }
    }

    /// Offers a chunk, returning everything ready to emit.
    pub fn push(&mut self, chunk: TextChunk, now: Instant) -> Vec<TextChunk> {
        if self.config.gap.is_zero() {
            return vec![chunk];
        }

        let mut out = Vec::new();
        let chunk_chars = chunk.char_len();

        if chunk_chars >= self.config.min_passthrough {
            out.extend(self.flush());
            out.push(chunk);
            self.last_arrival = Some(now);
            return out;
        }

        let gap_expired = self
            .last_arrival
            .is_some_and(|last| now.duration_since(last) > self.config.gap);

        let overflow = self.pending_chars + chunk_chars > self.config.max_size;

        if self.pending.is_some() && (gap_expired || overflow) {
            out.extend(self.flush());
        }

        match &mut self.pending {
            Some(pending) => {
                pending.content.push_str(&chunk.content);
                pending.break_kind = chunk.break_kind;
                pending.contains_fence |= chunk.contains_fence;
                pending.partial_fence |= chunk.partial_fence;
                self.pending_chars += chunk_chars;
            }
            None => {
                self.pending_chars = chunk_chars;
                self.pending = Some(chunk);
            }
        }

        self.last_arrival = Some(now);

        out
    }

    /// Drains the pending chunk. Authoritative: callable at any time.
    pub fn flush(&mut self) -> Option<TextChunk> {
        self.pending_chars = 0;
        self.pending.take()
    }

    /// Characters held back waiting for a merge partner.
    pub fn pending_len(&self) -> usize {
        self.pending_chars
    }

    /// The pending content, for handler handoff.
    pub(crate) fn take_pending_content(&mut self) -> Option<String> {
        self.flush().map(|chunk| chunk.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breakpoint::BreakKind;

    fn chunk(content: &str) -> TextChunk {
        TextChunk {
            content: content.to_string(),
            break_kind: BreakKind::Word,
            contains_fence: false,
            partial_fence: false,
        }
    }

    fn coalescer(gap_ms: u64) -> Coalescer {
        Coalescer::new(CoalescerConfig {
            gap: Duration::from_millis(gap_ms),
            max_size: 100,
            min_passthrough: 50,
        })
    }

    #[test]
    fn merges_chunks_within_the_gap() {
        let mut coalescer = coalescer(200);
        let start = Instant::now();

        assert!(coalescer.push(chunk("Hello "), start).is_empty());
        assert!(
            coalescer
                .push(chunk("world"), start + Duration::from_millis(50))
                .is_empty()
        );

        let merged = coalescer.flush().unwrap();
        assert_eq!(merged.content, "Hello world");
    }

    #[test]
    fn expired_gap_flushes_the_pending_chunk() {
        let mut coalescer = coalescer(200);
        let start = Instant::now();

        coalescer.push(chunk("first"), start);
        let out = coalescer.push(chunk("second"), start + Duration::from_millis(500));

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].content, "first");
        assert_eq!(coalescer.flush().unwrap().content, "second");
    }

    #[test]
    fn size_overflow_flushes_first() {
        let mut coalescer = coalescer(200);
        let start = Instant::now();

        coalescer.push(chunk(&"a".repeat(40)), start);
        let out = coalescer.push(chunk(&"b".repeat(45)), start + Duration::from_millis(10));

        // 40 + 45 < 100, merges; a third pushes past the cap.
        assert!(out.is_empty());
        let out = coalescer.push(chunk(&"c".repeat(30)), start + Duration::from_millis(20));

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].content.len(), 85);
    }

    #[test]
    fn large_chunk_passes_through_and_displaces_pending() {
        let mut coalescer = coalescer(200);
        let start = Instant::now();

        coalescer.push(chunk("tiny"), start);
        let out = coalescer.push(chunk(&"x".repeat(60)), start + Duration::from_millis(10));

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].content, "tiny");
        assert_eq!(out[1].content.len(), 60);
        assert!(coalescer.flush().is_none());
    }

    #[test]
    fn zero_gap_disables_coalescing() {
        let mut coalescer = coalescer(0);

        let out = coalescer.push(chunk("a"), Instant::now());
        assert_eq!(out.len(), 1);
        assert!(coalescer.flush().is_none());
    }

    #[test]
    fn merged_chunk_keeps_the_latest_break_kind() {
        let mut coalescer = coalescer(200);
        let start = Instant::now();

        coalescer.push(chunk("a "), start);

        let mut sentence = chunk("b. ");
        sentence.break_kind = BreakKind::Sentence;
        coalescer.push(sentence, start + Duration::from_millis(10));

        assert_eq!(coalescer.flush().unwrap().break_kind, BreakKind::Sentence);
    }
}
