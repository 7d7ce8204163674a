use std::borrow::Cow;
use std::collections::VecDeque;

/// Which backing storage a [`TextBuffer`] uses.
///
/// The two variants are observably identical; the chunk list avoids
/// re-copying the accumulated text on every append at the cost of allocating
/// per push.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BufferKind {
    /// One growing backing string.
    #[default]
    Contiguous,
    /// A list of appended segments, joined lazily on peek.
    Chunked,
}

/// Append-mostly character buffer feeding the chunker.
///
/// All positions and lengths count Unicode scalar values; consuming or
/// peeking never splits a scalar.
#[derive(Debug)]
pub struct TextBuffer {
    backing: Backing,
    char_len: usize,
}

#[derive(Debug)]
enum Backing {
    Contiguous(String),
    Chunked(VecDeque<String>),
}

impl TextBuffer {
    /// Creates an empty buffer with the given backing.
    pub fn new(kind: BufferKind) -> Self {
        let backing = match kind {
            BufferKind::Contiguous => Backing::Contiguous(String::new()),
            BufferKind::Chunked => Backing::Chunked(VecDeque::new()),
        };

        Self { backing, char_len: 0 }
    }

    /// Appends text to the end of the buffer.
    pub fn append(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }

        self.char_len += text.chars().count();

        match &mut self.backing {
            Backing::Contiguous(s) => s.push_str(text),
            Backing::Chunked(segments) => segments.push_back(text.to_string()),
        }
    }

    /// Number of buffered characters.
    pub fn len(&self) -> usize {
        self.char_len
    }

    /// Whether the buffer holds no characters.
    pub fn is_empty(&self) -> bool {
        self.char_len == 0
    }

    /// Non-destructive view of the first `chars` characters (or everything,
    /// if shorter).
    pub fn peek(&self, chars: usize) -> Cow<'_, str> {
        match &self.backing {
            Backing::Contiguous(s) => {
                let end = byte_index_for_char(s, chars);
                Cow::Borrowed(&s[..end])
            }
            Backing::Chunked(segments) => {
                let mut out = String::new();
                let mut remaining = chars;

                for segment in segments {
                    if remaining == 0 {
                        break;
                    }

                    let take = byte_index_for_char(segment, remaining);
                    out.push_str(&segment[..take]);
                    remaining = remaining.saturating_sub(segment[..take].chars().count());
                }

                Cow::Owned(out)
            }
        }
    }

    /// Non-destructive view of the entire buffered text.
    pub fn peek_all(&self) -> Cow<'_, str> {
        self.peek(self.char_len)
    }

    /// Removes and returns the first `chars` characters.
    pub fn consume(&mut self, chars: usize) -> String {
        let chars = chars.min(self.char_len);
        self.char_len -= chars;

        match &mut self.backing {
            Backing::Contiguous(s) => {
                let end = byte_index_for_char(s, chars);
                let rest = s.split_off(end);
                std::mem::replace(s, rest)
            }
            Backing::Chunked(segments) => {
                let mut out = String::new();
                let mut remaining = chars;

                while remaining > 0 {
                    let Some(mut segment) = segments.pop_front() else {
                        break;
                    };

                    let segment_chars = segment.chars().count();

                    if segment_chars <= remaining {
                        remaining -= segment_chars;
                        out.push_str(&segment);
                    } else {
                        let split = byte_index_for_char(&segment, remaining);
                        let rest = segment.split_off(split);
                        out.push_str(&segment);
                        segments.push_front(rest);
                        remaining = 0;
                    }
                }

                out
            }
        }
    }

    /// Discards everything.
    pub fn clear(&mut self) {
        self.char_len = 0;

        match &mut self.backing {
            Backing::Contiguous(s) => s.clear(),
            Backing::Chunked(segments) => segments.clear(),
        }
    }
}

/// Byte index of the `chars`-th character of `s`, or `s.len()` when the
/// string is shorter.
pub(crate) fn byte_index_for_char(s: &str, chars: usize) -> usize {
    s.char_indices().nth(chars).map(|(i, _)| i).unwrap_or(s.len())
}
