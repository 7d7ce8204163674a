/// The delimiter character family of a fence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceMarker {
    /// Triple backticks.
    Backtick,
    /// Triple tildes.
    Tilde,
}

impl FenceMarker {
    fn delimiter(self) -> char {
        match self {
            FenceMarker::Backtick => '`',
            FenceMarker::Tilde => '~',
        }
    }
}

/// A fence whose opening marker has been seen but not yet closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenFence {
    /// Which delimiter opened the fence; the closing marker must match.
    pub marker: FenceMarker,
    /// Character offset of the opening line within the tracked text.
    pub start_offset: usize,
    /// The infostring (language tag) following the opening marker, if any.
    pub info: Option<String>,
}

/// Tracks whether the tail of a streamed text sits inside an unclosed code
/// fence.
///
/// Updates are incremental over appended text. Markers count only at line
/// starts after optional indentation; an opening marker takes effect as soon
/// as it appears (even before its line is complete), while a closing marker
/// only counts once its line terminates, because trailing content would
/// invalidate it.
#[derive(Debug, Default)]
pub struct FenceTracker {
    open: Option<OpenFence>,
    /// Set while `open` was created by the current, still-incomplete line.
    opened_on_current_line: bool,
    line: String,
    offset: usize,
    line_start: usize,
}

impl FenceTracker {
    /// Creates a tracker in the empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds appended text into the tracker.
    pub fn update(&mut self, text: &str) {
        for c in text.chars() {
            self.offset += 1;

            if c == '\n' {
                self.finish_line();
                continue;
            }

            // Only the line prefix matters for fence detection; cap the
            // scratch line so pathological single-line input stays cheap.
            if self.line.len() < 512 {
                self.line.push(c);
            }

            if self.open.is_none()
                && let Some((marker, info)) = parse_opening(&self.line)
            {
                self.open = Some(OpenFence {
                    marker,
                    start_offset: self.line_start,
                    info,
                });
                self.opened_on_current_line = true;
            } else if self.opened_on_current_line
                && let Some(fence) = &mut self.open
            {
                // The infostring grows while the opening line is still
                // streaming in.
                if let Some((_, info)) = parse_opening(&self.line) {
                    fence.info = info;
                }
            }
        }
    }

    /// Whether the current suffix is inside an unclosed fence.
    pub fn in_fence(&self) -> bool {
        self.open.is_some()
    }

    /// The currently open fence, if any.
    pub fn current(&self) -> Option<&OpenFence> {
        self.open.as_ref()
    }

    /// Restarts tracking from the empty state. Callers replay the unread
    /// remainder through [`FenceTracker::update`] after a consume.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn finish_line(&mut self) {
        if let Some(fence) = &self.open
            && !self.opened_on_current_line
            && is_closing(&self.line, fence.marker)
        {
            self.open = None;
        }

        self.opened_on_current_line = false;
        self.line.clear();
        self.line_start = self.offset;
    }
}

fn strip_indent(line: &str) -> &str {
    line.trim_start_matches([' ', '\t'])
}

fn parse_opening(line: &str) -> Option<(FenceMarker, Option<String>)> {
    let body = strip_indent(line);
    let first = body.chars().next()?;

    let marker = match first {
        '`' => FenceMarker::Backtick,
        '~' => FenceMarker::Tilde,
        _ => return None,
    };

    let run = body.chars().take_while(|&c| c == first).count();

    if run < 3 {
        return None;
    }

    let info = body[run..].trim();

    // A backtick-fence infostring cannot itself contain backticks; such a
    // line is inline code, not a fence.
    if marker == FenceMarker::Backtick && info.contains('`') {
        return None;
    }

    Some((marker, (!info.is_empty()).then(|| info.to_string())))
}

fn is_closing(line: &str, marker: FenceMarker) -> bool {
    let body = strip_indent(line);
    let delimiter = marker.delimiter();
    let run = body.chars().take_while(|&c| c == delimiter).count();

    run >= 3 && body[run..].trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_and_closes_a_backtick_fence() {
        let mut tracker = FenceTracker::new();

        tracker.update("before\n```rust\nlet x = 1;\n");
        assert!(tracker.in_fence());
        assert_eq!(tracker.current().unwrap().info.as_deref(), Some("rust"));
        assert_eq!(tracker.current().unwrap().marker, FenceMarker::Backtick);

        tracker.update("```\nafter");
        assert!(!tracker.in_fence());
    }

    #[test]
    fn opening_takes_effect_before_the_line_completes() {
        let mut tracker = FenceTracker::new();

        tracker.update("```py");
        assert!(tracker.in_fence());
        assert_eq!(tracker.current().unwrap().info.as_deref(), Some("py"));
    }

    #[test]
    fn marker_split_across_updates() {
        let mut tracker = FenceTracker::new();

        tracker.update("``");
        assert!(!tracker.in_fence());

        tracker.update("`\ncode\n");
        assert!(tracker.in_fence());
    }

    #[test]
    fn mismatched_marker_does_not_close() {
        let mut tracker = FenceTracker::new();

        tracker.update("~~~\ncode\n```\n");
        assert!(tracker.in_fence());

        tracker.update("~~~\n");
        assert!(!tracker.in_fence());
    }

    #[test]
    fn closing_requires_a_bare_line() {
        let mut tracker = FenceTracker::new();

        tracker.update("```\ncode\n``` trailing\n");
        assert!(tracker.in_fence());
    }

    #[test]
    fn inline_code_is_not_a_fence() {
        let mut tracker = FenceTracker::new();

        tracker.update("some `inline` code\nand `` double `` ticks\n");
        assert!(!tracker.in_fence());
    }

    #[test]
    fn marker_must_sit_at_line_start() {
        let mut tracker = FenceTracker::new();

        tracker.update("text ```\nmore\n");
        assert!(!tracker.in_fence());

        tracker.update("  ```\n");
        assert!(tracker.in_fence());
    }

    #[test]
    fn reset_clears_state() {
        let mut tracker = FenceTracker::new();

        tracker.update("```\ninside\n");
        tracker.reset();

        assert!(!tracker.in_fence());

        tracker.update("plain text\n");
        assert!(!tracker.in_fence());
    }

    #[test]
    fn start_offset_points_at_the_opening_line() {
        let mut tracker = FenceTracker::new();

        tracker.update("ab\n```\n");
        assert_eq!(tracker.current().unwrap().start_offset, 3);
    }
}
