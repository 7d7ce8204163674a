use serde::{Deserialize, Serialize};

/// The kind of boundary a chunk was cut at, in preference order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BreakKind {
    /// A blank line (double newline).
    Paragraph,
    /// Sentence-ending punctuation followed by whitespace.
    Sentence,
    /// A single newline.
    Line,
    /// Clause punctuation (`,` `;` `:`) followed by whitespace.
    Clause,
    /// Any whitespace.
    Word,
    /// A forced cut with no structural boundary.
    Hard,
}

/// Finds a split position in `[min, max]` (character positions) preferring
/// paragraph > sentence > line > clause > word breaks.
///
/// Within each class the first candidate at or after `min` wins; classes are
/// tried in priority order across the whole window. Returns `None` when no
/// structural break fits, in which case the caller falls back to a hard cut
/// at `max`.
pub fn find_break_point(text: &str, min: usize, max: usize) -> Option<(usize, BreakKind)> {
    if max == 0 || min > max {
        return None;
    }

    let chars: Vec<char> = text.chars().collect();
    let min = min.max(1);

    let candidates: [(BreakKind, fn(&[char], usize) -> Option<usize>); 5] = [
        (BreakKind::Paragraph, paragraph_split),
        (BreakKind::Sentence, sentence_split),
        (BreakKind::Line, line_split),
        (BreakKind::Clause, clause_split),
        (BreakKind::Word, word_split),
    ];

    for (kind, split_after) in candidates {
        for i in 0..chars.len() {
            let Some(pos) = split_after(&chars, i) else {
                continue;
            };

            if pos >= min && pos <= max && pos <= chars.len() {
                return Some((pos, kind));
            }

            if pos > max {
                break;
            }
        }
    }

    None
}

fn paragraph_split(chars: &[char], i: usize) -> Option<usize> {
    (chars[i] == '\n' && chars.get(i + 1) == Some(&'\n')).then_some(i + 2)
}

fn sentence_split(chars: &[char], i: usize) -> Option<usize> {
    let is_terminator = matches!(chars[i], '.' | '!' | '?');

    (is_terminator && chars.get(i + 1).is_some_and(|c| c.is_whitespace())).then_some(i + 2)
}

fn line_split(chars: &[char], i: usize) -> Option<usize> {
    (chars[i] == '\n').then_some(i + 1)
}

fn clause_split(chars: &[char], i: usize) -> Option<usize> {
    let is_clause = matches!(chars[i], ',' | ';' | ':');

    (is_clause && chars.get(i + 1).is_some_and(|c| c.is_whitespace())).then_some(i + 2)
}

fn word_split(chars: &[char], i: usize) -> Option<usize> {
    chars[i].is_whitespace().then_some(i + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paragraph_beats_sentence() {
        let text = "First sentence. Rest of it.\n\nSecond paragraph.";

        let (pos, kind) = find_break_point(text, 1, text.chars().count()).unwrap();

        assert_eq!(kind, BreakKind::Paragraph);
        assert_eq!(&text[..pos], "First sentence. Rest of it.\n\n");
    }

    #[test]
    fn sentence_beats_line() {
        let text = "Intro line\nwith more. Tail";

        let (pos, kind) = find_break_point(text, 1, text.chars().count()).unwrap();

        assert_eq!(kind, BreakKind::Sentence);
        assert_eq!(&text[..pos], "Intro line\nwith more. ");
    }

    #[test]
    fn first_candidate_at_or_after_min_wins() {
        let text = "a. b. c. d.";

        // min = 5 skips the break after "a." and lands on the one after "b."
        let (pos, kind) = find_break_point(text, 5, text.chars().count()).unwrap();

        assert_eq!(kind, BreakKind::Sentence);
        assert_eq!(&text[..pos], "a. b. ");
    }

    #[test]
    fn clause_and_word_fallbacks() {
        let text = "alpha, beta gamma";

        let (pos, kind) = find_break_point(text, 1, text.chars().count()).unwrap();
        assert_eq!(kind, BreakKind::Clause);
        assert_eq!(&text[..pos], "alpha, ");

        let (pos, kind) = find_break_point("alpha beta", 1, 10).unwrap();
        assert_eq!(kind, BreakKind::Word);
        assert_eq!(pos, 6);
    }

    #[test]
    fn no_candidate_returns_none() {
        assert_eq!(find_break_point("unbroken", 1, 8), None);
    }

    #[test]
    fn candidate_outside_window_is_ignored() {
        // The only break sits past max.
        assert_eq!(find_break_point("abcdefgh ij", 1, 5), None);
    }
}
