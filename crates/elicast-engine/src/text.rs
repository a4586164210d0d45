//! Document reconstruction and position helpers.
//!
//! All positions are character offsets. Out-of-range offsets are clamped the
//! way string slicing behaves in the recorder front end, so replaying a log
//! that starts from an implicit base document still yields a string.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::op::{Operation, TextEdit};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TextError {
    #[error("expected {expected:?} at position {at} but the document holds {found:?}")]
    RemovedTextMismatch {
        at: usize,
        expected: String,
        found: String,
    },
}

/// Zero-based line and column (in characters) of a document position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineCh {
    pub line: usize,
    pub ch: usize,
}

fn line_separator() -> &'static Regex {
    static LINE_SEPARATOR: OnceLock<Regex> = OnceLock::new();
    LINE_SEPARATOR.get_or_init(|| Regex::new(r"\r\n?|\n").expect("Invalid line separator regex"))
}

/// Byte index of character offset `pos`, clamped to the end of `doc`.
fn byte_index(doc: &str, pos: usize) -> usize {
    doc.char_indices()
        .nth(pos)
        .map(|(idx, _)| idx)
        .unwrap_or(doc.len())
}

/// Characters `[from, to)` of `doc`, clamped to its bounds.
pub fn slice_chars(doc: &str, from: usize, to: usize) -> &str {
    let start = byte_index(doc, from);
    let end = byte_index(doc, to.max(from));
    &doc[start..end]
}

/// Replace characters `[from, to)` of `doc` with `inserted`.
pub fn splice_chars(doc: &str, from: usize, to: usize, inserted: &str) -> String {
    let head = &doc[..byte_index(doc, from)];
    let tail = &doc[byte_index(doc, to)..];

    let mut out = String::with_capacity(head.len() + inserted.len() + tail.len());
    out.push_str(head);
    out.push_str(inserted);
    out.push_str(tail);
    out
}

/// Fold every text edit of `ops` into the resulting document, starting from
/// an empty one. Non-text operations are ignored.
pub fn build_text<'a, I>(ops: I) -> String
where
    I: IntoIterator<Item = &'a Operation>,
{
    ops.into_iter()
        .filter_map(Operation::as_text)
        .fold(String::new(), |doc, edit| {
            splice_chars(&doc, edit.from_pos(), edit.before_to_pos(), edit.inserted_text())
        })
}

/// Apply `edit` to `doc`, checking that the replaced characters match.
pub fn apply_edit(doc: &str, edit: &TextEdit) -> Result<String, TextError> {
    let found = slice_chars(doc, edit.from_pos(), edit.before_to_pos());
    if found != edit.removed_text() {
        return Err(TextError::RemovedTextMismatch {
            at: edit.from_pos(),
            expected: edit.removed_text().to_string(),
            found: found.to_string(),
        });
    }
    Ok(splice_chars(
        doc,
        edit.from_pos(),
        edit.before_to_pos(),
        edit.inserted_text(),
    ))
}

/// Undo `edit` on a document it was applied to.
pub fn revert_edit(doc: &str, edit: &TextEdit) -> Result<String, TextError> {
    apply_edit(doc, &edit.inverse())
}

pub fn pos_to_line_ch(doc: &str, pos: usize) -> LineCh {
    let mut line = 0;
    let mut ch = pos;
    let mut seen_chars = 0;
    let mut seen_bytes = 0;

    for separator in line_separator().find_iter(doc) {
        seen_chars += doc[seen_bytes..separator.end()].chars().count();
        seen_bytes = separator.end();
        if pos < seen_chars {
            break;
        }
        ch = pos - seen_chars;
        line += 1;
    }

    LineCh { line, ch }
}

/// Every line of `doc` with the character offset it starts at, split on the
/// same separators as [`pos_to_line_ch`].
pub fn lines_with_offsets(doc: &str) -> Vec<(usize, &str)> {
    let mut lines = Vec::new();
    let mut start_byte = 0;
    let mut start_char = 0;

    for separator in line_separator().find_iter(doc) {
        let line = &doc[start_byte..separator.start()];
        lines.push((start_char, line));
        start_char += doc[start_byte..separator.end()].chars().count();
        start_byte = separator.end();
    }
    lines.push((start_char, &doc[start_byte..]));
    lines
}

/// Character offset of `line_ch`, or `None` if `doc` has fewer lines.
pub fn line_ch_to_pos(doc: &str, line_ch: LineCh) -> Option<usize> {
    if line_ch.line == 0 {
        return Some(line_ch.ch);
    }

    let separator = line_separator().find_iter(doc).nth(line_ch.line - 1)?;
    Some(doc[..separator.end()].chars().count() + line_ch.ch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[test]
    fn build_text_ignores_non_text_operations() {
        let plain = vec![
            Operation::insert(0, 0, "ac"),
            Operation::insert(1, 1, "b"),
            Operation::text(2, 0, 1, "A", "a").unwrap(),
        ];
        let mut noisy = plain.clone();
        noisy.insert(0, Operation::record_start(0, 0, 0, 0));
        noisy.insert(2, Operation::selection(1, 0, 2));
        noisy.push(Operation::record_end(3));

        assert_eq!(build_text(&plain), "Abc");
        assert_eq!(build_text(&noisy), "Abc");
    }

    #[test]
    fn build_text_clamps_positions_past_the_end() {
        let ops = vec![Operation::insert(0, 1, "b"), Operation::insert(0, 2, "c")];
        assert_eq!(build_text(&ops), "bc");
    }

    #[test]
    fn splice_chars_counts_characters() {
        assert_eq!(splice_chars("호엉이", 1, 2, "으어"), "호으어이");
    }

    #[test]
    fn apply_and_revert_round_trip() {
        let edit = TextEdit::new(1, 3, "xyz", "bc").unwrap();
        let applied = apply_edit("abcd", &edit).unwrap();

        assert_eq!(applied, "axyzd");
        assert_eq!(revert_edit(&applied, &edit).unwrap(), "abcd");
    }

    #[test]
    fn apply_rejects_mismatched_removed_text() {
        let edit = TextEdit::new(0, 1, "", "z").unwrap();
        assert_eq!(
            apply_edit("abc", &edit),
            Err(TextError::RemovedTextMismatch {
                at: 0,
                expected: "z".into(),
                found: "a".into(),
            })
        );
    }

    #[rstest]
    #[case(0, 0, 0)]
    #[case(2, 0, 2)]
    #[case(3, 1, 0)]
    #[case(5, 1, 2)]
    #[case(7, 2, 0)]
    #[case(9, 2, 2)]
    #[case(10, 3, 0)]
    fn pos_to_line_ch_handles_all_separators(
        #[case] pos: usize,
        #[case] line: usize,
        #[case] ch: usize,
    ) {
        let doc = "ab\ncd\r\nef\rg";
        assert_eq!(pos_to_line_ch(doc, pos), LineCh { line, ch });
    }

    #[test]
    fn line_ch_to_pos_inverts_pos_to_line_ch() {
        let doc = "ab\ncd\r\nef\rg";
        for pos in 0..=doc.chars().count() {
            let line_ch = pos_to_line_ch(doc, pos);
            assert_eq!(line_ch_to_pos(doc, line_ch), Some(pos));
        }
        assert_eq!(line_ch_to_pos(doc, LineCh { line: 4, ch: 0 }), None);
    }

    #[test]
    fn lines_with_offsets_agree_with_pos_to_line_ch() {
        let doc = "ab\ncd\r\nef\rg";
        let lines = lines_with_offsets(doc);
        assert_eq!(lines, vec![(0, "ab"), (3, "cd"), (7, "ef"), (10, "g")]);

        for (index, (offset, _)) in lines.iter().enumerate() {
            assert_eq!(pos_to_line_ch(doc, *offset), LineCh { line: index, ch: 0 });
        }
        assert_eq!(lines_with_offsets(""), vec![(0, "")]);
    }
}
