//! # Operation Model
//!
//! A recorded session is a log of [`Operation`]s sorted by timestamp. Each
//! operation carries a `ts` plus one [`OpKind`] variant. Only [`OpKind::Text`]
//! and [`OpKind::Selection`] carry document positions; every other variant is
//! opaque to the splice engine and travels through it untouched.
//!
//! Positions are character offsets (Unicode scalar values) into the document
//! produced by replaying every preceding text edit.
//!
//! The JSON shape matches the persisted session format:
//!
//! ```json
//! { "ts": 1200, "command": "text", "fromPos": 3, "toPos": 4, "insertedText": "x", "removedText": "y" }
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Milliseconds since the start of the recording.
pub type Timestamp = u64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OpError {
    #[error("toPos {to_pos} must not be smaller than fromPos {from_pos}")]
    InvertedRange { from_pos: usize, to_pos: usize },
    #[error("removed text has {actual} characters, which does not fit [{from_pos}, {to_pos})")]
    RemovedTextLength {
        from_pos: usize,
        to_pos: usize,
        actual: usize,
    },
    #[error("a run without an exit code cannot carry output")]
    OutputWithoutExitCode,
}

/// One timestamped entry of the history log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub ts: Timestamp,
    #[serde(flatten)]
    pub kind: OpKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command")]
pub enum OpKind {
    /// Keep-alive tick anchored to wall-clock `time`.
    #[serde(rename = "nop")]
    Nop { time: u64 },
    #[serde(rename = "record_start")]
    RecordStart(RecordStart),
    #[serde(rename = "record_end")]
    RecordEnd,
    #[serde(rename = "selection")]
    Selection(Selection),
    #[serde(rename = "text")]
    Text(TextEdit),
    /// Opens or closes an exercise block.
    #[serde(rename = "exPlaceholder")]
    Exercise {
        #[serde(rename = "exId")]
        ex_id: u32,
    },
    #[serde(rename = "exShow")]
    ExerciseShow {
        #[serde(rename = "exId")]
        ex_id: u32,
        description: String,
    },
    #[serde(rename = "run")]
    Run(Run),
    /// Opens or closes an assertion block.
    #[serde(rename = "assert")]
    Assert { time: u64 },
}

/// Variant discriminant of an [`OpKind`], used for lookups and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OpTag {
    Nop,
    RecordStart,
    RecordEnd,
    Selection,
    Text,
    Exercise,
    ExerciseShow,
    Run,
    Assert,
}

impl fmt::Display for OpTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let command = match self {
            OpTag::Nop => "nop",
            OpTag::RecordStart => "record_start",
            OpTag::RecordEnd => "record_end",
            OpTag::Selection => "selection",
            OpTag::Text => "text",
            OpTag::Exercise => "exPlaceholder",
            OpTag::ExerciseShow => "exShow",
            OpTag::Run => "run",
            OpTag::Assert => "assert",
        };
        f.write_str(command)
    }
}

impl OpKind {
    pub fn tag(&self) -> OpTag {
        match self {
            OpKind::Nop { .. } => OpTag::Nop,
            OpKind::RecordStart(_) => OpTag::RecordStart,
            OpKind::RecordEnd => OpTag::RecordEnd,
            OpKind::Selection(_) => OpTag::Selection,
            OpKind::Text(_) => OpTag::Text,
            OpKind::Exercise { .. } => OpTag::Exercise,
            OpKind::ExerciseShow { .. } => OpTag::ExerciseShow,
            OpKind::Run(_) => OpTag::Run,
            OpKind::Assert { .. } => OpTag::Assert,
        }
    }
}

/// Start of an audio-backed recording span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordStart {
    /// Index of the audio chunk recorded from this point on.
    pub sound_chunk_idx: u32,
    /// Wall-clock time (ms) at which recording started.
    pub time: u64,
    /// Offset (ms) into the audio chunk that corresponds to `ts`.
    #[serde(default)]
    pub sound_offset: u64,
}

/// Cursor or selection snapshot. `from_pos` may be greater than `to_pos`
/// for a reversed selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    pub from_pos: usize,
    pub to_pos: usize,
}

impl Selection {
    pub fn new(from_pos: usize, to_pos: usize) -> Self {
        Self { from_pos, to_pos }
    }
}

/// Replacement of `removed_text` at `[from_pos, to_pos)` with `inserted_text`.
///
/// Fields are private so that `to_pos - from_pos == removed_text.chars().count()`
/// holds for every value, including deserialized ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawTextEdit")]
pub struct TextEdit {
    from_pos: usize,
    to_pos: usize,
    inserted_text: String,
    removed_text: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTextEdit {
    from_pos: usize,
    to_pos: usize,
    inserted_text: String,
    removed_text: String,
}

impl TryFrom<RawTextEdit> for TextEdit {
    type Error = OpError;

    fn try_from(raw: RawTextEdit) -> Result<Self, Self::Error> {
        TextEdit::new(raw.from_pos, raw.to_pos, raw.inserted_text, raw.removed_text)
    }
}

impl TextEdit {
    pub fn new(
        from_pos: usize,
        to_pos: usize,
        inserted_text: impl Into<String>,
        removed_text: impl Into<String>,
    ) -> Result<Self, OpError> {
        let inserted_text = inserted_text.into();
        let removed_text = removed_text.into();

        if to_pos < from_pos {
            return Err(OpError::InvertedRange { from_pos, to_pos });
        }
        let actual = removed_text.chars().count();
        if to_pos - from_pos != actual {
            return Err(OpError::RemovedTextLength {
                from_pos,
                to_pos,
                actual,
            });
        }

        Ok(Self {
            from_pos,
            to_pos,
            inserted_text,
            removed_text,
        })
    }

    /// Pure insertion at `at`.
    pub fn insert(at: usize, text: impl Into<String>) -> Self {
        Self {
            from_pos: at,
            to_pos: at,
            inserted_text: text.into(),
            removed_text: String::new(),
        }
    }

    pub fn from_pos(&self) -> usize {
        self.from_pos
    }

    pub fn to_pos(&self) -> usize {
        self.to_pos
    }

    pub fn inserted_text(&self) -> &str {
        &self.inserted_text
    }

    pub fn removed_text(&self) -> &str {
        &self.removed_text
    }

    pub fn inserted_len(&self) -> usize {
        self.inserted_text.chars().count()
    }

    pub fn removed_len(&self) -> usize {
        self.to_pos - self.from_pos
    }

    /// End of the replaced range in the document before this edit.
    pub fn before_to_pos(&self) -> usize {
        self.to_pos
    }

    /// End of the inserted range in the document after this edit.
    pub fn after_to_pos(&self) -> usize {
        self.from_pos + self.inserted_len()
    }

    /// The same edit moved by `delta` positions, clamped at the document start.
    pub fn shifted(&self, delta: isize) -> Self {
        let from_pos = self.from_pos.saturating_add_signed(delta);
        Self {
            from_pos,
            to_pos: from_pos + self.removed_len(),
            inserted_text: self.inserted_text.clone(),
            removed_text: self.removed_text.clone(),
        }
    }

    /// The edit that undoes this one.
    pub fn inverse(&self) -> Self {
        Self {
            from_pos: self.from_pos,
            to_pos: self.after_to_pos(),
            inserted_text: self.removed_text.clone(),
            removed_text: self.inserted_text.clone(),
        }
    }
}

/// Result of running the program. A run still in progress has neither exit
/// code nor output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawRun")]
pub struct Run {
    exit_code: Option<i32>,
    output: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRun {
    exit_code: Option<i32>,
    output: Option<String>,
}

impl TryFrom<RawRun> for Run {
    type Error = OpError;

    fn try_from(raw: RawRun) -> Result<Self, Self::Error> {
        Run::new(raw.exit_code, raw.output)
    }
}

impl Run {
    pub fn new(exit_code: Option<i32>, output: Option<String>) -> Result<Self, OpError> {
        if exit_code.is_none() && output.is_some() {
            return Err(OpError::OutputWithoutExitCode);
        }
        Ok(Self { exit_code, output })
    }

    pub fn running() -> Self {
        Self {
            exit_code: None,
            output: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.exit_code.is_none()
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    pub fn output(&self) -> Option<&str> {
        self.output.as_deref()
    }
}

impl Operation {
    pub fn new(ts: Timestamp, kind: OpKind) -> Self {
        Self { ts, kind }
    }

    /// Validated text edit.
    pub fn text(
        ts: Timestamp,
        from_pos: usize,
        to_pos: usize,
        inserted_text: impl Into<String>,
        removed_text: impl Into<String>,
    ) -> Result<Self, OpError> {
        let edit = TextEdit::new(from_pos, to_pos, inserted_text, removed_text)?;
        Ok(Self::new(ts, OpKind::Text(edit)))
    }

    pub fn insert(ts: Timestamp, at: usize, text: impl Into<String>) -> Self {
        Self::new(ts, OpKind::Text(TextEdit::insert(at, text)))
    }

    pub fn selection(ts: Timestamp, from_pos: usize, to_pos: usize) -> Self {
        Self::new(ts, OpKind::Selection(Selection::new(from_pos, to_pos)))
    }

    pub fn record_start(ts: Timestamp, sound_chunk_idx: u32, time: u64, sound_offset: u64) -> Self {
        Self::new(
            ts,
            OpKind::RecordStart(RecordStart {
                sound_chunk_idx,
                time,
                sound_offset,
            }),
        )
    }

    pub fn record_end(ts: Timestamp) -> Self {
        Self::new(ts, OpKind::RecordEnd)
    }

    pub fn tag(&self) -> OpTag {
        self.kind.tag()
    }

    pub fn as_text(&self) -> Option<&TextEdit> {
        match &self.kind {
            OpKind::Text(edit) => Some(edit),
            _ => None,
        }
    }

    pub fn as_selection(&self) -> Option<&Selection> {
        match &self.kind {
            OpKind::Selection(selection) => Some(selection),
            _ => None,
        }
    }

    /// Inverse of a text edit; every other variant is returned unchanged so
    /// callers can invert a whole log without inspecting it first.
    pub fn inverse(&self) -> Self {
        match &self.kind {
            OpKind::Text(edit) => Self::new(self.ts, OpKind::Text(edit.inverse())),
            _ => self.clone(),
        }
    }

    /// Timestamp `now` (wall-clock ms) corresponds to, for variants anchored
    /// to a wall-clock `time`.
    pub fn relative_ts(&self, now: u64) -> Option<Timestamp> {
        let time = match &self.kind {
            OpKind::Nop { time } | OpKind::Assert { time } => *time,
            OpKind::RecordStart(start) => start.time,
            _ => return None,
        };
        Some(self.ts + now.saturating_sub(time))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case(2, 1, "", "")]
    #[case(0, 2, "", "a")]
    #[case(1, 1, "x", "y")]
    fn invalid_text_edits_are_rejected(
        #[case] from: usize,
        #[case] to: usize,
        #[case] inserted: &str,
        #[case] removed: &str,
    ) {
        assert!(TextEdit::new(from, to, inserted, removed).is_err());
    }

    #[test]
    fn removed_length_counts_characters() {
        let edit = TextEdit::new(0, 2, "", "호엉").unwrap();
        assert_eq!(edit.removed_len(), 2);
        assert_eq!(edit.before_to_pos(), 2);
    }

    #[test]
    fn inverse_swaps_texts_and_adjusts_end() {
        let edit = TextEdit::new(1, 3, "xyz", "ab").unwrap();
        let inverse = edit.inverse();

        assert_eq!(inverse, TextEdit::new(1, 4, "ab", "xyz").unwrap());
        assert_eq!(inverse.inverse(), edit);
    }

    #[test]
    fn shifted_keeps_the_removed_length() {
        let edit = TextEdit::new(4, 6, "q", "ab").unwrap();
        assert_eq!(edit.shifted(-3), TextEdit::new(1, 3, "q", "ab").unwrap());
        assert_eq!(edit.shifted(-10), TextEdit::new(0, 2, "q", "ab").unwrap());
    }

    #[test]
    fn inverse_of_non_text_is_identity() {
        let selection = Operation::selection(5, 3, 1);
        assert_eq!(selection.inverse(), selection);

        let end = Operation::record_end(9);
        assert_eq!(end.inverse(), end);
    }

    #[test]
    fn run_output_requires_exit_code() {
        assert_eq!(
            Run::new(None, Some("boom".into())),
            Err(OpError::OutputWithoutExitCode)
        );
        assert!(Run::running().is_running());
        assert_eq!(Run::new(Some(0), None).unwrap().exit_code(), Some(0));
    }

    #[test]
    fn relative_ts_uses_wall_clock_anchor() {
        let start = Operation::record_start(100, 0, 5_000, 0);
        assert_eq!(start.relative_ts(5_250), Some(350));
        assert_eq!(Operation::record_end(1).relative_ts(5_000), None);
    }

    #[test]
    fn text_operation_json_shape() {
        let op = Operation::text(12, 1, 2, "x", "y").unwrap();
        let json = serde_json::to_value(&op).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "ts": 12,
                "command": "text",
                "fromPos": 1,
                "toPos": 2,
                "insertedText": "x",
                "removedText": "y",
            })
        );
        assert_eq!(serde_json::from_value::<Operation>(json).unwrap(), op);
    }

    #[test]
    fn deserializing_invalid_text_fails() {
        let raw = r#"{"ts":0,"command":"text","fromPos":0,"toPos":3,"insertedText":"","removedText":"a"}"#;
        assert!(serde_json::from_str::<Operation>(raw).is_err());
    }

    #[test]
    fn deserializes_opaque_variants() {
        let raw = r#"[
            {"ts":0,"command":"record_start","soundChunkIdx":2,"time":10,"soundOffset":0},
            {"ts":1,"command":"exPlaceholder","exId":4},
            {"ts":2,"command":"run","exitCode":1,"output":"err"},
            {"ts":3,"command":"record_end"}
        ]"#;
        let ops: Vec<Operation> = serde_json::from_str(raw).unwrap();

        let tags: Vec<OpTag> = ops.iter().map(Operation::tag).collect();
        assert_eq!(
            tags,
            vec![OpTag::RecordStart, OpTag::Exercise, OpTag::Run, OpTag::RecordEnd]
        );
        assert_eq!(ops[1].kind, OpKind::Exercise { ex_id: 4 });
    }
}
