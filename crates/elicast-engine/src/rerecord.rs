//! Re-recording a past stretch of a session.
//!
//! A [`PastRecording`] collects the operations recorded over a selected time
//! window. Finishing it yields a [`Rerecording`], which owns the splice retry
//! loop: every attempt replays the whole replacement with the resolve choices
//! gathered so far, until it either succeeds or the author gives up.

use std::ops::Range;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::history::last_op_of_kind;
use crate::op::{OpKind, OpTag, Operation, Timestamp};
use crate::splice::{Conflict, SpliceError, SpliceOutcome, replace_part_of_history};
use crate::text::build_text;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RerecordError {
    #[error("selection ends at {to_ts} before it starts at {from_ts}")]
    InvertedSelection { from_ts: Timestamp, to_ts: Timestamp },

    #[error("recording ends at {end_ts} before it starts at {start_ts}")]
    EndsBeforeStart { start_ts: Timestamp, end_ts: Timestamp },

    #[error("no recording starts at or before ts {ts}")]
    NoRecordingBefore { ts: Timestamp },

    #[error(transparent)]
    Splice(#[from] SpliceError),
}

/// Time window of the log picked for re-recording, both ends inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistorySelection {
    pub from_ts: Timestamp,
    pub to_ts: Timestamp,
}

impl HistorySelection {
    pub fn new(from_ts: Timestamp, to_ts: Timestamp) -> Result<Self, RerecordError> {
        if to_ts < from_ts {
            return Err(RerecordError::InvertedSelection { from_ts, to_ts });
        }
        Ok(Self { from_ts, to_ts })
    }

    pub fn interval(&self) -> Timestamp {
        self.to_ts.saturating_sub(self.from_ts)
    }
}

/// Indices of `log` covered by `selection`.
pub fn replace_range(log: &[Operation], selection: &HistorySelection) -> Range<usize> {
    let start = log
        .iter()
        .position(|op| op.ts >= selection.from_ts)
        .unwrap_or(0);
    let end = log
        .iter()
        .position(|op| op.ts > selection.to_ts)
        .unwrap_or(log.len());
    start..end.max(start)
}

/// Operations recorded over a past selection, not yet spliced in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PastRecording {
    selection: HistorySelection,
    ops: Vec<Operation>,
}

impl PastRecording {
    /// Open the recording: the earlier audio stops just before the selection
    /// and audio chunk `sound_chunk_idx` takes over at its start.
    pub fn start(selection: HistorySelection, sound_chunk_idx: u32, time: u64) -> Self {
        let ops = vec![
            Operation::record_end(selection.from_ts.saturating_sub(1)),
            Operation::record_start(selection.from_ts, sound_chunk_idx, time, 0),
        ];
        Self { selection, ops }
    }

    pub fn selection(&self) -> &HistorySelection {
        &self.selection
    }

    pub fn recorded(&self) -> &[Operation] {
        &self.ops
    }

    pub fn record(&mut self, op: Operation) {
        self.ops.push(op);
    }

    /// Close the recording at `end_ts` and resume the audio that was playing
    /// before the selection, skipping the replaced stretch of it.
    pub fn finish(mut self, log: Vec<Operation>, end_ts: Timestamp, now: u64) -> Result<Rerecording, RerecordError> {
        let start_ts = self.selection.from_ts;
        if end_ts < start_ts {
            return Err(RerecordError::EndsBeforeStart { start_ts, end_ts });
        }
        let replaced_interval = self.selection.interval();

        let resumed = last_op_of_kind(&log, OpTag::RecordStart, start_ts)
            .and_then(|op| match &op.kind {
                OpKind::RecordStart(start) => Some((op.ts, *start)),
                _ => None,
            })
            .ok_or(RerecordError::NoRecordingBefore { ts: start_ts })?;
        let (resumed_ts, resumed) = resumed;
        let sound_offset = (start_ts - resumed_ts) + resumed.sound_offset + replaced_interval;

        self.ops.push(Operation::record_end(end_ts));
        self.ops.push(Operation::record_start(
            end_ts + 1,
            resumed.sound_chunk_idx,
            now,
            sound_offset,
        ));

        let range = replace_range(&log, &self.selection);
        log::debug!(
            "Re-recorded {} operations over ts {}..={} replacing log[{}..{}]",
            self.ops.len(),
            self.selection.from_ts,
            self.selection.to_ts,
            range.start,
            range.end
        );

        Ok(Rerecording {
            log,
            range,
            recorded: self.ops,
            choices: Vec::new(),
            end_ts,
            inserted_interval: end_ts - start_ts,
            replaced_interval,
        })
    }
}

/// What the author decided about one conflict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Choose(Operation),
    /// Take back the last choice, or give up if there is none.
    Undo,
    Cancel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Completed(Vec<Operation>),
    /// The document as it stood when the recording ended.
    Cancelled(String),
}

/// A finished past recording waiting to be spliced into its log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rerecording {
    log: Vec<Operation>,
    range: Range<usize>,
    recorded: Vec<Operation>,
    choices: Vec<Operation>,
    end_ts: Timestamp,
    inserted_interval: Timestamp,
    replaced_interval: Timestamp,
}

impl Rerecording {
    pub fn log(&self) -> &[Operation] {
        &self.log
    }

    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    pub fn recorded(&self) -> &[Operation] {
        &self.recorded
    }

    pub fn choices(&self) -> &[Operation] {
        &self.choices
    }

    pub fn attempt(&self) -> Result<SpliceOutcome, RerecordError> {
        Ok(replace_part_of_history(
            &self.log,
            self.range.start,
            self.range.len(),
            &self.recorded,
            &self.choices,
        )?)
    }

    pub fn resolve(&mut self, choice: Operation) {
        log::debug!("Resolve choice #{}: {choice:?}", self.choices.len() + 1);
        self.choices.push(choice);
    }

    pub fn undo_choice(&mut self) -> Option<Operation> {
        let undone = self.choices.pop();
        if undone.is_some() {
            log::debug!("Undid resolve choice #{}", self.choices.len() + 1);
        }
        undone
    }

    /// Move everything after the recorded block by the difference between
    /// the recorded and the replaced durations.
    pub fn complete(self, mut ops: Vec<Operation>) -> Vec<Operation> {
        let delta = self.inserted_interval as i64 - self.replaced_interval as i64;
        let tail = self.range.start + self.recorded.len();
        for op in ops.iter_mut().skip(tail) {
            op.ts = op.ts.saturating_add_signed(delta);
        }

        log::info!(
            "Re-recording spliced with {} resolve choices, later operations moved by {delta}ms",
            self.choices.len()
        );
        ops
    }

    /// Give up, returning the document as it was when the recording ended.
    pub fn cancel(self) -> String {
        let executed = self
            .log
            .iter()
            .rposition(|op| op.ts <= self.end_ts)
            .map_or(0, |idx| idx + 1);

        log::info!("Re-recording cancelled after {} resolve choices", self.choices.len());
        build_text(&self.log[..executed])
    }

    /// Drive the retry loop, asking `decide` about every conflict.
    pub fn resolve_with<F>(mut self, mut decide: F) -> Result<Resolution, RerecordError>
    where
        F: FnMut(&Conflict, &[Operation]) -> Decision,
    {
        loop {
            let conflict = match self.attempt()? {
                SpliceOutcome::Success { ops } => return Ok(Resolution::Completed(self.complete(ops))),
                SpliceOutcome::Conflict(conflict) => conflict,
            };

            match decide(&conflict, &self.choices) {
                Decision::Choose(choice) => self.resolve(choice),
                Decision::Undo => {
                    if self.undo_choice().is_none() {
                        return Ok(Resolution::Cancelled(self.cancel()));
                    }
                }
                Decision::Cancel => return Ok(Resolution::Cancelled(self.cancel())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn ins(ts: Timestamp, at: usize, text: &str) -> Operation {
        Operation::insert(ts, at, text)
    }

    fn session() -> Vec<Operation> {
        vec![
            Operation::record_start(0, 0, 1_000, 0),
            ins(100, 0, "a"),
            ins(200, 1, "b"),
            ins(300, 2, "c"),
            Operation::record_end(400),
        ]
    }

    fn rerecording() -> Rerecording {
        let selection = HistorySelection::new(150, 250).unwrap();
        let mut recording = PastRecording::start(selection, 1, 5_000);
        recording.record(ins(160, 1, "B"));
        recording.finish(session(), 180, 6_000).unwrap()
    }

    #[rstest]
    #[case(150, 250, 2..3)]
    #[case(0, 1_000, 0..5)]
    #[case(500, 600, 0..5)]
    #[case(100, 100, 1..2)]
    #[case(110, 120, 2..2)]
    fn replace_range_covers_selected_operations(
        #[case] from_ts: Timestamp,
        #[case] to_ts: Timestamp,
        #[case] expected: Range<usize>,
    ) {
        let selection = HistorySelection::new(from_ts, to_ts).unwrap();
        assert_eq!(replace_range(&session(), &selection), expected);
    }

    #[test]
    fn inverted_selection_is_rejected() {
        assert_eq!(
            HistorySelection::new(5, 4),
            Err(RerecordError::InvertedSelection { from_ts: 5, to_ts: 4 })
        );
    }

    #[test]
    fn finish_resumes_the_earlier_audio() {
        let rerecording = rerecording();
        assert_eq!(
            rerecording.recorded(),
            &[
                Operation::record_end(149),
                Operation::record_start(150, 1, 5_000, 0),
                ins(160, 1, "B"),
                Operation::record_end(180),
                Operation::record_start(181, 0, 6_000, 250),
            ]
        );
        assert_eq!(rerecording.range(), 2..3);
    }

    #[test]
    fn finish_needs_an_earlier_recording() {
        let selection = HistorySelection::new(150, 250).unwrap();
        let result = PastRecording::start(selection, 1, 0).finish(vec![ins(100, 0, "a")], 180, 0);
        assert_eq!(result, Err(RerecordError::NoRecordingBefore { ts: 150 }));
    }

    #[test]
    fn retry_loop_applies_choices_and_moves_the_tail() {
        let mut asked = 0;
        let resolution = rerecording()
            .resolve_with(|conflict, choices| {
                asked += 1;
                assert!(choices.is_empty());
                assert_eq!(conflict.current_text(), "aB");
                Decision::Choose(ins(300, 2, "c"))
            })
            .unwrap();

        let ops = match resolution {
            Resolution::Completed(ops) => ops,
            other => panic!("expected completion, got {other:?}"),
        };
        assert_eq!(asked, 1);
        assert_eq!(build_text(&ops), "aBc");
        assert_eq!(
            ops.iter().map(|op| op.ts).collect::<Vec<_>>(),
            vec![0, 100, 149, 150, 160, 180, 181, 230, 330]
        );
    }

    #[test]
    fn undo_without_choices_cancels() {
        let resolution = rerecording().resolve_with(|_, _| Decision::Undo).unwrap();
        assert_eq!(resolution, Resolution::Cancelled("a".into()));
    }

    #[test]
    fn undo_takes_back_the_last_choice() {
        let mut rerecording = rerecording();
        rerecording.resolve(ins(300, 1, "c"));
        assert!(rerecording.attempt().unwrap().is_success());

        assert_eq!(rerecording.undo_choice(), Some(ins(300, 1, "c")));
        assert!(rerecording.attempt().unwrap().conflict().is_some());
        assert_eq!(rerecording.undo_choice(), None);
    }
}
