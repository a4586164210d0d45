//! # Splice Engine
//!
//! Inserting a batch of operations into the middle of a log invalidates the
//! positions of everything recorded after it. [`insert_ops`] replays that
//! tail against the new document: positions the batch left untouched are
//! shifted automatically, and positions that fell into a region the batch
//! rewrote are taken from a list of caller-supplied resolve choices.
//!
//! When the choices run out the splice stops at the first unresolved
//! operation and returns [`SpliceOutcome::Conflict`]. The caller asks a human
//! for a concrete operation, appends it to the choices and calls again from
//! scratch. Every call is a pure function of its arguments, so retries
//! reproduce earlier remaps exactly and never touch the caller's log.

use serde::Serialize;
use thiserror::Error;

use crate::ambiguous::{AmbiguousAreaSetCouple, PosRange};
use crate::area::AreaError;
use crate::op::{OpError, OpKind, OpTag, Operation, Selection, TextEdit, Timestamp};
use crate::text::{build_text, slice_chars, splice_chars};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpliceError {
    #[error("index {index} is out of range for a log of {len} operations")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("a {found} operation cannot resolve a {expected} conflict")]
    ChoiceMismatch { expected: OpTag, found: OpTag },

    #[error(transparent)]
    Area(#[from] AreaError),

    #[error(transparent)]
    Op(#[from] OpError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "camelCase")]
pub enum SpliceOutcome {
    Success { ops: Vec<Operation> },
    Conflict(Conflict),
}

impl SpliceOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SpliceOutcome::Success { .. })
    }

    pub fn ops(&self) -> Option<&[Operation]> {
        match self {
            SpliceOutcome::Success { ops } => Some(ops),
            SpliceOutcome::Conflict(_) => None,
        }
    }

    pub fn conflict(&self) -> Option<&Conflict> {
        match self {
            SpliceOutcome::Success { .. } => None,
            SpliceOutcome::Conflict(conflict) => Some(conflict),
        }
    }
}

/// Everything a caller needs to ask for one more resolve choice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    /// The original log up to and including the conflicting operation.
    pub resolved_prefix_original: Vec<Operation>,
    /// The reconciled log up to, not including, the conflicting operation.
    pub resolved_prefix_new: Vec<Operation>,
    pub conflicting: ConflictingOp,
    pub from_pos_range: PosRange,
    pub to_pos_range: PosRange,
}

impl Conflict {
    /// Document the resolve choice will be applied to.
    pub fn current_text(&self) -> String {
        build_text(&self.resolved_prefix_new)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "command", rename_all = "lowercase")]
pub enum ConflictingOp {
    Selection {
        ts: Timestamp,
    },
    Text {
        ts: Timestamp,
        #[serde(rename = "insertedText")]
        inserted_text: String,
    },
}

impl ConflictingOp {
    pub fn ts(&self) -> Timestamp {
        match self {
            ConflictingOp::Selection { ts } | ConflictingOp::Text { ts, .. } => *ts,
        }
    }

    pub fn tag(&self) -> OpTag {
        match self {
            ConflictingOp::Selection { .. } => OpTag::Selection,
            ConflictingOp::Text { .. } => OpTag::Text,
        }
    }
}

/// Insert `insert` into `log` at `idx` and reconcile every later operation.
///
/// `choices` are consumed in order, one per ambiguous operation. Surplus
/// choices are ignored.
pub fn insert_ops(
    log: &[Operation],
    idx: usize,
    insert: &[Operation],
    choices: &[Operation],
) -> Result<SpliceOutcome, SpliceError> {
    if idx > log.len() {
        return Err(SpliceError::IndexOutOfRange {
            index: idx,
            len: log.len(),
        });
    }

    log::debug!(
        "Splicing {} operations at {idx} into a log of {} with {} resolve choices",
        insert.len(),
        log.len(),
        choices.len()
    );

    let mut ops = Vec::with_capacity(log.len() + insert.len());
    ops.extend_from_slice(&log[..idx]);
    ops.extend_from_slice(insert);
    ops.extend_from_slice(&log[idx..]);

    let batch: Vec<TextEdit> = insert.iter().filter_map(Operation::as_text).cloned().collect();
    let mut couple = AmbiguousAreaSetCouple::new(&batch)?;

    let tail_start = idx + insert.len();
    let mut current_text = build_text(&ops[..tail_start]);
    let mut choices = choices.iter();

    for i in tail_start..ops.len() {
        let original = ops[i].clone();

        let (from_pos, to_pos) = match &original.kind {
            OpKind::Selection(selection) => (selection.from_pos, selection.to_pos),
            OpKind::Text(edit) => (edit.from_pos(), edit.to_pos()),
            _ => continue,
        };
        let (from_range, to_range) = couple.possible_resolve_range(from_pos, to_pos);

        let resolved = if from_range.is_point() && to_range.is_point() {
            log::trace!(
                "Remapped {} at ts {} from [{from_pos}, {to_pos}) to [{}, {})",
                original.tag(),
                original.ts,
                from_range.from,
                to_range.from
            );
            match &original.kind {
                OpKind::Text(edit) => {
                    let removed = slice_chars(&current_text, from_range.from, to_range.from);
                    let remapped = TextEdit::new(from_range.from, to_range.from, edit.inserted_text(), removed)?;
                    Operation::new(original.ts, OpKind::Text(remapped))
                }
                _ => Operation::new(
                    original.ts,
                    OpKind::Selection(Selection::new(from_range.from, to_range.from)),
                ),
            }
        } else {
            let Some(choice) = choices.next() else {
                let conflicting = match &original.kind {
                    OpKind::Text(edit) => ConflictingOp::Text {
                        ts: original.ts,
                        inserted_text: edit.inserted_text().to_string(),
                    },
                    _ => ConflictingOp::Selection { ts: original.ts },
                };
                log::debug!(
                    "Conflict on {} at ts {}: from {from_range:?}, to {to_range:?}",
                    conflicting.tag(),
                    conflicting.ts()
                );
                return Ok(SpliceOutcome::Conflict(Conflict {
                    resolved_prefix_original: log[..i - insert.len() + 1].to_vec(),
                    resolved_prefix_new: ops[..i].to_vec(),
                    conflicting,
                    from_pos_range: from_range,
                    to_pos_range: to_range,
                }));
            };

            if choice.tag() != original.tag() {
                return Err(SpliceError::ChoiceMismatch {
                    expected: original.tag(),
                    found: choice.tag(),
                });
            }
            choice.clone()
        };

        if let (Some(original_edit), Some(resolved_edit)) = (original.as_text(), resolved.as_text()) {
            couple.insert(original_edit, resolved_edit)?;
            current_text = splice_chars(
                &current_text,
                resolved_edit.from_pos(),
                resolved_edit.before_to_pos(),
                resolved_edit.inserted_text(),
            );
        }

        ops[i] = resolved;
    }

    Ok(SpliceOutcome::Success { ops })
}

/// Replace `log[idx..idx + count]` with `insert`, reconciling the tail.
///
/// The replaced edits are undone by their inverses and the undo is spliced
/// together with `insert` as one batch, then the undo and the replaced
/// operations are dropped from the result.
pub fn replace_part_of_history(
    log: &[Operation],
    idx: usize,
    count: usize,
    insert: &[Operation],
    choices: &[Operation],
) -> Result<SpliceOutcome, SpliceError> {
    let end = idx + count;
    if end > log.len() {
        return Err(SpliceError::IndexOutOfRange {
            index: end,
            len: log.len(),
        });
    }

    let mut batch: Vec<Operation> = log[idx..end]
        .iter()
        .rev()
        .filter(|op| op.as_text().is_some())
        .map(Operation::inverse)
        .collect();
    let undo_len = batch.len();
    batch.extend_from_slice(insert);

    let strip = |ops: &mut Vec<Operation>| {
        let to = (idx + undo_len + count).min(ops.len());
        ops.drain(idx.min(to)..to);
    };

    let mut outcome = insert_ops(log, end, &batch, choices)?;
    match &mut outcome {
        SpliceOutcome::Success { ops } => strip(ops),
        SpliceOutcome::Conflict(conflict) => strip(&mut conflict.resolved_prefix_new),
    }
    Ok(outcome)
}
