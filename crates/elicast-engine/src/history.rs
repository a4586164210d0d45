//! Read-only queries over a recorded log.

use serde::Serialize;

use crate::op::{OpKind, OpTag, Operation, Timestamp};

/// Last operation tagged `tag` whose timestamp is at most `ts`.
pub fn last_op_of_kind(ops: &[Operation], tag: OpTag, ts: Timestamp) -> Option<&Operation> {
    ops.iter().rev().find(|op| op.ts <= ts && op.tag() == tag)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    Exercise,
    Assert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub from_ts: Timestamp,
    pub to_ts: Timestamp,
    pub kind: SegmentKind,
}

/// Time spans of exercise and assert blocks.
///
/// A marker opens a block when none is open and closes whichever block is
/// open otherwise. The opening marker belongs to its segment, the closing
/// one does not.
pub fn segments(ops: &[Operation]) -> Vec<Segment> {
    let mut open: Option<SegmentKind> = None;
    let mut spans: Vec<(Timestamp, Timestamp, Option<SegmentKind>)> = Vec::new();

    for op in ops {
        let marker = match op.kind {
            OpKind::Exercise { .. } => Some(SegmentKind::Exercise),
            OpKind::Assert { .. } => Some(SegmentKind::Assert),
            _ => None,
        };
        if marker.is_some() {
            open = if open.is_none() { marker } else { None };
        }

        match spans.last_mut() {
            Some((_, to_ts, kind)) if *kind == open => *to_ts = op.ts,
            _ => spans.push((op.ts, op.ts, open)),
        }
    }

    spans
        .into_iter()
        .filter_map(|(from_ts, to_ts, kind)| kind.map(|kind| Segment { from_ts, to_ts, kind }))
        .collect()
}

/// One character ever typed into the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryChar {
    pub ch: char,
    pub inserted_ts: Timestamp,
    pub removed_ts: Option<Timestamp>,
}

impl HistoryChar {
    pub fn is_tombstone(&self) -> bool {
        self.removed_ts.is_some()
    }
}

/// Every character the text edits of `ops` inserted, in document order,
/// with removed characters kept as tombstones.
pub fn tombstones(ops: &[Operation]) -> Vec<HistoryChar> {
    let mut doc: Vec<HistoryChar> = Vec::new();

    for (ts, edit) in ops.iter().filter_map(|op| op.as_text().map(|edit| (op.ts, edit))) {
        let mut i = 0;
        let mut pos = 0;

        while pos < edit.from_pos() && i < doc.len() {
            if !doc[i].is_tombstone() {
                pos += 1;
            }
            i += 1;
        }
        while pos < edit.to_pos() && i < doc.len() {
            if !doc[i].is_tombstone() {
                doc[i].removed_ts = Some(ts);
                pos += 1;
            }
            i += 1;
        }

        let inserted = edit.inserted_text().chars().map(|ch| HistoryChar {
            ch,
            inserted_ts: ts,
            removed_ts: None,
        });
        doc.splice(i..i, inserted);
    }

    doc
}

/// The live characters of a tombstone history.
pub fn visible_text(chars: &[HistoryChar]) -> String {
    chars.iter().filter(|c| !c.is_tombstone()).map(|c| c.ch).collect()
}
