//! Which parts of the document were authored as plain text, as an exercise or
//! as an assertion.
//!
//! Edits between two exercise markers form one exercise block and must build
//! a single contiguous region. Edits between two assert markers may build any
//! number of assertion regions.

use std::ops::Range;

use serde::Serialize;
use thiserror::Error;

use crate::area::{Area, AreaError, AreaSet, AreaType};
use crate::op::{OpKind, Operation, Selection, TextEdit, Timestamp};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegionError {
    #[error(transparent)]
    Area(#[from] AreaError),

    #[error("exercise opened at ts {ts} builds {count} separate regions instead of one")]
    FragmentedExercise { ts: Timestamp, count: usize },

    #[error("block [{start}, {start}+{amount}) is out of range for a log of {len} operations")]
    BlockOutOfRange { start: usize, amount: usize, len: usize },

    #[error("block starting at {start} builds no region to replace")]
    EmptyBlock { start: usize },

    #[error("recorded exercise must build one exercise region, found {count} regions")]
    InvalidExerciseArea { count: usize },

    #[error("solution must build one region, found {count}")]
    InvalidSolveArea { count: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionKind {
    Text,
    Exercise,
    ExerciseBuild,
    Assert,
    AssertBuild,
}

impl AreaType for RegionKind {
    fn mergeable(self) -> bool {
        !matches!(self, RegionKind::Exercise | RegionKind::Assert)
    }

    fn remove_on_empty(self) -> bool {
        !matches!(self, RegionKind::Exercise | RegionKind::Assert)
    }
}

/// Regions of the document produced by replaying `ops`.
pub fn authored_regions(ops: &[Operation]) -> Result<Vec<Area<RegionKind>>, RegionError> {
    Ok(build_regions(ops, RegionKind::Text)?.into_areas())
}

/// Whether an edit of `[from_pos, to_pos)` stays clear of every exercise.
pub fn is_change_allowed(ops: &[Operation], from_pos: usize, to_pos: usize) -> Result<bool, RegionError> {
    let regions = authored_regions(ops)?;
    Ok(!regions.iter().any(|region| {
        region.kind() == RegionKind::Exercise && !(to_pos <= region.from_pos() || region.to_pos() <= from_pos)
    }))
}

/// Whether an edit of `[from_pos, to_pos]` may be recorded into the exercise
/// built by `exercise_ops`, which start with the opening exercise marker.
///
/// Before the first edit only insertions are accepted. Afterwards the edit has
/// to stay inside the exercise region.
pub fn is_change_allowed_for_exercise(
    exercise_ops: &[Operation],
    from_pos: usize,
    to_pos: usize,
) -> Result<bool, RegionError> {
    let initiated = exercise_ops.iter().any(|op| op.as_text().is_some());
    if !initiated && from_pos != to_pos {
        return Ok(false);
    }

    match authored_regions(exercise_ops)?.as_slice() {
        [] => Ok(true),
        [area] if area.kind() == RegionKind::Exercise => {
            Ok(area.from_pos() <= from_pos && to_pos <= area.to_pos())
        }
        areas => Err(RegionError::InvalidExerciseArea { count: areas.len() }),
    }
}

/// Range a learner solving an exercise may edit.
///
/// Until the learner types anything this is the footprint of the exercise's
/// first edit; afterwards it is the single region the solution built.
pub fn allowed_range_for_solve(first_exercise_edit: &TextEdit, solve_ops: &[Operation]) -> Result<Range<usize>, RegionError> {
    if !solve_ops.iter().any(|op| op.as_text().is_some()) {
        return Ok(first_exercise_edit.from_pos()..first_exercise_edit.to_pos());
    }

    match build_regions(solve_ops, RegionKind::ExerciseBuild)?.areas() {
        [area] => Ok(area.from_pos()..area.to_pos()),
        areas => Err(RegionError::InvalidSolveArea { count: areas.len() }),
    }
}

/// Clamp both ends of a change into `allowed`.
pub fn confine_change(allowed: &Range<usize>, from_pos: usize, to_pos: usize) -> (usize, usize) {
    let clamp = |pos: usize| pos.clamp(allowed.start, allowed.end.max(allowed.start));
    (clamp(from_pos), clamp(to_pos))
}

/// Replace `ops[start..start + amount]`, a block building one region, with
/// `new_ops`, and move later edits and selections by the change in that
/// region's length.
///
/// An empty replacement is treated as an empty region where the old one
/// started.
pub fn replace_partial_ops(
    ops: &[Operation],
    start: usize,
    amount: usize,
    new_ops: &[Operation],
) -> Result<Vec<Operation>, RegionError> {
    let end = start + amount;
    if end > ops.len() {
        return Err(RegionError::BlockOutOfRange {
            start,
            amount,
            len: ops.len(),
        });
    }

    let old_area = authored_regions(&ops[start..end])?
        .pop()
        .ok_or(RegionError::EmptyBlock { start })?;
    let new_area = authored_regions(new_ops)?.pop();

    let (mut old_from, mut old_to) = (old_area.from_pos(), old_area.to_pos());
    let (mut new_from, mut new_to) = new_area.map_or((old_from, old_from), |area| (area.from_pos(), area.to_pos()));
    let delta = (new_to - new_from) as isize - (old_to - old_from) as isize;

    log::debug!(
        "Replacing block [{start}, {end}) of region [{old_from}, {old_to}) with {} operations, later positions move by {delta}",
        new_ops.len()
    );

    let mut result = Vec::with_capacity(ops.len() - amount + new_ops.len());
    result.extend_from_slice(&ops[..start]);
    result.extend_from_slice(new_ops);

    for op in &ops[end..] {
        let kind = match &op.kind {
            OpKind::Text(edit) if edit.from_pos() >= old_to => OpKind::Text(edit.shifted(delta)),
            OpKind::Text(edit) => {
                // An edit before the region moves the region instead.
                let shift = edit.inserted_len() as isize - edit.removed_len() as isize;
                old_from = old_from.saturating_add_signed(shift);
                old_to = old_to.saturating_add_signed(shift);
                new_from = new_from.saturating_add_signed(shift);
                new_to = new_to.saturating_add_signed(shift);
                op.kind.clone()
            }
            OpKind::Selection(selection) => {
                let Selection { mut from_pos, mut to_pos } = *selection;
                if old_to <= from_pos {
                    from_pos = from_pos.saturating_add_signed(delta);
                    to_pos = to_pos.saturating_add_signed(delta);
                } else if from_pos <= old_from && old_to <= to_pos {
                    to_pos = to_pos.saturating_add_signed(delta);
                } else if old_from <= from_pos && from_pos < old_to && old_from < to_pos {
                    from_pos = new_to;
                } else if old_from < to_pos && to_pos <= old_to {
                    to_pos = new_from;
                }
                OpKind::Selection(Selection::new(from_pos, to_pos))
            }
            other => other.clone(),
        };
        result.push(Operation::new(op.ts, kind));
    }

    Ok(result)
}

fn build_regions(ops: &[Operation], kind: RegionKind) -> Result<AreaSet<RegionKind>, RegionError> {
    let mut set = AreaSet::new();

    let mut i = 0;
    while i < ops.len() {
        match &ops[i].kind {
            OpKind::Text(edit) => {
                if edit.removed_len() > 0 {
                    set.remove(kind, edit.from_pos(), edit.before_to_pos())?;
                }
                if edit.inserted_len() > 0 {
                    set.insert(kind, edit.from_pos(), edit.after_to_pos(), true)?;
                }
            }
            OpKind::Exercise { .. } => {
                let end = block_end(ops, i, |kind| matches!(kind, OpKind::Exercise { .. }));
                let built = build_regions(&ops[i + 1..end], RegionKind::ExerciseBuild)?;

                match built.areas() {
                    [] => {}
                    [area] => {
                        set.insert(RegionKind::Exercise, area.from_pos(), area.to_pos(), false)?;
                    }
                    areas => {
                        return Err(RegionError::FragmentedExercise {
                            ts: ops[i].ts,
                            count: areas.len(),
                        });
                    }
                }
                i = end;
            }
            OpKind::Assert { .. } => {
                let end = block_end(ops, i, |kind| matches!(kind, OpKind::Assert { .. }));
                let built = build_regions(&ops[i + 1..end], RegionKind::AssertBuild)?;
                for area in built.iter() {
                    set.insert(RegionKind::Assert, area.from_pos(), area.to_pos(), false)?;
                }
                i = end;
            }
            _ => {}
        }
        i += 1;
    }

    Ok(set)
}

/// Index of the marker closing the block opened at `start`, or the log length.
fn block_end(ops: &[Operation], start: usize, is_marker: impl Fn(&OpKind) -> bool) -> usize {
    ops.iter()
        .skip(start + 1)
        .position(|op| is_marker(&op.kind))
        .map(|offset| start + 1 + offset)
        .unwrap_or(ops.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn ins(ts: Timestamp, at: usize, text: &str) -> Operation {
        Operation::insert(ts, at, text)
    }

    fn exercise(ts: Timestamp) -> Operation {
        Operation::new(ts, OpKind::Exercise { ex_id: 0 })
    }

    fn assert_marker(ts: Timestamp) -> Operation {
        Operation::new(ts, OpKind::Assert { time: 0 })
    }

    fn spans(ops: &[Operation]) -> Vec<(RegionKind, usize, usize)> {
        authored_regions(ops)
            .unwrap()
            .iter()
            .map(|a| (a.kind(), a.from_pos(), a.to_pos()))
            .collect()
    }

    fn with_exercise() -> Vec<Operation> {
        vec![
            ins(0, 0, "ab"),
            exercise(1),
            ins(2, 2, "xy"),
            exercise(3),
            ins(4, 0, "c"),
        ]
    }

    #[test]
    fn typing_builds_one_text_region() {
        let ops = vec![
            ins(0, 0, "ab"),
            ins(1, 1, "x"),
            Operation::text(2, 0, 1, "", "a").unwrap(),
        ];
        assert_eq!(spans(&ops), vec![(RegionKind::Text, 0, 2)]);
    }

    #[test]
    fn deleting_everything_leaves_nothing() {
        let ops = vec![ins(0, 0, "ab"), Operation::text(1, 0, 2, "", "ab").unwrap()];
        assert_eq!(spans(&ops), vec![]);
    }

    #[test]
    fn exercise_block_becomes_one_region() {
        assert_eq!(
            spans(&with_exercise()),
            vec![(RegionKind::Text, 0, 3), (RegionKind::Exercise, 3, 5)]
        );
    }

    #[test]
    fn assert_block_keeps_every_region() {
        let ops = vec![
            ins(0, 0, "ab"),
            assert_marker(1),
            ins(2, 2, "x"),
            ins(3, 0, "y"),
            assert_marker(4),
        ];
        assert_eq!(
            spans(&ops),
            vec![
                (RegionKind::Assert, 0, 1),
                (RegionKind::Text, 1, 3),
                (RegionKind::Assert, 3, 4)
            ]
        );
    }

    #[test]
    fn fragmented_exercise_is_rejected() {
        let ops = vec![
            ins(0, 0, "abc"),
            exercise(1),
            ins(2, 0, "x"),
            ins(3, 3, "y"),
            exercise(4),
        ];
        assert_eq!(
            authored_regions(&ops),
            Err(RegionError::FragmentedExercise { ts: 1, count: 2 })
        );
    }

    #[test]
    fn removing_across_an_exercise_is_a_shape_error() {
        let mut ops = with_exercise();
        ops.push(Operation::text(5, 2, 4, "", "ab").unwrap());
        assert!(matches!(authored_regions(&ops), Err(RegionError::Area(_))));
    }

    /// `"ab"` then an exercise typing `"xyz"` at 1, giving `"axyzb"` with the
    /// exercise at `[1, 4)`.
    fn recorded_exercise() -> Vec<Operation> {
        vec![ins(0, 0, "ab"), exercise(1), ins(2, 1, "xyz"), exercise(3)]
    }

    fn sel(ts: Timestamp, from: usize, to: usize) -> Operation {
        Operation::selection(ts, from, to)
    }

    #[rstest]
    #[case::text_after(vec![ins(5, 5, "!")], vec![ins(5, 3, "!")])]
    #[case::text_before(vec![ins(5, 0, "__")], vec![ins(5, 0, "__")])]
    #[case::selection_after(vec![sel(5, 4, 5)], vec![sel(5, 2, 3)])]
    #[case::selection_enclosing(vec![sel(5, 0, 5)], vec![sel(5, 0, 3)])]
    #[case::selection_starting_inside(vec![sel(5, 2, 5)], vec![sel(5, 2, 5)])]
    #[case::selection_ending_inside(vec![sel(5, 0, 3)], vec![sel(5, 0, 1)])]
    #[case::selection_before(vec![sel(5, 0, 1)], vec![sel(5, 0, 1)])]
    #[case::edit_before_moves_the_region(
        vec![ins(5, 0, "__"), sel(6, 6, 7)],
        vec![ins(5, 0, "__"), sel(6, 4, 5)]
    )]
    #[case::opaque(vec![Operation::record_end(5)], vec![Operation::record_end(5)])]
    fn replacing_an_exercise_moves_later_operations(
        #[case] tail: Vec<Operation>,
        #[case] expected_tail: Vec<Operation>,
    ) {
        let mut ops = recorded_exercise();
        ops.extend(tail);
        let solution = vec![exercise(1), ins(2, 1, "q"), exercise(3)];

        let result = replace_partial_ops(&ops, 1, 3, &solution).unwrap();

        let mut expected = vec![ins(0, 0, "ab")];
        expected.extend(solution);
        expected.extend(expected_tail);
        assert_eq!(result, expected);
    }

    #[rstest]
    #[case::selection_after(sel(5, 4, 5), sel(5, 1, 2))]
    #[case::selection_starting_inside(sel(5, 2, 5), sel(5, 1, 5))]
    #[case::selection_ending_inside(sel(5, 0, 3), sel(5, 0, 1))]
    fn empty_solution_collapses_the_region(#[case] later: Operation, #[case] expected: Operation) {
        let mut ops = recorded_exercise();
        ops.push(later);
        let solution = vec![exercise(1), exercise(3)];

        let result = replace_partial_ops(&ops, 1, 3, &solution).unwrap();
        assert_eq!(result.last(), Some(&expected));
        assert_eq!(result.len(), 4);
    }

    #[test]
    fn replacing_needs_a_region_in_range() {
        let ops = recorded_exercise();
        assert_eq!(
            replace_partial_ops(&ops, 3, 2, &[]),
            Err(RegionError::BlockOutOfRange { start: 3, amount: 2, len: 4 })
        );
        assert_eq!(
            replace_partial_ops(&ops, 3, 1, &[]),
            Err(RegionError::EmptyBlock { start: 3 })
        );
    }

    #[rstest]
    #[case(3, 3, true)]
    #[case(3, 5, true)]
    #[case(4, 5, true)]
    #[case(2, 3, false)]
    #[case(5, 6, false)]
    fn recording_stays_inside_the_exercise(#[case] from: usize, #[case] to: usize, #[case] allowed: bool) {
        let exercise_ops = vec![exercise(1), ins(2, 3, "xy")];
        assert_eq!(is_change_allowed_for_exercise(&exercise_ops, from, to), Ok(allowed));
    }

    #[rstest]
    #[case(2, 2, true)]
    #[case(2, 3, false)]
    fn exercise_cannot_start_with_a_removal(#[case] from: usize, #[case] to: usize, #[case] allowed: bool) {
        assert_eq!(is_change_allowed_for_exercise(&[exercise(1)], from, to), Ok(allowed));
    }

    #[test]
    fn exercise_ops_without_marker_are_invalid() {
        assert_eq!(
            is_change_allowed_for_exercise(&[ins(0, 0, "a")], 0, 0),
            Err(RegionError::InvalidExerciseArea { count: 1 })
        );
    }

    #[test]
    fn solve_range_follows_the_solution() {
        let first = TextEdit::new(2, 3, "x", "y").unwrap();
        assert_eq!(allowed_range_for_solve(&first, &[]), Ok(2..3));

        let solve_ops = vec![ins(0, 4, "ab"), ins(1, 6, "c")];
        assert_eq!(allowed_range_for_solve(&first, &solve_ops), Ok(4..7));

        let scattered = vec![ins(0, 4, "ab"), ins(1, 0, "c")];
        assert_eq!(
            allowed_range_for_solve(&first, &scattered),
            Err(RegionError::InvalidSolveArea { count: 2 })
        );
    }

    #[rstest]
    #[case(0, 9, (2, 5))]
    #[case(3, 4, (3, 4))]
    #[case(6, 6, (5, 5))]
    fn changes_are_confined_to_the_allowed_range(
        #[case] from: usize,
        #[case] to: usize,
        #[case] expected: (usize, usize),
    ) {
        assert_eq!(confine_change(&(2..5), from, to), expected);
    }

    #[rstest]
    #[case(0, 3, true)]
    #[case(3, 3, true)]
    #[case(5, 5, true)]
    #[case(4, 4, false)]
    #[case(2, 4, false)]
    #[case(0, 5, false)]
    fn changes_inside_exercises_are_refused(#[case] from: usize, #[case] to: usize, #[case] allowed: bool) {
        assert_eq!(is_change_allowed(&with_exercise(), from, to), Ok(allowed));
    }
}
