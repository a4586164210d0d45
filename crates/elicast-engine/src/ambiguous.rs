//! Tracking which parts of a document a batch of edits made ambiguous.
//!
//! When operations are spliced into the middle of a log, every later
//! position has to be carried across the splice. Characters the batch did not
//! touch have an exact counterpart on both sides. Characters it produced or
//! destroyed do not: a position that fell inside such a region could map to
//! anywhere in the corresponding region after the splice.
//!
//! [`AmbiguousAreaSetCouple`] keeps those regions for both coordinate spaces
//! side by side and answers where an old range may land in the new document.

use serde::{Deserialize, Serialize};

use crate::area::{Area, AreaError, AreaSet, AreaType};
use crate::op::TextEdit;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AmbiguityKind {
    /// Placeholder that only exists to force a split point.
    Nop,
    Ambiguous,
}

impl AreaType for AmbiguityKind {
    fn mergeable(self) -> bool {
        true
    }

    fn remove_on_empty(self) -> bool {
        matches!(self, AmbiguityKind::Nop)
    }
}

/// Inclusive range of candidate positions. A single point when `from == to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PosRange {
    pub from: usize,
    pub to: usize,
}

impl PosRange {
    pub fn point(pos: usize) -> Self {
        Self { from: pos, to: pos }
    }

    pub fn is_point(&self) -> bool {
        self.from == self.to
    }

    pub fn contains(&self, pos: usize) -> bool {
        self.from <= pos && pos <= self.to
    }

    fn shift(&mut self, delta: isize) {
        self.from = self.from.saturating_add_signed(delta);
        self.to = self.to.saturating_add_signed(delta);
    }

    fn spanning<T: AreaType>(area: &Area<T>) -> Self {
        Self {
            from: area.from_pos(),
            to: area.to_pos(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct AmbiguousAreaSet {
    inner: AreaSet<AmbiguityKind>,
}

impl AmbiguousAreaSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_areas(areas: Vec<Area<AmbiguityKind>>) -> Result<Self, AreaError> {
        Ok(Self {
            inner: AreaSet::from_areas(areas)?,
        })
    }

    /// Replay `edits` on an empty document, marking every inserted range as
    /// ambiguous and cutting every removed one out.
    pub fn from_edits<'a, I>(edits: I) -> Result<Self, AreaError>
    where
        I: IntoIterator<Item = &'a TextEdit>,
    {
        let mut set = Self::new();
        for edit in edits {
            set.inner.force_remove(edit.from_pos(), edit.before_to_pos())?;
            // Seams inside an already ambiguous region stay visible.
            set.inner.insert(
                AmbiguityKind::Ambiguous,
                edit.from_pos(),
                edit.after_to_pos(),
                true,
            )?;
        }
        Ok(set)
    }

    pub fn areas(&self) -> &[Area<AmbiguityKind>] {
        self.inner.areas()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Insert with a forced split, then drop every [`AmbiguityKind::Nop`].
    ///
    /// Inserting a `Nop` therefore opens an untyped gap, splitting whatever
    /// ambiguous area it lands in.
    pub fn insert(&mut self, kind: AmbiguityKind, from_pos: usize, to_pos: usize) -> Result<&mut Self, AreaError> {
        self.inner.insert(kind, from_pos, to_pos, true)?;
        self.inner.retain(|area| area.kind() != AmbiguityKind::Nop);
        Ok(self)
    }

    pub fn force_remove(&mut self, from_pos: usize, to_pos: usize) -> Result<&mut Self, AreaError> {
        self.inner.force_remove(from_pos, to_pos)?;
        Ok(self)
    }

    /// Ambiguous areas touching `[from_pos, to_pos]`, boundaries included.
    pub fn find_ambiguity_areas(&self, from_pos: usize, to_pos: usize) -> Vec<&Area<AmbiguityKind>> {
        self.inner
            .iter()
            .filter(|area| {
                area.kind() == AmbiguityKind::Ambiguous && area.is_overlap_inclusive(from_pos, to_pos)
            })
            .collect()
    }

    /// Carve the footprint of `edit` out as an unambiguous gap.
    fn apply_unambiguous(&mut self, edit: &TextEdit) -> Result<(), AreaError> {
        self.force_remove(edit.from_pos(), edit.before_to_pos())?;
        self.insert(AmbiguityKind::Nop, edit.from_pos(), edit.after_to_pos())?;
        Ok(())
    }
}

/// Ambiguous regions of one batch of edits, in the coordinates before the
/// batch (`original`) and after it (`current`).
///
/// The `i`-th area of each side describes the same region.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AmbiguousAreaSetCouple {
    original: AmbiguousAreaSet,
    current: AmbiguousAreaSet,
}

impl AmbiguousAreaSetCouple {
    pub fn new(edits: &[TextEdit]) -> Result<Self, AreaError> {
        let inverses: Vec<TextEdit> = edits.iter().rev().map(TextEdit::inverse).collect();
        let couple = Self {
            original: AmbiguousAreaSet::from_edits(&inverses)?,
            current: AmbiguousAreaSet::from_edits(edits)?,
        };
        couple.check_aligned()?;
        Ok(couple)
    }

    pub fn original(&self) -> &AmbiguousAreaSet {
        &self.original
    }

    pub fn current(&self) -> &AmbiguousAreaSet {
        &self.current
    }

    /// Record one reconciled edit: `original_edit` as it was written against
    /// the old document and `current_edit` as it now applies to the new one.
    pub fn insert(&mut self, original_edit: &TextEdit, current_edit: &TextEdit) -> Result<&mut Self, AreaError> {
        self.original.apply_unambiguous(original_edit)?;
        self.current.apply_unambiguous(current_edit)?;
        self.check_aligned()?;

        let (original, current): (Vec<_>, Vec<_>) = self
            .original
            .areas()
            .iter()
            .zip(self.current.areas())
            .filter(|(original, current)| !original.is_empty() || !current.is_empty())
            .map(|(original, current)| (*original, *current))
            .unzip();

        self.original = AmbiguousAreaSet::from_areas(original)?;
        self.current = AmbiguousAreaSet::from_areas(current)?;
        Ok(self)
    }

    /// Where `[from_pos, to_pos]` of the old document may land in the new one.
    ///
    /// Returns the candidate ranges for each endpoint.
    pub fn possible_resolve_range(&self, from_pos: usize, to_pos: usize) -> (PosRange, PosRange) {
        let mut from_range = PosRange::point(from_pos);
        let mut to_range = PosRange::point(to_pos);

        for (original, current) in self.original.areas().iter().zip(self.current.areas()) {
            let delta = current.len() as isize - original.len() as isize;

            if original.to_pos() < from_pos {
                from_range.shift(delta);
                to_range.shift(delta);
            } else if to_pos < original.from_pos() {
                continue;
            } else if original.from_pos() <= from_pos && to_pos <= original.to_pos() {
                from_range = PosRange::spanning(current);
                to_range = PosRange::spanning(current);
            } else if from_pos < original.from_pos() && original.to_pos() < to_pos {
                to_range.shift(delta);
            } else {
                if original.is_overlap_inclusive(from_pos, from_pos) {
                    from_range = PosRange::spanning(current);
                }
                if original.is_overlap_inclusive(to_pos, to_pos) {
                    to_range = PosRange::spanning(current);
                } else {
                    to_range.shift(delta);
                }
            }
        }

        (from_range, to_range)
    }

    fn check_aligned(&self) -> Result<(), AreaError> {
        if self.original.len() != self.current.len() {
            return Err(AreaError::MisalignedCouple {
                original: self.original.len(),
                current: self.current.len(),
            });
        }
        Ok(())
    }
}
