//! Ordered sets of typed, half-open position intervals.
//!
//! An [`AreaSet`] keeps disjoint [`Area`]s sorted by position. Inserting or
//! removing a range shifts every interval to its right, so the set tracks
//! positions through a sequence of text edits. Whether two touching intervals
//! coalesce, and whether an interval survives shrinking to nothing, is decided
//! by its [`AreaType`].

use std::fmt;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AreaError {
    #[error("area end {to_pos} is before its start {from_pos}")]
    InvertedRange { from_pos: usize, to_pos: usize },

    #[error("cannot remove a {requested} range from a {found} area")]
    TypeMismatch { requested: String, found: String },

    #[error("range [{from_pos}, {to_pos}) crosses the boundary of a typed area")]
    MixedArea { from_pos: usize, to_pos: usize },

    #[error("area at index {index} starts before the end of its predecessor")]
    Unordered { index: usize },

    #[error("coupled area sets diverged ({original} original areas, {current} current areas)")]
    MisalignedCouple { original: usize, current: usize },
}

/// Behaviour flags of an area type.
pub trait AreaType: Copy + Eq + fmt::Debug {
    /// Touching areas of this type coalesce into one.
    fn mergeable(self) -> bool;

    /// An area of this type is dropped once it shrinks to zero length.
    fn remove_on_empty(self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Area<T> {
    kind: T,
    from_pos: usize,
    to_pos: usize,
}

impl<T: AreaType> Area<T> {
    pub fn new(kind: T, from_pos: usize, to_pos: usize) -> Result<Self, AreaError> {
        if to_pos < from_pos {
            return Err(AreaError::InvertedRange { from_pos, to_pos });
        }
        Ok(Self {
            kind,
            from_pos,
            to_pos,
        })
    }

    pub fn kind(&self) -> T {
        self.kind
    }

    pub fn from_pos(&self) -> usize {
        self.from_pos
    }

    pub fn to_pos(&self) -> usize {
        self.to_pos
    }

    pub fn len(&self) -> usize {
        self.to_pos - self.from_pos
    }

    pub fn is_empty(&self) -> bool {
        self.from_pos == self.to_pos
    }

    /// Whether `[from_pos, to_pos]` touches this area, boundaries included.
    pub fn is_overlap_inclusive(&self, from_pos: usize, to_pos: usize) -> bool {
        self.from_pos <= to_pos && from_pos <= self.to_pos
    }

    fn shift_right(&mut self, delta: usize) {
        self.from_pos += delta;
        self.to_pos += delta;
    }

    fn shift_left(&mut self, delta: usize) {
        self.from_pos -= delta;
        self.to_pos -= delta;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct AreaSet<T> {
    areas: Vec<Area<T>>,
}

impl<T> Default for AreaSet<T> {
    fn default() -> Self {
        Self { areas: Vec::new() }
    }
}

impl<T: AreaType> AreaSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from areas that are already sorted and disjoint.
    pub fn from_areas(areas: Vec<Area<T>>) -> Result<Self, AreaError> {
        if let Some(index) = areas
            .windows(2)
            .position(|pair| pair[1].from_pos < pair[0].to_pos)
        {
            return Err(AreaError::Unordered { index: index + 1 });
        }
        Ok(Self { areas })
    }

    pub fn areas(&self) -> &[Area<T>] {
        &self.areas
    }

    pub fn into_areas(self) -> Vec<Area<T>> {
        self.areas
    }

    pub fn len(&self) -> usize {
        self.areas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.areas.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Area<T>> {
        self.areas.iter()
    }

    pub(crate) fn retain(&mut self, keep: impl FnMut(&Area<T>) -> bool) {
        self.areas.retain(keep);
    }

    /// Insert an area of `kind` covering `[from_pos, to_pos)`.
    ///
    /// Everything at or after `from_pos` moves right by the new length. An
    /// insertion landing on the boundary of an existing area is placed next
    /// to it unless `force_split` is set; one landing strictly inside splits
    /// that area in two around the new one.
    pub fn insert(
        &mut self,
        kind: T,
        from_pos: usize,
        to_pos: usize,
        force_split: bool,
    ) -> Result<&mut Self, AreaError> {
        let new_area = Area::new(kind, from_pos, to_pos)?;
        let len = new_area.len();

        let mut new_index = None;
        for i in 0..self.areas.len() {
            let area = self.areas[i];

            if from_pos < area.from_pos {
                self.areas.insert(i, new_area);
                self.shift_right_from(i + 1, len);
                new_index = Some(i);
                break;
            }

            if area.from_pos <= from_pos && from_pos <= area.to_pos {
                if area.from_pos == from_pos && !force_split {
                    self.areas.insert(i, new_area);
                    self.shift_right_from(i + 1, len);
                    new_index = Some(i);
                } else if area.to_pos == from_pos && !force_split {
                    self.areas.insert(i + 1, new_area);
                    self.shift_right_from(i + 2, len);
                    new_index = Some(i + 1);
                } else {
                    let right = Area {
                        kind: area.kind,
                        from_pos: to_pos,
                        to_pos: area.to_pos + len,
                    };
                    self.areas[i].to_pos = from_pos;
                    self.areas.splice(i + 1..i + 1, [new_area, right]);
                    self.shift_right_from(i + 3, len);
                    new_index = Some(i + 1);
                }
                break;
            }
        }

        let new_index = match new_index {
            Some(index) => index,
            None => {
                self.areas.push(new_area);
                self.areas.len() - 1
            }
        };

        self.merge_adjacent(new_index);
        Ok(self)
    }

    /// Remove `[from_pos, to_pos)` from the area of `kind` covering it, or
    /// from the untyped gap between areas.
    pub fn remove(&mut self, kind: T, from_pos: usize, to_pos: usize) -> Result<&mut Self, AreaError> {
        if to_pos < from_pos {
            return Err(AreaError::InvertedRange { from_pos, to_pos });
        }
        let len = to_pos - from_pos;

        let mut merge_at = None;
        for i in 0..self.areas.len() {
            let area = self.areas[i];

            if from_pos < area.from_pos {
                if area.from_pos < to_pos {
                    return Err(AreaError::MixedArea { from_pos, to_pos });
                }
                self.shift_left_from(i, len);
                merge_at = Some(i);
                break;
            }

            if area.from_pos <= from_pos && from_pos < area.to_pos {
                if area.kind != kind {
                    return Err(AreaError::TypeMismatch {
                        requested: format!("{kind:?}"),
                        found: format!("{:?}", area.kind),
                    });
                }
                if area.to_pos < to_pos {
                    return Err(AreaError::MixedArea { from_pos, to_pos });
                }

                self.areas[i].to_pos -= len;
                self.shift_left_from(i + 1, len);

                if self.areas[i].is_empty() && area.kind.remove_on_empty() {
                    self.areas.remove(i);
                    merge_at = Some(i);
                } else {
                    merge_at = Some(i + 1);
                }
                break;
            }
        }

        if let Some(index) = merge_at.filter(|&index| index < self.areas.len()) {
            self.merge_adjacent(index);
        }
        Ok(self)
    }

    /// Cut `[from_pos, to_pos)` out of every area regardless of type.
    pub fn force_remove(&mut self, from_pos: usize, to_pos: usize) -> Result<&mut Self, AreaError> {
        if to_pos < from_pos {
            return Err(AreaError::InvertedRange { from_pos, to_pos });
        }
        let len = to_pos - from_pos;

        for i in (0..self.areas.len()).rev() {
            let area = &mut self.areas[i];

            if to_pos <= area.from_pos {
                area.shift_left(len);
            } else if from_pos <= area.from_pos {
                area.to_pos -= area.to_pos.min(to_pos) - from_pos;
                area.from_pos = from_pos;
            } else if from_pos < area.to_pos {
                area.to_pos -= area.to_pos.min(to_pos) - from_pos;
            } else {
                break;
            }

            if area.is_empty() && area.kind.remove_on_empty() {
                self.areas.remove(i);
            }
        }

        for i in (0..self.areas.len()).rev() {
            if i < self.areas.len() {
                self.merge_adjacent(i);
            }
        }
        Ok(self)
    }

    /// Coalesce the area at `index` with mergeable neighbours and return its
    /// new index.
    pub fn merge_adjacent(&mut self, mut index: usize) -> usize {
        if index > 0 && self.can_merge(&self.areas[index - 1], &self.areas[index]) {
            let left = self.areas.remove(index - 1);
            index -= 1;
            self.areas[index].from_pos -= left.len();
        }

        if index + 1 < self.areas.len() && self.can_merge(&self.areas[index], &self.areas[index + 1]) {
            let right = self.areas.remove(index + 1);
            self.areas[index].to_pos += right.len();
        }

        index
    }

    fn can_merge(&self, left: &Area<T>, right: &Area<T>) -> bool {
        left.kind == right.kind && left.to_pos == right.from_pos && left.kind.mergeable()
    }

    fn shift_right_from(&mut self, index: usize, delta: usize) {
        for area in self.areas.iter_mut().skip(index) {
            area.shift_right(delta);
        }
    }

    fn shift_left_from(&mut self, index: usize, delta: usize) {
        for area in self.areas.iter_mut().skip(index) {
            area.shift_left(delta);
        }
    }
}

impl<'a, T> IntoIterator for &'a AreaSet<T> {
    type Item = &'a Area<T>;
    type IntoIter = std::slice::Iter<'a, Area<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.areas.iter()
    }
}
