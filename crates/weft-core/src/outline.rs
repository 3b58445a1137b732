//! Outline - the index <-> [`Position`] mirror of a live document.
//!
//! The outline stores only the *present* positions, sorted by the
//! [`Order`]. Deleted positions stay comparable through the order, so a
//! remembered position can always be re-resolved to an index, present or not.

use crate::error::{CoreError, Result};
use crate::formatting::Anchor;
use crate::order::Order;
use crate::position::{BunchMeta, Position};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Bunch id shared by every replica for the positions of the initial document.
pub const INIT_BUNCH_ID: &str = "INIT";

/// How to resolve a position that is not present.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchDir {
    /// Absent positions resolve to nothing.
    None,
    /// Absent positions resolve to the nearest present index on their left.
    Left,
    /// Absent positions resolve to the index they would occupy once present.
    Right,
}

/// Which neighbour a cursor sticks to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bind {
    /// Bound to the position on its left; content inserted at the cursor lands after it.
    Left,
    /// Bound to the position on its right; content inserted at the cursor lands before it.
    Right,
}

/// A run of present positions `start.inner_index .. start.inner_index + count`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionRun {
    #[serde(rename = "bunchID")]
    pub bunch_id: String,
    pub start: u32,
    pub count: u32,
}

/// Saved form of an [`Outline`]'s present set, in list order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineSnapshot {
    pub runs: Vec<PositionRun>,
}

#[derive(Clone, Debug)]
pub struct Outline {
    order: Order,
    present: Vec<Position>,
}

impl Outline {
    pub fn new(order: Order) -> Self {
        Self {
            order,
            present: Vec::new(),
        }
    }

    /// An outline holding `count` present positions in the shared
    /// [`INIT_BUNCH_ID`] bunch, identical on every replica.
    pub fn with_initial(order: Order, count: usize) -> Result<Self> {
        let mut outline = Self::new(order);
        if count > 0 {
            let (positions, _) = outline.order.create_positions(
                &Position::min(),
                &Position::max(),
                count,
                Some(INIT_BUNCH_ID),
            )?;
            outline.present = positions;
        }
        Ok(outline)
    }

    pub fn order(&self) -> &Order {
        &self.order
    }

    pub fn order_mut(&mut self) -> &mut Order {
        &mut self.order
    }

    pub fn len(&self) -> usize {
        self.present.len()
    }

    pub fn is_empty(&self) -> bool {
        self.present.is_empty()
    }

    /// Present positions in list order.
    pub fn positions(&self) -> &[Position] {
        &self.present
    }

    /// Present positions for the index range.
    pub fn positions_in(&self, range: Range<usize>) -> Result<&[Position]> {
        if range.start > range.end || range.end > self.present.len() {
            return Err(CoreError::IndexOutOfBounds {
                index: range.end,
                length: self.present.len(),
            });
        }
        Ok(&self.present[range])
    }

    pub fn position_at(&self, index: usize) -> Result<Position> {
        self.present
            .get(index)
            .cloned()
            .ok_or(CoreError::IndexOutOfBounds {
                index,
                length: self.present.len(),
            })
    }

    /// Binary search by order: `Ok(i)` if present at `i`, `Err(i)` for the
    /// index it would occupy.
    fn search(&self, pos: &Position) -> Result<std::result::Result<usize, usize>> {
        let (mut lo, mut hi) = (0, self.present.len());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match self.order.compare(&self.present[mid], pos)? {
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
                std::cmp::Ordering::Equal => return Ok(Ok(mid)),
            }
        }
        Ok(Err(lo))
    }

    pub fn has(&self, pos: &Position) -> Result<bool> {
        Ok(self.search(pos)?.is_ok())
    }

    /// Number of present positions strictly less than `pos`.
    pub fn insertion_index(&self, pos: &Position) -> Result<usize> {
        Ok(match self.search(pos)? {
            Ok(index) | Err(index) => index,
        })
    }

    /// Index of `pos`. A present position always yields its own index; an
    /// absent one resolves according to `dir`.
    pub fn index_of_position(&self, pos: &Position, dir: SearchDir) -> Result<Option<usize>> {
        Ok(match (self.search(pos)?, dir) {
            (Ok(index), _) => Some(index),
            (Err(_), SearchDir::None) => None,
            (Err(index), SearchDir::Left) => index.checked_sub(1),
            (Err(index), SearchDir::Right) => Some(index),
        })
    }

    /// A stable cursor for the gap at `index`.
    ///
    /// A left-bound cursor names the position before the gap ([`Position::min`]
    /// at the start); a right-bound cursor names the position after it
    /// ([`Position::max`] at the end).
    pub fn cursor_at(&self, index: usize, bind: Bind) -> Result<Position> {
        if index > self.present.len() {
            return Err(CoreError::IndexOutOfBounds {
                index,
                length: self.present.len(),
            });
        }
        Ok(match bind {
            Bind::Left if index == 0 => Position::min(),
            Bind::Left => self.present[index - 1].clone(),
            Bind::Right if index == self.present.len() => Position::max(),
            Bind::Right => self.present[index].clone(),
        })
    }

    /// Resolve a cursor back to a gap index. Inverse of [`Outline::cursor_at`]
    /// while the outline is unchanged; stays close to it afterwards.
    pub fn index_of_cursor(&self, cursor: &Position, bind: Bind) -> Result<usize> {
        match self.search(cursor)? {
            Ok(index) => Ok(match bind {
                Bind::Left => index + 1,
                Bind::Right => index,
            }),
            Err(index) => Ok(index),
        }
    }

    /// Resolve a formatting anchor to a gap index. A `before` anchor behaves
    /// like a right-bound cursor, an `after` anchor like a left-bound one.
    pub fn index_of_anchor(&self, anchor: &Anchor) -> Result<usize> {
        let bind = if anchor.before { Bind::Right } else { Bind::Left };
        self.index_of_cursor(&anchor.pos, bind)
    }

    /// Allocate `count` positions for the gap at `index` and mark them present.
    pub fn insert_at(&mut self, index: usize, count: usize) -> Result<(Position, Option<BunchMeta>)> {
        let prev = self.cursor_at(index, Bind::Left)?;
        let next = self.cursor_at(index, Bind::Right)?;
        let (positions, meta) = self.order.create_positions(&prev, &next, count, None)?;
        let start = positions[0].clone();
        self.present.splice(index..index, positions);
        Ok((start, meta))
    }

    /// Mark `count` consecutive positions of `start`'s bunch present.
    pub fn add(&mut self, start: &Position, count: usize) -> Result<()> {
        for pos in start.run(count) {
            if let Err(index) = self.search(&pos)? {
                self.present.insert(index, pos);
            }
        }
        Ok(())
    }

    /// Re-add arbitrary positions, e.g. ones removed by an earlier delete.
    pub fn add_all(&mut self, positions: &[Position]) -> Result<()> {
        for pos in positions {
            self.add(pos, 1)?;
        }
        Ok(())
    }

    /// Tombstone `count` consecutive positions of `start`'s bunch. Absent ones are skipped.
    pub fn delete(&mut self, start: &Position, count: usize) -> Result<()> {
        for pos in start.run(count) {
            if let Ok(index) = self.search(&pos)? {
                self.present.remove(index);
            }
        }
        Ok(())
    }

    /// Tombstone the positions at `index .. index + count`, returning them.
    pub fn delete_at(&mut self, index: usize, count: usize) -> Result<Vec<Position>> {
        let end = index + count;
        self.positions_in(index..end)?;
        Ok(self.present.drain(index..end).collect())
    }

    pub fn snapshot(&self) -> OutlineSnapshot {
        let mut runs: Vec<PositionRun> = Vec::new();
        for pos in &self.present {
            match runs.last_mut() {
                Some(run)
                    if run.bunch_id == pos.bunch_id && run.start + run.count == pos.inner_index =>
                {
                    run.count += 1;
                }
                _ => runs.push(PositionRun {
                    bunch_id: pos.bunch_id.clone(),
                    start: pos.inner_index,
                    count: 1,
                }),
            }
        }
        OutlineSnapshot { runs }
    }

    /// Replace the present set with a saved one. The order must already know
    /// every bunch in the snapshot.
    pub fn load(&mut self, snapshot: &OutlineSnapshot) -> Result<()> {
        let mut present = Vec::new();
        for run in &snapshot.runs {
            if !self.order.is_known(&run.bunch_id) {
                return Err(CoreError::UnknownBunch(run.bunch_id.clone()));
            }
            present.extend(Position::new(run.bunch_id.clone(), run.start).run(run.count as usize));
        }
        self.present = present;
        Ok(())
    }
}
