//! Order - allocates and totally orders [`Position`]s.
//!
//! Bunches form a tree stored as an append-only arena: bunches are created,
//! never destroyed, and found by id. A bunch's subtree is laid out as
//!
//! ```text
//! for i in 0.. {
//!     children at offset 2i   (sorted by bunch id)
//!     position i
//!     children at offset 2i+1 (sorted by bunch id)
//! }
//! ```
//!
//! Two replicas that registered the same metadata compare every pair of
//! positions identically, regardless of the order metadata arrived in.

use crate::error::{CoreError, Result};
use crate::position::{BunchMeta, Position, ROOT_BUNCH_ID};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Saved form of an [`Order`]: every non-root bunch, parents first.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSnapshot {
    pub metas: Vec<BunchMeta>,
}

#[derive(Clone, Debug)]
struct BunchNode {
    id: String,
    /// Parent arena index and offset within the parent. `None` only for the root.
    parent: Option<(usize, u32)>,
    depth: u32,
    /// Next unallocated inner index. Only tracked for bunches this replica
    /// created without a hint, which are the only ones it may extend.
    next_inner: Option<u32>,
}

/// Where a position sits inside some ancestor bunch.
#[derive(Clone, Copy, Debug)]
enum Slot {
    Position(u32),
    Child(usize),
}

#[derive(Clone, Debug)]
pub struct Order {
    replica_id: String,
    bunches: Vec<BunchNode>,
    ids: HashMap<String, usize>,
    counter: u64,
}

impl Order {
    /// Create an order that mints bunch ids prefixed with `replica_id`.
    pub fn new(replica_id: impl Into<String>) -> Self {
        let root = BunchNode {
            id: ROOT_BUNCH_ID.to_string(),
            parent: None,
            depth: 0,
            next_inner: None,
        };
        let mut ids = HashMap::new();
        ids.insert(ROOT_BUNCH_ID.to_string(), 0);
        Self {
            replica_id: replica_id.into(),
            bunches: vec![root],
            ids,
            counter: 0,
        }
    }

    /// Create an order with a random ULID replica id.
    pub fn with_random_replica() -> Self {
        Self::new(ulid::Ulid::new().to_string())
    }

    pub fn replica_id(&self) -> &str {
        &self.replica_id
    }

    /// Whether metadata for `bunch_id` has been registered.
    pub fn is_known(&self, bunch_id: &str) -> bool {
        self.ids.contains_key(bunch_id)
    }

    /// Whether `pos` can be compared, i.e. its bunch is registered.
    pub fn contains_position(&self, pos: &Position) -> bool {
        self.is_known(&pos.bunch_id)
    }

    /// Number of registered bunches, including the root.
    pub fn bunch_count(&self) -> usize {
        self.bunches.len()
    }

    /// The registered metadata for `bunch_id`, if any. The root has none.
    pub fn meta(&self, bunch_id: &str) -> Option<BunchMeta> {
        let node = &self.bunches[*self.ids.get(bunch_id)?];
        let (parent, offset) = node.parent?;
        Some(BunchMeta::new(
            node.id.clone(),
            self.bunches[parent].id.clone(),
            offset,
        ))
    }

    fn index_of(&self, bunch_id: &str) -> Result<usize> {
        self.ids
            .get(bunch_id)
            .copied()
            .ok_or_else(|| CoreError::UnknownBunch(bunch_id.to_string()))
    }

    /// Register bunch metadata. Idempotent; metas may arrive in any order
    /// within the batch, but every parent must be known by the end of it.
    pub fn add_metas(&mut self, metas: &[BunchMeta]) -> Result<()> {
        let mut pending: Vec<&BunchMeta> = metas.iter().collect();
        while !pending.is_empty() {
            let mut deferred = Vec::new();
            let mut progressed = false;
            for meta in pending {
                if self.ids.contains_key(&meta.parent_id) {
                    self.add_meta(meta)?;
                    progressed = true;
                } else {
                    deferred.push(meta);
                }
            }
            if !progressed {
                return Err(CoreError::UnknownBunch(deferred[0].parent_id.clone()));
            }
            pending = deferred;
        }
        Ok(())
    }

    fn add_meta(&mut self, meta: &BunchMeta) -> Result<()> {
        if let Some(&existing) = self.ids.get(&meta.bunch_id) {
            return match self.bunches[existing].parent {
                Some((parent, offset))
                    if self.bunches[parent].id == meta.parent_id && offset == meta.offset =>
                {
                    Ok(())
                }
                _ => Err(CoreError::ConflictingMeta(meta.bunch_id.clone())),
            };
        }

        let parent = self.index_of(&meta.parent_id)?;
        let node = BunchNode {
            id: meta.bunch_id.clone(),
            parent: Some((parent, meta.offset)),
            depth: self.bunches[parent].depth + 1,
            next_inner: None,
        };
        self.ids.insert(meta.bunch_id.clone(), self.bunches.len());
        self.bunches.push(node);
        Ok(())
    }

    /// Compare two positions in the total order.
    ///
    /// Fails only if either position's bunch is unknown.
    pub fn compare(&self, a: &Position, b: &Position) -> Result<Ordering> {
        if a.bunch_id == b.bunch_id {
            self.index_of(&a.bunch_id)?;
            return Ok(a.inner_index.cmp(&b.inner_index));
        }

        let mut a_node = self.index_of(&a.bunch_id)?;
        let mut b_node = self.index_of(&b.bunch_id)?;
        let mut a_slot = Slot::Position(a.inner_index);
        let mut b_slot = Slot::Position(b.inner_index);

        while self.bunches[a_node].depth > self.bunches[b_node].depth {
            (a_node, a_slot) = self.lift(a_node);
        }
        while self.bunches[b_node].depth > self.bunches[a_node].depth {
            (b_node, b_slot) = self.lift(b_node);
        }
        while a_node != b_node {
            (a_node, a_slot) = self.lift(a_node);
            (b_node, b_slot) = self.lift(b_node);
        }

        Ok(self.compare_slots(a_slot, b_slot))
    }

    /// Step from `node` to its parent, returning the slot `node` occupies there.
    /// The root lifts to itself; callers only lift nodes of positive depth.
    fn lift(&self, node: usize) -> (usize, Slot) {
        match self.bunches[node].parent {
            Some((parent, _)) => (parent, Slot::Child(node)),
            None => (node, Slot::Child(node)),
        }
    }

    fn slot_key(&self, slot: Slot) -> u64 {
        match slot {
            Slot::Position(inner) => 4 * inner as u64 + 1,
            Slot::Child(node) => {
                let offset = self.bunches[node].parent.map_or(0, |(_, offset)| offset);
                2 * offset as u64
            }
        }
    }

    fn compare_slots(&self, a: Slot, b: Slot) -> Ordering {
        self.slot_key(a)
            .cmp(&self.slot_key(b))
            .then_with(|| match (a, b) {
                (Slot::Child(x), Slot::Child(y)) => {
                    self.bunches[x].id.as_bytes().cmp(self.bunches[y].id.as_bytes())
                }
                _ => Ordering::Equal,
            })
    }

    /// Whether `pos` lies in a child subtree hung directly around `ancestor`
    /// (offsets `2i` or `2i+1` of `ancestor`'s bunch).
    pub fn is_descendant(&self, pos: &Position, ancestor: &Position) -> Result<bool> {
        let ancestor_node = self.index_of(&ancestor.bunch_id)?;
        let mut node = self.index_of(&pos.bunch_id)?;
        if node == ancestor_node {
            return Ok(false);
        }
        while let Some((parent, offset)) = self.bunches[node].parent {
            if parent == ancestor_node {
                let left = 2 * ancestor.inner_index;
                return Ok(offset == left || offset == left + 1);
            }
            node = parent;
        }
        Ok(false)
    }

    /// Allocate `count` fresh positions strictly between `prev` and `next`.
    ///
    /// The positions share one bunch and have consecutive inner indices.
    /// Returns the new bunch's metadata when one had to be created; the caller
    /// must ship it alongside any operation that uses the positions.
    pub fn create_positions(
        &mut self,
        prev: &Position,
        next: &Position,
        count: usize,
        bunch_id_hint: Option<&str>,
    ) -> Result<(Vec<Position>, Option<BunchMeta>)> {
        if count == 0 {
            return Err(CoreError::ZeroCount);
        }
        if self.compare(prev, next)? != Ordering::Less {
            return Err(CoreError::InvalidRange);
        }
        let count32 = u32::try_from(count).map_err(|_| CoreError::CountOverflow(count))?;
        let prev_node = self.index_of(&prev.bunch_id)?;
        let next_descends = self.is_descendant(next, prev)?;

        // Extend our own bunch when prev is its last allocated position.
        if bunch_id_hint.is_none() && !next_descends {
            if let Some(next_inner) = self.bunches[prev_node].next_inner {
                if prev.inner_index + 1 == next_inner {
                    let end = next_inner
                        .checked_add(count32)
                        .ok_or(CoreError::CountOverflow(count))?;
                    self.bunches[prev_node].next_inner = Some(end);
                    let start = Position::new(prev.bunch_id.clone(), next_inner);
                    return Ok((start.run(count).collect(), None));
                }
            }
        }

        let bunch_id = match bunch_id_hint {
            Some(hint) => hint.to_string(),
            None => self.fresh_bunch_id(),
        };
        let meta = if next_descends {
            BunchMeta::new(&bunch_id, &next.bunch_id, 2 * next.inner_index)
        } else {
            BunchMeta::new(&bunch_id, &prev.bunch_id, 2 * prev.inner_index + 1)
        };
        self.add_meta(&meta)?;
        if bunch_id_hint.is_none() {
            let node = self.index_of(&bunch_id)?;
            self.bunches[node].next_inner = Some(count32);
        }

        let start = Position::new(bunch_id, 0);
        Ok((start.run(count).collect(), Some(meta)))
    }

    fn fresh_bunch_id(&mut self) -> String {
        loop {
            let id = format!("{}_{}", self.replica_id, base36(self.counter));
            self.counter += 1;
            if !self.ids.contains_key(&id) {
                return id;
            }
        }
    }

    /// Save every registered bunch, parents before children.
    pub fn snapshot(&self) -> OrderSnapshot {
        let metas = self.bunches[1..]
            .iter()
            .filter_map(|node| self.meta(&node.id))
            .collect();
        OrderSnapshot { metas }
    }

    /// Merge a saved order into this one.
    pub fn load(&mut self, snapshot: &OrderSnapshot) -> Result<()> {
        self.add_metas(&snapshot.metas)
    }
}

fn base36(mut n: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn between(order: &mut Order, a: &Position, b: &Position) -> Position {
        let (positions, _) = order.create_positions(a, b, 1, None).unwrap();
        positions[0].clone()
    }

    #[test]
    fn test_min_before_max() {
        let order = Order::new("r1");
        assert_eq!(
            order.compare(&Position::min(), &Position::max()).unwrap(),
            Ordering::Less
        );
    }

    #[test]
    fn test_create_between_min_max() {
        let mut order = Order::new("r1");
        let (positions, meta) = order
            .create_positions(&Position::min(), &Position::max(), 3, None)
            .unwrap();
        assert_eq!(positions.len(), 3);
        let meta = meta.unwrap();
        assert_eq!(meta.parent_id, ROOT_BUNCH_ID);
        assert_eq!(meta.offset, 1);
        for pos in &positions {
            assert_eq!(order.compare(&Position::min(), pos).unwrap(), Ordering::Less);
            assert_eq!(order.compare(pos, &Position::max()).unwrap(), Ordering::Less);
        }
        assert_eq!(
            order.compare(&positions[0], &positions[2]).unwrap(),
            Ordering::Less
        );
    }

    #[test]
    fn test_extends_own_bunch() {
        let mut order = Order::new("r1");
        let (first, meta) = order
            .create_positions(&Position::min(), &Position::max(), 2, None)
            .unwrap();
        assert!(meta.is_some());
        let (more, meta) = order
            .create_positions(&first[1], &Position::max(), 2, None)
            .unwrap();
        assert!(meta.is_none());
        assert_eq!(more[0], Position::new(first[1].bunch_id.clone(), 2));
    }

    #[test]
    fn test_insert_in_middle_creates_child() {
        let mut order = Order::new("r1");
        let (run, _) = order
            .create_positions(&Position::min(), &Position::max(), 2, None)
            .unwrap();
        let (mid, meta) = order.create_positions(&run[0], &run[1], 1, None).unwrap();
        let meta = meta.unwrap();
        assert_eq!(meta.parent_id, run[0].bunch_id);
        assert_eq!(meta.offset, 1);
        assert_eq!(order.compare(&run[0], &mid[0]).unwrap(), Ordering::Less);
        assert_eq!(order.compare(&mid[0], &run[1]).unwrap(), Ordering::Less);
    }

    #[test]
    fn test_left_child_when_next_descends_from_prev() {
        let mut order = Order::new("r1");
        let (run, _) = order
            .create_positions(&Position::min(), &Position::max(), 2, None)
            .unwrap();
        let right_child = between(&mut order, &run[0], &run[1]);
        // right_child hangs off run[0]; inserting between them needs a left child.
        let (mid, meta) = order
            .create_positions(&run[0], &right_child, 1, None)
            .unwrap();
        let meta = meta.unwrap();
        assert_eq!(meta.parent_id, right_child.bunch_id);
        assert_eq!(meta.offset, 2 * right_child.inner_index);
        assert_eq!(order.compare(&run[0], &mid[0]).unwrap(), Ordering::Less);
        assert_eq!(order.compare(&mid[0], &right_child).unwrap(), Ordering::Less);
    }

    #[test]
    fn test_rejects_invalid_range() {
        let mut order = Order::new("r1");
        let result = order.create_positions(&Position::max(), &Position::min(), 1, None);
        assert_eq!(result, Err(CoreError::InvalidRange));
        let result = order.create_positions(&Position::min(), &Position::max(), 0, None);
        assert_eq!(result, Err(CoreError::ZeroCount));
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_rejects_oversized_count() {
        let mut order = Order::new("r1");
        let count = u32::MAX as usize + 1;
        let result = order.create_positions(&Position::min(), &Position::max(), count, None);
        assert_eq!(result, Err(CoreError::CountOverflow(count)));
        assert_eq!(order.bunch_count(), 1);
    }

    #[test]
    fn test_unknown_bunch_is_error() {
        let order = Order::new("r1");
        let ghost = Position::new("ghost", 0);
        assert_eq!(
            order.compare(&ghost, &Position::max()),
            Err(CoreError::UnknownBunch("ghost".to_string()))
        );
    }

    #[test]
    fn test_remote_metas_same_order() {
        let mut alice = Order::new("alice");
        let mut bob = Order::new("bob");

        let (a, meta_a) = alice
            .create_positions(&Position::min(), &Position::max(), 1, None)
            .unwrap();
        let (b, meta_b) = bob
            .create_positions(&Position::min(), &Position::max(), 1, None)
            .unwrap();

        // Deliver metas in opposite orders.
        alice.add_metas(&[meta_b.clone().unwrap()]).unwrap();
        bob.add_metas(&[meta_a.clone().unwrap()]).unwrap();

        let on_alice = alice.compare(&a[0], &b[0]).unwrap();
        let on_bob = bob.compare(&a[0], &b[0]).unwrap();
        assert_eq!(on_alice, on_bob);
        // Same parent and offset: bunch id decides.
        assert_eq!(on_alice, Ordering::Less);
    }

    #[test]
    fn test_add_metas_out_of_order_batch() {
        let mut source = Order::new("src");
        let (run, _) = source
            .create_positions(&Position::min(), &Position::max(), 2, None)
            .unwrap();
        let child = between(&mut source, &run[0], &run[1]);
        let snapshot = source.snapshot();
        let mut reversed = snapshot.metas.clone();
        reversed.reverse();

        let mut sink = Order::new("sink");
        sink.add_metas(&reversed).unwrap();
        assert!(sink.is_known(&child.bunch_id));
        assert_eq!(sink.compare(&run[0], &child).unwrap(), Ordering::Less);
    }

    #[test]
    fn test_add_metas_missing_parent() {
        let mut order = Order::new("r1");
        let orphan = BunchMeta::new("orphan", "nowhere", 1);
        assert_eq!(
            order.add_metas(&[orphan]),
            Err(CoreError::UnknownBunch("nowhere".to_string()))
        );
    }

    #[test]
    fn test_conflicting_meta() {
        let mut order = Order::new("r1");
        order.add_metas(&[BunchMeta::new("x", ROOT_BUNCH_ID, 1)]).unwrap();
        order.add_metas(&[BunchMeta::new("x", ROOT_BUNCH_ID, 1)]).unwrap();
        assert_eq!(
            order.add_metas(&[BunchMeta::new("x", ROOT_BUNCH_ID, 2)]),
            Err(CoreError::ConflictingMeta("x".to_string()))
        );
    }

    #[test]
    fn test_hinted_bunch_is_shared() {
        let mut a = Order::new("a");
        let mut b = Order::new("b");
        let (pa, ma) = a
            .create_positions(&Position::min(), &Position::max(), 4, Some("INIT"))
            .unwrap();
        let (pb, mb) = b
            .create_positions(&Position::min(), &Position::max(), 4, Some("INIT"))
            .unwrap();
        assert_eq!(pa, pb);
        assert_eq!(ma, mb);
        // Hinted bunches are never extended.
        let (_, meta) = a.create_positions(&pa[3], &Position::max(), 1, None).unwrap();
        assert!(meta.is_some());
    }

    #[test]
    fn test_base36() {
        assert_eq!(base36(0), "0");
        assert_eq!(base36(35), "z");
        assert_eq!(base36(36), "10");
    }
}
