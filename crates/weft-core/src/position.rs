//! Positions and bunch metadata.
//!
//! A [`Position`] names one slot in a list forever. Positions are created in
//! *bunches*: a replica allocates consecutive inner indices under one bunch id,
//! and ships a single [`BunchMeta`] telling other replicas where the bunch hangs
//! in the position tree.

use serde::{Deserialize, Serialize};

/// Bunch id of the implicit root bunch that holds [`Position::MIN`] and [`Position::MAX`].
pub const ROOT_BUNCH_ID: &str = "ROOT";

/// An immutable, globally comparable list position.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    #[serde(rename = "bunchID")]
    pub bunch_id: String,
    #[serde(rename = "innerIndex")]
    pub inner_index: u32,
}

impl Position {
    pub fn new(bunch_id: impl Into<String>, inner_index: u32) -> Self {
        Self {
            bunch_id: bunch_id.into(),
            inner_index,
        }
    }

    /// The position before every other position. Never present in an outline.
    pub fn min() -> Self {
        Self::new(ROOT_BUNCH_ID, 0)
    }

    /// The position after every other position. Never present in an outline.
    pub fn max() -> Self {
        Self::new(ROOT_BUNCH_ID, 1)
    }

    pub fn is_root(&self) -> bool {
        self.bunch_id == ROOT_BUNCH_ID
    }

    /// The position `delta` slots later in the same bunch.
    pub fn offset_by(&self, delta: u32) -> Self {
        Self::new(self.bunch_id.clone(), self.inner_index + delta)
    }

    /// Expand a start position into `count` consecutive positions of its bunch.
    pub fn run(&self, count: usize) -> impl Iterator<Item = Position> + '_ {
        (0..count as u32).map(move |i| self.offset_by(i))
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.bunch_id, self.inner_index)
    }
}

/// Declares that `bunch_id` is a child of `parent_id` at tree offset `offset`.
///
/// Offset `2 * i` hangs the bunch just before the parent's position `i`,
/// offset `2 * i + 1` just after it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BunchMeta {
    #[serde(rename = "bunchID")]
    pub bunch_id: String,
    #[serde(rename = "parentID")]
    pub parent_id: String,
    pub offset: u32,
}

impl BunchMeta {
    pub fn new(bunch_id: impl Into<String>, parent_id: impl Into<String>, offset: u32) -> Self {
        Self {
            bunch_id: bunch_id.into(),
            parent_id: parent_id.into(),
            offset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_min_max_are_root() {
        assert!(Position::min().is_root());
        assert!(Position::max().is_root());
        assert_ne!(Position::min(), Position::max());
    }

    #[test]
    fn test_run() {
        let start = Position::new("b", 3);
        let run: Vec<_> = start.run(3).collect();
        assert_eq!(
            run,
            vec![Position::new("b", 3), Position::new("b", 4), Position::new("b", 5)]
        );
    }

    #[test]
    fn test_wire_names() {
        let json = serde_json::to_string(&Position::new("abc", 2)).unwrap();
        assert_eq!(json, r#"{"bunchID":"abc","innerIndex":2}"#);

        let meta = BunchMeta::new("x", "ROOT", 1);
        let json = serde_json::to_string(&meta).unwrap();
        assert!(json.contains(r#""parentID":"ROOT""#));
    }
}
