//! Annotated steps and mutations - the operations replicas exchange.
//!
//! An [`AnnotatedStep`] is an editor step with every integer position
//! replaced by a [`Position`], so it can be re-resolved against whatever the
//! outline looks like when it is finally applied.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use weft_core::{Anchor, BunchMeta, Expand, Mark, Position};
use weft_doc::Slice;

/// Newly allocated positions for inserted content.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertPositions {
    /// Metadata of the bunch the positions live in, when it was created for them.
    pub meta: Option<BunchMeta>,
    pub start_pos: Position,
}

/// The replaced range, as a pair of cursors that never expand.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletePositions {
    /// Right-bound cursor at the start of the range.
    pub start_pos: Position,
    /// Left-bound cursor at the end of the range.
    pub end_pos: Position,
}

/// Positions for a replace or one side of a replace-around.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplacePositions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insert: Option<InsertPositions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete: Option<DeletePositions>,
}

/// An inline mark change as shipped between replicas.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarkPayload {
    pub key: String,
    /// `null` unsets the key.
    pub value: Value,
    #[serde(rename = "creatorID")]
    pub creator_id: String,
    pub timestamp: u64,
    /// Edges that take in content inserted next to them, chosen by the creator.
    #[serde(default)]
    pub expand: Expand,
}

impl MarkPayload {
    /// The formatting mark between `from_pos` and `to_pos`.
    ///
    /// A non-expanding edge names the first or last covered position; an
    /// expanding edge names the neighbour just outside the range.
    pub fn to_mark(&self, from_pos: &Position, to_pos: &Position) -> Mark {
        let start = if self.expand.expands_before() {
            Anchor::after(from_pos.clone())
        } else {
            Anchor::before(from_pos.clone())
        };
        let end = if self.expand.expands_after() {
            Anchor::before(to_pos.clone())
        } else {
            Anchor::after(to_pos.clone())
        };
        Mark {
            start,
            end,
            key: self.key.clone(),
            value: self.value.clone(),
            creator_id: self.creator_id.clone(),
            timestamp: self.timestamp,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AnnotatedStep {
    Replace {
        positions: ReplacePositions,
        slice: Slice,
        structure: bool,
    },
    #[serde(rename_all = "camelCase")]
    ReplaceAround {
        left_positions: ReplacePositions,
        right_positions: ReplacePositions,
        slice: Slice,
        /// Index into the slice; needs no positions.
        slice_insert: usize,
        structure: bool,
    },
    #[serde(rename_all = "camelCase")]
    ChangeMark {
        /// Else remove.
        is_add: bool,
        /// Right-bound cursor, or left-bound when the mark expands before.
        from_pos: Position,
        /// Left-bound cursor, or right-bound when the mark expands after.
        to_pos: Position,
        mark: MarkPayload,
    },
    #[serde(rename_all = "camelCase")]
    ChangeNodeMark {
        is_add: bool,
        pos: Position,
        key: String,
        value: Value,
    },
    Attr {
        pos: Position,
        attr: String,
        value: Value,
    },
    DocAttr {
        attr: String,
        value: Value,
    },
}

impl AnnotatedStep {
    pub fn kind(&self) -> &'static str {
        match self {
            AnnotatedStep::Replace { .. } => "replace",
            AnnotatedStep::ReplaceAround { .. } => "replaceAround",
            AnnotatedStep::ChangeMark { .. } => "changeMark",
            AnnotatedStep::ChangeNodeMark { .. } => "changeNodeMark",
            AnnotatedStep::Attr { .. } => "attr",
            AnnotatedStep::DocAttr { .. } => "docAttr",
        }
    }

    fn replace_positions(&self) -> Vec<&ReplacePositions> {
        match self {
            AnnotatedStep::Replace { positions, .. } => vec![positions],
            AnnotatedStep::ReplaceAround {
                left_positions,
                right_positions,
                ..
            } => vec![left_positions, right_positions],
            _ => Vec::new(),
        }
    }

    /// Bunch metadata this step carries.
    pub fn metas(&self) -> impl Iterator<Item = &BunchMeta> {
        self.replace_positions()
            .into_iter()
            .filter_map(|p| p.insert.as_ref().and_then(|i| i.meta.as_ref()))
    }

    /// Every position this step references.
    pub fn positions(&self) -> Vec<&Position> {
        let mut out = Vec::new();
        for rp in self.replace_positions() {
            if let Some(insert) = &rp.insert {
                out.push(&insert.start_pos);
            }
            if let Some(delete) = &rp.delete {
                out.push(&delete.start_pos);
                out.push(&delete.end_pos);
            }
        }
        match self {
            AnnotatedStep::ChangeMark {
                from_pos, to_pos, ..
            } => {
                out.push(from_pos);
                out.push(to_pos);
            }
            AnnotatedStep::ChangeNodeMark { pos, .. } | AnnotatedStep::Attr { pos, .. } => {
                out.push(pos)
            }
            _ => {}
        }
        out
    }
}

/// Identity of a mutation: `(client_id, client_counter)`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationId {
    #[serde(rename = "clientID")]
    pub client_id: String,
    pub client_counter: u64,
}

/// One client's batch of annotated steps.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mutation {
    #[serde(rename = "clientID")]
    pub client_id: String,
    pub client_counter: u64,
    pub ann_steps: Vec<AnnotatedStep>,
}

impl Mutation {
    pub fn id(&self) -> MutationId {
        MutationId {
            client_id: self.client_id.clone(),
            client_counter: self.client_counter,
        }
    }

    pub fn same_id(&self, other: &Mutation) -> bool {
        self.client_id == other.client_id && self.client_counter == other.client_counter
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
