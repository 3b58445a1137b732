//! Structural edit steps.
//!
//! Every step addresses the document by integer position (token index).
//! Applying a step never mutates its input; it produces a new document or
//! a [`StepError`] that leaves the caller's document as it was.

use crate::error::{Result, StepError};
use crate::node::{Document, Slice, Token};
use crate::schema::Schema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which side of an insertion a mapped position sticks to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Assoc {
    Left,
    Right,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stepType", rename_all = "camelCase")]
pub enum Step {
    /// Replace `from..to` with `slice`.
    #[serde(rename_all = "camelCase")]
    Replace {
        from: usize,
        to: usize,
        slice: Slice,
        /// Refuse to run if the replaced range holds any content.
        structure: bool,
    },
    /// Replace `from..to` with `slice`, keeping `gap_from..gap_to` and
    /// placing it at offset `insert` of the slice.
    #[serde(rename_all = "camelCase")]
    ReplaceAround {
        from: usize,
        to: usize,
        gap_from: usize,
        gap_to: usize,
        slice: Slice,
        insert: usize,
        structure: bool,
    },
    AddMark {
        from: usize,
        to: usize,
        key: String,
        value: Value,
    },
    RemoveMark {
        from: usize,
        to: usize,
        key: String,
    },
    AddNodeMark {
        pos: usize,
        key: String,
        value: Value,
    },
    RemoveNodeMark {
        pos: usize,
        key: String,
    },
    /// Set a node attribute; `null` removes it.
    Attr {
        pos: usize,
        attr: String,
        value: Value,
    },
    /// Set a document attribute; `null` removes it.
    DocAttr { attr: String, value: Value },
}

fn check_range(doc: &Document, from: usize, to: usize) -> Result<()> {
    let size = doc.content_size();
    if from > to {
        return Err(StepError::OutOfRange { pos: from, size });
    }
    if to > size {
        return Err(StepError::OutOfRange { pos: to, size });
    }
    Ok(())
}

fn set_or_remove(map: &mut crate::node::Attrs, key: &str, value: &Value) {
    if value.is_null() {
        map.remove(key);
    } else {
        map.insert(key.to_string(), value.clone());
    }
}

impl Step {
    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Step::Replace { .. } => "replace",
            Step::ReplaceAround { .. } => "replaceAround",
            Step::AddMark { .. } => "addMark",
            Step::RemoveMark { .. } => "removeMark",
            Step::AddNodeMark { .. } => "addNodeMark",
            Step::RemoveNodeMark { .. } => "removeNodeMark",
            Step::Attr { .. } => "attr",
            Step::DocAttr { .. } => "docAttr",
        }
    }

    /// Apply to `doc`, validating the result against `schema`.
    pub fn apply(&self, doc: &Document, schema: &Schema) -> Result<Document> {
        let mut out = doc.clone();
        match self {
            Step::Replace {
                from,
                to,
                slice,
                structure,
            } => {
                check_range(doc, *from, *to)?;
                if *structure && doc.tokens[*from..*to].iter().any(Token::is_content) {
                    return Err(StepError::StructureOverwrite);
                }
                out.tokens.splice(*from..*to, slice.content.iter().cloned());
            }
            Step::ReplaceAround {
                from,
                to,
                gap_from,
                gap_to,
                slice,
                insert,
                structure,
            } => {
                check_range(doc, *from, *to)?;
                if !(*from <= *gap_from && gap_from <= gap_to && *gap_to <= *to) || *insert > slice.size() {
                    return Err(StepError::InvalidGap {
                        from: *from,
                        to: *to,
                        gap_from: *gap_from,
                        gap_to: *gap_to,
                    });
                }
                if *structure
                    && doc.tokens[*from..*gap_from]
                        .iter()
                        .chain(&doc.tokens[*gap_to..*to])
                        .any(Token::is_content)
                {
                    return Err(StepError::StructureOverwrite);
                }
                let mut middle = slice.content[..*insert].to_vec();
                middle.extend_from_slice(&doc.tokens[*gap_from..*gap_to]);
                middle.extend_from_slice(&slice.content[*insert..]);
                out.tokens.splice(*from..*to, middle);
            }
            Step::AddMark {
                from,
                to,
                key,
                value,
            } => {
                check_range(doc, *from, *to)?;
                for token in &mut out.tokens[*from..*to] {
                    match token {
                        Token::Text { marks, .. } => set_or_remove(marks, key, value),
                        Token::Leaf(head) => set_or_remove(&mut head.marks, key, value),
                        _ => {}
                    }
                }
            }
            Step::RemoveMark { from, to, key } => {
                check_range(doc, *from, *to)?;
                for token in &mut out.tokens[*from..*to] {
                    match token {
                        Token::Text { marks, .. } => {
                            marks.remove(key);
                        }
                        Token::Leaf(head) => {
                            head.marks.remove(key);
                        }
                        _ => {}
                    }
                }
            }
            Step::AddNodeMark { pos, key, value } => {
                let head = node_head_mut(&mut out, *pos)?;
                set_or_remove(&mut head.marks, key, value);
            }
            Step::RemoveNodeMark { pos, key } => {
                let head = node_head_mut(&mut out, *pos)?;
                head.marks.remove(key);
            }
            Step::Attr { pos, attr, value } => {
                let head = node_head_mut(&mut out, *pos)?;
                set_or_remove(&mut head.attrs, attr, value);
            }
            Step::DocAttr { attr, value } => set_or_remove(&mut out.attrs, attr, value),
        }
        schema.validate(&out)?;
        Ok(out)
    }

    /// The step that undoes `self`, given the document it was applied to.
    pub fn invert(&self, before: &Document) -> Step {
        match self {
            Step::Replace { from, to, slice, .. } => Step::Replace {
                from: *from,
                to: from + slice.size(),
                slice: before.slice(*from, *to),
                structure: false,
            },
            Step::ReplaceAround {
                from,
                to,
                gap_from,
                gap_to,
                slice,
                insert,
                ..
            } => {
                let gap = gap_to - gap_from;
                let mut removed = before.tokens[*from..*gap_from].to_vec();
                removed.extend_from_slice(&before.tokens[*gap_to..*to]);
                Step::ReplaceAround {
                    from: *from,
                    to: from + slice.size() + gap,
                    gap_from: from + insert,
                    gap_to: from + insert + gap,
                    slice: Slice::new(removed),
                    insert: gap_from - from,
                    structure: false,
                }
            }
            // Restores every token's marks exactly.
            Step::AddMark { from, to, .. } | Step::RemoveMark { from, to, .. } => Step::Replace {
                from: *from,
                to: *to,
                slice: before.slice(*from, *to),
                structure: false,
            },
            Step::AddNodeMark { pos, key, .. } | Step::RemoveNodeMark { pos, key } => {
                match before.tokens.get(*pos).and_then(Token::head).and_then(|h| h.marks.get(key)) {
                    Some(old) => Step::AddNodeMark {
                        pos: *pos,
                        key: key.clone(),
                        value: old.clone(),
                    },
                    None => Step::RemoveNodeMark {
                        pos: *pos,
                        key: key.clone(),
                    },
                }
            }
            Step::Attr { pos, attr, .. } => Step::Attr {
                pos: *pos,
                attr: attr.clone(),
                value: before
                    .tokens
                    .get(*pos)
                    .and_then(Token::head)
                    .and_then(|h| h.attrs.get(attr))
                    .cloned()
                    .unwrap_or(Value::Null),
            },
            Step::DocAttr { attr, .. } => Step::DocAttr {
                attr: attr.clone(),
                value: before.attrs.get(attr).cloned().unwrap_or(Value::Null),
            },
        }
    }

    /// Map a position in the document before this step to the document after it.
    pub fn map(&self, pos: usize, assoc: Assoc) -> usize {
        match self {
            Step::Replace { from, to, slice, .. } => {
                map_range(pos, *from, *to, slice.size(), assoc)
            }
            Step::ReplaceAround {
                from,
                to,
                gap_from,
                gap_to,
                slice,
                insert,
                ..
            } => {
                let gap = gap_to - gap_from;
                if pos >= *gap_from && pos <= *gap_to && gap_from < gap_to {
                    from + insert + (pos - gap_from)
                } else if pos <= *gap_from {
                    map_range(pos, *from, *gap_from, *insert, assoc)
                } else {
                    let shifted = from + insert + gap;
                    let tail = slice.size() - insert;
                    if pos >= *to {
                        pos + shifted + tail - to
                    } else {
                        match assoc {
                            Assoc::Left => shifted,
                            Assoc::Right => shifted + tail,
                        }
                    }
                }
            }
            _ => pos,
        }
    }
}

fn map_range(pos: usize, from: usize, to: usize, size: usize, assoc: Assoc) -> usize {
    if pos < from {
        pos
    } else if pos > to || (pos == to && from < to) {
        pos + size - (to - from)
    } else {
        match assoc {
            Assoc::Left => from,
            Assoc::Right => from + size,
        }
    }
}

fn node_head_mut(doc: &mut Document, pos: usize) -> Result<&mut crate::node::NodeHead> {
    doc.tokens
        .get_mut(pos)
        .and_then(Token::head_mut)
        .ok_or(StepError::NotANode(pos))
}
