//! Undo records for pending mutations.
//!
//! Instead of closures, an [`Undo`] stores inverse document steps and
//! outline/formatting entries as plain values. Both lists are replayed in
//! reverse of the order they were recorded in.

use crate::error::Result;
use tracing::error;
use weft_core::{Formatting, MarkId, Outline, Position};
use weft_doc::{Step, Transaction};

/// One reversible change to the outline or formatting store.
#[derive(Clone, Debug, PartialEq)]
pub enum UndoEntry {
    /// Re-add positions that were deleted.
    RestoreDeleted(Vec<Position>),
    /// Delete `count` positions that were inserted starting at `start`.
    RemoveInserted { start: Position, count: usize },
    /// Drop a mark that was added.
    RevertMark(MarkId),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Undo {
    /// Inverse document steps, in the order their forward steps ran.
    pub doc_steps: Vec<Step>,
    pub entries: Vec<UndoEntry>,
}

impl Undo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.doc_steps.is_empty() && self.entries.is_empty()
    }

    /// Revert the document (through `tr`), the outline and the formatting store.
    pub fn apply(
        &self,
        tr: &mut Transaction,
        outline: &mut Outline,
        formatting: &mut Formatting,
    ) -> Result<()> {
        for step in self.doc_steps.iter().rev() {
            if let Err(err) = tr.step(step.clone()) {
                error!(step = step.kind(), error = %err, "Inverse step failed to apply");
            }
        }
        for entry in self.entries.iter().rev() {
            match entry {
                UndoEntry::RestoreDeleted(positions) => outline.add_all(positions)?,
                UndoEntry::RemoveInserted { start, count } => outline.delete(start, *count)?,
                UndoEntry::RevertMark(id) => {
                    formatting.remove_mark(id);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::Order;
    use weft_doc::{Document, EditorState, Slice};

    #[test]
    fn test_entries_revert_in_reverse() {
        let mut outline = Outline::with_initial(Order::new("r"), 6).unwrap();
        let before = outline.positions().to_vec();

        let deleted = outline.delete_at(1, 2).unwrap();
        let (start, _) = outline.insert_at(1, 3).unwrap();

        let undo = Undo {
            doc_steps: vec![],
            entries: vec![
                UndoEntry::RestoreDeleted(deleted),
                UndoEntry::RemoveInserted { start, count: 3 },
            ],
        };
        let state = EditorState::new(Document::from_paragraphs(&["ab"]));
        let mut tr = state.tr();
        undo.apply(&mut tr, &mut outline, &mut Formatting::new()).unwrap();
        assert_eq!(outline.positions(), before.as_slice());
    }

    #[test]
    fn test_doc_steps_revert() {
        let doc = Document::from_paragraphs(&["ab"]);
        let state = EditorState::new(doc.clone());
        let mut tr = state.tr();
        let step = Step::Replace {
            from: 1,
            to: 1,
            slice: Slice::text("xy", &Default::default()),
            structure: false,
        };
        let undo = Undo {
            doc_steps: vec![step.invert(&doc)],
            entries: vec![],
        };
        tr.step(step).unwrap();
        let mut outline = Outline::with_initial(Order::new("r"), 0).unwrap();
        undo.apply(&mut tr, &mut outline, &mut Formatting::new()).unwrap();
        assert_eq!(tr.doc(), &doc);
    }
}
