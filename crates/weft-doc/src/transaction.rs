//! Editor state and transactions.

use crate::error::Result;
use crate::node::Document;
use crate::schema::Schema;
use crate::step::{Assoc, Step};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A text selection between two positions. `anchor == head` is a caret.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub anchor: usize,
    pub head: usize,
}

impl Selection {
    pub fn caret(pos: usize) -> Self {
        Self {
            anchor: pos,
            head: pos,
        }
    }

    pub fn new(anchor: usize, head: usize) -> Self {
        Self { anchor, head }
    }

    pub fn from(&self) -> usize {
        self.anchor.min(self.head)
    }

    pub fn to(&self) -> usize {
        self.anchor.max(self.head)
    }

    pub fn map(&self, step: &Step) -> Self {
        Self {
            anchor: step.map(self.anchor, Assoc::Right),
            head: step.map(self.head, Assoc::Right),
        }
    }

    /// Clamp both ends into the document's content.
    pub fn clamp(&self, doc: &Document) -> Self {
        let max = doc.content_size();
        Self {
            anchor: self.anchor.min(max),
            head: self.head.min(max),
        }
    }
}

#[derive(Clone, Debug)]
pub struct EditorState {
    schema: Arc<Schema>,
    doc: Document,
    selection: Selection,
}

impl EditorState {
    pub fn new(doc: Document) -> Self {
        Self::with_schema(Arc::new(Schema::basic()), doc)
    }

    pub fn with_schema(schema: Arc<Schema>, doc: Document) -> Self {
        Self {
            schema,
            doc,
            selection: Selection::caret(0),
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn doc(&self) -> &Document {
        &self.doc
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    /// Start a transaction on this state.
    pub fn tr(&self) -> Transaction {
        Transaction {
            schema: Arc::clone(&self.schema),
            before: self.doc.clone(),
            doc: self.doc.clone(),
            steps: Vec::new(),
            docs: Vec::new(),
            selection: self.selection,
            add_to_history: true,
        }
    }

    /// The state after `tr`. The transaction should have been started on this state.
    pub fn apply(&self, tr: &Transaction) -> EditorState {
        EditorState {
            schema: Arc::clone(&self.schema),
            doc: tr.doc.clone(),
            selection: tr.selection.clamp(&tr.doc),
        }
    }
}

/// An ordered list of steps plus the document before each of them.
#[derive(Clone, Debug)]
pub struct Transaction {
    schema: Arc<Schema>,
    before: Document,
    doc: Document,
    steps: Vec<Step>,
    docs: Vec<Document>,
    selection: Selection,
    add_to_history: bool,
}

impl Transaction {
    /// Apply `step`. On failure the transaction is left unchanged.
    pub fn step(&mut self, step: Step) -> Result<()> {
        let next = step.apply(&self.doc, &self.schema)?;
        self.selection = self.selection.map(&step);
        self.docs.push(std::mem::replace(&mut self.doc, next));
        self.steps.push(step);
        Ok(())
    }

    /// The document this transaction started from.
    pub fn before(&self) -> &Document {
        &self.before
    }

    /// The document after every step so far.
    pub fn doc(&self) -> &Document {
        &self.doc
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// `docs()[i]` is the document `steps()[i]` was applied to.
    pub fn docs(&self) -> &[Document] {
        &self.docs
    }

    /// The document after step `i`.
    pub fn doc_after(&self, i: usize) -> &Document {
        self.docs.get(i + 1).unwrap_or(&self.doc)
    }

    pub fn doc_changed(&self) -> bool {
        !self.steps.is_empty()
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    pub fn set_selection(&mut self, selection: Selection) -> &mut Self {
        self.selection = selection;
        self
    }

    pub fn add_to_history(&self) -> bool {
        self.add_to_history
    }

    pub fn set_add_to_history(&mut self, add: bool) -> &mut Self {
        self.add_to_history = add;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Slice;

    fn insert(pos: usize, text: &str) -> Step {
        Step::Replace {
            from: pos,
            to: pos,
            slice: Slice::text(text, &Default::default()),
            structure: false,
        }
    }

    #[test]
    fn test_transaction_records_docs() {
        let state = EditorState::new(Document::from_paragraphs(&["ab"]));
        let mut tr = state.tr();
        tr.step(insert(1, "x")).unwrap();
        tr.step(insert(4, "y")).unwrap();

        assert_eq!(tr.steps().len(), 2);
        assert_eq!(tr.docs()[0], *state.doc());
        assert_eq!(tr.docs()[1].block_texts(), vec!["xab"]);
        assert_eq!(tr.doc_after(0).block_texts(), vec!["xab"]);
        assert_eq!(tr.doc().block_texts(), vec!["xaby"]);
    }

    #[test]
    fn test_failed_step_leaves_transaction_unchanged() {
        let state = EditorState::new(Document::from_paragraphs(&["ab"]));
        let mut tr = state.tr();
        assert!(tr.step(insert(0, "x")).is_err());
        assert!(!tr.doc_changed());
        assert_eq!(tr.doc(), state.doc());
    }

    #[test]
    fn test_selection_maps_and_clamps() {
        let state = EditorState::new(Document::from_paragraphs(&["ab"]));
        let mut tr = state.tr();
        tr.set_selection(Selection::caret(2));
        tr.step(insert(1, "xy")).unwrap();
        assert_eq!(tr.selection(), Selection::caret(4));

        let next = state.apply(&tr);
        assert_eq!(next.selection(), Selection::caret(4));
        assert_eq!(Selection::new(9, 1).clamp(next.doc()), Selection::new(6, 1));
        assert_eq!(Selection::new(9, 1).from(), 1);
    }
}
