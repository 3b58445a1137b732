//! Property-based tests for the step translator
//!
//! These tests verify the invariants the rebase engine relies on:
//!  - Parity: the outline tracks the document after every translated edit
//!  - Exact undo: reverting a run of edits restores the original position set

use proptest::prelude::*;
use serde_json::json;
use weft_core::{Formatting, Order, Outline};
use weft_doc::{commands, Document, EditorState, Marks, NodeHead, Transaction};
use weft_sync::{ReplicaConfigBuilder, ReplicaContext, Translator};

// ============================================================================
// Strategies
// ============================================================================

/// An edit with its position given as a fraction of the document size.
#[derive(Clone, Debug)]
struct Edit {
    kind: u8,
    at: f64,
    len: usize,
}

fn edit_strategy() -> impl Strategy<Value = Edit> {
    (0u8..9, 0.0f64..1.0, 1usize..5).prop_map(|(kind, at, len)| Edit { kind, at, len })
}

impl Edit {
    fn build(&self, state: &EditorState) -> Option<Transaction> {
        let size = state.doc().content_size();
        let pos = ((size as f64) * self.at) as usize;
        let to = (pos + self.len).min(size);
        let result = match self.kind {
            0 | 1 => commands::insert_text(state, pos, &"x".repeat(self.len), &Marks::new()),
            2 => commands::delete_range(state, pos, to),
            3 => commands::split_block(state, pos),
            4 => commands::join_blocks(state, pos),
            5 => commands::add_mark(state, pos, to, "bold", json!(true)),
            6 => commands::wrap_in_list(state, pos, to, false),
            7 => commands::lift_list_item(state, pos),
            _ => commands::set_block_type(state, pos, NodeHead::new("heading")),
        };
        result.ok().filter(|tr| tr.doc_changed())
    }
}

// ============================================================================
// Undo properties
// ============================================================================

proptest! {
    #[test]
    fn prop_undo_restores_position_set(edits in prop::collection::vec(edit_strategy(), 1..12)) {
        let doc = Document::from_paragraphs(&["Hello world", "abc"]);
        let mut outline = Outline::with_initial(Order::new("a"), doc.structural_size()).unwrap();
        let mut formatting = Formatting::new();
        let mut ctx = ReplicaContext::new("a");
        let config = ReplicaConfigBuilder::new().client_id("a").build();
        let initial = outline.positions().to_vec();

        let mut state = EditorState::new(doc.clone());
        let mut undos = Vec::new();
        for edit in &edits {
            let Some(tr) = edit.build(&state) else { continue };
            let (_, undo) = Translator::new(&mut outline, &mut formatting, &mut ctx, &config)
                .translate(&tr)
                .unwrap();
            prop_assert_eq!(outline.len(), tr.doc().structural_size());
            state = state.apply(&tr);
            undos.push(undo);
        }

        let mut revert = state.tr();
        for undo in undos.iter().rev() {
            undo.apply(&mut revert, &mut outline, &mut formatting).unwrap();
        }
        prop_assert_eq!(outline.positions(), initial.as_slice());
        prop_assert_eq!(revert.doc(), &doc);
        prop_assert!(formatting.marks().is_empty());
    }
}
