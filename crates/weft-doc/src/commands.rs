//! Helpers that build common editing transactions.
//!
//! Each command starts a transaction on the given state, adds its steps and
//! returns it ready to dispatch. A command that cannot apply returns the
//! step error and no transaction.

use crate::error::{Result, StepError};
use crate::node::{Marks, NodeHead, Slice, Token};
use crate::step::Step;
use crate::transaction::{EditorState, Selection, Transaction};
use serde_json::Value;

/// Insert `text` with `marks` at `pos`, leaving the caret after it.
pub fn insert_text(state: &EditorState, pos: usize, text: &str, marks: &Marks) -> Result<Transaction> {
    let mut tr = state.tr();
    tr.step(Step::Replace {
        from: pos,
        to: pos,
        slice: Slice::text(text, marks),
        structure: false,
    })?;
    tr.set_selection(Selection::caret(pos + text.chars().count()));
    Ok(tr)
}

pub fn delete_range(state: &EditorState, from: usize, to: usize) -> Result<Transaction> {
    let mut tr = state.tr();
    tr.step(Step::Replace {
        from,
        to,
        slice: Slice::empty(),
        structure: false,
    })?;
    tr.set_selection(Selection::caret(from));
    Ok(tr)
}

/// Split the text block containing `pos` into two blocks of the same type.
pub fn split_block(state: &EditorState, pos: usize) -> Result<Transaction> {
    let doc = state.doc();
    let open = doc.enclosing_open(pos).ok_or(StepError::NotANode(pos))?;
    let head = doc.tokens[open].head().cloned().ok_or(StepError::NotANode(open))?;
    let mut tr = state.tr();
    tr.step(Step::Replace {
        from: pos,
        to: pos,
        slice: Slice::new(vec![Token::Close, Token::Open(head)]),
        structure: false,
    })?;
    tr.set_selection(Selection::caret(pos + 2));
    Ok(tr)
}

/// Join the block ending at `pos` with the block starting there.
pub fn join_blocks(state: &EditorState, pos: usize) -> Result<Transaction> {
    let doc = state.doc();
    let joinable = pos > 0
        && matches!(doc.tokens.get(pos - 1), Some(Token::Close))
        && matches!(doc.tokens.get(pos), Some(Token::Open(_)));
    if !joinable {
        return Err(StepError::Schema(format!("no block boundary at {pos}")));
    }
    let mut tr = state.tr();
    tr.step(Step::Replace {
        from: pos - 1,
        to: pos + 1,
        slice: Slice::empty(),
        structure: true,
    })?;
    tr.set_selection(Selection::caret(pos - 1));
    Ok(tr)
}

/// Change the type of the block whose opening token is at `pos`.
pub fn set_block_type(state: &EditorState, pos: usize, head: NodeHead) -> Result<Transaction> {
    let close = state.doc().matching_close(pos).ok_or(StepError::NotANode(pos))?;
    let mut tr = state.tr();
    tr.step(Step::ReplaceAround {
        from: pos,
        to: close + 1,
        gap_from: pos + 1,
        gap_to: close,
        slice: Slice::new(vec![Token::Open(head), Token::Close]),
        insert: 1,
        structure: true,
    })?;
    Ok(tr)
}

/// Wrap the blocks in `from..to` (block boundaries) into a single list item.
pub fn wrap_in_list(state: &EditorState, from: usize, to: usize, ordered: bool) -> Result<Transaction> {
    let kind = if ordered { "ordered_list" } else { "bullet_list" };
    let mut tr = state.tr();
    tr.step(Step::ReplaceAround {
        from,
        to,
        gap_from: from,
        gap_to: to,
        slice: Slice::new(vec![
            Token::Open(NodeHead::new(kind)),
            Token::Open(NodeHead::new("list_item")),
            Token::Close,
            Token::Close,
        ]),
        insert: 2,
        structure: true,
    })?;
    Ok(tr)
}

/// Unwrap the single-item list whose opening token is at `pos`.
pub fn lift_list_item(state: &EditorState, pos: usize) -> Result<Transaction> {
    let doc = state.doc();
    let close = doc.matching_close(pos).ok_or(StepError::NotANode(pos))?;
    let item_close = doc.matching_close(pos + 1).ok_or(StepError::NotANode(pos + 1))?;
    if item_close + 1 != close {
        return Err(StepError::Schema("list has more than one item".into()));
    }
    let mut tr = state.tr();
    tr.step(Step::ReplaceAround {
        from: pos,
        to: close + 1,
        gap_from: pos + 2,
        gap_to: item_close,
        slice: Slice::empty(),
        insert: 0,
        structure: true,
    })?;
    Ok(tr)
}

pub fn add_mark(state: &EditorState, from: usize, to: usize, key: &str, value: Value) -> Result<Transaction> {
    let mut tr = state.tr();
    tr.step(Step::AddMark {
        from,
        to,
        key: key.to_string(),
        value,
    })?;
    Ok(tr)
}

pub fn remove_mark(state: &EditorState, from: usize, to: usize, key: &str) -> Result<Transaction> {
    let mut tr = state.tr();
    tr.step(Step::RemoveMark {
        from,
        to,
        key: key.to_string(),
    })?;
    Ok(tr)
}

pub fn set_node_attr(state: &EditorState, pos: usize, attr: &str, value: Value) -> Result<Transaction> {
    let mut tr = state.tr();
    tr.step(Step::Attr {
        pos,
        attr: attr.to_string(),
        value,
    })?;
    Ok(tr)
}

pub fn set_doc_attr(state: &EditorState, attr: &str, value: Value) -> Result<Transaction> {
    let mut tr = state.tr();
    tr.step(Step::DocAttr {
        attr: attr.to_string(),
        value,
    })?;
    Ok(tr)
}

pub fn add_node_mark(state: &EditorState, pos: usize, key: &str, value: Value) -> Result<Transaction> {
    let mut tr = state.tr();
    tr.step(Step::AddNodeMark {
        pos,
        key: key.to_string(),
        value,
    })?;
    Ok(tr)
}

pub fn remove_node_mark(state: &EditorState, pos: usize, key: &str) -> Result<Transaction> {
    let mut tr = state.tr();
    tr.step(Step::RemoveNodeMark {
        pos,
        key: key.to_string(),
    })?;
    Ok(tr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Document;
    use serde_json::json;

    fn state(paragraphs: &[&str]) -> EditorState {
        EditorState::new(Document::from_paragraphs(paragraphs))
    }

    #[test]
    fn test_insert_and_delete() {
        let s = state(&["Hello"]);
        let tr = insert_text(&s, 6, "!", &Marks::new()).unwrap();
        assert_eq!(tr.doc().block_texts(), vec!["Hello!"]);
        assert_eq!(tr.selection(), Selection::caret(7));

        let s = s.apply(&tr);
        let tr = delete_range(&s, 1, 3).unwrap();
        assert_eq!(tr.doc().block_texts(), vec!["llo!"]);
    }

    #[test]
    fn test_split_then_join() {
        let s = state(&["abcd"]);
        let tr = split_block(&s, 3).unwrap();
        assert_eq!(tr.doc().block_texts(), vec!["ab", "cd"]);

        let s = s.apply(&tr);
        let tr = join_blocks(&s, 4).unwrap();
        assert_eq!(tr.doc().block_texts(), vec!["abcd"]);
        assert!(join_blocks(&s, 2).is_err());
    }

    #[test]
    fn test_set_block_type() {
        let s = state(&["ab", "cd"]);
        let tr = set_block_type(&s, 4, NodeHead::new("heading").with_attr("level", json!(2))).unwrap();
        let kinds: Vec<_> = tr
            .doc()
            .tokens
            .iter()
            .filter_map(|t| match t {
                Token::Open(h) => Some(h.kind.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(kinds, vec!["paragraph", "heading"]);
    }

    #[test]
    fn test_wrap_and_lift() {
        let s = state(&["ab", "cd"]);
        let tr = wrap_in_list(&s, 0, 8, false).unwrap();
        assert_eq!(tr.doc().content_size(), 12);

        let s = s.apply(&tr);
        let tr = lift_list_item(&s, 0).unwrap();
        assert_eq!(tr.doc(), &Document::from_paragraphs(&["ab", "cd"]));
    }

    #[test]
    fn test_wrap_requires_leading_paragraph() {
        let s = state(&["ab"]);
        let s = s.apply(&set_block_type(&s, 0, NodeHead::new("code_block")).unwrap());
        assert!(wrap_in_list(&s, 0, 4, true).is_err());
    }

    #[test]
    fn test_mark_and_attr_commands() {
        let s = state(&["abc"]);
        let tr = add_mark(&s, 1, 3, "italic", json!(true)).unwrap();
        let s = s.apply(&tr);
        assert_eq!(s.doc().marks_at(2).and_then(|m| m.get("italic")), Some(&json!(true)));

        let s = s.apply(&remove_mark(&s, 1, 4, "italic").unwrap());
        assert!(s.doc().marks_at(2).map_or(false, |m| m.is_empty()));

        let s = s.apply(&set_node_attr(&s, 0, "align", json!("right")).unwrap());
        let s = s.apply(&set_doc_attr(&s, "title", json!("Doc")).unwrap());
        let s = s.apply(&add_node_mark(&s, 0, "comment", json!("c")).unwrap());
        let head = s.doc().tokens[0].head().unwrap();
        assert_eq!(head.attrs.get("align"), Some(&json!("right")));
        assert_eq!(head.marks.get("comment"), Some(&json!("c")));
        assert_eq!(s.doc().attrs.get("title"), Some(&json!("Doc")));

        let s = s.apply(&remove_node_mark(&s, 0, "comment").unwrap());
        assert!(s.doc().tokens[0].head().unwrap().marks.is_empty());
    }
}
