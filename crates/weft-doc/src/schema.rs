//! Node schema and content validation.
//!
//! Validation walks the token stream with a stack of open nodes and checks
//! each child against its parent's content rule. A step whose result fails
//! validation is rejected, which is how concurrent restructuring ends up as
//! a skipped step instead of a corrupt document.

use crate::error::{Result, StepError};
use crate::node::{Document, Token};
use std::collections::HashMap;

/// Where a node may appear.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Group {
    Block,
    Inline,
    /// Only inside a specific parent (list items).
    ListItem,
}

/// What a node may contain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Content {
    /// No content; the node is a leaf.
    Empty,
    /// `inline*`
    Inline,
    /// `text*`, no inline leaves.
    Text,
    /// `block+`
    Blocks,
    /// `list_item+`
    ListItems,
    /// `paragraph block*`
    ListItemBody,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeSpec {
    pub group: Group,
    pub content: Content,
}

#[derive(Clone, Debug)]
pub struct Schema {
    nodes: HashMap<String, NodeSpec>,
    top: Content,
}

struct Frame<'a> {
    kind: &'a str,
    content: Content,
    children: usize,
}

impl Schema {
    pub fn new(top: Content) -> Self {
        Self {
            nodes: HashMap::new(),
            top,
        }
    }

    pub fn with_node(mut self, name: impl Into<String>, group: Group, content: Content) -> Self {
        self.nodes.insert(name.into(), NodeSpec { group, content });
        self
    }

    /// Paragraphs, headings, quotes, code, rules, lists, images and breaks.
    pub fn basic() -> Self {
        Self::new(Content::Blocks)
            .with_node("paragraph", Group::Block, Content::Inline)
            .with_node("heading", Group::Block, Content::Inline)
            .with_node("blockquote", Group::Block, Content::Blocks)
            .with_node("code_block", Group::Block, Content::Text)
            .with_node("horizontal_rule", Group::Block, Content::Empty)
            .with_node("bullet_list", Group::Block, Content::ListItems)
            .with_node("ordered_list", Group::Block, Content::ListItems)
            .with_node("list_item", Group::ListItem, Content::ListItemBody)
            .with_node("image", Group::Inline, Content::Empty)
            .with_node("hard_break", Group::Inline, Content::Empty)
    }

    pub fn spec(&self, kind: &str) -> Option<&NodeSpec> {
        self.nodes.get(kind)
    }

    fn spec_or_err(&self, kind: &str) -> Result<&NodeSpec> {
        self.spec(kind)
            .ok_or_else(|| StepError::Schema(format!("unknown node type {kind}")))
    }

    /// Check that `child` may be the `index`-th child of a node with `content`.
    fn allows(content: Content, index: usize, child: Option<(&str, &NodeSpec)>) -> bool {
        match (content, child) {
            (Content::Empty, _) => false,
            (Content::Inline, None) | (Content::Text, None) => true,
            (Content::Inline, Some((_, spec))) => spec.group == Group::Inline,
            (Content::Text, Some(_)) => false,
            (Content::Blocks, Some((_, spec))) => spec.group == Group::Block,
            (Content::ListItems, Some((_, spec))) => spec.group == Group::ListItem,
            (Content::ListItemBody, Some((kind, _))) if index == 0 => kind == "paragraph",
            (Content::ListItemBody, Some((_, spec))) => spec.group == Group::Block,
            (_, None) => false,
        }
    }

    fn min_children(content: Content) -> usize {
        match content {
            Content::Blocks | Content::ListItems | Content::ListItemBody => 1,
            _ => 0,
        }
    }

    fn enter_child(&self, parent: &mut Frame<'_>, child: Option<(&str, &NodeSpec)>) -> Result<()> {
        if !Self::allows(parent.content, parent.children, child) {
            let what = child.map_or("text", |(kind, _)| kind);
            return Err(StepError::Schema(format!(
                "{what} not allowed as child {} of {}",
                parent.children, parent.kind
            )));
        }
        parent.children += 1;
        Ok(())
    }

    fn close(frame: &Frame<'_>) -> Result<()> {
        if frame.children < Self::min_children(frame.content) {
            return Err(StepError::Schema(format!("{} must not be empty", frame.kind)));
        }
        Ok(())
    }

    /// Validate a whole document: balanced boundaries and every content rule.
    pub fn validate(&self, doc: &Document) -> Result<()> {
        let mut stack = vec![Frame {
            kind: "doc",
            content: self.top,
            children: 0,
        }];
        for token in &doc.tokens {
            let parent = stack
                .last_mut()
                .ok_or_else(|| StepError::Schema("content after document end".into()))?;
            match token {
                Token::Open(head) => {
                    let spec = self.spec_or_err(&head.kind)?;
                    if spec.content == Content::Empty {
                        return Err(StepError::Schema(format!("{} cannot be opened", head.kind)));
                    }
                    self.enter_child(parent, Some((&head.kind, spec)))?;
                    stack.push(Frame {
                        kind: &head.kind,
                        content: spec.content,
                        children: 0,
                    });
                }
                Token::Leaf(head) => {
                    let spec = self.spec_or_err(&head.kind)?;
                    if spec.content != Content::Empty {
                        return Err(StepError::Schema(format!("{} is not a leaf", head.kind)));
                    }
                    self.enter_child(parent, Some((&head.kind, spec)))?;
                }
                Token::Text { .. } => self.enter_child(parent, None)?,
                Token::Close => {
                    if stack.len() == 1 {
                        return Err(StepError::Schema("unbalanced close".into()));
                    }
                    if let Some(frame) = stack.pop() {
                        Self::close(&frame)?;
                    }
                }
            }
        }
        match stack.as_slice() {
            [root] => Self::close(root),
            _ => Err(StepError::Schema("unclosed node".into())),
        }
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self::basic()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeHead;

    fn open(kind: &str) -> Token {
        Token::Open(NodeHead::new(kind))
    }

    #[test]
    fn test_paragraphs_are_valid() {
        let schema = Schema::basic();
        assert!(schema.validate(&Document::from_paragraphs(&["a", ""])).is_ok());
    }

    #[test]
    fn test_empty_document_rejected() {
        let schema = Schema::basic();
        assert!(schema.validate(&Document::new(vec![])).is_err());
    }

    #[test]
    fn test_text_at_top_level_rejected() {
        let schema = Schema::basic();
        let doc = Document::new(vec![Token::text('x')]);
        assert!(matches!(schema.validate(&doc), Err(StepError::Schema(_))));
    }

    #[test]
    fn test_unbalanced_rejected() {
        let schema = Schema::basic();
        let doc = Document::new(vec![open("paragraph")]);
        assert!(schema.validate(&doc).is_err());
        let doc = Document::new(vec![open("paragraph"), Token::Close, Token::Close]);
        assert!(schema.validate(&doc).is_err());
    }

    #[test]
    fn test_list_item_must_start_with_paragraph() {
        let schema = Schema::basic();
        let good = Document::new(vec![
            open("bullet_list"),
            open("list_item"),
            open("paragraph"),
            Token::text('a'),
            Token::Close,
            Token::Close,
            Token::Close,
        ]);
        assert!(schema.validate(&good).is_ok());

        let bad = Document::new(vec![
            open("bullet_list"),
            open("list_item"),
            open("blockquote"),
            open("paragraph"),
            Token::Close,
            Token::Close,
            Token::Close,
            Token::Close,
        ]);
        assert!(schema.validate(&bad).is_err());

        let empty_list = Document::new(vec![open("bullet_list"), Token::Close]);
        assert!(schema.validate(&empty_list).is_err());
    }

    #[test]
    fn test_leaves() {
        let schema = Schema::basic();
        let doc = Document::new(vec![
            open("paragraph"),
            Token::Leaf(NodeHead::new("image")),
            Token::Close,
            Token::Leaf(NodeHead::new("horizontal_rule")),
            open("paragraph"),
            Token::Close,
        ]);
        assert!(schema.validate(&doc).is_ok());

        let bad = Document::new(vec![open("code_block"), Token::Leaf(NodeHead::new("hard_break")), Token::Close]);
        assert!(schema.validate(&bad).is_err());
    }
}
