//! Flat token representation of a structural document.
//!
//! A document is the token stream of its content: every node boundary,
//! character and leaf node is one token, so token indices are exactly the
//! editor's integer positions. The document node itself is implicit and
//! contributes the two extra units of [`Document::structural_size`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub type Attrs = BTreeMap<String, Value>;
pub type Marks = BTreeMap<String, Value>;

/// Type, attributes and node-level marks of a non-text node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeHead {
    pub kind: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: Attrs,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub marks: Marks,
}

impl NodeHead {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            attrs: Attrs::new(),
            marks: Marks::new(),
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attrs.insert(key.into(), value);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "camelCase")]
pub enum Token {
    /// Start of a container node.
    Open(NodeHead),
    /// End of the innermost open container.
    Close,
    /// One character of inline text.
    Text {
        ch: char,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        marks: Marks,
    },
    /// A node without content (image, hard break, horizontal rule).
    Leaf(NodeHead),
}

impl Token {
    pub fn text(ch: char) -> Self {
        Token::Text {
            ch,
            marks: Marks::new(),
        }
    }

    /// Whether removing this token would lose user content.
    pub fn is_content(&self) -> bool {
        matches!(self, Token::Text { .. } | Token::Leaf(_))
    }

    pub fn head(&self) -> Option<&NodeHead> {
        match self {
            Token::Open(head) | Token::Leaf(head) => Some(head),
            _ => None,
        }
    }

    pub fn head_mut(&mut self) -> Option<&mut NodeHead> {
        match self {
            Token::Open(head) | Token::Leaf(head) => Some(head),
            _ => None,
        }
    }
}

/// A run of tokens to insert. May be unbalanced ("open"), e.g. the
/// `Close, Open(paragraph)` pair that splits a paragraph.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Slice {
    pub content: Vec<Token>,
}

impl Slice {
    pub fn new(content: Vec<Token>) -> Self {
        Self { content }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn text(text: &str, marks: &Marks) -> Self {
        Self::new(
            text.chars()
                .map(|ch| Token::Text {
                    ch,
                    marks: marks.clone(),
                })
                .collect(),
        )
    }

    pub fn size(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: Attrs,
    pub tokens: Vec<Token>,
}

impl Document {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            attrs: Attrs::new(),
            tokens,
        }
    }

    /// A document with one paragraph per string.
    pub fn from_paragraphs<S: AsRef<str>>(paragraphs: &[S]) -> Self {
        let mut tokens = Vec::new();
        for text in paragraphs {
            tokens.push(Token::Open(NodeHead::new("paragraph")));
            tokens.extend(text.as_ref().chars().map(Token::text));
            tokens.push(Token::Close);
        }
        Self::new(tokens)
    }

    pub fn content_size(&self) -> usize {
        self.tokens.len()
    }

    /// Size including the implicit document node's own boundaries.
    pub fn structural_size(&self) -> usize {
        self.tokens.len() + 2
    }

    pub fn slice(&self, from: usize, to: usize) -> Slice {
        Slice::new(self.tokens[from.min(to)..to.min(self.tokens.len())].to_vec())
    }

    /// Index of the `Close` matching the `Open` at `open`.
    pub fn matching_close(&self, open: usize) -> Option<usize> {
        if !matches!(self.tokens.get(open), Some(Token::Open(_))) {
            return None;
        }
        let mut depth = 0usize;
        for (i, token) in self.tokens.iter().enumerate().skip(open) {
            match token {
                Token::Open(_) => depth += 1,
                Token::Close => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            }
        }
        None
    }

    /// Index of the `Open` of the innermost node containing position `pos`.
    pub fn enclosing_open(&self, pos: usize) -> Option<usize> {
        let mut depth = 0usize;
        for i in (0..pos.min(self.tokens.len())).rev() {
            match &self.tokens[i] {
                Token::Close => depth += 1,
                Token::Open(_) if depth == 0 => return Some(i),
                Token::Open(_) => depth -= 1,
                _ => {}
            }
        }
        None
    }

    /// All characters in document order.
    pub fn text_content(&self) -> String {
        self.tokens
            .iter()
            .filter_map(|t| match t {
                Token::Text { ch, .. } => Some(*ch),
                _ => None,
            })
            .collect()
    }

    /// Text of each node that directly contains text, in document order.
    pub fn block_texts(&self) -> Vec<String> {
        let mut blocks = Vec::new();
        let mut current: Option<String> = None;
        for token in &self.tokens {
            match token {
                Token::Open(_) => current = Some(String::new()),
                Token::Close => {
                    if let Some(text) = current.take() {
                        blocks.push(text);
                    }
                }
                Token::Text { ch, .. } => {
                    if let Some(text) = current.as_mut() {
                        text.push(*ch);
                    }
                }
                Token::Leaf(_) => {}
            }
        }
        blocks
    }

    /// Marks of the text character at `pos`, if it is one.
    pub fn marks_at(&self, pos: usize) -> Option<&Marks> {
        match self.tokens.get(pos)? {
            Token::Text { marks, .. } => Some(marks),
            Token::Leaf(head) => Some(&head.marks),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sizes() {
        let doc = Document::from_paragraphs(&["ab", "c"]);
        assert_eq!(doc.content_size(), 7);
        assert_eq!(doc.structural_size(), 9);
        assert_eq!(doc.block_texts(), vec!["ab", "c"]);
        assert_eq!(doc.text_content(), "abc");
    }

    #[test]
    fn test_matching_close_and_enclosing_open() {
        let doc = Document::from_paragraphs(&["ab", "c"]);
        assert_eq!(doc.matching_close(0), Some(3));
        assert_eq!(doc.matching_close(4), Some(6));
        assert_eq!(doc.matching_close(1), None);
        assert_eq!(doc.enclosing_open(2), Some(0));
        assert_eq!(doc.enclosing_open(5), Some(4));
        assert_eq!(doc.enclosing_open(4), None);
    }

    #[test]
    fn test_token_wire_format() {
        let token = Token::Open(NodeHead::new("heading").with_attr("level", json!(2)));
        let json = serde_json::to_string(&token).unwrap();
        assert_eq!(json, r#"{"t":"open","kind":"heading","attrs":{"level":2}}"#);
        let back: Token = serde_json::from_str(&json).unwrap();
        assert_eq!(back, token);

        let json = serde_json::to_string(&Token::text('x')).unwrap();
        assert_eq!(json, r#"{"t":"text","ch":"x"}"#);
    }
}
