//! # weft-doc
//!
//! The structural editor document that the weft sync core keeps in step
//! with its outline.
//!
//! This crate provides:
//! - A flat token model of a node tree ([`Document`], [`Token`], [`Slice`])
//! - A content [`Schema`] that rejects malformed documents
//! - Index-based [`Step`]s with `apply`, `invert` and `map`
//! - [`EditorState`] and [`Transaction`], plus [`commands`] for common edits
//!
//! ## Example
//!
//! ```rust
//! use weft_doc::{commands, Document, EditorState, Marks};
//!
//! let state = EditorState::new(Document::from_paragraphs(&["Hello"]));
//! let tr = commands::insert_text(&state, 6, " world", &Marks::new()).unwrap();
//! let state = state.apply(&tr);
//! assert_eq!(state.doc().block_texts(), vec!["Hello world"]);
//! ```

pub mod commands;
pub mod error;
pub mod node;
pub mod schema;
pub mod step;
pub mod transaction;

pub use error::{Result, StepError};
pub use node::{Attrs, Document, Marks, NodeHead, Slice, Token};
pub use schema::{Content, Group, NodeSpec, Schema};
pub use step::{Assoc, Step};
pub use transaction::{EditorState, Selection, Transaction};
