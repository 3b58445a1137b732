//! # weft-core
//!
//! Position primitives for the weft sync core.
//!
//! This crate provides:
//! - [`Position`] and [`BunchMeta`]: immutable, globally comparable list slots
//! - [`Order`]: allocates dense positions and compares any two known ones
//! - [`Outline`]: the index <-> position mirror of a live document
//! - [`Formatting`]: last-writer-wins marks anchored on positions
//!
//! ## Example
//!
//! ```rust
//! use weft_core::{Bind, Order, Outline};
//!
//! let mut outline = Outline::with_initial(Order::new("alice"), 5).unwrap();
//! let cursor = outline.cursor_at(3, Bind::Left).unwrap();
//!
//! // Insert two slots before the cursor; it still resolves after them.
//! outline.insert_at(1, 2).unwrap();
//! assert_eq!(outline.index_of_cursor(&cursor, Bind::Left).unwrap(), 5);
//! ```

pub mod error;
pub mod formatting;
pub mod order;
pub mod outline;
pub mod position;

pub use error::{CoreError, Result};
pub use formatting::{
    compare_anchors, Anchor, Expand, ExpandRules, FormatChange, Formatting, FormattingSnapshot,
    KeyRule, Mark, MarkId,
};
pub use order::{Order, OrderSnapshot};
pub use outline::{Bind, Outline, OutlineSnapshot, PositionRun, SearchDir, INIT_BUNCH_ID};
pub use position::{BunchMeta, Position, ROOT_BUNCH_ID};
