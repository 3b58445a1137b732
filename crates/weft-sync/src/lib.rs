//! # weft-sync
//!
//! Collaborative editing on top of a central relay, without OT transforms
//! or a full CRDT document.
//!
//! This crate provides:
//! - [`Translator`]: turns editor steps into position-referenced
//!   [`AnnotatedStep`]s and back
//! - [`Replica`]: the rebase engine that keeps local edits pending until the
//!   relay confirms them, replaying them over remote edits
//! - [`Message`]: the JSON wire format exchanged with the relay
//!
//! ## Example
//!
//! ```rust
//! use weft_doc::{commands, Document, Marks};
//! use weft_sync::{Replica, ReplicaConfigBuilder};
//!
//! let doc = Document::from_paragraphs(&["Hello world."]);
//! let mut alice = Replica::new(ReplicaConfigBuilder::new().client_id("alice").build(), doc.clone()).unwrap();
//! let mut bob = Replica::new(ReplicaConfigBuilder::new().client_id("bob").build(), doc).unwrap();
//!
//! let tr = commands::insert_text(alice.state(), 7, "X", &Marks::new()).unwrap();
//! let from_alice = alice.dispatch(tr).unwrap().unwrap();
//! let tr = commands::delete_range(bob.state(), 1, 7).unwrap();
//! let from_bob = bob.dispatch(tr).unwrap().unwrap();
//!
//! // The relay orders bob's edit first and echoes both to everyone.
//! let log = [from_bob, from_alice];
//! alice.receive(&log).unwrap();
//! bob.receive(&log).unwrap();
//!
//! assert_eq!(alice.doc().text_content(), "Xworld.");
//! assert_eq!(alice.doc(), bob.doc());
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod messages;
pub mod mutation;
pub mod replica;
pub mod translate;
pub mod undo;

pub use config::{ReplicaConfig, ReplicaConfigBuilder};
pub use context::ReplicaContext;
pub use error::{Result, SyncError};
pub use messages::{Message, MutationMessage, WelcomeMessage};
pub use mutation::{
    AnnotatedStep, DeletePositions, InsertPositions, MarkPayload, Mutation, MutationId, ReplacePositions,
};
pub use replica::{PendingMutation, Replica};
pub use translate::Translator;
pub use undo::{Undo, UndoEntry};
