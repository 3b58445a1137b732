//! weft SDK - relay, transport and client glue for collaborative editing
//!
//! This SDK connects [`weft_sync::Replica`]s through a central relay that
//! stores mutations in receipt order and echoes them to everyone.
//!
//! # Quick Start
//!
//! ```rust
//! use weft_doc::{commands, Document, Marks};
//! use weft_sdk::{Client, ClientConfigBuilder, PeerId, Relay};
//!
//! # tokio_test::block_on(async {
//! // A relay hosting one document
//! let relay = Relay::new(Document::from_paragraphs(&["Hello world."])).unwrap();
//!
//! // Clients join from the relay's welcome message
//! let alice = Client::connect(
//!     ClientConfigBuilder::new().client_id("alice").build(),
//!     relay.connect(PeerId::new("alice")).unwrap(),
//! )
//! .await
//! .unwrap();
//!
//! // Local edits apply immediately and are sent in the background
//! alice
//!     .edit(|state| commands::insert_text(state, 1, ">> ", &Marks::new()))
//!     .unwrap();
//! # });
//! ```
//!
//! # Architecture
//!
//! - [`client`] - A replica plus its receive loop and outbox
//! - [`relay`] - In-process relay with the append-only mutation log
//! - [`outbox`] - Outgoing queue with a single send in flight
//! - [`network`] - Transport abstraction and the in-memory transport
//! - [`error`] - Error types

pub mod client;
pub mod error;
pub mod network;
pub mod outbox;
pub mod relay;

// Re-exports for convenience
pub use client::{Client, ClientConfig, ClientConfigBuilder, DocEvent};
pub use error::{Result, SdkError};
pub use network::{MemoryTransport, NetworkTransport, PeerId};
pub use outbox::Outbox;
pub use relay::{MutationLog, Relay, RELAY_CLIENT_ID};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::client::{Client, ClientConfig, DocEvent};
    pub use crate::error::SdkError;
    pub use crate::network::{NetworkTransport, PeerId};
    pub use crate::relay::Relay;
    pub use weft_doc::{commands, Document, EditorState, Marks};
    pub use weft_sync::{Replica, ReplicaConfig};
}
