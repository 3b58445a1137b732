//! In-process relay: stores mutations in receipt order and echoes them.
//!
//! The relay performs no conflict arbitration. It appends every new mutation
//! to its log, applies it to a server-side [`Replica`] used only to build
//! welcome messages, and forwards it to every connection, the origin
//! included. The echo is how a client learns its mutation was confirmed.

use crate::error::{Result, SdkError};
use crate::network::{MemoryTransport, PeerId};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error};
use weft_doc::Document;
use weft_sync::{Message, Mutation, MutationId, Replica, ReplicaConfigBuilder, WelcomeMessage};

/// Client id of the relay's own replica. It never dispatches.
pub const RELAY_CLIENT_ID: &str = "relay";

/// Append-only log of confirmed mutations keyed by `(client_id, client_counter)`.
#[derive(Clone, Debug, Default)]
pub struct MutationLog {
    entries: Vec<Mutation>,
    ids: HashSet<MutationId>,
}

impl MutationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `mutation` unless its id is already logged. Returns whether it was new.
    pub fn append(&mut self, mutation: Mutation) -> bool {
        if !self.ids.insert(mutation.id()) {
            return false;
        }
        self.entries.push(mutation);
        true
    }

    pub fn contains(&self, id: &MutationId) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Mutation] {
        &self.entries
    }
}

struct RelayState {
    log: MutationLog,
    server: Replica,
    connections: HashMap<PeerId, mpsc::UnboundedSender<String>>,
}

/// A shared handle to one relay.
#[derive(Clone)]
pub struct Relay {
    state: Arc<Mutex<RelayState>>,
}

impl Relay {
    /// Start a relay hosting `doc`.
    pub fn new(doc: Document) -> Result<Self> {
        let config = ReplicaConfigBuilder::new().client_id(RELAY_CLIENT_ID).build();
        let server = Replica::new(config, doc)?;
        Ok(Self {
            state: Arc::new(Mutex::new(RelayState {
                log: MutationLog::new(),
                server,
                connections: HashMap::new(),
            })),
        })
    }

    /// Open a connection. Its first frame is the welcome message.
    pub fn connect(&self, peer_id: PeerId) -> Result<MemoryTransport> {
        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut state = self.state.lock();
            let frame = Message::Welcome(state.server.snapshot()?).to_json()?;
            tx.send(frame).map_err(|_| SdkError::Disconnected)?;
            state.connections.insert(peer_id.clone(), tx);
            debug!(peer = %peer_id, log_len = state.log.len(), "Sent welcome");
        }
        Ok(MemoryTransport::new(peer_id, self.clone(), rx))
    }

    pub fn disconnect(&self, peer_id: &PeerId) {
        if self.state.lock().connections.remove(peer_id).is_some() {
            debug!(peer = %peer_id, "Peer disconnected");
        }
    }

    /// Handle one frame from `from`.
    pub fn submit(&self, from: &PeerId, frame: &str) -> Result<()> {
        let mutation = match Message::from_json(frame)? {
            Message::Mutation(msg) => msg.mutation,
            Message::Welcome(_) => {
                return Err(SdkError::Protocol(format!("{from} sent a welcome message")));
            }
        };

        let mut state = self.state.lock();
        if !state.log.append(mutation.clone()) {
            debug!(
                client_id = %mutation.client_id,
                client_counter = mutation.client_counter,
                "Ignoring duplicate mutation"
            );
            return Ok(());
        }
        if let Err(err) = state.server.receive(std::slice::from_ref(&mutation)) {
            error!(
                client_id = %mutation.client_id,
                client_counter = mutation.client_counter,
                error = %err,
                "Relay replica rejected mutation"
            );
        }

        // Echo to everyone, in log order; closed connections are dropped.
        state.connections.retain(|_, tx| tx.send(frame.to_string()).is_ok());
        debug!(
            from = %from,
            client_id = %mutation.client_id,
            client_counter = mutation.client_counter,
            log_len = state.log.len(),
            peers = state.connections.len(),
            "Relayed mutation"
        );
        Ok(())
    }

    /// A welcome message for the current log.
    pub fn welcome(&self) -> Result<WelcomeMessage> {
        Ok(self.state.lock().server.snapshot()?)
    }

    pub fn log(&self) -> MutationLog {
        self.state.lock().log.clone()
    }

    pub fn log_len(&self) -> usize {
        self.state.lock().log.len()
    }

    /// The document after every logged mutation.
    pub fn doc(&self) -> Document {
        self.state.lock().server.doc().clone()
    }

    pub fn peers(&self) -> Vec<PeerId> {
        let mut peers: Vec<PeerId> = self.state.lock().connections.keys().cloned().collect();
        peers.sort();
        peers
    }
}
