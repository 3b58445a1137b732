//! High-level client: one replica connected to a relay.

use crate::error::{Result, SdkError};
use crate::network::{NetworkTransport, PeerId};
use crate::outbox::Outbox;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use weft_doc::{commands, Document, EditorState, Transaction};
use weft_sync::{Message, Mutation, Replica, ReplicaConfig};

/// Configuration for a [`Client`].
#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub replica: ReplicaConfig,
    /// Capacity of the [`DocEvent`] broadcast channel.
    pub event_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            replica: ReplicaConfig::default(),
            event_capacity: 100,
        }
    }
}

/// Builder for client configuration.
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
        }
    }

    pub fn client_id(mut self, id: impl Into<String>) -> Self {
        self.config.replica.client_id = id.into();
        self
    }

    pub fn replica(mut self, replica: ReplicaConfig) -> Self {
        self.config.replica = replica;
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.config.event_capacity = capacity;
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}

impl Default for ClientConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Changes to a client's document.
#[derive(Clone, Debug, PartialEq)]
pub enum DocEvent {
    /// A local edit was applied and queued for sending.
    LocalChange { client_counter: u64 },
    /// Remote mutations were applied, with pending edits rebased on top.
    RemoteUpdate { client_id: String, client_counter: u64 },
    /// The relay echoed one of our own mutations.
    Confirmed { client_counter: u64 },
    /// Syncing stopped on a fatal error: a rejected remote batch or a failed send.
    Failed(SdkError),
}

/// A replica kept in sync with a relay.
///
/// # Example
///
/// ```rust
/// use weft_doc::{commands, Document, Marks};
/// use weft_sdk::{Client, ClientConfigBuilder, PeerId, Relay};
///
/// # tokio_test::block_on(async {
/// let relay = Relay::new(Document::from_paragraphs(&["Hello"])).unwrap();
/// let transport = relay.connect(PeerId::new("alice")).unwrap();
/// let config = ClientConfigBuilder::new().client_id("alice").build();
/// let client = Client::connect(config, transport).await.unwrap();
///
/// client
///     .edit(|state| commands::insert_text(state, 6, "!", &Marks::new()))
///     .unwrap();
/// assert_eq!(client.doc().text_content(), "Hello!");
/// # });
/// ```
pub struct Client<T: NetworkTransport> {
    transport: Arc<T>,
    replica: Arc<Mutex<Replica>>,
    outbox: Outbox,
    events: broadcast::Sender<DocEvent>,
    receiver: JoinHandle<()>,
}

impl<T: NetworkTransport> Client<T> {
    /// Wait for the relay's welcome, then start syncing.
    pub async fn connect(config: ClientConfig, transport: T) -> Result<Self> {
        let transport = Arc::new(transport);
        let welcome = match transport.recv().await {
            Some(Ok(Message::Welcome(welcome))) => welcome,
            Some(Ok(Message::Mutation(_))) => {
                return Err(SdkError::Protocol("expected a welcome message first".into()));
            }
            Some(Err(err)) => return Err(err),
            None => return Err(SdkError::Disconnected),
        };

        let replica = Replica::from_welcome(config.replica, &welcome)?;
        debug!(client_id = %replica.client_id(), peer = %transport.local_id(), "Connected to relay");

        let client_id = replica.client_id().to_string();
        let replica = Arc::new(Mutex::new(replica));
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let receiver = tokio::spawn(receive_loop(
            Arc::clone(&transport),
            Arc::clone(&replica),
            client_id,
            events.clone(),
        ));
        let outbox = Outbox::spawn(Arc::clone(&transport), events.clone());

        Ok(Self {
            transport,
            replica,
            outbox,
            events,
            receiver,
        })
    }

    /// Apply a local edit built from the current state and queue it for the relay.
    ///
    /// Returns the mutation, or `None` when the transaction changed nothing.
    pub fn edit<F>(&self, f: F) -> Result<Option<Mutation>>
    where
        F: FnOnce(&EditorState) -> weft_doc::Result<Transaction>,
    {
        self.edit_with(|replica| Ok(f(replica.state())?))
    }

    /// Type `text` at `pos` with the marks the formatting store gives that
    /// spot, so the new characters pick up bold or links by their expand rules.
    pub fn insert_text(&self, pos: usize, text: &str) -> Result<Option<Mutation>> {
        self.edit_with(|replica| {
            let marks = replica.stored_marks(pos)?;
            Ok(commands::insert_text(replica.state(), pos, text, &marks)?)
        })
    }

    fn edit_with<F>(&self, f: F) -> Result<Option<Mutation>>
    where
        F: FnOnce(&Replica) -> Result<Transaction>,
    {
        // A stopped outbox would leave the edit applied locally but never sent.
        if self.outbox.is_closed() {
            return Err(SdkError::Disconnected);
        }
        let mut replica = self.replica.lock();
        let tr = f(&replica)?;
        let Some(mutation) = replica.dispatch(tr)? else {
            return Ok(None);
        };
        // Enqueued under the lock, so the outbox sees counters in order.
        self.outbox.enqueue(mutation.clone())?;
        drop(replica);

        let _ = self.events.send(DocEvent::LocalChange {
            client_counter: mutation.client_counter,
        });
        Ok(Some(mutation))
    }

    pub fn client_id(&self) -> String {
        self.replica.lock().client_id().to_string()
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    pub fn doc(&self) -> Document {
        self.replica.lock().doc().clone()
    }

    pub fn state(&self) -> EditorState {
        self.replica.lock().state().clone()
    }

    pub fn pending_len(&self) -> usize {
        self.replica.lock().pending_len()
    }

    /// Run `f` with read access to the replica.
    pub fn with_replica<R>(&self, f: impl FnOnce(&Replica) -> R) -> R {
        f(&self.replica.lock())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DocEvent> {
        self.events.subscribe()
    }

    /// Whether the receive loop is still running.
    pub fn is_connected(&self) -> bool {
        !self.receiver.is_finished()
    }

    /// Stop sending and receiving.
    pub fn disconnect(&self) {
        self.outbox.close();
        self.receiver.abort();
    }
}

impl<T: NetworkTransport> Drop for Client<T> {
    fn drop(&mut self) {
        self.receiver.abort();
    }
}

/// Receive frames until the connection closes. Frames that are already
/// queued behind the first one are applied as a single batch.
async fn receive_loop<T: NetworkTransport>(
    transport: Arc<T>,
    replica: Arc<Mutex<Replica>>,
    client_id: String,
    events: broadcast::Sender<DocEvent>,
) {
    while let Some(message) = transport.recv().await {
        let mut batch = Vec::new();
        batch.extend(frame_mutation(transport.local_id(), message));
        while let Some(message) = transport.try_recv() {
            batch.extend(frame_mutation(transport.local_id(), message));
        }
        if batch.is_empty() {
            continue;
        }

        let result = replica.lock().receive(&batch);
        if let Err(err) = result {
            error!(peer = %transport.local_id(), error = %err, "Stopping receive loop");
            let _ = events.send(DocEvent::Failed(err.into()));
            return;
        }
        debug!(peer = %transport.local_id(), batch = batch.len(), "Applied remote batch");
        for mutation in batch {
            let event = if mutation.client_id == client_id {
                DocEvent::Confirmed {
                    client_counter: mutation.client_counter,
                }
            } else {
                DocEvent::RemoteUpdate {
                    client_id: mutation.client_id,
                    client_counter: mutation.client_counter,
                }
            };
            let _ = events.send(event);
        }
    }
    debug!(peer = %transport.local_id(), "Relay connection closed");
}

fn frame_mutation(peer: &PeerId, message: Result<Message>) -> Option<Mutation> {
    match message {
        Ok(Message::Mutation(msg)) => Some(msg.mutation),
        Ok(Message::Welcome(_)) => {
            warn!(%peer, "Ignoring welcome after connect");
            None
        }
        Err(err) => {
            warn!(%peer, error = %err, "Dropping undecodable frame");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_sync::ReplicaConfigBuilder;

    #[test]
    fn test_config_builder() {
        let config = ClientConfigBuilder::new()
            .client_id("bob")
            .event_capacity(8)
            .replica(ReplicaConfigBuilder::new().client_id("carol").check_parity(false).build())
            .build();

        assert_eq!(config.replica.client_id, "carol");
        assert!(!config.replica.check_parity);
        assert_eq!(config.event_capacity, 8);
    }

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.event_capacity, 100);
        assert!(config.replica.check_parity);
    }
}
