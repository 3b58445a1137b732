//! Outgoing mutation queue with a single send in flight.
//!
//! Local edits apply immediately, but their mutations must reach the relay in
//! `client_counter` order. The outbox task sends one mutation, waits for the
//! transport to finish, then takes the next.
//!
//! The relay cannot accept a counter after a gap, so the first failed send
//! stops the task and is reported as [`DocEvent::Failed`].

use crate::client::DocEvent;
use crate::error::{Result, SdkError};
use crate::network::NetworkTransport;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error};
use weft_sync::{Message, Mutation, MutationMessage};

pub struct Outbox {
    tx: mpsc::UnboundedSender<Mutation>,
    task: JoinHandle<()>,
}

impl Outbox {
    /// Spawn the send task on the current runtime.
    pub fn spawn<T: NetworkTransport>(transport: Arc<T>, events: broadcast::Sender<DocEvent>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Mutation>();
        let task = tokio::spawn(async move {
            while let Some(mutation) = rx.recv().await {
                let (client_id, client_counter) = (mutation.client_id.clone(), mutation.client_counter);
                match transport.send(Message::Mutation(MutationMessage { mutation })).await {
                    Ok(()) => debug!(%client_id, client_counter, "Sent mutation"),
                    Err(err) => {
                        error!(%client_id, client_counter, error = %err, "Failed to send mutation, stopping outbox");
                        let _ = events.send(DocEvent::Failed(err));
                        break;
                    }
                }
            }
        });
        Self { tx, task }
    }

    /// Queue a mutation. Never waits, so it can be called while the replica is locked.
    pub fn enqueue(&self, mutation: Mutation) -> Result<()> {
        self.tx.send(mutation).map_err(|_| SdkError::Disconnected)
    }

    /// Whether the send task has stopped and no longer accepts mutations.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Stop sending. Queued mutations that were not sent yet are dropped.
    pub fn close(&self) {
        self.task.abort();
    }
}

impl Drop for Outbox {
    fn drop(&mut self) {
        self.task.abort();
    }
}
