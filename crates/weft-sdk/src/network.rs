//! Transport between a client and its relay.

use crate::error::{Result, SdkError};
use crate::relay::Relay;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use weft_sync::Message;

/// Unique identifier for a connection to the relay.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(pub String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn random() -> Self {
        Self(ulid::Ulid::new().to_string())
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A FIFO connection to the relay.
///
/// Messages sent on one connection reach the relay in order, and messages
/// from the relay arrive in the order it sent them. Nothing stronger is
/// assumed.
#[async_trait]
pub trait NetworkTransport: Send + Sync + 'static {
    fn local_id(&self) -> &PeerId;

    async fn send(&self, message: Message) -> Result<()>;

    /// The next message from the relay, or `None` once the connection closed.
    async fn recv(&self) -> Option<Result<Message>>;

    /// A message that has already arrived, without waiting.
    fn try_recv(&self) -> Option<Result<Message>> {
        None
    }
}

/// In-process transport to a [`Relay`]. Frames cross it as JSON.
pub struct MemoryTransport {
    local_id: PeerId,
    relay: Relay,
    inbox: Mutex<mpsc::UnboundedReceiver<String>>,
}

impl MemoryTransport {
    pub(crate) fn new(local_id: PeerId, relay: Relay, inbox: mpsc::UnboundedReceiver<String>) -> Self {
        Self {
            local_id,
            relay,
            inbox: Mutex::new(inbox),
        }
    }

    /// Drop this connection at the relay; pending frames are still readable.
    pub fn disconnect(&self) {
        self.relay.disconnect(&self.local_id);
    }
}

#[async_trait]
impl NetworkTransport for MemoryTransport {
    fn local_id(&self) -> &PeerId {
        &self.local_id
    }

    async fn send(&self, message: Message) -> Result<()> {
        let frame = message.to_json()?;
        self.relay.submit(&self.local_id, &frame)
    }

    async fn recv(&self) -> Option<Result<Message>> {
        let frame = self.inbox.lock().await.recv().await?;
        Some(Message::from_json(&frame).map_err(SdkError::from))
    }

    fn try_recv(&self) -> Option<Result<Message>> {
        let frame = self.inbox.try_lock().ok()?.try_recv().ok()?;
        Some(Message::from_json(&frame).map_err(SdkError::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_doc::Document;
    use weft_sync::{Mutation, MutationMessage};

    #[tokio::test]
    async fn test_first_frame_is_welcome() {
        let relay = Relay::new(Document::from_paragraphs(&["hi"])).unwrap();
        let transport = relay.connect(PeerId::new("peer-1")).unwrap();

        match transport.recv().await {
            Some(Ok(Message::Welcome(welcome))) => assert_eq!(welcome.doc.text_content(), "hi"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_send_is_echoed() {
        let relay = Relay::new(Document::from_paragraphs(&["hi"])).unwrap();
        let transport = relay.connect(PeerId::new("peer-1")).unwrap();
        transport.recv().await.unwrap().unwrap();

        let mutation = Mutation {
            client_id: "peer-1".into(),
            client_counter: 0,
            ann_steps: vec![],
        };
        transport
            .send(Message::Mutation(MutationMessage {
                mutation: mutation.clone(),
            }))
            .await
            .unwrap();

        match transport.recv().await {
            Some(Ok(Message::Mutation(msg))) => assert_eq!(msg.mutation, mutation),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_try_recv_drains_queued_frames() {
        let relay = Relay::new(Document::from_paragraphs(&["hi"])).unwrap();
        let transport = relay.connect(PeerId::new("peer-1")).unwrap();
        assert!(matches!(transport.try_recv(), Some(Ok(Message::Welcome(_)))));
        assert!(transport.try_recv().is_none());

        for counter in 0..3 {
            let mutation = Mutation {
                client_id: "peer-1".into(),
                client_counter: counter,
                ann_steps: vec![],
            };
            transport.send(Message::Mutation(MutationMessage { mutation })).await.unwrap();
        }
        let mut counters = Vec::new();
        while let Some(Ok(Message::Mutation(msg))) = transport.try_recv() {
            counters.push(msg.mutation.client_counter);
        }
        assert_eq!(counters, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_disconnect_closes_inbox() {
        let relay = Relay::new(Document::from_paragraphs(&["hi"])).unwrap();
        let transport = relay.connect(PeerId::new("peer-1")).unwrap();
        transport.disconnect();

        // The welcome was already queued.
        assert!(transport.recv().await.is_some());
        assert!(transport.recv().await.is_none());
    }
}
