//! End-to-end tests: clients editing one document through a relay.

use futures::future::join_all;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use weft_doc::{commands, Document, Marks};
use weft_sdk::{Client, ClientConfigBuilder, DocEvent, MemoryTransport, PeerId, Relay};

async fn join(relay: &Relay, name: &str) -> Client<MemoryTransport> {
    let config = ClientConfigBuilder::new().client_id(name).build();
    let transport = relay.connect(PeerId::new(name)).unwrap();
    Client::connect(config, transport).await.unwrap()
}

/// Wait until every client has its edits confirmed and matches the relay.
async fn settle(relay: &Relay, clients: &[&Client<MemoryTransport>]) {
    let wait = async {
        loop {
            let doc = relay.doc();
            if clients.iter().all(|c| c.pending_len() == 0 && c.doc() == doc) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(5), wait)
        .await
        .expect("clients did not converge");
}

#[tokio::test]
async fn test_concurrent_edits_converge() {
    let relay = Relay::new(Document::from_paragraphs(&["Hello world."])).unwrap();
    let alice = join(&relay, "alice").await;
    let bob = join(&relay, "bob").await;

    alice
        .edit(|s| commands::insert_text(s, 7, "X", &Marks::new()))
        .unwrap();
    bob.edit(|s| commands::delete_range(s, 1, 7)).unwrap();

    settle(&relay, &[&alice, &bob]).await;
    assert_eq!(alice.doc().text_content(), "Xworld.");
    assert_eq!(relay.log_len(), 2);
}

#[tokio::test]
async fn test_late_joiner_starts_from_welcome() {
    let relay = Relay::new(Document::from_paragraphs(&["abc"])).unwrap();
    let alice = join(&relay, "alice").await;
    alice
        .edit(|s| commands::add_mark(s, 1, 3, "bold", json!(true)))
        .unwrap();
    alice.edit(|s| commands::split_block(s, 2)).unwrap();
    settle(&relay, &[&alice]).await;

    let carol = join(&relay, "carol").await;
    assert_eq!(carol.doc(), alice.doc());
    assert_eq!(carol.with_replica(|r| r.outline().len()), carol.doc().structural_size());

    carol
        .edit(|s| commands::insert_text(s, 1, "!", &Marks::new()))
        .unwrap();
    settle(&relay, &[&alice, &carol]).await;
    assert_eq!(alice.doc().block_texts(), vec!["!a".to_string(), "bc".to_string()]);
}

#[tokio::test]
async fn test_events_follow_edits() {
    let relay = Relay::new(Document::from_paragraphs(&["abc"])).unwrap();
    let alice = join(&relay, "alice").await;
    let bob = join(&relay, "bob").await;
    let mut alice_events = alice.subscribe();
    let mut bob_events = bob.subscribe();

    alice
        .edit(|s| commands::insert_text(s, 4, "d", &Marks::new()))
        .unwrap();

    assert_eq!(
        alice_events.recv().await.unwrap(),
        DocEvent::LocalChange { client_counter: 0 }
    );
    assert_eq!(
        alice_events.recv().await.unwrap(),
        DocEvent::Confirmed { client_counter: 0 }
    );
    assert_eq!(
        bob_events.recv().await.unwrap(),
        DocEvent::RemoteUpdate {
            client_id: "alice".into(),
            client_counter: 0,
        }
    );
}

#[tokio::test]
async fn test_edit_error_leaves_state_alone() {
    let relay = Relay::new(Document::from_paragraphs(&["abc"])).unwrap();
    let alice = join(&relay, "alice").await;

    // Splitting at the document boundary has no enclosing block.
    assert!(alice.edit(|s| commands::split_block(s, 0)).is_err());
    assert_eq!(alice.pending_len(), 0);
    assert!(alice.edit(|s| Ok(s.tr())).unwrap().is_none());
}

#[tokio::test]
async fn test_many_clients_typing() {
    let relay = Relay::new(Document::from_paragraphs(&["start"])).unwrap();
    let mut clients = Vec::new();
    for name in ["a", "b", "c", "d"] {
        clients.push(Arc::new(join(&relay, name).await));
    }

    let typing = clients.iter().enumerate().map(|(i, client)| {
        let client = Arc::clone(client);
        async move {
            for round in 0..10 {
                let text = format!("{i}");
                client
                    .edit(|s| {
                        let pos = (round * 3 + i) % s.doc().content_size().saturating_sub(1).max(1) + 1;
                        commands::insert_text(s, pos, &text, &Marks::new())
                    })
                    .ok();
                tokio::task::yield_now().await;
            }
        }
    });
    join_all(typing).await;

    let refs: Vec<&Client<MemoryTransport>> = clients.iter().map(|c| c.as_ref()).collect();
    settle(&relay, &refs).await;

    // Every client's counters reach the relay in issue order.
    let log = relay.log();
    for name in ["a", "b", "c", "d"] {
        let counters: Vec<u64> = log
            .entries()
            .iter()
            .filter(|m| m.client_id == name)
            .map(|m| m.client_counter)
            .collect();
        let expected: Vec<u64> = (0..counters.len() as u64).collect();
        assert_eq!(counters, expected);
    }
    assert_eq!(relay.doc().text_content().len(), "start".len() + 40);
}

#[tokio::test]
async fn test_rejoin_continues_counters() {
    let relay = Relay::new(Document::from_paragraphs(&["Hello"])).unwrap();
    let bob = join(&relay, "bob").await;
    let alice = join(&relay, "alice").await;
    alice.insert_text(1, "A").unwrap();
    settle(&relay, &[&alice, &bob]).await;

    alice.disconnect();
    alice.transport().disconnect();
    drop(alice);

    let alice = join(&relay, "alice").await;
    let mutation = alice.insert_text(1, "B").unwrap().unwrap();
    assert_eq!(mutation.client_counter, 1);

    settle(&relay, &[&alice, &bob]).await;
    assert_eq!(bob.doc().text_content(), "BAHello");
    assert_eq!(relay.log_len(), 2);
}

#[tokio::test]
async fn test_typing_follows_bold() {
    let relay = Relay::new(Document::from_paragraphs(&["abc"])).unwrap();
    let alice = join(&relay, "alice").await;
    let bob = join(&relay, "bob").await;
    alice
        .edit(|s| commands::add_mark(s, 1, 3, "bold", json!(true)))
        .unwrap();
    settle(&relay, &[&alice, &bob]).await;

    // Bold extends after its end but not before its start.
    alice.insert_text(3, "Z").unwrap();
    alice.insert_text(1, "Y").unwrap();
    settle(&relay, &[&alice, &bob]).await;

    let doc = bob.doc();
    assert_eq!(doc.text_content(), "YabZc");
    let bold = |pos: usize| doc.marks_at(pos).and_then(|m| m.get("bold")).cloned();
    assert_eq!(bold(1), None);
    assert_eq!(bold(4), Some(json!(true)));
    assert_eq!(bold(5), None);
}

#[tokio::test]
async fn test_burst_reports_every_mutation() {
    let relay = Relay::new(Document::from_paragraphs(&["abc"])).unwrap();
    let alice = join(&relay, "alice").await;
    let bob = join(&relay, "bob").await;
    let mut bob_events = bob.subscribe();

    for _ in 0..5 {
        alice.insert_text(1, "x").unwrap();
    }
    settle(&relay, &[&alice, &bob]).await;

    let mut counters = Vec::new();
    while counters.len() < 5 {
        let event = tokio::time::timeout(Duration::from_secs(1), bob_events.recv())
            .await
            .unwrap()
            .unwrap();
        if let DocEvent::RemoteUpdate { client_id, client_counter } = event {
            assert_eq!(client_id, "alice");
            counters.push(client_counter);
        }
    }
    assert_eq!(counters, vec![0, 1, 2, 3, 4]);
    assert_eq!(bob.doc().text_content(), "xxxxxabc");
}
