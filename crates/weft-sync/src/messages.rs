//! Wire messages between a relay and its replicas.

use crate::error::Result;
use crate::mutation::Mutation;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use weft_core::{FormattingSnapshot, OrderSnapshot, OutlineSnapshot};
use weft_doc::Document;

/// Everything a new replica needs before its first mutation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WelcomeMessage {
    pub order: OrderSnapshot,
    pub outline: OutlineSnapshot,
    pub formatting: FormattingSnapshot,
    pub doc: Document,
    /// Confirmed mutations not yet folded into the snapshot, in log order.
    #[serde(default)]
    pub mutations: Vec<Mutation>,
    /// Next `client_counter` for every client with confirmed mutations.
    #[serde(default, rename = "clientCounters")]
    pub client_counters: BTreeMap<String, u64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MutationMessage {
    pub mutation: Mutation,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Message {
    Welcome(WelcomeMessage),
    Mutation(MutationMessage),
}

impl Message {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_tags() {
        let msg = Message::Mutation(MutationMessage {
            mutation: Mutation {
                client_id: "a".into(),
                client_counter: 0,
                ann_steps: vec![],
            },
        });
        let json = msg.to_json().unwrap();
        assert!(json.starts_with(r#"{"type":"mutation""#));
        assert_eq!(Message::from_json(&json).unwrap(), msg);

        let welcome = Message::Welcome(WelcomeMessage {
            order: Default::default(),
            outline: Default::default(),
            formatting: Default::default(),
            doc: Document::from_paragraphs(&["hi"]),
            mutations: vec![],
            client_counters: BTreeMap::from([("a".to_string(), 2)]),
        });
        let json = welcome.to_json().unwrap();
        assert!(json.contains(r#""type":"welcome""#));
        assert_eq!(Message::from_json(&json).unwrap(), welcome);
    }
}
