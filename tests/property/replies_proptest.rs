//! Property-based tests for reply chains

use chrono::{TimeZone, Utc};
use proptest::prelude::*;

use daydeskr::client::replies::{reply_chain, reply_depth};
use daydeskr::shared::messaging::Message;

/// Up to 30 messages whose parents are arbitrary ids, cycles included
fn graph() -> impl Strategy<Value = Vec<Option<i64>>> {
    prop::collection::vec(prop::option::of(1i64..=30), 1..30)
}

fn messages(parents: &[Option<i64>]) -> Vec<Message> {
    parents
        .iter()
        .enumerate()
        .map(|(i, parent)| {
            let id = i as i64 + 1;
            let mut message = Message::new_text(id, 1, 2, "reply", Utc.timestamp_opt(id, 0).unwrap());
            message.reply_to_id = *parent;
            message
        })
        .collect()
}

proptest! {
    #[test]
    fn test_reply_chain_terminates_without_repeats(parents in graph()) {
        let messages = messages(&parents);
        for message in &messages {
            let chain = reply_chain(&messages, message.id);
            let mut ids: Vec<i64> = chain.iter().map(|m| m.id).collect();
            prop_assert!(!ids.contains(&message.id));
            let len = ids.len();
            ids.sort();
            ids.dedup();
            prop_assert_eq!(ids.len(), len);
            prop_assert!(len < messages.len());
            prop_assert_eq!(reply_depth(&messages, message.id), len);
        }
    }
}
