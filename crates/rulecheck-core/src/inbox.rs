//! ---
//! rc_section: "04-core"
//! rc_subsection: "module"
//! rc_type: "source"
//! rc_scope: "code"
//! rc_description: "Receiving end of the inbound channel feeding the operation store."
//! rc_version: "v0.1.0"
//! rc_owner: "tbd"
//! ---
use std::sync::Arc;

use rulecheck_msg::logging::{log_message, MessageDirection};
use rulecheck_msg::{InboundMessage, InboundReceiver};
use tokio::sync::mpsc::error::TryRecvError;
use tracing::{debug, warn};

use crate::store::OperationStore;

/// Owns the inbound receiver and moves queued messages into the store.
#[derive(Debug)]
pub struct OperationInbox {
    receiver: InboundReceiver,
    store: Arc<OperationStore>,
    disconnected: bool,
}

impl OperationInbox {
    pub fn new(receiver: InboundReceiver, store: Arc<OperationStore>) -> Self {
        Self {
            receiver,
            store,
            disconnected: false,
        }
    }

    pub fn store(&self) -> &Arc<OperationStore> {
        &self.store
    }

    /// Merge every queued message into the store; returns how many were merged.
    pub fn drain(&mut self) -> usize {
        let mut merged = 0;
        while let Some(message) = self.next_queued() {
            log_message(
                MessageDirection::Inbound,
                &message.topic,
                &String::from_utf8_lossy(&message.payload),
            );
            if self.store.on_receive(&message.payload).is_merged() {
                merged += 1;
            }
        }
        merged
    }

    /// Discard everything queued, then clear the store under its lock.
    ///
    /// Returns the number of discarded messages.
    pub fn reset(&mut self) -> usize {
        let mut discarded = 0;
        let receiver = &mut self.receiver;
        let disconnected = &mut self.disconnected;
        self.store.reset_with(|| loop {
            match receiver.try_recv() {
                Ok(_) => discarded += 1,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    *disconnected = true;
                    break;
                }
            }
        });
        if discarded > 0 {
            debug!(discarded, "dropped inbound messages queued before reset");
        }
        discarded
    }

    /// True once every sender is gone and the queue is empty.
    pub fn is_disconnected(&self) -> bool {
        self.disconnected
    }

    fn next_queued(&mut self) -> Option<InboundMessage> {
        match self.receiver.try_recv() {
            Ok(message) => Some(message),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                if !self.disconnected {
                    warn!("inbound channel closed by transport");
                    self.disconnected = true;
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rulecheck_msg::inbound_channel;

    use super::*;

    #[test]
    fn drain_merges_queued_messages_in_order() {
        let (tx, rx) = inbound_channel();
        let store = Arc::new(OperationStore::new());
        let mut inbox = OperationInbox::new(rx, store.clone());

        tx.send(InboundMessage::new("s/ds", r#"{"step": 1}"#)).unwrap();
        tx.send(InboundMessage::new("s/ds", "garbage")).unwrap();
        tx.send(InboundMessage::new("s/ds", r#"{"step": 2}"#)).unwrap();

        assert_eq!(inbox.drain(), 2);
        assert_eq!(store.get("step"), Some(serde_json::json!(2)));
        assert_eq!(inbox.drain(), 0);
    }

    #[test]
    fn reset_discards_messages_delivered_before_it() {
        let (tx, rx) = inbound_channel();
        let store = Arc::new(OperationStore::new());
        let mut inbox = OperationInbox::new(rx, store.clone());

        tx.send(InboundMessage::new(
            "s/ds",
            r#"{"MotorOverheat": {}, "delivery": {"time": "2024-03-01T10:00:00Z"}}"#,
        ))
        .unwrap();
        assert_eq!(inbox.reset(), 1);

        assert_eq!(inbox.drain(), 0);
        assert!(!store.check("MotorOverheat"));
        assert_eq!(store.alarm_timestamp(), 0.0);
    }

    #[test]
    fn closed_channel_is_reported() {
        let (tx, rx) = inbound_channel();
        let mut inbox = OperationInbox::new(rx, Arc::new(OperationStore::new()));
        drop(tx);
        inbox.drain();
        assert!(inbox.is_disconnected());
    }
}
