//! Per-conversation model state.
//!
//! [`ModelConversation`] mirrors the reconciliation rules of the real
//! conversation store with the minimum bookkeeping needed to predict
//! observable outcomes. Messages get a local `tag` standing in for the
//! engine's optimistic id; the pending queue holds tags of unanswered
//! sends in wire order, which is the order the broker answers them.

use std::collections::VecDeque;

use hotline_proto::{DeliveryState, MessageId, UserId};

/// One message as the model sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelMessage {
    /// Local identity, stable across status changes.
    pub tag: u32,
    /// Broker id once confirmed or delivered.
    pub id: Option<MessageId>,
    /// Author.
    pub sender_id: UserId,
    /// Body.
    pub content: String,
    /// Delivery status.
    pub status: DeliveryState,
}

/// Model of one conversation's observable state.
#[derive(Debug, Clone, Default)]
pub struct ModelConversation {
    /// Messages in display order.
    pub messages: Vec<ModelMessage>,
    /// Tags of unanswered sends, oldest first.
    pub pending: VecDeque<u32>,
    /// Typing peers, oldest indicator first.
    pub typing: Vec<UserId>,
    /// Unread counter.
    pub unread: u32,
    /// Whether older history remains on the broker.
    pub has_more: bool,
    next_tag: u32,
}

impl ModelConversation {
    /// Create an empty conversation.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc_tag(&mut self) -> u32 {
        let tag = self.next_tag;
        self.next_tag += 1;
        tag
    }

    /// Append an optimistic send and enqueue it for a broker verdict.
    pub fn push_send(&mut self, sender_id: UserId, content: String) {
        let tag = self.alloc_tag();
        self.messages.push(ModelMessage {
            tag,
            id: None,
            sender_id,
            content,
            status: DeliveryState::Sending,
        });
        self.pending.push_back(tag);
    }

    /// Confirm the message with the given tag in place.
    ///
    /// Returns false when the tag no longer matches a message; a history
    /// replacement dropped it and the confirmation lands on nothing, same
    /// as the real store.
    pub fn confirm(&mut self, tag: u32, id: MessageId) -> bool {
        match self.messages.iter_mut().find(|message| message.tag == tag) {
            Some(message) => {
                message.id = Some(id);
                message.status = DeliveryState::Sent;
                true
            },
            None => false,
        }
    }

    /// Fail the message with the given tag in place.
    pub fn fail(&mut self, tag: u32) -> bool {
        match self.messages.iter_mut().find(|message| message.tag == tag) {
            Some(message) if message.status == DeliveryState::Sending => {
                message.status = DeliveryState::Failed;
                true
            },
            _ => false,
        }
    }

    /// Flip the most recently failed message back to sending and re-enqueue
    /// it behind any unanswered sends.
    pub fn retry_latest_failed(&mut self) -> Option<u32> {
        let message =
            self.messages.iter_mut().rev().find(|message| message.status == DeliveryState::Failed)?;
        message.status = DeliveryState::Sending;
        let tag = message.tag;
        self.pending.push_back(tag);
        Some(tag)
    }

    /// Append a broker fan-out message unless its id is already present.
    ///
    /// Returns false for a duplicate (the message is dropped).
    pub fn deliver(&mut self, id: MessageId, sender_id: UserId, content: String) -> bool {
        if self.messages.iter().any(|message| message.id == Some(id)) {
            return false;
        }
        let tag = self.alloc_tag();
        self.messages.push(ModelMessage {
            tag,
            id: Some(id),
            sender_id,
            content,
            status: DeliveryState::Delivered,
        });
        true
    }

    /// Replace the message list wholesale with a history page.
    ///
    /// Unanswered send tags are left in the pending queue; their messages
    /// are gone, so later verdicts land on nothing.
    pub fn replace_history(
        &mut self,
        rows: impl IntoIterator<Item = (MessageId, UserId, String)>,
        has_more: bool,
    ) {
        // History rows never enter the pending queue, but their tags must
        // not collide with live sends either.
        let base = self.next_tag;
        self.messages = rows
            .into_iter()
            .enumerate()
            .map(|(i, (id, sender_id, content))| ModelMessage {
                tag: base + i as u32,
                id: Some(id),
                sender_id,
                content,
                status: DeliveryState::Delivered,
            })
            .collect();
        self.next_tag = base + self.messages.len() as u32;
        self.has_more = has_more;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confirm_preserves_position() {
        let mut conversation = ModelConversation::new();
        conversation.push_send(1, "first".to_string());
        conversation.push_send(1, "second".to_string());

        let tag = conversation.pending.pop_front().unwrap();
        assert!(conversation.confirm(tag, 10));

        assert_eq!(conversation.messages[0].id, Some(10));
        assert_eq!(conversation.messages[0].status, DeliveryState::Sent);
        assert_eq!(conversation.messages[1].status, DeliveryState::Sending);
    }

    #[test]
    fn retry_requeues_behind_live_sends() {
        let mut conversation = ModelConversation::new();
        conversation.push_send(1, "a".to_string());
        conversation.push_send(1, "b".to_string());

        let first = conversation.pending.pop_front().unwrap();
        assert!(conversation.fail(first));

        let retried = conversation.retry_latest_failed().unwrap();
        assert_eq!(retried, first);
        // "b" is still ahead; the retry waits its turn.
        assert_eq!(conversation.pending, VecDeque::from([first + 1, first]));
    }

    #[test]
    fn duplicate_delivery_is_dropped() {
        let mut conversation = ModelConversation::new();
        assert!(conversation.deliver(5, 100, "hi".to_string()));
        assert!(!conversation.deliver(5, 100, "hi".to_string()));
        assert_eq!(conversation.messages.len(), 1);
    }

    #[test]
    fn replace_history_orphans_pending_tags() {
        let mut conversation = ModelConversation::new();
        conversation.push_send(1, "draft".to_string());

        conversation.replace_history([(7, 100, "old".to_string())], true);

        assert_eq!(conversation.messages.len(), 1);
        assert_eq!(conversation.messages[0].id, Some(7));
        assert!(conversation.has_more);

        // The verdict for the dropped draft lands on nothing.
        let tag = conversation.pending.pop_front().unwrap();
        assert!(!conversation.confirm(tag, 8));
    }
}
