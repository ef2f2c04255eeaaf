//! Client-side conversation state.
//!
//! Holds per-conversation message lists, typing indicators, and unread
//! counters. The store performs no I/O and holds no clock: expiry deadlines
//! are passed in, and mutators report what happened through return values
//! so the caller decides what to log.
//!
//! Reconciliation rules live here: optimistic messages are confirmed or
//! failed in place (preserving list position), delivered messages are
//! deduplicated by server id, and history loads replace a conversation's
//! messages wholesale without touching any other conversation.

use std::{collections::HashMap, time::Duration};

use hotline_proto::{ChatMessage, ConversationId, DeliveryState, MessageId, OptimisticId, UserId};
use serde::Serialize;

/// A user currently typing in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypingUser {
    /// User id.
    pub user_id: UserId,
    /// Display name, denormalized for rendering.
    pub user_name: String,
    /// Wall-clock milliseconds when the indicator was last refreshed.
    pub since: u64,
}

/// State of a single conversation.
///
/// Mutation happens through the reconciliation methods; fields are private
/// so every change flows through one place.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
    typing: Vec<TypingUser>,
    is_loading: bool,
    has_more: bool,
    unread: u32,
    cursor: Option<String>,
}

impl Conversation {
    /// Create an empty conversation.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages in display order (oldest first, optimistic entries at their
    /// send position).
    #[must_use]
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Users currently typing.
    #[must_use]
    pub fn typing(&self) -> &[TypingUser] {
        &self.typing
    }

    /// Whether a history fetch is in flight.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    /// Whether older history remains beyond the loaded window.
    #[must_use]
    pub fn has_more(&self) -> bool {
        self.has_more
    }

    /// Unread message count.
    #[must_use]
    pub fn unread(&self) -> u32 {
        self.unread
    }

    /// Pagination cursor from the last history load.
    #[must_use]
    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    /// Append a message without reconciliation. Used for optimistic sends.
    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// Replace the optimistic message for `optimistic_id` with its
    /// confirmed copy, in place.
    ///
    /// If the confirmed copy's server id is already present (its delivered
    /// broadcast raced ahead of the confirmation), the optimistic entry is
    /// removed instead so the id stays unique. Returns false when no
    /// message carries `optimistic_id`.
    pub fn confirm(&mut self, optimistic_id: OptimisticId, confirmed: ChatMessage) -> bool {
        let Some(index) = self.position_of_optimistic(optimistic_id) else {
            return false;
        };

        let already_delivered = confirmed.id.is_some()
            && self
                .messages
                .iter()
                .enumerate()
                .any(|(i, message)| i != index && message.id == confirmed.id);

        if already_delivered {
            self.messages.remove(index);
        } else {
            self.messages[index] = confirmed;
        }
        true
    }

    /// Mark the optimistic message for `optimistic_id` as failed, keeping
    /// its content so the user can retry.
    ///
    /// Only pending messages flip; a confirmation that won the race is
    /// never downgraded. Returns false when nothing changed.
    pub fn fail(&mut self, optimistic_id: OptimisticId) -> bool {
        match self.find_by_optimistic_mut(optimistic_id) {
            Some(message) if message.status.is_pending() => {
                message.status = DeliveryState::Failed;
                true
            },
            _ => false,
        }
    }

    /// Reset a failed message to pending and return a copy for
    /// retransmission. Returns `None` unless a failed message carries
    /// `optimistic_id`.
    pub fn retry(&mut self, optimistic_id: OptimisticId) -> Option<ChatMessage> {
        let message = self.find_by_optimistic_mut(optimistic_id)?;
        if message.status != DeliveryState::Failed {
            return None;
        }
        message.status = DeliveryState::Sending;
        Some(message.clone())
    }

    /// Insert a delivered message, deduplicating by server id.
    ///
    /// Returns false when a message with the same id is already present;
    /// the stored copy wins and the incoming one is dropped.
    pub fn insert_delivered(&mut self, message: ChatMessage) -> bool {
        if let Some(id) = message.id
            && self.contains_id(id)
        {
            return false;
        }
        self.messages.push(message);
        true
    }

    /// Replace the message list wholesale with a loaded history page and
    /// clear the loading flag. Typing state and unread counts are
    /// untouched.
    pub fn replace_history(
        &mut self,
        messages: Vec<ChatMessage>,
        has_more: bool,
        cursor: Option<String>,
    ) {
        self.messages = messages;
        self.has_more = has_more;
        self.cursor = cursor;
        self.is_loading = false;
    }

    /// Set or clear the history-fetch-in-flight flag.
    pub fn set_loading(&mut self, loading: bool) {
        self.is_loading = loading;
    }

    /// Add or remove a typing indicator.
    ///
    /// Adding an already-present user refreshes their name and timestamp;
    /// removing an absent user is a no-op. Returns whether membership
    /// changed.
    pub fn set_typing(&mut self, user: TypingUser, is_typing: bool) -> bool {
        let position = self.typing.iter().position(|t| t.user_id == user.user_id);
        match (position, is_typing) {
            (None, true) => {
                self.typing.push(user);
                true
            },
            (Some(index), true) => {
                self.typing[index] = user;
                false
            },
            (Some(index), false) => {
                self.typing.remove(index);
                true
            },
            (None, false) => false,
        }
    }

    /// Drop typing indicators older than `ttl`, returning how many were
    /// removed. Covers peers whose stop event was lost.
    pub fn expire_typing(&mut self, now_millis: u64, ttl: Duration) -> usize {
        let ttl_millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        let before = self.typing.len();
        self.typing
            .retain(|user| now_millis.saturating_sub(user.since) < ttl_millis);
        before - self.typing.len()
    }

    /// Increment the unread counter.
    pub fn increment_unread(&mut self) {
        self.unread = self.unread.saturating_add(1);
    }

    /// Reset the unread counter.
    pub fn clear_unread(&mut self) {
        self.unread = 0;
    }

    /// Find a message by its optimistic id.
    #[must_use]
    pub fn find_by_optimistic(&self, optimistic_id: OptimisticId) -> Option<&ChatMessage> {
        self.messages.iter().find(|m| m.optimistic_id == Some(optimistic_id))
    }

    /// Whether a message with the given server id is present.
    #[must_use]
    pub fn contains_id(&self, id: MessageId) -> bool {
        self.messages.iter().any(|m| m.id == Some(id))
    }

    fn position_of_optimistic(&self, optimistic_id: OptimisticId) -> Option<usize> {
        self.messages.iter().position(|m| m.optimistic_id == Some(optimistic_id))
    }

    fn find_by_optimistic_mut(&mut self, optimistic_id: OptimisticId) -> Option<&mut ChatMessage> {
        self.messages.iter_mut().find(|m| m.optimistic_id == Some(optimistic_id))
    }
}

/// All conversation state known to the client, keyed by conversation id.
#[derive(Debug, Clone, Default)]
pub struct ConversationStore {
    conversations: HashMap<ConversationId, Conversation>,
    active: Option<ConversationId>,
}

impl ConversationStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a conversation.
    #[must_use]
    pub fn get(&self, id: ConversationId) -> Option<&Conversation> {
        self.conversations.get(&id)
    }

    /// Look up a conversation, creating it empty if absent.
    pub fn upsert(&mut self, id: ConversationId) -> &mut Conversation {
        self.conversations.entry(id).or_default()
    }

    /// Mutable lookup without creation.
    pub fn get_mut(&mut self, id: ConversationId) -> Option<&mut Conversation> {
        self.conversations.get_mut(&id)
    }

    /// The conversation currently in the foreground, if any.
    #[must_use]
    pub fn active(&self) -> Option<ConversationId> {
        self.active
    }

    /// Change the foreground conversation. Marks the newly active
    /// conversation read.
    pub fn set_active(&mut self, id: Option<ConversationId>) {
        self.active = id;
        if let Some(id) = id
            && let Some(conversation) = self.conversations.get_mut(&id)
        {
            conversation.clear_unread();
        }
    }

    /// Remove a conversation's local state entirely. Returns whether it
    /// existed.
    pub fn remove(&mut self, id: ConversationId) -> bool {
        if self.active == Some(id) {
            self.active = None;
        }
        self.conversations.remove(&id).is_some()
    }

    /// Iterate over all conversations.
    pub fn conversations(&self) -> impl Iterator<Item = (ConversationId, &Conversation)> {
        self.conversations.iter().map(|(id, c)| (*id, c))
    }

    /// Iterate mutably over all conversations.
    pub fn conversations_mut(
        &mut self,
    ) -> impl Iterator<Item = (ConversationId, &mut Conversation)> {
        self.conversations.iter_mut().map(|(id, c)| (*id, c))
    }

    /// Number of conversations held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    /// Whether the store holds no conversations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    /// Drop all state. Used on logout.
    pub fn reset(&mut self) {
        self.conversations.clear();
        self.active = None;
    }
}

#[cfg(test)]
mod tests {
    use hotline_proto::MessageKind;
    use proptest::prelude::*;

    use super::*;

    fn optimistic(optimistic_id: OptimisticId, content: &str) -> ChatMessage {
        ChatMessage {
            id: None,
            optimistic_id: Some(optimistic_id),
            conversation_id: 0xC0FFEE,
            sender_id: 1,
            sender_name: "maya".to_string(),
            sender_avatar: None,
            kind: MessageKind::Text,
            content: content.to_string(),
            timestamp: 1_700_000_000_000,
            status: DeliveryState::Sending,
        }
    }

    fn confirmed(optimistic_id: OptimisticId, id: MessageId) -> ChatMessage {
        ChatMessage {
            id: Some(id),
            status: DeliveryState::Sent,
            ..optimistic(optimistic_id, "hello")
        }
    }

    fn delivered(id: MessageId) -> ChatMessage {
        ChatMessage {
            id: Some(id),
            optimistic_id: None,
            conversation_id: 0xC0FFEE,
            sender_id: 2,
            sender_name: "noor".to_string(),
            sender_avatar: None,
            kind: MessageKind::Text,
            content: "hi".to_string(),
            timestamp: 1_700_000_000_500,
            status: DeliveryState::Delivered,
        }
    }

    #[test]
    fn confirm_replaces_optimistic_in_place() {
        let mut conversation = Conversation::new();
        conversation.insert_delivered(delivered(1));
        conversation.push(optimistic(900, "hello"));

        assert!(conversation.confirm(900, confirmed(900, 2)));

        // Same position, now confirmed.
        assert_eq!(conversation.messages().len(), 2);
        assert_eq!(conversation.messages()[1].id, Some(2));
        assert_eq!(conversation.messages()[1].status, DeliveryState::Sent);
    }

    #[test]
    fn confirm_unknown_optimistic_is_noop() {
        let mut conversation = Conversation::new();
        conversation.push(optimistic(900, "hello"));

        assert!(!conversation.confirm(901, confirmed(901, 2)));
        assert_eq!(conversation.messages()[0].status, DeliveryState::Sending);
    }

    #[test]
    fn confirm_after_delivered_broadcast_keeps_one_copy() {
        let mut conversation = Conversation::new();
        conversation.push(optimistic(900, "hello"));
        // Broadcast of our own message arrives before the confirmation.
        conversation.insert_delivered(delivered(5));

        assert!(conversation.confirm(900, confirmed(900, 5)));

        assert_eq!(conversation.messages().len(), 1);
        assert_eq!(conversation.messages()[0].id, Some(5));
    }

    #[test]
    fn fail_preserves_content_for_retry() {
        let mut conversation = Conversation::new();
        conversation.push(optimistic(900, "important draft"));

        assert!(conversation.fail(900));

        let message = &conversation.messages()[0];
        assert_eq!(message.status, DeliveryState::Failed);
        assert_eq!(message.content, "important draft");
    }

    #[test]
    fn fail_never_downgrades_confirmed_message() {
        let mut conversation = Conversation::new();
        conversation.push(optimistic(900, "hello"));
        conversation.confirm(900, confirmed(900, 2));

        assert!(!conversation.fail(900));
        assert_eq!(conversation.messages()[0].status, DeliveryState::Sent);
    }

    #[test]
    fn retry_resets_failed_message_to_pending() {
        let mut conversation = Conversation::new();
        conversation.push(optimistic(900, "hello"));
        conversation.fail(900);

        let resend = conversation.retry(900).unwrap();
        assert_eq!(resend.content, "hello");
        assert_eq!(resend.status, DeliveryState::Sending);
        assert_eq!(conversation.messages()[0].status, DeliveryState::Sending);

        // Only failed messages can be retried.
        assert!(conversation.retry(900).is_none());
    }

    #[test]
    fn insert_delivered_dedups_by_id() {
        let mut conversation = Conversation::new();

        assert!(conversation.insert_delivered(delivered(7)));
        assert!(!conversation.insert_delivered(delivered(7)));
        assert_eq!(conversation.messages().len(), 1);
    }

    #[test]
    fn replace_history_swaps_messages_wholesale() {
        let mut conversation = Conversation::new();
        conversation.push(optimistic(900, "local"));
        conversation.set_loading(true);

        conversation.replace_history(
            vec![delivered(1), delivered(2)],
            true,
            Some("cursor-2".to_string()),
        );

        assert_eq!(conversation.messages().len(), 2);
        assert!(!conversation.is_loading());
        assert!(conversation.has_more());
        assert_eq!(conversation.cursor(), Some("cursor-2"));
    }

    #[test]
    fn typing_membership_changes() {
        let mut conversation = Conversation::new();
        let noor = TypingUser { user_id: 2, user_name: "noor".to_string(), since: 1_000 };

        assert!(conversation.set_typing(noor.clone(), true));
        // Refresh keeps membership stable but updates the timestamp.
        let refreshed = TypingUser { since: 5_000, ..noor.clone() };
        assert!(!conversation.set_typing(refreshed, true));
        assert_eq!(conversation.typing()[0].since, 5_000);

        assert!(conversation.set_typing(noor.clone(), false));
        assert!(conversation.typing().is_empty());

        // Removing a user who is not typing changes nothing.
        assert!(!conversation.set_typing(noor, false));
    }

    #[test]
    fn expire_typing_drops_stale_entries() {
        let mut conversation = Conversation::new();
        conversation
            .set_typing(TypingUser { user_id: 2, user_name: "noor".to_string(), since: 0 }, true);
        conversation.set_typing(
            TypingUser { user_id: 3, user_name: "kai".to_string(), since: 10_000 },
            true,
        );

        let removed = conversation.expire_typing(15_000, Duration::from_secs(15));

        assert_eq!(removed, 1);
        assert_eq!(conversation.typing().len(), 1);
        assert_eq!(conversation.typing()[0].user_id, 3);
    }

    #[test]
    fn unread_counter_saturates_and_clears() {
        let mut conversation = Conversation::new();
        conversation.increment_unread();
        conversation.increment_unread();
        assert_eq!(conversation.unread(), 2);

        conversation.clear_unread();
        assert_eq!(conversation.unread(), 0);
    }

    #[test]
    fn store_upsert_creates_once() {
        let mut store = ConversationStore::new();
        store.upsert(10).push(optimistic(900, "hello"));
        store.upsert(10).insert_delivered(delivered(1));

        assert_eq!(store.len(), 1);
        assert_eq!(store.get(10).unwrap().messages().len(), 2);
        assert!(store.get(11).is_none());
    }

    #[test]
    fn set_active_clears_unread() {
        let mut store = ConversationStore::new();
        store.upsert(10).increment_unread();

        store.set_active(Some(10));

        assert_eq!(store.active(), Some(10));
        assert_eq!(store.get(10).unwrap().unread(), 0);
    }

    #[test]
    fn remove_forgets_conversation_and_active_marker() {
        let mut store = ConversationStore::new();
        store.upsert(10);
        store.set_active(Some(10));

        assert!(store.remove(10));
        assert!(!store.remove(10));
        assert_eq!(store.active(), None);
        assert!(store.is_empty());
    }

    #[test]
    fn reset_drops_all_state() {
        let mut store = ConversationStore::new();
        store.upsert(10);
        store.upsert(20);
        store.set_active(Some(20));

        store.reset();

        assert!(store.is_empty());
        assert_eq!(store.active(), None);
    }

    proptest! {
        #[test]
        fn delivered_ids_stay_unique(ids in proptest::collection::vec(1u64..50, 0..100)) {
            let mut conversation = Conversation::new();
            for id in &ids {
                conversation.insert_delivered(delivered(*id));
            }

            let mut seen: Vec<_> =
                conversation.messages().iter().filter_map(|m| m.id).collect();
            let total = seen.len();
            seen.sort_unstable();
            seen.dedup();
            prop_assert_eq!(seen.len(), total);
        }
    }
}
