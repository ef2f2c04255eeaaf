//! Outstanding request registry.
//!
//! Broker replies carry no request ids. A reply therefore correlates to the
//! oldest outstanding request of its kind for that conversation, except for
//! sends, which correlate by optimistic id. Requests that never get a reply
//! are swept out on tick and surfaced as timeouts, which also covers frames
//! handed to a transport that silently dropped them while disconnected.

use std::{ops::Sub, time::Duration};

use hotline_proto::{ConversationId, OptimisticId};

use crate::engine::EngineConfig;

/// What a pending entry is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RequestKind {
    /// `JoinConversation`, answered by `JoinedConversation` or `Error`.
    Join,
    /// `GetMessages`, answered by `MessagesLoaded` or `GetMessagesError`.
    Fetch,
    /// `SendMessage`, answered by `MessageSent` or `MessageFailed`.
    Send,
}

/// A request handed to the transport that has not been answered yet.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PendingEntry<I> {
    pub kind: RequestKind,
    pub conversation_id: ConversationId,
    /// Correlation id for `Send` entries, absent otherwise.
    pub optimistic_id: Option<OptimisticId>,
    pub registered_at: I,
}

/// FIFO registry of outstanding broker requests.
///
/// Entries leave in exactly two ways: a matching reply resolves them, or
/// [`Self::sweep`] expires them. Duplicate requests for the same
/// conversation resolve oldest-first, matching broker reply order on an
/// in-order transport.
#[derive(Debug)]
pub(crate) struct PendingRequests<I> {
    entries: Vec<PendingEntry<I>>,
}

impl<I> PendingRequests<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    pub(crate) fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub(crate) fn register_join(&mut self, conversation_id: ConversationId, now: I) {
        self.entries.push(PendingEntry {
            kind: RequestKind::Join,
            conversation_id,
            optimistic_id: None,
            registered_at: now,
        });
    }

    pub(crate) fn register_fetch(&mut self, conversation_id: ConversationId, now: I) {
        self.entries.push(PendingEntry {
            kind: RequestKind::Fetch,
            conversation_id,
            optimistic_id: None,
            registered_at: now,
        });
    }

    pub(crate) fn register_send(
        &mut self,
        conversation_id: ConversationId,
        optimistic_id: OptimisticId,
        now: I,
    ) {
        self.entries.push(PendingEntry {
            kind: RequestKind::Send,
            conversation_id,
            optimistic_id: Some(optimistic_id),
            registered_at: now,
        });
    }

    /// Resolve the oldest outstanding request of `kind` for a conversation.
    pub(crate) fn resolve(
        &mut self,
        kind: RequestKind,
        conversation_id: ConversationId,
    ) -> Option<PendingEntry<I>> {
        let index = self
            .entries
            .iter()
            .position(|entry| entry.kind == kind && entry.conversation_id == conversation_id)?;
        Some(self.entries.remove(index))
    }

    /// Whether an outstanding request of `kind` exists for a conversation.
    pub(crate) fn contains(&self, kind: RequestKind, conversation_id: ConversationId) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.kind == kind && entry.conversation_id == conversation_id)
    }

    /// Drop every outstanding request for a conversation.
    ///
    /// Called on leave so stragglers for dead conversations resolve
    /// nothing instead of timing out with spurious notices.
    pub(crate) fn purge_conversation(&mut self, conversation_id: ConversationId) {
        self.entries.retain(|entry| entry.conversation_id != conversation_id);
    }

    /// Resolve an outstanding send by its correlation id.
    pub(crate) fn resolve_send(&mut self, optimistic_id: OptimisticId) -> Option<PendingEntry<I>> {
        let index = self.entries.iter().position(|entry| {
            entry.kind == RequestKind::Send && entry.optimistic_id == Some(optimistic_id)
        })?;
        Some(self.entries.remove(index))
    }

    /// Remove and return every entry older than its kind's timeout.
    pub(crate) fn sweep(&mut self, now: I, config: &EngineConfig) -> Vec<PendingEntry<I>> {
        let mut expired = Vec::new();
        self.entries.retain(|entry| {
            let timeout = match entry.kind {
                RequestKind::Join => config.join_timeout,
                RequestKind::Fetch => config.fetch_timeout,
                RequestKind::Send => config.send_timeout,
            };
            if now - entry.registered_at > timeout {
                expired.push(*entry);
                false
            } else {
                true
            }
        });
        expired
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Instant;

    use proptest::prelude::*;

    use super::*;

    #[test]
    fn resolves_oldest_first_for_same_conversation() {
        let now = Instant::now();
        let mut pending = PendingRequests::new();
        pending.register_fetch(1, now);
        pending.register_fetch(1, now + Duration::from_secs(1));
        pending.register_fetch(2, now);

        let first = pending.resolve(RequestKind::Fetch, 1).unwrap();
        assert_eq!(first.registered_at, now);

        let second = pending.resolve(RequestKind::Fetch, 1).unwrap();
        assert_eq!(second.registered_at, now + Duration::from_secs(1));

        assert!(pending.resolve(RequestKind::Fetch, 1).is_none());
        assert!(pending.resolve(RequestKind::Fetch, 2).is_some());
    }

    #[test]
    fn kinds_do_not_cross_resolve() {
        let now = Instant::now();
        let mut pending = PendingRequests::new();
        pending.register_join(7, now);

        assert!(pending.resolve(RequestKind::Fetch, 7).is_none());
        assert!(pending.resolve(RequestKind::Join, 7).is_some());
    }

    #[test]
    fn purge_drops_all_kinds_for_conversation() {
        let now = Instant::now();
        let mut pending = PendingRequests::new();
        pending.register_join(1, now);
        pending.register_fetch(1, now);
        pending.register_send(1, 50, now);
        pending.register_join(2, now);

        pending.purge_conversation(1);

        assert!(!pending.contains(RequestKind::Join, 1));
        assert!(!pending.contains(RequestKind::Fetch, 1));
        assert!(pending.resolve_send(50).is_none());
        assert!(pending.contains(RequestKind::Join, 2));
    }

    #[test]
    fn sends_resolve_by_optimistic_id() {
        let now = Instant::now();
        let mut pending = PendingRequests::new();
        pending.register_send(1, 100, now);
        pending.register_send(1, 200, now);

        let entry = pending.resolve_send(200).unwrap();
        assert_eq!(entry.optimistic_id, Some(200));
        assert_eq!(entry.conversation_id, 1);

        assert!(pending.resolve_send(200).is_none());
        assert!(pending.resolve_send(100).is_some());
    }

    #[test]
    fn sweep_expires_by_kind_timeout() {
        let config = EngineConfig::default();
        let now = Instant::now();
        let mut pending = PendingRequests::new();
        pending.register_join(1, now);
        pending.register_fetch(2, now);
        pending.register_send(3, 300, now);

        // Past the join and send timeouts but not the (longer) fetch timeout.
        let later = now + config.join_timeout.max(config.send_timeout) + Duration::from_secs(1);
        assert!(later - now <= config.fetch_timeout);

        let expired = pending.sweep(later, &config);
        let kinds: Vec<RequestKind> = expired.iter().map(|entry| entry.kind).collect();
        assert!(kinds.contains(&RequestKind::Join));
        assert!(kinds.contains(&RequestKind::Send));
        assert!(!kinds.contains(&RequestKind::Fetch));

        assert!(pending.resolve(RequestKind::Fetch, 2).is_some());
    }

    #[test]
    fn sweep_is_empty_before_timeout() {
        let config = EngineConfig::default();
        let now = Instant::now();
        let mut pending = PendingRequests::new();
        pending.register_join(1, now);

        assert!(pending.sweep(now + Duration::from_millis(10), &config).is_empty());
        assert!(pending.resolve(RequestKind::Join, 1).is_some());
    }

    proptest! {
        #[test]
        fn same_key_entries_resolve_in_registration_order(
            conversations in proptest::collection::vec(1u128..4, 1..40),
        ) {
            let base = Instant::now();
            let mut pending = PendingRequests::new();
            for (step, conversation_id) in conversations.iter().enumerate() {
                pending.register_fetch(*conversation_id, base + Duration::from_millis(step as u64));
            }

            for conversation_id in 1u128..4 {
                let mut last = None;
                while let Some(entry) = pending.resolve(RequestKind::Fetch, conversation_id) {
                    prop_assert_eq!(entry.conversation_id, conversation_id);
                    if let Some(previous) = last {
                        prop_assert!(entry.registered_at > previous);
                    }
                    last = Some(entry.registered_at);
                }
                prop_assert!(!pending.contains(RequestKind::Fetch, conversation_id));
            }
        }

        #[test]
        fn sweep_expires_exactly_the_overdue(
            ages in proptest::collection::vec(0u64..30_000, 1..30),
        ) {
            let config = EngineConfig::default();
            let horizon = Instant::now() + Duration::from_secs(60);
            let mut pending = PendingRequests::new();
            for (optimistic_id, age) in ages.iter().enumerate() {
                let registered = horizon - Duration::from_millis(*age);
                pending.register_send(1, optimistic_id as u64, registered);
            }

            let expired = pending.sweep(horizon, &config);

            for entry in &expired {
                prop_assert!(horizon - entry.registered_at > config.send_timeout);
            }
            let overdue = ages
                .iter()
                .filter(|age| Duration::from_millis(**age) > config.send_timeout)
                .count();
            prop_assert_eq!(expired.len(), overdue);
            for (optimistic_id, age) in ages.iter().enumerate() {
                let survives = pending.resolve_send(optimistic_id as u64).is_some();
                prop_assert_eq!(survives, Duration::from_millis(*age) <= config.send_timeout);
            }
        }
    }
}
