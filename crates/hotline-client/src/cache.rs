//! Durable message cache bridge.
//!
//! The engine keeps conversations in memory; the cache bridge is how
//! confirmed history reaches a durable store so a restarted client can
//! render before its first fetch completes. The trait is synchronous (no
//! async) and write-only: the runtime invokes it fire-and-forget, and a
//! failed write is logged, never propagated. In-memory state stays
//! authoritative for the session.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use hotline_proto::{ChatMessage, ConversationId};

/// Cache write failure.
///
/// Only observed by the runtime's warn log; the engine never sees it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    /// I/O error (file system, database, etc.)
    #[error("I/O error: {0}")]
    Io(String),

    /// Serialization failed
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Write-only bridge to a durable message store.
///
/// Must be Clone (handed to the runtime task), Send + Sync (crossed into
/// the task), and synchronous. Implementations typically share internal
/// state via Arc, so clones write to the same underlying store.
pub trait CacheBridge: Clone + Send + Sync + 'static {
    /// Persist one confirmed or delivered message.
    ///
    /// Idempotent on message id: re-caching an already-stored message
    /// overwrites it.
    fn add_message(&self, message: &ChatMessage) -> Result<(), CacheError>;

    /// Replace the cached history for a conversation with an
    /// authoritative page.
    fn batch_sync(
        &self,
        conversation_id: ConversationId,
        messages: &[ChatMessage],
    ) -> Result<(), CacheError>;
}

/// In-memory cache implementation for testing and development.
///
/// All state is wrapped in Arc<Mutex<>> to allow Clone and concurrent
/// access. Uses `lock().expect()` which will panic if the mutex is
/// poisoned - acceptable for test code.
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    inner: Arc<Mutex<HashMap<ConversationId, Vec<ChatMessage>>>>,
}

impl MemoryCache {
    /// Create a new empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached messages for a conversation, oldest first.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned (a thread panicked while
    /// holding the lock). This is acceptable for test code.
    #[allow(clippy::expect_used)]
    #[must_use]
    pub fn messages(&self, conversation_id: ConversationId) -> Vec<ChatMessage> {
        self.inner.lock().expect("Mutex poisoned").get(&conversation_id).cloned().unwrap_or_default()
    }

    /// Number of conversations with cached messages.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned. This is acceptable for
    /// test code.
    #[allow(clippy::expect_used)]
    #[must_use]
    pub fn conversation_count(&self) -> usize {
        self.inner.lock().expect("Mutex poisoned").len()
    }
}

impl CacheBridge for MemoryCache {
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned. This is acceptable for
    /// test code.
    #[allow(clippy::expect_used)]
    fn add_message(&self, message: &ChatMessage) -> Result<(), CacheError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");
        let messages = inner.entry(message.conversation_id).or_default();
        if let Some(existing) =
            messages.iter_mut().find(|cached| cached.id.is_some() && cached.id == message.id)
        {
            *existing = message.clone();
        } else {
            messages.push(message.clone());
        }
        Ok(())
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned. This is acceptable for
    /// test code.
    #[allow(clippy::expect_used)]
    fn batch_sync(
        &self,
        conversation_id: ConversationId,
        messages: &[ChatMessage],
    ) -> Result<(), CacheError> {
        self.inner.lock().expect("Mutex poisoned").insert(conversation_id, messages.to_vec());
        Ok(())
    }
}

/// Cache that discards every write.
///
/// The default for callers that render purely from broker state.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCache;

impl CacheBridge for NullCache {
    fn add_message(&self, _message: &ChatMessage) -> Result<(), CacheError> {
        Ok(())
    }

    fn batch_sync(
        &self,
        _conversation_id: ConversationId,
        _messages: &[ChatMessage],
    ) -> Result<(), CacheError> {
        Ok(())
    }
}
