//! Fault injection for the cache bridge.
//!
//! [`FlakyCache`] wraps any [`CacheBridge`] and fails a configurable
//! fraction of writes. The cache contract says a failed write is logged
//! and never surfaces to the engine; chaos tests use this wrapper to
//! prove conversation state stays identical no matter how unreliable
//! the durable store is.

use std::sync::{Arc, Mutex, PoisonError};

use hotline_client::{CacheBridge, CacheError};
use hotline_proto::{ChatMessage, ConversationId};

/// Deterministic RNG for failure injection.
///
/// A linear congruential generator keeps chaos runs reproducible from a
/// seed without pulling thread-local randomness into test behavior.
struct ChaosRng {
    state: u64,
}

impl ChaosRng {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Next value in [0.0, 1.0).
    fn next_unit(&mut self) -> f64 {
        // LCG constants from Numerical Recipes
        const A: u64 = 1_664_525;
        const C: u64 = 1_013_904_223;
        const M: u64 = 1u64 << 32;

        self.state = (A.wrapping_mul(self.state).wrapping_add(C)) % M;
        (self.state as f64) / (M as f64)
    }

    fn should_fail(&mut self, failure_rate: f64) -> bool {
        self.next_unit() < failure_rate
    }
}

/// Cache bridge wrapper that randomly fails writes.
///
/// Delegates to an inner bridge but rejects operations with probability
/// `failure_rate`. Clones share the RNG and the attempt counter, so a
/// handle kept by the test observes the writes made by the runtime's
/// copy.
#[derive(Clone)]
pub struct FlakyCache<C: CacheBridge> {
    inner: C,
    /// Failure rate (0.0 = never fail, 1.0 = always fail)
    failure_rate: f64,
    rng: Arc<Mutex<ChaosRng>>,
    write_attempts: Arc<Mutex<usize>>,
}

impl<C: CacheBridge> FlakyCache<C> {
    /// Wrap `inner` with the default chaos seed.
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    #[must_use]
    pub fn new(inner: C, failure_rate: f64) -> Self {
        Self::with_seed(inner, failure_rate, 0x1234_5678_9ABC_DEF0)
    }

    /// Wrap `inner` with an explicit seed for reproducible chaos.
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    #[must_use]
    pub fn with_seed(inner: C, failure_rate: f64, seed: u64) -> Self {
        assert!(
            (0.0..=1.0).contains(&failure_rate),
            "failure_rate must be between 0.0 and 1.0, got {failure_rate}"
        );

        Self {
            inner,
            failure_rate,
            rng: Arc::new(Mutex::new(ChaosRng::new(seed))),
            write_attempts: Arc::new(Mutex::new(0)),
        }
    }

    /// Underlying bridge, for checking what survived the chaos.
    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// Number of writes attempted, failed ones included.
    #[must_use]
    pub fn write_attempts(&self) -> usize {
        // A poisoned lock only means another test thread panicked; the
        // state itself stays usable.
        *self.write_attempts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record_attempt(&self) -> bool {
        *self.write_attempts.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        self.rng.lock().unwrap_or_else(PoisonError::into_inner).should_fail(self.failure_rate)
    }
}

impl<C: CacheBridge> CacheBridge for FlakyCache<C> {
    fn add_message(&self, message: &ChatMessage) -> Result<(), CacheError> {
        if self.record_attempt() {
            return Err(CacheError::Io("injected cache failure".to_string()));
        }
        self.inner.add_message(message)
    }

    fn batch_sync(
        &self,
        conversation_id: ConversationId,
        messages: &[ChatMessage],
    ) -> Result<(), CacheError> {
        if self.record_attempt() {
            return Err(CacheError::Io("injected cache failure".to_string()));
        }
        self.inner.batch_sync(conversation_id, messages)
    }
}
