//! Environment abstraction for deterministic testing.
//!
//! Decouples engine logic from system resources (time, randomness). The
//! simulation harness supplies a virtual clock and a seeded RNG; production
//! uses [`SystemEnv`].

use std::time::Duration;

use rand::RngCore;

/// Abstract environment providing time, randomness, and async primitives.
///
/// # Safety
///
/// Implementations MUST guarantee:
///
/// - `now()` never goes backwards
/// - `random_bytes()` uses cryptographically secure entropy in production
/// - Methods are infallible except in exceptional circumstances (e.g., OS
///   entropy exhaustion, incorrect simulation setup)
pub trait Environment: Clone + Send + Sync + 'static {
    /// The specific instant type used by this environment.
    ///
    /// Production environments use `std::time::Instant`, while simulation
    /// environments use virtual time.
    type Instant: Copy + Ord + Send + Sync + std::ops::Sub<Output = Duration>;

    /// Current time (monotonic).
    ///
    /// # Invariants
    ///
    /// - This method MUST return values that never decrease within a single
    ///   execution context. Subsequent calls must return times >= previous
    ///   calls.
    fn now(&self) -> Self::Instant;

    /// Current wall-clock time in Unix milliseconds.
    ///
    /// Used only to stamp outgoing messages; all timeout arithmetic uses the
    /// monotonic [`Self::now`]. Unlike `now()`, this MAY jump backwards if
    /// the system clock is adjusted.
    fn wall_clock_millis(&self) -> u64;

    /// Sleeps for the specified duration.
    ///
    /// This is the ONLY async method in the trait, and it should only be
    /// used by runtime code (not engine logic).
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fills the provided buffer with random bytes.
    ///
    /// # Invariants
    ///
    /// - Given the same RNG seed, this produces the same sequence of bytes
    /// - Uses cryptographically secure RNG
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u64`.
    ///
    /// This is a convenience method for common use cases like generating
    /// optimistic ids.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }

    /// Generates a random `u128`.
    ///
    /// Useful for conversation UUIDs.
    fn random_u128(&self) -> u128 {
        let mut bytes = [0u8; 16];
        self.random_bytes(&mut bytes);
        u128::from_be_bytes(bytes)
    }
}

/// Production environment backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl Environment for SystemEnv {
    type Instant = std::time::Instant;

    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    fn wall_clock_millis(&self) -> u64 {
        // Pre-epoch clocks collapse to 0 rather than erroring; message
        // timestamps are display data, not ordering keys.
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        rand::thread_rng().fill_bytes(buffer);
    }
}

pub mod test_utils {
    //! Deterministic environment for unit tests.
    //!
    //! Shared across crates so engine and harness tests control time and
    //! entropy the same way. Not gated behind `cfg(test)` because dependent
    //! crates use it from their own test code.

    use std::{
        sync::{Arc, Mutex, MutexGuard},
        time::{Duration, Instant},
    };

    use rand::{RngCore, SeedableRng, rngs::StdRng};

    use super::Environment;

    /// Wall-clock origin for mock environments (2023-11-14T22:13:20Z).
    ///
    /// A fixed, recognizable value so timestamps in test failures and
    /// snapshots are stable across runs.
    pub const MOCK_WALL_CLOCK_BASE: u64 = 1_700_000_000_000;

    #[derive(Debug)]
    struct MockState {
        base: Instant,
        offset: Duration,
        rng: StdRng,
    }

    /// Deterministic [`Environment`]: a controllable clock and a seeded RNG.
    ///
    /// Clones share state, so advancing time on one handle is visible to
    /// all. `now()` is an ordinary `std::time::Instant` offset from a base
    /// captured at construction; tests advance it explicitly and real time
    /// never leaks in.
    #[derive(Debug, Clone)]
    pub struct MockEnv {
        state: Arc<Mutex<MockState>>,
    }

    impl MockEnv {
        /// Create a mock environment with seed 0.
        #[must_use]
        pub fn new() -> Self {
            Self::with_seed(0)
        }

        /// Create a mock environment with the given RNG seed.
        #[must_use]
        pub fn with_seed(seed: u64) -> Self {
            Self {
                state: Arc::new(Mutex::new(MockState {
                    base: Instant::now(),
                    offset: Duration::ZERO,
                    rng: StdRng::seed_from_u64(seed),
                })),
            }
        }

        /// Advance the virtual clock.
        pub fn advance(&self, delta: Duration) {
            self.lock().offset += delta;
        }

        fn lock(&self) -> MutexGuard<'_, MockState> {
            // A poisoned lock only means another test thread panicked; the
            // state itself stays usable.
            self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
        }
    }

    impl Default for MockEnv {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Environment for MockEnv {
        type Instant = Instant;

        fn now(&self) -> Instant {
            let state = self.lock();
            state.base + state.offset
        }

        fn wall_clock_millis(&self) -> u64 {
            let offset = self.lock().offset;
            MOCK_WALL_CLOCK_BASE + u64::try_from(offset.as_millis()).unwrap_or(u64::MAX)
        }

        fn sleep(&self, _duration: Duration) -> impl std::future::Future<Output = ()> + Send {
            // Virtual time has no scheduler; sleeps resolve immediately.
            std::future::ready(())
        }

        fn random_bytes(&self, buffer: &mut [u8]) {
            self.lock().rng.fill_bytes(buffer);
        }
    }
}
