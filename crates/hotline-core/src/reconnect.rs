//! Connection lifecycle state machine.
//!
//! Manages dialing, handshake, heartbeats, timeouts, and bounded
//! exponential-backoff reconnection. Uses the action pattern: methods take
//! time as input and return actions for the runtime to execute. This keeps
//! the state machine pure (no I/O) and makes testing straightforward.
//!
//! # State Machine
//!
//! ```text
//! ┌──────┐ connect  ┌─────────┐  opened   ┌─────────────┐ HelloReply ┌───────────┐
//! │ Idle │─────────>│ Dialing │──────────>│ Handshaking │───────────>│ Connected │
//! └──────┘          └─────────┘           └─────────────┘            └───────────┘
//!                      ↑   │ lost/timeout       │ lost/timeout            │ lost/idle
//!                      │   ↓                    ↓                         ↓
//!                      │ ┌─────────────────────────────────────────────────┐
//!                 due  └─│ Backoff(attempt n, delay = base * 2^(n-1))      │
//!                        └─────────────────────────────────────────────────┘
//!                                          │ attempts exhausted
//!                                          ↓
//!                                     ┌────────┐  (explicit connect only)
//!                                     │ Failed │─────────────────────> Dialing
//!                                     └────────┘
//! ```
//!
//! Every successful handshake resets the attempt counter to zero. The
//! supervisor never re-joins conversations or re-fetches history itself;
//! the engine reacts to the Connected transition and drives
//! resynchronization explicitly.

use std::{
    ops::Sub,
    time::{Duration, Instant},
};

use serde::Serialize;

use crate::error::SupervisorError;

/// Delay before the first automatic reconnect attempt.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Automatic reconnect attempts before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Time allowed for the transport dial to complete.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Time allowed to complete the `Hello`/`HelloReply` handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum time without inbound activity before the connection is presumed
/// dead.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Interval at which keepalive pings are sent while connected.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(20);

/// Actions returned by the supervisor state machine.
///
/// The runtime executes these; the supervisor itself never constructs
/// frames, so identity and timestamps stay out of the core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorAction {
    /// Open a transport connection.
    Dial,

    /// Tear down the transport connection, if any.
    HangUp,

    /// Send the `Hello` handshake frame.
    SendHello,

    /// Send a keepalive `Ping` frame.
    SendPing,

    /// Connection status changed; notify subscribers.
    StatusChanged(ConnectionStatus),
}

/// Supervisor phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorPhase {
    /// No connection and none scheduled.
    Idle,
    /// Transport dial in flight.
    Dialing,
    /// Transport open; `Hello` sent, awaiting `HelloReply`.
    Handshaking,
    /// Handshake complete; connection usable.
    Connected,
    /// Waiting out the backoff delay before the next dial.
    Backoff,
    /// Attempts exhausted. Terminal until an explicit connect.
    Failed,
}

/// Process-wide connection status snapshot, derived from the phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    /// A usable (handshake-complete) connection exists.
    pub connected: bool,
    /// A connection attempt is in flight or scheduled.
    pub connecting: bool,
    /// Last connection error, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Supervisor configuration.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Base backoff delay; attempt `n` waits `base_delay * 2^(n-1)`.
    pub base_delay: Duration,
    /// Automatic reconnect attempts before transitioning to `Failed`.
    pub max_attempts: u32,
    /// Timeout for the transport dial.
    pub connect_timeout: Duration,
    /// Timeout for completing the handshake after the transport opens.
    pub handshake_timeout: Duration,
    /// Inbound-idle timeout while connected.
    pub idle_timeout: Duration,
    /// Heartbeat interval (should be < `idle_timeout` / 2).
    pub heartbeat_interval: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }
}

/// Reconnection supervisor state machine.
///
/// Owns the connection lifecycle across transport generations: one
/// supervisor outlives many connections. This is a pure state machine (no
/// I/O, no Environment storage); time is passed as parameters to methods
/// that need it.
///
/// Generic over `Instant` to support both real time and virtual time for
/// deterministic testing. Only subtraction is required of the instant type,
/// so backoff deadlines are stored as a phase start plus a `Duration`.
#[derive(Debug, Clone)]
pub struct ReconnectSupervisor<I = Instant>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Current phase
    phase: SupervisorPhase,
    /// Configuration
    config: ReconnectConfig,
    /// Index of the attempt currently scheduled or in flight (0 = none)
    attempt: u32,
    /// When the current phase was entered
    phase_since: I,
    /// Backoff delay for the scheduled attempt (meaningful in Backoff)
    backoff_delay: Duration,
    /// Last inbound activity timestamp (meaningful while connected)
    last_activity: I,
    /// Last heartbeat sent timestamp
    last_heartbeat: Option<I>,
    /// Session id assigned by the broker's `HelloReply`
    session_id: Option<u64>,
    /// Most recent connection error
    last_error: Option<String>,
}

impl<I> ReconnectSupervisor<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Create a new supervisor in [`SupervisorPhase::Idle`].
    pub fn new(now: I, config: ReconnectConfig) -> Self {
        Self {
            phase: SupervisorPhase::Idle,
            config,
            attempt: 0,
            phase_since: now,
            backoff_delay: Duration::ZERO,
            last_activity: now,
            last_heartbeat: None,
            session_id: None,
            last_error: None,
        }
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> SupervisorPhase {
        self.phase
    }

    /// Index of the attempt currently scheduled or in flight. Zero when
    /// idle or connected.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Session id from the broker's `HelloReply`. `None` unless connected.
    #[must_use]
    pub fn session_id(&self) -> Option<u64> {
        self.session_id
    }

    /// Remaining backoff before the next dial. `None` outside Backoff.
    #[must_use]
    pub fn backoff_remaining(&self, now: I) -> Option<Duration> {
        if self.phase != SupervisorPhase::Backoff {
            return None;
        }
        Some(self.backoff_delay.saturating_sub(now - self.phase_since))
    }

    /// Status snapshot for consumers.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        match self.phase {
            SupervisorPhase::Connected => {
                ConnectionStatus { connected: true, connecting: false, error: None }
            },
            SupervisorPhase::Dialing | SupervisorPhase::Handshaking | SupervisorPhase::Backoff => {
                ConnectionStatus {
                    connected: false,
                    connecting: true,
                    error: self.last_error.clone(),
                }
            },
            SupervisorPhase::Idle => {
                ConnectionStatus { connected: false, connecting: false, error: None }
            },
            SupervisorPhase::Failed => ConnectionStatus {
                connected: false,
                connecting: false,
                error: self.last_error.clone(),
            },
        }
    }

    /// Begin connecting (explicit user intent).
    ///
    /// Exits `Idle`, `Backoff`, or the terminal `Failed` phase and dials
    /// immediately with a fresh attempt counter. A no-op when a connection
    /// already exists or is being established.
    pub fn connect(&mut self, now: I) -> Vec<SupervisorAction> {
        match self.phase {
            SupervisorPhase::Dialing
            | SupervisorPhase::Handshaking
            | SupervisorPhase::Connected => vec![],
            SupervisorPhase::Idle | SupervisorPhase::Backoff | SupervisorPhase::Failed => {
                self.attempt = 0;
                self.last_error = None;
                self.enter(SupervisorPhase::Dialing, now);
                vec![SupervisorAction::Dial, SupervisorAction::StatusChanged(self.status())]
            },
        }
    }

    /// Stop connecting and stay disconnected (explicit user intent).
    ///
    /// Cancels any scheduled reconnect and resets the attempt counter.
    pub fn disconnect(&mut self, now: I) -> Vec<SupervisorAction> {
        if self.phase == SupervisorPhase::Idle {
            return vec![];
        }

        let had_transport = matches!(
            self.phase,
            SupervisorPhase::Dialing | SupervisorPhase::Handshaking | SupervisorPhase::Connected
        );

        self.attempt = 0;
        self.session_id = None;
        self.last_error = None;
        self.enter(SupervisorPhase::Idle, now);

        let mut actions = Vec::new();
        if had_transport {
            actions.push(SupervisorAction::HangUp);
        }
        actions.push(SupervisorAction::StatusChanged(self.status()));
        actions
    }

    /// Transport reported an open connection.
    ///
    /// Ignored unless a dial is in flight (a late open after `disconnect`
    /// is possible; the runtime's `HangUp` will tear it down).
    pub fn transport_opened(&mut self, now: I) -> Vec<SupervisorAction> {
        if self.phase != SupervisorPhase::Dialing {
            return vec![];
        }

        self.enter(SupervisorPhase::Handshaking, now);
        self.last_activity = now;
        vec![SupervisorAction::SendHello]
    }

    /// Transport reported a closed or failed connection.
    ///
    /// From `Dialing`/`Handshaking` this counts as a failed attempt; from
    /// `Connected` it starts a fresh reconnection sequence. Ignored in
    /// phases with no transport.
    pub fn transport_closed(&mut self, reason: Option<String>, now: I) -> Vec<SupervisorAction> {
        match self.phase {
            SupervisorPhase::Dialing
            | SupervisorPhase::Handshaking
            | SupervisorPhase::Connected => self.connection_lost(reason, now),
            SupervisorPhase::Idle | SupervisorPhase::Backoff | SupervisorPhase::Failed => vec![],
        }
    }

    /// Handshake completed (`HelloReply` received).
    ///
    /// # Errors
    ///
    /// - `SupervisorError::InvalidPhase` if no handshake is in flight; the
    ///   caller should treat the triggering frame as unexpected.
    pub fn handshake_complete(
        &mut self,
        session_id: u64,
        now: I,
    ) -> Result<Vec<SupervisorAction>, SupervisorError> {
        if self.phase != SupervisorPhase::Handshaking {
            return Err(SupervisorError::InvalidPhase {
                phase: self.phase,
                operation: "handshake_complete",
            });
        }

        self.attempt = 0;
        self.session_id = Some(session_id);
        self.last_error = None;
        self.last_heartbeat = None;
        self.enter(SupervisorPhase::Connected, now);
        self.last_activity = now;

        Ok(vec![SupervisorAction::StatusChanged(self.status())])
    }

    /// Record inbound activity (call when receiving frames).
    pub fn activity(&mut self, now: I) {
        if matches!(self.phase, SupervisorPhase::Connected | SupervisorPhase::Handshaking) {
            self.last_activity = now;
        }
    }

    /// Process periodic maintenance: due backoffs, phase timeouts, and
    /// heartbeats.
    pub fn tick(&mut self, now: I) -> Vec<SupervisorAction> {
        match self.phase {
            SupervisorPhase::Backoff => {
                if now - self.phase_since >= self.backoff_delay {
                    self.enter(SupervisorPhase::Dialing, now);
                    vec![SupervisorAction::Dial]
                } else {
                    vec![]
                }
            },

            SupervisorPhase::Dialing => {
                let elapsed = now - self.phase_since;
                if elapsed > self.config.connect_timeout {
                    let mut actions = vec![SupervisorAction::HangUp];
                    actions.extend(self.connection_lost(
                        Some(format!("connect timeout after {elapsed:?}")),
                        now,
                    ));
                    actions
                } else {
                    vec![]
                }
            },

            SupervisorPhase::Handshaking => {
                let elapsed = now - self.phase_since;
                if elapsed > self.config.handshake_timeout {
                    let mut actions = vec![SupervisorAction::HangUp];
                    actions.extend(self.connection_lost(
                        Some(format!("handshake timeout after {elapsed:?}")),
                        now,
                    ));
                    actions
                } else {
                    vec![]
                }
            },

            SupervisorPhase::Connected => {
                let idle = now - self.last_activity;
                if idle > self.config.idle_timeout {
                    let mut actions = vec![SupervisorAction::HangUp];
                    actions.extend(
                        self.connection_lost(Some(format!("idle timeout after {idle:?}")), now),
                    );
                    return actions;
                }

                let heartbeat_due = match self.last_heartbeat {
                    None => true,
                    Some(last) => now - last >= self.config.heartbeat_interval,
                };

                if heartbeat_due {
                    self.last_heartbeat = Some(now);
                    vec![SupervisorAction::SendPing]
                } else {
                    vec![]
                }
            },

            SupervisorPhase::Idle | SupervisorPhase::Failed => vec![],
        }
    }

    fn enter(&mut self, phase: SupervisorPhase, now: I) {
        self.phase = phase;
        self.phase_since = now;
    }

    /// Shared involuntary-loss path: schedule the next attempt or give up.
    fn connection_lost(&mut self, reason: Option<String>, now: I) -> Vec<SupervisorAction> {
        self.session_id = None;
        if reason.is_some() {
            self.last_error = reason;
        }

        let next = self.attempt + 1;
        if next > self.config.max_attempts {
            if self.last_error.is_none() {
                self.last_error = Some(format!(
                    "reconnect attempts exhausted after {} attempts",
                    self.config.max_attempts
                ));
            }
            self.enter(SupervisorPhase::Failed, now);
            return vec![SupervisorAction::StatusChanged(self.status())];
        }

        self.attempt = next;
        // Shift capped so hostile configs cannot overflow the multiplier.
        let exponent = (next - 1).min(16);
        self.backoff_delay = self.config.base_delay * (1u32 << exponent);
        self.enter(SupervisorPhase::Backoff, now);

        vec![SupervisorAction::StatusChanged(self.status())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connected_supervisor(t0: Instant) -> ReconnectSupervisor {
        let mut sup = ReconnectSupervisor::new(t0, ReconnectConfig::default());
        sup.connect(t0);
        sup.transport_opened(t0);
        sup.handshake_complete(77, t0).unwrap();
        sup
    }

    #[test]
    fn initial_state_is_idle() {
        let t0 = Instant::now();
        let sup = ReconnectSupervisor::new(t0, ReconnectConfig::default());

        assert_eq!(sup.phase(), SupervisorPhase::Idle);
        assert_eq!(sup.attempt(), 0);
        assert_eq!(
            sup.status(),
            ConnectionStatus { connected: false, connecting: false, error: None }
        );
    }

    #[test]
    fn connect_dials_immediately() {
        let t0 = Instant::now();
        let mut sup = ReconnectSupervisor::new(t0, ReconnectConfig::default());

        let actions = sup.connect(t0);
        assert_eq!(sup.phase(), SupervisorPhase::Dialing);
        assert_eq!(actions[0], SupervisorAction::Dial);
        assert!(matches!(
            actions[1],
            SupervisorAction::StatusChanged(ConnectionStatus { connecting: true, .. })
        ));
    }

    #[test]
    fn connect_while_connected_is_noop() {
        let t0 = Instant::now();
        let mut sup = connected_supervisor(t0);

        assert!(sup.connect(t0).is_empty());
        assert_eq!(sup.phase(), SupervisorPhase::Connected);
    }

    #[test]
    fn full_connect_lifecycle() {
        let t0 = Instant::now();
        let mut sup = ReconnectSupervisor::new(t0, ReconnectConfig::default());

        sup.connect(t0);
        let actions = sup.transport_opened(t0);
        assert_eq!(actions, vec![SupervisorAction::SendHello]);
        assert_eq!(sup.phase(), SupervisorPhase::Handshaking);

        let actions = sup.handshake_complete(42, t0).unwrap();
        assert_eq!(sup.phase(), SupervisorPhase::Connected);
        assert_eq!(sup.session_id(), Some(42));
        assert!(matches!(
            actions[0],
            SupervisorAction::StatusChanged(ConnectionStatus { connected: true, .. })
        ));
    }

    #[test]
    fn handshake_complete_outside_handshaking_errors() {
        let t0 = Instant::now();
        let mut sup = ReconnectSupervisor::new(t0, ReconnectConfig::default());

        let result = sup.handshake_complete(1, t0);
        assert!(matches!(result, Err(SupervisorError::InvalidPhase { .. })));
    }

    #[test]
    fn backoff_delays_double_per_attempt() {
        let t0 = Instant::now();
        let mut sup = connected_supervisor(t0);

        // Attempt 1: 1s delay.
        sup.transport_closed(Some("connection reset".to_string()), t0);
        assert_eq!(sup.phase(), SupervisorPhase::Backoff);
        assert_eq!(sup.attempt(), 1);
        assert!(sup.tick(t0 + Duration::from_millis(999)).is_empty());
        let actions = sup.tick(t0 + Duration::from_secs(1));
        assert_eq!(actions, vec![SupervisorAction::Dial]);

        // Attempt 2: 2s delay.
        let t1 = t0 + Duration::from_secs(1);
        sup.transport_closed(None, t1);
        assert_eq!(sup.attempt(), 2);
        assert!(sup.tick(t1 + Duration::from_millis(1999)).is_empty());
        assert_eq!(sup.tick(t1 + Duration::from_secs(2)), vec![SupervisorAction::Dial]);

        // Attempt 3: 4s delay.
        let t2 = t1 + Duration::from_secs(2);
        sup.transport_closed(None, t2);
        assert_eq!(sup.attempt(), 3);
        assert!(sup.tick(t2 + Duration::from_millis(3999)).is_empty());
        assert_eq!(sup.tick(t2 + Duration::from_secs(4)), vec![SupervisorAction::Dial]);
    }

    #[test]
    fn attempts_exhausted_is_terminal() {
        let t0 = Instant::now();
        let mut sup = connected_supervisor(t0);
        let mut t = t0;

        // Burn through all five automatic attempts.
        for expected_attempt in 1..=5 {
            sup.transport_closed(Some("down".to_string()), t);
            assert_eq!(sup.attempt(), expected_attempt);
            t += Duration::from_secs(60);
            assert_eq!(sup.tick(t), vec![SupervisorAction::Dial]);
        }

        // Sixth loss exceeds max_attempts.
        let actions = sup.transport_closed(Some("down".to_string()), t);
        assert_eq!(sup.phase(), SupervisorPhase::Failed);
        assert!(matches!(
            actions[0],
            SupervisorAction::StatusChanged(ConnectionStatus { error: Some(_), .. })
        ));

        // No automatic recovery, ever.
        assert!(sup.tick(t + Duration::from_secs(3600)).is_empty());

        // Explicit connect exits Failed with a fresh counter.
        let actions = sup.connect(t);
        assert_eq!(actions[0], SupervisorAction::Dial);
        assert_eq!(sup.phase(), SupervisorPhase::Dialing);
        assert_eq!(sup.attempt(), 0);
    }

    #[test]
    fn successful_handshake_resets_attempt_counter() {
        let t0 = Instant::now();
        let mut sup = connected_supervisor(t0);

        sup.transport_closed(None, t0);
        let t1 = t0 + Duration::from_secs(1);
        sup.tick(t1);
        sup.transport_closed(None, t1);
        assert_eq!(sup.attempt(), 2);

        // Second retry succeeds.
        let t2 = t1 + Duration::from_secs(2);
        sup.tick(t2);
        sup.transport_opened(t2);
        sup.handshake_complete(7, t2).unwrap();
        assert_eq!(sup.attempt(), 0);

        // A later loss starts over at attempt 1 with the base delay.
        let t3 = t2 + Duration::from_secs(30);
        sup.transport_closed(None, t3);
        assert_eq!(sup.attempt(), 1);
        assert_eq!(sup.backoff_remaining(t3), Some(Duration::from_secs(1)));
    }

    #[test]
    fn dial_timeout_counts_as_failed_attempt() {
        let t0 = Instant::now();
        let mut sup = ReconnectSupervisor::new(t0, ReconnectConfig::default());
        sup.connect(t0);

        let t1 = t0 + DEFAULT_CONNECT_TIMEOUT + Duration::from_secs(1);
        let actions = sup.tick(t1);
        assert_eq!(actions[0], SupervisorAction::HangUp);
        assert_eq!(sup.phase(), SupervisorPhase::Backoff);
        assert_eq!(sup.attempt(), 1);
    }

    #[test]
    fn handshake_timeout_counts_as_failed_attempt() {
        let t0 = Instant::now();
        let mut sup = ReconnectSupervisor::new(t0, ReconnectConfig::default());
        sup.connect(t0);
        sup.transport_opened(t0);

        let t1 = t0 + DEFAULT_HANDSHAKE_TIMEOUT + Duration::from_secs(1);
        let actions = sup.tick(t1);
        assert_eq!(actions[0], SupervisorAction::HangUp);
        assert_eq!(sup.phase(), SupervisorPhase::Backoff);
        assert_eq!(sup.attempt(), 1);
    }

    #[test]
    fn idle_timeout_triggers_reconnect() {
        let t0 = Instant::now();
        let mut sup = connected_supervisor(t0);

        let t1 = t0 + DEFAULT_IDLE_TIMEOUT + Duration::from_secs(1);
        let actions = sup.tick(t1);
        assert_eq!(actions[0], SupervisorAction::HangUp);
        assert_eq!(sup.phase(), SupervisorPhase::Backoff);
    }

    #[test]
    fn inbound_activity_defers_idle_timeout() {
        let t0 = Instant::now();
        let mut sup = connected_supervisor(t0);

        sup.activity(t0 + Duration::from_secs(50));

        // 61s after connect but only 11s after last activity.
        let t1 = t0 + Duration::from_secs(61);
        sup.tick(t1);
        assert_eq!(sup.phase(), SupervisorPhase::Connected);
    }

    #[test]
    fn heartbeat_cadence() {
        let t0 = Instant::now();
        let mut sup = connected_supervisor(t0);

        // First tick after connect sends the initial ping.
        assert_eq!(sup.tick(t0), vec![SupervisorAction::SendPing]);

        // Not due again yet.
        assert!(sup.tick(t0 + Duration::from_secs(10)).is_empty());

        // Due at the interval.
        assert_eq!(
            sup.tick(t0 + DEFAULT_HEARTBEAT_INTERVAL),
            vec![SupervisorAction::SendPing]
        );
    }

    #[test]
    fn disconnect_cancels_backoff() {
        let t0 = Instant::now();
        let mut sup = connected_supervisor(t0);
        sup.transport_closed(None, t0);
        assert_eq!(sup.phase(), SupervisorPhase::Backoff);

        let actions = sup.disconnect(t0);
        assert_eq!(sup.phase(), SupervisorPhase::Idle);
        assert_eq!(sup.attempt(), 0);
        // No transport exists in Backoff, so no HangUp.
        assert!(matches!(actions[0], SupervisorAction::StatusChanged(_)));

        // The cancelled attempt never fires.
        assert!(sup.tick(t0 + Duration::from_secs(10)).is_empty());
    }

    #[test]
    fn disconnect_while_connected_hangs_up() {
        let t0 = Instant::now();
        let mut sup = connected_supervisor(t0);

        let actions = sup.disconnect(t0);
        assert_eq!(actions[0], SupervisorAction::HangUp);
        assert_eq!(sup.phase(), SupervisorPhase::Idle);
        assert_eq!(sup.session_id(), None);
    }

    #[test]
    fn spurious_transport_events_ignored() {
        let t0 = Instant::now();
        let mut sup = ReconnectSupervisor::new(t0, ReconnectConfig::default());

        assert!(sup.transport_opened(t0).is_empty());
        assert!(sup.transport_closed(Some("late".to_string()), t0).is_empty());
        assert_eq!(sup.phase(), SupervisorPhase::Idle);
    }

    #[test]
    fn status_reflects_error_while_reconnecting() {
        let t0 = Instant::now();
        let mut sup = connected_supervisor(t0);
        sup.transport_closed(Some("connection reset".to_string()), t0);

        let status = sup.status();
        assert!(!status.connected);
        assert!(status.connecting);
        assert_eq!(status.error.as_deref(), Some("connection reset"));
    }
}
