//! In-memory transport with a scriptable link.
//!
//! [`SimTransport`] implements [`Transport`] over channels instead of a
//! socket, with a [`SimBroker`] answering on the far side. The paired
//! [`SimNet`] handle stays with the test and operates the link from
//! outside: sever it, refuse dials, drop outbound frames, or inject
//! broker-originated traffic. This lets the full client task run its
//! production select loop while the test plays network.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use hotline_client::transport::{Transport, TransportEvent};
use hotline_proto::{ConversationId, Frame, UserId};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::sim_broker::SimBroker;

/// Error type for the simulated link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimTransportError {
    /// The scripted link refused the dial.
    Refused,
    /// The link is not connected.
    LinkDown,
}

impl std::fmt::Display for SimTransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Refused => write!(f, "dial refused by simulation"),
            Self::LinkDown => write!(f, "simulated link is down"),
        }
    }
}

impl std::error::Error for SimTransportError {}

/// Link state shared between the transport and its [`SimNet`] handle.
struct LinkState {
    broker: SimBroker,
    to_client: Option<UnboundedSender<TransportEvent>>,
    sent: Vec<Frame>,
    refuse_dials: u32,
    drop_outbound: bool,
    connected: bool,
    dials: u32,
}

fn lock(shared: &Mutex<LinkState>) -> MutexGuard<'_, LinkState> {
    // A poisoned lock only means another test thread panicked; the state
    // itself stays usable.
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Channel-backed [`Transport`] implementation for simulation tests.
pub struct SimTransport {
    shared: Arc<Mutex<LinkState>>,
    events: Option<UnboundedReceiver<TransportEvent>>,
}

impl SimTransport {
    /// Create a transport wired to `broker`, plus the [`SimNet`] handle
    /// that controls the link.
    #[must_use]
    pub fn new(broker: SimBroker) -> (Self, SimNet) {
        let shared = Arc::new(Mutex::new(LinkState {
            broker,
            to_client: None,
            sent: Vec::new(),
            refuse_dials: 0,
            drop_outbound: false,
            connected: false,
            dials: 0,
        }));
        (Self { shared: Arc::clone(&shared), events: None }, SimNet { shared })
    }
}

impl Transport for SimTransport {
    type Error = SimTransportError;

    async fn connect(&mut self, _url: &str) -> Result<(), Self::Error> {
        let mut state = lock(&self.shared);
        state.dials += 1;
        if state.refuse_dials > 0 {
            state.refuse_dials -= 1;
            return Err(SimTransportError::Refused);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        // Opened is queued before the task can poll recv, mirroring a
        // socket that is usable the moment the dial resolves.
        let _ = tx.send(TransportEvent::Opened);
        state.to_client = Some(tx);
        state.connected = true;
        drop(state);
        self.events = Some(rx);
        Ok(())
    }

    async fn send(&mut self, frame: Frame) -> Result<(), Self::Error> {
        let mut state = lock(&self.shared);
        if !state.connected {
            return Err(SimTransportError::LinkDown);
        }
        state.sent.push(frame.clone());
        if state.drop_outbound {
            tracing::debug!("simulated link dropping outbound frame");
            return Ok(());
        }
        let Some(tx) = state.to_client.clone() else {
            return Err(SimTransportError::LinkDown);
        };
        let replies = state.broker.handle_frame(&frame);
        drop(state);
        for reply in replies {
            let _ = tx.send(TransportEvent::Frame(reply));
        }
        Ok(())
    }

    async fn recv(&mut self) -> Option<TransportEvent> {
        match self.events.as_mut() {
            Some(events) => events.recv().await,
            None => None,
        }
    }

    fn is_connected(&self) -> bool {
        lock(&self.shared).connected
    }

    fn close(&mut self) {
        self.events = None;
        let mut state = lock(&self.shared);
        state.to_client = None;
        state.connected = false;
    }
}

/// Test-side handle operating the simulated link.
#[derive(Clone)]
pub struct SimNet {
    shared: Arc<Mutex<LinkState>>,
}

impl SimNet {
    /// Drop the link, queueing a close event for the client.
    ///
    /// `connected` stays true until the client task observes the close
    /// and hangs up itself; flipping it here would stop the task from
    /// polling the transport and the close event would never drain.
    pub fn sever(&self, reason: &str) {
        let mut state = lock(&self.shared);
        if let Some(tx) = state.to_client.take() {
            let _ = tx.send(TransportEvent::Closed { reason: Some(reason.to_string()) });
        }
    }

    /// Refuse the next `count` dials.
    pub fn refuse_next_dials(&self, count: u32) {
        lock(&self.shared).refuse_dials = count;
    }

    /// Silently discard outbound frames while enabled.
    ///
    /// Frames are still recorded in the sent log; the broker never sees
    /// them.
    pub fn set_drop_outbound(&self, enabled: bool) {
        lock(&self.shared).drop_outbound = enabled;
    }

    /// Push broker-originated frames to the client.
    ///
    /// Frames injected while the link is down vanish, like traffic in
    /// flight to a dead socket.
    pub fn inject(&self, frames: Vec<Frame>) {
        let state = lock(&self.shared);
        if let Some(tx) = &state.to_client {
            for frame in frames {
                let _ = tx.send(TransportEvent::Frame(frame));
            }
        }
    }

    /// Run `operate` against the broker behind the link.
    pub fn with_broker<R>(&self, operate: impl FnOnce(&mut SimBroker) -> R) -> R {
        operate(&mut lock(&self.shared).broker)
    }

    /// Compose a peer message in the broker and deliver it to the client.
    pub fn deliver_new_message(
        &self,
        conversation_id: ConversationId,
        sender_id: UserId,
        sender_name: &str,
        content: &str,
    ) {
        let frames = self.with_broker(|broker| {
            broker.compose_peer_message(conversation_id, sender_id, sender_name, content)
        });
        self.inject(frames);
    }

    /// Compose a peer typing change and deliver it to the client.
    pub fn deliver_typing(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
        user_name: &str,
        is_typing: bool,
    ) {
        let frames = self.with_broker(|broker| {
            broker.compose_typing(conversation_id, user_id, user_name, is_typing)
        });
        self.inject(frames);
    }

    /// Copy of every frame the client has pushed into the link.
    #[must_use]
    pub fn sent_frames(&self) -> Vec<Frame> {
        lock(&self.shared).sent.clone()
    }

    /// Drain the sent-frame log.
    pub fn take_sent(&self) -> Vec<Frame> {
        std::mem::take(&mut lock(&self.shared).sent)
    }

    /// Number of dial attempts, including refused ones.
    #[must_use]
    pub fn dial_count(&self) -> u32 {
        lock(&self.shared).dials
    }
}
