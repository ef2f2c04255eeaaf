//! Transport abstraction for the broker link.
//!
//! The [`Transport`] trait decouples the client task from a specific wire
//! transport. Production uses the WebSocket implementation behind the
//! `transport` feature; the simulation harness provides a deterministic
//! in-memory link. Protocol logic stays in the Sans-IO [`Engine`](crate::Engine);
//! a transport only moves frames.

use std::future::Future;

use hotline_proto::Frame;

/// Events a transport surfaces to the client task.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The link is established and frames can flow.
    Opened,

    /// A frame arrived from the broker.
    Frame(Frame),

    /// The link dropped.
    Closed {
        /// Close reason, if the transport observed one.
        reason: Option<String>,
    },
}

/// Abstracts the broker connection.
///
/// Implementations provide platform-specific I/O while the client task
/// handles orchestration. The same orchestration code runs over the
/// production WebSocket link and the simulated link in tests.
///
/// # Associated Types
///
/// - [`Error`](Transport::Error): Platform-specific error type
pub trait Transport: Send {
    /// Platform-specific error type.
    type Error: std::error::Error + Send + 'static;

    /// Establish a link to the broker at `url`.
    ///
    /// On success the transport emits [`TransportEvent::Opened`] through
    /// [`recv`](Transport::recv) once frames can flow.
    ///
    /// # Errors
    ///
    /// Returns an error if the dial fails or times out.
    fn connect(&mut self, url: &str) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Send a frame to the broker.
    ///
    /// # Errors
    ///
    /// Returns an error if the link is down or the send fails.
    fn send(&mut self, frame: Frame) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Receive the next transport event.
    ///
    /// Returns `None` once the link is torn down and no buffered events
    /// remain.
    fn recv(&mut self) -> impl Future<Output = Option<TransportEvent>> + Send;

    /// Check if a link is currently up.
    fn is_connected(&self) -> bool;

    /// Tear down the link and discard buffered events.
    fn close(&mut self);
}
