//! Deterministic simulation harness for hotline client testing.
//!
//! In-memory implementations of the transport and cache seams so the
//! full client stack runs under test control: a scriptable broker
//! double, a severable link, fault-injecting cache writes, and the
//! model oracle that mirrors engine semantics.
//!
//! # Model-Based Testing
//!
//! The `model` module provides a reference implementation for
//! model-based testing. Operations are applied to both the model and
//! the real engine, and their observable states are compared after
//! every step.
//!
//! # Invariant Testing
//!
//! The `invariants` module provides behavioral testing through
//! invariant checks. Invariants verify WHAT must be true across all
//! execution paths, not specific scenarios. Use
//! [`InvariantRegistry::standard()`] for the common engine invariants.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod chaos;
pub mod invariants;
pub mod model;
pub mod sim_broker;
pub mod sim_transport;

pub use chaos::FlakyCache;
pub use invariants::{
    ClientSnapshot, ConversationSnapshot, Invariant, InvariantRegistry, InvariantResult,
    MessageFacts, SystemSnapshot, Violation,
};
pub use model::{
    ModelBroker, ModelConversationId, ModelWorld, ObservableState, Operation, OperationError,
    OperationResult, SmallText,
};
pub use sim_broker::{BrokerScript, SimBroker};
pub use sim_transport::{SimNet, SimTransport, SimTransportError};
