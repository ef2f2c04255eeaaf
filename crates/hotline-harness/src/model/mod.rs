//! Model-based testing infrastructure.
//!
//! [`ModelWorld`] is a simplified oracle for client-side chat state: it
//! applies the same operations as the real engine but tracks only
//! observable outcomes, with none of the transport, timing, or registry
//! machinery. A test drives both worlds with one operation sequence and
//! compares [`ModelWorld::observable_state`] against the engine's after
//! every step; any divergence is a reconciliation bug in one of them.
//!
//! Operations derive [`arbitrary::Arbitrary`], so the same enum feeds
//! proptest strategies and fuzz targets.

pub mod client;
pub mod operation;
pub mod world;

pub use client::{ModelConversation, ModelMessage};
pub use operation::{ModelConversationId, Operation, OperationError, OperationResult, SmallText};
pub use world::{
    ConversationView, Delivery, HistoryPage, MessageView, ModelBroker, ModelWorld,
    ObservableState, history_content, history_sender, peer_user_id, peer_user_name,
    real_conversation_id,
};
