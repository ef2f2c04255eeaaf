//! The standard invariant set.
//!
//! Each check is a zero-sized type implementing [`Invariant`]; the
//! registry owns boxed instances. Checks stop at the first violation,
//! since one bad state usually cascades and the first report is the one
//! worth reading.

use hotline_proto::DeliveryState;

use super::{Invariant, InvariantResult, Violation, snapshot::SystemSnapshot};

/// Message id and delivery status must agree.
///
/// `Sending`/`Failed` messages are unconfirmed: no broker id, but always a
/// correlation id. `Sent`/`Delivered` messages are confirmed: broker id
/// present. A message violating this reconciled incorrectly.
pub struct StatusCoherence;

impl Invariant for StatusCoherence {
    fn name(&self) -> &'static str {
        "status-coherence"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in &state.clients {
            for (conversation_id, conversation) in &client.conversations {
                for message in &conversation.messages {
                    let coherent = match message.status {
                        DeliveryState::Sending | DeliveryState::Failed => {
                            message.id.is_none() && message.optimistic_id.is_some()
                        },
                        DeliveryState::Sent | DeliveryState::Delivered => message.id.is_some(),
                    };
                    if !coherent {
                        return Err(Violation {
                            invariant: self.name(),
                            message: format!(
                                "client {}: conversation {conversation_id:#x}: \
                                 {:?} message has id {:?}, optimistic id {:?}",
                                client.user_id, message.status, message.id, message.optimistic_id
                            ),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

/// No two messages in a conversation share a correlation id.
///
/// The optimistic id is the sole key correlating a send with its
/// confirmation; a duplicate would make reconciliation ambiguous.
pub struct OptimisticIdUnique;

impl Invariant for OptimisticIdUnique {
    fn name(&self) -> &'static str {
        "optimistic-id-unique"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in &state.clients {
            for (conversation_id, conversation) in &client.conversations {
                let mut seen = std::collections::HashSet::new();
                for message in &conversation.messages {
                    if let Some(optimistic_id) = message.optimistic_id
                        && !seen.insert(optimistic_id)
                    {
                        return Err(Violation {
                            invariant: self.name(),
                            message: format!(
                                "client {}: conversation {conversation_id:#x}: \
                                 two messages share optimistic id {optimistic_id:#x}",
                                client.user_id
                            ),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

/// No two messages in a conversation share a broker id.
///
/// Replayed deliveries must deduplicate, and a confirmation racing its own
/// fan-out copy must collapse to one entry.
pub struct MessageIdUnique;

impl Invariant for MessageIdUnique {
    fn name(&self) -> &'static str {
        "message-id-unique"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in &state.clients {
            for (conversation_id, conversation) in &client.conversations {
                let mut seen = std::collections::HashSet::new();
                for message in &conversation.messages {
                    if let Some(id) = message.id
                        && !seen.insert(id)
                    {
                        return Err(Violation {
                            invariant: self.name(),
                            message: format!(
                                "client {}: conversation {conversation_id:#x}: \
                                 two messages share broker id {id}",
                                client.user_id
                            ),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

/// The active conversation never shows unread messages.
///
/// Focusing a conversation clears its count, and messages arriving while
/// it is focused are read by definition.
pub struct ActiveConversationRead;

impl Invariant for ActiveConversationRead {
    fn name(&self) -> &'static str {
        "active-conversation-read"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in &state.clients {
            let Some(active) = client.active_conversation else { continue };
            if let Some(conversation) = client.conversations.get(&active)
                && conversation.unread > 0
            {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "client {}: active conversation {active:#x} has {} unread",
                        client.user_id, conversation.unread
                    ),
                });
            }
        }
        Ok(())
    }
}

/// A client never lists itself as typing.
///
/// The broker fans typing signals out to every member including the
/// sender; the client must drop its own echo.
pub struct TypingExcludesSelf;

impl Invariant for TypingExcludesSelf {
    fn name(&self) -> &'static str {
        "typing-excludes-self"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in &state.clients {
            for (conversation_id, conversation) in &client.conversations {
                if conversation.typing_user_ids.contains(&client.user_id) {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!(
                            "client {}: conversation {conversation_id:#x} lists the client \
                             itself as typing",
                            client.user_id
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}
