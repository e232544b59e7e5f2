//! Prompt ownership tokens.

use gatehouse_types::UserId;
use serde::{Deserialize, Serialize};

/// Reference carried by a confirmation prompt: which session it belongs to
/// and who is allowed to act on it.
///
/// The token travels out with the prompt and comes back attached to the
/// button event, so handlers stay stateless — no per-prompt closures, no
/// captured session fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionToken {
    /// Key of the session the prompt acts on.
    pub session_key: UserId,
    /// The only user whose clicks are honored.
    pub expected_actor: UserId,
}

impl InteractionToken {
    /// Token for a prompt scoped to the session owner themselves.
    pub fn for_user(user: UserId) -> Self {
        Self {
            session_key: user,
            expected_actor: user,
        }
    }

    /// Whether `actor` is allowed to act on this prompt.
    pub fn permits(&self, actor: UserId) -> bool {
        self.expected_actor == actor
    }
}
