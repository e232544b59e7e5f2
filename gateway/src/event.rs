//! Inbound events delivered by the platform.

use crate::InteractionToken;
use gatehouse_types::{ChannelId, UserId};
use serde::{Deserialize, Serialize};

/// One inbound platform event. Each event is handled as an independent
/// task; ordering is only meaningful within a single user's session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayEvent {
    /// A new member joined the community space.
    MemberJoined { user: UserId },

    /// The entry command (`/verify`) was invoked.
    VerifyCommand { user: UserId, channel: ChannelId },

    /// The email form was submitted. `email` is raw user input.
    EmailSubmitted { user: UserId, email: String },

    /// "Yes, that's me" on the identity prompt.
    ConfirmIdentity {
        token: InteractionToken,
        actor: UserId,
    },

    /// "No, that's not me" on the identity prompt.
    DenyIdentity {
        token: InteractionToken,
        actor: UserId,
    },

    /// "Complete Verification" on the final prompt.
    CompleteVerification {
        token: InteractionToken,
        actor: UserId,
    },

    /// Administrative roster reload. `admin` reflects the caller's
    /// permission level as reported by the platform.
    ReloadRoster { actor: UserId, admin: bool },
}
