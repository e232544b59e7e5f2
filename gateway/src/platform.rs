//! Outbound actions the engine can ask the platform to perform.

use crate::{InteractionToken, PlatformError};
use async_trait::async_trait;
use gatehouse_types::{ChannelId, RoleId, UserId};

/// The platform side of the verification flow.
///
/// Implementations wrap the actual chat-platform client. All text is final
/// — the engine owns the wording; the platform only renders and delivers.
/// Prompt methods attach the given [`InteractionToken`] to the UI elements
/// they create, and the platform hands it back verbatim with the resulting
/// button event.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Send a caller-only (ephemeral) text response.
    async fn send_ephemeral(&self, user: UserId, text: &str) -> Result<(), PlatformError>;

    /// Open the single-field email form for `user`.
    async fn open_email_prompt(&self, user: UserId) -> Result<(), PlatformError>;

    /// Show the yes/no identity confirmation prompt. The prompt goes inert
    /// after `timeout_secs`; no event is delivered on timeout.
    async fn send_identity_prompt(
        &self,
        user: UserId,
        text: &str,
        token: InteractionToken,
        timeout_secs: u64,
    ) -> Result<(), PlatformError>;

    /// Show the single-button completion prompt. Same timeout behavior as
    /// the identity prompt.
    async fn send_completion_prompt(
        &self,
        user: UserId,
        text: &str,
        token: InteractionToken,
        timeout_secs: u64,
    ) -> Result<(), PlatformError>;

    /// Set the member's display name.
    async fn set_nickname(&self, user: UserId, nickname: &str) -> Result<(), PlatformError>;

    /// Grant the access role to the member.
    async fn grant_role(&self, user: UserId, role: RoleId) -> Result<(), PlatformError>;

    /// Post a non-ephemeral welcome mention for `user` in `channel`. The
    /// platform prepends the mention; `text` is the body.
    async fn post_welcome(
        &self,
        channel: ChannelId,
        user: UserId,
        text: &str,
    ) -> Result<(), PlatformError>;

    /// Set the bot's presence/status line.
    async fn set_presence(&self, activity: &str) -> Result<(), PlatformError>;
}
