//! JSON-lines platform bridge.
//!
//! The daemon stays platform-agnostic: inbound gateway events arrive as
//! one JSON object per stdin line, and every outbound action is emitted as
//! one JSON object on stdout. The process speaking the actual chat
//! platform's protocol sits on the other side of the pipe.

use async_trait::async_trait;
use gatehouse_gateway::{InteractionToken, Platform, PlatformError};
use gatehouse_types::{ChannelId, RoleId, UserId};
use serde::Serialize;
use tokio::io::{AsyncWriteExt, Stdout};
use tokio::sync::Mutex;

/// One outbound platform action, as written to stdout.
#[derive(Debug, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum OutboundAction<'a> {
    SendEphemeral {
        user: UserId,
        text: &'a str,
    },
    OpenEmailPrompt {
        user: UserId,
    },
    SendIdentityPrompt {
        user: UserId,
        text: &'a str,
        token: InteractionToken,
        timeout_secs: u64,
    },
    SendCompletionPrompt {
        user: UserId,
        text: &'a str,
        token: InteractionToken,
        timeout_secs: u64,
    },
    SetNickname {
        user: UserId,
        nickname: &'a str,
    },
    GrantRole {
        user: UserId,
        role: RoleId,
    },
    PostWelcome {
        channel: ChannelId,
        user: UserId,
        text: &'a str,
    },
    SetPresence {
        activity: &'a str,
    },
}

/// [`Platform`] implementation that serializes every action to stdout.
/// Output is line-buffered behind a mutex so concurrent handler tasks
/// cannot interleave partial lines.
pub struct StdioPlatform {
    out: Mutex<Stdout>,
}

impl StdioPlatform {
    pub fn new() -> Self {
        Self {
            out: Mutex::new(tokio::io::stdout()),
        }
    }

    async fn emit(&self, action: OutboundAction<'_>) -> Result<(), PlatformError> {
        let mut line =
            serde_json::to_vec(&action).map_err(|err| PlatformError::Transport(err.to_string()))?;
        line.push(b'\n');

        let mut out = self.out.lock().await;
        out.write_all(&line)
            .await
            .map_err(|err| PlatformError::Transport(err.to_string()))?;
        out.flush()
            .await
            .map_err(|err| PlatformError::Transport(err.to_string()))
    }
}

impl Default for StdioPlatform {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Platform for StdioPlatform {
    async fn send_ephemeral(&self, user: UserId, text: &str) -> Result<(), PlatformError> {
        self.emit(OutboundAction::SendEphemeral { user, text }).await
    }

    async fn open_email_prompt(&self, user: UserId) -> Result<(), PlatformError> {
        self.emit(OutboundAction::OpenEmailPrompt { user }).await
    }

    async fn send_identity_prompt(
        &self,
        user: UserId,
        text: &str,
        token: InteractionToken,
        timeout_secs: u64,
    ) -> Result<(), PlatformError> {
        self.emit(OutboundAction::SendIdentityPrompt {
            user,
            text,
            token,
            timeout_secs,
        })
        .await
    }

    async fn send_completion_prompt(
        &self,
        user: UserId,
        text: &str,
        token: InteractionToken,
        timeout_secs: u64,
    ) -> Result<(), PlatformError> {
        self.emit(OutboundAction::SendCompletionPrompt {
            user,
            text,
            token,
            timeout_secs,
        })
        .await
    }

    async fn set_nickname(&self, user: UserId, nickname: &str) -> Result<(), PlatformError> {
        self.emit(OutboundAction::SetNickname { user, nickname })
            .await
    }

    async fn grant_role(&self, user: UserId, role: RoleId) -> Result<(), PlatformError> {
        self.emit(OutboundAction::GrantRole { user, role }).await
    }

    async fn post_welcome(
        &self,
        channel: ChannelId,
        user: UserId,
        text: &str,
    ) -> Result<(), PlatformError> {
        self.emit(OutboundAction::PostWelcome {
            channel,
            user,
            text,
        })
        .await
    }

    async fn set_presence(&self, activity: &str) -> Result<(), PlatformError> {
        self.emit(OutboundAction::SetPresence { activity }).await
    }
}
