use thiserror::Error;

/// Failures reported by the platform when executing an outbound action.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// A referenced entity (role, member, channel) could not be resolved.
    #[error("could not resolve {0}")]
    Unresolved(String),

    /// The platform refused the action for lack of permission.
    #[error("missing permission: {0}")]
    Forbidden(String),

    /// Delivery failed (connection, serialization, rate limit).
    #[error("platform transport error: {0}")]
    Transport(String),
}
