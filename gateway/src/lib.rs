//! The boundary between the verification engine and the chat platform.
//!
//! The platform (Discord or equivalent) is an external collaborator: it
//! delivers inbound [`GatewayEvent`]s and executes outbound actions through
//! the [`Platform`] trait. Prompts shown to users carry a plain-data
//! [`InteractionToken`] instead of capturing state, so a button press can
//! be routed and ownership-checked statelessly.

pub mod error;
pub mod event;
pub mod platform;
pub mod token;

pub use error::PlatformError;
pub use event::GatewayEvent;
pub use platform::Platform;
pub use token::InteractionToken;
