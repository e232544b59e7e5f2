//! Member identity verification.
//!
//! The flow, per user: email lookup against the participant roster →
//! identity confirmation → nickname + reimbursement review → role grant
//! and roster persistence. Each user gets one in-memory
//! [`VerificationSession`] driven through its phases by the
//! [`VerificationEngine`]; the chat platform stays behind the
//! `gatehouse_gateway::Platform` trait.

pub mod engine;
pub mod error;
pub mod session;
pub mod sessions;

pub use engine::{EngineConfig, VerificationEngine};
pub use error::VerifyError;
pub use session::{SessionPhase, VerificationSession};
pub use sessions::SessionTable;
