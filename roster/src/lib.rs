//! Participant roster persistence.
//!
//! The roster is a flat CSV exported by the registration pipeline, one row
//! per registered participant. This crate loads it, migrates old exports
//! that predate the `Verified` column, answers case-insensitive email
//! lookups, and rewrites the file atomically.

pub mod error;
pub mod record;
pub mod store;

pub use error::RosterError;
pub use record::ParticipantRecord;
pub use store::{Roster, RosterStore};
