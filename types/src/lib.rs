//! Core types shared across the gatehouse crates.
//!
//! Platform-assigned identifiers ([`UserId`], [`ChannelId`], [`RoleId`]),
//! the normalized [`Email`] lookup key, and wall-clock time ([`Timestamp`],
//! [`Clock`]).

pub mod email;
pub mod id;
pub mod time;

pub use email::Email;
pub use id::{ChannelId, RoleId, UserId};
pub use time::{Clock, ManualClock, SystemClock, Timestamp};
