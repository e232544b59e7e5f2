//! Per-user verification session state.

use gatehouse_types::{Email, Timestamp, UserId};

/// Where a session stands in the verification flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionPhase {
    /// Matched a roster row; waiting for "yes, that's me".
    AwaitingIdentityConfirm,
    /// Identity confirmed; waiting for the completion click.
    AwaitingFinalConfirm,
    /// Terminal. Role granted and roster row persisted.
    Verified,
}

/// In-memory state for one user's verification attempt.
///
/// Created when an email lookup matches an unverified roster row, removed
/// on explicit denial or expiry, otherwise kept for the process lifetime.
/// `row` points back at the matched roster position so completion marks
/// that exact record without re-querying by email.
#[derive(Clone, Debug)]
pub struct VerificationSession {
    pub user: UserId,
    pub email: Email,
    pub first_name: String,
    pub last_name: String,
    pub reimbursement: String,
    pub phase: SessionPhase,
    /// Set by the first identity confirmation; guards the nickname side
    /// effect against repeat clicks.
    pub confirmed: bool,
    /// Whether the nickname assignment succeeded (best-effort).
    pub nickname_set: bool,
    /// Position of the matched row in the roster.
    pub row: usize,
    pub started_at: Timestamp,
}

impl VerificationSession {
    pub fn new(
        user: UserId,
        email: Email,
        record: &gatehouse_roster::ParticipantRecord,
        row: usize,
        started_at: Timestamp,
    ) -> Self {
        Self {
            user,
            email,
            first_name: record.first_name.clone(),
            last_name: record.last_name.clone(),
            reimbursement: record.reimbursement.clone(),
            phase: SessionPhase::AwaitingIdentityConfirm,
            confirmed: false,
            nickname_set: false,
            row,
            started_at,
        }
    }

    /// "First Last", the display name applied on confirmation.
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn is_verified(&self) -> bool {
        self.phase == SessionPhase::Verified
    }
}
