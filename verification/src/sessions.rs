//! The process-wide session table.
//!
//! Maps user id → live [`VerificationSession`]. Entries are wrapped in
//! their own mutex so a whole verification step runs as one atomic
//! transition per session — two clicks on the same button serialize
//! instead of racing the check-then-act on the session flags.

use crate::VerificationSession;
use gatehouse_types::{Timestamp, UserId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Shared handle to one session, locked per step.
pub type SessionHandle = Arc<Mutex<VerificationSession>>;

/// Concurrent user → session map. No persistence, no cross-process
/// sharing; lifetime is the process lifetime minus expiry sweeps.
#[derive(Default)]
pub struct SessionTable {
    inner: Mutex<HashMap<UserId, SessionHandle>>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert (or replace) the session for its user.
    pub async fn insert(&self, session: VerificationSession) {
        let user = session.user;
        let mut table = self.inner.lock().await;
        table.insert(user, Arc::new(Mutex::new(session)));
    }

    /// Handle to the live session, if any. The caller locks it for the
    /// duration of the step it performs.
    pub async fn handle(&self, user: UserId) -> Option<SessionHandle> {
        let table = self.inner.lock().await;
        table.get(&user).cloned()
    }

    /// Cloned snapshot, for read-only checks.
    pub async fn snapshot(&self, user: UserId) -> Option<VerificationSession> {
        let handle = self.handle(user).await?;
        let session = handle.lock().await;
        Some(session.clone())
    }

    pub async fn remove(&self, user: UserId) {
        let mut table = self.inner.lock().await;
        table.remove(&user);
    }

    pub async fn contains(&self, user: UserId) -> bool {
        let table = self.inner.lock().await;
        table.contains_key(&user)
    }

    pub async fn len(&self) -> usize {
        let table = self.inner.lock().await;
        table.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop sessions older than `max_age_secs` relative to `now`. Sessions
    /// currently locked by an in-flight step are left alone — they are
    /// demonstrably not stale. Returns how many were removed.
    pub async fn purge_expired(&self, max_age_secs: u64, now: Timestamp) -> usize {
        let mut table = self.inner.lock().await;
        let before = table.len();
        table.retain(|_, handle| match handle.try_lock() {
            Ok(session) => !session.started_at.has_expired(max_age_secs, now),
            Err(_) => true,
        });
        before - table.len()
    }
}
