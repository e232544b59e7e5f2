//! The verification state machine.
//!
//! Drives each user's session from email lookup to role grant:
//!
//! 1. `/verify` in the designated channel → email form
//! 2. email submit → roster lookup → identity prompt
//! 3. "yes, that's me" → nickname (best-effort) → completion prompt
//! 4. "Complete Verification" → role grant → roster row persisted
//!
//! Identity confirmation and the final grant are deliberately separate
//! steps: a user who mis-answers "who are you" must not receive the role,
//! and the grant itself is an audit-relevant action that deserves its own
//! click. Every step runs under the session's own lock, so repeat clicks
//! serialize instead of racing the session flags.

use crate::{SessionPhase, SessionTable, VerificationSession, VerifyError};
use gatehouse_gateway::{GatewayEvent, InteractionToken, Platform, PlatformError};
use gatehouse_roster::RosterStore;
use gatehouse_types::{ChannelId, Clock, Email, RoleId, UserId};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Engine parameters, fixed at startup.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// The only channel in which `/verify` is accepted.
    pub verification_channel: ChannelId,
    /// Role granted on successful completion.
    pub verified_role: RoleId,
    /// Contact named in user-facing failure messages.
    pub support_contact: String,
    /// Seconds before confirmation prompts go inert.
    pub prompt_timeout_secs: u64,
    /// Sessions older than this are removed by the expiry sweep.
    pub session_max_age_secs: u64,
}

impl EngineConfig {
    pub const DEFAULT_PROMPT_TIMEOUT_SECS: u64 = 300;
    pub const DEFAULT_SESSION_MAX_AGE_SECS: u64 = 1800;

    pub fn new(verification_channel: ChannelId, verified_role: RoleId) -> Self {
        Self {
            verification_channel,
            verified_role,
            support_contact: "an administrator".into(),
            prompt_timeout_secs: Self::DEFAULT_PROMPT_TIMEOUT_SECS,
            session_max_age_secs: Self::DEFAULT_SESSION_MAX_AGE_SECS,
        }
    }
}

/// The verification engine: session table, roster store, and the platform
/// boundary, driven by inbound gateway events.
pub struct VerificationEngine {
    config: EngineConfig,
    store: RosterStore,
    /// Serializes roster mutations (the load → mark → save cycle), so
    /// concurrent completions cannot lose each other's updates within this
    /// process. Reads stay unserialized.
    store_mutations: Mutex<()>,
    sessions: SessionTable,
    platform: Arc<dyn Platform>,
    clock: Arc<dyn Clock>,
}

impl VerificationEngine {
    pub fn new(
        config: EngineConfig,
        store: RosterStore,
        platform: Arc<dyn Platform>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            store,
            store_mutations: Mutex::new(()),
            sessions: SessionTable::new(),
            platform,
            clock,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    /// Handle one inbound event. Never panics or propagates: any failure is
    /// logged and converted into an ephemeral notice to the affected user,
    /// so one bad interaction cannot take down the event loop or touch
    /// other users' sessions.
    pub async fn handle(&self, event: GatewayEvent) {
        let (user, result) = match event {
            GatewayEvent::MemberJoined { user } => (user, self.on_member_join(user).await),
            GatewayEvent::VerifyCommand { user, channel } => (user, self.begin(user, channel).await),
            GatewayEvent::EmailSubmitted { user, email } => {
                (user, self.check_email(user, &email).await)
            }
            GatewayEvent::ConfirmIdentity { token, actor } => {
                (actor, self.confirm_identity(token, actor).await)
            }
            GatewayEvent::DenyIdentity { token, actor } => {
                (actor, self.deny_identity(token, actor).await)
            }
            GatewayEvent::CompleteVerification { token, actor } => {
                (actor, self.complete(token, actor).await)
            }
            GatewayEvent::ReloadRoster { actor, admin } => (actor, self.reload(actor, admin).await),
        };

        if let Err(err) = result {
            self.report_failure(user, &err).await;
        }
    }

    /// Sweep sessions past the configured max age. Called periodically by
    /// the daemon, independent of the UI prompt timeout.
    pub async fn purge_expired_sessions(&self) -> usize {
        let removed = self
            .sessions
            .purge_expired(self.config.session_max_age_secs, self.clock.now())
            .await;
        if removed > 0 {
            tracing::info!(removed, "swept expired verification sessions");
        }
        removed
    }

    // ── Steps ───────────────────────────────────────────────────────────

    /// Best-effort welcome mention in the verification channel. Skipped
    /// silently when the channel is unavailable.
    async fn on_member_join(&self, user: UserId) -> Result<(), VerifyError> {
        let text = "Please use the /verify command in this channel to begin verification.";
        if let Err(err) = self
            .platform
            .post_welcome(self.config.verification_channel, user, text)
            .await
        {
            tracing::debug!(%user, error = %err, "welcome message skipped");
        }
        Ok(())
    }

    /// Entry point: gate on the designated channel and on terminal
    /// sessions, then open the email form.
    async fn begin(&self, user: UserId, channel: ChannelId) -> Result<(), VerifyError> {
        if channel != self.config.verification_channel {
            return Err(VerifyError::NotInVerificationContext);
        }

        if let Some(session) = self.sessions.snapshot(user).await {
            if session.is_verified() {
                return Err(VerifyError::AlreadyVerified);
            }
        }

        self.platform.open_email_prompt(user).await?;
        Ok(())
    }

    /// Email form submitted: look the address up in a fresh roster load.
    /// Only a match on an unverified row creates a session.
    async fn check_email(&self, user: UserId, raw_email: &str) -> Result<(), VerifyError> {
        let email = Email::normalized(raw_email);
        let roster = self.store.load()?;

        let (row, record) = roster
            .find_by_email(&email)
            .ok_or(VerifyError::EmailNotFound)?;

        if record.verified {
            return Err(VerifyError::EmailAlreadyUsed);
        }

        let text = format!("Are you {} {}?", record.first_name, record.last_name);
        let session = VerificationSession::new(user, email, record, row, self.clock.now());
        self.sessions.insert(session).await;

        self.platform
            .send_identity_prompt(
                user,
                &text,
                InteractionToken::for_user(user),
                self.config.prompt_timeout_secs,
            )
            .await?;
        Ok(())
    }

    /// "Yes, that's me". First confirmation sets the nickname (best-effort)
    /// and advances to the final prompt; repeats are acknowledged without
    /// re-running the side effect.
    async fn confirm_identity(
        &self,
        token: InteractionToken,
        actor: UserId,
    ) -> Result<(), VerifyError> {
        if !token.permits(actor) {
            return Err(VerifyError::ActorMismatch);
        }

        let handle = self
            .sessions
            .handle(token.session_key)
            .await
            .ok_or(VerifyError::NoActiveSession)?;
        let mut session = handle.lock().await;

        if session.user != actor {
            return Err(VerifyError::ActorMismatch);
        }

        if session.confirmed {
            drop(session);
            self.platform
                .send_ephemeral(
                    actor,
                    "You've already confirmed your identity. Please wait while I complete the \
                     verification process.",
                )
                .await?;
            return Ok(());
        }

        session.confirmed = true;

        let nickname = session.full_name();
        session.nickname_set = match self.platform.set_nickname(actor, &nickname).await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(user = %actor, error = %err, "could not set nickname");
                false
            }
        };

        session.phase = SessionPhase::AwaitingFinalConfirm;

        let nickname_note = if session.nickname_set {
            format!("Your server nickname has been set to '{nickname}'.\n\n")
        } else {
            "I couldn't set your nickname due to permissions. An admin may update it later.\n\n"
                .to_string()
        };
        let text = format!(
            "{nickname_note}Just to confirm, your eligibility for travel reimbursement is \
             '{}'.\n\nClick 'Complete Verification' to complete the process and gain access.",
            session.reimbursement
        );
        drop(session);

        self.platform
            .send_completion_prompt(actor, &text, token, self.config.prompt_timeout_secs)
            .await?;
        Ok(())
    }

    /// "No, that's not me": remove the session so the user can start over.
    async fn deny_identity(
        &self,
        token: InteractionToken,
        actor: UserId,
    ) -> Result<(), VerifyError> {
        if !token.permits(actor) {
            return Err(VerifyError::ActorMismatch);
        }

        let handle = self
            .sessions
            .handle(token.session_key)
            .await
            .ok_or(VerifyError::NoActiveSession)?;
        {
            let session = handle.lock().await;
            if session.user != actor {
                return Err(VerifyError::ActorMismatch);
            }
        }

        self.sessions.remove(token.session_key).await;
        self.platform
            .send_ephemeral(
                actor,
                "Verification cancelled. Please try the /verify command again with the correct \
                 email.",
            )
            .await?;
        Ok(())
    }

    /// "Complete Verification": grant the role, then persist the roster
    /// row. The session only becomes terminal once both have succeeded, so
    /// the button stays retryable after a failure.
    async fn complete(&self, token: InteractionToken, actor: UserId) -> Result<(), VerifyError> {
        if !token.permits(actor) {
            return Err(VerifyError::ActorMismatch);
        }

        let handle = self
            .sessions
            .handle(token.session_key)
            .await
            .ok_or(VerifyError::NoActiveSession)?;
        let mut session = handle.lock().await;

        if session.user != actor {
            return Err(VerifyError::ActorMismatch);
        }

        match session.phase {
            SessionPhase::Verified => return Err(VerifyError::AlreadyVerified),
            SessionPhase::AwaitingIdentityConfirm => return Err(VerifyError::NoActiveSession),
            SessionPhase::AwaitingFinalConfirm => {}
        }

        self.platform
            .grant_role(actor, self.config.verified_role)
            .await
            .map_err(|err| match err {
                PlatformError::Unresolved(_) => VerifyError::RoleOrMemberUnresolved,
                other => VerifyError::Platform(other),
            })?;

        // The role is granted; a persistence failure from here on leaves
        // roster and platform inconsistent until the user retries.
        let persisted = {
            let _write = self.store_mutations.lock().await;
            self.persist_verified(session.row)
        };
        if let Err(err) = persisted {
            tracing::error!(
                user = %actor,
                row = session.row,
                error = %err,
                "role granted but roster update failed, roster and platform are inconsistent"
            );
            return Err(err);
        }

        session.phase = SessionPhase::Verified;
        drop(session);

        self.platform
            .send_ephemeral(
                actor,
                "Verification complete! You now have access to the server. Welcome aboard!",
            )
            .await?;
        Ok(())
    }

    /// Fresh load → mark the session's row → save. The stored row position
    /// is used instead of a second email lookup, so a concurrent roster
    /// reload cannot redirect the write to a different participant.
    fn persist_verified(&self, row: usize) -> Result<(), VerifyError> {
        let mut roster = self.store.load()?;
        roster.mark_verified(row)?;
        self.store.save(&roster)?;
        Ok(())
    }

    /// Administrative reload: re-read the roster and report privately.
    async fn reload(&self, actor: UserId, admin: bool) -> Result<(), VerifyError> {
        if !admin {
            self.platform
                .send_ephemeral(actor, "You don't have permission to use this command.")
                .await?;
            return Ok(());
        }

        match self.store.load() {
            Ok(roster) => {
                tracing::info!(rows = roster.len(), "roster reloaded by administrator");
                self.platform
                    .send_ephemeral(actor, "Participant data reloaded successfully!")
                    .await?;
            }
            Err(err) => {
                tracing::error!(error = %err, "administrator roster reload failed");
                self.platform
                    .send_ephemeral(actor, &format!("Error reloading participant data: {err}"))
                    .await?;
            }
        }
        Ok(())
    }

    /// Convert a step failure into an ephemeral notice for the user and an
    /// operator log line.
    async fn report_failure(&self, user: UserId, err: &VerifyError) {
        if err.is_user_input_error() {
            tracing::debug!(%user, error = %err, "verification step rejected");
        } else {
            tracing::error!(%user, error = %err, "verification step failed");
        }

        let message = err.user_message(&self.config.support_contact);
        if let Err(send_err) = self.platform.send_ephemeral(user, &message).await {
            tracing::error!(%user, error = %send_err, "failed to deliver failure notice");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gatehouse_roster::{ParticipantRecord, Roster};
    use gatehouse_types::ManualClock;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex as StdMutex;

    // ── Mock platform ───────────────────────────────────────────────────

    #[derive(Clone, Debug, PartialEq)]
    enum Call {
        Ephemeral(UserId, String),
        EmailPrompt(UserId),
        IdentityPrompt(UserId, String),
        CompletionPrompt(UserId, String),
        Nickname(UserId, String),
        Role(UserId, RoleId),
        Welcome(ChannelId, UserId),
        Presence(String),
    }

    #[derive(Default)]
    struct MockPlatform {
        calls: StdMutex<Vec<Call>>,
        fail_nickname: AtomicBool,
        grant_unresolved: AtomicBool,
        fail_welcome: AtomicBool,
    }

    impl MockPlatform {
        fn record(&self, call: Call) {
            self.calls.lock().unwrap().push(call);
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn role_grants(&self) -> usize {
            self.calls()
                .iter()
                .filter(|c| matches!(c, Call::Role(..)))
                .count()
        }

        fn nickname_calls(&self) -> usize {
            self.calls()
                .iter()
                .filter(|c| matches!(c, Call::Nickname(..)))
                .count()
        }

        fn ephemerals_for(&self, user: UserId) -> Vec<String> {
            self.calls()
                .iter()
                .filter_map(|c| match c {
                    Call::Ephemeral(u, text) if *u == user => Some(text.clone()),
                    _ => None,
                })
                .collect()
        }

        fn last_ephemeral_for(&self, user: UserId) -> String {
            self.ephemerals_for(user)
                .pop()
                .expect("no ephemeral message sent")
        }
    }

    #[async_trait]
    impl Platform for MockPlatform {
        async fn send_ephemeral(&self, user: UserId, text: &str) -> Result<(), PlatformError> {
            self.record(Call::Ephemeral(user, text.into()));
            Ok(())
        }

        async fn open_email_prompt(&self, user: UserId) -> Result<(), PlatformError> {
            self.record(Call::EmailPrompt(user));
            Ok(())
        }

        async fn send_identity_prompt(
            &self,
            user: UserId,
            text: &str,
            _token: InteractionToken,
            _timeout_secs: u64,
        ) -> Result<(), PlatformError> {
            self.record(Call::IdentityPrompt(user, text.into()));
            Ok(())
        }

        async fn send_completion_prompt(
            &self,
            user: UserId,
            text: &str,
            _token: InteractionToken,
            _timeout_secs: u64,
        ) -> Result<(), PlatformError> {
            self.record(Call::CompletionPrompt(user, text.into()));
            Ok(())
        }

        async fn set_nickname(&self, user: UserId, nickname: &str) -> Result<(), PlatformError> {
            if self.fail_nickname.load(Ordering::SeqCst) {
                return Err(PlatformError::Forbidden("manage nicknames".into()));
            }
            self.record(Call::Nickname(user, nickname.into()));
            Ok(())
        }

        async fn grant_role(&self, user: UserId, role: RoleId) -> Result<(), PlatformError> {
            if self.grant_unresolved.load(Ordering::SeqCst) {
                return Err(PlatformError::Unresolved("verified role".into()));
            }
            self.record(Call::Role(user, role));
            Ok(())
        }

        async fn post_welcome(
            &self,
            channel: ChannelId,
            user: UserId,
            _text: &str,
        ) -> Result<(), PlatformError> {
            if self.fail_welcome.load(Ordering::SeqCst) {
                return Err(PlatformError::Unresolved("verification channel".into()));
            }
            self.record(Call::Welcome(channel, user));
            Ok(())
        }

        async fn set_presence(&self, activity: &str) -> Result<(), PlatformError> {
            self.record(Call::Presence(activity.into()));
            Ok(())
        }
    }

    // ── Fixture ─────────────────────────────────────────────────────────

    fn channel() -> ChannelId {
        ChannelId::new(100)
    }

    fn role() -> RoleId {
        RoleId::new(555)
    }

    fn ada() -> ParticipantRecord {
        ParticipantRecord {
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            email: "ada@x.com".into(),
            reimbursement: "Eligible".into(),
            verified: false,
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        roster_path: PathBuf,
        platform: Arc<MockPlatform>,
        clock: Arc<ManualClock>,
        engine: VerificationEngine,
    }

    fn fixture_with_rows(rows: Vec<ParticipantRecord>) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let roster_path = dir.path().join("confirmed.csv");

        let mut roster = Roster::new();
        for row in rows {
            roster.push(row);
        }
        RosterStore::new(&roster_path).save(&roster).unwrap();

        let platform = Arc::new(MockPlatform::default());
        let clock = Arc::new(ManualClock::new(1_000));

        let mut config = EngineConfig::new(channel(), role());
        config.support_contact = "support@gatehouse.test".into();

        let engine = VerificationEngine::new(
            config,
            RosterStore::new(&roster_path),
            platform.clone(),
            clock.clone(),
        );

        Fixture {
            _dir: dir,
            roster_path,
            platform,
            clock,
            engine,
        }
    }

    impl Fixture {
        fn user(&self, raw: u64) -> UserId {
            UserId::new(raw)
        }

        async fn submit_email(&self, user: u64, email: &str) {
            self.engine
                .handle(GatewayEvent::VerifyCommand {
                    user: self.user(user),
                    channel: channel(),
                })
                .await;
            self.engine
                .handle(GatewayEvent::EmailSubmitted {
                    user: self.user(user),
                    email: email.into(),
                })
                .await;
        }

        async fn confirm(&self, user: u64) {
            self.engine
                .handle(GatewayEvent::ConfirmIdentity {
                    token: InteractionToken::for_user(self.user(user)),
                    actor: self.user(user),
                })
                .await;
        }

        async fn complete(&self, user: u64) {
            self.engine
                .handle(GatewayEvent::CompleteVerification {
                    token: InteractionToken::for_user(self.user(user)),
                    actor: self.user(user),
                })
                .await;
        }

        fn saved_roster(&self) -> Roster {
            RosterStore::new(&self.roster_path).load().unwrap()
        }
    }

    // ── Entry gating ────────────────────────────────────────────────────

    #[tokio::test]
    async fn verify_outside_designated_channel_is_rejected() {
        let fx = fixture_with_rows(vec![ada()]);

        fx.engine
            .handle(GatewayEvent::VerifyCommand {
                user: fx.user(1),
                channel: ChannelId::new(999),
            })
            .await;

        let message = fx.platform.last_ephemeral_for(fx.user(1));
        assert!(message.contains("verification channel"));
        assert!(
            !fx.platform.calls().iter().any(|c| matches!(c, Call::EmailPrompt(_))),
            "email form must not open outside the verification channel"
        );
    }

    // ── Email check ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn unknown_email_reports_and_creates_no_session() {
        let fx = fixture_with_rows(vec![ada()]);

        fx.submit_email(1, "nobody@x.com").await;

        let message = fx.platform.last_ephemeral_for(fx.user(1));
        assert!(message.contains("was not found"));
        assert!(message.contains("support@gatehouse.test"));
        assert!(!fx.engine.sessions().contains(fx.user(1)).await);
    }

    #[tokio::test]
    async fn already_used_email_reports_and_creates_no_session() {
        let mut row = ada();
        row.verified = true;
        let fx = fixture_with_rows(vec![row]);

        fx.submit_email(1, "ada@x.com").await;

        let message = fx.platform.last_ephemeral_for(fx.user(1));
        assert!(message.contains("already been used"));
        assert!(!fx.engine.sessions().contains(fx.user(1)).await);
    }

    #[tokio::test]
    async fn matching_unverified_email_creates_one_session() {
        let fx = fixture_with_rows(vec![ada()]);

        fx.submit_email(1, "  ADA@X.COM ").await;

        let session = fx.engine.sessions().snapshot(fx.user(1)).await.unwrap();
        assert_eq!(session.phase, SessionPhase::AwaitingIdentityConfirm);
        assert!(!session.confirmed);
        assert_eq!(session.row, 0);
        assert_eq!(fx.engine.sessions().len().await, 1);

        assert!(fx.platform.calls().iter().any(
            |c| matches!(c, Call::IdentityPrompt(u, text) if *u == fx.user(1) && text == "Are you Ada Lovelace?")
        ));
    }

    #[tokio::test]
    async fn unreadable_roster_surfaces_generic_failure() {
        let fx = fixture_with_rows(vec![ada()]);
        std::fs::remove_file(&fx.roster_path).unwrap();
        std::fs::create_dir(&fx.roster_path).unwrap();

        fx.submit_email(1, "ada@x.com").await;

        let message = fx.platform.last_ephemeral_for(fx.user(1));
        assert!(message.contains("An error occurred"));
        assert!(!fx.engine.sessions().contains(fx.user(1)).await);
    }

    // ── Identity confirmation ───────────────────────────────────────────

    #[tokio::test]
    async fn repeated_confirmation_runs_nickname_once() {
        let fx = fixture_with_rows(vec![ada()]);
        fx.submit_email(1, "ada@x.com").await;

        fx.confirm(1).await;
        fx.confirm(1).await;

        assert_eq!(fx.platform.nickname_calls(), 1);
        let message = fx.platform.last_ephemeral_for(fx.user(1));
        assert!(message.contains("already confirmed"));

        let session = fx.engine.sessions().snapshot(fx.user(1)).await.unwrap();
        assert_eq!(session.phase, SessionPhase::AwaitingFinalConfirm);
    }

    #[tokio::test]
    async fn nickname_failure_does_not_block_the_flow() {
        let fx = fixture_with_rows(vec![ada()]);
        fx.submit_email(1, "ada@x.com").await;
        fx.platform.fail_nickname.store(true, Ordering::SeqCst);

        fx.confirm(1).await;

        let session = fx.engine.sessions().snapshot(fx.user(1)).await.unwrap();
        assert_eq!(session.phase, SessionPhase::AwaitingFinalConfirm);
        assert!(!session.nickname_set);

        assert!(fx.platform.calls().iter().any(|c| matches!(
            c,
            Call::CompletionPrompt(u, text)
                if *u == fx.user(1) && text.contains("couldn't set your nickname")
        )));
    }

    #[tokio::test]
    async fn denial_removes_the_session() {
        let fx = fixture_with_rows(vec![ada()]);
        fx.submit_email(1, "ada@x.com").await;

        fx.engine
            .handle(GatewayEvent::DenyIdentity {
                token: InteractionToken::for_user(fx.user(1)),
                actor: fx.user(1),
            })
            .await;

        assert!(!fx.engine.sessions().contains(fx.user(1)).await);
        let message = fx.platform.last_ephemeral_for(fx.user(1));
        assert!(message.contains("cancelled"));
    }

    #[tokio::test]
    async fn confirmation_without_session_asks_to_start_over() {
        let fx = fixture_with_rows(vec![ada()]);

        fx.confirm(1).await;

        let message = fx.platform.last_ephemeral_for(fx.user(1));
        assert!(message.contains("start the verification process again"));
    }

    // ── Ownership ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn foreign_actor_never_mutates_another_users_session() {
        let fx = fixture_with_rows(vec![ada()]);
        fx.submit_email(1, "ada@x.com").await;
        let owner_token = InteractionToken::for_user(fx.user(1));

        for event in [
            GatewayEvent::ConfirmIdentity {
                token: owner_token,
                actor: fx.user(2),
            },
            GatewayEvent::DenyIdentity {
                token: owner_token,
                actor: fx.user(2),
            },
            GatewayEvent::CompleteVerification {
                token: owner_token,
                actor: fx.user(2),
            },
        ] {
            fx.engine.handle(event).await;
            let message = fx.platform.last_ephemeral_for(fx.user(2));
            assert!(message.contains("not for you"));
        }

        let session = fx.engine.sessions().snapshot(fx.user(1)).await.unwrap();
        assert_eq!(session.phase, SessionPhase::AwaitingIdentityConfirm);
        assert!(!session.confirmed);
        assert_eq!(fx.platform.role_grants(), 0);
        assert_eq!(fx.platform.nickname_calls(), 0);
    }

    // ── Completion ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn end_to_end_flow_verifies_ada() {
        let fx = fixture_with_rows(vec![ada()]);

        fx.submit_email(1, "ada@x.com").await;
        fx.confirm(1).await;

        assert!(fx.platform.calls().iter().any(|c| matches!(
            c,
            Call::Nickname(u, name) if *u == fx.user(1) && name == "Ada Lovelace"
        )));
        assert!(fx.platform.calls().iter().any(|c| matches!(
            c,
            Call::CompletionPrompt(u, text) if *u == fx.user(1) && text.contains("'Eligible'")
        )));

        fx.complete(1).await;

        assert_eq!(fx.platform.role_grants(), 1);
        assert!(fx.saved_roster().rows()[0].verified);
        let session = fx.engine.sessions().snapshot(fx.user(1)).await.unwrap();
        assert!(session.is_verified());

        // A later /verify from the same user is rejected as already done.
        fx.engine
            .handle(GatewayEvent::VerifyCommand {
                user: fx.user(1),
                channel: channel(),
            })
            .await;
        let message = fx.platform.last_ephemeral_for(fx.user(1));
        assert!(message.contains("already been verified"));
    }

    #[tokio::test]
    async fn completion_before_confirmation_is_rejected() {
        let fx = fixture_with_rows(vec![ada()]);
        fx.submit_email(1, "ada@x.com").await;

        fx.complete(1).await;

        assert_eq!(fx.platform.role_grants(), 0);
        let session = fx.engine.sessions().snapshot(fx.user(1)).await.unwrap();
        assert_eq!(session.phase, SessionPhase::AwaitingIdentityConfirm);
    }

    #[tokio::test]
    async fn unresolved_role_keeps_session_retryable() {
        let fx = fixture_with_rows(vec![ada()]);
        fx.submit_email(1, "ada@x.com").await;
        fx.confirm(1).await;

        fx.platform.grant_unresolved.store(true, Ordering::SeqCst);
        fx.complete(1).await;

        let message = fx.platform.last_ephemeral_for(fx.user(1));
        assert!(message.contains("couldn't assign your role"));
        let session = fx.engine.sessions().snapshot(fx.user(1)).await.unwrap();
        assert_eq!(session.phase, SessionPhase::AwaitingFinalConfirm);
        assert!(!fx.saved_roster().rows()[0].verified);

        // Retry once the role resolves.
        fx.platform.grant_unresolved.store(false, Ordering::SeqCst);
        fx.complete(1).await;

        assert_eq!(fx.platform.role_grants(), 1);
        assert!(fx.saved_roster().rows()[0].verified);
    }

    #[tokio::test]
    async fn persistence_failure_after_grant_leaves_session_retryable() {
        let fx = fixture_with_rows(vec![ada()]);
        fx.submit_email(1, "ada@x.com").await;
        fx.confirm(1).await;

        // Make the roster unreadable for the persistence step only.
        std::fs::remove_file(&fx.roster_path).unwrap();
        std::fs::create_dir(&fx.roster_path).unwrap();

        fx.complete(1).await;

        // Role granted, but the session must not be terminal.
        assert_eq!(fx.platform.role_grants(), 1);
        let session = fx.engine.sessions().snapshot(fx.user(1)).await.unwrap();
        assert_eq!(session.phase, SessionPhase::AwaitingFinalConfirm);
        let message = fx.platform.last_ephemeral_for(fx.user(1));
        assert!(message.contains("An error occurred"));

        // Restore the file; the retry re-grants (idempotent on the
        // platform side) and persists.
        std::fs::remove_dir(&fx.roster_path).unwrap();
        let mut roster = Roster::new();
        roster.push(ada());
        RosterStore::new(&fx.roster_path).save(&roster).unwrap();

        fx.complete(1).await;

        assert_eq!(fx.platform.role_grants(), 2);
        assert!(fx.saved_roster().rows()[0].verified);
        let session = fx.engine.sessions().snapshot(fx.user(1)).await.unwrap();
        assert!(session.is_verified());
    }

    #[tokio::test]
    async fn concurrent_completion_clicks_grant_the_role_once() {
        let fx = fixture_with_rows(vec![ada()]);
        fx.submit_email(1, "ada@x.com").await;
        fx.confirm(1).await;

        let engine = Arc::new(fx.engine);
        let event = GatewayEvent::CompleteVerification {
            token: InteractionToken::for_user(UserId::new(1)),
            actor: UserId::new(1),
        };

        let first = tokio::spawn({
            let engine = engine.clone();
            let event = event.clone();
            async move { engine.handle(event).await }
        });
        let second = tokio::spawn({
            let engine = engine.clone();
            let event = event.clone();
            async move { engine.handle(event).await }
        });
        first.await.unwrap();
        second.await.unwrap();

        assert_eq!(fx.platform.role_grants(), 1);
        let session = engine.sessions().snapshot(UserId::new(1)).await.unwrap();
        assert!(session.is_verified());
    }

    #[tokio::test]
    async fn same_email_from_two_users_last_save_wins() {
        // Documented limitation, not a regression: the roster file has no
        // cross-request lock, so two sessions pointing at the same row can
        // both complete.
        let fx = fixture_with_rows(vec![ada()]);

        fx.submit_email(1, "ada@x.com").await;
        fx.submit_email(2, "ada@x.com").await;
        fx.confirm(1).await;
        fx.confirm(2).await;

        fx.complete(1).await;
        fx.complete(2).await;

        assert_eq!(fx.platform.role_grants(), 2);
        assert!(fx.saved_roster().rows()[0].verified);
        assert!(fx.engine.sessions().snapshot(fx.user(1)).await.unwrap().is_verified());
        assert!(fx.engine.sessions().snapshot(fx.user(2)).await.unwrap().is_verified());
    }

    // ── Expiry ──────────────────────────────────────────────────────────

    #[tokio::test]
    async fn expiry_sweep_removes_only_stale_sessions() {
        let fx = fixture_with_rows(vec![ada()]);

        fx.submit_email(1, "ada@x.com").await;
        fx.clock.advance(1_000);
        fx.submit_email(2, "ada@x.com").await;
        fx.clock.advance(900);

        // User 1's session is 1900s old (> 1800), user 2's is 900s old.
        let removed = fx.engine.purge_expired_sessions().await;
        assert_eq!(removed, 1);
        assert!(!fx.engine.sessions().contains(fx.user(1)).await);
        assert!(fx.engine.sessions().contains(fx.user(2)).await);
    }

    // ── Welcome & admin reload ──────────────────────────────────────────

    #[tokio::test]
    async fn member_join_posts_welcome_in_verification_channel() {
        let fx = fixture_with_rows(vec![]);

        fx.engine
            .handle(GatewayEvent::MemberJoined { user: fx.user(7) })
            .await;

        assert!(fx
            .platform
            .calls()
            .iter()
            .any(|c| matches!(c, Call::Welcome(ch, u) if *ch == channel() && *u == fx.user(7))));
    }

    #[tokio::test]
    async fn unavailable_welcome_channel_is_skipped_silently() {
        let fx = fixture_with_rows(vec![]);
        fx.platform.fail_welcome.store(true, Ordering::SeqCst);

        fx.engine
            .handle(GatewayEvent::MemberJoined { user: fx.user(7) })
            .await;

        assert!(fx.platform.ephemerals_for(fx.user(7)).is_empty());
    }

    #[tokio::test]
    async fn reload_is_admin_only() {
        let fx = fixture_with_rows(vec![ada()]);

        fx.engine
            .handle(GatewayEvent::ReloadRoster {
                actor: fx.user(9),
                admin: false,
            })
            .await;
        assert!(fx
            .platform
            .last_ephemeral_for(fx.user(9))
            .contains("permission"));

        fx.engine
            .handle(GatewayEvent::ReloadRoster {
                actor: fx.user(9),
                admin: true,
            })
            .await;
        assert!(fx
            .platform
            .last_ephemeral_for(fx.user(9))
            .contains("reloaded successfully"));
    }
}
