use gatehouse_gateway::PlatformError;
use gatehouse_roster::RosterError;
use thiserror::Error;

/// Everything that can go wrong while driving a verification step.
///
/// All variants are recoverable from the user's perspective — retry the
/// command or the last button — except a persistence failure after the
/// role grant, which leaves roster and platform inconsistent (reported to
/// operators, never hidden).
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("command used outside the verification channel")]
    NotInVerificationContext,

    #[error("user is already verified")]
    AlreadyVerified,

    #[error("email not present in the roster")]
    EmailNotFound,

    #[error("email already used by a completed verification")]
    EmailAlreadyUsed,

    #[error("no active verification session")]
    NoActiveSession,

    #[error("interaction is not owned by the acting user")]
    ActorMismatch,

    #[error("access role or member could not be resolved")]
    RoleOrMemberUnresolved,

    #[error(transparent)]
    Roster(#[from] RosterError),

    #[error(transparent)]
    Platform(#[from] PlatformError),
}

impl VerifyError {
    /// The short, non-technical message shown to the affected user.
    /// `support` is the contact named for manual assistance.
    pub fn user_message(&self, support: &str) -> String {
        match self {
            Self::NotInVerificationContext => {
                "Please use this command in the verification channel.".into()
            }
            Self::AlreadyVerified => {
                "You've already been verified! If you're having issues, please contact an administrator."
                    .into()
            }
            Self::EmailNotFound => format!(
                "Email was not found in our database. Please try again with the email you \
                 registered with (hint: use the email your confirmation was sent to), or \
                 contact {support} if you need assistance."
            ),
            Self::EmailAlreadyUsed => format!(
                "This email has already been used to verify a user. Contact {support} if you \
                 need assistance."
            ),
            Self::NoActiveSession => {
                "Please start the verification process again using the /verify command.".into()
            }
            Self::ActorMismatch => format!(
                "This verification is not for you. Try again or contact {support} if you need \
                 assistance."
            ),
            Self::RoleOrMemberUnresolved => {
                "I couldn't assign your role. Please contact an administrator for help.".into()
            }
            Self::Roster(_) | Self::Platform(_) => {
                "An error occurred during verification. Please contact an administrator for \
                 assistance."
                    .into()
            }
        }
    }

    /// User-input mistakes are logged quietly; everything else is operator
    /// relevant.
    pub fn is_user_input_error(&self) -> bool {
        matches!(
            self,
            Self::NotInVerificationContext
                | Self::AlreadyVerified
                | Self::EmailNotFound
                | Self::EmailAlreadyUsed
                | Self::NoActiveSession
                | Self::ActorMismatch
        )
    }
}
