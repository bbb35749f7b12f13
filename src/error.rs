use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failure taxonomy for one rotation run.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid or missing input, detected before any collaborator call.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// AWS IAM or STS call failure.
    #[error("credential provider error: {0}")]
    Credentials(String),
    /// GitHub secret store call failure.
    #[error("secret store error: {0}")]
    Store(String),
    /// Sealing a value for the store failed.
    #[error("seal error: {0}")]
    Seal(String),
    /// The user was already at the two-key cap and the recovery deletion
    /// failed as well; the user is stuck above capacity and needs manual
    /// intervention.
    #[error("IAM user {user} already has 2 access keys and deleting the oldest failed: {source}")]
    OverCapacity {
        user: String,
        #[source]
        source: Box<Error>,
    },
    /// Capacity was freed but the re-read state still reported two keys.
    #[error("rotation for IAM user {user} did not converge after freeing key capacity")]
    RetryExhausted { user: String },
}
