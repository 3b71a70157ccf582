//! Ledger errors

use thiserror::Error;

/// Ledger result type
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Bad caller input; never retried
    #[error("Validation error: {0}")]
    Validation(String),

    /// Requested input already reserved by another action
    #[error("Input already locked: {outpoint}")]
    LockConflict { outpoint: String },

    /// No action carries the given reference token
    #[error("Unknown reference: {0}")]
    MissingReference(String),

    /// The referenced action is not in the expected state
    #[error("Action for reference {reference} is {status}, expected pending")]
    InvalidState { reference: String, status: String },

    /// A pending action lacks its held transaction
    #[error("Pending action {0} has no held transaction")]
    MissingTransaction(String),

    /// A referenced outpoint is absent from every basket
    #[error("No UTXO found for input {index}: {outpoint}")]
    MissingUtxo { outpoint: String, index: usize },

    /// Key or template mismatch during signing; fatal to the action
    #[error("Signing error: {0}")]
    Signing(String),

    /// Broadcast rejected or unreachable; locks are not rolled back
    #[error("Broadcast failure: {0}")]
    Broadcast(String),

    /// Durable store failure
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Error from an external collaborator
    #[error("Collaborator error: {0}")]
    Collaborator(String),
}
