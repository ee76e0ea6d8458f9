//! Error types for the wallet core

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the wallet core
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Key generation and import errors
    #[error("Entropy source unavailable: {0}")]
    EntropyUnavailable(String),

    #[error("Invalid recovery phrase: {0}")]
    InvalidRecoveryPhrase(String),

    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    // Input validation errors
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    // Credential errors. Both are deliberately message-free about the cause:
    // a wrong password and a corrupted envelope must be indistinguishable.
    #[error("Decryption failed")]
    Decryption,

    #[error("Wallet unlock failed: invalid password or corrupted wallet data")]
    UnlockFailed,

    // Session state errors
    #[error("No wallet found")]
    NoWallet,

    #[error("Wallet is locked")]
    WalletLocked,

    // Network errors
    #[error("No provider available: {0}")]
    NoProviderAvailable(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Broadcast rejected: {0}")]
    Broadcast(String),

    #[error("Transaction {hash} not confirmed after {waited_secs}s; check a block explorer before retrying")]
    ConfirmationTimeout { hash: String, waited_secs: u64 },

    #[error("Transaction {hash} was broadcast but its confirmation status is unknown: {reason}")]
    ConfirmationUncertain { hash: String, reason: String },

    #[error("Transaction {hash} was included but reverted")]
    TransactionReverted { hash: String },

    // Send pipeline errors
    #[error("Insufficient balance: {available} available, {required} required")]
    InsufficientBalance { available: String, required: String },

    #[error("Transaction failed before broadcast: {0}")]
    TransactionFailed(String),

    // Storage errors
    #[error("Wallet storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Check if this error is retryable (transient infrastructure failure)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::NoProviderAvailable(_)
                | Error::Network(_)
                | Error::Broadcast(_)
                | Error::TransactionFailed(_)
        )
    }

    /// Check if this error occurred after the transaction left the wallet.
    /// The remedy differs: check a block explorer instead of retrying blindly.
    pub fn after_broadcast(&self) -> bool {
        matches!(
            self,
            Error::ConfirmationTimeout { .. }
                | Error::ConfirmationUncertain { .. }
                | Error::TransactionReverted { .. }
        )
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}
