//! Error types for the ledger.

use cloak_acl::AclError;
use cloak_core::{CoreError, HandleId};
use cloak_relayer::RelayerError;
use cloak_store::StoreError;
use thiserror::Error;

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Permission-layer rejection; the transaction reverts.
    #[error("{0}")]
    Acl(#[from] AclError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// Decryption service error.
    #[error("relayer error: {0}")]
    Relayer(#[from] RelayerError),

    /// The co-processor has no ciphertext for a handle.
    #[error("co-processor has no ciphertext for {0}")]
    UnknownCiphertext(HandleId),

    /// The co-processor rejected an input or an evaluation.
    #[error("co-processor error: {0}")]
    Coprocessor(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    /// A writer panicked while holding the ledger lock.
    #[error("ledger lock poisoned")]
    LockPoisoned,
}

impl LedgerError {
    /// Machine-readable revert reason.
    pub fn reason_code(&self) -> &'static str {
        match self {
            LedgerError::Acl(e) => e.reason_code(),
            LedgerError::Store(_) => "Store",
            LedgerError::Core(_) => "Core",
            LedgerError::Relayer(_) => "Relayer",
            LedgerError::UnknownCiphertext(_) | LedgerError::Coprocessor(_) => "Coprocessor",
            LedgerError::Config(_) => "InvalidConfig",
            LedgerError::LockPoisoned => "LockPoisoned",
        }
    }

    /// The permission-layer error, if this is one.
    pub fn as_acl(&self) -> Option<&AclError> {
        match self {
            LedgerError::Acl(e) => Some(e),
            _ => None,
        }
    }
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
