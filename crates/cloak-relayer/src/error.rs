//! Error types for the decryption authorization boundary.

use thiserror::Error;

use cloak_core::{Address, CoreError, HandleId};

use crate::messages::ErrorCode;

/// Errors raised by the relayer client and service.
#[derive(Debug, Error)]
pub enum RelayerError {
    /// Request is structurally invalid.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Validity window is empty or too long.
    #[error("invalid duration: {days} days (max {max})")]
    InvalidDuration { days: u32, max: u32 },

    /// Current time lies outside the signed window.
    #[error("signature expired: window [{start}, {end}), now {now}")]
    SignatureExpired { start: u64, end: u64, now: u64 },

    /// Request exceeds a size limit.
    #[error("too many {what}: {count} > {max}")]
    TooMany {
        what: &'static str,
        count: usize,
        max: usize,
    },

    /// Signature over the authorization message does not verify.
    #[error("invalid signature")]
    InvalidSignature,

    /// A handle's contract is not listed in the signed message.
    #[error("contract {0} not authorized by the signature")]
    ContractNotListed(Address),

    /// A contract address equals the requesting user.
    #[error("contract {0} equals the requesting user")]
    ContractIsUser(Address),

    /// On-ledger ACL does not allow the principal on the handle.
    #[error("{principal} is not allowed on {handle}")]
    NotAllowed { handle: HandleId, principal: Address },

    /// No live user-decryption delegation covers the request.
    #[error("no live delegation from {delegator} to {delegate} for {contract}")]
    DelegationMissing {
        delegator: Address,
        delegate: Address,
        contract: Address,
    },

    /// Public decryption asked for a handle that is not public.
    #[error("{0} is not publicly decryptable")]
    NotPublic(HandleId),

    /// Re-encryption failed.
    #[error("encryption error: {0}")]
    Encryption(String),

    /// Local decryption of a response failed.
    #[error("decryption error: {0}")]
    Decryption(String),

    /// The key-management backend failed.
    #[error("oracle error: {0}")]
    Oracle(String),

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(String),

    /// Timeout waiting for the peer.
    #[error("timeout: {0}")]
    Timeout(String),

    /// The service rejected the request.
    #[error("service error ({code:?}): {message}")]
    Service { code: ErrorCode, message: String },

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl RelayerError {
    /// Machine-readable code sent back to clients.
    pub fn code(&self) -> ErrorCode {
        match self {
            RelayerError::InvalidRequest(_)
            | RelayerError::InvalidDuration { .. }
            | RelayerError::ContractNotListed(_)
            | RelayerError::ContractIsUser(_) => ErrorCode::InvalidRequest,
            RelayerError::TooMany { .. } => ErrorCode::MessageTooLarge,
            RelayerError::SignatureExpired { .. } => ErrorCode::SignatureExpired,
            RelayerError::InvalidSignature => ErrorCode::InvalidSignature,
            RelayerError::NotAllowed { .. } | RelayerError::DelegationMissing { .. } => {
                ErrorCode::NotAuthorized
            }
            RelayerError::NotPublic(_) => ErrorCode::NotPublic,
            RelayerError::Oracle(_) | RelayerError::Transport(_) | RelayerError::Timeout(_) => {
                ErrorCode::Unavailable
            }
            RelayerError::Service { code, .. } => *code,
            RelayerError::Encryption(_) | RelayerError::Decryption(_) | RelayerError::Core(_) => {
                ErrorCode::InternalError
            }
        }
    }

    /// Whether retrying the same request may succeed later.
    pub fn is_retryable(&self) -> bool {
        self.code().is_retryable()
    }
}

/// Result type for relayer operations.
pub type Result<T> = std::result::Result<T, RelayerError>;
