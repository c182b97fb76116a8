//! Error types for the permission layer.
//!
//! Every variant aborts the enclosing transaction. Proof, ACL, budget and
//! disclosure failures are hard: once raised inside a transaction they stick
//! to its context, so the transaction cannot commit even if the error is
//! caught. Arithmetic overflow is not represented here: it is reported
//! through an encrypted success flag.

use thiserror::Error;

use cloak_core::{Address, HandleId};

use crate::budget::BudgetKind;

/// Errors that can occur during permission operations.
#[derive(Debug, Error)]
pub enum AclError {
    /// Proof malformed, under-signed, or for another chain.
    #[error("invalid proof: {0}")]
    ProofInvalid(String),

    /// Proof is valid but certifies a different contract or user.
    #[error("proof bound to contract {proof_contract} / user {proof_user}, expected {contract} / {user}")]
    ProofBindingMismatch {
        proof_contract: Address,
        proof_user: Address,
        contract: Address,
        user: Address,
    },

    /// Principal is not allowed on the handle.
    #[error("{principal} is not allowed on handle {handle}")]
    AclDenied { handle: HandleId, principal: Address },

    /// Operator grant exists but is no longer valid.
    #[error("operator {operator} for {holder} expired at {until}")]
    OperatorExpired {
        holder: Address,
        operator: Address,
        until: u64,
    },

    /// No operator grant for the pair.
    #[error("{operator} is not an operator for {holder}")]
    OperatorNotSet { holder: Address, operator: Address },

    /// Finalize without a prior request.
    #[error("disclosure of {0} was never requested")]
    DisclosureNotRequested(HandleId),

    /// Disclosure already finalized.
    #[error("disclosure of {0} is already finalized")]
    DisclosureAlreadyFinalized(HandleId),

    /// Computation budget exhausted.
    #[error("{kind} HCU budget exceeded: {needed} > {limit}")]
    BudgetExceeded {
        kind: BudgetKind,
        needed: u64,
        limit: u64,
    },

    /// Handle is not in the registry.
    #[error("handle not found: {0}")]
    HandleNotFound(HandleId),

    /// Operand types do not fit the operation.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// Caller lacks the role required for the operation.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Delegation request rejected.
    #[error("invalid delegation: {0}")]
    InvalidDelegation(String),

    /// Configuration rejected at startup.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// A transfer check blocked the transfer.
    #[error("transfer blocked by {check}: {reason}")]
    TransferBlocked { check: String, reason: String },

    /// Store error.
    #[error("store error: {0}")]
    Store(#[from] cloak_store::StoreError),

    /// Core error.
    #[error("core error: {0}")]
    Core(#[from] cloak_core::CoreError),
}

impl AclError {
    /// Whether this failure aborts the whole transaction regardless of how
    /// the caller handles it.
    pub fn is_hard(&self) -> bool {
        matches!(
            self,
            AclError::ProofInvalid(_)
                | AclError::ProofBindingMismatch { .. }
                | AclError::AclDenied { .. }
                | AclError::BudgetExceeded { .. }
                | AclError::DisclosureNotRequested(_)
                | AclError::DisclosureAlreadyFinalized(_)
        )
    }

    /// A copy of a hard failure, for reporting it again. `None` otherwise.
    pub fn replay(&self) -> Option<AclError> {
        let copy = match self {
            AclError::ProofInvalid(reason) => AclError::ProofInvalid(reason.clone()),
            AclError::ProofBindingMismatch {
                proof_contract,
                proof_user,
                contract,
                user,
            } => AclError::ProofBindingMismatch {
                proof_contract: *proof_contract,
                proof_user: *proof_user,
                contract: *contract,
                user: *user,
            },
            AclError::AclDenied { handle, principal } => AclError::AclDenied {
                handle: *handle,
                principal: *principal,
            },
            AclError::BudgetExceeded {
                kind,
                needed,
                limit,
            } => AclError::BudgetExceeded {
                kind: *kind,
                needed: *needed,
                limit: *limit,
            },
            AclError::DisclosureNotRequested(handle) => AclError::DisclosureNotRequested(*handle),
            AclError::DisclosureAlreadyFinalized(handle) => {
                AclError::DisclosureAlreadyFinalized(*handle)
            }
            _ => return None,
        };
        Some(copy)
    }

    /// Machine-readable revert reason.
    pub fn reason_code(&self) -> &'static str {
        match self {
            AclError::ProofInvalid(_) => "ProofInvalid",
            AclError::ProofBindingMismatch { .. } => "ProofBindingMismatch",
            AclError::AclDenied { .. } => "ACLDenied",
            AclError::OperatorExpired { .. } => "OperatorExpired",
            AclError::OperatorNotSet { .. } => "OperatorNotSet",
            AclError::DisclosureNotRequested(_) => "DisclosureNotRequested",
            AclError::DisclosureAlreadyFinalized(_) => "DisclosureAlreadyFinalized",
            AclError::BudgetExceeded {
                kind: BudgetKind::Global,
                ..
            } => "BudgetExceeded(Global)",
            AclError::BudgetExceeded {
                kind: BudgetKind::Sequential,
                ..
            } => "BudgetExceeded(Sequential)",
            AclError::HandleNotFound(_) => "HandleNotFound",
            AclError::TypeMismatch(_) => "TypeMismatch",
            AclError::Unauthorized(_) => "Unauthorized",
            AclError::InvalidDelegation(_) => "InvalidDelegation",
            AclError::InvalidConfig(_) => "InvalidConfig",
            AclError::TransferBlocked { .. } => "TransferBlocked",
            AclError::Store(_) => "StoreError",
            AclError::Core(_) => "CoreError",
        }
    }
}

/// Result type for permission operations.
pub type Result<T> = std::result::Result<T, AclError>;
