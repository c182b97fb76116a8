//! Ledger events emitted by committed transactions.

use serde::{Deserialize, Serialize};

use cloak_core::{Address, ClearValue, EncryptedType, HandleId};
use cloak_store::HandleOrigin;

/// An observable state transition.
///
/// Events are buffered in the transaction context and only published when
/// the transaction commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    HandleCreated {
        handle: HandleId,
        owner: Address,
        ty: EncryptedType,
        origin: HandleOrigin,
    },
    Allowed {
        handle: HandleId,
        principal: Address,
    },
    PublicDecryptEnabled {
        handle: HandleId,
    },
    DisclosureRequested {
        handle: HandleId,
        requester: Address,
        request_id: u64,
    },
    DisclosureFinalized {
        handle: HandleId,
        request_id: u64,
        plaintext: ClearValue,
    },
    OperatorSet {
        holder: Address,
        operator: Address,
        until: u64,
    },
    DelegatedForUserDecryption {
        delegator: Address,
        delegate: Address,
        contract: Address,
        expiration: u64,
    },
    ContractDeployed {
        address: Address,
        deployer: Address,
        name: String,
    },
    ConfidentialTransfer {
        token: Address,
        from: Address,
        to: Address,
        amount: HandleId,
    },
}

impl LedgerEvent {
    /// Short event name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            LedgerEvent::HandleCreated { .. } => "HandleCreated",
            LedgerEvent::Allowed { .. } => "Allowed",
            LedgerEvent::PublicDecryptEnabled { .. } => "PublicDecryptEnabled",
            LedgerEvent::DisclosureRequested { .. } => "DisclosureRequested",
            LedgerEvent::DisclosureFinalized { .. } => "DisclosureFinalized",
            LedgerEvent::OperatorSet { .. } => "OperatorSet",
            LedgerEvent::DelegatedForUserDecryption { .. } => "DelegatedForUserDecryption",
            LedgerEvent::ContractDeployed { .. } => "ContractDeployed",
            LedgerEvent::ConfidentialTransfer { .. } => "ConfidentialTransfer",
        }
    }
}
