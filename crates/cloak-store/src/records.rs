//! Rows persisted by the store.

use serde::{Deserialize, Serialize};

use cloak_core::{Address, ClearValue, EncryptedType, HandleId};

use crate::error::StoreError;

/// How a handle came into existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum HandleOrigin {
    /// Admitted from a proven external ciphertext.
    Input = 0,
    /// Produced by the co-processor from other handles.
    Computed = 1,
    /// Encryption of a public constant.
    Trivial = 2,
}

impl HandleOrigin {
    pub const fn to_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(v: u8) -> Result<Self, StoreError> {
        match v {
            0 => Ok(HandleOrigin::Input),
            1 => Ok(HandleOrigin::Computed),
            2 => Ok(HandleOrigin::Trivial),
            other => Err(StoreError::InvalidData(format!("unknown handle origin {other}"))),
        }
    }
}

/// Registry metadata of a handle. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandleRecord {
    pub handle: HandleId,
    pub ty: EncryptedType,
    /// Contract context that owns the handle.
    pub owner: Address,
    pub origin: HandleOrigin,
    /// Block time (seconds) of the creating transaction.
    pub created_at: u64,
    pub tx_id: u64,
}

/// Disclosure lifecycle. `None` is represented by the absence of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum DisclosureState {
    Requested = 1,
    Finalized = 2,
}

impl DisclosureState {
    pub const fn to_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(v: u8) -> Result<Self, StoreError> {
        match v {
            1 => Ok(DisclosureState::Requested),
            2 => Ok(DisclosureState::Finalized),
            other => Err(StoreError::InvalidData(format!(
                "unknown disclosure state {other}"
            ))),
        }
    }
}

/// A disclosure request and, once finalized, its plaintext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisclosureRecord {
    pub handle: HandleId,
    pub requester: Address,
    pub request_id: u64,
    pub state: DisclosureState,
    pub plaintext: Option<ClearValue>,
    pub requested_at: u64,
    pub finalized_at: Option<u64>,
}

impl DisclosureRecord {
    /// A fresh request.
    pub fn requested(handle: HandleId, requester: Address, request_id: u64, at: u64) -> Self {
        Self {
            handle,
            requester,
            request_id,
            state: DisclosureState::Requested,
            plaintext: None,
            requested_at: at,
            finalized_at: None,
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.state == DisclosureState::Finalized
    }
}

/// A deployed contract. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractRecord {
    pub address: Address,
    /// Principal that deployed the contract.
    pub deployer: Address,
    pub name: String,
    /// Block time (seconds) of the deploying transaction.
    pub deployed_at: u64,
    pub tx_id: u64,
}

/// Key of a user-decryption delegation: `(delegator, delegate, contract)`.
pub type DelegationKey = (Address, Address, Address);

/// Key of an operator grant: `(holder, operator)`.
pub type OperatorKey = (Address, Address);

/// Key of a contract slot: `(contract, slot)`.
pub type SlotKey = (Address, [u8; 32]);
