//! Store traits: the abstract interface for permission-state persistence.
//!
//! The permission layer is storage-agnostic. Implementations include SQLite
//! (primary) and in-memory (for tests).
//!
//! # Design Notes
//!
//! - **Synchronous**: a ledger transaction never suspends, so reads and the
//!   commit are plain blocking calls.
//! - **Insert-only facts**: handles, permanent grants and public flags are
//!   never removed. Re-inserting an existing row is a no-op.
//! - **Atomic commit**: a [`ChangeSet`] is applied all-or-nothing.

use cloak_core::{Address, HandleId};

use crate::changes::{ChangeSet, CommitStats};
use crate::error::Result;
use crate::records::{ContractRecord, DisclosureRecord, HandleRecord};

/// Read access to ledger state.
pub trait StateView {
    /// Registry row of a handle.
    fn get_handle(&self, handle: &HandleId) -> Result<Option<HandleRecord>>;

    /// Whether a permanent grant exists for the pair.
    fn has_permanent_grant(&self, handle: &HandleId, principal: &Address) -> Result<bool>;

    /// All principals holding a permanent grant on the handle, sorted.
    fn grants_for(&self, handle: &HandleId) -> Result<Vec<Address>>;

    /// Whether the handle is flagged publicly decryptable.
    fn is_public(&self, handle: &HandleId) -> Result<bool>;

    /// Expiry of the operator grant `(holder, operator)`.
    fn get_operator(&self, holder: &Address, operator: &Address) -> Result<Option<u64>>;

    /// Expiry of the delegation `(delegator, delegate, contract)`.
    fn get_delegation(
        &self,
        delegator: &Address,
        delegate: &Address,
        contract: &Address,
    ) -> Result<Option<u64>>;

    /// Disclosure row of a handle.
    fn get_disclosure(&self, handle: &HandleId) -> Result<Option<DisclosureRecord>>;

    /// Handle stored in a contract slot.
    fn get_slot(&self, contract: &Address, key: &[u8; 32]) -> Result<Option<HandleId>>;

    /// Deployment row of a contract.
    fn get_contract(&self, address: &Address) -> Result<Option<ContractRecord>>;
}

/// A persistent store.
pub trait Store: StateView + Send + Sync {
    /// Apply a change set atomically.
    fn commit(&self, changes: &ChangeSet) -> Result<CommitStats>;

    /// Number of registered handles.
    fn handle_count(&self) -> Result<u64>;

    /// Highest transaction id ever committed (0 if none).
    fn last_tx_id(&self) -> Result<u64>;
}

impl<S: StateView + ?Sized> StateView for &S {
    fn get_handle(&self, handle: &HandleId) -> Result<Option<HandleRecord>> {
        (**self).get_handle(handle)
    }

    fn has_permanent_grant(&self, handle: &HandleId, principal: &Address) -> Result<bool> {
        (**self).has_permanent_grant(handle, principal)
    }

    fn grants_for(&self, handle: &HandleId) -> Result<Vec<Address>> {
        (**self).grants_for(handle)
    }

    fn is_public(&self, handle: &HandleId) -> Result<bool> {
        (**self).is_public(handle)
    }

    fn get_operator(&self, holder: &Address, operator: &Address) -> Result<Option<u64>> {
        (**self).get_operator(holder, operator)
    }

    fn get_delegation(
        &self,
        delegator: &Address,
        delegate: &Address,
        contract: &Address,
    ) -> Result<Option<u64>> {
        (**self).get_delegation(delegator, delegate, contract)
    }

    fn get_disclosure(&self, handle: &HandleId) -> Result<Option<DisclosureRecord>> {
        (**self).get_disclosure(handle)
    }

    fn get_slot(&self, contract: &Address, key: &[u8; 32]) -> Result<Option<HandleId>> {
        (**self).get_slot(contract, key)
    }

    fn get_contract(&self, address: &Address) -> Result<Option<ContractRecord>> {
        (**self).get_contract(address)
    }
}
