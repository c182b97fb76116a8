//! In-memory implementation of the Store trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use cloak_core::{Address, HandleId};

use crate::changes::{ChangeSet, CommitStats};
use crate::error::{Result, StoreError};
use crate::records::{
    ContractRecord, DelegationKey, DisclosureRecord, HandleRecord, OperatorKey, SlotKey,
};
use crate::traits::{StateView, Store};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    handles: HashMap<HandleId, HandleRecord>,
    /// Permanent grants per handle.
    grants: HashMap<HandleId, BTreeSet<Address>>,
    public: HashSet<HandleId>,
    operators: HashMap<OperatorKey, u64>,
    delegations: HashMap<DelegationKey, u64>,
    disclosures: HashMap<HandleId, DisclosureRecord>,
    slots: BTreeMap<SlotKey, HandleId>,
    contracts: HashMap<Address, ContractRecord>,
    last_tx_id: u64,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner.read().map_err(|_| StoreError::LockPoisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner.write().map_err(|_| StoreError::LockPoisoned)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateView for MemoryStore {
    fn get_handle(&self, handle: &HandleId) -> Result<Option<HandleRecord>> {
        Ok(self.read()?.handles.get(handle).cloned())
    }

    fn has_permanent_grant(&self, handle: &HandleId, principal: &Address) -> Result<bool> {
        Ok(self
            .read()?
            .grants
            .get(handle)
            .is_some_and(|set| set.contains(principal)))
    }

    fn grants_for(&self, handle: &HandleId) -> Result<Vec<Address>> {
        Ok(self
            .read()?
            .grants
            .get(handle)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default())
    }

    fn is_public(&self, handle: &HandleId) -> Result<bool> {
        Ok(self.read()?.public.contains(handle))
    }

    fn get_operator(&self, holder: &Address, operator: &Address) -> Result<Option<u64>> {
        Ok(self.read()?.operators.get(&(*holder, *operator)).copied())
    }

    fn get_delegation(
        &self,
        delegator: &Address,
        delegate: &Address,
        contract: &Address,
    ) -> Result<Option<u64>> {
        Ok(self
            .read()?
            .delegations
            .get(&(*delegator, *delegate, *contract))
            .copied())
    }

    fn get_disclosure(&self, handle: &HandleId) -> Result<Option<DisclosureRecord>> {
        Ok(self.read()?.disclosures.get(handle).cloned())
    }

    fn get_slot(&self, contract: &Address, key: &[u8; 32]) -> Result<Option<HandleId>> {
        Ok(self.read()?.slots.get(&(*contract, *key)).copied())
    }

    fn get_contract(&self, address: &Address) -> Result<Option<ContractRecord>> {
        Ok(self.read()?.contracts.get(address).cloned())
    }
}

impl Store for MemoryStore {
    fn commit(&self, changes: &ChangeSet) -> Result<CommitStats> {
        let mut inner = self.write()?;
        let mut stats = CommitStats::default();

        for (id, record) in &changes.handles {
            if !inner.handles.contains_key(id) {
                inner.handles.insert(*id, record.clone());
                stats.handles += 1;
            }
        }
        for (handle, principal) in &changes.grants {
            if inner.grants.entry(*handle).or_default().insert(*principal) {
                stats.grants += 1;
            }
        }
        for handle in &changes.public {
            if inner.public.insert(*handle) {
                stats.public += 1;
            }
        }
        for (key, until) in &changes.operators {
            inner.operators.insert(*key, *until);
        }
        for (key, exp) in &changes.delegations {
            inner.delegations.insert(*key, *exp);
        }
        for (handle, record) in &changes.disclosures {
            inner.disclosures.insert(*handle, record.clone());
        }
        for (key, handle) in &changes.slots {
            inner.slots.insert(*key, *handle);
        }
        for (address, record) in &changes.contracts {
            inner.contracts.entry(*address).or_insert_with(|| record.clone());
        }
        inner.last_tx_id = inner.last_tx_id.max(changes.tx_id);

        stats.rows = changes.len();
        debug!(tx_id = changes.tx_id, rows = stats.rows, "memory store commit");
        Ok(stats)
    }

    fn handle_count(&self) -> Result<u64> {
        Ok(self.read()?.handles.len() as u64)
    }

    fn last_tx_id(&self) -> Result<u64> {
        Ok(self.read()?.last_tx_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{DisclosureState, HandleOrigin};
    use cloak_core::{ClearValue, EncryptedType};

    fn record(b: u8, owner: Address) -> HandleRecord {
        HandleRecord {
            handle: HandleId::compose(&[b; 32], 0, 1, EncryptedType::Uint64),
            ty: EncryptedType::Uint64,
            owner,
            origin: HandleOrigin::Input,
            created_at: 10,
            tx_id: 1,
        }
    }

    #[test]
    fn test_memory_store_basic() {
        let store = MemoryStore::new();
        let owner = Address::contract("token");
        let rec = record(1, owner);

        let mut changes = ChangeSet::new(1);
        changes.handles.insert(rec.handle, rec.clone());
        changes.grants.insert((rec.handle, owner));
        store.commit(&changes).unwrap();

        assert_eq!(store.get_handle(&rec.handle).unwrap(), Some(rec.clone()));
        assert!(store.has_permanent_grant(&rec.handle, &owner).unwrap());
        assert_eq!(store.handle_count().unwrap(), 1);
        assert_eq!(store.last_tx_id().unwrap(), 1);
    }

    #[test]
    fn test_memory_store_handles_are_immutable() {
        let store = MemoryStore::new();
        let rec = record(1, Address::contract("token"));

        let mut first = ChangeSet::new(1);
        first.handles.insert(rec.handle, rec.clone());
        assert_eq!(store.commit(&first).unwrap().handles, 1);

        let mut rewrite = ChangeSet::new(2);
        let mut other = rec.clone();
        other.owner = Address::contract("mallory");
        rewrite.handles.insert(rec.handle, other);
        assert_eq!(store.commit(&rewrite).unwrap().handles, 0);

        assert_eq!(store.get_handle(&rec.handle).unwrap().unwrap().owner, rec.owner);
    }

    #[test]
    fn test_memory_store_idempotent_grants() {
        let store = MemoryStore::new();
        let rec = record(1, Address::contract("token"));
        let alice = Address::contract("alice");

        let mut changes = ChangeSet::new(1);
        changes.grants.insert((rec.handle, alice));
        changes.public.insert(rec.handle);

        let s1 = store.commit(&changes).unwrap();
        let s2 = store.commit(&changes).unwrap();
        assert_eq!((s1.grants, s1.public), (1, 1));
        assert_eq!((s2.grants, s2.public), (0, 0));
        assert_eq!(store.grants_for(&rec.handle).unwrap(), vec![alice]);
    }

    #[test]
    fn test_memory_store_disclosure_upsert() {
        let store = MemoryStore::new();
        let rec = record(1, Address::contract("token"));
        let alice = Address::contract("alice");

        let mut changes = ChangeSet::new(1);
        changes
            .disclosures
            .insert(rec.handle, DisclosureRecord::requested(rec.handle, alice, 7, 100));
        store.commit(&changes).unwrap();

        let mut finalized = DisclosureRecord::requested(rec.handle, alice, 7, 100);
        finalized.state = DisclosureState::Finalized;
        finalized.plaintext = Some(ClearValue::from_u128(EncryptedType::Uint64, 5).unwrap());
        finalized.finalized_at = Some(120);

        let mut changes = ChangeSet::new(2);
        changes.disclosures.insert(rec.handle, finalized.clone());
        store.commit(&changes).unwrap();

        assert_eq!(store.get_disclosure(&rec.handle).unwrap(), Some(finalized));
    }

    #[test]
    fn test_memory_store_contracts_are_immutable() {
        let store = MemoryStore::new();
        let alice = Address::contract("alice");
        let address = Address::deployed(&alice, "cUSD");
        let record = ContractRecord {
            address,
            deployer: alice,
            name: "cUSD".into(),
            deployed_at: 10,
            tx_id: 1,
        };

        let mut changes = ChangeSet::new(1);
        changes.contracts.insert(address, record.clone());
        store.commit(&changes).unwrap();

        let mut rewrite = ChangeSet::new(2);
        let mut forged = record.clone();
        forged.deployer = Address::contract("mallory");
        rewrite.contracts.insert(address, forged);
        store.commit(&rewrite).unwrap();

        assert_eq!(store.get_contract(&address).unwrap(), Some(record));
        assert_eq!(store.get_contract(&alice).unwrap(), None);
    }
}
