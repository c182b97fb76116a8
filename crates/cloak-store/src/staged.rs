//! Read-through view of committed state plus a pending change set.

use cloak_core::{Address, HandleId};

use crate::changes::ChangeSet;
use crate::error::Result;
use crate::records::{ContractRecord, DisclosureRecord, HandleRecord};
use crate::traits::StateView;

/// Committed state overlaid with the writes of the running transaction.
///
/// Reads consult the change set first, then the base.
pub struct StagedView<'a, S: StateView + ?Sized> {
    base: &'a S,
    changes: &'a ChangeSet,
}

impl<'a, S: StateView + ?Sized> StagedView<'a, S> {
    pub fn new(base: &'a S, changes: &'a ChangeSet) -> Self {
        Self { base, changes }
    }
}

impl<S: StateView + ?Sized> StateView for StagedView<'_, S> {
    fn get_handle(&self, handle: &HandleId) -> Result<Option<HandleRecord>> {
        if let Some(record) = self.changes.handles.get(handle) {
            return Ok(Some(record.clone()));
        }
        self.base.get_handle(handle)
    }

    fn has_permanent_grant(&self, handle: &HandleId, principal: &Address) -> Result<bool> {
        if self.changes.grants.contains(&(*handle, *principal)) {
            return Ok(true);
        }
        self.base.has_permanent_grant(handle, principal)
    }

    fn grants_for(&self, handle: &HandleId) -> Result<Vec<Address>> {
        let mut principals = self.base.grants_for(handle)?;
        principals.extend(
            self.changes
                .grants
                .iter()
                .filter(|(h, _)| h == handle)
                .map(|(_, p)| *p),
        );
        principals.sort();
        principals.dedup();
        Ok(principals)
    }

    fn is_public(&self, handle: &HandleId) -> Result<bool> {
        if self.changes.public.contains(handle) {
            return Ok(true);
        }
        self.base.is_public(handle)
    }

    fn get_operator(&self, holder: &Address, operator: &Address) -> Result<Option<u64>> {
        if let Some(until) = self.changes.operators.get(&(*holder, *operator)) {
            return Ok(Some(*until));
        }
        self.base.get_operator(holder, operator)
    }

    fn get_delegation(
        &self,
        delegator: &Address,
        delegate: &Address,
        contract: &Address,
    ) -> Result<Option<u64>> {
        if let Some(exp) = self
            .changes
            .delegations
            .get(&(*delegator, *delegate, *contract))
        {
            return Ok(Some(*exp));
        }
        self.base.get_delegation(delegator, delegate, contract)
    }

    fn get_disclosure(&self, handle: &HandleId) -> Result<Option<DisclosureRecord>> {
        if let Some(record) = self.changes.disclosures.get(handle) {
            return Ok(Some(record.clone()));
        }
        self.base.get_disclosure(handle)
    }

    fn get_slot(&self, contract: &Address, key: &[u8; 32]) -> Result<Option<HandleId>> {
        if let Some(handle) = self.changes.slots.get(&(*contract, *key)) {
            return Ok(Some(*handle));
        }
        self.base.get_slot(contract, key)
    }

    fn get_contract(&self, address: &Address) -> Result<Option<ContractRecord>> {
        if let Some(record) = self.changes.contracts.get(address) {
            return Ok(Some(record.clone()));
        }
        self.base.get_contract(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::traits::Store;
    use cloak_core::EncryptedType;

    fn handle(b: u8) -> HandleId {
        HandleId::compose(&[b; 32], 0, 1, EncryptedType::Uint8)
    }

    #[test]
    fn test_staged_grants_overlay_base() {
        let store = MemoryStore::new();
        let alice = Address::contract("alice");
        let bob = Address::contract("bob");

        let mut committed = ChangeSet::new(1);
        committed.grants.insert((handle(1), alice));
        store.commit(&committed).unwrap();

        let mut pending = ChangeSet::new(2);
        pending.grants.insert((handle(1), bob));
        pending.grants.insert((handle(2), bob));

        let view = StagedView::new(&store, &pending);
        assert!(view.has_permanent_grant(&handle(1), &alice).unwrap());
        assert!(view.has_permanent_grant(&handle(1), &bob).unwrap());

        let mut expected = vec![alice, bob];
        expected.sort();
        assert_eq!(view.grants_for(&handle(1)).unwrap(), expected);

        // base is untouched until commit
        assert!(!store.has_permanent_grant(&handle(1), &bob).unwrap());
    }

    #[test]
    fn test_staged_operator_shadows_base() {
        let store = MemoryStore::new();
        let holder = Address::contract("holder");
        let op = Address::contract("op");

        let mut committed = ChangeSet::new(1);
        committed.operators.insert((holder, op), 100);
        store.commit(&committed).unwrap();

        let mut pending = ChangeSet::new(2);
        pending.operators.insert((holder, op), 0);

        let view = StagedView::new(&store, &pending);
        assert_eq!(view.get_operator(&holder, &op).unwrap(), Some(0));
        assert_eq!(store.get_operator(&holder, &op).unwrap(), Some(100));
    }
}
