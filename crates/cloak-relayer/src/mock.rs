//! In-memory ledger view and oracle for unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use cloak_core::{Address, ClearValue, HandleId};

use crate::error::{RelayerError, Result};
use crate::oracle::{AclView, DecryptionOracle};

#[derive(Default)]
pub struct MockLedger {
    pub now: Mutex<u64>,
    pub grants: Mutex<HashSet<(HandleId, Address)>>,
    pub public: Mutex<HashSet<HandleId>>,
    pub delegations: Mutex<HashMap<(Address, Address, Address), u64>>,
    pub values: Mutex<HashMap<HandleId, ClearValue>>,
}

impl MockLedger {
    pub fn at(now: u64) -> Self {
        let ledger = Self::default();
        *ledger.now.lock().unwrap() = now;
        ledger
    }

    pub fn store(&self, handle: HandleId, value: ClearValue) {
        self.values.lock().unwrap().insert(handle, value);
    }

    pub fn allow(&self, handle: HandleId, principal: Address) {
        self.grants.lock().unwrap().insert((handle, principal));
    }

    pub fn make_public(&self, handle: HandleId) {
        self.public.lock().unwrap().insert(handle);
    }

    pub fn delegate(&self, delegator: Address, delegate: Address, contract: Address, until: u64) {
        self.delegations
            .lock()
            .unwrap()
            .insert((delegator, delegate, contract), until);
    }
}

#[async_trait]
impl AclView for MockLedger {
    async fn is_allowed(&self, handle: &HandleId, principal: &Address) -> Result<bool> {
        Ok(self.grants.lock().unwrap().contains(&(*handle, *principal))
            || self.public.lock().unwrap().contains(handle))
    }

    async fn is_publicly_decryptable(&self, handle: &HandleId) -> Result<bool> {
        Ok(self.public.lock().unwrap().contains(handle))
    }

    async fn delegation_expiration(
        &self,
        delegator: &Address,
        delegate: &Address,
        contract: &Address,
    ) -> Result<u64> {
        Ok(self
            .delegations
            .lock()
            .unwrap()
            .get(&(*delegator, *delegate, *contract))
            .copied()
            .unwrap_or(0))
    }

    async fn now(&self) -> Result<u64> {
        Ok(*self.now.lock().unwrap())
    }
}

#[async_trait]
impl DecryptionOracle for MockLedger {
    async fn decrypt(&self, handle: &HandleId) -> Result<ClearValue> {
        self.values
            .lock()
            .unwrap()
            .get(handle)
            .cloned()
            .ok_or_else(|| RelayerError::Oracle(format!("no ciphertext for {handle}")))
    }
}
