//! Staged writes of a single transaction.
//!
//! A `ChangeSet` is built up while a transaction runs and applied to the
//! store in one atomic commit. Dropping it discards every write.

use std::collections::{BTreeMap, BTreeSet};

use cloak_core::{Address, HandleId};

use crate::records::{
    ContractRecord, DelegationKey, DisclosureRecord, HandleRecord, OperatorKey, SlotKey,
};

/// Pending writes, keyed so that later writes to the same key win.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// Transaction that produced these writes.
    pub tx_id: u64,
    /// New registry rows (insert only).
    pub handles: BTreeMap<HandleId, HandleRecord>,
    /// New permanent grants (insert only).
    pub grants: BTreeSet<(HandleId, Address)>,
    /// Handles newly flagged publicly decryptable (insert only).
    pub public: BTreeSet<HandleId>,
    /// Operator grants, value is `until`.
    pub operators: BTreeMap<OperatorKey, u64>,
    /// User-decryption delegations, value is the expiration.
    pub delegations: BTreeMap<DelegationKey, u64>,
    /// Disclosure rows (upsert).
    pub disclosures: BTreeMap<HandleId, DisclosureRecord>,
    /// Contract slots (upsert).
    pub slots: BTreeMap<SlotKey, HandleId>,
    /// Newly deployed contracts (insert only).
    pub contracts: BTreeMap<Address, ContractRecord>,
}

impl ChangeSet {
    /// Empty change set for the given transaction.
    pub fn new(tx_id: u64) -> Self {
        Self {
            tx_id,
            ..Self::default()
        }
    }

    /// Whether there is nothing to commit.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
            && self.grants.is_empty()
            && self.public.is_empty()
            && self.operators.is_empty()
            && self.delegations.is_empty()
            && self.disclosures.is_empty()
            && self.slots.is_empty()
            && self.contracts.is_empty()
    }

    /// Total number of staged rows.
    pub fn len(&self) -> usize {
        self.handles.len()
            + self.grants.len()
            + self.public.len()
            + self.operators.len()
            + self.delegations.len()
            + self.disclosures.len()
            + self.slots.len()
            + self.contracts.len()
    }
}

/// Summary of an applied commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitStats {
    pub handles: usize,
    pub grants: usize,
    pub public: usize,
    pub rows: usize,
}
