//! Per-transaction execution context.
//!
//! A `TxContext` is created for every ledger transaction and passed through
//! the whole call chain. It owns everything that must not outlive the
//! transaction: transient grants, the verified-proof cache, staged writes,
//! buffered events and the HCU meter. Committing consumes it; dropping it
//! discards all of the above.
//!
//! The first hard failure (see [`AclError::is_hard`]) is latched. From then on
//! every state-changing operation fails with the same error and
//! [`TxContext::into_effects`] refuses to hand over the change set.

use std::cell::OnceCell;
use std::collections::HashSet;

use tracing::{trace, warn};

use cloak_core::{Address, Blake3Hash, HandleId};
use cloak_store::{ChangeSet, StagedView, StateView};

use crate::budget::BudgetMeter;
use crate::config::AclConfig;
use crate::error::{AclError, Result};
use crate::events::LedgerEvent;

/// Everything a committed transaction hands back to the ledger.
#[derive(Debug)]
pub struct TxEffects {
    pub changes: ChangeSet,
    pub events: Vec<LedgerEvent>,
    pub hcu_used: u64,
}

/// Mutable state of one running transaction.
pub struct TxContext<'s, S: StateView + ?Sized> {
    store: &'s S,
    config: &'s AclConfig,
    tx_id: u64,
    block_time: u64,
    caller: Address,
    origin: Address,
    pub(crate) transient: HashSet<(HandleId, Address)>,
    pub(crate) verified_proofs: HashSet<Blake3Hash>,
    pub(crate) changes: ChangeSet,
    events: Vec<LedgerEvent>,
    pub(crate) meter: BudgetMeter,
    counter: u64,
    aborted: OnceCell<AclError>,
}

impl<'s, S: StateView + ?Sized> TxContext<'s, S> {
    /// Start a transaction submitted by `sender`.
    pub fn new(
        store: &'s S,
        config: &'s AclConfig,
        tx_id: u64,
        block_time: u64,
        sender: Address,
    ) -> Self {
        Self {
            store,
            config,
            tx_id,
            block_time,
            caller: sender,
            origin: sender,
            transient: HashSet::new(),
            verified_proofs: HashSet::new(),
            changes: ChangeSet::new(tx_id),
            events: Vec::new(),
            meter: BudgetMeter::new(config.hcu),
            counter: 0,
            aborted: OnceCell::new(),
        }
    }

    pub fn tx_id(&self) -> u64 {
        self.tx_id
    }

    /// Block time in seconds.
    pub fn block_time(&self) -> u64 {
        self.block_time
    }

    /// The principal currently executing (changes inside contract calls).
    pub fn caller(&self) -> Address {
        self.caller
    }

    /// The principal that submitted the transaction.
    pub fn origin(&self) -> Address {
        self.origin
    }

    pub fn config(&self) -> &AclConfig {
        self.config
    }

    pub fn chain_id(&self) -> u64 {
        self.config.chain_id
    }

    /// Committed state overlaid with this transaction's writes.
    pub fn view(&self) -> StagedView<'_, S> {
        StagedView::new(self.store, &self.changes)
    }

    /// HCU spent so far.
    pub fn hcu_used(&self) -> u64 {
        self.meter.used()
    }

    /// Buffered events, in emission order.
    pub fn events(&self) -> &[LedgerEvent] {
        &self.events
    }

    /// Make `principal` the executing context; returns the previous caller.
    pub(crate) fn switch_caller(&mut self, principal: Address) -> Address {
        std::mem::replace(&mut self.caller, principal)
    }

    /// The hard failure that aborted this transaction, if any.
    pub fn aborted(&self) -> Option<&AclError> {
        self.aborted.get()
    }

    /// Latch `err` if it is the first hard failure, then hand it back.
    pub(crate) fn abort(&self, err: AclError) -> AclError {
        if self.aborted.get().is_none() {
            if let Some(copy) = err.replay() {
                warn!(tx_id = self.tx_id, reason = err.reason_code(), error = %err, "transaction aborted");
                let _ = self.aborted.set(copy);
            }
        }
        err
    }

    /// Fail with the latched error once the transaction has aborted.
    pub(crate) fn ensure_live(&self) -> Result<()> {
        match self.aborted.get().and_then(AclError::replay) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Buffer an event; it is published only if the transaction commits.
    pub fn emit(&mut self, event: LedgerEvent) {
        trace!(tx_id = self.tx_id, event = event.name(), "emit");
        self.events.push(event);
    }

    /// Fresh per-transaction nonce.
    pub(crate) fn next_nonce(&mut self) -> u64 {
        self.counter += 1;
        self.counter
    }

    /// Hand the staged writes and events to the ledger. Fails with the
    /// latched error if the transaction aborted.
    pub fn into_effects(self) -> Result<TxEffects> {
        self.ensure_live()?;
        Ok(TxEffects {
            hcu_used: self.meter.used(),
            changes: self.changes,
            events: self.events,
        })
    }
}
