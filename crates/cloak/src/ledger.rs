//! The Ledger: transactions over the permission layer and the co-processor.
//!
//! Transactions are serialized behind one writer lock. Each gets a fresh
//! [`TxContext`]; when the body returns `Ok` the staged change set is
//! committed atomically, and on `Err` the context is dropped, which discards
//! staged writes, transient grants and buffered events together. A hard
//! failure inside the body reverts the transaction even if the body caught
//! it and returned `Ok`.

use std::sync::Mutex;

use tracing::{debug, info, warn};

use cloak_acl::{AclError, LedgerEvent, TxContext};
use cloak_core::{Address, ClearValue, HandleId};
use cloak_relayer::RelayerConfig;
use cloak_store::{DisclosureState, Store};

use crate::config::LedgerConfig;
use crate::coprocessor::Coprocessor;
use crate::error::{LedgerError, Result};
use crate::tx::Tx;

/// What a committed transaction produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutcome<T> {
    pub tx_id: u64,
    /// Value returned by the transaction body.
    pub value: T,
    /// Events in emission order.
    pub events: Vec<LedgerEvent>,
    pub hcu_used: u64,
}

#[derive(Debug, Clone, Copy)]
struct Clock {
    last_tx_id: u64,
    time: u64,
}

/// The ledger.
pub struct Ledger<S: Store, C: Coprocessor> {
    store: S,
    coprocessor: C,
    config: LedgerConfig,
    /// Writer lock; also guards the transaction counter and block time.
    clock: Mutex<Clock>,
}

impl<S: Store, C: Coprocessor> Ledger<S, C> {
    /// Open a ledger over `store`. Transaction ids continue after the last
    /// committed one; block time starts at the configured genesis time.
    pub fn new(store: S, coprocessor: C, config: LedgerConfig) -> Result<Self> {
        config.validate()?;
        let last_tx_id = store.last_tx_id()?;
        info!(
            chain_id = config.acl.chain_id,
            last_tx_id,
            handles = store.handle_count()?,
            "ledger opened"
        );
        let clock = Clock {
            last_tx_id,
            time: config.genesis_time,
        };
        Ok(Self {
            store,
            coprocessor,
            config,
            clock: Mutex::new(clock),
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn coprocessor(&self) -> &C {
        &self.coprocessor
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn chain_id(&self) -> u64 {
        self.config.acl.chain_id
    }

    /// Settings for a decryption service serving this ledger.
    pub fn relayer_config(&self) -> RelayerConfig {
        self.config.relayer_config()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Time
    // ─────────────────────────────────────────────────────────────────────────

    /// Current block time, in seconds.
    pub fn now(&self) -> Result<u64> {
        Ok(self.lock()?.time)
    }

    /// Move block time forward by `seconds`.
    pub fn advance_time(&self, seconds: u64) -> Result<u64> {
        let mut clock = self.lock()?;
        clock.time = clock.time.saturating_add(seconds);
        debug!(time = clock.time, "block time advanced");
        Ok(clock.time)
    }

    /// Set block time. Time never goes backwards.
    pub fn set_time(&self, time: u64) -> Result<()> {
        let mut clock = self.lock()?;
        if time < clock.time {
            return Err(LedgerError::Config(format!(
                "block time {time} is before current time {}",
                clock.time
            )));
        }
        clock.time = time;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Transactions
    // ─────────────────────────────────────────────────────────────────────────

    /// Run `body` as a transaction submitted by `sender`.
    ///
    /// All-or-nothing: either every write of the body is committed, or none
    /// is. The first hard failure is the transaction's outcome, whatever the
    /// body returned. A transaction id is consumed either way. The body runs under the
    /// writer lock and must not call back into the ledger.
    pub fn execute<'l, T>(
        &'l self,
        sender: Address,
        body: impl FnOnce(&mut Tx<'_, 'l, S, C>) -> Result<T>,
    ) -> Result<TxOutcome<T>> {
        let mut clock = self.lock()?;
        let tx_id = clock.last_tx_id + 1;
        clock.last_tx_id = tx_id;

        let mut ctx = TxContext::new(&self.store, &self.config.acl, tx_id, clock.time, sender);
        let result = body(&mut Tx::new(&mut ctx, &self.coprocessor));
        let result = match ctx.aborted().and_then(AclError::replay) {
            Some(err) => Err(err.into()),
            None => result,
        };

        match result {
            Ok(value) => {
                let effects = ctx.into_effects()?;
                let stats = self.store.commit(&effects.changes)?;
                info!(
                    tx_id,
                    %sender,
                    rows = stats.rows,
                    events = effects.events.len(),
                    hcu = effects.hcu_used,
                    "transaction committed"
                );
                Ok(TxOutcome {
                    tx_id,
                    value,
                    events: effects.events,
                    hcu_used: effects.hcu_used,
                })
            }
            Err(e) => {
                warn!(tx_id, %sender, reason = e.reason_code(), error = %e, "transaction reverted");
                Err(e)
            }
        }
    }

    /// Evaluate `query` against committed state as `principal`, without
    /// consuming a transaction id or committing anything.
    pub fn view<T>(
        &self,
        principal: Address,
        query: impl FnOnce(&TxContext<'_, S>) -> Result<T>,
    ) -> Result<T> {
        let clock = *self.lock()?;
        let ctx = TxContext::new(
            &self.store,
            &self.config.acl,
            clock.last_tx_id + 1,
            clock.time,
            principal,
        );
        query(&ctx)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Read Helpers
    // ─────────────────────────────────────────────────────────────────────────

    /// Whether `principal` holds a persisted grant on `handle`, or the
    /// handle is public.
    pub fn is_allowed(&self, handle: &HandleId, principal: &Address) -> Result<bool> {
        self.view(*principal, |ctx| Ok(ctx.is_allowed(handle, principal)?))
    }

    pub fn is_publicly_decryptable(&self, handle: &HandleId) -> Result<bool> {
        self.view(Address::ZERO, |ctx| Ok(ctx.is_publicly_decryptable(handle)?))
    }

    /// Expiry of a user-decryption delegation.
    pub fn delegation_expiration(
        &self,
        delegator: &Address,
        delegate: &Address,
        contract: &Address,
    ) -> Result<Option<u64>> {
        self.view(*delegator, |ctx| {
            Ok(ctx.user_decryption_delegation_expiration(delegator, delegate, contract)?)
        })
    }

    pub fn is_operator(&self, holder: &Address, operator: &Address) -> Result<bool> {
        self.view(*holder, |ctx| Ok(ctx.is_operator(holder, operator)?))
    }

    pub fn disclosure_state(&self, handle: &HandleId) -> Result<Option<DisclosureState>> {
        self.view(Address::ZERO, |ctx| Ok(ctx.disclosure_state(handle)?))
    }

    /// Finalized plaintext of a disclosed handle.
    pub fn disclosed(&self, handle: &HandleId) -> Result<Option<ClearValue>> {
        self.view(Address::ZERO, |ctx| Ok(ctx.disclosed(handle)?))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Clock>> {
        self.clock.lock().map_err(|_| LedgerError::LockPoisoned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coprocessor::MockCoprocessor;
    use cloak_core::{EncryptedType, Keypair};
    use cloak_store::{HandleOrigin, MemoryStore};

    fn ledger() -> Ledger<MemoryStore, MockCoprocessor> {
        let input = Keypair::from_seed(&[1; 32]);
        let kms = Keypair::from_seed(&[11; 32]);
        let mut config = LedgerConfig::default();
        config.acl.input_signers = vec![input.public_key()];
        config.acl.kms_signers = vec![kms.public_key()];
        let coprocessor = MockCoprocessor::new(config.acl.chain_id, vec![input]);
        Ledger::new(MemoryStore::new(), coprocessor, config).unwrap()
    }

    #[test]
    fn test_rejects_invalid_config() {
        let result = Ledger::new(
            MemoryStore::new(),
            MockCoprocessor::new(9000, vec![]),
            LedgerConfig::default(),
        );
        assert!(matches!(result, Err(LedgerError::Acl(_))));
    }

    #[test]
    fn test_commit_and_tx_ids() {
        let ledger = ledger();
        let token = Address::contract("token");

        let first = ledger
            .execute(token, |tx| {
                let h = tx.create(token, EncryptedType::Uint8, HandleOrigin::Trivial)?;
                tx.allow_this(&h)?;
                Ok(h)
            })
            .unwrap();
        assert_eq!(first.tx_id, 1);
        assert_eq!(first.events.len(), 2);
        assert!(ledger.is_allowed(&first.value, &token).unwrap());

        let second = ledger.execute(token, |_| Ok(())).unwrap();
        assert_eq!(second.tx_id, 2);
    }

    #[test]
    fn test_error_discards_writes() {
        let ledger = ledger();
        let token = Address::contract("token");

        let mut created = None;
        let err = ledger
            .execute(token, |tx| {
                let h = tx.create(token, EncryptedType::Uint8, HandleOrigin::Trivial)?;
                tx.allow_this(&h)?;
                created = Some(h);
                Err::<(), _>(LedgerError::Coprocessor("boom".into()))
            })
            .unwrap_err();
        assert_eq!(err.reason_code(), "Coprocessor");

        let h = created.unwrap();
        assert!(!ledger.is_allowed(&h, &token).unwrap());
        assert_eq!(ledger.store().handle_count().unwrap(), 0);
        // the id is still consumed
        assert_eq!(ledger.execute(token, |_| Ok(())).unwrap().tx_id, 2);
    }

    #[test]
    fn test_caught_denial_still_reverts() {
        let ledger = ledger();
        let token = Address::contract("token");
        let mallory = Address::contract("mallory");
        let secret = ledger
            .execute(token, |tx| {
                let h = tx.create(token, EncryptedType::Uint64, HandleOrigin::Trivial)?;
                tx.allow_this(&h)?;
                Ok(h)
            })
            .unwrap()
            .value;

        let err = ledger
            .execute(mallory, |tx| {
                let own = tx.create(mallory, EncryptedType::Uint8, HandleOrigin::Trivial)?;
                if tx.allow(&secret, mallory).is_err() {
                    // carry on as if nothing happened
                    let _ = tx.allow_this(&own);
                }
                Ok(own)
            })
            .unwrap_err();
        assert_eq!(err.reason_code(), "ACLDenied");
        assert!(!ledger.is_allowed(&secret, &mallory).unwrap());
        assert_eq!(ledger.store().handle_count().unwrap(), 1);
        assert_eq!(ledger.execute(token, |_| Ok(())).unwrap().tx_id, 3);
    }

    #[test]
    fn test_time_is_monotonic() {
        let ledger = ledger();
        let start = ledger.now().unwrap();
        assert_eq!(ledger.advance_time(10).unwrap(), start + 10);
        assert!(ledger.set_time(start).is_err());
        ledger.set_time(start + 100).unwrap();
        assert_eq!(ledger.now().unwrap(), start + 100);
    }

    #[test]
    fn test_view_does_not_consume_ids() {
        let ledger = ledger();
        let token = Address::contract("token");
        ledger.view(token, |ctx| Ok(ctx.tx_id())).unwrap();
        assert_eq!(ledger.execute(token, |_| Ok(())).unwrap().tx_id, 1);
    }
}
