//! Wiring between the ledger and the decryption service.
//!
//! The service only sees the ledger through [`AclView`]. Answers reflect
//! committed state at the time of the call, so they may lag transactions
//! that are still running.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use cloak_core::{Address, DecryptionProof, HandleId, Keypair};
use cloak_relayer::{AclView, DecryptionOracle, DecryptionService, RelayerError};
use cloak_store::Store;

use crate::coprocessor::Coprocessor;
use crate::error::{LedgerError, Result};
use crate::ledger::{Ledger, TxOutcome};

/// Read-only ACL view over a shared ledger.
pub struct LedgerAclView<S: Store, C: Coprocessor> {
    ledger: Arc<Ledger<S, C>>,
}

impl<S: Store, C: Coprocessor> LedgerAclView<S, C> {
    pub fn new(ledger: Arc<Ledger<S, C>>) -> Self {
        Self { ledger }
    }
}

impl<S: Store, C: Coprocessor> Clone for LedgerAclView<S, C> {
    fn clone(&self) -> Self {
        Self {
            ledger: Arc::clone(&self.ledger),
        }
    }
}

fn unavailable(e: LedgerError) -> RelayerError {
    RelayerError::Oracle(format!("ledger view: {e}"))
}

#[async_trait]
impl<S: Store, C: Coprocessor> AclView for LedgerAclView<S, C> {
    async fn is_allowed(&self, handle: &HandleId, principal: &Address) -> cloak_relayer::Result<bool> {
        self.ledger.is_allowed(handle, principal).map_err(unavailable)
    }

    async fn is_publicly_decryptable(&self, handle: &HandleId) -> cloak_relayer::Result<bool> {
        self.ledger
            .is_publicly_decryptable(handle)
            .map_err(unavailable)
    }

    async fn delegation_expiration(
        &self,
        delegator: &Address,
        delegate: &Address,
        contract: &Address,
    ) -> cloak_relayer::Result<u64> {
        Ok(self
            .ledger
            .delegation_expiration(delegator, delegate, contract)
            .map_err(unavailable)?
            .unwrap_or(0))
    }

    async fn now(&self) -> cloak_relayer::Result<u64> {
        self.ledger.now().map_err(unavailable)
    }
}

/// A decryption service reading `ledger`'s permissions, decrypting through
/// `oracle` and attesting public decryptions with `kms`.
pub fn decryption_service<S: Store, C: Coprocessor, O: DecryptionOracle>(
    ledger: &Arc<Ledger<S, C>>,
    oracle: O,
    kms: Vec<Keypair>,
) -> DecryptionService<LedgerAclView<S, C>, O> {
    DecryptionService::new(
        ledger.relayer_config(),
        LedgerAclView::new(Arc::clone(ledger)),
        oracle,
        kms,
    )
}

/// Finalize every disclosure attested by `proof`, as the decryption
/// authority, in one transaction.
pub fn finalize_disclosures<S: Store, C: Coprocessor>(
    ledger: &Ledger<S, C>,
    proof: &DecryptionProof,
) -> Result<TxOutcome<()>> {
    let authority = ledger.config().acl.decryption_authority;
    let outcome = ledger.execute(authority, |tx| {
        for (handle, value) in proof.handles.iter().zip(&proof.values) {
            tx.finalize_disclose(handle, value.clone(), proof)?;
        }
        Ok(())
    })?;
    info!(handles = proof.handles.len(), tx_id = outcome.tx_id, "disclosures finalized");
    Ok(outcome)
}
