//! Disclosure coordinator: on-ledger public reveal of a handle's value.
//!
//! Per handle: `None -> Requested -> Finalized`, each step at most once.
//! A request marks the handle publicly decryptable so the decryption
//! service will attest its value; the configured decryption authority then
//! finalizes with the cleartext and the KMS attestation. Lifecycle
//! violations and bad attestations abort the transaction.

use tracing::{debug, info};

use cloak_core::{ClearValue, DecryptionProof, HandleId};
use cloak_store::{DisclosureRecord, DisclosureState, StateView};

use crate::context::TxContext;
use crate::error::{AclError, Result};
use crate::events::LedgerEvent;

impl<S: StateView + ?Sized> TxContext<'_, S> {
    /// Ask for `handle` to be revealed. Returns the request id; asking again
    /// while pending returns the same id.
    pub fn request_disclose(&mut self, handle: &HandleId) -> Result<u64> {
        self.ensure_live()?;
        self.metadata(handle)?;
        self.require_allowed(handle)?;

        match self.view().get_disclosure(handle)? {
            Some(record) if record.is_finalized() => {
                return Err(self.abort(AclError::DisclosureAlreadyFinalized(*handle)))
            }
            Some(record) => return Ok(record.request_id),
            None => {}
        }

        self.make_publicly_decryptable(handle)?;

        let request_id = (self.tx_id() << 32) | self.next_nonce();
        let requester = self.caller();
        self.changes.disclosures.insert(
            *handle,
            DisclosureRecord::requested(*handle, requester, request_id, self.block_time()),
        );

        info!(%handle, %requester, request_id, "disclosure requested");
        self.emit(LedgerEvent::DisclosureRequested {
            handle: *handle,
            requester,
            request_id,
        });
        Ok(request_id)
    }

    /// Record the attested cleartext of a requested disclosure.
    pub fn finalize_disclose(
        &mut self,
        handle: &HandleId,
        plaintext: ClearValue,
        proof: &DecryptionProof,
    ) -> Result<()> {
        self.ensure_live()?;
        if self.caller() != self.config().decryption_authority {
            return Err(AclError::Unauthorized(format!(
                "{} is not the decryption authority",
                self.caller()
            )));
        }

        let mut record = match self.view().get_disclosure(handle)? {
            None => return Err(self.abort(AclError::DisclosureNotRequested(*handle))),
            Some(r) if r.is_finalized() => {
                return Err(self.abort(AclError::DisclosureAlreadyFinalized(*handle)))
            }
            Some(r) => r,
        };

        let ty = self.metadata(handle)?.ty;
        if plaintext.ty() != ty {
            return Err(self.abort(AclError::ProofInvalid(format!(
                "plaintext is {}, handle is {ty}",
                plaintext.ty()
            ))));
        }
        self.verify_decryption_proof(handle, &plaintext, proof)
            .map_err(|e| self.abort(e))?;

        record.state = DisclosureState::Finalized;
        record.plaintext = Some(plaintext.clone());
        record.finalized_at = Some(self.block_time());
        let request_id = record.request_id;
        self.changes.disclosures.insert(*handle, record);

        info!(%handle, request_id, "disclosure finalized");
        self.emit(LedgerEvent::DisclosureFinalized {
            handle: *handle,
            request_id,
            plaintext,
        });
        Ok(())
    }

    fn verify_decryption_proof(
        &self,
        handle: &HandleId,
        plaintext: &ClearValue,
        proof: &DecryptionProof,
    ) -> Result<()> {
        if proof.chain_id != self.chain_id() {
            return Err(AclError::ProofInvalid(format!(
                "attestation for chain {}",
                proof.chain_id
            )));
        }
        if proof.value_of(handle) != Some(plaintext) {
            return Err(AclError::ProofInvalid(format!(
                "attestation does not bind {handle} to the given value"
            )));
        }
        let config = self.config();
        let valid = proof.valid_signers(config.decryption_contract, &config.kms_signers)?;
        if valid < config.kms_threshold {
            debug!(valid, threshold = config.kms_threshold, "kms attestation under-signed");
            return Err(AclError::ProofInvalid(format!(
                "{valid} valid KMS signatures, {} required",
                config.kms_threshold
            )));
        }
        Ok(())
    }

    /// Finalized plaintext of a handle, if any.
    pub fn disclosed(&self, handle: &HandleId) -> Result<Option<ClearValue>> {
        Ok(self
            .view()
            .get_disclosure(handle)?
            .and_then(|r| r.plaintext))
    }

    /// Current disclosure state; `None` when never requested.
    pub fn disclosure_state(&self, handle: &HandleId) -> Result<Option<DisclosureState>> {
        Ok(self.view().get_disclosure(handle)?.map(|r| r.state))
    }
}
