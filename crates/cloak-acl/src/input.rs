//! Input validator: admission of proven external ciphertexts.
//!
//! A client encrypts values off-ledger and submits them with an
//! [`InputProof`] signed by the co-processor. Validation, in order:
//! 1. the proof decodes (`ProofInvalid`)
//! 2. enough distinct configured signers signed it (`ProofInvalid`)
//! 3. it was issued for this chain (`ProofInvalid`)
//! 4. it binds the expected `(contract, user)` (`ProofBindingMismatch`)
//! 5. each ciphertext is certified at its handle's index (`ProofInvalid`)
//!
//! Steps 1-3 run once per proof per transaction; the result is cached in the
//! context. Any of these failures aborts the transaction.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use cloak_core::{Address, Blake3Hash, HandleId, InputProof};
use cloak_store::{HandleOrigin, StateView};

use crate::context::TxContext;
use crate::error::{AclError, Result};

/// A ciphertext submitted from off-ledger together with its claimed handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalCiphertext {
    pub handle: HandleId,
    pub ciphertext: Bytes,
}

impl ExternalCiphertext {
    pub fn new(handle: HandleId, ciphertext: impl Into<Bytes>) -> Self {
        Self {
            handle,
            ciphertext: ciphertext.into(),
        }
    }

    /// Digest certified by input proofs.
    pub fn digest(&self) -> Blake3Hash {
        Blake3Hash::hash(&self.ciphertext)
    }
}

impl<S: StateView + ?Sized> TxContext<'_, S> {
    /// Admit one ciphertext for `target_contract` on behalf of `user`.
    pub fn admit(
        &mut self,
        ciphertext: &ExternalCiphertext,
        proof: &[u8],
        target_contract: Address,
        user: Address,
    ) -> Result<HandleId> {
        self.ensure_live()?;
        let proof = self
            .verify_input_proof(proof, target_contract, user)
            .map_err(|e| self.abort(e))?;
        self.admit_verified(ciphertext, &proof, target_contract)
            .map_err(|e| self.abort(e))
    }

    /// Admit several ciphertexts certified by one proof.
    pub fn admit_batch(
        &mut self,
        ciphertexts: &[ExternalCiphertext],
        proof: &[u8],
        target_contract: Address,
        user: Address,
    ) -> Result<Vec<HandleId>> {
        self.ensure_live()?;
        let proof = self
            .verify_input_proof(proof, target_contract, user)
            .map_err(|e| self.abort(e))?;
        ciphertexts
            .iter()
            .map(|ct| self.admit_verified(ct, &proof, target_contract))
            .collect::<Result<Vec<_>>>()
            .map_err(|e| self.abort(e))
    }

    /// Admit a ciphertext for the executing contract.
    pub fn from_external(
        &mut self,
        ciphertext: &ExternalCiphertext,
        proof: &[u8],
        user: Address,
    ) -> Result<HandleId> {
        let target = self.caller();
        self.admit(ciphertext, proof, target, user)
    }

    fn verify_input_proof(
        &mut self,
        bytes: &[u8],
        target_contract: Address,
        user: Address,
    ) -> Result<InputProof> {
        let proof = InputProof::from_bytes(bytes)
            .map_err(|e| AclError::ProofInvalid(format!("malformed proof: {e}")))?;

        let key = Blake3Hash::hash(bytes);
        if !self.verified_proofs.contains(&key) {
            let valid = proof.valid_signers(&self.config().input_signers)?;
            if valid < self.config().input_threshold {
                warn!(valid, threshold = self.config().input_threshold, "input proof under-signed");
                return Err(AclError::ProofInvalid(format!(
                    "{valid} valid signatures, {} required",
                    self.config().input_threshold
                )));
            }
            if proof.chain_id != self.chain_id() {
                return Err(AclError::ProofInvalid(format!(
                    "proof for chain {}, ledger is {}",
                    proof.chain_id,
                    self.chain_id()
                )));
            }
            self.verified_proofs.insert(key);
        }

        if proof.contract != target_contract || proof.user != user {
            return Err(AclError::ProofBindingMismatch {
                proof_contract: proof.contract,
                proof_user: proof.user,
                contract: target_contract,
                user,
            });
        }
        Ok(proof)
    }

    fn admit_verified(
        &mut self,
        ciphertext: &ExternalCiphertext,
        proof: &InputProof,
        target_contract: Address,
    ) -> Result<HandleId> {
        let handle = ciphertext.handle;
        if handle.is_computed() {
            return Err(AclError::ProofInvalid(format!("{handle} is not an input handle")));
        }
        if handle.chain_id() != self.chain_id() {
            return Err(AclError::ProofInvalid(format!(
                "{handle} belongs to chain {}",
                handle.chain_id()
            )));
        }
        let entry = proof
            .entry(handle.index())
            .filter(|e| e.handle == handle)
            .ok_or_else(|| AclError::ProofInvalid(format!("{handle} not certified by proof")))?;
        if entry.ciphertext_digest != ciphertext.digest() {
            return Err(AclError::ProofInvalid(format!(
                "ciphertext digest mismatch for {handle}"
            )));
        }

        let record = self.register(handle, target_contract, HandleOrigin::Input)?;
        debug!(%handle, contract = %target_contract, "input admitted");
        Ok(record.handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Harness;
    use cloak_core::{EncryptedType, Keypair};

    #[test]
    fn test_admit_registers_owner_without_grants() {
        let h = Harness::new();
        let token = Address::contract("token");
        let alice = Address::contract("alice");
        let (cts, proof) = h.input(token, alice, &[EncryptedType::Uint64]);

        let mut tx = h.tx(token);
        let handle = tx.admit(&cts[0], &proof, token, alice).unwrap();
        assert_eq!(handle, cts[0].handle);
        assert_eq!(tx.metadata(&handle).unwrap().owner, token);
        assert!(!tx.is_allowed(&handle, &token).unwrap());
        assert!(!tx.is_allowed(&handle, &alice).unwrap());

        // owner may grant
        tx.allow_this(&handle).unwrap();
        assert!(tx.is_sender_allowed(&handle).unwrap());
    }

    #[test]
    fn test_readmission_returns_existing_handle() {
        let h = Harness::new();
        let token = Address::contract("token");
        let alice = Address::contract("alice");
        let (cts, proof) = h.input(token, alice, &[EncryptedType::Uint8]);

        let mut tx = h.tx(token);
        let first = tx.from_external(&cts[0], &proof, alice).unwrap();
        h.commit(tx);

        let mut tx = h.tx(token);
        let second = tx.from_external(&cts[0], &proof, alice).unwrap();
        assert_eq!(first, second);
        assert!(tx.events().is_empty());
    }

    #[test]
    fn test_binding_mismatch() {
        let h = Harness::new();
        let token = Address::contract("token");
        let alice = Address::contract("alice");
        let (cts, proof) = h.input(token, alice, &[EncryptedType::Uint64]);

        let mut tx = h.tx(token);
        let err = tx
            .admit(&cts[0], &proof, token, Address::contract("bob"))
            .unwrap_err();
        assert_eq!(err.reason_code(), "ProofBindingMismatch");
        assert!(tx.aborted().is_some());

        let mut tx = h.tx(token);
        let err = tx
            .admit(&cts[0], &proof, Address::contract("other"), alice)
            .unwrap_err();
        assert_eq!(err.reason_code(), "ProofBindingMismatch");
    }

    #[test]
    fn test_under_signed_proof() {
        let h = Harness::with_thresholds(2, 1);
        let token = Address::contract("token");
        let alice = Address::contract("alice");
        let (cts, proof) = h.input_signed_by(token, alice, &[EncryptedType::Uint64], 1);

        let mut tx = h.tx(token);
        let err = tx.admit(&cts[0], &proof, token, alice).unwrap_err();
        assert_eq!(err.reason_code(), "ProofInvalid");
    }

    #[test]
    fn test_outsider_signatures_do_not_count() {
        let h = Harness::new();
        let token = Address::contract("token");
        let alice = Address::contract("alice");
        let outsider = Keypair::from_seed(&[0xee; 32]);
        let (cts, proof) = h.input_with_signers(token, alice, &[EncryptedType::Uint64], &[&outsider]);

        let mut tx = h.tx(token);
        assert_eq!(
            tx.admit(&cts[0], &proof, token, alice).unwrap_err().reason_code(),
            "ProofInvalid"
        );
    }

    #[test]
    fn test_malformed_proof_and_tampered_ciphertext() {
        let h = Harness::new();
        let token = Address::contract("token");
        let alice = Address::contract("alice");
        let (cts, proof) = h.input(token, alice, &[EncryptedType::Uint64]);

        let mut tx = h.tx(token);
        assert_eq!(
            tx.admit(&cts[0], b"not cbor", token, alice).unwrap_err().reason_code(),
            "ProofInvalid"
        );

        let mut tx = h.tx(token);
        let tampered = ExternalCiphertext::new(cts[0].handle, b"other bytes".to_vec());
        assert_eq!(
            tx.admit(&tampered, &proof, token, alice).unwrap_err().reason_code(),
            "ProofInvalid"
        );
    }

    #[test]
    fn test_batch_admission_and_index_selection() {
        let h = Harness::new();
        let token = Address::contract("token");
        let alice = Address::contract("alice");
        let (cts, proof) = h.input(
            token,
            alice,
            &[EncryptedType::Bool, EncryptedType::Uint32, EncryptedType::Address],
        );

        let mut tx = h.tx(token);
        let handles = tx.admit_batch(&cts, &proof, token, alice).unwrap();
        assert_eq!(handles.len(), 3);
        for (i, handle) in handles.iter().enumerate() {
            assert_eq!(handle.index() as usize, i);
        }
        assert_eq!(tx.verified_proofs.len(), 1);

        // a handle moved to the wrong index is rejected
        let mut wrong = cts[1].clone();
        wrong.handle = cloak_core::HandleId::compose(
            &[0x55; 32],
            0,
            h.config.chain_id,
            EncryptedType::Uint32,
        );
        assert!(tx.admit(&wrong, &proof, token, alice).is_err());
    }

    #[test]
    fn test_rejected_proof_blocks_later_admission() {
        let h = Harness::new();
        let token = Address::contract("token");
        let alice = Address::contract("alice");
        let (cts, proof) = h.input(token, alice, &[EncryptedType::Uint64]);

        let mut tx = h.tx(token);
        assert!(tx.admit(&cts[0], b"not cbor", token, alice).is_err());
        // a valid proof in the same transaction is refused with the first error
        let err = tx.admit(&cts[0], &proof, token, alice).unwrap_err();
        assert_eq!(err.reason_code(), "ProofInvalid");
        assert!(!tx.handle_exists(&cts[0].handle).unwrap());
        assert!(tx.into_effects().is_err());
    }

    #[test]
    fn test_wrong_chain_proof() {
        let h = Harness::new();
        let token = Address::contract("token");
        let alice = Address::contract("alice");
        let (cts, proof) = h.input_on_chain(token, alice, &[EncryptedType::Uint64], 1);

        let mut tx = h.tx(token);
        assert_eq!(
            tx.admit(&cts[0], &proof, token, alice).unwrap_err().reason_code(),
            "ProofInvalid"
        );
    }
}
