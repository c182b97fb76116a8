//! Signed attestations exchanged with the co-processor and the KMS.
//!
//! - [`InputProof`]: co-processor signers certify that a set of ciphertexts
//!   was produced for a given `(contract, user, chain_id)`.
//! - [`DecryptionProof`]: KMS signers attest the cleartexts of publicly
//!   decryptable handles.
//!
//! Both are carried as CBOR and verified by counting distinct configured
//! signers with a valid signature over the typed digest.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::canonical::{self, Domain, TypedMessage};
use crate::crypto::{Blake3Hash, Ed25519PublicKey, Ed25519Signature, Keypair};
use crate::error::CoreError;
use crate::types::{Address, HandleId};
use crate::value::ClearValue;

/// Typed message name signed by co-processor input verifiers.
pub const INPUT_VERIFICATION: &str = "InputVerification";

/// Typed message name signed by KMS signers for public decryptions.
pub const PUBLIC_DECRYPTION_VERIFICATION: &str = "PublicDecryptionVerification";

/// A signature together with the key that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerSignature {
    pub signer: Ed25519PublicKey,
    pub signature: Ed25519Signature,
}

/// Count distinct `allowed` signers whose signature over `digest` verifies.
pub fn count_valid_signers(
    digest: &Blake3Hash,
    signatures: &[SignerSignature],
    allowed: &[Ed25519PublicKey],
) -> usize {
    let mut seen = BTreeSet::new();
    for s in signatures {
        if !allowed.contains(&s.signer) || seen.contains(&s.signer.0) {
            continue;
        }
        if s.signer.verify(digest.as_bytes(), &s.signature).is_ok() {
            seen.insert(s.signer.0);
        }
    }
    seen.len()
}

/// One certified ciphertext inside an input proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputProofEntry {
    pub handle: HandleId,
    pub ciphertext_digest: Blake3Hash,
}

/// Co-processor attestation binding ciphertexts to a contract and user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputProof {
    pub contract: Address,
    pub user: Address,
    pub chain_id: u64,
    pub entries: Vec<InputProofEntry>,
    pub signatures: Vec<SignerSignature>,
}

impl InputProof {
    /// Build and sign a proof with each of `signers`.
    pub fn sign(
        contract: Address,
        user: Address,
        chain_id: u64,
        entries: Vec<InputProofEntry>,
        signers: &[&Keypair],
    ) -> Result<Self, CoreError> {
        let mut proof = Self {
            contract,
            user,
            chain_id,
            entries,
            signatures: Vec::with_capacity(signers.len()),
        };
        let digest = proof.digest()?;
        for kp in signers {
            proof.signatures.push(SignerSignature {
                signer: kp.public_key(),
                signature: kp.sign(digest.as_bytes()),
            });
        }
        Ok(proof)
    }

    /// Typed digest the signers commit to.
    pub fn digest(&self) -> Result<Blake3Hash, CoreError> {
        let domain = Domain::new(INPUT_VERIFICATION, "1", self.chain_id, self.contract);
        let handles = self.entries.iter().map(|e| canonical::handle(&e.handle)).collect();
        let digests = self
            .entries
            .iter()
            .map(|e| canonical::bytes(e.ciphertext_digest.as_bytes()))
            .collect();

        TypedMessage::new(INPUT_VERIFICATION)
            .field("contract", canonical::address(&self.contract))
            .field("user", canonical::address(&self.user))
            .field("chain_id", canonical::uint(self.chain_id))
            .field("handles", ciborium::value::Value::Array(handles))
            .field("digests", ciborium::value::Value::Array(digests))
            .digest(&domain)
    }

    /// Entry certified at the given index.
    pub fn entry(&self, index: u8) -> Option<&InputProofEntry> {
        self.entries.get(index as usize)
    }

    /// Number of distinct `allowed` signers with a valid signature.
    pub fn valid_signers(&self, allowed: &[Ed25519PublicKey]) -> Result<usize, CoreError> {
        let digest = self.digest()?;
        Ok(count_valid_signers(&digest, &self.signatures, allowed))
    }

    /// Serialize to CBOR.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CoreError> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).map_err(|e| CoreError::EncodingError(e.to_string()))?;
        Ok(buf)
    }

    /// Parse from CBOR.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CoreError> {
        ciborium::from_reader(bytes).map_err(|e| CoreError::DecodingError(e.to_string()))
    }
}

/// KMS attestation of public decryption results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptionProof {
    pub chain_id: u64,
    pub handles: Vec<HandleId>,
    pub values: Vec<ClearValue>,
    pub signatures: Vec<SignerSignature>,
}

impl DecryptionProof {
    /// Build and sign an attestation over `(handles, values)`.
    pub fn sign(
        chain_id: u64,
        verifying_contract: Address,
        handles: Vec<HandleId>,
        values: Vec<ClearValue>,
        signers: &[&Keypair],
    ) -> Result<Self, CoreError> {
        let mut proof = Self {
            chain_id,
            handles,
            values,
            signatures: Vec::with_capacity(signers.len()),
        };
        let digest = proof.digest(verifying_contract)?;
        for kp in signers {
            proof.signatures.push(SignerSignature {
                signer: kp.public_key(),
                signature: kp.sign(digest.as_bytes()),
            });
        }
        Ok(proof)
    }

    /// Typed digest the KMS signers commit to.
    pub fn digest(&self, verifying_contract: Address) -> Result<Blake3Hash, CoreError> {
        if self.handles.len() != self.values.len() {
            return Err(CoreError::EncodingError(
                "handle and value counts differ".into(),
            ));
        }
        let domain = Domain::new(
            PUBLIC_DECRYPTION_VERIFICATION,
            "1",
            self.chain_id,
            verifying_contract,
        );
        let handles = self.handles.iter().map(canonical::handle).collect();
        let values = self
            .values
            .iter()
            .map(|v| canonical::bytes(&v.to_be_bytes32()))
            .collect();

        TypedMessage::new(PUBLIC_DECRYPTION_VERIFICATION)
            .field("chain_id", canonical::uint(self.chain_id))
            .field("handles", ciborium::value::Value::Array(handles))
            .field("values", ciborium::value::Value::Array(values))
            .digest(&domain)
    }

    /// The attested value for a handle, if present.
    pub fn value_of(&self, handle: &HandleId) -> Option<&ClearValue> {
        self.handles
            .iter()
            .position(|h| h == handle)
            .and_then(|i| self.values.get(i))
    }

    /// Number of distinct `allowed` signers with a valid signature.
    pub fn valid_signers(
        &self,
        verifying_contract: Address,
        allowed: &[Ed25519PublicKey],
    ) -> Result<usize, CoreError> {
        let digest = self.digest(verifying_contract)?;
        Ok(count_valid_signers(&digest, &self.signatures, allowed))
    }

    /// Serialize to CBOR.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CoreError> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).map_err(|e| CoreError::EncodingError(e.to_string()))?;
        Ok(buf)
    }

    /// Parse from CBOR.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CoreError> {
        ciborium::from_reader(bytes).map_err(|e| CoreError::DecodingError(e.to_string()))
    }
}
