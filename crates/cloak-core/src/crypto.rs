//! Signing keys, signatures and hashes.
//!
//! Ed25519 keys sign attestations (input proofs, KMS decryption proofs,
//! user-decryption requests). A principal's address is derived from its
//! verifying key, so a signature over a request also proves who is asking.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;
use crate::types::Address;

/// KDF context for deriving addresses from verifying keys.
const ADDRESS_CONTEXT: &str = "cloak address v1";

/// A 32-byte Blake3 digest.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Blake3Hash(pub [u8; 32]);

impl Blake3Hash {
    pub fn hash(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Domain-separated digest (Blake3 `derive_key` mode).
    pub fn derive(context: &str, data: &[u8]) -> Self {
        Self(blake3::derive_key(context, data))
    }

    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for Blake3Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Blake3({})", hex::encode(&self.0[..8]))
    }
}

/// An Ed25519 verifying key of a principal or attestation signer.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ed25519PublicKey(pub [u8; 32]);

impl Ed25519PublicKey {
    /// The principal address controlled by this key.
    pub fn to_address(&self) -> Address {
        let hash = blake3::derive_key(ADDRESS_CONTEXT, &self.0);
        let mut arr = [0u8; 20];
        arr.copy_from_slice(&hash[12..]);
        Address(arr)
    }

    /// Check `signature` over `message`.
    pub fn verify(&self, message: &[u8], signature: &Ed25519Signature) -> Result<(), CoreError> {
        let key = VerifyingKey::from_bytes(&self.0).map_err(|_| CoreError::InvalidPublicKey)?;
        key.verify(message, &Signature::from_bytes(&signature.0))
            .map_err(|_| CoreError::InvalidSignature)
    }
}

impl fmt::Debug for Ed25519PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ed25519Pub({})", hex::encode(&self.0[..8]))
    }
}

/// A 64-byte Ed25519 signature. Serialized through `Vec<u8>`; decoding
/// rejects any other length.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "Vec<u8>", try_from = "Vec<u8>")]
pub struct Ed25519Signature(pub [u8; 64]);

impl fmt::Debug for Ed25519Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ed25519Sig({}...)", hex::encode(&self.0[..8]))
    }
}

impl From<Ed25519Signature> for Vec<u8> {
    fn from(sig: Ed25519Signature) -> Self {
        sig.0.to_vec()
    }
}

impl TryFrom<Vec<u8>> for Ed25519Signature {
    type Error = CoreError;

    fn try_from(bytes: Vec<u8>) -> Result<Self, Self::Error> {
        let arr: [u8; 64] = bytes.try_into().map_err(|_| CoreError::InvalidSignature)?;
        Ok(Self(arr))
    }
}

/// Signing key of a principal, co-processor signer or KMS signer.
#[derive(Clone)]
pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut rand::thread_rng()),
        }
    }

    /// Deterministic key from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    pub fn public_key(&self) -> Ed25519PublicKey {
        Ed25519PublicKey(self.signing_key.verifying_key().to_bytes())
    }

    /// Address of the principal holding this key.
    pub fn address(&self) -> Address {
        self.public_key().to_address()
    }

    pub fn sign(&self, message: &[u8]) -> Ed25519Signature {
        Ed25519Signature(self.signing_key.sign(message).to_bytes())
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Keypair({:?})", self.public_key())
    }
}
