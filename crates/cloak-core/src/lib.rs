//! # Cloak Core
//!
//! Pure primitives for Cloak: handles, principals, typed cleartexts, and the
//! signed attestations that move between the ledger, the co-processor and the
//! key-management signers.
//!
//! This crate contains no I/O, no storage, no networking.
//!
//! ## Key Types
//!
//! - [`HandleId`] - Opaque 32-byte reference to a ciphertext
//! - [`Address`] - A user or contract principal
//! - [`EncryptedType`] - Logical type of the value behind a handle
//! - [`InputProof`] / [`DecryptionProof`] - Threshold-signed attestations
//!
//! ## Canonicalization
//!
//! Signed messages are hashed from deterministic CBOR. See [`canonical`].

pub mod canonical;
pub mod crypto;
pub mod error;
pub mod op;
pub mod proof;
pub mod types;
pub mod value;

pub use canonical::{Domain, TypedMessage};
pub use crypto::{Blake3Hash, Ed25519PublicKey, Ed25519Signature, Keypair};
pub use error::CoreError;
pub use op::FheOp;
pub use proof::{DecryptionProof, InputProof, InputProofEntry, SignerSignature};
pub use types::{Address, EncryptedType, HandleId, COMPUTED_INDEX};
pub use value::ClearValue;
