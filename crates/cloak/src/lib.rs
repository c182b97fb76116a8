//! # Cloak
//!
//! Access control for encrypted-value handles.
//!
//! ## Overview
//!
//! Values are never stored in the clear. Contracts work with opaque 32-byte
//! handles that refer to ciphertexts held by a co-processor. This crate ties
//! the pieces together:
//!
//! - **Ledger**: serialized, all-or-nothing transactions over the permission
//!   state, with a per-transaction context for transient grants and budgets
//! - **Computation**: homomorphic operators over handles, gated by the ACL
//!   and metered in HCU
//! - **Confidential token**: encrypted balances moved through an ordered
//!   transfer-check pipeline
//! - **Decryption wiring**: the ledger as the ACL view of the off-ledger
//!   decryption service, and finalization of attested disclosures
//!
//! ## Key Concepts
//!
//! - **Handle**: identifier of a ciphertext. Embeds chain id and value type.
//! - **Grant**: permission for a principal to use a handle. Permanent grants
//!   and the public flag only ever grow; transient grants end with the
//!   transaction.
//! - **Disclosure**: request, then attested finalize, of a handle's value.
//!
//! ## Usage
//!
//! ```rust
//! use cloak::{Ledger, LedgerConfig, MockCoprocessor};
//! use cloak::core::{Address, ClearValue, EncryptedType, Keypair};
//! use cloak::store::MemoryStore;
//!
//! let signer = Keypair::from_seed(&[1; 32]);
//! let mut config = LedgerConfig::default();
//! config.acl.input_signers = vec![signer.public_key()];
//! config.acl.kms_signers = vec![Keypair::from_seed(&[2; 32]).public_key()];
//!
//! let coprocessor = MockCoprocessor::new(config.acl.chain_id, vec![signer]);
//! let ledger = Ledger::new(MemoryStore::new(), coprocessor, config).unwrap();
//!
//! let app = Address::contract("app");
//! let sum = ledger
//!     .execute(app, |tx| {
//!         let a = tx.trivial_encrypt(ClearValue::from_u128(EncryptedType::Uint32, 2)?)?;
//!         let b = tx.trivial_encrypt(ClearValue::from_u128(EncryptedType::Uint32, 3)?)?;
//!         let sum = tx.add(a, b)?;
//!         tx.allow_this(&sum)?;
//!         Ok(sum)
//!     })
//!     .unwrap()
//!     .value;
//!
//! assert!(ledger.is_allowed(&sum, &app).unwrap());
//! ```
//!
//! ## Re-exports
//!
//! - `cloak::core` - handles, types, values, proofs
//! - `cloak::store` - storage abstraction, SQLite and in-memory stores
//! - `cloak::acl` - registry, ACL, operators, disclosures, budgets
//! - `cloak::relayer` - decryption protocol, client and service

pub mod config;
pub mod coprocessor;
pub mod error;
pub mod fhe;
pub mod ledger;
pub mod token;
pub mod tx;
pub mod wiring;

// Re-export component crates
pub use cloak_acl as acl;
pub use cloak_core as core;
pub use cloak_relayer as relayer;
pub use cloak_store as store;

pub use config::LedgerConfig;
pub use coprocessor::{Coprocessor, EncryptedInput, MockCoprocessor};
pub use error::{LedgerError, Result};
pub use ledger::{Ledger, TxOutcome};
pub use token::{ConfidentialToken, BALANCE_TYPE};
pub use tx::Tx;
pub use wiring::{decryption_service, finalize_disclosures, LedgerAclView};

// Commonly used types
pub use cloak_acl::{AclError, Contract, GrantScope, LedgerEvent, TransferPipeline};
pub use cloak_core::{Address, ClearValue, EncryptedType, HandleId};
