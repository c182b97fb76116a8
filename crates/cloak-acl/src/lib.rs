//! # Cloak ACL
//!
//! Access rules for encrypted-value handles.
//!
//! ## Overview
//!
//! Every ledger transaction runs inside a [`TxContext`]. The context stages
//! writes against a [`StateView`](cloak_store::StateView) and carries the
//! state that dies with the transaction: transient grants, the verified
//! input-proof cache and the HCU meter. The rules themselves are grouped by
//! component, each one an `impl` block on the context:
//!
//! - **Registry** (`registry`): create handles, read their metadata
//! - **Contracts** (`contract`): deploy contracts and execute as them
//! - **Input validator** (`input`): admit proven external ciphertexts
//! - **ACL** (`acl`): permanent, transient and public-decrypt permissions
//! - **Operators** (`operator`): operator grants and user-decryption delegations
//! - **Disclosure** (`disclosure`): request and finalize public reveals
//! - **Budget** (`budget`): HCU metering
//!
//! Nothing here commits. The ledger takes [`TxEffects`] from
//! [`TxContext::into_effects`] and applies the change set atomically, or
//! drops the context to roll back. Proof, ACL, budget and disclosure
//! failures abort the context for good: `into_effects` then fails too.
//!
//! ## Usage
//!
//! ```rust
//! use cloak_acl::{AclConfig, TxContext};
//! use cloak_core::{Address, EncryptedType};
//! use cloak_store::{HandleOrigin, MemoryStore, Store};
//!
//! let store = MemoryStore::new();
//! let config = AclConfig::default();
//! let token = Address::contract("token");
//! let alice = Address::contract("alice");
//!
//! let mut tx = TxContext::new(&store, &config, 1, 1_000, token);
//! let balance = tx.create(token, EncryptedType::Uint64, HandleOrigin::Trivial).unwrap();
//! tx.allow(&balance, alice).unwrap();
//! store.commit(&tx.into_effects().unwrap().changes).unwrap();
//!
//! let tx = TxContext::new(&store, &config, 2, 1_001, alice);
//! assert!(tx.is_sender_allowed(&balance).unwrap());
//! ```

pub mod acl;
pub mod budget;
pub mod config;
pub mod context;
pub mod contract;
pub mod disclosure;
pub mod error;
pub mod events;
pub mod input;
pub mod operator;
pub mod pipeline;
pub mod registry;

#[cfg(test)]
mod testing;

pub use acl::GrantScope;
pub use budget::{op_cost, BudgetKind, BudgetMeter, HcuLimits};
pub use config::AclConfig;
pub use context::{TxContext, TxEffects};
pub use contract::Contract;
pub use error::{AclError, Result};
pub use events::LedgerEvent;
pub use input::ExternalCiphertext;
pub use pipeline::{
    FreezeCheck, ObserverCheck, RestrictionCheck, TransferCheck, TransferPipeline, TransferReport,
    TransferRequest, Verdict,
};
