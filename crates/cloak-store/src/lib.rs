//! # Cloak Store
//!
//! Storage abstraction for the permission layer. Provides a trait-based
//! interface for ledger state with SQLite and in-memory implementations.
//!
//! ## Overview
//!
//! Ledger state (handle registry, permanent grants, public-decrypt flags,
//! operator grants, user-decryption delegations, disclosure requests,
//! contract slots and deployed contracts) sits behind the [`Store`] trait. A running transaction
//! accumulates writes in a [`ChangeSet`] and reads through a [`StagedView`];
//! the change set is committed atomically or dropped.
//!
//! ## Key Types
//!
//! - [`StateView`] - Read access shared by stores and staged views
//! - [`Store`] - Persistent store with atomic commit
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//!
//! ## Usage
//!
//! ```rust,no_run
//! use cloak_store::{ChangeSet, SqliteStore, StateView, Store};
//! use cloak_core::{Address, EncryptedType, HandleId};
//!
//! let store = SqliteStore::open("cloak.db").unwrap();
//! let handle = HandleId::compose(&[1; 32], 0, 9000, EncryptedType::Uint64);
//!
//! let mut changes = ChangeSet::new(1);
//! changes.public.insert(handle);
//! store.commit(&changes).unwrap();
//!
//! assert!(store.is_public(&handle).unwrap());
//! ```

pub mod changes;
pub mod error;
pub mod memory;
pub mod migration;
pub mod records;
pub mod sqlite;
pub mod staged;
pub mod traits;

pub use changes::{ChangeSet, CommitStats};
pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use records::{ContractRecord, DisclosureRecord, DisclosureState, HandleOrigin, HandleRecord};
pub use sqlite::SqliteStore;
pub use staged::StagedView;
pub use traits::{StateView, Store};
