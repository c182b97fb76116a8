//! # Cloak Testkit
//!
//! Testing utilities for Cloak ledgers.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: a ledger wired to a mock co-processor, with input and KMS
//!   signers already registered in its configuration
//! - **Generators**: proptest strategies for types, values, addresses and keys
//!
//! ## Test Fixtures
//!
//! ```rust
//! use cloak_testkit::fixtures::{euint64, LedgerFixture};
//! use cloak::Address;
//!
//! let fixture = LedgerFixture::new();
//! let app = Address::contract("app");
//! let input = fixture.encrypt(app, Address::contract("alice"), &[euint64(7)]);
//!
//! let handle = fixture
//!     .ledger
//!     .execute(app, |tx| {
//!         let h = tx.from_external(&input.ciphertexts[0], &input.proof, Address::contract("alice"))?;
//!         tx.allow_this(&h)?;
//!         Ok(h)
//!     })
//!     .unwrap()
//!     .value;
//! assert_eq!(fixture.value(&handle), euint64(7));
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use cloak_testkit::generators::typed_value;
//!
//! proptest! {
//!     #[test]
//!     fn value_fits_its_type(value in typed_value()) {
//!         prop_assert!(value.value().bits() <= u64::from(value.ty().bits()));
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{euint64, principals, LedgerFixture, TestLedger};
pub use generators::{
    address, clear_value, encrypted_type, handle_id, keypair, numeric_type, typed_value,
};
