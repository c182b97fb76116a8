//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::sync::Arc;

use cloak::{EncryptedInput, Ledger, LedgerConfig, MockCoprocessor};
use cloak_core::{Address, ClearValue, DecryptionProof, EncryptedType, HandleId, Keypair};
use cloak_store::{MemoryStore, Store};

/// Ledger type the fixtures build.
pub type TestLedger<S = MemoryStore> = Ledger<S, Arc<MockCoprocessor>>;

/// A ledger whose configuration trusts `input_signers` for inputs and
/// `kms` for decryption attestations.
pub struct LedgerFixture<S: Store = MemoryStore> {
    pub ledger: Arc<TestLedger<S>>,
    pub coprocessor: Arc<MockCoprocessor>,
    pub input_signers: Vec<Keypair>,
    pub kms: Vec<Keypair>,
}

impl LedgerFixture<MemoryStore> {
    /// Three input signers and three KMS signers, default thresholds.
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    /// Like [`new`](Self::new), with a chance to adjust the configuration
    /// after the signer sets are filled in.
    pub fn with_config(tweak: impl FnOnce(&mut LedgerConfig)) -> Self {
        Self::open(MemoryStore::new(), tweak)
    }
}

impl Default for LedgerFixture<MemoryStore> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Store> LedgerFixture<S> {
    /// Build a fixture over an existing store. Signer keys are derived from
    /// fixed seeds, so reopening the same store yields the same signers.
    pub fn open(store: S, tweak: impl FnOnce(&mut LedgerConfig)) -> Self {
        let input_signers = signers(1, 3);
        let kms = signers(11, 3);

        let mut config = LedgerConfig::default();
        config.acl.input_signers = input_signers.iter().map(Keypair::public_key).collect();
        config.acl.kms_signers = kms.iter().map(Keypair::public_key).collect();
        tweak(&mut config);

        let coprocessor = Arc::new(MockCoprocessor::new(config.acl.chain_id, signers(1, 3)));
        let ledger = Ledger::new(store, Arc::clone(&coprocessor), config)
            .expect("fixture config is valid");
        Self {
            ledger: Arc::new(ledger),
            coprocessor,
            input_signers,
            kms,
        }
    }

    /// Encrypt `values` for `user` under `contract`, signed by all input
    /// signers.
    pub fn encrypt(&self, contract: Address, user: Address, values: &[ClearValue]) -> EncryptedInput {
        self.coprocessor
            .encrypt(contract, user, values)
            .expect("mock encryption")
    }

    /// Encrypt with only the first `count` input signers.
    pub fn encrypt_partial(
        &self,
        contract: Address,
        user: Address,
        values: &[ClearValue],
        count: usize,
    ) -> EncryptedInput {
        let signers: Vec<&Keypair> = self.input_signers.iter().take(count).collect();
        self.coprocessor
            .encrypt_signed_by(contract, user, values, &signers)
            .expect("mock encryption")
    }

    /// Plaintext the co-processor holds for `handle`.
    pub fn value(&self, handle: &HandleId) -> ClearValue {
        self.coprocessor.value_of(handle).expect("known handle")
    }

    /// KMS attestation of the co-processor's values, signed by every KMS
    /// signer.
    pub fn attest(&self, handles: &[HandleId]) -> DecryptionProof {
        let config = &self.ledger.config().acl;
        let values = handles.iter().map(|h| self.value(h)).collect();
        let signers: Vec<&Keypair> = self.kms.iter().collect();
        DecryptionProof::sign(
            config.chain_id,
            config.decryption_contract,
            handles.to_vec(),
            values,
            &signers,
        )
        .expect("attestation")
    }
}

/// `euint64` cleartext.
pub fn euint64(n: u64) -> ClearValue {
    ClearValue::from_u128(EncryptedType::Uint64, n.into()).expect("u64 fits Uint64")
}

/// Contract addresses for a list of names.
pub fn principals<const N: usize>(names: [&str; N]) -> [Address; N] {
    names.map(Address::contract)
}

fn signers(first_seed: u8, count: u8) -> Vec<Keypair> {
    (first_seed..first_seed + count)
        .map(|i| Keypair::from_seed(&[i; 32]))
        .collect()
}
