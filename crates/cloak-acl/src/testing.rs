//! Unit-test harness: a memory store, signer sets and proof builders.

use cloak_core::{
    Address, ClearValue, DecryptionProof, EncryptedType, HandleId, InputProof, InputProofEntry,
    Keypair,
};
use cloak_store::{MemoryStore, Store};

use crate::config::AclConfig;
use crate::context::TxContext;
use crate::input::ExternalCiphertext;

pub(crate) const START_TIME: u64 = 1_700_000_000;

pub(crate) struct Harness {
    pub store: MemoryStore,
    pub config: AclConfig,
    pub input_signers: Vec<Keypair>,
    pub kms_signers: Vec<Keypair>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_thresholds(1, 1)
    }

    /// Three input signers and three KMS signers with the given thresholds.
    pub fn with_thresholds(input_threshold: usize, kms_threshold: usize) -> Self {
        let input_signers: Vec<Keypair> =
            (1..=3u8).map(|i| Keypair::from_seed(&[i; 32])).collect();
        let kms_signers: Vec<Keypair> =
            (11..=13u8).map(|i| Keypair::from_seed(&[i; 32])).collect();
        let config = AclConfig {
            input_signers: input_signers.iter().map(Keypair::public_key).collect(),
            input_threshold,
            kms_signers: kms_signers.iter().map(Keypair::public_key).collect(),
            kms_threshold,
            ..AclConfig::default()
        };
        Self {
            store: MemoryStore::new(),
            config,
            input_signers,
            kms_signers,
        }
    }

    pub fn tx(&self, sender: Address) -> TxContext<'_, MemoryStore> {
        self.tx_at(sender, 1, START_TIME)
    }

    pub fn tx_at(&self, sender: Address, tx_id: u64, now: u64) -> TxContext<'_, MemoryStore> {
        TxContext::new(&self.store, &self.config, tx_id, now, sender)
    }

    pub fn commit(&self, tx: TxContext<'_, MemoryStore>) {
        let effects = tx.into_effects().unwrap();
        self.store.commit(&effects.changes).unwrap();
    }

    pub fn input(
        &self,
        contract: Address,
        user: Address,
        types: &[EncryptedType],
    ) -> (Vec<ExternalCiphertext>, Vec<u8>) {
        let signers: Vec<&Keypair> = self.input_signers.iter().collect();
        self.build_input(contract, user, types, self.config.chain_id, &signers)
    }

    pub fn input_signed_by(
        &self,
        contract: Address,
        user: Address,
        types: &[EncryptedType],
        n: usize,
    ) -> (Vec<ExternalCiphertext>, Vec<u8>) {
        let signers: Vec<&Keypair> = self.input_signers.iter().take(n).collect();
        self.build_input(contract, user, types, self.config.chain_id, &signers)
    }

    pub fn input_with_signers(
        &self,
        contract: Address,
        user: Address,
        types: &[EncryptedType],
        signers: &[&Keypair],
    ) -> (Vec<ExternalCiphertext>, Vec<u8>) {
        self.build_input(contract, user, types, self.config.chain_id, signers)
    }

    pub fn input_on_chain(
        &self,
        contract: Address,
        user: Address,
        types: &[EncryptedType],
        chain_id: u64,
    ) -> (Vec<ExternalCiphertext>, Vec<u8>) {
        let signers: Vec<&Keypair> = self.input_signers.iter().collect();
        self.build_input(contract, user, types, chain_id, &signers)
    }

    fn build_input(
        &self,
        contract: Address,
        user: Address,
        types: &[EncryptedType],
        chain_id: u64,
        signers: &[&Keypair],
    ) -> (Vec<ExternalCiphertext>, Vec<u8>) {
        let mut cts = Vec::new();
        let mut entries = Vec::new();
        for (i, ty) in types.iter().enumerate() {
            let ciphertext = format!("ciphertext {i} for {user}").into_bytes();
            let hash = blake3::hash(&ciphertext);
            let handle = HandleId::compose(hash.as_bytes(), i as u8, chain_id, *ty);
            let ct = ExternalCiphertext::new(handle, ciphertext);
            entries.push(InputProofEntry {
                handle,
                ciphertext_digest: ct.digest(),
            });
            cts.push(ct);
        }
        let proof = InputProof::sign(contract, user, chain_id, entries, signers).unwrap();
        (cts, proof.to_bytes().unwrap())
    }

    pub fn attest(&self, values: &[(HandleId, ClearValue)]) -> DecryptionProof {
        let signers: Vec<&Keypair> = self.kms_signers.iter().collect();
        self.attest_with(values, &signers)
    }

    pub fn attest_with(&self, values: &[(HandleId, ClearValue)], signers: &[&Keypair]) -> DecryptionProof {
        DecryptionProof::sign(
            self.config.chain_id,
            self.config.decryption_contract,
            values.iter().map(|(h, _)| *h).collect(),
            values.iter().map(|(_, v)| v.clone()).collect(),
            signers,
        )
        .unwrap()
    }
}
