//! The co-processor boundary.
//!
//! The ledger never touches ciphertexts. It hands the co-processor operator
//! requests over handles and trusts it to keep the ciphertext behind each
//! handle. [`MockCoprocessor`] does this in cleartext: each handle maps to
//! its plaintext, and "encryption" is a reversible framing with a random
//! salt.
//!
//! The mock also plays the client-side input encryptor and the input
//! verifier that signs proofs, so tests can produce admissible inputs.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use rand::RngCore;
use tracing::{debug, trace};

use cloak_acl::ExternalCiphertext;
use cloak_core::{
    Address, ClearValue, EncryptedType, FheOp, HandleId, InputProof, InputProofEntry, Keypair,
};
use cloak_relayer::{DecryptionOracle, RelayerError};

use crate::error::{LedgerError, Result};

/// KDF context for input handle hashes.
const INPUT_HANDLE_CONTEXT: &str = "cloak input handle v1";

/// Mock ciphertext: type tag, 32-byte value, 16-byte salt.
const MOCK_CIPHERTEXT_LEN: usize = 1 + 32 + 16;

/// Homomorphic evaluation engine holding the ciphertext of every handle.
pub trait Coprocessor: Send + Sync {
    /// Evaluate `op` over the ciphertexts of `operands` and keep the result
    /// under `result`, whose type tag gives the result type.
    fn compute(&self, op: FheOp, operands: &[HandleId], result: HandleId) -> Result<()>;

    /// Keep an encryption of a public constant under `handle`.
    fn trivial_encrypt(&self, handle: HandleId, value: &ClearValue) -> Result<()>;

    /// Take ownership of an admitted input ciphertext.
    fn accept_input(&self, ciphertext: &ExternalCiphertext) -> Result<()>;
}

impl<T: Coprocessor + ?Sized> Coprocessor for std::sync::Arc<T> {
    fn compute(&self, op: FheOp, operands: &[HandleId], result: HandleId) -> Result<()> {
        (**self).compute(op, operands, result)
    }

    fn trivial_encrypt(&self, handle: HandleId, value: &ClearValue) -> Result<()> {
        (**self).trivial_encrypt(handle, value)
    }

    fn accept_input(&self, ciphertext: &ExternalCiphertext) -> Result<()> {
        (**self).accept_input(ciphertext)
    }
}

/// Ciphertexts plus the proof that certifies them, as a client submits them.
#[derive(Debug, Clone)]
pub struct EncryptedInput {
    pub ciphertexts: Vec<ExternalCiphertext>,
    pub proof: Vec<u8>,
}

impl EncryptedInput {
    pub fn handles(&self) -> Vec<HandleId> {
        self.ciphertexts.iter().map(|ct| ct.handle).collect()
    }
}

/// Cleartext co-processor for tests and local deployments.
pub struct MockCoprocessor {
    chain_id: u64,
    signers: Vec<Keypair>,
    values: RwLock<HashMap<HandleId, ClearValue>>,
}

impl MockCoprocessor {
    /// A co-processor for `chain_id` whose input proofs carry a signature
    /// from each of `signers`.
    pub fn new(chain_id: u64, signers: Vec<Keypair>) -> Self {
        Self {
            chain_id,
            signers,
            values: RwLock::new(HashMap::new()),
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn signers(&self) -> &[Keypair] {
        &self.signers
    }

    /// Encrypt `values` for use by `contract` on behalf of `user`, signed by
    /// every configured signer.
    pub fn encrypt(
        &self,
        contract: Address,
        user: Address,
        values: &[ClearValue],
    ) -> Result<EncryptedInput> {
        let signers: Vec<&Keypair> = self.signers.iter().collect();
        self.encrypt_signed_by(contract, user, values, &signers)
    }

    /// Encrypt with an explicit signer set.
    pub fn encrypt_signed_by(
        &self,
        contract: Address,
        user: Address,
        values: &[ClearValue],
        signers: &[&Keypair],
    ) -> Result<EncryptedInput> {
        if values.len() > usize::from(u8::MAX) {
            return Err(LedgerError::Coprocessor(format!(
                "{} values in one input",
                values.len()
            )));
        }

        let mut ciphertexts = Vec::with_capacity(values.len());
        let mut entries = Vec::with_capacity(values.len());
        for (index, value) in values.iter().enumerate() {
            let bytes = frame(value);
            let hash = blake3::derive_key(INPUT_HANDLE_CONTEXT, &bytes);
            let handle = HandleId::compose(&hash, index as u8, self.chain_id, value.ty());
            let ct = ExternalCiphertext::new(handle, bytes);
            entries.push(InputProofEntry {
                handle,
                ciphertext_digest: ct.digest(),
            });
            ciphertexts.push(ct);
        }

        let proof = InputProof::sign(contract, user, self.chain_id, entries, signers)?;
        Ok(EncryptedInput {
            ciphertexts,
            proof: proof.to_bytes()?,
        })
    }

    /// Plaintext behind a handle.
    pub fn value_of(&self, handle: &HandleId) -> Result<ClearValue> {
        self.values
            .read()
            .map_err(|_| LedgerError::LockPoisoned)?
            .get(handle)
            .cloned()
            .ok_or(LedgerError::UnknownCiphertext(*handle))
    }

    /// Number of ciphertexts held.
    pub fn len(&self) -> usize {
        self.values.read().map(|v| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn put(&self, handle: HandleId, value: ClearValue) -> Result<()> {
        self.values
            .write()
            .map_err(|_| LedgerError::LockPoisoned)?
            .insert(handle, value);
        Ok(())
    }
}

impl Coprocessor for MockCoprocessor {
    fn compute(&self, op: FheOp, operands: &[HandleId], result: HandleId) -> Result<()> {
        let args = operands
            .iter()
            .map(|h| self.value_of(h))
            .collect::<Result<Vec<_>>>()?;
        let value = evaluate(op, &args, result.encrypted_type()?)?;
        trace!(%op, %result, "evaluated");
        self.put(result, value)
    }

    fn trivial_encrypt(&self, handle: HandleId, value: &ClearValue) -> Result<()> {
        if handle.encrypted_type()? != value.ty() {
            return Err(LedgerError::Coprocessor(format!(
                "{} value for a {} handle",
                value.ty(),
                handle.encrypted_type()?
            )));
        }
        self.put(handle, value.clone())
    }

    fn accept_input(&self, ciphertext: &ExternalCiphertext) -> Result<()> {
        let value = unframe(ciphertext.handle.encrypted_type()?, &ciphertext.ciphertext)?;
        debug!(handle = %ciphertext.handle, "input ciphertext accepted");
        self.put(ciphertext.handle, value)
    }
}

#[async_trait]
impl DecryptionOracle for MockCoprocessor {
    async fn decrypt(&self, handle: &HandleId) -> cloak_relayer::Result<ClearValue> {
        self.value_of(handle)
            .map_err(|e| RelayerError::Oracle(e.to_string()))
    }
}

fn frame(value: &ClearValue) -> Vec<u8> {
    let mut salt = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt);

    let mut bytes = Vec::with_capacity(MOCK_CIPHERTEXT_LEN);
    bytes.push(value.ty().tag());
    bytes.extend_from_slice(&value.to_be_bytes32());
    bytes.extend_from_slice(&salt);
    bytes
}

fn unframe(ty: EncryptedType, bytes: &[u8]) -> Result<ClearValue> {
    if bytes.len() != MOCK_CIPHERTEXT_LEN {
        return Err(LedgerError::Coprocessor(format!(
            "ciphertext length {}, expected {MOCK_CIPHERTEXT_LEN}",
            bytes.len()
        )));
    }
    if bytes[0] != ty.tag() {
        return Err(LedgerError::Coprocessor(format!(
            "ciphertext tag {} for a {ty} handle",
            bytes[0]
        )));
    }
    let mut raw = [0u8; 32];
    raw.copy_from_slice(&bytes[1..33]);
    Ok(ClearValue::from_be_bytes32(ty, &raw)?)
}

/// Cleartext semantics of each operator. Arithmetic wraps modulo `2^bits`.
fn evaluate(op: FheOp, args: &[ClearValue], result_ty: EncryptedType) -> Result<ClearValue> {
    let value = match (op, args) {
        (FheOp::Add, [a, b]) => ClearValue::wrapping(a.ty(), a.value() + b.value()),
        (FheOp::Sub, [a, b]) => {
            let modulus = ClearValue::modulus(a.ty());
            ClearValue::wrapping(a.ty(), a.value() + &modulus - b.value())
        }
        (FheOp::Mul, [a, b]) => ClearValue::wrapping(a.ty(), a.value() * b.value()),
        (FheOp::And, [a, b]) => ClearValue::wrapping(a.ty(), a.value() & b.value()),
        (FheOp::Or, [a, b]) => ClearValue::wrapping(a.ty(), a.value() | b.value()),
        (FheOp::Xor, [a, b]) => ClearValue::wrapping(a.ty(), a.value() ^ b.value()),
        (FheOp::Eq, [a, b]) => ClearValue::from_bool(a.value() == b.value()),
        (FheOp::Ne, [a, b]) => ClearValue::from_bool(a.value() != b.value()),
        (FheOp::Lt, [a, b]) => ClearValue::from_bool(a.value() < b.value()),
        (FheOp::Le, [a, b]) => ClearValue::from_bool(a.value() <= b.value()),
        (FheOp::Gt, [a, b]) => ClearValue::from_bool(a.value() > b.value()),
        (FheOp::Ge, [a, b]) => ClearValue::from_bool(a.value() >= b.value()),
        (FheOp::Min, [a, b]) => {
            if a.value() <= b.value() {
                a.clone()
            } else {
                b.clone()
            }
        }
        (FheOp::Max, [a, b]) => {
            if a.value() >= b.value() {
                a.clone()
            } else {
                b.clone()
            }
        }
        (FheOp::Select, [cond, a, b]) => {
            if cond.as_bool() {
                a.clone()
            } else {
                b.clone()
            }
        }
        (FheOp::Not, [a]) => {
            ClearValue::wrapping(a.ty(), ClearValue::max(a.ty()).value() ^ a.value())
        }
        (FheOp::Neg, [a]) => {
            ClearValue::wrapping(a.ty(), ClearValue::modulus(a.ty()) - a.value())
        }
        (FheOp::Cast, [a]) => a.cast(result_ty),
        _ => {
            return Err(LedgerError::Coprocessor(format!(
                "{op} does not take {} operands",
                args.len()
            )))
        }
    };

    if value.ty() != result_ty {
        return Err(LedgerError::Coprocessor(format!(
            "{op} produced {}, handle expects {result_ty}",
            value.ty()
        )));
    }
    Ok(value)
}
