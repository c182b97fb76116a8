//! Values re-encrypted to a client's request key.
//!
//! The service seals each cleartext to the X25519 public key signed into the
//! authorization message. Only the holder of the matching secret can open it.

use serde::{Deserialize, Serialize};

use cloak_core::{ClearValue, EncryptedType, HandleId};

use crate::crypto::{EncryptionNonce, EphemeralKeyPair, X25519PublicKey, X25519StaticSecret};
use crate::error::{RelayerError, Result};

/// Sealed plaintext: type tag followed by the 32-byte big-endian value.
const SEALED_LEN: usize = 33;

/// A handle's cleartext sealed to one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedValue {
    pub handle: HandleId,
    /// Sender's one-time public key.
    pub ephemeral_public: X25519PublicKey,
    pub nonce: EncryptionNonce,
    pub ciphertext: Vec<u8>,
}

impl SealedValue {
    /// Seal `value` for `recipient`. The key is bound to the handle id.
    pub fn seal(handle: HandleId, value: &ClearValue, recipient: &X25519PublicKey) -> Result<Self> {
        let ephemeral = EphemeralKeyPair::generate();
        let ephemeral_public = ephemeral.public_key();
        let key = ephemeral
            .diffie_hellman(recipient)
            .derive_encryption_key(handle.as_bytes());

        let mut plaintext = Vec::with_capacity(SEALED_LEN);
        plaintext.push(value.ty().tag());
        plaintext.extend_from_slice(&value.to_be_bytes32());

        let nonce = EncryptionNonce::generate();
        let ciphertext = key.encrypt(&plaintext, &nonce)?;
        Ok(Self {
            handle,
            ephemeral_public,
            nonce,
            ciphertext,
        })
    }

    /// Open with the recipient's secret.
    pub fn open(&self, secret: &X25519StaticSecret) -> Result<ClearValue> {
        let key = secret
            .diffie_hellman(&self.ephemeral_public)
            .derive_encryption_key(self.handle.as_bytes());
        let plaintext = key.decrypt(&self.ciphertext, &self.nonce)?;

        if plaintext.len() != SEALED_LEN {
            return Err(RelayerError::Decryption(format!(
                "invalid sealed length: expected {SEALED_LEN}, got {}",
                plaintext.len()
            )));
        }
        let ty = EncryptedType::from_tag(plaintext[0])?;
        if ty != self.handle.encrypted_type()? {
            return Err(RelayerError::Decryption(format!(
                "sealed {ty} for a {} handle",
                self.handle.encrypted_type()?
            )));
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&plaintext[1..]);
        Ok(ClearValue::from_be_bytes32(ty, &bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(ty: EncryptedType) -> HandleId {
        HandleId::compose(&[3; 32], 0xff, 9000, ty)
    }

    #[test]
    fn test_seal_open() {
        let secret = X25519StaticSecret::generate();
        let value = ClearValue::from_u128(EncryptedType::Uint64, 1_000_000).unwrap();
        let sealed = SealedValue::seal(handle(EncryptedType::Uint64), &value, &secret.public_key())
            .unwrap();
        assert_eq!(sealed.open(&secret).unwrap(), value);
    }

    #[test]
    fn test_wrong_recipient_fails() {
        let secret = X25519StaticSecret::generate();
        let other = X25519StaticSecret::generate();
        let value = ClearValue::from_bool(true);
        let sealed =
            SealedValue::seal(handle(EncryptedType::Bool), &value, &secret.public_key()).unwrap();
        assert!(matches!(sealed.open(&other), Err(RelayerError::Decryption(_))));
    }

    #[test]
    fn test_rebinding_to_another_handle_fails() {
        let secret = X25519StaticSecret::generate();
        let value = ClearValue::from_u128(EncryptedType::Uint8, 9).unwrap();
        let mut sealed =
            SealedValue::seal(handle(EncryptedType::Uint8), &value, &secret.public_key()).unwrap();
        sealed.handle = HandleId::compose(&[4; 32], 0xff, 9000, EncryptedType::Uint8);
        assert!(sealed.open(&secret).is_err());
    }
}
