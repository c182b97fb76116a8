//! Error types for the Cloak core primitives.

use thiserror::Error;

use crate::types::EncryptedType;

/// Core errors that can occur while handling primitives.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("unknown encrypted type tag: {0}")]
    UnknownType(u8),

    #[error("value with {bits} bits does not fit {ty}")]
    ValueOutOfRange { ty: EncryptedType, bits: u64 },

    #[error("malformed handle: {0}")]
    MalformedHandle(String),

    #[error("unsupported canonical value: {0}")]
    UnsupportedCanonical(&'static str),

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("decoding error: {0}")]
    DecodingError(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
