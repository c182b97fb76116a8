//! # Cloak Relayer
//!
//! The decryption authorization boundary: who may see the cleartext behind a
//! handle, and how it reaches them.
//!
//! ## Overview
//!
//! Two flows share one service:
//!
//! - **User decryption**: the holder signs a typed, domain-separated
//!   [`AuthorizationMessage`] naming contracts, a validity window and a
//!   request key. The service checks the window and signature, re-checks the
//!   ledger ACL for every handle, and returns values re-encrypted to the
//!   request key. Only the client can open them.
//! - **Public decryption**: handles flagged publicly decryptable on the
//!   ledger are returned in the clear together with a KMS-signed
//!   [`DecryptionProof`](cloak_core::DecryptionProof), which the ledger
//!   accepts to finalize a disclosure.
//!
//! The service's view of the ledger may lag. Rejections carry an
//! [`ErrorCode`]; ACL rejections are retryable.
//!
//! ## Message Flow
//!
//! ```text
//! Client                                Service
//!   |-------- UserDecrypt ---------------->|  window, signature, ACL
//!   |<------- UserDecryptResponse ---------|  sealed values
//!   |-------- PublicDecrypt -------------->|  public flag
//!   |<------- PublicDecryptResponse -------|  KMS attestation
//!   |<------- Error -----------------------|  on rejection
//! ```

pub mod client;
pub mod crypto;
pub mod error;
pub mod messages;
pub mod oracle;
pub mod reencrypt;
pub mod service;
pub mod transport;

#[cfg(test)]
mod mock;

pub use client::DecryptionClient;
pub use crypto::{X25519PublicKey, X25519StaticSecret};
pub use error::{RelayerError, Result};
pub use messages::{
    limits, AuthorizationMessage, DecryptionWindow, EndpointId, ErrorCode, HandleContractPair,
    RelayerMessage, UserDecryptRequest, MAX_DURATION_DAYS, PROTOCOL_VERSION,
};
pub use oracle::{AclView, DecryptionOracle};
pub use reencrypt::SealedValue;
pub use service::{DecryptionService, RelayerConfig};
pub use transport::{memory::MemoryNetwork, memory::MemoryTransport, Transport};
