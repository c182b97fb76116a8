//! Authorization messages and the client/service wire protocol.

use ciborium::value::Value;
use serde::{Deserialize, Serialize};

use cloak_core::canonical;
use cloak_core::{
    Address, Blake3Hash, CoreError, DecryptionProof, Domain, Ed25519PublicKey, Ed25519Signature,
    HandleId, Keypair, TypedMessage,
};

use crate::crypto::X25519PublicKey;
use crate::error::{RelayerError, Result};
use crate::reencrypt::SealedValue;

/// Identifier of a relayer endpoint (client or service).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointId(pub [u8; 32]);

impl EndpointId {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn random() -> Self {
        use rand::Rng;
        Self(rand::thread_rng().gen())
    }
}

/// Current protocol version.
pub const PROTOCOL_VERSION: u8 = 0;

/// Domain name of user-decryption authorizations.
pub const DECRYPTION_DOMAIN: &str = "Decryption";

/// Typed message name of a user's own decryption request.
pub const USER_DECRYPT_REQUEST_VERIFICATION: &str = "UserDecryptRequestVerification";

/// Typed message name of a request made under a delegation.
pub const DELEGATED_USER_DECRYPT_REQUEST_VERIFICATION: &str =
    "DelegatedUserDecryptRequestVerification";

/// Longest validity window a signature may cover.
pub const MAX_DURATION_DAYS: u32 = 365;

pub const SECONDS_PER_DAY: u64 = 86_400;

/// Request size limits.
pub mod limits {
    /// Max contracts named in one authorization message.
    pub const MAX_CONTRACTS: usize = 10;
    /// Max handles in one user or public decryption request.
    pub const MAX_HANDLES: usize = 32;
}

/// Validity window `[start, start + days)` of a signed authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptionWindow {
    pub start_timestamp: u64,
    pub duration_days: u32,
}

impl DecryptionWindow {
    pub fn new(start_timestamp: u64, duration_days: u32) -> Self {
        Self {
            start_timestamp,
            duration_days,
        }
    }

    /// First second past the window.
    pub fn end(&self) -> u64 {
        self.start_timestamp
            .saturating_add(u64::from(self.duration_days) * SECONDS_PER_DAY)
    }

    /// Check the duration bounds and that `now` lies inside the window.
    pub fn check(&self, now: u64) -> Result<()> {
        if self.duration_days == 0 || self.duration_days > MAX_DURATION_DAYS {
            return Err(RelayerError::InvalidDuration {
                days: self.duration_days,
                max: MAX_DURATION_DAYS,
            });
        }
        if now < self.start_timestamp || now >= self.end() {
            return Err(RelayerError::SignatureExpired {
                start: self.start_timestamp,
                end: self.end(),
                now,
            });
        }
        Ok(())
    }
}

/// What the holder signs to authorize a user decryption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationMessage {
    /// Request key every returned value is sealed to.
    pub public_key: X25519PublicKey,
    pub contract_addresses: Vec<Address>,
    pub start_timestamp: u64,
    pub duration_days: u32,
    /// Set when the signer acts under a delegation from this address.
    pub delegator: Option<Address>,
}

impl AuthorizationMessage {
    pub fn window(&self) -> DecryptionWindow {
        DecryptionWindow::new(self.start_timestamp, self.duration_days)
    }

    fn typed_message(&self) -> TypedMessage {
        let contracts = self
            .contract_addresses
            .iter()
            .map(canonical::address)
            .collect();
        let base = match self.delegator {
            None => TypedMessage::new(USER_DECRYPT_REQUEST_VERIFICATION),
            Some(delegator) => TypedMessage::new(DELEGATED_USER_DECRYPT_REQUEST_VERIFICATION)
                .field("delegator_address", canonical::address(&delegator)),
        };
        base.field("public_key", canonical::bytes(self.public_key.as_bytes()))
            .field("contract_addresses", Value::Array(contracts))
            .field("start_timestamp", canonical::uint(self.start_timestamp))
            .field("duration_days", canonical::uint(u64::from(self.duration_days)))
    }

    /// Domain-separated digest under `{Decryption, 1, chain_id, verifying_contract}`.
    pub fn digest(&self, chain_id: u64, verifying_contract: Address) -> std::result::Result<Blake3Hash, CoreError> {
        let domain = Domain::new(DECRYPTION_DOMAIN, "1", chain_id, verifying_contract);
        self.typed_message().digest(&domain)
    }
}

/// A handle and the contract under which it is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandleContractPair {
    pub handle: HandleId,
    pub contract: Address,
}

/// A signed user-decryption request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDecryptRequest {
    pub pairs: Vec<HandleContractPair>,
    pub message: AuthorizationMessage,
    pub signer: Ed25519PublicKey,
    pub signature: Ed25519Signature,
}

impl UserDecryptRequest {
    /// Sign `message` with the holder's key.
    pub fn sign(
        keypair: &Keypair,
        pairs: Vec<HandleContractPair>,
        message: AuthorizationMessage,
        chain_id: u64,
        verifying_contract: Address,
    ) -> Result<Self> {
        let digest = message.digest(chain_id, verifying_contract)?;
        Ok(Self {
            pairs,
            signature: keypair.sign(digest.as_bytes()),
            signer: keypair.public_key(),
            message,
        })
    }

    /// Address of the signing principal.
    pub fn user(&self) -> Address {
        self.signer.to_address()
    }

    pub fn verify_signature(&self, chain_id: u64, verifying_contract: Address) -> Result<()> {
        let digest = self.message.digest(chain_id, verifying_contract)?;
        self.signer
            .verify(digest.as_bytes(), &self.signature)
            .map_err(|_| RelayerError::InvalidSignature)
    }
}

/// Messages exchanged between clients and the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RelayerMessage {
    UserDecrypt {
        request_id: u64,
        request: UserDecryptRequest,
    },
    UserDecryptResponse {
        request_id: u64,
        values: Vec<SealedValue>,
    },
    PublicDecrypt {
        request_id: u64,
        handles: Vec<HandleId>,
    },
    PublicDecryptResponse {
        request_id: u64,
        proof: DecryptionProof,
    },
    Error {
        request_id: u64,
        code: ErrorCode,
        message: String,
    },
}

impl RelayerMessage {
    pub fn request_id(&self) -> u64 {
        match self {
            RelayerMessage::UserDecrypt { request_id, .. }
            | RelayerMessage::UserDecryptResponse { request_id, .. }
            | RelayerMessage::PublicDecrypt { request_id, .. }
            | RelayerMessage::PublicDecryptResponse { request_id, .. }
            | RelayerMessage::Error { request_id, .. } => *request_id,
        }
    }

    /// Check size limits.
    pub fn validate_limits(&self) -> Result<()> {
        match self {
            RelayerMessage::UserDecrypt { request, .. } => {
                check_len("contracts", request.message.contract_addresses.len(), limits::MAX_CONTRACTS)?;
                check_len("handles", request.pairs.len(), limits::MAX_HANDLES)
            }
            RelayerMessage::PublicDecrypt { handles, .. } => {
                check_len("handles", handles.len(), limits::MAX_HANDLES)
            }
            RelayerMessage::UserDecryptResponse { values, .. } => {
                check_len("values", values.len(), limits::MAX_HANDLES)
            }
            RelayerMessage::PublicDecryptResponse { proof, .. } => {
                check_len("values", proof.handles.len(), limits::MAX_HANDLES)
            }
            RelayerMessage::Error { .. } => Ok(()),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| RelayerError::Core(CoreError::EncodingError(e.to_string())))?;
        Ok(buf)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes)
            .map_err(|e| RelayerError::Core(CoreError::DecodingError(e.to_string())))
    }
}

fn check_len(what: &'static str, count: usize, max: usize) -> Result<()> {
    if count > max {
        return Err(RelayerError::TooMany { what, count, max });
    }
    Ok(())
}

/// Machine-readable failure codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u16)]
pub enum ErrorCode {
    Unknown = 0,
    InvalidRequest = 1,
    MessageTooLarge = 2,
    SignatureExpired = 3,
    InvalidSignature = 4,
    /// ACL or delegation check failed; the service's ledger view may lag.
    NotAuthorized = 5,
    NotPublic = 6,
    Unavailable = 7,
    InternalError = 8,
}

impl ErrorCode {
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorCode::NotAuthorized
                | ErrorCode::NotPublic
                | ErrorCode::Unavailable
                | ErrorCode::InternalError
        )
    }
}
