//! Strong type definitions for handles and principals.
//!
//! All identifiers are newtypes to prevent misuse at compile time.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;

/// Length of the hash prefix at the front of a handle.
pub const HANDLE_HASH_LEN: usize = 21;

/// Index byte used for handles produced by computation rather than input.
pub const COMPUTED_INDEX: u8 = 0xff;

/// Current handle layout version (last byte of every handle).
pub const HANDLE_VERSION: u8 = 0;

/// Byte offsets inside the 32-byte handle layout.
mod layout {
    pub const INDEX: usize = 21;
    pub const CHAIN_ID: usize = 22;
    pub const TYPE_TAG: usize = 30;
    pub const VERSION: usize = 31;
}

/// Opaque 32-byte reference to a ciphertext held by the co-processor.
///
/// Layout: `hash[0..21] || index || chain_id (u64 BE) || type tag || version`.
/// The layout belongs to the co-processor; this crate only reads it through
/// the accessors below and never reinterprets the hash prefix.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HandleId(pub [u8; 32]);

impl HandleId {
    /// Create a handle from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Assemble a handle from its parts.
    pub fn compose(
        hash: &[u8; 32],
        index: u8,
        chain_id: u64,
        ty: EncryptedType,
    ) -> Self {
        let mut bytes = [0u8; 32];
        bytes[..HANDLE_HASH_LEN].copy_from_slice(&hash[..HANDLE_HASH_LEN]);
        bytes[layout::INDEX] = index;
        bytes[layout::CHAIN_ID..layout::TYPE_TAG].copy_from_slice(&chain_id.to_be_bytes());
        bytes[layout::TYPE_TAG] = ty.tag();
        bytes[layout::VERSION] = HANDLE_VERSION;
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Position of this handle inside its input proof, or `0xff` if computed.
    pub fn index(&self) -> u8 {
        self.0[layout::INDEX]
    }

    /// Chain the handle was produced on.
    pub fn chain_id(&self) -> u64 {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&self.0[layout::CHAIN_ID..layout::TYPE_TAG]);
        u64::from_be_bytes(buf)
    }

    /// Decode the type tag embedded in the handle.
    pub fn encrypted_type(&self) -> Result<EncryptedType, CoreError> {
        EncryptedType::from_tag(self.0[layout::TYPE_TAG])
    }

    /// Layout version byte.
    pub fn version(&self) -> u8 {
        self.0[layout::VERSION]
    }

    /// Whether this handle was produced by computation.
    pub fn is_computed(&self) -> bool {
        self.index() == COMPUTED_INDEX
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s.trim_start_matches("0x"))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| hex::FromHexError::InvalidStringLength)?;
        Ok(Self(arr))
    }

    /// The zero handle (never produced by the co-processor).
    pub const ZERO: Self = Self([0u8; 32]);
}

impl fmt::Debug for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HandleId({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", &self.to_hex()[..16])
    }
}

impl AsRef<[u8]> for HandleId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for HandleId {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl TryFrom<&[u8]> for HandleId {
    type Error = std::array::TryFromSliceError;

    fn try_from(slice: &[u8]) -> Result<Self, Self::Error> {
        let arr: [u8; 32] = slice.try_into()?;
        Ok(Self(arr))
    }
}

/// A 20-byte principal: a user account or a contract.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(pub [u8; 20]);

impl Address {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string, with or without a `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s.trim_start_matches("0x"))?;
        let arr: [u8; 20] = bytes
            .try_into()
            .map_err(|_| hex::FromHexError::InvalidStringLength)?;
        Ok(Self(arr))
    }

    /// Deterministic address for a named contract (tests and fixtures).
    pub fn contract(name: &str) -> Self {
        let hash = blake3::derive_key("cloak contract address v1", name.as_bytes());
        let mut arr = [0u8; 20];
        arr.copy_from_slice(&hash[12..]);
        Self(arr)
    }

    /// Address of contract `name` deployed by `deployer`. Distinct deployers
    /// never collide on the same name.
    pub fn deployed(deployer: &Address, name: &str) -> Self {
        let mut hasher = blake3::Hasher::new_derive_key("cloak deployed contract address v1");
        hasher.update(deployer.as_bytes());
        hasher.update(name.as_bytes());
        let hash = hasher.finalize();
        let mut arr = [0u8; 20];
        arr.copy_from_slice(&hash.as_bytes()[12..]);
        Self(arr)
    }

    /// The zero address.
    pub const ZERO: Self = Self([0u8; 20]);
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address(0x{})", self.to_hex())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

impl From<[u8; 20]> for Address {
    fn from(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }
}

/// Logical type of the value a handle refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum EncryptedType {
    Bool = 0,
    Uint4 = 1,
    Uint8 = 2,
    Uint16 = 3,
    Uint32 = 4,
    Uint64 = 5,
    Uint128 = 6,
    /// 160-bit address form.
    Address = 7,
    Uint256 = 8,
}

impl EncryptedType {
    /// All supported types, in tag order.
    pub const ALL: [EncryptedType; 9] = [
        EncryptedType::Bool,
        EncryptedType::Uint4,
        EncryptedType::Uint8,
        EncryptedType::Uint16,
        EncryptedType::Uint32,
        EncryptedType::Uint64,
        EncryptedType::Uint128,
        EncryptedType::Address,
        EncryptedType::Uint256,
    ];

    /// Tag byte stored in handles.
    pub const fn tag(self) -> u8 {
        self as u8
    }

    /// Decode a tag byte.
    pub fn from_tag(tag: u8) -> Result<Self, CoreError> {
        Self::ALL
            .get(tag as usize)
            .copied()
            .ok_or(CoreError::UnknownType(tag))
    }

    /// Logical bit width of the plaintext.
    pub const fn bits(self) -> u32 {
        match self {
            EncryptedType::Bool => 1,
            EncryptedType::Uint4 => 4,
            EncryptedType::Uint8 => 8,
            EncryptedType::Uint16 => 16,
            EncryptedType::Uint32 => 32,
            EncryptedType::Uint64 => 64,
            EncryptedType::Uint128 => 128,
            EncryptedType::Address => 160,
            EncryptedType::Uint256 => 256,
        }
    }

    /// Whether arithmetic operators are defined for this type.
    pub const fn is_numeric(self) -> bool {
        !matches!(self, EncryptedType::Bool | EncryptedType::Address)
    }
}

impl fmt::Display for EncryptedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncryptedType::Bool => write!(f, "ebool"),
            EncryptedType::Address => write!(f, "eaddress"),
            other => write!(f, "euint{}", other.bits()),
        }
    }
}
