//! Cleartext values.
//!
//! The permission layer never sees plaintext. `ClearValue` exists for the
//! boundaries that do: the mock co-processor, the decryption service, and
//! finalized disclosures.

use num_bigint::BigUint;
use num_traits::{One, Zero};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;
use crate::types::EncryptedType;

/// A typed plaintext, always reduced below `2^bits`.
///
/// Decoding goes through [`ClearValue::new`], so a value read off the wire or
/// out of storage holds the same range invariant as one built locally.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawClearValue")]
pub struct ClearValue {
    ty: EncryptedType,
    value: BigUint,
}

/// Unchecked wire form of [`ClearValue`].
#[derive(Deserialize)]
struct RawClearValue {
    ty: EncryptedType,
    value: BigUint,
}

impl TryFrom<RawClearValue> for ClearValue {
    type Error = CoreError;

    fn try_from(raw: RawClearValue) -> Result<Self, Self::Error> {
        Self::new(raw.ty, raw.value)
    }
}

impl ClearValue {
    /// Build a value, failing if it does not fit the type.
    pub fn new(ty: EncryptedType, value: BigUint) -> Result<Self, CoreError> {
        if value.bits() > u64::from(ty.bits()) {
            return Err(CoreError::ValueOutOfRange { ty, bits: value.bits() });
        }
        Ok(Self { ty, value })
    }

    /// Build a value, reducing modulo `2^bits`.
    pub fn wrapping(ty: EncryptedType, value: BigUint) -> Self {
        let value = value % Self::modulus(ty);
        Self { ty, value }
    }

    /// Build from a `u128`, failing if it does not fit.
    pub fn from_u128(ty: EncryptedType, value: u128) -> Result<Self, CoreError> {
        Self::new(ty, BigUint::from(value))
    }

    /// Boolean value.
    pub fn from_bool(value: bool) -> Self {
        Self {
            ty: EncryptedType::Bool,
            value: if value { BigUint::one() } else { BigUint::zero() },
        }
    }

    /// Zero of the given type.
    pub fn zero(ty: EncryptedType) -> Self {
        Self { ty, value: BigUint::zero() }
    }

    /// Largest representable value of the given type.
    pub fn max(ty: EncryptedType) -> Self {
        Self {
            ty,
            value: Self::modulus(ty) - BigUint::one(),
        }
    }

    /// `2^bits` for the given type.
    pub fn modulus(ty: EncryptedType) -> BigUint {
        BigUint::one() << ty.bits()
    }

    /// The value's type.
    pub fn ty(&self) -> EncryptedType {
        self.ty
    }

    /// The raw integer.
    pub fn value(&self) -> &BigUint {
        &self.value
    }

    /// Interpret as a boolean (non-zero is true).
    pub fn as_bool(&self) -> bool {
        !self.value.is_zero()
    }

    /// Narrow to `u128` if it fits.
    pub fn to_u128(&self) -> Option<u128> {
        let digits = self.value.to_u64_digits();
        match digits.len() {
            0 => Some(0),
            1 => Some(u128::from(digits[0])),
            2 => Some(u128::from(digits[0]) | (u128::from(digits[1]) << 64)),
            _ => None,
        }
    }

    /// Canonical 32-byte big-endian encoding.
    pub fn to_be_bytes32(&self) -> [u8; 32] {
        let raw = self.value.to_bytes_be();
        // the range invariant keeps raw within 32 bytes; keep the low bytes regardless
        let raw = &raw[raw.len().saturating_sub(32)..];
        let mut out = [0u8; 32];
        out[32 - raw.len()..].copy_from_slice(raw);
        out
    }

    /// Decode from the canonical 32-byte encoding.
    pub fn from_be_bytes32(ty: EncryptedType, bytes: &[u8; 32]) -> Result<Self, CoreError> {
        Self::new(ty, BigUint::from_bytes_be(bytes))
    }

    /// Same value under another type, wrapping if it does not fit.
    pub fn cast(&self, ty: EncryptedType) -> Self {
        if ty == EncryptedType::Bool {
            return Self::from_bool(self.as_bool());
        }
        Self::wrapping(ty, self.value.clone())
    }
}

impl fmt::Debug for ClearValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClearValue({}: {})", self.ty, self.value)
    }
}

impl fmt::Display for ClearValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_is_enforced() {
        assert!(ClearValue::from_u128(EncryptedType::Uint8, 255).is_ok());
        assert!(ClearValue::from_u128(EncryptedType::Uint8, 256).is_err());
        assert!(ClearValue::from_u128(EncryptedType::Bool, 2).is_err());
    }

    #[test]
    fn test_wrapping_reduces() {
        let v = ClearValue::wrapping(EncryptedType::Uint8, BigUint::from(300u32));
        assert_eq!(v.to_u128(), Some(44));
    }

    #[test]
    fn test_max_of_uint256() {
        let max = ClearValue::max(EncryptedType::Uint256);
        assert_eq!(max.to_be_bytes32(), [0xff; 32]);
        assert_eq!(max.to_u128(), None);
    }

    #[test]
    fn test_bytes32_roundtrip() {
        let v = ClearValue::from_u128(EncryptedType::Uint64, 0xdead_beef).unwrap();
        let bytes = v.to_be_bytes32();
        let recovered = ClearValue::from_be_bytes32(EncryptedType::Uint64, &bytes).unwrap();
        assert_eq!(v, recovered);
    }

    #[test]
    fn test_cast_to_bool() {
        let v = ClearValue::from_u128(EncryptedType::Uint32, 7).unwrap();
        assert!(v.cast(EncryptedType::Bool).as_bool());
        assert_eq!(ClearValue::zero(EncryptedType::Uint32).cast(EncryptedType::Bool).to_u128(), Some(0));
    }

    #[derive(Serialize)]
    struct Unchecked {
        ty: EncryptedType,
        value: BigUint,
    }

    fn cbor<T: Serialize>(value: &T) -> Vec<u8> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf).unwrap();
        buf
    }

    #[test]
    fn test_decode_enforces_range() {
        let wide = cbor(&Unchecked {
            ty: EncryptedType::Uint8,
            value: BigUint::one() << 300u32,
        });
        assert!(ciborium::from_reader::<ClearValue, _>(wide.as_slice()).is_err());

        let just_over = cbor(&Unchecked {
            ty: EncryptedType::Uint8,
            value: BigUint::from(256u32),
        });
        assert!(ciborium::from_reader::<ClearValue, _>(just_over.as_slice()).is_err());

        let fits = ClearValue::from_u128(EncryptedType::Uint8, 255).unwrap();
        let decoded: ClearValue = ciborium::from_reader(cbor(&fits).as_slice()).unwrap();
        assert_eq!(decoded, fits);
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn wrapping_stays_in_range(tag in 0u8..9, raw in proptest::collection::vec(any::<u8>(), 0..48)) {
                let ty = EncryptedType::from_tag(tag).unwrap();
                let v = ClearValue::wrapping(ty, BigUint::from_bytes_be(&raw));
                prop_assert!(v.value() < &ClearValue::modulus(ty));
                prop_assert!(ClearValue::new(ty, v.value().clone()).is_ok());
            }
        }
    }
}
