//! Proptest generators for property-based testing.

use num_bigint::BigUint;
use proptest::prelude::*;

use cloak_core::{Address, ClearValue, EncryptedType, HandleId, Keypair};

/// Generate a random keypair.
pub fn keypair() -> impl Strategy<Value = Keypair> {
    any::<[u8; 32]>().prop_map(|seed| Keypair::from_seed(&seed))
}

/// Generate a random address.
pub fn address() -> impl Strategy<Value = Address> {
    any::<[u8; 20]>().prop_map(Address::from_bytes)
}

/// Generate any supported type.
pub fn encrypted_type() -> impl Strategy<Value = EncryptedType> {
    prop::sample::select(EncryptedType::ALL.to_vec())
}

/// Types with arithmetic.
pub fn numeric_type() -> impl Strategy<Value = EncryptedType> {
    prop::sample::select(
        EncryptedType::ALL
            .into_iter()
            .filter(|ty| ty.is_numeric())
            .collect::<Vec<_>>(),
    )
}

/// A value of `ty`, biased towards the edges of its range.
pub fn clear_value(ty: EncryptedType) -> impl Strategy<Value = ClearValue> {
    prop_oneof![
        1 => Just(ClearValue::zero(ty)),
        1 => Just(ClearValue::max(ty)),
        6 => any::<[u8; 32]>()
            .prop_map(move |bytes| ClearValue::wrapping(ty, BigUint::from_bytes_be(&bytes))),
    ]
}

/// A value of any type.
pub fn typed_value() -> impl Strategy<Value = ClearValue> {
    encrypted_type().prop_flat_map(clear_value)
}

/// A computed handle of type `ty` on `chain_id`.
pub fn handle_id(chain_id: u64, ty: EncryptedType) -> impl Strategy<Value = HandleId> {
    any::<[u8; 32]>().prop_map(move |hash| {
        HandleId::compose(&hash, cloak_core::COMPUTED_INDEX, chain_id, ty)
    })
}
