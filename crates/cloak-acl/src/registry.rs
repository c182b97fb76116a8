//! Handle registry: creation and metadata of handles.
//!
//! Handles are registered with their owning contract and never removed.
//! Registration grants nothing; permissions are added explicitly.

use tracing::debug;

use cloak_core::{Address, EncryptedType, FheOp, HandleId, COMPUTED_INDEX};
use cloak_store::{HandleOrigin, HandleRecord, StateView};

use crate::context::TxContext;
use crate::error::{AclError, Result};
use crate::events::LedgerEvent;

/// KDF context for computed handle hashes.
const HANDLE_CONTEXT: &str = "cloak computed handle v1";

impl<S: StateView + ?Sized> TxContext<'_, S> {
    /// Register a new handle owned by `owner`, with no permissions.
    pub fn create(
        &mut self,
        owner: Address,
        ty: EncryptedType,
        origin: HandleOrigin,
    ) -> Result<HandleId> {
        self.create_derived(owner, ty, origin, &[])
    }

    /// Register a new handle whose id also commits to `seed` (the operator and
    /// operands of a computation).
    pub fn create_derived(
        &mut self,
        owner: Address,
        ty: EncryptedType,
        origin: HandleOrigin,
        seed: &[u8],
    ) -> Result<HandleId> {
        let nonce = self.next_nonce();

        let mut hasher = blake3::Hasher::new_derive_key(HANDLE_CONTEXT);
        hasher.update(&[origin.to_u8(), ty.tag()]);
        hasher.update(owner.as_bytes());
        hasher.update(&self.tx_id().to_be_bytes());
        hasher.update(&nonce.to_be_bytes());
        hasher.update(seed);
        let hash = *hasher.finalize().as_bytes();

        let handle = HandleId::compose(&hash, COMPUTED_INDEX, self.chain_id(), ty);
        self.register(handle, owner, origin)?;
        Ok(handle)
    }

    /// Register an externally derived handle id. Returns the existing record
    /// if the handle is already known.
    pub(crate) fn register(
        &mut self,
        handle: HandleId,
        owner: Address,
        origin: HandleOrigin,
    ) -> Result<HandleRecord> {
        self.ensure_live()?;
        if let Some(existing) = self.view().get_handle(&handle)? {
            return Ok(existing);
        }

        let ty = handle.encrypted_type()?;
        let record = HandleRecord {
            handle,
            ty,
            owner,
            origin,
            created_at: self.block_time(),
            tx_id: self.tx_id(),
        };
        self.changes.handles.insert(handle, record.clone());

        debug!(%handle, %owner, %ty, ?origin, "handle registered");
        self.emit(LedgerEvent::HandleCreated {
            handle,
            owner,
            ty,
            origin,
        });
        Ok(record)
    }

    /// Register the result of `op` over `operands`: every operand must be
    /// allowed to the executing context, `op` is charged at type `ty`, and
    /// the result is owned by and transiently allowed to the executing
    /// context. `extra` is mixed into the handle id (the plaintext of a
    /// trivial encryption).
    pub fn produce(
        &mut self,
        op: FheOp,
        ty: EncryptedType,
        operands: &[HandleId],
        result_ty: EncryptedType,
        extra: &[u8],
    ) -> Result<HandleId> {
        self.ensure_live()?;
        for operand in operands {
            self.require_allowed(operand)?;
        }
        let depth = self.charge(op, ty, operands)?;

        let mut seed = Vec::with_capacity(op.name().len() + 32 * operands.len() + extra.len());
        seed.extend_from_slice(op.name().as_bytes());
        for operand in operands {
            seed.extend_from_slice(operand.as_bytes());
        }
        seed.extend_from_slice(extra);

        let origin = match op {
            FheOp::TrivialEncrypt => HandleOrigin::Trivial,
            _ => HandleOrigin::Computed,
        };
        let owner = self.caller();
        let handle = self.create_derived(owner, result_ty, origin, &seed)?;
        self.meter.record(handle, depth);
        self.grant_result(handle, owner);
        Ok(handle)
    }

    /// Registry metadata of a handle.
    pub fn metadata(&self, handle: &HandleId) -> Result<HandleRecord> {
        self.view()
            .get_handle(handle)?
            .ok_or(AclError::HandleNotFound(*handle))
    }

    /// Whether the handle is registered.
    pub fn handle_exists(&self, handle: &HandleId) -> Result<bool> {
        Ok(self.view().get_handle(handle)?.is_some())
    }

    /// Handle stored under `key` by `contract`.
    pub fn load_slot(&self, contract: &Address, key: &[u8; 32]) -> Result<Option<HandleId>> {
        Ok(self.view().get_slot(contract, key)?)
    }

    /// Store a registered handle under `key` in the executing contract's
    /// slots. Storing grants nothing.
    pub fn store_slot(&mut self, key: [u8; 32], handle: HandleId) -> Result<()> {
        self.ensure_live()?;
        self.metadata(&handle)?;
        let contract = self.caller();
        self.changes.slots.insert((contract, key), handle);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::budget::op_cost;
    use crate::testing::Harness;
    use cloak_core::{Address, EncryptedType, FheOp};
    use cloak_store::HandleOrigin;

    #[test]
    fn test_create_registers_without_grants() {
        let h = Harness::new();
        let token = Address::contract("token");
        let mut tx = h.tx(token);

        let handle = tx
            .create(token, EncryptedType::Uint64, HandleOrigin::Trivial)
            .unwrap();

        let meta = tx.metadata(&handle).unwrap();
        assert_eq!(meta.owner, token);
        assert_eq!(meta.ty, EncryptedType::Uint64);
        assert_eq!(meta.origin, HandleOrigin::Trivial);
        assert!(handle.is_computed());
        assert_eq!(handle.chain_id(), h.config.chain_id);
        assert!(!tx.is_allowed(&handle, &token).unwrap());
    }

    #[test]
    fn test_handles_are_unique_within_tx() {
        let h = Harness::new();
        let token = Address::contract("token");
        let mut tx = h.tx(token);

        let a = tx.create(token, EncryptedType::Bool, HandleOrigin::Computed).unwrap();
        let b = tx.create(token, EncryptedType::Bool, HandleOrigin::Computed).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_produced_result_is_charged_and_transiently_allowed() {
        let h = Harness::new();
        let token = Address::contract("token");
        let mut tx = h.tx(token);

        let a = tx
            .produce(FheOp::TrivialEncrypt, EncryptedType::Uint8, &[], EncryptedType::Uint8, &[1])
            .unwrap();
        let trivial_cost = op_cost(FheOp::TrivialEncrypt, EncryptedType::Uint8);
        assert_eq!(tx.metadata(&a).unwrap().origin, HandleOrigin::Trivial);
        assert_eq!(tx.depth_of(&a), trivial_cost);

        let sum = tx
            .produce(FheOp::Add, EncryptedType::Uint8, &[a, a], EncryptedType::Uint8, &[])
            .unwrap();
        assert!(tx.is_sender_allowed(&sum).unwrap());
        assert!(!tx.persist_allowed(&sum, &token).unwrap());
        assert_eq!(tx.metadata(&sum).unwrap().origin, HandleOrigin::Computed);
        let add_cost = op_cost(FheOp::Add, EncryptedType::Uint8);
        assert_eq!(tx.depth_of(&sum), trivial_cost + add_cost);
        assert_eq!(tx.hcu_used(), trivial_cost + add_cost);
    }

    #[test]
    fn test_produce_requires_allowed_operands() {
        let h = Harness::new();
        let token = Address::contract("token");
        let mallory = Address::contract("mallory");

        let mut tx = h.tx(token);
        let secret = tx
            .create(token, EncryptedType::Uint64, HandleOrigin::Trivial)
            .unwrap();
        h.commit(tx);

        let mut tx = h.tx(mallory);
        let err = tx
            .produce(FheOp::Neg, EncryptedType::Uint64, &[secret], EncryptedType::Uint64, &[])
            .unwrap_err();
        assert_eq!(err.reason_code(), "ACLDenied");
        assert_eq!(tx.hcu_used(), 0);
        assert!(tx.into_effects().is_err());
    }

    #[test]
    fn test_unknown_handle_metadata() {
        let h = Harness::new();
        let tx = h.tx(Address::contract("token"));
        let missing = cloak_core::HandleId::compose(&[9; 32], 0, 1, EncryptedType::Uint8);
        assert_eq!(
            tx.metadata(&missing).unwrap_err().reason_code(),
            "HandleNotFound"
        );
    }

    #[test]
    fn test_slots_are_per_contract() {
        let h = Harness::new();
        let token = Address::contract("token");
        let other = Address::contract("other");
        let mut tx = h.tx(token);
        let handle = tx
            .create(token, EncryptedType::Uint64, HandleOrigin::Trivial)
            .unwrap();
        tx.store_slot([1; 32], handle).unwrap();
        assert_eq!(tx.load_slot(&token, &[1; 32]).unwrap(), Some(handle));
        assert_eq!(tx.load_slot(&other, &[1; 32]).unwrap(), None);
        h.commit(tx);

        let tx = h.tx(other);
        assert_eq!(tx.load_slot(&token, &[1; 32]).unwrap(), Some(handle));
    }

    #[test]
    fn test_store_slot_rejects_unknown_handle() {
        let h = Harness::new();
        let mut tx = h.tx(Address::contract("token"));
        let unknown = cloak_core::HandleId::compose(&[7; 32], 0xff, 9000, EncryptedType::Uint8);
        assert!(tx.store_slot([0; 32], unknown).is_err());
    }
}
