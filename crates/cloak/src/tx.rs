//! The handle a transaction body works through.
//!
//! [`Tx`] pairs the permission-layer [`TxContext`] with the co-processor. It
//! dereferences to the context, so every ACL, operator and disclosure
//! operation is available directly; the computation operators live in
//! [`crate::fhe`].

use std::ops::{Deref, DerefMut};

use tracing::debug;

use cloak_acl::{Contract, ExternalCiphertext, TxContext};
use cloak_core::{Address, HandleId};
use cloak_store::Store;

use crate::coprocessor::Coprocessor;
use crate::error::Result;

/// A running transaction.
pub struct Tx<'a, 'l, S: Store, C: Coprocessor> {
    ctx: &'a mut TxContext<'l, S>,
    coprocessor: &'l C,
}

impl<'a, 'l, S: Store, C: Coprocessor> Tx<'a, 'l, S, C> {
    pub(crate) fn new(ctx: &'a mut TxContext<'l, S>, coprocessor: &'l C) -> Self {
        Self { ctx, coprocessor }
    }

    pub(crate) fn coprocessor(&self) -> &'l C {
        self.coprocessor
    }

    /// Run `f` as the deployed `contract`, restoring the caller after.
    pub fn call<T>(
        &mut self,
        contract: &Contract,
        f: impl FnOnce(&mut Tx<'_, 'l, S, C>) -> Result<T>,
    ) -> Result<T> {
        let coprocessor = self.coprocessor;
        self.ctx.call(contract, |ctx| f(&mut Tx { ctx, coprocessor }))
    }

    /// Admit a proven input for the executing contract and hand its
    /// ciphertext to the co-processor. The contract gets a transient grant.
    pub fn from_external(
        &mut self,
        ciphertext: &ExternalCiphertext,
        proof: &[u8],
        user: Address,
    ) -> Result<HandleId> {
        let handle = self.ctx.from_external(ciphertext, proof, user)?;
        self.accept(ciphertext)?;
        Ok(handle)
    }

    /// Batch form of [`from_external`](Self::from_external) for ciphertexts
    /// certified by one proof.
    pub fn from_external_batch(
        &mut self,
        ciphertexts: &[ExternalCiphertext],
        proof: &[u8],
        user: Address,
    ) -> Result<Vec<HandleId>> {
        let target = self.ctx.caller();
        let handles = self.ctx.admit_batch(ciphertexts, proof, target, user)?;
        for ciphertext in ciphertexts {
            self.accept(ciphertext)?;
        }
        Ok(handles)
    }

    fn accept(&mut self, ciphertext: &ExternalCiphertext) -> Result<()> {
        self.coprocessor.accept_input(ciphertext)?;
        let caller = self.ctx.caller();
        self.ctx.allow_transient(&ciphertext.handle, caller)?;
        debug!(handle = %ciphertext.handle, contract = %caller, "input ready");
        Ok(())
    }
}

impl<'l, S: Store, C: Coprocessor> Deref for Tx<'_, 'l, S, C> {
    type Target = TxContext<'l, S>;

    fn deref(&self) -> &Self::Target {
        &*self.ctx
    }
}

impl<S: Store, C: Coprocessor> DerefMut for Tx<'_, '_, S, C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.ctx
    }
}
