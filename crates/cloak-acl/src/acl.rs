//! ACL store: who may use a handle.
//!
//! A principal is allowed on a handle when it holds a permanent grant, a
//! transient grant created earlier in the same transaction, or when the
//! handle is publicly decryptable. Permanent grants and public flags only
//! ever get added.
//!
//! Grant authority: the executing context may grant on a handle only if it
//! owns the handle or is itself allowed on it. A denial aborts the
//! transaction.

use serde::{Deserialize, Serialize};
use tracing::debug;

use cloak_core::{Address, HandleId};
use cloak_store::StateView;

use crate::context::TxContext;
use crate::error::{AclError, Result};
use crate::events::LedgerEvent;

/// Scope of a permission grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GrantScope {
    /// Persists across transactions.
    Permanent,
    /// Valid until the end of the creating transaction.
    Transient,
    /// Anyone may request decryption. Monotonic.
    PublicDecrypt,
}

impl<S: StateView + ?Sized> TxContext<'_, S> {
    /// Fail with `HandleNotFound` or `ACLDenied` unless the caller may grant
    /// on `handle`.
    fn require_grant_authority(&self, handle: &HandleId) -> Result<()> {
        self.ensure_live()?;
        let record = self.metadata(handle)?;
        let caller = self.caller();
        if record.owner == caller || self.is_allowed(handle, &caller)? {
            return Ok(());
        }
        Err(self.abort(AclError::AclDenied {
            handle: *handle,
            principal: caller,
        }))
    }

    /// Add a permanent grant.
    pub fn allow(&mut self, handle: &HandleId, principal: Address) -> Result<()> {
        self.require_grant_authority(handle)?;
        if self.view().has_permanent_grant(handle, &principal)? {
            return Ok(());
        }
        self.changes.grants.insert((*handle, principal));
        debug!(%handle, %principal, by = %self.caller(), "allow");
        self.emit(LedgerEvent::Allowed {
            handle: *handle,
            principal,
        });
        Ok(())
    }

    /// Add a grant that lapses when this transaction ends.
    pub fn allow_transient(&mut self, handle: &HandleId, principal: Address) -> Result<()> {
        self.require_grant_authority(handle)?;
        self.transient.insert((*handle, principal));
        Ok(())
    }

    /// Permanent grant to the executing context itself.
    pub fn allow_this(&mut self, handle: &HandleId) -> Result<()> {
        let caller = self.caller();
        self.allow(handle, caller)
    }

    /// Flag the handle publicly decryptable. Cannot be undone.
    pub fn make_publicly_decryptable(&mut self, handle: &HandleId) -> Result<()> {
        self.require_grant_authority(handle)?;
        if self.view().is_public(handle)? {
            return Ok(());
        }
        self.changes.public.insert(*handle);
        debug!(%handle, by = %self.caller(), "public decrypt enabled");
        self.emit(LedgerEvent::PublicDecryptEnabled { handle: *handle });
        Ok(())
    }

    /// Dispatch a grant by scope. `principal` is ignored for public decrypt.
    pub fn grant(&mut self, handle: &HandleId, principal: Address, scope: GrantScope) -> Result<()> {
        match scope {
            GrantScope::Permanent => self.allow(handle, principal),
            GrantScope::Transient => self.allow_transient(handle, principal),
            GrantScope::PublicDecrypt => self.make_publicly_decryptable(handle),
        }
    }

    /// Batch form of [`make_publicly_decryptable`](Self::make_publicly_decryptable).
    pub fn allow_for_decryption(&mut self, handles: &[HandleId]) -> Result<()> {
        for handle in handles {
            self.make_publicly_decryptable(handle)?;
        }
        Ok(())
    }

    /// Whether `principal` may use `handle` in this transaction.
    pub fn is_allowed(&self, handle: &HandleId, principal: &Address) -> Result<bool> {
        if self.transient.contains(&(*handle, *principal)) {
            return Ok(true);
        }
        let view = self.view();
        Ok(view.has_permanent_grant(handle, principal)? || view.is_public(handle)?)
    }

    /// Whether the executing context may use `handle`.
    pub fn is_sender_allowed(&self, handle: &HandleId) -> Result<bool> {
        self.is_allowed(handle, &self.caller())
    }

    /// Whether `principal` holds a permanent grant.
    pub fn persist_allowed(&self, handle: &HandleId, principal: &Address) -> Result<bool> {
        Ok(self.view().has_permanent_grant(handle, principal)?)
    }

    pub fn is_publicly_decryptable(&self, handle: &HandleId) -> Result<bool> {
        Ok(self.view().is_public(handle)?)
    }

    /// Principals holding a permanent grant, sorted.
    pub fn allowed_principals(&self, handle: &HandleId) -> Result<Vec<Address>> {
        Ok(self.view().grants_for(handle)?)
    }

    /// Fail with `ACLDenied` unless the executing context may use `handle`.
    pub fn require_allowed(&self, handle: &HandleId) -> Result<()> {
        self.require_allowed_for(handle, &self.caller())
    }

    /// Fail with `ACLDenied` unless `principal` may use `handle`.
    pub fn require_allowed_for(&self, handle: &HandleId, principal: &Address) -> Result<()> {
        self.ensure_live()?;
        if self.is_allowed(handle, principal)? {
            Ok(())
        } else {
            Err(self.abort(AclError::AclDenied {
                handle: *handle,
                principal: *principal,
            }))
        }
    }

    /// Transient grant of a freshly produced handle to its producer.
    pub(crate) fn grant_result(&mut self, handle: HandleId, producer: Address) {
        self.transient.insert((handle, producer));
    }
}
