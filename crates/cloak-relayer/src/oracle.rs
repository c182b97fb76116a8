//! What the service needs from the outside: a (possibly stale) view of the
//! ledger's ACL, and the key-management backend that actually decrypts.

use async_trait::async_trait;

use cloak_core::{Address, ClearValue, HandleId};

use crate::error::Result;

/// Read-only view of on-ledger permissions.
#[async_trait]
pub trait AclView: Send + Sync {
    async fn is_allowed(&self, handle: &HandleId, principal: &Address) -> Result<bool>;

    async fn is_publicly_decryptable(&self, handle: &HandleId) -> Result<bool>;

    /// Expiration of the user-decryption delegation, 0 when none was made.
    async fn delegation_expiration(
        &self,
        delegator: &Address,
        delegate: &Address,
        contract: &Address,
    ) -> Result<u64>;

    /// Ledger time, in seconds, the view reflects.
    async fn now(&self) -> Result<u64>;
}

/// Threshold decryption backend.
#[async_trait]
pub trait DecryptionOracle: Send + Sync {
    async fn decrypt(&self, handle: &HandleId) -> Result<ClearValue>;
}

#[async_trait]
impl<T: AclView + ?Sized> AclView for std::sync::Arc<T> {
    async fn is_allowed(&self, handle: &HandleId, principal: &Address) -> Result<bool> {
        (**self).is_allowed(handle, principal).await
    }

    async fn is_publicly_decryptable(&self, handle: &HandleId) -> Result<bool> {
        (**self).is_publicly_decryptable(handle).await
    }

    async fn delegation_expiration(
        &self,
        delegator: &Address,
        delegate: &Address,
        contract: &Address,
    ) -> Result<u64> {
        (**self).delegation_expiration(delegator, delegate, contract).await
    }

    async fn now(&self) -> Result<u64> {
        (**self).now().await
    }
}

#[async_trait]
impl<T: DecryptionOracle + ?Sized> DecryptionOracle for std::sync::Arc<T> {
    async fn decrypt(&self, handle: &HandleId) -> Result<ClearValue> {
        (**self).decrypt(handle).await
    }
}
