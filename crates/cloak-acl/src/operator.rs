//! Operator ledger and user-decryption delegations.
//!
//! An operator grant `(holder, operator, until)` lets `operator` move the
//! holder's confidential balances while `until > now`. A delegation
//! `(delegator, delegate, contract, expiration)` lets `delegate` request user
//! decryption of the delegator's handles under `contract`. Both are plain
//! relation rows; validity is a function of block time and stored expiry.

use tracing::debug;

use cloak_core::Address;
use cloak_store::StateView;

use crate::context::TxContext;
use crate::error::{AclError, Result};
use crate::events::LedgerEvent;

impl<S: StateView + ?Sized> TxContext<'_, S> {
    /// Upsert an operator grant. `until <= now` revokes.
    pub fn set_operator(&mut self, holder: Address, operator: Address, until: u64) -> Result<()> {
        self.ensure_live()?;
        if holder != self.caller() {
            return Err(AclError::Unauthorized(format!(
                "{} cannot set operators for {holder}",
                self.caller()
            )));
        }
        self.changes.operators.insert((holder, operator), until);
        debug!(%holder, %operator, until, "operator set");
        self.emit(LedgerEvent::OperatorSet {
            holder,
            operator,
            until,
        });
        Ok(())
    }

    /// Whether `operator` currently acts for `holder`.
    pub fn is_operator(&self, holder: &Address, operator: &Address) -> Result<bool> {
        Ok(self
            .view()
            .get_operator(holder, operator)?
            .is_some_and(|until| until > self.block_time()))
    }

    /// Pass if `acting` is `owner` or a live operator for it.
    pub fn ensure_operator(&self, owner: &Address, acting: &Address) -> Result<()> {
        if owner == acting {
            return Ok(());
        }
        match self.view().get_operator(owner, acting)? {
            None => Err(AclError::OperatorNotSet {
                holder: *owner,
                operator: *acting,
            }),
            Some(until) if until <= self.block_time() => Err(AclError::OperatorExpired {
                holder: *owner,
                operator: *acting,
                until,
            }),
            Some(_) => Ok(()),
        }
    }

    /// Let `delegate` request user decryption of the caller's handles under
    /// `contract` until `expiration`.
    pub fn delegate_for_user_decryption(
        &mut self,
        delegate: Address,
        contract: Address,
        expiration: u64,
    ) -> Result<()> {
        self.ensure_live()?;
        let delegator = self.caller();
        if delegate == delegator {
            return Err(AclError::InvalidDelegation("delegate is the sender".into()));
        }
        if contract == delegator {
            return Err(AclError::InvalidDelegation("contract is the sender".into()));
        }
        if expiration <= self.block_time() {
            return Err(AclError::InvalidDelegation(format!(
                "expiration {expiration} is not in the future"
            )));
        }
        self.write_delegation(delegator, delegate, contract, expiration);
        Ok(())
    }

    /// Revoke a live delegation made by the caller.
    pub fn revoke_delegation_for_user_decryption(
        &mut self,
        delegate: Address,
        contract: Address,
    ) -> Result<()> {
        self.ensure_live()?;
        let delegator = self.caller();
        if !self.is_delegated_for_user_decryption(&delegator, &delegate, &contract)? {
            return Err(AclError::InvalidDelegation("no live delegation".into()));
        }
        self.write_delegation(delegator, delegate, contract, 0);
        Ok(())
    }

    fn write_delegation(
        &mut self,
        delegator: Address,
        delegate: Address,
        contract: Address,
        expiration: u64,
    ) {
        self.changes
            .delegations
            .insert((delegator, delegate, contract), expiration);
        debug!(%delegator, %delegate, %contract, expiration, "user decryption delegation");
        self.emit(LedgerEvent::DelegatedForUserDecryption {
            delegator,
            delegate,
            contract,
            expiration,
        });
    }

    /// Whether the delegation is live at the current block time.
    pub fn is_delegated_for_user_decryption(
        &self,
        delegator: &Address,
        delegate: &Address,
        contract: &Address,
    ) -> Result<bool> {
        Ok(self
            .user_decryption_delegation_expiration(delegator, delegate, contract)?
            .is_some_and(|exp| exp > self.block_time()))
    }

    /// Stored expiration of a delegation, live or not.
    pub fn user_decryption_delegation_expiration(
        &self,
        delegator: &Address,
        delegate: &Address,
        contract: &Address,
    ) -> Result<Option<u64>> {
        Ok(self.view().get_delegation(delegator, delegate, contract)?)
    }
}
