//! A confidential fungible token.
//!
//! Balances are `euint64` handles kept in the token contract's slots. The
//! token never learns amounts: a transfer subtracts with an encrypted success
//! flag and moves either the requested amount or zero, so an insufficient
//! balance is indistinguishable from a successful transfer on the ledger.
//!
//! Before any arithmetic the transfer passes the configured
//! [`TransferPipeline`]; observers named by the checks receive access to the
//! transferred amount.
//!
//! The token is a deployed contract. Its minter is the deployer recorded on
//! the ledger, so building another `ConfidentialToken` under the same name
//! yields a different contract and never a second minter.

use tracing::{debug, info};

use cloak_acl::{
    AclError, Contract, ExternalCiphertext, LedgerEvent, TransferPipeline, TransferRequest,
    TxContext,
};
use cloak_core::{Address, ClearValue, EncryptedType, HandleId};
use cloak_store::{StateView, Store};

use crate::coprocessor::Coprocessor;
use crate::error::Result;
use crate::tx::Tx;

/// Type of balances and amounts.
pub const BALANCE_TYPE: EncryptedType = EncryptedType::Uint64;

/// KDF context for balance slot keys.
const BALANCE_SLOT_CONTEXT: &str = "cloak token balance slot v1";

/// A deployed token contract and its transfer checks.
#[derive(Debug)]
pub struct ConfidentialToken {
    contract: Contract,
    pipeline: TransferPipeline,
}

impl ConfidentialToken {
    /// Deploy token `name` with no transfer checks. The executing context
    /// becomes the minter.
    pub fn deploy<S: Store, C: Coprocessor>(
        tx: &mut Tx<'_, '_, S, C>,
        name: &str,
    ) -> Result<Self> {
        let contract = tx.deploy(name)?;
        info!(token = %contract.address(), minter = %tx.caller(), name, "token deployed");
        Ok(Self {
            contract,
            pipeline: TransferPipeline::new(),
        })
    }

    /// Reconnect to token `name` that the executing context deployed.
    pub fn attach<S: Store, C: Coprocessor>(
        tx: &mut Tx<'_, '_, S, C>,
        name: &str,
    ) -> Result<Self> {
        Ok(Self {
            contract: tx.attach(name)?,
            pipeline: TransferPipeline::new(),
        })
    }

    pub fn with_pipeline(mut self, pipeline: TransferPipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    pub fn address(&self) -> Address {
        self.contract.address()
    }

    /// The minter, as recorded on the ledger at deployment.
    pub fn minter<S: StateView + ?Sized>(&self, ctx: &TxContext<'_, S>) -> Result<Address> {
        match ctx.contract_record(&self.address())? {
            Some(record) => Ok(record.deployer),
            None => Err(AclError::Unauthorized(format!("{} is not deployed", self.address())).into()),
        }
    }

    pub fn pipeline(&self) -> &TransferPipeline {
        &self.pipeline
    }

    pub fn pipeline_mut(&mut self) -> &mut TransferPipeline {
        &mut self.pipeline
    }

    /// Balance handle of `holder`, if it ever held tokens.
    pub fn balance_of<S: Store, C: Coprocessor>(
        &self,
        tx: &Tx<'_, '_, S, C>,
        holder: &Address,
    ) -> Result<Option<HandleId>> {
        Ok(tx.load_slot(&self.address(), &balance_key(holder))?)
    }

    /// Mint a public amount to `to`. Only the minter may call this.
    pub fn mint<S: Store, C: Coprocessor>(
        &self,
        tx: &mut Tx<'_, '_, S, C>,
        to: Address,
        amount: u64,
    ) -> Result<HandleId> {
        let minter = self.minter(&**tx)?;
        if tx.caller() != minter {
            return Err(AclError::Unauthorized(format!(
                "{} is not the minter of {}",
                tx.caller(),
                self.address()
            ))
            .into());
        }

        tx.call(&self.contract, |tx| {
            let minted = tx.trivial_encrypt(ClearValue::from_u128(BALANCE_TYPE, amount.into())?)?;
            let balance = match self.balance_of(tx, &to)? {
                Some(current) => tx.add(current, minted)?,
                None => minted,
            };
            self.store_balance(tx, to, balance)?;

            tx.allow_this(&minted)?;
            tx.allow(&minted, to)?;
            tx.emit(LedgerEvent::ConfidentialTransfer {
                token: self.address(),
                from: Address::ZERO,
                to,
                amount: minted,
            });
            Ok(minted)
        })
    }

    /// Move `amount` from the caller to `to`. The caller must be allowed on
    /// `amount`. Returns the handle of the amount actually moved.
    pub fn confidential_transfer<S: Store, C: Coprocessor>(
        &self,
        tx: &mut Tx<'_, '_, S, C>,
        to: Address,
        amount: HandleId,
    ) -> Result<HandleId> {
        let from = tx.caller();
        tx.require_allowed(&amount)?;
        tx.allow_transient(&amount, self.address())?;
        self.transfer(tx, from, to, from, amount)
    }

    /// Like [`confidential_transfer`](Self::confidential_transfer), with the
    /// amount submitted as a proven input for this token.
    pub fn confidential_transfer_input<S: Store, C: Coprocessor>(
        &self,
        tx: &mut Tx<'_, '_, S, C>,
        to: Address,
        ciphertext: &ExternalCiphertext,
        proof: &[u8],
    ) -> Result<HandleId> {
        let from = tx.caller();
        let amount = tx.call(&self.contract, |tx| tx.from_external(ciphertext, proof, from))?;
        self.transfer(tx, from, to, from, amount)
    }

    /// Move `amount` out of `from` on its behalf. The caller must be `from`
    /// or a live operator of it, and must be allowed on `amount`.
    pub fn confidential_transfer_from<S: Store, C: Coprocessor>(
        &self,
        tx: &mut Tx<'_, '_, S, C>,
        from: Address,
        to: Address,
        amount: HandleId,
    ) -> Result<HandleId> {
        let spender = tx.caller();
        tx.ensure_operator(&from, &spender)?;
        tx.require_allowed(&amount)?;
        tx.allow_transient(&amount, self.address())?;
        self.transfer(tx, from, to, spender, amount)
    }

    /// The token must already be allowed on `amount`.
    fn transfer<S: Store, C: Coprocessor>(
        &self,
        tx: &mut Tx<'_, '_, S, C>,
        from: Address,
        to: Address,
        spender: Address,
        amount: HandleId,
    ) -> Result<HandleId> {
        if to == Address::ZERO {
            return Err(AclError::TransferBlocked {
                check: "receiver".into(),
                reason: "transfer to the zero address".into(),
            }
            .into());
        }
        let report = self.pipeline.run(&TransferRequest {
            token: self.address(),
            from,
            to,
            spender,
        })?;

        tx.call(&self.contract, |tx| {
            let zero = tx.trivial_encrypt(ClearValue::zero(BALANCE_TYPE))?;

            let from_balance = self.balance_of(tx, &from)?.unwrap_or(zero);
            let (success, new_from) = tx.try_sub(from_balance, amount)?;
            let transferred = tx.select(success, amount, zero)?;
            self.store_balance(tx, from, new_from)?;

            // read after the debit so a self-transfer sees it
            let to_balance = self.balance_of(tx, &to)?.unwrap_or(zero);
            let new_to = tx.add(to_balance, transferred)?;
            self.store_balance(tx, to, new_to)?;

            tx.allow_this(&transferred)?;
            tx.allow(&transferred, from)?;
            tx.allow(&transferred, to)?;
            for observer in &report.observers {
                tx.allow(&transferred, *observer)?;
            }
            tx.allow_transient(&transferred, spender)?;

            debug!(
                token = %self.address(),
                %from,
                %to,
                checks = report.evaluated.len(),
                "confidential transfer"
            );
            tx.emit(LedgerEvent::ConfidentialTransfer {
                token: self.address(),
                from,
                to,
                amount: transferred,
            });
            Ok(transferred)
        })
    }

    fn store_balance<S: Store, C: Coprocessor>(
        &self,
        tx: &mut Tx<'_, '_, S, C>,
        holder: Address,
        balance: HandleId,
    ) -> Result<()> {
        tx.store_slot(balance_key(&holder), balance)?;
        tx.allow_this(&balance)?;
        tx.allow(&balance, holder)?;
        Ok(())
    }
}

fn balance_key(holder: &Address) -> [u8; 32] {
    blake3::derive_key(BALANCE_SLOT_CONTEXT, holder.as_bytes())
}
