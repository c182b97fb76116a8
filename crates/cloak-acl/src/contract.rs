//! Deployed contracts and calls into them.
//!
//! A contract's address is derived from its deployer and name, and the
//! deployment is recorded on the ledger. The [`Contract`] returned by
//! [`TxContext::deploy`] is the only way to execute as that address: it
//! cannot be built from a bare address, and every call checks the
//! deployment record before switching the executing context. User addresses
//! are never deployed, so no call can execute as a user.
//!
//! Attaching needs a running transaction: read-only views may be evaluated
//! as any principal and must not hand out capabilities.

use tracing::{info, trace};

use cloak_core::Address;
use cloak_store::{ContractRecord, StateView};

use crate::context::TxContext;
use crate::error::{AclError, Result};
use crate::events::LedgerEvent;

/// Capability to execute as a deployed contract.
#[derive(Debug, PartialEq, Eq)]
pub struct Contract {
    address: Address,
}

impl Contract {
    pub fn address(&self) -> Address {
        self.address
    }
}

impl<S: StateView + ?Sized> TxContext<'_, S> {
    /// Deploy contract `name` with the executing context as deployer.
    pub fn deploy(&mut self, name: &str) -> Result<Contract> {
        self.ensure_live()?;
        let deployer = self.caller();
        let address = Address::deployed(&deployer, name);
        if self.view().get_contract(&address)?.is_some() {
            return Err(AclError::Unauthorized(format!(
                "{deployer} already deployed {name}"
            )));
        }

        let record = ContractRecord {
            address,
            deployer,
            name: name.to_string(),
            deployed_at: self.block_time(),
            tx_id: self.tx_id(),
        };
        self.changes.contracts.insert(address, record);

        info!(%address, %deployer, name, "contract deployed");
        self.emit(LedgerEvent::ContractDeployed {
            address,
            deployer,
            name: name.to_string(),
        });
        Ok(Contract { address })
    }

    /// Recover the capability for a contract the executing context deployed
    /// earlier.
    pub fn attach(&mut self, name: &str) -> Result<Contract> {
        self.ensure_live()?;
        let deployer = self.caller();
        let address = Address::deployed(&deployer, name);
        match self.view().get_contract(&address)? {
            Some(_) => Ok(Contract { address }),
            None => Err(AclError::Unauthorized(format!(
                "{deployer} has not deployed {name}"
            ))),
        }
    }

    /// Deployment record of `address`; `None` for anything not deployed.
    pub fn contract_record(&self, address: &Address) -> Result<Option<ContractRecord>> {
        Ok(self.view().get_contract(address)?)
    }

    /// Run `f` as `contract`, then restore the previous caller whether or
    /// not `f` succeeded.
    pub fn call<T, E: From<AclError>>(
        &mut self,
        contract: &Contract,
        f: impl FnOnce(&mut Self) -> std::result::Result<T, E>,
    ) -> std::result::Result<T, E> {
        self.require_deployed(contract)?;
        let previous = self.switch_caller(contract.address);
        trace!(from = %previous, to = %contract.address, "enter call");
        let result = f(self);
        self.switch_caller(previous);
        result
    }

    fn require_deployed(&self, contract: &Contract) -> Result<()> {
        self.ensure_live()?;
        if self.view().get_contract(&contract.address)?.is_none() {
            return Err(AclError::Unauthorized(format!(
                "{} is not a deployed contract",
                contract.address
            )));
        }
        Ok(())
    }
}
