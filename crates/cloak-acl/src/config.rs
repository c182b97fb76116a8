//! Permission-layer configuration.

use serde::{Deserialize, Serialize};

use cloak_core::{Address, Ed25519PublicKey};

use crate::budget::HcuLimits;
use crate::error::{AclError, Result};

/// Trusted parties, thresholds and budgets of the permission layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AclConfig {
    /// Chain this ledger runs on; embedded in every handle.
    pub chain_id: u64,
    /// Co-processor keys that sign input proofs.
    pub input_signers: Vec<Ed25519PublicKey>,
    /// Distinct valid input signatures required.
    pub input_threshold: usize,
    /// KMS keys that attest public decryptions.
    pub kms_signers: Vec<Ed25519PublicKey>,
    /// Distinct valid KMS signatures required.
    pub kms_threshold: usize,
    /// Only principal allowed to finalize disclosures.
    pub decryption_authority: Address,
    /// Verifying contract of decryption typed messages.
    pub decryption_contract: Address,
    pub hcu: HcuLimits,
}

impl Default for AclConfig {
    fn default() -> Self {
        Self {
            chain_id: 9000,
            input_signers: Vec::new(),
            input_threshold: 1,
            kms_signers: Vec::new(),
            kms_threshold: 1,
            decryption_authority: Address::contract("decryption-oracle"),
            decryption_contract: Address::contract("decryption"),
            hcu: HcuLimits::default(),
        }
    }
}

impl AclConfig {
    /// Thresholds must be reachable and non-zero; budgets must be non-zero.
    pub fn validate(&self) -> Result<()> {
        if self.input_threshold == 0 || self.input_threshold > self.input_signers.len() {
            return Err(AclError::InvalidConfig(format!(
                "input threshold {} with {} signers",
                self.input_threshold,
                self.input_signers.len()
            )));
        }
        if self.kms_threshold == 0 || self.kms_threshold > self.kms_signers.len() {
            return Err(AclError::InvalidConfig(format!(
                "kms threshold {} with {} signers",
                self.kms_threshold,
                self.kms_signers.len()
            )));
        }
        if self.hcu.global_limit == 0 || self.hcu.depth_limit == 0 {
            return Err(AclError::InvalidConfig("HCU limits must be non-zero".into()));
        }
        Ok(())
    }
}
