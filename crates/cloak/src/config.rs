//! Ledger configuration.

use serde::{Deserialize, Serialize};

use cloak_acl::AclConfig;
use cloak_relayer::RelayerConfig;

use crate::error::{LedgerError, Result};

/// Everything needed to open a ledger.
///
/// The permission-layer fields are flattened, so a JSON config reads
/// `{"chain_id": 9000, "hcu": {"global_limit": ...}, "genesis_time": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    #[serde(flatten)]
    pub acl: AclConfig,
    /// Block time of the first transaction, in seconds.
    pub genesis_time: u64,
    /// Client-side timeout for decryption requests.
    pub relayer_timeout_ms: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            acl: AclConfig::default(),
            genesis_time: 1_700_000_000,
            relayer_timeout_ms: 30_000,
        }
    }
}

impl LedgerConfig {
    /// Parse a JSON configuration. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| LedgerError::Config(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| LedgerError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        self.acl.validate()?;
        if self.relayer_timeout_ms == 0 {
            return Err(LedgerError::Config("relayer timeout must be non-zero".into()));
        }
        Ok(())
    }

    /// Settings the decryption service and its clients share with this ledger.
    pub fn relayer_config(&self) -> RelayerConfig {
        RelayerConfig {
            chain_id: self.acl.chain_id,
            verifying_contract: self.acl.decryption_contract,
            request_timeout_ms: self.relayer_timeout_ms,
        }
    }
}
