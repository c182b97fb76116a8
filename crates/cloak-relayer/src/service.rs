//! The decryption authorization service.
//!
//! User decryption: window and size checks, signature check, contract list
//! check, then an ACL re-check against the ledger for every handle (the user,
//! or the delegator under a live delegation, and the contract must both be
//! allowed). Values are re-encrypted to the request key.
//!
//! Public decryption: every handle must be publicly decryptable. Values are
//! returned in a KMS-signed [`DecryptionProof`].

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use cloak_core::{Address, DecryptionProof, HandleId, Keypair};

use crate::error::{RelayerError, Result};
use crate::messages::{limits, RelayerMessage, UserDecryptRequest};
use crate::oracle::{AclView, DecryptionOracle};
use crate::reencrypt::SealedValue;
use crate::transport::Transport;

/// Settings shared by the service and its clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayerConfig {
    pub chain_id: u64,
    /// Verifying contract of authorization messages and KMS attestations.
    pub verifying_contract: Address,
    /// How long a client waits for a response.
    pub request_timeout_ms: u64,
}

impl Default for RelayerConfig {
    fn default() -> Self {
        Self {
            chain_id: 9000,
            verifying_contract: Address::contract("decryption"),
            request_timeout_ms: 30_000,
        }
    }
}

impl RelayerConfig {
    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.request_timeout_ms)
    }
}

/// Authorizes and serves decryption requests.
pub struct DecryptionService<A: AclView, O: DecryptionOracle> {
    config: RelayerConfig,
    acl: A,
    oracle: O,
    kms: Vec<Keypair>,
}

impl<A: AclView, O: DecryptionOracle> DecryptionService<A, O> {
    /// `kms` signs public decryption attestations.
    pub fn new(config: RelayerConfig, acl: A, oracle: O, kms: Vec<Keypair>) -> Self {
        Self {
            config,
            acl,
            oracle,
            kms,
        }
    }

    pub fn config(&self) -> &RelayerConfig {
        &self.config
    }

    /// Authorize a user decryption and seal each value to the request key.
    pub async fn user_decrypt(&self, request: &UserDecryptRequest) -> Result<Vec<SealedValue>> {
        let message = &request.message;
        if message.contract_addresses.is_empty() {
            return Err(RelayerError::InvalidRequest("no contract addresses".into()));
        }
        if request.pairs.is_empty() {
            return Err(RelayerError::InvalidRequest("no handles".into()));
        }
        RelayerMessage::UserDecrypt {
            request_id: 0,
            request: request.clone(),
        }
        .validate_limits()?;

        let now = self.acl.now().await?;
        message.window().check(now)?;
        request.verify_signature(self.config.chain_id, self.config.verifying_contract)?;

        let user = request.user();
        for contract in &message.contract_addresses {
            if *contract == user {
                return Err(RelayerError::ContractIsUser(*contract));
            }
            if Some(*contract) == message.delegator {
                return Err(RelayerError::InvalidRequest(format!(
                    "contract {contract} equals the delegator"
                )));
            }
        }

        for pair in &request.pairs {
            if !message.contract_addresses.contains(&pair.contract) {
                return Err(RelayerError::ContractNotListed(pair.contract));
            }
            if pair.handle.chain_id() != self.config.chain_id {
                return Err(RelayerError::InvalidRequest(format!(
                    "{} belongs to chain {}",
                    pair.handle,
                    pair.handle.chain_id()
                )));
            }

            let principal = match message.delegator {
                None => user,
                Some(delegator) => {
                    let expiration = self
                        .acl
                        .delegation_expiration(&delegator, &user, &pair.contract)
                        .await?;
                    if expiration <= now {
                        return Err(RelayerError::DelegationMissing {
                            delegator,
                            delegate: user,
                            contract: pair.contract,
                        });
                    }
                    delegator
                }
            };
            self.require_allowed(&pair.handle, &principal).await?;
            self.require_allowed(&pair.handle, &pair.contract).await?;
        }

        let mut sealed = Vec::with_capacity(request.pairs.len());
        for pair in &request.pairs {
            let value = self.oracle.decrypt(&pair.handle).await?;
            sealed.push(SealedValue::seal(pair.handle, &value, &message.public_key)?);
        }
        info!(%user, handles = sealed.len(), delegated = message.delegator.is_some(), "user decryption served");
        Ok(sealed)
    }

    /// Decrypt publicly decryptable handles and attest the values.
    pub async fn public_decrypt(&self, handles: &[HandleId]) -> Result<DecryptionProof> {
        if handles.is_empty() {
            return Err(RelayerError::InvalidRequest("no handles".into()));
        }
        if handles.len() > limits::MAX_HANDLES {
            return Err(RelayerError::TooMany {
                what: "handles",
                count: handles.len(),
                max: limits::MAX_HANDLES,
            });
        }

        let mut values = Vec::with_capacity(handles.len());
        for handle in handles {
            if !self.acl.is_publicly_decryptable(handle).await? {
                return Err(RelayerError::NotPublic(*handle));
            }
            values.push(self.oracle.decrypt(handle).await?);
        }

        let signers: Vec<&Keypair> = self.kms.iter().collect();
        let proof = DecryptionProof::sign(
            self.config.chain_id,
            self.config.verifying_contract,
            handles.to_vec(),
            values,
            &signers,
        )?;
        info!(handles = handles.len(), signers = signers.len(), "public decryption attested");
        Ok(proof)
    }

    async fn require_allowed(&self, handle: &HandleId, principal: &Address) -> Result<()> {
        if self.acl.is_allowed(handle, principal).await? {
            Ok(())
        } else {
            Err(RelayerError::NotAllowed {
                handle: *handle,
                principal: *principal,
            })
        }
    }

    /// Answer one protocol message. Responses sent to the service are ignored.
    pub async fn handle(&self, message: RelayerMessage) -> Option<RelayerMessage> {
        let request_id = message.request_id();
        let result = match message {
            RelayerMessage::UserDecrypt { request, .. } => self
                .user_decrypt(&request)
                .await
                .map(|values| RelayerMessage::UserDecryptResponse { request_id, values }),
            RelayerMessage::PublicDecrypt { handles, .. } => self
                .public_decrypt(&handles)
                .await
                .map(|proof| RelayerMessage::PublicDecryptResponse { request_id, proof }),
            other => {
                debug!(request_id = other.request_id(), "ignoring response sent to service");
                return None;
            }
        };

        Some(result.unwrap_or_else(|e| {
            warn!(request_id, code = ?e.code(), error = %e, "request rejected");
            RelayerMessage::Error {
                request_id,
                code: e.code(),
                message: e.to_string(),
            }
        }))
    }

    /// Receive one message and reply to its sender.
    pub async fn serve_one<T: Transport>(&self, transport: &T) -> Result<()> {
        let (from, message) = transport.recv().await?;
        if let Some(reply) = self.handle(message).await {
            transport.send(&from, reply).await?;
        }
        Ok(())
    }

    /// Serve until the transport fails.
    pub async fn serve<T: Transport>(&self, transport: &T) -> Result<()> {
        loop {
            self.serve_one(transport).await?;
        }
    }
}
