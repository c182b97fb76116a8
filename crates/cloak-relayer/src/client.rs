//! Client side of the decryption protocol.
//!
//! A holder generates a request key pair, signs an authorization message
//! naming the contracts and a validity window, and sends it with the
//! handle/contract pairs. Values come back sealed to the request key and are
//! opened locally.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use cloak_core::{Address, ClearValue, DecryptionProof, HandleId, Keypair};

use crate::crypto::X25519StaticSecret;
use crate::error::{RelayerError, Result};
use crate::messages::{
    AuthorizationMessage, EndpointId, HandleContractPair, RelayerMessage, UserDecryptRequest,
};
use crate::service::RelayerConfig;
use crate::transport::Transport;

/// Talks to one decryption service over a transport.
pub struct DecryptionClient<T: Transport> {
    transport: T,
    service: EndpointId,
    config: RelayerConfig,
    next_id: AtomicU64,
}

impl<T: Transport> DecryptionClient<T> {
    pub fn new(transport: T, service: EndpointId, config: RelayerConfig) -> Self {
        Self {
            transport,
            service,
            config,
            next_id: AtomicU64::new(1),
        }
    }

    /// Sign a request for `pairs`, valid for `duration_days` from `start`.
    pub fn sign_request(
        &self,
        holder: &Keypair,
        request_keys: &X25519StaticSecret,
        pairs: Vec<HandleContractPair>,
        start_timestamp: u64,
        duration_days: u32,
        delegator: Option<Address>,
    ) -> Result<UserDecryptRequest> {
        let mut contract_addresses: Vec<Address> = pairs.iter().map(|p| p.contract).collect();
        contract_addresses.sort();
        contract_addresses.dedup();

        let message = AuthorizationMessage {
            public_key: request_keys.public_key(),
            contract_addresses,
            start_timestamp,
            duration_days,
            delegator,
        };
        UserDecryptRequest::sign(
            holder,
            pairs,
            message,
            self.config.chain_id,
            self.config.verifying_contract,
        )
    }

    /// Submit a signed request and open the returned values.
    pub async fn user_decrypt(
        &self,
        request: UserDecryptRequest,
        request_keys: &X25519StaticSecret,
    ) -> Result<Vec<(HandleId, ClearValue)>> {
        let expected: Vec<HandleId> = request.pairs.iter().map(|p| p.handle).collect();
        let request_id = self.next_request_id();

        match self
            .round_trip(RelayerMessage::UserDecrypt { request_id, request })
            .await?
        {
            RelayerMessage::UserDecryptResponse { values, .. } => {
                if values.iter().map(|v| v.handle).ne(expected.iter().copied()) {
                    return Err(RelayerError::InvalidRequest(
                        "response handles do not match request".into(),
                    ));
                }
                values
                    .iter()
                    .map(|v| v.open(request_keys).map(|value| (v.handle, value)))
                    .collect()
            }
            other => Err(unexpected(&other)),
        }
    }

    /// Fetch cleartexts and the KMS attestation for public handles.
    pub async fn public_decrypt(&self, handles: Vec<HandleId>) -> Result<DecryptionProof> {
        let request_id = self.next_request_id();
        match self
            .round_trip(RelayerMessage::PublicDecrypt {
                request_id,
                handles: handles.clone(),
            })
            .await?
        {
            RelayerMessage::PublicDecryptResponse { proof, .. } if proof.handles == handles => {
                Ok(proof)
            }
            other => Err(unexpected(&other)),
        }
    }

    fn next_request_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Send `message` and wait for the reply carrying the same request id.
    async fn round_trip(&self, message: RelayerMessage) -> Result<RelayerMessage> {
        let request_id = message.request_id();
        message.validate_limits()?;
        self.transport.send(&self.service, message).await?;

        let timeout = self.config.request_timeout();
        loop {
            let Some((from, reply)) = self.transport.recv_timeout(timeout).await? else {
                return Err(RelayerError::Timeout(format!("request {request_id}")));
            };
            if from != self.service || reply.request_id() != request_id {
                debug!(request_id = reply.request_id(), "dropping unrelated message");
                continue;
            }
            return match reply {
                RelayerMessage::Error { code, message, .. } => {
                    Err(RelayerError::Service { code, message })
                }
                reply => Ok(reply),
            };
        }
    }
}

fn unexpected(message: &RelayerMessage) -> RelayerError {
    RelayerError::InvalidRequest(format!(
        "unexpected reply to request {}",
        message.request_id()
    ))
}
