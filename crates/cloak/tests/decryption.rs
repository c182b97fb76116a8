//! End-to-end decryption: ledger permissions served to clients through the
//! decryption service over an in-memory transport.

mod common;

use std::sync::Arc;

use anyhow::Result;
use tokio::task::JoinHandle;

use cloak::core::Keypair;
use cloak::relayer::{
    DecryptionClient, EndpointId, ErrorCode, HandleContractPair, MemoryNetwork, MemoryTransport,
    RelayerError, X25519StaticSecret,
};
use cloak::{decryption_service, finalize_disclosures, Address, ConfidentialToken, HandleId};
use common::{euint64, init_tracing, LedgerFixture};

const SERVICE: EndpointId = EndpointId([0x5E; 32]);

struct Setup {
    env: LedgerFixture,
    token: ConfidentialToken,
    holder: Keypair,
    balance: HandleId,
    server: JoinHandle<()>,
    network: Arc<MemoryNetwork>,
}

impl Setup {
    /// The holder owns 42 tokens and a service is running.
    async fn start() -> Result<Self> {
        init_tracing();
        let env = LedgerFixture::new();
        let minter = Address::contract("minter");
        let token = env
            .ledger
            .execute(minter, |tx| ConfidentialToken::deploy(tx, "cUSD"))?
            .value;
        let holder = Keypair::from_seed(&[0xA1; 32]);

        env.ledger
            .execute(minter, |tx| token.mint(tx, holder.address(), 42))?;
        let balance = env
            .ledger
            .execute(holder.address(), |tx| token.balance_of(tx, &holder.address()))?
            .value
            .ok_or_else(|| anyhow::anyhow!("no balance"))?;

        let network = MemoryNetwork::new();
        let transport = network.create_transport(SERVICE).await;
        let service =
            decryption_service(&env.ledger, Arc::clone(&env.coprocessor), env.kms.clone());
        let server = tokio::spawn(async move {
            let _ = service.serve(&transport).await;
        });

        Ok(Self {
            env,
            token,
            holder,
            balance,
            server,
            network,
        })
    }

    async fn client(&self, id: u8) -> DecryptionClient<MemoryTransport> {
        let transport = self.network.create_transport(EndpointId([id; 32])).await;
        DecryptionClient::new(transport, SERVICE, self.env.ledger.relayer_config())
    }

    fn pair(&self) -> Vec<HandleContractPair> {
        vec![HandleContractPair {
            handle: self.balance,
            contract: self.token.address(),
        }]
    }
}

impl Drop for Setup {
    fn drop(&mut self) {
        self.server.abort();
    }
}

#[tokio::test]
async fn test_holder_decrypts_own_balance() -> Result<()> {
    let setup = Setup::start().await?;
    let client = setup.client(0xC1).await;
    let keys = X25519StaticSecret::generate();
    let now = setup.env.ledger.now()?;

    let request = client.sign_request(&setup.holder, &keys, setup.pair(), now, 1, None)?;
    let values = client.user_decrypt(request, &keys).await?;
    assert_eq!(values, vec![(setup.balance, euint64(42))]);
    Ok(())
}

#[tokio::test]
async fn test_stranger_is_refused() -> Result<()> {
    let setup = Setup::start().await?;
    let client = setup.client(0xC2).await;
    let stranger = Keypair::from_seed(&[0xB2; 32]);
    let keys = X25519StaticSecret::generate();
    let now = setup.env.ledger.now()?;

    let request = client.sign_request(&stranger, &keys, setup.pair(), now, 1, None)?;
    let err = client.user_decrypt(request, &keys).await.unwrap_err();
    assert!(matches!(
        err,
        RelayerError::Service {
            code: ErrorCode::NotAuthorized,
            ..
        }
    ));
    // the ledger may have lagged the grant
    assert!(err.is_retryable());
    Ok(())
}

#[tokio::test]
async fn test_delegate_decrypts_for_holder() -> Result<()> {
    let setup = Setup::start().await?;
    let client = setup.client(0xC3).await;
    let delegate = Keypair::from_seed(&[0xD3; 32]);
    let keys = X25519StaticSecret::generate();
    let now = setup.env.ledger.now()?;
    let delegator = Some(setup.holder.address());

    let request = client.sign_request(&delegate, &keys, setup.pair(), now, 1, delegator)?;
    let err = client.user_decrypt(request, &keys).await.unwrap_err();
    assert!(matches!(
        err,
        RelayerError::Service {
            code: ErrorCode::NotAuthorized,
            ..
        }
    ));

    let token = setup.token.address();
    setup.env.ledger.execute(setup.holder.address(), |tx| {
        Ok(tx.delegate_for_user_decryption(delegate.address(), token, now + 3_600)?)
    })?;
    assert_eq!(
        setup
            .env
            .ledger
            .delegation_expiration(&setup.holder.address(), &delegate.address(), &token)?,
        Some(now + 3_600)
    );

    let request = client.sign_request(&delegate, &keys, setup.pair(), now, 1, delegator)?;
    let values = client.user_decrypt(request, &keys).await?;
    assert_eq!(values, vec![(setup.balance, euint64(42))]);

    // lapsed delegations are refused even inside the signed window
    setup.env.ledger.advance_time(3_600)?;
    let request = client.sign_request(&delegate, &keys, setup.pair(), now, 1, delegator)?;
    assert!(client.user_decrypt(request, &keys).await.is_err());
    Ok(())
}

#[tokio::test]
async fn test_public_decrypt_then_finalize() -> Result<()> {
    let setup = Setup::start().await?;
    let client = setup.client(0xC4).await;
    let balance = setup.balance;

    let err = client.public_decrypt(vec![balance]).await.unwrap_err();
    assert!(matches!(
        err,
        RelayerError::Service {
            code: ErrorCode::NotPublic,
            ..
        }
    ));

    setup
        .env
        .ledger
        .execute(setup.holder.address(), |tx| Ok(tx.request_disclose(&balance)?))?;
    assert!(setup.env.ledger.is_publicly_decryptable(&balance)?);

    let proof = client.public_decrypt(vec![balance]).await?;
    assert_eq!(proof.value_of(&balance), Some(&euint64(42)));

    finalize_disclosures(&setup.env.ledger, &proof)?;
    assert_eq!(setup.env.ledger.disclosed(&balance)?, Some(euint64(42)));

    // a disclosure finalizes once
    let err = finalize_disclosures(&setup.env.ledger, &proof).unwrap_err();
    assert_eq!(err.reason_code(), "DisclosureAlreadyFinalized");
    Ok(())
}
