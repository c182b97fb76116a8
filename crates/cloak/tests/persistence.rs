//! Permission state survives reopening a SQLite-backed ledger.

mod common;

use cloak::store::{DisclosureState, SqliteStore, Store};
use cloak::{Address, ConfidentialToken};
use common::LedgerFixture;

#[test]
fn test_reopen_keeps_permissions_and_tx_ids() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.db");

    let minter = Address::contract("minter");
    let alice = Address::contract("alice");
    let exchange = Address::contract("exchange");

    let (balance, last_tx) = {
        let env = LedgerFixture::open(SqliteStore::open(&path).unwrap(), |_| {});
        let token = env
            .ledger
            .execute(minter, |tx| ConfidentialToken::deploy(tx, "cUSD"))
            .unwrap()
            .value;
        env.ledger
            .execute(minter, |tx| token.mint(tx, alice, 10))
            .unwrap();
        let until = env.ledger.now().unwrap() + 600;
        env.ledger
            .execute(alice, |tx| Ok(tx.set_operator(alice, exchange, until)?))
            .unwrap();
        let outcome = env
            .ledger
            .execute(alice, |tx| {
                let balance = token.balance_of(tx, &alice)?.unwrap();
                tx.request_disclose(&balance)?;
                Ok(balance)
            })
            .unwrap();
        (outcome.value, outcome.tx_id)
    };

    let env = LedgerFixture::open(SqliteStore::open(&path).unwrap(), |_| {});
    assert_eq!(env.ledger.store().last_tx_id().unwrap(), last_tx);
    // the deployment survives too
    let token = env
        .ledger
        .execute(minter, |tx| ConfidentialToken::attach(tx, "cUSD"))
        .unwrap()
        .value;
    assert!(env.ledger.is_allowed(&balance, &alice).unwrap());
    assert!(env.ledger.is_publicly_decryptable(&balance).unwrap());
    assert!(env.ledger.is_operator(&alice, &exchange).unwrap());
    assert_eq!(
        env.ledger.disclosure_state(&balance).unwrap(),
        Some(DisclosureState::Requested)
    );

    let stored = env
        .ledger
        .execute(alice, |tx| token.balance_of(tx, &alice))
        .unwrap();
    assert_eq!(stored.value, Some(balance));
    assert!(stored.tx_id > last_tx);
}

#[test]
fn test_reverted_transaction_leaves_no_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.db");
    let app = Address::contract("app");

    {
        let env = LedgerFixture::open(SqliteStore::open(&path).unwrap(), |_| {});
        let err = env
            .ledger
            .execute(app, |tx| {
                tx.trivial_encrypt(common::euint64(1))?;
                tx.set_operator(Address::contract("someone"), app, u64::MAX)?;
                Ok(())
            })
            .unwrap_err();
        assert_eq!(err.reason_code(), "Unauthorized");
    }

    let env = LedgerFixture::open(SqliteStore::open(&path).unwrap(), |_| {});
    assert_eq!(env.ledger.store().handle_count().unwrap(), 0);
}
