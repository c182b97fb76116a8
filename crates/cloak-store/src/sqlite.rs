//! SQLite implementation of the Store trait.
//!
//! This is the primary storage backend. It uses rusqlite with bundled
//! SQLite behind a mutex; a commit runs inside a single SQL transaction.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use cloak_core::{Address, ClearValue, EncryptedType, HandleId};

use crate::changes::{ChangeSet, CommitStats};
use crate::error::{Result, StoreError};
use crate::migration;
use crate::records::{
    ContractRecord, DisclosureRecord, DisclosureState, HandleOrigin, HandleRecord,
};
use crate::traits::{StateView, Store};

/// SQLite-based store implementation.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path.as_ref())?;
        migration::migrate(&mut conn)?;
        info!(path = %path.as_ref().display(), "opened sqlite store");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

/// u64 values are stored by bit pattern in SQLite's signed INTEGER.
fn to_sql_u64(n: u64) -> i64 {
    n as i64
}

fn from_sql_u64(n: i64) -> u64 {
    n as u64
}

fn blob_array<const N: usize>(bytes: Vec<u8>, column: &str) -> Result<[u8; N]> {
    bytes
        .try_into()
        .map_err(|_| StoreError::InvalidData(format!("{column}: expected {N} bytes")))
}

fn encode_plaintext(value: &ClearValue) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(buf)
}

fn decode_plaintext(bytes: &[u8]) -> Result<ClearValue> {
    ciborium::from_reader(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}

struct RawHandleRow {
    handle: Vec<u8>,
    ty: u8,
    owner: Vec<u8>,
    origin: u8,
    created_at: i64,
    tx_id: i64,
}

impl RawHandleRow {
    fn into_record(self) -> Result<HandleRecord> {
        Ok(HandleRecord {
            handle: HandleId(blob_array(self.handle, "handle")?),
            ty: EncryptedType::from_tag(self.ty)
                .map_err(|e| StoreError::InvalidData(e.to_string()))?,
            owner: Address(blob_array(self.owner, "owner")?),
            origin: HandleOrigin::from_u8(self.origin)?,
            created_at: from_sql_u64(self.created_at),
            tx_id: from_sql_u64(self.tx_id),
        })
    }
}

struct RawDisclosureRow {
    handle: Vec<u8>,
    requester: Vec<u8>,
    request_id: i64,
    state: u8,
    plaintext: Option<Vec<u8>>,
    requested_at: i64,
    finalized_at: Option<i64>,
}

impl RawDisclosureRow {
    fn into_record(self) -> Result<DisclosureRecord> {
        Ok(DisclosureRecord {
            handle: HandleId(blob_array(self.handle, "handle")?),
            requester: Address(blob_array(self.requester, "requester")?),
            request_id: from_sql_u64(self.request_id),
            state: DisclosureState::from_u8(self.state)?,
            plaintext: self.plaintext.as_deref().map(decode_plaintext).transpose()?,
            requested_at: from_sql_u64(self.requested_at),
            finalized_at: self.finalized_at.map(from_sql_u64),
        })
    }
}

struct RawContractRow {
    address: Vec<u8>,
    deployer: Vec<u8>,
    name: String,
    deployed_at: i64,
    tx_id: i64,
}

impl RawContractRow {
    fn into_record(self) -> Result<ContractRecord> {
        Ok(ContractRecord {
            address: Address(blob_array(self.address, "address")?),
            deployer: Address(blob_array(self.deployer, "deployer")?),
            name: self.name,
            deployed_at: from_sql_u64(self.deployed_at),
            tx_id: from_sql_u64(self.tx_id),
        })
    }
}

impl StateView for SqliteStore {
    fn get_handle(&self, handle: &HandleId) -> Result<Option<HandleRecord>> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                "SELECT handle, ty, owner, origin, created_at, tx_id
                 FROM handles WHERE handle = ?1",
                params![handle.0.as_slice()],
                |row| {
                    Ok(RawHandleRow {
                        handle: row.get(0)?,
                        ty: row.get(1)?,
                        owner: row.get(2)?,
                        origin: row.get(3)?,
                        created_at: row.get(4)?,
                        tx_id: row.get(5)?,
                    })
                },
            )
            .optional()?;
        raw.map(RawHandleRow::into_record).transpose()
    }

    fn has_permanent_grant(&self, handle: &HandleId, principal: &Address) -> Result<bool> {
        let conn = self.lock()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM acl_grants WHERE handle = ?1 AND principal = ?2",
                params![handle.0.as_slice(), principal.0.as_slice()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn grants_for(&self, handle: &HandleId) -> Result<Vec<Address>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT principal FROM acl_grants WHERE handle = ?1 ORDER BY principal")?;
        let rows = stmt
            .query_map(params![handle.0.as_slice()], |row| row.get::<_, Vec<u8>>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|b| blob_array(b, "principal").map(Address))
            .collect()
    }

    fn is_public(&self, handle: &HandleId) -> Result<bool> {
        let conn = self.lock()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM public_handles WHERE handle = ?1",
                params![handle.0.as_slice()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn get_operator(&self, holder: &Address, operator: &Address) -> Result<Option<u64>> {
        let conn = self.lock()?;
        let until: Option<i64> = conn
            .query_row(
                "SELECT until FROM operators WHERE holder = ?1 AND operator = ?2",
                params![holder.0.as_slice(), operator.0.as_slice()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(until.map(from_sql_u64))
    }

    fn get_delegation(
        &self,
        delegator: &Address,
        delegate: &Address,
        contract: &Address,
    ) -> Result<Option<u64>> {
        let conn = self.lock()?;
        let exp: Option<i64> = conn
            .query_row(
                "SELECT expiration FROM delegations
                 WHERE delegator = ?1 AND delegate = ?2 AND contract = ?3",
                params![
                    delegator.0.as_slice(),
                    delegate.0.as_slice(),
                    contract.0.as_slice()
                ],
                |row| row.get(0),
            )
            .optional()?;
        Ok(exp.map(from_sql_u64))
    }

    fn get_disclosure(&self, handle: &HandleId) -> Result<Option<DisclosureRecord>> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                "SELECT handle, requester, request_id, state, plaintext, requested_at, finalized_at
                 FROM disclosures WHERE handle = ?1",
                params![handle.0.as_slice()],
                |row| {
                    Ok(RawDisclosureRow {
                        handle: row.get(0)?,
                        requester: row.get(1)?,
                        request_id: row.get(2)?,
                        state: row.get(3)?,
                        plaintext: row.get(4)?,
                        requested_at: row.get(5)?,
                        finalized_at: row.get(6)?,
                    })
                },
            )
            .optional()?;
        raw.map(RawDisclosureRow::into_record).transpose()
    }

    fn get_slot(&self, contract: &Address, key: &[u8; 32]) -> Result<Option<HandleId>> {
        let conn = self.lock()?;
        let raw: Option<Vec<u8>> = conn
            .query_row(
                "SELECT handle FROM slots WHERE contract = ?1 AND slot = ?2",
                params![contract.0.as_slice(), key.as_slice()],
                |row| row.get(0),
            )
            .optional()?;
        raw.map(|b| blob_array(b, "handle").map(HandleId)).transpose()
    }

    fn get_contract(&self, address: &Address) -> Result<Option<ContractRecord>> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                "SELECT address, deployer, name, deployed_at, tx_id
                 FROM contracts WHERE address = ?1",
                params![address.0.as_slice()],
                |row| {
                    Ok(RawContractRow {
                        address: row.get(0)?,
                        deployer: row.get(1)?,
                        name: row.get(2)?,
                        deployed_at: row.get(3)?,
                        tx_id: row.get(4)?,
                    })
                },
            )
            .optional()?;
        raw.map(RawContractRow::into_record).transpose()
    }
}

impl Store for SqliteStore {
    fn commit(&self, changes: &ChangeSet) -> Result<CommitStats> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let tx_id = to_sql_u64(changes.tx_id);
        let mut stats = CommitStats::default();

        for record in changes.handles.values() {
            stats.handles += tx.execute(
                "INSERT OR IGNORE INTO handles (handle, ty, owner, origin, created_at, tx_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.handle.0.as_slice(),
                    record.ty.tag(),
                    record.owner.0.as_slice(),
                    record.origin.to_u8(),
                    to_sql_u64(record.created_at),
                    to_sql_u64(record.tx_id),
                ],
            )?;
        }

        for (handle, principal) in &changes.grants {
            stats.grants += tx.execute(
                "INSERT OR IGNORE INTO acl_grants (handle, principal, tx_id) VALUES (?1, ?2, ?3)",
                params![handle.0.as_slice(), principal.0.as_slice(), tx_id],
            )?;
        }

        for handle in &changes.public {
            stats.public += tx.execute(
                "INSERT OR IGNORE INTO public_handles (handle, tx_id) VALUES (?1, ?2)",
                params![handle.0.as_slice(), tx_id],
            )?;
        }

        for ((holder, operator), until) in &changes.operators {
            tx.execute(
                "INSERT INTO operators (holder, operator, until) VALUES (?1, ?2, ?3)
                 ON CONFLICT (holder, operator) DO UPDATE SET until = excluded.until",
                params![holder.0.as_slice(), operator.0.as_slice(), to_sql_u64(*until)],
            )?;
        }

        for ((delegator, delegate, contract), exp) in &changes.delegations {
            tx.execute(
                "INSERT INTO delegations (delegator, delegate, contract, expiration)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (delegator, delegate, contract)
                 DO UPDATE SET expiration = excluded.expiration",
                params![
                    delegator.0.as_slice(),
                    delegate.0.as_slice(),
                    contract.0.as_slice(),
                    to_sql_u64(*exp)
                ],
            )?;
        }

        for record in changes.disclosures.values() {
            let plaintext = record.plaintext.as_ref().map(encode_plaintext).transpose()?;
            tx.execute(
                "INSERT OR REPLACE INTO disclosures
                 (handle, requester, request_id, state, plaintext, requested_at, finalized_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.handle.0.as_slice(),
                    record.requester.0.as_slice(),
                    to_sql_u64(record.request_id),
                    record.state.to_u8(),
                    plaintext,
                    to_sql_u64(record.requested_at),
                    record.finalized_at.map(to_sql_u64),
                ],
            )?;
        }

        for ((contract, slot), handle) in &changes.slots {
            tx.execute(
                "INSERT OR REPLACE INTO slots (contract, slot, handle) VALUES (?1, ?2, ?3)",
                params![contract.0.as_slice(), slot.as_slice(), handle.0.as_slice()],
            )?;
        }

        for record in changes.contracts.values() {
            tx.execute(
                "INSERT OR IGNORE INTO contracts (address, deployer, name, deployed_at, tx_id)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    record.address.0.as_slice(),
                    record.deployer.0.as_slice(),
                    record.name,
                    to_sql_u64(record.deployed_at),
                    to_sql_u64(record.tx_id),
                ],
            )?;
        }

        tx.execute(
            "UPDATE ledger_meta SET last_tx_id = MAX(last_tx_id, ?1) WHERE id = 0",
            params![tx_id],
        )?;

        tx.commit()?;

        stats.rows = changes.len();
        debug!(tx_id = changes.tx_id, rows = stats.rows, "sqlite store commit");
        Ok(stats)
    }

    fn handle_count(&self) -> Result<u64> {
        let conn = self.lock()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM handles", [], |row| row.get(0))?;
        Ok(from_sql_u64(n))
    }

    fn last_tx_id(&self) -> Result<u64> {
        let conn = self.lock()?;
        let n: i64 = conn.query_row("SELECT last_tx_id FROM ledger_meta WHERE id = 0", [], |row| {
            row.get(0)
        })?;
        Ok(from_sql_u64(n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(b: u8, owner: Address) -> HandleRecord {
        HandleRecord {
            handle: HandleId::compose(&[b; 32], 0, 9000, EncryptedType::Uint32),
            ty: EncryptedType::Uint32,
            owner,
            origin: HandleOrigin::Computed,
            created_at: 1_700_000_000,
            tx_id: 3,
        }
    }

    #[test]
    fn test_insert_and_get_handle() {
        let store = SqliteStore::open_memory().unwrap();
        let rec = record(1, Address::contract("token"));

        let mut changes = ChangeSet::new(3);
        changes.handles.insert(rec.handle, rec.clone());
        let stats = store.commit(&changes).unwrap();

        assert_eq!(stats.handles, 1);
        assert_eq!(store.get_handle(&rec.handle).unwrap(), Some(rec));
        assert_eq!(store.handle_count().unwrap(), 1);
        assert_eq!(store.last_tx_id().unwrap(), 3);
    }

    #[test]
    fn test_idempotent_grants() {
        let store = SqliteStore::open_memory().unwrap();
        let rec = record(1, Address::contract("token"));
        let alice = Address::contract("alice");

        let mut changes = ChangeSet::new(1);
        changes.grants.insert((rec.handle, alice));
        changes.public.insert(rec.handle);

        let first = store.commit(&changes).unwrap();
        let second = store.commit(&changes).unwrap();
        assert_eq!((first.grants, first.public), (1, 1));
        assert_eq!((second.grants, second.public), (0, 0));

        assert!(store.has_permanent_grant(&rec.handle, &alice).unwrap());
        assert!(store.is_public(&rec.handle).unwrap());
        assert_eq!(store.grants_for(&rec.handle).unwrap(), vec![alice]);
    }

    #[test]
    fn test_operator_upsert_and_max_expiry() {
        let store = SqliteStore::open_memory().unwrap();
        let holder = Address::contract("holder");
        let op = Address::contract("op");

        let mut changes = ChangeSet::new(1);
        changes.operators.insert((holder, op), u64::MAX);
        store.commit(&changes).unwrap();
        assert_eq!(store.get_operator(&holder, &op).unwrap(), Some(u64::MAX));

        let mut changes = ChangeSet::new(2);
        changes.operators.insert((holder, op), 0);
        store.commit(&changes).unwrap();
        assert_eq!(store.get_operator(&holder, &op).unwrap(), Some(0));
    }

    #[test]
    fn test_disclosure_and_slot_roundtrip() {
        let store = SqliteStore::open_memory().unwrap();
        let rec = record(1, Address::contract("token"));
        let alice = Address::contract("alice");
        let token = Address::contract("token");

        let mut disclosure = DisclosureRecord::requested(rec.handle, alice, 1, 50);
        disclosure.state = DisclosureState::Finalized;
        disclosure.plaintext = Some(ClearValue::from_u128(EncryptedType::Uint32, 77).unwrap());
        disclosure.finalized_at = Some(60);

        let mut changes = ChangeSet::new(1);
        changes.disclosures.insert(rec.handle, disclosure.clone());
        changes.slots.insert((token, [7u8; 32]), rec.handle);
        changes
            .delegations
            .insert((alice, Address::contract("bob"), token), 500);
        store.commit(&changes).unwrap();

        assert_eq!(store.get_disclosure(&rec.handle).unwrap(), Some(disclosure));
        assert_eq!(store.get_slot(&token, &[7u8; 32]).unwrap(), Some(rec.handle));
        assert_eq!(store.get_slot(&token, &[8u8; 32]).unwrap(), None);
        assert_eq!(
            store
                .get_delegation(&alice, &Address::contract("bob"), &token)
                .unwrap(),
            Some(500)
        );
    }

    #[test]
    fn test_contract_rows_are_insert_only() {
        let store = SqliteStore::open_memory().unwrap();
        let deployer = Address::contract("issuer");
        let address = Address::deployed(&deployer, "cUSD");
        let record = ContractRecord {
            address,
            deployer,
            name: "cUSD".into(),
            deployed_at: 1_700_000_000,
            tx_id: 4,
        };

        let mut changes = ChangeSet::new(4);
        changes.contracts.insert(address, record.clone());
        store.commit(&changes).unwrap();

        let mut forged = record.clone();
        forged.deployer = Address::contract("mallory");
        let mut changes = ChangeSet::new(5);
        changes.contracts.insert(address, forged);
        store.commit(&changes).unwrap();

        assert_eq!(store.get_contract(&address).unwrap(), Some(record));
        assert_eq!(store.get_contract(&deployer).unwrap(), None);
    }

    #[test]
    fn test_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cloak.db");
        let rec = record(2, Address::contract("token"));

        {
            let store = SqliteStore::open(&path).unwrap();
            let mut changes = ChangeSet::new(9);
            changes.handles.insert(rec.handle, rec.clone());
            changes.public.insert(rec.handle);
            store.commit(&changes).unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.get_handle(&rec.handle).unwrap(), Some(rec.clone()));
        assert!(store.is_public(&rec.handle).unwrap());
        assert_eq!(store.last_tx_id().unwrap(), 9);
    }
}
