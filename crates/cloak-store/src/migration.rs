//! Database schema migrations for SQLite.
//!
//! We use a simple versioned migration system. Each migration is a SQL string
//! that transforms the schema from version N to N+1.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 2;

/// Initialize or migrate the database schema.
///
/// This function is idempotent - it can be called multiple times safely.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )?;

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
        }

        tx.commit()?;
    }

    Ok(())
}

/// Apply a specific migration version.
fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        2 => apply_v2(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Handle registry: one immutable row per handle
        CREATE TABLE handles (
            handle BLOB PRIMARY KEY,          -- 32 bytes
            ty INTEGER NOT NULL,              -- EncryptedType tag
            owner BLOB NOT NULL,              -- 20 bytes, owning contract
            origin INTEGER NOT NULL,          -- 0=input, 1=computed, 2=trivial
            created_at INTEGER NOT NULL,      -- block time (seconds)
            tx_id INTEGER NOT NULL
        );

        -- Permanent ACL grants
        CREATE TABLE acl_grants (
            handle BLOB NOT NULL,
            principal BLOB NOT NULL,
            tx_id INTEGER NOT NULL,
            PRIMARY KEY (handle, principal)
        );

        -- Monotonic public-decrypt flags
        CREATE TABLE public_handles (
            handle BLOB PRIMARY KEY,
            tx_id INTEGER NOT NULL
        );

        -- Operator grants
        CREATE TABLE operators (
            holder BLOB NOT NULL,
            operator BLOB NOT NULL,
            until INTEGER NOT NULL,           -- u64 bit pattern
            PRIMARY KEY (holder, operator)
        );

        -- User-decryption delegations
        CREATE TABLE delegations (
            delegator BLOB NOT NULL,
            delegate BLOB NOT NULL,
            contract BLOB NOT NULL,
            expiration INTEGER NOT NULL,      -- u64 bit pattern
            PRIMARY KEY (delegator, delegate, contract)
        );

        -- Disclosure requests
        CREATE TABLE disclosures (
            handle BLOB PRIMARY KEY,
            requester BLOB NOT NULL,
            request_id INTEGER NOT NULL,
            state INTEGER NOT NULL,           -- 1=requested, 2=finalized
            plaintext BLOB,                   -- CBOR ClearValue once finalized
            requested_at INTEGER NOT NULL,
            finalized_at INTEGER
        );

        -- Contract handle slots
        CREATE TABLE slots (
            contract BLOB NOT NULL,
            slot BLOB NOT NULL,
            handle BLOB NOT NULL,
            PRIMARY KEY (contract, slot)
        );

        -- Single-row ledger metadata
        CREATE TABLE ledger_meta (
            id INTEGER PRIMARY KEY CHECK (id = 0),
            last_tx_id INTEGER NOT NULL
        );
        INSERT INTO ledger_meta (id, last_tx_id) VALUES (0, 0);

        CREATE INDEX idx_handles_owner ON handles(owner);
        CREATE INDEX idx_acl_grants_principal ON acl_grants(principal);
        "#,
    )?;

    Ok(())
}

/// Migration v2: deployed contracts.
fn apply_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE contracts (
            address BLOB PRIMARY KEY,         -- 20 bytes
            deployer BLOB NOT NULL,           -- 20 bytes
            name TEXT NOT NULL,
            deployed_at INTEGER NOT NULL,     -- block time (seconds)
            tx_id INTEGER NOT NULL
        );

        CREATE INDEX idx_contracts_deployer ON contracts(deployer);
        "#,
    )?;

    Ok(())
}

/// Get current time in milliseconds.
fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_creates_tables() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        for expected in [
            "handles",
            "acl_grants",
            "public_handles",
            "operators",
            "delegations",
            "disclosures",
            "slots",
            "contracts",
            "ledger_meta",
            "schema_migrations",
        ] {
            assert!(tables.contains(&expected.to_string()), "missing table {expected}");
        }
    }

    #[test]
    fn test_migration_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        migrate(&mut conn).unwrap();
        migrate(&mut conn).unwrap();

        let version: u32 = conn
            .query_row(
                "SELECT MAX(version) FROM schema_migrations",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn test_v1_database_upgrades() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute(
            "CREATE TABLE schema_migrations (version INTEGER PRIMARY KEY, applied_at INTEGER NOT NULL)",
            [],
        )
        .unwrap();
        apply_v1(&conn).unwrap();
        conn.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (1, 0)",
            [],
        )
        .unwrap();

        migrate(&mut conn).unwrap();
        let contracts: i64 = conn
            .query_row("SELECT COUNT(*) FROM contracts", [], |row| row.get(0))
            .unwrap();
        assert_eq!(contracts, 0);
    }
}
