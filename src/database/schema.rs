use rusqlite::{Connection, Result};

/// Current schema version, tracked in `PRAGMA user_version`
pub const SCHEMA_VERSION: i64 = 1;

/// Initialize the database schema with required tables
pub fn initialize_schema(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS blocks (
            number INTEGER PRIMARY KEY,
            hash TEXT NOT NULL UNIQUE,
            parent_hash TEXT NOT NULL,
            state_root TEXT NOT NULL,
            tx_root TEXT NOT NULL,
            receipt_root TEXT NOT NULL,
            gas_limit INTEGER NOT NULL,
            gas_used INTEGER NOT NULL,
            timestamp INTEGER NOT NULL,
            extra_data TEXT NOT NULL,
            transactions TEXT NOT NULL,
            created_at INTEGER DEFAULT (strftime('%s', 'now'))
        )",
        [],
    )?;

    // u64 quantities are stored as the bit pattern of an i64
    conn.execute(
        "CREATE TABLE IF NOT EXISTS transactions (
            hash TEXT PRIMARY KEY,
            status INTEGER NOT NULL,
            block_number INTEGER NOT NULL,
            block_hash TEXT NOT NULL,
            tx_index INTEGER NOT NULL,
            nonce INTEGER NOT NULL,
            from_address TEXT NOT NULL,
            to_address TEXT NOT NULL,
            value INTEGER NOT NULL,
            gas INTEGER NOT NULL,
            gas_price INTEGER NOT NULL,
            gas_used INTEGER NOT NULL,
            cumulative_gas_used INTEGER NOT NULL,
            created_contract TEXT NOT NULL,
            data BLOB NOT NULL,
            private_data BLOB NOT NULL,
            is_private INTEGER NOT NULL,
            timestamp INTEGER NOT NULL,
            created_at INTEGER DEFAULT (strftime('%s', 'now'))
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            transaction_hash TEXT NOT NULL,
            log_index INTEGER NOT NULL,
            address TEXT NOT NULL,
            topics TEXT NOT NULL,
            data BLOB NOT NULL,
            block_number INTEGER NOT NULL,
            block_hash TEXT NOT NULL,
            transaction_index INTEGER NOT NULL,
            timestamp INTEGER NOT NULL,
            PRIMARY KEY (transaction_hash, log_index)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS internal_calls (
            transaction_hash TEXT NOT NULL,
            call_index INTEGER NOT NULL,
            from_address TEXT NOT NULL,
            to_address TEXT NOT NULL,
            gas INTEGER NOT NULL,
            gas_used INTEGER NOT NULL,
            value INTEGER NOT NULL,
            input BLOB NOT NULL,
            output BLOB NOT NULL,
            call_type TEXT NOT NULL,
            PRIMARY KEY (transaction_hash, call_index)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS token_contracts (
            address TEXT PRIMARY KEY,
            standard TEXT NOT NULL CHECK (standard IN ('ERC20', 'ERC721')),
            creation_transaction TEXT NOT NULL,
            block_number INTEGER NOT NULL,
            created_at INTEGER DEFAULT (strftime('%s', 'now'))
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS ingest_state (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            last_persisted_block INTEGER,
            last_updated INTEGER DEFAULT (strftime('%s', 'now'))
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_transactions_block ON transactions(block_number)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_address ON events(address)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_token_contracts_standard ON token_contracts(standard)",
        [],
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO ingest_state (id, last_persisted_block) VALUES (1, NULL)",
        [],
    )?;

    Ok(())
}

/// Bring an existing database up to `SCHEMA_VERSION`
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if version < SCHEMA_VERSION {
        initialize_schema(conn)?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    }
    Ok(())
}
