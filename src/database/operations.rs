use rusqlite::{params, Connection, OptionalExtension, Transaction as SqlTransaction};
use serde_json::json;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::config::DatabaseConfig;
use crate::database::schema::{initialize_schema, run_migrations};
use crate::database::store::TransactionStore;
use crate::error::{DecodeError, PersistenceError};
use crate::logging::{LogContext, MetricsLogger, PerformanceMonitor};
use crate::models::{
    Address, Block, CallType, Event, Hash, HexData, InternalCall, TokenContract, TokenStandard, Transaction,
};

fn to_sql_int(value: u64) -> i64 {
    value as i64
}

fn from_sql_int(value: i64) -> u64 {
    value as u64
}

fn corrupt(e: DecodeError) -> PersistenceError {
    PersistenceError::Corrupt(e.to_string())
}

fn not_found(what: String) -> impl FnOnce(rusqlite::Error) -> PersistenceError {
    move |e| match e {
        rusqlite::Error::QueryReturnedNoRows => PersistenceError::NotFound(what),
        other => PersistenceError::Sqlite(other),
    }
}

/// SQLite-backed store for blocks, transactions and token contracts
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) a database file and initialize schema
    pub fn new(db_path: &str) -> Result<Self, PersistenceError> {
        let conn = Connection::open(db_path)?;
        Self::from_connection(conn)
    }

    /// Open a database file with the journal and locking settings from config
    pub fn open(config: &DatabaseConfig) -> Result<Self, PersistenceError> {
        let conn = Connection::open(&config.path)?;
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
        if config.enable_wal_mode {
            let mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
            LogContext::new("database", "open")
                .with_metadata("journal_mode", json!(mode))
                .debug("Journal mode configured");
        }
        Self::from_connection(conn)
    }

    /// Create an in-memory database for testing
    pub fn new_in_memory() -> Result<Self, PersistenceError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, PersistenceError> {
        initialize_schema(&conn)?;
        run_migrations(&conn)?;

        Ok(Database {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, PersistenceError> {
        self.conn
            .lock()
            .map_err(|_| PersistenceError::Lock("Failed to acquire database lock".to_string()))
    }

    fn insert_token_contract(conn: &Connection, token: &TokenContract) -> Result<usize, PersistenceError> {
        let rows = conn.execute(
            "INSERT OR REPLACE INTO token_contracts (address, standard, creation_transaction, block_number)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                token.address.to_string(),
                token.standard.as_str(),
                token.creation_transaction.to_string(),
                to_sql_int(token.block_number),
            ],
        )?;
        Ok(rows)
    }

    fn insert_transaction(sql: &SqlTransaction<'_>, tx: &Transaction) -> Result<usize, PersistenceError> {
        let hash = tx.hash.to_string();
        let mut rows = sql.execute(
            "INSERT OR REPLACE INTO transactions (
                hash, status, block_number, block_hash, tx_index, nonce, from_address, to_address,
                value, gas, gas_price, gas_used, cumulative_gas_used, created_contract,
                data, private_data, is_private, timestamp
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
            params![
                hash,
                tx.status,
                to_sql_int(tx.block_number),
                tx.block_hash.to_string(),
                to_sql_int(tx.index),
                to_sql_int(tx.nonce),
                tx.from.to_string(),
                tx.to.to_string(),
                to_sql_int(tx.value),
                to_sql_int(tx.gas),
                to_sql_int(tx.gas_price),
                to_sql_int(tx.gas_used),
                to_sql_int(tx.cumulative_gas_used),
                tx.created_contract.to_string(),
                tx.data.as_bytes(),
                tx.private_data.as_bytes(),
                tx.is_private,
                to_sql_int(tx.timestamp),
            ],
        )?;

        // A rewrite replaces the children wholesale so stale rows cannot survive
        sql.execute("DELETE FROM events WHERE transaction_hash = ?1", params![hash])?;
        sql.execute("DELETE FROM internal_calls WHERE transaction_hash = ?1", params![hash])?;

        for event in &tx.events {
            rows += sql.execute(
                "INSERT OR REPLACE INTO events (
                    transaction_hash, log_index, address, topics, data,
                    block_number, block_hash, transaction_index, timestamp
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    event.transaction_hash.to_string(),
                    to_sql_int(event.index),
                    event.address.to_string(),
                    serde_json::to_string(&event.topics)?,
                    event.data.as_bytes(),
                    to_sql_int(event.block_number),
                    event.block_hash.to_string(),
                    to_sql_int(event.transaction_index),
                    to_sql_int(event.timestamp),
                ],
            )?;
        }

        for (call_index, call) in tx.internal_calls.iter().enumerate() {
            rows += sql.execute(
                "INSERT OR REPLACE INTO internal_calls (
                    transaction_hash, call_index, from_address, to_address,
                    gas, gas_used, value, input, output, call_type
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    hash,
                    call_index as i64,
                    call.from.to_string(),
                    call.to.to_string(),
                    to_sql_int(call.gas),
                    to_sql_int(call.gas_used),
                    to_sql_int(call.value),
                    call.input.as_bytes(),
                    call.output.as_bytes(),
                    call.call_type.as_str(),
                ],
            )?;
        }

        Ok(rows)
    }

    /// Reassemble a stored transaction with its events and internal calls
    pub fn get_transaction(&self, hash: &Hash) -> Result<Transaction, PersistenceError> {
        let conn = self.lock()?;
        let key = hash.to_string();

        let row = conn
            .query_row(
                "SELECT hash, status, block_number, block_hash, tx_index, nonce, from_address, to_address,
                        value, gas, gas_price, gas_used, cumulative_gas_used, created_contract,
                        data, private_data, is_private, timestamp
                 FROM transactions WHERE hash = ?1",
                params![key],
                |row| {
                    Ok(TransactionRow {
                        hash: row.get(0)?,
                        status: row.get(1)?,
                        block_number: row.get(2)?,
                        block_hash: row.get(3)?,
                        index: row.get(4)?,
                        nonce: row.get(5)?,
                        from: row.get(6)?,
                        to: row.get(7)?,
                        value: row.get(8)?,
                        gas: row.get(9)?,
                        gas_price: row.get(10)?,
                        gas_used: row.get(11)?,
                        cumulative_gas_used: row.get(12)?,
                        created_contract: row.get(13)?,
                        data: row.get(14)?,
                        private_data: row.get(15)?,
                        is_private: row.get(16)?,
                        timestamp: row.get(17)?,
                    })
                },
            )
            .map_err(not_found(format!("transaction {}", key)))?;

        let mut stmt = conn.prepare(
            "SELECT log_index, address, topics, data, block_number, block_hash, transaction_index, timestamp
             FROM events WHERE transaction_hash = ?1 ORDER BY log_index",
        )?;
        let event_rows = stmt
            .query_map(params![key], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Vec<u8>>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, i64>(6)?,
                    row.get::<_, i64>(7)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut events = Vec::with_capacity(event_rows.len());
        for (index, address, topics, data, block_number, block_hash, transaction_index, timestamp) in event_rows {
            events.push(Event {
                index: from_sql_int(index),
                address: Address::parse("events.address", &address).map_err(corrupt)?,
                topics: serde_json::from_str(&topics)?,
                data: HexData(data),
                block_number: from_sql_int(block_number),
                block_hash: Hash::parse("events.block_hash", &block_hash).map_err(corrupt)?,
                transaction_hash: *hash,
                transaction_index: from_sql_int(transaction_index),
                timestamp: from_sql_int(timestamp),
            });
        }

        let mut stmt = conn.prepare(
            "SELECT from_address, to_address, gas, gas_used, value, input, output, call_type
             FROM internal_calls WHERE transaction_hash = ?1 ORDER BY call_index",
        )?;
        let call_rows = stmt
            .query_map(params![key], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, Vec<u8>>(5)?,
                    row.get::<_, Vec<u8>>(6)?,
                    row.get::<_, String>(7)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut internal_calls = Vec::with_capacity(call_rows.len());
        for (from, to, gas, gas_used, value, input, output, call_type) in call_rows {
            internal_calls.push(InternalCall {
                from: Address::parse("internal_calls.from_address", &from).map_err(corrupt)?,
                to: Address::parse("internal_calls.to_address", &to).map_err(corrupt)?,
                gas: from_sql_int(gas),
                gas_used: from_sql_int(gas_used),
                value: from_sql_int(value),
                input: HexData(input),
                output: HexData(output),
                call_type: CallType::parse(&call_type),
            });
        }

        row.into_transaction(events, internal_calls)
    }

    pub fn get_block(&self, number: u64) -> Result<Block, PersistenceError> {
        let conn = self.lock()?;

        let (hash, parent_hash, state_root, tx_root, receipt_root, gas_limit, gas_used, timestamp, extra_data, txs) =
            conn.query_row(
                "SELECT hash, parent_hash, state_root, tx_root, receipt_root,
                        gas_limit, gas_used, timestamp, extra_data, transactions
                 FROM blocks WHERE number = ?1",
                params![to_sql_int(number)],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, i64>(5)?,
                        row.get::<_, i64>(6)?,
                        row.get::<_, i64>(7)?,
                        row.get::<_, String>(8)?,
                        row.get::<_, String>(9)?,
                    ))
                },
            )
            .map_err(not_found(format!("block {}", number)))?;

        Ok(Block {
            hash: Hash::parse("blocks.hash", &hash).map_err(corrupt)?,
            parent_hash: Hash::parse("blocks.parent_hash", &parent_hash).map_err(corrupt)?,
            state_root: Hash::parse("blocks.state_root", &state_root).map_err(corrupt)?,
            tx_root: Hash::parse("blocks.tx_root", &tx_root).map_err(corrupt)?,
            receipt_root: Hash::parse("blocks.receipt_root", &receipt_root).map_err(corrupt)?,
            number,
            gas_limit: from_sql_int(gas_limit),
            gas_used: from_sql_int(gas_used),
            timestamp: from_sql_int(timestamp),
            extra_data,
            transactions: serde_json::from_str(&txs)?,
        })
    }

    pub fn get_token_contract(&self, address: &Address) -> Result<TokenContract, PersistenceError> {
        let conn = self.lock()?;
        let key = address.to_string();

        let (standard, creation_transaction, block_number) = conn
            .query_row(
                "SELECT standard, creation_transaction, block_number FROM token_contracts WHERE address = ?1",
                params![key],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, i64>(2)?)),
            )
            .map_err(not_found(format!("token contract {}", key)))?;

        token_contract_from_row(&key, &standard, &creation_transaction, block_number)
    }

    /// All classified token contracts, ordered by block then address
    pub fn get_token_contracts(&self) -> Result<Vec<TokenContract>, PersistenceError> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            "SELECT address, standard, creation_transaction, block_number
             FROM token_contracts ORDER BY block_number, address",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.iter()
            .map(|(address, standard, creation, block)| token_contract_from_row(address, standard, creation, *block))
            .collect()
    }

    pub fn get_transaction_count(&self) -> Result<u64, PersistenceError> {
        let conn = self.lock()?;

        let count: i64 = conn.query_row("SELECT COUNT(*) FROM transactions", [], |row| row.get(0))?;

        Ok(from_sql_int(count))
    }

    pub fn get_event_count(&self) -> Result<u64, PersistenceError> {
        let conn = self.lock()?;

        let count: i64 = conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;

        Ok(from_sql_int(count))
    }

    /// Highest block whose transactions were all persisted, if any
    pub fn get_last_persisted_block(&self) -> Result<Option<u64>, PersistenceError> {
        let conn = self.lock()?;

        let block: Option<i64> = conn
            .query_row("SELECT last_persisted_block FROM ingest_state WHERE id = 1", [], |row| row.get(0))
            .optional()?
            .flatten();

        Ok(block.map(from_sql_int))
    }
}

impl TransactionStore for Database {
    fn write_transaction(&self, tx: &Transaction) -> Result<(), PersistenceError> {
        let monitor = PerformanceMonitor::new("db_write_transaction")
            .with_metadata("transaction_hash", json!(tx.hash.to_string()));

        let result = (|| -> Result<usize, PersistenceError> {
            let mut conn = self.lock()?;
            let sql = conn.transaction()?;
            let rows = Self::insert_transaction(&sql, tx)?;
            sql.commit()?;
            Ok(rows)
        })();

        let duration = monitor.finish_with_result(&result);
        MetricsLogger::log_database_operation("write_transaction", duration, result.as_ref().ok().copied());
        result.map(|_| ())
    }

    fn write_token_contract(&self, token: &TokenContract) -> Result<(), PersistenceError> {
        let conn = self.lock()?;
        Self::insert_token_contract(&conn, token)?;
        Ok(())
    }

    fn write_transaction_with_tokens(
        &self,
        tx: &Transaction,
        tokens: &[TokenContract],
    ) -> Result<(), PersistenceError> {
        let monitor = PerformanceMonitor::new("db_write_transaction_with_tokens")
            .with_metadata("transaction_hash", json!(tx.hash.to_string()))
            .with_metadata("token_contracts", json!(tokens.len()));

        let result = (|| -> Result<usize, PersistenceError> {
            let mut conn = self.lock()?;
            let sql = conn.transaction()?;
            let mut rows = Self::insert_transaction(&sql, tx)?;
            for token in tokens {
                rows += Self::insert_token_contract(&sql, token)?;
            }
            sql.commit()?;
            Ok(rows)
        })();

        let duration = monitor.finish_with_result(&result);
        MetricsLogger::log_database_operation(
            "write_transaction_with_tokens",
            duration,
            result.as_ref().ok().copied(),
        );
        result.map(|_| ())
    }

    fn write_block(&self, block: &Block) -> Result<(), PersistenceError> {
        let conn = self.lock()?;

        conn.execute(
            "INSERT OR REPLACE INTO blocks (
                number, hash, parent_hash, state_root, tx_root, receipt_root,
                gas_limit, gas_used, timestamp, extra_data, transactions
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                to_sql_int(block.number),
                block.hash.to_string(),
                block.parent_hash.to_string(),
                block.state_root.to_string(),
                block.tx_root.to_string(),
                block.receipt_root.to_string(),
                to_sql_int(block.gas_limit),
                to_sql_int(block.gas_used),
                to_sql_int(block.timestamp),
                block.extra_data,
                serde_json::to_string(&block.transactions)?,
            ],
        )?;

        Ok(())
    }

    fn set_last_persisted_block(&self, block_number: u64) -> Result<(), PersistenceError> {
        let conn = self.lock()?;

        conn.execute(
            "UPDATE ingest_state SET last_persisted_block = ?1, last_updated = strftime('%s', 'now') WHERE id = 1",
            params![to_sql_int(block_number)],
        )?;

        Ok(())
    }
}

fn token_contract_from_row(
    address: &str,
    standard: &str,
    creation_transaction: &str,
    block_number: i64,
) -> Result<TokenContract, PersistenceError> {
    Ok(TokenContract {
        address: Address::parse("token_contracts.address", address).map_err(corrupt)?,
        standard: TokenStandard::parse(standard)
            .ok_or_else(|| PersistenceError::Corrupt(format!("unknown token standard {:?}", standard)))?,
        creation_transaction: Hash::parse("token_contracts.creation_transaction", creation_transaction)
            .map_err(corrupt)?,
        block_number: from_sql_int(block_number),
    })
}

/// Represents a row from the transactions table
#[derive(Debug, Clone)]
struct TransactionRow {
    hash: String,
    status: bool,
    block_number: i64,
    block_hash: String,
    index: i64,
    nonce: i64,
    from: String,
    to: String,
    value: i64,
    gas: i64,
    gas_price: i64,
    gas_used: i64,
    cumulative_gas_used: i64,
    created_contract: String,
    data: Vec<u8>,
    private_data: Vec<u8>,
    is_private: bool,
    timestamp: i64,
}

impl TransactionRow {
    fn into_transaction(
        self,
        events: Vec<Event>,
        internal_calls: Vec<InternalCall>,
    ) -> Result<Transaction, PersistenceError> {
        Ok(Transaction {
            hash: Hash::parse("transactions.hash", &self.hash).map_err(corrupt)?,
            status: self.status,
            block_number: from_sql_int(self.block_number),
            block_hash: Hash::parse("transactions.block_hash", &self.block_hash).map_err(corrupt)?,
            index: from_sql_int(self.index),
            nonce: from_sql_int(self.nonce),
            from: Address::parse("transactions.from_address", &self.from).map_err(corrupt)?,
            to: Address::parse("transactions.to_address", &self.to).map_err(corrupt)?,
            value: from_sql_int(self.value),
            gas: from_sql_int(self.gas),
            gas_price: from_sql_int(self.gas_price),
            gas_used: from_sql_int(self.gas_used),
            cumulative_gas_used: from_sql_int(self.cumulative_gas_used),
            created_contract: Address::parse("transactions.created_contract", &self.created_contract)
                .map_err(corrupt)?,
            data: HexData(self.data),
            private_data: HexData(self.private_data),
            is_private: self.is_private,
            timestamp: from_sql_int(self.timestamp),
            events,
            internal_calls,
        })
    }
}
