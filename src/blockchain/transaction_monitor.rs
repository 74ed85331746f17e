use serde_json::json;

use crate::blockchain::chain_client::{CallFrame, ChainClient, LogRecord, TransactionRecord};
use crate::blockchain::token_monitor::TokenMonitor;
use crate::database::TransactionStore;
use crate::error::{DecodeError, IndexerError, Result};
use crate::logging::{LogContext, MetricsLogger, PerformanceMonitor};
use crate::models::{
    decode_bytes, decode_uint64, Address, Block, CallType, Event, Hash, HexData, InternalCall, TokenContract,
    Transaction,
};

/// What a call to [`TransactionMonitor::ingest_block`] wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub block_number: u64,
    pub transactions: usize,
    pub events: usize,
    pub internal_calls: usize,
    pub token_contracts: usize,
}

/// Fetches transactions, normalizes them into [`Transaction`] and persists them.
pub struct TransactionMonitor<C, S> {
    client: C,
    store: S,
    token_monitor: Option<TokenMonitor<C>>,
    trace_internal_calls: bool,
}

impl<C: ChainClient, S: TransactionStore> TransactionMonitor<C, S> {
    pub fn new(client: C, store: S) -> Self {
        Self {
            client,
            store,
            token_monitor: None,
            trace_internal_calls: false,
        }
    }

    /// Classify contracts created by each ingested transaction.
    pub fn with_token_monitor(mut self, token_monitor: TokenMonitor<C>) -> Self {
        self.token_monitor = Some(token_monitor);
        self
    }

    /// Populate internal calls from a `callTracer` trace.
    pub fn with_internal_call_tracing(mut self, enabled: bool) -> Self {
        self.trace_internal_calls = enabled;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Fetch and normalize one transaction. Its timestamp is left at 0; block
    /// ingestion stamps it from the containing block.
    pub async fn create_transaction(&self, hash: Hash) -> Result<Transaction> {
        let record = self.client.query_transaction(hash).await?;
        let trace = if self.trace_internal_calls {
            Some(self.client.trace_internal_calls(hash).await?)
        } else {
            None
        };

        Ok(normalize_transaction(record, trace.as_ref(), 0)?)
    }

    /// Ingest every transaction of `block`, in block order.
    ///
    /// The first fetch, decode or persistence failure aborts the remainder of
    /// the block.
    pub async fn ingest_block(&self, block: &Block) -> Result<IngestReport> {
        let monitor = PerformanceMonitor::new("ingest_block").with_metadata("block_number", json!(block.number));
        let mut report = IngestReport {
            block_number: block.number,
            ..IngestReport::default()
        };

        let result = async {
            for hash in &block.transactions {
                let mut tx = self.create_transaction(*hash).await?;
                stamp_timestamp(&mut tx, block.timestamp);

                let tokens = self.classify_contracts(&tx).await?;
                self.store.write_transaction_with_tokens(&tx, &tokens)?;
                report.token_contracts += tokens.len();

                report.transactions += 1;
                report.events += tx.events.len();
                report.internal_calls += tx.internal_calls.len();

                LogContext::new("transaction_monitor", "ingest_transaction")
                    .with_transaction_hash(&tx.hash.to_string())
                    .with_block_number(tx.block_number)
                    .with_metadata("events", json!(tx.events.len()))
                    .with_metadata("internal_calls", json!(tx.internal_calls.len()))
                    .debug("Transaction persisted");
            }
            Ok::<(), IndexerError>(())
        }
        .await;

        let duration = monitor.finish_with_result(&result);
        result?;

        MetricsLogger::log_block_ingested(block.number, report.transactions, report.token_contracts, duration);
        Ok(report)
    }

    async fn classify_contracts(&self, tx: &Transaction) -> Result<Vec<TokenContract>> {
        let Some(token_monitor) = &self.token_monitor else {
            return Ok(Vec::new());
        };

        let standards = token_monitor.classify(tx).await?;
        Ok(standards
            .into_iter()
            .map(|(address, standard)| TokenContract {
                address,
                standard,
                creation_transaction: tx.hash,
                block_number: tx.block_number,
            })
            .collect())
    }
}

fn stamp_timestamp(tx: &mut Transaction, timestamp: u64) {
    tx.timestamp = timestamp;
    for event in &mut tx.events {
        event.timestamp = timestamp;
    }
}

fn optional_address(field: &str, value: Option<&str>) -> std::result::Result<Address, DecodeError> {
    match value {
        Some(s) => Address::parse(field, s),
        None => Ok(Address::ZERO),
    }
}

fn optional_quantity(field: &str, value: Option<&str>) -> std::result::Result<u64, DecodeError> {
    value.map_or(Ok(0), |s| decode_uint64(field, s))
}

fn optional_bytes(field: &str, value: Option<&str>) -> std::result::Result<HexData, DecodeError> {
    value.map_or(Ok(HexData::default()), |s| decode_bytes(field, s).map(HexData))
}

/// Convert a raw transaction record (and optional call trace) into the canonical model.
pub fn normalize_transaction(
    record: TransactionRecord,
    trace: Option<&CallFrame>,
    timestamp: u64,
) -> std::result::Result<Transaction, DecodeError> {
    let hash = Hash::parse("transaction.hash", &record.hash)?;
    let block_number = decode_uint64("transaction.block.number", &record.block.number)?;
    let block_hash = Hash::parse("transaction.block.hash", &record.block.hash)?;

    let events = record
        .logs
        .iter()
        .map(|log| normalize_event(log, hash, record.index, block_number, block_hash, timestamp))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let internal_calls = match trace {
        Some(root) => root
            .flatten()
            .into_iter()
            .map(normalize_call)
            .collect::<std::result::Result<Vec<_>, _>>()?,
        None => Vec::new(),
    };

    Ok(Transaction {
        hash,
        status: record.status == "0x1",
        block_number,
        block_hash,
        index: record.index,
        nonce: decode_uint64("transaction.nonce", &record.nonce)?,
        from: Address::parse("transaction.from", &record.from.address)?,
        to: optional_address("transaction.to", record.to.as_ref().map(|a| a.address.as_str()))?,
        value: decode_uint64("transaction.value", &record.value)?,
        gas: decode_uint64("transaction.gas", &record.gas)?,
        gas_price: decode_uint64("transaction.gasPrice", &record.gas_price)?,
        gas_used: decode_uint64("transaction.gasUsed", &record.gas_used)?,
        cumulative_gas_used: decode_uint64("transaction.cumulativeGasUsed", &record.cumulative_gas_used)?,
        created_contract: optional_address(
            "transaction.createdContract",
            record.created_contract.as_ref().map(|a| a.address.as_str()),
        )?,
        data: HexData(decode_bytes("transaction.inputData", &record.input_data)?),
        private_data: HexData(decode_bytes("transaction.privateInputData", &record.private_input_data)?),
        is_private: record.is_private,
        timestamp,
        events,
        internal_calls,
    })
}

fn normalize_event(
    log: &LogRecord,
    transaction_hash: Hash,
    transaction_index: u64,
    block_number: u64,
    block_hash: Hash,
    timestamp: u64,
) -> std::result::Result<Event, DecodeError> {
    Ok(Event {
        index: log.index,
        address: Address::parse("log.account", &log.account.address)?,
        topics: log
            .topics
            .iter()
            .map(|topic| Hash::parse("log.topics", topic))
            .collect::<std::result::Result<Vec<_>, _>>()?,
        data: HexData(decode_bytes("log.data", &log.data)?),
        block_number,
        block_hash,
        transaction_hash,
        transaction_index,
        timestamp,
    })
}

fn normalize_call(frame: &CallFrame) -> std::result::Result<InternalCall, DecodeError> {
    Ok(InternalCall {
        from: Address::parse("trace.from", &frame.from)?,
        to: optional_address("trace.to", frame.to.as_deref())?,
        gas: optional_quantity("trace.gas", frame.gas.as_deref())?,
        gas_used: optional_quantity("trace.gasUsed", frame.gas_used.as_deref())?,
        value: optional_quantity("trace.value", frame.value.as_deref())?,
        input: optional_bytes("trace.input", frame.input.as_deref())?,
        output: optional_bytes("trace.output", frame.output.as_deref())?,
        call_type: CallType::parse(&frame.call_type),
    })
}
