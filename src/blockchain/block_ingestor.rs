use serde_json::json;
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::blockchain::chain_client::ChainClient;
use crate::blockchain::transaction_monitor::{IngestReport, TransactionMonitor};
use crate::database::TransactionStore;
use crate::error::{ChainQueryError, ConfigError, Result};
use crate::logging::{ErrorLogger, LogContext};
use crate::models::Block;
use crate::retry::{RetryConfig, RetryManager};

/// Totals for a range ingestion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeReport {
    pub first_block: u64,
    /// Last block fully persisted, if any
    pub last_block: Option<u64>,
    pub blocks: u64,
    pub transactions: usize,
    pub token_contracts: usize,
}

impl RangeReport {
    fn add(&mut self, block: &IngestReport) {
        self.last_block = Some(block.block_number);
        self.blocks += 1;
        self.transactions += block.transactions;
        self.token_contracts += block.token_contracts;
    }
}

/// Resolve the blocks a run should ingest, ending at `to`.
///
/// An explicit `from` must not exceed `to`. Otherwise the run resumes after
/// `last_persisted`, or at `start_block` (default 0) on an empty store, and
/// `None` means every block up to `to` is already persisted.
pub fn plan_range(
    from: Option<u64>,
    to: u64,
    last_persisted: Option<u64>,
    start_block: Option<u64>,
) -> Result<Option<RangeInclusive<u64>>> {
    if let Some(from) = from {
        if from > to {
            return Err(ConfigError::InvalidValue {
                key: "block range".to_string(),
                value: format!("{}..={}", from, to),
            }
            .into());
        }
        return Ok(Some(from..=to));
    }

    let resume = match last_persisted {
        Some(last) => match last.checked_add(1) {
            Some(next) => next,
            None => return Ok(None),
        },
        None => start_block.unwrap_or(0),
    };
    Ok((resume <= to).then(|| resume..=to))
}

/// Drives the transaction monitor over a bounded range of blocks, one block at a time.
pub struct BlockIngestor<C, S> {
    client: C,
    monitor: TransactionMonitor<C, S>,
    retry_config: RetryConfig,
    pub shutdown_signal: Arc<AtomicBool>,
}

impl<C: ChainClient, S: TransactionStore> BlockIngestor<C, S> {
    pub fn new(client: C, monitor: TransactionMonitor<C, S>, retry_config: RetryConfig) -> Self {
        Self {
            client,
            monitor,
            retry_config,
            shutdown_signal: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Fetch, normalize and persist block `number`, then advance the
    /// last-persisted marker.
    pub async fn ingest_block_number(&self, number: u64) -> Result<IngestReport> {
        let raw = self.client.get_block_by_number(number).await?;
        let block = Block::try_from(raw)?;
        if block.number != number {
            return Err(ChainQueryError::InvalidResponse(format!(
                "requested block {} but node returned {}",
                number, block.number
            ))
            .into());
        }

        let report = self.monitor.ingest_block(&block).await?;

        let store = self.monitor.store();
        store.write_block(&block)?;
        store.set_last_persisted_block(number)?;

        Ok(report)
    }

    /// Ingest `from..=to` in ascending order.
    ///
    /// Recoverable errors are retried per the configured policy; anything else
    /// stops the range and is returned. A block is never skipped.
    pub async fn ingest_range(&self, from: u64, to: u64) -> Result<RangeReport> {
        if from > to {
            return Err(ConfigError::InvalidValue {
                key: "block range".to_string(),
                value: format!("{}..={}", from, to),
            }
            .into());
        }

        let context = LogContext::new("block_ingestor", "ingest_range")
            .with_metadata("from", json!(from))
            .with_metadata("to", json!(to));
        context.info(&format!("Ingesting blocks {} to {}", from, to));

        let mut range = RangeReport {
            first_block: from,
            ..RangeReport::default()
        };

        for number in from..=to {
            if self.shutdown_signal.load(Ordering::Relaxed) {
                LogContext::new("block_ingestor", "ingest_range")
                    .with_block_number(number)
                    .info("Shutdown requested, stopping before block");
                break;
            }

            let retry = RetryManager::new("ingest_block", self.retry_config.clone());
            match retry.execute(|| self.ingest_block_number(number)).await {
                Ok(report) => range.add(&report),
                Err(e) => {
                    ErrorLogger::log_error(
                        &e,
                        Some(LogContext::new("block_ingestor", "ingest_range").with_block_number(number)),
                    );
                    return Err(e);
                }
            }
        }

        LogContext::new("block_ingestor", "ingest_range")
            .with_metadata("blocks", json!(range.blocks))
            .with_metadata("transactions", json!(range.transactions))
            .with_metadata("token_contracts", json!(range.token_contracts))
            .info("Range ingestion finished");

        Ok(range)
    }
}
