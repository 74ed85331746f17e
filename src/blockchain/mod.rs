pub mod block_ingestor;
pub mod chain_client;
pub mod rpc_client;
pub mod token_monitor;
pub mod transaction_monitor;

pub use block_ingestor::{plan_range, BlockIngestor, RangeReport};
pub use chain_client::{AccountRef, BlockRef, CallFrame, ChainClient, LogRecord, TransactionRecord};
pub use rpc_client::RpcClient;
pub use token_monitor::{DetectionStage, TokenMonitor};
pub use transaction_monitor::{normalize_transaction, IngestReport, TransactionMonitor};
