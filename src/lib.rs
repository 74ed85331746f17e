pub mod blockchain;
pub mod config;
pub mod database;
pub mod error;
pub mod logging;
pub mod models;
pub mod retry;

pub use blockchain::{BlockIngestor, ChainClient, RpcClient, TokenMonitor, TransactionMonitor};
pub use config::{AppConfig, DatabaseConfig, LoggingConfig, ProcessingConfig, RpcConfig};
pub use database::{Database, TransactionStore};
pub use error::{IndexerError, Result};
pub use logging::{ErrorLogger, LogContext, MetricsLogger, PerformanceMonitor};
pub use retry::{RetryConfig, RetryManager};
