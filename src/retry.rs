use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;

use crate::config::RpcConfig;
use crate::error::Recoverable;
use crate::logging::{ErrorLogger, LogContext, PerformanceMonitor};

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Initial delay between retries in seconds
    pub initial_delay_seconds: u64,
    /// Maximum delay between retries in seconds
    pub max_delay_seconds: u64,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Whether to add jitter to prevent thundering herd
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_seconds: 1,
            max_delay_seconds: 60,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Fail on the first error
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay_seconds: 0,
            max_delay_seconds: 0,
            backoff_multiplier: 1.0,
            jitter: false,
        }
    }
}

impl From<&RpcConfig> for RetryConfig {
    fn from(rpc: &RpcConfig) -> Self {
        Self {
            max_attempts: rpc.max_retries.max(1),
            initial_delay_seconds: rpc.retry_delay_seconds,
            max_delay_seconds: rpc.max_retry_delay_seconds,
            ..Self::default()
        }
    }
}

/// Retry mechanism with exponential backoff and jitter
pub struct RetryManager {
    config: RetryConfig,
    operation_name: String,
}

impl RetryManager {
    pub fn new(operation_name: &str, config: RetryConfig) -> Self {
        Self {
            config,
            operation_name: operation_name.to_string(),
        }
    }

    /// Execute an operation, retrying recoverable errors
    pub async fn execute<T, E, F, Fut>(&self, operation: F) -> Result<T, E>
    where
        E: Recoverable,
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let monitor = PerformanceMonitor::new(&format!("retry_{}", self.operation_name));
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(result) => {
                    if attempt > 1 {
                        ErrorLogger::log_recovery_success(&self.operation_name, attempt, monitor.elapsed_ms());
                    }
                    return Ok(result);
                }
                Err(error) => {
                    if !error.is_recoverable() {
                        let context = LogContext::new("retry", &self.operation_name)
                            .with_retry_count(attempt)
                            .with_metadata("reason", serde_json::json!("non_recoverable"));
                        context.debug(&format!("Non-recoverable error, not retrying: {}", error));
                        return Err(error);
                    }

                    ErrorLogger::log_recovery_attempt(&error, attempt, self.config.max_attempts);
                    if attempt >= self.config.max_attempts {
                        return Err(error);
                    }

                    // An error's own hint (e.g. rate limit) wins over the schedule when longer
                    let scheduled = self.calculate_delay(attempt);
                    let hinted = error
                        .retry_delay()
                        .map(|s| Duration::from_secs(s.min(self.config.max_delay_seconds)))
                        .unwrap_or_default();
                    let delay = scheduled.max(hinted);

                    let context = LogContext::new("retry", &self.operation_name)
                        .with_retry_count(attempt)
                        .with_metadata("delay_ms", serde_json::json!(delay.as_millis() as u64));
                    context.info(&format!(
                        "Retrying in {:?} (attempt {} of {})",
                        delay, attempt, self.config.max_attempts
                    ));

                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Calculate delay for the given attempt number
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_delay = self.config.initial_delay_seconds as f64;
        let exponential_delay = base_delay * self.config.backoff_multiplier.powi(attempt as i32 - 1);

        let capped_delay = exponential_delay.min(self.config.max_delay_seconds as f64);

        let final_delay = if self.config.jitter {
            let jitter_factor = 0.1; // 10% jitter
            let jitter = capped_delay * jitter_factor * (rand::random::<f64>() - 0.5);
            (capped_delay + jitter).max(0.0)
        } else {
            capped_delay
        };

        Duration::from_secs_f64(final_delay)
    }
}
