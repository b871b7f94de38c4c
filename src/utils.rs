/// Utility functions and helpers for GCS operations
///
/// This module contains various utility functions for validation,
/// formatting, and performance monitoring.

use std::time::{Duration, Instant};
use log::{debug, info, warn};

use crate::error::{GcsError, GcsResult};

/// Performance metrics for GCS transactions
#[derive(Debug, Clone, Default)]
pub struct PerformanceMetrics {
    pub total_transactions: u64,
    pub successful_transactions: u64,
    pub failed_transactions: u64,
    pub total_duration: Duration,
    pub min_duration: Option<Duration>,
    pub max_duration: Option<Duration>,
    pub avg_duration: Duration,
}

impl PerformanceMetrics {
    /// Create new empty metrics
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful transaction
    pub fn record_success(&mut self, duration: Duration) {
        self.total_transactions += 1;
        self.successful_transactions += 1;
        self.total_duration += duration;

        self.min_duration = Some(
            self.min_duration.map_or(duration, |min| min.min(duration))
        );
        self.max_duration = Some(
            self.max_duration.map_or(duration, |max| max.max(duration))
        );

        if self.total_transactions > 0 {
            self.avg_duration = self.total_duration / self.total_transactions as u32;
        }
    }

    /// Record a failed transaction
    pub fn record_failure(&mut self, duration: Duration) {
        self.total_transactions += 1;
        self.failed_transactions += 1;
        self.total_duration += duration;

        if self.total_transactions > 0 {
            self.avg_duration = self.total_duration / self.total_transactions as u32;
        }
    }

    /// Get success rate as percentage
    pub fn success_rate(&self) -> f64 {
        if self.total_transactions == 0 {
            return 0.0;
        }
        (self.successful_transactions as f64 / self.total_transactions as f64) * 100.0
    }

    /// Get transactions per second
    pub fn transactions_per_second(&self) -> f64 {
        if self.total_duration.is_zero() {
            return 0.0;
        }
        self.total_transactions as f64 / self.total_duration.as_secs_f64()
    }

    /// Reset all metrics
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Timer for measuring operation duration
pub struct OperationTimer {
    start: Instant,
    operation_name: String,
}

impl OperationTimer {
    /// Start a new timer
    pub fn start(operation_name: &str) -> Self {
        debug!("Starting operation: {}", operation_name);
        Self {
            start: Instant::now(),
            operation_name: operation_name.to_string(),
        }
    }

    /// Stop the timer and return duration
    pub fn stop(self) -> Duration {
        let duration = self.start.elapsed();
        debug!("Operation '{}' completed in {:?}", self.operation_name, duration);
        duration
    }

    /// Stop timer and log result
    pub fn stop_and_log(self, success: bool) -> Duration {
        let duration = self.start.elapsed();
        if success {
            info!("✅ Operation '{}' succeeded in {:?}", self.operation_name, duration);
        } else {
            warn!("❌ Operation '{}' failed after {:?}", self.operation_name, duration);
        }
        duration
    }
}

/// Data validation utilities
pub mod validation {
    use super::*;

    /// Validate a controller's daisy-chain index (1..=16)
    pub fn validate_controller_index(index: u8) -> GcsResult<()> {
        if index == 0 || index > crate::MAX_CHAIN_INDEX {
            return Err(GcsError::configuration(format!(
                "Invalid controller index: {} (must be 1-{})",
                index,
                crate::MAX_CHAIN_INDEX
            )));
        }
        Ok(())
    }

    /// Validate an axis label
    ///
    /// Axes are addressed as `1..N` or `A..Z` depending on firmware; either
    /// way the label is one alphanumeric token. Anything else would corrupt
    /// the framing of the line it is spliced into.
    pub fn validate_axis(axis: &str) -> GcsResult<()> {
        if axis.is_empty() || !axis.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(GcsError::protocol_misuse(format!(
                "invalid axis label: {:?}",
                axis
            )));
        }
        Ok(())
    }

    /// Check a commanded voltage step against a configured safety limit
    ///
    /// The limit is configuration on the controller client; enforcement is
    /// the caller layer's decision, which is why this lives here and not in
    /// the transaction engine.
    pub fn validate_voltage_delta(current: f64, commanded: f64, limit: f64) -> GcsResult<()> {
        let delta = (commanded - current).abs();
        if delta > limit {
            return Err(GcsError::configuration(format!(
                "Voltage step {:.3} exceeds configured limit {:.3}",
                delta, limit
            )));
        }
        Ok(())
    }
}

/// Formatting and display utilities
pub mod format {
    use super::*;

    /// Format a wire line for display, making control characters visible
    pub fn escape_line(line: &str) -> String {
        line.escape_default().to_string()
    }

    /// Format duration in a human-readable way
    pub fn format_duration(duration: Duration) -> String {
        let millis = duration.as_millis();
        if millis < 1000 {
            format!("{}ms", millis)
        } else if millis < 60_000 {
            format!("{:.2}s", duration.as_secs_f64())
        } else {
            let mins = millis / 60_000;
            let secs = (millis % 60_000) as f64 / 1000.0;
            format!("{}m {:.1}s", mins, secs)
        }
    }

    /// Format performance metrics as a table
    pub fn format_metrics(metrics: &PerformanceMetrics) -> String {
        format!(
            "Performance Metrics:\n\
             ├─ Total Transactions: {}\n\
             ├─ Successful: {} ({:.1}%)\n\
             ├─ Failed: {}\n\
             ├─ Average Duration: {}\n\
             ├─ Min Duration: {}\n\
             ├─ Max Duration: {}\n\
             └─ Transactions/sec: {:.1}",
            metrics.total_transactions,
            metrics.successful_transactions,
            metrics.success_rate(),
            metrics.failed_transactions,
            format_duration(metrics.avg_duration),
            metrics.min_duration.map_or("N/A".to_string(), format_duration),
            metrics.max_duration.map_or("N/A".to_string(), format_duration),
            metrics.transactions_per_second()
        )
    }
}

/// Logging utilities
pub mod logging {
    use super::*;

    /// Initialize simple logger for testing
    pub fn init_test_logger() {
        let _ = env_logger::builder()
            .filter_level(log::LevelFilter::Debug)
            .is_test(true)
            .try_init();
    }

    /// Log a transaction outcome for debugging
    pub fn log_transaction(
        index: u8,
        operation: &str,
        line: &str,
        duration: Duration,
        success: bool,
    ) {
        let status = if success { "✅" } else { "❌" };

        debug!(
            "{} Controller {} {} | Line: {} | Duration: {}",
            status,
            index,
            operation,
            format::escape_line(line),
            format::format_duration(duration)
        );
    }
}
