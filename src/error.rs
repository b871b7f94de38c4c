//! # Voltage GCS Error Handling
//!
//! This module provides comprehensive error handling for the Voltage GCS library,
//! covering transport failures, protocol shape violations, reply provenance
//! checks, and error codes reported by the motion controller itself.
//!
//! ## Overview
//!
//! The error system is designed to provide clear, actionable error information for
//! different failure scenarios in GCS2 communication. All errors implement standard
//! Rust error traits and provide detailed context information to help with debugging
//! and error recovery.
//!
//! ## Error Categories
//!
//! ### Transport Errors
//! - **I/O Errors**: Network communication failures, serial port issues
//! - **Connection Errors**: Connection establishment and maintenance problems
//! - **Pool Errors**: Bounded connection pool exhausted
//! - **Timeout Errors**: Operation timeouts with specific context
//!
//! ### Protocol Errors
//! - **Protocol Misuse**: A query string handed to the write path (or vice versa),
//!   rejected before any bytes touch the wire
//! - **Malformed Response**: Reply buffers that do not parse into the expected
//!   provenance/payload shape
//! - **Unexpected Source**: Replies whose source address does not match the
//!   issuing controller on a shared daisy-chain bus
//!
//! ### Device Errors
//! - **Controller Errors**: Non-zero error codes reported by the controller via
//!   the `ERR?` handshake, surfaced with the vendor code intact
//!
//! ## Error Recovery
//!
//! Many errors provide information about recoverability:
//!
//! ```rust
//! use voltage_gcs::{GcsError, GcsResult};
//!
//! fn handle_error(result: GcsResult<f64>) {
//!     match result {
//!         Ok(position) => println!("Success: {}", position),
//!         Err(error) => {
//!             if error.is_recoverable() {
//!                 println!("Retryable error: {}", error);
//!                 // Implement retry logic
//!             } else {
//!                 println!("Fatal error: {}", error);
//!                 // Handle permanent failure
//!             }
//!         }
//!     }
//! }
//! ```
//!
//! No retry happens inside the library itself; retry policy, if any, belongs
//! to the caller.
//!
//! ## Usage Examples
//!
//! ### Basic Error Handling
//!
//! ```rust,no_run
//! use voltage_gcs::{Controller, GcsError};
//!
//! async fn read_with_error_handling(controller: &Controller) {
//!     match controller.get_position("1").await {
//!         Ok(position) => {
//!             println!("Axis at {:.6}", position);
//!         },
//!         Err(GcsError::Timeout { operation, timeout_ms }) => {
//!             println!("Timeout during {}: {}ms", operation, timeout_ms);
//!         },
//!         Err(GcsError::Controller { code }) => {
//!             println!("Controller reported error code {}", code);
//!         },
//!         Err(error) => {
//!             println!("Other error: {}", error);
//!         }
//!     }
//! }
//! ```
//!
//! ### Error Classification
//!
//! ```rust
//! use voltage_gcs::GcsError;
//!
//! fn classify_error(error: &GcsError) {
//!     if error.is_transport_error() {
//!         println!("Network/transport issue: {}", error);
//!     } else if error.is_protocol_error() {
//!         println!("GCS2 protocol issue: {}", error);
//!     } else {
//!         println!("Other issue: {}", error);
//!     }
//! }
//! ```

use thiserror::Error;

/// Result type alias for GCS operations
///
/// This is a convenience type alias that uses `GcsError` as the error type
/// for all GCS operations, providing consistent error handling throughout
/// the codebase.
pub type GcsResult<T> = Result<T, GcsError>;

/// Comprehensive GCS error types
///
/// This enumeration covers all possible error conditions that can occur during
/// GCS2 communication, from transport-level issues to protocol violations and
/// controller-reported failures.
///
/// Each variant provides detailed context about the specific failure, making it
/// easier to diagnose issues and implement appropriate recovery strategies.
#[derive(Error, Debug, Clone)]
pub enum GcsError {
    /// I/O related errors (network, serial)
    ///
    /// Covers low-level I/O failures including network socket errors and
    /// serial port communication issues.
    ///
    /// # Examples
    /// - TCP connection reset mid-transaction
    /// - Serial port access denied
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Connection errors
    ///
    /// Specific to connection establishment and maintenance issues that
    /// are distinct from general I/O errors. The connector's own backoff
    /// has already been exhausted when this surfaces.
    ///
    /// # Examples
    /// - Connection refused by the controller's TCP endpoint
    /// - Serial device absent
    #[error("Connection error: {message}")]
    Connection { message: String },

    /// Connection pool exhausted
    ///
    /// The bounded pool could not hand out a connection within the acquire
    /// timeout. With the default single-connection pool this usually means
    /// another transaction (possibly a long `WAC ONT?` wait) is still in
    /// flight.
    #[error("Connection pool exhausted: {message}")]
    PoolExhausted { message: String },

    /// Timeout errors
    ///
    /// Occurs when a read or write exceeds the controller's configured
    /// deadline. The connection that timed out is discarded from the pool
    /// rather than reused in an unknown mid-protocol state.
    ///
    /// # Examples
    /// - Reply never arrived for a query
    /// - Motion did not reach target within the deadline
    #[error("Timeout after {timeout_ms}ms: {operation}")]
    Timeout { operation: String, timeout_ms: u64 },

    /// Protocol shape violation, detected before any I/O
    ///
    /// A write operation was given a message containing `?` (a query), or a
    /// query operation was given a message lacking `?`. Always recoverable
    /// by fixing the call.
    #[error("Protocol misuse: {message}")]
    ProtocolMisuse { message: String },

    /// Reply does not parse into the expected provenance/payload shape
    ///
    /// # Examples
    /// - Source address field is not numeric
    /// - Empty payload where a value was expected
    /// - Value field does not parse as a float
    #[error("Malformed response: {message}")]
    MalformedResponse { message: String },

    /// Reply provenance mismatch on a shared daisy-chain bus
    ///
    /// The reply's source address does not match the issuing controller's
    /// index. Stale or misdirected replies must never be mistaken for the
    /// expected answer, so this is always surfaced.
    #[error("Unexpected source: reply from controller {actual}, expected {expected}")]
    UnexpectedSource { expected: u8, actual: u8 },

    /// Non-zero error code reported by the controller
    ///
    /// Returned by the `ERR?` handshake appended to write transactions when
    /// handshaking is enabled. The numeric code is vendor-defined and passed
    /// through intact for the caller to interpret or log.
    #[error("Controller reported error code {code}")]
    Controller { code: i32 },

    /// Configuration errors
    ///
    /// # Examples
    /// - Controller index outside the daisy-chain range
    /// - Malformed bind or target address
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Internal errors (should not occur in normal operation)
    ///
    /// Library internal errors that indicate bugs or unexpected
    /// conditions, e.g. a poisoned lock in the simulator's axis store.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl GcsError {
    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io { message: message.into() }
    }

    /// Create a new connection error
    pub fn connection<S: Into<String>>(message: S) -> Self {
        Self::Connection { message: message.into() }
    }

    /// Create a new pool-exhausted error
    pub fn pool_exhausted<S: Into<String>>(message: S) -> Self {
        Self::PoolExhausted { message: message.into() }
    }

    /// Create a new timeout error
    ///
    /// # Arguments
    ///
    /// * `operation` - Description of the operation that timed out
    /// * `timeout_ms` - Timeout duration in milliseconds
    pub fn timeout<S: Into<String>>(operation: S, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Create a new protocol misuse error
    pub fn protocol_misuse<S: Into<String>>(message: S) -> Self {
        Self::ProtocolMisuse { message: message.into() }
    }

    /// Create a new malformed response error
    pub fn malformed<S: Into<String>>(message: S) -> Self {
        Self::MalformedResponse { message: message.into() }
    }

    /// Create an unexpected source error
    ///
    /// # Arguments
    ///
    /// * `expected` - The issuing controller's daisy-chain index
    /// * `actual` - The source index parsed from the reply
    pub fn unexpected_source(expected: u8, actual: u8) -> Self {
        Self::UnexpectedSource { expected, actual }
    }

    /// Create a controller error from a vendor error code
    ///
    /// The code space is vendor-defined; no message lookup is performed.
    pub fn controller(code: i32) -> Self {
        Self::Controller { code }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Check if the error is recoverable (can retry)
    ///
    /// Determines whether an operation that failed with this error
    /// might succeed if retried, helping callers implement their own
    /// retry strategies.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use voltage_gcs::GcsError;
    ///
    /// let timeout_error = GcsError::timeout("read reply", 30000);
    /// assert!(timeout_error.is_recoverable());
    ///
    /// let misuse = GcsError::protocol_misuse("query passed to write");
    /// assert!(!misuse.is_recoverable());
    /// ```
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Io { .. }
                | Self::Connection { .. }
                | Self::PoolExhausted { .. }
                | Self::Timeout { .. }
        )
    }

    /// Check if the error is a network/transport issue
    ///
    /// Identifies errors related to the underlying transport (TCP, serial,
    /// pool) rather than GCS2 protocol issues.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use voltage_gcs::GcsError;
    ///
    /// let connection_error = GcsError::connection("Connection refused");
    /// assert!(connection_error.is_transport_error());
    ///
    /// let controller_error = GcsError::controller(6);
    /// assert!(!controller_error.is_transport_error());
    /// ```
    pub fn is_transport_error(&self) -> bool {
        matches!(
            self,
            Self::Io { .. }
                | Self::Connection { .. }
                | Self::PoolExhausted { .. }
                | Self::Timeout { .. }
        )
    }

    /// Check if the error is a protocol issue
    ///
    /// Identifies errors related to GCS2 framing, parsing, provenance, or
    /// controller-reported failures.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use voltage_gcs::GcsError;
    ///
    /// let bad_reply = GcsError::malformed("source address not numeric");
    /// assert!(bad_reply.is_protocol_error());
    ///
    /// let io_error = GcsError::io("Network unreachable");
    /// assert!(!io_error.is_protocol_error());
    /// ```
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            Self::ProtocolMisuse { .. }
                | Self::MalformedResponse { .. }
                | Self::UnexpectedSource { .. }
                | Self::Controller { .. }
        )
    }
}

/// Convert from std::io::Error
///
/// Automatically converts standard I/O errors to `GcsError::Io`,
/// preserving the original error message for debugging.
impl From<std::io::Error> for GcsError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}

/// Convert from tokio timeout errors
///
/// Converts Tokio's timeout errors to `GcsError::Timeout` with
/// a generic timeout message (specific timeout duration should be
/// provided when creating timeout errors manually).
impl From<tokio::time::error::Elapsed> for GcsError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Self::timeout("Operation timeout", 0)
    }
}

/// Convert from serde JSON errors
impl From<serde_json::Error> for GcsError {
    fn from(err: serde_json::Error) -> Self {
        Self::malformed(format!("JSON error: {}", err))
    }
}
