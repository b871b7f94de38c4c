//! # Voltage GCS - High-Performance GCS2 Motion Control Library
//!
//! **Author:** Evan Liu <evan.liu@voltageenergy.com>
//! **Version:** 0.2.0
//! **License:** MIT
//!
//! A comprehensive, high-performance client for the GCS2 ASCII command
//! language spoken by multi-axis motion controllers (E-509, E-727, C-884
//! and friends) over TCP or RS-232 daisy chains, in pure Rust.
//!
//! ## Features
//!
//! - **🚀 High Performance**: Async/await support with Tokio for maximum throughput
//! - **🔗 Daisy-Chain Aware**: Index-prefixed framing with reply provenance checks
//! - **🤝 Optional Handshaking**: `ERR?` confirmation turns silent writes into checked outcomes
//! - **🛡️ Memory Safe**: Pure Rust implementation with zero unsafe code
//! - **🔄 Pooled Transport**: Bounded connection pool serializes transactions per controller
//! - **📊 Built-in Monitoring**: Transport, pool, and transaction statistics
//! - **🧪 Hardware-Free Testing**: Ships a controller simulator for integration tests
//!
//! ## Supported Commands
//!
//! | Mnemonic | Operation | Kind |
//! |----------|-----------|------|
//! | `MOV` | Move axis to absolute position | write |
//! | `MVR` | Move axis by relative delta | write |
//! | `POS?` | Read axis position | query |
//! | `SVO` | Enable/disable servo | write |
//! | `SVO?` | Read servo state | query |
//! | `FRF` | Reference axis | write |
//! | `SVA` | Command open-loop voltage | write |
//! | `SVA?` | Read commanded voltage | query |
//! | `WAC ONT?` | Block until axis on-target | write (no reply) |
//! | `ERR?` | Read and clear error code | query |
//!
//! ## Quick Start
//!
//! ### Client Example
//!
//! ```rust,no_run
//! use voltage_gcs::{Controller, GcsResult};
//!
//! #[tokio::main]
//! async fn main() -> GcsResult<()> {
//!     // Controller 1 in the chain, with ERR? handshaking enabled
//!     let controller = Controller::tcp("192.168.100.21:50000", 1, true)?;
//!
//!     controller.enable("1").await?;
//!     controller.home("1").await?;
//!
//!     // Blocks until the axis reports on-target
//!     controller.move_absolute("1", 123.456).await?;
//!
//!     let position = controller.get_position("1").await?;
//!     println!("Axis 1 at {:.6}", position);
//!     Ok(())
//! }
//! ```
//!
//! ### Simulator Example
//!
//! ```rust,no_run
//! use voltage_gcs::{GcsServer, GcsTcpServer, GcsTcpServerConfig};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = GcsTcpServerConfig {
//!         bind_address: "127.0.0.1:50000".parse()?,
//!         controller_index: 1,
//!         settle_time: Duration::from_millis(250),
//!         ..Default::default()
//!     };
//!
//!     let mut server = GcsTcpServer::with_config(config)?;
//!     server.start().await?;
//!
//!     // Server is now running...
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  Axis Op Set    │  move/enable/home/voltage/raw
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │  Transaction    │  write / query / ERR? handshake
//! │  Engine         │
//! └─────────────────┘
//!          │
//! ┌─────────────────┐    ┌─────────────────┐
//! │   Protocol      │    │  Connection     │
//! │  (frame/parse)  │    │  Pool           │
//! └─────────────────┘    └─────────────────┘
//!          │                       │
//! ┌──────────────────────────────────────┐
//! │   Transport (TCP / serial, lines)    │
//! └──────────────────────────────────────┘
//! ```

/// Core error types and result handling
///
/// Author: Evan Liu <evan.liu@voltageenergy.com>
pub mod error;

/// GCS2 protocol definitions and message handling
///
/// Author: Evan Liu <evan.liu@voltageenergy.com>
pub mod protocol;

/// Network transport layer for TCP and serial communication
///
/// Author: Evan Liu <evan.liu@voltageenergy.com>
pub mod transport;

/// Bounded connection pool with error-tagged release
///
/// Author: Evan Liu <evan.liu@voltageenergy.com>
pub mod pool;

/// GCS controller client implementation
///
/// Author: Evan Liu <evan.liu@voltageenergy.com>
pub mod client;

/// GCS controller simulator
///
/// Author: Evan Liu <evan.liu@voltageenergy.com>
pub mod server;

/// Thread-safe axis state storage for the simulator
///
/// Author: Evan Liu <evan.liu@voltageenergy.com>
pub mod axis_bank;

/// Utility functions and performance monitoring
///
/// Author: Evan Liu <evan.liu@voltageenergy.com>
pub mod utils;

/// Logging system for the library
///
/// Author: Evan Liu <evan.liu@voltageenergy.com>
pub mod logging;

// Re-export main types for convenience
pub use error::{GcsError, GcsResult};
pub use protocol::{ControllerIndex, GcsCommand, RawReply};
pub use transport::{
    Connector, GcsTransport, SerialConnector, SerialTransport, TcpConnector, TcpTransport,
    TransportStats,
};
pub use pool::{ConnectionPool, PoolStats};
pub use client::{Controller, MotionControl};
pub use server::{GcsServer, GcsTcpServer, GcsTcpServerConfig, ServerStats};
pub use axis_bank::{AxisBank, AxisBankStats};
pub use utils::{OperationTimer, PerformanceMetrics};
pub use logging::{CallbackLogger, LogCallback, LogLevel, LoggingMode};

/// Default timeout for transactions (30 seconds)
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// TCP port GCS2 controllers listen on by default
pub const DEFAULT_TCP_PORT: u16 = 50_000;

/// Highest controller index addressable in a daisy chain
pub const MAX_CHAIN_INDEX: u8 = 16;

/// Maximum reply size accepted from a controller
pub const MAX_REPLY_SIZE: usize = 1500;

/// Line terminator for both directions
pub const LINE_TERMINATOR: u8 = b'\n';

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library information
pub fn info() -> String {
    format!(
        "Voltage GCS v{} - High-performance GCS2 motion control library by Evan Liu",
        VERSION
    )
}
