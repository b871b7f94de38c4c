/// High-level GCS2 controller client
///
/// This module provides the transaction engine and the axis operation set
/// built on top of it.
///
/// The key protocol asymmetry is that write commands elicit no reply
/// (success is silent) while queries elicit exactly one reply. The engine
/// therefore keeps two disciplines: `write` sends index-prefixed lines and
/// optionally confirms them with an `ERR?` handshake, `query` sends one
/// line and reads one provenance-checked reply. Both acquire a pooled
/// connection for the whole transaction and release it on every path,
/// tagged with the error when one occurred, so the pool can discard a link
/// left in an unknown mid-protocol state.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::GcsResult;
use crate::logging::CallbackLogger;
use crate::pool::{ConnectionPool, PoolStats};
use crate::protocol::{self, ControllerIndex, GcsCommand};
use crate::transport::{GcsTransport, SerialConnector, TcpConnector};
use crate::utils::validation;

/// Trait defining the axis operations of a motion controller
///
/// This trait provides async methods for the supported GCS2 operations,
/// with the wire mnemonics noted for reference.
#[async_trait]
pub trait MotionControl: Send + Sync {
    /// Move an axis to an absolute position and wait until on-target (`MOV` + `WAC ONT?`)
    async fn move_absolute(&self, axis: &str, position: f64) -> GcsResult<()>;

    /// Move an axis by a relative delta and wait until on-target (`MVR` + `WAC ONT?`)
    async fn move_relative(&self, axis: &str, delta: f64) -> GcsResult<()>;

    /// Enable servo control on an axis (`SVO <axis> 1`)
    async fn enable(&self, axis: &str) -> GcsResult<()>;

    /// Disable servo control on an axis (`SVO <axis> 0`)
    async fn disable(&self, axis: &str) -> GcsResult<()>;

    /// Query whether servo control is enabled on an axis (`SVO?`)
    async fn get_enabled(&self, axis: &str) -> GcsResult<bool>;

    /// Query the current position of an axis (`POS?`)
    async fn get_position(&self, axis: &str) -> GcsResult<f64>;

    /// Reference an axis against its reference switch (`FRF`)
    async fn home(&self, axis: &str) -> GcsResult<()>;

    /// Command an open-loop voltage on an axis (`SVA`)
    async fn set_voltage(&self, axis: &str, volts: f64) -> GcsResult<()>;

    /// Query the commanded voltage on an axis (`SVA?`)
    async fn get_voltage(&self, axis: &str) -> GcsResult<f64>;

    /// Send an ad-hoc command, dispatching on shape
    ///
    /// A string containing `?` is forwarded to the query path and its
    /// payload returned; anything else is forwarded to the write path and
    /// returns `None`. Exists for diagnostics without growing the typed
    /// surface.
    async fn raw(&self, command: &str) -> GcsResult<Option<String>>;
}

/// Client for one GCS2 controller, e.g. an E-509, E-727 or C-884
///
/// A controller is identified by its network index within the daisy chain
/// (1..=16; a single-controller network uses index 1). The index is
/// prepended to every outbound line and checked against the source address
/// of every addressed reply.
///
/// Configuration is mutable at runtime:
///
/// - `timeout` — deadline applied to each read/write of a transaction.
/// - `handshaking` — when enabled, every write transaction is confirmed
///   with an appended `ERR?` query and a non-zero code fails the call.
///   Higher throughput can be achieved without error checking in exchange
///   for reduced safety.
/// - `max_voltage_delta` — optional safety limit on the voltage step
///   between consecutive commands, for the caller layer to consult (see
///   [`validation::validate_voltage_delta`]); the transaction engine does
///   not enforce it.
pub struct Controller {
    index: ControllerIndex,
    pool: Arc<ConnectionPool>,
    timeout: Duration,
    handshaking: bool,
    max_voltage_delta: Option<f64>,
    logger: Option<CallbackLogger>,
}

impl Controller {
    /// Create a controller client over an existing connection pool
    ///
    /// The pool determines the transaction concurrency; the default
    /// single-connection pool serializes transactions, which the
    /// correlation-free wire protocol requires.
    pub fn with_pool(
        pool: Arc<ConnectionPool>,
        index: ControllerIndex,
        handshaking: bool,
    ) -> GcsResult<Self> {
        validation::validate_controller_index(index)?;
        Ok(Self {
            index,
            pool,
            timeout: Duration::from_millis(crate::DEFAULT_TIMEOUT_MS),
            handshaking,
            max_voltage_delta: None,
            logger: None,
        })
    }

    /// Create a controller client for a TCP endpoint
    ///
    /// Uses a single-connection pool with a backing-off connector; the
    /// first transaction dials the link.
    pub fn tcp(addr: &str, index: ControllerIndex, handshaking: bool) -> GcsResult<Self> {
        let connector = TcpConnector::from_address(addr)?;
        let pool = ConnectionPool::new(
            1,
            Duration::from_millis(crate::DEFAULT_TIMEOUT_MS),
            Box::new(connector),
        );
        Self::with_pool(Arc::new(pool), index, handshaking)
    }

    /// Create a controller client for a serial (RS-232) daisy chain
    pub fn serial(
        port: &str,
        baud_rate: u32,
        index: ControllerIndex,
        handshaking: bool,
    ) -> GcsResult<Self> {
        let connector = SerialConnector::new(port, baud_rate);
        let pool = ConnectionPool::new(
            1,
            Duration::from_millis(crate::DEFAULT_TIMEOUT_MS),
            Box::new(connector),
        );
        Self::with_pool(Arc::new(pool), index, handshaking)
    }

    /// Attach a callback logger for command/reply tracing
    pub fn with_logger(mut self, logger: CallbackLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// The controller's network index in the daisy chain
    pub fn index(&self) -> ControllerIndex {
        self.index
    }

    /// The per-read/write deadline applied to transactions
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Set the per-read/write deadline applied to transactions
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Whether write transactions are confirmed with an `ERR?` handshake
    pub fn handshaking(&self) -> bool {
        self.handshaking
    }

    /// Enable or disable the `ERR?` handshake on write transactions
    pub fn set_handshaking(&mut self, handshaking: bool) {
        self.handshaking = handshaking;
    }

    /// The configured maximum voltage step, if any
    pub fn max_voltage_delta(&self) -> Option<f64> {
        self.max_voltage_delta
    }

    /// Configure the maximum voltage step for the caller layer to consult
    pub fn set_max_voltage_delta(&mut self, limit: Option<f64>) {
        self.max_voltage_delta = limit;
    }

    /// Get a handle to the underlying connection pool
    pub fn pool(&self) -> Arc<ConnectionPool> {
        self.pool.clone()
    }

    /// Get connection pool statistics
    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Write command(s) to the controller as one transaction
    ///
    /// The controller index is automatically prepended to each message.
    /// Messages containing `?` are rejected before any I/O, as they are
    /// queries. With handshaking enabled, the transaction is confirmed with
    /// an appended `ERR?` query whose decoded outcome becomes the return
    /// value; without it, success means only that the bytes were sent.
    pub async fn write<S: AsRef<str>>(&self, msgs: &[S]) -> GcsResult<()> {
        let lines = protocol::build_write(self.index, msgs)?;
        self.run_write(lines).await
    }

    /// Send a query to the controller and return the reply payload
    ///
    /// The controller index is automatically prepended. Messages lacking
    /// `?` are rejected before any I/O. The reply's source address must
    /// match this controller's index; the payload is returned with the
    /// address prefix stripped.
    pub async fn query(&self, msg: &str) -> GcsResult<String> {
        let line = protocol::build_query(self.index, msg)?;

        let mut conn = self.pool.acquire().await?;
        conn.set_deadline(self.timeout);
        let result = self.query_on(conn.as_mut(), &line).await;
        self.pool.release(conn, result.as_ref().err()).await;
        result
    }

    /// Run an already-framed write transaction
    async fn run_write(&self, lines: Vec<String>) -> GcsResult<()> {
        let mut conn = self.pool.acquire().await?;
        conn.set_deadline(self.timeout);
        let result = self.write_on(conn.as_mut(), &lines).await;
        self.pool.release(conn, result.as_ref().err()).await;
        result
    }

    async fn write_on(&self, conn: &mut dyn GcsTransport, lines: &[String]) -> GcsResult<()> {
        for line in lines {
            if let Some(logger) = &self.logger {
                logger.log_command(line);
            }
            conn.send_line(line).await?;
        }

        if self.handshaking {
            let err_query = protocol::frame_line(self.index, GcsCommand::GetError.mnemonic());
            if let Some(logger) = &self.logger {
                logger.log_command(&err_query);
            }
            conn.send_line(&err_query).await?;

            let raw = conn.recv_line().await?;
            if let Some(logger) = &self.logger {
                logger.log_reply(&raw);
            }
            let code = protocol::decode_error_code(&raw)?;
            protocol::check_error_code(code)?;
        }

        Ok(())
    }

    async fn query_on(&self, conn: &mut dyn GcsTransport, line: &str) -> GcsResult<String> {
        if let Some(logger) = &self.logger {
            logger.log_command(line);
        }
        conn.send_line(line).await?;

        let raw = conn.recv_line().await?;
        if let Some(logger) = &self.logger {
            logger.log_reply(&raw);
        }

        let reply = protocol::RawReply::parse(&raw)?;
        reply.verify_source(self.index)?;
        Ok(reply.payload)
    }

    /// Query an axis and decode the payload as a boolean
    async fn read_bool(&self, cmd: GcsCommand, axis: &str) -> GcsResult<bool> {
        validation::validate_axis(axis)?;
        let payload = self.query(&format!("{} {}", cmd.mnemonic(), axis)).await?;
        protocol::decode_bool(protocol::strip_axis_echo(axis, &payload))
    }

    /// Query an axis and decode the payload as a float
    async fn read_float(&self, cmd: GcsCommand, axis: &str) -> GcsResult<f64> {
        validation::validate_axis(axis)?;
        let payload = self.query(&format!("{} {}", cmd.mnemonic(), axis)).await?;
        protocol::decode_float(protocol::strip_axis_echo(axis, &payload))
    }

    /// Issue a motion command followed by a wait-on-target in one transaction
    ///
    /// The wait line blocks the controller (and hence this call) until the
    /// axis reports on-target, making the motion synchronous from the
    /// caller's perspective. The wait mnemonic contains `?` but elicits no
    /// reply, so it is framed as a write after the user-influenced motion
    /// line has been validated.
    async fn motion(&self, cmd: GcsCommand, axis: &str, target: f64) -> GcsResult<()> {
        validation::validate_axis(axis)?;
        let motion_line = format!("{} {} {:.9}", cmd.mnemonic(), axis, target);
        let mut lines = protocol::build_write(self.index, &[motion_line.as_str()])?;
        lines.push(protocol::frame_line(
            self.index,
            &format!("{} {} = 1", GcsCommand::WaitOnTarget.mnemonic(), axis),
        ));
        self.run_write(lines).await
    }

    /// Move an axis to an absolute position and wait until on-target
    pub async fn move_absolute(&self, axis: &str, position: f64) -> GcsResult<()> {
        self.motion(GcsCommand::MoveAbsolute, axis, position).await
    }

    /// Move an axis by a relative delta and wait until on-target
    pub async fn move_relative(&self, axis: &str, delta: f64) -> GcsResult<()> {
        self.motion(GcsCommand::MoveRelative, axis, delta).await
    }

    /// Enable servo control on an axis
    pub async fn enable(&self, axis: &str) -> GcsResult<()> {
        validation::validate_axis(axis)?;
        self.write(&[format!("{} {} 1", GcsCommand::SetServo.mnemonic(), axis)])
            .await
    }

    /// Disable servo control on an axis
    pub async fn disable(&self, axis: &str) -> GcsResult<()> {
        validation::validate_axis(axis)?;
        self.write(&[format!("{} {} 0", GcsCommand::SetServo.mnemonic(), axis)])
            .await
    }

    /// Query whether servo control is enabled on an axis
    pub async fn get_enabled(&self, axis: &str) -> GcsResult<bool> {
        self.read_bool(GcsCommand::GetServo, axis).await
    }

    /// Query the current position of an axis
    pub async fn get_position(&self, axis: &str) -> GcsResult<f64> {
        self.read_float(GcsCommand::GetPosition, axis).await
    }

    /// Reference an axis against its reference switch
    pub async fn home(&self, axis: &str) -> GcsResult<()> {
        validation::validate_axis(axis)?;
        self.write(&[format!("{} {}", GcsCommand::FindReference.mnemonic(), axis)])
            .await
    }

    /// Command an open-loop voltage on an axis
    pub async fn set_voltage(&self, axis: &str, volts: f64) -> GcsResult<()> {
        validation::validate_axis(axis)?;
        self.write(&[format!(
            "{} {} {:.9}",
            GcsCommand::SetVoltage.mnemonic(),
            axis,
            volts
        )])
        .await
    }

    /// Query the commanded voltage on an axis
    pub async fn get_voltage(&self, axis: &str) -> GcsResult<f64> {
        self.read_float(GcsCommand::GetVoltage, axis).await
    }

    /// Send an ad-hoc command, dispatching on shape
    pub async fn raw(&self, command: &str) -> GcsResult<Option<String>> {
        if protocol::is_query_message(command) {
            Ok(Some(self.query(command).await?))
        } else {
            self.write(&[command]).await?;
            Ok(None)
        }
    }
}

#[async_trait]
impl MotionControl for Controller {
    async fn move_absolute(&self, axis: &str, position: f64) -> GcsResult<()> {
        Controller::move_absolute(self, axis, position).await
    }

    async fn move_relative(&self, axis: &str, delta: f64) -> GcsResult<()> {
        Controller::move_relative(self, axis, delta).await
    }

    async fn enable(&self, axis: &str) -> GcsResult<()> {
        Controller::enable(self, axis).await
    }

    async fn disable(&self, axis: &str) -> GcsResult<()> {
        Controller::disable(self, axis).await
    }

    async fn get_enabled(&self, axis: &str) -> GcsResult<bool> {
        Controller::get_enabled(self, axis).await
    }

    async fn get_position(&self, axis: &str) -> GcsResult<f64> {
        Controller::get_position(self, axis).await
    }

    async fn home(&self, axis: &str) -> GcsResult<()> {
        Controller::home(self, axis).await
    }

    async fn set_voltage(&self, axis: &str, volts: f64) -> GcsResult<()> {
        Controller::set_voltage(self, axis, volts).await
    }

    async fn get_voltage(&self, axis: &str) -> GcsResult<f64> {
        Controller::get_voltage(self, axis).await
    }

    async fn raw(&self, command: &str) -> GcsResult<Option<String>> {
        Controller::raw(self, command).await
    }
}
