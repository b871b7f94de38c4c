/// GCS2 controller simulator
///
/// This module provides a TCP server that behaves like a single GCS2
/// controller in a daisy chain, for exercising the client without physical
/// hardware.
///
/// The simulator honors the protocol's defining quirks: write commands are
/// silent (an invalid one only latches an error code for `ERR?` to report),
/// queries get exactly one addressed reply of the form
/// `0 <index> <payload>`, lines addressed to a different controller index
/// are ignored entirely, and `WAC ONT?` stalls command processing until the
/// axis settles, which is what makes client-side motion calls block until
/// completion.

use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Mutex};
use tokio::time::{sleep, timeout};
use log::{debug, error, info, warn};

use crate::axis_bank::{AxisBank, AxisBankStats};
use crate::error::{GcsError, GcsResult};
use crate::protocol::ControllerIndex;

/// Error code latched for an unknown mnemonic
const ERR_UNKNOWN_COMMAND: i32 = 2;

/// Error code latched for missing or unparseable arguments
const ERR_PARAM_SYNTAX: i32 = 1;

/// Poll interval while a wait-on-target condition is pending
const ONT_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// GCS simulator server trait
#[async_trait]
pub trait GcsServer: Send + Sync {
    /// Start the server
    async fn start(&mut self) -> GcsResult<()>;

    /// Stop the server
    async fn stop(&mut self) -> GcsResult<()>;

    /// Check if server is running
    fn is_running(&self) -> bool;

    /// Get server statistics
    fn get_stats(&self) -> ServerStats;

    /// Get the axis bank backing the simulated controller
    fn axis_bank(&self) -> Arc<AxisBank>;
}

/// Server statistics
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    pub connections_count: u64,
    pub total_commands: u64,
    pub replies_sent: u64,
    pub ignored_lines: u64,
    pub failed_commands: u64,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub uptime_seconds: u64,
    pub axis_bank_stats: Option<AxisBankStats>,
}

/// GCS TCP simulator configuration
#[derive(Debug, Clone)]
pub struct GcsTcpServerConfig {
    pub bind_address: SocketAddr,
    /// Daisy-chain index the simulated controller answers to
    pub controller_index: ControllerIndex,
    pub max_connections: usize,
    pub request_timeout: Duration,
    /// How long a commanded motion takes to report on-target
    pub settle_time: Duration,
    pub axis_bank: Option<Arc<AxisBank>>,
}

impl Default for GcsTcpServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:50000".parse().unwrap(),
            controller_index: 1,
            max_connections: 50,
            request_timeout: Duration::from_secs(30),
            settle_time: Duration::ZERO,
            axis_bank: None,
        }
    }
}

/// GCS TCP simulator implementation
pub struct GcsTcpServer {
    config: GcsTcpServerConfig,
    axis_bank: Arc<AxisBank>,
    stats: Arc<Mutex<ServerStats>>,
    shutdown_tx: Option<broadcast::Sender<()>>,
    is_running: Arc<AtomicBool>,
    start_time: Option<std::time::Instant>,
    local_addr: Option<SocketAddr>,
}

impl GcsTcpServer {
    /// Create a simulator with default configuration on the given address
    pub fn new(bind_address: &str) -> GcsResult<Self> {
        let addr = bind_address
            .parse()
            .map_err(|e| GcsError::configuration(format!("Invalid bind address: {}", e)))?;

        let config = GcsTcpServerConfig {
            bind_address: addr,
            ..Default::default()
        };

        Self::with_config(config)
    }

    /// Create a simulator with custom configuration
    pub fn with_config(config: GcsTcpServerConfig) -> GcsResult<Self> {
        let axis_bank = config
            .axis_bank
            .clone()
            .unwrap_or_else(|| Arc::new(AxisBank::with_settle_time(config.settle_time)));

        Ok(Self {
            config,
            axis_bank,
            stats: Arc::new(Mutex::new(ServerStats::default())),
            shutdown_tx: None,
            is_running: Arc::new(AtomicBool::new(false)),
            start_time: None,
            local_addr: None,
        })
    }

    /// The address the server actually bound (useful with port 0)
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Handle one client connection
    async fn handle_client(
        stream: TcpStream,
        index: ControllerIndex,
        axis_bank: Arc<AxisBank>,
        stats: Arc<Mutex<ServerStats>>,
        mut shutdown_rx: broadcast::Receiver<()>,
        request_timeout: Duration,
    ) {
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        info!("📡 New client connected: {}", peer_addr);

        {
            let mut stats = stats.lock().await;
            stats.connections_count += 1;
        }

        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    debug!("Shutdown signal received for client {}", peer_addr);
                    break;
                }

                result = timeout(request_timeout, lines.next_line()) => {
                    match result {
                        Ok(Ok(None)) => {
                            debug!("Client {} disconnected", peer_addr);
                            break;
                        }
                        Ok(Ok(Some(line))) => {
                            {
                                let mut stats = stats.lock().await;
                                stats.total_commands += 1;
                                stats.bytes_received += line.len() as u64 + 1;
                            }

                            match Self::process_line(&line, index, &axis_bank, request_timeout).await {
                                Ok(Some(reply)) => {
                                    let framed = format!("{}\n", reply);
                                    if let Err(e) = write_half.write_all(framed.as_bytes()).await {
                                        error!("Failed to send reply to {}: {}", peer_addr, e);
                                        break;
                                    }
                                    let mut stats = stats.lock().await;
                                    stats.replies_sent += 1;
                                    stats.bytes_sent += framed.len() as u64;
                                }
                                Ok(None) => {
                                    // Write command or foreign address: silence
                                    // is the correct wire behavior.
                                }
                                Err(e) => {
                                    error!("Error processing line from {}: {}", peer_addr, e);
                                    let mut stats = stats.lock().await;
                                    stats.failed_commands += 1;
                                }
                            }
                        }
                        Ok(Err(e)) => {
                            error!("Read error from {}: {}", peer_addr, e);
                            break;
                        }
                        Err(_) => {
                            warn!("Read timeout from {}", peer_addr);
                            break;
                        }
                    }
                }
            }
        }

        info!("🔌 Client {} disconnected", peer_addr);
    }

    /// Process one command line; `Some` is the reply to send
    ///
    /// Lines addressed to another controller index yield no reply and no
    /// state change. Unaddressed lines are the single-controller shorthand
    /// and are answered without address fields.
    async fn process_line(
        line: &str,
        index: ControllerIndex,
        axis_bank: &Arc<AxisBank>,
        request_timeout: Duration,
    ) -> GcsResult<Option<String>> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.is_empty() {
            return Ok(None);
        }

        let (addressed, rest) = match tokens[0].parse::<ControllerIndex>() {
            Ok(dest) => {
                if dest != index {
                    debug!("Ignoring line for controller {}: {:?}", dest, line);
                    return Ok(None);
                }
                (true, &tokens[1..])
            }
            // No address prefix: implicit controller 1.
            Err(_) => {
                if index != 1 {
                    return Ok(None);
                }
                (false, &tokens[..])
            }
        };

        let payload = Self::dispatch(rest, axis_bank, request_timeout).await?;

        Ok(payload.map(|payload| {
            if addressed {
                format!("0 {} {}", index, payload)
            } else {
                payload
            }
        }))
    }

    /// Execute a command against the axis bank; `Some` is the reply payload
    async fn dispatch(
        tokens: &[&str],
        bank: &Arc<AxisBank>,
        request_timeout: Duration,
    ) -> GcsResult<Option<String>> {
        let mnemonic = match tokens.first() {
            Some(m) => *m,
            None => return Ok(None),
        };

        match mnemonic {
            "MOV" | "MVR" => {
                let (axis, value) = match Self::axis_value_args(&tokens[1..]) {
                    Some(args) => args,
                    None => {
                        bank.set_error(ERR_PARAM_SYNTAX)?;
                        return Ok(None);
                    }
                };
                if mnemonic == "MOV" {
                    bank.move_absolute(axis, value)?;
                } else {
                    bank.move_relative(axis, value)?;
                }
                Ok(None)
            }
            "POS?" => match tokens.get(1) {
                Some(axis) => {
                    let position = bank.position(axis)?;
                    Ok(Some(format!("{}={:.7}", axis, position)))
                }
                None => {
                    bank.set_error(ERR_PARAM_SYNTAX)?;
                    Ok(None)
                }
            },
            "SVO" => {
                let (axis, value) = match Self::axis_value_args(&tokens[1..]) {
                    Some(args) => args,
                    None => {
                        bank.set_error(ERR_PARAM_SYNTAX)?;
                        return Ok(None);
                    }
                };
                bank.set_servo(axis, value != 0.0)?;
                Ok(None)
            }
            "SVO?" => match tokens.get(1) {
                Some(axis) => {
                    let enabled = bank.servo(axis)?;
                    Ok(Some(format!("{}={}", axis, if enabled { 1 } else { 0 })))
                }
                None => {
                    bank.set_error(ERR_PARAM_SYNTAX)?;
                    Ok(None)
                }
            },
            "FRF" => match tokens.get(1) {
                Some(axis) => {
                    bank.find_reference(axis)?;
                    Ok(None)
                }
                None => {
                    bank.set_error(ERR_PARAM_SYNTAX)?;
                    Ok(None)
                }
            },
            "SVA" => {
                let (axis, value) = match Self::axis_value_args(&tokens[1..]) {
                    Some(args) => args,
                    None => {
                        bank.set_error(ERR_PARAM_SYNTAX)?;
                        return Ok(None);
                    }
                };
                bank.set_voltage(axis, value)?;
                Ok(None)
            }
            "SVA?" => match tokens.get(1) {
                Some(axis) => {
                    let volts = bank.voltage(axis)?;
                    Ok(Some(format!("{}={:.7}", axis, volts)))
                }
                None => {
                    bank.set_error(ERR_PARAM_SYNTAX)?;
                    Ok(None)
                }
            },
            "WAC" => {
                // WAC ONT? <axis> = 1: stall command processing until the
                // axis settles. No reply either way.
                if tokens.len() < 3 || tokens[1] != "ONT?" {
                    bank.set_error(ERR_PARAM_SYNTAX)?;
                    return Ok(None);
                }
                let axis = tokens[2];
                let wait = async {
                    loop {
                        match bank.on_target(axis) {
                            Ok(true) => break,
                            Ok(false) => sleep(ONT_POLL_INTERVAL).await,
                            Err(_) => break,
                        }
                    }
                };
                if timeout(request_timeout, wait).await.is_err() {
                    warn!("wait-on-target for axis {} gave up after {:?}", axis, request_timeout);
                }
                Ok(None)
            }
            "ERR?" => {
                let code = bank.take_error()?;
                Ok(Some(format!("{}", code)))
            }
            _ => {
                debug!("Unknown mnemonic {:?}", mnemonic);
                bank.set_error(ERR_UNKNOWN_COMMAND)?;
                Ok(None)
            }
        }
    }

    /// Parse `<axis> <value>` arguments
    fn axis_value_args<'a>(tokens: &[&'a str]) -> Option<(&'a str, f64)> {
        match tokens {
            [axis, value] => value.parse::<f64>().ok().map(|v| (*axis, v)),
            _ => None,
        }
    }
}

#[async_trait]
impl GcsServer for GcsTcpServer {
    async fn start(&mut self) -> GcsResult<()> {
        if self.is_running.load(Ordering::SeqCst) {
            return Err(GcsError::configuration("Server is already running"));
        }

        info!("🚀 Starting GCS simulator on {}", self.config.bind_address);

        let listener = TcpListener::bind(self.config.bind_address).await.map_err(|e| {
            GcsError::connection(format!(
                "Failed to bind to {}: {}",
                self.config.bind_address, e
            ))
        })?;
        self.local_addr = listener.local_addr().ok();

        let (shutdown_tx, _) = broadcast::channel(1);
        self.shutdown_tx = Some(shutdown_tx.clone());
        self.start_time = Some(std::time::Instant::now());
        self.is_running.store(true, Ordering::SeqCst);

        info!("✅ GCS simulator started successfully");
        info!("📊 Server configuration:");
        info!("   - Bind address: {:?}", self.local_addr);
        info!("   - Controller index: {}", self.config.controller_index);
        info!("   - Settle time: {:?}", self.config.settle_time);
        info!("   - Request timeout: {:?}", self.config.request_timeout);

        let index = self.config.controller_index;
        let axis_bank = self.axis_bank.clone();
        let stats = self.stats.clone();
        let request_timeout = self.config.request_timeout;
        let is_running_flag = self.is_running.clone();
        let mut shutdown_rx = shutdown_tx.subscribe();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, addr)) => {
                                debug!("Accepted connection from {}", addr);

                                let axis_bank = axis_bank.clone();
                                let stats = stats.clone();
                                let shutdown_rx = shutdown_tx.subscribe();

                                tokio::spawn(async move {
                                    Self::handle_client(stream, index, axis_bank, stats, shutdown_rx, request_timeout).await;
                                });
                            }
                            Err(e) => {
                                error!("Failed to accept connection: {}", e);
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Shutdown signal received, stopping simulator");
                        break;
                    }
                }
            }

            is_running_flag.store(false, Ordering::SeqCst);
        });

        Ok(())
    }

    async fn stop(&mut self) -> GcsResult<()> {
        if let Some(shutdown_tx) = &self.shutdown_tx {
            let _ = shutdown_tx.send(());
        }

        self.is_running.store(false, Ordering::SeqCst);

        info!("⏹️  GCS simulator stopped");
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    fn get_stats(&self) -> ServerStats {
        let mut stats = self
            .stats
            .try_lock()
            .map(|s| s.clone())
            .unwrap_or_default();

        if let Some(start_time) = self.start_time {
            stats.uptime_seconds = start_time.elapsed().as_secs();
        }

        stats.axis_bank_stats = Some(self.axis_bank.stats());
        stats
    }

    fn axis_bank(&self) -> Arc<AxisBank> {
        self.axis_bank.clone()
    }
}
