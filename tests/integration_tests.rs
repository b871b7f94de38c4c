//! Integration Tests for Voltage GCS Library
//!
//! This module contains integration tests that exercise the library
//! components working together in realistic scenarios: golden wire frames
//! against a scripted controller, full round trips against the bundled
//! simulator, and connection-pool pairing across every outcome.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::time::sleep;

use voltage_gcs::{
    Controller, GcsError, GcsServer, GcsTcpServer, GcsTcpServerConfig,
};

/// Scripted controller: records every received line and answers via a closure
struct ScriptServer {
    addr: String,
    received: Arc<Mutex<Vec<String>>>,
}

impl ScriptServer {
    /// Spawn a listener that feeds each received line to `reply`; a `Some`
    /// return is sent back as a terminated line, `None` stays silent.
    async fn spawn<F>(reply: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let received = Arc::new(Mutex::new(Vec::new()));

        let log = received.clone();
        let reply = Arc::new(reply);
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let log = log.clone();
                let reply = reply.clone();
                tokio::spawn(async move {
                    let (read_half, mut write_half) = stream.into_split();
                    let mut lines = BufReader::new(read_half).lines();
                    while let Ok(Some(line)) = lines.next_line().await {
                        log.lock().unwrap().push(line.clone());
                        if let Some(response) = reply(&line) {
                            let framed = format!("{}\n", response);
                            if write_half.write_all(framed.as_bytes()).await.is_err() {
                                break;
                            }
                        }
                    }
                });
            }
        });

        Self { addr, received }
    }

    /// Silent controller: accepts everything, never replies
    async fn silent() -> Self {
        Self::spawn(|_| None).await
    }

    fn lines(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }

    /// Wait until at least `count` lines arrived (writes return before the
    /// peer has necessarily read them)
    async fn wait_for_lines(&self, count: usize) -> Vec<String> {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            let lines = self.lines();
            if lines.len() >= count {
                return lines;
            }
            assert!(
                Instant::now() < deadline,
                "timed out waiting for {} lines, got {:?}",
                count,
                lines
            );
            sleep(Duration::from_millis(5)).await;
        }
    }
}

/// Start the bundled simulator on an ephemeral port
async fn spawn_simulator(settle_time: Duration) -> (GcsTcpServer, String) {
    let config = GcsTcpServerConfig {
        bind_address: "127.0.0.1:0".parse().unwrap(),
        settle_time,
        ..Default::default()
    };
    let mut server = GcsTcpServer::with_config(config).unwrap();
    server.start().await.unwrap();
    let addr = server.local_addr().unwrap().to_string();
    (server, addr)
}

fn fast_controller(addr: &str, handshaking: bool) -> Controller {
    let mut controller = Controller::tcp(addr, 1, handshaking).unwrap();
    controller.set_timeout(Duration::from_secs(2));
    controller
}

/// A move is one transaction of exactly two lines: the motion command with
/// the target formatted to 9 decimals, then the wait-on-target command.
#[tokio::test]
async fn test_move_absolute_wire_format() {
    let server = ScriptServer::silent().await;
    let controller = fast_controller(&server.addr, false);

    controller.move_absolute("1", 123.456).await.unwrap();

    let lines = server.wait_for_lines(2).await;
    assert_eq!(lines, vec!["1 MOV 1 123.456000000", "1 WAC ONT? 1 = 1"]);
}

#[tokio::test]
async fn test_move_relative_wire_format() {
    let server = ScriptServer::silent().await;
    let controller = fast_controller(&server.addr, false);

    controller.move_relative("A", -0.5).await.unwrap();

    let lines = server.wait_for_lines(2).await;
    assert_eq!(lines, vec!["1 MVR A -0.500000000", "1 WAC ONT? A = 1"]);
}

/// Every outbound message carries the issuing controller's index prefix.
#[tokio::test]
async fn test_index_prefix_on_all_messages() {
    let server = ScriptServer::silent().await;
    let mut controller = Controller::tcp(&server.addr, 4, false).unwrap();
    controller.set_timeout(Duration::from_secs(2));

    controller.enable("2").await.unwrap();
    controller.home("2").await.unwrap();
    controller.set_voltage("2", 7.0).await.unwrap();

    let lines = server.wait_for_lines(3).await;
    assert_eq!(
        lines,
        vec!["4 SVO 2 1", "4 FRF 2", "4 SVA 2 7.000000000"]
    );
}

#[tokio::test]
async fn test_get_position_parses_addressed_reply() {
    let server = ScriptServer::spawn(|line| {
        (line == "1 POS? 1").then(|| "0 1 1=0.0025210".to_string())
    })
    .await;
    let controller = fast_controller(&server.addr, false);

    let position = controller.get_position("1").await.unwrap();
    assert_eq!(position, 0.0025210);
    assert_eq!(server.lines(), vec!["1 POS? 1"]);
}

/// The implicit single-controller reply shape passes through unchecked.
#[tokio::test]
async fn test_get_position_accepts_implicit_reply() {
    let server = ScriptServer::spawn(|line| {
        (line == "1 POS? 1").then(|| "1=0.5".to_string())
    })
    .await;
    let controller = fast_controller(&server.addr, false);

    let position = controller.get_position("1").await.unwrap();
    assert_eq!(position, 0.5);
}

/// A reply sourced from another controller must never be returned as the
/// expected answer.
#[tokio::test]
async fn test_unexpected_source_rejected() {
    let server = ScriptServer::spawn(|line| {
        line.contains("POS?").then(|| "0 2 1=0.1".to_string())
    })
    .await;
    let controller = fast_controller(&server.addr, false);

    let err = controller.get_position("1").await.unwrap_err();
    assert!(matches!(
        err,
        GcsError::UnexpectedSource { expected: 1, actual: 2 }
    ));

    // The connection was abandoned mid-protocol and must not be recycled.
    let stats = controller.pool_stats();
    assert_eq!(stats.checked_out, 0);
    assert_eq!(stats.discarded, 1);
}

/// With handshaking on, a transport-successful write still fails when the
/// controller reports a non-zero error code.
#[tokio::test]
async fn test_handshake_surfaces_controller_error() {
    let server = ScriptServer::spawn(|line| {
        (line == "1 ERR?").then(|| "0 1 6".to_string())
    })
    .await;
    let controller = fast_controller(&server.addr, true);

    let err = controller.enable("1").await.unwrap_err();
    assert!(matches!(err, GcsError::Controller { code: 6 }));

    let lines = server.lines();
    assert_eq!(lines, vec!["1 SVO 1 1", "1 ERR?"]);
}

#[tokio::test]
async fn test_handshake_success_path() {
    let server = ScriptServer::spawn(|line| {
        (line == "1 ERR?").then(|| "0 1 0".to_string())
    })
    .await;
    let controller = fast_controller(&server.addr, true);

    controller.enable("1").await.unwrap();
    controller.disable("1").await.unwrap();

    let lines = server.lines();
    assert_eq!(
        lines,
        vec!["1 SVO 1 1", "1 ERR?", "1 SVO 1 0", "1 ERR?"]
    );
}

/// Without handshaking, a write returns as soon as the bytes are sent.
#[tokio::test]
async fn test_write_without_handshake_sends_no_err_query() {
    let server = ScriptServer::silent().await;
    let controller = fast_controller(&server.addr, false);

    controller.enable("1").await.unwrap();

    let lines = server.wait_for_lines(1).await;
    assert_eq!(lines, vec!["1 SVO 1 1"]);
}

#[tokio::test]
async fn test_get_enabled_boolean_decode() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let server = ScriptServer::spawn(move |line| {
        if line != "1 SVO? 1" {
            return None;
        }
        let first = counter.fetch_add(1, Ordering::SeqCst) == 0;
        Some(if first { "0 1 1=1" } else { "0 1 1=0" }.to_string())
    })
    .await;
    let controller = fast_controller(&server.addr, false);

    assert_eq!(controller.get_enabled("1").await.unwrap(), true);
    assert_eq!(controller.get_enabled("1").await.unwrap(), false);
}

/// Shape validation fails fast: nothing is acquired, nothing is sent.
#[tokio::test]
async fn test_shape_violations_perform_no_io() {
    let server = ScriptServer::silent().await;
    let controller = fast_controller(&server.addr, false);

    let err = controller.write(&["POS? 1"]).await.unwrap_err();
    assert!(matches!(err, GcsError::ProtocolMisuse { .. }));

    let err = controller.query("MOV 1 0.5").await.unwrap_err();
    assert!(matches!(err, GcsError::ProtocolMisuse { .. }));

    assert!(server.lines().is_empty());
    assert_eq!(controller.pool_stats().acquired, 0);
    assert_eq!(controller.pool_stats().checked_out, 0);
}

/// Acquire and release stay paired on every path, and the single pooled
/// connection is recycled across clean transactions.
#[tokio::test]
async fn test_pool_pairing_across_outcomes() {
    let server = ScriptServer::spawn(|line| {
        if line.contains("POS?") {
            // Source field is not numeric: parsing fails downstream.
            Some("0 X 1=0.1".to_string())
        } else if line.contains("SVO?") {
            Some("0 1 1=1".to_string())
        } else {
            None
        }
    })
    .await;
    let controller = fast_controller(&server.addr, false);

    // Success path
    assert!(controller.get_enabled("1").await.is_ok());
    assert_eq!(controller.pool_stats().checked_out, 0);

    // Malformed-reply path
    let err = controller.get_position("1").await.unwrap_err();
    assert!(matches!(err, GcsError::MalformedResponse { .. }));
    assert_eq!(controller.pool_stats().checked_out, 0);

    // Validation-failure path
    assert!(controller.query("FRF 1").await.is_err());
    assert_eq!(controller.pool_stats().checked_out, 0);

    // Clean transactions share one physical connection.
    assert!(controller.get_enabled("1").await.is_ok());
    let stats = controller.pool_stats();
    assert_eq!(stats.checked_out, 0);
    assert!(stats.dialed >= 1);
}

/// A reply that never arrives fails the transaction at the deadline and the
/// connection is discarded rather than reused.
#[tokio::test]
async fn test_query_timeout_discards_connection() {
    let server = ScriptServer::silent().await;
    let mut controller = Controller::tcp(&server.addr, 1, false).unwrap();
    controller.set_timeout(Duration::from_millis(100));

    let started = Instant::now();
    let err = controller.get_position("1").await.unwrap_err();
    assert!(matches!(err, GcsError::Timeout { .. }));
    assert!(started.elapsed() >= Duration::from_millis(100));

    let stats = controller.pool_stats();
    assert_eq!(stats.checked_out, 0);
    assert_eq!(stats.discarded, 1);
}

/// Full round trip against the bundled simulator.
#[tokio::test]
async fn test_simulator_end_to_end() {
    let (mut server, addr) = spawn_simulator(Duration::from_millis(20)).await;
    let controller = fast_controller(&addr, true);

    controller.enable("1").await.unwrap();
    assert!(controller.get_enabled("1").await.unwrap());

    controller.home("1").await.unwrap();
    controller.move_absolute("1", 1.5).await.unwrap();
    assert_eq!(controller.get_position("1").await.unwrap(), 1.5);

    controller.move_relative("1", -0.5).await.unwrap();
    assert_eq!(controller.get_position("1").await.unwrap(), 1.0);

    controller.set_voltage("1", 12.5).await.unwrap();
    assert_eq!(controller.get_voltage("1").await.unwrap(), 12.5);

    // Raw passthrough dispatches on shape.
    let payload = controller.raw("POS? 1").await.unwrap();
    assert_eq!(payload.as_deref(), Some("1=1.0000000"));
    assert_eq!(controller.raw("SVO 1 0").await.unwrap(), None);
    assert!(!controller.get_enabled("1").await.unwrap());

    // Every transaction reused the single pooled connection.
    let stats = controller.pool_stats();
    assert_eq!(stats.checked_out, 0);
    assert_eq!(stats.dialed, 1);
    assert_eq!(stats.discarded, 0);

    server.stop().await.unwrap();
}

/// The wait-on-target line keeps the handshaked move from returning before
/// the motion settles.
#[tokio::test]
async fn test_move_blocks_until_on_target() {
    let (mut server, addr) = spawn_simulator(Duration::from_millis(200)).await;
    let controller = fast_controller(&addr, true);

    controller.enable("1").await.unwrap();
    controller.home("1").await.unwrap();

    let started = Instant::now();
    controller.move_absolute("1", 42.0).await.unwrap();
    assert!(started.elapsed() >= Duration::from_millis(150));
    assert_eq!(controller.get_position("1").await.unwrap(), 42.0);

    server.stop().await.unwrap();
}

/// The simulator latches errors like real hardware: a move on an axis that
/// is not ready fails the handshake, and the latch clears once read.
#[tokio::test]
async fn test_simulator_reports_unready_move() {
    let (mut server, addr) = spawn_simulator(Duration::ZERO).await;
    let controller = fast_controller(&addr, true);

    let err = controller.move_absolute("1", 1.0).await.unwrap_err();
    assert!(matches!(err, GcsError::Controller { code: 5 }));

    // The failed transaction discarded its connection; the next one redials
    // and succeeds with a clean error latch.
    controller.enable("1").await.unwrap();
    assert_eq!(controller.pool_stats().checked_out, 0);

    server.stop().await.unwrap();
}

/// Concurrent callers serialize on the single pooled connection.
#[tokio::test]
async fn test_concurrent_callers_serialize() {
    let (mut server, addr) = spawn_simulator(Duration::ZERO).await;
    let controller = Arc::new(fast_controller(&addr, false));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let controller = controller.clone();
        handles.push(tokio::spawn(async move {
            controller.get_position("1").await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }

    let stats = controller.pool_stats();
    assert_eq!(stats.checked_out, 0);
    assert_eq!(stats.acquired, 8);
    // One physical connection served all callers in turn.
    assert_eq!(stats.dialed, 1);

    server.stop().await.unwrap();
}
