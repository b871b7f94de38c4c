/// Voltage GCS Performance Test
///
/// Author: Evan Liu <evan.liu@voltageenergy.com>
/// Measures transaction throughput against an in-process simulator with an
/// instant settle time, separating query and handshaked-write costs.

use std::time::{Duration, Instant};
use voltage_gcs::utils::format;
use voltage_gcs::{Controller, GcsServer, GcsTcpServer, GcsTcpServerConfig, PerformanceMetrics};

const QUERY_ROUNDS: usize = 500;
const WRITE_ROUNDS: usize = 500;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    println!("⚡ Voltage GCS Performance Test");
    println!("==============================");

    let config = GcsTcpServerConfig {
        bind_address: "127.0.0.1:0".parse()?,
        settle_time: Duration::ZERO,
        ..Default::default()
    };
    let mut server = GcsTcpServer::with_config(config)?;
    server.start().await?;
    let addr = server.local_addr().expect("simulator bound");

    println!("Simulator running on {}", addr);

    let mut controller = Controller::tcp(&addr.to_string(), 1, false)?;
    controller.set_timeout(Duration::from_secs(2));
    controller.enable("1").await?;
    controller.home("1").await?;

    // Query throughput
    let mut query_metrics = PerformanceMetrics::new();
    for _ in 0..QUERY_ROUNDS {
        let started = Instant::now();
        match controller.get_position("1").await {
            Ok(_) => query_metrics.record_success(started.elapsed()),
            Err(e) => {
                query_metrics.record_failure(started.elapsed());
                eprintln!("❌ Query failed: {}", e);
            }
        }
    }

    println!("\n📖 Queries ({} rounds):", QUERY_ROUNDS);
    println!("{}", format::format_metrics(&query_metrics));

    // Handshaked write throughput
    controller.set_handshaking(true);
    let mut write_metrics = PerformanceMetrics::new();
    for round in 0..WRITE_ROUNDS {
        let volts = (round % 100) as f64 / 10.0;
        let started = Instant::now();
        match controller.set_voltage("1", volts).await {
            Ok(_) => write_metrics.record_success(started.elapsed()),
            Err(e) => {
                write_metrics.record_failure(started.elapsed());
                eprintln!("❌ Write failed: {}", e);
            }
        }
    }

    println!("\n✍️  Handshaked writes ({} rounds):", WRITE_ROUNDS);
    println!("{}", format::format_metrics(&write_metrics));

    let pool_stats = controller.pool_stats();
    println!("\n📊 Pool statistics:");
    println!("   - Transactions: {}", pool_stats.acquired);
    println!("   - Connections dialed: {}", pool_stats.dialed);
    println!("   - Connections discarded: {}", pool_stats.discarded);

    server.stop().await?;
    Ok(())
}
