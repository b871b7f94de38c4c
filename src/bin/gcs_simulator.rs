/// GCS Controller Simulator
///
/// This simulator binds a TCP endpoint and behaves like a single GCS2
/// controller in a daisy chain. It can be used to exercise the client
/// implementation without physical hardware.
///
/// The simulator supports:
/// - The full command vocabulary of the client (`MOV`, `MVR`, `POS?`,
///   `SVO`, `SVO?`, `FRF`, `SVA`, `SVA?`, `WAC ONT?`, `ERR?`)
/// - Addressed and single-controller shorthand framing
/// - Silent failure with a latched error code, like the real hardware
/// - A configurable motion settle time so `WAC ONT?` genuinely blocks
///
/// Usage: `gcs_simulator [bind_address] [controller_index] [settle_ms]`

use std::time::Duration;
use voltage_gcs::{GcsServer, GcsTcpServer, GcsTcpServerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let bind_address = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:50000".to_string());
    let controller_index: u8 = std::env::args()
        .nth(2)
        .map(|arg| arg.parse())
        .transpose()?
        .unwrap_or(1);
    let settle_ms: u64 = std::env::args()
        .nth(3)
        .map(|arg| arg.parse())
        .transpose()?
        .unwrap_or(250);

    println!("🎛️  GCS Controller Simulator");
    println!("===========================");
    println!("Bind address:     {}", bind_address);
    println!("Controller index: {}", controller_index);
    println!("Settle time:      {}ms", settle_ms);

    let config = GcsTcpServerConfig {
        bind_address: bind_address.parse()?,
        controller_index,
        settle_time: Duration::from_millis(settle_ms),
        ..Default::default()
    };

    let mut server = GcsTcpServer::with_config(config)?;
    server.start().await?;

    println!("✅ Simulator running, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;

    let stats = server.get_stats();
    println!("\n📊 Final statistics:");
    println!("   - Connections:    {}", stats.connections_count);
    println!("   - Commands:       {}", stats.total_commands);
    println!("   - Replies sent:   {}", stats.replies_sent);
    println!("   - Failed:         {}", stats.failed_commands);
    println!("   - Uptime:         {}s", stats.uptime_seconds);
    if let Some(bank_stats) = stats.axis_bank_stats {
        println!("   - Axes touched:   {}", bank_stats.axes_count);
    }

    server.stop().await?;
    Ok(())
}
