/// Voltage GCS Demo
///
/// Author: Evan Liu <evan.liu@voltageenergy.com>
/// This program demonstrates basic usage of the voltage_gcs library.
///
/// Point it at real hardware, or start the bundled simulator first:
/// `cargo run --bin gcs_simulator`

use std::time::Duration;
use voltage_gcs::Controller;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    println!("🚀 Voltage GCS Demo");
    println!("===================");

    let controller_address = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:50000".to_string());

    println!("Connecting to GCS controller at {}...", controller_address);

    let mut controller = match Controller::tcp(&controller_address, 1, true) {
        Ok(controller) => controller,
        Err(e) => {
            eprintln!("❌ Invalid controller configuration: {}", e);
            return Ok(());
        }
    };
    controller.set_timeout(Duration::from_secs(5));

    let axis = "1";

    println!("\n⚙️  Enabling servo on axis {}...", axis);
    match controller.enable(axis).await {
        Ok(()) => println!("✅ Servo enabled"),
        Err(e) => {
            eprintln!("❌ Failed to enable servo: {}", e);
            eprintln!("Make sure a controller or simulator is running on {}", controller_address);
            return Ok(());
        }
    }

    match controller.get_enabled(axis).await {
        Ok(enabled) => println!("🔍 Servo state readback: {}", if enabled { "ON" } else { "OFF" }),
        Err(e) => println!("❌ Failed to read servo state: {}", e),
    }

    println!("\n🏠 Referencing axis {}...", axis);
    match controller.home(axis).await {
        Ok(()) => println!("✅ Axis referenced"),
        Err(e) => println!("❌ Failed to reference axis: {}", e),
    }

    println!("\n🎯 Moving axis {} to 1.25 (blocks until on-target)...", axis);
    match controller.move_absolute(axis, 1.25).await {
        Ok(()) => println!("✅ Move complete"),
        Err(e) => println!("❌ Move failed: {}", e),
    }

    match controller.get_position(axis).await {
        Ok(position) => println!("📍 Axis {} position: {:.6}", axis, position),
        Err(e) => println!("❌ Failed to read position: {}", e),
    }

    println!("\n↔️  Nudging axis {} by -0.25...", axis);
    match controller.move_relative(axis, -0.25).await {
        Ok(()) => println!("✅ Move complete"),
        Err(e) => println!("❌ Move failed: {}", e),
    }

    match controller.get_position(axis).await {
        Ok(position) => println!("📍 Axis {} position: {:.6}", axis, position),
        Err(e) => println!("❌ Failed to read position: {}", e),
    }

    println!("\n⚡ Commanding 12.5 V on axis {}...", axis);
    match controller.set_voltage(axis, 12.5).await {
        Ok(()) => println!("✅ Voltage commanded"),
        Err(e) => println!("❌ Failed to set voltage: {}", e),
    }

    match controller.get_voltage(axis).await {
        Ok(volts) => println!("🔋 Axis {} voltage: {:.3} V", axis, volts),
        Err(e) => println!("❌ Failed to read voltage: {}", e),
    }

    println!("\n🔧 Raw passthrough: \"POS? {}\"...", axis);
    match controller.raw(&format!("POS? {}", axis)).await {
        Ok(Some(payload)) => println!("📨 Raw reply payload: {}", payload),
        Ok(None) => println!("📨 Raw write accepted"),
        Err(e) => println!("❌ Raw command failed: {}", e),
    }

    println!("\n⚙️  Disabling servo on axis {}...", axis);
    match controller.disable(axis).await {
        Ok(()) => println!("✅ Servo disabled"),
        Err(e) => println!("❌ Failed to disable servo: {}", e),
    }

    let stats = controller.pool_stats();
    println!("\n📊 Pool statistics:");
    println!("   - Transactions: {}", stats.acquired);
    println!("   - Connections dialed: {}", stats.dialed);
    println!("   - Connections discarded: {}", stats.discarded);

    println!("\n👋 Demo complete");
    Ok(())
}
