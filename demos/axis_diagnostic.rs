// Axis diagnostic: READ-ONLY check of the motor controller
//
// Reads every error register of both axes plus position/velocity feedback.
// Nothing is written, so the wheels never move.
//
// Usage: cargo run --example axis_diagnostic -- [port] [direction file]

use diffdrive_zenoh_runtime::config::{
    Direction, MOTOR_BAUDRATE, MOTOR_PORT, MotorDirections,
};
use diffdrive_zenoh_runtime::motor::{DriveController, DriveGeometry, SerialLink, Wheel};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("debug".parse().unwrap()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let port = args.next().unwrap_or_else(|| MOTOR_PORT.to_string());
    let directions = match args.next() {
        Some(path) => MotorDirections::load(path)?,
        None => MotorDirections {
            left: Direction::Forward,
            right: Direction::Forward,
        },
    };

    println!("Axis diagnostic (read-only)");
    println!("Serial port: {}", port);
    println!();

    println!("Step 1: Opening serial port...");
    let link = match SerialLink::open(&port, MOTOR_BAUDRATE) {
        Ok(link) => {
            println!("  ✓ Serial port opened");
            link
        }
        Err(e) => {
            println!("  ✗ Failed to open serial port: {}", e);
            println!("  - Check the port path and that the UART is enabled");
            return Err(e.into());
        }
    };
    let mut drive = DriveController::new(Box::new(link), directions, DriveGeometry::default());
    println!();

    println!("Step 2: Reading error registers...");
    let report = drive.error_report();
    println!("{}", report);
    if report.has_faults() {
        println!("⚠ Faults present. The runtime clears them at startup.");
    }
    println!();

    println!("Step 3: Reading feedback...");
    for wheel in [Wheel::Left, Wheel::Right] {
        match drive.feedback(wheel) {
            Ok((turns, rpm)) => println!(
                "  {:?}: position {:.3} turns, speed {:.1} rpm",
                wheel, turns, rpm
            ),
            Err(e) => println!("  {:?}: ERROR - {}", wheel, e),
        }
    }
    println!();
    println!("Diagnostic complete");

    Ok(())
}
