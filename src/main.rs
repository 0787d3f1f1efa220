use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use diffdrive_zenoh_runtime::config::{
    ANGULAR_SPEED, DIRECTIONS_PATH, LINEAR_SPEED, MOTOR_BAUDRATE, MOTOR_PORT, RuntimeConfig,
    TOPIC_DRIVE, WHEEL_BASE, WHEEL_DIAMETER,
};
use diffdrive_zenoh_runtime::dispatcher::SpeedPresets;
use diffdrive_zenoh_runtime::motor::DriveGeometry;

/// Drive a two-wheeled ODrive base from zenoh velocity commands
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Serial port of the motor controller
    #[arg(long, default_value = MOTOR_PORT)]
    port: String,

    #[arg(long, default_value_t = MOTOR_BAUDRATE)]
    baud: u32,

    /// JSON file with the wheel direction signs, e.g. {"left": 1, "right": -1}
    #[arg(long, default_value = DIRECTIONS_PATH)]
    directions: PathBuf,

    /// Zenoh key expression carrying drive commands
    #[arg(long, default_value = TOPIC_DRIVE)]
    topic: String,

    /// Zenoh endpoint to connect to (e.g. tcp/192.168.1.10:7447)
    #[arg(long)]
    connect: Option<String>,

    /// Distance between the wheels (m)
    #[arg(long, default_value_t = WHEEL_BASE)]
    wheel_base: f32,

    /// Wheel diameter (m)
    #[arg(long, default_value_t = WHEEL_DIAMETER)]
    wheel_diameter: f32,

    /// Speed for the forward/back keywords (m/s)
    #[arg(long, default_value_t = LINEAR_SPEED)]
    linear_speed: f32,

    /// Turn rate for the left/right keywords (rad/s)
    #[arg(long, default_value_t = ANGULAR_SPEED)]
    angular_speed: f32,
}

impl From<Args> for RuntimeConfig {
    fn from(args: Args) -> Self {
        Self {
            port: args.port,
            baudrate: args.baud,
            directions_path: args.directions,
            topic: args.topic,
            connect: args.connect,
            geometry: DriveGeometry {
                wheel_base: args.wheel_base,
                wheel_diameter: args.wheel_diameter,
            },
            presets: SpeedPresets {
                linear: args.linear_speed,
                angular: args.angular_speed,
            },
        }
    }
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    let args = Args::parse();

    if let Err(e) = diffdrive_zenoh_runtime::runtime::run(args.into()).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
