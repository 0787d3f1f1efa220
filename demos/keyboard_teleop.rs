// Keyboard teleop: WASD/arrows drive, Space stops, Q quits
//
// Publishes keyword commands on the drive topic. Releasing all keys for a
// moment sends a single "stop".
//
// Usage: cargo run --example keyboard_teleop -- [topic]
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::time::{Duration, Instant};
use tracing::info;

use diffdrive_zenoh_runtime::config::TOPIC_DRIVE;

const INPUT_TIMEOUT_MS: u64 = 150; // Send stop after this much time with no input

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let topic = std::env::args()
        .nth(1)
        .unwrap_or_else(|| TOPIC_DRIVE.to_string());

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let publisher = session.declare_publisher(topic.clone()).await?;

    info!("Publishing to: {}", topic);
    info!("Controls: W/S or Up/Down=move, A/D or Left/Right=turn, Space=stop, Q=quit");

    enable_raw_mode()?;
    let result = run_teleop(&publisher).await;
    disable_raw_mode()?;

    // Never leave the robot moving
    publisher.put("stop".to_string()).await?;
    result
}

fn keyword_for(code: KeyCode) -> Option<&'static str> {
    match code {
        KeyCode::Char('w') | KeyCode::Up => Some("forward"),
        KeyCode::Char('s') | KeyCode::Down => Some("back"),
        KeyCode::Char('a') | KeyCode::Left => Some("left"),
        KeyCode::Char('d') | KeyCode::Right => Some("right"),
        KeyCode::Char(' ') => Some("stop"),
        _ => None,
    }
}

async fn run_teleop(
    publisher: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut last_sent: &str = "stop";
    let mut last_movement_input = Instant::now();

    loop {
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;

                if pressed && matches!(code, KeyCode::Char('q') | KeyCode::Esc) {
                    break;
                }
                if let (true, Some(keyword)) = (pressed, keyword_for(code)) {
                    last_movement_input = Instant::now();
                    if keyword != last_sent {
                        publisher.put(keyword.to_string()).await?;
                        last_sent = keyword;
                    }
                }
            }
        }

        if last_sent != "stop"
            && last_movement_input.elapsed() > Duration::from_millis(INPUT_TIMEOUT_MS)
        {
            publisher.put("stop".to_string()).await?;
            last_sent = "stop";
        }
    }

    Ok(())
}
