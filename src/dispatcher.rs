// Decodes inbound drive commands and applies them to the drive
//
// Payloads are tried as a structured command first, then as a keyword.
// Anything else is logged and dropped without touching the wheels.

use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::{ANGULAR_SPEED, LINEAR_SPEED};
use crate::messages::DriveCommand;
use crate::motor::{DriveError, SharedDrive, lock_drive};

/// Closed set of shortcut commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Forward,
    Back,
    Left,
    Right,
    Stop,
}

impl FromStr for Keyword {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "forward" => Ok(Keyword::Forward),
            "back" => Ok(Keyword::Back),
            "left" => Ok(Keyword::Left),
            "right" => Ok(Keyword::Right),
            "stop" => Ok(Keyword::Stop),
            _ => Err(CommandError::Unrecognized(s.trim().to_string())),
        }
    }
}

/// Magnitudes applied by keyword commands
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedPresets {
    pub linear: f32,  // m/s
    pub angular: f32, // rad/s
}

impl Default for SpeedPresets {
    fn default() -> Self {
        Self {
            linear: LINEAR_SPEED,
            angular: ANGULAR_SPEED,
        }
    }
}

impl Keyword {
    pub fn to_command(self, presets: SpeedPresets) -> DriveCommand {
        let (linear, angular) = match self {
            Keyword::Forward => (presets.linear, 0.0),
            Keyword::Back => (-presets.linear, 0.0),
            Keyword::Left => (0.0, presets.angular),
            Keyword::Right => (0.0, -presets.angular),
            Keyword::Stop => (0.0, 0.0),
        };
        DriveCommand::new(linear, angular)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CommandError {
    #[error("Unrecognized command: {0:?}")]
    Unrecognized(String),
}

/// Structured form first, keyword second. A structured payload missing
/// either velocity falls through to keyword matching.
pub fn decode(payload: &[u8], presets: SpeedPresets) -> Result<DriveCommand, CommandError> {
    if let Ok(cmd) = serde_json::from_slice::<DriveCommand>(payload) {
        return Ok(cmd);
    }
    let text = String::from_utf8_lossy(payload);
    text.parse::<Keyword>().map(|k| k.to_command(presets))
}

/// Reported to the supervisor when the motor link is beyond recovery
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeFault(pub String);

pub struct CommandDispatcher {
    drive: SharedDrive,
    presets: SpeedPresets,
    faults: mpsc::UnboundedSender<RuntimeFault>,
    // Bumped on every applied command; a timed stop only fires if nothing newer arrived
    generation: Arc<AtomicU64>,
    timer: Option<Handle>,
}

impl CommandDispatcher {
    /// Must be created inside a tokio runtime for timed commands to expire
    pub fn new(
        drive: SharedDrive,
        presets: SpeedPresets,
        faults: mpsc::UnboundedSender<RuntimeFault>,
    ) -> Self {
        Self {
            drive,
            presets,
            faults,
            generation: Arc::new(AtomicU64::new(0)),
            timer: Handle::try_current().ok(),
        }
    }

    /// Entry point for the delivery context. Never blocks beyond one
    /// exchange on the serial link.
    pub fn on_command(&self, payload: &[u8]) {
        let cmd = match decode(payload, self.presets) {
            Ok(cmd) => cmd,
            Err(e) => {
                warn!("Dropping command: {}", e);
                return;
            }
        };
        info!("Received command: {:?}", cmd);
        self.apply(cmd);
    }

    fn apply(&self, cmd: DriveCommand) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let result =
            lock_drive(&self.drive).set_velocity(cmd.linear_velocity, cmd.angular_velocity);

        match result {
            Ok(wheels) => {
                info!("Set speeds: left={} m/s, right={} m/s", wheels.left, wheels.right);
                if let Some(cs) = cmd.duration_cs {
                    self.schedule_stop(generation, Duration::from_millis(u64::from(cs) * 10));
                }
            }
            Err(DriveError::Halted) => debug!("Drive halted, ignoring command"),
            Err(e) if e.is_link_failure() => {
                warn!("Motor link failure: {}", e);
                let _ = self.faults.send(RuntimeFault(e.to_string()));
            }
            Err(e) => warn!("Command not applied: {}", e),
        }
    }

    fn schedule_stop(&self, generation: u64, after: Duration) {
        let Some(timer) = &self.timer else {
            warn!("No timer available, command duration ignored");
            return;
        };
        let drive = self.drive.clone();
        let current = self.generation.clone();

        timer.spawn(async move {
            tokio::time::sleep(after).await;
            if current.load(Ordering::SeqCst) != generation {
                return;
            }
            debug!("Command duration elapsed, stopping");
            if let Err(e) = lock_drive(&drive).set_velocity(0.0, 0.0) {
                warn!("Failed to stop after timed command: {}", e);
            }
        });
    }
}
