// Startup, idle, and shutdown sequencing for the drive
//
//   Starting -> Running -> ShuttingDown -> Stopped
//
// Shutdown runs once, whichever event triggers it, and always tries to
// zero both wheels before the command channel is disconnected.

use std::future::Future;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::dispatcher::RuntimeFault;
use crate::motor::odrive::ProtocolError;
use crate::motor::{DriveController, SharedDrive, lock_drive};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Starting,
    Running,
    ShuttingDown,
    Stopped,
}

/// Why the supervisor left `Running`
#[derive(Debug, Clone, PartialEq)]
pub enum ShutdownReason {
    Interrupt,
    Fault(String),
}

#[derive(Debug, thiserror::Error)]
#[error("Startup failed on axis {axis}: {source}")]
pub struct StartupError {
    pub axis: u8,
    #[source]
    pub source: ProtocolError,
}

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The command channel, as far as shutdown is concerned
pub trait CommandLink {
    fn disconnect(&mut self) -> impl Future<Output = Result<(), BoxError>> + Send;
}

pub struct Supervisor {
    drive: SharedDrive,
    state: SupervisorState,
}

impl Supervisor {
    pub fn new(drive: DriveController) -> Self {
        Self {
            drive: drive.into_shared(),
            state: SupervisorState::Starting,
        }
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// Handle for the command delivery context
    pub fn drive(&self) -> SharedDrive {
        self.drive.clone()
    }

    /// Prepare both axes for velocity control. Any failure here is fatal
    /// and leaves the supervisor in `Starting`.
    pub fn start(&mut self) -> Result<(), StartupError> {
        if self.state != SupervisorState::Starting {
            warn!("Start requested in state {:?}, ignoring", self.state);
            return Ok(());
        }
        lock_drive(&self.drive)
            .initialize()
            .map_err(|(axis, source)| StartupError { axis, source })?;

        self.state = SupervisorState::Running;
        info!("Supervisor running");
        Ok(())
    }

    /// Idle until `interrupt` completes or a fault arrives, then shut down
    pub async fn run<L, I>(
        &mut self,
        link: &mut L,
        interrupt: I,
        mut faults: mpsc::UnboundedReceiver<RuntimeFault>,
    ) -> ShutdownReason
    where
        L: CommandLink,
        I: Future<Output = ()>,
    {
        let reason = tokio::select! {
            _ = interrupt => ShutdownReason::Interrupt,
            fault = faults.recv() => match fault {
                Some(RuntimeFault(msg)) => ShutdownReason::Fault(msg),
                None => ShutdownReason::Fault("command delivery stopped".to_string()),
            },
        };
        self.shutdown(link, reason.clone()).await;
        reason
    }

    /// Zero both wheels, disconnect, clear axis errors. Runs at most once.
    pub async fn shutdown<L: CommandLink>(&mut self, link: &mut L, reason: ShutdownReason) {
        if matches!(
            self.state,
            SupervisorState::ShuttingDown | SupervisorState::Stopped
        ) {
            return;
        }
        match &reason {
            ShutdownReason::Interrupt => info!("Interrupted, shutting down"),
            ShutdownReason::Fault(msg) => error!("Fault: {}, shutting down", msg),
        }
        self.state = SupervisorState::ShuttingDown;

        if let Err(e) = lock_drive(&self.drive).halt() {
            error!("Failed to zero wheels: {}", e);
        }
        if let Err(e) = link.disconnect().await {
            warn!("Failed to disconnect command channel: {}", e);
        }
        if let Err(e) = lock_drive(&self.drive).clear_errors() {
            warn!("Failed to clear axis errors: {}", e);
        }

        self.state = SupervisorState::Stopped;
        info!("Shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Direction, MotorDirections};
    use crate::dispatcher::{CommandDispatcher, SpeedPresets};
    use crate::motor::kinematics::DriveGeometry;
    use crate::motor::mock::MockLink;
    use std::sync::{Arc, Mutex};

    /// Records the order of disconnects relative to serial traffic
    struct FakeChannel {
        serial: MockLink,
        events: Arc<Mutex<Vec<String>>>,
    }

    impl CommandLink for FakeChannel {
        async fn disconnect(&mut self) -> Result<(), BoxError> {
            let sent = self.serial.sent().len();
            self.events
                .lock()
                .unwrap()
                .push(format!("disconnect after {} lines", sent));
            Ok(())
        }
    }

    fn supervisor(link: &MockLink) -> Supervisor {
        Supervisor::new(DriveController::new(
            Box::new(link.clone()),
            MotorDirections {
                left: Direction::Forward,
                right: Direction::Reversed,
            },
            DriveGeometry::default(),
        ))
    }

    fn channel(link: &MockLink) -> FakeChannel {
        FakeChannel {
            serial: link.clone(),
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    const LEFT_ZERO: &str = "w axis0.controller.input_vel 0.0000";
    const RIGHT_ZERO: &str = "w axis1.controller.input_vel 0.0000";

    #[test]
    fn test_start_enters_running() {
        let link = MockLink::new();
        let mut sup = supervisor(&link);
        sup.start().unwrap();
        assert_eq!(sup.state(), SupervisorState::Running);
        assert_eq!(link.count("w axis0.config.enable_watchdog 0"), 1);
        assert_eq!(link.count("w axis1.config.enable_watchdog 0"), 1);
    }

    #[test]
    fn test_start_failure_is_fatal() {
        let link = MockLink::new();
        link.break_link();
        let mut sup = supervisor(&link);
        let err = sup.start().unwrap_err();
        assert_eq!(err.axis, 0);
        assert_eq!(sup.state(), SupervisorState::Starting);
    }

    #[tokio::test]
    async fn test_interrupt_shutdown_sequence() {
        let link = MockLink::new();
        let mut sup = supervisor(&link);
        sup.start().unwrap();
        lock_drive(&sup.drive()).set_velocity(0.2, 0.5).unwrap();
        link.clear();

        let mut chan = channel(&link);
        let (_tx, rx) = mpsc::unbounded_channel();
        let reason = sup.run(&mut chan, async {}, rx).await;

        assert_eq!(reason, ShutdownReason::Interrupt);
        assert_eq!(sup.state(), SupervisorState::Stopped);
        assert_eq!(
            link.sent(),
            vec![
                LEFT_ZERO,
                RIGHT_ZERO,
                "w axis0.error 0",
                "w axis0.requested_state 8",
                "w axis1.error 0",
                "w axis1.requested_state 8",
            ]
        );
        assert_eq!(*chan.events.lock().unwrap(), vec!["disconnect after 2 lines"]);
    }

    #[tokio::test]
    async fn test_fault_triggers_same_shutdown() {
        let link = MockLink::new();
        let mut sup = supervisor(&link);
        sup.start().unwrap();
        link.clear();

        let mut chan = channel(&link);
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(RuntimeFault("serial gone".into())).unwrap();
        let reason = sup.run(&mut chan, std::future::pending(), rx).await;

        assert_eq!(reason, ShutdownReason::Fault("serial gone".into()));
        assert_eq!(link.count(LEFT_ZERO), 1);
        assert_eq!(link.count(RIGHT_ZERO), 1);
    }

    #[tokio::test]
    async fn test_shutdown_with_failing_left_axis() {
        let link = MockLink::new();
        let mut sup = supervisor(&link);
        sup.start().unwrap();
        lock_drive(&sup.drive()).set_velocity(0.2, 0.0).unwrap();
        link.clear();
        link.fail_lines_containing("axis0");

        let mut chan = channel(&link);
        sup.shutdown(&mut chan, ShutdownReason::Fault("left axis".into())).await;

        assert_eq!(sup.state(), SupervisorState::Stopped);
        assert_eq!(link.count(RIGHT_ZERO), 1);
        assert_eq!(link.count("w axis1.error 0"), 1);
        assert_eq!(*chan.events.lock().unwrap(), vec!["disconnect after 1 lines"]);
    }

    #[tokio::test]
    async fn test_shutdown_runs_once() {
        let link = MockLink::new();
        let mut sup = supervisor(&link);
        sup.start().unwrap();

        let mut chan = channel(&link);
        sup.shutdown(&mut chan, ShutdownReason::Interrupt).await;
        sup.shutdown(&mut chan, ShutdownReason::Fault("late".into())).await;
        drop(sup);

        assert_eq!(link.count(LEFT_ZERO), 1);
        assert_eq!(link.count(RIGHT_ZERO), 1);
        assert_eq!(chan.events.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_commands_refused_after_shutdown() {
        let link = MockLink::new();
        let mut sup = supervisor(&link);
        sup.start().unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let dispatcher = CommandDispatcher::new(sup.drive(), SpeedPresets::default(), tx);

        let mut chan = channel(&link);
        sup.shutdown(&mut chan, ShutdownReason::Interrupt).await;
        link.clear();

        dispatcher.on_command(b"forward");
        assert!(link.sent().is_empty());
    }
}
