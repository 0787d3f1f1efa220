// Wires the serial link, the zenoh command subscriber, and the supervisor
//
// Command delivery runs on zenoh's callback context and drives the motors
// directly; this task only waits for Ctrl+C or a fault.

use tokio::signal::unix::{Signal, SignalKind, signal};
use tokio::sync::mpsc;
use tracing::info;
use zenoh::pubsub::Subscriber;

use crate::config::{MotorDirections, RuntimeConfig};
use crate::dispatcher::CommandDispatcher;
use crate::motor::{DriveController, SerialLink};
use crate::supervisor::{BoxError, CommandLink, ShutdownReason, Supervisor};

/// Zenoh session and the drive command subscriber
pub struct ZenohLink {
    session: zenoh::Session,
    subscriber: Option<Subscriber<()>>,
}

impl CommandLink for ZenohLink {
    async fn disconnect(&mut self) -> Result<(), BoxError> {
        if let Some(subscriber) = self.subscriber.take() {
            subscriber.undeclare().await?;
        }
        self.session.close().await?;
        info!("Command channel disconnected");
        Ok(())
    }
}

async fn open_session(connect: Option<&str>) -> Result<zenoh::Session, BoxError> {
    let mut config = zenoh::Config::default();
    if let Some(endpoint) = connect {
        config.insert_json5("connect/endpoints", &serde_json::json!([endpoint]).to_string())?;
    }
    zenoh::open(config).await
}

/// Must be registered before the subscriber can move the wheels
fn listen_for_interrupt() -> std::io::Result<Signal> {
    signal(SignalKind::interrupt())
}

async fn interrupted(mut interrupts: Signal) {
    interrupts.recv().await;
}

pub async fn run(config: RuntimeConfig) -> Result<(), BoxError> {
    let interrupts = listen_for_interrupt()?;

    let directions = MotorDirections::load(&config.directions_path)?;
    info!(
        "Motor directions: left={:?}, right={:?}",
        directions.left, directions.right
    );

    info!("Opening motor link on {} @ {} baud", config.port, config.baudrate);
    let serial = SerialLink::open(&config.port, config.baudrate)?;

    info!("Opening Zenoh session...");
    let session = open_session(config.connect.as_deref()).await?;

    let drive = DriveController::new(Box::new(serial), directions, config.geometry);
    let mut supervisor = Supervisor::new(drive);
    supervisor.start()?;

    let (fault_tx, fault_rx) = mpsc::unbounded_channel();
    let dispatcher = CommandDispatcher::new(supervisor.drive(), config.presets, fault_tx);

    let mut link = ZenohLink {
        session,
        subscriber: None,
    };
    let subscriber = link
        .session
        .declare_subscriber(config.topic.as_str())
        .callback(move |sample| {
            let payload = sample.payload().to_bytes();
            dispatcher.on_command(&payload);
        })
        .await;
    match subscriber {
        Ok(subscriber) => link.subscriber = Some(subscriber),
        Err(e) => {
            supervisor
                .shutdown(&mut link, ShutdownReason::Fault(e.to_string()))
                .await;
            return Err(e);
        }
    }

    info!("Subscribed to: {}", config.topic);
    info!("Listening for commands... Press Ctrl+C to exit.");

    match supervisor.run(&mut link, interrupted(interrupts), fault_rx).await {
        ShutdownReason::Interrupt => Ok(()),
        ShutdownReason::Fault(msg) => Err(msg.into()),
    }
}
