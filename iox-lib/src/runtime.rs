//! Tokio driver for [`IoxClient`].
//!
//! The client itself is a synchronous state machine; this module gives it
//! the single logical thread the protocol requires. One task owns the
//! client and `select!`s over the caller's commands, the transport's
//! event stream, and the sync retry deadline. The deadline is armed only
//! while the client is syncing and reconciled after every event, so the
//! timer is cancelled the instant the state moves on rather than left to
//! fire into a stale state.

use crate::client::{ConnectionState, IoxClient};
use crate::constants::SYNC_RETRY_INTERVAL;
use crate::error::IoxError;
use crate::transport::{EventSink, Transport, TransportEvent};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::debug;

enum Command {
    Start {
        sink: Box<dyn EventSink>,
        reconnect: bool,
    },
    Stop,
}

/// Handle to a spawned client task. Dropping the handle stops the task.
pub struct IoxHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl IoxHandle {
    /// Request a connection attempt. Outcome is delivered to the sink's
    /// `on_start`.
    pub fn start(
        &self,
        sink: Box<dyn EventSink>,
        reconnect: bool,
    ) -> Result<(), IoxError> {
        self.commands
            .send(Command::Start { sink, reconnect })
            .map_err(|_| IoxError::Transport("client task is gone".to_string()))
    }

    pub fn stop(&self) -> Result<(), IoxError> {
        self.commands
            .send(Command::Stop)
            .map_err(|_| IoxError::Transport("client task is gone".to_string()))
    }
}

/// Spawn the client task. `transport_events` is the channel the
/// transport implementation delivers its completions and reads into; it
/// must preserve delivery order.
pub fn spawn(
    transport: Box<dyn Transport>,
    transport_events: mpsc::UnboundedReceiver<TransportEvent>,
) -> (IoxHandle, JoinHandle<()>) {
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let client = IoxClient::new(transport);
    let task = tokio::spawn(run(client, commands_rx, transport_events));
    (
        IoxHandle {
            commands: commands_tx,
        },
        task,
    )
}

async fn run(
    mut client: IoxClient,
    mut commands: mpsc::UnboundedReceiver<Command>,
    mut transport_events: mpsc::UnboundedReceiver<TransportEvent>,
) {
    let mut sync_deadline: Option<Instant> = None;
    loop {
        let deadline = sync_deadline;
        // Biased so a start command already in flight is applied before
        // any transport event queued behind it; otherwise an event can
        // reach a still-idle client and be discarded.
        tokio::select! {
            biased;

            command = commands.recv() => match command {
                None => break,
                Some(Command::Start { sink, reconnect }) => {
                    // Rejection is reported to the sink inside start.
                    let _ = client.start(sink, reconnect);
                }
                Some(Command::Stop) => client.stop(),
            },
            event = transport_events.recv() => match event {
                None => break,
                Some(event) => client.handle_transport(event),
            },
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                client.sync_tick();
                sync_deadline = Some(Instant::now() + SYNC_RETRY_INTERVAL);
            }
        }

        // Reconcile the retry timer with the state we ended up in.
        sync_deadline = match (client.state(), sync_deadline) {
            (ConnectionState::Syncing, Some(deadline)) => Some(deadline),
            (ConnectionState::Syncing, None) => {
                debug!("arming sync retry timer");
                Some(Instant::now() + SYNC_RETRY_INTERVAL)
            }
            (_, Some(_)) => {
                debug!("disarming sync retry timer");
                None
            }
            (_, None) => None,
        };
    }
    debug!("client task exiting");
    client.stop();
}
