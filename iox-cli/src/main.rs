use anyhow::{Context, Result, bail};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use iox_lib::client::ConnectionState;
use iox_lib::constants::{
    ACK_TOKEN, HANDSHAKE_CONFIRMATION_TYPE, HANDSHAKE_TOKEN, STX, SYNC_BYTE,
};
use iox_lib::error::IoxError;
use iox_lib::frame::{Frame, MessageType};
use iox_lib::telemetry::TelemetryEvent;
use iox_lib::transport::{EventSink, Transport, TransportEvent};
use std::path::PathBuf;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Inspect and replay IOX telemetry captures.
#[derive(Parser)]
#[command(name = "iox-cli", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Decode a single hex-encoded frame or control token
    Decode {
        /// Hex bytes, whitespace allowed
        hex: String,
    },
    /// Drive a capture through the full client pipeline and print each
    /// decoded telemetry event
    Replay {
        /// Capture file: one hex-encoded transport read per line,
        /// `#` starts a comment. Without it, built-in sample frames
        /// are replayed.
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    match cli.command {
        Command::Decode { hex } => decode(&hex),
        Command::Replay { file } => replay(file).await,
    }
}

fn decode(input: &str) -> Result<()> {
    let cleaned: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    let raw = hex::decode(&cleaned).context("input is not valid hex")?;

    if raw == HANDSHAKE_TOKEN {
        println!("handshake token");
        return Ok(());
    }
    if raw == ACK_TOKEN {
        println!("acknowledgement token");
        return Ok(());
    }
    if raw.len() == 1 && raw[0] == SYNC_BYTE {
        println!("sync byte");
        return Ok(());
    }

    let frame = Frame::decode(&raw).context("not a valid frame")?;
    match frame.message_type {
        MessageType::TelemetryData => {
            let event = TelemetryEvent::decode(frame.payload)
                .context("telemetry payload did not decode")?;
            println!("{event}");
            println!(
                "  status: gps={} ignition={} engine_data={} datetime={} speed_src_engine={} dist_src_engine={}",
                event.status.gps_latched(),
                event.status.ignition_on(),
                event.status.engine_data_live(),
                event.status.datetime_valid(),
                event.status.speed_from_engine(),
                event.status.distance_from_engine()
            );
            println!(
                "  trip: {:.1} km, {:.1} engine hours, {} ms, driver {}",
                event.trip_odometer, event.engine_hours, event.trip_duration_ms, event.driver_id
            );
        }
        other => {
            println!(
                "{:?} frame, {} byte payload: {}",
                other,
                frame.payload.len(),
                hex::encode(&frame.payload)
            );
        }
    }
    Ok(())
}

async fn replay(file: Option<PathBuf>) -> Result<()> {
    let chunks = match file {
        Some(path) => load_capture(&path)?,
        None => sample_chunks(),
    };
    info!(chunks = chunks.len(), "replaying capture");

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let transport = SimTransport {
        events: events_tx,
        chunks,
        handshake_sent: false,
    };
    let (handle, task) = iox_lib::runtime::spawn(Box::new(transport), events_rx);

    let (done_tx, done_rx) = oneshot::channel();
    handle
        .start(
            Box::new(PrintSink {
                done: Some(done_tx),
            }),
            false,
        )
        .map_err(|e| anyhow::anyhow!("failed to start client: {e}"))?;

    done_rx.await.ok();
    handle.stop().ok();
    drop(handle);
    task.await.ok();
    Ok(())
}

fn load_capture(path: &PathBuf) -> Result<Vec<Bytes>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    let mut chunks = Vec::new();
    for (number, line) in text.lines().enumerate() {
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let raw = hex::decode(line)
            .with_context(|| format!("bad hex on line {}", number + 1))?;
        if raw.is_empty() {
            bail!("empty chunk on line {}", number + 1);
        }
        chunks.push(Bytes::from(raw));
    }
    if chunks.is_empty() {
        bail!("capture contains no chunks");
    }
    Ok(chunks)
}

/// A few frames of a southbound drive, so `replay` works out of the box.
fn sample_chunks() -> Vec<Bytes> {
    (0..3i32)
        .map(|i| {
            let mut p = Vec::with_capacity(40);
            p.extend_from_slice(&(757_468_800 + i * 30).to_le_bytes()); // 2026-01-01 + i*30s
            p.extend_from_slice(&(435_207_000 - i * 9000).to_le_bytes());
            p.extend_from_slice(&(-794_963_000i32).to_le_bytes());
            p.push(72 + i as u8);
            p.extend_from_slice(&((3200i16 + 40 * i as i16) * 4).to_le_bytes());
            p.extend_from_slice(&(1_234_560 + i * 6).to_le_bytes());
            p.push(0b0000_1011);
            p.extend_from_slice(&(120 + i * 6).to_le_bytes());
            p.extend_from_slice(&88_450i32.to_le_bytes());
            p.extend_from_slice(&(540 + i * 30).to_le_bytes());
            p.extend_from_slice(&42i32.to_le_bytes());
            p.extend_from_slice(&7i32.to_le_bytes());
            Frame::new(MessageType::TelemetryData, Bytes::from(p)).encode()
        })
        .collect()
}

/// Plays the device side of the handshake, then streams the capture and
/// hangs up.
struct SimTransport {
    events: mpsc::UnboundedSender<TransportEvent>,
    chunks: Vec<Bytes>,
    handshake_sent: bool,
}

impl Transport for SimTransport {
    fn open(&mut self, _reconnect: bool) {
        let _ = self.events.send(TransportEvent::Opened(Ok(())));
    }

    fn close(&mut self) {}

    fn write(&mut self, bytes: &[u8]) {
        if bytes.len() == 1 && bytes[0] == SYNC_BYTE {
            if !self.handshake_sent {
                self.handshake_sent = true;
                let _ = self
                    .events
                    .send(TransportEvent::Read(Bytes::copy_from_slice(&HANDSHAKE_TOKEN)));
            }
        } else if bytes.first() == Some(&STX)
            && bytes.get(1) == Some(&HANDSHAKE_CONFIRMATION_TYPE)
        {
            let _ = self
                .events
                .send(TransportEvent::Read(Bytes::copy_from_slice(&ACK_TOKEN)));
            for chunk in self.chunks.drain(..) {
                let _ = self.events.send(TransportEvent::Read(chunk));
            }
            let _ = self.events.send(TransportEvent::ClosedUnexpectedly(
                IoxError::Transport("end of capture".to_string()),
            ));
        }
    }
}

struct PrintSink {
    done: Option<oneshot::Sender<()>>,
}

impl PrintSink {
    fn finish(&mut self) {
        if let Some(done) = self.done.take() {
            let _ = done.send(());
        }
    }
}

impl EventSink for PrintSink {
    fn on_start(&mut self, result: Result<(), IoxError>) {
        match result {
            Ok(()) => info!("session established"),
            Err(e) => {
                error!("start failed: {e}");
                self.finish();
            }
        }
    }

    fn on_stopped_unexpectedly(&mut self, error: IoxError) {
        info!("stream ended: {error}");
        self.finish();
    }

    fn on_event(&mut self, event: Result<TelemetryEvent, IoxError>) {
        match event {
            Ok(ev) => println!("{ev}"),
            Err(e) => warn!("bad frame: {e}"),
        }
    }

    fn on_disconnect(&mut self) {
        debug!("disconnected");
    }

    fn on_state_update(&mut self, state: ConnectionState) {
        debug!(%state, "state update");
    }
}
