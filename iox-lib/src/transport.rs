use crate::client::ConnectionState;
use crate::error::IoxError;
use crate::telemetry::TelemetryEvent;
use bytes::Bytes;

/// Command surface of a physical link (BLE peripheral, USB accessory).
///
/// Methods only issue requests; completions and inbound data come back
/// asynchronously as [`TransportEvent`]s fed to the client. Concrete
/// implementations live outside this crate, next to the platform I/O
/// they wrap.
pub trait Transport: Send {
    /// Begin opening the link. Completion arrives as
    /// [`TransportEvent::Opened`].
    fn open(&mut self, reconnect: bool);

    /// Tear the link down. No events are expected afterwards.
    fn close(&mut self);

    /// Queue bytes for transmission. A failed transmission arrives as
    /// [`TransportEvent::WriteFailed`].
    fn write(&mut self, bytes: &[u8]);

    /// Whether reads may deliver sub-frame fragments (true for BLE,
    /// whose MTU is smaller than a telemetry frame).
    fn mtu_limited(&self) -> bool {
        false
    }
}

/// Asynchronous notifications from a [`Transport`] implementation.
#[derive(Debug)]
pub enum TransportEvent {
    /// Result of the `open` requested earlier
    Opened(Result<(), IoxError>),
    /// Inbound bytes, exactly as delivered by the link (possibly a
    /// fragment on an MTU-limited transport)
    Read(Bytes),
    /// A previously queued write could not be transmitted
    WriteFailed(IoxError),
    /// The link dropped without `close` having been called
    ClosedUnexpectedly(IoxError),
}

/// Receives decoded telemetry and connection lifecycle notifications.
///
/// The sink is handed over at `start` and detached the moment `stop` is
/// called, so no callback can fire after an explicit stop.
pub trait EventSink: Send {
    /// The connection attempt finished: `Ok` once the session is
    /// established, `Err` if the attempt was aborted. Fires at most once
    /// per successful session.
    fn on_start(&mut self, result: Result<(), IoxError>);

    /// An established session (or an attempt that survived into one)
    /// was torn down by a failure rather than by `stop`.
    fn on_stopped_unexpectedly(&mut self, error: IoxError);

    /// One telemetry frame was received: the decoded event, or the
    /// per-frame error if it failed framing or decoding.
    fn on_event(&mut self, event: Result<TelemetryEvent, IoxError>);

    /// The established session ended.
    fn on_disconnect(&mut self);

    /// The connection state changed.
    fn on_state_update(&mut self, state: ConnectionState) {
        let _ = state;
    }
}
