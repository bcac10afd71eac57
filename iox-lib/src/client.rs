use crate::constants::{ACK_TOKEN, HANDSHAKE_TOKEN, SYNC_BYTE};
use crate::error::IoxError;
use crate::frame::{Frame, MessageType};
use crate::reassembly::FragmentReassembler;
use crate::telemetry::TelemetryEvent;
use crate::transport::{EventSink, Transport, TransportEvent};
use bytes::Bytes;
use strum_macros::Display;
use tracing::{debug, info, warn};

/// Connection lifecycle state. Exactly one state is active at a time and
/// only the client mutates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ConnectionState {
    /// No attempt in flight
    Idle,
    /// Waiting for the transport to open
    Opening,
    /// Link open, announcing readiness with the sync byte until the
    /// device starts handshaking
    Syncing,
    /// Confirmation sent, waiting for the device's acknowledgement.
    /// `previously_connected` is set when the device re-handshakes out
    /// of an established session.
    Handshaking { previously_connected: bool },
    /// Session established, telemetry flowing
    Connected,
}

/// Client side of the IOX session protocol.
///
/// Owns the five-state handshake lifecycle, interprets inbound transport
/// reads according to the current state, and issues the outbound sync
/// and handshake-confirmation messages. All methods run on one logical
/// thread; transport completions are fed in serially through
/// [`handle_transport`](IoxClient::handle_transport). The periodic sync
/// retry cadence lives in [`crate::runtime`]; embedders driving the
/// client directly call [`sync_tick`](IoxClient::sync_tick) themselves.
pub struct IoxClient {
    transport: Box<dyn Transport>,
    sink: Option<Box<dyn EventSink>>,
    state: ConnectionState,
    reconnect: bool,
    reassembler: FragmentReassembler,
}

impl IoxClient {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        IoxClient {
            transport,
            sink: None,
            state: ConnectionState::Idle,
            reconnect: false,
            reassembler: FragmentReassembler::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Begin a connection attempt. The sink receives all lifecycle and
    /// telemetry notifications until `stop` or a terminal failure.
    ///
    /// Only one attempt may be in flight: a `start` while non-idle is
    /// rejected immediately (the rejected sink is told via
    /// `on_start(Err)`) and the existing attempt is left untouched.
    ///
    /// `reconnect` makes unexpected link drops re-enter `Opening`
    /// immediately instead of falling back to `Idle`. Backoff, if any,
    /// belongs to the transport implementation.
    pub fn start(
        &mut self,
        sink: Box<dyn EventSink>,
        reconnect: bool,
    ) -> Result<(), IoxError> {
        if self.state != ConnectionState::Idle {
            warn!(state = %self.state, "start rejected, attempt already in flight");
            let mut sink = sink;
            sink.on_start(Err(IoxError::AlreadyStarted));
            return Err(IoxError::AlreadyStarted);
        }
        self.sink = Some(sink);
        self.reconnect = reconnect;
        self.set_state(ConnectionState::Opening);
        self.transport.open(reconnect);
        Ok(())
    }

    /// Stop synchronously. The sink is detached before the transport is
    /// closed, so a callback racing in after `stop` has nothing left to
    /// notify.
    pub fn stop(&mut self) {
        if self.state == ConnectionState::Idle {
            return;
        }
        info!("stopping");
        self.sink = None;
        self.reassembler.reset();
        self.transport.close();
        self.state = ConnectionState::Idle;
    }

    /// Feed one transport completion or inbound read. Events must be
    /// delivered in the order the transport produced them.
    pub fn handle_transport(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Opened(result) => self.handle_opened(result),
            TransportEvent::Read(bytes) => self.handle_read(bytes),
            TransportEvent::WriteFailed(error) => self.handle_write_failed(error),
            TransportEvent::ClosedUnexpectedly(error) => self.handle_link_lost(error),
        }
    }

    /// One firing of the sync retry timer. A no-op outside `Syncing`, so
    /// a stale timer cannot disturb a later state.
    pub fn sync_tick(&mut self) {
        if self.state == ConnectionState::Syncing {
            debug!("resending sync byte");
            self.transport.write(&[SYNC_BYTE]);
        }
    }

    fn handle_opened(&mut self, result: Result<(), IoxError>) {
        if self.state != ConnectionState::Opening {
            debug!(state = %self.state, "ignoring open completion");
            return;
        }
        match result {
            Ok(()) => {
                self.set_state(ConnectionState::Syncing);
                self.transport.write(&[SYNC_BYTE]);
            }
            Err(error) => {
                warn!(%error, "transport failed to open");
                self.set_state(ConnectionState::Idle);
                if let Some(mut sink) = self.sink.take() {
                    sink.on_start(Err(error));
                }
            }
        }
    }

    fn handle_read(&mut self, bytes: Bytes) {
        match self.state {
            ConnectionState::Idle => {
                debug!(len = bytes.len(), "ignoring read while idle");
            }
            ConnectionState::Opening => {
                self.abort_start(IoxError::Framing(format!(
                    "unexpected {} byte read before sync began",
                    bytes.len()
                )));
            }
            ConnectionState::Syncing => {
                if bytes.as_ref() == HANDSHAKE_TOKEN {
                    info!("handshake token received");
                    self.set_state(ConnectionState::Handshaking {
                        previously_connected: false,
                    });
                    self.send_handshake_confirmation();
                } else {
                    self.abort_start(IoxError::Framing(
                        "unexpected data while syncing".to_string(),
                    ));
                }
            }
            ConnectionState::Handshaking {
                previously_connected,
            } => {
                if bytes.as_ref() == ACK_TOKEN {
                    self.set_state(ConnectionState::Connected);
                    if !previously_connected {
                        info!("session established");
                        if let Some(sink) = self.sink.as_mut() {
                            sink.on_start(Ok(()));
                        }
                    }
                } else if bytes.as_ref() == HANDSHAKE_TOKEN {
                    // Device retried the handshake; our confirmation was
                    // likely lost in flight.
                    self.send_handshake_confirmation();
                } else if previously_connected {
                    self.teardown_session(IoxError::Framing(
                        "unexpected data during re-handshake".to_string(),
                    ));
                } else {
                    self.abort_start(IoxError::Framing(
                        "unexpected data during handshake".to_string(),
                    ));
                }
            }
            ConnectionState::Connected => self.handle_connected_read(bytes),
        }
    }

    fn handle_connected_read(&mut self, bytes: Bytes) {
        if bytes.as_ref() == HANDSHAKE_TOKEN {
            // The device re-handshakes mid-stream after its own reset.
            info!("device requested re-handshake");
            self.reassembler.reset();
            self.set_state(ConnectionState::Handshaking {
                previously_connected: true,
            });
            self.send_handshake_confirmation();
            return;
        }
        if bytes.as_ref() == ACK_TOKEN {
            debug!("duplicate acknowledgement token, ignoring");
            return;
        }

        let complete = if self.transport.mtu_limited() {
            match self.reassembler.push(&bytes) {
                Some(frame) => frame,
                None => return,
            }
        } else {
            bytes
        };

        let result = Frame::decode(&complete).and_then(|frame| match frame.message_type {
            MessageType::TelemetryData => TelemetryEvent::decode(frame.payload),
            other => Err(IoxError::Framing(format!(
                "unexpected message type {other:?}"
            ))),
        });
        if let Some(sink) = self.sink.as_mut() {
            sink.on_event(result);
        }
    }

    fn handle_write_failed(&mut self, error: IoxError) {
        match self.state {
            ConnectionState::Idle => {}
            ConnectionState::Connected
            | ConnectionState::Handshaking {
                previously_connected: true,
            } => {
                warn!(%error, "write failed on established session");
                self.transport.close();
                self.handle_link_lost(error);
            }
            _ => self.abort_start(error),
        }
    }

    /// The link dropped out from under a non-idle attempt. Honors the
    /// reconnect flag; explicit `stop` never comes through here.
    fn handle_link_lost(&mut self, error: IoxError) {
        if self.state == ConnectionState::Idle {
            return;
        }
        let established = self.established();
        self.reassembler.reset();
        if self.reconnect {
            warn!(%error, "link lost, reconnecting");
            if let Some(sink) = self.sink.as_mut() {
                sink.on_stopped_unexpectedly(error);
                if established {
                    sink.on_disconnect();
                }
            }
            self.set_state(ConnectionState::Opening);
            self.transport.open(true);
        } else if established {
            warn!(%error, "link lost");
            self.set_state(ConnectionState::Idle);
            if let Some(mut sink) = self.sink.take() {
                sink.on_stopped_unexpectedly(error);
                sink.on_disconnect();
            }
        } else {
            warn!(%error, "link lost before session was established");
            self.set_state(ConnectionState::Idle);
            if let Some(mut sink) = self.sink.take() {
                sink.on_start(Err(error));
            }
        }
    }

    /// Fatal failure before any session existed: abort the attempt and
    /// report through `on_start`.
    fn abort_start(&mut self, error: IoxError) {
        warn!(%error, state = %self.state, "aborting connection attempt");
        self.transport.close();
        self.reassembler.reset();
        self.set_state(ConnectionState::Idle);
        if let Some(mut sink) = self.sink.take() {
            sink.on_start(Err(error));
        }
    }

    /// Fatal failure of an established session that does not qualify for
    /// reconnection (protocol violation rather than link loss).
    fn teardown_session(&mut self, error: IoxError) {
        warn!(%error, "tearing down session");
        self.transport.close();
        self.reassembler.reset();
        self.set_state(ConnectionState::Idle);
        if let Some(mut sink) = self.sink.take() {
            sink.on_stopped_unexpectedly(error);
            sink.on_disconnect();
        }
    }

    fn send_handshake_confirmation(&mut self) {
        let encoded = Frame::handshake_confirmation().encode();
        self.transport.write(&encoded);
    }

    fn established(&self) -> bool {
        matches!(
            self.state,
            ConnectionState::Connected
                | ConnectionState::Handshaking {
                    previously_connected: true,
                }
        )
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state == state {
            return;
        }
        debug!(from = %self.state, to = %state, "state transition");
        self.state = state;
        if let Some(sink) = self.sink.as_mut() {
            sink.on_state_update(state);
        }
    }
}
