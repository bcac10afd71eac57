use crate::constants::{DEVICE_EPOCH_OFFSET_SECS, TELEMETRY_PAYLOAD_SIZE};
use crate::error::IoxError;
use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use modular_bitfield::prelude::*;
use std::fmt;
use zerocopy::byteorder::little_endian::{I16, I32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Six independent status flags packed into one byte of the telemetry
/// record.
#[bitfield(bytes = 1)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StatusFlags {
    /// GPS fix is valid
    pub gps_latched: bool,
    /// Ignition line is on
    pub ignition_on: bool,
    /// Engine bus data is present in this record
    pub engine_data_live: bool,
    /// Device date/time has been set
    pub datetime_valid: bool,
    /// Road speed came from the engine bus rather than GPS
    pub speed_from_engine: bool,
    /// Distance came from the engine bus rather than GPS
    pub distance_from_engine: bool,
    #[skip]
    unused: B2,
}

/// Fixed 40-byte telemetry record as it appears on the wire.
///
/// All multi-byte fields are little-endian. Values are fixed-point; see
/// the `TelemetryEvent` conversion for the scale factors.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct TelemetryRaw {
    /// Seconds since 2002-01-01T00:00:00Z
    pub timestamp_s: I32,
    /// Degrees * 1e7
    pub latitude_raw: I32,
    /// Degrees * 1e7
    pub longitude_raw: I32,
    /// km/h, unscaled
    pub road_speed_raw: i8,
    /// RPM * 4
    pub rpm_raw: I16,
    /// km * 10
    pub odometer_raw: I32,
    pub status_raw: u8,
    /// km * 10
    pub trip_odometer_raw: I32,
    /// Hours * 10
    pub engine_hours_raw: I32,
    /// Seconds
    pub trip_duration_raw: I32,
    pub vehicle_id_raw: I32,
    pub driver_id_raw: I32,
}

/// Decoded telemetry record with engineering units applied.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TelemetryEvent {
    /// ISO-8601 UTC timestamp, `yyyy-MM-ddTHH:mm:ssZ`
    pub timestamp: String,
    /// Decimal degrees
    pub latitude: f64,
    /// Decimal degrees
    pub longitude: f64,
    /// km/h
    pub road_speed: f64,
    pub rpm: f64,
    pub status: StatusFlags,
    /// km
    pub odometer: f64,
    /// km
    pub trip_odometer: f64,
    /// Hours
    pub engine_hours: f64,
    /// Milliseconds
    pub trip_duration_ms: i64,
    pub vehicle_id: String,
    pub driver_id: String,
    /// Original payload bytes, for consumers that need the wire encoding
    #[cfg_attr(feature = "serde", serde(skip))]
    pub raw: Bytes,
}

impl TelemetryEvent {
    /// Decode a validated frame payload into a telemetry event.
    ///
    /// Payloads shorter than 40 bytes cannot contain the full record and
    /// fail with a decode error; trailing bytes beyond 40 are kept in
    /// `raw` but otherwise ignored.
    pub fn decode(payload: Bytes) -> Result<TelemetryEvent, IoxError> {
        if payload.len() < TELEMETRY_PAYLOAD_SIZE {
            return Err(IoxError::PayloadTooShort {
                expected: TELEMETRY_PAYLOAD_SIZE,
                actual: payload.len(),
            });
        }
        let record = TelemetryRaw::ref_from_bytes(&payload[..TELEMETRY_PAYLOAD_SIZE])
            .map_err(|_| IoxError::PayloadTooShort {
                expected: TELEMETRY_PAYLOAD_SIZE,
                actual: payload.len(),
            })?;

        let unix_secs = record.timestamp_s.get() as i64 + DEVICE_EPOCH_OFFSET_SECS;
        let timestamp = DateTime::<Utc>::from_timestamp(unix_secs, 0)
            .unwrap_or(DateTime::UNIX_EPOCH)
            .to_rfc3339_opts(SecondsFormat::Secs, true);

        Ok(TelemetryEvent {
            timestamp,
            latitude: record.latitude_raw.get() as f64 / 10_000_000.0,
            longitude: record.longitude_raw.get() as f64 / 10_000_000.0,
            road_speed: record.road_speed_raw as f64,
            rpm: record.rpm_raw.get() as f64 / 4.0,
            status: StatusFlags::from_bytes([record.status_raw]),
            odometer: record.odometer_raw.get() as f64 / 10.0,
            trip_odometer: record.trip_odometer_raw.get() as f64 / 10.0,
            engine_hours: record.engine_hours_raw.get() as f64 / 10.0,
            trip_duration_ms: record.trip_duration_raw.get() as i64 * 1000,
            vehicle_id: record.vehicle_id_raw.get().to_string(),
            driver_id: record.driver_id_raw.get().to_string(),
            raw: payload,
        })
    }
}

impl fmt::Display for TelemetryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} vehicle {} pos ({:.7}, {:.7}) speed {:.0} km/h rpm {:.0} odo {:.1} km",
            self.timestamp,
            self.vehicle_id,
            self.latitude,
            self.longitude,
            self.road_speed,
            self.rpm,
            self.odometer
        )
    }
}
