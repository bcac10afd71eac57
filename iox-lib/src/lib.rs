pub mod client;
pub mod constants;
pub mod error;
pub mod frame;
pub mod reassembly;
pub mod runtime;
pub mod telemetry;
pub mod transport;


// Re-export the main entry points for easy access
pub use client::{ConnectionState, IoxClient};
pub use error::{ErrorKind, IoxError};
pub use runtime::{IoxHandle, spawn};
pub use telemetry::TelemetryEvent;
