//! Serial interface library for the TDS01V sensor module
//!
//! The TDS01V combines a magnetometer, accelerometer and barometer behind a
//! USB serial bridge. This library resets the module, runs a background
//! acquisition thread and hands every decoded measurement to a callback.
//!
//! # Quick Start
//!
//! ## Streaming Measurements
//! ```no_run
//! use tds01v_interface::Tds01v;
//! use std::time::Duration;
//!
//! let mut sensor = Tds01v::open()?;
//!
//! sensor.register_callback(|sample| {
//!     println!("Azimuth: {:.1}°", sample.azimuth);
//!     println!("Pressure: {:.1} hPa, altitude {} m", sample.air_pressure, sample.altitude);
//! })?;
//!
//! sensor.start()?;
//! std::thread::sleep(Duration::from_secs(5));
//! sensor.stop();
//! sensor.close()?;
//! # Ok::<(), tds01v_interface::Tds01vError>(())
//! ```
//!
//! ## Stopping From the Callback
//! ```no_run
//! use tds01v_interface::Tds01v;
//!
//! let mut sensor = Tds01v::open()?;
//! let stop = sensor.stop_handle();
//!
//! // Stop on the first strong tilt
//! sensor.register_callback(move |sample| {
//!     if sample.pitch.abs() > 30.0 || sample.roll.abs() > 30.0 {
//!         println!("Tilt detected: roll {:.1}°, pitch {:.1}°", sample.roll, sample.pitch);
//!         stop.stop();
//!     }
//! })?;
//!
//! sensor.start()?;
//! let stats = sensor.close()?;
//! println!("{} samples in {} cycles", stats.samples, stats.cycles);
//! # Ok::<(), tds01v_interface::Tds01vError>(())
//! ```
//!
//! ## Custom Connection Settings
//! ```no_run
//! use tds01v_interface::{ConnectionConfig, Tds01v};
//! use std::time::Duration;
//!
//! let config = ConnectionConfig::default()
//!     .with_device_path("/dev/ttyUSB1")
//!     .with_read_timeout(Duration::from_secs(1))
//!     .with_idle_poll_limit(100);
//!
//! let sensor = Tds01v::open_with(&config)?;
//! sensor.close()?;
//! # Ok::<(), tds01v_interface::Tds01vError>(())
//! ```

pub mod acquisition;
pub mod callback;
pub mod common;
pub mod config;
pub mod error;
pub mod frame;
pub mod handshake;
pub mod protocol;
pub mod sample;
pub mod session;
pub mod transport;

#[cfg(test)]
mod mock;

// Re-export public API
pub use acquisition::{AcquisitionState, AcquisitionStats, CycleOutcome, StopHandle};
pub use callback::{CallbackSlot, SampleCallback};
pub use common::{compass_point, tilt_gauge, RateMeter, TILT_RANGE_DEG};
pub use config::{ConnectionConfig, DEFAULT_BAUD_RATE, DEFAULT_DEVICE_PATH};
pub use error::{Result, Tds01vError};
pub use frame::{decode_raw, decode_scaled10, decode_scaled100, FrameError};
pub use handshake::ResetVerdict;
pub use protocol::{Command, Response};
pub use sample::Sample;
pub use session::Tds01v;
pub use transport::{SerialTransport, Transport};
