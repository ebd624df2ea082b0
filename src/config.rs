//! Connection configuration

use std::time::Duration;

/// Serial device the sensor module enumerates as
pub const DEFAULT_DEVICE_PATH: &str = "/dev/ttyUSB0";

/// Line speed of the TDS01V serial interface
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Settings used to open a connection to the sensor
///
/// The defaults reproduce the fixed setup of the module: `/dev/ttyUSB0`,
/// 9600 baud, reads that block until the device answers and an unbounded
/// idle poll during the reset handshake.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use tds01v_interface::ConnectionConfig;
///
/// let config = ConnectionConfig::default()
///     .with_device_path("/dev/ttyUSB1")
///     .with_read_timeout(Duration::from_secs(2))
///     .with_idle_poll_limit(50);
///
/// assert_eq!(config.baud_rate, 9600);
/// assert_eq!(config.idle_poll_limit, Some(50));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Path of the serial device node
    pub device_path: String,
    /// Line speed in baud
    pub baud_rate: u32,
    /// Maximum wait for a response line. `None` blocks indefinitely.
    pub read_timeout: Option<Duration>,
    /// Maximum number of non-idle status answers during reset. `None` polls forever.
    pub idle_poll_limit: Option<u32>,
}

impl ConnectionConfig {
    pub fn with_device_path(mut self, path: impl Into<String>) -> Self {
        self.device_path = path.into();
        self
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    pub fn with_idle_poll_limit(mut self, limit: u32) -> Self {
        self.idle_poll_limit = Some(limit);
        self
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            device_path: DEFAULT_DEVICE_PATH.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: None,
            idle_poll_limit: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_module_setup() {
        let config = ConnectionConfig::default();
        assert_eq!(config.device_path, "/dev/ttyUSB0");
        assert_eq!(config.baud_rate, 9600);
        assert!(config.read_timeout.is_none());
        assert!(config.idle_poll_limit.is_none());
    }

    #[test]
    fn test_builder_overrides() {
        let config = ConnectionConfig::default()
            .with_device_path("/dev/ttyACM0")
            .with_baud_rate(19200)
            .with_read_timeout(Duration::from_millis(250));
        assert_eq!(config.device_path, "/dev/ttyACM0");
        assert_eq!(config.baud_rate, 19200);
        assert_eq!(config.read_timeout, Some(Duration::from_millis(250)));
    }
}
