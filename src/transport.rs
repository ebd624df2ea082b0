//! Serial line transport for the TDS01V module
//!
//! The module speaks a line-oriented ASCII protocol at 9600 baud with RTS/CTS
//! hardware flow control. [`SerialTransport`] opens the device node, snapshots
//! the complete terminal settings it finds before changing anything, applies
//! the acquisition line discipline, and writes the snapshot back on
//! [`Transport::restore`].

use std::fs::OpenOptions;
use std::io::{self, Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{AsRawFd, FromRawFd, IntoRawFd};
use std::time::Duration;

use log::debug;
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::sys::termios::{
    self, BaudRate, ControlFlags, FlushArg, InputFlags, LocalFlags, OutputFlags, SetArg, Termios,
};
use serialport::{SerialPort, TTYPort};

use crate::config::ConnectionConfig;
use crate::error::{Result, Tds01vError};

/// Port-level timeout used when reads are configured to block indefinitely.
/// Expiries at this interval are retried silently.
const BLOCKING_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Byte stream to the sensor module
///
/// Anything that can carry the command/response traffic implements this:
/// the real serial port, or a scripted device in tests.
pub trait Transport: Read + Write + Send {
    /// Human readable endpoint name, used in logs and errors
    fn name(&self) -> String;

    /// Put the line back into the state it had before it was configured
    fn restore(&mut self) -> Result<()>;
}

/// Map a numeric line speed onto a termios speed constant
pub fn baud_rate(rate: u32) -> Option<BaudRate> {
    let baud = match rate {
        1200 => BaudRate::B1200,
        2400 => BaudRate::B2400,
        4800 => BaudRate::B4800,
        9600 => BaudRate::B9600,
        19200 => BaudRate::B19200,
        38400 => BaudRate::B38400,
        57600 => BaudRate::B57600,
        115200 => BaudRate::B115200,
        230400 => BaudRate::B230400,
        _ => return None,
    };
    Some(baud)
}

/// Line discipline the TDS01V requires, derived from the settings found on the line
///
/// 8N1 with RTS/CTS, receiver on, modem lines ignored. Input is canonical with
/// CR translated to LF and parity errors ignored; output is unprocessed.
/// Control characters are kept from `current`.
pub fn acquisition_termios(current: &Termios, baud: BaudRate) -> Result<Termios> {
    let mut line = current.clone();
    line.control_flags =
        ControlFlags::CS8 | ControlFlags::CRTSCTS | ControlFlags::CLOCAL | ControlFlags::CREAD;
    line.input_flags = InputFlags::IGNPAR | InputFlags::ICRNL;
    line.output_flags = OutputFlags::empty();
    line.local_flags = LocalFlags::ICANON;
    termios::cfsetspeed(&mut line, baud)?;
    Ok(line)
}

/// TDS01V connection over a serial device node
pub struct SerialTransport {
    port: TTYPort,
    path: String,
    saved: Termios,
    blocking: bool,
}

impl SerialTransport {
    /// Open and configure the serial device named in `config`
    ///
    /// The device is opened read/write without becoming the controlling
    /// terminal. Its terminal settings are saved before anything is changed,
    /// pending input is discarded and the acquisition settings are applied.
    pub fn configure(config: &ConnectionConfig) -> Result<Self> {
        let baud = baud_rate(config.baud_rate)
            .ok_or(Tds01vError::UnsupportedBaudRate(config.baud_rate))?;
        let timeout = config.read_timeout.unwrap_or(BLOCKING_POLL_INTERVAL);

        // O_NONBLOCK keeps open() from waiting on carrier detect
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags((OFlag::O_NOCTTY | OFlag::O_NONBLOCK).bits())
            .open(&config.device_path)?;
        let fd = file.as_raw_fd();
        fcntl(fd, FcntlArg::F_SETFL(OFlag::empty()))?;

        let saved = termios::tcgetattr(fd)?;
        debug!(
            "{}: saved line settings ({:?} baud)",
            config.device_path,
            termios::cfgetospeed(&saved)
        );

        let line = acquisition_termios(&saved, baud)?;
        termios::tcflush(fd, FlushArg::TCIFLUSH)?;
        termios::tcsetattr(fd, SetArg::TCSANOW, &line)?;

        // SAFETY: the descriptor was just released by `file` and has no other owner
        let mut port = unsafe { TTYPort::from_raw_fd(file.into_raw_fd()) };
        port.set_timeout(timeout)?;

        debug!(
            "{}: configured for {} baud, 8N1, RTS/CTS, canonical input",
            config.device_path, config.baud_rate
        );

        Ok(Self {
            port,
            path: config.device_path.clone(),
            saved,
            blocking: config.read_timeout.is_none(),
        })
    }

    /// Terminal settings found on the line before it was configured
    pub fn saved_settings(&self) -> &Termios {
        &self.saved
    }
}

impl Read for SerialTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match self.port.read(buf) {
                Err(e) if self.blocking && e.kind() == io::ErrorKind::TimedOut => continue,
                other => return other,
            }
        }
    }
}

impl Write for SerialTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}

impl Transport for SerialTransport {
    fn name(&self) -> String {
        self.port.name().unwrap_or_else(|| self.path.clone())
    }

    fn restore(&mut self) -> Result<()> {
        termios::tcsetattr(self.port.as_raw_fd(), SetArg::TCSANOW, &self.saved)?;
        debug!("{}: restored line settings", self.path);
        Ok(())
    }
}
