//! Command/response primitive of the TDS01V ASCII protocol
//!
//! Every command is a short hex string followed by CR LF. The module answers
//! with one line, but each answer carries two line terminators: after CR→LF
//! translation the first terminator closes the response line and the second
//! arrives as an empty line that has to be drained before the next command.

use std::fmt;
use std::io::{self, Read, Write};

use log::debug;

use crate::error::{Result, Tds01vError};
use crate::transport::Transport;

/// Upper bound on a single response line
pub const RESPONSE_BUFFER_LEN: usize = 255;

/// Size of the read that drains the trailing terminator line
pub const RESIDUAL_LEN: usize = 2;

const LINE_TERMINATOR: &[u8] = b"\r\n";

/// Commands understood by the TDS01V
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Reset the module. Acknowledged with `F0`.
    Reset,
    /// Query the operating status. `00` means idle.
    Status,
    /// Set magnetic declination and measurement conditions
    SetDeclination,
    /// Select the full telemetry field set for the data frame
    SelectTelemetry,
    /// Initialise the magnetometer
    InitMagnetometer,
    /// Start one measurement cycle. Acknowledged with `DE`.
    StartMeasurement,
    /// Fetch the measurement frame
    FetchFrame,
}

impl Command {
    /// Wire text of the command, without line terminator
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Reset => "0F",
            Command::Status => "2B",
            Command::SetDeclination => "050027950000",
            Command::SelectTelemetry => "0DF7",
            Command::InitMagnetometer => "27",
            Command::StartMeasurement => "21",
            Command::FetchFrame => "29",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One response line as read from the device, terminator included
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    bytes: Vec<u8>,
}

impl Response {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    /// Raw bytes as received
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Response content with trailing line terminators removed
    pub fn payload(&self) -> &[u8] {
        let end = self
            .bytes
            .iter()
            .rposition(|b| *b != b'\n' && *b != b'\r')
            .map_or(0, |i| i + 1);
        &self.bytes[..end]
    }

    /// True if the response begins with the two-character status `marker`
    pub fn starts_with(&self, marker: &str) -> bool {
        self.bytes.starts_with(marker.as_bytes())
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(self.payload()))
    }
}

/// Read one line the way a canonical-mode terminal with ICRNL delivers it
///
/// CR is translated to LF and the line ends after the first LF, or when `buf`
/// is full. Returns the number of bytes stored, 0 on end of stream.
pub fn read_line<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut len = 0;
    let mut byte = [0u8; 1];

    while len < buf.len() {
        match reader.read(&mut byte) {
            Ok(0) => break,
            Ok(_) => {
                let b = if byte[0] == b'\r' { b'\n' } else { byte[0] };
                buf[len] = b;
                len += 1;
                if b == b'\n' {
                    break;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    Ok(len)
}

/// Send `command` and return the device's response line
///
/// Writes the command followed by CR LF, reads one response line (at most
/// [`RESPONSE_BUFFER_LEN`] bytes), then drains the second terminator. No
/// retries are made; an expired read timeout is reported as
/// [`Tds01vError::Timeout`].
pub fn exchange<T: Transport + ?Sized>(transport: &mut T, command: Command) -> Result<Response> {
    let mut frame = Vec::with_capacity(command.as_str().len() + LINE_TERMINATOR.len());
    frame.extend_from_slice(command.as_str().as_bytes());
    frame.extend_from_slice(LINE_TERMINATOR);

    transport
        .write_all(&frame)
        .map_err(|e| io_error(command, e))?;
    transport.flush().map_err(|e| io_error(command, e))?;

    let mut buf = [0u8; RESPONSE_BUFFER_LEN];
    let len = read_line(&mut *transport, &mut buf).map_err(|e| io_error(command, e))?;

    let mut residual = [0u8; RESIDUAL_LEN];
    read_line(&mut *transport, &mut residual).map_err(|e| io_error(command, e))?;

    let response = Response::new(&buf[..len]);
    debug!("{} -> {}", command, response);
    Ok(response)
}

fn io_error(command: Command, e: io::Error) -> Tds01vError {
    match e.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => Tds01vError::Timeout {
            command: command.as_str(),
        },
        _ => Tds01vError::Io(e),
    }
}
