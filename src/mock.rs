//! Scripted TDS01V stand-in for unit tests
//!
//! Commands written to the device are recorded, and each complete command line
//! queues its scripted answer followed by CR LF, exactly as the module sends
//! it. Commands without a script get no answer, so the next read times out.

use std::collections::{HashMap, VecDeque};
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::Result;
use crate::protocol::Command;
use crate::transport::Transport;

/// Frame used across the crate's tests:
/// mag (5.0, -5.0, 0.0), azimuth 123.4, acc (0.01, -0.98, 1.0),
/// roll -2.5, pitch 45.0, pressure 1013.2, altitude -12, temp 25.6, 3300 mV
pub(crate) const SAMPLE_FRAME: &str = "0032FFCE000004D20001FF9E0064FFE701C22794FFF401000CE4";

#[derive(Default)]
struct Script {
    once: VecDeque<String>,
    always: Option<String>,
}

/// Shared view of what happened on a [`ScriptedDevice`]
#[derive(Clone, Default)]
pub(crate) struct DeviceProbe {
    commands: Arc<Mutex<Vec<String>>>,
    raw: Arc<Mutex<Vec<u8>>>,
    restores: Arc<AtomicUsize>,
}

impl DeviceProbe {
    pub(crate) fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    pub(crate) fn raw_writes(&self) -> Vec<u8> {
        self.raw.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, command: Command) -> usize {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.as_str() == command.as_str())
            .count()
    }

    pub(crate) fn restores(&self) -> usize {
        self.restores.load(Ordering::SeqCst)
    }
}

pub(crate) struct ScriptedDevice {
    scripts: HashMap<&'static str, Script>,
    failing: Option<&'static str>,
    line: Vec<u8>,
    pending: VecDeque<u8>,
    probe: DeviceProbe,
}

impl ScriptedDevice {
    pub(crate) fn new() -> Self {
        Self {
            scripts: HashMap::new(),
            failing: None,
            line: Vec::new(),
            pending: VecDeque::new(),
            probe: DeviceProbe::default(),
        }
    }

    /// A module that acknowledges everything and always has a frame ready
    pub(crate) fn healthy() -> Self {
        Self::new()
            .respond(Command::Reset, "F0")
            .respond(Command::Status, "00")
            .respond(Command::SetDeclination, "05")
            .respond(Command::SelectTelemetry, "0D")
            .respond(Command::InitMagnetometer, "27")
            .respond(Command::StartMeasurement, "DE")
            .respond(Command::FetchFrame, SAMPLE_FRAME)
    }

    /// Answer every `command` with `response`
    pub(crate) fn respond(mut self, command: Command, response: &str) -> Self {
        self.scripts.entry(command.as_str()).or_default().always = Some(response.to_string());
        self
    }

    /// Answer the next `command`s with `responses` in order, before falling back
    /// to the `respond` answer
    pub(crate) fn respond_sequence(mut self, command: Command, responses: &[&str]) -> Self {
        let script = self.scripts.entry(command.as_str()).or_default();
        script.once.extend(responses.iter().map(|r| r.to_string()));
        self
    }

    /// Writing `command` fails as if the cable was pulled
    pub(crate) fn fail_on(mut self, command: Command) -> Self {
        self.failing = Some(command.as_str());
        self
    }

    pub(crate) fn probe(&self) -> DeviceProbe {
        self.probe.clone()
    }

    fn on_command(&mut self, command: String) {
        if let Some(script) = self.scripts.get_mut(command.as_str()) {
            let answer = script.once.pop_front().or_else(|| script.always.clone());
            if let Some(answer) = answer {
                self.pending.extend(answer.bytes());
                self.pending.extend(b"\r\n".iter().copied());
            }
        }
        self.probe.commands.lock().unwrap().push(command);
    }
}

impl Read for ScriptedDevice {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no scripted response"));
        }
        let mut len = 0;
        while len < buf.len() {
            match self.pending.pop_front() {
                Some(b) => {
                    buf[len] = b;
                    len += 1;
                }
                None => break,
            }
        }
        Ok(len)
    }
}

impl Write for ScriptedDevice {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.probe.raw.lock().unwrap().extend_from_slice(buf);
        self.line.extend_from_slice(buf);

        while let Some(pos) = self.line.windows(2).position(|w| w == b"\r\n") {
            let command = String::from_utf8_lossy(&self.line[..pos]).into_owned();
            self.line.drain(..pos + 2);

            if self.failing == Some(command.as_str()) {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device detached"));
            }
            self.on_command(command);
        }

        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Transport for ScriptedDevice {
    fn name(&self) -> String {
        "scripted".to_string()
    }

    fn restore(&mut self) -> Result<()> {
        self.probe.restores.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
