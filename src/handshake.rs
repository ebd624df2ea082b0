//! Reset handshake performed when a connection is opened

use log::{debug, warn};

use crate::error::{Result, Tds01vError};
use crate::protocol::{exchange, Command};
use crate::transport::Transport;

/// Acknowledgement of the reset command
const RESET_ACK: &str = "F0";

/// Status reported once the module has finished resetting
const STATUS_IDLE: &str = "00";

/// Outcome of the reset command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetVerdict {
    /// The module acknowledged the reset with `F0`
    Accepted,
    /// Any other answer
    Rejected,
}

/// Reset the module and wait until it reports idle
///
/// The verdict only reflects the answer to the reset command. The status
/// poll runs regardless of that answer and ends when a status response starts
/// with `00`. With `idle_poll_limit` set, the poll gives up after that many
/// non-idle answers with [`Tds01vError::DeviceUnresponsive`]; without it the
/// poll continues for as long as the device keeps answering.
pub fn reset<T: Transport + ?Sized>(
    transport: &mut T,
    idle_poll_limit: Option<u32>,
) -> Result<ResetVerdict> {
    let response = exchange(transport, Command::Reset)?;
    let verdict = if response.starts_with(RESET_ACK) {
        ResetVerdict::Accepted
    } else {
        warn!("reset not acknowledged: {}", response);
        ResetVerdict::Rejected
    };

    let mut poll = IdlePoll::new(idle_poll_limit);
    loop {
        let status = exchange(transport, Command::Status)?;
        if status.starts_with(STATUS_IDLE) {
            break;
        }
        poll.busy()?;
    }

    debug!("device idle after {} busy status answers", poll.attempts);
    Ok(verdict)
}

/// Busy-answer counter of the idle poll
struct IdlePoll {
    attempts: u32,
    limit: Option<u32>,
}

impl IdlePoll {
    fn new(limit: Option<u32>) -> Self {
        Self { attempts: 0, limit }
    }

    /// Record one busy answer. Fails once the limit is reached; without a
    /// limit the count saturates at `u32::MAX`.
    fn busy(&mut self) -> Result<()> {
        self.attempts = self.attempts.saturating_add(1);
        match self.limit {
            Some(limit) if self.attempts >= limit => Err(Tds01vError::DeviceUnresponsive {
                attempts: self.attempts,
            }),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::ScriptedDevice;

    #[test]
    fn test_reset_accepted() {
        let mut device = ScriptedDevice::new()
            .respond(Command::Reset, "F0")
            .respond(Command::Status, "00");
        let probe = device.probe();

        assert_eq!(reset(&mut device, None).unwrap(), ResetVerdict::Accepted);
        assert_eq!(probe.commands(), vec!["0F", "2B"]);
    }

    #[test]
    fn test_reset_rejected_still_waits_for_idle() {
        let mut device = ScriptedDevice::new()
            .respond(Command::Reset, "E1")
            .respond_sequence(Command::Status, &["80", "40"])
            .respond(Command::Status, "00");
        let probe = device.probe();

        assert_eq!(reset(&mut device, None).unwrap(), ResetVerdict::Rejected);
        assert_eq!(probe.count(Command::Status), 3);
    }

    #[test]
    fn test_idle_requires_both_zero_digits() {
        // A single zero digit is not idle
        let mut device = ScriptedDevice::new()
            .respond(Command::Reset, "F0")
            .respond_sequence(Command::Status, &["01", "10", "0F"])
            .respond(Command::Status, "00");
        let probe = device.probe();

        assert_eq!(reset(&mut device, None).unwrap(), ResetVerdict::Accepted);
        assert_eq!(probe.count(Command::Status), 4);
    }

    #[test]
    fn test_idle_poll_limit() {
        let mut device = ScriptedDevice::new()
            .respond(Command::Reset, "F0")
            .respond(Command::Status, "80");
        let probe = device.probe();

        match reset(&mut device, Some(5)) {
            Err(Tds01vError::DeviceUnresponsive { attempts }) => assert_eq!(attempts, 5),
            other => panic!("expected DeviceUnresponsive, got {:?}", other),
        }
        assert_eq!(probe.count(Command::Status), 5);
    }

    #[test]
    fn test_unbounded_poll_count_saturates() {
        let mut poll = IdlePoll {
            attempts: u32::MAX - 1,
            limit: None,
        };
        poll.busy().unwrap();
        poll.busy().unwrap();
        assert_eq!(poll.attempts, u32::MAX);
    }

    #[test]
    fn test_reset_without_answer_times_out() {
        let mut device = ScriptedDevice::new();
        assert!(matches!(
            reset(&mut device, None),
            Err(Tds01vError::Timeout { command: "0F" })
        ));
    }
}
