//! Background acquisition loop
//!
//! The loop configures the sensor once, then repeats measurement cycles until
//! a stop is requested:
//!
//! ```text
//! Stopped ──start──▶ Initializing ──▶ Sampling ─┐
//!    ▲                                   ▲      │ 21 → DE? → 29 → decode → callback
//!    │                                   └──────┘
//!    └────────────── stop requested ───────────┘
//! ```
//!
//! The stop flag is checked once per cycle, so a stop takes effect after the
//! command/response round trip in progress.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use log::{debug, error, info, trace, warn};

use crate::callback::CallbackSlot;
use crate::error::{Result, Tds01vError};
use crate::frame;
use crate::protocol::{exchange, Command, Response};
use crate::sample::Sample;
use crate::transport::Transport;

/// Acknowledgement of the start-measurement command
const MEASUREMENT_ACK: &str = "DE";

/// Commands sent once before sampling begins, in order
const INIT_SEQUENCE: [Command; 3] = [
    Command::SetDeclination,
    Command::SelectTelemetry,
    Command::InitMagnetometer,
];

/// Phase of the acquisition loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionState {
    Stopped,
    Initializing,
    Sampling,
}

impl AcquisitionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => AcquisitionState::Initializing,
            2 => AcquisitionState::Sampling,
            _ => AcquisitionState::Stopped,
        }
    }
}

/// Result of one measurement cycle
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// The measurement was accepted and the frame decoded
    Sampled(Sample),
    /// The module did not acknowledge the measurement; no frame was fetched
    NotAccepted(Response),
}

/// Counters collected by the acquisition loop
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcquisitionStats {
    /// Measurement cycles requested
    pub cycles: u64,
    /// Samples decoded (delivered to the callback if one was registered)
    pub samples: u64,
    /// Cycles the module did not acknowledge
    pub not_accepted: u64,
    /// Frames that failed to decode
    pub malformed_frames: u64,
    /// Exchanges that hit the read timeout
    pub timeouts: u64,
    /// Error that ended the loop early, if any
    pub fatal_error: Option<String>,
    /// The loop ended because the callback panicked
    pub callback_panicked: bool,
}

impl AcquisitionStats {
    /// Fold the counters of a later run into these
    pub fn merge(&mut self, other: AcquisitionStats) {
        self.cycles += other.cycles;
        self.samples += other.samples;
        self.not_accepted += other.not_accepted;
        self.malformed_frames += other.malformed_frames;
        self.timeouts += other.timeouts;
        self.callback_panicked |= other.callback_panicked;
        if other.fatal_error.is_some() {
            self.fatal_error = other.fatal_error;
        }
    }
}

/// Send the one-time configuration commands
///
/// Answers are logged but not checked.
pub fn initialize<T: Transport + ?Sized>(transport: &mut T) -> Result<()> {
    for command in INIT_SEQUENCE {
        let response = exchange(transport, command)?;
        debug!("init {} answered {}", command, response);
    }
    Ok(())
}

/// Run one measurement cycle: request, fetch and decode
pub fn run_cycle<T: Transport + ?Sized>(transport: &mut T) -> Result<CycleOutcome> {
    let ack = exchange(transport, Command::StartMeasurement)?;
    if !ack.starts_with(MEASUREMENT_ACK) {
        return Ok(CycleOutcome::NotAccepted(ack));
    }

    let frame_response = exchange(transport, Command::FetchFrame)?;
    trace!("frame {}", frame_response);
    let sample = frame::decode(frame_response.payload())?;
    Ok(CycleOutcome::Sampled(sample))
}

/// Requests the acquisition loop to stop from any thread
///
/// Safe to call from inside the sample callback; the loop exits before
/// starting another cycle.
#[derive(Debug, Clone)]
pub struct StopHandle {
    stop: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

/// Flags shared between a session and its worker
#[derive(Debug, Clone)]
pub(crate) struct LoopControl {
    stop: Arc<AtomicBool>,
    finalized: Arc<AtomicBool>,
    state: Arc<AtomicU8>,
}

impl LoopControl {
    /// Control block of a loop that has not been started
    pub(crate) fn new() -> Self {
        Self {
            stop: Arc::new(AtomicBool::new(true)),
            finalized: Arc::new(AtomicBool::new(false)),
            state: Arc::new(AtomicU8::new(AcquisitionState::Stopped as u8)),
        }
    }

    /// Arm the flags for a new worker
    pub(crate) fn arm(&self) {
        self.finalized.store(false, Ordering::SeqCst);
        self.stop.store(false, Ordering::SeqCst);
    }

    pub(crate) fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub(crate) fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    pub(crate) fn is_finalized(&self) -> bool {
        self.finalized.load(Ordering::SeqCst)
    }

    pub(crate) fn state(&self) -> AcquisitionState {
        AcquisitionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub(crate) fn stop_handle(&self) -> StopHandle {
        StopHandle {
            stop: Arc::clone(&self.stop),
        }
    }

    fn set_state(&self, state: AcquisitionState) {
        debug!("acquisition state -> {:?}", state);
        self.state.store(state as u8, Ordering::SeqCst);
    }

    fn finalize(&self) {
        self.set_state(AcquisitionState::Stopped);
        self.finalized.store(true, Ordering::SeqCst);
    }
}

/// Marks the loop finalized when the worker exits, including by panic
struct FinalizeOnExit<'a>(&'a LoopControl);

impl Drop for FinalizeOnExit<'_> {
    fn drop(&mut self) {
        self.0.finalize();
    }
}

/// Body of the acquisition thread
///
/// Owns the transport while it runs and hands it back together with the
/// collected statistics. Rejected cycles, malformed frames and timeouts are
/// counted and sampling continues; any other error ends the loop.
pub(crate) fn run<T: Transport>(
    mut transport: T,
    control: LoopControl,
    callback: CallbackSlot,
) -> (T, AcquisitionStats) {
    let mut stats = AcquisitionStats::default();
    let _finalize = FinalizeOnExit(&control);

    control.set_state(AcquisitionState::Initializing);
    if let Err(e) = initialize(&mut transport) {
        if absorb(&e, &mut stats) {
            warn!("sensor initialisation incomplete: {}", e);
        } else {
            error!("sensor initialisation failed: {}", e);
            stats.fatal_error = Some(e.to_string());
            return (transport, stats);
        }
    }

    control.set_state(AcquisitionState::Sampling);
    info!("acquisition started on {}", transport.name());

    while !control.stop_requested() {
        stats.cycles += 1;
        match run_cycle(&mut transport) {
            Ok(CycleOutcome::Sampled(sample)) => {
                stats.samples += 1;
                if let Err(e) = callback.deliver(&sample) {
                    error!("acquisition aborted: {}", e);
                    stats.callback_panicked = true;
                    stats.fatal_error = Some(e.to_string());
                    break;
                }
            }
            Ok(CycleOutcome::NotAccepted(response)) => {
                stats.not_accepted += 1;
                trace!("measurement not accepted: {}", response);
            }
            Err(e) if absorb(&e, &mut stats) => {
                warn!("cycle {} dropped: {}", stats.cycles, e);
            }
            Err(e) => {
                error!("acquisition aborted: {}", e);
                stats.fatal_error = Some(e.to_string());
                break;
            }
        }
    }

    info!(
        "acquisition stopped after {} cycles, {} samples",
        stats.cycles, stats.samples
    );
    (transport, stats)
}

/// Count errors the loop survives. Returns false for errors that end it.
fn absorb(e: &Tds01vError, stats: &mut AcquisitionStats) -> bool {
    match e {
        Tds01vError::Timeout { .. } => {
            stats.timeouts += 1;
            true
        }
        Tds01vError::MalformedFrame(_) => {
            stats.malformed_frames += 1;
            true
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{ScriptedDevice, SAMPLE_FRAME};
    use std::sync::Mutex;

    #[test]
    fn test_initialize_sends_sequence_in_order() {
        let mut device = ScriptedDevice::healthy();
        let probe = device.probe();
        initialize(&mut device).unwrap();
        assert_eq!(probe.commands(), vec!["050027950000", "0DF7", "27"]);
    }

    #[test]
    fn test_cycle_accepted() {
        let mut device = ScriptedDevice::healthy();
        let probe = device.probe();

        match run_cycle(&mut device).unwrap() {
            CycleOutcome::Sampled(sample) => {
                assert_eq!(sample, frame::decode(SAMPLE_FRAME.as_bytes()).unwrap());
            }
            other => panic!("expected a sample, got {:?}", other),
        }
        assert_eq!(probe.commands(), vec!["21", "29"]);
    }

    #[test]
    fn test_cycle_not_accepted_skips_fetch() {
        let mut device = ScriptedDevice::healthy().respond(Command::StartMeasurement, "00");
        let probe = device.probe();

        assert!(matches!(
            run_cycle(&mut device).unwrap(),
            CycleOutcome::NotAccepted(_)
        ));
        assert_eq!(probe.count(Command::FetchFrame), 0);
    }

    #[test]
    fn test_cycle_malformed_frame() {
        let mut device = ScriptedDevice::healthy().respond(Command::FetchFrame, "0032FFCE");
        assert!(matches!(
            run_cycle(&mut device),
            Err(Tds01vError::MalformedFrame(frame::FrameError::Truncated { .. }))
        ));
    }

    #[test]
    fn test_run_until_stopped_from_callback() {
        let device = ScriptedDevice::healthy()
            .respond_sequence(Command::StartMeasurement, &["00", "DE"])
            .respond_sequence(Command::FetchFrame, &["NOT-A-FRAME"]);
        let probe = device.probe();

        let control = LoopControl::new();
        control.arm();
        let stop = control.stop_handle();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let callback = CallbackSlot::new();
        let sink = Arc::clone(&seen);
        callback
            .register(Box::new(move |sample| {
                sink.lock().unwrap().push(*sample);
                stop.stop();
            }))
            .unwrap();

        let (_device, stats) = run(device, control.clone(), callback);

        // cycle 1 rejected, cycle 2 malformed, cycle 3 delivered
        assert_eq!(stats.cycles, 3);
        assert_eq!(stats.not_accepted, 1);
        assert_eq!(stats.malformed_frames, 1);
        assert_eq!(stats.samples, 1);
        assert!(stats.fatal_error.is_none());
        assert_eq!(seen.lock().unwrap().len(), 1);
        assert!(control.is_finalized());
        assert_eq!(control.state(), AcquisitionState::Stopped);
        assert_eq!(probe.count(Command::InitMagnetometer), 1);
    }

    #[test]
    fn test_io_error_ends_loop() {
        let device = ScriptedDevice::healthy().fail_on(Command::StartMeasurement);
        let control = LoopControl::new();
        control.arm();

        let (_device, stats) = run(device, control.clone(), CallbackSlot::new());

        assert_eq!(stats.cycles, 1);
        assert!(stats.fatal_error.is_some());
        assert!(control.is_finalized());
    }

    #[test]
    fn test_panicking_callback_ends_loop_and_returns_transport() {
        let device = ScriptedDevice::healthy();
        let probe = device.probe();
        let control = LoopControl::new();
        control.arm();

        let callback = CallbackSlot::new();
        callback
            .register(Box::new(|_| panic!("display gone")))
            .unwrap();

        let (mut device, stats) = run(device, control.clone(), callback);

        assert_eq!(stats.samples, 1);
        assert!(stats.callback_panicked);
        assert!(stats.fatal_error.unwrap().contains("display gone"));
        assert!(control.is_finalized());
        // The transport came back and can still be restored
        device.restore().unwrap();
        assert_eq!(probe.restores(), 1);
    }

    #[test]
    fn test_timeouts_are_counted() {
        // No answer to the start command: every cycle times out until stopped
        let device = ScriptedDevice::new()
            .respond(Command::SetDeclination, "05")
            .respond(Command::SelectTelemetry, "0D")
            .respond(Command::InitMagnetometer, "27");
        let control = LoopControl::new();
        control.arm();

        let worker_control = control.clone();
        let handle = std::thread::spawn(move || run(device, worker_control, CallbackSlot::new()));

        while control.state() != AcquisitionState::Sampling && !control.is_finalized() {
            std::thread::yield_now();
        }
        control.request_stop();
        let (_device, stats) = handle.join().unwrap();

        assert_eq!(stats.timeouts, stats.cycles);
        assert_eq!(stats.samples, 0);
    }
}
