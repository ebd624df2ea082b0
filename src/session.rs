//! Connection lifecycle: open, start, stop, close

use std::thread::{self, JoinHandle};

use log::{error, info, warn};

use crate::acquisition::{self, AcquisitionState, AcquisitionStats, LoopControl, StopHandle};
use crate::callback::CallbackSlot;
use crate::config::ConnectionConfig;
use crate::error::{Result, Tds01vError};
use crate::handshake::{self, ResetVerdict};
use crate::sample::Sample;
use crate::transport::{SerialTransport, Transport};

const WORKER_THREAD_NAME: &str = "tds01v-acquisition";

/// Open connection to a TDS01V sensor module
///
/// A session owns the transport, the callback slot and at most one
/// acquisition thread. While sampling, the transport lives on the worker
/// thread and comes back when the worker is joined.
///
/// # Example
/// ```no_run
/// use tds01v_interface::Tds01v;
/// use std::time::Duration;
///
/// let mut sensor = Tds01v::open()?;
/// sensor.register_callback(|sample| {
///     println!("azimuth {:.1}°, {:.1} hPa", sample.azimuth, sample.air_pressure);
/// })?;
///
/// sensor.start()?;
/// std::thread::sleep(Duration::from_secs(10));
/// sensor.stop();
///
/// let stats = sensor.close()?;
/// println!("{} samples", stats.samples);
/// # Ok::<(), tds01v_interface::Tds01vError>(())
/// ```
pub struct Tds01v<T: Transport + 'static = SerialTransport> {
    transport: Option<T>,
    worker: Option<JoinHandle<(T, AcquisitionStats)>>,
    control: LoopControl,
    callback: CallbackSlot,
    stats: AcquisitionStats,
    name: String,
}

impl Tds01v<SerialTransport> {
    /// Open the module on the default device path and reset it
    ///
    /// # Returns
    /// * `Ok(Tds01v)` - Device configured, reset acknowledged and idle
    /// * `Err(Tds01vError::OpenFailed)` - Device missing, or reset rejected
    pub fn open() -> Result<Self> {
        Self::open_with(&ConnectionConfig::default())
    }

    /// Open the module with explicit connection settings
    pub fn open_with(config: &ConnectionConfig) -> Result<Self> {
        let transport = SerialTransport::configure(config).map_err(|e| {
            error!("{}: {}", config.device_path, e);
            Tds01vError::open_failed(&config.device_path, e)
        })?;
        Self::with_transport(transport, config)
    }
}

impl<T: Transport + 'static> Tds01v<T> {
    /// Reset the module over an already configured transport
    ///
    /// If the handshake fails the transport is restored before the error is
    /// returned.
    pub fn with_transport(mut transport: T, config: &ConnectionConfig) -> Result<Self> {
        let name = transport.name();

        let failure = match handshake::reset(&mut transport, config.idle_poll_limit) {
            Ok(ResetVerdict::Accepted) => None,
            Ok(ResetVerdict::Rejected) => Some(Tds01vError::open_failed(&name, "reset rejected")),
            Err(e) => Some(Tds01vError::open_failed(&name, e)),
        };

        if let Some(e) = failure {
            error!("{}", e);
            if let Err(restore_err) = transport.restore() {
                warn!("{}: could not restore line settings: {}", name, restore_err);
            }
            return Err(e);
        }

        info!("{}: sensor reset and idle", name);
        Ok(Self {
            transport: Some(transport),
            worker: None,
            control: LoopControl::new(),
            callback: CallbackSlot::new(),
            stats: AcquisitionStats::default(),
            name,
        })
    }

    /// Spawn the acquisition thread
    ///
    /// Fails with `AlreadyRunning` if a loop is active. A loop that has been
    /// stopped but not yet closed is joined first, then a fresh one starts.
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() && !self.control.stop_requested() {
            return Err(Tds01vError::AlreadyRunning);
        }
        self.join_worker()?;

        let transport = self.transport.take().ok_or(Tds01vError::WorkerPanicked)?;
        self.control.arm();

        let control = self.control.clone();
        let callback = self.callback.clone();
        let spawned = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || acquisition::run(transport, control, callback));

        match spawned {
            Ok(handle) => {
                self.worker = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.control.request_stop();
                Err(e.into())
            }
        }
    }

    /// Ask the acquisition loop to stop
    ///
    /// Returns immediately; the loop exits after its current cycle.
    pub fn stop(&self) {
        self.control.request_stop();
    }

    /// Handle that stops the loop from another thread or from the callback
    pub fn stop_handle(&self) -> StopHandle {
        self.control.stop_handle()
    }

    /// Stop acquisition, wait for the worker and restore the line settings
    ///
    /// Unlike [`stop`](Self::stop) this blocks until the worker has exited.
    /// Returns the counters accumulated over all runs of this session, or
    /// `WorkerPanicked` if the callback panicked. The line is restored in
    /// both cases.
    pub fn close(mut self) -> Result<AcquisitionStats> {
        self.shutdown()
    }

    /// Register the sample observer. Fails with `AlreadyRegistered` if one is set.
    pub fn register_callback<F>(&self, callback: F) -> Result<()>
    where
        F: FnMut(&Sample) + Send + 'static,
    {
        self.callback.register(Box::new(callback))
    }

    /// Remove the sample observer, if any
    pub fn unregister_callback(&self) {
        self.callback.unregister();
    }

    /// True while an acquisition thread is attached and has not exited
    pub fn is_running(&self) -> bool {
        self.worker.is_some() && !self.control.is_finalized()
    }

    /// True once the last acquisition thread has fully exited
    pub fn is_finalized(&self) -> bool {
        self.control.is_finalized()
    }

    pub fn state(&self) -> AcquisitionState {
        self.control.state()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn join_worker(&mut self) -> Result<()> {
        if let Some(handle) = self.worker.take() {
            let (transport, stats) = handle.join().map_err(|_| Tds01vError::WorkerPanicked)?;
            self.transport = Some(transport);
            self.stats.merge(stats);
        }
        Ok(())
    }

    fn shutdown(&mut self) -> Result<AcquisitionStats> {
        self.control.request_stop();
        let joined = self.join_worker();

        // Restore exactly once, even if the join failed
        let restored = match self.transport.take() {
            Some(mut transport) => transport.restore(),
            None => Ok(()),
        };

        joined?;
        restored?;
        info!("{}: closed", self.name);

        let stats = std::mem::take(&mut self.stats);
        if stats.callback_panicked {
            return Err(Tds01vError::WorkerPanicked);
        }
        Ok(stats)
    }
}

impl<T: Transport + 'static> Drop for Tds01v<T> {
    fn drop(&mut self) {
        if self.transport.is_some() || self.worker.is_some() {
            if let Err(e) = self.shutdown() {
                warn!("{}: shutdown on drop failed: {}", self.name, e);
            }
        }
    }
}
