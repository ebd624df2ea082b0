//! Single-slot observer registry

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{Result, Tds01vError};
use crate::sample::Sample;

/// Observer invoked on the acquisition thread with every decoded sample
pub type SampleCallback = Box<dyn FnMut(&Sample) + Send + 'static>;

/// Holds at most one [`SampleCallback`]
///
/// Clones share the same slot, so the session and its worker see the same
/// registration.
#[derive(Clone, Default)]
pub struct CallbackSlot {
    inner: Arc<Mutex<Option<SampleCallback>>>,
}

impl CallbackSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fill the slot. Fails with `AlreadyRegistered` if it is occupied.
    pub fn register(&self, callback: SampleCallback) -> Result<()> {
        let mut slot = self.lock();
        if slot.is_some() {
            return Err(Tds01vError::AlreadyRegistered);
        }
        *slot = Some(callback);
        Ok(())
    }

    /// Empty the slot
    pub fn unregister(&self) {
        *self.lock() = None;
    }

    pub fn is_registered(&self) -> bool {
        self.lock().is_some()
    }

    /// Hand `sample` to the registered callback. Returns false if the slot is empty.
    ///
    /// A panic inside the callback is caught and returned as
    /// `CallbackPanicked`, so the acquisition thread can still hand the
    /// transport back. The callback stays registered.
    pub fn deliver(&self, sample: &Sample) -> Result<bool> {
        let mut slot = self.lock();
        let callback = match slot.as_mut() {
            Some(callback) => callback,
            None => return Ok(false),
        };

        panic::catch_unwind(AssertUnwindSafe(|| callback(sample)))
            .map(|()| true)
            .map_err(|payload| Tds01vError::CallbackPanicked(panic_message(payload.as_ref())))
    }

    // A callback that panicked leaves the slot usable
    fn lock(&self) -> MutexGuard<'_, Option<SampleCallback>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
