//! CUDA event wrappers for device-side timing.

use std::ptr;

use cudarc::driver::result as cuda_result;
use cudarc::driver::sys as cuda_sys;

use gridfire_core::{DeviceTimer, GridfireError, Result};

/// A CUDA event recorded on the default stream.
struct CudaEvent {
    event: cuda_sys::CUevent,
}

impl CudaEvent {
    fn new() -> Result<Self> {
        let event = cuda_result::event::create(cuda_sys::CUevent_flags::CU_EVENT_DEFAULT)
            .map_err(|e| GridfireError::driver(format!("failed to create CUDA event: {e:?}")))?;
        Ok(Self { event })
    }

    /// Record this event on the default stream, capturing all work
    /// submitted before the call.
    fn record(&self) -> Result<()> {
        // Safety: the event is owned by this wrapper and the default
        // stream is always valid while the context lives.
        unsafe { cuda_result::event::record(self.event, ptr::null_mut()) }
            .map_err(|e| GridfireError::driver(format!("failed to record CUDA event: {e:?}")))
    }

    /// Block until all work captured by this event has completed.
    fn synchronize(&self) -> Result<()> {
        // Safety: the event has been recorded before this is called.
        unsafe { cuda_result::event::synchronize(self.event) }
            .map_err(|e| GridfireError::driver(format!("failed to synchronize CUDA event: {e:?}")))
    }
}

impl Drop for CudaEvent {
    fn drop(&mut self) {
        // Safety: we own this event and it is not referenced after drop.
        unsafe {
            let _ = cuda_result::event::destroy(self.event);
        }
    }
}

// CUDA events can be used from any thread within the same context.
unsafe impl Send for CudaEvent {}

/// Device timer built from a start/stop event pair.
///
/// Timing is measured entirely on the device: the markers capture stream
/// positions, and the elapsed value is read after synchronizing the stop
/// marker.
pub struct CudaTimer {
    start: CudaEvent,
    stop: CudaEvent,
    started: bool,
    stopped: bool,
}

impl CudaTimer {
    /// Create a timer with both markers unrecorded.
    pub fn new() -> Result<Self> {
        Ok(Self {
            start: CudaEvent::new()?,
            stop: CudaEvent::new()?,
            started: false,
            stopped: false,
        })
    }
}

impl DeviceTimer for CudaTimer {
    fn record_start(&mut self) -> Result<()> {
        self.start.record()?;
        self.started = true;
        self.stopped = false;
        Ok(())
    }

    fn record_stop(&mut self) -> Result<()> {
        if !self.started {
            return Err(GridfireError::driver("timer start marker not recorded"));
        }
        self.stop.record()?;
        self.stopped = true;
        Ok(())
    }

    fn elapsed_secs(&mut self) -> Result<f64> {
        if !self.stopped {
            return Err(GridfireError::driver("timer stop marker not recorded"));
        }
        self.stop.synchronize()?;

        // Safety: both events were recorded above.
        let millis = unsafe { cuda_result::event::elapsed(self.start.event, self.stop.event) }
            .map_err(|e| GridfireError::driver(format!("failed to read elapsed time: {e:?}")))?;
        Ok(millis as f64 * 1e-3)
    }
}
