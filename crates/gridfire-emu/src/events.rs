//! Wall-clock timing for the emulated backend.

use std::time::Instant;

use gridfire_core::{DeviceTimer, GridfireError, Result};

/// Timer whose markers are host wall-clock instants.
///
/// Interpretation is synchronous, so the instants bracket the work exactly
/// and no device-side synchronization is needed before reading them.
#[derive(Debug, Default)]
pub struct EmuTimer {
    start: Option<Instant>,
    stop: Option<Instant>,
}

impl EmuTimer {
    /// Create a timer with both markers unrecorded.
    pub fn new() -> Self {
        Self::default()
    }
}

impl DeviceTimer for EmuTimer {
    fn record_start(&mut self) -> Result<()> {
        self.start = Some(Instant::now());
        self.stop = None;
        Ok(())
    }

    fn record_stop(&mut self) -> Result<()> {
        if self.start.is_none() {
            return Err(GridfireError::driver("timer start marker not recorded"));
        }
        self.stop = Some(Instant::now());
        Ok(())
    }

    fn elapsed_secs(&mut self) -> Result<f64> {
        match (self.start, self.stop) {
            (Some(start), Some(stop)) => Ok(stop.duration_since(start).as_secs_f64()),
            _ => Err(GridfireError::driver("timer stop marker not recorded")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_is_non_negative() {
        let mut timer = EmuTimer::new();
        timer.record_start().unwrap();
        timer.record_stop().unwrap();
        assert!(timer.elapsed_secs().unwrap() >= 0.0);
    }

    #[test]
    fn markers_must_be_recorded_in_order() {
        let mut timer = EmuTimer::new();
        assert!(timer.record_stop().is_err());
        timer.record_start().unwrap();
        assert!(timer.elapsed_secs().is_err());
    }
}
