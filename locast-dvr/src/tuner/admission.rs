//! Tuner admission control.
//!
//! A device advertises a fixed number of tuners. Each direct stream holds
//! one [`TunerSlot`] for its whole lifetime; when all slots are taken new
//! streams are refused instead of queued. The same lock guards the
//! channel scan flag reported by `lineup_status.json`.

use std::sync::{Arc, Mutex, MutexGuard};

use locast_dvr_lineup::LineupStatus;
use log::debug;
use thiserror::Error;

/// Admission errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AdmissionError {
    /// Every tuner is streaming.
    #[error("All {0} tuners are in use")]
    AllTunersBusy(u32),
}

#[derive(Debug, Default)]
struct AdmissionState {
    active: u32,
    scanning: bool,
    last_found: usize,
}

/// Counts active streams against the configured tuner count.
#[derive(Debug)]
pub struct TunerAdmission {
    capacity: u32,
    state: Mutex<AdmissionState>,
}

impl TunerAdmission {
    pub fn new(capacity: u32) -> Arc<Self> {
        Arc::new(Self {
            capacity,
            state: Mutex::new(AdmissionState::default()),
        })
    }

    fn lock(&self) -> MutexGuard<'_, AdmissionState> {
        // The state is plain counters, so a poisoned lock is still usable.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Number of streams currently holding a slot.
    pub fn active(&self) -> u32 {
        self.lock().active
    }

    /// Take a slot without waiting.
    pub fn try_acquire(self: &Arc<Self>) -> Result<TunerSlot, AdmissionError> {
        let mut state = self.lock();
        if state.active >= self.capacity {
            return Err(AdmissionError::AllTunersBusy(self.capacity));
        }
        state.active += 1;
        debug!("Tuner slot acquired ({}/{})", state.active, self.capacity);
        Ok(TunerSlot {
            admission: Arc::clone(self),
        })
    }

    fn release(&self) {
        let mut state = self.lock();
        state.active = state.active.saturating_sub(1);
        debug!("Tuner slot released ({}/{})", state.active, self.capacity);
    }

    /// Mark a channel scan as running until the guard is dropped.
    pub fn begin_scan(self: &Arc<Self>) -> ScanGuard {
        self.lock().scanning = true;
        ScanGuard {
            admission: Arc::clone(self),
            found: None,
        }
    }

    /// Current scan status document.
    pub fn scan_status(&self) -> LineupStatus {
        let state = self.lock();
        if state.scanning {
            LineupStatus::scanning(state.last_found)
        } else {
            LineupStatus::idle()
        }
    }
}

/// One occupied tuner. Released on drop.
#[derive(Debug)]
pub struct TunerSlot {
    admission: Arc<TunerAdmission>,
}

impl Drop for TunerSlot {
    fn drop(&mut self) {
        self.admission.release();
    }
}

/// Running channel scan. Clears the scan flag on drop.
#[derive(Debug)]
pub struct ScanGuard {
    admission: Arc<TunerAdmission>,
    found: Option<usize>,
}

impl ScanGuard {
    /// Record how many stations the scan found.
    pub fn finish(mut self, found: usize) {
        self.found = Some(found);
    }
}

impl Drop for ScanGuard {
    fn drop(&mut self) {
        let mut state = self.admission.lock();
        state.scanning = false;
        if let Some(found) = self.found {
            state.last_found = found;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots_are_bounded() {
        let admission = TunerAdmission::new(2);
        let a = admission.try_acquire().unwrap();
        let _b = admission.try_acquire().unwrap();
        assert_eq!(admission.active(), 2);
        assert_eq!(
            admission.try_acquire().unwrap_err(),
            AdmissionError::AllTunersBusy(2)
        );

        drop(a);
        assert_eq!(admission.active(), 1);
        let _c = admission.try_acquire().unwrap();
        assert_eq!(admission.active(), 2);
    }

    #[test]
    fn test_zero_capacity_refuses_everything() {
        let admission = TunerAdmission::new(0);
        assert!(admission.try_acquire().is_err());
        assert_eq!(admission.active(), 0);
    }

    #[test]
    fn test_slots_released_across_threads() {
        let admission = TunerAdmission::new(8);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let admission = Arc::clone(&admission);
                std::thread::spawn(move || {
                    let slot = admission.try_acquire().unwrap();
                    drop(slot);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(admission.active(), 0);
    }

    #[test]
    fn test_scan_status() {
        let admission = TunerAdmission::new(1);
        assert_eq!(admission.scan_status(), LineupStatus::idle());

        let guard = admission.begin_scan();
        assert_eq!(admission.scan_status(), LineupStatus::scanning(0));
        guard.finish(7);
        assert_eq!(admission.scan_status(), LineupStatus::idle());

        let _guard = admission.begin_scan();
        assert_eq!(admission.scan_status(), LineupStatus::scanning(7));
    }
}
