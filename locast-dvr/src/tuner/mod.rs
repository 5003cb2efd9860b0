//! Tuner management for the emulated device.
//!
//! - [`TunerAdmission`]: bounded stream slots and the channel scan flag

pub mod admission;

pub use admission::{AdmissionError, ScanGuard, TunerAdmission, TunerSlot};
