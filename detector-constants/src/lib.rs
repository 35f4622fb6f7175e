//! Read-only detector, gas and electronics parameters.
//!
//! These are the calibration inputs the transform engine queries during a
//! calibration refresh. Defaults describe the nominal detector; an
//! integrating application overrides them from its own conditions source.

use serde::{Deserialize, Serialize};

/// Default drift length of the sensitive volume (cm)
pub const DEFAULT_DETECTOR_LENGTH: f64 = 250.0;

/// Default number of angular slices (sectors) around the detector axis
pub const DEFAULT_SLICE_COUNT: usize = 18;

/// Static detector geometry parameters
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DetectorParams {
    /// Drift length of the sensitive volume (cm)
    pub length: f64,
    /// Number of angular slices around the detector axis
    pub num_slices: usize,
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self {
            length: DEFAULT_DETECTOR_LENGTH,
            num_slices: DEFAULT_SLICE_COUNT,
        }
    }
}

/// Drift gas parameters
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GasParams {
    /// Electron drift velocity (cm/µs)
    pub drift_velocity: f64,
}

impl Default for GasParams {
    fn default() -> Self {
        Self {
            drift_velocity: 2.58,
        }
    }
}

/// Front-end electronics parameters
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ElectronicsParams {
    /// Shaper peaking time (µs)
    pub peaking_time: f64,
    /// Width of one sampling time bin (µs)
    pub sampling_time: f64,
}

impl Default for ElectronicsParams {
    fn default() -> Self {
        Self {
            peaking_time: 0.16,
            sampling_time: 0.2,
        }
    }
}

/// Bundle of all parameter providers consumed by a calibration refresh
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DetectorSetup {
    pub detector: DetectorParams,
    pub gas: GasParams,
    pub electronics: ElectronicsParams,
}

impl DetectorSetup {
    /// Drift velocity expressed in cm per sampling time bin
    pub fn drift_velocity_per_bin(&self) -> f64 {
        self.electronics.sampling_time * self.gas.drift_velocity
    }

    /// Shaper delay expressed in sampling time bins
    pub fn peaking_time_bins(&self) -> f64 {
        self.electronics.peaking_time / self.electronics.sampling_time
    }
}
