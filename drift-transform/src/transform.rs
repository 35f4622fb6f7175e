//! Fast transform engine: row geometry + distortion map + calibration
//! record, composed into the end-to-end query from raw readout coordinates
//! (slice, row, pad, drift time) to local coordinates.

use serde::{Deserialize, Serialize};

use crate::distortion::{DistortionMap, DistortionMapBuilder};
use crate::error::{ConfigError, TransformError};
use crate::row_geometry::{RowGeometry, RowGeometryBuilder};
use crate::spline::{Correction, IrregularSpline2D};

/// Time-stamp value marking an engine as not calibrated
pub const TIMESTAMP_UNCALIBRATED: i64 = -1;

/// Drift-model coefficients for one calibration epoch. Replaced atomically
/// as a whole by a calibration refresh; read by every transform query.
///
/// The drift formula is
/// `L = (t - t0 - tof) * (drift_velocity + drift_velocity_correction_y * y)
///  + drift_length_correction`, with drift time `t` in sampling time bins
/// and lengths in cm.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRecord {
    /// Calibration epoch; [`TIMESTAMP_UNCALIBRATED`] means uninitialized
    pub time_stamp: i64,
    /// Drift-time offset (time bins)
    pub t0: f64,
    /// Drift velocity (cm per time bin)
    pub drift_velocity: f64,
    /// Drift-velocity dependence on the local y coordinate
    pub drift_velocity_correction_y: f64,
    /// Constant drift-length offset (cm)
    pub drift_length_correction: f64,
    /// Scale of the time-of-flight drift-length term
    pub time_of_flight_correction: f64,
    /// Primary vertex z used by the time-of-flight term (cm)
    pub primary_vertex_z: f64,
    /// Detector alignment offset along z (cm)
    pub alignment_z: f64,
}

impl Default for CalibrationRecord {
    fn default() -> Self {
        Self {
            time_stamp: TIMESTAMP_UNCALIBRATED,
            t0: 0.0,
            drift_velocity: 0.0,
            drift_velocity_correction_y: 0.0,
            drift_length_correction: 0.0,
            time_of_flight_correction: 0.0,
            primary_vertex_z: 0.0,
            alignment_z: 0.0,
        }
    }
}

impl CalibrationRecord {
    /// Whether the record carries a valid calibration epoch
    pub fn is_calibrated(&self) -> bool {
        self.time_stamp >= 0
    }
}

/// Build session for [`FastTransformEngine`]: mirrors the row-geometry build
/// and constructs the attached distortion map equivalently.
#[derive(Debug)]
pub struct FastTransformBuilder {
    geometry: RowGeometryBuilder,
    distortion: DistortionMapBuilder,
}

impl FastTransformBuilder {
    pub fn new(num_rows: usize, num_slices: usize, num_scenarios: usize) -> Self {
        Self {
            geometry: RowGeometryBuilder::new(num_rows, num_slices),
            distortion: DistortionMapBuilder::new(num_rows, num_slices, num_scenarios),
        }
    }

    /// Set the drift length of the sensitive volume (cm)
    pub fn set_z_length(&mut self, z_length: f64) {
        self.geometry.set_z_length(z_length);
        self.distortion.set_z_length(z_length);
    }

    /// Record one row's constants and its distortion scenario
    pub fn set_row(
        &mut self,
        row: usize,
        x: f64,
        pad_count: usize,
        pad_width: f64,
        scenario: usize,
    ) -> Result<(), ConfigError> {
        self.geometry.set_row(row, x, pad_count, pad_width)?;
        self.distortion
            .set_row(row, x, pad_count, pad_width, scenario)
    }

    /// Attach the approximation spline for one distortion scenario
    pub fn set_approximation_scenario(
        &mut self,
        scenario: usize,
        spline: IrregularSpline2D,
    ) -> Result<(), ConfigError> {
        self.distortion.set_approximation_scenario(scenario, spline)
    }

    /// Close the build session. The engine starts uncalibrated with
    /// distortion application disabled.
    pub fn finish(self) -> Result<FastTransformEngine, ConfigError> {
        Ok(FastTransformEngine {
            geometry: self.geometry.finish()?,
            distortion: self.distortion.finish()?,
            calibration: CalibrationRecord::default(),
            apply_distortion: false,
        })
    }
}

/// The end-to-end coordinate transform. Repeatedly recalibrated in place as
/// time advances; transform queries read a consistent snapshot and never
/// mutate the engine.
#[derive(Debug, Clone)]
pub struct FastTransformEngine {
    geometry: RowGeometry,
    distortion: DistortionMap,
    calibration: CalibrationRecord,
    apply_distortion: bool,
}

impl FastTransformEngine {
    pub fn geometry(&self) -> &RowGeometry {
        &self.geometry
    }

    pub fn distortion(&self) -> &DistortionMap {
        &self.distortion
    }

    /// Mutable distortion map, for recalibrating stored corrections in place
    pub fn distortion_mut(&mut self) -> &mut DistortionMap {
        &mut self.distortion
    }

    pub fn calibration(&self) -> &CalibrationRecord {
        &self.calibration
    }

    /// Calibration epoch, [`TIMESTAMP_UNCALIBRATED`] when uninitialized
    pub fn time_stamp(&self) -> i64 {
        self.calibration.time_stamp
    }

    /// Atomically replace the whole calibration record
    pub fn set_calibration(&mut self, record: CalibrationRecord) {
        self.calibration = record;
    }

    /// Toggle application of the distortion-map correction; disabled, the
    /// engine produces the purely nominal transform
    pub fn set_apply_distortion(&mut self, apply: bool) {
        self.apply_distortion = apply;
    }

    pub fn applies_distortion(&self) -> bool {
        self.apply_distortion
    }

    /// Convert raw readout coordinates to row-local (u, v).
    ///
    /// `pad` may be fractional (cluster centroid); `drift_time` and `tof`
    /// are in sampling time bins, `tof` being an additional time-of-flight
    /// offset subtracted from the drift time. An error means no valid
    /// coordinate was produced, never a partial result.
    ///
    /// An uncalibrated engine (time-stamp sentinel) is serviced nominally:
    /// the query proceeds with the zeroed drift coefficients and reports no
    /// error.
    pub fn conv_pad_time_to_uv(
        &self,
        slice: usize,
        row: usize,
        pad: f64,
        drift_time: f64,
        tof: f64,
    ) -> Result<(f64, f64), TransformError> {
        let (u, v) = self.conv_nominal(slice, row, pad, drift_time, tof)?;
        if self.apply_distortion {
            let c = self.distortion.correction_at(slice, row, u, v);
            return Ok((u + c.du, v + c.dv));
        }
        Ok((u, v))
    }

    /// Nominal (undistorted) pad/time conversion shared by the public queries
    fn conv_nominal(
        &self,
        slice: usize,
        row: usize,
        pad: f64,
        drift_time: f64,
        tof: f64,
    ) -> Result<(f64, f64), TransformError> {
        if slice >= self.geometry.num_slices() {
            return Err(TransformError::SliceOutOfRange {
                slice,
                num_slices: self.geometry.num_slices(),
            });
        }
        let info = self
            .geometry
            .row_info(row)
            .ok_or(TransformError::RowOutOfRange {
                row,
                num_rows: self.geometry.num_rows(),
            })?;
        if !(0.0..=info.max_pad as f64).contains(&pad) {
            return Err(TransformError::PadOutOfRange {
                pad,
                row,
                num_pads: info.num_pads(),
            });
        }

        let cal = &self.calibration;
        let u = info.pad_to_u(pad);
        let y = u;
        let mut v = (drift_time - cal.t0 - tof)
            * (cal.drift_velocity + cal.drift_velocity_correction_y * y)
            + cal.drift_length_correction;

        // Time-of-flight term: straight-line distance to the primary vertex
        // at the nominal (pre-correction) position
        if cal.time_of_flight_correction != 0.0 {
            let (_, z) = self.geometry.conv_uv_to_yz(u, v);
            let dist =
                (info.x * info.x + u * u + (z - cal.primary_vertex_z).powi(2)).sqrt();
            v += dist * cal.time_of_flight_correction;
        }

        if !(0.0..=self.geometry.z_length()).contains(&v) {
            return Err(TransformError::DriftOutOfBounds {
                length: v,
                max: self.geometry.z_length(),
            });
        }
        Ok((u, v))
    }

    /// Full transform to slice-local Cartesian coordinates, applying the
    /// radial spline correction and the z alignment
    pub fn conv_pad_time_to_xyz(
        &self,
        slice: usize,
        row: usize,
        pad: f64,
        drift_time: f64,
        tof: f64,
    ) -> Result<(f64, f64, f64), TransformError> {
        let (u, v) = self.conv_nominal(slice, row, pad, drift_time, tof)?;
        let c = if self.apply_distortion {
            self.distortion.correction_at(slice, row, u, v)
        } else {
            Correction::ZERO
        };
        let info = self.geometry.row_info(row).ok_or(
            TransformError::RowOutOfRange {
                row,
                num_rows: self.geometry.num_rows(),
            },
        )?;
        let (y, z) = self.geometry.conv_uv_to_yz(u + c.du, v + c.dv);
        Ok((info.x + c.dx, y, z + self.calibration.alignment_z))
    }
}
