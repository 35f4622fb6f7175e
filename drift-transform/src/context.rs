//! Transform context: owns the canonical nominal geometry, creates
//! independent transform engines on demand and drives their calibration
//! refresh against a time axis.

use detector_constants::DetectorSetup;
use log::info;

use crate::calibrator::SplineCalibrator;
use crate::error::ConfigError;
use crate::mapping::ReadoutMapping;
use crate::spline::{Correction, IrregularSpline2D};
use crate::transform::{
    CalibrationRecord, FastTransformBuilder, FastTransformEngine, TIMESTAMP_UNCALIBRATED,
};
use crate::validate::validate_geometry;

/// Space-charge correction capability: the physical field model, consumed
/// as an opaque function from a row-local position to a correction vector
/// in physical units. Absent, all distortion corrections default to zero.
pub trait SpaceChargeCorrection {
    fn evaluate(&self, slice: usize, row: usize, u: f64, v: f64) -> Correction;
}

/// Outcome of a calibration refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationStatus {
    /// Negative time-stamp: the engine was reset to the uncalibrated state
    Deinitialized,
    /// The previous calibration is recent enough and was kept untouched
    Unchanged,
    /// Drift coefficients (and distortion corrections, when a space-charge
    /// model is configured) were recomputed
    Updated,
}

/// Tunables of the context. Defaults carry the production values.
#[derive(Debug, Clone)]
pub struct TransformContextConfig {
    /// Consecutive rows sharing one distortion spline scenario
    pub rows_per_scenario: usize,
    /// Minimum time-stamp distance before a recalibration is performed
    pub recalibration_interval: i64,
    /// Knots per axis of the ground-truth raster used during scenario
    /// calibration
    pub truth_raster_knots: usize,
    /// Knots per axis of the regular scenario splines used when no
    /// space-charge model is configured
    pub default_scenario_knots: usize,
    pub calibrator: SplineCalibrator,
}

impl Default for TransformContextConfig {
    fn default() -> Self {
        Self {
            rows_per_scenario: 10,
            recalibration_interval: 60,
            truth_raster_knots: 101,
            default_scenario_knots: 21,
            calibrator: SplineCalibrator::default(),
        }
    }
}

/// Explicit context object replacing a process-wide singleton: constructed
/// once by the owning application and passed by reference to every call
/// site that needs geometry. Construction eagerly builds and validates the
/// canonical nominal geometry, so a context in hand is always ready.
pub struct TransformContext {
    mapping: Box<dyn ReadoutMapping>,
    correction: Option<Box<dyn SpaceChargeCorrection>>,
    setup: DetectorSetup,
    config: TransformContextConfig,
    nominal: FastTransformEngine,
}

impl TransformContext {
    pub fn new(
        mapping: Box<dyn ReadoutMapping>,
        setup: DetectorSetup,
        correction: Option<Box<dyn SpaceChargeCorrection>>,
    ) -> Result<Self, ConfigError> {
        Self::with_config(mapping, setup, correction, TransformContextConfig::default())
    }

    pub fn with_config(
        mapping: Box<dyn ReadoutMapping>,
        setup: DetectorSetup,
        correction: Option<Box<dyn SpaceChargeCorrection>>,
        config: TransformContextConfig,
    ) -> Result<Self, ConfigError> {
        if config.rows_per_scenario == 0 {
            return Err(ConfigError::InvalidParameter {
                what: "rows per scenario",
                value: 0.0,
            });
        }
        if !(setup.electronics.sampling_time > 0.0) {
            return Err(ConfigError::InvalidParameter {
                what: "sampling time",
                value: setup.electronics.sampling_time,
            });
        }

        // Canonical nominal geometry: one unscaled scenario, used only for
        // geometric conversions
        let num_rows = mapping.num_rows();
        let mut builder = FastTransformBuilder::new(num_rows, setup.detector.num_slices, 1);
        builder.set_z_length(setup.detector.length);
        for row in 0..num_rows {
            builder.set_row(
                row,
                mapping.row_x(row),
                mapping.pads_in_row(row),
                mapping.pad_width(row),
                0,
            )?;
        }
        builder.set_approximation_scenario(0, IrregularSpline2D::construct_regular(5, 5)?)?;
        let nominal = builder.finish()?;
        validate_geometry(&nominal, mapping.as_ref())?;

        Ok(Self {
            mapping,
            correction,
            setup,
            config,
            nominal,
        })
    }

    /// The canonical nominal engine (zero distortion, uncalibrated)
    pub fn nominal(&self) -> &FastTransformEngine {
        &self.nominal
    }

    /// Space-charge correction at a spline-normalized (su, sv) position of
    /// a row, in row-local units; zero when no model is configured
    pub fn space_charge_correction(
        &self,
        slice: usize,
        row: usize,
        su: f64,
        sv: f64,
    ) -> Correction {
        match &self.correction {
            None => Correction::ZERO,
            Some(model) => {
                let (u, v) = self.nominal.distortion().conv_suv_to_uv(row, su, sv);
                model.evaluate(slice, row, u, v)
            }
        }
    }

    /// Build a fresh, independently owned transform engine, calibrate it
    /// for the given time-stamp and validate it against the mapping oracle.
    pub fn create(&self, time_stamp: i64) -> Result<FastTransformEngine, ConfigError> {
        let num_rows = self.nominal.geometry().num_rows();
        let per_scenario = self.config.rows_per_scenario;
        let num_scenarios = num_rows.div_ceil(per_scenario);

        let mut builder =
            FastTransformBuilder::new(num_rows, self.setup.detector.num_slices, num_scenarios);
        builder.set_z_length(self.setup.detector.length);
        for row in 0..num_rows {
            let info = self.nominal.geometry().row_info(row).ok_or(
                ConfigError::RowOutOfRange {
                    row,
                    num_rows,
                },
            )?;
            builder.set_row(row, info.x, info.num_pads(), info.pad_width, row / per_scenario)?;
        }

        // Adjust knot count and placement of the scenario splines
        for scenario in 0..num_scenarios {
            let spline = if self.correction.is_none() {
                IrregularSpline2D::construct_regular(
                    self.config.default_scenario_knots,
                    self.config.default_scenario_knots,
                )?
            } else {
                let row = scenario * per_scenario;
                let raster_knots = self.config.truth_raster_knots;
                let mut raster = IrregularSpline2D::construct_regular(raster_knots, raster_knots)?;
                for knot in 0..raster.num_knots() {
                    let (su, sv) = raster.knot_uv(knot);
                    raster.set_value(knot, self.space_charge_correction(0, row, su, sv));
                }
                raster.correct_edges();

                let spline = self
                    .config
                    .calibrator
                    .calibrate(|u, v| raster.evaluate(u, v))?;
                info!(
                    "calibrated spline for scenario {}, row {}: knots u {}, v {}",
                    scenario,
                    row,
                    spline.grid_u().len(),
                    spline.grid_v().len()
                );
                spline
            };
            builder.set_approximation_scenario(scenario, spline)?;
        }

        let mut engine = builder.finish()?;
        engine.set_apply_distortion(true);

        validate_geometry(&engine, self.mapping.as_ref())?;
        self.update_calibration(&mut engine, time_stamp)?;
        Ok(engine)
    }

    /// Refresh an engine's calibration for a new time-stamp.
    ///
    /// A negative time-stamp deinitializes the calibration. A previous
    /// valid time-stamp closer than the recalibration interval leaves the
    /// engine untouched. Otherwise a fresh calibration record is computed
    /// from the parameter providers and, when a space-charge model is
    /// configured, every scenario spline's stored corrections are
    /// regenerated; record and corrections are committed together, so a
    /// failed refresh leaves the previous state wholly unchanged.
    pub fn update_calibration(
        &self,
        engine: &mut FastTransformEngine,
        time_stamp: i64,
    ) -> Result<CalibrationStatus, ConfigError> {
        if time_stamp < 0 {
            let mut record = *engine.calibration();
            record.time_stamp = TIMESTAMP_UNCALIBRATED;
            engine.set_calibration(record);
            return Ok(CalibrationStatus::Deinitialized);
        }

        let last = engine.time_stamp();
        if last >= 0 && (last - time_stamp).abs() < self.config.recalibration_interval {
            return Ok(CalibrationStatus::Unchanged);
        }

        let record = CalibrationRecord {
            time_stamp,
            t0: self.setup.peaking_time_bins(),
            drift_velocity: self.setup.drift_velocity_per_bin(),
            ..Default::default()
        };

        let Some(model) = &self.correction else {
            engine.set_calibration(record);
            return Ok(CalibrationStatus::Updated);
        };

        // Recompute all stored correction vectors off to the side, then
        // commit together with the record
        let distortion = engine.distortion();
        let num_slices = distortion.num_slices();
        let num_scenarios = distortion.num_scenarios();
        let mut slabs = Vec::with_capacity(num_slices * num_scenarios);
        for slice in 0..num_slices {
            for scenario in 0..num_scenarios {
                let row = distortion
                    .first_row_of_scenario(scenario)
                    .ok_or(ConfigError::MissingScenario { scenario })?;
                let mut fresh = distortion.scenario_spline(slice, scenario).clone();
                for knot in 0..fresh.num_knots() {
                    let (su, sv) = fresh.knot_uv(knot);
                    let (u, v) = distortion.conv_suv_to_uv(row, su, sv);
                    fresh.set_value(knot, model.evaluate(slice, row, u, v));
                }
                fresh.correct_edges();
                slabs.push(fresh.data().to_vec());
            }
        }

        engine.set_calibration(record);
        let distortion = engine.distortion_mut();
        for slice in 0..num_slices {
            for scenario in 0..num_scenarios {
                let slab = &slabs[slice * num_scenarios + scenario];
                distortion
                    .scenario_spline_mut(slice, scenario)
                    .data_mut()
                    .copy_from_slice(slab);
            }
        }
        Ok(CalibrationStatus::Updated)
    }
}
