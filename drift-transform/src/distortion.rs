//! Space-charge distortion map: one correction spline per (slice, scenario),
//! with detector rows grouped into scenarios so neighbouring rows share one
//! spline's storage and compute.

use crate::error::ConfigError;
use crate::row_geometry::RowInfo;
use crate::spline::{Correction, IrregularSpline2D};

#[derive(Debug, Clone, Copy)]
struct DistortionRow {
    info: RowInfo,
    scenario: usize,
}

/// Build session for [`DistortionMap`]: record every row with its scenario
/// assignment, attach one approximation spline per scenario, then
/// [`finish`](Self::finish).
#[derive(Debug)]
pub struct DistortionMapBuilder {
    num_slices: usize,
    num_scenarios: usize,
    z_length: f64,
    rows: Vec<Option<DistortionRow>>,
    scenarios: Vec<Option<IrregularSpline2D>>,
}

impl DistortionMapBuilder {
    /// Begin a build session
    pub fn new(num_rows: usize, num_slices: usize, num_scenarios: usize) -> Self {
        Self {
            num_slices,
            num_scenarios,
            z_length: 0.0,
            rows: vec![None; num_rows],
            scenarios: vec![None; num_scenarios],
        }
    }

    /// Set the drift length of the sensitive volume (cm)
    pub fn set_z_length(&mut self, z_length: f64) {
        self.z_length = z_length;
    }

    /// Record one row's constants and its scenario assignment
    pub fn set_row(
        &mut self,
        row: usize,
        x: f64,
        pad_count: usize,
        pad_width: f64,
        scenario: usize,
    ) -> Result<(), ConfigError> {
        let num_rows = self.rows.len();
        let slot = self
            .rows
            .get_mut(row)
            .ok_or(ConfigError::RowOutOfRange { row, num_rows })?;
        if slot.is_some() {
            return Err(ConfigError::DuplicateRow { row });
        }
        if scenario >= self.num_scenarios {
            return Err(ConfigError::ScenarioOutOfRange {
                scenario,
                num_scenarios: self.num_scenarios,
            });
        }
        if pad_count == 0 || !(pad_width > 0.0) {
            return Err(ConfigError::InvalidParameter {
                what: "pad geometry",
                value: pad_width,
            });
        }
        *slot = Some(DistortionRow {
            info: RowInfo {
                x,
                pad_width,
                max_pad: pad_count - 1,
            },
            scenario,
        });
        Ok(())
    }

    /// Attach the approximation spline for one scenario. Only the knot
    /// topology is taken over; stored values start at zero.
    pub fn set_approximation_scenario(
        &mut self,
        scenario: usize,
        spline: IrregularSpline2D,
    ) -> Result<(), ConfigError> {
        let slot = self
            .scenarios
            .get_mut(scenario)
            .ok_or(ConfigError::ScenarioOutOfRange {
                scenario,
                num_scenarios: self.num_scenarios,
            })?;
        *slot = Some(IrregularSpline2D::from_axes(
            spline.grid_u().clone(),
            spline.grid_v().clone(),
        ));
        Ok(())
    }

    /// Close the build session, yielding the query-capable map with all
    /// stored corrections at zero
    pub fn finish(self) -> Result<DistortionMap, ConfigError> {
        if !(self.z_length > 0.0) {
            return Err(ConfigError::InvalidParameter {
                what: "detector z length",
                value: self.z_length,
            });
        }
        let mut rows = Vec::with_capacity(self.rows.len());
        for (row, entry) in self.rows.into_iter().enumerate() {
            rows.push(entry.ok_or(ConfigError::MissingRow { row })?);
        }
        let mut scenario_splines = Vec::with_capacity(self.num_scenarios);
        for (scenario, spline) in self.scenarios.into_iter().enumerate() {
            scenario_splines.push(spline.ok_or(ConfigError::MissingScenario { scenario })?);
        }
        // One spline clone per slice; values stay independent per slice
        let mut splines = Vec::with_capacity(self.num_slices * self.num_scenarios);
        for _ in 0..self.num_slices {
            splines.extend(scenario_splines.iter().cloned());
        }
        Ok(DistortionMap {
            num_slices: self.num_slices,
            num_scenarios: self.num_scenarios,
            z_length: self.z_length,
            rows,
            splines,
        })
    }
}

/// Finished distortion map. Stored correction values may be recalibrated in
/// place; scenario membership and knot topology are fixed.
#[derive(Debug, Clone)]
pub struct DistortionMap {
    num_slices: usize,
    num_scenarios: usize,
    z_length: f64,
    rows: Vec<DistortionRow>,
    splines: Vec<IrregularSpline2D>,
}

impl DistortionMap {
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn num_slices(&self) -> usize {
        self.num_slices
    }

    pub fn num_scenarios(&self) -> usize {
        self.num_scenarios
    }

    /// Scenario index the row is assigned to
    pub fn scenario_of(&self, row: usize) -> usize {
        self.rows[row].scenario
    }

    /// First row assigned to a scenario, if any row maps to it
    pub fn first_row_of_scenario(&self, scenario: usize) -> Option<usize> {
        self.rows.iter().position(|r| r.scenario == scenario)
    }

    /// Spline shared by all rows of the given row's scenario
    pub fn get_spline(&self, slice: usize, row: usize) -> &IrregularSpline2D {
        self.scenario_spline(slice, self.rows[row].scenario)
    }

    pub fn scenario_spline(&self, slice: usize, scenario: usize) -> &IrregularSpline2D {
        &self.splines[slice * self.num_scenarios + scenario]
    }

    /// Mutable scenario spline, for recalibrating stored values in place
    pub fn scenario_spline_mut(&mut self, slice: usize, scenario: usize) -> &mut IrregularSpline2D {
        &mut self.splines[slice * self.num_scenarios + scenario]
    }

    /// Convert spline-normalized (su, sv) in [0,1]^2 to row-local (u, v)
    pub fn conv_suv_to_uv(&self, row: usize, su: f64, sv: f64) -> (f64, f64) {
        let info = &self.rows[row].info;
        ((su - 0.5) * info.width(), sv * self.z_length)
    }

    /// Convert row-local (u, v) to spline-normalized (su, sv); exact inverse
    /// of [`conv_suv_to_uv`](Self::conv_suv_to_uv)
    pub fn conv_uv_to_suv(&self, row: usize, u: f64, v: f64) -> (f64, f64) {
        let info = &self.rows[row].info;
        (u / info.width() + 0.5, v / self.z_length)
    }

    /// Distortion correction at a row-local (u, v) position
    pub fn correction_at(&self, slice: usize, row: usize, u: f64, v: f64) -> Correction {
        let (su, sv) = self.conv_uv_to_suv(row, u, v);
        self.get_spline(slice, row).evaluate(su, sv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn map(num_rows: usize, rows_per_scenario: usize) -> DistortionMap {
        let num_scenarios = num_rows.div_ceil(rows_per_scenario);
        let mut builder = DistortionMapBuilder::new(num_rows, 2, num_scenarios);
        builder.set_z_length(250.0);
        for row in 0..num_rows {
            builder
                .set_row(row, 85.0 + 0.5 * row as f64, 20, 0.4, row / rows_per_scenario)
                .unwrap();
        }
        for scenario in 0..num_scenarios {
            let spline = IrregularSpline2D::construct_regular(5, 5).unwrap();
            builder.set_approximation_scenario(scenario, spline).unwrap();
        }
        builder.finish().unwrap()
    }

    #[test]
    fn rows_of_one_scenario_share_a_spline() {
        let map = map(25, 10);
        assert_eq!(map.num_scenarios(), 3);
        assert!(std::ptr::eq(map.get_spline(0, 0), map.get_spline(0, 9)));
        assert!(!std::ptr::eq(map.get_spline(0, 9), map.get_spline(0, 10)));
        assert!(!std::ptr::eq(map.get_spline(0, 0), map.get_spline(1, 0)));
        assert_eq!(map.scenario_of(24), 2);
        assert_eq!(map.first_row_of_scenario(2), Some(20));
    }

    #[test]
    fn suv_uv_round_trip() {
        let map = map(10, 10);
        for &(su, sv) in &[(0.0, 0.0), (0.25, 0.5), (1.0, 1.0), (0.37, 0.92)] {
            let (u, v) = map.conv_suv_to_uv(3, su, sv);
            let (su2, sv2) = map.conv_uv_to_suv(3, u, v);
            assert_abs_diff_eq!(su2, su, epsilon = 1e-12);
            assert_abs_diff_eq!(sv2, sv, epsilon = 1e-12);
        }
        // su 0.5 is the row centre, sv spans the full drift length
        let (u, v) = map.conv_suv_to_uv(0, 0.5, 1.0);
        assert_abs_diff_eq!(u, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(v, 250.0, epsilon = 1e-12);
    }

    #[test]
    fn attached_scenario_splines_start_at_zero() {
        let num_scenarios = 1;
        let mut builder = DistortionMapBuilder::new(1, 1, num_scenarios);
        builder.set_z_length(250.0);
        builder.set_row(0, 85.0, 20, 0.4, 0).unwrap();
        let mut spline = IrregularSpline2D::construct_regular(3, 3).unwrap();
        spline.set_value(4, Correction::new(1.0, 2.0, 3.0));
        builder.set_approximation_scenario(0, spline).unwrap();
        let map = builder.finish().unwrap();
        assert_eq!(map.get_spline(0, 0).value(4), Correction::ZERO);
    }

    #[test]
    fn builder_rejects_bad_scenario_assignments() {
        let mut builder = DistortionMapBuilder::new(2, 1, 1);
        builder.set_z_length(250.0);
        assert!(matches!(
            builder.set_row(0, 85.0, 20, 0.4, 1),
            Err(ConfigError::ScenarioOutOfRange { scenario: 1, .. })
        ));
        builder.set_row(0, 85.0, 20, 0.4, 0).unwrap();
        builder.set_row(1, 85.5, 20, 0.4, 0).unwrap();
        assert!(matches!(
            builder.finish(),
            Err(ConfigError::MissingScenario { scenario: 0 })
        ));
    }

    #[test]
    fn in_place_value_updates_are_visible_to_every_row_of_the_scenario() {
        let mut map = map(10, 10);
        map.scenario_spline_mut(0, 0)
            .set_value(0, Correction::new(0.5, 0.0, 0.0));
        assert_eq!(map.get_spline(0, 7).value(0).dx, 0.5);
        assert_eq!(map.get_spline(1, 7).value(0).dx, 0.0);
    }
}
