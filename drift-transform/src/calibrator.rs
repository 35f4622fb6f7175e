//! Adaptive spline calibration: pick knot count and placement so that a
//! spline approximates an arbitrary correction function within a bounded
//! deviation, using a dense raster of the function as ground truth.
//!
//! Fully deterministic: identical inputs produce identical splines.

use log::debug;

use crate::error::ConfigError;
use crate::grid::KnotAxis;
use crate::spline::{Correction, IrregularSpline2D};

/// Accuracy and resolution targets for spline calibration. The deviation
/// bound is a soft target: when the knot budget runs out first, the best
/// spline found so far is returned.
#[derive(Debug, Clone)]
pub struct SplineCalibrator {
    /// Knots per axis of the ground-truth raster
    pub raster_knots_u: usize,
    pub raster_knots_v: usize,
    /// Knots per axis of the initial regular candidate grid
    pub min_knots: usize,
    /// Knot budget per axis
    pub max_knots_u: usize,
    pub max_knots_v: usize,
    /// Maximum tolerated per-component deviation from the raster
    pub max_deviation: f64,
}

impl Default for SplineCalibrator {
    fn default() -> Self {
        Self {
            raster_knots_u: 41,
            raster_knots_v: 41,
            min_knots: 5,
            max_knots_u: 21,
            max_knots_v: 21,
            max_deviation: 0.01,
        }
    }
}

impl SplineCalibrator {
    /// Calibrate a spline against the correction function `f`, supplied in
    /// normalized (u, v) over [0,1]^2.
    pub fn calibrate<F>(&self, f: F) -> Result<IrregularSpline2D, ConfigError>
    where
        F: Fn(f64, f64) -> Correction,
    {
        // Ground truth: the function sampled on a dense regular raster
        let mut truth =
            IrregularSpline2D::construct_regular(self.raster_knots_u, self.raster_knots_v)?;
        for knot in 0..truth.num_knots() {
            let (u, v) = truth.knot_uv(knot);
            truth.set_value(knot, f(u, v));
        }
        truth.correct_edges();

        let mut grid_u = KnotAxis::regular(self.min_knots)?;
        let mut grid_v = KnotAxis::regular(self.min_knots)?;

        let mut candidate = fit(&truth, &grid_u, &grid_v);
        let (mut dev, mut worst_knot) = worst_deviation(&truth, &candidate);
        let mut best = candidate.clone();
        let mut best_dev = dev;

        while dev > self.max_deviation {
            // Split the candidate segment containing the worst raster point,
            // on the axis with the wider segment (ties go to u)
            let (wu, wv) = truth.knot_uv(worst_knot);
            let seg_u = grid_u.segment(wu);
            let seg_v = grid_v.segment(wv);
            let width_u = grid_u.pos(seg_u + 1) - grid_u.pos(seg_u);
            let width_v = grid_v.pos(seg_v + 1) - grid_v.pos(seg_v);
            let can_u = grid_u.len() < self.max_knots_u;
            let can_v = grid_v.len() < self.max_knots_v;
            let split_u = match (can_u, can_v) {
                (true, true) => width_u >= width_v,
                (true, false) => true,
                (false, true) => false,
                (false, false) => break,
            };
            if split_u {
                grid_u.insert(grid_u.pos(seg_u) + 0.5 * width_u);
            } else {
                grid_v.insert(grid_v.pos(seg_v) + 0.5 * width_v);
            }

            candidate = fit(&truth, &grid_u, &grid_v);
            let (d, k) = worst_deviation(&truth, &candidate);
            dev = d;
            worst_knot = k;
            if dev < best_dev {
                best_dev = dev;
                best = candidate.clone();
            }
        }

        if dev <= self.max_deviation {
            debug!(
                "calibrated spline: knots u {}, v {}, deviation {:.3e}",
                candidate.grid_u().len(),
                candidate.grid_v().len(),
                dev
            );
            Ok(candidate)
        } else {
            debug!(
                "knot budget exhausted, best deviation {:.3e} above target {:.3e}",
                best_dev, self.max_deviation
            );
            Ok(best)
        }
    }
}

/// Build a candidate over the given axes, knot values sampled from the
/// ground-truth raster and edge-corrected
fn fit(truth: &IrregularSpline2D, grid_u: &KnotAxis, grid_v: &KnotAxis) -> IrregularSpline2D {
    let mut spline = IrregularSpline2D::from_axes(grid_u.clone(), grid_v.clone());
    for knot in 0..spline.num_knots() {
        let (u, v) = spline.knot_uv(knot);
        spline.set_value(knot, truth.evaluate(u, v));
    }
    spline.correct_edges();
    spline
}

/// Worst per-component deviation of the candidate from the raster, measured
/// at every raster knot, with the index of the first worst knot
fn worst_deviation(truth: &IrregularSpline2D, candidate: &IrregularSpline2D) -> (f64, usize) {
    let mut worst = 0.0;
    let mut worst_knot = 0;
    for knot in 0..truth.num_knots() {
        let (u, v) = truth.knot_uv(knot);
        let d = candidate.evaluate(u, v).max_abs_diff(truth.value(knot));
        if d > worst {
            worst = d;
            worst_knot = knot;
        }
    }
    (worst, worst_knot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn smooth(u: f64, v: f64) -> Correction {
        Correction::new(
            0.05 * (PI * u).sin() * (PI * v).sin(),
            0.02 * (u * u - v),
            0.03 * (0.5 * PI * u).cos() * v,
        )
    }

    fn bump(u: f64, v: f64) -> Correction {
        let r2 = (u - 0.37).powi(2) + (v - 0.61).powi(2);
        Correction::new(0.5 * (-r2 / 0.002).exp(), 0.0, 0.0)
    }

    #[test]
    fn smooth_function_is_approximated_within_the_bound() {
        let calibrator = SplineCalibrator::default();
        let spline = calibrator.calibrate(smooth).unwrap();
        // Held-out grid, finer than and offset from the calibration raster
        let mut worst = 0.0f64;
        for i in 0..64 {
            for j in 0..64 {
                let u = (i as f64 + 0.5) / 64.0;
                let v = (j as f64 + 0.5) / 64.0;
                worst = worst.max(spline.evaluate(u, v).max_abs_diff(smooth(u, v)));
            }
        }
        assert!(worst <= 0.01, "worst deviation {worst}");
    }

    #[test]
    fn calibration_is_deterministic() {
        let calibrator = SplineCalibrator {
            max_deviation: 0.002,
            ..Default::default()
        };
        let a = calibrator.calibrate(bump).unwrap();
        let b = calibrator.calibrate(bump).unwrap();
        assert_eq!(a.grid_u().positions(), b.grid_u().positions());
        assert_eq!(a.grid_v().positions(), b.grid_v().positions());
        assert_eq!(a.data(), b.data());
    }

    #[test]
    fn sharp_feature_forces_refinement_beyond_the_initial_grid() {
        let calibrator = SplineCalibrator {
            max_deviation: 0.002,
            ..Default::default()
        };
        let spline = calibrator.calibrate(bump).unwrap();
        assert!(spline.grid_u().len() > calibrator.min_knots);
        assert!(spline.grid_v().len() > calibrator.min_knots);
    }

    #[test]
    fn exhausted_budget_returns_the_best_spline_without_failing() {
        let calibrator = SplineCalibrator {
            max_deviation: 1e-12,
            max_knots_u: 6,
            max_knots_v: 6,
            ..Default::default()
        };
        let spline = calibrator.calibrate(bump).unwrap();
        assert!(spline.grid_u().len() <= 6);
        assert!(spline.grid_v().len() <= 6);
    }

    #[test]
    fn zero_function_needs_no_refinement() {
        let calibrator = SplineCalibrator::default();
        let spline = calibrator.calibrate(|_, _| Correction::ZERO).unwrap();
        assert_eq!(spline.grid_u().len(), calibrator.min_knots);
        assert!(spline.data().iter().all(|c| *c == Correction::ZERO));
    }
}
