//! 2D piecewise-cubic interpolant over an irregular knot grid, storing one
//! distortion correction vector per knot.
//!
//! Evaluation is a local tensor-product cubic Hermite: tangents are
//! Catmull-Rom estimates weighted by knot spacing, reduced to one-sided
//! secants at the axis borders. The interpolant reproduces the stored value
//! at every knot exactly, is continuous across knot boundaries, and a
//! minimal 2x2 grid degenerates to plain bilinear interpolation. Inputs
//! outside [0, 1] are clamped to the boundary, never extrapolated.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::grid::KnotAxis;

/// Distortion correction vector stored per knot: a radial offset `dx` and
/// the two in-plane offsets `du` (pad direction) and `dv` (drift direction),
/// all in physical units (cm).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Correction {
    pub dx: f64,
    pub du: f64,
    pub dv: f64,
}

impl Correction {
    pub const ZERO: Correction = Correction {
        dx: 0.0,
        du: 0.0,
        dv: 0.0,
    };

    pub fn new(dx: f64, du: f64, dv: f64) -> Self {
        Self { dx, du, dv }
    }

    fn as_array(self) -> [f64; 3] {
        [self.dx, self.du, self.dv]
    }

    fn from_array(a: [f64; 3]) -> Self {
        Self {
            dx: a[0],
            du: a[1],
            dv: a[2],
        }
    }

    /// Largest absolute component difference against another correction
    pub fn max_abs_diff(self, other: Correction) -> f64 {
        (self.dx - other.dx)
            .abs()
            .max((self.du - other.du).abs())
            .max((self.dv - other.dv).abs())
    }
}

/// 2D spline over a non-uniform (u, v) knot grid. Knot positions are
/// immutable after construction; stored values are mutable and default to
/// zero until explicitly set or calibrated.
#[derive(Debug, Clone)]
pub struct IrregularSpline2D {
    grid_u: KnotAxis,
    grid_v: KnotAxis,
    data: Vec<Correction>,
}

impl IrregularSpline2D {
    /// Build a spline over a uniform knot grid with zeroed values
    pub fn construct_regular(n_knots_u: usize, n_knots_v: usize) -> Result<Self, ConfigError> {
        Ok(Self::from_axes(
            KnotAxis::regular(n_knots_u)?,
            KnotAxis::regular(n_knots_v)?,
        ))
    }

    /// Build a spline over explicit knot axes with zeroed values
    pub fn from_axes(grid_u: KnotAxis, grid_v: KnotAxis) -> Self {
        let data = vec![Correction::ZERO; grid_u.len() * grid_v.len()];
        Self {
            grid_u,
            grid_v,
            data,
        }
    }

    pub fn grid_u(&self) -> &KnotAxis {
        &self.grid_u
    }

    pub fn grid_v(&self) -> &KnotAxis {
        &self.grid_v
    }

    /// Total number of knots
    pub fn num_knots(&self) -> usize {
        self.data.len()
    }

    /// Flat knot index for grid coordinates (iu, iv)
    pub fn knot_index(&self, iu: usize, iv: usize) -> usize {
        iv * self.grid_u.len() + iu
    }

    /// Normalized (u, v) position of a knot
    pub fn knot_uv(&self, knot: usize) -> (f64, f64) {
        let nu = self.grid_u.len();
        (self.grid_u.pos(knot % nu), self.grid_v.pos(knot / nu))
    }

    /// Stored value at a knot
    pub fn value(&self, knot: usize) -> Correction {
        self.data[knot]
    }

    /// Set the stored value at a knot
    pub fn set_value(&mut self, knot: usize, value: Correction) {
        self.data[knot] = value;
    }

    /// Stored values for all knots, ordered by flat knot index
    pub fn data(&self) -> &[Correction] {
        &self.data
    }

    /// Mutable access to the stored values, for calibration or direct
    /// correction assignment. Call [`correct_edges`](Self::correct_edges)
    /// after any bulk assignment.
    pub fn data_mut(&mut self) -> &mut [Correction] {
        &mut self.data
    }

    /// Interpolate the stored vector field at normalized (u, v). Inputs are
    /// clamped to [0, 1]; at a knot position the stored value is returned
    /// exactly.
    pub fn evaluate(&self, u: f64, v: f64) -> Correction {
        let u = u.clamp(0.0, 1.0);
        let v = v.clamp(0.0, 1.0);
        let nu = self.grid_u.len();
        let out = eval_axis(self.grid_v.positions(), v, &mut |j| {
            eval_axis(self.grid_u.positions(), u, &mut |i| {
                self.data[j * nu + i].as_array()
            })
        });
        Correction::from_array(out)
    }

    /// Rewrite the border-knot values by Lagrange extrapolation from the
    /// adjacent interior knots (up to four per border, u borders first,
    /// then v), so that the clamped boundary continues the interior trend
    /// instead of holding a raw edge sample. Required after any bulk value
    /// assignment. Axes with fewer than two interior knots are left alone.
    pub fn correct_edges(&mut self) {
        let nu = self.grid_u.len();
        let nv = self.grid_v.len();

        if nu >= 4 {
            for j in 0..nv {
                let row = |i: usize| self.data[j * nu + i].as_array();
                let (first, last) = border_values(self.grid_u.positions(), &row);
                self.data[j * nu] = Correction::from_array(first);
                self.data[j * nu + nu - 1] = Correction::from_array(last);
            }
        }
        if nv >= 4 {
            for i in 0..nu {
                let column = |j: usize| self.data[j * nu + i].as_array();
                let (first, last) = border_values(self.grid_v.positions(), &column);
                self.data[i] = Correction::from_array(first);
                self.data[(nv - 1) * nu + i] = Correction::from_array(last);
            }
        }
    }
}

/// Cubic Hermite interpolation along one knot axis. `sample` yields the
/// value at a knot index; only the up-to-four knots around the containing
/// segment are sampled.
fn eval_axis(knots: &[f64], x: f64, sample: &mut dyn FnMut(usize) -> [f64; 3]) -> [f64; 3] {
    let n = knots.len();
    let upper = knots.partition_point(|&k| k <= x);
    let i = upper.saturating_sub(1).min(n - 2);
    let i1 = i + 1;

    let h = knots[i1] - knots[i];
    let t = (x - knots[i]) / h;
    let f0 = sample(i);
    let f1 = sample(i1);
    let prev = (i > 0).then(|| (knots[i] - knots[i - 1], sample(i - 1)));
    let next = (i1 + 1 < n).then(|| (knots[i1 + 1] - knots[i1], sample(i1 + 1)));

    let t2 = t * t;
    let t3 = t2 * t;
    let mut out = [0.0; 3];
    for c in 0..3 {
        let s = (f1[c] - f0[c]) / h;
        // Spacing-weighted Catmull-Rom tangents, one-sided at the borders
        let d0 = match &prev {
            Some((hp, fp)) => {
                let sp = (f0[c] - fp[c]) / hp;
                (s * hp + sp * h) / (hp + h)
            }
            None => s,
        };
        let d1 = match &next {
            Some((hn, fnx)) => {
                let sn = (fnx[c] - f1[c]) / hn;
                (sn * h + s * hn) / (h + hn)
            }
            None => s,
        };
        out[c] = f0[c] * (2.0 * t3 - 3.0 * t2 + 1.0)
            + f1[c] * (3.0 * t2 - 2.0 * t3)
            + h * (d0 * (t3 - 2.0 * t2 + t) + d1 * (t3 - t2));
    }
    out
}

/// Extrapolated values for both border knots of one axis, from up to four
/// adjacent interior knots each
fn border_values(knots: &[f64], sample: &dyn Fn(usize) -> [f64; 3]) -> ([f64; 3], [f64; 3]) {
    let n = knots.len();
    let interior_last = n - 2;
    let take = interior_last.min(4);

    let first_idx: Vec<usize> = (1..=take).collect();
    let last_idx: Vec<usize> = (interior_last + 1 - take..=interior_last).collect();

    (
        lagrange(knots, &first_idx, sample, knots[0]),
        lagrange(knots, &last_idx, sample, knots[n - 1]),
    )
}

/// Lagrange polynomial through the given knots, evaluated at `x`
fn lagrange(
    knots: &[f64],
    idx: &[usize],
    sample: &dyn Fn(usize) -> [f64; 3],
    x: f64,
) -> [f64; 3] {
    let mut out = [0.0; 3];
    for &a in idx {
        let mut w = 1.0;
        for &b in idx {
            if b != a {
                w *= (x - knots[b]) / (knots[a] - knots[b]);
            }
        }
        let f = sample(a);
        for c in 0..3 {
            out[c] += w * f[c];
        }
    }
    out
}
