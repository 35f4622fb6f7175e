//! Readout-mapping oracle: the read-only enumeration of rows, pads and
//! physical pad centres that geometry construction and validation are
//! checked against.

use serde::{Deserialize, Serialize};

/// Read-only readout-mapping oracle.
///
/// Pad centres are reported in the oracle's own frame, whose in-plane axis
/// uses the opposite sign convention to the transform's u coordinate;
/// consumers negate it before comparing.
pub trait ReadoutMapping {
    fn num_slices(&self) -> usize;
    fn num_rows(&self) -> usize;
    /// Number of pads in a row
    fn pads_in_row(&self, row: usize) -> usize;
    /// Pad width of a row (cm)
    fn pad_width(&self, row: usize) -> f64;
    /// Nominal radial position of a row (cm)
    fn row_x(&self, row: usize) -> f64;
    /// Physical centre (x, y) of a pad, in the oracle's sign convention
    fn pad_centre(&self, row: usize, pad: usize) -> (f64, f64);
}

/// One row of a [`TabulatedMapping`]
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RowSpec {
    pub x: f64,
    pub pad_width: f64,
    pub pad_count: usize,
}

/// Table-backed readout mapping: pad centres derived from per-row constants,
/// with the map's own y sign convention
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TabulatedMapping {
    num_slices: usize,
    rows: Vec<RowSpec>,
}

impl TabulatedMapping {
    pub fn new(num_slices: usize, rows: Vec<RowSpec>) -> Self {
        Self { num_slices, rows }
    }
}

impl ReadoutMapping for TabulatedMapping {
    fn num_slices(&self) -> usize {
        self.num_slices
    }

    fn num_rows(&self) -> usize {
        self.rows.len()
    }

    fn pads_in_row(&self, row: usize) -> usize {
        self.rows[row].pad_count
    }

    fn pad_width(&self, row: usize) -> f64 {
        self.rows[row].pad_width
    }

    fn row_x(&self, row: usize) -> f64 {
        self.rows[row].x
    }

    fn pad_centre(&self, row: usize, pad: usize) -> (f64, f64) {
        let spec = &self.rows[row];
        let width = spec.pad_width * spec.pad_count as f64;
        let u = (pad as f64 + 0.5) * spec.pad_width - 0.5 * width;
        (spec.x, -u)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn pad_centres_use_the_map_sign_convention() {
        let mapping = TabulatedMapping::new(
            18,
            vec![RowSpec {
                x: 85.0,
                pad_width: 0.4,
                pad_count: 20,
            }],
        );
        let (x, y) = mapping.pad_centre(0, 10);
        assert_abs_diff_eq!(x, 85.0, epsilon = 1e-12);
        // Opposite sign to the transform's u for the same pad
        assert_abs_diff_eq!(y, -0.2, epsilon = 1e-12);
    }
}
