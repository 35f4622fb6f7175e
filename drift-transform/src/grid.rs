//! One-dimensional knot axis of an irregular spline grid.

use crate::error::ConfigError;

/// Ordered knot positions over the normalized [0, 1] axis. Endpoints are
/// pinned at 0 and 1; interior knots may be spaced arbitrarily.
#[derive(Debug, Clone, PartialEq)]
pub struct KnotAxis {
    knots: Vec<f64>,
}

impl KnotAxis {
    /// Create an axis with `n` uniformly spaced knots
    pub fn regular(n: usize) -> Result<Self, ConfigError> {
        if n < 2 {
            return Err(ConfigError::TooFewKnots { knots: n });
        }
        let step = 1.0 / (n - 1) as f64;
        let mut knots: Vec<f64> = (0..n).map(|i| i as f64 * step).collect();
        knots[n - 1] = 1.0;
        Ok(Self { knots })
    }

    /// Create an axis from explicit positions; must be strictly increasing
    /// from 0.0 to 1.0
    pub fn from_positions(knots: Vec<f64>) -> Result<Self, ConfigError> {
        if knots.len() < 2 {
            return Err(ConfigError::TooFewKnots { knots: knots.len() });
        }
        let increasing = knots.windows(2).all(|w| w[0] < w[1]);
        if !increasing || knots[0] != 0.0 || knots[knots.len() - 1] != 1.0 {
            return Err(ConfigError::InvalidKnotPositions);
        }
        Ok(Self { knots })
    }

    /// Number of knots on the axis
    pub fn len(&self) -> usize {
        self.knots.len()
    }

    /// Position of knot `i`
    pub fn pos(&self, i: usize) -> f64 {
        self.knots[i]
    }

    /// All knot positions, ordered
    pub fn positions(&self) -> &[f64] {
        &self.knots
    }

    /// Index `i` of the segment [knot_i, knot_i+1] containing `x`;
    /// `x >= 1.0` maps to the last segment
    pub fn segment(&self, x: f64) -> usize {
        let upper = self.knots.partition_point(|&k| k <= x);
        upper.saturating_sub(1).min(self.knots.len() - 2)
    }

    /// Insert a new interior knot, keeping the axis ordered. Positions that
    /// coincide with an existing knot are ignored.
    pub fn insert(&mut self, x: f64) {
        if !(0.0..=1.0).contains(&x) {
            return;
        }
        match self.knots.binary_search_by(|k| k.total_cmp(&x)) {
            Ok(_) => {}
            Err(at) => self.knots.insert(at, x),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regular_axis_spans_unit_interval() {
        let axis = KnotAxis::regular(5).unwrap();
        assert_eq!(axis.len(), 5);
        assert_eq!(axis.pos(0), 0.0);
        assert_eq!(axis.pos(4), 1.0);
        assert!((axis.pos(1) - 0.25).abs() < 1e-15);
    }

    #[test]
    fn minimum_axis_is_two_knots() {
        assert!(KnotAxis::regular(1).is_err());
        assert!(KnotAxis::regular(2).is_ok());
    }

    #[test]
    fn from_positions_rejects_unpinned_endpoints() {
        assert!(KnotAxis::from_positions(vec![0.0, 0.5, 0.9]).is_err());
        assert!(KnotAxis::from_positions(vec![0.1, 0.5, 1.0]).is_err());
        assert!(KnotAxis::from_positions(vec![0.0, 0.5, 0.5, 1.0]).is_err());
        assert!(KnotAxis::from_positions(vec![0.0, 0.5, 1.0]).is_ok());
    }

    #[test]
    fn segment_lookup() {
        let axis = KnotAxis::regular(5).unwrap();
        assert_eq!(axis.segment(0.0), 0);
        assert_eq!(axis.segment(0.1), 0);
        assert_eq!(axis.segment(0.25), 1);
        assert_eq!(axis.segment(0.999), 3);
        assert_eq!(axis.segment(1.0), 3);
    }

    #[test]
    fn insert_keeps_order_and_skips_duplicates() {
        let mut axis = KnotAxis::regular(3).unwrap();
        axis.insert(0.25);
        axis.insert(0.25);
        axis.insert(0.75);
        assert_eq!(axis.positions(), &[0.0, 0.25, 0.5, 0.75, 1.0]);
    }
}
