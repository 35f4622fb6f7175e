//! Geometry validation: cross-check a finished engine against the readout
//! mapping oracle before handing it to consumers.

use log::warn;

use crate::error::ConfigError;
use crate::mapping::ReadoutMapping;
use crate::transform::FastTransformEngine;

/// Absolute tolerance on the nominal row x position
const X_WARN_TOLERANCE: f64 = 1e-6;
/// Tolerance on the in-plane pad-centre coordinate before a warning
const U_WARN_TOLERANCE: f64 = 1e-5;
/// Hard ceiling: a worst deviation at or beyond this is fatal
const HARD_CEILING: f64 = 1e-4;

/// Cross-check the engine's pad geometry against the mapping oracle.
///
/// Pad counts must match exactly and row positions within tight tolerance.
/// For the sample pad of each row the engine's transform must reproduce the
/// oracle's pad centre; the oracle's in-plane axis uses the opposite sign
/// convention, so it is negated before comparing. Deviations inside the
/// warning band are logged and tolerated; a worst deviation at the hard
/// ceiling means geometry and transform have diverged and is fatal.
pub fn validate_geometry(
    engine: &FastTransformEngine,
    mapping: &dyn ReadoutMapping,
) -> Result<(), ConfigError> {
    let geometry = engine.geometry();

    if geometry.num_slices() != mapping.num_slices() {
        return Err(ConfigError::GeometryMismatch(format!(
            "wrong number of slices: {} instead of {}",
            geometry.num_slices(),
            mapping.num_slices()
        )));
    }
    if geometry.num_rows() != mapping.num_rows() {
        return Err(ConfigError::GeometryMismatch(format!(
            "wrong number of rows: {} instead of {}",
            geometry.num_rows(),
            mapping.num_rows()
        )));
    }

    let mut max_dx: f64 = 0.0;
    let mut max_du: f64 = 0.0;

    for row in 0..geometry.num_rows() {
        let info = geometry
            .row_info(row)
            .ok_or(ConfigError::RowOutOfRange {
                row,
                num_rows: geometry.num_rows(),
            })?;

        if info.num_pads() != mapping.pads_in_row(row) {
            return Err(ConfigError::GeometryMismatch(format!(
                "wrong number of pads in row {}: {} instead of {}",
                row,
                info.num_pads(),
                mapping.pads_in_row(row)
            )));
        }

        let pad = info.num_pads() / 2;
        let (map_x, map_y) = mapping.pad_centre(row, pad);
        let (u, _) = engine
            .conv_pad_time_to_uv(0, row, pad as f64, 10.0, 0.0)
            .map_err(|err| {
                ConfigError::GeometryMismatch(format!(
                    "cannot transform row {row} pad {pad} time 10: {err}"
                ))
            })?;

        let dx = info.x - map_x;
        // The map uses the opposite sign convention for this axis
        let du = u - (-map_y);

        if dx.abs() >= X_WARN_TOLERANCE || du.abs() >= U_WARN_TOLERANCE {
            warn!(
                "pad position mismatch: row {} pad {} x calc {} x in map {} dx {} \
                 u calc {} u in map {} du {}",
                row, pad, info.x, map_x, dx, u, -map_y, du
            );
        }
        max_dx = max_dx.max(dx.abs());
        max_du = max_du.max(du.abs());
    }

    if max_dx >= HARD_CEILING || max_du >= HARD_CEILING {
        return Err(ConfigError::GeometryMismatch(format!(
            "pad positions diverge from the map: max dx {max_dx} max du {max_du}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{RowSpec, TabulatedMapping};
    use crate::spline::IrregularSpline2D;
    use crate::transform::FastTransformBuilder;

    fn rows(pad_count: usize) -> Vec<RowSpec> {
        (0..4)
            .map(|row| RowSpec {
                x: 85.0 + 0.5 * row as f64,
                pad_width: 0.4,
                pad_count,
            })
            .collect()
    }

    fn engine(rows: &[RowSpec]) -> FastTransformEngine {
        let mut builder = FastTransformBuilder::new(rows.len(), 18, 1);
        builder.set_z_length(250.0);
        for (row, spec) in rows.iter().enumerate() {
            builder
                .set_row(row, spec.x, spec.pad_count, spec.pad_width, 0)
                .unwrap();
        }
        builder
            .set_approximation_scenario(0, IrregularSpline2D::construct_regular(5, 5).unwrap())
            .unwrap();
        builder.finish().unwrap()
    }

    #[test]
    fn consistent_geometry_passes() {
        let specs = rows(20);
        let mapping = TabulatedMapping::new(18, specs.clone());
        assert!(validate_geometry(&engine(&specs), &mapping).is_ok());
    }

    #[test]
    fn pad_count_off_by_one_is_fatal() {
        let specs = rows(20);
        let mut wrong = specs.clone();
        wrong[2].pad_count = 21;
        let mapping = TabulatedMapping::new(18, wrong);
        assert!(matches!(
            validate_geometry(&engine(&specs), &mapping),
            Err(ConfigError::GeometryMismatch(_))
        ));
    }

    #[test]
    fn row_position_beyond_the_hard_ceiling_is_fatal() {
        let specs = rows(20);
        let mut shifted = specs.clone();
        shifted[1].x += 2e-4;
        let mapping = TabulatedMapping::new(18, shifted);
        assert!(matches!(
            validate_geometry(&engine(&specs), &mapping),
            Err(ConfigError::GeometryMismatch(_))
        ));
    }

    #[test]
    fn deviation_inside_the_warning_band_is_tolerated() {
        let specs = rows(20);
        let mut nudged = specs.clone();
        nudged[1].x += 5e-5;
        let mapping = TabulatedMapping::new(18, nudged);
        assert!(validate_geometry(&engine(&specs), &mapping).is_ok());
    }

    #[test]
    fn slice_count_mismatch_is_fatal() {
        let specs = rows(20);
        let mapping = TabulatedMapping::new(36, specs.clone());
        assert!(matches!(
            validate_geometry(&engine(&specs), &mapping),
            Err(ConfigError::GeometryMismatch(_))
        ));
    }
}
