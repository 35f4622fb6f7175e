//! Fast coordinate transforms for a gaseous tracking detector.
//!
//! Converts raw readout coordinates (slice, row, pad, drift time) into
//! local and global Cartesian positions, applying a time-varying
//! space-charge distortion correction stored as piecewise splines over
//! irregular 2D grids. The [`TransformContext`] owns the canonical nominal
//! geometry and produces independently owned [`FastTransformEngine`]s,
//! recalibrated in place as time advances.

pub mod calibrator;
pub mod context;
pub mod distortion;
pub mod error;
pub mod grid;
pub mod mapping;
pub mod row_geometry;
pub mod spline;
pub mod transform;
pub mod validate;

pub use calibrator::SplineCalibrator;
pub use context::{
    CalibrationStatus, SpaceChargeCorrection, TransformContext, TransformContextConfig,
};
pub use distortion::{DistortionMap, DistortionMapBuilder};
pub use error::{ConfigError, TransformError};
pub use grid::KnotAxis;
pub use mapping::{ReadoutMapping, RowSpec, TabulatedMapping};
pub use row_geometry::{RowGeometry, RowGeometryBuilder, RowInfo};
pub use spline::{Correction, IrregularSpline2D};
pub use transform::{
    CalibrationRecord, FastTransformBuilder, FastTransformEngine, TIMESTAMP_UNCALIBRATED,
};
pub use validate::validate_geometry;
