//! Error taxonomy: fatal configuration errors abort a construction or
//! validation flow; out-of-range query errors are returned to the caller
//! and never escalate past the query boundary.

use thiserror::Error;

/// Fatal configuration error raised during construction, calibration setup
/// or geometry validation. Unrecoverable for the flow that raised it.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("row index {row} out of range (geometry has {num_rows} rows)")]
    RowOutOfRange { row: usize, num_rows: usize },

    #[error("row {row} configured more than once")]
    DuplicateRow { row: usize },

    #[error("row {row} was never configured before finish")]
    MissingRow { row: usize },

    #[error("scenario index {scenario} out of range ({num_scenarios} scenarios)")]
    ScenarioOutOfRange {
        scenario: usize,
        num_scenarios: usize,
    },

    #[error("scenario {scenario} has no approximation spline attached")]
    MissingScenario { scenario: usize },

    #[error("knot axis needs at least 2 knots, got {knots}")]
    TooFewKnots { knots: usize },

    #[error("knot positions must be strictly increasing over [0, 1]")]
    InvalidKnotPositions,

    #[error("invalid {what}: {value}")]
    InvalidParameter { what: &'static str, value: f64 },

    #[error("geometry validation failed: {0}")]
    GeometryMismatch(String),
}

/// Out-of-range error from a coordinate transform query. A non-zero status:
/// no valid coordinate was produced.
#[derive(Debug, Error, PartialEq)]
pub enum TransformError {
    #[error("slice {slice} out of range (detector has {num_slices} slices)")]
    SliceOutOfRange { slice: usize, num_slices: usize },

    #[error("row {row} out of range (geometry has {num_rows} rows)")]
    RowOutOfRange { row: usize, num_rows: usize },

    #[error("pad {pad} out of range for row {row} ({num_pads} pads)")]
    PadOutOfRange {
        pad: f64,
        row: usize,
        num_pads: usize,
    },

    #[error("drift length {length} outside the detector bounds [0, {max}]")]
    DriftOutOfBounds { length: f64, max: f64 },
}
