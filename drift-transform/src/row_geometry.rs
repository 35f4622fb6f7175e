//! Per-row nominal geometry and the coordinate conversions between the
//! slice-local frame, the global frame and pad-normalized (u, v).

use std::f64::consts::TAU;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Nominal geometric constants of one readout row. Immutable after
/// construction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RowInfo {
    /// Radial position of the row (cm)
    pub x: f64,
    /// Width of one pad (cm)
    pub pad_width: f64,
    /// Highest valid pad index in the row
    pub max_pad: usize,
}

impl RowInfo {
    /// Number of pads in the row
    pub fn num_pads(&self) -> usize {
        self.max_pad + 1
    }

    /// Full width of the row along the pad direction (cm)
    pub fn width(&self) -> f64 {
        self.pad_width * self.num_pads() as f64
    }

    /// Centered u coordinate of a (possibly fractional) pad coordinate
    pub fn pad_to_u(&self, pad: f64) -> f64 {
        (pad + 0.5) * self.pad_width - 0.5 * self.width()
    }
}

/// Build session for [`RowGeometry`]: record every row exactly once, then
/// [`finish`](Self::finish). Queries only exist on the finished type.
#[derive(Debug)]
pub struct RowGeometryBuilder {
    num_slices: usize,
    z_length: f64,
    rows: Vec<Option<RowInfo>>,
}

impl RowGeometryBuilder {
    /// Begin a build session for `num_rows` rows over `num_slices` angular
    /// slices
    pub fn new(num_rows: usize, num_slices: usize) -> Self {
        Self {
            num_slices,
            z_length: 0.0,
            rows: vec![None; num_rows],
        }
    }

    /// Set the drift length of the sensitive volume (cm)
    pub fn set_z_length(&mut self, z_length: f64) {
        self.z_length = z_length;
    }

    /// Record one row's constants. Each row index must be set exactly once.
    pub fn set_row(
        &mut self,
        row: usize,
        x: f64,
        pad_count: usize,
        pad_width: f64,
    ) -> Result<(), ConfigError> {
        let num_rows = self.rows.len();
        let slot = self
            .rows
            .get_mut(row)
            .ok_or(ConfigError::RowOutOfRange { row, num_rows })?;
        if slot.is_some() {
            return Err(ConfigError::DuplicateRow { row });
        }
        if pad_count == 0 {
            return Err(ConfigError::InvalidParameter {
                what: "pad count",
                value: pad_count as f64,
            });
        }
        if !(pad_width > 0.0) {
            return Err(ConfigError::InvalidParameter {
                what: "pad width",
                value: pad_width,
            });
        }
        *slot = Some(RowInfo {
            x,
            pad_width,
            max_pad: pad_count - 1,
        });
        Ok(())
    }

    /// Close the build session, yielding the immutable geometry
    pub fn finish(self) -> Result<RowGeometry, ConfigError> {
        if self.num_slices == 0 {
            return Err(ConfigError::InvalidParameter {
                what: "slice count",
                value: 0.0,
            });
        }
        if !(self.z_length > 0.0) {
            return Err(ConfigError::InvalidParameter {
                what: "detector z length",
                value: self.z_length,
            });
        }
        let mut rows = Vec::with_capacity(self.rows.len());
        for (row, info) in self.rows.into_iter().enumerate() {
            rows.push(info.ok_or(ConfigError::MissingRow { row })?);
        }
        Ok(RowGeometry {
            num_slices: self.num_slices,
            z_length: self.z_length,
            rows,
        })
    }
}

/// Immutable per-row geometry with slice-local coordinate conversions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowGeometry {
    num_slices: usize,
    z_length: f64,
    rows: Vec<RowInfo>,
}

impl RowGeometry {
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn num_slices(&self) -> usize {
        self.num_slices
    }

    /// Drift length of the sensitive volume (cm)
    pub fn z_length(&self) -> f64 {
        self.z_length
    }

    pub fn row_info(&self, row: usize) -> Option<&RowInfo> {
        self.rows.get(row)
    }

    /// Azimuthal angle of a slice's local x axis
    pub fn slice_angle(&self, slice: usize) -> f64 {
        TAU * (slice as f64 + 0.5) / self.num_slices as f64
    }

    /// Rotate slice-local Cartesian coordinates into the global frame
    pub fn conv_local_to_global(&self, slice: usize, x: f64, y: f64, z: f64) -> (f64, f64, f64) {
        let (sin, cos) = self.slice_angle(slice).sin_cos();
        (x * cos - y * sin, x * sin + y * cos, z)
    }

    /// Rotate global Cartesian coordinates into a slice's local frame
    pub fn conv_global_to_local(
        &self,
        slice: usize,
        gx: f64,
        gy: f64,
        gz: f64,
    ) -> (f64, f64, f64) {
        let (sin, cos) = self.slice_angle(slice).sin_cos();
        (gx * cos + gy * sin, -gx * sin + gy * cos, gz)
    }

    /// Convert pad-normalized (u, v) to local Cartesian (y, z): u runs along
    /// the pad direction, v is the drift length from the readout plane
    pub fn conv_uv_to_yz(&self, u: f64, v: f64) -> (f64, f64) {
        (u, self.z_length - v)
    }

    /// Convert local Cartesian (y, z) back to pad-normalized (u, v); exact
    /// inverse of [`conv_uv_to_yz`](Self::conv_uv_to_yz)
    pub fn conv_yz_to_uv(&self, y: f64, z: f64) -> (f64, f64) {
        (y, self.z_length - z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn geometry() -> RowGeometry {
        let mut builder = RowGeometryBuilder::new(4, 18);
        builder.set_z_length(250.0);
        for row in 0..4 {
            builder
                .set_row(row, 85.0 + 0.5 * row as f64, 20, 0.4)
                .unwrap();
        }
        builder.finish().unwrap()
    }

    #[test]
    fn local_global_round_trip() {
        let geo = geometry();
        for slice in 0..geo.num_slices() {
            for &(x, y, z) in &[(86.5, -3.2, 120.0), (100.0, 0.0, 0.0), (85.0, 4.0, 249.9)] {
                let (gx, gy, gz) = geo.conv_local_to_global(slice, x, y, z);
                let (lx, ly, lz) = geo.conv_global_to_local(slice, gx, gy, gz);
                assert_abs_diff_eq!(lx, x, epsilon = 1e-6);
                assert_abs_diff_eq!(ly, y, epsilon = 1e-6);
                assert_abs_diff_eq!(lz, z, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn uv_yz_round_trip() {
        let geo = geometry();
        for &(y, z) in &[(0.2, 245.0), (-3.9, 0.1), (0.0, 125.0)] {
            let (u, v) = geo.conv_yz_to_uv(y, z);
            let (y2, z2) = geo.conv_uv_to_yz(u, v);
            assert_abs_diff_eq!(y2, y, epsilon = 1e-6);
            assert_abs_diff_eq!(z2, z, epsilon = 1e-6);
        }
    }

    #[test]
    fn pad_centres_are_symmetric_about_the_row_middle() {
        let geo = geometry();
        let info = geo.row_info(0).unwrap();
        assert_abs_diff_eq!(info.pad_to_u(10.0), 0.2, epsilon = 1e-12);
        assert_abs_diff_eq!(
            info.pad_to_u(0.0),
            -info.pad_to_u(info.max_pad as f64),
            epsilon = 1e-12
        );
    }

    #[test]
    fn builder_rejects_out_of_range_and_duplicate_rows() {
        let mut builder = RowGeometryBuilder::new(2, 18);
        builder.set_z_length(250.0);
        assert!(matches!(
            builder.set_row(2, 85.0, 20, 0.4),
            Err(ConfigError::RowOutOfRange { row: 2, .. })
        ));
        builder.set_row(0, 85.0, 20, 0.4).unwrap();
        assert!(matches!(
            builder.set_row(0, 85.0, 20, 0.4),
            Err(ConfigError::DuplicateRow { row: 0 })
        ));
    }

    #[test]
    fn finish_requires_every_row() {
        let mut builder = RowGeometryBuilder::new(2, 18);
        builder.set_z_length(250.0);
        builder.set_row(0, 85.0, 20, 0.4).unwrap();
        assert!(matches!(
            builder.finish(),
            Err(ConfigError::MissingRow { row: 1 })
        ));
    }
}
