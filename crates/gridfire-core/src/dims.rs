//! Launch geometry: grid/block extents and backend-declared maxima.

use std::fmt;

use crate::error::{GridfireError, Result};

/// Three-dimensional launch extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dim3 {
    /// Extent along x.
    pub x: u32,
    /// Extent along y.
    pub y: u32,
    /// Extent along z.
    pub z: u32,
}

impl Dim3 {
    /// Create an extent from three axes.
    pub const fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    /// One-dimensional extent `(n, 1, 1)`.
    pub const fn linear(n: u32) -> Self {
        Self { x: n, y: 1, z: 1 }
    }

    /// Total number of elements in the extent.
    pub const fn count(&self) -> u64 {
        self.x as u64 * self.y as u64 * self.z as u64
    }

    /// The extent as an `(x, y, z)` tuple.
    pub const fn as_tuple(&self) -> (u32, u32, u32) {
        (self.x, self.y, self.z)
    }

    /// Per-axis view, indexed x = 0, y = 1, z = 2.
    pub const fn as_array(&self) -> [u32; 3] {
        [self.x, self.y, self.z]
    }
}

impl From<(u32, u32, u32)> for Dim3 {
    fn from((x, y, z): (u32, u32, u32)) -> Self {
        Self { x, y, z }
    }
}

impl From<u32> for Dim3 {
    fn from(n: u32) -> Self {
        Self::linear(n)
    }
}

impl fmt::Display for Dim3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Per-axis launch maxima declared by a backend.
///
/// Exceeding a maximum is a caller error surfaced before any device work is
/// enqueued; dimensions are never clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchLimits {
    /// Maximum grid extent per axis.
    pub grid_max: [u32; 3],
    /// Maximum block extent per axis.
    pub block_max: [u32; 3],
}

impl LaunchLimits {
    /// Limits declared by the CUDA backend, shared by the emulated variant
    /// so validation is mode-independent.
    pub const CUDA: Self = Self {
        grid_max: [65_535, 65_535, 2_147_483_647],
        block_max: [64, 1024, 1024],
    };

    /// Validate a grid/block pair against these limits.
    ///
    /// Zero-valued axes are rejected along with axes above the maximum.
    pub fn validate(&self, grid: Dim3, block: Dim3) -> Result<()> {
        const AXES: [char; 3] = ['x', 'y', 'z'];

        for (axis, (&value, &max)) in grid.as_array().iter().zip(&self.grid_max).enumerate() {
            if value == 0 || value > max {
                return Err(GridfireError::launch(format!(
                    "grid.{} = {} outside valid range 1..={}",
                    AXES[axis], value, max
                )));
            }
        }
        for (axis, (&value, &max)) in block.as_array().iter().zip(&self.block_max).enumerate() {
            if value == 0 || value > max {
                return Err(GridfireError::launch(format!(
                    "block.{} = {} outside valid range 1..={}",
                    AXES[axis], value, max
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dim3_conversions() {
        let d: Dim3 = 256.into();
        assert_eq!(d, Dim3::new(256, 1, 1));
        let d: Dim3 = (2, 3, 4).into();
        assert_eq!(d.count(), 24);
        assert_eq!(d.as_tuple(), (2, 3, 4));
    }

    #[test]
    fn limits_accept_valid_shapes() {
        let limits = LaunchLimits::CUDA;
        assert!(limits.validate(Dim3::linear(65_535), Dim3::new(64, 1, 1)).is_ok());
        assert!(limits
            .validate(Dim3::new(1, 1, 2_147_483_647), Dim3::new(1, 1024, 1))
            .is_ok());
    }

    #[test]
    fn limits_reject_overflow_before_enqueue() {
        let limits = LaunchLimits::CUDA;
        let err = limits
            .validate(Dim3::linear(65_536), Dim3::linear(1))
            .unwrap_err();
        assert!(matches!(err, GridfireError::Launch(_)));

        let err = limits
            .validate(Dim3::linear(1), Dim3::new(65, 1, 1))
            .unwrap_err();
        assert!(matches!(err, GridfireError::Launch(_)));
    }

    #[test]
    fn limits_reject_zero_axes() {
        let limits = LaunchLimits::CUDA;
        assert!(limits.validate(Dim3::new(0, 1, 1), Dim3::linear(1)).is_err());
        assert!(limits.validate(Dim3::linear(1), Dim3::new(1, 0, 1)).is_err());
    }
}
