//! Error types for backdrop.
//!
//! Per-frame operations are total and never fail. Everything that can fail
//! does so before the first frame (configuration validation, GPU setup) or
//! outside the simulation (image export), and each of those domains gets its
//! own error type.

use thiserror::Error;

/// Configuration rejected at construction time.
///
/// Returned by every `validate()` method and by constructors that accept a
/// configuration. Once a configuration has been accepted, the hot path does
/// not re-check it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// A parameter that must be finite was NaN or infinite.
    #[error("{name} must be finite")]
    NonFinite {
        /// Parameter name.
        name: &'static str,
    },

    /// A parameter that must be strictly positive was zero or negative.
    #[error("{name} must be > 0, got {value}")]
    NonPositive {
        /// Parameter name.
        name: &'static str,
        /// Rejected value.
        value: f32,
    },

    /// A parameter that must be non-negative was negative.
    #[error("{name} must be >= 0, got {value}")]
    Negative {
        /// Parameter name.
        name: &'static str,
        /// Rejected value.
        value: f32,
    },

    /// A parameter fell outside its closed range.
    #[error("{name} must be in [{min}, {max}], got {value}")]
    OutOfRange {
        /// Parameter name.
        name: &'static str,
        /// Rejected value.
        value: f32,
        /// Inclusive lower bound.
        min: f32,
        /// Inclusive upper bound.
        max: f32,
    },

    /// `min > max` for a range parameter.
    #[error("{name} range is inverted: min {min} > max {max}")]
    InvertedRange {
        /// Parameter name.
        name: &'static str,
        /// Range minimum.
        min: f32,
        /// Range maximum.
        max: f32,
    },

    /// The particle pool must contain at least one slot.
    #[error("particle count must be at least 1")]
    NoParticles,

    /// Noise octave count outside `1..=MAX_OCTAVES`.
    #[error("noise octaves must be in 1..={max}, got {octaves}")]
    Octaves {
        /// Rejected octave count.
        octaves: u32,
        /// Largest accepted count.
        max: u32,
    },

    /// Fluid grid too small to have an interior.
    #[error("fluid grid must be at least {min}x{min}, got {width}x{height}")]
    GridTooSmall {
        /// Requested width.
        width: usize,
        /// Requested height.
        height: usize,
        /// Minimum cells per axis.
        min: usize,
    },

    /// A live fluid solver cannot change its grid size.
    #[error("fluid grid is {width}x{height}; resizing requires a new solver")]
    GridResize {
        /// Current width.
        width: usize,
        /// Current height.
        height: usize,
    },

    /// Output image with a zero dimension.
    #[error("render resolution must be non-zero, got {width}x{height}")]
    EmptyResolution {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
    },

    /// Camera position coincides with its target, or `up` is parallel to
    /// the view direction.
    #[error("camera basis is degenerate")]
    DegenerateCamera,
}

/// Errors from the GPU particle backend.
#[derive(Debug, Error)]
pub enum GpuError {
    /// No compatible GPU adapter found.
    #[error("no compatible GPU adapter found; a Vulkan/Metal/DX12/GL capable device is required")]
    NoAdapter,

    /// The adapter refused to create a device.
    #[error("failed to create GPU device: {0}")]
    DeviceCreation(#[from] wgpu::RequestDeviceError),

    /// Reading a buffer back to the CPU failed.
    #[error("failed to map GPU buffer: {0}")]
    BufferMapping(String),

    /// More attractors than the buffer was sized for.
    #[error("{requested} attractors exceed the GPU buffer capacity of {capacity}")]
    AttractorCapacity {
        /// Attractors passed to the dispatch.
        requested: usize,
        /// Slots allocated at construction.
        capacity: usize,
    },

    /// Upload size does not match the particle buffer.
    #[error("expected {expected} particles, got {actual}")]
    ParticleCount {
        /// Slots in the GPU buffer.
        expected: usize,
        /// Particles supplied.
        actual: usize,
    },

    /// Parameters rejected before touching the device.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors writing simulation output to disk.
#[derive(Debug, Error)]
pub enum ExportError {
    /// PNG encoding or file write failed.
    #[error("failed to write image: {0}")]
    Image(#[from] image::ImageError),

    /// The pixel buffer does not match the declared dimensions.
    #[error("pixel buffer of length {len} does not match {width}x{height}")]
    Dimensions {
        /// Image width.
        width: u32,
        /// Image height.
        height: u32,
        /// Buffer length in pixels.
        len: usize,
    },
}

/// Check that a float is finite.
pub(crate) fn ensure_finite(name: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::NonFinite { name })
    }
}

/// Check that a float is finite and strictly positive.
pub(crate) fn ensure_positive(name: &'static str, value: f32) -> Result<(), ConfigError> {
    ensure_finite(name, value)?;
    if value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NonPositive { name, value })
    }
}

/// Check that a float is finite and non-negative.
pub(crate) fn ensure_non_negative(name: &'static str, value: f32) -> Result<(), ConfigError> {
    ensure_finite(name, value)?;
    if value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Negative { name, value })
    }
}

/// Check that a float lies in `[min, max]`.
pub(crate) fn ensure_in_range(
    name: &'static str,
    value: f32,
    min: f32,
    max: f32,
) -> Result<(), ConfigError> {
    ensure_finite(name, value)?;
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange { name, value, min, max })
    }
}

/// Check that every component of a vector is finite.
pub(crate) fn ensure_finite_vec(name: &'static str, v: impl AsRef<[f32]>) -> Result<(), ConfigError> {
    if v.as_ref().iter().all(|c| c.is_finite()) {
        Ok(())
    } else {
        Err(ConfigError::NonFinite { name })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_positive() {
        assert!(ensure_positive("mass", 1.0).is_ok());
        assert_eq!(
            ensure_positive("mass", 0.0),
            Err(ConfigError::NonPositive { name: "mass", value: 0.0 })
        );
        assert_eq!(
            ensure_positive("mass", f32::NAN),
            Err(ConfigError::NonFinite { name: "mass" })
        );
    }

    #[test]
    fn test_ensure_in_range() {
        assert!(ensure_in_range("restitution", 0.5, 0.0, 1.0).is_ok());
        assert!(ensure_in_range("restitution", 1.0, 0.0, 1.0).is_ok());
        assert!(matches!(
            ensure_in_range("restitution", 1.5, 0.0, 1.0),
            Err(ConfigError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_ensure_finite_vec() {
        assert!(ensure_finite_vec("gravity", [0.0, -9.8, 0.0]).is_ok());
        assert!(ensure_finite_vec("gravity", [0.0, f32::INFINITY, 0.0]).is_err());
    }

    #[test]
    fn test_error_messages() {
        let err = ConfigError::GridTooSmall { width: 2, height: 64, min: 4 };
        assert_eq!(err.to_string(), "fluid grid must be at least 4x4, got 2x64");

        let err = GpuError::AttractorCapacity { requested: 9, capacity: 8 };
        assert!(err.to_string().contains("capacity of 8"));
    }
}
