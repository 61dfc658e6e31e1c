//! Error types for residue analysis and erasing.
//!
//! Only buffer-contract violations are errors. Geometric failures
//! (too few keypoints, degenerate hulls) and no-op selections are reported
//! as status values by the modules that produce them.

use thiserror::Error;

/// Result type alias for eraser operations
pub type Result<T> = std::result::Result<T, EraserError>;

/// Hard failures propagated to the caller. No pixel is mutated when one of
/// these is returned.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EraserError {
    /// Width or height is zero
    #[error("Empty buffer: {width}x{height}")]
    EmptyBuffer { width: usize, height: usize },

    /// Byte length does not match width * height * 4
    #[error("Malformed RGBA buffer: expected {expected} bytes for {width}x{height}, got {actual}")]
    MalformedBuffer {
        width: usize,
        height: usize,
        expected: usize,
        actual: usize,
    },

    /// An operation was requested for a raster of different dimensions
    #[error("Dimension mismatch: buffer is {buffer_width}x{buffer_height}, operation expects {width}x{height}")]
    DimensionMismatch {
        buffer_width: usize,
        buffer_height: usize,
        width: usize,
        height: usize,
    },

    /// A pixel coordinate outside the raster
    #[error("Pixel ({x}, {y}) is outside the {width}x{height} raster")]
    OutOfBounds {
        x: i64,
        y: i64,
        width: usize,
        height: usize,
    },

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A background analysis was cancelled before completion
    #[error("Analysis cancelled (generation {generation})")]
    Cancelled { generation: u64 },

    /// A background analysis panicked; no result was produced
    #[error("Analysis panicked (generation {generation}): {message}")]
    AnalysisPanicked { generation: u64, message: String },
}

impl EraserError {
    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
    ) -> Self {
        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {})",
            parameter, value, valid_range
        ))
    }

    /// Create an out-of-bounds error for a signed coordinate pair
    pub fn out_of_bounds(x: i64, y: i64, width: usize, height: usize) -> Self {
        Self::OutOfBounds {
            x,
            y,
            width,
            height,
        }
    }

    /// True for errors caused by the caller's input rather than by the
    /// background worker
    pub fn is_input_error(&self) -> bool {
        !matches!(self, Self::Cancelled { .. } | Self::AnalysisPanicked { .. })
    }
}
