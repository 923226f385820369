// THEORY:
// Every failure in the processor is local: it terminates the operation that
// raised it and never the session. The taxonomy below is the single error type
// shared by the buffer layer, the effect library and the animation controller,
// so hosts only ever match on one enum.

use crate::core_modules::geometry::GeometricOp;

/// Convenience result type used across the processor.
pub type ProcessorResult<T> = Result<T, ProcessorError>;

/// Top-level error taxonomy.
#[derive(thiserror::Error, Debug)]
pub enum ProcessorError {
    /// Zero-sized or undecodable source image.
    #[error("invalid image: {0}")]
    InvalidImage(String),

    /// A transformed byte sequence no longer matches its reference buffer.
    /// Effects preserve length, so this is a defect rather than a user error.
    #[error("length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    /// The selected effect is not registered in the library.
    #[error("unknown effect: {0:?}")]
    UnknownEffect(String),

    /// A command that needs a loaded buffer was issued before one exists.
    #[error("no image loaded")]
    NoImageLoaded,

    /// A declared operation without a defined transform.
    #[error("{0} is not implemented")]
    NotImplemented(GeometricOp),

    /// The buffer cannot be addressed as 4-byte pixels.
    #[error("stride {stride} is not addressable as 4-byte pixels ({bits_per_pixel} bits per pixel)")]
    MisalignedStride { stride: usize, bits_per_pixel: u16 },

    #[error("unsupported pixel format: {0} bits per pixel")]
    UnsupportedFormat(u16),

    #[error("animation speed {0} is outside 1..=10")]
    InvalidSpeed(u8),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),
}

impl ProcessorError {
    /// Build a [`ProcessorError::InvalidImage`] value.
    pub fn invalid_image(msg: impl Into<String>) -> Self {
        Self::InvalidImage(msg.into())
    }

    /// Build a [`ProcessorError::InvalidConfig`] value.
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Errors the session recovers from by leaving its state untouched.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::UnknownEffect(_) | Self::NoImageLoaded | Self::NotImplemented(_)
        )
    }
}
