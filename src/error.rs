// THEORY:
// A single error enum for the whole engine. The tracker distinguishes between
// things that went wrong (bad arguments, wrong image formats, resource limits)
// and things that simply did not happen this frame (object too small, no blob).
// Only the first kind lives here; the second kind is expressed as ordinary
// return values (`Extraction::TooSmall`, `ShapeUpdate::Lost`, `Option`) so the
// control loop can react without unwinding.

use crate::core_modules::image::ImageFormat;

/// Errors raised by the segmentation and tracking engine.
#[derive(Debug, thiserror::Error)]
pub enum TrackError {
    /// A parameter is out of its legal range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The image handed to an operation has the wrong pixel format.
    #[error("format mismatch: expected {expected:?}, got {actual:?}")]
    FormatMismatch {
        expected: ImageFormat,
        actual: ImageFormat,
    },

    /// Two images that must share dimensions do not.
    #[error("size mismatch: {left_width}x{left_height} vs {right_width}x{right_height}")]
    SizeMismatch {
        left_width: usize,
        left_height: usize,
        right_width: usize,
        right_height: usize,
    },

    /// A pixel buffer does not match `width * height * channels`.
    #[error("buffer of {len} values does not fit a {width}x{height} {format:?} image")]
    BufferLength {
        len: usize,
        width: usize,
        height: usize,
        format: ImageFormat,
    },

    /// The labeler ran out of blob ids.
    #[error("too many blobs: at most {limit} can be labelled")]
    TooManyBlobs { limit: usize },

    /// The object file could not be parsed.
    #[error("object file line {line}: {reason}")]
    ObjectFile { line: usize, reason: String },

    /// The calibration sample could not be parsed or derived.
    #[error("calibration: {0}")]
    Calibration(String),

    #[error("config: {0}")]
    Config(#[from] toml::de::Error),

    #[error("image codec: {0}")]
    Image(#[from] image::ImageError),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl TrackError {
    /// Shortcut used by every format check in the engine.
    pub fn expect_format(expected: ImageFormat, actual: ImageFormat) -> Result<(), TrackError> {
        if expected == actual {
            Ok(())
        } else {
            Err(TrackError::FormatMismatch { expected, actual })
        }
    }
}
