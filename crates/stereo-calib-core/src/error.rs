/// Errors shared by every stage of the calibration pipeline.
///
/// `DetectionFailure` is recoverable during mono calibration (the image is
/// excluded and recorded); every other variant aborts the run it came from.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CalibError {
    #[error("calibration pattern not found in {image}")]
    DetectionFailure { image: String },

    #[error("insufficient data: {what} (got {got}, need at least {need})")]
    InsufficientData {
        what: &'static str,
        got: usize,
        need: usize,
    },

    #[error("input mismatch: {0}")]
    InputMismatch(String),

    #[error("invalid chessboard pattern: {0}")]
    InvalidPattern(String),

    #[error("degenerate geometry: {0}")]
    DegenerateGeometry(&'static str),
}

pub type CalibResult<T> = Result<T, CalibError>;
