use thiserror::Error;

#[derive(Error, Debug)]
pub enum WatermarkError {
    /// The caller supplied an input the engine cannot probe: an empty
    /// expected text, a zero-area image, or a degenerate length range.
    /// Rejected before any extraction is attempted.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Metric weights or decision threshold outside their documented domain.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The extraction primitive failed for one candidate length.
    ///
    /// This variant never escapes `verify` or `scan`: the adapter absorbs it
    /// into the per-candidate trace and the probe sequence continues.
    #[error("extraction failed: {0}")]
    ExtractionFailure(String),
}

pub type Result<T> = std::result::Result<T, WatermarkError>;
