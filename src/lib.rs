//! Invismark - robust verification engine for invisible image watermarks
//!
//! The frequency-domain primitive that embeds and extracts watermark bits is
//! unreliable by nature: it can extract at the wrong length, invert bits, or
//! mix in transform noise. This crate reconstructs a best-effort answer from
//! multiple degraded extraction attempts: it enumerates candidate
//! bit-lengths around the expected payload, decodes each attempt with an
//! ordered list of fallback encodings, scores the decodes with four
//! independent similarity metrics, and aggregates them into one confidence
//! verdict. A scan mode ranks plausible decodes when the watermark content
//! is unknown.
//!
//! The extraction primitive itself, image file I/O, and the CLI/REST layers
//! live outside this crate; the engine sees the primitive only through the
//! [`extract::BitExtractor`] trait and an already-decoded pixel buffer.
//!
//! # Example
//!
//! ```
//! use invismark::{MockExtractor, VerifyOptions, WatermarkDetector};
//!
//! // In production the extractor wraps the external watermarking library;
//! // the mock serves a known payload for demonstration.
//! let detector = WatermarkDetector::new(MockExtractor::embedding("SocialNetwork0"));
//! let image = image::DynamicImage::new_rgb8(64, 64);
//!
//! let result = detector
//!     .verify(&image, "SocialNetwork0", &VerifyOptions::default())
//!     .unwrap();
//! assert!(result.matched);
//! assert_eq!(result.confidence, 100.0);
//! ```

pub mod decode;
pub mod detect;
pub mod error;
pub mod extract;
pub mod lengths;
pub mod scan;
pub mod score;

// Re-export main types for convenience
pub use decode::{DecodeOutcome, DecodedCandidate, TextEncoding};
pub use detect::{
    BestCandidate, CandidateTrace, DetectionResult, MatchReason, MetricWeights, VerifyOptions,
    WatermarkDetector, DEFAULT_DECISION_THRESHOLD, DEFAULT_SEARCH_RADIUS_BITS,
};
pub use error::{Result, WatermarkError};
pub use extract::{BitExtractor, ExtractionAdapter, FnExtractor, MockExtractor, RawCandidate};
pub use scan::{ScanCandidate, ScanOptions};
pub use score::MatchMetrics;
