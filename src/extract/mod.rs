//! Bit extraction boundary.
//!
//! The frequency-domain watermarking primitive lives outside this crate; the
//! engine only ever sees it through the [`BitExtractor`] trait. The
//! [`ExtractionAdapter`] wraps a trait implementation and turns every way the
//! primitive can misbehave (errors, empty output, length mismatches,
//! overruns of the caller's time budget) into a recorded per-candidate
//! failure that never aborts the probe sequence.
//!
//! Implementations that lazily build transform state (DCT matrices, model
//! weights) must initialize that state once and remain usable across calls;
//! the `Send + Sync` bound makes them shareable across probing threads.

mod mock;

pub use mock::{text_bits, MockExtractor};

use std::time::{Duration, Instant};

use image::DynamicImage;
use tracing::{debug, instrument};

use crate::error::Result;

/// A source of raw watermark bits.
///
/// `extract` asks the underlying primitive to recover exactly `bit_length`
/// bits from the image. The returned vector holds one `0` or `1` per bit.
/// The call is treated as blocking and non-cancellable; the adapter enforces
/// the caller's time budget after the fact.
pub trait BitExtractor: Send + Sync {
    fn extract(&self, image: &DynamicImage, bit_length: usize) -> Result<Vec<u8>>;
}

/// Adapter over a plain closure matching the extraction contract.
///
/// Lets callers plug in the external primitive without a named type:
///
/// ```
/// use invismark::extract::{BitExtractor, FnExtractor};
///
/// let extractor = FnExtractor::new(|_image, bit_length| Ok(vec![0u8; bit_length]));
/// let image = image::DynamicImage::new_rgb8(4, 4);
/// assert_eq!(extractor.extract(&image, 16).unwrap().len(), 16);
/// ```
pub struct FnExtractor<F>(F);

impl<F> FnExtractor<F>
where
    F: Fn(&DynamicImage, usize) -> Result<Vec<u8>> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> BitExtractor for FnExtractor<F>
where
    F: Fn(&DynamicImage, usize) -> Result<Vec<u8>> + Send + Sync,
{
    fn extract(&self, image: &DynamicImage, bit_length: usize) -> Result<Vec<u8>> {
        (self.0)(image, bit_length)
    }
}

/// Outcome of one extraction attempt.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ExtractionOutcome {
    /// The primitive returned a bit sequence of the requested length.
    Success { bits: Vec<u8> },
    /// The primitive errored, returned a malformed sequence, or overran the
    /// time budget. The reason is kept for the diagnostic trace.
    Failure { reason: String },
}

/// Raw bits recovered (or not) for one candidate bit-length.
///
/// Owned exclusively by the pipeline invocation that created it and discarded
/// after scoring.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RawCandidate {
    pub bit_length: usize,
    pub outcome: ExtractionOutcome,
}

impl RawCandidate {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ExtractionOutcome::Success { .. })
    }

    /// The raw bits, if extraction succeeded.
    pub fn bits(&self) -> Option<&[u8]> {
        match &self.outcome {
            ExtractionOutcome::Success { bits } => Some(bits),
            ExtractionOutcome::Failure { .. } => None,
        }
    }

    /// The failure reason, if extraction failed.
    pub fn failure_reason(&self) -> Option<&str> {
        match &self.outcome {
            ExtractionOutcome::Success { .. } => None,
            ExtractionOutcome::Failure { reason } => Some(reason),
        }
    }
}

/// Wraps a [`BitExtractor`] and normalizes its failure modes.
///
/// The adapter performs no interpretation of the bits. Its single job is to
/// call the primitive once per candidate length and classify the result.
pub struct ExtractionAdapter<E> {
    extractor: E,
}

impl<E: BitExtractor> ExtractionAdapter<E> {
    pub fn new(extractor: E) -> Self {
        Self { extractor }
    }

    /// Attempt extraction at one candidate length.
    ///
    /// Always returns a [`RawCandidate`]; every failure mode of the primitive
    /// is folded into [`ExtractionOutcome::Failure`]:
    ///
    /// - the primitive returned an error
    /// - the bit sequence is empty or not of the requested length
    /// - the sequence contains values other than 0 and 1
    /// - the call took longer than `timeout` (the call itself cannot be
    ///   cancelled, so the budget is checked on return)
    #[instrument(level = "debug", skip(self, image))]
    pub fn probe(
        &self,
        image: &DynamicImage,
        bit_length: usize,
        timeout: Option<Duration>,
    ) -> RawCandidate {
        let start = Instant::now();
        let result = self.extractor.extract(image, bit_length);
        let elapsed = start.elapsed();

        let outcome = match result {
            Err(e) => ExtractionOutcome::Failure {
                reason: e.to_string(),
            },
            Ok(_) if timeout.is_some_and(|t| elapsed > t) => ExtractionOutcome::Failure {
                reason: format!("extraction timed out after {elapsed:?}"),
            },
            Ok(bits) if bits.is_empty() => ExtractionOutcome::Failure {
                reason: "empty bit sequence".into(),
            },
            Ok(bits) if bits.len() != bit_length => ExtractionOutcome::Failure {
                reason: format!("length mismatch: requested {bit_length}, got {}", bits.len()),
            },
            Ok(bits) if bits.iter().any(|&b| b > 1) => ExtractionOutcome::Failure {
                reason: "bit sequence contains non-binary values".into(),
            },
            Ok(bits) => ExtractionOutcome::Success { bits },
        };

        if let ExtractionOutcome::Failure { reason } = &outcome {
            debug!(bit_length, %reason, "candidate extraction failed");
        }

        RawCandidate {
            bit_length,
            outcome,
        }
    }

    pub fn extractor(&self) -> &E {
        &self.extractor
    }
}
