//! Confidence aggregation and the verification entry point.
//!
//! Each scored candidate collapses its four similarity metrics into one
//! confidence value through a fixed weighted combination; the candidate with
//! the highest confidence decides the verdict. Weights are tunable
//! configuration rather than hard-coded constants; the defaults are
//! calibrated so that the reference trace (length 100%, charset 53.8%,
//! pattern 100%, signature 100%) lands at confidence 85.0.

use std::time::Duration;

use image::DynamicImage;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::decode::{decode_candidate, DecodeOutcome, TextEncoding};
use crate::error::{Result, WatermarkError};
use crate::extract::{BitExtractor, ExtractionAdapter, RawCandidate};
use crate::lengths;
use crate::score::{score, MatchMetrics};

/// Confidence at or above which a candidate is reported as a match.
pub const DEFAULT_DECISION_THRESHOLD: f64 = 50.0;

/// Default symmetric search radius around the anchored bit-length.
pub const DEFAULT_SEARCH_RADIUS_BITS: usize = 32;

/// Weights of the four similarity metrics in the confidence combination.
///
/// Weights must be non-negative and sum to 1, so confidence is monotone
/// non-decreasing in every individual metric. The defaults reproduce the
/// reference trace exactly; deployments with different corruption profiles
/// can rebalance them via [`WatermarkDetector::with_weights`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricWeights {
    pub length: f64,
    pub charset: f64,
    pub pattern: f64,
    pub signature: f64,
}

impl Default for MetricWeights {
    fn default() -> Self {
        Self {
            length: 0.25,
            charset: 0.325,
            pattern: 0.25,
            signature: 0.175,
        }
    }
}

impl MetricWeights {
    /// Check that every weight is non-negative and the sum is 1.
    pub fn validate(&self) -> Result<()> {
        let weights = [self.length, self.charset, self.pattern, self.signature];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(WatermarkError::InvalidConfig(
                "metric weights must be finite and non-negative".into(),
            ));
        }
        let sum: f64 = weights.iter().sum();
        if (sum - 1.0).abs() > 1e-9 {
            return Err(WatermarkError::InvalidConfig(format!(
                "metric weights must sum to 1, got {sum}"
            )));
        }
        Ok(())
    }

    /// Collapse metrics into a confidence value in `[0, 100]`.
    pub fn combine(&self, metrics: &MatchMetrics) -> f64 {
        let weighted = self.length * metrics.length
            + self.charset * metrics.charset
            + self.pattern * metrics.pattern
            + self.signature * metrics.signature;
        (weighted * 100.0).clamp(0.0, 100.0)
    }
}

/// Per-call options for [`WatermarkDetector::verify`].
#[derive(Debug, Clone)]
pub struct VerifyOptions {
    /// Symmetric probe window radius around the anchored length, in bits.
    pub radius_bits: usize,
    /// Override of the detector's decision threshold for this call.
    pub threshold: Option<f64>,
    /// Include the full candidate trace in the result.
    pub include_trace: bool,
    /// Time budget per extraction attempt. The primitive call itself cannot
    /// be cancelled; an overrun is recorded as a candidate failure.
    pub timeout: Option<Duration>,
    /// Probe candidate lengths on a worker pool. Leave off unless the
    /// extraction primitive is known to be reentrant.
    pub parallel: bool,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            radius_bits: DEFAULT_SEARCH_RADIUS_BITS,
            threshold: None,
            include_trace: false,
            timeout: None,
            parallel: false,
        }
    }
}

/// One probed candidate as recorded in the diagnostic trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CandidateTrace {
    /// Extraction failed at this length; the pipeline moved on.
    Failed { bit_length: usize, reason: String },
    /// Extraction and decoding succeeded; the candidate was scored.
    Scored {
        bit_length: usize,
        text: String,
        encoding: TextEncoding,
        decode: DecodeOutcome,
        metrics: MatchMetrics,
        confidence: f64,
    },
}

impl CandidateTrace {
    pub fn bit_length(&self) -> usize {
        match self {
            CandidateTrace::Failed { bit_length, .. } => *bit_length,
            CandidateTrace::Scored { bit_length, .. } => *bit_length,
        }
    }
}

/// The winning candidate of a detection call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestCandidate {
    pub bit_length: usize,
    pub text: String,
    pub encoding: TextEncoding,
    pub decode: DecodeOutcome,
}

/// A similarity metric of the best candidate, named for reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchReason {
    pub metric: String,
    pub value: f64,
}

/// Outcome of one verification call. Immutable after construction and not
/// persisted beyond it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    /// Whether the best candidate's confidence reached the threshold.
    pub matched: bool,
    /// Confidence of the best candidate, in `[0, 100]`.
    pub confidence: f64,
    /// Best candidate, absent when every extraction failed.
    pub best: Option<BestCandidate>,
    /// The best candidate's metrics, ranked descending by value.
    pub reasons: Vec<MatchReason>,
    /// Full per-candidate trace; populated only when requested.
    pub trace: Vec<CandidateTrace>,
    /// Every candidate length failed extraction. Distinct from a text
    /// mismatch: nothing could be read at all.
    pub total_extraction_failure: bool,
}

impl DetectionResult {
    /// One-line human-readable summary of the verdict.
    pub fn summary(&self) -> String {
        if self.total_extraction_failure {
            return "no match: extraction failed at every candidate length".into();
        }
        match &self.best {
            Some(best) => {
                let verdict = if self.matched { "match" } else { "no match" };
                let reasons = self
                    .reasons
                    .iter()
                    .map(|r| format!("{} {:.1}%", r.metric, r.value * 100.0))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!(
                    "{verdict}: confidence {:.1}, best candidate {:?} ({} bits, {}); {reasons}",
                    self.confidence, best.text, best.bit_length, best.encoding
                )
            }
            None => "no match: no candidate could be scored".into(),
        }
    }
}

/// Watermark verification engine.
///
/// Holds the extraction boundary plus the tunable scoring configuration.
/// Both entry points are synchronous, read-only on the image, and perform
/// no I/O of their own.
///
/// ```
/// use invismark::{MockExtractor, VerifyOptions, WatermarkDetector};
///
/// let image = image::DynamicImage::new_rgb8(64, 64);
/// let detector = WatermarkDetector::new(MockExtractor::embedding("SocialNetwork0"));
/// let result = detector
///     .verify(&image, "SocialNetwork0", &VerifyOptions::default())
///     .unwrap();
/// assert!(result.matched);
/// ```
pub struct WatermarkDetector<E> {
    adapter: ExtractionAdapter<E>,
    weights: MetricWeights,
    threshold: f64,
}

impl<E: BitExtractor> WatermarkDetector<E> {
    /// Create a detector with default weights and decision threshold.
    pub fn new(extractor: E) -> Self {
        Self {
            adapter: ExtractionAdapter::new(extractor),
            weights: MetricWeights::default(),
            threshold: DEFAULT_DECISION_THRESHOLD,
        }
    }

    /// Replace the metric weights. Fails on weights outside their domain.
    pub fn with_weights(mut self, weights: MetricWeights) -> Result<Self> {
        weights.validate()?;
        self.weights = weights;
        Ok(self)
    }

    /// Replace the default decision threshold (`[0, 100]`).
    pub fn with_threshold(mut self, threshold: f64) -> Result<Self> {
        validate_threshold(threshold)?;
        self.threshold = threshold;
        Ok(self)
    }

    pub fn weights(&self) -> &MetricWeights {
        &self.weights
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Decide whether `image` carries the watermark `expected`.
    ///
    /// Probes every candidate length in the window around the anchored
    /// length, decodes and scores whatever the extraction primitive returns,
    /// and aggregates the best candidate into a verdict. Per-candidate
    /// extraction failures are absorbed into the trace; an image that simply
    /// lacks the watermark produces a normal `matched = false` result, never
    /// an error.
    #[instrument(level = "info", skip_all, fields(expected_bytes = expected.len()))]
    pub fn verify(
        &self,
        image: &DynamicImage,
        expected: &str,
        options: &VerifyOptions,
    ) -> Result<DetectionResult> {
        if expected.is_empty() {
            return Err(WatermarkError::InvalidInput(
                "expected watermark text is empty".into(),
            ));
        }
        validate_image(image)?;
        let threshold = match options.threshold {
            Some(t) => {
                validate_threshold(t)?;
                t
            }
            None => self.threshold,
        };

        let candidates = lengths::anchored(expected.len(), options.radius_bits);
        debug!(
            candidates = candidates.len(),
            radius_bits = options.radius_bits,
            "probing candidate lengths"
        );

        let raws = self.probe_lengths(image, &candidates, options.timeout, options.parallel);

        let mut trace = Vec::with_capacity(raws.len());
        let mut best: Option<(f64, BestCandidate, MatchMetrics)> = None;

        // Candidates arrive ordered by distance from the anchored length,
        // shorter first on ties. Strict comparison below therefore resolves
        // equal confidence in favor of the closest, then shorter, length.
        for raw in raws {
            let bit_length = raw.bit_length;
            let failure = raw.failure_reason().map(str::to_owned);
            match decode_candidate(raw) {
                None => trace.push(CandidateTrace::Failed {
                    bit_length,
                    reason: failure.unwrap_or_else(|| "extraction failed".into()),
                }),
                Some(decoded) => {
                    let metrics = score(&decoded.text, expected);
                    let confidence = self.weights.combine(&metrics);
                    if best.as_ref().map_or(true, |(c, _, _)| confidence > *c) {
                        best = Some((
                            confidence,
                            BestCandidate {
                                bit_length,
                                text: decoded.text.clone(),
                                encoding: decoded.encoding,
                                decode: decoded.outcome,
                            },
                            metrics,
                        ));
                    }
                    trace.push(CandidateTrace::Scored {
                        bit_length,
                        text: decoded.text,
                        encoding: decoded.encoding,
                        decode: decoded.outcome,
                        metrics,
                        confidence,
                    });
                }
            }
        }

        let result = match best {
            Some((confidence, best, metrics)) => {
                let matched = confidence >= threshold;
                info!(confidence, matched, bit_length = best.bit_length, "verdict");
                DetectionResult {
                    matched,
                    confidence,
                    best: Some(best),
                    reasons: ranked_reasons(&metrics),
                    trace: if options.include_trace { trace } else { Vec::new() },
                    total_extraction_failure: false,
                }
            }
            None => {
                warn!("extraction failed at every candidate length");
                DetectionResult {
                    matched: false,
                    confidence: 0.0,
                    best: None,
                    reasons: Vec::new(),
                    trace: if options.include_trace { trace } else { Vec::new() },
                    total_extraction_failure: true,
                }
            }
        };
        Ok(result)
    }

    /// Probe each candidate length, serially or on the rayon pool.
    ///
    /// The returned vector preserves the order of `candidates`, so the
    /// final result is identical regardless of the concurrency degree.
    pub(crate) fn probe_lengths(
        &self,
        image: &DynamicImage,
        candidates: &[usize],
        timeout: Option<Duration>,
        parallel: bool,
    ) -> Vec<RawCandidate> {
        if parallel {
            candidates
                .par_iter()
                .map(|&n| self.adapter.probe(image, n, timeout))
                .collect()
        } else {
            candidates
                .iter()
                .map(|&n| self.adapter.probe(image, n, timeout))
                .collect()
        }
    }
}

/// The four metrics as named reasons, sorted descending by value.
/// Equal values keep the fixed metric order.
fn ranked_reasons(metrics: &MatchMetrics) -> Vec<MatchReason> {
    let mut reasons: Vec<MatchReason> = [
        ("length", metrics.length),
        ("charset", metrics.charset),
        ("pattern", metrics.pattern),
        ("signature", metrics.signature),
    ]
    .into_iter()
    .map(|(metric, value)| MatchReason {
        metric: metric.to_owned(),
        value,
    })
    .collect();
    reasons.sort_by(|a, b| b.value.total_cmp(&a.value));
    reasons
}

pub(crate) fn validate_image(image: &DynamicImage) -> Result<()> {
    if image.width() == 0 || image.height() == 0 {
        return Err(WatermarkError::InvalidInput(
            "image has zero area".into(),
        ));
    }
    Ok(())
}

fn validate_threshold(threshold: f64) -> Result<()> {
    if !threshold.is_finite() || !(0.0..=100.0).contains(&threshold) {
        return Err(WatermarkError::InvalidConfig(format!(
            "decision threshold must lie in [0, 100], got {threshold}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{FnExtractor, MockExtractor};

    fn test_image() -> DynamicImage {
        DynamicImage::new_rgb8(16, 16)
    }

    #[test]
    fn test_default_weights_are_valid_and_sum_to_one() {
        let weights = MetricWeights::default();
        weights.validate().unwrap();
        let sum = weights.length + weights.charset + weights.pattern + weights.signature;
        assert_eq!(sum, 1.0);
    }

    #[test]
    fn test_combine_reproduces_reference_trace() {
        // length 100%, charset 53.8%, pattern 100%, signature 100% -> 85
        let metrics = MatchMetrics {
            length: 1.0,
            charset: 7.0 / 13.0,
            pattern: 1.0,
            signature: 1.0,
        };
        let confidence = MetricWeights::default().combine(&metrics);
        assert!((confidence - 85.0).abs() < 1e-9, "got {confidence}");
    }

    #[test]
    fn test_combine_saturates_at_100() {
        let metrics = MatchMetrics {
            length: 1.0,
            charset: 1.0,
            pattern: 1.0,
            signature: 1.0,
        };
        assert_eq!(MetricWeights::default().combine(&metrics), 100.0);
    }

    #[test]
    fn test_combine_is_monotone_in_each_metric() {
        let weights = MetricWeights::default();
        let base = MatchMetrics {
            length: 0.4,
            charset: 0.4,
            pattern: 0.4,
            signature: 0.4,
        };
        let baseline = weights.combine(&base);

        for delta in [0.1, 0.3, 0.6] {
            for raised in [
                MatchMetrics { length: 0.4 + delta, ..base },
                MatchMetrics { charset: 0.4 + delta, ..base },
                MatchMetrics { pattern: 0.4 + delta, ..base },
                MatchMetrics { signature: 0.4 + delta, ..base },
            ] {
                assert!(weights.combine(&raised) >= baseline);
            }
        }
    }

    #[test]
    fn test_invalid_weights_rejected() {
        let negative = MetricWeights {
            length: -0.1,
            charset: 0.5,
            pattern: 0.4,
            signature: 0.2,
        };
        assert!(negative.validate().is_err());

        let short_sum = MetricWeights {
            length: 0.2,
            charset: 0.2,
            pattern: 0.2,
            signature: 0.2,
        };
        assert!(short_sum.validate().is_err());
    }

    #[test]
    fn test_detector_rejects_invalid_configuration() {
        let bad_weights = MetricWeights {
            length: 0.9,
            charset: 0.9,
            pattern: 0.0,
            signature: 0.0,
        };
        assert!(WatermarkDetector::new(MockExtractor::failing())
            .with_weights(bad_weights)
            .is_err());
        assert!(WatermarkDetector::new(MockExtractor::failing())
            .with_threshold(150.0)
            .is_err());
    }

    #[test]
    fn test_verify_rejects_empty_expected_text() {
        let detector = WatermarkDetector::new(MockExtractor::failing());
        let err = detector
            .verify(&test_image(), "", &VerifyOptions::default())
            .unwrap_err();
        assert!(matches!(err, WatermarkError::InvalidInput(_)));
    }

    #[test]
    fn test_verify_rejects_zero_area_image() {
        let detector = WatermarkDetector::new(MockExtractor::failing());
        let empty = DynamicImage::new_rgb8(0, 0);
        let err = detector
            .verify(&empty, "SocialNetwork0", &VerifyOptions::default())
            .unwrap_err();
        assert!(matches!(err, WatermarkError::InvalidInput(_)));
    }

    #[test]
    fn test_verify_rejects_out_of_range_threshold_override() {
        let detector = WatermarkDetector::new(MockExtractor::failing());
        let options = VerifyOptions {
            threshold: Some(-1.0),
            ..VerifyOptions::default()
        };
        let err = detector
            .verify(&test_image(), "SocialNetwork0", &options)
            .unwrap_err();
        assert!(matches!(err, WatermarkError::InvalidConfig(_)));
    }

    #[test]
    fn test_total_extraction_failure_is_reported_not_fatal() {
        let detector = WatermarkDetector::new(MockExtractor::failing());
        let result = detector
            .verify(&test_image(), "SocialNetwork0", &VerifyOptions::default())
            .unwrap();
        assert!(!result.matched);
        assert_eq!(result.confidence, 0.0);
        assert!(result.total_extraction_failure);
        assert!(result.best.is_none());
        assert!(result.summary().contains("every candidate length"));
    }

    #[test]
    fn test_equal_confidence_prefers_length_closest_to_anchor() {
        // Lengths 17..=23 all decode to "Hi" after the trailing partial
        // byte is dropped, so their confidences tie at 100.
        let payload = crate::extract::text_bits("Hi");
        let extractor = FnExtractor::new(move |_: &DynamicImage, n: usize| {
            if (17..=23).contains(&n) {
                let mut bits = payload.clone();
                bits.resize(n, 0);
                Ok(bits)
            } else {
                Err(WatermarkError::ExtractionFailure("no payload".into()))
            }
        });
        let detector = WatermarkDetector::new(extractor);
        let options = VerifyOptions {
            radius_bits: 8,
            ..VerifyOptions::default()
        };
        let result = detector.verify(&test_image(), "Hi", &options).unwrap();
        assert_eq!(result.confidence, 100.0);
        assert_eq!(result.best.as_ref().unwrap().bit_length, 17);
    }

    #[test]
    fn test_reasons_are_ranked_descending() {
        let metrics = MatchMetrics {
            length: 0.3,
            charset: 0.9,
            pattern: 0.6,
            signature: 0.6,
        };
        let reasons = ranked_reasons(&metrics);
        assert_eq!(reasons[0].metric, "charset");
        // Equal values keep the fixed metric order
        assert_eq!(reasons[1].metric, "pattern");
        assert_eq!(reasons[2].metric, "signature");
        assert_eq!(reasons[3].metric, "length");
    }

    #[test]
    fn test_trace_only_included_on_request() {
        let detector = WatermarkDetector::new(MockExtractor::embedding("Hi"));
        let quiet = detector
            .verify(&test_image(), "Hi", &VerifyOptions::default())
            .unwrap();
        assert!(quiet.trace.is_empty());

        let verbose = detector
            .verify(
                &test_image(),
                "Hi",
                &VerifyOptions {
                    include_trace: true,
                    radius_bits: 4,
                    ..VerifyOptions::default()
                },
            )
            .unwrap();
        assert_eq!(verbose.trace.len(), 9);
    }
}
