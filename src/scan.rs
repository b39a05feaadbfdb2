//! Scan mode: hunting for an unknown watermark.
//!
//! Reuses the length/extract/decode pipeline without an expected text.
//! With no ground truth to compare against, candidates are judged by
//! intrinsic plausibility instead of similarity: how much of the decode is
//! printable text, and whether its character distribution looks like
//! language rather than constant filler or uniform noise.

use std::collections::BTreeMap;
use std::time::Duration;

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::decode::{bits_to_bytes, decode_candidate, TextEncoding};
use crate::detect::{validate_image, WatermarkDetector};
use crate::error::{Result, WatermarkError};
use crate::extract::BitExtractor;
use crate::lengths::{self, DEFAULT_SCAN_MAX_BITS, DEFAULT_SCAN_MIN_BITS, DEFAULT_SCAN_STEP_BITS};

/// Minimum ratio of printable characters for a decode to stay in the
/// ranking. Below this the candidate reads as binary noise.
pub const MIN_PRINTABLE_RATIO: f64 = 0.6;

/// Normalized character-entropy window. Decodes below the lower bound are
/// near-constant filler (`UUUU…`, all-0xFF padding); decodes above the
/// upper bound spread over nearly the whole printable alphabet, which no
/// short natural-language watermark does.
pub const MIN_NORMALIZED_ENTROPY: f64 = 0.15;
pub const MAX_NORMALIZED_ENTROPY: f64 = 0.95;

/// Printable alphabet size the entropy is normalized against (ASCII
/// graphic characters plus space).
const PRINTABLE_ALPHABET: f64 = 96.0;

/// Per-call options for [`WatermarkDetector::scan`].
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Smallest candidate bit-length probed.
    pub min_bits: usize,
    /// Largest candidate bit-length probed.
    pub max_bits: usize,
    /// Step between candidate lengths, in bits.
    pub step_bits: usize,
    /// Time budget per extraction attempt.
    pub timeout: Option<Duration>,
    /// Probe candidate lengths on a worker pool.
    pub parallel: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            min_bits: DEFAULT_SCAN_MIN_BITS,
            max_bits: DEFAULT_SCAN_MAX_BITS,
            step_bits: DEFAULT_SCAN_STEP_BITS,
            timeout: None,
            parallel: false,
        }
    }
}

/// A plausible watermark candidate surfaced by a scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanCandidate {
    pub bit_length: usize,
    /// Decoded text of the candidate.
    pub text: String,
    /// Raw payload bytes, hex-encoded, for candidates whose text rendering
    /// loses information.
    pub raw_hex: String,
    pub encoding: TextEncoding,
    /// Plausibility score in `[0, 1]`; higher reads more like text.
    pub plausibility: f64,
}

impl<E: BitExtractor> WatermarkDetector<E> {
    /// Hunt for any embedded watermark without knowing its content.
    ///
    /// Probes the configured length range, decodes every successful
    /// extraction, and ranks the decodes that pass the plausibility
    /// heuristic, descending by score with ascending bit-length on ties.
    /// An empty list is a normal result meaning no plausible watermark
    /// was found; extraction failures never surface as errors.
    #[instrument(level = "info", skip_all, fields(min = options.min_bits, max = options.max_bits))]
    pub fn scan(
        &self,
        image: &DynamicImage,
        options: &ScanOptions,
    ) -> Result<Vec<ScanCandidate>> {
        validate_image(image)?;
        if options.min_bits == 0 || options.step_bits == 0 || options.min_bits > options.max_bits {
            return Err(WatermarkError::InvalidInput(format!(
                "degenerate scan range {}..={} step {}",
                options.min_bits, options.max_bits, options.step_bits
            )));
        }

        let candidates = lengths::scan_range(options.min_bits, options.max_bits, options.step_bits);
        let raws = self.probe_lengths(image, &candidates, options.timeout, options.parallel);

        let mut found: Vec<ScanCandidate> = Vec::new();
        for raw in raws {
            let Some(decoded) = decode_candidate(raw) else {
                continue;
            };
            let Some(plausibility) = plausibility(&decoded.text) else {
                debug!(
                    bit_length = decoded.raw.bit_length,
                    "candidate rejected as implausible"
                );
                continue;
            };
            let bits = decoded.raw.bits().unwrap_or_default();
            found.push(ScanCandidate {
                bit_length: decoded.raw.bit_length,
                raw_hex: hex::encode(bits_to_bytes(bits)),
                text: decoded.text,
                encoding: decoded.encoding,
                plausibility,
            });
        }

        found.sort_by(|a, b| {
            b.plausibility
                .total_cmp(&a.plausibility)
                .then(a.bit_length.cmp(&b.bit_length))
        });

        info!(plausible = found.len(), probed = candidates.len(), "scan complete");
        Ok(found)
    }
}

/// Judge whether a decode looks like meaningful text.
///
/// Returns the plausibility score (the printable-character ratio), or
/// `None` when the decode fails the printability floor or falls outside
/// the entropy window. The empty string is never plausible.
pub fn plausibility(text: &str) -> Option<f64> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return None;
    }

    let printable = chars
        .iter()
        .filter(|c| c.is_ascii_graphic() || **c == ' ')
        .count();
    let ratio = printable as f64 / chars.len() as f64;
    if ratio < MIN_PRINTABLE_RATIO {
        return None;
    }

    let entropy = normalized_entropy(&chars);
    if !(MIN_NORMALIZED_ENTROPY..=MAX_NORMALIZED_ENTROPY).contains(&entropy) {
        return None;
    }

    Some(ratio)
}

/// Shannon entropy of the character distribution, normalized against the
/// printable alphabet. Deterministic: frequencies are accumulated in
/// character order.
fn normalized_entropy(chars: &[char]) -> f64 {
    let mut freq: BTreeMap<char, usize> = BTreeMap::new();
    for &c in chars {
        *freq.entry(c).or_insert(0) += 1;
    }

    let total = chars.len() as f64;
    let entropy: f64 = freq
        .values()
        .map(|&count| {
            let p = count as f64 / total;
            -p * p.log2()
        })
        .sum();

    entropy / PRINTABLE_ALPHABET.log2()
}
