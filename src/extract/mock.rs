//! Mock bit extractor for testing.

use image::DynamicImage;
use sha3::{Digest, Sha3_256};

use super::BitExtractor;
use crate::error::{Result, WatermarkError};

/// Deterministic mock extractor.
/// WARNING: testing only - it never looks at the image content!
///
/// Models the observable behaviors of a frequency-domain extraction
/// primitive: an embedded payload served at its exact bit-length, DCT-like
/// noise at other lengths, or outright failure.
pub struct MockExtractor {
    /// Payload served when the requested length matches exactly.
    payload: Option<(usize, Vec<u8>)>,
    /// Seed for the noise stream served at non-payload lengths.
    /// `None` means those lengths fail instead.
    noise_seed: Option<u64>,
}

impl MockExtractor {
    /// Extractor that fails at every length (image without any watermark,
    /// or a primitive that cannot lock onto the carrier).
    pub fn failing() -> Self {
        Self {
            payload: None,
            noise_seed: None,
        }
    }

    /// Noiseless extractor for a text payload: serves the exact UTF-8 bits
    /// of `text` at bit-length `8 * text.len()` and fails at every other
    /// length.
    pub fn embedding(text: &str) -> Self {
        Self::with_payload_bits(text.len() * 8, text_bits(text))
    }

    /// Extractor serving an explicit bit sequence at `bit_length` and
    /// failing elsewhere. Useful for corrupted-payload fixtures.
    pub fn with_payload_bits(bit_length: usize, bits: Vec<u8>) -> Self {
        debug_assert_eq!(bits.len(), bit_length);
        Self {
            payload: Some((bit_length, bits)),
            noise_seed: None,
        }
    }

    /// Extractor returning seeded pseudo-random bits at every length
    /// (an unwatermarked image as seen by a primitive that always "finds"
    /// something in the DCT coefficients).
    pub fn noise(seed: u64) -> Self {
        Self {
            payload: None,
            noise_seed: Some(seed),
        }
    }

    /// Serve noise instead of failing at non-payload lengths.
    pub fn with_noise(mut self, seed: u64) -> Self {
        self.noise_seed = Some(seed);
        self
    }

    /// Deterministic bit stream derived from the seed and requested length
    /// via SHA3-256, one hash block at a time.
    fn noise_bits(seed: u64, bit_length: usize) -> Vec<u8> {
        let mut bits = Vec::with_capacity(bit_length);
        let mut block: u64 = 0;
        while bits.len() < bit_length {
            let mut hasher = Sha3_256::new();
            hasher.update(seed.to_le_bytes());
            hasher.update((bit_length as u64).to_le_bytes());
            hasher.update(block.to_le_bytes());
            hasher.update(b"invismark-mock-noise");
            let digest = hasher.finalize();

            for byte in digest {
                for shift in (0..8).rev() {
                    if bits.len() == bit_length {
                        break;
                    }
                    bits.push((byte >> shift) & 1);
                }
            }
            block += 1;
        }
        bits
    }
}

impl BitExtractor for MockExtractor {
    fn extract(&self, _image: &DynamicImage, bit_length: usize) -> Result<Vec<u8>> {
        if let Some((payload_len, bits)) = &self.payload {
            if *payload_len == bit_length {
                return Ok(bits.clone());
            }
        }

        match self.noise_seed {
            Some(seed) => Ok(Self::noise_bits(seed, bit_length)),
            None => Err(WatermarkError::ExtractionFailure(format!(
                "no payload recoverable at {bit_length} bits"
            ))),
        }
    }
}

/// UTF-8 bits of a text payload, most significant bit first.
pub fn text_bits(text: &str) -> Vec<u8> {
    let mut bits = Vec::with_capacity(text.len() * 8);
    for byte in text.bytes() {
        for shift in (0..8).rev() {
            bits.push((byte >> shift) & 1);
        }
    }
    bits
}
