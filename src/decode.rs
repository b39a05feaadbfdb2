//! Candidate text decoding.
//!
//! Raw bit sequences coming back from the extraction primitive carry no
//! encoding metadata, and a corrupted payload is the norm rather than the
//! exception. Decoding therefore runs an explicit ordered attempt list
//! (UTF-8, then ASCII, then Latin-1 as the terminal step that cannot fail),
//! so every successfully extracted candidate always yields text. No control
//! flow by exception anywhere in this path.
//!
//! Decoding is pure and deterministic: the same bits always produce the same
//! text and encoding tag.

use serde::{Deserialize, Serialize};

use crate::extract::RawCandidate;

/// Which encoding produced the candidate text.
///
/// Carried explicitly alongside the text; downstream code never re-infers
/// the encoding from content inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextEncoding {
    /// Multi-byte variable-width encoding, tried first.
    Utf8,
    /// 7-bit fixed-width encoding, tried second.
    Ascii,
    /// 8-bit fixed-width fallback; maps every byte to a character.
    Latin1,
}

impl TextEncoding {
    pub fn name(&self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "utf-8",
            TextEncoding::Ascii => "ascii",
            TextEncoding::Latin1 => "latin-1",
        }
    }

    /// Strict decode: `Some` only if every byte decodes without error.
    fn decode_strict(&self, bytes: &[u8]) -> Option<String> {
        match self {
            TextEncoding::Utf8 => std::str::from_utf8(bytes).ok().map(str::to_owned),
            TextEncoding::Ascii => bytes
                .iter()
                .all(u8::is_ascii)
                .then(|| bytes.iter().map(|&b| b as char).collect()),
            TextEncoding::Latin1 => Some(latin1(bytes)),
        }
    }
}

impl std::fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Whether the preferred encodings decoded the full byte sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecodeOutcome {
    /// One of the strict encodings accepted the whole sequence.
    Clean,
    /// The sequence was not valid text in the preferred encodings; the
    /// Latin-1 fallback transliterated it byte-for-byte instead.
    Lossy,
}

/// A candidate interpreted as text.
///
/// Invariant: `text.chars().count() <= raw.bit_length / 8`, one character
/// at most per extracted byte, with any trailing partial byte dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedCandidate {
    pub raw: RawCandidate,
    pub text: String,
    pub encoding: TextEncoding,
    pub outcome: DecodeOutcome,
}

impl DecodedCandidate {
    pub fn is_lossy(&self) -> bool {
        self.outcome == DecodeOutcome::Lossy
    }
}

/// Pack a 0/1 bit sequence into bytes, most significant bit first.
/// A trailing group of fewer than eight bits is dropped.
pub fn bits_to_bytes(bits: &[u8]) -> Vec<u8> {
    bits.chunks_exact(8)
        .map(|chunk| chunk.iter().fold(0u8, |acc, &bit| (acc << 1) | (bit & 1)))
        .collect()
}

/// Decode a bit sequence into text via the ordered attempt list:
/// UTF-8, then ASCII, then the Latin-1 terminal step.
pub fn decode_bits(bits: &[u8]) -> (String, TextEncoding, DecodeOutcome) {
    let bytes = bits_to_bytes(bits);

    for encoding in [TextEncoding::Utf8, TextEncoding::Ascii] {
        if let Some(text) = encoding.decode_strict(&bytes) {
            return (text, encoding, DecodeOutcome::Clean);
        }
    }
    // Latin-1 maps every byte to a character; this step cannot fail.
    (latin1(&bytes), TextEncoding::Latin1, DecodeOutcome::Lossy)
}

/// Decode a successfully extracted candidate; `None` if extraction failed.
pub fn decode_candidate(raw: RawCandidate) -> Option<DecodedCandidate> {
    let bits = raw.bits()?.to_vec();
    let (text, encoding, outcome) = decode_bits(&bits);
    Some(DecodedCandidate {
        raw,
        text,
        encoding,
        outcome,
    })
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}
