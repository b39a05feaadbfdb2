//! Similarity metrics between a decoded candidate and the expected text.
//!
//! Four independent metrics, each in `[0, 1]`, each computed unconditionally:
//! the aggregator assumes fixed-arity input and none may be skipped even when
//! another is saturated. All metrics are pure functions over the two strings
//! and insensitive to each other.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// The four similarity metrics for one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchMetrics {
    /// Character-length agreement.
    pub length: f64,
    /// Distinct-character overlap with the expected text.
    pub charset: f64,
    /// Ordered structural resemblance (case-insensitive subsequence).
    pub pattern: f64,
    /// Positional character-class fingerprint agreement.
    pub signature: f64,
}

/// Compute all four metrics for a decoded candidate.
pub fn score(decoded: &str, expected: &str) -> MatchMetrics {
    MatchMetrics {
        length: length_similarity(decoded, expected),
        charset: charset_overlap(decoded, expected),
        pattern: pattern_similarity(decoded, expected),
        signature: signature_similarity(decoded, expected),
    }
}

/// `1 - |len(decoded) - len(expected)| / max(len(expected), 1)`, clamped to
/// `[0, 1]`. Lengths are character counts.
pub fn length_similarity(decoded: &str, expected: &str) -> f64 {
    let len_d = decoded.chars().count() as f64;
    let len_e = expected.chars().count() as f64;
    (1.0 - (len_d - len_e).abs() / len_e.max(1.0)).clamp(0.0, 1.0)
}

/// Size of the intersection of the distinct-character sets, divided by the
/// size of the expected text's distinct-character set. Zero when the expected
/// text is empty. Case-sensitive.
pub fn charset_overlap(decoded: &str, expected: &str) -> f64 {
    let expected_set: BTreeSet<char> = expected.chars().collect();
    if expected_set.is_empty() {
        return 0.0;
    }
    let decoded_set: BTreeSet<char> = decoded.chars().collect();
    let shared = expected_set.intersection(&decoded_set).count();
    shared as f64 / expected_set.len() as f64
}

/// Longest-common-subsequence length between the case-folded strings,
/// divided by the expected character length. Tolerates substitutions that
/// only change letter case while still requiring the surviving characters to
/// appear in order. Zero when the expected text is empty.
pub fn pattern_similarity(decoded: &str, expected: &str) -> f64 {
    let a: Vec<char> = decoded.to_lowercase().chars().collect();
    let b: Vec<char> = expected.to_lowercase().chars().collect();
    if b.is_empty() {
        return 0.0;
    }
    (lcs_length(&a, &b) as f64 / b.len() as f64).clamp(0.0, 1.0)
}

/// Agreement ratio of coarse character classes compared position by
/// position over `max(len(decoded), len(expected))` positions. A position
/// present in only one string counts as a mismatch. Both strings empty
/// scores 1.0; exactly one empty scores 0.0.
///
/// This is the default structural fingerprint; callers needing a different
/// one can supply any `(decoded, expected) -> [0, 1]` function in its place
/// when combining metrics by hand.
pub fn signature_similarity(decoded: &str, expected: &str) -> f64 {
    let a: Vec<CharClass> = decoded.chars().map(CharClass::of).collect();
    let b: Vec<CharClass> = expected.chars().map(CharClass::of).collect();

    let total = a.len().max(b.len());
    if total == 0 {
        return 1.0;
    }
    let agreeing = a.iter().zip(b.iter()).filter(|(x, y)| x == y).count();
    agreeing as f64 / total as f64
}

/// Coarse character class used by the signature fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CharClass {
    Letter,
    Digit,
    Whitespace,
    Punctuation,
    Other,
}

impl CharClass {
    fn of(c: char) -> Self {
        if c.is_alphabetic() {
            CharClass::Letter
        } else if c.is_numeric() {
            CharClass::Digit
        } else if c.is_whitespace() {
            CharClass::Whitespace
        } else if c.is_ascii_punctuation() {
            CharClass::Punctuation
        } else {
            CharClass::Other
        }
    }
}

/// Two-row dynamic program for longest common subsequence length.
fn lcs_length(a: &[char], b: &[char]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];

    for &ca in a {
        for (j, &cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}
