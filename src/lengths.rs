//! Candidate bit-length enumeration.
//!
//! The extraction primitive must be told how many bits to recover, but the
//! embedded payload length is never guaranteed: the image may carry a
//! watermark of a slightly different length than expected, or none at all.
//! This module produces the ordered set of lengths the pipeline probes.
//!
//! Both generators are pure functions of their arguments.

/// Default minimum bit-length probed in scan mode.
pub const DEFAULT_SCAN_MIN_BITS: usize = 8;

/// Default maximum bit-length probed in scan mode.
pub const DEFAULT_SCAN_MAX_BITS: usize = 256;

/// Default scan-mode step between candidate lengths (one byte).
pub const DEFAULT_SCAN_STEP_BITS: usize = 8;

/// Candidate lengths anchored on an expected payload of `expected_byte_len`
/// bytes.
///
/// Emits the primary length `8 * expected_byte_len` plus every bit-length in
/// a symmetric window of `radius_bits` around it, restricted to positive
/// integers. The result is deduplicated and ordered by ascending distance
/// from the primary length; at equal distance the shorter length comes first,
/// so the probe sequence starts at the most likely length and walks outward.
pub fn anchored(expected_byte_len: usize, radius_bits: usize) -> Vec<usize> {
    let primary = expected_byte_len * 8;
    let low = primary.saturating_sub(radius_bits).max(1);
    let high = primary + radius_bits;

    let mut lengths: Vec<usize> = (low..=high).collect();
    lengths.sort_by_key(|&n| (n.abs_diff(primary), n));
    lengths
}

/// Ascending byte-aligned candidate lengths for scan mode.
///
/// Spans `min_bits..=max_bits` in steps of `step_bits`. Callers validate the
/// range; a reversed or zero-step range yields an empty sequence rather than
/// a non-positive length.
pub fn scan_range(min_bits: usize, max_bits: usize, step_bits: usize) -> Vec<usize> {
    if step_bits == 0 || min_bits == 0 || min_bits > max_bits {
        return Vec::new();
    }
    (min_bits..=max_bits).step_by(step_bits).collect()
}
