//! Fuzzy location of a pattern near an expected offset (Bitap).

use std::collections::HashMap;

use super::diff::{find_from, rfind_from};

/// Longest pattern the bit-parallel search handles.
pub const MATCH_MAX_BITS: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchOptions {
    /// 0.0 demands a perfect match, 1.0 accepts anything.
    pub threshold: f64,
    /// How far from the expected location a match may drift, in chars, before
    /// its score is as bad as a full mismatch. 0 demands the exact location.
    pub distance: usize,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            distance: 1000,
        }
    }
}

/// Best location of `pattern` in `text` near `loc`, or `None`.
pub fn match_main(text: &[char], pattern: &[char], loc: usize, opts: &MatchOptions) -> Option<usize> {
    let loc = loc.min(text.len());
    if text == pattern {
        return Some(0);
    }
    if text.is_empty() {
        return None;
    }
    if loc + pattern.len() <= text.len() && &text[loc..loc + pattern.len()] == pattern {
        return Some(loc);
    }
    match_bitap(text, pattern, loc, opts)
}

fn alphabet(pattern: &[char]) -> HashMap<char, u64> {
    let mut masks = HashMap::new();
    let len = pattern.len();
    for (i, c) in pattern.iter().enumerate() {
        *masks.entry(*c).or_insert(0) |= 1u64 << (len - i - 1);
    }
    masks
}

fn match_bitap(text: &[char], pattern: &[char], loc: usize, opts: &MatchOptions) -> Option<usize> {
    if pattern.is_empty() || pattern.len() > MATCH_MAX_BITS {
        return None;
    }
    let masks = alphabet(pattern);
    let plen = pattern.len();

    let score = |errors: usize, x: usize| -> f64 {
        let accuracy = errors as f64 / plen as f64;
        let proximity = loc.abs_diff(x);
        if opts.distance == 0 {
            return if proximity == 0 { accuracy } else { 1.0 };
        }
        accuracy + proximity as f64 / opts.distance as f64
    };

    let mut threshold = opts.threshold;
    if let Some(exact) = find_from(text, pattern, loc) {
        threshold = threshold.min(score(0, exact));
        if let Some(exact) = rfind_from(text, pattern, loc + plen) {
            threshold = threshold.min(score(0, exact));
        }
    }

    let match_mask = 1u64 << (plen - 1);
    let mut best_loc: Option<usize> = None;
    let mut bin_max = plen + text.len();
    let mut last_rd: Vec<u64> = Vec::new();

    for d in 0..plen {
        // Widest window around `loc` where a match with `d` errors could
        // still beat the threshold.
        let mut bin_min = 0;
        let mut bin_mid = bin_max;
        while bin_min < bin_mid {
            if score(d, loc + bin_mid) <= threshold {
                bin_min = bin_mid;
            } else {
                bin_max = bin_mid;
            }
            bin_mid = (bin_max - bin_min) / 2 + bin_min;
        }
        bin_max = bin_mid;

        let mut start = if loc + 1 > bin_mid { loc + 1 - bin_mid } else { 1 };
        let finish = (loc + bin_mid).min(text.len()) + plen;

        let mut rd = vec![0u64; finish + 2];
        rd[finish + 1] = (1u64 << d) - 1;
        let last = |j: usize| last_rd.get(j).copied().unwrap_or(0);

        let mut j = finish;
        while j >= start {
            let char_match = text
                .get(j - 1)
                .and_then(|c| masks.get(c))
                .copied()
                .unwrap_or(0);
            rd[j] = ((rd[j + 1] << 1) | 1) & char_match;
            if d > 0 {
                rd[j] |= (((last(j + 1) | last(j)) << 1) | 1) | last(j + 1);
            }
            if rd[j] & match_mask != 0 {
                let s = score(d, j - 1);
                if s <= threshold {
                    threshold = s;
                    best_loc = Some(j - 1);
                    if j - 1 > loc {
                        start = (2 * loc).saturating_sub(j - 1).max(1);
                    } else {
                        break;
                    }
                }
            }
            j -= 1;
        }

        if score(d + 1, loc) > threshold {
            break;
        }
        last_rd = rd;
    }

    best_loc
}
