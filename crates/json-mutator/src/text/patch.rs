//! Context-anchored text patches.
//!
//! A patch is a list of hunks. Each hunk carries the edits plus a few chars
//! of unchanged context on either side, so it can be placed in a string that
//! has drifted from the one it was computed against.
//!
//! Text form, one hunk:
//!
//! ```text
//! @@ -13,7 +13,7 @@
//!  own
//! -fox
//! +cat
//! ```
//!
//! Body lines start with ` ` (context), `-` (delete) or `+` (insert); line
//! text is URI-escaped except for spaces.

use std::collections::VecDeque;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;
use tracing::debug;

use super::bitap::{match_main, MatchOptions, MATCH_MAX_BITS};
use super::diff::{
    diff, find, levenshtein, rfind_from, source_text, target_text, to_string, x_index, Diff,
    DiffOp,
};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TextPatchError {
    #[error("invalid hunk header: {0}")]
    InvalidHeader(String),
    #[error("invalid line in patch body: {0}")]
    InvalidLine(String),
    #[error("invalid escape sequence in: {0}")]
    InvalidEncoding(String),
    #[error("hunk {index} could not be placed: {hunk}")]
    Unmatched { index: usize, hunk: String },
}

/// Tuning for patch creation and placement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextPatchOptions {
    pub matching: MatchOptions,
    /// Context chars kept around each edit.
    pub margin: usize,
    /// Largest share of a long hunk's text that may differ from the live
    /// text before the hunk is rejected.
    pub delete_threshold: f64,
}

impl Default for TextPatchOptions {
    fn default() -> Self {
        Self {
            matching: MatchOptions::default(),
            margin: 4,
            delete_threshold: 0.5,
        }
    }
}

/// One context-anchored edit region. Offsets and lengths count chars.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Hunk {
    pub diffs: Vec<Diff>,
    pub start1: usize,
    pub start2: usize,
    pub length1: usize,
    pub length2: usize,
}

impl fmt::Display for Hunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let coords = |start: usize, len: usize| match len {
            0 => format!("{start},0"),
            1 => format!("{}", start + 1),
            _ => format!("{},{}", start + 1, len),
        };
        writeln!(
            f,
            "@@ -{} +{} @@",
            coords(self.start1, self.length1),
            coords(self.start2, self.length2)
        )?;
        for (op, text) in &self.diffs {
            let sign = match op {
                DiffOp::Insert => '+',
                DiffOp::Delete => '-',
                DiffOp::Equal => ' ',
            };
            writeln!(f, "{sign}{}", encode_uri(text))?;
        }
        Ok(())
    }
}

// ── Text form ─────────────────────────────────────────────────────────────

fn header_regex() -> Result<&'static Regex, TextPatchError> {
    static HEADER: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    HEADER
        .get_or_init(|| Regex::new(r"^@@ -(\d+),?(\d*) \+(\d+),?(\d*) @@$"))
        .as_ref()
        .map_err(|e| TextPatchError::InvalidHeader(e.to_string()))
}

/// Parses the text form into hunks.
pub fn parse_patch(text: &str) -> Result<Vec<Hunk>, TextPatchError> {
    let header = header_regex()?;
    let lines: Vec<&str> = text.split('\n').collect();
    let mut hunks = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        if line.is_empty() {
            i += 1;
            continue;
        }
        let caps = header
            .captures(line)
            .ok_or_else(|| TextPatchError::InvalidHeader(line.to_string()))?;
        // Offsets past u32 are rejected so position arithmetic cannot overflow.
        let number = |idx: usize| -> Result<usize, TextPatchError> {
            caps[idx]
                .parse::<u32>()
                .map(|n| n as usize)
                .map_err(|_| TextPatchError::InvalidHeader(line.to_string()))
        };
        let coords = |start: usize, len_idx: usize| -> Result<(usize, usize), TextPatchError> {
            match &caps[len_idx] {
                "" => Ok((start.saturating_sub(1), 1)),
                "0" => Ok((start, 0)),
                _ => Ok((start.saturating_sub(1), number(len_idx)?)),
            }
        };
        let (start1, length1) = coords(number(1)?, 2)?;
        let (start2, length2) = coords(number(3)?, 4)?;
        let mut hunk = Hunk {
            diffs: Vec::new(),
            start1,
            start2,
            length1,
            length2,
        };
        i += 1;

        while i < lines.len() {
            let line = lines[i];
            let mut chars = line.chars();
            let op = match chars.next() {
                None => {
                    i += 1;
                    continue;
                }
                Some('@') => break,
                Some('-') => DiffOp::Delete,
                Some('+') => DiffOp::Insert,
                Some(' ') => DiffOp::Equal,
                Some(_) => return Err(TextPatchError::InvalidLine(line.to_string())),
            };
            hunk.diffs.push((op, decode_uri(chars.as_str())?));
            i += 1;
        }
        hunks.push(hunk);
    }

    Ok(hunks)
}

/// Prints hunks in text form.
pub fn stringify_patch(hunks: &[Hunk]) -> String {
    hunks.iter().map(Hunk::to_string).collect()
}

fn is_uri_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || " ;,/?:@&=+$-_.!~*'()#".contains(c)
}

fn encode_uri(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut buf = [0u8; 4];
    for c in text.chars() {
        if is_uri_safe(c) {
            out.push(c);
        } else {
            for byte in c.encode_utf8(&mut buf).bytes() {
                out.push_str(&format!("%{byte:02X}"));
            }
        }
    }
    out
}

fn decode_uri(text: &str) -> Result<String, TextPatchError> {
    let invalid = || TextPatchError::InvalidEncoding(text.to_string());
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = text.get(i + 1..i + 3).ok_or_else(invalid)?;
            out.push(u8::from_str_radix(hex, 16).map_err(|_| invalid())?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|_| invalid())
}

// ── Creation ──────────────────────────────────────────────────────────────

/// Computes hunks turning `text1` into `text2`.
pub fn make_patch(text1: &str, text2: &str, opts: &TextPatchOptions) -> Vec<Hunk> {
    let diffs = diff(text1, text2);
    if diffs.is_empty() {
        return Vec::new();
    }
    let margin = opts.margin;
    let mut hunks = Vec::new();
    let mut hunk = Hunk::default();
    let mut count1 = 0;
    let mut count2 = 0;
    // Context comes from the text as it was before the current hunk, with
    // all earlier hunks applied.
    let mut prepatch: Vec<char> = text1.chars().collect();
    let mut postpatch = prepatch.clone();

    for (x, (op, text)) in diffs.iter().enumerate() {
        let chars: Vec<char> = text.chars().collect();
        let len = chars.len();
        if hunk.diffs.is_empty() && *op != DiffOp::Equal {
            hunk.start1 = count1;
            hunk.start2 = count2;
        }
        match op {
            DiffOp::Insert => {
                hunk.diffs.push((*op, text.clone()));
                hunk.length2 += len;
                let _ = postpatch.splice(count2..count2, chars);
            }
            DiffOp::Delete => {
                hunk.length1 += len;
                hunk.diffs.push((*op, text.clone()));
                postpatch.drain(count2..count2 + len);
            }
            DiffOp::Equal => {
                if len <= 2 * margin && !hunk.diffs.is_empty() && x + 1 != diffs.len() {
                    hunk.diffs.push((*op, text.clone()));
                    hunk.length1 += len;
                    hunk.length2 += len;
                } else if len >= 2 * margin && !hunk.diffs.is_empty() {
                    add_context(&mut hunk, &prepatch, margin);
                    hunks.push(std::mem::take(&mut hunk));
                    prepatch = postpatch.clone();
                    count1 = count2;
                }
            }
        }
        if *op != DiffOp::Insert {
            count1 += len;
        }
        if *op != DiffOp::Delete {
            count2 += len;
        }
    }
    if !hunk.diffs.is_empty() {
        add_context(&mut hunk, &prepatch, margin);
        hunks.push(hunk);
    }
    hunks
}

/// Clamped char slice with `start..end` semantics.
fn clamped(text: &[char], start: isize, end: isize) -> &[char] {
    let len = text.len() as isize;
    let start = start.clamp(0, len) as usize;
    let end = end.clamp(0, len) as usize;
    if start >= end {
        &[]
    } else {
        &text[start..end]
    }
}

/// Grows the context around a hunk until its source text is unique in
/// `text`, then adds one more margin.
fn add_context(hunk: &mut Hunk, text: &[char], margin: usize) {
    if text.is_empty() {
        return;
    }
    let start2 = hunk.start2 as isize;
    let len1 = hunk.length1 as isize;
    let mut pattern = clamped(text, start2, start2 + len1);
    let mut padding = 0isize;
    while find(text, pattern) != rfind_from(text, pattern, text.len())
        && pattern.len() < MATCH_MAX_BITS.saturating_sub(2 * margin)
    {
        padding += margin as isize;
        pattern = clamped(text, start2 - padding, start2 + len1 + padding);
    }
    padding += margin as isize;

    let prefix = clamped(text, start2 - padding, start2);
    if !prefix.is_empty() {
        hunk.diffs.insert(0, (DiffOp::Equal, to_string(prefix)));
    }
    let suffix = clamped(text, start2 + len1, start2 + len1 + padding);
    if !suffix.is_empty() {
        hunk.diffs.push((DiffOp::Equal, to_string(suffix)));
    }
    hunk.start1 -= prefix.len();
    hunk.start2 -= prefix.len();
    hunk.length1 += prefix.len() + suffix.len();
    hunk.length2 += prefix.len() + suffix.len();
}

// ── Placement ─────────────────────────────────────────────────────────────

/// Pads both ends of the patch with sentinel chars so edits at the very
/// start or end of the text still have context. Returns the padding.
fn add_padding(hunks: &mut [Hunk], margin: usize) -> Vec<char> {
    let padding: Vec<char> = (1..=margin as u32).filter_map(char::from_u32).collect();
    let pad_len = padding.len();
    for hunk in hunks.iter_mut() {
        hunk.start1 += pad_len;
        hunk.start2 += pad_len;
    }

    if let Some(first) = hunks.first_mut() {
        match first.diffs.first_mut() {
            Some((DiffOp::Equal, text)) => {
                let len = text.chars().count();
                if pad_len > len {
                    let extra = pad_len - len;
                    text.insert_str(0, &to_string(&padding[len..]));
                    first.start1 -= extra;
                    first.start2 -= extra;
                    first.length1 += extra;
                    first.length2 += extra;
                }
            }
            _ => {
                first.diffs.insert(0, (DiffOp::Equal, to_string(&padding)));
                first.start1 -= pad_len;
                first.start2 -= pad_len;
                first.length1 += pad_len;
                first.length2 += pad_len;
            }
        }
    }

    if let Some(last) = hunks.last_mut() {
        match last.diffs.last_mut() {
            Some((DiffOp::Equal, text)) => {
                let len = text.chars().count();
                if pad_len > len {
                    let extra = pad_len - len;
                    text.push_str(&to_string(&padding[..extra]));
                    last.length1 += extra;
                    last.length2 += extra;
                }
            }
            _ => {
                last.diffs.push((DiffOp::Equal, to_string(&padding)));
                last.length1 += pad_len;
                last.length2 += pad_len;
            }
        }
    }

    padding
}

/// Splits hunks whose source text is too long for the matcher.
fn split_max(hunks: &mut Vec<Hunk>, margin: usize) {
    let patch_size = MATCH_MAX_BITS;
    let mut x = 0;
    while x < hunks.len() {
        if hunks[x].length1 <= patch_size {
            x += 1;
            continue;
        }
        let big = hunks.remove(x);
        let mut start1 = big.start1;
        let mut start2 = big.start2;
        let mut remaining: VecDeque<(DiffOp, Vec<char>)> = big
            .diffs
            .into_iter()
            .map(|(op, text)| (op, text.chars().collect()))
            .collect();
        let mut precontext: Vec<char> = Vec::new();

        while !remaining.is_empty() {
            let mut hunk = Hunk {
                start1: start1.saturating_sub(precontext.len()),
                start2: start2.saturating_sub(precontext.len()),
                ..Hunk::default()
            };
            let mut empty = true;
            if !precontext.is_empty() {
                hunk.length1 = precontext.len();
                hunk.length2 = precontext.len();
                hunk.diffs.push((DiffOp::Equal, to_string(&precontext)));
            }

            while hunk.length1 < patch_size - margin {
                let Some((op, text)) = remaining.front_mut() else {
                    break;
                };
                let op = *op;
                let len = text.len();
                if op == DiffOp::Insert {
                    hunk.length2 += len;
                    start2 += len;
                    hunk.diffs.push((op, to_string(text)));
                    remaining.pop_front();
                    empty = false;
                } else if op == DiffOp::Delete
                    && hunk.diffs.len() == 1
                    && hunk.diffs[0].0 == DiffOp::Equal
                    && len > 2 * patch_size
                {
                    hunk.length1 += len;
                    start1 += len;
                    empty = false;
                    hunk.diffs.push((op, to_string(text)));
                    remaining.pop_front();
                } else {
                    let take = len.min(patch_size - hunk.length1 - margin);
                    let piece = to_string(&text[..take]);
                    hunk.length1 += take;
                    start1 += take;
                    if op == DiffOp::Equal {
                        hunk.length2 += take;
                        start2 += take;
                    } else {
                        empty = false;
                    }
                    hunk.diffs.push((op, piece));
                    if take == len {
                        remaining.pop_front();
                    } else {
                        text.drain(..take);
                    }
                }
            }

            let after: Vec<char> = target_text(&hunk.diffs).chars().collect();
            precontext = after[after.len().saturating_sub(margin)..].to_vec();

            let postcontext: Vec<char> = remaining
                .iter()
                .filter(|(op, _)| *op != DiffOp::Insert)
                .flat_map(|(_, text)| text.iter().copied())
                .take(margin)
                .collect();
            if !postcontext.is_empty() {
                hunk.length1 += postcontext.len();
                hunk.length2 += postcontext.len();
                match hunk.diffs.last_mut() {
                    Some((DiffOp::Equal, text)) => text.push_str(&to_string(&postcontext)),
                    _ => hunk.diffs.push((DiffOp::Equal, to_string(&postcontext))),
                }
            }

            if !empty {
                hunks.insert(x, hunk);
                x += 1;
            }
        }
    }
}

/// Places every hunk as close to its recorded offset as the live text
/// allows. Returns the patched text and, per hunk, whether it was placed.
///
/// Hunk offsets are reported after long hunks have been split, so the flag
/// list may be longer than `hunks`.
pub fn apply_hunks(hunks: &[Hunk], text: &str, opts: &TextPatchOptions) -> (String, Vec<bool>) {
    if hunks.is_empty() {
        return (text.to_string(), Vec::new());
    }
    let mut hunks = hunks.to_vec();
    let padding = add_padding(&mut hunks, opts.margin);
    let mut text: Vec<char> = padding
        .iter()
        .copied()
        .chain(text.chars())
        .chain(padding.iter().copied())
        .collect();
    split_max(&mut hunks, opts.margin);

    let mut delta: isize = 0;
    let mut results = Vec::with_capacity(hunks.len());
    for hunk in &hunks {
        let expected = hunk.start2 as isize + delta;
        let expected_loc = expected.max(0) as usize;
        let text1: Vec<char> = source_text(&hunk.diffs).chars().collect();

        let mut end_loc = None;
        let start_loc = if text1.len() > MATCH_MAX_BITS {
            // Too long for bitap: anchor both ends separately.
            let tail = text1.len() - MATCH_MAX_BITS;
            match_main(&text, &text1[..MATCH_MAX_BITS], expected_loc, &opts.matching).and_then(
                |start| {
                    match match_main(&text, &text1[tail..], expected_loc + tail, &opts.matching) {
                        Some(end) if start < end => {
                            end_loc = Some(end);
                            Some(start)
                        }
                        _ => None,
                    }
                },
            )
        } else {
            match_main(&text, &text1, expected_loc, &opts.matching)
        };

        let Some(start) = start_loc else {
            debug!(start2 = hunk.start2, "hunk not placed");
            results.push(false);
            delta -= hunk.length2 as isize - hunk.length1 as isize;
            continue;
        };
        delta = start as isize - expected;
        let start = start.min(text.len());

        let found_end = match end_loc {
            Some(end) => end + MATCH_MAX_BITS,
            None => start + text1.len(),
        }
        .min(text.len());
        let found = text[start..found_end].to_vec();

        if text1 == found {
            let replacement: Vec<char> = target_text(&hunk.diffs).chars().collect();
            let end = (start + text1.len()).min(text.len());
            let _ = text.splice(start..end, replacement);
            results.push(true);
            continue;
        }

        // Imperfect match: map each edit through a diff of the expected
        // text against what is actually there.
        let drift = diff(&to_string(&text1), &to_string(&found));
        if text1.len() > MATCH_MAX_BITS
            && levenshtein(&drift) as f64 / text1.len() as f64 > opts.delete_threshold
        {
            results.push(false);
            continue;
        }
        let mut index1 = 0;
        for (op, piece) in &hunk.diffs {
            let len = piece.chars().count();
            if *op != DiffOp::Equal {
                let index2 = x_index(&drift, index1);
                let at = (start + index2).min(text.len());
                if *op == DiffOp::Insert {
                    let _ = text.splice(at..at, piece.chars());
                } else {
                    let end = (start + x_index(&drift, index1 + len)).min(text.len());
                    if at < end {
                        text.drain(at..end);
                    }
                }
            }
            if *op != DiffOp::Delete {
                index1 += len;
            }
        }
        results.push(true);
    }

    let pad = padding.len();
    let end = text.len().saturating_sub(pad).max(pad.min(text.len()));
    let start = pad.min(end);
    (to_string(&text[start..end]), results)
}

/// Applies a patch in text form. See [`merge_hunks`].
pub fn apply_text_patch(text: &str, patch: &str) -> Result<String, TextPatchError> {
    let hunks = parse_patch(patch)?;
    merge_hunks(text, &hunks, &TextPatchOptions::default())
}

/// Applies hunks on a best-effort basis.
///
/// Hunks that cannot be placed are dropped and the rest are kept. Fails only
/// when the patch has hunks and none of them found an anchor.
pub fn merge_hunks(
    text: &str,
    hunks: &[Hunk],
    opts: &TextPatchOptions,
) -> Result<String, TextPatchError> {
    let (patched, results) = apply_hunks(hunks, text, opts);
    if results.is_empty() || results.iter().any(|placed| *placed) {
        if results.iter().any(|placed| !placed) {
            let placed = results.iter().filter(|placed| **placed).count();
            debug!(placed, total = results.len(), "partial text merge");
        }
        return Ok(patched);
    }
    Err(TextPatchError::Unmatched {
        index: 0,
        hunk: hunks
            .first()
            .map(Hunk::to_string)
            .unwrap_or_else(|| stringify_patch(hunks)),
    })
}
