//! Character diff, Myers O(ND) with prefix/suffix trimming.
//!
//! Lengths and offsets count Unicode scalar values, not bytes.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffOp {
    Delete,
    Equal,
    Insert,
}

pub type Diff = (DiffOp, String);

/// Computes the edit script turning `src` into `dst`.
pub fn diff(src: &str, dst: &str) -> Vec<Diff> {
    if src == dst {
        return if src.is_empty() {
            vec![]
        } else {
            vec![(DiffOp::Equal, src.to_string())]
        };
    }
    let a: Vec<char> = src.chars().collect();
    let b: Vec<char> = dst.chars().collect();
    let mut result = diff_chars(&a, &b);
    cleanup_merge(&mut result);
    result
}

/// Text before the edits: equalities and deletions.
pub fn source_text(diffs: &[Diff]) -> String {
    diffs
        .iter()
        .filter(|(op, _)| *op != DiffOp::Insert)
        .map(|(_, text)| text.as_str())
        .collect()
}

/// Text after the edits: equalities and insertions.
pub fn target_text(diffs: &[Diff]) -> String {
    diffs
        .iter()
        .filter(|(op, _)| *op != DiffOp::Delete)
        .map(|(_, text)| text.as_str())
        .collect()
}

/// Maps a char offset in the source text to the equivalent offset in the
/// target text.
pub fn x_index(diffs: &[Diff], loc: usize) -> usize {
    let mut chars1 = 0;
    let mut chars2 = 0;
    let mut last_chars1 = 0;
    let mut last_chars2 = 0;
    let mut stopped_at = None;
    for (i, (op, text)) in diffs.iter().enumerate() {
        let len = text.chars().count();
        if *op != DiffOp::Insert {
            chars1 += len;
        }
        if *op != DiffOp::Delete {
            chars2 += len;
        }
        if chars1 > loc {
            stopped_at = Some(i);
            break;
        }
        last_chars1 = chars1;
        last_chars2 = chars2;
    }
    if let Some(i) = stopped_at {
        if diffs[i].0 == DiffOp::Delete {
            // Inside a deletion: map to its start.
            return last_chars2;
        }
    }
    last_chars2 + (loc - last_chars1)
}

/// Number of inserted, deleted or substituted chars.
pub fn levenshtein(diffs: &[Diff]) -> usize {
    let mut distance = 0;
    let mut insertions = 0;
    let mut deletions = 0;
    for (op, text) in diffs {
        let len = text.chars().count();
        match op {
            DiffOp::Insert => insertions += len,
            DiffOp::Delete => deletions += len,
            DiffOp::Equal => {
                distance += insertions.max(deletions);
                insertions = 0;
                deletions = 0;
            }
        }
    }
    distance + insertions.max(deletions)
}

// ── Core algorithm ────────────────────────────────────────────────────────

fn diff_chars(a: &[char], b: &[char]) -> Vec<Diff> {
    if a == b {
        return if a.is_empty() {
            vec![]
        } else {
            vec![(DiffOp::Equal, to_string(a))]
        };
    }

    let prefix_len = common_prefix(a, b);
    let (prefix, a, b) = (&a[..prefix_len], &a[prefix_len..], &b[prefix_len..]);
    let suffix_len = common_suffix(a, b);
    let suffix = &a[a.len() - suffix_len..];
    let a = &a[..a.len() - suffix_len];
    let b = &b[..b.len() - suffix_len];

    let mut result = Vec::new();
    if !prefix.is_empty() {
        result.push((DiffOp::Equal, to_string(prefix)));
    }
    result.extend(diff_middle(a, b));
    if !suffix.is_empty() {
        result.push((DiffOp::Equal, to_string(suffix)));
    }
    result
}

fn diff_middle(a: &[char], b: &[char]) -> Vec<Diff> {
    if a.is_empty() {
        return if b.is_empty() {
            vec![]
        } else {
            vec![(DiffOp::Insert, to_string(b))]
        };
    }
    if b.is_empty() {
        return vec![(DiffOp::Delete, to_string(a))];
    }

    let a_is_longer = a.len() > b.len();
    let (long, short) = if a_is_longer { (a, b) } else { (b, a) };
    if let Some(idx) = find(long, short) {
        let edge = if a_is_longer { DiffOp::Delete } else { DiffOp::Insert };
        let mut out = Vec::with_capacity(3);
        if idx > 0 {
            out.push((edge, to_string(&long[..idx])));
        }
        out.push((DiffOp::Equal, to_string(short)));
        if idx + short.len() < long.len() {
            out.push((edge, to_string(&long[idx + short.len()..])));
        }
        return out;
    }

    if short.len() == 1 {
        return vec![
            (DiffOp::Delete, to_string(a)),
            (DiffOp::Insert, to_string(b)),
        ];
    }

    bisect(a, b)
}

fn bisect(a: &[char], b: &[char]) -> Vec<Diff> {
    let n1 = a.len() as i64;
    let n2 = b.len() as i64;
    let max_d = (n1 + n2 + 1) / 2 + 1;
    let v_offset = max_d;
    let v_length = 2 * max_d;
    let mut v1 = vec![-1i64; v_length as usize];
    let mut v2 = vec![-1i64; v_length as usize];
    v1[(v_offset + 1) as usize] = 0;
    v2[(v_offset + 1) as usize] = 0;

    let delta = n1 - n2;
    let front = delta % 2 != 0;
    let (mut k1start, mut k1end, mut k2start, mut k2end) = (0i64, 0i64, 0i64, 0i64);

    for d in 0..max_d {
        let mut k1 = -d + k1start;
        while k1 <= d - k1end {
            let k1_offset = (v_offset + k1) as usize;
            let mut x1 = if k1 == -d || (k1 != d && v1[k1_offset - 1] < v1[k1_offset + 1]) {
                v1[k1_offset + 1]
            } else {
                v1[k1_offset - 1] + 1
            };
            let mut y1 = x1 - k1;
            while x1 < n1 && y1 < n2 && a[x1 as usize] == b[y1 as usize] {
                x1 += 1;
                y1 += 1;
            }
            v1[k1_offset] = x1;
            if x1 > n1 {
                k1end += 2;
            } else if y1 > n2 {
                k1start += 2;
            } else if front {
                let k2_offset = v_offset + delta - k1;
                if (0..v_length).contains(&k2_offset) && v2[k2_offset as usize] != -1 {
                    let x2 = n1 - v2[k2_offset as usize];
                    if x1 >= x2 {
                        return bisect_split(a, b, x1 as usize, y1 as usize);
                    }
                }
            }
            k1 += 2;
        }

        let mut k2 = -d + k2start;
        while k2 <= d - k2end {
            let k2_offset = (v_offset + k2) as usize;
            let mut x2 = if k2 == -d || (k2 != d && v2[k2_offset - 1] < v2[k2_offset + 1]) {
                v2[k2_offset + 1]
            } else {
                v2[k2_offset - 1] + 1
            };
            let mut y2 = x2 - k2;
            while x2 < n1 && y2 < n2 && a[(n1 - x2 - 1) as usize] == b[(n2 - y2 - 1) as usize] {
                x2 += 1;
                y2 += 1;
            }
            v2[k2_offset] = x2;
            if x2 > n1 {
                k2end += 2;
            } else if y2 > n2 {
                k2start += 2;
            } else if !front {
                let k1_offset = v_offset + delta - k2;
                if (0..v_length).contains(&k1_offset) && v1[k1_offset as usize] != -1 {
                    let x1 = v1[k1_offset as usize];
                    let y1 = v_offset + x1 - k1_offset;
                    if x1 >= n1 - x2 {
                        return bisect_split(a, b, x1 as usize, y1 as usize);
                    }
                }
            }
            k2 += 2;
        }
    }

    vec![
        (DiffOp::Delete, to_string(a)),
        (DiffOp::Insert, to_string(b)),
    ]
}

fn bisect_split(a: &[char], b: &[char], x: usize, y: usize) -> Vec<Diff> {
    let mut result = diff_chars(&a[..x], &b[..y]);
    result.extend(diff_chars(&a[x..], &b[y..]));
    result
}

// ── Cleanup ───────────────────────────────────────────────────────────────

/// Merges adjacent edits of the same kind, factors shared affixes out of
/// delete/insert pairs and slides single edits over neighbouring equalities.
pub(crate) fn cleanup_merge(diffs: &mut Vec<Diff>) {
    diffs.push((DiffOp::Equal, String::new()));
    let mut pointer = 0usize;
    let mut del_cnt = 0usize;
    let mut ins_cnt = 0usize;
    let mut del_txt: Vec<char> = Vec::new();
    let mut ins_txt: Vec<char> = Vec::new();

    while pointer < diffs.len() {
        if pointer < diffs.len() - 1 && diffs[pointer].1.is_empty() {
            diffs.remove(pointer);
            continue;
        }
        match diffs[pointer].0 {
            DiffOp::Insert => {
                ins_cnt += 1;
                ins_txt.extend(diffs[pointer].1.chars());
                pointer += 1;
            }
            DiffOp::Delete => {
                del_cnt += 1;
                del_txt.extend(diffs[pointer].1.chars());
                pointer += 1;
            }
            DiffOp::Equal => {
                let prev_equal = pointer.checked_sub(ins_cnt + del_cnt + 1);

                if del_cnt + ins_cnt > 0 {
                    if !del_txt.is_empty() && !ins_txt.is_empty() {
                        let common = common_prefix(&ins_txt, &del_txt);
                        if common > 0 {
                            let prefix = to_string(&ins_txt[..common]);
                            match prev_equal {
                                Some(pe) if diffs[pe].0 == DiffOp::Equal => {
                                    diffs[pe].1.push_str(&prefix)
                                }
                                _ => {
                                    diffs.insert(0, (DiffOp::Equal, prefix));
                                    pointer += 1;
                                }
                            }
                            ins_txt.drain(..common);
                            del_txt.drain(..common);
                        }
                        let common = common_suffix(&ins_txt, &del_txt);
                        if common > 0 {
                            let suffix = to_string(&ins_txt[ins_txt.len() - common..]);
                            diffs[pointer].1.insert_str(0, &suffix);
                            ins_txt.truncate(ins_txt.len() - common);
                            del_txt.truncate(del_txt.len() - common);
                        }
                    }

                    let start = pointer - del_cnt - ins_cnt;
                    let mut replacement = Vec::with_capacity(2);
                    if !del_txt.is_empty() {
                        replacement.push((DiffOp::Delete, to_string(&del_txt)));
                    }
                    if !ins_txt.is_empty() {
                        replacement.push((DiffOp::Insert, to_string(&ins_txt)));
                    }
                    let added = replacement.len();
                    let _ = diffs.splice(start..pointer, replacement);
                    pointer = start + added;
                }

                if pointer != 0 && diffs[pointer - 1].0 == DiffOp::Equal {
                    let text = std::mem::take(&mut diffs[pointer].1);
                    diffs[pointer - 1].1.push_str(&text);
                    diffs.remove(pointer);
                } else {
                    pointer += 1;
                }
                ins_cnt = 0;
                del_cnt = 0;
                del_txt.clear();
                ins_txt.clear();
            }
        }
    }
    if diffs.last().is_some_and(|(_, text)| text.is_empty()) {
        diffs.pop();
    }

    let mut changes = false;
    let mut pointer = 1usize;
    while pointer + 1 < diffs.len() {
        if diffs[pointer - 1].0 == DiffOp::Equal && diffs[pointer + 1].0 == DiffOp::Equal {
            let prev: Vec<char> = diffs[pointer - 1].1.chars().collect();
            let cur: Vec<char> = diffs[pointer].1.chars().collect();
            let next: Vec<char> = diffs[pointer + 1].1.chars().collect();
            if cur.ends_with(&prev) {
                let shifted: String = prev.iter().chain(&cur[..cur.len() - prev.len()]).collect();
                diffs[pointer].1 = shifted;
                diffs[pointer + 1].1 = prev.iter().chain(&next).collect();
                diffs.remove(pointer - 1);
                changes = true;
            } else if cur.starts_with(&next) {
                diffs[pointer - 1].1.push_str(&to_string(&next));
                diffs[pointer].1 = cur[next.len()..].iter().chain(&next).collect();
                diffs.remove(pointer + 1);
                changes = true;
                pointer += 1;
            } else {
                pointer += 1;
            }
        } else {
            pointer += 1;
        }
    }
    if changes {
        cleanup_merge(diffs);
    }
}

// ── Char-slice helpers ────────────────────────────────────────────────────

pub(crate) fn common_prefix(a: &[char], b: &[char]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

pub(crate) fn common_suffix(a: &[char], b: &[char]) -> usize {
    a.iter()
        .rev()
        .zip(b.iter().rev())
        .take_while(|(x, y)| x == y)
        .count()
}

/// First occurrence of `needle` in `haystack`.
pub(crate) fn find(haystack: &[char], needle: &[char]) -> Option<usize> {
    find_from(haystack, needle, 0)
}

pub(crate) fn find_from(haystack: &[char], needle: &[char], from: usize) -> Option<usize> {
    if needle.is_empty() {
        return (from <= haystack.len()).then_some(from);
    }
    if from >= haystack.len() || needle.len() > haystack.len() - from {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|i| i + from)
}

/// Last occurrence of `needle` starting at or before `from`.
pub(crate) fn rfind_from(haystack: &[char], needle: &[char], from: usize) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    let last_start = (haystack.len() - needle.len()).min(from);
    (0..=last_start)
        .rev()
        .find(|&i| haystack[i..i + needle.len()] == *needle)
}

pub(crate) fn to_string(chars: &[char]) -> String {
    chars.iter().collect()
}
