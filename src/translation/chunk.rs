//! Section-aware splitting of canonical document text
//!
//! Chunks are contiguous byte ranges that tile the text, so concatenating
//! them in order reproduces the input exactly. Every cut sits right after a
//! whitespace run and before content.

use std::ops::Range;

use crate::config::MAX_CHUNK_COUNT;
use crate::provider::GenerationError;

/// Validated chunk count: `0` is automatic, `1..=10` forces that many chunks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkCount(u8);

impl ChunkCount {
    pub const AUTO: ChunkCount = ChunkCount(0);
    pub const WHOLE: ChunkCount = ChunkCount(1);

    /// Validate a caller-supplied count
    pub fn new(value: i64) -> Result<Self, GenerationError> {
        if (0..=MAX_CHUNK_COUNT).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(GenerationError::InvalidChunkCount { value })
        }
    }

    pub fn is_auto(self) -> bool {
        self.0 == 0
    }

    pub fn get(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for ChunkCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_auto() {
            f.write_str("auto")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Strength of a cut point, weakest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum CutClass {
    Space,
    Line,
    Paragraph,
}

/// Split `text` into chunks
///
/// `segment_starts` are byte offsets where canonical segments begin (the
/// first is 0); they are the preferred cut points. In automatic mode chunks
/// stay under `max_chars` where the text allows it. A forced count yields
/// exactly that many chunks unless the text has too few cut points, in which
/// case it yields as many as it can.
pub fn split_text(
    text: &str,
    segment_starts: &[usize],
    count: ChunkCount,
    max_chars: usize,
) -> Vec<Range<usize>> {
    if text.is_empty() {
        return vec![0..0];
    }

    let segments = segment_ranges(text, segment_starts);

    if count.is_auto() {
        return split_auto(text, segments, max_chars.max(1));
    }

    let k = count.get();
    if k <= segments.len() {
        group_pieces(&segments, k)
    } else {
        refine_to_count(text, segments, k)
    }
}

/// Ranges covering `text` that begin at each segment start
fn segment_ranges(text: &str, starts: &[usize]) -> Vec<Range<usize>> {
    let mut bounds: Vec<usize> = starts
        .iter()
        .copied()
        .filter(|&s| s > 0 && s < text.len() && text.is_char_boundary(s))
        .collect();
    bounds.sort_unstable();
    bounds.dedup();

    let mut ranges = Vec::with_capacity(bounds.len() + 1);
    let mut start = 0;
    for bound in bounds {
        ranges.push(start..bound);
        start = bound;
    }
    ranges.push(start..text.len());
    ranges
}

fn split_auto(text: &str, segments: Vec<Range<usize>>, max_chars: usize) -> Vec<Range<usize>> {
    let total = text.len();
    if total <= max_chars {
        return vec![0..total];
    }

    // Break oversized pieces down until they fit or cannot be cut further
    let mut pieces = Vec::with_capacity(segments.len());
    let mut stack: Vec<Range<usize>> = segments.into_iter().rev().collect();
    while let Some(piece) = stack.pop() {
        if piece.len() > max_chars {
            if let Some(cut) = best_cut(text, &piece) {
                stack.push(cut..piece.end);
                stack.push(piece.start..cut);
                continue;
            }
        }
        pieces.push(piece);
    }

    // Fewest roughly-equal groups that respect the budget
    let mut k = total.div_ceil(max_chars).clamp(1, pieces.len());
    loop {
        let groups = group_pieces(&pieces, k);
        if k >= pieces.len() || groups.iter().all(|g| g.len() <= max_chars) {
            return groups;
        }
        k += 1;
    }
}

/// Group consecutive pieces into exactly `k` ranges (`k <= pieces.len()`)
fn group_pieces(pieces: &[Range<usize>], k: usize) -> Vec<Range<usize>> {
    let n = pieces.len();
    let k = k.clamp(1, n.max(1));
    if n == 0 {
        return Vec::new();
    }

    let total: usize = pieces.iter().map(|p| p.len()).sum();
    let target = total / k;

    let mut groups = Vec::with_capacity(k);
    let mut group_start = pieces[0].start;
    let mut acc = 0;

    for (i, piece) in pieces.iter().enumerate() {
        acc += piece.len();
        if groups.len() + 1 >= k {
            continue;
        }
        let pieces_left = n - i - 1;
        let groups_still_needed = k - groups.len() - 1;
        if acc >= target || pieces_left == groups_still_needed {
            groups.push(group_start..piece.end);
            group_start = piece.end;
            acc = 0;
        }
    }

    groups.push(group_start..pieces[n - 1].end);
    groups
}

/// Halve the largest splittable piece until there are `k` pieces
fn refine_to_count(text: &str, mut pieces: Vec<Range<usize>>, k: usize) -> Vec<Range<usize>> {
    while pieces.len() < k {
        let candidate = pieces
            .iter()
            .enumerate()
            .filter_map(|(i, p)| best_cut(text, p).map(|cut| (i, p.len(), cut)))
            .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)));

        let Some((index, _, cut)) = candidate else {
            break;
        };

        let piece = pieces[index].clone();
        pieces[index] = piece.start..cut;
        pieces.insert(index + 1, cut..piece.end);
    }
    pieces
}

/// Strongest cut inside `range`, nearest to its midpoint
fn best_cut(text: &str, range: &Range<usize>) -> Option<usize> {
    let candidates = cut_candidates(text, range);
    let strongest = candidates.iter().map(|(_, class)| *class).max()?;
    let mid = range.start + range.len() / 2;

    candidates
        .into_iter()
        .filter(|(_, class)| *class == strongest)
        .map(|(pos, _)| pos)
        .min_by_key(|pos| pos.abs_diff(mid))
}

/// Positions right after a whitespace run that has content before it
fn cut_candidates(text: &str, range: &Range<usize>) -> Vec<(usize, CutClass)> {
    let slice = &text[range.clone()];
    let mut out = Vec::new();
    let mut seen_content = false;
    let mut in_whitespace = false;
    let mut newlines = 0;

    for (i, c) in slice.char_indices() {
        if c.is_whitespace() {
            if c == '\n' {
                newlines += 1;
            }
            in_whitespace = true;
            continue;
        }

        if in_whitespace && seen_content {
            let class = match newlines {
                0 => CutClass::Space,
                1 => CutClass::Line,
                _ => CutClass::Paragraph,
            };
            out.push((range.start + i, class));
        }
        seen_content = true;
        in_whitespace = false;
        newlines = 0;
    }

    out
}

/// Re-attach the source chunk's surrounding whitespace to a translated chunk
pub fn restore_whitespace(source: &str, translated: &str) -> String {
    let leading = &source[..source.len() - source.trim_start().len()];
    let trailing = &source[source.trim_end().len()..];
    let body = translated.trim();

    let mut out = String::with_capacity(leading.len() + body.len() + trailing.len());
    out.push_str(leading);
    out.push_str(body);
    out.push_str(trailing);
    out
}
