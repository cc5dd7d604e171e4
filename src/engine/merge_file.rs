//! engine::merge_file
//!
//! Line-based three-way merge of one file.
//!
//! Both sides are diffed against the base with Myers' algorithm. Changes
//! from one side only are taken as they are. Changes from both sides that
//! overlap or touch each other form a conflict region, unless both sides
//! made the identical change. Conflict regions are written with markers:
//!
//! ```text
//! <<<<<<< ours
//! ours' lines
//! =======
//! theirs' lines
//! >>>>>>> theirs
//! ```
//!
//! Content holding a NUL byte is binary and never merged line by line.

use std::ops::Range;

use similar::{capture_diff_slices, Algorithm, DiffTag};

/// Labels written after the opening and closing conflict markers.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Labels<'a> {
    pub(crate) ours: &'a str,
    pub(crate) theirs: &'a str,
}

/// Result of merging one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum FileMerge {
    Clean(Vec<u8>),
    /// Merged content with conflict markers
    Conflicted(Vec<u8>),
    /// One side is binary; nothing was merged
    Binary,
}

/// A changed base range and what one side put there.
#[derive(Debug, Clone)]
struct Hunk {
    base: Range<usize>,
    side: Range<usize>,
}

fn is_binary(bytes: &[u8]) -> bool {
    bytes.contains(&0)
}

fn lines(bytes: &[u8]) -> Vec<&[u8]> {
    bytes.split_inclusive(|&b| b == b'\n').collect()
}

/// Changed regions of `side` relative to `base`, with adjacent edits
/// coalesced.
fn hunks(base: &[&[u8]], side: &[&[u8]]) -> Vec<Hunk> {
    let mut out: Vec<Hunk> = Vec::new();
    for op in capture_diff_slices(Algorithm::Myers, base, side) {
        let (tag, base_range, side_range) = op.as_tag_tuple();
        if tag == DiffTag::Equal {
            continue;
        }
        match out.last_mut() {
            Some(last) if last.base.end == base_range.start && last.side.end == side_range.start => {
                last.base.end = base_range.end;
                last.side.end = side_range.end;
            }
            _ => out.push(Hunk {
                base: base_range,
                side: side_range,
            }),
        }
    }
    out
}

/// The lines one side has over the base region `region`, given that side's
/// hunks inside the region.
fn side_lines<'a>(
    base: &[&'a [u8]],
    side: &[&'a [u8]],
    region: &Range<usize>,
    hunks: &[Hunk],
) -> Vec<&'a [u8]> {
    match (hunks.first(), hunks.last()) {
        (Some(first), Some(last)) => {
            let start = first.side.start - (first.base.start - region.start);
            let end = last.side.end + (region.end - last.base.end);
            side[start..end].to_vec()
        }
        _ => base[region.clone()].to_vec(),
    }
}

fn push_lines(out: &mut Vec<u8>, lines: &[&[u8]]) {
    for line in lines {
        out.extend_from_slice(line);
    }
}

fn push_marker(out: &mut Vec<u8>, marker: u8, size: usize, label: Option<&str>) {
    if out.last().is_some_and(|&b| b != b'\n') {
        out.push(b'\n');
    }
    out.extend(std::iter::repeat(marker).take(size));
    if let Some(label) = label {
        out.push(b' ');
        out.extend_from_slice(label.as_bytes());
    }
    out.push(b'\n');
}

/// Merge `ours` and `theirs` against their common `base`.
pub(crate) fn merge(
    base: &[u8],
    ours: &[u8],
    theirs: &[u8],
    labels: Labels<'_>,
    marker_size: usize,
) -> FileMerge {
    if is_binary(base) || is_binary(ours) || is_binary(theirs) {
        return if ours == theirs {
            FileMerge::Clean(ours.to_vec())
        } else if base == ours {
            FileMerge::Clean(theirs.to_vec())
        } else if base == theirs {
            FileMerge::Clean(ours.to_vec())
        } else {
            FileMerge::Binary
        };
    }

    let base_lines = lines(base);
    let our_lines = lines(ours);
    let their_lines = lines(theirs);
    let ours_hunks = hunks(&base_lines, &our_lines);
    let theirs_hunks = hunks(&base_lines, &their_lines);

    let mut out = Vec::with_capacity(ours.len().max(theirs.len()));
    let mut conflicted = false;
    let mut position = 0;
    let (mut i, mut j) = (0, 0);

    while i < ours_hunks.len() || j < theirs_hunks.len() {
        // Seed the region with whichever hunk starts first.
        let take_ours = match (ours_hunks.get(i), theirs_hunks.get(j)) {
            (Some(o), Some(t)) => o.base.start <= t.base.start,
            (Some(_), None) => true,
            _ => false,
        };
        let seed = if take_ours { &ours_hunks[i] } else { &theirs_hunks[j] };
        let mut region = seed.base.clone();
        let (ours_from, theirs_from) = (i, j);
        if take_ours {
            i += 1;
        } else {
            j += 1;
        }

        // Absorb every hunk that overlaps or touches the region.
        loop {
            if let Some(o) = ours_hunks.get(i).filter(|o| o.base.start <= region.end) {
                region.end = region.end.max(o.base.end);
                i += 1;
            } else if let Some(t) = theirs_hunks.get(j).filter(|t| t.base.start <= region.end) {
                region.end = region.end.max(t.base.end);
                j += 1;
            } else {
                break;
            }
        }

        push_lines(&mut out, &base_lines[position..region.start]);
        let ours_in = &ours_hunks[ours_from..i];
        let theirs_in = &theirs_hunks[theirs_from..j];
        let ours_side = side_lines(&base_lines, &our_lines, &region, ours_in);
        let theirs_side = side_lines(&base_lines, &their_lines, &region, theirs_in);

        if theirs_in.is_empty() || ours_side == theirs_side {
            push_lines(&mut out, &ours_side);
        } else if ours_in.is_empty() {
            push_lines(&mut out, &theirs_side);
        } else {
            conflicted = true;
            push_marker(&mut out, b'<', marker_size, Some(labels.ours));
            push_lines(&mut out, &ours_side);
            push_marker(&mut out, b'=', marker_size, None);
            push_lines(&mut out, &theirs_side);
            push_marker(&mut out, b'>', marker_size, Some(labels.theirs));
        }
        position = region.end;
    }
    push_lines(&mut out, &base_lines[position..]);

    if conflicted {
        FileMerge::Conflicted(out)
    } else {
        FileMerge::Clean(out)
    }
}
