//! Content merge capability
//!
//! Tree merging and conflict materialization consume file-content merging
//! through the [`ContentMerger`] trait. The engine never fails when content
//! cannot be merged: the merger reports [`MergeOutcome::Conflicted`] with a
//! marker-annotated payload, and callers record the conflict as data.
//!
//! [`LineMerger`] is the default implementation: a line-oriented three-way
//! merge that applies non-overlapping edits from both sides and emits
//! standard 7-character conflict markers when edits collide.

/// Result of merging two versions of a file against a common base
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Merge succeeded; the payload is the merged content
    Resolved(Vec<u8>),
    /// Merge could not be resolved; the payload carries conflict markers
    Conflicted(Vec<u8>),
}

impl MergeOutcome {
    /// The merged or marker-annotated bytes
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            MergeOutcome::Resolved(b) | MergeOutcome::Conflicted(b) => b,
        }
    }

    /// Whether this outcome carries unresolved conflicts
    pub fn is_conflicted(&self) -> bool {
        matches!(self, MergeOutcome::Conflicted(_))
    }
}

/// Three-way file content merge capability
pub trait ContentMerger: Send + Sync + std::fmt::Debug {
    /// Merge `left` and `right` against their common `base`
    fn merge(&self, base: &[u8], left: &[u8], right: &[u8]) -> MergeOutcome;
}

/// Default line-oriented three-way merger
#[derive(Debug, Clone, Copy, Default)]
pub struct LineMerger;

/// Line count above which the quadratic alignment is skipped and divergent
/// files conflict wholesale
const MAX_MERGE_LINES: usize = 10_000;

impl ContentMerger for LineMerger {
    fn merge(&self, base: &[u8], left: &[u8], right: &[u8]) -> MergeOutcome {
        if left == right {
            return MergeOutcome::Resolved(left.to_vec());
        }
        if left == base {
            return MergeOutcome::Resolved(right.to_vec());
        }
        if right == base {
            return MergeOutcome::Resolved(left.to_vec());
        }
        match merge_lines(base, left, right) {
            Some(merged) => MergeOutcome::Resolved(merged),
            None => MergeOutcome::Conflicted(render_conflict(base, left, right)),
        }
    }
}

/// An edit replacing a range of base lines with a run of side lines
#[derive(Debug, Clone, PartialEq, Eq)]
struct Edit<'a> {
    /// Replaced base range, half open
    base_start: usize,
    base_end: usize,
    /// Replacement lines from the edited side
    lines: Vec<&'a [u8]>,
}

impl Edit<'_> {
    fn is_insertion(&self) -> bool {
        self.base_start == self.base_end
    }
}

/// Line-level three-way merge of non-overlapping edits
fn merge_lines(base: &[u8], left: &[u8], right: &[u8]) -> Option<Vec<u8>> {
    let b = split_lines(base);
    let l = split_lines(left);
    let r = split_lines(right);
    if b.len() > MAX_MERGE_LINES || l.len() > MAX_MERGE_LINES || r.len() > MAX_MERGE_LINES {
        return None;
    }

    let left_edits = diff_edits(&b, &l);
    let right_edits = diff_edits(&b, &r);

    // Interleave the two edit scripts over base positions. Overlapping edits
    // that disagree make the whole file a conflict.
    let mut out: Vec<&[u8]> = Vec::new();
    let mut cursor = 0;
    let (mut li, mut ri) = (0, 0);

    while li < left_edits.len() || ri < right_edits.len() {
        let le = left_edits.get(li);
        let re = right_edits.get(ri);

        let (edit, from_left) = match (le, re) {
            (Some(a), Some(b2)) => {
                if edits_collide(a, b2) {
                    if a == b2 {
                        // Same edit on both sides; apply once
                        li += 1;
                        ri += 1;
                        (a, true)
                    } else {
                        return None;
                    }
                } else if (a.base_start, !a.is_insertion()) <= (b2.base_start, !b2.is_insertion()) {
                    li += 1;
                    (a, true)
                } else {
                    ri += 1;
                    (b2, false)
                }
            }
            (Some(a), None) => {
                li += 1;
                (a, true)
            }
            (None, Some(b2)) => {
                ri += 1;
                (b2, false)
            }
            (None, None) => unreachable!(),
        };
        let _ = from_left;

        out.extend_from_slice(&b[cursor..edit.base_start]);
        out.extend_from_slice(&edit.lines);
        cursor = edit.base_end.max(cursor);
    }
    out.extend_from_slice(&b[cursor..]);

    let mut merged = Vec::new();
    for line in out {
        merged.extend_from_slice(line);
    }
    Some(merged)
}

/// Whether two edits touch conflicting base regions
fn edits_collide(a: &Edit, b: &Edit) -> bool {
    if a.is_insertion() && b.is_insertion() {
        return a.base_start == b.base_start;
    }
    a.base_start < b.base_end && b.base_start < a.base_end
}

/// Compute the edit script turning `base` into `side` via an LCS alignment
fn diff_edits<'a>(base: &[&'a [u8]], side: &[&'a [u8]]) -> Vec<Edit<'a>> {
    let n = base.len();
    let m = side.len();

    // LCS length table
    let mut dp = vec![0u32; (n + 1) * (m + 1)];
    let idx = |i: usize, j: usize| i * (m + 1) + j;
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            dp[idx(i, j)] = if base[i] == side[j] {
                dp[idx(i + 1, j + 1)] + 1
            } else {
                dp[idx(i + 1, j)].max(dp[idx(i, j + 1)])
            };
        }
    }

    // Walk the table, emitting an edit for each run of non-matching lines
    let mut edits = Vec::new();
    let (mut i, mut j) = (0, 0);
    let (mut edit_base_start, mut edit_lines): (Option<usize>, Vec<&[u8]>) = (None, Vec::new());
    while i < n || j < m {
        if i < n && j < m && base[i] == side[j] {
            if let Some(start) = edit_base_start.take() {
                edits.push(Edit {
                    base_start: start,
                    base_end: i,
                    lines: std::mem::take(&mut edit_lines),
                });
            }
            i += 1;
            j += 1;
        } else {
            if edit_base_start.is_none() {
                edit_base_start = Some(i);
            }
            if j < m && (i == n || dp[idx(i, j + 1)] >= dp[idx(i + 1, j)]) {
                edit_lines.push(side[j]);
                j += 1;
            } else {
                i += 1;
            }
        }
    }
    if let Some(start) = edit_base_start {
        edits.push(Edit {
            base_start: start,
            base_end: i,
            lines: edit_lines,
        });
    }
    edits
}

/// Split into lines keeping terminators, so concatenation reproduces input
fn split_lines(bytes: &[u8]) -> Vec<&[u8]> {
    let mut lines = Vec::new();
    let mut start = 0;
    for (i, &c) in bytes.iter().enumerate() {
        if c == b'\n' {
            lines.push(&bytes[start..=i]);
            start = i + 1;
        }
    }
    if start < bytes.len() {
        lines.push(&bytes[start..]);
    }
    lines
}

/// Render an unresolved three-way conflict with standard markers
///
/// Used both by [`LineMerger`] and by working-copy materialization of
/// conflict tree entries.
pub fn render_conflict(base: &[u8], left: &[u8], right: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"<<<<<<< left\n");
    push_terminated(&mut out, left);
    out.extend_from_slice(b"||||||| base\n");
    push_terminated(&mut out, base);
    out.extend_from_slice(b"=======\n");
    push_terminated(&mut out, right);
    out.extend_from_slice(b">>>>>>> right\n");
    out
}

fn push_terminated(out: &mut Vec<u8>, content: &[u8]) {
    out.extend_from_slice(content);
    if !content.is_empty() && !content.ends_with(b"\n") {
        out.push(b'\n');
    }
}
