//! Line diff between the current and proposed content of a note
//!
//! Longest-common-subsequence over lines, after trimming the shared prefix and
//! suffix so that the usual "small edit in a big note" case stays cheap. The
//! LCS is found with Hirschberg's divide and conquer, so memory stays linear
//! in the number of lines.

use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiffOp {
    Equal,
    Insert,
    Delete,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiffLine {
    pub op: DiffOp,
    pub text: String,
}

impl DiffLine {
    fn new(op: DiffOp, text: &str) -> Self {
        DiffLine {
            op,
            text: text.to_string(),
        }
    }
}

impl fmt::Display for DiffLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = match self.op {
            DiffOp::Equal => ' ',
            DiffOp::Insert => '+',
            DiffOp::Delete => '-',
        };
        write!(f, "{} {}", marker, self.text)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DiffSummary {
    pub inserted: usize,
    pub deleted: usize,
    pub unchanged: usize,
}

impl DiffSummary {
    pub fn of(lines: &[DiffLine]) -> Self {
        lines.iter().fold(DiffSummary::default(), |mut acc, line| {
            match line.op {
                DiffOp::Equal => acc.unchanged += 1,
                DiffOp::Insert => acc.inserted += 1,
                DiffOp::Delete => acc.deleted += 1,
            }
            acc
        })
    }

    pub fn is_identical(&self) -> bool {
        self.inserted == 0 && self.deleted == 0
    }
}

impl fmt::Display for DiffSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "+{} -{}", self.inserted, self.deleted)
    }
}

/// Classify every line of `old` and `new` as kept, deleted or inserted.
///
/// Deletions are emitted before insertions at each point of change.
pub fn line_diff(old: &str, new: &str) -> Vec<DiffLine> {
    let a: Vec<&str> = old.lines().collect();
    let b: Vec<&str> = new.lines().collect();

    let prefix = a.iter().zip(&b).take_while(|(x, y)| x == y).count();
    let suffix = a[prefix..]
        .iter()
        .rev()
        .zip(b[prefix..].iter().rev())
        .take_while(|(x, y)| x == y)
        .count();

    let mid_a = &a[prefix..a.len() - suffix];
    let mid_b = &b[prefix..b.len() - suffix];

    let mut out = Vec::with_capacity(a.len().max(b.len()));
    out.extend(a[..prefix].iter().map(|l| DiffLine::new(DiffOp::Equal, l)));
    diff_middle(mid_a, mid_b, &mut out);
    out.extend(a[a.len() - suffix..].iter().map(|l| DiffLine::new(DiffOp::Equal, l)));
    out
}

/// Past this many line comparisons the changed region is shown as one
/// replacement block instead of being aligned.
const MAX_DIFF_WORK: usize = 16_000_000;

fn diff_middle<'a>(a: &[&'a str], b: &[&'a str], out: &mut Vec<DiffLine>) {
    let mut matches = Vec::new();
    if a.len().saturating_mul(b.len()) <= MAX_DIFF_WORK {
        lcs_matches(a, b, 0, 0, &mut matches);
    } else {
        tracing::debug!(old = a.len(), new = b.len(), "Diff too large to align, showing replacement");
    }

    let (mut i, mut j) = (0, 0);
    for (mi, mj) in matches {
        out.extend(a[i..mi].iter().map(|l| DiffLine::new(DiffOp::Delete, l)));
        out.extend(b[j..mj].iter().map(|l| DiffLine::new(DiffOp::Insert, l)));
        out.push(DiffLine::new(DiffOp::Equal, a[mi]));
        i = mi + 1;
        j = mj + 1;
    }
    out.extend(a[i..].iter().map(|l| DiffLine::new(DiffOp::Delete, l)));
    out.extend(b[j..].iter().map(|l| DiffLine::new(DiffOp::Insert, l)));
}

/// Push the index pairs of one longest common subsequence, in order.
fn lcs_matches<'a>(
    a: &[&'a str],
    b: &[&'a str],
    a_off: usize,
    b_off: usize,
    matches: &mut Vec<(usize, usize)>,
) {
    if a.is_empty() || b.is_empty() {
        return;
    }
    if a.len() == 1 {
        if let Some(j) = b.iter().position(|l| *l == a[0]) {
            matches.push((a_off, b_off + j));
        }
        return;
    }

    let mid = a.len() / 2;
    let forward = lcs_lengths(a[..mid].iter(), b.iter(), b.len());
    let backward = lcs_lengths(a[mid..].iter().rev(), b.iter().rev(), b.len());

    // Split b where the two halves together keep the longest subsequence
    let m = b.len();
    let split = (0..=m)
        .max_by_key(|&k| (forward[k] + backward[m - k], std::cmp::Reverse(k)))
        .unwrap_or(0);

    lcs_matches(&a[..mid], &b[..split], a_off, b_off, matches);
    lcs_matches(&a[mid..], &b[split..], a_off + mid, b_off + split, matches);
}

/// Last row of the LCS table: entry `k` is the LCS length of all of `a`
/// against the first `k` items of `b`.
fn lcs_lengths<'s, 'a: 's, A, B>(a: A, b: B, m: usize) -> Vec<usize>
where
    A: Iterator<Item = &'s &'a str>,
    B: Iterator<Item = &'s &'a str> + Clone,
{
    let mut prev = vec![0; m + 1];
    let mut cur = vec![0; m + 1];
    for x in a {
        for (j, y) in b.clone().enumerate() {
            cur[j + 1] = if x == y {
                prev[j] + 1
            } else {
                prev[j + 1].max(cur[j])
            };
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ops(lines: &[DiffLine]) -> Vec<(DiffOp, &str)> {
        lines.iter().map(|l| (l.op, l.text.as_str())).collect()
    }

    #[test]
    fn test_single_line_replacement() {
        let diff = line_diff("line1\nline2", "line1\nline3");
        assert_eq!(
            ops(&diff),
            vec![
                (DiffOp::Equal, "line1"),
                (DiffOp::Delete, "line2"),
                (DiffOp::Insert, "line3"),
            ]
        );
    }

    #[test]
    fn test_new_file_is_all_insertions() {
        let diff = line_diff("", "# Title\n\nBody");
        assert!(diff.iter().all(|l| l.op == DiffOp::Insert));
        assert_eq!(diff.len(), 3);
    }

    #[test]
    fn test_identical_content() {
        let text = "a\nb\nc";
        let summary = DiffSummary::of(&line_diff(text, text));
        assert!(summary.is_identical());
        assert_eq!(summary.unchanged, 3);
    }

    #[test]
    fn test_insert_in_the_middle_keeps_context() {
        let diff = line_diff("a\nb\nc\nd", "a\nb\nX\nc\nd");
        assert_eq!(
            ops(&diff),
            vec![
                (DiffOp::Equal, "a"),
                (DiffOp::Equal, "b"),
                (DiffOp::Insert, "X"),
                (DiffOp::Equal, "c"),
                (DiffOp::Equal, "d"),
            ]
        );
    }

    #[test]
    fn test_interleaved_changes() {
        let diff = line_diff("a\nb\nc\nd\ne", "a\nc\nd2\ne\nf");
        let summary = DiffSummary::of(&diff);
        assert_eq!(summary, DiffSummary { inserted: 2, deleted: 2, unchanged: 3 });
        assert_eq!(
            ops(&diff),
            vec![
                (DiffOp::Equal, "a"),
                (DiffOp::Delete, "b"),
                (DiffOp::Equal, "c"),
                (DiffOp::Delete, "d"),
                (DiffOp::Insert, "d2"),
                (DiffOp::Equal, "e"),
                (DiffOp::Insert, "f"),
            ]
        );
    }

    fn numbered(count: usize, changed: impl Fn(usize) -> bool) -> String {
        (0..count)
            .map(|i| if changed(i) { format!("line {i} edited") } else { format!("line {i}") })
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_scattered_edits_in_a_long_note() {
        let old = numbered(2000, |_| false);
        let new = numbered(2000, |i| i % 10 == 5);
        let diff = line_diff(&old, &new);

        assert_eq!(
            DiffSummary::of(&diff),
            DiffSummary { inserted: 200, deleted: 200, unchanged: 1800 }
        );
        assert_eq!(
            ops(&diff[4..8]),
            vec![
                (DiffOp::Equal, "line 4"),
                (DiffOp::Delete, "line 5"),
                (DiffOp::Insert, "line 5 edited"),
                (DiffOp::Equal, "line 6"),
            ]
        );
    }

    #[test]
    fn test_full_rewrite_of_a_huge_note() {
        let old = (0..12000).map(|i| format!("old {i}")).collect::<Vec<_>>().join("\n");
        let new = (0..12000).map(|i| format!("new {i}")).collect::<Vec<_>>().join("\n");
        let diff = line_diff(&old, &new);

        assert_eq!(
            DiffSummary::of(&diff),
            DiffSummary { inserted: 12000, deleted: 12000, unchanged: 0 }
        );
        assert!(diff[..12000].iter().all(|l| l.op == DiffOp::Delete));
        assert!(diff[12000..].iter().all(|l| l.op == DiffOp::Insert));
    }
}
