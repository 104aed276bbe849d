//! The `search` module holds the two scan primitives of the query engine: lower-bound binary
//! search, run either directly over a sorted row range or through a sort-index table, and the
//! linear best-similarity scan used by the fuzzy fallbacks.
use crate::table::Table;

/// The `lower_bound` function returns the first row in `[start, end)` for which `is_less`
/// reports false, i.e. the insertion point of the searched element. `is_less(row)` must
/// answer whether the value at `row` orders strictly before the searched element, and the
/// range must be sorted under that order. Callers verify equality at the returned row
/// themselves.
pub fn lower_bound(start: i32, end: i32, mut is_less: impl FnMut(i32) -> bool) -> i32 {
    let (mut i, mut j) = (start, end);
    while i < j {
        let mid = (i + j) / 2;
        if is_less(mid) {
            i = mid + 1;
        } else {
            j = mid;
        }
    }
    i
}

/// The `lower_bound_indexed` function runs a lower-bound search over a content table that is
/// not itself sorted, through its sort-index table. `is_less` receives content-table rows.
///
/// Returns `(position, row)`: the insertion point in the index table, and the content row the
/// index holds there, clamped to the last entry so the caller can always verify equality.
/// The index table must not be empty.
pub fn lower_bound_indexed(index: &Table<i32>, mut is_less: impl FnMut(i32) -> bool) -> (i32, i32) {
    let len = index.len() as i32;
    let i = lower_bound(0, len, |position| is_less(index.get(position)));
    (i, index.get(i.min(len - 1)))
}

/// The `most_similar` function scans candidate rows in order and returns the maximum-scoring
/// one as `(score, rank, row)`, where `rank` is the candidate's position in the scan. Ties
/// break to the lowest rank, and a perfect score short-circuits the scan. Returns `None` when
/// there is no candidate.
pub fn most_similar(
    rows: impl IntoIterator<Item = i32>,
    mut score: impl FnMut(i32) -> f64,
) -> Option<(f64, usize, i32)> {
    let mut best: Option<(f64, usize, i32)> = None;
    for (rank, row) in rows.into_iter().enumerate() {
        let value = score(row);
        if value == 1. {
            return Some((value, rank, row));
        }
        if best.is_none_or(|(max, _, _)| value > max) {
            best = Some((value, rank, row));
        }
    }
    best
}
