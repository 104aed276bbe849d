//! The `similarity` module computes the string-similarity score used to tolerate user error
//! in city and street names. The score is a Jaccard index over the union of unigrams and
//! bigrams, weighted by substring length, so that a shared bigram counts twice as much as a
//! shared letter.
use std::collections::HashSet;

/// A unigram is stored as `(c, None)` and a bigram as `(a, Some(b))`.
type Slice = (char, Option<char>);

fn slices(text: &str) -> HashSet<Slice> {
    let mut set = HashSet::with_capacity(2 * text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        set.insert((c, None));
        if let Some(&next) = chars.peek() {
            set.insert((c, Some(next)));
        }
    }
    set
}

fn weight(slice: &Slice) -> u32 {
    match slice.1 {
        Some(_) => 2,
        None => 1,
    }
}

/// The `Similarity` struct holds the slice set of one side of the comparison, so that a query
/// string is decomposed once and scored against an entire candidate window.
#[derive(Debug, Clone)]
pub struct Similarity {
    slice_set: HashSet<Slice>,
    slice_set_score: u32,
}

impl Similarity {
    /// The `new` method decomposes `text` into its unigrams and bigrams and caches the total
    /// weight of the set.
    pub fn new(text: &str) -> Self {
        let slice_set = slices(text);
        let slice_set_score = slice_set.iter().map(weight).sum();
        Similarity {
            slice_set,
            slice_set_score,
        }
    }

    /// The `score` method returns the similarity between the cached string and `other`,
    /// a value in `[0, 1]`. Two empty strings score zero.
    pub fn score(&self, other: &str) -> f64 {
        let other_set = slices(other);
        let other_score: u32 = other_set.iter().map(weight).sum();

        let intersection_score: u32 = other_set
            .iter()
            .filter(|slice| self.slice_set.contains(slice))
            .map(weight)
            .sum();

        let union_score = self.slice_set_score + other_score - intersection_score;
        // The union is empty only when both strings are.
        if union_score == 0 {
            return 0.;
        }
        intersection_score as f64 / union_score as f64
    }
}
