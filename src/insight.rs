//! Contradiction detection between free-text insight strings.
//!
//! The default implementation is a fixed antonym lexicon over lowercased
//! text. It is deliberately behind a trait so an embedding-similarity or
//! rule-engine comparator can replace it without touching the conflict and
//! weighting math.

/// Decides whether two natural-language findings contradict each other.
pub trait InsightComparator: Send + Sync {
    fn contradicts(&self, a: &str, b: &str) -> bool;
}

const ANTONYM_PAIRS: &[(&str, &str)] = &[
    ("good", "poor"),
    ("high", "low"),
    ("stable", "unstable"),
    ("clear", "unclear"),
    ("consistent", "inconsistent"),
];

/// Lexicon-based comparator: two insights contradict when one contains a
/// marker word and the other contains its antonym, case-insensitively.
/// Matching is on whole words ("unstable" must not match "stable").
#[derive(Debug, Clone, Default)]
pub struct LexiconInsightComparator;

fn contains_word(text: &str, word: &str) -> bool {
    text.split(|c: char| !c.is_alphanumeric())
        .any(|token| token.eq_ignore_ascii_case(word))
}

impl InsightComparator for LexiconInsightComparator {
    fn contradicts(&self, a: &str, b: &str) -> bool {
        ANTONYM_PAIRS.iter().any(|(left, right)| {
            (contains_word(a, left) && contains_word(b, right))
                || (contains_word(a, right) && contains_word(b, left))
        })
    }
}

/// Compatibility of two insight lists: 1.0 when both are empty, 0.5 when
/// exactly one is, otherwise the fraction of cross pairs that do not
/// contradict.
pub fn compatibility(comparator: &dyn InsightComparator, a: &[String], b: &[String]) -> f64 {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => 1.0,
        (true, false) | (false, true) => 0.5,
        (false, false) => {
            let contradictory = a
                .iter()
                .flat_map(|x| b.iter().map(move |y| (x, y)))
                .filter(|(x, y)| comparator.contradicts(x, y))
                .count();
            1.0 - contradictory as f64 / (a.len() * b.len()) as f64
        }
    }
}
