//! Entity similarity scoring used by `findSimilarEntities` (spec §4.5):
//! name similarity via normalized Levenshtein distance, alias overlap
//! via Jaccard similarity on lowercased alias sets.

use std::collections::HashSet;

pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (n, m) = (a.len(), b.len());

    if n == 0 {
        return m;
    }
    if m == 0 {
        return n;
    }

    let mut prev: Vec<usize> = (0..=m).collect();
    let mut curr = vec![0usize; m + 1];

    for i in 1..=n {
        curr[0] = i;
        for j in 1..=m {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[m]
}

/// `(longer.length - editDistance) / longer.length`, in `[0, 1]`.
pub fn name_similarity(a: &str, b: &str) -> f64 {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    let longer = a.chars().count().max(b.chars().count());
    if longer == 0 {
        return 1.0;
    }
    let distance = levenshtein(&a, &b);
    (longer as f64 - distance as f64) / longer as f64
}

/// Jaccard similarity on lowercased alias sets.
pub fn alias_overlap(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let a: HashSet<String> = a.iter().map(|s| s.to_lowercase()).collect();
    let b: HashSet<String> = b.iter().map(|s| s.to_lowercase()).collect();
    let intersection = a.intersection(&b).count();
    let union = a.union(&b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_names_score_one() {
        assert_eq!(name_similarity("Acme", "Acme"), 1.0);
    }

    #[test]
    fn close_names_score_above_threshold() {
        let score = name_similarity("Acme", "ACME Inc");
        assert!(score > 0.0 && score < 1.0);
    }

    #[test]
    fn disjoint_alias_sets_score_zero() {
        let a: HashSet<String> = ["x".into()].into_iter().collect();
        let b: HashSet<String> = ["y".into()].into_iter().collect();
        assert_eq!(alias_overlap(&a, &b), 0.0);
    }
}
