// Text similarity for duplicate-message detection.
//
// Sørensen-Dice coefficient over character bigrams of the normalized text.
// Linear in input length, symmetric, and insensitive to case and to how
// whitespace is laid out ("BUY  NOW" == "buy now").

use std::collections::HashMap;

/// Lowercase and collapse every run of whitespace into a single space.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for word in text.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.extend(word.chars().flat_map(char::to_lowercase));
    }
    out
}

/// Similarity of two raw messages in `[0.0, 1.0]`.
#[cfg(test)]
pub fn score(a: &str, b: &str) -> f64 {
    score_normalized(&normalize(a), &normalize(b))
}

/// Similarity in `[0.0, 1.0]` of two texts that already went through
/// [`normalize`]. Blank input scores 0 against anything, including another
/// blank, so empty messages never count as duplicates.
pub fn score_normalized(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }

    let a_bigrams = bigrams(a);
    let b_bigrams = bigrams(b);

    let a_total: usize = a_bigrams.values().sum();
    let b_total: usize = b_bigrams.values().sum();
    if a_total == 0 || b_total == 0 {
        // Single characters that are not equal share nothing.
        return 0.0;
    }

    // Iterate the smaller map so the pass stays O(min(n, m)).
    let (small, large) = if a_bigrams.len() <= b_bigrams.len() {
        (&a_bigrams, &b_bigrams)
    } else {
        (&b_bigrams, &a_bigrams)
    };

    let shared: usize = small
        .iter()
        .map(|(pair, count)| (*count).min(large.get(pair).copied().unwrap_or(0)))
        .sum();

    (2.0 * shared as f64) / (a_total + b_total) as f64
}

fn bigrams(text: &str) -> HashMap<(char, char), usize> {
    let mut counts = HashMap::new();
    let mut chars = text.chars();
    let Some(mut prev) = chars.next() else {
        return counts;
    };
    for next in chars {
        *counts.entry((prev, next)).or_insert(0) += 1;
        prev = next;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_text_scores_one() {
        assert_eq!(score("free nitro here", "free nitro here"), 1.0);
        assert_eq!(score("a", "a"), 1.0);
    }

    #[test]
    fn blank_text_scores_zero() {
        assert_eq!(score("", ""), 0.0);
        assert_eq!(score("   ", "\t\n"), 0.0);
        assert_eq!(score("", "hello"), 0.0);
    }

    #[test]
    fn case_and_whitespace_are_ignored() {
        assert_eq!(score("BUY   NOW\tcheap", "buy now cheap"), 1.0);
    }

    #[test]
    fn score_is_symmetric() {
        let pairs = [
            ("hello world", "hello there world"),
            ("join my server", "join our server today"),
            ("aaaa", "aa"),
            ("x", "xy"),
        ];
        for (a, b) in pairs {
            assert_eq!(score(a, b), score(b, a), "asymmetric for {a:?} / {b:?}");
        }
    }

    #[test]
    fn unrelated_text_scores_low() {
        assert!(score("good morning everyone", "zzz qqq") < 0.1);
    }

    #[test]
    fn near_duplicates_score_high() {
        let s = score("check out my stream at twitch", "check out my stream at twitch!!");
        assert!(s > 0.85, "score was {s}");
    }

    #[test]
    fn repeated_bigrams_are_counted_as_multisets() {
        // "aaaa" has three "aa" bigrams, "aa" has one: 2*1 / (3+1) = 0.5
        assert!((score("aaaa", "aa") - 0.5).abs() < 1e-9);
    }

    #[test]
    fn normalize_collapses_whitespace() {
        assert_eq!(normalize("  Hello \n  WORLD  "), "hello world");
    }
}
