//! Fuzzy string matching for pronunciation scoring
//!
//! A recognized phrase is compared to its target on two levels: every recognized
//! word is matched against its closest target word (with a bonus for common
//! pronunciation confusions), and the whole normalized strings are compared by
//! edit distance. The two ratios are blended into one similarity in `[0, 1]`.

use strsim::levenshtein;

/// Weight of the word-level ratio in the combined similarity
pub const WORD_WEIGHT: f64 = 0.7;
/// Weight of the character-level ratio in the combined similarity
pub const CHAR_WEIGHT: f64 = 0.3;

/// Score given to a word pair whose lengths differ by more than half
const LENGTH_MISMATCH_SCORE: f64 = 0.1;
const PHONETIC_BONUS: f64 = 0.2;

/// Sound classes learners commonly swap; matching within one class earns a bonus
const CONFUSION_CLASSES: [&str; 8] = ["aeiou", "bp", "td", "kg", "fv", "sz", "lr", "mn"];

/// Lowercase, drop everything outside `[a-z0-9]` and whitespace, collapse spaces
pub fn normalize_text(text: &str) -> String {
    let kept: String = text
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_whitespace())
        .collect();

    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Levenshtein distance counted in characters
pub fn edit_distance(a: &str, b: &str) -> usize {
    levenshtein(a, b)
}

/// `(longest - distance) / longest`, or 1.0 when both strings are empty
pub fn char_similarity(a: &str, b: &str) -> f64 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }

    let distance = edit_distance(a, b);
    (longest - distance) as f64 / longest as f64
}

/// Similarity of two single words, including the phonetic confusion bonus
pub fn word_pair_similarity(word1: &str, word2: &str) -> f64 {
    if word1 == word2 {
        return 1.0;
    }

    let len1 = word1.chars().count();
    let len2 = word2.chars().count();
    let longest = len1.max(len2);
    if len1.abs_diff(len2) as f64 > longest as f64 * 0.5 {
        return LENGTH_MISMATCH_SCORE;
    }

    let base = char_similarity(word1, word2);
    if phonetically_confusable(word1, word2) {
        (base + PHONETIC_BONUS).min(1.0)
    } else {
        base
    }
}

/// True when collapsing a single confusion class makes both words identical
fn phonetically_confusable(word1: &str, word2: &str) -> bool {
    CONFUSION_CLASSES
        .iter()
        .any(|class| collapse_class(word1, class) == collapse_class(word2, class))
}

fn collapse_class(word: &str, class: &str) -> String {
    word.chars()
        .map(|c| if class.contains(c) { '*' } else { c })
        .collect()
}

/// Average best-match similarity of the words in `phrase1` against `phrase2`
///
/// Both inputs are expected to be normalized already. The sum is divided by the
/// larger word count, so missing or extra words pull the ratio down.
pub fn word_similarity(phrase1: &str, phrase2: &str) -> f64 {
    let words1: Vec<&str> = phrase1.split_whitespace().collect();
    let words2: Vec<&str> = phrase2.split_whitespace().collect();

    let max_words = words1.len().max(words2.len());
    if max_words == 0 {
        return 1.0;
    }

    let matched: f64 = words1
        .iter()
        .map(|w1| {
            words2
                .iter()
                .map(|w2| word_pair_similarity(w1, w2))
                .fold(0.0, f64::max)
        })
        .sum();

    matched / max_words as f64
}

/// Blend of word-level and character-level similarity of two raw phrases
pub fn combined_similarity(recognized: &str, target: &str) -> f64 {
    let recognized = normalize_text(recognized);
    let target = normalize_text(target);

    if recognized == target {
        return 1.0;
    }

    let word = word_similarity(&recognized, &target);
    let character = char_similarity(&recognized, &target);

    (WORD_WEIGHT * word + CHAR_WEIGHT * character).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_normalize_strips_punctuation_and_spaces() {
        assert_eq!(normalize_text("  How ARE   you, today?! "), "how are you today");
        assert_eq!(normalize_text("It's 5 o'clock"), "its 5 oclock");
        assert_eq!(normalize_text("안녕 hello"), "hello");
        assert_eq!(normalize_text(""), "");
    }

    #[test]
    fn test_edit_distance_basics() {
        assert_eq!(edit_distance("kitten", "sitting"), 3);
        assert_eq!(edit_distance("", "abc"), 3);
        assert_eq!(edit_distance("same", "same"), 0);
    }

    #[test]
    fn test_char_similarity_empty_and_partial() {
        assert_eq!(char_similarity("", ""), 1.0);
        assert_eq!(char_similarity("abc", ""), 0.0);
        assert!((char_similarity("book", "back") - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_length_mismatch_gets_floor_score() {
        assert_eq!(word_pair_similarity("a", "apple"), LENGTH_MISMATCH_SCORE);
    }

    #[test]
    fn test_phonetic_bonus_for_confused_consonants() {
        // "bat" vs "pat": one substitution, and b/p are in the same class
        let sim = word_pair_similarity("bat", "pat");
        assert!((sim - (2.0 / 3.0 + 0.2)).abs() < 1e-9);

        // "light" vs "right": l/r confusion
        let sim = word_pair_similarity("light", "right");
        assert!((sim - 1.0).abs() < 1e-9);

        // "cat" vs "dog" share no class collapse
        let sim = word_pair_similarity("cat", "dog");
        assert_eq!(sim, 0.0);
    }

    #[test]
    fn test_word_similarity_missing_words() {
        let sim = word_similarity("how are you", "how are you today");
        assert!((sim - 0.75).abs() < 1e-9);
        assert_eq!(word_similarity("", "nice to meet you"), 0.0);
    }

    #[test]
    fn test_combined_similarity_exact_match() {
        assert_eq!(combined_similarity("How are you today?", "how are you today"), 1.0);
    }

    #[test]
    fn test_combined_similarity_empty_recognition_is_low() {
        let sim = combined_similarity("", "Nice to meet you.");
        assert!(sim < 0.05, "got {sim}");
    }

    proptest! {
        #[test]
        fn prop_self_similarity_is_one(s in "\\PC{0,40}") {
            prop_assert_eq!(combined_similarity(&s, &s), 1.0);
        }

        #[test]
        fn prop_similarity_against_empty_below_one(s in "[a-z]{1,12}( [a-z]{1,12}){0,4}") {
            prop_assert!(combined_similarity(&s, "") < 1.0);
        }

        #[test]
        fn prop_edit_distance_symmetric(a in "\\PC{0,30}", b in "\\PC{0,30}") {
            prop_assert_eq!(edit_distance(&a, &b), edit_distance(&b, &a));
        }

        #[test]
        fn prop_combined_similarity_in_unit_range(a in "[a-zA-Z ,.?]{0,40}", b in "[a-zA-Z ,.?]{0,40}") {
            let sim = combined_similarity(&a, &b);
            prop_assert!((0.0..=1.0).contains(&sim));
        }
    }
}
