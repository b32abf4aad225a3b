use regex::Regex;
use std::sync::OnceLock;

/// Runs of two or more word characters.
fn token_re() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r"(?u)\b\w\w+\b").expect("invalid regex"))
}

/// Lower-cases `text` and splits it into word tokens of at least two characters.
pub fn tokenize(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    token_re()
        .find_iter(&lower)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Word n-grams of every length in `min_n..=max_n`, space-joined, in text order.
pub fn ngrams(tokens: &[String], min_n: usize, max_n: usize) -> Vec<String> {
    let mut out = Vec::new();
    for n in min_n.max(1)..=max_n {
        if n > tokens.len() {
            break;
        }
        out.extend(tokens.windows(n).map(|w| w.join(" ")));
    }
    out
}

/// Whether `phrase` occurs in `text` bounded by non-alphanumeric characters
/// (or the ends of `text`). Both arguments are expected to be lower-cased.
pub fn contains_whole_word(text: &str, phrase: &str) -> bool {
    if phrase.is_empty() {
        return false;
    }
    text.match_indices(phrase).any(|(start, m)| {
        let before = text[..start].chars().next_back();
        let after = text[start + m.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_lowercases_and_drops_single_chars() {
        assert_eq!(tokenize("UBER a Trip #42!"), vec!["uber", "trip", "42"]);
    }

    #[test]
    fn tokenize_empty_input() {
        assert!(tokenize("  -- ").is_empty());
    }

    #[test]
    fn ngrams_unigrams_and_bigrams() {
        let tokens = tokenize("zomato pizza order");
        assert_eq!(
            ngrams(&tokens, 1, 2),
            vec!["zomato", "pizza", "order", "zomato pizza", "pizza order"]
        );
    }

    #[test]
    fn ngrams_longer_than_input_are_skipped() {
        let tokens = tokenize("pizza");
        assert_eq!(ngrams(&tokens, 1, 3), vec!["pizza"]);
    }

    #[test]
    fn whole_word_requires_boundaries() {
        assert!(contains_whole_word("paid uber trip", "uber"));
        assert!(contains_whole_word("uber", "uber"));
        assert!(contains_whole_word("ice cream, cone", "ice cream"));
        assert!(!contains_whole_word("smartphone", "mart"));
        assert!(!contains_whole_word("anything", ""));
    }

    #[test]
    fn whole_word_checks_every_occurrence() {
        assert!(contains_whole_word("smart mart", "mart"));
    }
}
