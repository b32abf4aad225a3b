//! TF-IDF vectorizer over word n-grams.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::text::{ngrams, tokenize};

/// Sparse feature vector: `(feature index, value)` pairs sorted by index.
pub type SparseVector = Vec<(usize, f64)>;

/// TF-IDF vectorizer with smoothed idf and L2-normalised rows.
///
/// The vocabulary is kept sorted so that fitting the same corpus always
/// assigns the same feature indices. Stop words are removed before n-grams
/// are formed, so they never become features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TfIdfVectorizer {
    ngram_range: (usize, usize),
    stop_words: BTreeSet<String>,
    vocabulary: BTreeMap<String, usize>,
    idf: Vec<f64>,
}

impl TfIdfVectorizer {
    pub fn new(min_n: usize, max_n: usize) -> Self {
        Self {
            ngram_range: (min_n.max(1), max_n.max(min_n.max(1))),
            stop_words: BTreeSet::new(),
            vocabulary: BTreeMap::new(),
            idf: Vec::new(),
        }
    }

    pub fn with_stop_words<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.stop_words = words
            .into_iter()
            .map(|w| w.as_ref().to_lowercase())
            .collect();
        self
    }

    /// Fit the vocabulary and idf weights on `documents`.
    pub fn fit<S: AsRef<str>>(&mut self, documents: &[S]) {
        let mut document_frequency: BTreeMap<String, usize> = BTreeMap::new();
        for doc in documents {
            let terms: HashSet<String> = self.terms(doc.as_ref()).into_iter().collect();
            for term in terms {
                *document_frequency.entry(term).or_insert(0) += 1;
            }
        }

        let n = documents.len() as f64;
        self.vocabulary = document_frequency
            .keys()
            .enumerate()
            .map(|(idx, term)| (term.clone(), idx))
            .collect();
        // idf = ln((1 + n) / (1 + df)) + 1
        self.idf = document_frequency
            .values()
            .map(|&df| ((1.0 + n) / (1.0 + df as f64)).ln() + 1.0)
            .collect();
    }

    /// Transform a document into an L2-normalised TF-IDF vector.
    ///
    /// Terms outside the fitted vocabulary are ignored; a document with no
    /// known terms yields an empty vector.
    pub fn transform(&self, document: &str) -> SparseVector {
        let mut counts: BTreeMap<usize, f64> = BTreeMap::new();
        for term in self.terms(document) {
            if let Some(&idx) = self.vocabulary.get(&term) {
                *counts.entry(idx).or_insert(0.0) += 1.0;
            }
        }

        let mut vector: SparseVector = counts
            .into_iter()
            .map(|(idx, tf)| (idx, tf * self.idf[idx]))
            .collect();

        let norm = vector.iter().map(|(_, v)| v * v).sum::<f64>().sqrt();
        if norm > 0.0 {
            for (_, v) in &mut vector {
                *v /= norm;
            }
        }
        vector
    }

    pub fn fit_transform<S: AsRef<str>>(&mut self, documents: &[S]) -> Vec<SparseVector> {
        self.fit(documents);
        documents.iter().map(|d| self.transform(d.as_ref())).collect()
    }

    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary.len()
    }

    pub fn ngram_range(&self) -> (usize, usize) {
        self.ngram_range
    }

    /// Structural sanity check for a deserialized vectorizer.
    pub(crate) fn is_consistent(&self) -> bool {
        let size = self.vocabulary.len();
        self.idf.len() == size
            && self.vocabulary.values().all(|&idx| idx < size)
            && self.idf.iter().all(|v| v.is_finite())
            && self.ngram_range.0 >= 1
            && self.ngram_range.0 <= self.ngram_range.1
    }

    fn terms(&self, text: &str) -> Vec<String> {
        let tokens: Vec<String> = tokenize(text)
            .into_iter()
            .filter(|t| !self.stop_words.contains(t))
            .collect();
        ngrams(&tokens, self.ngram_range.0, self.ngram_range.1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fitted() -> TfIdfVectorizer {
        let mut v = TfIdfVectorizer::new(1, 2);
        v.fit(&["pizza order", "uber ride", "pizza"]);
        v
    }

    #[test]
    fn vocabulary_includes_bigrams_in_sorted_order() {
        let v = fitted();
        let terms: Vec<&str> = v.vocabulary.keys().map(String::as_str).collect();
        assert_eq!(terms, vec!["order", "pizza", "pizza order", "ride", "uber", "uber ride"]);
        assert_eq!(v.vocabulary["order"], 0);
    }

    #[test]
    fn stop_words_never_become_features() {
        let mut v = TfIdfVectorizer::new(1, 2).with_stop_words(["Paid", "upi"]);
        v.fit(&["paid pizza", "upi pizza order"]);
        let terms: Vec<&str> = v.vocabulary.keys().map(String::as_str).collect();
        assert_eq!(terms, vec!["order", "pizza", "pizza order"]);
        assert!(v.transform("paid via upi").is_empty());
        assert!(!v.transform("upi pizza").is_empty());
    }

    #[test]
    fn frequent_terms_get_lower_idf() {
        let v = fitted();
        let pizza = v.idf[v.vocabulary["pizza"]];
        let uber = v.idf[v.vocabulary["uber"]];
        assert!(pizza < uber);
        // ln(4/3) + 1
        assert!((pizza - ((4.0f64 / 3.0).ln() + 1.0)).abs() < 1e-12);
    }

    #[test]
    fn transform_is_unit_length() {
        let v = fitted();
        let x = v.transform("Pizza order via Uber");
        let norm: f64 = x.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
        assert!((norm - 1.0).abs() < 1e-9);
        assert!(x.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[test]
    fn unknown_terms_give_empty_vector() {
        assert!(fitted().transform("grocery run").is_empty());
    }

    #[test]
    fn refitting_is_deterministic() {
        let a = fitted();
        let b = fitted();
        assert_eq!(a, b);
    }

    #[test]
    fn fitted_vectorizer_is_consistent() {
        assert!(fitted().is_consistent());
        let mut broken = fitted();
        broken.idf.pop();
        assert!(!broken.is_consistent());
    }
}
