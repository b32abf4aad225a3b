use serde::{Deserialize, Serialize};
use std::fmt;

/// Label returned when neither the model nor the keyword rules produce a category.
pub const OTHER_CATEGORY: &str = "Other";

/// Which stage of the categorization policy produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationSource {
    Model,
    Rule,
    Default,
}

impl fmt::Display for ClassificationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassificationSource::Model => write!(f, "model"),
            ClassificationSource::Rule => write!(f, "rule"),
            ClassificationSource::Default => write!(f, "default"),
        }
    }
}

impl std::str::FromStr for ClassificationSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "model" => Ok(ClassificationSource::Model),
            "rule" => Ok(ClassificationSource::Rule),
            "default" => Ok(ClassificationSource::Default),
            other => Err(format!("Unknown classification source: '{other}'")),
        }
    }
}

/// A suggested category for a transaction description.
///
/// Produced fresh for every request. Callers are free to replace `category`
/// before persisting the transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub category: String,
    /// Confidence in the suggestion (0.0–1.0). Rule hits are always 1.0.
    pub confidence: f32,
    pub source: ClassificationSource,
}

impl ClassificationResult {
    pub fn model(category: impl Into<String>, confidence: f32) -> Self {
        Self {
            category: category.into(),
            confidence: confidence.clamp(0.0, 1.0),
            source: ClassificationSource::Model,
        }
    }

    pub fn rule(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            confidence: 1.0,
            source: ClassificationSource::Rule,
        }
    }

    pub fn fallback() -> Self {
        Self {
            category: OTHER_CATEGORY.to_string(),
            confidence: 0.0,
            source: ClassificationSource::Default,
        }
    }
}

/// How keyword phrases are compared against a description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// The phrase may occur anywhere, including inside a longer word.
    #[default]
    Substring,
    /// The phrase must be bounded by non-alphanumeric characters or the text edges.
    WholeWord,
}

impl std::str::FromStr for MatchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "substring" | "contains" => Ok(MatchMode::Substring),
            "whole_word" | "word" => Ok(MatchMode::WholeWord),
            other => Err(format!("Unknown match mode: '{other}'")),
        }
    }
}

/// Template taxonomy written for new installs. Every row carries keywords;
/// [`OTHER_CATEGORY`] is implied rather than declared.
pub const DEFAULT_CATEGORIES: &[(&str, &[&str])] = &[
    (
        "Food",
        &["restaurant", "cafe", "coffee", "lunch", "dinner", "snack", "pizza", "burger"],
    ),
    (
        "Transport",
        &[
            "uber", "ola", "taxi", "cab", "bus", "train", "fuel", "petrol", "diesel", "metro",
            "toll",
        ],
    ),
    (
        "Groceries",
        &[
            "grocery",
            "supermarket",
            "mart",
            "vegetable",
            "veg",
            "fruit",
            "milk",
            "dairy",
            "kirana",
            "bigbasket",
        ],
    ),
    ("Rent", &["rent", "lease", "apartment", "room", "pg", "hostel"]),
    (
        "Entertainment",
        &["movie", "cinema", "netflix", "spotify", "hotstar", "game", "concert", "theatre"],
    ),
    (
        "Bills",
        &[
            "electricity",
            "water",
            "internet",
            "broadband",
            "wifi",
            "phone",
            "mobile",
            "recharge",
            "gas",
            "dth",
            "bill",
        ],
    ),
    (
        "Shopping",
        &["shopping", "mall", "clothes", "electronics", "shoes", "amazon", "flipkart", "myntra"],
    ),
    ("Health", &["pharmacy", "medical", "medicine", "doctor", "hospital", "clinic"]),
    ("Education", &["tuition", "course", "exam", "book", "coaching", "udemy", "coursera"]),
    (
        "Travel",
        &["flight", "airline", "hotel", "booking", "trip", "airbnb", "luggage", "tourism"],
    ),
    (
        "Income",
        &["salary", "stipend", "refund", "interest", "bonus", "cashback", "credit"],
    ),
];
