use serde::{Deserialize, Serialize};
use spendwise_core::DEFAULT_CATEGORIES;
use std::collections::HashSet;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

const CATEGORY_HEADER: &str = "Category";
const KEYWORDS_HEADER: &str = "Keywords";

#[derive(Error, Debug)]
pub enum TaxonomyError {
    #[error("Taxonomy file not found: {0}")]
    Missing(PathBuf),
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Missing required column: {0}")]
    MissingColumn(&'static str),
    #[error("Line {line}: row has no category name")]
    MissingCategory { line: u64 },
    #[error("Line {line}: category '{category}' has no keywords")]
    NoKeywords { line: u64, category: String },
    #[error("Line {line}: category '{category}' is declared more than once")]
    DuplicateCategory { line: u64, category: String },
    #[error("Taxonomy declares no categories")]
    Empty,
}

/// A category label and the keyword phrases that select it, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    pub keywords: Vec<String>,
}

/// An immutable, ordered snapshot of the category → keywords mapping.
///
/// Every keyword belongs to exactly one category: when several categories
/// declare the same phrase, the first-declared one keeps it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Taxonomy {
    categories: Vec<Category>,
}

impl Taxonomy {
    /// Builds a snapshot from `(name, keywords)` pairs.
    ///
    /// Keywords are normalised (trimmed, lower-cased) and de-duplicated.
    /// Repeated category names are merged into the first declaration. Unlike
    /// [`parse`], categories left without keywords are kept so that callers
    /// such as training can report them.
    pub fn new<I, N, K, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (N, K)>,
        N: Into<String>,
        K: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut builder = Builder::default();
        for (name, keywords) in entries {
            let name = name.into().trim().to_string();
            if name.is_empty() {
                continue;
            }
            let idx = builder.category_index(&name);
            for kw in keywords {
                builder.add_keyword(idx, kw.as_ref());
            }
        }
        builder.finish()
    }

    /// The template taxonomy shipped with new installs.
    pub fn defaults() -> Self {
        Self::new(
            DEFAULT_CATEGORIES
                .iter()
                .map(|(name, keywords)| (*name, keywords.iter().copied())),
        )
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.categories.iter().map(|c| c.name.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn keyword_count(&self) -> usize {
        self.categories.iter().map(|c| c.keywords.len()).sum()
    }
}

#[derive(Default)]
struct Builder {
    categories: Vec<Category>,
    seen: HashSet<String>,
}

impl Builder {
    fn category_index(&mut self, name: &str) -> usize {
        match self.categories.iter().position(|c| c.name == name) {
            Some(idx) => idx,
            None => {
                self.categories.push(Category {
                    name: name.to_string(),
                    keywords: Vec::new(),
                });
                self.categories.len() - 1
            }
        }
    }

    fn add_keyword(&mut self, idx: usize, raw: &str) {
        let kw = normalize_keyword(raw);
        if kw.is_empty() {
            return;
        }
        if self.seen.contains(&kw) {
            let owner = self
                .categories
                .iter()
                .find(|c| c.keywords.contains(&kw))
                .map(|c| c.name.as_str())
                .unwrap_or_default();
            if owner != self.categories[idx].name {
                tracing::warn!(
                    keyword = %kw,
                    kept_by = owner,
                    dropped_from = %self.categories[idx].name,
                    "duplicate keyword; first-declared category wins"
                );
            }
            return;
        }
        self.seen.insert(kw.clone());
        self.categories[idx].keywords.push(kw);
    }

    fn finish(self) -> Taxonomy {
        Taxonomy {
            categories: self.categories,
        }
    }
}

pub(crate) fn normalize_keyword(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Splits a `Keywords` field on commas into normalised, non-empty phrases.
pub fn split_keywords(field: &str) -> Vec<String> {
    field
        .split(',')
        .map(normalize_keyword)
        .filter(|k| !k.is_empty())
        .collect()
}

/// Reads and validates the taxonomy file at `path`.
pub fn load(path: &Path) -> Result<Taxonomy, TaxonomyError> {
    let file = std::fs::File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => TaxonomyError::Missing(path.to_path_buf()),
        _ => TaxonomyError::Io {
            path: path.to_path_buf(),
            source: e,
        },
    })?;
    let taxonomy = parse(file)?;
    tracing::info!(
        path = %path.display(),
        categories = taxonomy.len(),
        keywords = taxonomy.keyword_count(),
        "taxonomy loaded"
    );
    Ok(taxonomy)
}

/// Parses a `Category,Keywords` table.
///
/// Rows written without quoting spill their phrases into extra fields; every
/// field from the `Keywords` column onward is treated as keyword text.
pub fn parse<R: Read>(data: R) -> Result<Taxonomy, TaxonomyError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(data);

    let headers = reader.headers()?.clone();
    let column = |name: &'static str| {
        headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case(name))
            .ok_or(TaxonomyError::MissingColumn(name))
    };
    let category_col = column(CATEGORY_HEADER)?;
    let keywords_col = column(KEYWORDS_HEADER)?;

    let mut builder = Builder::default();
    for result in reader.records() {
        let record = result?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();

        if record.iter().all(|f| f.is_empty()) {
            continue;
        }

        let name = record.get(category_col).unwrap_or_default();
        if name.is_empty() {
            return Err(TaxonomyError::MissingCategory { line });
        }
        if builder.categories.iter().any(|c| c.name == name) {
            return Err(TaxonomyError::DuplicateCategory {
                line,
                category: name.to_string(),
            });
        }

        let keywords: Vec<String> = record
            .iter()
            .enumerate()
            .filter(|(i, _)| *i >= keywords_col && *i != category_col)
            .flat_map(|(_, field)| split_keywords(field))
            .collect();
        if keywords.is_empty() {
            return Err(TaxonomyError::NoKeywords {
                line,
                category: name.to_string(),
            });
        }

        let idx = builder.category_index(name);
        for kw in &keywords {
            builder.add_keyword(idx, kw);
        }
    }

    if builder.categories.is_empty() {
        return Err(TaxonomyError::Empty);
    }
    Ok(builder.finish())
}

/// Serialises `taxonomy` as a `Category,Keywords` table.
pub fn write<W: Write>(taxonomy: &Taxonomy, out: W) -> Result<(), TaxonomyError> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record([CATEGORY_HEADER, KEYWORDS_HEADER])?;
    for category in taxonomy.categories() {
        writer.write_record([category.name.as_str(), category.keywords.join(", ").as_str()])?;
    }
    writer.flush().map_err(|e| TaxonomyError::Csv(e.into()))?;
    Ok(())
}

/// Writes the default template to `path` unless a file already exists there
/// (or `force` is set). Returns whether a file was written.
pub fn write_template(path: &Path, force: bool) -> Result<bool, TaxonomyError> {
    if path.exists() && !force {
        return Ok(false);
    }
    let io_err = |source| TaxonomyError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    let file = std::fs::File::create(path).map_err(io_err)?;
    write(&Taxonomy::defaults(), file)?;
    tracing::info!(path = %path.display(), "wrote default taxonomy template");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_str(s: &str) -> Result<Taxonomy, TaxonomyError> {
        parse(s.as_bytes())
    }

    #[test]
    fn parse_quoted_keywords() {
        let t = parse_str(
            "Category,Keywords\nFood,\"pizza, Coffee ,  \"\nTransport,\"uber,taxi\"\n",
        )
        .unwrap();
        assert_eq!(t.len(), 2);
        assert_eq!(t.categories()[0].name, "Food");
        assert_eq!(t.categories()[0].keywords, vec!["pizza", "coffee"]);
        assert_eq!(t.categories()[1].keywords, vec!["uber", "taxi"]);
    }

    #[test]
    fn parse_unquoted_keywords_spill_into_extra_fields() {
        let t = parse_str("Category,Keywords\nFood,pizza,coffee, ice cream\n").unwrap();
        assert_eq!(t.categories()[0].keywords, vec!["pizza", "coffee", "ice cream"]);
    }

    #[test]
    fn parse_headers_are_case_insensitive() {
        let t = parse_str("category,KEYWORDS\nRent,rent\n").unwrap();
        assert!(t.contains("Rent"));
    }

    #[test]
    fn parse_skips_blank_rows() {
        let t = parse_str("Category,Keywords\n,\nFood,pizza\n").unwrap();
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn parse_missing_keywords_column() {
        assert!(matches!(
            parse_str("Category,Words\nFood,pizza\n"),
            Err(TaxonomyError::MissingColumn("Keywords"))
        ));
    }

    #[test]
    fn parse_row_without_category_is_rejected() {
        assert!(matches!(
            parse_str("Category,Keywords\nFood,pizza\n,\"coffee\"\n"),
            Err(TaxonomyError::MissingCategory { line: 3 })
        ));
    }

    #[test]
    fn parse_row_without_keywords_is_rejected() {
        let err = parse_str("Category,Keywords\nFood,pizza\nOther,\n").unwrap_err();
        match err {
            TaxonomyError::NoKeywords { category, .. } => assert_eq!(category, "Other"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn parse_duplicate_category_is_rejected() {
        assert!(matches!(
            parse_str("Category,Keywords\nFood,pizza\nFood,coffee\n"),
            Err(TaxonomyError::DuplicateCategory { .. })
        ));
    }

    #[test]
    fn parse_header_only_is_empty() {
        assert!(matches!(parse_str("Category,Keywords\n"), Err(TaxonomyError::Empty)));
    }

    #[test]
    fn duplicate_keyword_kept_by_first_category() {
        let t = parse_str("Category,Keywords\nFood,\"pizza,coffee\"\nCafe,\"coffee,latte\"\n")
            .unwrap();
        assert_eq!(t.get("Food").unwrap().keywords, vec!["pizza", "coffee"]);
        assert_eq!(t.get("Cafe").unwrap().keywords, vec!["latte"]);
    }

    #[test]
    fn new_keeps_categories_that_lost_every_keyword() {
        let t = Taxonomy::new([("Food", vec!["pizza"]), ("Snacks", vec!["PIZZA"])]);
        assert_eq!(t.len(), 2);
        assert!(t.get("Snacks").unwrap().keywords.is_empty());
    }

    #[test]
    fn new_normalises_inner_whitespace() {
        let t = Taxonomy::new([("Food", vec!["  Ice   Cream "])]);
        assert_eq!(t.categories()[0].keywords, vec!["ice cream"]);
    }

    #[test]
    fn load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.csv");
        assert!(matches!(load(&path), Err(TaxonomyError::Missing(p)) if p == path));
    }

    #[test]
    fn template_round_trips_through_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("categories.csv");
        assert!(write_template(&path, false).unwrap());
        assert!(!write_template(&path, false).unwrap());

        let loaded = load(&path).unwrap();
        assert_eq!(loaded, Taxonomy::defaults());
        assert_eq!(loaded.categories()[0].name, "Food");
    }
}
