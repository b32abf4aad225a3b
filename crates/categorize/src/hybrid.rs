use spendwise_core::{ClassificationResult, DEFAULT_CONFIDENCE_THRESHOLD};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use crate::model::{LabelDrift, ModelClassifier, ModelError, Predictor};
use crate::rules::RuleMatcher;
use crate::source::TaxonomySource;
use crate::taxonomy::{Taxonomy, TaxonomyError};

/// Outcome of [`HybridCategorizer::load_model`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelStatus {
    Loaded { drift: LabelDrift },
    Absent,
}

/// The categorization policy: model first, keyword rules second, `Other` last.
///
/// A model prediction is accepted when its confidence is at or above the
/// threshold and its label is still declared by the active taxonomy.
/// `categorize` never fails; every internal error falls through to the next
/// stage.
pub struct HybridCategorizer {
    taxonomy: Arc<TaxonomySource>,
    rules: RuleMatcher,
    model: RwLock<Option<Arc<dyn Predictor>>>,
    threshold: f32,
}

impl HybridCategorizer {
    pub fn new(taxonomy: Arc<TaxonomySource>, rules: RuleMatcher) -> Self {
        Self {
            taxonomy,
            rules,
            model: RwLock::new(None),
            threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_model(self, model: Arc<dyn Predictor>) -> Self {
        self.install_model(model);
        self
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn taxonomy(&self) -> &Arc<TaxonomySource> {
        &self.taxonomy
    }

    /// Categorize with the configured default threshold.
    pub fn suggest(&self, text: &str) -> ClassificationResult {
        self.categorize(text, self.threshold)
    }

    pub fn categorize(&self, text: &str, threshold: f32) -> ClassificationResult {
        let text = text.trim();
        if text.is_empty() {
            return ClassificationResult::fallback();
        }
        let snapshot = self.taxonomy.snapshot();

        let result = self
            .model_result(text, threshold, &snapshot)
            .or_else(|| self.rule_result(text, &snapshot))
            .unwrap_or_else(ClassificationResult::fallback);
        tracing::debug!(
            text,
            category = %result.category,
            confidence = result.confidence,
            source = %result.source,
            "categorized"
        );
        result
    }

    fn model_result(
        &self,
        text: &str,
        threshold: f32,
        snapshot: &Taxonomy,
    ) -> Option<ClassificationResult> {
        let model = self.current_model()?;
        let prediction = match model.predict(text) {
            Ok(p) => p,
            Err(e) => {
                tracing::debug!(error = %e, "model gave no prediction; trying rules");
                return None;
            }
        };
        if prediction.confidence < threshold {
            return None;
        }
        if !snapshot.contains(&prediction.category) {
            tracing::debug!(
                category = %prediction.category,
                "model predicted a label the taxonomy no longer declares"
            );
            return None;
        }
        Some(ClassificationResult::model(prediction.category, prediction.confidence))
    }

    fn rule_result(&self, text: &str, snapshot: &Taxonomy) -> Option<ClassificationResult> {
        self.rules
            .find_match(text, snapshot)
            .map(|c| ClassificationResult::rule(c.name.clone()))
    }

    /// Re-reads the taxonomy file. On failure the previous snapshot stays active.
    pub fn reload_taxonomy(&self) -> Result<(), TaxonomyError> {
        let snapshot = self.taxonomy.reload()?;
        self.warn_on_drift(&snapshot);
        Ok(())
    }

    /// Loads the artifact at `path` and installs it.
    ///
    /// A missing artifact clears any installed model (rules only). Corrupt or
    /// incompatible artifacts are returned as errors and the previously
    /// installed model, if any, is kept.
    pub fn load_model(&self, path: &Path) -> Result<ModelStatus, ModelError> {
        match ModelClassifier::load_optional(path)? {
            Some(model) => {
                let drift = model.label_drift(&self.taxonomy.snapshot());
                self.install_model(Arc::new(model));
                Ok(ModelStatus::Loaded { drift })
            }
            None => {
                self.clear_model();
                Ok(ModelStatus::Absent)
            }
        }
    }

    pub fn install_model(&self, model: Arc<dyn Predictor>) {
        *self.model.write().unwrap_or_else(PoisonError::into_inner) = Some(model);
        self.warn_on_drift(&self.taxonomy.snapshot());
    }

    pub fn clear_model(&self) {
        *self.model.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn model_available(&self) -> bool {
        self.current_model().is_some()
    }

    /// Label drift between the installed model and the active taxonomy.
    pub fn label_drift(&self) -> Option<LabelDrift> {
        let model = self.current_model()?;
        Some(LabelDrift::between(model.labels(), &self.taxonomy.snapshot()))
    }

    fn current_model(&self) -> Option<Arc<dyn Predictor>> {
        self.model
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn warn_on_drift(&self, snapshot: &Taxonomy) {
        let Some(model) = self.current_model() else {
            return;
        };
        let drift = LabelDrift::between(model.labels(), snapshot);
        if !drift.is_empty() {
            tracing::warn!(
                only_in_model = ?drift.only_in_model,
                only_in_taxonomy = ?drift.only_in_taxonomy,
                "model label set differs from taxonomy; retrain the model"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Prediction;
    use crate::training::TrainingPipeline;
    use spendwise_core::{ClassificationSource, MatchMode, TrainingConfig, OTHER_CATEGORY};

    /// Returns a fixed prediction regardless of input.
    struct FixedPredictor {
        prediction: Result<Prediction, ()>,
        labels: Vec<String>,
    }

    impl FixedPredictor {
        fn new(category: &str, confidence: f32) -> Arc<Self> {
            Arc::new(Self {
                prediction: Ok(Prediction {
                    category: category.to_string(),
                    confidence,
                }),
                labels: vec!["Food".to_string(), "Transport".to_string()],
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                prediction: Err(()),
                labels: vec!["Food".to_string(), "Transport".to_string()],
            })
        }
    }

    impl Predictor for FixedPredictor {
        fn predict(&self, _text: &str) -> Result<Prediction, ModelError> {
            self.prediction.clone().map_err(|_| ModelError::NoKnownTerms)
        }

        fn labels(&self) -> &[String] {
            &self.labels
        }
    }

    fn food_and_transport() -> Taxonomy {
        Taxonomy::new([
            ("Food", vec!["pizza", "coffee"]),
            ("Transport", vec!["uber", "taxi"]),
        ])
    }

    fn categorizer() -> HybridCategorizer {
        let source = TaxonomySource::from_snapshot("categories.csv", food_and_transport());
        HybridCategorizer::new(Arc::new(source), RuleMatcher::default())
    }

    #[test]
    fn rules_without_model() {
        let c = categorizer();
        assert!(!c.model_available());
        let r = c.categorize("zomato pizza order", 0.10);
        assert_eq!(r.category, "Food");
        assert_eq!(r.source, ClassificationSource::Rule);
        assert_eq!(r.confidence, 1.0);
    }

    #[test]
    fn default_without_model_or_keyword() {
        let r = categorizer().categorize("grocery run", 0.10);
        assert_eq!(r.category, OTHER_CATEGORY);
        assert_eq!(r.source, ClassificationSource::Default);
        assert_eq!(r.confidence, 0.0);
    }

    #[test]
    fn confident_model_wins() {
        let c = categorizer().with_model(FixedPredictor::new("Food", 0.92));
        let r = c.categorize("zomato order", 0.10);
        assert_eq!(r.category, "Food");
        assert_eq!(r.source, ClassificationSource::Model);
        assert!((r.confidence - 0.92).abs() < f32::EPSILON);
    }

    #[test]
    fn threshold_boundary_is_inclusive() {
        let c = categorizer().with_model(FixedPredictor::new("Transport", 0.25));
        let r = c.categorize("anything", 0.25);
        assert_eq!(r.source, ClassificationSource::Model);
        assert_eq!(r.category, "Transport");
    }

    #[test]
    fn below_threshold_falls_back_to_rules() {
        let c = categorizer().with_model(FixedPredictor::new("Transport", 0.3));
        let r = c.categorize("coffee", 0.5);
        assert_eq!(r.category, "Food");
        assert_eq!(r.source, ClassificationSource::Rule);
    }

    #[test]
    fn below_threshold_without_rule_hit_is_default() {
        let c = categorizer().with_model(FixedPredictor::new("Transport", 0.3));
        let r = c.categorize("grocery run", 0.5);
        assert_eq!(r, ClassificationResult::fallback());
    }

    #[test]
    fn model_error_falls_through_to_rules() {
        let c = categorizer().with_model(FixedPredictor::failing());
        let r = c.categorize("uber home", 0.0);
        assert_eq!(r.category, "Transport");
        assert_eq!(r.source, ClassificationSource::Rule);
    }

    #[test]
    fn stale_model_label_is_ignored() {
        let c = categorizer().with_model(FixedPredictor::new("Dining", 0.99));
        let r = c.categorize("pizza", 0.10);
        assert_eq!(r.category, "Food");
        assert_eq!(r.source, ClassificationSource::Rule);
    }

    #[test]
    fn empty_text_is_default() {
        let c = categorizer().with_model(FixedPredictor::new("Food", 0.99));
        assert_eq!(c.categorize("   ", 0.0), ClassificationResult::fallback());
    }

    #[test]
    fn source_is_always_one_of_three() {
        let c = categorizer().with_model(FixedPredictor::new("Food", 0.5));
        for (text, threshold) in [("pizza", 0.1), ("uber", 0.9), ("???", 0.9), ("", 0.0), ("x", f32::NAN)] {
            let r = c.categorize(text, threshold);
            assert!(matches!(
                r.source,
                ClassificationSource::Model | ClassificationSource::Rule | ClassificationSource::Default
            ));
            assert!((0.0..=1.0).contains(&r.confidence));
            assert!(!r.category.is_empty());
        }
    }

    #[test]
    fn suggest_uses_configured_threshold() {
        let c = categorizer()
            .with_threshold(0.6)
            .with_model(FixedPredictor::new("Transport", 0.5));
        assert_eq!(c.suggest("pizza").source, ClassificationSource::Rule);
    }

    #[test]
    fn whole_word_rules_are_honoured() {
        let source = TaxonomySource::from_snapshot(
            "categories.csv",
            Taxonomy::new([("Groceries", vec!["mart"])]),
        );
        let c = HybridCategorizer::new(Arc::new(source), RuleMatcher::new(MatchMode::WholeWord));
        assert_eq!(c.categorize("smartphone", 0.1).source, ClassificationSource::Default);
    }

    #[test]
    fn reload_changes_rule_results() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("categories.csv");
        std::fs::write(&path, "Category,Keywords\nFood,pizza\n").unwrap();
        let source = Arc::new(TaxonomySource::open(&path).unwrap());
        let c = HybridCategorizer::new(source, RuleMatcher::default());
        assert_eq!(c.categorize("metro card", 0.1).source, ClassificationSource::Default);

        std::fs::write(&path, "Category,Keywords\nFood,pizza\nTransport,metro\n").unwrap();
        c.reload_taxonomy().unwrap();
        assert_eq!(c.categorize("metro card", 0.1).category, "Transport");

        std::fs::write(&path, "Category,Keywords\n").unwrap();
        assert!(c.reload_taxonomy().is_err());
        assert_eq!(c.categorize("metro card", 0.1).category, "Transport");
    }

    #[test]
    fn reload_during_categorization_sees_whole_snapshots() {
        let source = Arc::new(TaxonomySource::from_snapshot(
            "categories.csv",
            Taxonomy::new([("Old", vec!["alpha"]), ("OldBeta", vec!["beta"])]),
        ));
        let c = HybridCategorizer::new(Arc::clone(&source), RuleMatcher::default());

        std::thread::scope(|s| {
            s.spawn(|| {
                for i in 0..300 {
                    let next = if i % 2 == 0 {
                        Taxonomy::new([("New", vec!["alpha"]), ("NewBeta", vec!["beta"])])
                    } else {
                        Taxonomy::new([("Old", vec!["alpha"]), ("OldBeta", vec!["beta"])])
                    };
                    source.replace(next);
                }
            });
            s.spawn(|| {
                for _ in 0..300 {
                    let r = c.categorize("alpha", 0.1);
                    assert!(r.category == "Old" || r.category == "New", "{r:?}");
                }
            });
        });
    }

    #[test]
    fn load_model_distinguishes_absent_from_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        let c = categorizer();

        assert_eq!(c.load_model(&path).unwrap(), ModelStatus::Absent);
        assert!(!c.model_available());

        TrainingPipeline::new(TrainingConfig::default())
            .train(&food_and_transport(), &path)
            .unwrap();
        assert_eq!(
            c.load_model(&path).unwrap(),
            ModelStatus::Loaded { drift: LabelDrift::default() }
        );
        assert!(c.model_available());

        std::fs::write(&path, b"{\"metadata\": 42}").unwrap();
        assert!(matches!(c.load_model(&path), Err(ModelError::Corrupt { .. })));
        // The previously loaded model stays in service.
        assert!(c.model_available());
    }

    #[test]
    fn payment_rail_words_alone_are_default() {
        let taxonomy = Taxonomy::defaults();
        let model = TrainingPipeline::new(TrainingConfig::default())
            .fit(&taxonomy)
            .unwrap();
        let source = TaxonomySource::from_snapshot("categories.csv", taxonomy);
        let c = HybridCategorizer::new(Arc::new(source), RuleMatcher::default())
            .with_model(Arc::new(model));

        for text in ["paid via upi", "upi payment to friend", "paid", "pos"] {
            assert_eq!(c.categorize(text, 0.10), ClassificationResult::fallback(), "{text}");
        }

        let r = c.categorize("zomato pizza order", 0.10);
        assert_eq!(r.category, "Food");
        assert_ne!(r.source, ClassificationSource::Default);
    }

    #[test]
    fn trained_model_end_to_end() {
        let model = TrainingPipeline::new(TrainingConfig::default())
            .fit(&food_and_transport())
            .unwrap();
        let c = categorizer().with_model(Arc::new(model));

        let r = c.categorize("coffee", 0.10);
        assert_eq!(r.category, "Food");
        assert_eq!(r.source, ClassificationSource::Model);

        // No known terms: the model abstains and the result is the default.
        assert_eq!(c.categorize("grocery run", 0.10), ClassificationResult::fallback());

        // An impossible threshold hands every decision to the rules.
        let r = c.categorize("taxi", 1.0);
        assert_eq!(r.source, ClassificationSource::Rule);
        assert_eq!(r.category, "Transport");
    }

    #[test]
    fn label_drift_is_reported_for_installed_model() {
        let c = categorizer().with_model(FixedPredictor::new("Food", 0.9));
        assert!(c.label_drift().unwrap().is_empty());
        c.taxonomy().replace(Taxonomy::new([("Food", vec!["pizza"])]));
        assert_eq!(c.label_drift().unwrap().only_in_model, vec!["Transport"]);
        c.clear_model();
        assert!(c.label_drift().is_none());
    }
}
