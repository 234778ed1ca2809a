//! Trained classifier seam and the tree-ensemble artifacts the host loads.
//!
//! An ensemble is stored as JSON:
//!
//! ```json
//! {
//!   "name": "xgboost",
//!   "feature_columns": ["gender", "Near_Location", "..."],
//!   "aggregation": "logistic",
//!   "split_rule": "less_than",
//!   "base_score": -0.4,
//!   "trees": [{ "nodes": [
//!     { "feature": 5, "threshold": 3.5, "left": 1, "right": 2, "value": 0.1 },
//!     { "value": 0.8 },
//!     { "value": -0.6 }
//!   ]}]
//! }
//! ```

use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use crate::error::{ModelError, ScoreError};
use crate::models::resolve_columns;

/// A pre-trained binary classifier.
pub trait Classifier: Send + Sync {
    fn name(&self) -> &str;

    /// Columns the model was fit on, in fit order.
    fn feature_columns(&self) -> &[String];

    /// Probability of the positive (churn) class for one feature vector laid
    /// out in `feature_columns` order.
    fn predict_positive_probability(&self, features: &[f64]) -> Result<f64, ScoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    /// Average of leaf probabilities (random forest).
    Mean,
    /// Sigmoid of base score plus leaf margins (gradient boosting).
    Logistic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitRule {
    #[default]
    LessThan,
    LessOrEqual,
}

impl SplitRule {
    fn goes_left(self, value: f64, threshold: f64) -> bool {
        match self {
            SplitRule::LessThan => value < threshold,
            SplitRule::LessOrEqual => value <= threshold,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
        value: f64,
    },
    Leaf {
        value: f64,
    },
}

impl Node {
    pub fn value(&self) -> f64 {
        match self {
            Node::Split { value, .. } | Node::Leaf { value } => *value,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Tree {
    pub nodes: Vec<Node>,
}

impl Tree {
    /// Node indices visited from the root to the leaf reached by `features`.
    pub fn decision_path(
        &self,
        features: &[f64],
        rule: SplitRule,
    ) -> Result<Vec<usize>, ScoreError> {
        let mut path = vec![0];
        let mut index = 0;
        loop {
            match self.nodes.get(index) {
                Some(Node::Leaf { .. }) => return Ok(path),
                Some(Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                }) => {
                    let value = features.get(*feature).ok_or_else(|| {
                        ScoreError::SchemaMismatch(format!(
                            "split on column {feature} but only {} values given",
                            features.len()
                        ))
                    })?;
                    index = if rule.goes_left(*value, *threshold) {
                        *left
                    } else {
                        *right
                    };
                    path.push(index);
                }
                None => {
                    return Err(ScoreError::Classifier(format!(
                        "decision path reached missing node {index}"
                    )))
                }
            }
        }
    }

    fn leaf_value(&self, features: &[f64], rule: SplitRule) -> Result<f64, ScoreError> {
        let path = self.decision_path(features, rule)?;
        path.last()
            .and_then(|index| self.nodes.get(*index))
            .map(Node::value)
            .ok_or_else(|| ScoreError::Classifier("decision path ended without a leaf".into()))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TreeEnsemble {
    pub name: String,
    pub feature_columns: Vec<String>,
    pub aggregation: Aggregation,
    #[serde(default)]
    pub split_rule: SplitRule,
    #[serde(default)]
    pub base_score: f64,
    pub trees: Vec<Tree>,
}

impl TreeEnsemble {
    pub fn from_json(text: &str) -> Result<Self, ModelError> {
        let ensemble: TreeEnsemble = serde_json::from_str(text)?;
        ensemble.validate()?;
        Ok(ensemble)
    }

    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let text = std::fs::read_to_string(path).map_err(|source| ModelError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text)
    }

    fn validate(&self) -> Result<(), ModelError> {
        if self.trees.is_empty() {
            return Err(ModelError::Invalid(format!("{} has no trees", self.name)));
        }
        if !self.base_score.is_finite() {
            return Err(ModelError::Invalid(format!(
                "{} has a non-finite base score",
                self.name
            )));
        }

        let width = self.feature_columns.len();
        for (tree_index, tree) in self.trees.iter().enumerate() {
            if tree.nodes.is_empty() {
                return Err(ModelError::Invalid(format!("tree {tree_index} is empty")));
            }
            for (node_index, node) in tree.nodes.iter().enumerate() {
                if !node.value().is_finite() {
                    return Err(ModelError::Invalid(format!(
                        "tree {tree_index} node {node_index} has a non-finite value"
                    )));
                }
                if self.aggregation == Aggregation::Mean && !(0.0..=1.0).contains(&node.value()) {
                    return Err(ModelError::Invalid(format!(
                        "tree {tree_index} node {node_index} holds probability {} outside [0, 1]",
                        node.value()
                    )));
                }
                if let Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } = node
                {
                    if *feature >= width {
                        return Err(ModelError::Invalid(format!(
                            "tree {tree_index} node {node_index} splits on column {feature} of {width}"
                        )));
                    }
                    if !threshold.is_finite() {
                        return Err(ModelError::Invalid(format!(
                            "tree {tree_index} node {node_index} has a non-finite threshold"
                        )));
                    }
                    // Children must come after their parent, which rules out cycles.
                    for child in [*left, *right] {
                        if child <= node_index || child >= tree.nodes.len() {
                            return Err(ModelError::Invalid(format!(
                                "tree {tree_index} node {node_index} has invalid child {child}"
                            )));
                        }
                    }
                }
            }
        }

        Ok(())
    }

    pub fn check_width(&self, features: &[f64]) -> Result<(), ScoreError> {
        if features.len() != self.feature_columns.len() {
            return Err(ScoreError::SchemaMismatch(format!(
                "{} expects {} values, got {}",
                self.name,
                self.feature_columns.len(),
                features.len()
            )));
        }
        Ok(())
    }

    /// Mean leaf probability for `mean` ensembles, pre-sigmoid margin for
    /// `logistic` ensembles.
    pub fn raw_output(&self, features: &[f64]) -> Result<f64, ScoreError> {
        self.check_width(features)?;
        let mut total = 0.0;
        for tree in &self.trees {
            total += tree.leaf_value(features, self.split_rule)?;
        }
        Ok(match self.aggregation {
            Aggregation::Mean => total / self.trees.len() as f64,
            Aggregation::Logistic => self.base_score + total,
        })
    }
}

pub fn sigmoid(margin: f64) -> f64 {
    1.0 / (1.0 + (-margin).exp())
}

impl Classifier for TreeEnsemble {
    fn name(&self) -> &str {
        &self.name
    }

    fn feature_columns(&self) -> &[String] {
        &self.feature_columns
    }

    fn predict_positive_probability(&self, features: &[f64]) -> Result<f64, ScoreError> {
        let raw = self.raw_output(features)?;
        Ok(match self.aggregation {
            Aggregation::Mean => raw,
            Aggregation::Logistic => sigmoid(raw),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    RandomForest,
    Xgboost,
}

impl ModelKind {
    pub fn file_name(self) -> &'static str {
        match self {
            ModelKind::RandomForest => "random_forest.json",
            ModelKind::Xgboost => "xgboost.json",
        }
    }

    pub fn default_threshold(self) -> f64 {
        match self {
            ModelKind::RandomForest => 0.5,
            ModelKind::Xgboost => 0.35,
        }
    }
}

/// Both churn models, loaded once and shared read-only afterwards.
#[derive(Debug, Clone)]
pub struct ModelSet {
    random_forest: Arc<TreeEnsemble>,
    xgboost: Arc<TreeEnsemble>,
}

impl ModelSet {
    pub fn load(dir: &Path) -> Result<Self, ModelError> {
        Ok(Self {
            random_forest: Arc::new(load_checked(dir, ModelKind::RandomForest)?),
            xgboost: Arc::new(load_checked(dir, ModelKind::Xgboost)?),
        })
    }

    pub fn get(&self, kind: ModelKind) -> Arc<TreeEnsemble> {
        match kind {
            ModelKind::RandomForest => Arc::clone(&self.random_forest),
            ModelKind::Xgboost => Arc::clone(&self.xgboost),
        }
    }
}

fn load_checked(dir: &Path, kind: ModelKind) -> Result<TreeEnsemble, ModelError> {
    let path = dir.join(kind.file_name());
    let ensemble = TreeEnsemble::load(&path)?;
    resolve_columns(&ensemble.feature_columns)
        .map_err(|err| ModelError::Invalid(format!("{}: {err}", path.display())))?;
    tracing::info!(
        model = %ensemble.name,
        trees = ensemble.trees.len(),
        path = %path.display(),
        "loaded model"
    );
    Ok(ensemble)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Feature;

    fn columns_json() -> String {
        let columns: Vec<&str> = Feature::ALL.iter().map(|f| f.column()).collect();
        serde_json::to_string(&columns).unwrap()
    }

    fn stump_json(name: &str, aggregation: &str) -> String {
        // Splits on Contract_period (index 5) at 3.5.
        format!(
            r#"{{
                "name": "{name}",
                "feature_columns": {columns},
                "aggregation": "{aggregation}",
                "base_score": 0.0,
                "trees": [
                    {{ "nodes": [
                        {{ "feature": 5, "threshold": 3.5, "left": 1, "right": 2, "value": 0.5 }},
                        {{ "value": 0.9 }},
                        {{ "value": 0.1 }}
                    ]}},
                    {{ "nodes": [ {{ "value": 0.3 }} ] }}
                ]
            }}"#,
            columns = columns_json()
        )
    }

    #[test]
    fn mean_ensemble_averages_leaves() {
        let model = TreeEnsemble::from_json(&stump_json("rf", "mean")).unwrap();
        let mut features = vec![0.0; 13];
        features[5] = 1.0;
        let p = model.predict_positive_probability(&features).unwrap();
        assert!((p - 0.6).abs() < 1e-12);

        features[5] = 12.0;
        let p = model.predict_positive_probability(&features).unwrap();
        assert!((p - 0.2).abs() < 1e-12);
    }

    #[test]
    fn logistic_ensemble_applies_sigmoid() {
        let model = TreeEnsemble::from_json(&stump_json("xgb", "logistic")).unwrap();
        let features = vec![0.0; 13];
        let p = model.predict_positive_probability(&features).unwrap();
        assert!((p - sigmoid(1.2)).abs() < 1e-12);
    }

    #[test]
    fn split_rule_controls_ties() {
        let mut model = TreeEnsemble::from_json(&stump_json("rf", "mean")).unwrap();
        let mut features = vec![0.0; 13];
        features[5] = 3.5;
        assert_eq!(
            model.trees[0].decision_path(&features, model.split_rule).unwrap(),
            vec![0, 2]
        );
        model.split_rule = SplitRule::LessOrEqual;
        assert_eq!(
            model.trees[0].decision_path(&features, model.split_rule).unwrap(),
            vec![0, 1]
        );
    }

    #[test]
    fn rejects_malformed_trees() {
        let cyclic = stump_json("bad", "mean").replace(r#""left": 1"#, r#""left": 0"#);
        assert!(matches!(
            TreeEnsemble::from_json(&cyclic),
            Err(ModelError::Invalid(_))
        ));

        let wide = stump_json("bad", "mean").replace(r#""feature": 5"#, r#""feature": 40"#);
        assert!(matches!(
            TreeEnsemble::from_json(&wide),
            Err(ModelError::Invalid(_))
        ));

        assert!(matches!(
            TreeEnsemble::from_json("{ not json"),
            Err(ModelError::Parse(_))
        ));
    }

    #[test]
    fn wrong_vector_width_is_a_schema_mismatch() {
        let model = TreeEnsemble::from_json(&stump_json("rf", "mean")).unwrap();
        assert!(matches!(
            model.predict_positive_probability(&[0.0; 12]),
            Err(ScoreError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn raw_output_checks_vector_width() {
        let model = TreeEnsemble::from_json(&stump_json("rf", "mean")).unwrap();
        assert!(matches!(
            model.raw_output(&[]),
            Err(ScoreError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn unvalidated_tree_reports_errors_instead_of_panicking() {
        let tree = Tree {
            nodes: vec![Node::Split {
                feature: 3,
                threshold: 0.5,
                left: 1,
                right: 2,
                value: 0.5,
            }],
        };
        assert!(matches!(
            tree.decision_path(&[0.0; 2], SplitRule::LessThan),
            Err(ScoreError::SchemaMismatch(_))
        ));
        assert!(matches!(
            tree.decision_path(&[0.0; 13], SplitRule::LessThan),
            Err(ScoreError::Classifier(_))
        ));
    }

    #[test]
    fn mean_ensemble_rejects_values_outside_unit_interval() {
        let json =
            stump_json("rf", "mean").replace(r#"{ "value": 0.9 }"#, r#"{ "value": 1.4 }"#);
        assert!(matches!(
            TreeEnsemble::from_json(&json),
            Err(ModelError::Invalid(_))
        ));

        let json = stump_json("xgb", "logistic")
            .replace(r#"{ "value": 0.9 }"#, r#"{ "value": 1.4 }"#);
        assert!(TreeEnsemble::from_json(&json).is_ok());
    }

    #[test]
    fn model_set_loads_both_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("random_forest.json"),
            stump_json("random_forest", "mean"),
        )
        .unwrap();
        std::fs::write(
            dir.path().join("xgboost.json"),
            stump_json("xgboost", "logistic"),
        )
        .unwrap();

        let models = ModelSet::load(dir.path()).unwrap();
        assert_eq!(models.get(ModelKind::RandomForest).name(), "random_forest");
        assert_eq!(models.get(ModelKind::Xgboost).name(), "xgboost");
    }

    #[test]
    fn model_set_rejects_foreign_schema() {
        let dir = tempfile::tempdir().unwrap();
        let foreign = stump_json("random_forest", "mean").replace("\"Age\"", "\"Income\"");
        std::fs::write(dir.path().join("random_forest.json"), foreign).unwrap();
        std::fs::write(
            dir.path().join("xgboost.json"),
            stump_json("xgboost", "logistic"),
        )
        .unwrap();

        assert!(matches!(
            ModelSet::load(dir.path()),
            Err(ModelError::Invalid(_))
        ));
    }

    #[test]
    fn default_thresholds_per_model() {
        assert_eq!(ModelKind::RandomForest.default_threshold(), 0.5);
        assert_eq!(ModelKind::Xgboost.default_threshold(), 0.35);
    }
}
