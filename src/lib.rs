//! Churn scoring for gym members: thresholded classifier verdicts, rule-based
//! reasons and retention suggestions.

pub mod classifier;
pub mod config;
pub mod error;
pub mod explain;
pub mod intake;
pub mod models;
pub mod report;
pub mod scorer;

pub use classifier::{Classifier, ModelKind, ModelSet, TreeEnsemble};
pub use error::{ModelError, ScoreError};
pub use models::{CustomerRecord, Feature, ScoreResult, Suggestion, Verdict};
pub use scorer::{explain_reasons, predict, score, suggest_improvements};
