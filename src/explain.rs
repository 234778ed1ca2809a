use crate::classifier::{Aggregation, Node, TreeEnsemble};
use crate::error::ScoreError;
use crate::models::{resolve_columns, Attribution, CustomerRecord, Feature};

/// Attributes one prediction of `M` to the record's features.
pub trait Explainer<M: ?Sized> {
    fn explain(&self, record: &CustomerRecord, model: &M) -> Result<Attribution, ScoreError>;
}

/// Decision-path attribution for tree ensembles: every split on the path
/// credits its feature with the change in node value it caused.
#[derive(Debug, Default, Clone, Copy)]
pub struct TreePathExplainer;

impl Explainer<TreeEnsemble> for TreePathExplainer {
    fn explain(
        &self,
        record: &CustomerRecord,
        model: &TreeEnsemble,
    ) -> Result<Attribution, ScoreError> {
        let columns = resolve_columns(&model.feature_columns)?;
        let features = record.to_vector(&model.feature_columns)?;

        let mut base_value = 0.0;
        let mut totals = [0.0_f64; 13];

        for tree in &model.trees {
            let path = tree.decision_path(&features, model.split_rule)?;
            base_value += tree.nodes[path[0]].value();

            for step in path.windows(2) {
                let parent = &tree.nodes[step[0]];
                let child = &tree.nodes[step[1]];
                if let Node::Split { feature, .. } = parent {
                    totals[columns[*feature] as usize] += child.value() - parent.value();
                }
            }
        }

        match model.aggregation {
            Aggregation::Mean => {
                let count = model.trees.len() as f64;
                base_value /= count;
                totals.iter_mut().for_each(|total| *total /= count);
            }
            Aggregation::Logistic => base_value += model.base_score,
        }

        Ok(Attribution {
            base_value,
            contributions: Feature::ALL.into_iter().zip(totals).collect(),
        })
    }
}
