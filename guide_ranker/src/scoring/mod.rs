//! Efficacy models and artifact loading.

use std::path::Path;
use std::thread;
use std::time::Duration;

use ndarray::{Array2, ArrayView1};
use tracing::{info, warn};

use crate::errors::{GuideError, ModelLoadError, Result};

pub mod handle;
pub mod stacking;

pub use handle::ModelHandle;
pub use stacking::StackingModel;

/// Pause before the single retry of a transient load failure.
pub const DEFAULT_LOAD_BACKOFF: Duration = Duration::from_millis(250);

/// A trained regressor from feature rows to efficacy scores.
pub trait EfficacyModel: Send + Sync {
    fn n_features(&self) -> usize;

    /// Column names the model was trained on, when the artifact records them.
    fn feature_names(&self) -> Option<&[String]> {
        None
    }

    /// Structural problems that would make [`predict_row`] misbehave.
    ///
    /// [`predict_row`]: EfficacyModel::predict_row
    fn check_integrity(&self) -> Result<(), String> {
        Ok(())
    }

    fn predict_row(&self, row: ArrayView1<f64>) -> f64;

    /// One score per row. A column count other than [`n_features`] is a
    /// contract violation.
    ///
    /// [`n_features`]: EfficacyModel::n_features
    fn predict(&self, x: &Array2<f64>) -> Result<Vec<f64>> {
        if x.ncols() != self.n_features() {
            return Err(GuideError::contract(format!(
                "feature matrix has {} columns, model expects {}",
                x.ncols(),
                self.n_features()
            )));
        }
        Ok(x.outer_iter().map(|row| self.predict_row(row)).collect())
    }
}

/// Read and validate a stacking-model artifact.
pub fn load_model<P: AsRef<Path>>(path: P) -> Result<StackingModel, ModelLoadError> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path).map_err(|source| ModelLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let model: StackingModel = serde_json::from_str(&json).map_err(|source| ModelLoadError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    model.validate().map_err(|reason| ModelLoadError::Invalid {
        path: path.to_path_buf(),
        reason,
    })?;

    info!(
        "Loaded model from {} ({} features, {} base learners)",
        path.display(),
        model.n_features,
        model.base_learners.len()
    );
    Ok(model)
}

/// [`load_model`], retried once after `backoff` when the failure looks
/// transient. Parse and validation errors are returned immediately.
pub fn load_model_with_retry<P: AsRef<Path>>(
    path: P,
    backoff: Duration,
) -> Result<StackingModel, ModelLoadError> {
    let path = path.as_ref();
    match load_model(path) {
        Err(e) if e.is_transient() => {
            warn!("{}; retrying in {:?}", e, backoff);
            thread::sleep(backoff);
            load_model(path)
        }
        other => other,
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use ndarray::ArrayView1;

    use super::stacking::{
        BaseLearner, EnsembleKind, LinearCombiner, RegressionTree, SplitRule, StackingModel, TreeNode,
        FORMAT_VERSION,
    };
    use super::EfficacyModel;

    /// Single-leaf stacking model that scores every row as `value`.
    pub fn constant_stacking(n_features: usize, value: f64) -> StackingModel {
        StackingModel {
            format_version: FORMAT_VERSION,
            n_features,
            feature_names: None,
            imputer: None,
            scaler: None,
            base_learners: vec![BaseLearner {
                name: "const".to_string(),
                kind: EnsembleKind::Bagged,
                base_score: 0.0,
                split: SplitRule::Le,
                trees: vec![RegressionTree {
                    nodes: vec![TreeNode::Leaf { value }],
                }],
            }],
            final_estimator: LinearCombiner {
                coefficients: vec![1.0],
                intercept: 0.0,
            },
        }
    }

    /// `intercept + Σ w_i·x_i` over selected columns.
    pub struct LinearStub {
        pub n_features: usize,
        pub intercept: f64,
        pub weights: Vec<(usize, f64)>,
    }

    impl LinearStub {
        pub fn constant(n_features: usize, value: f64) -> Self {
            LinearStub {
                n_features,
                intercept: value,
                weights: Vec::new(),
            }
        }
    }

    impl EfficacyModel for LinearStub {
        fn n_features(&self) -> usize {
            self.n_features
        }

        fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
            self.intercept + self.weights.iter().map(|&(i, w)| w * row[i]).sum::<f64>()
        }
    }
}
