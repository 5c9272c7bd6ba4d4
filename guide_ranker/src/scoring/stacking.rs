//! Stacked tree ensembles exported from training.
//!
//! An artifact holds the preprocessing the regressor was fit with (mean
//! imputation, then standard scaling), any number of tree-ensemble base
//! learners and a linear final estimator over their outputs:
//!
//! ```text
//! score = intercept + Σ_l coefficients[l] · learner_l(scale(impute(x)))
//! ```

use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

use super::EfficacyModel;

pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackingModel {
    pub format_version: u32,
    pub n_features: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_names: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imputer: Option<MeanImputer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scaler: Option<StandardScaler>,
    pub base_learners: Vec<BaseLearner>,
    pub final_estimator: LinearCombiner,
}

/// Replaces NaN inputs with the training column mean.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeanImputer {
    pub fill: Vec<f64>,
}

/// `(x - mean) / scale`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnsembleKind {
    /// Random-forest style: mean of tree outputs.
    Bagged,
    /// Gradient boosting: `base_score` plus the sum of tree outputs.
    Boosted,
}

/// Which side of the threshold goes left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitRule {
    /// `x <= threshold`
    #[default]
    Le,
    /// `x < threshold`
    Lt,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseLearner {
    pub name: String,
    pub kind: EnsembleKind,
    #[serde(default)]
    pub base_score: f64,
    #[serde(default)]
    pub split: SplitRule,
    pub trees: Vec<RegressionTree>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    /// Root at index 0; children always point forward.
    pub nodes: Vec<TreeNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
        /// Branch taken for NaN inputs.
        #[serde(default = "default_left")]
        default_left: bool,
    },
    Leaf {
        value: f64,
    },
}

fn default_left() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearCombiner {
    pub coefficients: Vec<f64>,
    pub intercept: f64,
}

impl RegressionTree {
    fn evaluate(&self, x: &[f64], rule: SplitRule) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    default_left,
                } => {
                    let v = x[*feature];
                    let go_left = if v.is_nan() {
                        *default_left
                    } else {
                        match rule {
                            SplitRule::Le => v <= *threshold,
                            SplitRule::Lt => v < *threshold,
                        }
                    };
                    idx = if go_left { *left } else { *right };
                }
            }
        }
    }

    fn validate(&self, n_features: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }
        for (i, node) in self.nodes.iter().enumerate() {
            if let TreeNode::Split {
                feature,
                threshold,
                left,
                right,
                ..
            } = node
            {
                if *feature >= n_features {
                    return Err(format!("node {} splits on feature {} of {}", i, feature, n_features));
                }
                if !threshold.is_finite() {
                    return Err(format!("node {} has a non-finite threshold", i));
                }
                for child in [left, right] {
                    if *child <= i || *child >= self.nodes.len() {
                        return Err(format!("node {} has child {} out of order", i, child));
                    }
                }
            }
        }
        Ok(())
    }
}

impl BaseLearner {
    fn predict(&self, x: &[f64]) -> f64 {
        let sum: f64 = self.trees.iter().map(|t| t.evaluate(x, self.split)).sum();
        match self.kind {
            EnsembleKind::Bagged => sum / self.trees.len() as f64,
            EnsembleKind::Boosted => self.base_score + sum,
        }
    }
}

impl StackingModel {
    /// Structural checks run at load time, so prediction can index freely.
    pub fn validate(&self) -> Result<(), String> {
        if self.format_version != FORMAT_VERSION {
            return Err(format!(
                "unsupported format_version {} (expected {})",
                self.format_version, FORMAT_VERSION
            ));
        }
        let n = self.n_features;
        if n == 0 {
            return Err("n_features is zero".to_string());
        }
        if let Some(names) = &self.feature_names {
            if names.len() != n {
                return Err(format!("{} feature names for {} features", names.len(), n));
            }
        }
        if let Some(imputer) = &self.imputer {
            if imputer.fill.len() != n {
                return Err(format!("imputer has {} columns, expected {}", imputer.fill.len(), n));
            }
        }
        if let Some(scaler) = &self.scaler {
            if scaler.mean.len() != n || scaler.scale.len() != n {
                return Err(format!(
                    "scaler has {}/{} columns, expected {}",
                    scaler.mean.len(),
                    scaler.scale.len(),
                    n
                ));
            }
            if let Some(col) = scaler.scale.iter().position(|s| *s == 0.0 || !s.is_finite()) {
                return Err(format!("scaler column {} has scale {}", col, scaler.scale[col]));
            }
        }
        if self.base_learners.is_empty() {
            return Err("no base learners".to_string());
        }
        if self.final_estimator.coefficients.len() != self.base_learners.len() {
            return Err(format!(
                "final estimator has {} coefficients for {} base learners",
                self.final_estimator.coefficients.len(),
                self.base_learners.len()
            ));
        }
        for learner in &self.base_learners {
            if learner.trees.is_empty() {
                return Err(format!("base learner {} has no trees", learner.name));
            }
            for (t, tree) in learner.trees.iter().enumerate() {
                tree.validate(n)
                    .map_err(|e| format!("base learner {} tree {}: {}", learner.name, t, e))?;
            }
        }
        Ok(())
    }

    fn preprocess(&self, row: ArrayView1<f64>) -> Vec<f64> {
        let mut x: Vec<f64> = row.iter().copied().collect();
        if let Some(imputer) = &self.imputer {
            for (v, fill) in x.iter_mut().zip(&imputer.fill) {
                if v.is_nan() {
                    *v = *fill;
                }
            }
        }
        if let Some(scaler) = &self.scaler {
            for ((v, mean), scale) in x.iter_mut().zip(&scaler.mean).zip(&scaler.scale) {
                *v = (*v - mean) / scale;
            }
        }
        x
    }
}

impl EfficacyModel for StackingModel {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn feature_names(&self) -> Option<&[String]> {
        self.feature_names.as_deref()
    }

    fn check_integrity(&self) -> Result<(), String> {
        self.validate()
    }

    fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        let x = self.preprocess(row);
        self.base_learners
            .iter()
            .zip(&self.final_estimator.coefficients)
            .map(|(learner, coef)| coef * learner.predict(&x))
            .sum::<f64>()
            + self.final_estimator.intercept
    }
}
