use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::errors::{GuideError, Result};
use crate::folding::energy_params::DEFAULT_TEMPERATURE;
use crate::folding::{FoldingOracle, NearestNeighborFolder, RnaFoldCli};
use crate::helper_functions::project_root;
use crate::models::{DEFAULT_KMER_LENGTH, DEFAULT_PAM_SUFFIXES};

/// What to do when a single candidate cannot be folded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FoldFailurePolicy {
    /// Drop the candidate, log it and keep going.
    #[default]
    Skip,
    /// Fail the whole request.
    Abort,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum FoldingBackend {
    NearestNeighbor {
        #[serde(default = "default_temperature")]
        temperature: f64,
    },
    RnaFold {
        #[serde(default)]
        executable: Option<PathBuf>,
        #[serde(default = "default_temperature")]
        temperature: f64,
    },
}

fn default_temperature() -> f64 {
    DEFAULT_TEMPERATURE
}

impl Default for FoldingBackend {
    fn default() -> Self {
        FoldingBackend::NearestNeighbor {
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

impl FoldingBackend {
    pub fn build(&self) -> Result<Arc<dyn FoldingOracle>> {
        let oracle: Arc<dyn FoldingOracle> = match self {
            FoldingBackend::NearestNeighbor { temperature } => {
                Arc::new(NearestNeighborFolder::new(*temperature))
            }
            FoldingBackend::RnaFold {
                executable,
                temperature,
            } => Arc::new(RnaFoldCli::new(executable.clone(), *temperature)?),
        };
        Ok(oracle)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub kmer_length: usize,
    pub pam_suffixes: Vec<String>,
    /// Relative paths resolve against `PROJECT_ROOT`.
    pub model_path: PathBuf,
    /// Per-request wall-clock budget. `None` means unbounded.
    pub deadline_ms: Option<u64>,
    /// Extraction threads: 0 uses every core, 1 runs sequentially.
    pub workers: usize,
    pub fold_failure: FoldFailurePolicy,
    pub folding: FoldingBackend,
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            kmer_length: DEFAULT_KMER_LENGTH,
            pam_suffixes: DEFAULT_PAM_SUFFIXES.iter().map(|s| s.to_string()).collect(),
            model_path: PathBuf::from("model/stacking_model.json"),
            deadline_ms: None,
            workers: 0,
            fold_failure: FoldFailurePolicy::Skip,
            folding: FoldingBackend::default(),
            log_filter: "info".to_string(),
        }
    }
}

impl PipelineConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: PipelineConfig = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config {}", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.kmer_length < 2 {
            return Err(GuideError::Config(format!(
                "kmer_length must be at least 2, got {}",
                self.kmer_length
            )));
        }
        if self.pam_suffixes.is_empty() {
            return Err(GuideError::Config("pam_suffixes is empty".to_string()));
        }
        for suffix in &self.pam_suffixes {
            if suffix.len() != 2 || !suffix.bytes().all(|b| matches!(b, b'A' | b'C' | b'G' | b'T')) {
                return Err(GuideError::Config(format!(
                    "PAM suffix {:?} must be two of A,C,G,T",
                    suffix
                )));
            }
        }
        Ok(())
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_ms.map(Duration::from_millis)
    }

    pub fn resolved_model_path(&self) -> PathBuf {
        if self.model_path.is_absolute() {
            self.model_path.clone()
        } else {
            project_root().join(&self.model_path)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults_match_guide_design() {
        let config = PipelineConfig::default();
        assert_eq!(config.kmer_length, 23);
        assert_eq!(config.pam_suffixes, vec!["AG", "GG", "GA"]);
        assert_eq!(config.fold_failure, FoldFailurePolicy::Skip);
        assert!(config.deadline().is_none());
        config.validate().unwrap();
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: PipelineConfig = serde_json::from_str(
            r#"{
                "deadline_ms": 1500,
                "fold_failure": "abort",
                "folding": {"backend": "rna_fold", "executable": "/opt/vienna/bin/RNAfold"}
            }"#,
        )
        .unwrap();
        assert_eq!(config.kmer_length, 23);
        assert_eq!(config.deadline(), Some(Duration::from_millis(1500)));
        assert_eq!(config.fold_failure, FoldFailurePolicy::Abort);
        assert_eq!(
            config.folding,
            FoldingBackend::RnaFold {
                executable: Some(PathBuf::from("/opt/vienna/bin/RNAfold")),
                temperature: 37.0,
            }
        );
    }

    #[test]
    fn rejects_bad_suffixes() {
        let mut config = PipelineConfig::default();
        config.pam_suffixes = vec!["AGG".to_string()];
        assert!(matches!(config.validate(), Err(GuideError::Config(_))));

        config.pam_suffixes = vec!["NG".to_string()];
        assert!(config.validate().is_err());

        config.pam_suffixes.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_tiny_kmer() {
        let config = PipelineConfig {
            kmer_length: 1,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn reads_file_with_context() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, r#"{{"kmer_length": 20, "workers": 1}}"#).unwrap();

        let config = PipelineConfig::from_json_file(&path).unwrap();
        assert_eq!(config.kmer_length, 20);
        assert_eq!(config.workers, 1);

        let err = PipelineConfig::from_json_file(dir.path().join("missing.json")).unwrap_err();
        assert!(err.to_string().contains("missing.json"));
    }

    #[test]
    fn absolute_model_path_is_kept() {
        let config = PipelineConfig {
            model_path: PathBuf::from("/models/stacking.json"),
            ..PipelineConfig::default()
        };
        assert_eq!(config.resolved_model_path(), PathBuf::from("/models/stacking.json"));
    }

    #[test]
    fn shipped_example_config_is_valid() {
        let config: PipelineConfig =
            serde_json::from_str(include_str!("../config/pipeline.example.json")).unwrap();
        config.validate().unwrap();
        assert_eq!(config.deadline(), Some(Duration::from_secs(30)));
        assert_eq!(config.folding, FoldingBackend::default());
    }

    #[test]
    fn nearest_neighbor_backend_builds() {
        let oracle = FoldingBackend::default().build().unwrap();
        assert_eq!(oracle.name(), "nearest_neighbor");
    }
}
