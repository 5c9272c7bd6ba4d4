//! Ranks CRISPR guide candidates in a DNA sequence by predicted efficacy.
//!
//! Windows ending in an allowed PAM-proximal dinucleotide are folded as RNA,
//! turned into a fixed-width feature row (thermodynamics, one-hot sequence,
//! helix statistics) and scored by a trained stacking regressor.

pub mod candidates;
pub mod config;
pub mod errors;
pub mod features;
pub mod folding;
pub mod helper_functions;
pub mod models;
pub mod pipeline;
pub mod ranking;
pub mod report;
pub mod scoring;
pub mod telemetry;

pub use candidates::{generate_candidates, generate_candidates_with};
pub use config::{FoldFailurePolicy, FoldingBackend, PipelineConfig};
pub use errors::{FoldError, GuideError, InputError, ModelLoadError, Result};
pub use features::{fold_and_score, FeatureLayout};
pub use folding::{FoldingOracle, NearestNeighborFolder, RnaFoldCli};
pub use models::{Candidate, FeatureVector, PredictionRecord, SecondaryStructure, Sequence};
pub use pipeline::{Pipeline, RankOutcome};
pub use ranking::rank;
pub use scoring::{load_model, load_model_with_retry, EfficacyModel, ModelHandle, StackingModel};
