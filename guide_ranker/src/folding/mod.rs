//! RNA secondary-structure backends.
//!
//! Feature extraction only talks to [`FoldingOracle`]; any structure predictor
//! that can produce an MFE structure, a base-pair probability matrix and the
//! ensemble's mean base-pair distance can be plugged in.

use ndarray::Array2;

use crate::errors::FoldError;
use crate::models::SecondaryStructure;

pub mod energy_params;
pub mod nearest_neighbor;
pub mod rnafold_cli;

pub use nearest_neighbor::NearestNeighborFolder;
pub use rnafold_cli::RnaFoldCli;

/// Everything feature extraction needs from one fold.
#[derive(Debug, Clone, PartialEq)]
pub struct FoldAnalysis {
    pub structure: SecondaryStructure,
    /// Symmetric `n × n` pair probabilities, zero on the diagonal.
    pub bpp: Array2<f64>,
    pub mean_bp_distance: f64,
}

/// Structure-prediction capability over the RNA alphabet.
///
/// Inputs are RNA strings (`U`, not `T`). Implementations must be
/// deterministic for a fixed sequence and fixed parameters.
pub trait FoldingOracle: Send + Sync {
    fn name(&self) -> &str;

    fn fold(&self, rna: &str) -> Result<SecondaryStructure, FoldError>;

    fn base_pair_probabilities(&self, rna: &str) -> Result<Array2<f64>, FoldError>;

    fn mean_base_pair_distance(&self, rna: &str) -> Result<f64, FoldError>;

    /// All three outputs at once. Backends that compute them together should
    /// override this.
    fn analyze(&self, rna: &str) -> Result<FoldAnalysis, FoldError> {
        Ok(FoldAnalysis {
            structure: self.fold(rna)?,
            bpp: self.base_pair_probabilities(rna)?,
            mean_bp_distance: self.mean_base_pair_distance(rna)?,
        })
    }
}

/// `<d> = Σ_{i<j} 2·p_ij·(1 − p_ij)`
pub fn mean_bp_distance_from(bpp: &Array2<f64>) -> f64 {
    let n = bpp.nrows();
    let mut d = 0.0;
    for i in 0..n {
        for j in (i + 1)..n {
            let p = bpp[[i, j]];
            d += p * (1.0 - p);
        }
    }
    2.0 * d
}
