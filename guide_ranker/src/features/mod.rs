//! Per-candidate feature extraction.

use tracing::debug;

use crate::errors::{FoldError, GuideError, Result};
use crate::folding::FoldingOracle;
use crate::models::{Candidate, FeatureVector};

pub mod assembler;
pub mod structure;

pub use assembler::{FeatureLayout, RawFeatures};
pub use structure::{mean_pair_probability, one_hot, summarize_structure, StructureSummary};

/// Fold one candidate and turn the result into its feature row.
///
/// Backend failures and malformed backend output come back as
/// [`GuideError::Fold`]; nothing is replaced by zeros.
pub fn fold_and_score(oracle: &dyn FoldingOracle, candidate: &Candidate) -> Result<FeatureVector> {
    let rna = candidate.rna();
    let n = rna.len();

    let analysis = oracle.analyze(&rna)?;

    if analysis.structure.dot_bracket.chars().count() != n {
        return Err(GuideError::Fold(FoldError::new(
            &rna,
            format!(
                "{} returned a structure of length {} for {} nt",
                oracle.name(),
                analysis.structure.dot_bracket.chars().count(),
                n
            ),
        )));
    }
    if analysis.bpp.dim() != (n, n) {
        return Err(GuideError::Fold(FoldError::new(
            &rna,
            format!("{} returned a {:?} pair matrix for {} nt", oracle.name(), analysis.bpp.dim(), n),
        )));
    }

    let avg_bp_prob = mean_pair_probability(&analysis.bpp);
    let encoded = one_hot(&rna);
    let summary = summarize_structure(&analysis.structure.dot_bracket, n);

    debug!(
        "{}: ss={} mfe={} avg_bp_prob={} ensemble={} helices={} avg_helix={} paired={}",
        candidate.kmer,
        analysis.structure.dot_bracket,
        analysis.structure.mfe,
        avg_bp_prob,
        analysis.mean_bp_distance,
        summary.helices,
        summary.avg_helix_length,
        summary.fraction_paired
    );

    FeatureLayout::new(n).assemble(&RawFeatures {
        mfe: analysis.structure.mfe,
        avg_bp_prob,
        ensemble_energy: analysis.mean_bp_distance,
        one_hot: encoded,
        helices: summary.helices,
        avg_helix_length: summary.avg_helix_length,
        fraction_paired: summary.fraction_paired,
    })
}
