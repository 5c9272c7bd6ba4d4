use std::fmt;

use crate::errors::InputError;
use crate::features::assembler::{FeatureLayout, RawFeatures};
use crate::helper_functions::{parse_sequence, to_rna};

/// Guide length including the PAM-proximal suffix.
pub const DEFAULT_KMER_LENGTH: usize = 23;

/// Allowed final dinucleotides of a candidate window.
pub const DEFAULT_PAM_SUFFIXES: [&str; 3] = ["AG", "GG", "GA"];

/// A validated, upper-case DNA sequence with whitespace removed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Sequence(String);

impl Sequence {
    /// Accepts raw text or a single-record FASTA.
    pub fn parse(text: &str) -> Result<Self, InputError> {
        parse_sequence(text)
    }

    pub(crate) fn from_validated(bases: String) -> Self {
        Sequence(bases)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One k-mer window of the input that ends in an allowed suffix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Candidate {
    /// Zero-based offset of the window in the input; also the tie-break key.
    pub position: usize,
    pub kmer: String,
}

impl Candidate {
    pub fn new(position: usize, kmer: impl Into<String>) -> Self {
        Candidate {
            position,
            kmer: kmer.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.kmer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kmer.is_empty()
    }

    /// RNA form (T → U) handed to the folding backend.
    pub fn rna(&self) -> String {
        to_rna(&self.kmer)
    }
}

/// Minimum-free-energy structure of a candidate in dot-bracket notation.
#[derive(Debug, Clone, PartialEq)]
pub struct SecondaryStructure {
    pub dot_bracket: String,
    /// kcal/mol
    pub mfe: f64,
}

/// Fixed-width feature row for one candidate.
///
/// Only built through [`FeatureLayout::assemble`], so the width always equals
/// `layout.width()`.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    layout: FeatureLayout,
    values: Vec<f64>,
}

impl FeatureVector {
    pub(crate) fn from_parts(layout: FeatureLayout, values: Vec<f64>) -> Self {
        debug_assert_eq!(values.len(), layout.width());
        FeatureVector { layout, values }
    }

    pub fn layout(&self) -> FeatureLayout {
        self.layout
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn mfe(&self) -> f64 {
        self.values[FeatureLayout::MFE]
    }

    pub fn avg_bp_prob(&self) -> f64 {
        self.values[FeatureLayout::AVG_BP_PROB]
    }

    pub fn ensemble_energy(&self) -> f64 {
        self.values[FeatureLayout::ENSEMBLE_ENERGY]
    }

    pub fn one_hot(&self) -> &[f64] {
        &self.values[self.layout.one_hot_range()]
    }

    pub fn helices(&self) -> f64 {
        self.values[self.layout.helices_index()]
    }

    pub fn avg_helix_length(&self) -> f64 {
        self.values[self.layout.avg_helix_length_index()]
    }

    pub fn fraction_paired(&self) -> f64 {
        self.values[self.layout.fraction_paired_index()]
    }

    /// Splits the row back into the assembler's inputs.
    pub fn decompose(&self) -> RawFeatures {
        RawFeatures {
            mfe: self.mfe(),
            avg_bp_prob: self.avg_bp_prob(),
            ensemble_energy: self.ensemble_energy(),
            one_hot: self.one_hot().to_vec(),
            helices: self.helices() as usize,
            avg_helix_length: self.avg_helix_length(),
            fraction_paired: self.fraction_paired(),
        }
    }
}

/// A scored candidate. `kmer` is the join key back to the input windows.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionRecord {
    pub kmer: String,
    pub position: usize,
    pub features: FeatureVector,
    pub predicted_efficacy: f64,
}
