//! Column layout of the feature matrix.
//!
//! The trained model expects exactly this order:
//! `[MFE, Avg_BP_Prob, Ensemble_Energy, OneHot_0..OneHot_(4k-1), Helices,
//! Avg_Helix_Length, Fraction_Paired]`.

use std::ops::Range;

use crate::errors::{GuideError, Result};
use crate::models::FeatureVector;

/// Scalar thermodynamic columns ahead of the one-hot block.
const LEADING: usize = 3;
/// Structural summary columns after it.
const TRAILING: usize = 3;
/// One-hot channels per position, in `A, U, C, G` order.
pub const ONE_HOT_ALPHABET: [u8; 4] = [b'A', b'U', b'C', b'G'];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FeatureLayout {
    kmer_length: usize,
}

/// Inputs to [`FeatureLayout::assemble`], in column order.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFeatures {
    pub mfe: f64,
    pub avg_bp_prob: f64,
    pub ensemble_energy: f64,
    pub one_hot: Vec<f64>,
    pub helices: usize,
    pub avg_helix_length: f64,
    pub fraction_paired: f64,
}

impl FeatureLayout {
    pub const MFE: usize = 0;
    pub const AVG_BP_PROB: usize = 1;
    pub const ENSEMBLE_ENERGY: usize = 2;

    pub fn new(kmer_length: usize) -> Self {
        FeatureLayout { kmer_length }
    }

    pub fn kmer_length(&self) -> usize {
        self.kmer_length
    }

    /// `3 + 4k + 3`
    pub fn width(&self) -> usize {
        LEADING + ONE_HOT_ALPHABET.len() * self.kmer_length + TRAILING
    }

    pub fn one_hot_range(&self) -> Range<usize> {
        LEADING..LEADING + ONE_HOT_ALPHABET.len() * self.kmer_length
    }

    pub fn helices_index(&self) -> usize {
        self.one_hot_range().end
    }

    pub fn avg_helix_length_index(&self) -> usize {
        self.helices_index() + 1
    }

    pub fn fraction_paired_index(&self) -> usize {
        self.helices_index() + 2
    }

    pub fn column_names(&self) -> Vec<String> {
        let mut names = vec![
            "MFE".to_string(),
            "Avg_BP_Prob".to_string(),
            "Ensemble_Energy".to_string(),
        ];
        names.extend(self.one_hot_range().map(|c| format!("OneHot_{}", c - LEADING)));
        names.push("Helices".to_string());
        names.push("Avg_Helix_Length".to_string());
        names.push("Fraction_Paired".to_string());
        names
    }

    /// Concatenate features in column order.
    ///
    /// A one-hot block of the wrong width means the caller and the trained
    /// model disagree on `k`; that is reported as a contract violation.
    pub fn assemble(&self, raw: &RawFeatures) -> Result<FeatureVector> {
        let expected = ONE_HOT_ALPHABET.len() * self.kmer_length;
        if raw.one_hot.len() != expected {
            return Err(GuideError::contract(format!(
                "one-hot block has {} columns, layout for k={} needs {}",
                raw.one_hot.len(),
                self.kmer_length,
                expected
            )));
        }

        let mut values = Vec::with_capacity(self.width());
        values.push(raw.mfe);
        values.push(raw.avg_bp_prob);
        values.push(raw.ensemble_energy);
        values.extend_from_slice(&raw.one_hot);
        values.push(raw.helices as f64);
        values.push(raw.avg_helix_length);
        values.push(raw.fraction_paired);

        if values.len() != self.width() {
            return Err(GuideError::contract(format!(
                "assembled {} columns, expected {}",
                values.len(),
                self.width()
            )));
        }
        Ok(FeatureVector::from_parts(*self, values))
    }
}
