use std::cmp::Ordering;

use crate::errors::{GuideError, Result};
use crate::models::{Candidate, FeatureVector, PredictionRecord};

/// Descending by score, NaN last. Ties compare equal.
fn by_score_desc(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
    }
}

/// Join candidates, features and scores by index and sort best first.
///
/// The sort is stable: equal scores keep their candidate order.
pub fn rank(
    candidates: Vec<Candidate>,
    features: Vec<FeatureVector>,
    scores: Vec<f64>,
) -> Result<Vec<PredictionRecord>> {
    if candidates.len() != features.len() || candidates.len() != scores.len() {
        return Err(GuideError::contract(format!(
            "cannot join {} candidates, {} feature rows and {} scores",
            candidates.len(),
            features.len(),
            scores.len()
        )));
    }

    let mut records: Vec<PredictionRecord> = candidates
        .into_iter()
        .zip(features)
        .zip(scores)
        .map(|((candidate, features), predicted_efficacy)| PredictionRecord {
            kmer: candidate.kmer,
            position: candidate.position,
            features,
            predicted_efficacy,
        })
        .collect();

    records.sort_by(|a, b| by_score_desc(a.predicted_efficacy, b.predicted_efficacy));
    Ok(records)
}
