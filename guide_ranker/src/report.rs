//! Tabular output of a ranking.

use polars::prelude::*;
use statrs::statistics::Statistics;

use crate::features::FeatureLayout;
use crate::models::PredictionRecord;

pub const KMER_COLUMN: &str = "k-mer";
pub const SCORE_COLUMN: &str = "Predicted_Efficacy";

/// Ranked records as a table: `k-mer`, `Predicted_Efficacy`, then every
/// feature column in layout order. Row order is kept.
pub fn to_dataframe(records: &[PredictionRecord], layout: FeatureLayout) -> PolarsResult<DataFrame> {
    let mut df = DataFrame::default();

    let kmers: Vec<&str> = records.iter().map(|r| r.kmer.as_str()).collect();
    df.with_column(Series::new(PlSmallStr::from(KMER_COLUMN), kmers))?;

    let scores: Vec<f64> = records.iter().map(|r| r.predicted_efficacy).collect();
    df.with_column(Series::new(PlSmallStr::from(SCORE_COLUMN), scores))?;

    for (j, name) in layout.column_names().iter().enumerate() {
        let mut col = Vec::with_capacity(records.len());
        for r in records {
            let v = r.features.values().get(j).copied().ok_or_else(|| {
                PolarsError::ShapeMismatch(
                    format!("{} has {} features, layout needs {}", r.kmer, r.features.len(), layout.width()).into(),
                )
            })?;
            col.push(v);
        }
        df.with_column(Series::new(PlSmallStr::from(name.as_str()), col))?;
    }
    Ok(df)
}

/// The first `n` rows of `k-mer` and `Predicted_Efficacy`.
pub fn top_n(df: &DataFrame, n: usize) -> PolarsResult<DataFrame> {
    Ok(df.select([KMER_COLUMN, SCORE_COLUMN])?.head(Some(n)))
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureStats {
    pub name: String,
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation; NaN below two rows.
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
}

/// Distribution summary of every non-one-hot feature column.
pub fn feature_summary(records: &[PredictionRecord], layout: FeatureLayout) -> PolarsResult<Vec<FeatureStats>> {
    let one_hot = layout.one_hot_range();
    let mut stats = Vec::new();
    for (j, name) in layout.column_names().into_iter().enumerate() {
        if one_hot.contains(&j) {
            continue;
        }
        let values = records
            .iter()
            .map(|r| {
                r.features.values().get(j).copied().ok_or_else(|| {
                    PolarsError::ShapeMismatch(
                        format!("{} has {} features, layout needs {}", r.kmer, r.features.len(), layout.width())
                            .into(),
                    )
                })
            })
            .collect::<PolarsResult<Vec<f64>>>()?;
        stats.push(FeatureStats {
            name,
            count: values.len(),
            mean: Statistics::mean(&values),
            std_dev: Statistics::std_dev(&values),
            min: Statistics::min(&values),
            max: Statistics::max(&values),
        });
    }
    Ok(stats)
}
