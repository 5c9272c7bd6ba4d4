//! Sequence in, ranked guide table out.

use std::sync::Arc;
use std::time::Instant;

use ndarray::Array2;
use rayon::prelude::*;
use tracing::{dispatcher, info, info_span, warn, Dispatch, Span};

use crate::candidates::generate_candidates_with;
use crate::config::{FoldFailurePolicy, PipelineConfig};
use crate::errors::{FoldError, GuideError, InputError, Result};
use crate::features::{fold_and_score, FeatureLayout};
use crate::folding::FoldingOracle;
use crate::models::{Candidate, FeatureVector, PredictionRecord, Sequence};
use crate::ranking::rank;
use crate::scoring::{load_model_with_retry, ModelHandle, DEFAULT_LOAD_BACKOFF};
use crate::telemetry;

/// Result of one ranking request.
#[derive(Debug, Clone)]
pub struct RankOutcome {
    /// Best first.
    pub records: Vec<PredictionRecord>,
    /// Candidates dropped under [`FoldFailurePolicy::Skip`].
    pub skipped: Vec<FoldError>,
}

pub struct Pipeline {
    config: PipelineConfig,
    oracle: Arc<dyn FoldingOracle>,
    model: ModelHandle,
    pool: Option<rayon::ThreadPool>,
    dispatch: Option<Dispatch>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, oracle: Arc<dyn FoldingOracle>, model: ModelHandle) -> Result<Self> {
        config.validate()?;
        if model.layout() != FeatureLayout::new(config.kmer_length) {
            return Err(GuideError::contract(format!(
                "model handle is laid out for k={}, config asks for k={}",
                model.layout().kmer_length(),
                config.kmer_length
            )));
        }

        let pool = if config.workers > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(config.workers)
                .thread_name(|i| format!("guide-fold-{}", i))
                .build()
                .map_err(|e| GuideError::Config(format!("cannot start {} workers: {}", config.workers, e)))?;
            Some(pool)
        } else {
            None
        };

        Ok(Pipeline {
            config,
            oracle,
            model,
            pool,
            dispatch: None,
        })
    }

    /// Build the folding backend, load the model artifact and set up logging
    /// from a config.
    pub fn from_config(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let oracle = config.folding.build()?;
        let model = load_model_with_retry(config.resolved_model_path(), DEFAULT_LOAD_BACKOFF)?;
        let handle = ModelHandle::new(Arc::new(model), FeatureLayout::new(config.kmer_length))?;
        let dispatch = telemetry::dispatch(&config.log_filter);
        Ok(Self::new(config, oracle, handle)?.with_dispatch(dispatch))
    }

    /// Route this pipeline's events to `dispatch` instead of the caller's
    /// default subscriber.
    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = Some(dispatch);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn oracle(&self) -> &dyn FoldingOracle {
        self.oracle.as_ref()
    }

    /// Handle to the active model; swapping through it affects later requests.
    pub fn model(&self) -> &ModelHandle {
        &self.model
    }

    pub fn rank_sequence(&self, text: &str) -> Result<RankOutcome> {
        match &self.dispatch {
            Some(dispatch) => dispatcher::with_default(dispatch, || self.rank_in_span(text)),
            None => self.rank_in_span(text),
        }
    }

    fn rank_in_span(&self, text: &str) -> Result<RankOutcome> {
        let span = info_span!("rank_request", len = text.len());
        let _enter = span.enter();
        let started = Instant::now();

        let sequence = Sequence::parse(text)?;
        let k = self.config.kmer_length;
        let candidates = generate_candidates_with(&sequence, k, &self.config.pam_suffixes);
        if candidates.is_empty() {
            return Err(InputError::NoCandidates {
                length: sequence.len(),
                kmer_length: k,
            }
            .into());
        }
        info!(
            "{} candidates in {} nt using {}",
            candidates.len(),
            sequence.len(),
            self.oracle.name()
        );

        // One snapshot for the whole request.
        let model = self.model.current();
        let layout = self.model.layout();

        let extracted = self.extract(&candidates, started);

        let attempted = candidates.len();
        let mut kept = Vec::with_capacity(attempted);
        let mut features = Vec::with_capacity(attempted);
        let mut skipped = Vec::new();
        for (candidate, result) in candidates.into_iter().zip(extracted) {
            match result {
                Ok(fv) => {
                    kept.push(candidate);
                    features.push(fv);
                }
                Err(GuideError::Fold(e)) => match self.config.fold_failure {
                    FoldFailurePolicy::Skip => {
                        warn!("Skipping {} at {}: {}", candidate.kmer, candidate.position, e.reason);
                        skipped.push(e);
                    }
                    FoldFailurePolicy::Abort => return Err(GuideError::Fold(e)),
                },
                Err(other) => return Err(other),
            }
        }

        if kept.is_empty() {
            return Err(GuideError::AllFoldsFailed {
                attempted,
                failures: skipped,
            });
        }
        self.check_deadline(started)?;

        let rows = features.len();
        let flat: Vec<f64> = features.iter().flat_map(|f| f.values().iter().copied()).collect();
        let x = Array2::from_shape_vec((rows, layout.width()), flat)
            .map_err(|e| GuideError::contract(format!("feature matrix: {}", e)))?;

        let scores = model.predict(&x)?;
        if scores.len() != rows {
            return Err(GuideError::contract(format!(
                "model returned {} scores for {} rows",
                scores.len(),
                rows
            )));
        }

        let records = rank(kept, features, scores)?;
        info!(
            "Ranked {} candidates ({} skipped) in {:?}",
            records.len(),
            skipped.len(),
            started.elapsed()
        );
        Ok(RankOutcome { records, skipped })
    }

    fn check_deadline(&self, started: Instant) -> Result<()> {
        match self.config.deadline() {
            Some(limit) if started.elapsed() >= limit => Err(GuideError::DeadlineExceeded(limit)),
            _ => Ok(()),
        }
    }

    /// Features for every candidate, in candidate order. The sequential path
    /// stops after the first error that will fail the request.
    fn extract(&self, candidates: &[Candidate], started: Instant) -> Vec<Result<FeatureVector>> {
        let extract_one = |candidate: &Candidate| -> Result<FeatureVector> {
            self.check_deadline(started)?;
            fold_and_score(self.oracle.as_ref(), candidate)
        };

        if self.config.workers == 1 {
            let mut results = Vec::with_capacity(candidates.len());
            for candidate in candidates {
                let result = extract_one(candidate);
                let fatal = match &result {
                    Ok(_) => false,
                    Err(GuideError::Fold(_)) => self.config.fold_failure == FoldFailurePolicy::Abort,
                    Err(_) => true,
                };
                results.push(result);
                if fatal {
                    break;
                }
            }
            return results;
        }

        // Rayon workers don't inherit the caller's subscriber or span.
        let dispatch = dispatcher::get_default(|d| d.clone());
        let span = Span::current();
        let run = || {
            candidates
                .par_iter()
                .map(|c| dispatcher::with_default(&dispatch, || span.in_scope(|| extract_one(c))))
                .collect::<Vec<_>>()
        };
        match &self.pool {
            Some(pool) => pool.install(run),
            None => run(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::features::test_support::StubOracle;
    use crate::folding::NearestNeighborFolder;
    use crate::models::SecondaryStructure;
    use crate::scoring::test_support::LinearStub;
    use crate::scoring::EfficacyModel;
    use crate::telemetry::test_support::CapturedLogs;

    const EXAMPLE: &str = "ATGCGATCGATCGTAGCTAGCTAGGATCGATCG";
    const EXAMPLE_KMERS: [&str; 4] = [
        "TGCGATCGATCGTAGCTAGCTAG",
        "GCGATCGATCGTAGCTAGCTAGG",
        "CGATCGATCGTAGCTAGCTAGGA",
        "CGATCGTAGCTAGCTAGGATCGA",
    ];

    fn config(workers: usize) -> PipelineConfig {
        PipelineConfig {
            workers,
            ..PipelineConfig::default()
        }
    }

    fn handle(model: impl EfficacyModel + 'static) -> ModelHandle {
        ModelHandle::new(Arc::new(model), FeatureLayout::new(23)).unwrap()
    }

    /// Lower MFE scores higher; G content breaks ties.
    fn mfe_model() -> LinearStub {
        let layout = FeatureLayout::new(23);
        let mut weights = vec![(FeatureLayout::MFE, -1.0)];
        weights.extend(layout.one_hot_range().skip(3).step_by(4).map(|c| (c, 0.01)));
        LinearStub {
            n_features: 98,
            intercept: 0.0,
            weights,
        }
    }

    fn kmers(outcome: &RankOutcome) -> Vec<&str> {
        outcome.records.iter().map(|r| r.kmer.as_str()).collect()
    }

    #[test]
    fn ranks_example_sequence_end_to_end() {
        let pipeline = Pipeline::new(
            config(1),
            Arc::new(NearestNeighborFolder::default()),
            handle(mfe_model()),
        )
        .unwrap();

        let outcome = pipeline.rank_sequence(EXAMPLE).unwrap();
        assert!(outcome.skipped.is_empty());
        assert_eq!(outcome.records.len(), 4);

        let mut found = kmers(&outcome);
        found.sort();
        let mut expected = EXAMPLE_KMERS.to_vec();
        expected.sort();
        assert_eq!(found, expected);

        for pair in outcome.records.windows(2) {
            assert!(pair[0].predicted_efficacy >= pair[1].predicted_efficacy);
        }
        for r in &outcome.records {
            assert_eq!(r.features.len(), 98);
            assert_eq!(r.features.one_hot().iter().sum::<f64>(), 23.0);
            assert_eq!(&EXAMPLE[r.position..r.position + 23], r.kmer);
        }
    }

    #[test]
    fn parallel_extraction_matches_sequential() {
        let oracle: Arc<dyn FoldingOracle> = Arc::new(NearestNeighborFolder::default());
        let sequential = Pipeline::new(config(1), Arc::clone(&oracle), handle(mfe_model()))
            .unwrap()
            .rank_sequence(EXAMPLE)
            .unwrap();
        for workers in [0, 3] {
            let parallel = Pipeline::new(config(workers), Arc::clone(&oracle), handle(mfe_model()))
                .unwrap()
                .rank_sequence(EXAMPLE)
                .unwrap();
            assert_eq!(parallel.records, sequential.records);
        }
    }

    #[test]
    fn equal_scores_keep_sequence_order() {
        let pipeline = Pipeline::new(
            config(2),
            Arc::new(StubOracle::open(23)),
            handle(LinearStub::constant(98, 0.5)),
        )
        .unwrap();
        let outcome = pipeline.rank_sequence(EXAMPLE).unwrap();
        assert_eq!(kmers(&outcome), EXAMPLE_KMERS.to_vec());
        assert!(outcome.records.iter().all(|r| r.predicted_efficacy == 0.5));
    }

    #[test]
    fn fold_failures_are_skipped_and_logged() {
        let mut oracle = StubOracle::open(23);
        oracle.fail_on.push(Candidate::new(0, EXAMPLE_KMERS[1]).rna());

        let logs = CapturedLogs::default();
        let pipeline = Pipeline::new(config(1), Arc::new(oracle), handle(LinearStub::constant(98, 1.0)))
            .unwrap()
            .with_dispatch(telemetry::dispatch_to("info", logs.make_writer()));

        let outcome = pipeline.rank_sequence(EXAMPLE).unwrap();
        assert_eq!(outcome.records.len(), 3);
        assert_eq!(outcome.skipped.len(), 1);
        assert!(!kmers(&outcome).contains(&EXAMPLE_KMERS[1]));

        let out = logs.contents();
        assert!(out.contains("WARN"));
        assert!(out.contains(EXAMPLE_KMERS[1]));
        assert!(out.contains("rank_request"));
    }

    #[test]
    fn parallel_workers_log_through_injected_dispatch() {
        let logs = CapturedLogs::default();
        let pipeline = Pipeline::new(config(2), Arc::new(StubOracle::open(23)), handle(LinearStub::constant(98, 1.0)))
            .unwrap()
            .with_dispatch(telemetry::dispatch_to("guide_ranker=debug", logs.make_writer()));

        pipeline.rank_sequence(EXAMPLE).unwrap();
        let out = logs.contents();
        for kmer in EXAMPLE_KMERS {
            assert!(out.contains(&format!("{}: ss=", kmer)), "no feature log for {}", kmer);
        }
    }

    #[test]
    fn every_candidate_failing_is_reported_together() {
        let mut oracle = StubOracle::open(23);
        oracle.dot_bracket = ".".repeat(22);

        let pipeline = Pipeline::new(config(1), Arc::new(oracle), handle(LinearStub::constant(98, 1.0))).unwrap();
        match pipeline.rank_sequence(EXAMPLE).unwrap_err() {
            GuideError::AllFoldsFailed { attempted, failures } => {
                assert_eq!(attempted, 4);
                assert_eq!(failures.len(), 4);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn abort_policy_fails_the_request() {
        let mut oracle = StubOracle::open(23);
        oracle.fail_on.push(Candidate::new(0, EXAMPLE_KMERS[2]).rna());
        let cfg = PipelineConfig {
            workers: 1,
            fold_failure: FoldFailurePolicy::Abort,
            ..PipelineConfig::default()
        };
        let pipeline = Pipeline::new(cfg, Arc::new(oracle), handle(LinearStub::constant(98, 1.0))).unwrap();
        let err = pipeline.rank_sequence(EXAMPLE).unwrap_err();
        assert!(matches!(err, GuideError::Fold(ref e) if e.sequence == Candidate::new(0, EXAMPLE_KMERS[2]).rna()));
    }

    struct CountingOracle {
        inner: StubOracle,
        folds: AtomicUsize,
    }

    impl FoldingOracle for CountingOracle {
        fn name(&self) -> &str {
            "counting"
        }

        fn fold(&self, rna: &str) -> std::result::Result<SecondaryStructure, FoldError> {
            self.folds.fetch_add(1, Ordering::SeqCst);
            self.inner.fold(rna)
        }

        fn base_pair_probabilities(&self, rna: &str) -> std::result::Result<Array2<f64>, FoldError> {
            self.inner.base_pair_probabilities(rna)
        }

        fn mean_base_pair_distance(&self, rna: &str) -> std::result::Result<f64, FoldError> {
            self.inner.mean_base_pair_distance(rna)
        }
    }

    #[test]
    fn abort_policy_stops_folding_at_first_failure() {
        let mut inner = StubOracle::open(23);
        inner.fail_on.push(Candidate::new(0, EXAMPLE_KMERS[1]).rna());
        let oracle = Arc::new(CountingOracle {
            inner,
            folds: AtomicUsize::new(0),
        });
        let cfg = PipelineConfig {
            workers: 1,
            fold_failure: FoldFailurePolicy::Abort,
            ..PipelineConfig::default()
        };
        let pipeline = Pipeline::new(cfg, oracle.clone(), handle(LinearStub::constant(98, 1.0))).unwrap();

        assert!(matches!(pipeline.rank_sequence(EXAMPLE).unwrap_err(), GuideError::Fold(_)));
        assert_eq!(oracle.folds.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn no_candidates_is_an_input_error() {
        let pipeline = Pipeline::new(config(1), Arc::new(StubOracle::open(23)), handle(LinearStub::constant(98, 1.0)))
            .unwrap();

        let err = pipeline.rank_sequence("ACGTACGTAG").unwrap_err();
        assert!(matches!(
            err,
            GuideError::Input(InputError::NoCandidates {
                length: 10,
                kmer_length: 23
            })
        ));

        let err = pipeline.rank_sequence(&"C".repeat(40)).unwrap_err();
        assert!(matches!(err, GuideError::Input(InputError::NoCandidates { .. })));

        let err = pipeline.rank_sequence("ACGTNNACGT").unwrap_err();
        assert!(matches!(err, GuideError::Input(InputError::InvalidCharacters(_))));
    }

    struct SlowOracle(StubOracle);

    impl FoldingOracle for SlowOracle {
        fn name(&self) -> &str {
            "slow"
        }

        fn fold(&self, rna: &str) -> std::result::Result<SecondaryStructure, FoldError> {
            thread::sleep(Duration::from_millis(30));
            self.0.fold(rna)
        }

        fn base_pair_probabilities(&self, rna: &str) -> std::result::Result<Array2<f64>, FoldError> {
            self.0.base_pair_probabilities(rna)
        }

        fn mean_base_pair_distance(&self, rna: &str) -> std::result::Result<f64, FoldError> {
            self.0.mean_base_pair_distance(rna)
        }
    }

    #[test]
    fn deadline_stops_the_request() {
        let cfg = PipelineConfig {
            workers: 1,
            deadline_ms: Some(10),
            ..PipelineConfig::default()
        };
        let pipeline = Pipeline::new(
            cfg,
            Arc::new(SlowOracle(StubOracle::open(23))),
            handle(LinearStub::constant(98, 1.0)),
        )
        .unwrap();
        let err = pipeline.rank_sequence(EXAMPLE).unwrap_err();
        assert!(matches!(err, GuideError::DeadlineExceeded(d) if d == Duration::from_millis(10)));
    }

    #[test]
    fn swapped_model_applies_to_next_request() {
        let pipeline = Pipeline::new(
            config(1),
            Arc::new(StubOracle::open(23)),
            handle(LinearStub::constant(98, 1.0)),
        )
        .unwrap();
        let before = pipeline.rank_sequence(EXAMPLE).unwrap();
        pipeline.model().swap(Arc::new(LinearStub::constant(98, 7.0))).unwrap();
        let after = pipeline.rank_sequence(EXAMPLE).unwrap();

        assert!(before.records.iter().all(|r| r.predicted_efficacy == 1.0));
        assert!(after.records.iter().all(|r| r.predicted_efficacy == 7.0));
    }

    #[test]
    fn layout_mismatch_is_rejected_up_front() {
        let cfg = PipelineConfig {
            kmer_length: 20,
            ..PipelineConfig::default()
        };
        let err = Pipeline::new(cfg, Arc::new(StubOracle::open(20)), handle(LinearStub::constant(98, 1.0)))
            .err()
            .unwrap();
        assert!(matches!(err, GuideError::Contract(_)));
    }

    #[test]
    fn missing_model_artifact_fails_construction() {
        let cfg = PipelineConfig {
            model_path: "/nonexistent/stacking_model.json".into(),
            ..PipelineConfig::default()
        };
        let err = Pipeline::from_config(cfg).err().unwrap();
        assert!(matches!(err, GuideError::ModelLoad(_)));
    }
}
