//! Top-level regression evaluation.
//!
//! The evaluator wires the baseline manager, normalizer, similarity
//! engine, diff renderer, and screenshot store into one `evaluate` call
//! that resolves a capture key and a fresh image into a structured
//! verdict with an evidence bundle.

use crate::artifact::{self, BaselineKey, ScreenshotArtifact, Variant};
use crate::baseline::{BaselineManager, BaselineRecord};
use crate::diff;
use crate::normalize::Normalizer;
use crate::result::CotejarResult;
use crate::similarity::{self, MetricScores, ThresholdPolicy};
use crate::store::ScreenshotStore;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of one comparison call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Verdict {
    /// Aggregate score met the pass threshold
    Pass,
    /// Visual regression or incompatible dimensions
    Fail,
    /// No baseline existed; the candidate became version 1
    BaselineCreated,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => write!(f, "pass"),
            Self::Fail => write!(f, "fail"),
            Self::BaselineCreated => write!(f, "baseline-created"),
        }
    }
}

/// Why a comparison failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureReason {
    /// Aggregate similarity fell below the pass threshold
    ScoreBelowThreshold,
    /// Baseline and candidate shapes cannot be aligned
    DimensionMismatch,
}

/// Structured verdict plus evidence references for one comparison.
///
/// Callers always see the full per-metric breakdown, not just the final
/// verdict, so a failure can be analyzed after the fact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonResult {
    /// Capture key (minus variant) that was evaluated
    pub key: BaselineKey,
    /// Final verdict
    pub verdict: Verdict,
    /// Per-metric scores; absent for `baseline-created` and
    /// dimension-mismatch failures, where no pair was scored
    pub scores: Option<MetricScores>,
    /// Present iff `verdict` is `fail`
    pub failure_reason: Option<FailureReason>,
    /// Checksum of the baseline the candidate was compared against
    pub baseline_checksum: String,
    /// Version of that baseline
    pub baseline_version: u64,
    /// Checksum of the persisted candidate artifact
    pub current_checksum: String,
    /// Checksum of the persisted diff artifact; present iff `verdict`
    /// is `fail` with a scored pair
    pub diff_checksum: Option<String>,
}

impl ComparisonResult {
    /// True when the verdict is `pass`
    #[must_use]
    pub const fn is_pass(&self) -> bool {
        matches!(self.verdict, Verdict::Pass)
    }

    /// True when the verdict is `fail`
    #[must_use]
    pub const fn is_fail(&self) -> bool {
        matches!(self.verdict, Verdict::Fail)
    }
}

/// Orchestrates baseline resolution, normalization, scoring, and diff
/// rendering for capture keys.
///
/// All methods take `&self`; comparisons across distinct keys share no
/// mutable state and may run concurrently (see [`Self::evaluate_batch`]).
/// A caller-supplied timeout around `evaluate` is safe: the only stateful
/// transition (the baseline swap) happens atomically under the manager's
/// lock, so an abandoned call never leaves a partial update applied.
#[derive(Debug)]
pub struct RegressionEvaluator<S: ScreenshotStore> {
    store: S,
    baselines: BaselineManager,
    normalizer: Normalizer,
}

impl<S: ScreenshotStore> RegressionEvaluator<S> {
    /// Create an evaluator over a screenshot store and baseline manager
    #[must_use]
    pub fn new(store: S, baselines: BaselineManager) -> Self {
        Self {
            store,
            baselines,
            normalizer: Normalizer::default(),
        }
    }

    /// Replace the default normalizer
    #[must_use]
    pub fn with_normalizer(mut self, normalizer: Normalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// The underlying screenshot store, for fetching evidence artifacts
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Active baseline record for a key, if any
    #[must_use]
    pub fn baseline(&self, key: &BaselineKey) -> Option<BaselineRecord> {
        self.baselines.get(key)
    }

    /// Evaluate a candidate capture against the active baseline for `key`.
    ///
    /// Creates the baseline (verdict `baseline-created`) when none exists.
    /// A shape mismatch beyond the normalizer's tolerance yields a `fail`
    /// verdict with reason `dimension-mismatch` and no diff artifact.
    ///
    /// # Errors
    ///
    /// - [`CotejarError::CorruptArtifact`] if the candidate or the stored
    ///   baseline bytes do not decode as an image
    /// - [`CotejarError::Storage`] if artifact persistence fails
    pub fn evaluate(
        &self,
        key: &BaselineKey,
        candidate_bytes: &[u8],
        policy: &ThresholdPolicy,
    ) -> CotejarResult<ComparisonResult> {
        let candidate_image = artifact::decode(candidate_bytes, "candidate")?;
        let current = ScreenshotArtifact::new(
            key.for_variant(Variant::Current),
            candidate_bytes.to_vec(),
            &candidate_image,
        );
        let current_checksum = self.store.put(&current)?;

        let record = match self.baselines.get(key) {
            Some(record) => record,
            None => {
                let (record, created) =
                    self.baselines.create_if_absent(key, &current_checksum)?;
                if created {
                    tracing::info!(key = %key, "no baseline for key, candidate accepted as v1");
                    return Ok(ComparisonResult {
                        key: key.clone(),
                        verdict: Verdict::BaselineCreated,
                        scores: None,
                        failure_reason: None,
                        baseline_checksum: record.checksum,
                        baseline_version: record.version,
                        current_checksum,
                        diff_checksum: None,
                    });
                }
                // Lost the creation race; compare against the winner
                record
            }
        };

        let baseline_bytes = self.store.get(&record.checksum)?;
        let baseline_image = artifact::decode(&baseline_bytes, "baseline")?.to_rgba8();
        let candidate_rgba = candidate_image.to_rgba8();

        let pair = match self.normalizer.normalize(&baseline_image, &candidate_rgba) {
            Ok(pair) => pair,
            Err(err) if err.is_dimension_mismatch() => {
                tracing::warn!(key = %key, %err, "normalization hard stop");
                return Ok(ComparisonResult {
                    key: key.clone(),
                    verdict: Verdict::Fail,
                    scores: None,
                    failure_reason: Some(FailureReason::DimensionMismatch),
                    baseline_checksum: record.checksum,
                    baseline_version: record.version,
                    current_checksum,
                    diff_checksum: None,
                });
            }
            Err(err) => return Err(err),
        };

        let scores = similarity::compare(&pair.baseline, &pair.candidate, policy)?;

        if scores.aggregate >= policy.pass_threshold {
            tracing::debug!(key = %key, aggregate = scores.aggregate, "comparison passed");
            return Ok(ComparisonResult {
                key: key.clone(),
                verdict: Verdict::Pass,
                scores: Some(scores),
                failure_reason: None,
                baseline_checksum: record.checksum,
                baseline_version: record.version,
                current_checksum,
                diff_checksum: None,
            });
        }

        let rendered = diff::render(&pair.baseline, &pair.candidate, policy.sensitivity)?;
        let diff_artifact = ScreenshotArtifact::from_raw(
            key.for_variant(Variant::Diff),
            rendered.bytes,
            rendered.width,
            rendered.height,
        );
        let diff_checksum = self.store.put(&diff_artifact)?;
        tracing::info!(
            key = %key,
            aggregate = scores.aggregate,
            diff_pixels = rendered.diff_pixel_count,
            "comparison failed"
        );

        Ok(ComparisonResult {
            key: key.clone(),
            verdict: Verdict::Fail,
            scores: Some(scores),
            failure_reason: Some(FailureReason::ScoreBelowThreshold),
            baseline_checksum: record.checksum,
            baseline_version: record.version,
            current_checksum,
            diff_checksum: Some(diff_checksum),
        })
    }

    /// Explicitly accept `bytes` as the new baseline for `key`.
    ///
    /// This is the orchestrator's "treat this as the new baseline" mode;
    /// it is never triggered by a failed comparison.
    ///
    /// # Errors
    ///
    /// Returns [`CotejarError::CorruptArtifact`] if the bytes do not
    /// decode, or [`CotejarError::Storage`] if persistence fails.
    pub fn accept_baseline(
        &self,
        key: &BaselineKey,
        bytes: &[u8],
    ) -> CotejarResult<BaselineRecord> {
        let image = artifact::decode(bytes, "baseline")?;
        let artifact =
            ScreenshotArtifact::new(key.for_variant(Variant::Baseline), bytes.to_vec(), &image);
        let checksum = self.store.put(&artifact)?;
        self.baselines.accept(key, &checksum)
    }

    /// Evaluate many captures in parallel on a CPU-sized worker pool.
    ///
    /// Comparisons across distinct keys are embarrassingly parallel;
    /// results come back in input order, one per job.
    pub fn evaluate_batch(
        &self,
        jobs: &[(BaselineKey, Vec<u8>)],
        policy: &ThresholdPolicy,
    ) -> Vec<CotejarResult<ComparisonResult>> {
        jobs.par_iter()
            .map(|(key, bytes)| self.evaluate(key, bytes, policy))
            .collect()
    }
}
