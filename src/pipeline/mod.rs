// src/pipeline/mod.rs
//
// Orchestrator for one analysis run: validate the video, extract sampling
// units, score and decode each, aggregate, and report progress throughout.
// Per-unit failures are absorbed here; only resource acquisition and
// cancellation end a run early.

pub mod cancel;
pub mod progress;

pub use cancel::CancelToken;
pub use progress::{LogSink, MemorySink, NullSink, ProgressSink};

use crate::aggregation::aggregate;
use crate::classification::unit_result;
use crate::error::PipelineError;
use crate::inference::{Classifier, ClassifierHandle};
use crate::preprocessing::build_tensor;
use crate::types::{AnalysisResult, Config, UnitResult};
use crate::video_source::{FrameProvider, SamplingUnit, UnitIter, VideoHandle};
use progress::ProgressReporter;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Validating,
    Extracting,
    Inferring,
    Aggregating,
    Done,
    Failed,
    Cancelled,
}

pub struct AnalysisPipeline {
    config: Config,
    state: PipelineState,
}

impl AnalysisPipeline {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            state: PipelineState::Idle,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Analyze one video file. Always terminates with a progress event at
    /// exactly 100 and produces either a well-formed result, a `Cancelled`
    /// outcome, or a fatal error — never a silent hang.
    ///
    /// An unusable video (missing, empty, unopenable) ends the run in
    /// `Failed` but returns the documented zero-valued result, so callers
    /// always receive a result object for bad inputs.
    pub fn run(
        &mut self,
        video_path: &Path,
        handle: &mut ClassifierHandle,
        sink: &mut dyn ProgressSink,
        cancel: &CancelToken,
    ) -> Result<AnalysisResult, PipelineError> {
        let mut progress = ProgressReporter::new(sink);

        self.state = PipelineState::Validating;
        progress.report(0, "preparing analysis");

        if !handle.is_loaded() {
            self.state = PipelineState::Failed;
            progress.finish("classifier unavailable");
            return Err(PipelineError::ClassifierUnavailable);
        }

        let mut video =
            match VideoHandle::open(video_path, self.config.sampling.default_duration_ms) {
                Ok(video) => video,
                Err(e) => {
                    warn!("video validation failed: {}", e);
                    self.state = PipelineState::Failed;
                    progress.finish("video unusable");
                    return Ok(AnalysisResult::empty());
                }
            };

        progress.report(10, "video metadata read");
        self.execute(&mut video, handle, &mut progress, cancel)
    }

    /// Core of a run against any frame provider. Split from `run` so the
    /// extraction/inference/aggregation path is exercisable without video
    /// files or a real model.
    pub fn run_with_provider<P: FrameProvider + ?Sized>(
        &mut self,
        provider: &mut P,
        handle: &mut ClassifierHandle,
        sink: &mut dyn ProgressSink,
        cancel: &CancelToken,
    ) -> Result<AnalysisResult, PipelineError> {
        let mut progress = ProgressReporter::new(sink);

        self.state = PipelineState::Validating;
        progress.report(0, "preparing analysis");

        self.execute(provider, handle, &mut progress, cancel)
    }

    fn execute<P: FrameProvider + ?Sized>(
        &mut self,
        provider: &mut P,
        handle: &mut ClassifierHandle,
        progress: &mut ProgressReporter<'_>,
        cancel: &CancelToken,
    ) -> Result<AnalysisResult, PipelineError> {
        let Some(classifier) = handle.classifier_mut() else {
            self.state = PipelineState::Failed;
            progress.finish("classifier unavailable");
            return Err(PipelineError::ClassifierUnavailable);
        };

        let split = self.config.sampling.progress_split;

        // ── Extraction ───────────────────────────────────────────────────
        self.state = PipelineState::Extracting;
        let units = {
            let mut units: Vec<SamplingUnit> = Vec::new();
            let mut iter = UnitIter::new(provider, &self.config.sampling, &self.config.model);
            loop {
                if cancel.is_cancelled() {
                    self.state = PipelineState::Cancelled;
                    progress.finish("cancelled");
                    return Err(PipelineError::Cancelled);
                }
                match iter.next() {
                    Some(unit) => {
                        units.push(unit);
                        let (done, total) = iter.position();
                        progress.report(
                            scale(done, total, 10, split),
                            &format!("extracting segments ({}/{})", done, total),
                        );
                    }
                    None => break,
                }
            }
            units
        };

        info!("{} sampling units extracted", units.len());
        progress.report(split, "segments extracted");

        // ── Inference ────────────────────────────────────────────────────
        self.state = PipelineState::Inferring;
        let mut unit_results: Vec<UnitResult> = Vec::new();
        let infer_end = 90u8.max(split);
        for (index, unit) in units.iter().enumerate() {
            if cancel.is_cancelled() {
                self.state = PipelineState::Cancelled;
                progress.finish("cancelled");
                return Err(PipelineError::Cancelled);
            }

            match infer_unit(classifier, unit, &self.config) {
                Ok(result) => unit_results.push(result),
                Err(e) => warn!("unit at {}ms skipped: {}", unit.start_ms, e),
            }

            progress.report(
                scale(index + 1, units.len(), split, infer_end),
                &format!("analyzing segment {}/{}", index + 1, units.len()),
            );
        }

        // ── Aggregation ──────────────────────────────────────────────────
        self.state = PipelineState::Aggregating;
        progress.report(95, "aggregating results");
        let result = aggregate(&unit_results, &self.config.decision);

        info!(
            "Analysis done: dominant={} emergency={} ({}/{} units flagged)",
            result.dominant_class, result.is_emergency, result.emergency_units, result.total_units
        );

        self.state = PipelineState::Done;
        progress.finish("complete");
        Ok(result)
    }
}

/// Score one sampling unit: tensor build, classifier call, decode. Any
/// failure is a per-unit failure for the caller to absorb.
fn infer_unit(
    classifier: &mut dyn Classifier,
    unit: &SamplingUnit,
    config: &Config,
) -> Result<UnitResult, PipelineError> {
    let tensor = build_tensor(&unit.frames, &config.model)?;

    let raw_scores = classifier
        .score(&tensor)
        .map_err(|e| PipelineError::Inference(e.to_string()))?;

    if raw_scores.len() != classifier.num_classes() {
        return Err(PipelineError::Inference(format!(
            "expected {} scores, got {}",
            classifier.num_classes(),
            raw_scores.len()
        )));
    }

    Ok(unit_result(&raw_scores, &config.decision))
}

/// Map `done/total` onto the progress span `[start, end]`.
fn scale(done: usize, total: usize, start: u8, end: u8) -> u8 {
    if total == 0 || end <= start {
        return start;
    }
    let span = (end - start) as usize;
    start + (done.min(total) * span / total) as u8
}
