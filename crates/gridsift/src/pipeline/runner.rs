//! The two-pass triage algorithm.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, info_span, warn, Instrument};

use super::error::PipelineError;
use super::plan::{PassSettings, PipelineConfig};
use super::progress::{ProgressEvent, ProgressReporter};
use super::target::{coarse_target_pct, fine_target_pct, parse_target, trim_to_target};
use crate::gateway::VisionGateway;
use crate::grid::{GridComposer, GridItem};
use crate::job::{JobCompletion, JobPhase, SelectionFlag};
use crate::photo::{Photo, PhotoId};
use crate::selection::{build_selection_prompt, ConsensusSelector, SelectionPrompt};
use crate::storage::ObjectStore;
use crate::thumbnail::StreamingThumbnailer;

/// What the caller asked for.
#[derive(Debug, Clone)]
pub struct TriageRequest {
    /// `"10%"` or an absolute count such as `"50"`.
    pub target: String,
    /// Preset name or free text.
    pub criteria: String,
    pub passes: u8,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriageOutcome {
    pub total_input: usize,
    pub target_pct: f64,
    /// Input order.
    pub coarse_survivors: Vec<PhotoId>,
    /// `None` when the fine pass did not run.
    pub fine_survivors: Option<Vec<PhotoId>>,
    /// The trimmed final selection, input order.
    pub final_selection: Vec<PhotoId>,
    pub grids_processed: u64,
    pub api_calls: u64,
}

impl TriageOutcome {
    pub fn completion(&self) -> JobCompletion {
        JobCompletion {
            pass1_survivors: self.coarse_survivors.len() as u64,
            final_ids: self.final_selection.clone(),
            api_calls: self.api_calls,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    Coarse,
    Fine,
}

impl Pass {
    fn name(self) -> &'static str {
        match self {
            Self::Coarse => "coarse",
            Self::Fine => "fine",
        }
    }

    fn flag(self) -> SelectionFlag {
        match self {
            Self::Coarse => SelectionFlag::Coarse,
            Self::Fine => SelectionFlag::Fine,
        }
    }
}

/// Grid and API-call counters carried across both passes.
#[derive(Debug, Default)]
struct Steps {
    current: u64,
    total: u64,
    api_calls: u64,
}

impl Steps {
    fn report(&self, progress: &dyn ProgressReporter) -> Result<(), PipelineError> {
        progress.report(ProgressEvent::Steps {
            current_step: self.current,
            total_steps: self.total,
            api_calls: self.api_calls,
        })?;
        Ok(())
    }
}

/// Runs the coarse and fine passes over a photo batch.
///
/// Holds no per-job state, so one instance can serve many jobs.
pub struct TriagePipeline {
    config: PipelineConfig,
    thumbnailer: StreamingThumbnailer,
    selector: ConsensusSelector,
}

impl TriagePipeline {
    pub fn new(
        config: PipelineConfig,
        store: Arc<dyn ObjectStore>,
        gateway: Arc<dyn VisionGateway>,
        models: Vec<String>,
    ) -> Self {
        let thumbnailer = StreamingThumbnailer::new(store, config.reclaim_every);
        let selector = ConsensusSelector::new(gateway, models, config.model_timeout);
        Self {
            config,
            thumbnailer,
            selector,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Triage `photos` down to roughly the requested target.
    ///
    /// Cancellation is checked between grids only; a grid already sent to
    /// the models runs to completion.
    pub async fn run(
        &self,
        photos: &[Photo],
        request: &TriageRequest,
        progress: &dyn ProgressReporter,
    ) -> Result<TriageOutcome, PipelineError> {
        let total = photos.len();
        let target_pct = parse_target(&request.target, total)?;

        let mut outcome = TriageOutcome {
            total_input: total,
            target_pct,
            ..Default::default()
        };
        if total == 0 {
            info!("No photos submitted, nothing to triage");
            return Ok(outcome);
        }

        progress.report(ProgressEvent::Phase(JobPhase::GridGeneration))?;
        // The fine pass is planned as if every photo survived, then shrunk to
        // the real candidate count, so the total only ever goes down.
        let coarse_grids = self.config.coarse.grids_for(total) as u64;
        let planned_fine = if request.passes >= 2 {
            self.config.fine.grids_for(total) as u64
        } else {
            0
        };
        let mut steps = Steps {
            total: coarse_grids + planned_fine,
            ..Default::default()
        };
        steps.report(progress)?;

        // Pass 1
        progress.report(ProgressEvent::Phase(JobPhase::CoarsePass))?;
        let coarse_pct = coarse_target_pct(
            target_pct,
            self.config.coarse_multiplier,
            self.config.coarse_cap_pct,
        );
        let coarse = self
            .run_pass(
                Pass::Coarse,
                photos,
                coarse_pct,
                &request.criteria,
                &mut steps,
                progress,
            )
            .instrument(info_span!("triage.pass", pass = "coarse", photos = total))
            .await?;
        progress.report(ProgressEvent::CoarseSurvivors(coarse.len() as u64))?;
        info!(
            survivors = coarse.len(),
            total,
            target_pct = coarse_pct,
            "Coarse pass finished"
        );

        let mut selection = coarse.clone();
        outcome.coarse_survivors = coarse;

        // Pass 2
        if request.passes >= 2 && !selection.is_empty() {
            let by_id: HashMap<&PhotoId, &Photo> = photos.iter().map(|p| (&p.id, p)).collect();
            let candidates: Vec<Photo> = selection
                .iter()
                .filter_map(|id| by_id.get(id).map(|p| (*p).clone()))
                .collect();

            steps.total = coarse_grids + self.config.fine.grids_for(candidates.len()) as u64;
            steps.report(progress)?;
            progress.report(ProgressEvent::Phase(JobPhase::FinePass))?;

            let fine_pct = fine_target_pct(target_pct, total, candidates.len());
            let fine = self
                .run_pass(
                    Pass::Fine,
                    &candidates,
                    fine_pct,
                    &request.criteria,
                    &mut steps,
                    progress,
                )
                .instrument(info_span!(
                    "triage.pass",
                    pass = "fine",
                    photos = candidates.len()
                ))
                .await?;
            info!(
                survivors = fine.len(),
                candidates = candidates.len(),
                target_pct = fine_pct,
                "Fine pass finished"
            );
            selection = fine.clone();
            outcome.fine_survivors = Some(fine);
        } else if request.passes >= 2 {
            debug!("No coarse survivors, skipping fine pass");
            steps.total = steps.current;
            steps.report(progress)?;
        }

        let selected = selection.len();
        outcome.final_selection = trim_to_target(selection, target_pct, total);
        if outcome.final_selection.len() < selected {
            debug!(
                from = selected,
                to = outcome.final_selection.len(),
                "Trimmed selection to target"
            );
        }
        outcome.grids_processed = steps.current;
        outcome.api_calls = steps.api_calls;
        Ok(outcome)
    }

    /// One pass over `photos` in grid-sized batches. Returns the union of
    /// every grid's picks, in input order.
    async fn run_pass(
        &self,
        pass: Pass,
        photos: &[Photo],
        target_pct: f64,
        criteria: &str,
        steps: &mut Steps,
        progress: &dyn ProgressReporter,
    ) -> Result<Vec<PhotoId>, PipelineError> {
        let settings = match pass {
            Pass::Coarse => self.config.coarse,
            Pass::Fine => self.config.fine,
        };
        let mut survivors = Vec::new();

        for (index, batch) in photos.chunks(settings.photos_per_grid()).enumerate() {
            if progress.is_cancelled() {
                info!(pass = pass.name(), grid = index, "Cancelled between grids");
                return Err(PipelineError::Cancelled);
            }

            let picked = self
                .run_grid(pass, settings, batch, target_pct, criteria, steps)
                .instrument(info_span!(
                    "triage.grid",
                    pass = pass.name(),
                    grid = index,
                    photos = batch.len()
                ))
                .await?;

            if let Some(ids) = picked {
                progress.report(ProgressEvent::Selected {
                    flag: pass.flag(),
                    photo_ids: &ids,
                })?;
                survivors.extend(ids);
            }
            steps.current += 1;
            steps.report(progress)?;
        }

        Ok(survivors)
    }

    /// Thumbnails, composes and queries a single grid. `None` when no photo
    /// in the batch produced a thumbnail.
    async fn run_grid(
        &self,
        pass: Pass,
        settings: PassSettings,
        batch: &[Photo],
        target_pct: f64,
        criteria: &str,
        steps: &mut Steps,
    ) -> Result<Option<Vec<PhotoId>>, PipelineError> {
        let mut thumbnails = self
            .thumbnailer
            .thumbnail_batch(batch, settings.thumbnail_size)
            .await;
        if thumbnails.is_empty() {
            warn!(
                photos = batch.len(),
                "No thumbnails could be produced, skipping grid"
            );
            return Ok(None);
        }

        let items = batch
            .iter()
            .map(|p| GridItem::new(p.id.clone(), thumbnails.remove(&p.id)))
            .collect();
        let composer = GridComposer::new(settings.thumbnail_size, self.config.jpeg_quality);
        let grid = composer.compose(items, settings.grid_size)?;
        drop(thumbnails);

        let coord_range = grid.coord_range();
        let prompt = build_selection_prompt(&SelectionPrompt {
            coord_range: &coord_range,
            photo_count: grid.len(),
            target_pct,
            criteria,
        });

        let result = self.selector.select(&grid, &prompt).await;
        steps.api_calls += result.selections.len() as u64;

        let ids = result.photo_ids(&grid);
        debug!(
            pass = pass.name(),
            selected = ids.len(),
            models_ok = result.successful_models(),
            "Grid {} done",
            coord_range
        );
        Ok(Some(ids))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::GatewayError;
    use crate::job::JobStoreError;
    use crate::pipeline::NoopProgress;
    use crate::storage::MemoryObjectStore;
    use async_trait::async_trait;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Every model gives the same reply; `None` makes every call fail.
    struct FixedGateway {
        reply: Option<String>,
    }

    #[async_trait]
    impl VisionGateway for FixedGateway {
        async fn query(
            &self,
            _image_jpeg: &[u8],
            _prompt: &str,
            _model: &str,
        ) -> Result<String, GatewayError> {
            self.reply.clone().ok_or(GatewayError::EmptyResponse)
        }
    }

    #[derive(Default)]
    struct RecordingProgress {
        phases: Mutex<Vec<JobPhase>>,
        steps: Mutex<Vec<(u64, u64)>>,
        selected: Mutex<Vec<(SelectionFlag, Vec<PhotoId>)>>,
        cancelled: AtomicBool,
    }

    impl ProgressReporter for RecordingProgress {
        fn report(&self, event: ProgressEvent<'_>) -> Result<(), JobStoreError> {
            match event {
                ProgressEvent::Phase(phase) => self.phases.lock().unwrap().push(phase),
                ProgressEvent::Steps {
                    current_step,
                    total_steps,
                    ..
                } => self.steps.lock().unwrap().push((current_step, total_steps)),
                ProgressEvent::Selected { flag, photo_ids } => self
                    .selected
                    .lock()
                    .unwrap()
                    .push((flag, photo_ids.to_vec())),
                ProgressEvent::CoarseSurvivors(_) => {}
            }
            Ok(())
        }

        fn is_cancelled(&self) -> bool {
            self.cancelled.load(Ordering::SeqCst)
        }
    }

    fn png(shade: u8) -> Vec<u8> {
        let img = RgbImage::from_pixel(12, 8, Rgb([shade, 255 - shade, 64]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    /// `n` photos, all stored unless `stored` is false.
    fn photos(n: usize, store: &MemoryObjectStore, stored: bool) -> Vec<Photo> {
        (0..n)
            .map(|i| {
                let reference = format!("batch/p{}.png", i);
                if stored {
                    store.insert(reference.clone(), png((i * 7 % 256) as u8));
                }
                Photo::new(format!("p{}", i), reference)
            })
            .collect()
    }

    fn small_config() -> PipelineConfig {
        PipelineConfig {
            coarse: PassSettings {
                grid_size: 20,
                thumbnail_size: 16,
            },
            fine: PassSettings {
                grid_size: 4,
                thumbnail_size: 24,
            },
            model_timeout: Duration::from_secs(5),
            ..Default::default()
        }
    }

    fn pipeline(store: Arc<MemoryObjectStore>, reply: Option<&str>, models: &[&str]) -> TriagePipeline {
        TriagePipeline::new(
            small_config(),
            store,
            Arc::new(FixedGateway {
                reply: reply.map(str::to_string),
            }),
            models.iter().map(|m| m.to_string()).collect(),
        )
    }

    fn request(target: &str, passes: u8) -> TriageRequest {
        TriageRequest {
            target: target.to_string(),
            criteria: "best".to_string(),
            passes,
        }
    }

    fn ids(range: std::ops::Range<usize>) -> Vec<PhotoId> {
        range.map(|i| PhotoId::new(format!("p{}", i))).collect()
    }

    #[tokio::test]
    async fn test_zero_photos_completes_empty() {
        let store = Arc::new(MemoryObjectStore::new());
        let pipeline = pipeline(store, Some("A1"), &["m"]);
        let outcome = pipeline
            .run(&[], &request("10%", 2), &NoopProgress)
            .await
            .unwrap();

        assert!(outcome.final_selection.is_empty());
        assert_eq!(outcome.api_calls, 0);
        assert_eq!(outcome.grids_processed, 0);
    }

    #[tokio::test]
    async fn test_single_pass_trims_coarse_result() {
        let store = Arc::new(MemoryObjectStore::new());
        let photos = photos(16, &store, true);
        let pipeline = pipeline(
            store,
            Some("A1, A2, A3, A4, A5, A6, A7, A8, A9, A10, A11, A12"),
            &["m1", "m2"],
        );
        let progress = RecordingProgress::default();

        let outcome = pipeline
            .run(&photos, &request("20%", 1), &progress)
            .await
            .unwrap();

        // 16 photos fit one row of a 20-wide grid
        assert_eq!(outcome.coarse_survivors, ids(0..12));
        assert!(outcome.fine_survivors.is_none());
        assert_eq!(outcome.final_selection, ids(0..3));
        assert_eq!(outcome.grids_processed, 1);
        assert_eq!(outcome.api_calls, 2);
        assert_eq!(
            *progress.phases.lock().unwrap(),
            vec![JobPhase::GridGeneration, JobPhase::CoarsePass]
        );
        assert_eq!(*progress.steps.lock().unwrap(), vec![(0, 1), (1, 1)]);
    }

    #[tokio::test]
    async fn test_two_passes_narrow_survivors() {
        let store = Arc::new(MemoryObjectStore::new());
        let photos = photos(40, &store, true);
        let pipeline = pipeline(
            store,
            Some("A1, A2, A3, A4, A5, A6, A7, A8, A9, A10"),
            &["m"],
        );
        let progress = RecordingProgress::default();

        let outcome = pipeline
            .run(&photos, &request("10%", 2), &progress)
            .await
            .unwrap();

        assert_eq!(outcome.coarse_survivors, ids(0..10));
        // fine grid is 4 wide, so only A1-A4 exist there
        assert_eq!(outcome.fine_survivors, Some(ids(0..4)));
        assert_eq!(outcome.final_selection, ids(0..4));
        assert_eq!(outcome.grids_processed, 2);
        assert_eq!(outcome.completion().pass1_survivors, 10);

        let selected = progress.selected.lock().unwrap();
        assert_eq!(selected.len(), 2);
        assert_eq!(selected[0], (SelectionFlag::Coarse, ids(0..10)));
        assert_eq!(selected[1], (SelectionFlag::Fine, ids(0..4)));
        assert_eq!(progress.steps.lock().unwrap().last(), Some(&(2, 2)));
    }

    #[tokio::test]
    async fn test_progress_never_moves_backwards() {
        let store = Arc::new(MemoryObjectStore::new());
        let photos = photos(40, &store, true);
        let pipeline = pipeline(
            store,
            Some("A1, A2, A3, A4, A5, A6, A7, A8, A9, A10"),
            &["m"],
        );
        let progress = RecordingProgress::default();

        pipeline
            .run(&photos, &request("10%", 2), &progress)
            .await
            .unwrap();

        let steps = progress.steps.lock().unwrap();
        // 1 coarse grid plus 40 photos worth of 4x4 grids, later cut to 1
        assert_eq!(steps.first(), Some(&(0, 4)));
        assert_eq!(steps.last(), Some(&(2, 2)));
        for pair in steps.windows(2) {
            let ((c0, t0), (c1, t1)) = (pair[0], pair[1]);
            assert!(t1 <= t0, "total grew: {:?}", *steps);
            assert!(c1 >= c0, "step went back: {:?}", *steps);
            assert!(c1 * t0 >= c0 * t1, "percentage dropped: {:?}", *steps);
        }
    }

    #[tokio::test]
    async fn test_skipped_fine_pass_still_ends_at_full_progress() {
        let store = Arc::new(MemoryObjectStore::new());
        let photos = photos(5, &store, true);
        let pipeline = pipeline(store, None, &["m"]);
        let progress = RecordingProgress::default();

        pipeline
            .run(&photos, &request("10%", 2), &progress)
            .await
            .unwrap();

        assert_eq!(
            *progress.steps.lock().unwrap(),
            vec![(0, 2), (1, 2), (1, 1)]
        );
    }

    #[tokio::test]
    async fn test_all_models_failing_yields_empty_selection() {
        let store = Arc::new(MemoryObjectStore::new());
        let photos = photos(5, &store, true);
        let pipeline = pipeline(store, None, &["a", "b", "c"]);

        let outcome = pipeline
            .run(&photos, &request("10%", 2), &NoopProgress)
            .await
            .unwrap();

        assert!(outcome.coarse_survivors.is_empty());
        assert!(outcome.fine_survivors.is_none());
        assert!(outcome.final_selection.is_empty());
        assert_eq!(outcome.api_calls, 3);
    }

    #[tokio::test]
    async fn test_grid_without_thumbnails_is_skipped() {
        let store = Arc::new(MemoryObjectStore::new());
        let photos = photos(4, &store, false);
        let pipeline = pipeline(store, Some("A1"), &["m"]);
        let progress = RecordingProgress::default();

        let outcome = pipeline
            .run(&photos, &request("50%", 1), &progress)
            .await
            .unwrap();

        assert!(outcome.final_selection.is_empty());
        assert_eq!(outcome.api_calls, 0);
        assert_eq!(outcome.grids_processed, 1);
        assert!(progress.selected.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_between_grids() {
        let store = Arc::new(MemoryObjectStore::new());
        let photos = photos(3, &store, true);
        let pipeline = pipeline(store, Some("A1"), &["m"]);
        let progress = RecordingProgress::default();
        progress.cancelled.store(true, Ordering::SeqCst);

        let result = pipeline.run(&photos, &request("10%", 2), &progress).await;
        assert!(matches!(result, Err(PipelineError::Cancelled)));
        assert!(progress.selected.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_target_is_rejected() {
        let store = Arc::new(MemoryObjectStore::new());
        let photos = photos(3, &store, true);
        let pipeline = pipeline(store, Some("A1"), &["m"]);

        let result = pipeline
            .run(&photos, &request("250%", 1), &NoopProgress)
            .await;
        assert!(matches!(result, Err(PipelineError::Target(_))));
    }
}
