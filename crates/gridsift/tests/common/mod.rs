//! Shared fakes and fixtures for the integration tests.

#![allow(dead_code)]

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use image::{ImageFormat, Rgb, RgbImage};

use gridsift::billing::SqliteCreditLedger;
use gridsift::db::{Database, DatabaseError};
use gridsift::gateway::{GatewayError, VisionGateway};
use gridsift::grid::row_letter;
use gridsift::job::{
    JobCompletion, JobPhase, JobStore, JobStoreError, NewJob, SelectionFlag, SqliteJobStore,
    TriageJob, TriagePhoto,
};
use gridsift::photo::{Photo, PhotoId};
use gridsift::pipeline::{PassSettings, PipelineConfig, TriagePipeline};
use gridsift::service::TriageService;
use gridsift::storage::MemoryObjectStore;

type Script = dyn Fn(&str, &str) -> Result<String, GatewayError> + Send + Sync;

/// Answers from a closure over `(prompt, model)` and counts calls.
pub struct ScriptedGateway {
    script: Box<Script>,
    calls: AtomicUsize,
}

impl ScriptedGateway {
    pub fn new<F>(script: F) -> Self
    where
        F: Fn(&str, &str) -> Result<String, GatewayError> + Send + Sync + 'static,
    {
        Self {
            script: Box::new(script),
            calls: AtomicUsize::new(0),
        }
    }

    /// Same reply for every call.
    pub fn fixed(reply: &str) -> Self {
        let reply = reply.to_string();
        Self::new(move |_, _| Ok(reply.clone()))
    }

    /// Every call fails.
    pub fn failing() -> Self {
        Self::new(|_, _| {
            Err(GatewayError::Api {
                status: 503,
                body: "model overloaded".to_string(),
            })
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VisionGateway for ScriptedGateway {
    async fn query(
        &self,
        _image_jpeg: &[u8],
        prompt: &str,
        model: &str,
    ) -> Result<String, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.script)(prompt, model)
    }
}

/// `"A1, A2, ..."` for the first `rows` rows of a grid `cols` wide.
pub fn coordinate_list(rows: usize, cols: usize) -> String {
    let mut coords = Vec::with_capacity(rows * cols);
    for row in 0..rows {
        for col in 1..=cols {
            coords.push(format!("{}{}", row_letter(row), col));
        }
    }
    coords.join(", ")
}

pub fn png(seed: usize) -> Vec<u8> {
    let shade = (seed * 37 % 256) as u8;
    let img = RgbImage::from_fn(12, 9, |x, y| {
        Rgb([shade, (x * 20) as u8, (y * 25) as u8])
    });
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

/// Stores `count` generated images and returns their photos.
pub fn upload_photos(objects: &MemoryObjectStore, count: usize) -> Vec<Photo> {
    (0..count)
        .map(|i| {
            let reference = format!("uploads/img_{:04}.png", i);
            objects.insert(reference.clone(), png(i));
            Photo::new(format!("photo-{:04}", i), reference)
        })
        .collect()
}

pub fn photo_ids(photos: &[Photo]) -> Vec<PhotoId> {
    photos.iter().map(|p| p.id.clone()).collect()
}

/// Default pass shapes with small thumbnails so tests stay fast.
pub fn test_pipeline_config() -> PipelineConfig {
    PipelineConfig {
        coarse: PassSettings {
            grid_size: 20,
            thumbnail_size: 16,
        },
        fine: PassSettings {
            grid_size: 4,
            thumbnail_size: 32,
        },
        model_timeout: Duration::from_secs(10),
        ..Default::default()
    }
}

pub const USER: &str = "user-1";

pub struct Harness {
    pub service: TriageService,
    pub jobs: Arc<dyn JobStore>,
    pub ledger: Arc<SqliteCreditLedger>,
    pub objects: Arc<MemoryObjectStore>,
}

/// Service over in-memory stores with `credits` deposited for [`USER`].
pub fn harness(gateway: Arc<dyn VisionGateway>, models: &[&str], credits: u64) -> Harness {
    harness_with(gateway, models, credits, |store| {
        Arc::new(store) as Arc<dyn JobStore>
    })
}

/// Like [`harness`], but lets the caller wrap the job store.
pub fn harness_with<F>(
    gateway: Arc<dyn VisionGateway>,
    models: &[&str],
    credits: u64,
    wrap: F,
) -> Harness
where
    F: FnOnce(SqliteJobStore) -> Arc<dyn JobStore>,
{
    let db = Database::open_in_memory().unwrap();
    let jobs = wrap(SqliteJobStore::new(db.clone()));
    let ledger = Arc::new(SqliteCreditLedger::new(db));
    ledger.deposit(USER, credits).unwrap();
    let objects = Arc::new(MemoryObjectStore::new());

    let pipeline = TriagePipeline::new(
        test_pipeline_config(),
        objects.clone(),
        gateway,
        models.iter().map(|m| m.to_string()).collect(),
    );
    let service = TriageService::new(
        Arc::new(pipeline),
        jobs.clone(),
        ledger.clone(),
        objects.clone(),
    );

    Harness {
        service,
        jobs,
        ledger,
        objects,
    }
}

/// Which store writes a [`FaultyStore`] turns into database errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Recording the fine-pass selection fails.
    FineSelection,
    /// Every write after a successful claim fails, `fail` included.
    AfterClaim,
}

/// Job store that injects `LockPoisoned` errors into selected writes.
pub struct FaultyStore {
    pub inner: SqliteJobStore,
    fault: Fault,
    claimed: AtomicBool,
}

impl FaultyStore {
    pub fn new(inner: SqliteJobStore, fault: Fault) -> Self {
        Self {
            inner,
            fault,
            claimed: AtomicBool::new(false),
        }
    }

    fn write_guard(&self) -> Result<(), JobStoreError> {
        if self.fault == Fault::AfterClaim && self.claimed.load(Ordering::SeqCst) {
            return Err(JobStoreError::Database(DatabaseError::LockPoisoned));
        }
        Ok(())
    }
}

impl JobStore for FaultyStore {
    fn create_job(&self, new_job: NewJob) -> Result<TriageJob, JobStoreError> {
        self.inner.create_job(new_job)
    }

    fn attach_photos(&self, job_id: &str, photos: &[Photo]) -> Result<(), JobStoreError> {
        self.inner.attach_photos(job_id, photos)
    }

    fn get_job(&self, job_id: &str) -> Result<TriageJob, JobStoreError> {
        self.inner.get_job(job_id)
    }

    fn claim(&self, job_id: &str) -> Result<(), JobStoreError> {
        self.inner.claim(job_id)?;
        self.claimed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn set_phase(&self, job_id: &str, phase: JobPhase) -> Result<(), JobStoreError> {
        self.write_guard()?;
        self.inner.set_phase(job_id, phase)
    }

    fn set_progress(
        &self,
        job_id: &str,
        current_step: u64,
        total_steps: u64,
        api_calls: u64,
    ) -> Result<(), JobStoreError> {
        self.write_guard()?;
        self.inner
            .set_progress(job_id, current_step, total_steps, api_calls)
    }

    fn record_coarse_survivors(&self, job_id: &str, survivors: u64) -> Result<(), JobStoreError> {
        self.write_guard()?;
        self.inner.record_coarse_survivors(job_id, survivors)
    }

    fn mark_selected(
        &self,
        job_id: &str,
        flag: SelectionFlag,
        photo_ids: &[PhotoId],
    ) -> Result<usize, JobStoreError> {
        self.write_guard()?;
        if self.fault == Fault::FineSelection && flag == SelectionFlag::Fine {
            return Err(JobStoreError::Database(DatabaseError::LockPoisoned));
        }
        self.inner.mark_selected(job_id, flag, photo_ids)
    }

    fn complete(&self, job_id: &str, completion: &JobCompletion) -> Result<(), JobStoreError> {
        self.write_guard()?;
        self.inner.complete(job_id, completion)
    }

    fn fail(&self, job_id: &str, message: &str) -> Result<(), JobStoreError> {
        self.write_guard()?;
        self.inner.fail(job_id, message)
    }

    fn cancel(&self, job_id: &str) -> Result<(), JobStoreError> {
        self.inner.cancel(job_id)
    }

    fn active_jobs_for_user(&self, user_id: &str) -> Result<Vec<TriageJob>, JobStoreError> {
        self.inner.active_jobs_for_user(user_id)
    }

    fn photos(&self, job_id: &str, final_only: bool) -> Result<Vec<TriagePhoto>, JobStoreError> {
        self.inner.photos(job_id, final_only)
    }

    fn delete_photos(&self, job_id: &str) -> Result<usize, JobStoreError> {
        self.inner.delete_photos(job_id)
    }
}
