//! Durable job store.
//!
//! Every status change is a guarded `UPDATE` (`WHERE status IN (...)`), so two
//! writers racing on the same job cannot move it out of a terminal state.

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::model::{
    JobCompletion, JobPhase, JobStatus, NewJob, SelectionFlag, TriageJob, TriagePhoto,
};
use super::progress::{JobProgressBroadcaster, TriageProgressEvent};
use crate::db::job_repo::{self, JobRow};
use crate::db::photo_repo::{self, PhotoRow};
use crate::db::{now_timestamp, Database, DatabaseError};
use crate::photo::{Photo, PhotoId};

#[derive(Debug, Error)]
pub enum JobStoreError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Invalid job transition {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    /// A pipeline write hit a job that is no longer processing.
    #[error("Job {job_id} is {status}, not processing")]
    NotProcessing { job_id: String, status: JobStatus },
}

impl JobStoreError {
    /// True when the job was cancelled underneath the caller.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::InvalidTransition {
                from: JobStatus::Cancelled,
                ..
            } | Self::NotProcessing {
                status: JobStatus::Cancelled,
                ..
            }
        )
    }
}

/// Repository for triage jobs and their photos.
pub trait JobStore: Send + Sync {
    fn create_job(&self, new_job: NewJob) -> Result<TriageJob, JobStoreError>;

    /// Attaches photos in submission order.
    fn attach_photos(&self, job_id: &str, photos: &[Photo]) -> Result<(), JobStoreError>;

    fn get_job(&self, job_id: &str) -> Result<TriageJob, JobStoreError>;

    /// pending -> processing.
    fn claim(&self, job_id: &str) -> Result<(), JobStoreError>;

    fn set_phase(&self, job_id: &str, phase: JobPhase) -> Result<(), JobStoreError>;

    fn set_progress(
        &self,
        job_id: &str,
        current_step: u64,
        total_steps: u64,
        api_calls: u64,
    ) -> Result<(), JobStoreError>;

    fn record_coarse_survivors(&self, job_id: &str, survivors: u64) -> Result<(), JobStoreError>;

    /// Sets a selection flag on the given photos. Returns rows changed.
    fn mark_selected(
        &self,
        job_id: &str,
        flag: SelectionFlag,
        photo_ids: &[PhotoId],
    ) -> Result<usize, JobStoreError>;

    /// processing -> completed, fixing counts and final flags atomically.
    fn complete(&self, job_id: &str, completion: &JobCompletion) -> Result<(), JobStoreError>;

    fn fail(&self, job_id: &str, message: &str) -> Result<(), JobStoreError>;

    fn cancel(&self, job_id: &str) -> Result<(), JobStoreError>;

    fn active_jobs_for_user(&self, user_id: &str) -> Result<Vec<TriageJob>, JobStoreError>;

    fn photos(&self, job_id: &str, final_only: bool) -> Result<Vec<TriagePhoto>, JobStoreError>;

    /// Removes photo records. Returns how many were removed.
    fn delete_photos(&self, job_id: &str) -> Result<usize, JobStoreError>;
}

fn parse_timestamp(s: &str, column: &'static str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| DatabaseError::Corrupt {
            table: "triage_jobs",
            column,
            value: s.to_string(),
        })
}

fn parse_status(s: &str) -> Result<JobStatus, DatabaseError> {
    s.parse().map_err(|_| DatabaseError::Corrupt {
        table: "triage_jobs",
        column: "status",
        value: s.to_string(),
    })
}

impl TryFrom<JobRow> for TriageJob {
    type Error = DatabaseError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let phase = row.phase.parse().map_err(|_| DatabaseError::Corrupt {
            table: "triage_jobs",
            column: "phase",
            value: row.phase.clone(),
        })?;
        let completed_at = row
            .completed_at
            .as_deref()
            .map(|s| parse_timestamp(s, "completed_at"))
            .transpose()?;

        Ok(Self {
            status: parse_status(&row.status)?,
            phase,
            created_at: parse_timestamp(&row.created_at, "created_at")?,
            updated_at: parse_timestamp(&row.updated_at, "updated_at")?,
            completed_at,
            id: row.id,
            user_id: row.user_id,
            target: row.target,
            criteria: row.criteria,
            passes: row.passes,
            total_input: row.total_input,
            pass1_survivors: row.pass1_survivors,
            final_selected: row.final_selected,
            current_step: row.current_step,
            total_steps: row.total_steps,
            credits_reserved: row.credits_reserved,
            api_calls: row.api_calls,
            error_message: row.error_message,
        })
    }
}

impl From<PhotoRow> for TriagePhoto {
    fn from(row: PhotoRow) -> Self {
        Self {
            photo: Photo {
                id: PhotoId::new(row.photo_id),
                storage_ref: row.storage_ref,
                content_hash: row.content_hash,
            },
            position: row.position,
            selected_coarse: row.selected_coarse,
            selected_fine: row.selected_fine,
            final_selected: row.final_selected,
        }
    }
}

/// `JobStore` on the shared SQLite database.
#[derive(Clone)]
pub struct SqliteJobStore {
    db: Database,
    broadcaster: Option<JobProgressBroadcaster>,
}

impl SqliteJobStore {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            broadcaster: None,
        }
    }

    /// Publishes a progress event after every successful job update.
    pub fn with_broadcaster(mut self, broadcaster: JobProgressBroadcaster) -> Self {
        self.broadcaster = Some(broadcaster);
        self
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    fn publish(&self, job_id: &str) {
        let Some(broadcaster) = &self.broadcaster else {
            return;
        };
        match self.get_job(job_id) {
            Ok(job) => broadcaster.send(TriageProgressEvent::from_job(&job)),
            Err(e) => log::debug!("Skipping progress event for job {}: {}", job_id, e),
        }
    }

    /// Works out why a guarded update touched no rows.
    fn rejected(&self, job_id: &str, to: JobStatus) -> JobStoreError {
        match job_repo::status_of(&self.db, job_id) {
            Ok(Some(status)) => match parse_status(&status) {
                Ok(from) => JobStoreError::InvalidTransition { from, to },
                Err(e) => e.into(),
            },
            Ok(None) => JobStoreError::NotFound(job_id.to_string()),
            Err(e) => e.into(),
        }
    }

    /// Same as `rejected`, for writes that require `processing`.
    fn not_processing(&self, job_id: &str) -> JobStoreError {
        match job_repo::status_of(&self.db, job_id) {
            Ok(Some(status)) => match parse_status(&status) {
                Ok(status) => JobStoreError::NotProcessing {
                    job_id: job_id.to_string(),
                    status,
                },
                Err(e) => e.into(),
            },
            Ok(None) => JobStoreError::NotFound(job_id.to_string()),
            Err(e) => e.into(),
        }
    }
}

impl JobStore for SqliteJobStore {
    fn create_job(&self, new_job: NewJob) -> Result<TriageJob, JobStoreError> {
        let now = now_timestamp();
        let row = JobRow {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: new_job.user_id,
            status: JobStatus::Pending.as_str().to_string(),
            phase: JobPhase::Uploading.as_str().to_string(),
            target: new_job.target,
            criteria: new_job.criteria,
            passes: new_job.passes,
            total_input: new_job.total_input,
            pass1_survivors: 0,
            final_selected: 0,
            current_step: 0,
            total_steps: 0,
            credits_reserved: new_job.credits_reserved,
            api_calls: 0,
            error_message: None,
            created_at: now.clone(),
            updated_at: now,
            completed_at: None,
        };
        job_repo::insert(&self.db, &row)?;
        log::info!("Created triage job {} for user {}", row.id, row.user_id);
        Ok(TriageJob::try_from(row)?)
    }

    fn attach_photos(&self, job_id: &str, photos: &[Photo]) -> Result<(), JobStoreError> {
        let rows: Vec<PhotoRow> = photos
            .iter()
            .enumerate()
            .map(|(i, p)| PhotoRow {
                job_id: job_id.to_string(),
                photo_id: p.id.as_str().to_string(),
                position: i as u64,
                storage_ref: p.storage_ref.clone(),
                content_hash: p.content_hash.clone(),
                selected_coarse: false,
                selected_fine: false,
                final_selected: false,
            })
            .collect();
        photo_repo::insert_many(&self.db, &rows)?;
        log::debug!("Attached {} photos to job {}", rows.len(), job_id);
        Ok(())
    }

    fn get_job(&self, job_id: &str) -> Result<TriageJob, JobStoreError> {
        let row = job_repo::find_by_id(&self.db, job_id)?
            .ok_or_else(|| JobStoreError::NotFound(job_id.to_string()))?;
        Ok(TriageJob::try_from(row)?)
    }

    fn claim(&self, job_id: &str) -> Result<(), JobStoreError> {
        if !job_repo::claim(&self.db, job_id, &now_timestamp())? {
            return Err(self.rejected(job_id, JobStatus::Processing));
        }
        self.publish(job_id);
        Ok(())
    }

    fn set_phase(&self, job_id: &str, phase: JobPhase) -> Result<(), JobStoreError> {
        if !job_repo::set_phase(&self.db, job_id, phase.as_str(), &now_timestamp())? {
            return Err(self.not_processing(job_id));
        }
        self.publish(job_id);
        Ok(())
    }

    fn set_progress(
        &self,
        job_id: &str,
        current_step: u64,
        total_steps: u64,
        api_calls: u64,
    ) -> Result<(), JobStoreError> {
        let updated = job_repo::set_progress(
            &self.db,
            job_id,
            current_step,
            total_steps,
            api_calls,
            &now_timestamp(),
        )?;
        if !updated {
            return Err(self.not_processing(job_id));
        }
        self.publish(job_id);
        Ok(())
    }

    fn record_coarse_survivors(&self, job_id: &str, survivors: u64) -> Result<(), JobStoreError> {
        if !job_repo::set_pass1_survivors(&self.db, job_id, survivors, &now_timestamp())? {
            return Err(self.not_processing(job_id));
        }
        Ok(())
    }

    fn mark_selected(
        &self,
        job_id: &str,
        flag: SelectionFlag,
        photo_ids: &[PhotoId],
    ) -> Result<usize, JobStoreError> {
        let ids: Vec<String> = photo_ids.iter().map(|p| p.as_str().to_string()).collect();
        let changed = self.db.with_transaction(|conn| {
            let status = job_repo::status_with_conn(conn, job_id)?;
            if status.as_deref() != Some(JobStatus::Processing.as_str()) {
                return Ok(None);
            }
            photo_repo::set_flag(conn, job_id, flag.column(), &ids).map(Some)
        })?;
        changed.ok_or_else(|| self.not_processing(job_id))
    }

    fn complete(&self, job_id: &str, completion: &JobCompletion) -> Result<(), JobStoreError> {
        let ids: Vec<String> = completion
            .final_ids
            .iter()
            .map(|p| p.as_str().to_string())
            .collect();
        let now = now_timestamp();

        let done = self.db.with_transaction(|conn| {
            let updated = job_repo::complete(
                conn,
                job_id,
                completion.pass1_survivors,
                ids.len() as u64,
                completion.api_calls,
                &now,
            )?;
            if updated {
                photo_repo::set_flag(conn, job_id, SelectionFlag::Final.column(), &ids)?;
            }
            Ok(updated)
        })?;

        if !done {
            return Err(self.rejected(job_id, JobStatus::Completed));
        }
        log::info!(
            "Job {} completed: {} selected of {} coarse survivors",
            job_id,
            ids.len(),
            completion.pass1_survivors
        );
        self.publish(job_id);
        Ok(())
    }

    fn fail(&self, job_id: &str, message: &str) -> Result<(), JobStoreError> {
        if !job_repo::fail(&self.db, job_id, message, &now_timestamp())? {
            return Err(self.rejected(job_id, JobStatus::Failed));
        }
        log::warn!("Job {} failed: {}", job_id, message);
        self.publish(job_id);
        Ok(())
    }

    fn cancel(&self, job_id: &str) -> Result<(), JobStoreError> {
        if !job_repo::cancel(&self.db, job_id, &now_timestamp())? {
            return Err(self.rejected(job_id, JobStatus::Cancelled));
        }
        log::info!("Job {} cancelled", job_id);
        self.publish(job_id);
        Ok(())
    }

    fn active_jobs_for_user(&self, user_id: &str) -> Result<Vec<TriageJob>, JobStoreError> {
        let rows = job_repo::list_active_for_user(&self.db, user_id)?;
        let jobs = rows
            .into_iter()
            .map(TriageJob::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(jobs)
    }

    fn photos(&self, job_id: &str, final_only: bool) -> Result<Vec<TriagePhoto>, JobStoreError> {
        let rows = photo_repo::list_for_job(&self.db, job_id, final_only)?;
        Ok(rows.into_iter().map(TriagePhoto::from).collect())
    }

    fn delete_photos(&self, job_id: &str) -> Result<usize, JobStoreError> {
        Ok(photo_repo::delete_for_job(&self.db, job_id)?)
    }
}
