//! Live job progress for subscribers (e.g. a status stream in an API layer).
//! The job store remains the source of truth; events are best-effort.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::model::{JobPhase, JobStatus, TriageJob};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriageProgressEvent {
    pub job_id: String,
    pub status: JobStatus,
    pub phase: JobPhase,
    pub current_step: u64,
    pub total_steps: u64,
    pub progress_pct: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TriageProgressEvent {
    pub fn from_job(job: &TriageJob) -> Self {
        Self {
            job_id: job.id.clone(),
            status: job.status,
            phase: job.phase,
            current_step: job.current_step,
            total_steps: job.total_steps,
            progress_pct: job.progress_pct(),
            timestamp: Utc::now(),
            error: job.error_message.clone(),
        }
    }
}

/// Fan-out of progress events over a tokio broadcast channel.
#[derive(Clone)]
pub struct JobProgressBroadcaster {
    sender: Arc<broadcast::Sender<TriageProgressEvent>>,
}

impl JobProgressBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn send(&self, event: TriageProgressEvent) {
        // no active receivers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TriageProgressEvent> {
        self.sender.subscribe()
    }
}

impl Default for JobProgressBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(status: JobStatus) -> TriageJob {
        let now = Utc::now();
        TriageJob {
            id: "job-1".into(),
            user_id: "u".into(),
            status,
            phase: JobPhase::FinePass,
            target: "10%".into(),
            criteria: "best".into(),
            passes: 2,
            total_input: 16,
            pass1_survivors: 8,
            final_selected: 0,
            current_step: 1,
            total_steps: 2,
            credits_reserved: 1,
            api_calls: 4,
            error_message: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let broadcaster = JobProgressBroadcaster::default();
        let mut rx = broadcaster.subscribe();

        broadcaster.send(TriageProgressEvent::from_job(&job(JobStatus::Processing)));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.job_id, "job-1");
        assert_eq!(event.phase, JobPhase::FinePass);
        assert_eq!(event.progress_pct, 50.0);
    }

    #[test]
    fn test_send_without_subscribers_is_ok() {
        let broadcaster = JobProgressBroadcaster::new(4);
        broadcaster.send(TriageProgressEvent::from_job(&job(JobStatus::Completed)));
    }

    #[test]
    fn test_event_serializes_camel_case() {
        let event = TriageProgressEvent::from_job(&job(JobStatus::Processing));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["jobId"], "job-1");
        assert_eq!(json["status"], "processing");
        assert_eq!(json["totalSteps"], 2);
        assert!(json.get("error").is_none());
    }
}
