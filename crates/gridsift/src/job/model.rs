use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::photo::{Photo, PhotoId};

/// Lifecycle status of a triage job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub const ALL: [JobStatus; 5] = [
        Self::Pending,
        Self::Processing,
        Self::Completed,
        Self::Failed,
        Self::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Allowed edges: pending -> processing | failed | cancelled and
    /// processing -> completed | failed | cancelled. Nothing leaves a
    /// terminal state.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (Pending, Processing | Failed | Cancelled) | (Processing, Completed | Failed | Cancelled)
        )
    }

    /// Every status `to` may be reached from.
    pub fn sources_of(to: JobStatus) -> impl Iterator<Item = JobStatus> {
        Self::ALL
            .into_iter()
            .filter(move |from| from.can_transition_to(to))
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown job status '{}'", other)),
        }
    }
}

/// What the job is doing right now. Driven by the pipeline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    Uploading,
    GridGeneration,
    CoarsePass,
    FinePass,
    Complete,
}

impl JobPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uploading => "uploading",
            Self::GridGeneration => "grid_generation",
            Self::CoarsePass => "coarse_pass",
            Self::FinePass => "fine_pass",
            Self::Complete => "complete",
        }
    }
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobPhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uploading" => Ok(Self::Uploading),
            "grid_generation" => Ok(Self::GridGeneration),
            "coarse_pass" => Ok(Self::CoarsePass),
            "fine_pass" => Ok(Self::FinePass),
            "complete" => Ok(Self::Complete),
            other => Err(format!("unknown job phase '{}'", other)),
        }
    }
}

/// The durable unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriageJob {
    pub id: String,
    pub user_id: String,
    pub status: JobStatus,
    pub phase: JobPhase,
    /// As submitted: `"10%"` or an absolute count such as `"50"`.
    pub target: String,
    pub criteria: String,
    pub passes: u8,
    pub total_input: u64,
    pub pass1_survivors: u64,
    pub final_selected: u64,
    pub current_step: u64,
    pub total_steps: u64,
    pub credits_reserved: u64,
    pub api_calls: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl TriageJob {
    /// Grid progress as a percentage. Completed jobs always report 100.
    pub fn progress_pct(&self) -> f64 {
        if self.status == JobStatus::Completed {
            return 100.0;
        }
        if self.total_steps == 0 {
            return 0.0;
        }
        (self.current_step as f64 / self.total_steps as f64 * 100.0).min(100.0)
    }
}

/// Parameters for creating a job.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub user_id: String,
    pub target: String,
    pub criteria: String,
    pub passes: u8,
    pub total_input: u64,
    pub credits_reserved: u64,
}

/// A photo scoped to one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriagePhoto {
    #[serde(flatten)]
    pub photo: Photo,
    /// Submission order within the job.
    pub position: u64,
    pub selected_coarse: bool,
    pub selected_fine: bool,
    pub final_selected: bool,
}

/// Per-photo flag written by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionFlag {
    Coarse,
    Fine,
    Final,
}

impl SelectionFlag {
    pub fn column(&self) -> &'static str {
        match self {
            Self::Coarse => "selected_coarse",
            Self::Fine => "selected_fine",
            Self::Final => "final_selected",
        }
    }
}

/// Counts and final selection written when a job completes.
#[derive(Debug, Clone, Default)]
pub struct JobCompletion {
    pub pass1_survivors: u64,
    pub final_ids: Vec<PhotoId>,
    pub api_calls: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [JobStatus; 5] = JobStatus::ALL;

    #[test]
    fn test_terminal_states_have_no_exits() {
        for from in ALL.iter().filter(|s| s.is_terminal()) {
            for to in ALL {
                assert!(!from.can_transition_to(to), "{} -> {}", from, to);
            }
        }
    }

    #[test]
    fn test_sources_of_each_target() {
        use JobStatus::*;
        let sources = |to| JobStatus::sources_of(to).collect::<Vec<_>>();
        assert_eq!(sources(Processing), vec![Pending]);
        assert_eq!(sources(Completed), vec![Processing]);
        assert_eq!(sources(Failed), vec![Pending, Processing]);
        assert_eq!(sources(Cancelled), vec![Pending, Processing]);
        assert!(sources(Pending).is_empty());
    }

    #[test]
    fn test_allowed_transitions() {
        use JobStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Pending.can_transition_to(Failed));
        assert!(!Pending.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));
        assert!(Processing.can_transition_to(Cancelled));
        assert!(!Processing.can_transition_to(Pending));
        assert!(!Processing.can_transition_to(Processing));
    }

    #[test]
    fn test_status_and_phase_round_trip_through_strings() {
        for status in ALL {
            assert_eq!(status.as_str().parse::<JobStatus>(), Ok(status));
        }
        for phase in [
            JobPhase::Uploading,
            JobPhase::GridGeneration,
            JobPhase::CoarsePass,
            JobPhase::FinePass,
            JobPhase::Complete,
        ] {
            assert_eq!(phase.as_str().parse::<JobPhase>(), Ok(phase));
        }
        assert!("ignored".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_progress_pct() {
        let now = Utc::now();
        let mut job = TriageJob {
            id: "j".into(),
            user_id: "u".into(),
            status: JobStatus::Processing,
            phase: JobPhase::CoarsePass,
            target: "10%".into(),
            criteria: "best".into(),
            passes: 2,
            total_input: 400,
            pass1_survivors: 0,
            final_selected: 0,
            current_step: 0,
            total_steps: 0,
            credits_reserved: 3,
            api_calls: 0,
            error_message: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };
        assert_eq!(job.progress_pct(), 0.0);
        job.current_step = 2;
        job.total_steps = 8;
        assert_eq!(job.progress_pct(), 25.0);
        job.status = JobStatus::Completed;
        assert_eq!(job.progress_pct(), 100.0);
    }

    #[test]
    fn test_status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&JobPhase::GridGeneration).unwrap(),
            "\"grid_generation\""
        );
        assert_eq!(
            serde_json::to_string(&JobStatus::Cancelled).unwrap(),
            "\"cancelled\""
        );
    }
}
