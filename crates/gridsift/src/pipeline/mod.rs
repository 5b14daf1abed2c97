//! Two-pass grid triage: coarse over-selection, fine narrowing, final trim.

pub mod error;
pub mod plan;
pub mod progress;
pub mod runner;
pub mod target;

pub use error::PipelineError;
pub use plan::{PassSettings, PipelineConfig};
pub use progress::{NoopProgress, ProgressEvent, ProgressReporter, StoreProgress};
pub use runner::{TriageOutcome, TriagePipeline, TriageRequest};
pub use target::{
    coarse_target_pct, fine_target_pct, parse_target, target_count, trim_to_target, TargetError,
};
