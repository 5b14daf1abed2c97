//! Triage job lifecycle: model, durable store and progress events.

pub mod model;
pub mod progress;
pub mod store;

pub use model::{
    JobCompletion, JobPhase, JobStatus, NewJob, SelectionFlag, TriageJob, TriagePhoto,
};
pub use progress::{JobProgressBroadcaster, TriageProgressEvent};
pub use store::{JobStore, JobStoreError, SqliteJobStore};
