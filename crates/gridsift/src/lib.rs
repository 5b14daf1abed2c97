pub mod billing;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod grid;
pub mod job;
pub mod logging;
pub mod photo;
pub mod pipeline;
pub mod sanitize;
pub mod secrets;
pub mod selection;
pub mod service;
pub mod storage;
pub mod thumbnail;

pub use billing::{credit_cost, BillingError, CreditLedger, SqliteCreditLedger};
pub use config::{load_config, load_config_from_str, Config};
pub use db::{Database, DatabaseError};
pub use error::{ComposeError, ConfigError, GridsiftError, Result, StorageError, ThumbnailError};
pub use gateway::{GatewayError, HttpVisionGateway, VisionGateway};
pub use grid::{ComposedGrid, Coordinate, GridComposer, GridItem};
pub use job::{
    JobPhase, JobProgressBroadcaster, JobStatus, JobStore, JobStoreError, SqliteJobStore,
    TriageJob, TriagePhoto,
};
pub use logging::init_logging;
pub use photo::{Photo, PhotoId};
pub use pipeline::{PipelineConfig, PipelineError, TriageOutcome, TriagePipeline, TriageRequest};
pub use secrets::{ApiKeySource, SecretError};
pub use selection::{ConsensusResult, ConsensusSelector, ModelSelection};
pub use service::{JobHandle, JobStatusView, ServiceError, StartRequest, TriageService};
pub use storage::{FileObjectStore, MemoryObjectStore, ObjectStore};
pub use thumbnail::StreamingThumbnailer;
