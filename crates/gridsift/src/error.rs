use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GridsiftError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Grid composition error: {0}")]
    Compose(#[from] ComposeError),

    #[error("Thumbnail error: {0}")]
    Thumbnail(#[from] ThumbnailError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] crate::gateway::GatewayError),

    #[error("Billing error: {0}")]
    Billing(#[from] crate::billing::BillingError),

    #[error("Job store error: {0}")]
    JobStore(#[from] crate::job::JobStoreError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] crate::pipeline::PipelineError),

    #[error("Service error: {0}")]
    Service(#[from] crate::service::ServiceError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("Invalid model list: {reason}")]
    InvalidModels { reason: String },

    #[error("Failed to resolve API key: {0}")]
    Secret(#[from] crate::secrets::SecretError),

    #[error("Failed to initialize logging: {0}")]
    Logging(String),
}

#[derive(Error, Debug)]
pub enum ComposeError {
    #[error("Cannot compose a grid from zero photos")]
    Empty,

    #[error("{count} photos do not fit a {grid_size}x{grid_size} grid")]
    TooManyItems { count: usize, grid_size: usize },

    #[error("Invalid grid size {0} (expected 1-20)")]
    InvalidGridSize(usize),

    #[error("Failed to encode grid image: {0}")]
    Encode(#[from] image::ImageError),
}

#[derive(Error, Debug)]
pub enum ThumbnailError {
    #[error("Failed to fetch '{storage_ref}': {source}")]
    Fetch {
        storage_ref: String,
        #[source]
        source: StorageError,
    },

    #[error("Failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("Failed to read image header: {0}")]
    Header(#[from] std::io::Error),

    #[error("Image has zero width or height")]
    EmptyImage,

    #[error("Thumbnail worker failed: {0}")]
    Worker(String),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid storage reference '{reference}': {reason}")]
    InvalidReference { reference: String, reason: String },

    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to delete file '{path}': {source}")]
    DeleteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("File already exists: {0}")]
    FileExists(PathBuf),
}

pub type Result<T> = std::result::Result<T, GridsiftError>;
