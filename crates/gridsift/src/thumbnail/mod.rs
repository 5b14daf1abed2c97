//! Square thumbnails from stored originals, produced one photo at a time.

pub mod streaming;

pub use streaming::{make_thumbnail, StreamingThumbnailer, DEFAULT_RECLAIM_EVERY};
