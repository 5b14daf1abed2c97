use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;

use image::imageops::FilterType;
use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder, ImageReader, RgbImage};
use tracing::{debug, warn};

use crate::error::ThumbnailError;
use crate::photo::{Photo, PhotoId};
use crate::sanitize::redact_ref;
use crate::storage::ObjectStore;

pub const DEFAULT_RECLAIM_EVERY: usize = 10;

/// Decodes `bytes`, applies the EXIF orientation, center-crops to a square
/// and resizes to `size` x `size`.
pub fn make_thumbnail(bytes: &[u8], size: u32) -> Result<RgbImage, ThumbnailError> {
    let reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
    let mut decoder = reader.into_decoder()?;
    let orientation = decoder
        .orientation()
        .unwrap_or(Orientation::NoTransforms);

    let mut img = DynamicImage::from_decoder(decoder)?;
    img.apply_orientation(orientation);

    let (width, height) = (img.width(), img.height());
    if width == 0 || height == 0 {
        return Err(ThumbnailError::EmptyImage);
    }

    let side = width.min(height);
    let square = img.crop_imm((width - side) / 2, (height - side) / 2, side, side);
    let size = size.max(1);
    Ok(square.resize_exact(size, size, FilterType::Triangle).to_rgb8())
}

/// Produces thumbnails while holding at most one decoded original in memory.
///
/// Each original is fetched, decoded on the blocking pool and dropped before
/// the next one is fetched. Every `reclaim_every` photos the task yields back
/// to the runtime so long batches do not starve other jobs.
pub struct StreamingThumbnailer {
    store: Arc<dyn ObjectStore>,
    reclaim_every: usize,
}

impl StreamingThumbnailer {
    pub fn new(store: Arc<dyn ObjectStore>, reclaim_every: usize) -> Self {
        Self {
            store,
            reclaim_every: reclaim_every.max(1),
        }
    }

    /// Thumbnail for a single photo.
    pub async fn thumbnail(&self, photo: &Photo, size: u32) -> Result<RgbImage, ThumbnailError> {
        let bytes = self
            .store
            .fetch(&photo.storage_ref)
            .await
            .map_err(|source| ThumbnailError::Fetch {
                storage_ref: redact_ref(&photo.storage_ref),
                source,
            })?;

        tokio::task::spawn_blocking(move || make_thumbnail(&bytes, size))
            .await
            .map_err(|e| ThumbnailError::Worker(e.to_string()))?
    }

    /// Thumbnails for a batch, keyed by photo id. Photos that fail to fetch or
    /// decode are logged and left out; the caller renders placeholders.
    pub async fn thumbnail_batch(
        &self,
        photos: &[Photo],
        size: u32,
    ) -> HashMap<PhotoId, RgbImage> {
        let mut thumbnails = HashMap::with_capacity(photos.len());

        for (i, photo) in photos.iter().enumerate() {
            match self.thumbnail(photo, size).await {
                Ok(thumb) => {
                    thumbnails.insert(photo.id.clone(), thumb);
                }
                Err(e) => {
                    warn!(
                        photo_id = %photo.id,
                        storage_ref = %redact_ref(&photo.storage_ref),
                        "Thumbnail failed: {}",
                        e
                    );
                }
            }

            if (i + 1) % self.reclaim_every == 0 {
                debug!(processed = i + 1, "Thumbnail checkpoint");
                tokio::task::yield_now().await;
            }
        }

        thumbnails
    }
}
