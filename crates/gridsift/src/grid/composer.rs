use std::collections::HashMap;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use tracing::debug;

use crate::error::ComposeError;
use crate::photo::PhotoId;

use super::coordinate::{row_letter, Coordinate, MAX_ROWS};
use super::font::{draw_text_centered, text_height, text_width};

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const LABEL: Rgb<u8> = Rgb([0, 0, 0]);
const PLACEHOLDER_FILL: Rgb<u8> = Rgb([150, 150, 150]);
const PLACEHOLDER_BORDER: Rgb<u8> = Rgb([100, 100, 100]);

/// One cell's worth of input. `thumbnail` is `None` when the photo could not
/// be fetched or decoded; the cell then gets a placeholder.
pub struct GridItem {
    pub photo_id: PhotoId,
    pub thumbnail: Option<RgbImage>,
}

impl GridItem {
    pub fn new(photo_id: PhotoId, thumbnail: Option<RgbImage>) -> Self {
        Self {
            photo_id,
            thumbnail,
        }
    }
}

/// Row/column shape of a grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridLayout {
    pub rows: usize,
    pub cols: usize,
    pub thumbnail_size: u32,
}

impl GridLayout {
    /// `cols = min(grid_size, count)`, rows computed to fit.
    pub fn for_count(
        count: usize,
        grid_size: usize,
        thumbnail_size: u32,
    ) -> Result<Self, ComposeError> {
        if grid_size == 0 || grid_size > MAX_ROWS {
            return Err(ComposeError::InvalidGridSize(grid_size));
        }
        if count == 0 {
            return Err(ComposeError::Empty);
        }
        if count > grid_size * grid_size {
            return Err(ComposeError::TooManyItems { count, grid_size });
        }

        let cols = grid_size.min(count);
        let rows = count.div_ceil(cols);
        Ok(Self {
            rows,
            cols,
            thumbnail_size,
        })
    }

    /// Valid coordinate space as shown to the models, e.g. `A1-T20`.
    pub fn coord_range(&self) -> String {
        format!("A1-{}{}", row_letter(self.rows - 1), self.cols)
    }
}

/// Pixel geometry derived from a layout.
#[derive(Debug, Clone, Copy)]
struct Metrics {
    scale: u32,
    gap: u32,
    header_height: u32,
    row_label_width: u32,
    caption_height: u32,
    cell_width: u32,
    cell_height: u32,
    width: u32,
    height: u32,
}

impl Metrics {
    fn new(layout: &GridLayout) -> Self {
        let size = layout.thumbnail_size;
        let scale = (size / 64).clamp(1, 4);
        let gap = (size / 32).max(2);
        let caption_height = text_height(scale) + 2 * scale;
        let header_height = text_height(scale) + 2 * gap;
        let row_label_width = text_width("T", scale) + 2 * gap;
        let cell_width = size + gap;
        let cell_height = size + caption_height + gap;

        Self {
            scale,
            gap,
            header_height,
            row_label_width,
            caption_height,
            cell_width,
            cell_height,
            width: row_label_width + layout.cols as u32 * cell_width + gap,
            height: header_height + layout.rows as u32 * cell_height + gap,
        }
    }

    fn cell_origin(&self, coord: &Coordinate) -> (u32, u32) {
        let x = self.row_label_width + (coord.col() as u32 - 1) * self.cell_width;
        let y = self.header_height + coord.row() as u32 * self.cell_height;
        (x, y)
    }
}

/// A composed grid: the encoded image plus its coordinate-to-photo map.
/// Lives for one model round-trip.
#[derive(Debug, Clone)]
pub struct ComposedGrid {
    layout: GridLayout,
    image: Vec<u8>,
    cells: Vec<(Coordinate, PhotoId)>,
    index: HashMap<Coordinate, usize>,
    placeholders: usize,
}

impl ComposedGrid {
    pub fn layout(&self) -> &GridLayout {
        &self.layout
    }

    /// JPEG-encoded grid image.
    pub fn image_bytes(&self) -> &[u8] {
        &self.image
    }

    /// Cells in layout order.
    pub fn cells(&self) -> &[(Coordinate, PhotoId)] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn coord_range(&self) -> String {
        self.layout.coord_range()
    }

    pub fn contains(&self, coord: &Coordinate) -> bool {
        self.index.contains_key(coord)
    }

    pub fn photo_at(&self, coord: &Coordinate) -> Option<&PhotoId> {
        self.index.get(coord).map(|&i| &self.cells[i].1)
    }

    /// Number of cells rendered as placeholders.
    pub fn placeholders(&self) -> usize {
        self.placeholders
    }
}

/// Builds labeled composite images from batches of thumbnails.
#[derive(Debug, Clone)]
pub struct GridComposer {
    thumbnail_size: u32,
    jpeg_quality: u8,
}

impl GridComposer {
    pub fn new(thumbnail_size: u32, jpeg_quality: u8) -> Self {
        Self {
            thumbnail_size,
            jpeg_quality: jpeg_quality.clamp(1, 100),
        }
    }

    pub fn thumbnail_size(&self) -> u32 {
        self.thumbnail_size
    }

    /// Lays `items` out row-major, renders them and encodes the result.
    /// Item order alone determines coordinate assignment.
    pub fn compose(
        &self,
        items: Vec<GridItem>,
        grid_size: usize,
    ) -> Result<ComposedGrid, ComposeError> {
        let layout = GridLayout::for_count(items.len(), grid_size, self.thumbnail_size)?;
        let canvas = self.render(&layout, &items);

        let mut image = Vec::new();
        JpegEncoder::new_with_quality(&mut image, self.jpeg_quality).encode_image(&canvas)?;

        let placeholders = items.iter().filter(|i| i.thumbnail.is_none()).count();
        let mut cells = Vec::with_capacity(items.len());
        let mut index = HashMap::with_capacity(items.len());
        for (i, item) in items.into_iter().enumerate() {
            // for_count guarantees every index maps to a valid coordinate
            if let Some(coord) = Coordinate::from_index(i, layout.cols) {
                index.insert(coord, cells.len());
                cells.push((coord, item.photo_id));
            }
        }

        debug!(
            rows = layout.rows,
            cols = layout.cols,
            placeholders,
            bytes = image.len(),
            "Composed grid {}",
            layout.coord_range()
        );

        Ok(ComposedGrid {
            layout,
            image,
            cells,
            index,
            placeholders,
        })
    }

    /// Renders the raster without encoding it.
    pub(crate) fn render(&self, layout: &GridLayout, items: &[GridItem]) -> RgbImage {
        let m = Metrics::new(layout);
        let size = layout.thumbnail_size;
        let mut canvas = RgbImage::from_pixel(m.width, m.height, BACKGROUND);

        for col in 1..=layout.cols {
            let x = m.row_label_width + (col as u32 - 1) * m.cell_width + size / 2;
            draw_text_centered(&mut canvas, x, m.gap, &col.to_string(), m.scale, LABEL);
        }
        for row in 0..layout.rows {
            let y = m.header_height + row as u32 * m.cell_height + size / 2;
            let y = y.saturating_sub(text_height(m.scale) / 2);
            let label = row_letter(row).to_string();
            draw_text_centered(&mut canvas, m.row_label_width / 2, y, &label, m.scale, LABEL);
        }

        for (i, item) in items.iter().enumerate() {
            let Some(coord) = Coordinate::from_index(i, layout.cols) else {
                continue;
            };
            let (x, y) = m.cell_origin(&coord);

            match &item.thumbnail {
                Some(thumb) if thumb.dimensions() == (size, size) => {
                    imageops::replace(&mut canvas, thumb, x as i64, y as i64);
                }
                Some(thumb) => {
                    let resized = imageops::resize(thumb, size, size, FilterType::Triangle);
                    imageops::replace(&mut canvas, &resized, x as i64, y as i64);
                }
                None => draw_placeholder(&mut canvas, x, y, size),
            }

            let caption_y = y + size + (m.caption_height - text_height(m.scale)) / 2;
            draw_text_centered(
                &mut canvas,
                x + size / 2,
                caption_y,
                &coord.to_string(),
                m.scale,
                LABEL,
            );
        }

        canvas
    }
}

fn draw_placeholder(canvas: &mut RgbImage, x: u32, y: u32, size: u32) {
    let border = (size / 32).max(1);
    for dy in 0..size {
        for dx in 0..size {
            let edge = dx < border || dy < border || dx >= size - border || dy >= size - border;
            let color = if edge {
                PLACEHOLDER_BORDER
            } else {
                PLACEHOLDER_FILL
            };
            if x + dx < canvas.width() && y + dy < canvas.height() {
                canvas.put_pixel(x + dx, y + dy, color);
            }
        }
    }
}
