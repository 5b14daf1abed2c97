//! Grid composition: many thumbnails laid out on one labeled image so a
//! vision model can compare them side by side and answer with coordinates.

pub mod composer;
pub mod coordinate;
pub mod font;

pub use composer::{ComposedGrid, GridComposer, GridItem, GridLayout};
pub use coordinate::{row_letter, Coordinate, CoordinateError, MAX_COLUMN, MAX_ROWS};
