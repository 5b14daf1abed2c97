//! Coordinate extraction from free-text model replies.
//!
//! Model output is untrusted: everything parsed here must still be checked
//! against the grid it answers before it can select a photo.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::grid::{ComposedGrid, Coordinate};

static RE_COORDINATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b([A-T])(\d{1,2})\b").unwrap());

/// Every coordinate-shaped token in `text`, normalized, in first-seen order
/// and without duplicates.
pub fn extract_coordinates(text: &str) -> Vec<Coordinate> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();

    for caps in RE_COORDINATE.captures_iter(text) {
        let token = format!("{}{}", &caps[1], &caps[2]);
        // A0 and friends match the pattern but are not addresses
        let Ok(coord) = token.parse::<Coordinate>() else {
            continue;
        };
        if seen.insert(coord) {
            out.push(coord);
        }
    }
    out
}

/// Keeps only coordinates that exist in `grid`.
pub fn validate_coordinates(coords: &[Coordinate], grid: &ComposedGrid) -> BTreeSet<Coordinate> {
    coords.iter().filter(|c| grid.contains(c)).copied().collect()
}
