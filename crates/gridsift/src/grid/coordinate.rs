//! Row-letter + column-number addresses (`"C7"`) for cells of a grid.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Maximum number of rows a grid can address (`A`..`T`).
pub const MAX_ROWS: usize = 20;

/// Maximum column number accepted when parsing.
pub const MAX_COLUMN: u16 = 99;

const ROW_LETTERS: &[u8; MAX_ROWS] = b"ABCDEFGHIJKLMNOPQRST";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoordinateError {
    #[error("Coordinate is empty")]
    Empty,

    #[error("Invalid row letter '{0}' (expected A-T)")]
    InvalidRow(char),

    #[error("Invalid column '{0}' (expected 1-99)")]
    InvalidColumn(String),
}

/// A cell address. Ordering is row-major, which matches the order photos
/// were laid out in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Coordinate {
    row: u8,
    col: u16,
}

impl Coordinate {
    /// Builds a coordinate from a 0-based row index and a 1-based column.
    pub fn new(row: usize, col: u16) -> Option<Self> {
        if row >= MAX_ROWS || col == 0 || col > MAX_COLUMN {
            return None;
        }
        Some(Self { row: row as u8, col })
    }

    /// Coordinate of the `index`-th item (0-based) in a grid with `cols` columns.
    pub fn from_index(index: usize, cols: usize) -> Option<Self> {
        if cols == 0 {
            return None;
        }
        Self::new(index / cols, (index % cols + 1) as u16)
    }

    /// 0-based row index.
    pub fn row(&self) -> usize {
        self.row as usize
    }

    /// 1-based column number.
    pub fn col(&self) -> u16 {
        self.col
    }

    pub fn row_letter(&self) -> char {
        row_letter(self.row as usize)
    }
}

/// Letter for a 0-based row index. Callers stay within `MAX_ROWS`.
pub fn row_letter(row: usize) -> char {
    ROW_LETTERS[row.min(MAX_ROWS - 1)] as char
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.row_letter(), self.col)
    }
}

impl FromStr for Coordinate {
    type Err = CoordinateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let mut chars = s.chars();
        let letter = chars.next().ok_or(CoordinateError::Empty)?;
        let upper = letter.to_ascii_uppercase();

        let row = ROW_LETTERS
            .iter()
            .position(|&b| b as char == upper)
            .ok_or(CoordinateError::InvalidRow(letter))?;

        let digits = chars.as_str();
        if digits.is_empty() || digits.len() > 2 || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CoordinateError::InvalidColumn(digits.to_string()));
        }
        let col: u16 = digits
            .parse()
            .map_err(|_| CoordinateError::InvalidColumn(digits.to_string()))?;

        Self::new(row, col).ok_or_else(|| CoordinateError::InvalidColumn(digits.to_string()))
    }
}
