//! Checkerboard geometry shared by the detector and the solvers.
//!
//! [`object_grid`] is the only place that generates board points; detector
//! output ordering and every correspondence are defined relative to it.

use crate::{CalibError, CalibResult};
use nalgebra::Point3;
use serde::{Deserialize, Serialize};

/// Interior-corner layout and physical square size of a checkerboard.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPattern", into = "RawPattern")]
pub struct ChessboardPattern {
    cols: u32,
    rows: u32,
    square_size: f64,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
struct RawPattern {
    cols: u32,
    rows: u32,
    square_size: f64,
}

impl TryFrom<RawPattern> for ChessboardPattern {
    type Error = CalibError;

    fn try_from(raw: RawPattern) -> Result<Self, Self::Error> {
        ChessboardPattern::new(raw.cols, raw.rows, raw.square_size)
    }
}

impl From<ChessboardPattern> for RawPattern {
    fn from(p: ChessboardPattern) -> Self {
        RawPattern {
            cols: p.cols,
            rows: p.rows,
            square_size: p.square_size,
        }
    }
}

impl ChessboardPattern {
    /// `cols` and `rows` count *interior* corners.
    pub fn new(cols: u32, rows: u32, square_size: f64) -> CalibResult<Self> {
        if cols == 0 || rows == 0 {
            return Err(CalibError::InvalidPattern(format!(
                "grid must have at least one corner (cols={cols}, rows={rows})"
            )));
        }
        if !square_size.is_finite() || square_size <= 0.0 {
            return Err(CalibError::InvalidPattern(format!(
                "square size must be positive (got {square_size})"
            )));
        }
        Ok(Self {
            cols,
            rows,
            square_size,
        })
    }

    #[inline]
    pub fn cols(&self) -> u32 {
        self.cols
    }

    #[inline]
    pub fn rows(&self) -> u32 {
        self.rows
    }

    #[inline]
    pub fn square_size(&self) -> f64 {
        self.square_size
    }

    /// Number of interior corners (`cols * rows`).
    #[inline]
    pub fn corner_count(&self) -> usize {
        self.cols as usize * self.rows as usize
    }

    /// Row-major index of corner `(col, row)`.
    #[inline]
    pub fn index(&self, col: u32, row: u32) -> usize {
        row as usize * self.cols as usize + col as usize
    }
}

impl Default for ChessboardPattern {
    fn default() -> Self {
        Self {
            cols: 9,
            rows: 6,
            square_size: 25.0,
        }
    }
}

/// Board points on the `z = 0` plane in row-major order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectPointGrid {
    pattern: ChessboardPattern,
    points: Vec<Point3<f64>>,
}

impl ObjectPointGrid {
    pub fn pattern(&self) -> &ChessboardPattern {
        &self.pattern
    }

    pub fn points(&self) -> &[Point3<f64>] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Generate the canonical object-point grid of `pattern`.
///
/// Point `k = row * cols + col` is `(col * s, row * s, 0)`: the column index
/// varies fastest.
pub fn object_grid(pattern: &ChessboardPattern) -> ObjectPointGrid {
    let s = pattern.square_size;
    let mut points = Vec::with_capacity(pattern.corner_count());
    for row in 0..pattern.rows {
        for col in 0..pattern.cols {
            points.push(Point3::new(col as f64 * s, row as f64 * s, 0.0));
        }
    }
    ObjectPointGrid {
        pattern: *pattern,
        points,
    }
}
