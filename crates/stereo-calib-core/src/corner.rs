use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Canonical 2D corner candidate consumed by the chessboard detector.
///
/// This is what you obtain by adapting the output of a ChESS corner detector.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Corner {
    /// Corner position in pixel coordinates.
    pub position: Point2<f32>,

    /// Dominant orientation at the corner in radians, defined modulo π.
    pub orientation: f32,

    /// Strength / response of the corner detector.
    pub strength: f32,
}

impl Corner {
    pub fn new(x: f32, y: f32, strength: f32) -> Self {
        Self {
            position: Point2::new(x, y),
            orientation: 0.0,
            strength,
        }
    }
}
