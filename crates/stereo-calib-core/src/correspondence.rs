use crate::{CalibError, CalibResult, ObjectPointGrid};
use nalgebra::{Point2, Point3};

/// Board points paired with their detected image positions, index by index.
///
/// Immutable once built; both sides always have the same length.
#[derive(Clone, Debug, PartialEq)]
pub struct Correspondence {
    object_points: Vec<Point3<f64>>,
    image_points: Vec<Point2<f64>>,
}

impl Correspondence {
    /// Pair a canonical grid with detected corners in the same order.
    pub fn new(grid: &ObjectPointGrid, image_points: Vec<Point2<f64>>) -> CalibResult<Self> {
        Self::from_parts(grid.points().to_vec(), image_points)
    }

    pub fn from_parts(
        object_points: Vec<Point3<f64>>,
        image_points: Vec<Point2<f64>>,
    ) -> CalibResult<Self> {
        if object_points.len() != image_points.len() {
            return Err(CalibError::InputMismatch(format!(
                "{} object points vs {} image points",
                object_points.len(),
                image_points.len()
            )));
        }
        Ok(Self {
            object_points,
            image_points,
        })
    }

    pub fn object_points(&self) -> &[Point3<f64>] {
        &self.object_points
    }

    pub fn image_points(&self) -> &[Point2<f64>] {
        &self.image_points
    }

    pub fn len(&self) -> usize {
        self.image_points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.image_points.is_empty()
    }

    /// True if all coordinates are finite.
    pub fn is_finite(&self) -> bool {
        self.object_points
            .iter()
            .all(|p| p.x.is_finite() && p.y.is_finite() && p.z.is_finite())
            && self
                .image_points
                .iter()
                .all(|p| p.x.is_finite() && p.y.is_finite())
    }

    /// Iterate `(object, image)` pairs.
    pub fn pairs(&self) -> impl Iterator<Item = (&Point3<f64>, &Point2<f64>)> {
        self.object_points.iter().zip(self.image_points.iter())
    }
}
