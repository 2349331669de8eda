use crate::chess::{adapt_chess_corner, default_chess_config};
use crate::geom::estimate_lattice_axes;
use crate::gridgraph::{assign_grid_coordinates, connected_components, GridGraph};
use crate::params::ChessboardParams;
use crate::subpix::refine_corners;
use chess_corners::{find_chess_corners_image, ChessConfig};
use kiddo::KdTree;
use log::debug;
use nalgebra::{Point2, Vector2};
use std::collections::HashMap;
use stereo_calib_core::{
    CalibError, CalibResult, CalibrationImage, ChessboardPattern, Corner, Correspondence,
    ObjectPointGrid, GRID_TRANSFORMS_D4,
};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Inner corners of one checkerboard, in `object_grid` order.
#[derive(Clone, Debug, PartialEq)]
pub struct ChessboardDetection {
    pub found: bool,
    /// `cols * rows` points when `found`, empty otherwise.
    pub corners: Vec<Point2<f64>>,
}

impl ChessboardDetection {
    pub fn not_found() -> Self {
        Self {
            found: false,
            corners: Vec::new(),
        }
    }

    /// Pair the detected corners with the board model.
    ///
    /// A missing board becomes [`CalibError::DetectionFailure`] for `image`.
    pub fn to_correspondence(&self, grid: &ObjectPointGrid, image: &str) -> CalibResult<Correspondence> {
        if !self.found {
            return Err(CalibError::DetectionFailure {
                image: image.to_string(),
            });
        }
        Correspondence::new(grid, self.corners.clone())
    }
}

/// A fully populated `w x h` block of lattice nodes, `a` varying fastest.
struct LatticeWindow {
    w: u32,
    h: u32,
    nodes: Vec<usize>,
}

impl LatticeWindow {
    fn node(&self, a: u32, b: u32) -> usize {
        self.nodes[(b * self.w + a) as usize]
    }
}

/// Checkerboard detector: ChESS corners, lattice assembly, canonical ordering
/// and sub-pixel refinement.
pub struct ChessboardDetector {
    pub params: ChessboardParams,
    chess: ChessConfig,
}

impl Default for ChessboardDetector {
    fn default() -> Self {
        Self::new(ChessboardParams::default())
    }
}

impl ChessboardDetector {
    pub fn new(params: ChessboardParams) -> Self {
        Self {
            params,
            chess: default_chess_config(),
        }
    }

    /// Replace the ChESS settings used for coarse corners.
    pub fn with_chess_config(mut self, chess: ChessConfig) -> Self {
        self.chess = chess;
        self
    }

    /// Find the `pattern` inner corners in `image`, restricted to its ROI.
    ///
    /// A board that is absent, partially visible or ambiguous yields
    /// `found = false`; this is not an error.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(self, image, pattern), fields(image = %image.name))
    )]
    pub fn detect(&self, image: &CalibrationImage, pattern: &ChessboardPattern) -> ChessboardDetection {
        let Some(window) = image.search_window() else {
            debug!("{}: search window is empty", image.name);
            return ChessboardDetection::not_found();
        };

        let crop = image.image.crop(&window);
        let Some(buf) = ::image::GrayImage::from_raw(crop.width as u32, crop.height as u32, crop.data)
        else {
            return ChessboardDetection::not_found();
        };

        let corners: Vec<Corner> = find_chess_corners_image(&buf, &self.chess)
            .iter()
            .map(|c| adapt_chess_corner(c, window.x as f32, window.y as f32))
            .collect();
        debug!("{}: {} raw ChESS corners", image.name, corners.len());

        let mut detection = self.detect_from_corners(&corners, pattern);
        if detection.found && self.params.subpix.enabled {
            refine_corners(&image.image.view(), &mut detection.corners, &self.params.subpix);
        }
        detection
    }

    /// Assemble and order pre-computed corners (no refinement).
    pub fn detect_from_corners(
        &self,
        corners: &[Corner],
        pattern: &ChessboardPattern,
    ) -> ChessboardDetection {
        let strong: Vec<Corner> = corners
            .iter()
            .filter(|c| c.strength >= self.params.min_strength)
            .cloned()
            .collect();

        if strong.len() < pattern.corner_count() {
            debug!(
                "{} corners after strength filter, need {}",
                strong.len(),
                pattern.corner_count()
            );
            return ChessboardDetection::not_found();
        }

        let Some(ordered) = self.ordered_grid(&strong, pattern) else {
            return ChessboardDetection::not_found();
        };

        ChessboardDetection {
            found: true,
            corners: ordered
                .into_iter()
                .map(|i| {
                    let p = strong[i].position;
                    Point2::new(p.x as f64, p.y as f64)
                })
                .collect(),
        }
    }

    /// Indices into `corners` in row-major board order.
    fn ordered_grid(&self, corners: &[Corner], pattern: &ChessboardPattern) -> Option<Vec<usize>> {
        let coords: Vec<[f32; 2]> = corners
            .iter()
            .map(|c| [c.position.x, c.position.y])
            .collect();
        let tree: KdTree<f32, 2> = (&coords).into();

        let axes = estimate_lattice_axes(&coords, &tree)?;
        let graph = GridGraph::with_tree(corners, &coords, &tree, &self.params.graph, &axes);

        let mut best: Option<(f32, LatticeWindow)> = None;
        for component in connected_components(&graph) {
            if component.len() < pattern.corner_count() {
                continue;
            }
            let cells = assign_grid_coordinates(&graph, &component);
            if let Some((score, window)) = strongest_window(&cells, corners, pattern) {
                if best.as_ref().is_none_or(|(s, _)| score > *s) {
                    best = Some((score, window));
                }
            }
        }

        let Some((_, window)) = best else {
            debug!(
                "no complete {}x{} window in the corner lattice",
                pattern.cols(),
                pattern.rows()
            );
            return None;
        };
        canonical_order(&window, corners, pattern)
    }
}

/// Search every fully populated `cols x rows` (or `rows x cols`) block of
/// `cells` and return the one with the largest summed corner strength.
fn strongest_window(
    cells: &HashMap<(i32, i32), usize>,
    corners: &[Corner],
    pattern: &ChessboardPattern,
) -> Option<(f32, LatticeWindow)> {
    let (min_i, max_i) = cells.keys().map(|k| k.0).fold((i32::MAX, i32::MIN), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    let (min_j, max_j) = cells.keys().map(|k| k.1).fold((i32::MAX, i32::MIN), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });

    let mut extents = vec![(pattern.cols(), pattern.rows())];
    if pattern.cols() != pattern.rows() {
        extents.push((pattern.rows(), pattern.cols()));
    }

    let mut best: Option<(f32, LatticeWindow)> = None;
    for (w, h) in extents {
        let (wi, hi) = (w as i32, h as i32);
        for j0 in min_j..=(max_j - hi + 1) {
            for i0 in min_i..=(max_i - wi + 1) {
                let mut nodes = Vec::with_capacity((w * h) as usize);
                let mut score = 0.0f32;
                let complete = (0..hi).all(|b| {
                    (0..wi).all(|a| match cells.get(&(i0 + a, j0 + b)) {
                        Some(&n) => {
                            nodes.push(n);
                            score += corners[n].strength;
                            true
                        }
                        None => false,
                    })
                });
                if complete && best.as_ref().is_none_or(|(s, _)| score > *s) {
                    best = Some((score, LatticeWindow { w, h, nodes }));
                }
            }
        }
    }
    best
}

/// Pick the dihedral relabelling whose column axis points most along image
/// +x and whose row axis points most along image +y, and return the window
/// nodes in that row-major order.
fn canonical_order(
    window: &LatticeWindow,
    corners: &[Corner],
    pattern: &ChessboardPattern,
) -> Option<Vec<usize>> {
    let pos = |a: u32, b: u32| corners[window.node(a, b)].position.coords;

    let mut du = Vector2::<f32>::zeros();
    let mut dv = Vector2::<f32>::zeros();
    for b in 0..window.h {
        for a in 0..window.w {
            if a + 1 < window.w {
                du += pos(a + 1, b) - pos(a, b);
            }
            if b + 1 < window.h {
                dv += pos(a, b + 1) - pos(a, b);
            }
        }
    }

    let along = |step: [i32; 2]| -> Vector2<f32> {
        let d = du * step[0] as f32 + dv * step[1] as f32;
        d.try_normalize(1e-9).unwrap_or_else(Vector2::zeros)
    };

    let (cols, rows) = (pattern.cols(), pattern.rows());
    let best = GRID_TRANSFORMS_D4
        .iter()
        .filter(|t| t.mapped_extent(window.w, window.h) == (cols, rows))
        .filter_map(|t| {
            let inv = t.inverse()?;
            let score = along(inv.apply(1, 0)).x + along(inv.apply(0, 1)).y;
            Some((score, *t))
        })
        .max_by(|a, b| a.0.total_cmp(&b.0))?
        .1;

    let (w, h) = (window.w as i32, window.h as i32);
    let mapped_box = [(0, 0), (w - 1, 0), (0, h - 1), (w - 1, h - 1)].map(|(a, b)| best.apply(a, b));
    let min_a = mapped_box.iter().map(|p| p[0]).min()?;
    let min_b = mapped_box.iter().map(|p| p[1]).min()?;

    let mut ordered = vec![0usize; pattern.corner_count()];
    for b in 0..window.h {
        for a in 0..window.w {
            let [ma, mb] = best.apply(a as i32, b as i32);
            let idx = pattern.index((ma - min_a) as u32, (mb - min_b) as u32);
            ordered[idx] = window.node(a, b);
        }
    }
    Some(ordered)
}
