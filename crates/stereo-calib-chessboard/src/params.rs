use serde::{Deserialize, Serialize};
use stereo_calib_core::TermCriteria;

/// Neighbour search used to assemble ChESS corners into a lattice.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GridGraphParams {
    pub min_spacing_pix: f32,
    pub max_spacing_pix: f32,
    /// Nearest neighbours inspected per corner.
    pub k_neighbors: usize,
    /// Maximum angle between a grid edge and the closest lattice axis.
    pub axis_tolerance_deg: f32,
}

impl Default for GridGraphParams {
    fn default() -> Self {
        Self {
            min_spacing_pix: 4.0,
            max_spacing_pix: 400.0,
            k_neighbors: 8,
            axis_tolerance_deg: 25.0,
        }
    }
}

/// Gradient-orthogonality corner refinement.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SubpixParams {
    pub enabled: bool,
    /// Half the side of the search window; 5 gives an 11x11 window.
    pub half_window: u32,
    pub criteria: TermCriteria,
}

impl Default for SubpixParams {
    fn default() -> Self {
        Self {
            enabled: true,
            half_window: 5,
            criteria: TermCriteria::default(),
        }
    }
}

/// Parameters specific to the chessboard detector.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ChessboardParams {
    /// Minimal ChESS response to consider.
    pub min_strength: f32,
    pub graph: GridGraphParams,
    pub subpix: SubpixParams,
}
