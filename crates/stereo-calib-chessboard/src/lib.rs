//! Checkerboard inner-corner detector built on top of `stereo-calib-core`.
//!
//! Algorithm:
//! 1. ChESS corners inside the image's search window (ROI or full frame).
//! 2. Two lattice axes from nearest-neighbour directions (4θ averaging).
//! 3. Mutual 4-neighbour graph along those axes (kd-tree queries).
//! 4. BFS integer coordinates per connected component.
//! 5. The fully populated `cols x rows` block with the strongest response.
//! 6. Dihedral relabelling so columns run along image +x and rows along +y,
//!    matching `object_grid` order.
//! 7. Gradient-orthogonality sub-pixel refinement.

mod chess;
mod detector;
mod geom;
mod gridgraph;
mod params;
mod subpix;

pub use chess::{adapt_chess_corner, default_chess_config};
pub use detector::{ChessboardDetection, ChessboardDetector};
pub use geom::estimate_lattice_axes;
pub use gridgraph::{GridGraph, NeighborDirection, NodeNeighbor};
pub use params::{ChessboardParams, GridGraphParams, SubpixParams};
pub use subpix::{refine_corner, refine_corners};
