use chess_corners::{ChessConfig, CornerDescriptor};
use stereo_calib_core::Corner;

/// ChESS settings used for coarse checkerboard corners.
pub fn default_chess_config() -> ChessConfig {
    let mut cfg = ChessConfig::single_scale();
    cfg.params.threshold_rel = 0.2;
    cfg.params.nms_radius = 2;
    cfg
}

/// Convert a ChESS descriptor found in a crop whose origin is `(dx, dy)`.
pub fn adapt_chess_corner(c: &CornerDescriptor, dx: f32, dy: f32) -> Corner {
    let mut corner = Corner::new(c.x + dx, c.y + dy, c.response);
    corner.orientation = c.orientation;
    corner
}
