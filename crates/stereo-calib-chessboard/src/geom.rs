use kiddo::{KdTree, SquaredEuclidean};
use nalgebra::Vector2;

/// Estimate the two lattice axes of a grid-like point cloud.
///
/// Nearest-neighbour directions on a square lattice repeat every 90°, so they
/// are averaged in quadruple-angle space. Returns `(u, v)` unit vectors with
/// `v` perpendicular to `u`, or `None` when there is no dominant direction.
pub fn estimate_lattice_axes(
    points: &[[f32; 2]],
    tree: &KdTree<f32, 2>,
) -> Option<[Vector2<f32>; 2]> {
    if points.len() < 2 {
        return None;
    }

    let mut sum = Vector2::<f32>::zeros();
    let mut count = 0usize;
    for (i, p) in points.iter().enumerate() {
        // self + the 4 closest lattice neighbours
        for nn in tree.nearest_n::<SquaredEuclidean>(p, 5) {
            let j = nn.item as usize;
            if j == i || nn.distance <= 0.0 {
                continue;
            }
            let d = Vector2::new(points[j][0] - p[0], points[j][1] - p[1]);
            let four_theta = 4.0 * d.y.atan2(d.x);
            sum += Vector2::new(four_theta.cos(), four_theta.sin());
            count += 1;
        }
    }

    if count == 0 {
        return None;
    }
    let mean = sum / count as f32;
    if mean.norm_squared() < 1e-4 {
        return None;
    }

    let theta = 0.25 * mean.y.atan2(mean.x);
    let u = Vector2::new(theta.cos(), theta.sin());
    let v = Vector2::new(-u.y, u.x);
    Some([u, v])
}
