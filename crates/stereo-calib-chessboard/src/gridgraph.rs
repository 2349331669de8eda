use crate::params::GridGraphParams;
use kiddo::{KdTree, SquaredEuclidean};
use nalgebra::Vector2;
use std::collections::{HashMap, VecDeque};
use stereo_calib_core::Corner;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NeighborDirection {
    Right,
    Left,
    Up,
    Down,
}

impl NeighborDirection {
    fn slot(self) -> usize {
        match self {
            NeighborDirection::Right => 0,
            NeighborDirection::Left => 1,
            NeighborDirection::Up => 2,
            NeighborDirection::Down => 3,
        }
    }

    fn opposite(self) -> Self {
        match self {
            NeighborDirection::Right => NeighborDirection::Left,
            NeighborDirection::Left => NeighborDirection::Right,
            NeighborDirection::Up => NeighborDirection::Down,
            NeighborDirection::Down => NeighborDirection::Up,
        }
    }

    /// Integer grid step `(di, dj)` along this direction.
    fn step(self) -> (i32, i32) {
        match self {
            NeighborDirection::Right => (1, 0),
            NeighborDirection::Left => (-1, 0),
            NeighborDirection::Up => (0, -1),
            NeighborDirection::Down => (0, 1),
        }
    }
}

#[derive(Clone, Debug)]
pub struct NodeNeighbor {
    pub direction: NeighborDirection,
    pub index: usize,
    pub distance: f32,
}

/// Classify the edge `corner -> neighbor` against the lattice axes `(u, v)`.
///
/// `+u` is `Right` and `+v` is `Down`; edges further than the tolerance from
/// both axes, or outside the spacing window, are rejected.
fn classify_edge(
    corner: &Corner,
    neighbor: &Corner,
    neighbor_index: usize,
    params: &GridGraphParams,
    axes: &[Vector2<f32>; 2],
) -> Option<NodeNeighbor> {
    let vec_to_neighbor = neighbor.position - corner.position;
    let distance = vec_to_neighbor.norm();
    if distance < params.min_spacing_pix || distance > params.max_spacing_pix {
        return None;
    }

    let e = vec_to_neighbor / distance;
    let min_cos = params.axis_tolerance_deg.to_radians().cos();
    let cu = e.dot(&axes[0]);
    let cv = e.dot(&axes[1]);

    let direction = if cu.abs() >= min_cos {
        if cu > 0.0 {
            NeighborDirection::Right
        } else {
            NeighborDirection::Left
        }
    } else if cv.abs() >= min_cos {
        if cv > 0.0 {
            NeighborDirection::Down
        } else {
            NeighborDirection::Up
        }
    } else {
        return None;
    };

    Some(NodeNeighbor {
        direction,
        index: neighbor_index,
        distance,
    })
}

/// Keep at most one neighbor per direction, choosing the closest candidate.
fn select_neighbors(candidates: Vec<NodeNeighbor>) -> [Option<NodeNeighbor>; 4] {
    let mut best: [Option<NodeNeighbor>; 4] = [None, None, None, None];

    for candidate in candidates {
        let slot = &mut best[candidate.direction.slot()];
        let replace = match slot {
            None => true,
            Some(current) => candidate.distance < current.distance,
        };
        if replace {
            *slot = Some(candidate);
        }
    }

    best
}

/// 4-connected graph over corners; edges are kept only when both endpoints
/// select each other in opposite directions.
pub struct GridGraph {
    pub neighbors: Vec<Vec<NodeNeighbor>>,
}

impl GridGraph {
    pub fn new(corners: &[Corner], params: &GridGraphParams, axes: &[Vector2<f32>; 2]) -> Self {
        let coords = corners
            .iter()
            .map(|c| [c.position.x, c.position.y])
            .collect::<Vec<_>>();
        let tree: KdTree<f32, 2> = (&coords).into();
        Self::with_tree(corners, &coords, &tree, params, axes)
    }

    pub(crate) fn with_tree(
        corners: &[Corner],
        coords: &[[f32; 2]],
        tree: &KdTree<f32, 2>,
        params: &GridGraphParams,
        axes: &[Vector2<f32>; 2],
    ) -> Self {
        let selected: Vec<[Option<NodeNeighbor>; 4]> = corners
            .iter()
            .enumerate()
            .map(|(i, corner)| {
                let candidates = tree
                    .nearest_n::<SquaredEuclidean>(&coords[i], params.k_neighbors + 1)
                    .into_iter()
                    .map(|nn| nn.item as usize)
                    .filter(|&j| j != i)
                    .filter_map(|j| classify_edge(corner, &corners[j], j, params, axes))
                    .collect();
                select_neighbors(candidates)
            })
            .collect();

        let neighbors = selected
            .iter()
            .enumerate()
            .map(|(i, slots)| {
                slots
                    .iter()
                    .flatten()
                    .filter(|n| {
                        selected[n.index][n.direction.opposite().slot()]
                            .as_ref()
                            .is_some_and(|back| back.index == i)
                    })
                    .cloned()
                    .collect()
            })
            .collect();

        Self { neighbors }
    }

    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }
}

pub fn connected_components(graph: &GridGraph) -> Vec<Vec<usize>> {
    let mut visited = vec![false; graph.neighbors.len()];
    let mut components = Vec::new();

    for start in 0..graph.neighbors.len() {
        if visited[start] {
            continue;
        }

        let mut component = Vec::new();
        let mut stack = vec![start];

        while let Some(node) = stack.pop() {
            if visited[node] {
                continue;
            }
            visited[node] = true;
            component.push(node);

            for neighbor in &graph.neighbors[node] {
                if !visited[neighbor.index] {
                    stack.push(neighbor.index);
                }
            }
        }

        components.push(component);
    }

    components
}

/// BFS integer coordinates for a component, keyed by grid cell.
///
/// When two corners land on the same cell the first one reached wins and the
/// other is dropped.
pub fn assign_grid_coordinates(graph: &GridGraph, component: &[usize]) -> HashMap<(i32, i32), usize> {
    let mut cells = HashMap::with_capacity(component.len());
    let Some(&start) = component.first() else {
        return cells;
    };

    let mut visited = vec![false; graph.neighbors.len()];
    let mut queue = VecDeque::new();
    queue.push_back((start, 0, 0));

    while let Some((node, i, j)) = queue.pop_front() {
        if visited[node] || cells.contains_key(&(i, j)) {
            continue;
        }
        visited[node] = true;
        cells.insert((i, j), node);

        for neighbor in &graph.neighbors[node] {
            let (di, dj) = neighbor.direction.step();
            queue.push_back((neighbor.index, i + di, j + dj));
        }
    }

    cells
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lattice(cols: usize, rows: usize, spacing: f32) -> Vec<Corner> {
        let mut corners = Vec::new();
        for j in 0..rows {
            for i in 0..cols {
                corners.push(Corner::new(i as f32 * spacing, j as f32 * spacing, 1.0));
            }
        }
        corners
    }

    fn image_axes() -> [Vector2<f32>; 2] {
        [Vector2::new(1.0, 0.0), Vector2::new(0.0, 1.0)]
    }

    fn directions(neighbors: &[NodeNeighbor]) -> HashMap<NeighborDirection, usize> {
        neighbors.iter().map(|n| (n.direction, n.index)).collect()
    }

    #[test]
    fn finds_axis_neighbors_in_regular_grid() {
        let corners = lattice(3, 3, 10.0);
        let graph = GridGraph::new(&corners, &GridGraphParams::default(), &image_axes());
        let idx = |i: usize, j: usize| j * 3 + i;

        let center = directions(&graph.neighbors[idx(1, 1)]);
        assert_eq!(center.len(), 4);
        assert_eq!(center[&NeighborDirection::Left], idx(0, 1));
        assert_eq!(center[&NeighborDirection::Right], idx(2, 1));
        assert_eq!(center[&NeighborDirection::Up], idx(1, 0));
        assert_eq!(center[&NeighborDirection::Down], idx(1, 2));

        let corner = directions(&graph.neighbors[idx(0, 0)]);
        assert_eq!(corner.len(), 2);
        assert!(corner.contains_key(&NeighborDirection::Right));
        assert!(corner.contains_key(&NeighborDirection::Down));
    }

    #[test]
    fn rejects_diagonals_and_out_of_window_spacing() {
        let corners = vec![Corner::new(0.0, 0.0, 1.0), Corner::new(10.0, 10.0, 1.0)];
        let graph = GridGraph::new(&corners, &GridGraphParams::default(), &image_axes());
        assert!(graph.neighbors.iter().all(Vec::is_empty));

        let params = GridGraphParams {
            max_spacing_pix: 15.0,
            ..Default::default()
        };
        let far = vec![Corner::new(0.0, 0.0, 1.0), Corner::new(30.0, 0.0, 1.0)];
        let graph = GridGraph::new(&far, &params, &image_axes());
        assert!(graph.neighbors.iter().all(Vec::is_empty));
    }

    #[test]
    fn one_sided_edges_are_dropped() {
        // 1 picks 0 as its left neighbour, but 0 prefers the closer 2 on its right.
        let corners = vec![
            Corner::new(0.0, 0.0, 1.0),
            Corner::new(10.0, 0.0, 1.0),
            Corner::new(7.0, 0.5, 1.0),
        ];
        let graph = GridGraph::new(&corners, &GridGraphParams::default(), &image_axes());
        assert_eq!(
            directions(&graph.neighbors[0]).get(&NeighborDirection::Right),
            Some(&2)
        );
        assert!(graph.neighbors[1].is_empty());
    }

    #[test]
    fn bfs_assigns_consistent_coordinates() {
        let corners = lattice(4, 3, 12.0);
        let graph = GridGraph::new(&corners, &GridGraphParams::default(), &image_axes());
        let components = connected_components(&graph);
        assert_eq!(components.len(), 1);

        let cells = assign_grid_coordinates(&graph, &components[0]);
        assert_eq!(cells.len(), 12);
        let origin = components[0][0];
        let (oi, oj) = (origin % 4, origin / 4);
        for (&(i, j), &node) in &cells {
            assert_eq!(node % 4, (oi as i32 + i) as usize);
            assert_eq!(node / 4, (oj as i32 + j) as usize);
        }
    }
}
