//! A* corridor search over the polygon adjacency graph.

use std::{
    cmp::Ordering,
    collections::{BinaryHeap, HashMap},
};

use glam::Vec3;
use navmesh::{NavMesh, PolyId};
use tracing::debug;

use crate::QueryError;

/// The iteration budget used when a request does not carry its own.
pub const DEFAULT_MAX_ITERATIONS: u32 = 4096;

/// An ordered chain of adjacent polygons from a start polygon to a goal
/// polygon. Transient; produced by [`find_corridor`] and consumed by the
/// funnel pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Corridor {
    /// The polygons of the corridor, each adjacent to the next.
    pub polygons: Vec<PolyId>,
}

impl Corridor {
    /// The number of polygons in the corridor.
    #[inline]
    pub fn len(&self) -> usize {
        self.polygons.len()
    }

    /// Whether the corridor holds no polygons.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.polygons.is_empty()
    }

    /// The summed centroid-to-centroid edge cost of the corridor.
    pub fn cost(&self, mesh: &NavMesh) -> f32 {
        self.polygons
            .windows(2)
            .map(|pair| {
                mesh.polygon(pair[0])
                    .centroid
                    .distance(mesh.polygon(pair[1]).centroid)
            })
            .sum()
    }
}

/// An open-set entry ordered for a min-heap on `f`, breaking ties by lower
/// `g` and then by insertion order for determinism.
struct OpenEntry {
    f: f32,
    g: f32,
    sequence: u32,
    poly: PolyId,
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap, we pop the smallest f.
        other
            .f
            .total_cmp(&self.f)
            .then_with(|| other.g.total_cmp(&self.g))
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for OpenEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OpenEntry {}

/// Searches the polygon adjacency graph for a least-cost corridor from
/// `start` to `goal`.
///
/// Edge cost is the Euclidean distance between polygon centroids; the
/// heuristic is the straight-line distance from a centroid to `goal_pos`,
/// which never overestimates the remaining corridor cost.
///
/// Fails with [`QueryError::NoPath`] when the open set runs dry, and with
/// [`QueryError::IterationLimitExceeded`] when `max_iterations` polygon
/// expansions were spent without resolution.
pub fn find_corridor(
    mesh: &NavMesh,
    start: PolyId,
    goal: PolyId,
    goal_pos: Vec3,
    max_iterations: u32,
) -> Result<Corridor, QueryError> {
    let heuristic = |poly: PolyId| mesh.polygon(poly).centroid.distance(goal_pos);

    let mut best_cost: HashMap<PolyId, f32> = HashMap::new();
    let mut parents: HashMap<PolyId, PolyId> = HashMap::new();
    let mut open = BinaryHeap::new();
    let mut sequence = 0u32;

    best_cost.insert(start, 0.0);
    open.push(OpenEntry {
        f: heuristic(start),
        g: 0.0,
        sequence,
        poly: start,
    });

    let mut iterations = 0u32;
    while let Some(entry) = open.pop() {
        // A cheaper route to this polygon was found after the entry was
        // queued; the entry is stale.
        if entry.g > *best_cost.get(&entry.poly).unwrap_or(&f32::INFINITY) {
            continue;
        }
        if entry.poly == goal {
            let corridor = reconstruct(&parents, start, goal);
            debug!(
                polygons = corridor.len(),
                iterations, "corridor search succeeded"
            );
            return Ok(corridor);
        }
        if iterations >= max_iterations {
            debug!(iterations, "corridor search hit its iteration budget");
            return Err(QueryError::IterationLimitExceeded);
        }
        iterations += 1;

        let polygon = mesh.polygon(entry.poly);
        for neighbor in polygon.neighbors.iter().flatten() {
            let step = polygon
                .centroid
                .distance(mesh.polygon(*neighbor).centroid);
            let tentative = entry.g + step;
            if tentative < *best_cost.get(neighbor).unwrap_or(&f32::INFINITY) {
                best_cost.insert(*neighbor, tentative);
                parents.insert(*neighbor, entry.poly);
                sequence += 1;
                open.push(OpenEntry {
                    f: tentative + heuristic(*neighbor),
                    g: tentative,
                    sequence,
                    poly: *neighbor,
                });
            }
        }
    }
    debug!(iterations, "corridor search exhausted the open set");
    Err(QueryError::NoPath)
}

fn reconstruct(parents: &HashMap<PolyId, PolyId>, start: PolyId, goal: PolyId) -> Corridor {
    let mut polygons = vec![goal];
    let mut current = goal;
    while current != start {
        current = parents[&current];
        polygons.push(current);
    }
    polygons.reverse();
    Corridor { polygons }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A row of unit quads along the x-axis.
    fn quad_strip(count: u32) -> NavMesh {
        let mut vertices = Vec::new();
        for x in 0..=count {
            vertices.push(Vec3::new(x as f32, 0.0, 0.0));
            vertices.push(Vec3::new(x as f32, 0.0, 1.0));
        }
        let polygons = (0..count)
            .map(|x| {
                let base = x * 2;
                vec![base, base + 1, base + 3, base + 2]
            })
            .collect();
        NavMesh::from_parts(vertices, polygons)
    }

    /// Two quad strips with a gap between them, in one mesh.
    fn split_strips() -> NavMesh {
        let mut vertices = Vec::new();
        for x in [0.0f32, 1.0, 3.0, 4.0] {
            vertices.push(Vec3::new(x, 0.0, 0.0));
            vertices.push(Vec3::new(x, 0.0, 1.0));
        }
        let polygons = vec![vec![0, 1, 3, 2], vec![4, 5, 7, 6]];
        NavMesh::from_parts(vertices, polygons)
    }

    #[test]
    fn finds_the_corridor_along_a_strip() {
        let mesh = quad_strip(5);
        let goal_pos = mesh.polygon(PolyId(4)).centroid;
        let corridor =
            find_corridor(&mesh, PolyId(0), PolyId(4), goal_pos, DEFAULT_MAX_ITERATIONS).unwrap();
        assert_eq!(
            corridor.polygons,
            (0..5).map(PolyId).collect::<Vec<_>>()
        );
    }

    #[test]
    fn start_equal_to_goal_is_a_single_polygon_corridor() {
        let mesh = quad_strip(3);
        let goal_pos = mesh.polygon(PolyId(1)).centroid;
        let corridor =
            find_corridor(&mesh, PolyId(1), PolyId(1), goal_pos, DEFAULT_MAX_ITERATIONS).unwrap();
        assert_eq!(corridor.polygons, vec![PolyId(1)]);
    }

    #[test]
    fn disconnected_polygons_prove_no_path() {
        let mesh = split_strips();
        let goal_pos = mesh.polygon(PolyId(1)).centroid;
        let result = find_corridor(&mesh, PolyId(0), PolyId(1), goal_pos, DEFAULT_MAX_ITERATIONS);
        assert_eq!(result, Err(QueryError::NoPath));
    }

    #[test]
    fn iteration_cap_is_reported_distinctly() {
        let mesh = quad_strip(5);
        let goal_pos = mesh.polygon(PolyId(4)).centroid;
        let result = find_corridor(&mesh, PolyId(0), PolyId(4), goal_pos, 1);
        assert_eq!(result, Err(QueryError::IterationLimitExceeded));
    }

    #[test]
    fn corridor_cost_matches_brute_force_on_a_grid() {
        // A 4x3 grid of unit quads, fully connected.
        let (width, depth) = (4u32, 3u32);
        let mut vertices = Vec::new();
        for z in 0..=depth {
            for x in 0..=width {
                vertices.push(Vec3::new(x as f32, 0.0, z as f32));
            }
        }
        let vertex = |x: u32, z: u32| z * (width + 1) + x;
        let polygons: Vec<Vec<u32>> = (0..depth)
            .flat_map(|z| {
                (0..width).map(move |x| {
                    vec![
                        vertex(x, z),
                        vertex(x, z + 1),
                        vertex(x + 1, z + 1),
                        vertex(x + 1, z),
                    ]
                })
            })
            .collect();
        let mesh = NavMesh::from_parts(vertices, polygons);
        assert_eq!(mesh.polygon_count(), 12);

        for start in 0..mesh.polygon_count() as u32 {
            for goal in 0..mesh.polygon_count() as u32 {
                let goal_pos = mesh.polygon(PolyId(goal)).centroid;
                let corridor = find_corridor(
                    &mesh,
                    PolyId(start),
                    PolyId(goal),
                    goal_pos,
                    DEFAULT_MAX_ITERATIONS,
                )
                .unwrap();
                let expected = dijkstra_cost(&mesh, PolyId(start), PolyId(goal));
                let actual = corridor.cost(&mesh);
                assert!(
                    (actual - expected).abs() < 1e-4,
                    "{start} -> {goal}: a* found {actual}, brute force found {expected}"
                );
            }
        }
    }

    /// Reference shortest-path cost by exhaustive relaxation.
    fn dijkstra_cost(mesh: &NavMesh, start: PolyId, goal: PolyId) -> f32 {
        let n = mesh.polygon_count();
        let mut cost = vec![f32::INFINITY; n];
        cost[start.0 as usize] = 0.0;
        for _ in 0..n {
            for index in 0..n {
                let polygon = mesh.polygon(PolyId(index as u32));
                for neighbor in polygon.neighbors.iter().flatten() {
                    let step = polygon
                        .centroid
                        .distance(mesh.polygon(*neighbor).centroid);
                    let through = cost[index] + step;
                    if through < cost[neighbor.0 as usize] {
                        cost[neighbor.0 as usize] = through;
                    }
                }
            }
        }
        cost[goal.0 as usize]
    }
}
