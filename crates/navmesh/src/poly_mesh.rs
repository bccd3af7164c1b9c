//! Polygonization of contours into the baked navigation mesh.
//!
//! Contour loops are triangulated by ear clipping, adjacent triangles are
//! greedily merged back into convex polygons, and adjacency is recomputed
//! over the whole polygon set by matching shared vertex pairs, including
//! across former region boundaries.

use std::collections::HashMap;

use glam::{Vec2, Vec3};
use tracing::{debug, warn};

use crate::{
    builder::BuildError,
    contour::ContourSet,
    math::{Aabb3d, tri_area_xz},
};

/// Tolerance for signed-area tests on world coordinates.
const EPS_AREA: f32 = 1e-4;

/// Identifier of a polygon within a [`NavMesh`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct PolyId(pub u32);

/// A convex polygon of the baked navmesh.
///
/// Vertices are indices into the mesh's vertex pool, wound counter-clockwise
/// when seen from above. `neighbors[e]` names the polygon sharing the edge
/// from vertex `e` to vertex `e + 1`, and adjacency is always symmetric: if
/// A lists B across an edge, B lists A across the matching vertex pair.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct NavMeshPolygon {
    /// Indices into the navmesh vertex pool.
    pub vertices: Vec<u32>,
    /// Neighbor polygon per edge, `None` on border edges.
    pub neighbors: Vec<Option<PolyId>>,
    /// The average of the polygon's vertices.
    pub centroid: Vec3,
}

/// The baked navigation mesh.
///
/// Immutable after the bake; safe to share read-only across any number of
/// concurrent path queries.
pub struct NavMesh {
    vertices: Vec<Vec3>,
    polygons: Vec<NavMeshPolygon>,
    aabb: Aabb3d,
    index: PolyGrid,
}

impl NavMesh {
    /// Polygonizes simplified contours into the final navmesh.
    ///
    /// `weld_climb` is the vertical tolerance, in cells, for welding border
    /// vertices shared by regions at slightly different floor heights.
    pub fn from_contours(
        set: &ContourSet,
        max_vertices_per_polygon: u16,
        weld_climb: u16,
    ) -> Result<Self, BuildError> {
        let mut pool = VertexPool::new(weld_climb);
        let mut contour_indices = Vec::with_capacity(set.contours.len());
        for contour in &set.contours {
            let mut indices: Vec<u32> = contour
                .vertices
                .iter()
                .map(|vertex| pool.insert(vertex.x, vertex.y, vertex.z))
                .collect();
            indices.dedup();
            while indices.len() > 1 && indices.first() == indices.last() {
                indices.pop();
            }
            contour_indices.push(indices);
        }

        let origin = set.aabb.min;
        let vertices: Vec<Vec3> = pool
            .grid_vertices
            .iter()
            .map(|&(x, y, z)| {
                Vec3::new(
                    origin.x + x as f32 * set.cell_size,
                    origin.y + y as f32 * set.cell_height,
                    origin.z + z as f32 * set.cell_size,
                )
            })
            .collect();

        let mut poly_vertex_lists = Vec::new();
        for (contour, indices) in set.contours.iter().zip(&contour_indices) {
            if indices.len() < 3 {
                warn!(
                    region = contour.region.0,
                    "dropping contour that collapsed during vertex welding"
                );
                continue;
            }
            let Some(triangles) = triangulate(indices, &vertices) else {
                warn!(
                    region = contour.region.0,
                    "dropping contour that failed to triangulate"
                );
                continue;
            };
            let mut polygons: Vec<Vec<u32>> = triangles.into_iter().map(Vec::from).collect();
            merge_polygons(&mut polygons, &vertices, max_vertices_per_polygon as usize);
            poly_vertex_lists.extend(polygons);
        }

        if poly_vertex_lists.is_empty() {
            return Err(BuildError::NoPolygons);
        }
        let navmesh = Self::assemble(vertices, poly_vertex_lists);
        debug!(
            polygons = navmesh.polygon_count(),
            vertices = navmesh.vertices.len(),
            "polygonized contours"
        );
        Ok(navmesh)
    }

    /// Assembles a navmesh directly from a vertex pool and per-polygon vertex
    /// index lists, recomputing adjacency, centroids and the spatial index.
    ///
    /// This is the decode-side entry point for external serializers, which
    /// only need to persist the vertex pool and the polygon lists. Polygons
    /// must be convex and wound counter-clockwise seen from above.
    pub fn from_parts(vertices: Vec<Vec3>, polygons: Vec<Vec<u32>>) -> Self {
        Self::assemble(vertices, polygons)
    }

    fn assemble(vertices: Vec<Vec3>, poly_vertex_lists: Vec<Vec<u32>>) -> Self {
        let mut polygons: Vec<NavMeshPolygon> = poly_vertex_lists
            .into_iter()
            .map(|list| {
                let centroid = list
                    .iter()
                    .map(|&v| vertices[v as usize])
                    .sum::<Vec3>()
                    / list.len().max(1) as f32;
                NavMeshPolygon {
                    neighbors: vec![None; list.len()],
                    vertices: list,
                    centroid,
                }
            })
            .collect();

        // Match shared vertex-pair edges; the second polygon seen on an edge
        // links both directions at once, keeping adjacency symmetric.
        let mut edge_map: HashMap<(u32, u32), (usize, usize)> = HashMap::new();
        for polygon_index in 0..polygons.len() {
            for edge in 0..polygons[polygon_index].vertices.len() {
                let a = polygons[polygon_index].vertices[edge];
                let b = polygons[polygon_index].vertices
                    [(edge + 1) % polygons[polygon_index].vertices.len()];
                let key = (a.min(b), a.max(b));
                match edge_map.get(&key) {
                    None => {
                        edge_map.insert(key, (polygon_index, edge));
                    }
                    Some(&(other_index, other_edge)) => {
                        if polygons[other_index].neighbors[other_edge].is_some() {
                            warn!(
                                edge = ?key,
                                "more than two polygons share an edge, keeping the first pair"
                            );
                            continue;
                        }
                        polygons[other_index].neighbors[other_edge] =
                            Some(PolyId(polygon_index as u32));
                        polygons[polygon_index].neighbors[edge] = Some(PolyId(other_index as u32));
                    }
                }
            }
        }

        let aabb = aabb_of(&vertices);
        let index = PolyGrid::build(aabb, &polygons, &vertices);
        Self {
            vertices,
            polygons,
            aabb,
            index,
        }
    }

    /// The number of polygons in the mesh.
    #[inline]
    pub fn polygon_count(&self) -> usize {
        self.polygons.len()
    }

    /// The vertex pool of the mesh.
    #[inline]
    pub fn vertices(&self) -> &[Vec3] {
        &self.vertices
    }

    /// All polygons of the mesh, indexable by [`PolyId`].
    #[inline]
    pub fn polygons(&self) -> &[NavMeshPolygon] {
        &self.polygons
    }

    /// The polygon with the given id.
    #[inline]
    pub fn polygon(&self, id: PolyId) -> &NavMeshPolygon {
        &self.polygons[id.0 as usize]
    }

    /// The world-space bounds of the mesh.
    #[inline]
    pub fn aabb(&self) -> Aabb3d {
        self.aabb
    }

    /// The neighbor of `id` across edge `edge`, if any.
    #[inline]
    pub fn neighbor(&self, id: PolyId, edge: usize) -> Option<PolyId> {
        self.polygon(id).neighbors[edge]
    }

    /// The shared portal edge crossed when travelling from `from` into the
    /// adjacent polygon `to`, as `(left, right)` relative to that travel
    /// direction. `None` when the polygons are not adjacent.
    pub fn portal(&self, from: PolyId, to: PolyId) -> Option<(Vec3, Vec3)> {
        let polygon = self.polygon(from);
        let edge = polygon
            .neighbors
            .iter()
            .position(|&neighbor| neighbor == Some(to))?;
        let right = self.vertices[polygon.vertices[edge] as usize];
        let left = self.vertices[polygon.vertices[(edge + 1) % polygon.vertices.len()] as usize];
        Some((left, right))
    }

    /// Finds the polygon nearest to `point` within `max_distance`, along
    /// with `point` projected onto that polygon.
    ///
    /// Candidates come from the spatial index; ties resolve to the lowest
    /// polygon id for determinism.
    pub fn nearest_polygon(&self, point: Vec3, max_distance: f32) -> Option<(PolyId, Vec3)> {
        let center = Vec2::new(point.x, point.z);
        let mut best: Option<(f32, PolyId, Vec3)> = None;
        for candidate in self.index.candidates(center, max_distance) {
            let id = PolyId(candidate);
            let projected = self.closest_point(id, point);
            let distance = projected.distance(point);
            if distance <= max_distance && best.is_none_or(|(current, ..)| distance < current) {
                best = Some((distance, id, projected));
            }
        }
        best.map(|(_, id, projected)| (id, projected))
    }

    /// The point of polygon `id` closest to `point`: the vertical projection
    /// when `point` lies over the polygon, the nearest boundary point
    /// otherwise.
    pub fn closest_point(&self, id: PolyId, point: Vec3) -> Vec3 {
        if self.contains_xz(id, point) {
            return Vec3::new(point.x, self.height_at(id, point), point.z);
        }
        let polygon = self.polygon(id);
        let mut best = self.vertices[polygon.vertices[0] as usize];
        let mut best_distance = f32::MAX;
        for edge in 0..polygon.vertices.len() {
            let a = self.vertices[polygon.vertices[edge] as usize];
            let b = self.vertices[polygon.vertices[(edge + 1) % polygon.vertices.len()] as usize];
            let ab = Vec2::new(b.x - a.x, b.z - a.z);
            let t = if ab.length_squared() <= f32::EPSILON {
                0.0
            } else {
                (Vec2::new(point.x - a.x, point.z - a.z).dot(ab) / ab.length_squared())
                    .clamp(0.0, 1.0)
            };
            let candidate = a + (b - a) * t;
            let distance = candidate.distance_squared(point);
            if distance < best_distance {
                best_distance = distance;
                best = candidate;
            }
        }
        best
    }

    /// Whether `point` lies over polygon `id` on the xz-plane.
    pub fn contains_xz(&self, id: PolyId, point: Vec3) -> bool {
        let polygon = self.polygon(id);
        (0..polygon.vertices.len()).all(|edge| {
            let a = self.vertices[polygon.vertices[edge] as usize];
            let b = self.vertices[polygon.vertices[(edge + 1) % polygon.vertices.len()] as usize];
            tri_area_xz(a, b, point) <= EPS_AREA
        })
    }

    /// The surface height of polygon `id` under `point`, interpolated over
    /// the polygon's triangle fan.
    pub fn height_at(&self, id: PolyId, point: Vec3) -> f32 {
        let polygon = self.polygon(id);
        let base = self.vertices[polygon.vertices[0] as usize];
        for i in 1..polygon.vertices.len() - 1 {
            let b = self.vertices[polygon.vertices[i] as usize];
            let c = self.vertices[polygon.vertices[i + 1] as usize];
            let (u, v, w) = crate::math::barycentric_xz(point, base, b, c);
            if u >= -1e-4 && v >= -1e-4 && w >= -1e-4 {
                return u * base.y + v * b.y + w * c.y;
            }
        }
        polygon.centroid.y
    }
}

fn aabb_of(vertices: &[Vec3]) -> Aabb3d {
    let mut aabb = match vertices.first() {
        Some(&first) => Aabb3d {
            min: first,
            max: first,
        },
        None => Aabb3d::default(),
    };
    for &vertex in vertices {
        aabb.min = aabb.min.min(vertex);
        aabb.max = aabb.max.max(vertex);
    }
    aabb
}

/// Welds grid-space contour vertices into a shared pool. Vertices at the
/// same `(x, z)` corner merge when their heights differ by at most the climb
/// tolerance, which stitches borders of regions at slightly different floors.
struct VertexPool {
    weld_climb: u16,
    grid_vertices: Vec<(i32, u16, i32)>,
    by_corner: HashMap<(i32, i32), Vec<u32>>,
}

impl VertexPool {
    fn new(weld_climb: u16) -> Self {
        Self {
            weld_climb,
            grid_vertices: Vec::new(),
            by_corner: HashMap::new(),
        }
    }

    fn insert(&mut self, x: i32, y: u16, z: i32) -> u32 {
        let bucket = self.by_corner.entry((x, z)).or_default();
        for &index in bucket.iter() {
            let existing = self.grid_vertices[index as usize].1;
            if existing.abs_diff(y) <= self.weld_climb {
                return index;
            }
        }
        let index = self.grid_vertices.len() as u32;
        self.grid_vertices.push((x, y, z));
        bucket.push(index);
        index
    }
}

/// Ear-clips a contour loop into triangles, always cutting the valid ear
/// with the shortest diagonal.
///
/// Returns `None` when the loop is too degenerate to triangulate.
fn triangulate(indices: &[u32], vertices: &[Vec3]) -> Option<Vec<[u32; 3]>> {
    let mut remaining: Vec<u32> = indices.to_vec();
    let mut triangles = Vec::with_capacity(indices.len().saturating_sub(2));

    while remaining.len() > 2 {
        let n = remaining.len();
        let position = |i: usize| vertices[remaining[i] as usize];
        let mut best: Option<(usize, f32)> = None;
        for i in 0..n {
            let p0 = position(i);
            let p1 = position((i + 1) % n);
            let p2 = position((i + 2) % n);
            if tri_area_xz(p0, p1, p2) >= -EPS_AREA {
                // Reflex or collinear corner; not an ear.
                continue;
            }
            let blocked = (0..n)
                .filter(|&j| j != i && j != (i + 1) % n && j != (i + 2) % n)
                .any(|j| point_in_triangle_xz(position(j), p0, p1, p2));
            if blocked {
                continue;
            }
            let diagonal = {
                let d = p2 - p0;
                d.x * d.x + d.z * d.z
            };
            if best.is_none_or(|(_, current)| diagonal < current) {
                best = Some((i, diagonal));
            }
        }

        match best {
            Some((i, _)) => {
                triangles.push([
                    remaining[i],
                    remaining[(i + 1) % n],
                    remaining[(i + 2) % n],
                ]);
                remaining.remove((i + 1) % n);
            }
            None => {
                // No valid ear left. Collapse a collinear corner if one
                // exists, otherwise give up on this contour.
                let collinear = (0..n).find(|&i| {
                    tri_area_xz(position(i), position((i + 1) % n), position((i + 2) % n)).abs()
                        <= EPS_AREA
                })?;
                remaining.remove((collinear + 1) % n);
            }
        }
    }
    Some(triangles)
}

/// Strictly inside test against a clockwise-area triangle.
fn point_in_triangle_xz(p: Vec3, a: Vec3, b: Vec3, c: Vec3) -> bool {
    tri_area_xz(a, b, p) < -EPS_AREA
        && tri_area_xz(b, c, p) < -EPS_AREA
        && tri_area_xz(c, a, p) < -EPS_AREA
}

/// Greedily merges polygons sharing an edge into larger convex polygons,
/// longest shared edge first, as long as the result stays convex and within
/// `max_vertices` vertices.
fn merge_polygons(polygons: &mut Vec<Vec<u32>>, vertices: &[Vec3], max_vertices: usize) {
    loop {
        let mut best: Option<(f32, usize, usize, usize, usize)> = None;
        for a in 0..polygons.len() {
            for b in a + 1..polygons.len() {
                let Some((edge_a, edge_b)) = shared_edge(&polygons[a], &polygons[b]) else {
                    continue;
                };
                let Some(value) =
                    merge_value(&polygons[a], &polygons[b], edge_a, edge_b, vertices, max_vertices)
                else {
                    continue;
                };
                if best.is_none_or(|(current, ..)| value > current) {
                    best = Some((value, a, b, edge_a, edge_b));
                }
            }
        }
        let Some((_, a, b, edge_a, edge_b)) = best else {
            break;
        };
        let merged = merge_pair(&polygons[a], &polygons[b], edge_a, edge_b);
        polygons[a] = merged;
        polygons.remove(b);
    }
}

/// Finds the directed edge of `a` whose reverse appears in `b`.
fn shared_edge(a: &[u32], b: &[u32]) -> Option<(usize, usize)> {
    for i in 0..a.len() {
        let a0 = a[i];
        let a1 = a[(i + 1) % a.len()];
        for j in 0..b.len() {
            if b[j] == a1 && b[(j + 1) % b.len()] == a0 {
                return Some((i, j));
            }
        }
    }
    None
}

/// The merge priority of a polygon pair, or `None` when merging would exceed
/// the vertex budget or break convexity at either junction corner.
fn merge_value(
    a: &[u32],
    b: &[u32],
    edge_a: usize,
    edge_b: usize,
    vertices: &[Vec3],
    max_vertices: usize,
) -> Option<f32> {
    if a.len() + b.len() - 2 > max_vertices {
        return None;
    }
    let position = |index: u32| vertices[index as usize];

    // The two corners where the polygons join must stay convex.
    let va0 = position(a[edge_a]);
    let va0_prev = position(a[(edge_a + a.len() - 1) % a.len()]);
    let va0_next = position(b[(edge_b + 2) % b.len()]);
    if tri_area_xz(va0_prev, va0, va0_next) > EPS_AREA {
        return None;
    }
    let va1 = position(a[(edge_a + 1) % a.len()]);
    let va1_prev = position(b[(edge_b + b.len() - 1) % b.len()]);
    let va1_next = position(a[(edge_a + 2) % a.len()]);
    if tri_area_xz(va1_prev, va1, va1_next) > EPS_AREA {
        return None;
    }

    let d = va1 - va0;
    Some(d.x * d.x + d.z * d.z)
}

/// Joins two polygons along their shared edge, dropping the edge itself and
/// keeping both loops' winding.
fn merge_pair(a: &[u32], b: &[u32], edge_a: usize, edge_b: usize) -> Vec<u32> {
    let mut merged = Vec::with_capacity(a.len() + b.len() - 2);
    for k in 0..a.len() - 1 {
        merged.push(a[(edge_a + 1 + k) % a.len()]);
    }
    for k in 0..b.len() - 1 {
        merged.push(b[(edge_b + 1 + k) % b.len()]);
    }
    merged
}

/// Uniform grid over the xz projection of the mesh, bucketing polygons by
/// their bounding rectangle for nearest-polygon lookups.
struct PolyGrid {
    origin: Vec2,
    bucket_size: f32,
    width: u32,
    depth: u32,
    buckets: Vec<Vec<u32>>,
}

impl PolyGrid {
    const TARGET_BUCKETS_PER_AXIS: f32 = 32.0;

    fn build(aabb: Aabb3d, polygons: &[NavMeshPolygon], vertices: &[Vec3]) -> Self {
        let size = aabb.size();
        let extent = size.x.max(size.z).max(1e-3);
        let bucket_size = extent / Self::TARGET_BUCKETS_PER_AXIS;
        let width = ((size.x / bucket_size).ceil() as u32).max(1);
        let depth = ((size.z / bucket_size).ceil() as u32).max(1);
        let mut grid = Self {
            origin: Vec2::new(aabb.min.x, aabb.min.z),
            bucket_size,
            width,
            depth,
            buckets: vec![Vec::new(); width as usize * depth as usize],
        };
        for (polygon_index, polygon) in polygons.iter().enumerate() {
            let mut min = Vec2::MAX;
            let mut max = Vec2::MIN;
            for &vertex in &polygon.vertices {
                let v = vertices[vertex as usize];
                min = min.min(Vec2::new(v.x, v.z));
                max = max.max(Vec2::new(v.x, v.z));
            }
            let (x0, z0) = grid.bucket_of(min);
            let (x1, z1) = grid.bucket_of(max);
            for z in z0..=z1 {
                for x in x0..=x1 {
                    grid.buckets[(x + z * grid.width) as usize].push(polygon_index as u32);
                }
            }
        }
        grid
    }

    fn bucket_of(&self, point: Vec2) -> (u32, u32) {
        let x = ((point.x - self.origin.x) / self.bucket_size).floor() as i64;
        let z = ((point.y - self.origin.y) / self.bucket_size).floor() as i64;
        (
            x.clamp(0, self.width as i64 - 1) as u32,
            z.clamp(0, self.depth as i64 - 1) as u32,
        )
    }

    /// The ids of all polygons whose buckets intersect the circle around
    /// `center`, sorted ascending and deduplicated.
    fn candidates(&self, center: Vec2, radius: f32) -> Vec<u32> {
        let (x0, z0) = self.bucket_of(center - Vec2::splat(radius));
        let (x1, z1) = self.bucket_of(center + Vec2::splat(radius));
        let mut result = Vec::new();
        for z in z0..=z1 {
            for x in x0..=x1 {
                result.extend_from_slice(&self.buckets[(x + z * self.width) as usize]);
            }
        }
        result.sort_unstable();
        result.dedup();
        result
    }
}
