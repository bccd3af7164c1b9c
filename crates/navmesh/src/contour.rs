//! Region boundary tracing and simplification.
//!
//! Each region's span footprint is walked with an iterative right-hand-rule
//! border follower, producing a closed loop of grid-corner vertices. The raw
//! loop is then reduced with Douglas-Peucker, pinning the vertices where the
//! bordering region changes so that shared borders simplify identically from
//! both sides.

use glam::Vec2;
use tracing::warn;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::{heightfield::Heightfield, math::Aabb3d, region::RegionId};

/// A vertex of a region boundary, in grid-corner coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct ContourVertex {
    /// Corner coordinate along the x-axis, in cells.
    pub x: i32,
    /// The floor height of the span this vertex was emitted from, in cells.
    pub y: u16,
    /// Corner coordinate along the z-axis, in cells.
    pub z: i32,
    /// The region on the other side of the boundary edge leading into this
    /// vertex. [`RegionId::NONE`] when bordering unwalkable space.
    pub neighbor: RegionId,
}

impl ContourVertex {
    #[inline]
    fn position(&self) -> Vec2 {
        Vec2::new(self.x as f32, self.z as f32)
    }
}

/// The closed boundary loop of one region.
#[derive(Debug, Clone)]
pub struct Contour {
    /// The region this contour bounds.
    pub region: RegionId,
    /// The boundary loop as traced, one vertex per border-follow step.
    pub raw_vertices: Vec<ContourVertex>,
    /// The simplified boundary loop.
    pub vertices: Vec<ContourVertex>,
}

/// The simplified boundaries of all regions of a [`Heightfield`].
pub struct ContourSet {
    /// One contour per region that survived simplification.
    pub contours: Vec<Contour>,
    /// The world-space bounds of the originating heightfield.
    pub aabb: Aabb3d,
    /// The size of each cell on the xz-plane.
    pub cell_size: f32,
    /// The size of each cell along the y-axis.
    pub cell_height: f32,
    /// Cells along the x-axis.
    pub width: u32,
    /// Cells along the z-axis.
    pub depth: u32,
}

impl Heightfield {
    /// Traces and simplifies the boundary contour of every region.
    ///
    /// `simplify_tolerance` is the maximum distance, in cells, a simplified
    /// edge may deviate from the raw boundary. Regions whose contour collapses
    /// below 3 vertices are skipped; the rest of the bake continues.
    pub fn build_contours(&self, simplify_tolerance: f32) -> ContourSet {
        let regions: Vec<RegionId> = self.region_ids().collect();

        #[cfg(feature = "parallel")]
        let traced: Vec<Option<Contour>> = regions
            .par_iter()
            .map(|&region| self.build_region_contour(region, simplify_tolerance))
            .collect();
        #[cfg(not(feature = "parallel"))]
        let traced: Vec<Option<Contour>> = regions
            .iter()
            .map(|&region| self.build_region_contour(region, simplify_tolerance))
            .collect();

        ContourSet {
            contours: traced.into_iter().flatten().collect(),
            aabb: self.aabb,
            cell_size: self.cell_size,
            cell_height: self.cell_height,
            width: self.width,
            depth: self.depth,
        }
    }

    fn build_region_contour(&self, region: RegionId, simplify_tolerance: f32) -> Option<Contour> {
        let raw = self.trace_region_boundary(region)?;
        let vertices = simplify_contour(&raw, simplify_tolerance);
        if vertices.len() < 3 {
            warn!(
                region = region.0,
                raw = raw.len(),
                simplified = vertices.len(),
                "dropping region with degenerate contour"
            );
            return None;
        }
        Some(Contour {
            region,
            raw_vertices: raw,
            vertices,
        })
    }

    /// Walks the region border with the right-hand rule: facing a boundary
    /// emits the corner and turns clockwise, otherwise the walker advances
    /// into the neighbor span and turns counter-clockwise.
    fn trace_region_boundary(&self, region: RegionId) -> Option<Vec<ContourVertex>> {
        let (start_x, start_z, start_span, start_dir) = self.find_boundary_start(region)?;
        let (mut x, mut z, mut span_index, mut dir) = (start_x, start_z, start_span, start_dir);

        let mut vertices = Vec::new();
        let step_limit = self.span_count() * 4 + 4;
        loop {
            match self.same_region_neighbor(x, z, span_index, dir, region) {
                None => {
                    let neighbor = self
                        .connection(x, z, span_index, dir)
                        .map(|n| self.region(n))
                        .unwrap_or(RegionId::NONE);
                    let (corner_x, corner_z) = corner_of(x, z, dir);
                    vertices.push(ContourVertex {
                        x: corner_x,
                        y: self.spans()[span_index].floor,
                        z: corner_z,
                        neighbor,
                    });
                    dir = (dir + 1) % 4;
                }
                Some(neighbor) => {
                    x = (x as i32 + crate::math::DIR_OFFSET_X[dir]) as u32;
                    z = (z as i32 + crate::math::DIR_OFFSET_Z[dir]) as u32;
                    span_index = neighbor;
                    dir = (dir + 3) % 4;
                }
            }
            if x == start_x && z == start_z && span_index == start_span && dir == start_dir {
                break;
            }
            if vertices.len() > step_limit {
                warn!(region = region.0, "contour walk did not close, aborting region");
                return None;
            }
        }
        Some(vertices)
    }

    fn find_boundary_start(&self, region: RegionId) -> Option<(u32, u32, usize, usize)> {
        for (x, z, span_index) in self.iter_spans() {
            if self.region(span_index) != region {
                continue;
            }
            for dir in 0..4 {
                if self
                    .same_region_neighbor(x, z, span_index, dir, region)
                    .is_none()
                {
                    return Some((x, z, span_index, dir));
                }
            }
        }
        None
    }

    /// The connected neighbor span towards `dir` if it belongs to `region`.
    fn same_region_neighbor(
        &self,
        x: u32,
        z: u32,
        span_index: usize,
        dir: usize,
        region: RegionId,
    ) -> Option<usize> {
        let neighbor = self.connection(x, z, span_index, dir)?;
        (self.region(neighbor) == region).then_some(neighbor)
    }
}

/// The grid corner a boundary step contributes, given the walker's cell and
/// facing direction.
#[inline]
fn corner_of(x: u32, z: u32, dir: usize) -> (i32, i32) {
    let (x, z) = (x as i32, z as i32);
    match dir {
        0 => (x, z),
        1 => (x, z + 1),
        2 => (x + 1, z + 1),
        _ => (x + 1, z),
    }
}

/// Reduces a closed boundary loop with Douglas-Peucker, section by section
/// between pinned vertices.
///
/// A vertex is pinned when the bordering region changes there; if the loop
/// touches no other region, the lexicographically smallest corner and the
/// corner farthest from it are pinned instead so the loop can't collapse.
fn simplify_contour(raw: &[ContourVertex], tolerance: f32) -> Vec<ContourVertex> {
    let n = raw.len();
    if n < 3 {
        return raw.to_vec();
    }

    let mut pinned: Vec<usize> = (0..n)
        .filter(|&i| raw[i].neighbor != raw[(i + n - 1) % n].neighbor)
        .collect();
    if pinned.is_empty() {
        let lower_left = (0..n)
            .min_by_key(|&i| (raw[i].x, raw[i].z))
            .expect("contour has vertices");
        let farthest = (0..n)
            .max_by(|&a, &b| {
                let da = raw[a].position().distance_squared(raw[lower_left].position());
                let db = raw[b].position().distance_squared(raw[lower_left].position());
                da.total_cmp(&db)
            })
            .expect("contour has vertices");
        pinned = vec![lower_left.min(farthest), lower_left.max(farthest)];
        if pinned[0] == pinned[1] {
            // A loop of identical corners cannot be simplified meaningfully.
            return raw.to_vec();
        }
    }

    let mut simplified = Vec::with_capacity(pinned.len() * 2);
    for (k, &section_start) in pinned.iter().enumerate() {
        let section_end = pinned[(k + 1) % pinned.len()];
        // Collect the section, wrapping around the loop.
        let mut section = Vec::new();
        let mut i = section_start;
        loop {
            section.push(raw[i]);
            if i == section_end && !section.is_empty() && section.len() > 1 {
                break;
            }
            i = (i + 1) % n;
            if section.len() > n {
                break;
            }
        }
        // The section's last vertex opens the next section.
        let kept = douglas_peucker(&section, tolerance);
        simplified.extend_from_slice(&kept[..kept.len() - 1]);
    }
    simplified
}

/// Iterative Douglas-Peucker over an open polyline: keeps both endpoints and
/// every vertex whose perpendicular deviation from the running simplification
/// exceeds `tolerance`.
fn douglas_peucker(points: &[ContourVertex], tolerance: f32) -> Vec<ContourVertex> {
    let n = points.len();
    if n <= 2 {
        return points.to_vec();
    }
    let tolerance_sq = tolerance * tolerance;
    let mut keep = vec![false; n];
    keep[0] = true;
    keep[n - 1] = true;

    let mut stack = vec![(0usize, n - 1)];
    while let Some((a, b)) = stack.pop() {
        if b <= a + 1 {
            continue;
        }
        let mut max_deviation = 0.0f32;
        let mut split = None;
        for i in a + 1..b {
            let deviation = crate::math::point_segment_distance_sq(
                points[i].position(),
                points[a].position(),
                points[b].position(),
            );
            if deviation > max_deviation {
                max_deviation = deviation;
                split = Some(i);
            }
        }
        if let Some(split) = split
            && max_deviation > tolerance_sq
        {
            keep[split] = true;
            stack.push((a, split));
            stack.push((split, b));
        }
    }

    (0..n).filter(|&i| keep[i]).map(|i| points[i]).collect()
}
