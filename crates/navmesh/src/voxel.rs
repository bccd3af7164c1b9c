//! Voxelization of input geometry into a solid/open grid.

use glam::Vec3;
use tracing::debug;

use crate::{
    config::NavMeshConfig,
    math::Aabb3d,
    trimesh::{GeometryError, TriMesh},
};

/// A single cell of a [`VoxelGrid`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Voxel {
    /// Nothing intersects this cell.
    #[default]
    Open,
    /// Geometry intersects this cell.
    Solid {
        /// Whether the geometry covering this cell had a walkable slope.
        walkable: bool,
    },
}

impl Voxel {
    /// Whether the voxel is solid.
    #[inline]
    pub fn is_solid(&self) -> bool {
        matches!(self, Voxel::Solid { .. })
    }

    /// Whether the voxel is solid with a walkable top surface.
    #[inline]
    pub fn is_walkable(&self) -> bool {
        matches!(self, Voxel::Solid { walkable: true })
    }
}

/// A dense grid of [`Voxel`]s over an axis-aligned bounding volume.
///
/// Dimensions are strictly positive and derived from the bounds and cell
/// sizes at construction; the grid is not mutated after
/// [`Voxelizer::voxelize`] returns it.
pub struct VoxelGrid {
    /// Cells along the x-axis.
    pub width: u32,
    /// Cells along the y-axis.
    pub height: u32,
    /// Cells along the z-axis.
    pub depth: u32,
    /// The world-space bounds the grid covers.
    pub aabb: Aabb3d,
    /// The size of each cell on the xz-plane.
    pub cell_size: f32,
    /// The size of each cell along the y-axis.
    pub cell_height: f32,
    voxels: Vec<Voxel>,
}

impl VoxelGrid {
    fn new(aabb: Aabb3d, cell_size: f32, cell_height: f32) -> Result<Self, GeometryError> {
        let size = aabb.size();
        let width = ((size.x / cell_size).ceil() as u32).max(1);
        let height = ((size.y / cell_height).ceil() as u32).max(1);
        let depth = ((size.z / cell_size).ceil() as u32).max(1);
        let voxel_count = width as u128 * height as u128 * depth as u128;
        if voxel_count > usize::MAX as u128 / size_of::<Voxel>() as u128 {
            return Err(GeometryError::GridTooLarge {
                width,
                height,
                depth,
            });
        }
        Ok(Self {
            width,
            height,
            depth,
            aabb,
            cell_size,
            cell_height,
            voxels: vec![Voxel::Open; voxel_count as usize],
        })
    }

    /// The voxel at cell coordinates `(x, y, z)`.
    #[inline]
    pub fn voxel(&self, x: u32, y: u32, z: u32) -> Voxel {
        self.voxels[self.index(x, y, z)]
    }

    #[inline]
    fn index(&self, x: u32, y: u32, z: u32) -> usize {
        debug_assert!(x < self.width && y < self.height && z < self.depth);
        (x as usize + z as usize * self.width as usize) * self.height as usize + y as usize
    }

    /// The number of solid voxels in the grid.
    pub fn solid_count(&self) -> usize {
        self.voxels.iter().filter(|v| v.is_solid()).count()
    }

    fn mark_solid(&mut self, x: u32, y: u32, z: u32, walkable: bool) {
        let index = self.index(x, y, z);
        let merged = match self.voxels[index] {
            Voxel::Open => walkable,
            // Walkable geometry takes priority when triangles overlap in a cell.
            Voxel::Solid { walkable: previous } => previous || walkable,
        };
        self.voxels[index] = Voxel::Solid { walkable: merged };
    }
}

/// Rasterizes triangle geometry into a [`VoxelGrid`].
pub struct Voxelizer {
    /// The size of each cell on the xz-plane.
    pub cell_size: f32,
    /// The size of each cell along the y-axis.
    pub cell_height: f32,
    /// The maximum walkable slope in radians.
    pub walkable_slope: f32,
}

impl Voxelizer {
    /// Creates a voxelizer from the relevant config fields.
    pub fn new(config: &NavMeshConfig) -> Self {
        Self {
            cell_size: config.cell_size,
            cell_height: config.cell_height,
            walkable_slope: config.max_walkable_slope_degrees.to_radians(),
        }
    }

    /// Rasterizes all triangles of `trimesh` into a fresh grid.
    ///
    /// Steep triangles still rasterize as solid obstacles; only their tops
    /// are unwalkable. Fails without producing a grid when the mesh is empty
    /// or contains no walkable triangle at all.
    pub fn voxelize(&self, trimesh: &TriMesh) -> Result<VoxelGrid, GeometryError> {
        let aabb = trimesh.compute_aabb().ok_or(GeometryError::EmptyMesh)?;
        let walkable = trimesh.walkable_triangles(self.walkable_slope);
        if !walkable.contains(&true) {
            return Err(GeometryError::NoWalkableTriangles);
        }

        let mut grid = VoxelGrid::new(aabb, self.cell_size, self.cell_height)?;
        let mut clipper = TriangleClipper::default();
        for (i, &triangle_walkable) in walkable.iter().enumerate() {
            let triangle = trimesh.triangle(i).map(Vec3::from);
            self.rasterize_triangle(&mut grid, &mut clipper, triangle, triangle_walkable);
        }
        debug!(
            width = grid.width,
            height = grid.height,
            depth = grid.depth,
            solid = grid.solid_count(),
            "voxelized trimesh"
        );
        Ok(grid)
    }

    /// Clips the triangle into grid columns row by row and marks every
    /// covered cell solid.
    fn rasterize_triangle(
        &self,
        grid: &mut VoxelGrid,
        clipper: &mut TriangleClipper,
        triangle: [Vec3; 3],
        walkable: bool,
    ) {
        let min = triangle[0].min(triangle[1]).min(triangle[2]);
        let max = triangle[0].max(triangle[1]).max(triangle[2]);
        let origin = grid.aabb.min;

        let z0 = (((min.z - origin.z) / self.cell_size).floor() as i64).max(0) as u32;
        let z1 = ((((max.z - origin.z) / self.cell_size).floor() as i64).max(0) as u32)
            .min(grid.depth - 1);
        if min.z > origin.z + grid.depth as f32 * self.cell_size || max.z < origin.z {
            return;
        }

        for z in z0..=z1 {
            let slab_min = origin.z + z as f32 * self.cell_size;
            let slab_max = slab_min + self.cell_size;
            let row = clipper.clip_slab(&triangle, Axis::Z, slab_min, slab_max);
            if row.is_empty() {
                continue;
            }
            let (row_min_x, row_max_x) = row.iter().fold((f32::MAX, f32::MIN), |(lo, hi), v| {
                (lo.min(v.x), hi.max(v.x))
            });
            let row = row.to_vec();

            let x0 = (((row_min_x - origin.x) / self.cell_size).floor() as i64).max(0) as u32;
            let x1 = ((((row_max_x - origin.x) / self.cell_size).floor() as i64).max(0) as u32)
                .min(grid.width - 1);
            for x in x0..=x1 {
                let cell_min = origin.x + x as f32 * self.cell_size;
                let cell_max = cell_min + self.cell_size;
                let cell = clipper.clip_slab(&row, Axis::X, cell_min, cell_max);
                if cell.is_empty() {
                    continue;
                }
                let (y_min, y_max) = cell.iter().fold((f32::MAX, f32::MIN), |(lo, hi), v| {
                    (lo.min(v.y), hi.max(v.y))
                });
                let y0 = (((y_min - origin.y) / self.cell_height).floor() as i64)
                    .clamp(0, grid.height as i64 - 1) as u32;
                let y1 = (((y_max - origin.y) / self.cell_height).floor() as i64)
                    .clamp(0, grid.height as i64 - 1) as u32;
                for y in y0..=y1 {
                    grid.mark_solid(x, y, z, walkable);
                }
            }
        }
    }
}

#[derive(Clone, Copy)]
enum Axis {
    X,
    Z,
}

impl Axis {
    #[inline]
    fn value(self, v: Vec3) -> f32 {
        match self {
            Axis::X => v.x,
            Axis::Z => v.z,
        }
    }
}

/// Reusable buffers for Sutherland-Hodgman clipping of a triangle against
/// cell boundaries.
#[derive(Default)]
struct TriangleClipper {
    scratch: Vec<Vec3>,
    output: Vec<Vec3>,
}

impl TriangleClipper {
    /// Clips `polygon` to the slab `[lo, hi]` along `axis`.
    /// The result lives in an internal buffer until the next call.
    fn clip_slab(&mut self, polygon: &[Vec3], axis: Axis, lo: f32, hi: f32) -> &[Vec3] {
        self.scratch.clear();
        clip_plane(polygon, axis, lo, false, &mut self.scratch);
        self.output.clear();
        clip_plane(&self.scratch, axis, hi, true, &mut self.output);
        &self.output
    }
}

/// Keeps the part of `input` with `axis` value above (`keep_below == false`)
/// or below (`keep_below == true`) `bound`, inserting intersection points on
/// crossing edges.
fn clip_plane(input: &[Vec3], axis: Axis, bound: f32, keep_below: bool, output: &mut Vec<Vec3>) {
    let inside = |v: Vec3| {
        if keep_below {
            axis.value(v) <= bound
        } else {
            axis.value(v) >= bound
        }
    };
    for (i, &current) in input.iter().enumerate() {
        let previous = input[(i + input.len() - 1) % input.len()];
        let current_inside = inside(current);
        if inside(previous) != current_inside {
            let t = (bound - axis.value(previous)) / (axis.value(current) - axis.value(previous));
            output.push(previous + (current - previous) * t);
        }
        if current_inside {
            output.push(current);
        }
    }
}
