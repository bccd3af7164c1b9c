//! Triangle mesh input for the bake pipeline.

use glam::{UVec3, Vec3A};
use thiserror::Error;

use crate::math::Aabb3d;

/// A triangle mesh used as input for voxelization.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct TriMesh {
    /// The vertices of the mesh.
    pub vertices: Vec<Vec3A>,

    /// The indices of the mesh.
    /// Follows the convention of a triangle list.
    pub indices: Vec<UVec3>,
}

impl TriMesh {
    /// Builds a [`TriMesh`] from flat position and index buffers.
    ///
    /// Indices are grouped in threes; a trailing partial triangle is ignored.
    pub fn from_buffers(positions: &[[f32; 3]], indices: &[u32]) -> Self {
        Self {
            vertices: positions.iter().map(|p| Vec3A::from(*p)).collect(),
            indices: indices
                .chunks_exact(3)
                .map(|t| UVec3::new(t[0], t[1], t[2]))
                .collect(),
        }
    }

    /// Extends the trimesh with the vertices and indices of another trimesh.
    /// The indices of `other` are offset by the number of vertices in `self`.
    ///
    /// # Panics
    ///
    /// Panics if the combined mesh would hold more than 2^32 vertices.
    pub fn extend(&mut self, other: TriMesh) {
        if self.vertices.len() + other.vertices.len() > u32::MAX as usize {
            panic!("Cannot extend a trimesh to more than 2^32 vertices");
        }
        let next_vertex_index = self.vertices.len() as u32;
        self.vertices.extend(other.vertices);
        self.indices
            .extend(other.indices.iter().map(|i| i + next_vertex_index));
    }

    /// The number of triangles in the mesh.
    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.indices.len()
    }

    /// Whether the mesh contains no triangles.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Computes the AABB of the trimesh.
    /// Returns `None` if the trimesh is empty.
    pub fn compute_aabb(&self) -> Option<Aabb3d> {
        if self.is_empty() {
            return None;
        }
        Aabb3d::from_verts(&self.vertices)
    }

    /// The three corner positions of triangle `index`.
    #[inline]
    pub fn triangle(&self, index: usize) -> [Vec3A; 3] {
        let tri = self.indices[index];
        [
            self.vertices[tri.x as usize],
            self.vertices[tri.y as usize],
            self.vertices[tri.z as usize],
        ]
    }

    /// The unnormalized face normal of triangle `index`.
    /// Zero for degenerate triangles.
    #[inline]
    pub fn face_normal(&self, index: usize) -> Vec3A {
        let [a, b, c] = self.triangle(index);
        (b - a).cross(c - a)
    }

    /// Marks each triangle as walkable or not based on the threshold angle
    /// between its surface normal and the up axis.
    ///
    /// Degenerate triangles are never walkable.
    pub fn walkable_triangles(&self, threshold_rad: f32) -> Vec<bool> {
        let threshold_cos = threshold_rad.cos();
        (0..self.triangle_count())
            .map(|i| {
                let normal = self.face_normal(i).normalize_or_zero();
                normal.y > threshold_cos
            })
            .collect()
    }
}

/// Errors raised when the input geometry cannot produce a voxel grid.
/// Fatal to the bake attempt; no partial grid is produced.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GeometryError {
    /// The input mesh has no triangles.
    #[error("input mesh has no triangles")]
    EmptyMesh,
    /// Every input triangle is degenerate or steeper than the slope threshold.
    #[error("no walkable triangle in the input mesh")]
    NoWalkableTriangles,
    /// The bounds and cell size produce a voxel grid too large to address.
    #[error("voxel grid of {width}x{height}x{depth} cells is too large")]
    GridTooLarge {
        /// Cells along the x-axis.
        width: u32,
        /// Cells along the y-axis.
        height: u32,
        /// Cells along the z-axis.
        depth: u32,
    },
}
