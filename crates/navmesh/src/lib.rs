#![warn(missing_docs)]
#![doc = include_str!("../../../readme.md")]

mod builder;
mod config;
mod contour;
mod heightfield;
pub(crate) mod math;
mod poly_mesh;
mod region;
mod trimesh;
mod voxel;

pub use builder::{BuildError, build_navmesh};
pub use config::{ConfigError, NavMeshConfig};
pub use contour::{Contour, ContourSet, ContourVertex};
pub use heightfield::{Heightfield, OPEN_CEILING, Span};
pub use math::Aabb3d;
pub use poly_mesh::{NavMesh, NavMeshPolygon, PolyId};
pub use region::RegionId;
pub use trimesh::{GeometryError, TriMesh};
pub use voxel::{Voxel, VoxelGrid, Voxelizer};
