//! The full bake pipeline, from triangle soup to baked [`NavMesh`].

use thiserror::Error;
use tracing::debug;

use crate::{
    config::{ConfigError, NavMeshConfig},
    heightfield::Heightfield,
    poly_mesh::NavMesh,
    trimesh::{GeometryError, TriMesh},
    voxel::Voxelizer,
};

/// Runs the whole build pipeline: voxelization, heightfield compaction,
/// erosion, distance field, watershed regions, contour simplification and
/// polygonization.
///
/// The result is complete or absent; a failed bake never yields a partial
/// mesh, so callers can keep serving a previously built one.
pub fn build_navmesh(trimesh: &TriMesh, config: &NavMeshConfig) -> Result<NavMesh, BuildError> {
    config.validate()?;

    let grid = Voxelizer::new(config).voxelize(trimesh)?;
    let mut heightfield = Heightfield::from_voxel_grid(
        &grid,
        config.walkable_height_cells(),
        config.walkable_climb_cells(),
    );
    drop(grid);

    heightfield.erode_walkable_area(config.walkable_radius_cells());
    heightfield.build_distance_field();
    heightfield.build_regions(config.min_region_area)?;

    let contours = heightfield.build_contours(config.contour_simplify_tolerance);
    let navmesh = NavMesh::from_contours(
        &contours,
        config.max_polygon_vertices,
        config.walkable_climb_cells(),
    )?;
    debug!(
        regions = heightfield.region_count(),
        polygons = navmesh.polygon_count(),
        "baked navmesh"
    );
    Ok(navmesh)
}

/// Errors that abort a bake attempt.
///
/// Whole-mesh failures only; a single region going degenerate is logged and
/// skipped instead. A failed bake leaves any previously published navmesh
/// untouched.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BuildError {
    /// The configuration was rejected before any build work started.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The input geometry could not be voxelized.
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    /// Voxelization succeeded but no span is walkable.
    #[error("no walkable span in the heightfield")]
    NoWalkableSpans,
    /// No region survived growth and merging.
    #[error("no region survived merging")]
    NoRegions,
    /// Every region's contour failed to polygonize.
    #[error("no polygon could be built from the contours")]
    NoPolygons,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plane(size: f32) -> TriMesh {
        TriMesh::from_buffers(
            &[
                [0.0, 0.0, 0.0],
                [size, 0.0, 0.0],
                [size, 0.0, size],
                [0.0, 0.0, size],
            ],
            &[0, 2, 1, 0, 3, 2],
        )
    }

    fn test_config() -> NavMeshConfig {
        NavMeshConfig {
            cell_size: 1.0,
            cell_height: 0.5,
            agent_radius: 0.0,
            agent_height: 1.0,
            agent_max_climb: 0.5,
            ..Default::default()
        }
    }

    #[test]
    fn bakes_a_flat_plane_into_one_polygon() {
        let navmesh = build_navmesh(&plane(10.0), &test_config()).unwrap();
        // The single square region simplifies to four corners and merges
        // back into one convex polygon.
        assert_eq!(navmesh.polygon_count(), 1);
    }

    #[test]
    fn invalid_config_is_rejected_before_geometry() {
        let config = NavMeshConfig {
            cell_size: -1.0,
            ..test_config()
        };
        let result = build_navmesh(&TriMesh::default(), &config);
        assert!(matches!(result, Err(BuildError::Config(_))));
    }

    #[test]
    fn empty_mesh_is_a_geometry_error() {
        let result = build_navmesh(&TriMesh::default(), &test_config());
        assert!(matches!(
            result,
            Err(BuildError::Geometry(GeometryError::EmptyMesh))
        ));
    }

    #[test]
    fn oversized_agent_leaves_no_walkable_spans() {
        let config = NavMeshConfig {
            agent_radius: 8.0,
            ..test_config()
        };
        let result = build_navmesh(&plane(10.0), &config);
        assert!(matches!(result, Err(BuildError::NoWalkableSpans)));
    }
}
