//! Query entry points and the navigation service owning the published mesh.

use std::sync::{Arc, PoisonError, RwLock};

use glam::Vec3;
use navmesh::{BuildError, NavMesh, NavMeshConfig, TriMesh, build_navmesh};
use tracing::debug;

use crate::{QueryError, astar::DEFAULT_MAX_ITERATIONS, astar::find_corridor, funnel::string_pull};

/// A single path query. Transient; one per request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathRequest {
    /// Where the path starts.
    pub start: Vec3,
    /// Where the path should end.
    pub goal: Vec3,
    /// Cap on A* polygon expansions, bounding worst-case search time.
    /// [`DEFAULT_MAX_ITERATIONS`] when `None`.
    pub max_iterations: Option<u32>,
}

impl PathRequest {
    /// A request from `start` to `goal` with the default iteration budget.
    pub fn new(start: Vec3, goal: Vec3) -> Self {
        Self {
            start,
            goal,
            max_iterations: None,
        }
    }

    /// Overrides the iteration budget.
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }
}

/// An ordered list of waypoints from the snapped start to the snapped goal.
/// Owned by the caller once returned.
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    waypoints: Vec<Vec3>,
}

impl Path {
    pub(crate) fn new(waypoints: Vec<Vec3>) -> Self {
        Self { waypoints }
    }

    /// The waypoints, in travel order.
    #[inline]
    pub fn waypoints(&self) -> &[Vec3] {
        &self.waypoints
    }

    /// The number of waypoints.
    #[inline]
    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    /// Whether the path holds no waypoints.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    /// The summed length of all path segments.
    pub fn total_length(&self) -> f32 {
        self.waypoints
            .windows(2)
            .map(|pair| pair[0].distance(pair[1]))
            .sum()
    }

    /// Consumes the path, returning its waypoints.
    pub fn into_waypoints(self) -> Vec<Vec3> {
        self.waypoints
    }
}

/// Answers a path query against a baked mesh.
///
/// Start and goal snap to their nearest polygons within
/// `max_snap_distance`; the corridor between those polygons is found with A*
/// and tightened with the funnel pass. When both endpoints share one
/// polygon, the straight two-point path is returned directly.
pub fn find_path(
    mesh: &NavMesh,
    request: &PathRequest,
    max_snap_distance: f32,
) -> Result<Path, QueryError> {
    let (start_poly, start_pos) = mesh
        .nearest_polygon(request.start, max_snap_distance)
        .ok_or(QueryError::Unreachable)?;
    let (goal_poly, goal_pos) = mesh
        .nearest_polygon(request.goal, max_snap_distance)
        .ok_or(QueryError::Unreachable)?;

    if start_poly == goal_poly {
        return Ok(Path::new(vec![start_pos, goal_pos]));
    }

    let max_iterations = request.max_iterations.unwrap_or(DEFAULT_MAX_ITERATIONS);
    let corridor = find_corridor(mesh, start_poly, goal_poly, goal_pos, max_iterations)?;
    Ok(string_pull(mesh, &corridor, start_pos, goal_pos))
}

/// Owns the published navmesh handle and the bake/swap/teardown lifecycle.
///
/// The baked mesh is immutable and shared: queries clone the handle on
/// entry, so a concurrent rebake never disturbs them — they finish against
/// the mesh that was current when they started. Deliberately an owned,
/// passed-by-handle object rather than a process-wide singleton.
pub struct NavigationService {
    config: NavMeshConfig,
    mesh: RwLock<Option<Arc<NavMesh>>>,
}

impl NavigationService {
    /// Creates a service with no mesh published yet.
    pub fn new(config: NavMeshConfig) -> Self {
        Self {
            config,
            mesh: RwLock::new(None),
        }
    }

    /// The build configuration this service bakes with.
    #[inline]
    pub fn config(&self) -> &NavMeshConfig {
        &self.config
    }

    /// Bakes `trimesh` and atomically publishes the result.
    ///
    /// On failure the previously published mesh, if any, stays valid and
    /// servable; a failed bake never publishes partial data.
    pub fn bake(&self, trimesh: &TriMesh) -> Result<(), BuildError> {
        let navmesh = build_navmesh(trimesh, &self.config)?;
        debug!(polygons = navmesh.polygon_count(), "publishing navmesh");
        *self
            .mesh
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(navmesh));
        Ok(())
    }

    /// The currently published mesh handle, if any.
    pub fn navmesh(&self) -> Option<Arc<NavMesh>> {
        self.mesh
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Unpublishes the current mesh, e.g. on level teardown.
    pub fn clear(&self) {
        *self
            .mesh
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Answers a path query against the currently published mesh.
    ///
    /// Fails with [`QueryError::Unreachable`] when no mesh is published.
    pub fn find_path(&self, request: &PathRequest) -> Result<Path, QueryError> {
        let mesh = self.navmesh().ok_or(QueryError::Unreachable)?;
        find_path(&mesh, request, self.config.max_snap_distance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_without_a_mesh_is_unreachable() {
        let service = NavigationService::new(NavMeshConfig::default());
        let result = service.find_path(&PathRequest::new(Vec3::ZERO, Vec3::ONE));
        assert_eq!(result, Err(QueryError::Unreachable));
    }

    #[test]
    fn failed_bake_preserves_the_published_mesh() {
        let config = NavMeshConfig {
            cell_size: 1.0,
            cell_height: 0.5,
            agent_radius: 0.0,
            agent_height: 1.0,
            agent_max_climb: 0.5,
            ..Default::default()
        };
        let service = NavigationService::new(config);
        let plane = TriMesh::from_buffers(
            &[
                [0.0, 0.0, 0.0],
                [10.0, 0.0, 0.0],
                [10.0, 0.0, 10.0],
                [0.0, 0.0, 10.0],
            ],
            &[0, 2, 1, 0, 3, 2],
        );
        service.bake(&plane).unwrap();
        let published = service.navmesh().unwrap();

        assert!(service.bake(&TriMesh::default()).is_err());
        let still_published = service.navmesh().unwrap();
        assert!(Arc::ptr_eq(&published, &still_published));
    }

    #[test]
    fn clear_tears_the_mesh_down() {
        let service = NavigationService::new(NavMeshConfig::default());
        service.clear();
        assert!(service.navmesh().is_none());
    }
}
