#![warn(missing_docs)]
//! Runtime path queries over a baked [`navmesh::NavMesh`].
//!
//! A query resolves its endpoints onto the mesh, searches the polygon
//! adjacency graph with A* for a least-cost corridor, and string-pulls the
//! corridor into a direct waypoint path with the funnel algorithm. The
//! [`NavigationService`] wraps this behind an owned, atomically swappable
//! mesh handle so rebakes never disturb in-flight queries.

mod astar;
mod funnel;
mod service;

pub use astar::{Corridor, DEFAULT_MAX_ITERATIONS, find_corridor};
pub use funnel::string_pull;
pub use service::{NavigationService, Path, PathRequest, find_path};

use thiserror::Error;

/// Errors returned by path queries.
///
/// All variants are recoverable: the caller may retry with different
/// parameters or treat the failure as "no path" for behavior purposes.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryError {
    /// Start or goal lies too far from any navmesh polygon to snap onto it.
    #[error("start or goal is not within snap distance of any navmesh polygon")]
    Unreachable,
    /// The polygon graph is proven disconnected between start and goal.
    #[error("no path exists between the start and goal polygons")]
    NoPath,
    /// The search ran out of iterations before either finding the goal or
    /// proving it unreachable.
    #[error("path search exhausted its iteration budget")]
    IterationLimitExceeded,
}
