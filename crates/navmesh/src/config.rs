//! Configuration for navmesh builds.

use thiserror::Error;

/// Specifies a configuration to use when baking a navmesh.
///
/// Units are either world units (wu) or voxels (vx). Voxel-unit values are
/// derived from the world-unit fields through `cell_size` and `cell_height`.
///
/// First decide the size of your agent's logical cylinder. If your game world
/// uses meters as units, a reasonable starting point for a human-sized agent
/// is a radius of 0.4 and a height of 2.0.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct NavMeshConfig {
    /// The xz-plane cell size used for voxelization. `[Limit: > 0] [Units: wu]`
    ///
    /// This value is usually derived from the agent radius `r`. A recommended
    /// starting value is either `r/2` or `r/3`. Smaller values increase
    /// rasterization resolution and navmesh detail, but total bake time grows
    /// steeply, so use as large a value as you can get away with.
    pub cell_size: f32,

    /// The y-axis cell size used for voxelization. `[Limit: > 0] [Units: wu]`
    ///
    /// Defined separately from `cell_size` to allow greater precision in
    /// height tests. A good starting point is half the cell size. If holes
    /// appear around height discontinuities such as stairs or curbs, decrease
    /// this value.
    pub cell_height: f32,

    /// The maximum slope that is considered walkable.
    /// `[Limits: 0 <= value < 90] [Units: Degrees]`
    ///
    /// Measured between a triangle's surface normal and the world up vector.
    /// The practical upper limit is usually around 85 degrees.
    pub max_walkable_slope_degrees: f32,

    /// The radius of the agent. `[Limit: >= 0] [Units: wu]`
    ///
    /// The walkable area is shrunk away from obstructions by this distance,
    /// so that a polygon's interior is always a valid position for the
    /// agent's center. A radius of zero disables the erosion.
    pub agent_radius: f32,

    /// The height of the agent. `[Limit: > 0] [Units: wu]`
    ///
    /// Open space with less vertical clearance than this is not walkable.
    /// It's often a good idea to add a little padding here; an agent that is
    /// 1.8 world units tall might want to use 2.0.
    pub agent_height: f32,

    /// Maximum ledge height the agent can step up or down. `[Limit: >= 0] [Units: wu]`
    ///
    /// Allows the mesh to flow over low obstructions such as curbs and
    /// up/down stairways.
    pub agent_max_climb: f32,

    /// The minimum number of spans allowed to form an isolated region.
    /// `[Limit: >= 0] [Units: vx]`
    ///
    /// Watershed partitioning is prone to noise in the distance field;
    /// regions smaller than this are merged into a bordering region, or
    /// dropped entirely when nothing borders them. Useful for removing
    /// useless islands that form on top of tables, crates and the like.
    pub min_region_area: u16,

    /// The maximum distance a simplified contour may deviate from the raw
    /// region boundary. `[Limit: >= 0] [Units: vx]`
    ///
    /// Good values are in the range `[1.1, 1.5]`. Below that, sawtoothing
    /// appears along edges; above it, simplification starts cutting corners
    /// it shouldn't.
    pub contour_simplify_tolerance: f32,

    /// The maximum number of vertices per polygon in the baked navmesh.
    /// `[Limit: >= 3]`
    pub max_polygon_vertices: u16,

    /// How far a query position may be from the navmesh and still snap onto
    /// it. `[Limit: > 0] [Units: wu]`
    pub max_snap_distance: f32,
}

impl Default for NavMeshConfig {
    fn default() -> Self {
        Self {
            cell_size: 0.3,
            cell_height: 0.2,
            max_walkable_slope_degrees: 45.0,
            agent_radius: 0.6,
            agent_height: 2.0,
            agent_max_climb: 0.9,
            min_region_area: 8,
            contour_simplify_tolerance: 1.3,
            max_polygon_vertices: 6,
            max_snap_distance: 2.0,
        }
    }
}

impl NavMeshConfig {
    /// Checks all fields against their documented limits.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.cell_size > 0.0 && self.cell_size.is_finite()) {
            return Err(ConfigError::NonPositiveCellSize(self.cell_size));
        }
        if !(self.cell_height > 0.0 && self.cell_height.is_finite()) {
            return Err(ConfigError::NonPositiveCellHeight(self.cell_height));
        }
        if !(0.0..90.0).contains(&self.max_walkable_slope_degrees) {
            return Err(ConfigError::InvalidSlope(self.max_walkable_slope_degrees));
        }
        if !(self.agent_radius >= 0.0 && self.agent_radius.is_finite()) {
            return Err(ConfigError::InvalidAgentDimension("agent_radius"));
        }
        if !(self.agent_height > 0.0 && self.agent_height.is_finite()) {
            return Err(ConfigError::InvalidAgentDimension("agent_height"));
        }
        if !(self.agent_max_climb >= 0.0 && self.agent_max_climb.is_finite()) {
            return Err(ConfigError::InvalidAgentDimension("agent_max_climb"));
        }
        if !(self.contour_simplify_tolerance >= 0.0 && self.contour_simplify_tolerance.is_finite())
        {
            return Err(ConfigError::InvalidTolerance(
                self.contour_simplify_tolerance,
            ));
        }
        if self.max_polygon_vertices < 3 {
            return Err(ConfigError::TooFewPolygonVertices(
                self.max_polygon_vertices,
            ));
        }
        if !(self.max_snap_distance > 0.0 && self.max_snap_distance.is_finite()) {
            return Err(ConfigError::InvalidTolerance(self.max_snap_distance));
        }
        Ok(())
    }

    /// The agent height in heightfield cells, rounded up.
    #[inline]
    pub fn walkable_height_cells(&self) -> u16 {
        (self.agent_height / self.cell_height).ceil() as u16
    }

    /// The maximum climbable step in heightfield cells, rounded down.
    #[inline]
    pub fn walkable_climb_cells(&self) -> u16 {
        (self.agent_max_climb / self.cell_height).floor() as u16
    }

    /// The agent radius in heightfield cells, rounded up.
    #[inline]
    pub fn walkable_radius_cells(&self) -> u16 {
        (self.agent_radius / self.cell_size).ceil() as u16
    }
}

/// Errors raised by [`NavMeshConfig::validate`] before any build work starts.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// The xz-plane cell size must be a positive, finite number.
    #[error("cell_size must be positive, got {0}")]
    NonPositiveCellSize(f32),
    /// The y-axis cell size must be a positive, finite number.
    #[error("cell_height must be positive, got {0}")]
    NonPositiveCellHeight(f32),
    /// The walkable slope threshold must lie in `[0, 90)` degrees.
    #[error("max_walkable_slope_degrees must be in [0, 90), got {0}")]
    InvalidSlope(f32),
    /// An agent dimension is negative, zero where it may not be, or not finite.
    #[error("{0} is out of range")]
    InvalidAgentDimension(&'static str),
    /// A tolerance or distance field is negative or not finite.
    #[error("tolerance must be non-negative and finite, got {0}")]
    InvalidTolerance(f32),
    /// Polygons need at least 3 vertices.
    #[error("max_polygon_vertices must be at least 3, got {0}")]
    TooFewPolygonVertices(u16),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        NavMeshConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_non_positive_cells() {
        let mut config = NavMeshConfig {
            cell_size: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NonPositiveCellSize(_))
        ));
        config.cell_size = 0.3;
        config.cell_height = -0.1;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NonPositiveCellHeight(_))
        ));
    }

    #[test]
    fn rejects_degenerate_polygons() {
        let config = NavMeshConfig {
            max_polygon_vertices: 2,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::TooFewPolygonVertices(2))
        ));
    }

    #[test]
    fn derived_cell_counts_round_conservatively() {
        let config = NavMeshConfig::default();
        // 2.0 / 0.2 rounds up, 0.9 / 0.2 rounds down.
        assert_eq!(config.walkable_height_cells(), 10);
        assert_eq!(config.walkable_climb_cells(), 4);
        assert_eq!(config.walkable_radius_cells(), 2);
    }
}
