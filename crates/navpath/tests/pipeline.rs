//! End-to-end scenarios over the full bake and query pipeline.

use glam::Vec3;
use navmesh::{
    Heightfield, NavMesh, NavMeshConfig, TriMesh, Voxelizer, build_navmesh,
};
use navpath::{NavigationService, PathRequest, QueryError};

fn test_config() -> NavMeshConfig {
    NavMeshConfig {
        cell_size: 1.0,
        cell_height: 0.2,
        agent_radius: 0.0,
        agent_height: 1.0,
        agent_max_climb: 0.4,
        min_region_area: 8,
        ..Default::default()
    }
}

/// A flat walkable plane covering `[0, size]` on x and z at `y = 0`.
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

/// A vertical wall from `x0` to `x1` at depth `z`, too steep to walk.
fn wall(x0: f32, x1: f32, z: f32, height: f32) -> TriMesh {
    TriMesh::from_buffers(
        &[[x0, 0.0, z], [x1, 0.0, z], [x1, height, z], [x0, height, z]],
        &[0, 1, 2, 0, 2, 3],
    )
}

/// Runs the build stages up to region detection, for region assertions.
fn regions_of(mesh: &TriMesh, config: &NavMeshConfig) -> Heightfield {
    let grid = Voxelizer::new(config).voxelize(mesh).unwrap();
    let mut heightfield = Heightfield::from_voxel_grid(
        &grid,
        config.walkable_height_cells(),
        config.walkable_climb_cells(),
    );
    heightfield.erode_walkable_area(config.walkable_radius_cells());
    heightfield.build_distance_field();
    heightfield.build_regions(config.min_region_area).unwrap();
    heightfield
}

#[test]
fn flat_plane_bakes_one_region_and_answers_a_direct_path() -> anyhow::Result<()> {
    let config = test_config();
    let mesh = plane(10.0);

    let heightfield = regions_of(&mesh, &config);
    assert_eq!(heightfield.region_count(), 1);

    let service = NavigationService::new(config);
    service.bake(&mesh)?;
    let navmesh = service.navmesh().unwrap();
    assert!(navmesh.polygon_count() >= 1);

    let path = service.find_path(&PathRequest::new(
        Vec3::new(0.5, 0.0, 0.5),
        Vec3::new(9.5, 0.0, 9.5),
    ))?;
    assert!(path.len() >= 2);

    let straight = (Vec3::new(9.5, 0.0, 9.5) - Vec3::new(0.5, 0.0, 0.5)).length();
    assert!(
        path.total_length() <= straight * 1.05,
        "path length {} exceeds 5% of the straight-line distance {}",
        path.total_length(),
        straight
    );
    Ok(())
}

#[test]
fn start_and_goal_in_one_polygon_yield_the_two_point_path() -> anyhow::Result<()> {
    let service = NavigationService::new(test_config());
    service.bake(&plane(10.0))?;

    let start = Vec3::new(3.2, 0.0, 3.2);
    let goal = Vec3::new(6.8, 0.0, 4.1);
    let path = service.find_path(&PathRequest::new(start, goal))?;
    assert_eq!(path.len(), 2);
    let waypoints = path.waypoints();
    assert_eq!(
        (waypoints[0].x, waypoints[0].z),
        (start.x, start.z),
        "first waypoint snaps under the start"
    );
    assert_eq!((waypoints[1].x, waypoints[1].z), (goal.x, goal.z));
    Ok(())
}

#[test]
fn full_width_wall_splits_the_mesh_and_proves_no_path() -> anyhow::Result<()> {
    let config = test_config();
    let mut mesh = plane(10.0);
    mesh.extend(wall(0.0, 10.0, 5.5, 2.0));

    let heightfield = regions_of(&mesh, &config);
    assert_eq!(heightfield.region_count(), 2);

    let service = NavigationService::new(config);
    service.bake(&mesh)?;
    let result = service.find_path(&PathRequest::new(
        Vec3::new(2.5, 0.0, 2.5),
        Vec3::new(2.5, 0.0, 7.5),
    ));
    assert_eq!(result.err(), Some(QueryError::NoPath));
    Ok(())
}

/// A plane with two staggered walls, forcing an S-shaped detour.
fn snake_level() -> TriMesh {
    let mut mesh = plane(10.0);
    mesh.extend(wall(0.0, 8.0, 3.5, 2.0));
    mesh.extend(wall(2.0, 10.0, 6.5, 2.0));
    mesh
}

#[test]
fn iteration_cap_is_distinct_from_no_path() -> anyhow::Result<()> {
    let service = NavigationService::new(test_config());
    service.bake(&snake_level())?;

    let start = Vec3::new(0.5, 0.0, 0.5);
    let goal = Vec3::new(0.5, 0.0, 9.5);

    // The detour is reachable, so a starved search must report its budget,
    // not disconnection.
    let capped = service.find_path(&PathRequest::new(start, goal).with_max_iterations(1));
    assert_eq!(capped.err(), Some(QueryError::IterationLimitExceeded));

    let path = service.find_path(&PathRequest::new(start, goal))?;
    let straight = (goal - start).length();
    assert!(
        path.total_length() > straight * 1.5,
        "the snake detour must be much longer than the straight line"
    );
    Ok(())
}

#[test]
fn detour_waypoints_stay_on_the_mesh() -> anyhow::Result<()> {
    let service = NavigationService::new(test_config());
    service.bake(&snake_level())?;
    let navmesh = service.navmesh().unwrap();

    let path = service.find_path(&PathRequest::new(
        Vec3::new(0.5, 0.0, 0.5),
        Vec3::new(0.5, 0.0, 9.5),
    ))?;
    assert!(path.len() >= 2);
    for &waypoint in path.waypoints() {
        assert!(
            navmesh.nearest_polygon(waypoint, 0.2).is_some(),
            "waypoint {waypoint} is off the mesh"
        );
    }
    Ok(())
}

#[test]
fn baked_adjacency_is_symmetric() -> anyhow::Result<()> {
    let navmesh = build_navmesh(&snake_level(), &test_config())?;
    assert_adjacency_symmetric(&navmesh);
    Ok(())
}

fn assert_adjacency_symmetric(navmesh: &NavMesh) {
    for (index, polygon) in navmesh.polygons().iter().enumerate() {
        for (edge, neighbor) in polygon.neighbors.iter().enumerate() {
            let Some(neighbor) = neighbor else { continue };
            let a = polygon.vertices[edge];
            let b = polygon.vertices[(edge + 1) % polygon.vertices.len()];
            let other = navmesh.polygon(*neighbor);
            let back_edge = other
                .neighbors
                .iter()
                .position(|&n| n.map(|id| id.0 as usize) == Some(index))
                .expect("adjacency must link back");
            let c = other.vertices[back_edge];
            let d = other.vertices[(back_edge + 1) % other.vertices.len()];
            assert_eq!(
                (a.min(b), a.max(b)),
                (c.min(d), c.max(d)),
                "neighbors must share the same vertex pair"
            );
        }
    }
}

#[test]
fn rebake_swaps_the_handle_without_touching_the_old_mesh() -> anyhow::Result<()> {
    let service = NavigationService::new(test_config());
    service.bake(&plane(10.0))?;
    let first = service.navmesh().unwrap();
    let first_polygons = first.polygon_count();

    service.bake(&snake_level())?;
    let second = service.navmesh().unwrap();
    assert!(!std::sync::Arc::ptr_eq(&first, &second));
    // The old handle still answers queries for whoever holds it.
    assert_eq!(first.polygon_count(), first_polygons);
    Ok(())
}

#[test]
fn queries_run_concurrently_against_a_shared_mesh() -> anyhow::Result<()> {
    let service = std::sync::Arc::new(NavigationService::new(test_config()));
    service.bake(&plane(10.0))?;

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let service = std::sync::Arc::clone(&service);
            std::thread::spawn(move || {
                let offset = i as f32 * 0.5;
                service.find_path(&PathRequest::new(
                    Vec3::new(0.5 + offset, 0.0, 0.5),
                    Vec3::new(9.5 - offset, 0.0, 9.5),
                ))
            })
        })
        .collect();
    for handle in handles {
        let path = handle.join().unwrap()?;
        assert!(path.len() >= 2);
    }
    Ok(())
}
