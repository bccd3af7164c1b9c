//! Funnel string-pulling of a polygon corridor into a waypoint path.

use glam::Vec3;
use navmesh::NavMesh;

use crate::{astar::Corridor, service::Path};

/// Tightens a corridor into the geometrically direct path through its portal
/// edges.
///
/// The funnel keeps an apex and a left/right boundary point. Each portal
/// narrows the boundary where it can; when a portal endpoint sweeps past the
/// opposite boundary, the crossed boundary point is emitted as a waypoint,
/// becomes the new apex, and processing restarts from the portal after it.
/// The goal is always emitted last. A single-polygon corridor yields the
/// two-point path `[start, goal]`: both points lie in one convex polygon, so
/// the straight segment between them stays inside it.
///
/// # Panics
///
/// Panics if consecutive corridor polygons are not adjacent.
pub fn string_pull(mesh: &NavMesh, corridor: &Corridor, start: Vec3, goal: Vec3) -> Path {
    if corridor.len() <= 1 {
        return Path::new(vec![start, goal]);
    }

    let mut portals: Vec<(Vec3, Vec3)> = corridor
        .polygons
        .windows(2)
        .map(|pair| {
            mesh.portal(pair[0], pair[1])
                .expect("corridor polygons must be adjacent")
        })
        .collect();
    // The goal acts as a degenerate final portal.
    portals.push((goal, goal));

    let mut waypoints = vec![start];
    let (mut apex, mut left, mut right) = (start, portals[0].0, portals[0].1);
    let (mut apex_index, mut left_index, mut right_index) = (0usize, 0usize, 0usize);

    let mut i = 1;
    while i < portals.len() {
        let (portal_left, portal_right) = portals[i];

        // Tighten the right side.
        if tri_area_xz(apex, right, portal_right) <= 0.0 {
            if vequal_xz(apex, right) || tri_area_xz(apex, left, portal_right) >= 0.0 {
                right = portal_right;
                right_index = i;
            } else {
                // The right boundary swept over the left one: the left point
                // is a corner of the shortest path.
                waypoints.push(left);
                apex = left;
                apex_index = left_index;
                left = apex;
                right = apex;
                left_index = apex_index;
                right_index = apex_index;
                i = apex_index + 1;
                continue;
            }
        }

        // Tighten the left side.
        if tri_area_xz(apex, left, portal_left) >= 0.0 {
            if vequal_xz(apex, left) || tri_area_xz(apex, right, portal_left) <= 0.0 {
                left = portal_left;
                left_index = i;
            } else {
                waypoints.push(right);
                apex = right;
                apex_index = right_index;
                left = apex;
                right = apex;
                left_index = apex_index;
                right_index = apex_index;
                i = apex_index + 1;
                continue;
            }
        }

        i += 1;
    }

    if waypoints.last().is_none_or(|&last| !vequal_xz(last, goal)) {
        waypoints.push(goal);
    }
    Path::new(waypoints)
}

/// Twice the signed area of `abc` on the xz-plane; positive when `c` lies to
/// the right of `a -> b` seen from above.
fn tri_area_xz(a: Vec3, b: Vec3, c: Vec3) -> f32 {
    let ab = b - a;
    let ac = c - a;
    ab.x * ac.z - ab.z * ac.x
}

fn vequal_xz(a: Vec3, b: Vec3) -> bool {
    let dx = b.x - a.x;
    let dz = b.z - a.z;
    dx * dx + dz * dz < 1e-6
}

#[cfg(test)]
mod tests {
    use super::*;
    use navmesh::PolyId;

    fn corridor(ids: &[u32]) -> Corridor {
        Corridor {
            polygons: ids.iter().map(|&id| PolyId(id)).collect(),
        }
    }

    /// A row of unit quads along the x-axis.
    fn quad_strip(count: u32) -> NavMesh {
        let mut vertices = Vec::new();
        for x in 0..=count {
            vertices.push(Vec3::new(x as f32, 0.0, 0.0));
            vertices.push(Vec3::new(x as f32, 0.0, 1.0));
        }
        let polygons = (0..count)
            .map(|x| {
                let base = x * 2;
                vec![base, base + 1, base + 3, base + 2]
            })
            .collect();
        NavMesh::from_parts(vertices, polygons)
    }

    /// An L of three unit quads: two along x, one on top of the second.
    fn l_corner() -> NavMesh {
        let vertices = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 1.0),
            Vec3::new(2.0, 0.0, 0.0),
            Vec3::new(2.0, 0.0, 1.0),
            Vec3::new(1.0, 0.0, 2.0),
            Vec3::new(2.0, 0.0, 2.0),
        ];
        let polygons = vec![
            vec![0, 1, 3, 2],
            vec![2, 3, 5, 4],
            vec![3, 6, 7, 5],
        ];
        NavMesh::from_parts(vertices, polygons)
    }

    #[test]
    fn single_polygon_corridor_is_a_two_point_path() {
        let mesh = quad_strip(1);
        let start = Vec3::new(0.2, 0.0, 0.2);
        let goal = Vec3::new(0.8, 0.0, 0.8);
        let path = string_pull(&mesh, &corridor(&[0]), start, goal);
        assert_eq!(path.waypoints(), &[start, goal]);
    }

    #[test]
    fn straight_corridor_pulls_to_a_straight_line() {
        let mesh = quad_strip(5);
        let start = Vec3::new(0.5, 0.0, 0.5);
        let goal = Vec3::new(4.5, 0.0, 0.5);
        let path = string_pull(&mesh, &corridor(&[0, 1, 2, 3, 4]), start, goal);
        assert_eq!(path.waypoints(), &[start, goal]);
    }

    #[test]
    fn corner_emits_the_portal_vertex() {
        let mesh = l_corner();
        let start = Vec3::new(0.5, 0.0, 0.5);
        let goal = Vec3::new(1.2, 0.0, 1.8);
        let path = string_pull(&mesh, &corridor(&[0, 1, 2]), start, goal);
        assert_eq!(
            path.waypoints(),
            &[start, Vec3::new(1.0, 0.0, 1.0), goal]
        );
    }

    #[test]
    fn waypoint_count_is_bounded_by_corridor_length() {
        let mesh = l_corner();
        let start = Vec3::new(0.1, 0.0, 0.9);
        let goal = Vec3::new(1.9, 0.0, 1.9);
        let path = string_pull(&mesh, &corridor(&[0, 1, 2]), start, goal);
        assert!(path.len() <= 3 + 1);
    }

    #[test]
    fn waypoints_stay_on_the_corridor() {
        let mesh = l_corner();
        let ids = [0, 1, 2];
        let start = Vec3::new(0.5, 0.0, 0.5);
        let goal = Vec3::new(1.2, 0.0, 1.8);
        let path = string_pull(&mesh, &corridor(&ids), start, goal);
        for &waypoint in path.waypoints() {
            let on_mesh = ids.iter().any(|&id| {
                mesh.closest_point(PolyId(id), waypoint).distance(waypoint) < 1e-3
            });
            assert!(on_mesh, "waypoint {waypoint} left the corridor");
        }
    }
}
