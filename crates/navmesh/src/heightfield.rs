//! Compaction of the voxel grid into per-column open spans.
//!
//! The heightfield keeps only the open space an agent could occupy: for each
//! grid column, the contiguous vertical intervals above solid floors. All
//! later build stages work on spans; the raw voxels are discarded.

use std::collections::VecDeque;

use tracing::debug;

use crate::{
    math::{Aabb3d, DIR_OFFSET_X, DIR_OFFSET_Z},
    region::RegionId,
    voxel::VoxelGrid,
};

/// No ceiling above the span.
pub const OPEN_CEILING: u16 = u16::MAX;

const NOT_CONNECTED: u8 = u8::MAX;

/// A contiguous vertical interval of open space within one grid column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    /// The cell row of the span's floor, directly above its supporting solid voxel.
    pub floor: u16,
    /// The cell row of the first solid voxel above the floor,
    /// or [`OPEN_CEILING`] when the span is open to the sky.
    pub ceiling: u16,
    /// Whether an agent can stand in this span.
    pub walkable: bool,
    /// Per-direction layer index of the traversable neighbor span, if any.
    con: [u8; 4],
}

impl Span {
    /// The vertical clearance of the span in cells.
    #[inline]
    pub fn clearance(&self) -> u32 {
        if self.ceiling == OPEN_CEILING {
            u32::MAX
        } else {
            (self.ceiling - self.floor) as u32
        }
    }

    /// The layer index of the connected span in the neighbor column
    /// towards `dir`, if one exists.
    #[inline]
    pub(crate) fn con(&self, dir: usize) -> Option<u8> {
        (self.con[dir] != NOT_CONNECTED).then_some(self.con[dir])
    }
}

/// The contiguous range of spans belonging to one `(x, z)` grid cell.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Column {
    pub(crate) first: u32,
    pub(crate) count: u32,
}

/// The compacted open-span representation of a [`VoxelGrid`].
pub struct Heightfield {
    /// Cells along the x-axis.
    pub width: u32,
    /// Cells along the z-axis.
    pub depth: u32,
    /// The world-space bounds of the originating grid.
    pub aabb: Aabb3d,
    /// The size of each cell on the xz-plane.
    pub cell_size: f32,
    /// The size of each cell along the y-axis.
    pub cell_height: f32,
    columns: Vec<Column>,
    spans: Vec<Span>,
    /// Distance to the nearest non-walkable boundary, per span.
    pub(crate) dist: Vec<u16>,
    /// Assigned region per span. [`RegionId::NONE`] means unassigned.
    pub(crate) regions: Vec<RegionId>,
    /// The maximum value in the distance field.
    pub(crate) max_distance: u16,
    pub(crate) region_count: u16,
}

impl Heightfield {
    /// Compacts `grid` into per-column spans and links traversable neighbors.
    ///
    /// A span is walkable when its supporting voxel carries a walkable slope
    /// and its clearance is at least `walkable_height` cells. Two spans in
    /// adjacent columns are linked when their floors differ by at most
    /// `walkable_climb` cells and the overlap of their intervals leaves
    /// `walkable_height` cells of headroom.
    pub fn from_voxel_grid(grid: &VoxelGrid, walkable_height: u16, walkable_climb: u16) -> Self {
        let column_count = grid.width as usize * grid.depth as usize;
        let mut columns = vec![Column::default(); column_count];
        let mut spans = Vec::with_capacity(column_count);

        for z in 0..grid.depth {
            for x in 0..grid.width {
                let column = &mut columns[(x + z * grid.width) as usize];
                column.first = spans.len() as u32;

                let mut y = 0;
                while y < grid.height {
                    if !grid.voxel(x, y, z).is_solid() {
                        y += 1;
                        continue;
                    }
                    // Walk to the top of the solid run.
                    while y + 1 < grid.height && grid.voxel(x, y + 1, z).is_solid() {
                        y += 1;
                    }
                    let floor_walkable = grid.voxel(x, y, z).is_walkable();
                    let floor = y + 1;
                    // Find the ceiling: the next solid voxel above, if any.
                    let mut ceiling = OPEN_CEILING as u32;
                    for above in floor..grid.height {
                        if grid.voxel(x, above, z).is_solid() {
                            ceiling = above;
                            break;
                        }
                    }
                    let clearance = ceiling - floor;
                    spans.push(Span {
                        floor: floor as u16,
                        ceiling: if ceiling == OPEN_CEILING as u32 {
                            OPEN_CEILING
                        } else {
                            ceiling as u16
                        },
                        walkable: floor_walkable && clearance >= walkable_height as u32,
                        con: [NOT_CONNECTED; 4],
                    });
                    y = if ceiling == OPEN_CEILING as u32 {
                        grid.height
                    } else {
                        ceiling
                    };
                }
                column.count = spans.len() as u32 - column.first;
            }
        }

        let span_count = spans.len();
        let mut heightfield = Self {
            width: grid.width,
            depth: grid.depth,
            aabb: grid.aabb,
            cell_size: grid.cell_size,
            cell_height: grid.cell_height,
            columns,
            spans,
            dist: vec![0; span_count],
            regions: vec![RegionId::NONE; span_count],
            max_distance: 0,
            region_count: 0,
        };
        heightfield.link_neighbors(walkable_height, walkable_climb);
        debug!(
            spans = span_count,
            walkable = heightfield.walkable_span_count(),
            "compacted voxel grid into heightfield"
        );
        heightfield
    }

    fn link_neighbors(&mut self, walkable_height: u16, walkable_climb: u16) {
        for z in 0..self.depth {
            for x in 0..self.width {
                let column = self.column(x, z);
                for span_index in column.first..column.first + column.count {
                    for dir in 0..4 {
                        let nx = x as i32 + DIR_OFFSET_X[dir];
                        let nz = z as i32 + DIR_OFFSET_Z[dir];
                        if nx < 0 || nx >= self.width as i32 || nz < 0 || nz >= self.depth as i32 {
                            continue;
                        }
                        let neighbor_column = self.column(nx as u32, nz as u32);
                        let span = self.spans[span_index as usize].clone();
                        let mut link = NOT_CONNECTED;
                        for layer in 0..neighbor_column.count.min(NOT_CONNECTED as u32) {
                            let neighbor = &self.spans[(neighbor_column.first + layer) as usize];
                            if is_traversable(&span, neighbor, walkable_height, walkable_climb) {
                                link = layer as u8;
                                break;
                            }
                        }
                        self.spans[span_index as usize].con[dir] = link;
                    }
                }
            }
        }
    }

    /// The spans of the heightfield, in column order.
    #[inline]
    pub fn spans(&self) -> &[Span] {
        &self.spans
    }

    /// The total number of spans.
    #[inline]
    pub fn span_count(&self) -> usize {
        self.spans.len()
    }

    /// The number of walkable spans.
    pub fn walkable_span_count(&self) -> usize {
        self.spans.iter().filter(|span| span.walkable).count()
    }

    /// The region assigned to the span at `span_index`.
    #[inline]
    pub fn region(&self, span_index: usize) -> RegionId {
        self.regions[span_index]
    }

    /// The number of regions after growth and merging.
    #[inline]
    pub fn region_count(&self) -> u16 {
        self.region_count
    }

    #[inline]
    pub(crate) fn column(&self, x: u32, z: u32) -> Column {
        self.columns[(x + z * self.width) as usize]
    }

    /// The spans of the column at `(x, z)`, ordered by ascending floor.
    pub fn column_spans(&self, x: u32, z: u32) -> &[Span] {
        let column = self.column(x, z);
        &self.spans[column.first as usize..(column.first + column.count) as usize]
    }

    /// Global index of the connected neighbor of `span_index` towards `dir`.
    /// `x` and `z` are the coordinates of the column owning `span_index`.
    pub(crate) fn connection(
        &self,
        x: u32,
        z: u32,
        span_index: usize,
        dir: usize,
    ) -> Option<usize> {
        let layer = self.spans[span_index].con(dir)?;
        let nx = (x as i32 + DIR_OFFSET_X[dir]) as u32;
        let nz = (z as i32 + DIR_OFFSET_Z[dir]) as u32;
        Some((self.column(nx, nz).first + layer as u32) as usize)
    }

    /// Iterates `(x, z, span_index)` over all spans.
    pub(crate) fn iter_spans(&self) -> impl Iterator<Item = (u32, u32, usize)> + '_ {
        (0..self.depth).flat_map(move |z| {
            (0..self.width).flat_map(move |x| {
                let column = self.column(x, z);
                (column.first..column.first + column.count).map(move |i| (x, z, i as usize))
            })
        })
    }

    /// Shrinks the walkable area away from boundaries by `radius` cells, so
    /// that a polygon interior is always a valid agent center position.
    pub fn erode_walkable_area(&mut self, radius: u16) {
        if radius == 0 {
            return;
        }
        let mut boundary_distance = vec![u16::MAX; self.spans.len()];
        let mut queue = VecDeque::new();

        // Seed with boundary spans: walkable spans missing a traversable,
        // walkable neighbor in any cardinal direction.
        for (x, z, span_index) in self.iter_spans() {
            if !self.spans[span_index].walkable {
                continue;
            }
            let on_boundary = (0..4).any(|dir| {
                self.connection(x, z, span_index, dir)
                    .is_none_or(|neighbor| !self.spans[neighbor].walkable)
            });
            if on_boundary {
                boundary_distance[span_index] = 0;
                queue.push_back((x, z, span_index));
            }
        }

        while let Some((x, z, span_index)) = queue.pop_front() {
            let next_distance = boundary_distance[span_index] + 1;
            for dir in 0..4 {
                let Some(neighbor) = self.connection(x, z, span_index, dir) else {
                    continue;
                };
                if !self.spans[neighbor].walkable || boundary_distance[neighbor] <= next_distance {
                    continue;
                }
                boundary_distance[neighbor] = next_distance;
                let nx = (x as i32 + DIR_OFFSET_X[dir]) as u32;
                let nz = (z as i32 + DIR_OFFSET_Z[dir]) as u32;
                queue.push_back((nx, nz, neighbor));
            }
        }

        let mut eroded = 0usize;
        for (span, &distance) in self.spans.iter_mut().zip(&boundary_distance) {
            if span.walkable && distance < radius {
                span.walkable = false;
                eroded += 1;
            }
        }
        debug!(radius, eroded, "eroded walkable area");
    }
}

/// Whether an agent can step from `span` to `neighbor`.
fn is_traversable(span: &Span, neighbor: &Span, walkable_height: u16, walkable_climb: u16) -> bool {
    let step = (neighbor.floor as i32 - span.floor as i32).unsigned_abs();
    if step > walkable_climb as u32 {
        return false;
    }
    let top = span.ceiling.min(neighbor.ceiling);
    let bottom = span.floor.max(neighbor.floor);
    let headroom = if top == OPEN_CEILING {
        u32::MAX
    } else {
        (top as i32 - bottom as i32).max(0) as u32
    };
    headroom >= walkable_height as u32
}
