//! Watershed region partitioning of the walkable surface.
//!
//! Regions grow outward from the most interior spans of the distance field,
//! so region boundaries settle near local distance minima and stay smooth.

use std::{cmp::Reverse, collections::VecDeque};

use tracing::{debug, warn};

use crate::{builder::BuildError, heightfield::Heightfield};

/// Identifier of a region of connected walkable spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct RegionId(pub u16);

impl RegionId {
    /// The id of spans that belong to no region, i.e. are not walkable or
    /// were dropped during merging.
    pub const NONE: Self = Self(0);

    /// Whether this is [`RegionId::NONE`].
    #[inline]
    pub fn is_none(&self) -> bool {
        *self == Self::NONE
    }
}

impl From<u16> for RegionId {
    fn from(value: u16) -> Self {
        RegionId(value)
    }
}

impl Heightfield {
    /// Computes, for every walkable span, the distance in cells to the
    /// nearest non-walkable boundary, with a multi-source breadth-first
    /// transform seeded at the boundary spans.
    pub fn build_distance_field(&mut self) {
        let mut dist = vec![u16::MAX; self.span_count()];
        let mut queue = VecDeque::new();

        for (x, z, span_index) in self.iter_spans() {
            if !self.spans()[span_index].walkable {
                continue;
            }
            let on_boundary = (0..4).any(|dir| {
                self.connection(x, z, span_index, dir)
                    .is_none_or(|neighbor| !self.spans()[neighbor].walkable)
            });
            if on_boundary {
                dist[span_index] = 0;
                queue.push_back((x, z, span_index));
            }
        }

        let mut max_distance = 0;
        while let Some((x, z, span_index)) = queue.pop_front() {
            let next_distance = dist[span_index] + 1;
            for dir in 0..4 {
                let Some(neighbor) = self.connection(x, z, span_index, dir) else {
                    continue;
                };
                if !self.spans()[neighbor].walkable || dist[neighbor] <= next_distance {
                    continue;
                }
                dist[neighbor] = next_distance;
                max_distance = max_distance.max(next_distance);
                let nx = (x as i32 + crate::math::DIR_OFFSET_X[dir]) as u32;
                let nz = (z as i32 + crate::math::DIR_OFFSET_Z[dir]) as u32;
                queue.push_back((nx, nz, neighbor));
            }
        }

        self.dist = dist;
        self.max_distance = max_distance;
        debug!(max_distance, "built distance field");
    }

    /// Grows regions over the walkable spans with a watershed pass, then
    /// merges regions smaller than `min_region_area` spans into their largest
    /// bordering neighbor, dropping those with no neighbor at all.
    ///
    /// Requires [`Heightfield::build_distance_field`] to have run.
    pub fn build_regions(&mut self, min_region_area: u16) -> Result<(), BuildError> {
        let coords: Vec<(u32, u32, usize)> = self.iter_spans().collect();

        // Process spans from the most interior outward. Ties resolve in span
        // order, which is deterministic for a given input.
        let mut order: Vec<usize> = (0..coords.len())
            .filter(|&i| self.spans()[coords[i].2].walkable)
            .collect();
        if order.is_empty() {
            return Err(BuildError::NoWalkableSpans);
        }
        order.sort_unstable_by_key(|&i| (Reverse(self.dist[coords[i].2]), i));

        let mut next_region = 1u16;
        for &i in &order {
            let (x, z, span_index) = coords[i];
            // Join the lowest-numbered region already grown next to this
            // span, or seed a new one at this distance peak.
            let mut best: Option<RegionId> = None;
            for dir in 0..4 {
                let Some(neighbor) = self.connection(x, z, span_index, dir) else {
                    continue;
                };
                let region = self.regions[neighbor];
                if region.is_none() || !self.spans()[neighbor].walkable {
                    continue;
                }
                best = Some(best.map_or(region, |current| current.min(region)));
            }
            self.regions[span_index] = best.unwrap_or_else(|| {
                let seeded = RegionId(next_region);
                next_region += 1;
                seeded
            });
        }

        self.merge_small_regions(&coords, next_region, min_region_area);
        self.compact_region_ids(next_region);
        if self.region_count == 0 {
            return Err(BuildError::NoRegions);
        }
        debug!(regions = self.region_count, "built regions");
        Ok(())
    }

    /// Repeatedly folds the smallest undersized region into its largest
    /// bordering neighbor. One merge per pass keeps the border statistics
    /// honest; the loop terminates because each merge removes a region.
    fn merge_small_regions(
        &mut self,
        coords: &[(u32, u32, usize)],
        id_upper_bound: u16,
        min_region_area: u16,
    ) {
        loop {
            let counts = self.region_span_counts(id_upper_bound);
            let mut borders: Vec<(RegionId, u32)> =
                vec![(RegionId::NONE, 0); id_upper_bound as usize];
            for &(x, z, span_index) in coords {
                let region = self.regions[span_index];
                if region.is_none() {
                    continue;
                }
                for dir in 0..4 {
                    let Some(neighbor) = self.connection(x, z, span_index, dir) else {
                        continue;
                    };
                    let other = self.regions[neighbor];
                    if other.is_none() || other == region {
                        continue;
                    }
                    let entry = &mut borders[region.0 as usize];
                    if counts[other.0 as usize] > entry.1 {
                        *entry = (other, counts[other.0 as usize]);
                    }
                }
            }

            let merge = (1..id_upper_bound)
                .filter(|&r| {
                    let count = counts[r as usize];
                    count > 0
                        && count < min_region_area as u32
                        && !borders[r as usize].0.is_none()
                })
                .min_by_key(|&r| counts[r as usize]);
            let Some(region) = merge else {
                break;
            };
            let target = borders[region as usize].0;
            debug!(from = region, into = target.0, "merging undersized region");
            for id in &mut self.regions {
                if *id == RegionId(region) {
                    *id = target;
                }
            }
        }

        // Whatever undersized regions remain have no walkable neighbors.
        let counts = self.region_span_counts(id_upper_bound);
        for r in 1..id_upper_bound {
            let count = counts[r as usize];
            if count > 0 && count < min_region_area as u32 {
                warn!(region = r, spans = count, "dropping undersized isolated region");
                for id in &mut self.regions {
                    if *id == RegionId(r) {
                        *id = RegionId::NONE;
                    }
                }
            }
        }
    }

    fn region_span_counts(&self, id_upper_bound: u16) -> Vec<u32> {
        let mut counts = vec![0u32; id_upper_bound as usize];
        for id in &self.regions {
            if !id.is_none() {
                counts[id.0 as usize] += 1;
            }
        }
        counts
    }

    /// Renumbers surviving regions to a contiguous `1..=n`.
    fn compact_region_ids(&mut self, id_upper_bound: u16) {
        let mut remap = vec![RegionId::NONE; id_upper_bound as usize];
        let mut next = 0u16;
        for id in &mut self.regions {
            if id.is_none() {
                continue;
            }
            let mapped = &mut remap[id.0 as usize];
            if mapped.is_none() {
                next += 1;
                *mapped = RegionId(next);
            }
            *id = *mapped;
        }
        self.region_count = next;
    }

    /// The ids of all surviving regions, ascending.
    pub fn region_ids(&self) -> impl Iterator<Item = RegionId> + '_ {
        (1..=self.region_count).map(RegionId)
    }
}
