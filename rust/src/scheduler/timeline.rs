//! Per-resource "next free tick" tracking with idle padding.

use crate::models::{Operation, ResourceId, Tick};
use crate::schedule::Schedule;

/// Next free tick of every resource, measured from an origin.
///
/// Invariant: each resource is covered without gaps from the origin up to
/// its next free tick. Gaps are only ever closed by [`ResourceTimeline::pad_until`].
#[derive(Clone, Debug)]
pub struct ResourceTimeline {
    origin: Tick,
    next_free: Vec<Tick>,
}

impl ResourceTimeline {
    pub fn new(num_resources: u32) -> Self {
        Self::starting_at(num_resources, 0)
    }

    /// Timeline whose relative ticks are offset by `origin` when written out.
    pub fn starting_at(num_resources: u32, origin: Tick) -> Self {
        Self {
            origin,
            next_free: vec![0; num_resources as usize],
        }
    }

    /// Relative next free tick of `resource`.
    #[inline]
    pub fn next_free(&self, resource: ResourceId) -> Tick {
        self.next_free[resource as usize]
    }

    /// Earliest relative tick at which every resource in `resources` is free.
    pub fn earliest_start(&self, resources: &[ResourceId]) -> Tick {
        resources
            .iter()
            .map(|&r| self.next_free(r))
            .max()
            .unwrap_or(0)
    }

    /// Latest next free tick over all resources.
    pub fn horizon(&self) -> Tick {
        self.next_free.iter().copied().max().unwrap_or(0)
    }

    /// Bring each resource up to `until`, appending a Delay for every gap.
    ///
    /// Returns the number of delays inserted.
    pub fn pad_until(&mut self, resources: &[ResourceId], until: Tick, schedule: &mut Schedule) -> usize {
        let mut inserted = 0;
        for &r in resources {
            let free = self.next_free[r as usize];
            if free < until {
                schedule.push(Operation::delay(until - free, r), self.origin + free, until - free, None);
                self.next_free[r as usize] = until;
                inserted += 1;
            }
        }
        inserted
    }

    /// Pad every resource up to `until`.
    pub fn pad_all(&mut self, until: Tick, schedule: &mut Schedule) -> usize {
        let all: Vec<ResourceId> = (0..self.next_free.len() as ResourceId).collect();
        self.pad_until(&all, until, schedule)
    }

    /// Mark `resources` busy for `[start, start + duration)`.
    pub fn occupy(&mut self, resources: &[ResourceId], start: Tick, duration: Tick) {
        for &r in resources {
            self.next_free[r as usize] = start + duration;
        }
    }
}
