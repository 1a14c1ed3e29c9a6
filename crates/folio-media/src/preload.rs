//! Bookkeeping for resources loaded ahead of their turn.

use hashbrown::HashSet;

use crate::failed::FailedSet;

/// Tracks in-flight preload handles and resources confirmed ready.
///
/// A handle is in flight from the moment a preload starts until it is
/// confirmed ready or failed, at which point it must be released.
#[derive(Debug, Clone, Default)]
pub struct Preloader {
    window: usize,
    in_flight: HashSet<usize>,
    ready: HashSet<usize>,
}

impl Preloader {
    /// Create a preloader that keeps `window` upcoming resources warm.
    pub fn new(window: usize) -> Self {
        Self {
            window,
            ..Default::default()
        }
    }

    /// Indices to start preloading now.
    ///
    /// Looks at the next `window` viable indices after `current` and returns
    /// those neither ready nor already in flight, marking them in flight.
    pub fn plan(&mut self, current: usize, len: usize, failed: &FailedSet) -> Vec<usize> {
        if len == 0 {
            return Vec::new();
        }

        let upcoming: Vec<usize> = (1..len)
            .map(|step| (current + step) % len)
            .filter(|index| !failed.contains(*index))
            .take(self.window)
            .collect();

        let mut started = Vec::new();
        for index in upcoming {
            if self.ready.contains(&index) || self.in_flight.contains(&index) {
                continue;
            }
            self.in_flight.insert(index);
            started.push(index);
        }
        started
    }

    /// Record a preload as ready. Returns true if its handle needs releasing.
    pub fn confirm_ready(&mut self, index: usize) -> bool {
        let was_in_flight = self.in_flight.remove(&index);
        self.ready.insert(index);
        was_in_flight
    }

    /// Record a preload as failed. Returns true if its handle needs releasing.
    pub fn confirm_failed(&mut self, index: usize) -> bool {
        self.ready.remove(&index);
        self.in_flight.remove(&index)
    }

    /// Drop the ready mark for an index that later failed to play.
    pub fn forget(&mut self, index: usize) {
        self.ready.remove(&index);
    }

    /// Take every in-flight handle, in ascending order.
    pub fn release_all(&mut self) -> Vec<usize> {
        let mut released: Vec<usize> = self.in_flight.drain().collect();
        released.sort_unstable();
        released
    }

    pub fn is_ready(&self, index: usize) -> bool {
        self.ready.contains(&index)
    }

    pub fn is_in_flight(&self, index: usize) -> bool {
        self.in_flight.contains(&index)
    }

    /// In-flight indices in ascending order.
    pub fn in_flight(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = self.in_flight.iter().copied().collect();
        indices.sort_unstable();
        indices
    }
}
