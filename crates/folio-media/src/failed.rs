//! Sticky set of resources that failed to load or play.

use hashbrown::HashSet;

/// Result of scanning for the next playable index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    /// Index to load next.
    pub index: usize,
    /// Every index had failed; the set must be cleared when committing.
    pub reset: bool,
}

/// Indices that failed this session.
///
/// Membership is sticky. The only way out is the full reset that happens when
/// every index has failed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailedSet {
    indices: HashSet<usize>,
}

impl FailedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark an index failed. Returns false if it already was.
    pub fn insert(&mut self, index: usize) -> bool {
        self.indices.insert(index)
    }

    pub fn contains(&self, index: usize) -> bool {
        self.indices.contains(&index)
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn clear(&mut self) {
        self.indices.clear();
    }

    /// Whether every index in `0..len` has failed.
    pub fn is_full(&self, len: usize) -> bool {
        len > 0 && (0..len).all(|i| self.contains(i))
    }

    /// Failed indices in ascending order.
    pub fn sorted(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = self.indices.iter().copied().collect();
        indices.sort_unstable();
        indices
    }

    /// Scan forward from `current + 1`, wrapping, for an index that has not
    /// failed. When all `len` indices have failed the selection is
    /// `(current + 1) % len` with `reset` set.
    ///
    /// Does not mutate; the caller commits the reset together with the move.
    /// Returns `None` only for an empty list.
    pub fn select_after(&self, current: usize, len: usize) -> Option<Selection> {
        if len == 0 {
            return None;
        }

        let found = (1..=len)
            .map(|step| (current + step) % len)
            .find(|index| !self.contains(*index));

        Some(match found {
            Some(index) => Selection {
                index,
                reset: false,
            },
            None => Selection {
                index: (current + 1) % len,
                reset: true,
            },
        })
    }

    /// [`select_after`](Self::select_after) with the reset applied.
    pub fn next_available(&mut self, current: usize, len: usize) -> Option<usize> {
        let selection = self.select_after(current, len)?;
        if selection.reset {
            self.clear();
        }
        Some(selection.index)
    }
}
