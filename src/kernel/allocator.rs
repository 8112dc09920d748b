use std::collections::BTreeMap;

use log::debug;

use super::{KernelError, Memory};

use crate::config::FitPolicy;

/// Contiguous region allocator over physical memory.
///
/// Free space is kept as a map from interval start to interval length.
/// Intervals are non-empty, disjoint and never touch each other, so every
/// release merges with its neighbours.
pub struct Allocator {
    free_map: BTreeMap<usize, usize>,
    policy: FitPolicy,
}

impl Allocator {
    /// Creates an allocator whose whole range `[0, size)` is free.
    pub fn new(size: usize, policy: FitPolicy) -> Allocator {
        let mut free_map = BTreeMap::new();
        if size > 0 {
            free_map.insert(0, size);
        }

        Allocator { free_map, policy }
    }

    pub fn policy(&self) -> FitPolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: FitPolicy) {
        self.policy = policy;
    }

    /// Free intervals as `(start, length)` in ascending address order.
    pub fn free_intervals(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.free_map.iter().map(|(&start, &length)| (start, length))
    }

    pub fn free_words(&self) -> usize {
        self.free_map.values().sum()
    }

    pub fn largest_free_interval(&self) -> usize {
        self.free_map.values().copied().max().unwrap_or(0)
    }

    /// Reserves `size` contiguous words and returns the base address.
    pub fn alloc(&mut self, size: usize) -> Result<usize, KernelError> {
        if size == 0 {
            return Err(KernelError::InvalidRequest);
        }

        let (start, length) = self.select(size).ok_or(KernelError::OutOfMemory {
            requested: size,
            largest_free: self.largest_free_interval(),
        })?;

        self.free_map.remove(&start);
        if length > size {
            self.free_map.insert(start + size, length - size);
        }

        debug!("{} allocated [{}, {}]", self.policy, start, start + size - 1);
        Ok(start)
    }

    /// Returns the inclusive region `[start, end]` to the free map and zeroes it.
    pub fn free(&mut self, memory: &mut Memory, start: usize, end: usize) -> Result<(), KernelError> {
        if start > end || end >= memory.size() {
            return Err(KernelError::InvalidRegion { start, end });
        }

        // Only the last interval starting at or before `end` can overlap.
        if let Some((&prev_start, &prev_length)) = self.free_map.range(..=end).next_back() {
            if prev_start + prev_length > start {
                return Err(KernelError::DoubleFree { start, end });
            }
        }

        memory.fill(start, end, 0)?;

        let mut merged_start = start;
        let mut merged_length = end - start + 1;

        if let Some((&prev_start, &prev_length)) = self.free_map.range(..start).next_back() {
            if prev_start + prev_length == start {
                self.free_map.remove(&prev_start);
                merged_start = prev_start;
                merged_length += prev_length;
            }
        }

        if let Some(next_length) = self.free_map.remove(&(end + 1)) {
            merged_length += next_length;
        }

        self.free_map.insert(merged_start, merged_length);

        debug!("freed [{}, {}], {} words free", start, end, self.free_words());
        Ok(())
    }

    fn select(&self, size: usize) -> Option<(usize, usize)> {
        let mut candidates = self.free_intervals().filter(|&(_, length)| length >= size);

        match self.policy {
            FitPolicy::FirstFit => candidates.next(),
            // min_by_key keeps the first minimum, which is the lowest address.
            FitPolicy::BestFit => candidates.min_by_key(|&(_, length)| length),
            FitPolicy::WorstFit => candidates.reduce(|best, candidate| if candidate.1 > best.1 { candidate } else { best }),
        }
    }

    /// Checks that intervals are non-empty, sorted, disjoint and coalesced.
    pub(crate) fn check_free_map(&self, memory_size: usize) -> Result<(), String> {
        let mut previous_end: Option<usize> = None;

        for (start, length) in self.free_intervals() {
            if length == 0 {
                return Err(format!("free interval at {} is empty", start));
            }
            if start + length > memory_size {
                return Err(format!("free interval ({}, {}) exceeds memory", start, length));
            }
            if let Some(previous_end) = previous_end {
                if start < previous_end {
                    return Err(format!("free interval at {} overlaps its predecessor", start));
                }
                if start == previous_end {
                    return Err(format!("free interval at {} is not coalesced", start));
                }
            }
            previous_end = Some(start + length);
        }

        Ok(())
    }
}
