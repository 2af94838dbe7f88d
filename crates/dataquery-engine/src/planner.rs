//! Splitting a file into byte-range parts.

use dataquery_types::DownloadPart;

/// Default number of parts per file.
pub const DEFAULT_PARTS_PER_FILE: usize = 5;

/// Default smallest part worth a separate request (2 MiB).
pub const DEFAULT_MIN_PART_SIZE: u64 = 2 * 1024 * 1024;

/// Parts planned for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPlan {
    /// Parts in offset order.
    pub parts: Vec<DownloadPart>,
    /// True when parts are requested with `Range` headers.
    pub ranged: bool,
}

impl ChunkPlan {
    /// A plan consisting of one whole-body part.
    #[must_use]
    pub fn whole_body(total_bytes: Option<u64>) -> Self {
        Self {
            parts: vec![DownloadPart::whole_body(total_bytes)],
            ranged: false,
        }
    }

    /// Number of parts.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.parts.len()
    }

    /// Always false; every plan has at least one part.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

/// Decides how many parts a file is fetched in and which bytes each covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlanner {
    requested_parts: usize,
    min_part_size: u64,
}

impl ChunkPlanner {
    /// Creates a planner. A `min_part_size` of zero is treated as one byte.
    #[must_use]
    pub const fn new(requested_parts: usize, min_part_size: u64) -> Self {
        Self {
            requested_parts,
            min_part_size,
        }
    }

    /// Plans the parts of a file.
    ///
    /// Unknown size, zero size or no range support yields a single whole-body
    /// part. Otherwise parts are evenly sized, the last one absorbing the
    /// remainder, and no part is smaller than `min_part_size` unless the file
    /// itself is.
    #[must_use]
    pub fn plan(&self, total_bytes: Option<u64>, supports_range: bool) -> ChunkPlan {
        let total = match total_bytes {
            Some(total) if total > 0 && supports_range => total,
            _ => return ChunkPlan::whole_body(total_bytes),
        };

        let count = self.effective_parts(total);
        let size = total / count;
        let parts = (0..count)
            .map(|i| {
                let start = i * size;
                let end = if i + 1 == count {
                    total - 1
                } else {
                    start + size - 1
                };
                // count fits in usize: bounded by requested_parts
                DownloadPart::ranged(i as usize, start, end)
            })
            .collect();

        ChunkPlan {
            parts,
            ranged: true,
        }
    }

    /// Number of parts used for a file of `total` bytes with range support.
    #[must_use]
    pub fn effective_parts(&self, total: u64) -> u64 {
        let min = self.min_part_size.max(1);
        let requested = (self.requested_parts as u64).max(1);
        requested.min(total / min).max(1)
    }
}

impl Default for ChunkPlanner {
    fn default() -> Self {
        Self::new(DEFAULT_PARTS_PER_FILE, DEFAULT_MIN_PART_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_partition(plan: &ChunkPlan, total: u64) {
        let mut next = 0;
        for (i, part) in plan.parts.iter().enumerate() {
            assert_eq!(part.index, i);
            assert_eq!(part.start_offset, next);
            let end = part.end_offset.unwrap();
            assert!(end >= part.start_offset);
            next = end + 1;
        }
        assert_eq!(next, total);
    }

    #[test]
    fn test_even_split() {
        let plan = ChunkPlanner::new(4, 1024).plan(Some(10_000_000), true);
        assert!(plan.ranged);
        assert_eq!(plan.len(), 4);
        for part in &plan.parts {
            assert_eq!(part.len(), Some(2_500_000));
        }
        assert_partition(&plan, 10_000_000);
    }

    #[test]
    fn test_remainder_goes_to_last_part() {
        let plan = ChunkPlanner::new(3, 1).plan(Some(10), true);
        let lens: Vec<_> = plan.parts.iter().map(|p| p.len().unwrap()).collect();
        assert_eq!(lens, vec![3, 3, 4]);
        assert_partition(&plan, 10);
    }

    #[test]
    fn test_small_file_single_part() {
        let plan = ChunkPlanner::new(5, 1024).plan(Some(1000), true);
        assert_eq!(plan.len(), 1);
        assert!(plan.ranged);
        assert_partition(&plan, 1000);
    }

    #[test]
    fn test_min_part_size_limits_count() {
        let planner = ChunkPlanner::new(8, 100);
        assert_eq!(planner.effective_parts(350), 3);
        assert_partition(&planner.plan(Some(350), true), 350);
    }

    #[test]
    fn test_whole_body_fallbacks() {
        let planner = ChunkPlanner::new(5, 1);
        for (total, ranges) in [(None, true), (Some(0), true), (Some(5000), false)] {
            let plan = planner.plan(total, ranges);
            assert_eq!(plan.len(), 1);
            assert!(!plan.ranged);
            assert!(!plan.parts[0].ranged);
        }
        assert_eq!(planner.plan(Some(5000), false).parts[0].end_offset, Some(4999));
    }

    #[test]
    fn test_zero_min_part_size() {
        let plan = ChunkPlanner::new(4, 0).plan(Some(3), true);
        assert_eq!(plan.len(), 3);
        assert_partition(&plan, 3);
    }

    #[test]
    fn test_partition_holds_across_sizes() {
        for total in [1u64, 2, 7, 1023, 1024, 1025, 4_194_303, 10_485_761] {
            for parts in 1..=9 {
                let plan = ChunkPlanner::new(parts, 512).plan(Some(total), true);
                assert!(plan.len() <= parts);
                assert_partition(&plan, total);
            }
        }
    }
}
