//! Block planning and adaptive block sizing

use std::ops::Range;
use std::time::Duration;

use tracing::info;

use crate::config::{MAX_BLOCK_SIZE, MIN_BLOCK_SIZE};
use crate::error::{UploadError, UploadResult};

/// Digits in a block ordinal; covers up to 999,999 blocks (~8TB at 8MB blocks)
pub const BLOCK_ID_DIGITS: usize = 6;
/// Highest block count representable with fixed-width ids
pub const MAX_BLOCK_COUNT: u64 = 999_999;
/// Durations needed before a resize decision is made
pub const MIN_ADAPT_SAMPLES: usize = 5;
/// Mean block duration below which block size is doubled
const FAST_BLOCK_THRESHOLD: Duration = Duration::from_secs(1);
/// Mean block duration above which block size is halved
const SLOW_BLOCK_THRESHOLD: Duration = Duration::from_secs(5);

/// Upload status of a single block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStatus {
    Pending,
    InFlight,
    Done,
    Failed,
}

/// A contiguous byte range of the object with its store identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub index: u32,
    pub id: String,
    pub range: Range<u64>,
    pub status: BlockStatus,
}

impl Block {
    pub fn len(&self) -> u64 {
        self.range.end - self.range.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Fixed-width block identifier for an ordinal
pub fn block_id(index: u32) -> String {
    format!("block{:0width$}", index, width = BLOCK_ID_DIGITS)
}

/// Splits objects into blocks and carries the adaptive block size hint
#[derive(Debug, Clone)]
pub struct BlockPlanner {
    block_size: u64,
    min_block_size: u64,
    max_block_size: u64,
}

impl Default for BlockPlanner {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_BLOCK_SIZE)
    }
}

impl BlockPlanner {
    pub fn new(block_size: u64) -> Self {
        Self::with_bounds(block_size, MIN_BLOCK_SIZE, MAX_BLOCK_SIZE)
    }

    /// Planner whose hint starts at `block_size` clamped into `[min, max]`
    pub fn with_bounds(block_size: u64, min_block_size: u64, max_block_size: u64) -> Self {
        let max_block_size = max_block_size.max(min_block_size);
        Self {
            block_size: block_size.clamp(min_block_size, max_block_size),
            min_block_size,
            max_block_size,
        }
    }

    /// Current block size hint used for the next plan
    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    /// Split `[0, object_size)` into ceil(object_size / block_size) blocks
    pub fn plan(object_size: u64, block_size: u64) -> UploadResult<Vec<Block>> {
        if object_size == 0 {
            return Err(UploadError::validation("Cannot upload an empty object"));
        }
        if block_size == 0 {
            return Err(UploadError::validation(
                "Block size must be greater than zero",
            ));
        }

        let count = object_size.div_ceil(block_size);
        if count > MAX_BLOCK_COUNT {
            return Err(UploadError::validation(format!(
                "Object needs {} blocks, more than the {} supported per upload",
                count, MAX_BLOCK_COUNT
            )));
        }

        let blocks = (0..count)
            .map(|i| {
                let start = i * block_size;
                let end = (start + block_size).min(object_size);
                Block {
                    index: i as u32,
                    id: block_id(i as u32),
                    range: start..end,
                    status: BlockStatus::Pending,
                }
            })
            .collect();

        Ok(blocks)
    }

    /// Plan with the planner's current block size
    pub fn plan_object(&self, object_size: u64) -> UploadResult<Vec<Block>> {
        Self::plan(object_size, self.block_size)
    }

    /// Adjust the block size hint from observed per-block upload durations.
    /// Blocks that are already planned keep their boundaries.
    pub fn adapt(&mut self, durations: &[Duration]) -> u64 {
        if durations.len() < MIN_ADAPT_SAMPLES {
            return self.block_size;
        }

        let total: Duration = durations.iter().sum();
        let mean = total / durations.len() as u32;
        let old = self.block_size;

        // Each signal only moves the hint in its own direction
        if mean < FAST_BLOCK_THRESHOLD {
            self.block_size = (old * 2).min(self.max_block_size).max(old);
        } else if mean > SLOW_BLOCK_THRESHOLD {
            self.block_size = (old / 2).max(self.min_block_size).min(old);
        }

        if self.block_size != old {
            info!(
                "Block size adapted: {}KB -> {}KB (mean block time {}ms)",
                old / 1024,
                self.block_size / 1024,
                mean.as_millis()
            );
        }

        self.block_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MIB;

    fn durations(ms: u64, n: usize) -> Vec<Duration> {
        vec![Duration::from_millis(ms); n]
    }

    #[test]
    fn test_block_id_fixed_width() {
        assert_eq!(block_id(0), "block000000");
        assert_eq!(block_id(7), "block000007");
        assert_eq!(block_id(999_999).len(), block_id(0).len());
    }

    #[test]
    fn test_plan_exact_multiple() {
        let blocks = BlockPlanner::plan(4 * MIB, MIB).unwrap();
        assert_eq!(blocks.len(), 4);
        assert!(blocks.iter().all(|b| b.len() == MIB));
    }

    #[test]
    fn test_plan_short_last_block() {
        let blocks = BlockPlanner::plan(10, 4).unwrap();
        let ranges: Vec<_> = blocks.iter().map(|b| b.range.clone()).collect();
        assert_eq!(ranges, vec![0..4, 4..8, 8..10]);
    }

    #[test]
    fn test_plan_rejects_empty_object() {
        assert!(matches!(
            BlockPlanner::plan(0, MIB),
            Err(UploadError::Validation { .. })
        ));
    }

    #[test]
    fn test_plan_rejects_zero_block_size() {
        assert!(BlockPlanner::plan(10, 0).is_err());
    }

    #[test]
    fn test_plan_rejects_too_many_blocks() {
        assert!(BlockPlanner::plan(MAX_BLOCK_COUNT + 1, 1).is_err());
    }

    #[test]
    fn test_plan_partitions_object() {
        for &(size, block) in &[(1u64, 1u64), (17, 5), (1000, 999), (1000, 1000), (12345, 64)] {
            let blocks = BlockPlanner::plan(size, block).unwrap();
            assert_eq!(blocks.len() as u64, size.div_ceil(block));
            let mut expected_start = 0;
            for (i, b) in blocks.iter().enumerate() {
                assert_eq!(b.index as usize, i);
                assert_eq!(b.range.start, expected_start);
                assert!(b.len() > 0 && b.len() <= block);
                assert_eq!(b.status, BlockStatus::Pending);
                expected_start = b.range.end;
            }
            assert_eq!(expected_start, size);
        }
    }

    #[test]
    fn test_adapt_doubles_when_fast() {
        let mut planner = BlockPlanner::new(8 * MIB);
        assert_eq!(planner.adapt(&durations(500, 5)), 16 * MIB);
        // Capped at the upper bound
        assert_eq!(planner.adapt(&durations(500, 5)), 16 * MIB);
    }

    #[test]
    fn test_adapt_halves_when_slow() {
        let mut planner = BlockPlanner::new(8 * MIB);
        assert_eq!(planner.adapt(&durations(6000, 5)), 4 * MIB);
        assert_eq!(planner.adapt(&durations(6000, 5)), 2 * MIB);
        assert_eq!(planner.adapt(&durations(6000, 5)), 2 * MIB);
    }

    #[test]
    fn test_with_bounds_clamps_hint() {
        let below = BlockPlanner::with_bounds(MIB, 2 * MIB, 16 * MIB);
        assert_eq!(below.block_size(), 2 * MIB);
        let above = BlockPlanner::with_bounds(32 * MIB, 2 * MIB, 16 * MIB);
        assert_eq!(above.block_size(), 16 * MIB);
    }

    #[test]
    fn test_slow_blocks_never_grow_hint() {
        let mut planner = BlockPlanner::with_bounds(MIB, 2 * MIB, 16 * MIB);
        let before = planner.block_size();
        assert!(planner.adapt(&durations(6000, 5)) <= before);

        let mut planner = BlockPlanner::with_bounds(1024, 1024, 4096);
        assert_eq!(planner.adapt(&durations(6000, 5)), 1024);
    }

    #[test]
    fn test_fast_blocks_never_shrink_hint() {
        let mut planner = BlockPlanner::with_bounds(32 * MIB, 2 * MIB, 16 * MIB);
        let before = planner.block_size();
        assert!(planner.adapt(&durations(100, 5)) >= before);
        assert_eq!(planner.block_size(), 16 * MIB);
    }

    #[test]
    fn test_adapt_unchanged_in_band() {
        let mut planner = BlockPlanner::new(8 * MIB);
        assert_eq!(planner.adapt(&durations(3000, 5)), 8 * MIB);
        assert_eq!(planner.adapt(&durations(1000, 5)), 8 * MIB);
        assert_eq!(planner.adapt(&durations(5000, 5)), 8 * MIB);
    }

    #[test]
    fn test_adapt_needs_minimum_samples() {
        let mut planner = BlockPlanner::new(8 * MIB);
        assert_eq!(planner.adapt(&durations(100, 4)), 8 * MIB);
    }

    #[test]
    fn test_adapt_does_not_touch_existing_plan() {
        let mut planner = BlockPlanner::new(8 * MIB);
        let blocks = planner.plan_object(40 * MIB).unwrap();
        planner.adapt(&durations(100, 5));
        assert_eq!(blocks.len(), 5);
        assert!(blocks.iter().all(|b| b.len() == 8 * MIB));
        assert_eq!(planner.plan_object(40 * MIB).unwrap().len(), 3);
    }
}
