//! Chunk planner: maps an envelope length to a worker count and chunk size.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::PlanError;

/// Envelopes shorter than `below` bytes use `workers` workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerTier {
    pub below: usize,
    pub workers: usize,
}

/// Thresholds of the chunk planner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkPolicy {
    /// Smallest envelope worth chunking.
    pub min_size: usize,
    /// Below this, one worker carries the whole envelope as a single chunk.
    pub single_worker_threshold: usize,
    /// Largest chunk the node accepts.
    pub max_chunk_size: usize,
    /// Workers for envelopes beyond the last tier, and an upper bound for every tier.
    pub max_workers: usize,
    /// Ascending by `below`.
    pub worker_tiers: Vec<WorkerTier>,
}

impl Default for ChunkPolicy {
    fn default() -> Self {
        Self {
            min_size: 500_000,
            single_worker_threshold: 1_000_000,
            max_chunk_size: 95_000_000,
            max_workers: 5,
            worker_tiers: vec![
                WorkerTier { below: 10_000_000, workers: 2 },
                WorkerTier { below: 50_000_000, workers: 3 },
                WorkerTier { below: 200_000_000, workers: 4 },
            ],
        }
    }
}

/// Outcome of planning one envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    pub envelope_len: usize,
    pub workers: usize,
    pub chunk_size: usize,
}

impl ChunkPolicy {
    /// Check the policy is internally consistent.
    pub fn validate(&self) -> Result<(), PlanError> {
        if self.min_size == 0 {
            return Err(PlanError::InvalidPolicy("min_size must be positive".into()));
        }
        if self.max_workers == 0 {
            return Err(PlanError::InvalidPolicy("max_workers must be positive".into()));
        }
        if self.max_chunk_size < self.single_worker_threshold {
            return Err(PlanError::InvalidPolicy(format!(
                "max_chunk_size {} is below single_worker_threshold {}",
                self.max_chunk_size, self.single_worker_threshold
            )));
        }
        let ascending = self
            .worker_tiers
            .windows(2)
            .all(|pair| pair[0].below < pair[1].below);
        if !ascending {
            return Err(PlanError::InvalidPolicy("worker tiers must ascend".into()));
        }
        if self.worker_tiers.iter().any(|t| t.workers == 0) {
            return Err(PlanError::InvalidPolicy("tier with zero workers".into()));
        }
        Ok(())
    }

    /// Whether an envelope this long should be chunked at all.
    pub fn should_chunk(&self, envelope_len: usize) -> bool {
        envelope_len >= self.min_size
    }

    /// Plan the upload of an `envelope_len`-byte envelope.
    pub fn plan(&self, envelope_len: usize) -> Result<ChunkPlan, PlanError> {
        if envelope_len < self.min_size {
            return Err(PlanError::PayloadTooSmallToChunk {
                len: envelope_len,
                min: self.min_size,
            });
        }

        let workers = if envelope_len < self.single_worker_threshold {
            1
        } else {
            self.worker_tiers
                .iter()
                .find(|tier| envelope_len < tier.below)
                .map_or(self.max_workers, |tier| tier.workers)
                .clamp(1, self.max_workers.max(1))
        };

        let chunk_size = envelope_len.div_ceil(workers);
        if chunk_size > self.max_chunk_size {
            return Err(PlanError::ChunkTooLarge {
                chunk_size,
                max: self.max_chunk_size,
            });
        }

        Ok(ChunkPlan {
            envelope_len,
            workers,
            chunk_size,
        })
    }
}

impl ChunkPlan {
    /// Byte ranges of each chunk, in ascending offset order.
    pub fn ranges(&self) -> impl Iterator<Item = Range<usize>> + '_ {
        let len = self.envelope_len;
        let step = self.chunk_size.max(1);
        (0..len)
            .step_by(step)
            .map(move |start| start..(start + step).min(len))
    }

    pub fn chunk_count(&self) -> usize {
        self.envelope_len.div_ceil(self.chunk_size.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_below_minimum() {
        let policy = ChunkPolicy::default();
        assert_eq!(
            policy.plan(499_999),
            Err(PlanError::PayloadTooSmallToChunk {
                len: 499_999,
                min: 500_000
            })
        );
    }

    #[test]
    fn test_minimum_is_single_worker() {
        let plan = ChunkPolicy::default().plan(500_000).unwrap();
        assert_eq!(plan.workers, 1);
        assert_eq!(plan.chunk_size, 500_000);
        assert_eq!(plan.ranges().collect::<Vec<_>>(), vec![0..500_000]);
    }

    #[test]
    fn test_worker_tiers() {
        let policy = ChunkPolicy::default();
        assert_eq!(policy.plan(999_999).unwrap().workers, 1);
        assert_eq!(policy.plan(1_000_000).unwrap().workers, 2);
        assert_eq!(policy.plan(10_000_000).unwrap().workers, 3);
        assert_eq!(policy.plan(50_000_000).unwrap().workers, 4);
        assert_eq!(policy.plan(200_000_000).unwrap().workers, 5);
    }

    #[test]
    fn test_last_chunk_is_remainder() {
        let plan = ChunkPolicy::default().plan(1_000_001).unwrap();
        assert_eq!(plan.chunk_size, 500_001);
        let ranges: Vec<_> = plan.ranges().collect();
        assert_eq!(ranges, vec![0..500_001, 500_001..1_000_001]);
        assert_eq!(plan.chunk_count(), 2);
    }

    #[test]
    fn test_chunk_too_large() {
        let policy = ChunkPolicy::default();
        let len = 5 * 95_000_000 + 1;
        assert!(matches!(
            policy.plan(len),
            Err(PlanError::ChunkTooLarge { max: 95_000_000, .. })
        ));
        assert!(policy.plan(5 * 95_000_000).is_ok());
    }

    #[test]
    fn test_validate() {
        assert!(ChunkPolicy::default().validate().is_ok());

        let mut policy = ChunkPolicy::default();
        policy.worker_tiers.reverse();
        assert!(policy.validate().is_err());

        let policy = ChunkPolicy {
            max_workers: 0,
            ..ChunkPolicy::default()
        };
        assert!(policy.validate().is_err());
    }

    proptest::proptest! {
        #[test]
        fn prop_ranges_tile_envelope(len in 500_000usize..400_000_000) {
            let plan = ChunkPolicy::default().plan(len).unwrap();
            let mut next = 0;
            let mut count = 0;
            for range in plan.ranges() {
                proptest::prop_assert_eq!(range.start, next);
                proptest::prop_assert!(range.end > range.start);
                proptest::prop_assert!(range.len() <= plan.chunk_size);
                next = range.end;
                count += 1;
            }
            proptest::prop_assert_eq!(next, len);
            proptest::prop_assert_eq!(count, plan.chunk_count());
            proptest::prop_assert!(count <= plan.workers);
        }
    }
}
