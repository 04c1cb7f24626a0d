//! # Distributed Synchronization
//!
//! Minimal contract between metrics and whatever collective-communication layer
//! the evaluation driver runs on.
//!
//! A [`ProcessGroup`] knows its world size and rank, and can block until every
//! participant has handed over its metric state ([`ProcessGroup::gather`]).
//! Only the coordinating participant receives the gathered states; it merges them
//! into a scratch copy of the metric and computes the result.
//!
//! ## Implementations
//!
//! - [`SingleProcess`]: world size 1, no communication at all
//! - [`ThreadGroup`]: in-process SPMD group for multi-threaded evaluation
//!
//! Cross-host transports implement the trait themselves; [`Accumulator`] is
//! serializable for that purpose.

pub mod thread_group;

use thiserror::Error;

use crate::metrics::{Accumulator, Metric, MetricError};

pub use thread_group::ThreadGroup;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("process group state was poisoned by a panicking participant")]
    Poisoned,

    #[error("rank {rank} is out of range for world size {world_size}")]
    RankOutOfRange { rank: usize, world_size: usize },

    #[error("no state was gathered from rank {0}")]
    MissingState(usize),
}

/// A set of cooperating participants that evaluate in lockstep (SPMD).
///
/// Every participant must call [`gather`](ProcessGroup::gather) (or
/// [`sync_and_compute`](ProcessGroup::sync_and_compute)) at the same point in
/// program order. There is no timeout: a stalled peer stalls the barrier.
pub trait ProcessGroup: Send + Sync {
    fn world_size(&self) -> usize;

    fn rank(&self) -> usize;

    /// Rank that receives gathered state.
    fn coordinator(&self) -> usize {
        0
    }

    fn is_coordinator(&self) -> bool {
        self.rank() == self.coordinator()
    }

    /// Blocks until all participants contributed `state`.
    ///
    /// Returns `Some(states)` indexed by rank on the coordinator and `None` on
    /// every other participant.
    fn gather(&self, state: Accumulator) -> Result<Option<Vec<Accumulator>>, SyncError>;

    /// Merges `metric` across all participants and computes it on the coordinator.
    ///
    /// The caller's metric is left untouched; merging happens on a copy.
    fn sync_and_compute(&self, metric: &dyn Metric) -> Result<Option<f64>, MetricError> {
        let Some(states) = self.gather(metric.state().clone())? else {
            return Ok(None);
        };

        let rank = self.rank();
        let peers: Vec<Accumulator> = states
            .into_iter()
            .enumerate()
            .filter(|(peer_rank, _)| *peer_rank != rank)
            .map(|(_, state)| state)
            .collect();

        let mut merged = metric.clone_box();
        merged.merge_state(&peers)?;
        merged.compute().map(Some)
    }
}

/// Process group of a single participant.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleProcess;

impl ProcessGroup for SingleProcess {
    fn world_size(&self) -> usize {
        1
    }

    fn rank(&self) -> usize {
        0
    }

    fn gather(&self, state: Accumulator) -> Result<Option<Vec<Accumulator>>, SyncError> {
        Ok(Some(vec![state]))
    }
}
