//! In-process process group: one participant per thread.

use std::sync::{Arc, Condvar, Mutex};

use super::{ProcessGroup, SyncError};
use crate::metrics::Accumulator;

struct Round {
    generation: u64,
    arrived: usize,
    states: Vec<Option<Accumulator>>,
}

struct Shared {
    world_size: usize,
    round: Mutex<Round>,
    changed: Condvar,
}

/// Handle of one participant in an in-process SPMD group.
///
/// ```rust,ignore
/// let handles = ThreadGroup::new(4);
/// for group in handles {
///     std::thread::spawn(move || {
///         let mut metrics = Metrics::with_group(Arc::new(group));
///         // ... update, then metrics.compute("", true)
///     });
/// }
/// ```
#[derive(Clone)]
pub struct ThreadGroup {
    shared: Arc<Shared>,
    rank: usize,
}

impl ThreadGroup {
    /// Creates handles for ranks `0..world_size`.
    ///
    /// # Panics
    ///
    /// Panics if `world_size` is zero.
    pub fn new(world_size: usize) -> Vec<ThreadGroup> {
        assert!(world_size > 0, "world size must be positive");

        let shared = Arc::new(Shared {
            world_size,
            round: Mutex::new(Round {
                generation: 0,
                arrived: 0,
                states: vec![None; world_size],
            }),
            changed: Condvar::new(),
        });

        (0..world_size)
            .map(|rank| ThreadGroup {
                shared: Arc::clone(&shared),
                rank,
            })
            .collect()
    }
}

impl ProcessGroup for ThreadGroup {
    fn world_size(&self) -> usize {
        self.shared.world_size
    }

    fn rank(&self) -> usize {
        self.rank
    }

    fn gather(&self, state: Accumulator) -> Result<Option<Vec<Accumulator>>, SyncError> {
        let world_size = self.shared.world_size;
        if self.rank >= world_size {
            return Err(SyncError::RankOutOfRange {
                rank: self.rank,
                world_size,
            });
        }

        let mut round = self.shared.round.lock().map_err(|_| SyncError::Poisoned)?;
        let generation = round.generation;
        round.states[self.rank] = Some(state);
        round.arrived += 1;

        if self.is_coordinator() {
            let mut round = self
                .shared
                .changed
                .wait_while(round, |r| r.arrived < world_size)
                .map_err(|_| SyncError::Poisoned)?;

            let states = round
                .states
                .iter_mut()
                .enumerate()
                .map(|(rank, slot)| slot.take().ok_or(SyncError::MissingState(rank)))
                .collect::<Result<Vec<_>, _>>();

            // Release the other participants even if a slot was empty.
            round.arrived = 0;
            round.generation = round.generation.wrapping_add(1);
            self.shared.changed.notify_all();

            states.map(Some)
        } else {
            self.shared.changed.notify_all();
            let _round = self
                .shared
                .changed
                .wait_while(round, |r| r.generation == generation)
                .map_err(|_| SyncError::Poisoned)?;
            Ok(None)
        }
    }
}
