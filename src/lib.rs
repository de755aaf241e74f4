//! A pipelined parallel-scan state machine.
//!
//! The core data structure is a forest of perfectly balanced binary trees,
//! each at a different stage of completion (see [`tree::Tree`] and
//! [`forest::State`]). Base data items are admitted into the newest tree;
//! as completed jobs are fed back in, each tree's merges advance
//! bottom-up, one level per round, until its root finalizes and the tree
//! is dropped, emitting the aggregated result in the same order its base
//! data was admitted.
//!
//! ```
//! use scan_state::{Config, State};
//!
//! let mut state: State<u64, u64> = State::empty(Config::new(2, 0)).unwrap();
//! let (emitted, next) = state.update(vec![3, 5], vec![]).unwrap();
//! assert!(emitted.is_none());
//! state = next;
//! ```

pub mod error;
pub mod forest;
pub mod job;
pub mod scheduler;
pub mod slot;
pub mod tree;
pub mod updater;

pub use error::Error;
pub use forest::{Config, OverflowSplit, State};
pub use job::{AvailableJob, NewJob};
pub use tree::Tree;

impl<A: Clone, D: Clone> State<A, D> {
    /// Applies one round: `data` is admitted onto the newest tree (after
    /// any necessary overflow split), `completed_jobs` answers whatever
    /// this forest's current job list exposed. Returns the result emitted
    /// by a newly-completed root, if any, paired with its originating
    /// base data, plus the forest advanced one round.
    pub fn update(&self, data: Vec<D>, completed_jobs: Vec<A>) -> Result<(Option<(A, Vec<D>)>, Self), Error> {
        updater::apply_round(self, data, completed_jobs)
    }

    /// Every job currently pending anywhere in the forest (alias for
    /// `all_work`).
    pub fn next_jobs(&self) -> Vec<AvailableJob<A, D>> {
        scheduler::all_work(self)
    }

    /// The first `k` jobs of [`State::next_jobs`]; errors if fewer than
    /// `k` are available.
    pub fn next_k_jobs(&self, k: usize) -> Result<Vec<AvailableJob<A, D>>, Error> {
        scheduler::next_k_jobs(self, k)
    }

    /// The jobs that must be completed to keep every tree advancing in
    /// lockstep, extended with overflow work if `data_count` would exceed
    /// the head tree's free space.
    pub fn jobs_for_next_update(&self, data_count: usize) -> Vec<AvailableJob<A, D>> {
        scheduler::work_for_next_update(self, data_count)
    }

    /// The jobs that must complete so the next round can advance every
    /// tree in lockstep (no overflow look-ahead).
    pub fn work_for_current_tree(&self) -> Vec<AvailableJob<A, D>> {
        scheduler::work_for_current_tree(self)
    }

    /// How an incoming data batch of `data_count` items would split across
    /// the current newest tree and a newly spawned one.
    pub fn partition_if_overflowing(&self, data_count: usize) -> OverflowSplit {
        forest::State::partition_if_overflowing(self, data_count)
    }
}
