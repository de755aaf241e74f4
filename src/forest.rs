//! The forest of trees: the top-level state a pipeline advances one round
//! at a time.
//!
//! Grounded on the teacher crate's `Spine<B>` (`src/trace/spine_fueled.rs`):
//! an ordered collection of staged merge state plus a small amount of
//! bookkeeping (`lower`/`upper` antichains there; sequence number and
//! emission bookkeeping here), advanced by a single entry point
//! (`introduce_batch` there, [`crate::updater::apply_round`] here).

use std::fmt;

use tracing::{debug, instrument};

#[cfg(feature = "with-serde")]
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::tree::Tree;

/// Immutable sizing parameters for a forest. `max_base_jobs` must be a power
/// of two; `delay` may be any non-negative value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "with-serde", derive(Serialize, Deserialize))]
pub struct Config {
    pub max_base_jobs: u32,
    pub delay: u32,
}

impl Config {
    pub fn new(max_base_jobs: u32, delay: u32) -> Self {
        Config { max_base_jobs, delay }
    }

    /// `max_base_jobs` must be a positive power of two; this is the only
    /// invariant a `Config` can violate on its own (everything else is a
    /// property of the `State` built from it).
    pub fn validate(&self) -> Result<(), Error> {
        if self.max_base_jobs == 0 || !self.max_base_jobs.is_power_of_two() {
            tracing::error!(
                target: "scan_state",
                max_base_jobs = self.max_base_jobs,
                "invalid config: max_base_jobs must be a positive power of two"
            );
            return Err(Error::InvalidConfig {
                reason: format!("max_base_jobs ({}) must be a positive power of two", self.max_base_jobs),
            });
        }
        Ok(())
    }

    /// `d = ceil(log2(max_base_jobs))`, the depth of every tree in the
    /// forest.
    pub fn depth(&self) -> u32 {
        self.max_base_jobs.trailing_zeros()
    }

    /// `(d + 1) * (delay + 1) + 1`, the bound a forest's tree count may
    /// never exceed.
    pub fn max_trees(&self) -> usize {
        ((self.depth() as usize + 1) * (self.delay as usize + 1)) + 1
    }
}

/// The forest of trees and the bookkeeping needed to advance it one round
/// at a time. Trees are kept newest-first: index 0 is the least complete,
/// most recently created tree.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "with-serde", derive(Serialize, Deserialize))]
pub struct State<A, D> {
    config: Config,
    trees: Vec<Tree<A, D>>,
    curr_job_seq_no: u64,
    /// The most recent `(result, data_that_produced_it)` emitted by a
    /// completed root, if any. This folds together spec.md's
    /// `recent_tree_data`/`other_trees_data` bookkeeping fields into the
    /// single piece of information a caller can actually observe after a
    /// round — see DESIGN.md open question 1.
    last_emitted: Option<(A, Vec<D>)>,
}

impl<A, D> State<A, D> {
    /// An empty forest: a single empty tree of the configured depth.
    pub fn empty(config: Config) -> Result<Self, Error> {
        config.validate()?;
        let depth = config.depth();
        Ok(State {
            config,
            trees: vec![Tree::empty(depth)],
            curr_job_seq_no: 0,
            last_emitted: None,
        })
    }

    pub fn config(&self) -> Config {
        self.config
    }

    pub fn trees(&self) -> &[Tree<A, D>] {
        &self.trees
    }

    pub fn current_job_sequence_number(&self) -> u64 {
        self.curr_job_seq_no
    }

    pub fn last_emitted_result(&self) -> Option<(&A, &[D])> {
        self.last_emitted.as_ref().map(|(a, data)| (a, data.as_slice()))
    }

    /// Room left on the newest (index 0) tree's base row before it would
    /// need a fresh tree to absorb further data this round.
    pub fn free_space(&self) -> u32
    where
        A: Clone,
        D: Clone,
    {
        let capacity = self.config.max_base_jobs as usize;
        let occupied = self.trees[0].to_data().len();
        capacity.saturating_sub(occupied) as u32
    }

    pub(crate) fn record_emission(&mut self, value: Option<(A, Vec<D>)>) {
        if value.is_some() {
            self.last_emitted = value;
        }
    }

    pub(crate) fn set_seq_no(&mut self, seq_no: u64) {
        self.curr_job_seq_no = seq_no;
    }

    pub(crate) fn trees_mut(&mut self) -> &mut Vec<Tree<A, D>> {
        &mut self.trees
    }
}

impl<A: Clone, D: Clone> State<A, D> {
    /// The base data filled into the newest tree so far, in admission
    /// order.
    pub fn base_jobs_on_latest_tree(&self) -> Vec<D> {
        self.trees[0].base_data_all()
    }

    /// Whether the head tree has exactly `max_base_jobs` free slots, i.e.
    /// it is still completely pristine and the next batch of data would be
    /// the first to land on it.
    pub fn next_on_new_tree(&self) -> bool {
        self.trees[0].required_job_count() == self.config.max_base_jobs
    }

    /// How a batch of `data_count` items would split across the head tree
    /// and a newly spawned one, as counts (spec's `{first, second}`
    /// interface) rather than the actual payload — the payload split
    /// [`updater::apply_round`](crate::updater::apply_round) performs
    /// itself from `required_job_count`.
    pub fn partition_if_overflowing(&self, data_count: usize) -> OverflowSplit {
        let capacity = self.config.max_base_jobs as usize;
        let occupied = self.trees[0].to_data().len();
        let room = capacity.saturating_sub(occupied);
        if data_count <= room {
            OverflowSplit { first: data_count as u32, second: None }
        } else {
            OverflowSplit {
                first: room as u32,
                second: Some((data_count - room) as u32),
            }
        }
    }
}

/// How an incoming data batch would be split across the current newest
/// tree and a newly spawned one, per spec.md §6's illustrative
/// `{first: u32, second: Option<u32>}` interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "with-serde", derive(Serialize, Deserialize))]
pub struct OverflowSplit {
    pub first: u32,
    pub second: Option<u32>,
}

impl<A, D> State<A, D> {
    /// Tear down the forest into a plain list of trees, for debug display
    /// or tests.
    #[instrument(skip(self), fields(trees = self.trees.len()))]
    pub fn describe(&self) {
        debug!(
            target: "scan_state",
            trees = self.trees.len(),
            seq_no = self.curr_job_seq_no,
            "forest snapshot"
        );
    }
}

impl<A, D> fmt::Display for State<A, D>
where
    A: fmt::Debug,
    D: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "forest (seq_no {}, {} trees)", self.curr_job_seq_no, self.trees.len())?;
        for (i, tree) in self.trees.iter().enumerate() {
            writeln!(f, "{}", textwrap::indent(&format!("tree {i}:\n{tree}"), "  "))?;
        }
        Ok(())
    }
}
