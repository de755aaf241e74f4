//! Applies one round: splits incoming data and completed jobs between the
//! current tree and (if needed) a newly spawned one, drives [`Tree::update`]
//! calls, resets weights, prunes a finished tree from the tail, and returns
//! whatever was emitted.
//!
//! Grounded on the teacher crate's `Spine::introduce_batch`
//! (`src/trace/spine_fueled.rs`): fuel is applied, a rollup performed,
//! the new batch inserted, and layers tidied — four ordered sub-steps
//! composed with `?`, exactly the shape `apply_round` follows here.

use std::collections::VecDeque;

use tracing::{debug, instrument};

use crate::error::Error;
use crate::forest::{Config, State};
use crate::job::NewJob;
use crate::scheduler::tail_assignment;
use crate::tree::Tree;

/// Runs one full round of the state machine: validates sizes, advances
/// every tree exactly once, and returns the result emitted (if any)
/// alongside the new forest. Leaves `state` untouched on any error.
#[instrument(skip(state, data, completed_jobs), fields(data_count = data.len(), completed_count = completed_jobs.len()))]
pub fn apply_round<A, D>(
    state: &State<A, D>,
    data: Vec<D>,
    completed_jobs: Vec<A>,
) -> Result<(Option<(A, Vec<D>)>, State<A, D>), Error>
where
    A: Clone,
    D: Clone,
{
    let config = state.config();
    if data.len() > config.max_base_jobs as usize {
        tracing::error!(
            target: "scan_state",
            got = data.len(),
            max = config.max_base_jobs,
            "data count exceeded"
        );
        return Err(Error::DataCountExceeded { got: data.len(), max: config.max_base_jobs });
    }

    let seq_no = state.current_job_sequence_number() + 1;
    let mut trees = state.trees().to_vec();

    let free = trees[0].required_job_count() as usize;
    let mut data = data;
    let data_overflow = if data.len() > free { data.split_off(free) } else { Vec::new() };
    let data_head = data;

    let required_merges_for_tail = tail_ready_count(&trees, config);
    let mut completed_jobs = completed_jobs;
    let jobs_overflow = if completed_jobs.len() > required_merges_for_tail {
        completed_jobs.split_off(required_merges_for_tail)
    } else {
        Vec::new()
    };
    let jobs_head = completed_jobs;
    let jobs_head_len = jobs_head.len();

    let mut emitted = None;

    let e1 = add_merge_jobs(&mut trees, config, jobs_head, seq_no, jobs_head_len, required_merges_for_tail)?;
    emitted = emitted.or(e1);
    add_data(&mut trees, config, data_head, seq_no, free)?;

    let required_merges_for_tail2 = tail_ready_count(&trees, config);
    let jobs_overflow_len = jobs_overflow.len();
    let e2 = add_merge_jobs(&mut trees, config, jobs_overflow, seq_no, jobs_overflow_len, required_merges_for_tail2)?;
    emitted = emitted.or(e2);
    let free2 = trees[0].required_job_count() as usize;
    add_data(&mut trees, config, data_overflow, seq_no, free2)?;

    if trees.len() > config.max_trees() {
        tracing::error!(
            target: "scan_state",
            got = trees.len(),
            max = config.max_trees(),
            "forest overflow"
        );
        return Err(Error::ForestOverflow { got: trees.len(), max: config.max_trees() });
    }

    let mut new_state = state.clone();
    *new_state.trees_mut() = trees;
    new_state.set_seq_no(seq_no);
    new_state.record_emission(emitted.clone());
    Ok((emitted, new_state))
}

fn tail_ready_count<A: Clone, D: Clone>(trees: &[Tree<A, D>], config: Config) -> usize {
    tail_assignment(trees, config, 1)
        .into_iter()
        .map(|(i, level)| trees[i].jobs_on_level(level).len())
        .sum()
}

/// Delivers `jobs` to the tail trees selected by [`tail_assignment`], one
/// tree at a time, each consuming exactly `tree.required_job_count()`
/// arrivals. Stops as soon as a root completes (that tree is then dropped
/// from the tail); resets every remaining tail tree's weights once either
/// an emission occurred or the tail has settled (no growth expected and
/// every offered job was consumed).
fn add_merge_jobs<A: Clone, D: Clone>(
    trees: &mut Vec<Tree<A, D>>,
    config: Config,
    jobs: Vec<A>,
    seq_no: u64,
    jobs_len_for_condition: usize,
    required_merges_for_tail: usize,
) -> Result<Option<(A, Vec<D>)>, Error> {
    let assignment = tail_assignment(trees, config, 1);
    let mut queue: VecDeque<A> = jobs.into();
    let mut emitted = None;
    let mut emitting_tree_idx = None;

    for (tree_idx, level) in &assignment {
        let required = trees[*tree_idx].required_job_count() as usize;
        let take = required.min(queue.len());
        let slice: Vec<NewJob<A, D>> = (0..take).map(|_| NewJob::Merge(queue.pop_front().unwrap())).collect();
        let (new_tree, emission) = trees[*tree_idx].update(slice, *level, seq_no)?;
        trees[*tree_idx] = new_tree;
        if let Some(a) = emission {
            let data = trees[*tree_idx].base_data_all();
            emitted = Some((a, data));
            emitting_tree_idx = Some(*tree_idx);
            break;
        }
    }

    if let Some(idx) = emitting_tree_idx {
        debug!(target: "scan_state", index = idx, seq_no, "tree died: root completed");
        trees.remove(idx);
    }

    let tail_len_after = trees.len().saturating_sub(1);
    let should_reset = emitting_tree_idx.is_some()
        || (tail_len_after + 1 < config.max_trees() && jobs_len_for_condition == required_merges_for_tail);
    if should_reset {
        for tree in trees.iter_mut().skip(1) {
            *tree = tree.reset_weights();
        }
    }

    Ok(emitted)
}

/// Fills the head tree's base row with `data`; if that empties the round's
/// free space exactly, the just-filled tree is weight-reset and a fresh
/// empty tree is prepended ahead of it.
fn add_data<A: Clone, D: Clone>(
    trees: &mut Vec<Tree<A, D>>,
    config: Config,
    data: Vec<D>,
    seq_no: u64,
    free: usize,
) -> Result<(), Error> {
    if data.is_empty() {
        return Ok(());
    }
    let depth = config.depth();
    let became_full = data.len() == free;
    let jobs: Vec<NewJob<A, D>> = data.into_iter().map(NewJob::Base).collect();
    let (new_head, _) = trees[0].update(jobs, depth, seq_no)?;
    trees[0] = new_head;
    if became_full {
        trees[0] = trees[0].reset_weights();
        debug!(target: "scan_state", depth, seq_no, "tree born");
        trees.insert(0, Tree::empty(depth));
    }
    Ok(())
}
