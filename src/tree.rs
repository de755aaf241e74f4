//! A perfectly balanced binary tree of fixed depth: a merge slot at every
//! internal level, a base slot at every leaf.
//!
//! Rather than the nested, type-doubling recursive structure spec.md §3
//! describes (`Node<A, D> { merge: MergeSlot<A>, child: Node<(A,A),(D,D)> }`,
//! terminating in a `Leaf`), this is stored flat: `merges` is a single
//! `Vec<MergeSlot<A>>` in level order, `bases` a single `Vec<BaseSlot<D>>`.
//! Level `ℓ` of the merge vector occupies the index range
//! `[2^ℓ - 1, 2^(ℓ+1) - 2]`; this is the representation spec.md §9's design
//! note recommends for languages without higher-kinded recursive generics,
//! and it mirrors the teacher crate's own `Spine<B>`, which keeps its
//! staged merge state in a flat, level-indexed `Vec` rather than a nested
//! type.

use std::collections::VecDeque;
use std::fmt::{self, Debug};

use tracing::{error, trace};

use crate::error::Error;
use crate::job::{AvailableJob, NewJob};
use crate::slot::{BaseSlot, BaseSlotState, MergeSlot, MergeSlotState, Status};

/// Index of the first slot at `level` within the flat `merges` vector.
#[inline]
fn level_start(level: u32) -> usize {
    (1usize << level) - 1
}

/// Number of slots at `level` (`2^level`).
#[inline]
fn level_len(level: u32) -> usize {
    1usize << level
}

/// The level a flat merge-vector index belongs to; the inverse of
/// `level_start` + offset.
#[inline]
fn level_of_index(i: usize) -> u32 {
    (63 - ((i + 1) as u64).leading_zeros()) as u32
}

/// A perfectly balanced binary tree of depth `depth`, with `2^depth` base
/// slots and `2^depth - 1` merge slots, stored flat (see module docs).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(
    feature = "with-serde",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct Tree<A, D> {
    depth: u32,
    merges: Vec<MergeSlot<A>>,
    bases: Vec<BaseSlot<D>>,
}

impl<A, D> Tree<A, D> {
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// A fresh, all-`Empty` tree of the given depth, with level-derived
    /// initial weights: level-`ℓ` merges have `(2^(d-ℓ-1), 2^(d-ℓ-1))`; base
    /// leaves have weight 1.
    pub fn empty(depth: u32) -> Self {
        let mut merges = Vec::with_capacity((1usize << depth).saturating_sub(1));
        for level in 0..depth {
            let w = 1u32 << (depth - level - 1);
            for _ in 0..level_len(level) {
                merges.push(MergeSlot::empty(w, w));
            }
        }
        let bases = (0..(1usize << depth)).map(|_| BaseSlot::empty()).collect();
        Tree { depth, merges, bases }
    }
}

impl<A: Clone, D: Clone> Tree<A, D> {
    /// Every slot at `level` currently ready to be scheduled, left to right.
    /// `level == depth` returns base jobs; any shallower level returns merge
    /// jobs for that level's `Full{status: Todo}` slots.
    pub fn jobs_on_level(&self, level: u32) -> Vec<AvailableJob<A, D>> {
        if level == self.depth {
            self.bases
                .iter()
                .filter_map(|slot| match &slot.state {
                    BaseSlotState::Full { job, status: Status::Todo, .. } => {
                        Some(AvailableJob::Base(job.clone()))
                    }
                    _ => None,
                })
                .collect()
        } else {
            let start = level_start(level);
            let len = level_len(level);
            self.merges[start..start + len]
                .iter()
                .filter_map(|slot| match &slot.state {
                    MergeSlotState::Full { left, right, status: Status::Todo, .. } => {
                        Some(AvailableJob::Merge(left.clone(), right.clone()))
                    }
                    _ => None,
                })
                .collect()
        }
    }

    /// All base leaves of this tree, equivalent to `jobs_on_level(depth)`.
    pub fn to_data(&self) -> Vec<AvailableJob<A, D>> {
        self.jobs_on_level(self.depth)
    }

    /// Every base datum filled into this tree so far, left to right,
    /// regardless of `Todo`/`Done` status — used to package a tree's
    /// admitted data alongside its emitted result.
    pub fn base_data_all(&self) -> Vec<D> {
        self.bases
            .iter()
            .filter_map(|slot| match &slot.state {
                BaseSlotState::Full { job, .. } => Some(job.clone()),
                BaseSlotState::Empty => None,
            })
            .collect()
    }

    /// The number of base-job equivalents this tree still owes before its
    /// root can finalize: the sum of the root's weights (or, for a
    /// depth-0 tree, the sole base slot's weight).
    pub fn required_job_count(&self) -> u32 {
        if self.depth == 0 {
            self.bases[0].weight_remaining
        } else {
            let (l, r) = self.merges[0].weights;
            l + r
        }
    }

    /// Structurally map every payload in the tree, `A -> B` and `D -> C`,
    /// preserving level information for the merge mapper.
    pub fn map_depth<B, C>(
        &self,
        f_merge: impl Fn(u32, &A) -> B,
        f_base: impl Fn(&D) -> C,
    ) -> Tree<B, C> {
        let merges = self
            .merges
            .iter()
            .enumerate()
            .map(|(i, slot)| {
                let level = level_of_index(i);
                MergeSlot {
                    weights: slot.weights,
                    state: match &slot.state {
                        MergeSlotState::Empty => MergeSlotState::Empty,
                        MergeSlotState::Part(a) => MergeSlotState::Part(f_merge(level, a)),
                        MergeSlotState::Full { left, right, seq_no, status } => {
                            MergeSlotState::Full {
                                left: f_merge(level, left),
                                right: f_merge(level, right),
                                seq_no: *seq_no,
                                status: *status,
                            }
                        }
                    },
                }
            })
            .collect();
        let bases = self
            .bases
            .iter()
            .map(|slot| BaseSlot {
                weight_remaining: slot.weight_remaining,
                state: match &slot.state {
                    BaseSlotState::Empty => BaseSlotState::Empty,
                    BaseSlotState::Full { job, seq_no, status } => BaseSlotState::Full {
                        job: f_base(job),
                        seq_no: *seq_no,
                        status: *status,
                    },
                },
            })
            .collect();
        Tree { depth: self.depth, merges, bases }
    }

    /// Deterministic fold over every occupied slot, left to right, merges
    /// before the base row.
    pub fn fold_depth<T>(
        &self,
        init: T,
        f_merge: impl Fn(u32, &A) -> T,
        f_base: impl Fn(&D) -> T,
        combine: impl Fn(T, T) -> T,
    ) -> T {
        let mut acc = init;
        for (i, slot) in self.merges.iter().enumerate() {
            let level = level_of_index(i);
            match &slot.state {
                MergeSlotState::Empty => {}
                MergeSlotState::Part(a) => acc = combine(acc, f_merge(level, a)),
                MergeSlotState::Full { left, right, .. } => {
                    acc = combine(acc, f_merge(level, left));
                    acc = combine(acc, f_merge(level, right));
                }
            }
        }
        for slot in &self.bases {
            if let BaseSlotState::Full { job, .. } = &slot.state {
                acc = combine(acc, f_base(job));
            }
        }
        acc
    }

    /// Recompute every weight bottom-up from current slot statuses. A
    /// `Todo` slot's weight is forced to `(1, 0)` regardless of its
    /// children's actual remaining weight sum (spec's literal rule,
    /// preserved deliberately — see DESIGN.md open question 2); any other
    /// slot adopts the sum of its children's contributions.
    pub fn reset_weights(&self) -> Self {
        let mut merges = self.merges.clone();
        let mut bases = self.bases.clone();
        reset_node(&mut merges, &mut bases, 0, 0, self.depth);
        Tree { depth: self.depth, merges, bases }
    }

    /// Apply one round's worth of arrivals to this tree.
    ///
    /// See this module's top-level doc comment and DESIGN.md ("Open
    /// Questions" #3) for the derivation: levels shallower than
    /// `update_level - 1` only ever decrement weight accounting; level
    /// `update_level - 1` ("create") builds its own `Empty -> Part -> Full`
    /// transition from the values bubbled up by its two children
    /// *this same call*; level `update_level` ("complete"/"fill") is the
    /// only level that consumes `jobs` directly, one item per ready slot,
    /// left to right. `update_level == 0` is a direct terminal case: a
    /// completed root produces the round's emitted value.
    pub fn update(
        &self,
        jobs: Vec<NewJob<A, D>>,
        update_level: u32,
        seq_no: u64,
    ) -> Result<(Self, Option<A>), Error> {
        let depth = self.depth;
        let mut merges = self.merges.clone();
        let mut bases = self.bases.clone();
        let mut queue: VecDeque<NewJob<A, D>> = jobs.into();

        let emitted = if update_level == 0 {
            if depth == 0 {
                let (_, bubble) = terminal_leaf(&mut queue, &mut bases, 0, seq_no)?;
                bubble
            } else {
                let (_, bubble) = terminal_merge(&mut queue, &mut merges, 0, 0, seq_no)?;
                if let Some(a) = &bubble {
                    merges[0].weights = (0, 0);
                    trace!(target: "scan_state", level = 0, "root merge completed");
                    let _ = a;
                }
                bubble
            }
        } else {
            let create_level = update_level - 1;
            if create_level == 0 {
                create(&mut merges, &mut bases, 0, 0, update_level, depth, seq_no, &mut queue)?;
            } else {
                accounting(&mut merges, &mut bases, 0, 0, update_level, depth, seq_no, &mut queue)?;
            }
            None
        };

        if !queue.is_empty() {
            error!(
                target: "scan_state",
                level = update_level,
                leftover = queue.len(),
                "invalid merge job: arrivals left unconsumed after update"
            );
            return Err(Error::InvalidMergeJob {
                level: update_level,
                reason: format!("{} arrivals left unconsumed after update", queue.len()),
            });
        }

        Ok((Tree { depth, merges, bases }, emitted))
    }
}

impl<A, D> Tree<A, D>
where
    A: Debug,
    D: Debug,
{
    /// Human-readable debug view; not functionally essential.
    pub fn view(&self, show_a: impl Fn(&A) -> String, show_d: impl Fn(&D) -> String) -> String {
        let mut out = String::new();
        for level in 0..self.depth {
            let start = level_start(level);
            let len = level_len(level);
            let mut line = format!("level {level}: ");
            for slot in &self.merges[start..start + len] {
                line.push_str(&match &slot.state {
                    MergeSlotState::Empty => "_".to_string(),
                    MergeSlotState::Part(a) => format!("P({})", show_a(a)),
                    MergeSlotState::Full { left, right, status, .. } => {
                        format!("F({},{},{status:?})", show_a(left), show_a(right))
                    }
                });
                line.push(' ');
            }
            out.push_str(&textwrap::indent(&line, ""));
            out.push('\n');
        }
        let mut base_line = format!("level {}: ", self.depth);
        for slot in &self.bases {
            base_line.push_str(&match &slot.state {
                BaseSlotState::Empty => "_".to_string(),
                BaseSlotState::Full { job, status, .. } => format!("F({},{status:?})", show_d(job)),
            });
            base_line.push(' ');
        }
        out.push_str(&base_line);
        out.push('\n');
        out
    }
}

impl<A, D> fmt::Display for Tree<A, D>
where
    A: Debug,
    D: Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.view(|a| format!("{a:?}"), |d| format!("{d:?}")))
    }
}

/// The deepest level that has just produced a usable value this round: for
/// an internal merge, the slot's own bubbled output; for a base leaf, `None`
/// (filling a leaf from raw data has nothing to bubble until a later round
/// processes it).
type TerminalOutcome<A> = (bool, Option<A>);

fn terminal_merge<A: Clone, D>(
    queue: &mut VecDeque<NewJob<A, D>>,
    merges: &mut [MergeSlot<A>],
    level: u32,
    idx: usize,
    seq_no: u64,
) -> Result<TerminalOutcome<A>, Error> {
    let i = level_start(level) + idx;
    let ready = merges[i].state.is_todo();
    if !ready {
        return Ok((false, None));
    }
    match queue.front() {
        Some(NewJob::Merge(_)) => {
            let a = match queue.pop_front().unwrap() {
                NewJob::Merge(a) => a,
                NewJob::Base(_) => unreachable!(),
            };
            let (left, right) = match &merges[i].state {
                MergeSlotState::Full { left, right, .. } => (left.clone(), right.clone()),
                _ => unreachable!("checked is_todo above"),
            };
            merges[i].state = MergeSlotState::Full {
                left,
                right,
                seq_no,
                status: Status::Done,
            };
            Ok((true, Some(a)))
        }
        Some(NewJob::Base(_)) => {
            error!(target: "scan_state", level, "invalid merge job: expected Merge, found Base");
            Err(Error::InvalidMergeJob {
                level,
                reason: "expected a Merge arrival to complete a Todo merge slot, found a Base".into(),
            })
        }
        None => {
            error!(target: "scan_state", level, "invalid merge job: ready slot with no arrival");
            Err(Error::InvalidMergeJob {
                level,
                reason: "ready merge slot but no arrival left to complete it".into(),
            })
        }
    }
}

fn terminal_leaf<A: Clone, D: Clone>(
    queue: &mut VecDeque<NewJob<A, D>>,
    bases: &mut [BaseSlot<D>],
    idx: usize,
    seq_no: u64,
) -> Result<TerminalOutcome<A>, Error> {
    match &bases[idx].state {
        BaseSlotState::Empty => match queue.front() {
            Some(NewJob::Base(_)) => {
                let d = match queue.pop_front().unwrap() {
                    NewJob::Base(d) => d,
                    NewJob::Merge(_) => unreachable!(),
                };
                bases[idx] = BaseSlot {
                    weight_remaining: 0,
                    state: BaseSlotState::Full { job: d, seq_no, status: Status::Todo },
                };
                Ok((true, None))
            }
            Some(NewJob::Merge(_)) => {
                error!(target: "scan_state", "invalid base job: expected a Base arrival for an empty leaf, found a Merge");
                Err(Error::InvalidBaseJob {
                    reason: "expected a Base arrival for an empty leaf, found a Merge".into(),
                })
            }
            None => Ok((false, None)),
        },
        BaseSlotState::Full { status: Status::Todo, .. } => match queue.front() {
            Some(NewJob::Merge(_)) => {
                let a = match queue.pop_front().unwrap() {
                    NewJob::Merge(a) => a,
                    NewJob::Base(_) => unreachable!(),
                };
                if let BaseSlotState::Full { job, seq_no: sn, .. } = &bases[idx].state {
                    bases[idx].state = BaseSlotState::Full {
                        job: job.clone(),
                        seq_no: *sn,
                        status: Status::Done,
                    };
                }
                Ok((true, Some(a)))
            }
            Some(NewJob::Base(_)) => {
                error!(target: "scan_state", "invalid base job: expected a Merge completion for a Todo leaf, found a Base");
                Err(Error::InvalidBaseJob {
                    reason: "expected a Merge completion for a Todo leaf, found a Base".into(),
                })
            }
            None => {
                error!(target: "scan_state", "invalid base job: ready leaf but no arrival left to complete it");
                Err(Error::InvalidBaseJob {
                    reason: "ready leaf but no arrival left to complete it".into(),
                })
            }
        },
        BaseSlotState::Full { status: Status::Done, .. } => Ok((false, None)),
    }
}

#[allow(clippy::too_many_arguments)]
fn create<A: Clone, D: Clone>(
    merges: &mut Vec<MergeSlot<A>>,
    bases: &mut Vec<BaseSlot<D>>,
    level: u32,
    idx: usize,
    update_level: u32,
    depth: u32,
    seq_no: u64,
    queue: &mut VecDeque<NewJob<A, D>>,
) -> Result<u32, Error> {
    debug_assert_eq!(level, update_level - 1);
    let child_level = level + 1;
    let (l_idx, r_idx) = (2 * idx, 2 * idx + 1);

    let (l_sat, l_bubble) = if child_level == depth {
        terminal_leaf(queue, bases, l_idx, seq_no)?
    } else {
        terminal_merge(queue, merges, child_level, l_idx, seq_no)?
    };
    let (r_sat, r_bubble) = if child_level == depth {
        terminal_leaf(queue, bases, r_idx, seq_no)?
    } else {
        terminal_merge(queue, merges, child_level, r_idx, seq_no)?
    };

    let i = level_start(level) + idx;
    let new_state = match (&merges[i].state, l_bubble, r_bubble) {
        (MergeSlotState::Empty, None, None) => None,
        (MergeSlotState::Empty, Some(a), Some(b)) => {
            Some(MergeSlotState::Full { left: a, right: b, seq_no, status: Status::Todo })
        }
        (MergeSlotState::Empty, Some(a), None) => Some(MergeSlotState::Part(a)),
        (MergeSlotState::Empty, None, Some(b)) => Some(MergeSlotState::Part(b)),
        (MergeSlotState::Part(existing), None, Some(b)) => Some(MergeSlotState::Full {
            left: existing.clone(),
            right: b,
            seq_no,
            status: Status::Todo,
        }),
        (MergeSlotState::Part(existing), Some(a), None) => Some(MergeSlotState::Full {
            left: existing.clone(),
            right: a,
            seq_no,
            status: Status::Todo,
        }),
        (MergeSlotState::Part(_), None, None) => None,
        (MergeSlotState::Part(_), Some(_), Some(_)) => {
            error!(target: "scan_state", level, "invalid merge job: both children filled a partial slot");
            return Err(Error::InvalidMergeJob {
                level,
                reason: "both children produced a value for an already-partially-filled slot".into(),
            });
        }
        (MergeSlotState::Full { .. }, None, None) => None,
        (MergeSlotState::Full { .. }, _, _) => {
            error!(target: "scan_state", level, "invalid merge job: child bubbled into a full slot");
            return Err(Error::InvalidMergeJob {
                level,
                reason: "a child bubbled a value into an already-full parent slot".into(),
            });
        }
    };
    if let Some(state) = new_state {
        merges[i].state = state;
    }
    if l_sat {
        merges[i].weights.0 = merges[i].weights.0.saturating_sub(1);
    }
    if r_sat {
        merges[i].weights.1 = merges[i].weights.1.saturating_sub(1);
    }
    Ok(l_sat as u32 + r_sat as u32)
}

#[allow(clippy::too_many_arguments)]
fn accounting<A: Clone, D: Clone>(
    merges: &mut Vec<MergeSlot<A>>,
    bases: &mut Vec<BaseSlot<D>>,
    level: u32,
    idx: usize,
    update_level: u32,
    depth: u32,
    seq_no: u64,
    queue: &mut VecDeque<NewJob<A, D>>,
) -> Result<u32, Error> {
    debug_assert!(level < update_level - 1);
    let child_level = level + 1;
    let (l_idx, r_idx) = (2 * idx, 2 * idx + 1);

    let (lc, rc) = if child_level == update_level - 1 {
        (
            create(merges, bases, child_level, l_idx, update_level, depth, seq_no, queue)?,
            create(merges, bases, child_level, r_idx, update_level, depth, seq_no, queue)?,
        )
    } else {
        (
            accounting(merges, bases, child_level, l_idx, update_level, depth, seq_no, queue)?,
            accounting(merges, bases, child_level, r_idx, update_level, depth, seq_no, queue)?,
        )
    };

    let i = level_start(level) + idx;
    merges[i].weights.0 = merges[i].weights.0.saturating_sub(lc);
    merges[i].weights.1 = merges[i].weights.1.saturating_sub(rc);
    Ok(lc + rc)
}

fn reset_node<A, D>(
    merges: &mut [MergeSlot<A>],
    bases: &mut [BaseSlot<D>],
    level: u32,
    idx: usize,
    depth: u32,
) -> (u32, u32) {
    if level == depth {
        let b = &mut bases[idx];
        if b.state.is_todo() {
            b.weight_remaining = 1;
            (1, 0)
        } else {
            b.weight_remaining = 0;
            (0, 0)
        }
    } else {
        let i = level_start(level) + idx;
        if merges[i].state.is_todo() {
            merges[i].weights = (1, 0);
            (1, 0)
        } else {
            let l = reset_node(merges, bases, level + 1, 2 * idx, depth);
            let r = reset_node(merges, bases, level + 1, 2 * idx + 1, depth);
            let sum = (l.0 + r.0, l.1 + r.1);
            merges[i].weights = sum;
            sum
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill_bases(tree: &Tree<u64, u64>, data: Vec<u64>, seq: u64) -> Tree<u64, u64> {
        let jobs = data.into_iter().map(NewJob::Base).collect();
        tree.update(jobs, tree.depth(), seq).unwrap().0
    }

    #[test]
    fn empty_tree_has_expected_shape() {
        let t: Tree<u64, u64> = Tree::empty(2);
        assert_eq!(t.merges.len(), 3);
        assert_eq!(t.bases.len(), 4);
        assert_eq!(t.required_job_count(), 4);
    }

    #[test]
    fn depth_zero_tree_is_a_single_base_slot() {
        let t: Tree<u64, u64> = Tree::empty(0);
        assert_eq!(t.merges.len(), 0);
        assert_eq!(t.bases.len(), 1);
        assert_eq!(t.required_job_count(), 1);
    }

    #[test]
    fn filling_bases_marks_them_todo_and_exposes_jobs() {
        let t: Tree<u64, u64> = Tree::empty(2);
        let t = fill_bases(&t, vec![10, 20, 30, 40], 1);
        let jobs = t.jobs_on_level(2);
        assert_eq!(
            jobs,
            vec![
                AvailableJob::Base(10),
                AvailableJob::Base(20),
                AvailableJob::Base(30),
                AvailableJob::Base(40),
            ]
        );
    }

    #[test]
    fn full_round_trip_to_root_emits_sum() {
        // depth 1: two base slots, one root merge.
        let t: Tree<u64, u64> = Tree::empty(1);
        let (t, emitted) = t.update(vec![NewJob::Base(3), NewJob::Base(5)], 1, 1).unwrap();
        assert!(emitted.is_none());
        assert_eq!(t.jobs_on_level(1), vec![AvailableJob::Base(3), AvailableJob::Base(5)]);

        // Round 2: both base leaves get "processed" (ack'd) producing
        // values 3 and 5, creating the root merge slot.
        let (t, emitted) = t
            .update(vec![NewJob::Merge(3), NewJob::Merge(5)], 1, 2)
            .unwrap();
        assert!(emitted.is_none());
        assert_eq!(t.jobs_on_level(0), vec![AvailableJob::Merge(3, 5)]);

        // Round 3: complete the root with the worker-computed sum.
        let (_t, emitted) = t.update(vec![NewJob::Merge(8)], 0, 3).unwrap();
        assert_eq!(emitted, Some(8));
    }

    #[test]
    fn reset_weights_forces_todo_to_one_zero() {
        let t: Tree<u64, u64> = Tree::empty(1);
        let (t, _) = t.update(vec![NewJob::Base(3), NewJob::Base(5)], 1, 1).unwrap();
        let (t, _) = t
            .update(vec![NewJob::Merge(3), NewJob::Merge(5)], 1, 2)
            .unwrap();
        assert!(t.merges[0].state.is_todo());
        let reset = t.reset_weights();
        assert_eq!(reset.merges[0].weights, (1, 0));
        assert_eq!(reset.required_job_count(), 1);
    }

    #[test]
    fn reset_weights_is_idempotent() {
        let t: Tree<u64, u64> = Tree::empty(2);
        let t = fill_bases(&t, vec![1, 2, 3, 4], 1);
        let once = t.reset_weights();
        let twice = once.reset_weights();
        assert_eq!(once, twice);
    }

    #[test]
    fn invalid_merge_job_kind_is_rejected() {
        let t: Tree<u64, u64> = Tree::empty(1);
        let (t, _) = t.update(vec![NewJob::Base(3), NewJob::Base(5)], 1, 1).unwrap();
        let err = t.update(vec![NewJob::Base(1), NewJob::Base(2)], 1, 2).unwrap_err();
        assert!(matches!(err, Error::InvalidMergeJob { .. }));
    }
}
