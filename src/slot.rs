//! Base and merge slot types.
//!
//! A slot is the smallest unit of state in a [`crate::tree::Tree`]: a base
//! slot holds at most one base datum, a merge slot holds at most one pair of
//! child values. Both progress through the same shape of lifecycle —
//! `Empty` (nothing yet), partially filled (merge slots only, via `Part`),
//! then `Full` with a status that flips once, `Todo -> Done`, as external
//! work is delivered back into the tree.

#[cfg(feature = "with-serde")]
use serde::{Deserialize, Serialize};

/// A slot's completion status. Transitions strictly `Todo -> Done`; once
/// `Done` a slot's payload is immutable until the next weight-reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "with-serde", derive(Serialize, Deserialize))]
pub enum Status {
    Todo,
    Done,
}

impl Status {
    pub fn is_done(self) -> bool {
        matches!(self, Status::Done)
    }
}

/// The contents of a base (leaf) slot.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "with-serde", derive(Serialize, Deserialize))]
pub enum BaseSlotState<D> {
    Empty,
    Full {
        job: D,
        seq_no: u64,
        status: Status,
    },
}

impl<D> BaseSlotState<D> {
    pub fn is_empty(&self) -> bool {
        matches!(self, BaseSlotState::Empty)
    }

    pub fn is_todo(&self) -> bool {
        matches!(self, BaseSlotState::Full { status: Status::Todo, .. })
    }
}

/// A base slot: `weight_remaining` is 1 while the slot can still accept a
/// base job this round, 0 once it has been filled.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "with-serde", derive(Serialize, Deserialize))]
pub struct BaseSlot<D> {
    pub weight_remaining: u32,
    pub state: BaseSlotState<D>,
}

impl<D> BaseSlot<D> {
    pub fn empty() -> Self {
        BaseSlot {
            weight_remaining: 1,
            state: BaseSlotState::Empty,
        }
    }
}

/// The contents of a merge (interior) slot.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "with-serde", derive(Serialize, Deserialize))]
pub enum MergeSlotState<A> {
    Empty,
    Part(A),
    Full {
        left: A,
        right: A,
        seq_no: u64,
        status: Status,
    },
}

impl<A> MergeSlotState<A> {
    pub fn is_empty(&self) -> bool {
        matches!(self, MergeSlotState::Empty)
    }

    pub fn is_todo(&self) -> bool {
        matches!(self, MergeSlotState::Full { status: Status::Todo, .. })
    }
}

/// A merge slot. `weights.0`/`weights.1` count how many base-job
/// equivalents the left/right subtrees still owe before this slot can reach
/// `Full`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "with-serde", derive(Serialize, Deserialize))]
pub struct MergeSlot<A> {
    pub weights: (u32, u32),
    pub state: MergeSlotState<A>,
}

impl<A> MergeSlot<A> {
    pub fn empty(left_weight: u32, right_weight: u32) -> Self {
        MergeSlot {
            weights: (left_weight, right_weight),
            state: MergeSlotState::Empty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_slot_starts_empty_with_weight_one() {
        let slot: BaseSlot<u64> = BaseSlot::empty();
        assert_eq!(slot.weight_remaining, 1);
        assert!(slot.state.is_empty());
    }

    #[test]
    fn merge_slot_starts_empty_with_given_weights() {
        let slot: MergeSlot<u64> = MergeSlot::empty(4, 4);
        assert_eq!(slot.weights, (4, 4));
        assert!(slot.state.is_empty());
    }

    #[test]
    fn status_is_done_only_for_done() {
        assert!(!Status::Todo.is_done());
        assert!(Status::Done.is_done());
    }
}
