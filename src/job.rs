//! Job types: the units of work a [`crate::tree::Tree`] exposes to external
//! workers, and the units of work it accepts back.

#[cfg(feature = "with-serde")]
use serde::{Deserialize, Serialize};

/// A unit of work externally schedulable: either a base datum awaiting
/// processing, or a pair of child merge values awaiting combination.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "with-serde", derive(Serialize, Deserialize))]
pub enum AvailableJob<A, D> {
    Base(D),
    Merge(A, A),
}

/// A unit of completed (or newly arriving) work fed back into a tree via
/// [`crate::tree::Tree::update`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "with-serde", derive(Serialize, Deserialize))]
pub enum NewJob<A, D> {
    Base(D),
    Merge(A),
}

impl<A, D> NewJob<A, D> {
    pub fn as_merge(&self) -> Option<&A> {
        match self {
            NewJob::Merge(a) => Some(a),
            NewJob::Base(_) => None,
        }
    }

    pub fn is_base(&self) -> bool {
        matches!(self, NewJob::Base(_))
    }
}
