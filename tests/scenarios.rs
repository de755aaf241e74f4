//! Integration tests mirroring the scenarios a hand-verifier would run
//! against the forest end to end, driven purely through the public
//! `scan_state::State` API rather than any internal module.

mod common;

use scan_state::{AvailableJob, Config, Error, OverflowSplit, State};

/// Drives `state` for `rounds` rounds, supplying `next_data(round)` as the
/// batch and answering every job `work_for_current_round` exposes with
/// `answer(job)`. Returns every `(result, originating_data)` emitted, in
/// emission order, and panics (failing the test) on any round's error.
fn drive<F, G>(mut state: State<u64, u64>, mut next_data: F, answer: G, rounds: usize) -> Vec<(u64, Vec<u64>)>
where
    F: FnMut(usize) -> Vec<u64>,
    G: Fn(u64, AvailableJob<u64, u64>) -> u64,
{
    let mut emissions = Vec::new();
    for round in 0..rounds {
        let jobs = state.work_for_current_tree();
        let completed: Vec<u64> = jobs.into_iter().map(|j| answer(round as u64, j)).collect();
        let (emitted, next) = state.update(next_data(round), completed).expect("round must not fail");
        if let Some((a, data)) = emitted {
            emissions.push((a, data));
        }
        state = next;
    }
    emissions
}

fn sum_answer(_round: u64, job: AvailableJob<u64, u64>) -> u64 {
    match job {
        AvailableJob::Base(d) => d,
        AvailableJob::Merge(a, b) => a + b,
    }
}

/// Scenario 1 — steady state, `max_base_jobs=8, delay=2`. Round `i` supplies
/// `data = [i, i+1, ..., i+7]` and every exposed job is answered with the
/// identity (base) or sum (merge) rule. No round may error, and once
/// emissions start they must continue in admission order (each emitted
/// result is the sum of 8 consecutive data items).
#[test]
fn scenario_1_steady_state_runs_100_rounds_without_error() {
    common::init_tracing();
    let state: State<u64, u64> = State::empty(Config::new(8, 2)).unwrap();
    let emissions = drive(
        state,
        |round| (round as u64..round as u64 + 8).collect(),
        sum_answer,
        100,
    );
    assert!(!emissions.is_empty(), "pipeline should fill and start emitting within 100 rounds");
    for (result, data) in &emissions {
        assert_eq!(data.len(), 8, "every emission carries the 8 base items that produced it");
        let expected: u64 = data.iter().sum();
        assert_eq!(*result, expected, "emitted value must equal the sum of its originating batch");
    }
    // Admission order: each batch's data is a run of 8 consecutive integers,
    // so successive emissions' originating data must also be strictly
    // increasing runs.
    for pair in emissions.windows(2) {
        assert!(pair[0].1[0] < pair[1].1[0], "emissions must preserve admission order");
    }
}

/// Scenario 2 — partial fills, same parameters, `data = [1]` every round for
/// 200 rounds. The head fills one base slot per round, so no emission can
/// occur before the head tree itself is full (`max_base_jobs` rounds), and
/// the forest must never exceed `max_trees` or error throughout.
#[test]
fn scenario_2_partial_fills_never_violate_bounds() {
    common::init_tracing();
    let config = Config::new(8, 2);
    let state: State<u64, u64> = State::empty(config).unwrap();
    let max_trees = config.max_trees();
    let mut s = state;
    let mut first_emission_round = None;
    for round in 0..200 {
        let jobs = s.work_for_current_tree();
        let completed: Vec<u64> = jobs.into_iter().map(|j| sum_answer(round as u64, j)).collect();
        let (emitted, next) = s.update(vec![1], completed).expect("round must not fail");
        assert!(next.trees().len() <= max_trees, "forest must never exceed max_trees");
        if emitted.is_some() && first_emission_round.is_none() {
            first_emission_round = Some(round);
        }
        s = next;
    }
    let first = first_emission_round.expect("pipeline must eventually emit given 200 rounds of data");
    assert!(
        first + 1 >= config.max_base_jobs as usize,
        "no emission can occur before the head tree's base row is even full"
    );
}

/// Scenario 3 — overflow split, `max_base_jobs=4, delay=0`. After filling
/// the head tree to 3 of its 4 base slots, a batch of 3 more items overflows
/// by 2: `partition_if_overflowing(3)` must report `{first: 1, second:
/// Some(2)}`, and actually submitting that batch must grow the forest by
/// one tree, leaving the new head with 2 base slots filled.
#[test]
fn scenario_3_overflow_split_matches_expected_counts() {
    common::init_tracing();
    let state: State<u64, u64> = State::empty(Config::new(4, 0)).unwrap();
    // Fill the head to 3 of its 4 base slots.
    let (emitted, state) = state.update(vec![1, 2, 3], vec![]).unwrap();
    assert!(emitted.is_none());
    assert_eq!(state.base_jobs_on_latest_tree(), vec![1, 2, 3]);

    let split = state.partition_if_overflowing(3);
    assert_eq!(split, OverflowSplit { first: 1, second: Some(2) });

    let trees_before = state.trees().len();
    let (_, state) = state.update(vec![4, 5, 6], vec![]).unwrap();
    assert_eq!(state.trees().len(), trees_before + 1, "overflow must spawn exactly one new tree");
    assert_eq!(state.base_jobs_on_latest_tree().len(), 2, "the new head must hold the 2 overflowed items");
}

/// Scenario 4 — error on over-large batch. `max_base_jobs=4`, submitting 5
/// items must fail with `DataCountExceeded` and leave state untouched.
#[test]
fn scenario_4_over_large_batch_errors_and_leaves_state_untouched() {
    common::init_tracing();
    let state: State<u64, u64> = State::empty(Config::new(4, 0)).unwrap();
    let before = state.clone();
    let err = state.update(vec![1, 2, 3, 4, 5], vec![]).unwrap_err();
    assert!(matches!(err, Error::DataCountExceeded { got: 5, max: 4 }));
    assert_eq!(state, before);
}

/// Scenario 5 — exact emission value, `max_base_jobs=2, delay=0`, merge
/// defined as `+`. Submitting `[3, 5]` and then the required merge
/// completions must eventually emit `8`.
#[test]
fn scenario_5_exact_emission_value() {
    common::init_tracing();
    let state: State<u64, u64> = State::empty(Config::new(2, 0)).unwrap();
    let emissions = drive(state, |round| if round == 0 { vec![3, 5] } else { vec![] }, sum_answer, 6);
    assert_eq!(emissions.first().map(|(a, _)| *a), Some(8));
}

/// Scenario 6 — weight reset idempotence. After any `update`, applying
/// `reset_weights` to every tree a second time must yield the same forest
/// (checked indirectly: re-running the same round-answering logic against
/// the post-update forest must not change the job set it exposes).
#[test]
fn scenario_6_post_round_job_set_is_stable_under_reinspection() {
    common::init_tracing();
    let state: State<u64, u64> = State::empty(Config::new(4, 1)).unwrap();
    let (_, state) = state.update(vec![1, 2], vec![]).unwrap();
    let jobs_a = state.work_for_current_tree();
    let jobs_b = state.work_for_current_tree();
    assert_eq!(jobs_a, jobs_b, "re-querying the same forest must be stable");
}
