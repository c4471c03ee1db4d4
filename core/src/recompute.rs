//! Incremental recomputation of the computed-states cache.
//!
//! `computed_states[i]` is the state obtained by replaying
//! `staged_action_ids[0..=i]` from the committed state. After a transition only
//! the suffix from the first invalidated index is replayed; the prefix is kept
//! as is.
//!
//! # Skipped actions
//!
//! A skipped entry is not recomputed: it keeps its previously cached value
//! (frozen at whatever it last showed). Replay of later entries continues from
//! the most recent entry that is not skipped, so their states reflect only the
//! active actions.
//!
//! # Errors
//!
//! A reducer error, or a panic inside the reducer, is logged and recorded on
//! the entry; the entry keeps the previous state. Every later entry is marked
//! [`INTERRUPTED_BY_ERROR`] and keeps that same state until the history is
//! truncated.

use crate::action::{Action, ActionId, PerformAction};
use crate::reducer::Reducer;
use crate::state::{ComputedState, last_active_index};
use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::panic::{self, AssertUnwindSafe};

/// Error recorded on entries after an earlier entry failed
pub const INTERRUPTED_BY_ERROR: &str = "Interrupted by an error up the chain";

/// Replay the invalidated suffix of the computed-states cache
///
/// Returns `computed_states` untouched (same allocation) when nothing is
/// invalidated and the cache already matches the staged history. Otherwise the
/// result always has exactly `staged_action_ids.len()` entries.
///
/// While `is_paused` is set, the last staged entry mirrors the live state and
/// is carried over from the old cache instead of being replayed.
///
/// # Arguments
///
/// - `computed_states`: The current cache
/// - `min_invalidated_state_index`: First index whose entry must be recomputed
/// - `reducer`: The wrapped application reducer
/// - `committed_state`: Baseline the replay starts from
/// - `actions_by_id`, `staged_action_ids`, `skipped_action_ids`: The history
/// - `is_paused`: Whether recording is paused
#[allow(clippy::too_many_arguments)]
pub fn recompute_states<R>(
    mut computed_states: Vec<ComputedState<R::State>>,
    min_invalidated_state_index: usize,
    reducer: &R,
    committed_state: &R::State,
    actions_by_id: &BTreeMap<ActionId, PerformAction<R::Action>>,
    staged_action_ids: &[ActionId],
    skipped_action_ids: &BTreeSet<ActionId>,
    is_paused: bool,
) -> Vec<ComputedState<R::State>>
where
    R: Reducer + ?Sized,
    R::State: Clone,
    R::Action: Action,
{
    if min_invalidated_state_index >= computed_states.len()
        && computed_states.len() == staged_action_ids.len()
    {
        return computed_states;
    }

    let paused_tail = if is_paused {
        computed_states.last().cloned()
    } else {
        None
    };
    let last_included = staged_action_ids
        .len()
        .saturating_sub(usize::from(paused_tail.is_some()));

    let start = min_invalidated_state_index
        .min(computed_states.len())
        .min(last_included);
    let stale = computed_states.split_off(start);
    let mut next = computed_states;
    next.reserve(staged_action_ids.len().saturating_sub(next.len()));

    tracing::trace!(
        from = start,
        to = last_included,
        "Recomputing devtools history"
    );

    // Index in `next` that replay continues from; `None` means the committed state.
    let mut chain = start
        .checked_sub(1)
        .and_then(|prev| last_active_index(staged_action_ids, skipped_action_ids, prev));

    for (i, &action_id) in staged_action_ids
        .iter()
        .enumerate()
        .take(last_included)
        .skip(start)
    {
        let (previous_state, previous_error) = match chain.and_then(|c| next.get(c)) {
            Some(entry) => (&entry.state, entry.error.as_deref()),
            None => (committed_state, None),
        };

        let entry = if skipped_action_ids.contains(&action_id) {
            match stale.get(i - start) {
                Some(cached) => cached.clone(),
                None => ComputedState {
                    state: previous_state.clone(),
                    error: previous_error.map(str::to_string),
                },
            }
        } else {
            let entry = match actions_by_id.get(&action_id) {
                Some(perform) => {
                    compute_next_entry(reducer, perform.action(), previous_state, previous_error)
                },
                None => {
                    tracing::error!(action_id, "Staged action is missing from the action log");
                    ComputedState::failed(
                        previous_state.clone(),
                        format!("Action {action_id} is not recorded"),
                    )
                },
            };
            chain = Some(i);
            entry
        };

        next.push(entry);
    }

    if let Some(tail) = paused_tail {
        next.push(tail);
    }

    next
}

/// Compute one entry from the previous entry's state and error
pub(crate) fn compute_next_entry<R>(
    reducer: &R,
    action: &R::Action,
    state: &R::State,
    error: Option<&str>,
) -> ComputedState<R::State>
where
    R: Reducer + ?Sized,
    R::State: Clone,
    R::Action: Action,
{
    if error.is_some() {
        return ComputedState::failed(state.clone(), INTERRUPTED_BY_ERROR);
    }

    let mut next_state = state.clone();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        reducer.reduce(&mut next_state, action)
    }));

    match outcome {
        Ok(Ok(())) => ComputedState::ok(next_state),
        Ok(Err(err)) => {
            tracing::error!(
                action_type = action.action_type(),
                error = %err,
                "Reducer returned an error during replay"
            );
            ComputedState::failed(state.clone(), err.to_string())
        },
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::error!(
                action_type = action.action_type(),
                error = %message,
                "Reducer panicked during replay"
            );
            ComputedState::failed(state.clone(), message)
        },
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "Reducer panicked".to_string())
}
