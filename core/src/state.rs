//! The lifted state: the authoritative history record of the devtools.
//!
//! A [`LiftedState`] is a plain value. The lifted reducer consumes one and
//! returns the next; nothing mutates a published snapshot. The serialized form
//! is the JSON object graph external panels exchange (`computedStates`,
//! `stagedActionIds`, ...), so exporting and re-importing a snapshot reproduces
//! it exactly.

use crate::action::{Action, ActionId, Lifecycle, LiftedAction, PerformAction};
use crate::environment::Clock;
use crate::error::DevtoolsError;
use crate::lifted::MonitorReducer;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// One entry of the computed-states cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputedState<S> {
    /// Application state after replaying history up to this entry
    pub state: S,
    /// Reducer failure recorded for this entry, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<S> ComputedState<S> {
    /// A successfully computed entry
    #[must_use]
    pub const fn ok(state: S) -> Self {
        Self { state, error: None }
    }

    /// An entry that carries a reducer error
    #[must_use]
    pub fn failed(state: S, error: impl Into<String>) -> Self {
        Self {
            state,
            error: Some(error.into()),
        }
    }

    /// Whether this entry carries an error
    #[must_use]
    pub const fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// The history record of the devtools
///
/// Invariants once a transition has settled:
/// - `staged_action_ids[0] == 0` (the INIT slot)
/// - `computed_states.len() == staged_action_ids.len()`
/// - `current_state_index < staged_action_ids.len()`
/// - every staged id has an entry in `actions_by_id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiftedState<S, A> {
    /// Opaque state owned by the monitor reducer
    pub monitor_state: Value,
    /// Id that the next recorded action receives
    pub next_action_id: ActionId,
    /// Every recorded action, keyed by id
    pub actions_by_id: BTreeMap<ActionId, PerformAction<A>>,
    /// Ids currently in play, in order, starting with `0`
    pub staged_action_ids: Vec<ActionId>,
    /// Ids whose effect is suppressed during replay
    pub skipped_action_ids: BTreeSet<ActionId>,
    /// Baseline state that replay starts from
    pub committed_state: S,
    /// Cursor into `staged_action_ids` / `computed_states`
    pub current_state_index: usize,
    /// Cache parallel to `staged_action_ids`
    pub computed_states: Vec<ComputedState<S>>,
    /// New actions are ignored while locked
    #[serde(default)]
    pub is_locked: bool,
    /// New actions overwrite the last entry instead of being recorded
    #[serde(default)]
    pub is_paused: bool,
}

/// Payload of an `IMPORT_STATE` command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ImportPayload<S, A> {
    /// A previously exported lifted state
    State(Box<LiftedState<S, A>>),
    /// Plain application actions, replayed from the initial committed state
    Actions(Vec<A>),
}

/// Build the lifted state a devtools session starts from
///
/// History holds only the INIT action under id `0`; the computed-states cache
/// is empty until the first transition recomputes it.
#[must_use]
pub fn lift_initial_state<S, A: Action>(
    initial_committed_state: S,
    monitor: &MonitorReducer<S, A>,
    clock: &dyn Clock,
) -> LiftedState<S, A> {
    LiftedState {
        monitor_state: monitor(&Value::Null, &LiftedAction::Init),
        next_action_id: 1,
        actions_by_id: BTreeMap::from([(0, PerformAction::lifecycle(Lifecycle::Init, clock.now()))]),
        staged_action_ids: vec![0],
        skipped_action_ids: BTreeSet::new(),
        committed_state: initial_committed_state,
        current_state_index: 0,
        computed_states: Vec::new(),
        is_locked: false,
        is_paused: false,
    }
}

/// The real application state at the cursor
///
/// Falls back to the committed state while the cache has no entry for the
/// cursor (only the case before the first transition).
#[must_use]
pub fn unlift_state<S, A>(lifted: &LiftedState<S, A>) -> &S {
    lifted
        .computed_states
        .get(lifted.current_state_index)
        .map_or(&lifted.committed_state, |entry| &entry.state)
}

impl<S, A> LiftedState<S, A> {
    /// The application state at the cursor; see [`unlift_state`]
    #[must_use]
    pub fn current_state(&self) -> &S {
        unlift_state(self)
    }

    /// The computed entry at the cursor
    #[must_use]
    pub fn current_entry(&self) -> Option<&ComputedState<S>> {
        self.computed_states.get(self.current_state_index)
    }

    /// Whether `id` is currently skipped
    #[must_use]
    pub fn is_skipped(&self, id: ActionId) -> bool {
        self.skipped_action_ids.contains(&id)
    }

    /// Position of `id` in the staged history
    #[must_use]
    pub fn staged_index_of(&self, id: ActionId) -> Option<usize> {
        self.staged_action_ids.iter().position(|staged| *staged == id)
    }

    /// Check the history invariants of a snapshot that arrived from outside
    ///
    /// # Errors
    ///
    /// Returns [`DevtoolsError::InvalidPayload`] if the staged history does not
    /// start with the INIT slot `0`, the cursor or the computed-states cache
    /// overrun it, a staged id is not recorded, or `next_action_id` is not
    /// past every recorded id.
    pub fn validate_history(&self) -> Result<(), DevtoolsError> {
        let invalid = |reason: String| Err(DevtoolsError::InvalidPayload(reason));

        let staged = self.staged_action_ids.len();
        if self.staged_action_ids.first() != Some(&0) {
            return invalid("staged history must start with action 0".to_string());
        }
        if self.current_state_index >= staged {
            return invalid(format!(
                "cursor {} is outside a history of {staged} entries",
                self.current_state_index
            ));
        }
        if self.computed_states.len() > staged {
            return invalid(format!(
                "{} computed states for {staged} staged actions",
                self.computed_states.len()
            ));
        }
        if let Some(id) = self
            .staged_action_ids
            .iter()
            .find(|id| !self.actions_by_id.contains_key(id))
        {
            return invalid(format!("staged action {id} is not recorded"));
        }
        if let Some(&last) = self.actions_by_id.keys().next_back() {
            if self.next_action_id <= last {
                return invalid(format!(
                    "next action id {} is not past recorded id {last}",
                    self.next_action_id
                ));
            }
        }
        Ok(())
    }

    /// Export the snapshot as a JSON object graph
    ///
    /// # Errors
    ///
    /// Returns [`DevtoolsError::Serialization`] if the application state or an
    /// action fails to serialize.
    pub fn export(&self) -> Result<Value, DevtoolsError>
    where
        S: Serialize,
        A: Serialize,
    {
        Ok(serde_json::to_value(self)?)
    }
}

impl<S: Clone, A: Action> LiftedState<S, A> {
    /// Drop all history, keeping `committed_state` as the new baseline
    pub(crate) fn reset_history(&mut self, committed_state: S, timestamp: DateTime<Utc>) {
        self.actions_by_id = BTreeMap::from([(0, PerformAction::lifecycle(Lifecycle::Init, timestamp))]);
        self.next_action_id = 1;
        self.staged_action_ids = vec![0];
        self.skipped_action_ids.clear();
        self.committed_state = committed_state;
        self.current_state_index = 0;
        self.computed_states.clear();
    }

    /// Squash the state at the cursor into the committed baseline
    pub(crate) fn commit_changes(&mut self, timestamp: DateTime<Utc>) {
        let committed = unlift_state(self).clone();
        self.reset_history(committed, timestamp);
    }

    /// Promote the oldest `n` staged actions into the committed state
    ///
    /// Index `0` (INIT) is never committed. Stops before the first entry that
    /// carries an error, so a capacity limit never erases an unresolved error.
    pub(crate) fn commit_excess_actions(&mut self, n: usize) {
        let mut excess = n.min(self.staged_action_ids.len().saturating_sub(1));
        if let Some(first_error) = (1..=excess).find(|&i| {
            self.computed_states
                .get(i)
                .is_some_and(ComputedState::is_error)
        }) {
            excess = first_error - 1;
        }
        if excess == 0 {
            return;
        }

        let chain_entry = chain_entry_at(
            &self.computed_states,
            &self.staged_action_ids,
            &self.skipped_action_ids,
            excess,
        )
        .cloned();

        for id in self.staged_action_ids.drain(1..=excess) {
            self.actions_by_id.remove(&id);
            self.skipped_action_ids.remove(&id);
        }

        let baseline = match chain_entry {
            Some(entry) => entry,
            None => ComputedState::ok(self.committed_state.clone()),
        };
        self.committed_state = baseline.state.clone();

        let drained = excess.min(self.computed_states.len());
        self.computed_states.drain(..drained);
        if let Some(first) = self.computed_states.first_mut() {
            *first = baseline;
        }

        self.current_state_index = self.current_state_index.saturating_sub(excess);
    }
}

/// The entry that replay continues from after index `index`
///
/// Skipped entries keep their own stale cached value for display, but the
/// chain carries on from the most recent entry that was not skipped. `None`
/// means the chain starts from the committed state.
pub(crate) fn chain_entry_at<'a, S>(
    computed_states: &'a [ComputedState<S>],
    staged_action_ids: &[ActionId],
    skipped_action_ids: &BTreeSet<ActionId>,
    index: usize,
) -> Option<&'a ComputedState<S>> {
    last_active_index(staged_action_ids, skipped_action_ids, index)
        .and_then(|i| computed_states.get(i))
}

/// Index of the most recent staged entry at or before `index` that is not skipped
pub(crate) fn last_active_index(
    staged_action_ids: &[ActionId],
    skipped_action_ids: &BTreeSet<ActionId>,
    index: usize,
) -> Option<usize> {
    (0..=index).rev().find(|&i| {
        staged_action_ids
            .get(i)
            .is_some_and(|id| !skipped_action_ids.contains(id))
    })
}
