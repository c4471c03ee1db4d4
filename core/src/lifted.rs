//! The lifted reducer: the devtools state machine.
//!
//! [`LiftedReducer::reduce`] takes the current [`LiftedState`] and one
//! [`LiftedAction`] and returns the next lifted state. Every transition
//! updates the bookkeeping fields, then replays the invalidated suffix of the
//! history through the wrapped reducer, then runs the monitor reducer.
//!
//! | Command              | History effect                                   | Replayed from       |
//! |----------------------|--------------------------------------------------|---------------------|
//! | `PERFORM_ACTION`     | appends one action (auto-commits past `max_age`) | new tip only        |
//! | `RESET`              | drops everything, back to the initial state      | start               |
//! | `COMMIT`             | squashes history into the state at the cursor    | start               |
//! | `ROLLBACK`           | drops uncommitted actions                        | start               |
//! | `TOGGLE_ACTION`      | flips one id in the skip set                     | toggled action      |
//! | `SET_ACTIONS_ACTIVE` | skips / un-skips an id range                     | range start         |
//! | `JUMP_TO_STATE`      | moves the cursor                                 | nothing             |
//! | `SWEEP`              | removes skipped actions                          | start               |
//! | `IMPORT_STATE`       | replaces history                                 | missing tail only   |
//! | `INIT` / `UPDATE`    | none (enforces `max_age`)                        | start               |

use crate::action::{Action, Lifecycle, LiftedAction, PerformAction};
use crate::environment::{Clock, SystemClock};
use crate::error::DevtoolsError;
use crate::recompute::{compute_next_entry, recompute_states};
use crate::reducer::Reducer;
use crate::state::{ImportPayload, LiftedState, lift_initial_state};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Pluggable reducer for auxiliary monitor UI state
///
/// Receives the previous monitor state (`Value::Null` initially) and every
/// lifted action; the engine never interprets its output.
pub type MonitorReducer<S, A> = Arc<dyn Fn(&Value, &LiftedAction<S, A>) -> Value + Send + Sync>;

/// A monitor reducer that keeps no state
#[must_use]
pub fn noop_monitor<S, A>() -> MonitorReducer<S, A> {
    Arc::new(|_, _| Value::Null)
}

/// Engine options
///
/// # Example
///
/// ```
/// use rewind_core::{DevtoolsError, LiftOptions};
///
/// let options = LiftOptions::default().with_max_age(25)?;
/// assert_eq!(options.max_age, Some(25));
///
/// assert_eq!(
///     LiftOptions::default().with_max_age(1).unwrap_err(),
///     DevtoolsError::InvalidMaxAge(1),
/// );
/// # Ok::<(), DevtoolsError>(())
/// ```
#[derive(Clone)]
pub struct LiftOptions {
    /// Maximum number of staged actions (INIT included); `None` is unbounded
    pub max_age: Option<usize>,
    /// Source of timestamps for actions the engine creates itself
    pub clock: Arc<dyn Clock>,
}

impl LiftOptions {
    /// Cap the staged history at `max_age` entries
    ///
    /// # Errors
    ///
    /// Returns [`DevtoolsError::InvalidMaxAge`] if `max_age < 2`.
    pub fn with_max_age(mut self, max_age: usize) -> Result<Self, DevtoolsError> {
        if max_age < 2 {
            return Err(DevtoolsError::InvalidMaxAge(max_age));
        }
        self.max_age = Some(max_age);
        Ok(self)
    }

    /// Remove the history cap
    #[must_use]
    pub const fn without_max_age(mut self) -> Self {
        self.max_age = None;
        self
    }

    /// Use a different clock
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

impl Default for LiftOptions {
    fn default() -> Self {
        Self {
            max_age: None,
            clock: Arc::new(SystemClock),
        }
    }
}

impl fmt::Debug for LiftOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiftOptions")
            .field("max_age", &self.max_age)
            .field("clock", &"<clock>")
            .finish()
    }
}

/// The devtools state machine wrapping an application reducer
///
/// The wrapped reducer is passed to every [`reduce`](Self::reduce) call rather
/// than owned, so the application reducer can be hot-swapped between
/// transitions (follow a swap with [`LiftedAction::Update`]).
pub struct LiftedReducer<S, A> {
    initial_committed_state: S,
    monitor: MonitorReducer<S, A>,
    options: LiftOptions,
}

impl<S, A> LiftedReducer<S, A>
where
    S: Clone,
    A: Action,
{
    /// Create a lifted reducer
    ///
    /// # Arguments
    ///
    /// - `initial_committed_state`: State that `RESET` returns to
    /// - `monitor`: Monitor reducer; `None` keeps a `null` monitor state
    /// - `options`: History cap and clock
    #[must_use]
    pub fn new(
        initial_committed_state: S,
        monitor: Option<MonitorReducer<S, A>>,
        options: LiftOptions,
    ) -> Self {
        Self {
            initial_committed_state,
            monitor: monitor.unwrap_or_else(noop_monitor),
            options,
        }
    }

    /// The monitor reducer in use
    #[must_use]
    pub const fn monitor(&self) -> &MonitorReducer<S, A> {
        &self.monitor
    }

    /// The engine options
    #[must_use]
    pub const fn options(&self) -> &LiftOptions {
        &self.options
    }

    /// The lifted state a session starts from; see [`lift_initial_state`]
    #[must_use]
    pub fn initial_state(&self) -> LiftedState<S, A> {
        lift_initial_state(
            self.initial_committed_state.clone(),
            &self.monitor,
            self.options.clock.as_ref(),
        )
    }

    /// Bind an application reducer, yielding the lifted transition function
    pub fn bind<'a, R>(
        &'a self,
        reducer: &'a R,
    ) -> impl Fn(LiftedState<S, A>, &LiftedAction<S, A>) -> LiftedState<S, A> + 'a
    where
        R: Reducer<State = S, Action = A> + ?Sized,
    {
        move |lifted, action| self.reduce(reducer, lifted, action)
    }

    /// Apply one lifted action
    ///
    /// Never fails: reducer faults are recorded on the affected computed
    /// entries. While changes are locked a `PerformAction` returns the state
    /// unchanged, monitor included. An imported lifted state that fails
    /// [`LiftedState::validate_history`] is ignored.
    #[allow(clippy::too_many_lines)]
    pub fn reduce<R>(
        &self,
        reducer: &R,
        mut lifted: LiftedState<S, A>,
        action: &LiftedAction<S, A>,
    ) -> LiftedState<S, A>
    where
        R: Reducer<State = S, Action = A> + ?Sized,
    {
        if lifted.is_locked && matches!(action, LiftedAction::PerformAction(_)) {
            tracing::debug!("Changes are locked, ignoring action");
            return lifted;
        }

        tracing::debug!(action = action.kind(), "Applying lifted action");

        // By default recompute everything.
        let mut min_invalidated_state_index = 0;

        match action {
            LiftedAction::LockChanges { status } => {
                lifted.is_locked = *status;
                min_invalidated_state_index = usize::MAX;
            },
            LiftedAction::PauseRecording { status } => {
                if *status && !lifted.is_paused {
                    self.record_pause(&mut lifted);
                    min_invalidated_state_index = usize::MAX;
                } else if !*status && lifted.is_paused {
                    lifted.is_paused = false;
                    lifted.commit_changes(self.options.clock.now());
                } else {
                    min_invalidated_state_index = usize::MAX;
                }
            },
            LiftedAction::Reset { timestamp } => {
                lifted.reset_history(self.initial_committed_state.clone(), *timestamp);
            },
            LiftedAction::Commit { timestamp } => {
                lifted.commit_changes(*timestamp);
            },
            LiftedAction::Rollback { timestamp } => {
                let committed = lifted.committed_state.clone();
                lifted.reset_history(committed, *timestamp);
            },
            LiftedAction::ToggleAction { id } => {
                if !lifted.skipped_action_ids.remove(id) {
                    lifted.skipped_action_ids.insert(*id);
                }
                min_invalidated_state_index = lifted.staged_index_of(*id).unwrap_or(0);
            },
            LiftedAction::SetActionsActive { start, end, active } => {
                for id in *start..*end {
                    if *active {
                        lifted.skipped_action_ids.remove(&id);
                    } else {
                        lifted.skipped_action_ids.insert(id);
                    }
                }
                min_invalidated_state_index = lifted.staged_index_of(*start).unwrap_or(0);
            },
            LiftedAction::JumpToState { index } => {
                lifted.current_state_index = clamp_cursor(&lifted, *index);
                min_invalidated_state_index = usize::MAX;
            },
            LiftedAction::JumpToAction { action_id } => {
                match lifted.staged_index_of(*action_id) {
                    Some(index) => lifted.current_state_index = index,
                    None => tracing::warn!(action_id, "Jump target is not a staged action"),
                }
                min_invalidated_state_index = usize::MAX;
            },
            LiftedAction::Sweep => {
                let skipped = std::mem::take(&mut lifted.skipped_action_ids);
                lifted
                    .staged_action_ids
                    .retain(|id| *id == 0 || !skipped.contains(id));
                for id in skipped.into_iter().filter(|id| *id != 0) {
                    lifted.actions_by_id.remove(&id);
                }
                lifted.current_state_index = lifted
                    .current_state_index
                    .min(lifted.staged_action_ids.len().saturating_sub(1));
            },
            LiftedAction::PerformAction(perform) => {
                if lifted.is_paused {
                    // Keep the app live without recording: overwrite the last entry.
                    if let Some(last) = lifted.computed_states.last_mut() {
                        let entry = compute_next_entry(
                            reducer,
                            perform.action(),
                            &last.state,
                            last.error.as_deref(),
                        );
                        *last = entry;
                    }
                    min_invalidated_state_index = usize::MAX;
                } else {
                    if let Some(max_age) = self.options.max_age {
                        let staged = lifted.staged_action_ids.len();
                        if staged >= max_age {
                            lifted.commit_excess_actions(staged + 1 - max_age);
                        }
                    }

                    if lifted.current_state_index + 1 == lifted.staged_action_ids.len() {
                        lifted.current_state_index += 1;
                    }

                    let action_id = lifted.next_action_id;
                    lifted.next_action_id += 1;
                    // The only in-place write to the action log: the key is always fresh.
                    lifted.actions_by_id.insert(action_id, perform.clone());
                    lifted.staged_action_ids.push(action_id);

                    min_invalidated_state_index = lifted.staged_action_ids.len() - 1;
                }
            },
            LiftedAction::ImportState { next_lifted_state } => match next_lifted_state {
                ImportPayload::State(next) => {
                    match next.validate_history() {
                        Ok(()) => lifted = (**next).clone(),
                        Err(err) => tracing::warn!(error = %err, "Ignoring invalid import"),
                    }
                    // The imported cache is trusted; only a missing tail is replayed.
                    min_invalidated_state_index = usize::MAX;
                },
                ImportPayload::Actions(actions) => {
                    self.import_actions(&mut lifted, actions);
                },
            },
            LiftedAction::Init | LiftedAction::Update => {
                if let Some(max_age) = self.options.max_age {
                    let staged = lifted.staged_action_ids.len();
                    if staged > max_age {
                        // Errors must be known before deciding how much to commit.
                        lifted.computed_states = recompute_states(
                            std::mem::take(&mut lifted.computed_states),
                            0,
                            reducer,
                            &lifted.committed_state,
                            &lifted.actions_by_id,
                            &lifted.staged_action_ids,
                            &lifted.skipped_action_ids,
                            lifted.is_paused,
                        );
                        lifted.commit_excess_actions(staged - max_age);
                        min_invalidated_state_index = usize::MAX;
                    }
                }
            },
            LiftedAction::Monitor(_) => {
                min_invalidated_state_index = usize::MAX;
            },
        }

        lifted.computed_states = recompute_states(
            std::mem::take(&mut lifted.computed_states),
            min_invalidated_state_index,
            reducer,
            &lifted.committed_state,
            &lifted.actions_by_id,
            &lifted.staged_action_ids,
            &lifted.skipped_action_ids,
            lifted.is_paused,
        );
        lifted.monitor_state = (self.monitor)(&lifted.monitor_state, action);

        lifted
    }

    /// Append the synthetic pause action whose entry mirrors the live state
    fn record_pause(&self, lifted: &mut LiftedState<S, A>) {
        lifted.is_paused = true;

        let action_id = lifted.next_action_id;
        lifted.next_action_id += 1;
        lifted.actions_by_id.insert(
            action_id,
            PerformAction::lifecycle(Lifecycle::Pause, self.options.clock.now()),
        );
        lifted.staged_action_ids.push(action_id);

        if let Some(last) = lifted.computed_states.last().cloned() {
            lifted.computed_states.push(last);
        }
        if lifted.current_state_index + 2 == lifted.staged_action_ids.len() {
            lifted.current_state_index += 1;
        }
    }

    /// Rebuild history from the initial state with one entry per action
    fn import_actions(&self, lifted: &mut LiftedState<S, A>, actions: &[A]) {
        let now = self.options.clock.now();
        lifted.reset_history(self.initial_committed_state.clone(), now);

        for action in actions {
            match PerformAction::new(action.clone(), now) {
                Ok(perform) => {
                    let action_id = lifted.next_action_id;
                    lifted.next_action_id += 1;
                    lifted.actions_by_id.insert(action_id, perform);
                    lifted.staged_action_ids.push(action_id);
                },
                Err(err) => tracing::warn!(error = %err, "Skipping imported action"),
            }
        }

        lifted.current_state_index = lifted.staged_action_ids.len() - 1;
    }
}

fn clamp_cursor<S, A>(lifted: &LiftedState<S, A>, index: usize) -> usize {
    let last = lifted.staged_action_ids.len().saturating_sub(1);
    if index > last {
        tracing::warn!(index, last, "Jump index out of range, clamping");
    }
    index.min(last)
}

impl<S, A> fmt::Debug for LiftedReducer<S, A>
where
    S: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiftedReducer")
            .field("initial_committed_state", &self.initial_committed_state)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::reducer::ReducerError;
    use crate::state::unlift_state;
    use chrono::{DateTime, TimeZone, Utc};
    use serde_json::json;

    struct FixedClock;

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            Utc.timestamp_millis_opt(1_700_000_000_000).unwrap()
        }
    }

    struct Counter;

    impl Reducer for Counter {
        type State = i64;
        type Action = Value;

        fn reduce(&self, state: &mut i64, action: &Value) -> Result<(), ReducerError> {
            match action.action_type() {
                "increment" => *state += 1,
                "decrement" => *state -= 1,
                "fail" => return Err(ReducerError::new("counter is jammed")),
                _ => {},
            }
            Ok(())
        }
    }

    type Lifted = LiftedState<i64, Value>;

    fn options() -> LiftOptions {
        LiftOptions::default().with_clock(Arc::new(FixedClock))
    }

    fn engine(options: LiftOptions) -> LiftedReducer<i64, Value> {
        LiftedReducer::new(0, None, options)
    }

    fn started(engine: &LiftedReducer<i64, Value>) -> Lifted {
        engine.reduce(&Counter, engine.initial_state(), &LiftedAction::Init)
    }

    fn perform(kind: &str) -> LiftedAction<i64, Value> {
        LiftedAction::perform(json!({ "type": kind }), &FixedClock).unwrap()
    }

    fn apply(
        engine: &LiftedReducer<i64, Value>,
        lifted: Lifted,
        actions: &[LiftedAction<i64, Value>],
    ) -> Lifted {
        actions
            .iter()
            .fold(lifted, |state, action| engine.reduce(&Counter, state, action))
    }

    fn increments(engine: &LiftedReducer<i64, Value>, n: usize) -> Lifted {
        let actions = vec![perform("increment"); n];
        apply(engine, started(engine), &actions)
    }

    fn computed(lifted: &Lifted) -> Vec<i64> {
        lifted.computed_states.iter().map(|e| e.state).collect()
    }

    #[test]
    fn init_computes_the_initial_entry() {
        let engine = engine(options());
        let lifted = started(&engine);

        assert_eq!(lifted.staged_action_ids, vec![0]);
        assert_eq!(computed(&lifted), vec![0]);
        assert_eq!(*unlift_state(&lifted), 0);
    }

    #[test]
    fn toggle_then_sweep_removes_the_skipped_action() {
        let engine = engine(options());
        let lifted = increments(&engine, 3);
        assert_eq!(lifted.staged_action_ids, vec![0, 1, 2, 3]);
        assert_eq!(*unlift_state(&lifted), 3);

        let lifted = engine.reduce(&Counter, lifted, &LiftedAction::ToggleAction { id: 2 });
        assert!(lifted.is_skipped(2));
        assert_eq!(*unlift_state(&lifted), 2);

        let lifted = engine.reduce(&Counter, lifted, &LiftedAction::Sweep);
        assert_eq!(lifted.staged_action_ids, vec![0, 1, 3]);
        assert!(lifted.skipped_action_ids.is_empty());
        assert!(!lifted.actions_by_id.contains_key(&2));
        assert_eq!(lifted.current_state_index, 2);
        assert_eq!(*unlift_state(&lifted), 2);
    }

    #[test]
    fn toggling_twice_restores_the_action() {
        let engine = engine(options());
        let lifted = increments(&engine, 3);

        let toggle = LiftedAction::ToggleAction { id: 1 };
        let lifted = apply(&engine, lifted, &[toggle.clone(), toggle]);
        assert!(lifted.skipped_action_ids.is_empty());
        assert_eq!(computed(&lifted), vec![0, 1, 2, 3]);
    }

    #[test]
    fn set_actions_active_covers_a_half_open_range() {
        let engine = engine(options());
        let lifted = increments(&engine, 3);

        let lifted = engine.reduce(
            &Counter,
            lifted,
            &LiftedAction::SetActionsActive { start: 1, end: 3, active: false },
        );
        assert_eq!(lifted.skipped_action_ids.iter().copied().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(*unlift_state(&lifted), 1);

        let lifted = engine.reduce(
            &Counter,
            lifted,
            &LiftedAction::SetActionsActive { start: 1, end: 3, active: true },
        );
        assert!(lifted.skipped_action_ids.is_empty());
        assert_eq!(*unlift_state(&lifted), 3);
    }

    #[test]
    fn commit_squashes_history_at_the_cursor() {
        let engine = engine(options());
        let lifted = increments(&engine, 3);

        let lifted = apply(
            &engine,
            lifted,
            &[
                LiftedAction::JumpToState { index: 2 },
                LiftedAction::Commit { timestamp: FixedClock.now() },
            ],
        );
        assert_eq!(lifted.committed_state, 2);
        assert_eq!(lifted.staged_action_ids, vec![0]);
        assert_eq!(lifted.next_action_id, 1);
        assert_eq!(computed(&lifted), vec![2]);
        assert_eq!(lifted.current_state_index, 0);
    }

    #[test]
    fn rollback_returns_to_the_committed_state() {
        let engine = engine(options());
        let lifted = increments(&engine, 2);

        let lifted = apply(
            &engine,
            lifted,
            &[
                LiftedAction::Commit { timestamp: FixedClock.now() },
                perform("increment"),
                perform("increment"),
                LiftedAction::Rollback { timestamp: FixedClock.now() },
            ],
        );
        assert_eq!(lifted.staged_action_ids, vec![0]);
        assert_eq!(*unlift_state(&lifted), 2);
    }

    #[test]
    fn reset_returns_to_the_initial_state() {
        let engine = engine(options());
        let lifted = increments(&engine, 2);

        let lifted = apply(
            &engine,
            lifted,
            &[
                LiftedAction::Commit { timestamp: FixedClock.now() },
                perform("increment"),
                LiftedAction::Reset { timestamp: FixedClock.now() },
            ],
        );
        assert_eq!(lifted.committed_state, 0);
        assert_eq!(lifted.staged_action_ids, vec![0]);
        assert_eq!(lifted.next_action_id, 1);
        assert_eq!(*unlift_state(&lifted), 0);
    }

    #[test]
    fn max_age_commits_the_oldest_actions() {
        let engine = engine(options().with_max_age(3).unwrap());
        let lifted = increments(&engine, 4);

        assert_eq!(lifted.staged_action_ids, vec![0, 3, 4]);
        assert_eq!(lifted.committed_state, 2);
        assert_eq!(computed(&lifted), vec![2, 3, 4]);
        assert_eq!(lifted.current_state_index, 2);
        assert_eq!(lifted.next_action_id, 5);
    }

    #[test]
    fn max_age_never_commits_past_an_error() {
        let engine = engine(options().with_max_age(3).unwrap());
        let lifted = apply(
            &engine,
            started(&engine),
            &[perform("fail"), perform("increment"), perform("increment")],
        );

        // The failing action stays staged, so the history grows past the cap.
        assert_eq!(lifted.staged_action_ids, vec![0, 1, 2, 3]);
        assert_eq!(lifted.computed_states[1].error.as_deref(), Some("counter is jammed"));
        assert_eq!(
            lifted.computed_states[3].error.as_deref(),
            Some(crate::recompute::INTERRUPTED_BY_ERROR)
        );
        assert_eq!(*unlift_state(&lifted), 0);
    }

    #[test]
    fn jump_moves_only_the_cursor() {
        let engine = engine(options());
        let lifted = increments(&engine, 3);
        let before = lifted.clone();

        let lifted = engine.reduce(&Counter, lifted, &LiftedAction::JumpToState { index: 1 });
        assert_eq!(lifted.current_state_index, 1);
        assert_eq!(*unlift_state(&lifted), 1);
        assert_eq!(lifted.staged_action_ids, before.staged_action_ids);
        assert_eq!(lifted.computed_states, before.computed_states);

        // A new action while looking at the past is recorded without moving the cursor.
        let lifted = engine.reduce(&Counter, lifted, &perform("increment"));
        assert_eq!(lifted.current_state_index, 1);
        assert_eq!(lifted.staged_action_ids, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn jump_past_the_end_is_clamped() {
        let engine = engine(options());
        let lifted = increments(&engine, 2);

        let lifted = engine.reduce(&Counter, lifted, &LiftedAction::JumpToState { index: 40 });
        assert_eq!(lifted.current_state_index, 2);
    }

    #[test]
    fn jump_to_action_finds_its_staged_index() {
        let engine = engine(options());
        let lifted = increments(&engine, 3);

        let lifted = engine.reduce(&Counter, lifted, &LiftedAction::JumpToAction { action_id: 2 });
        assert_eq!(lifted.current_state_index, 2);

        let lifted = engine.reduce(&Counter, lifted, &LiftedAction::JumpToAction { action_id: 99 });
        assert_eq!(lifted.current_state_index, 2);
    }

    #[test]
    fn import_of_an_export_reproduces_the_state() {
        let engine = engine(options());
        let lifted = apply(
            &engine,
            increments(&engine, 3),
            &[LiftedAction::ToggleAction { id: 2 }, LiftedAction::JumpToState { index: 2 }],
        );

        let exported: Lifted = serde_json::from_value(lifted.export().unwrap()).unwrap();
        let imported = engine.reduce(
            &Counter,
            started(&engine),
            &LiftedAction::ImportState {
                next_lifted_state: ImportPayload::State(Box::new(exported)),
            },
        );
        assert_eq!(imported, lifted);
    }

    #[test]
    fn import_of_a_broken_history_is_ignored() {
        let engine = engine(options());
        let lifted = increments(&engine, 2);

        let mut broken = lifted.clone();
        broken.staged_action_ids.clear();
        broken.computed_states.clear();
        broken.actions_by_id.clear();
        broken.current_state_index = 0;
        broken.is_paused = true;

        let import = LiftedAction::ImportState {
            next_lifted_state: ImportPayload::State(Box::new(broken)),
        };
        let after = apply(&engine, lifted.clone(), &[import, LiftedAction::Sweep]);

        assert_eq!(after.staged_action_ids, lifted.staged_action_ids);
        assert_eq!(computed(&after), vec![0, 1, 2]);
        assert_eq!(*unlift_state(&after), 2);
    }

    #[test]
    fn import_of_plain_actions_replays_them() {
        let engine = engine(options());
        let lifted = engine.reduce(
            &Counter,
            increments(&engine, 5),
            &LiftedAction::ImportState {
                next_lifted_state: ImportPayload::Actions(vec![
                    json!({ "type": "increment" }),
                    json!({ "type": "decrement" }),
                    json!({ "type": "increment" }),
                ]),
            },
        );

        assert_eq!(lifted.staged_action_ids, vec![0, 1, 2, 3]);
        assert_eq!(computed(&lifted), vec![0, 1, 0, 1]);
        assert_eq!(lifted.current_state_index, 3);
    }

    #[test]
    fn locked_changes_ignore_new_actions() {
        let engine = engine(options());
        let lifted = apply(
            &engine,
            increments(&engine, 1),
            &[LiftedAction::LockChanges { status: true }, perform("increment")],
        );
        assert!(lifted.is_locked);
        assert_eq!(lifted.staged_action_ids, vec![0, 1]);

        let lifted = apply(
            &engine,
            lifted,
            &[LiftedAction::LockChanges { status: false }, perform("increment")],
        );
        assert_eq!(*unlift_state(&lifted), 2);
    }

    #[test]
    fn paused_recording_keeps_the_app_live() {
        let engine = engine(options());
        let lifted = engine.reduce(
            &Counter,
            increments(&engine, 2),
            &LiftedAction::PauseRecording { status: true },
        );
        assert!(lifted.is_paused);
        assert_eq!(lifted.staged_action_ids, vec![0, 1, 2, 3]);
        assert_eq!(
            lifted.actions_by_id[&3].action().action_type(),
            Lifecycle::Pause.action_type()
        );

        let lifted = apply(&engine, lifted, &[perform("increment"), perform("increment")]);
        assert_eq!(lifted.staged_action_ids, vec![0, 1, 2, 3]);
        assert_eq!(*unlift_state(&lifted), 4);

        let lifted = engine.reduce(&Counter, lifted, &LiftedAction::PauseRecording { status: false });
        assert!(!lifted.is_paused);
        assert_eq!(lifted.staged_action_ids, vec![0]);
        assert_eq!(lifted.committed_state, 4);
        assert_eq!(*unlift_state(&lifted), 4);
    }

    #[test]
    fn update_enforces_max_age() {
        let unbounded = engine(options());
        let lifted = increments(&unbounded, 5);

        let bounded = engine(options().with_max_age(3).unwrap());
        let lifted = bounded.reduce(&Counter, lifted, &LiftedAction::Update);

        assert_eq!(lifted.staged_action_ids, vec![0, 4, 5]);
        assert_eq!(lifted.committed_state, 3);
        assert_eq!(*unlift_state(&lifted), 5);
    }

    #[test]
    fn monitor_sees_every_lifted_action() {
        let monitor: MonitorReducer<i64, Value> =
            Arc::new(|previous, _| json!(previous.as_u64().unwrap_or(0) + 1));
        let engine = LiftedReducer::new(0, Some(monitor), options());

        let lifted = apply(
            &engine,
            engine.initial_state(),
            &[
                LiftedAction::Init,
                perform("increment"),
                LiftedAction::Monitor(json!({ "type": "SELECT" })),
            ],
        );
        assert_eq!(lifted.monitor_state, json!(4));
        assert_eq!(lifted.staged_action_ids, vec![0, 1]);
    }

    #[test]
    fn bound_reducer_folds_actions() {
        let engine = engine(options());
        let step = engine.bind(&Counter);

        let lifted = step(engine.initial_state(), &LiftedAction::Init);
        let lifted = step(lifted, &perform("decrement"));
        assert_eq!(*unlift_state(&lifted), -1);
    }
}
