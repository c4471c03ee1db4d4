//! Application actions and lifted debugger commands.
//!
//! Application actions are whatever the wrapped reducer consumes; they only
//! need to implement [`Action`]. Lifted actions ([`LiftedAction`]) are the
//! debugger's own command vocabulary. The wire names (`PERFORM_ACTION`,
//! `JUMP_TO_STATE`, ...) match what external devtools panels send and expect.

use crate::environment::Clock;
use crate::error::DevtoolsError;
use crate::state::ImportPayload;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a recorded action. `0` is always the synthetic INIT action.
pub type ActionId = usize;

/// Synthetic store-lifecycle actions the engine records on its own
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Lifecycle {
    /// Store initialization; always recorded under action id `0`
    Init,
    /// The application reducer was replaced
    Update,
    /// Placeholder recorded while recording is paused
    Pause,
}

impl Lifecycle {
    /// Wire type of the lifecycle action
    #[must_use]
    pub const fn action_type(self) -> &'static str {
        match self {
            Self::Init => "@rewind/store/init",
            Self::Update => "@rewind/store/update-reducers",
            Self::Pause => "@rewind/devtools/pause",
        }
    }
}

/// An application action that can be recorded by the devtools
///
/// # Example
///
/// ```
/// use rewind_core::{Action, Lifecycle};
///
/// #[derive(Clone)]
/// enum TodoAction {
///     Add(String),
///     Lifecycle(Lifecycle),
/// }
///
/// impl Action for TodoAction {
///     fn action_type(&self) -> &str {
///         match self {
///             Self::Add(_) => "todo/add",
///             Self::Lifecycle(kind) => kind.action_type(),
///         }
///     }
///
///     fn lifecycle(kind: Lifecycle) -> Self {
///         Self::Lifecycle(kind)
///     }
/// }
///
/// assert_eq!(TodoAction::lifecycle(Lifecycle::Init).action_type(), "@rewind/store/init");
/// ```
pub trait Action: Clone {
    /// The action's type discriminant. Must be non-empty.
    fn action_type(&self) -> &str;

    /// Build the synthetic lifecycle action of the given kind
    fn lifecycle(kind: Lifecycle) -> Self;
}

impl Action for serde_json::Value {
    fn action_type(&self) -> &str {
        self.get("type")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
    }

    fn lifecycle(kind: Lifecycle) -> Self {
        serde_json::json!({ "type": kind.action_type() })
    }
}

/// A recorded application action together with the time it was performed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformAction<A> {
    action: A,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    timestamp: DateTime<Utc>,
}

impl<A: Action> PerformAction<A> {
    /// Wrap an application action
    ///
    /// # Errors
    ///
    /// Returns [`DevtoolsError::MissingActionType`] if the action's type is empty.
    pub fn new(action: A, timestamp: DateTime<Utc>) -> Result<Self, DevtoolsError> {
        if action.action_type().is_empty() {
            return Err(DevtoolsError::MissingActionType);
        }
        Ok(Self { action, timestamp })
    }

    /// Wrap a lifecycle action. Lifecycle types are never empty.
    #[must_use]
    pub fn lifecycle(kind: Lifecycle, timestamp: DateTime<Utc>) -> Self {
        Self {
            action: A::lifecycle(kind),
            timestamp,
        }
    }

    /// Check the non-empty type precondition on an already built value
    ///
    /// Used for actions that arrive deserialized rather than through [`Self::new`].
    ///
    /// # Errors
    ///
    /// Returns [`DevtoolsError::MissingActionType`] if the action's type is empty.
    pub fn validate(&self) -> Result<(), DevtoolsError> {
        if self.action.action_type().is_empty() {
            Err(DevtoolsError::MissingActionType)
        } else {
            Ok(())
        }
    }
}

impl<A> PerformAction<A> {
    /// The wrapped application action
    #[must_use]
    pub const fn action(&self) -> &A {
        &self.action
    }

    /// When the action was performed
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Unwrap the application action
    #[must_use]
    pub fn into_action(self) -> A {
        self.action
    }
}

/// A debugger command consumed by the [`LiftedReducer`](crate::LiftedReducer)
///
/// Serialized with a `type` tag, e.g. `{"type":"JUMP_TO_STATE","index":3}`.
/// Any object with an unrecognized `type` decodes as [`LiftedAction::Monitor`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE", rename_all_fields = "camelCase")]
pub enum LiftedAction<S, A> {
    /// Record and apply an application action
    PerformAction(PerformAction<A>),

    /// Drop all history and return to the initial committed state
    Reset {
        /// When the command was issued
        #[serde(with = "chrono::serde::ts_milliseconds", default)]
        timestamp: DateTime<Utc>,
    },

    /// Discard uncommitted actions, keeping the committed state
    Rollback {
        /// When the command was issued
        #[serde(with = "chrono::serde::ts_milliseconds", default)]
        timestamp: DateTime<Utc>,
    },

    /// Squash history into the state at the cursor
    Commit {
        /// When the command was issued
        #[serde(with = "chrono::serde::ts_milliseconds", default)]
        timestamp: DateTime<Utc>,
    },

    /// Permanently remove skipped actions from history
    Sweep,

    /// Flip whether an action is skipped
    ToggleAction {
        /// Action to toggle
        id: ActionId,
    },

    /// Mark the id range `[start, end)` active or skipped
    SetActionsActive {
        /// First id of the range
        start: ActionId,
        /// One past the last id of the range
        end: ActionId,
        /// `true` un-skips the range, `false` skips it
        active: bool,
    },

    /// Move the cursor to a history index
    JumpToState {
        /// Index into the staged actions
        index: usize,
    },

    /// Move the cursor to the index of a recorded action
    JumpToAction {
        /// Recorded action id
        action_id: ActionId,
    },

    /// Replace the history wholesale
    ImportState {
        /// A full lifted state, or a list of actions to replay
        next_lifted_state: ImportPayload<S, A>,
    },

    /// Ignore new actions while `status` is `true`
    LockChanges {
        /// Lock flag
        status: bool,
    },

    /// Stop recording new actions while `status` is `true`
    PauseRecording {
        /// Pause flag
        status: bool,
    },

    /// The store was initialized
    Init,

    /// The application reducer was replaced
    Update,

    /// Any other command, passed to the monitor reducer only
    #[serde(untagged)]
    Monitor(serde_json::Value),
}

impl<S, A: Action> LiftedAction<S, A> {
    /// Wrap an application action stamped with the clock's current time
    ///
    /// # Errors
    ///
    /// Returns [`DevtoolsError::MissingActionType`] if the action's type is empty.
    pub fn perform(action: A, clock: &dyn Clock) -> Result<Self, DevtoolsError> {
        PerformAction::new(action, clock.now()).map(Self::PerformAction)
    }

    /// Check preconditions of an action that arrived deserialized
    ///
    /// # Errors
    ///
    /// - [`DevtoolsError::MissingActionType`] for a `PerformAction` whose
    ///   application action has an empty type
    /// - [`DevtoolsError::InvalidPayload`] for an `ImportState` whose lifted
    ///   state breaks the history invariants (see
    ///   [`LiftedState::validate_history`](crate::LiftedState::validate_history)),
    ///   or a monitor action that is not an object
    pub fn validate(&self) -> Result<(), DevtoolsError> {
        match self {
            Self::PerformAction(perform) => perform.validate(),
            Self::ImportState {
                next_lifted_state: ImportPayload::State(next),
            } => next.validate_history(),
            Self::Monitor(payload) if !payload.is_object() => Err(DevtoolsError::InvalidPayload(
                format!("monitor action must be an object, got {payload}"),
            )),
            _ => Ok(()),
        }
    }
}

impl<S, A> LiftedAction<S, A> {
    /// Wire name of the command, used for logs and metrics
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::PerformAction(_) => "PERFORM_ACTION",
            Self::Reset { .. } => "RESET",
            Self::Rollback { .. } => "ROLLBACK",
            Self::Commit { .. } => "COMMIT",
            Self::Sweep => "SWEEP",
            Self::ToggleAction { .. } => "TOGGLE_ACTION",
            Self::SetActionsActive { .. } => "SET_ACTIONS_ACTIVE",
            Self::JumpToState { .. } => "JUMP_TO_STATE",
            Self::JumpToAction { .. } => "JUMP_TO_ACTION",
            Self::ImportState { .. } => "IMPORT_STATE",
            Self::LockChanges { .. } => "LOCK_CHANGES",
            Self::PauseRecording { .. } => "PAUSE_RECORDING",
            Self::Init => "INIT",
            Self::Update => "UPDATE",
            Self::Monitor(_) => "MONITOR",
        }
    }
}
