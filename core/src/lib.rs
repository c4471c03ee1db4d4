//! # Rewind Core
//!
//! The lifted state-replay engine behind Rewind's time-travel debugger.
//!
//! This crate wraps an application's reducer so that every dispatched action is
//! recorded, replayable, skippable and revertible. It is purely synchronous:
//! the asynchronous controller that feeds it lives in `rewind-runtime`.
//!
//! ## Core Concepts
//!
//! - **Reducer**: The application's state transition `(State, Action) → State`
//! - **Lifted action**: A debugger command ([`LiftedAction`]) such as perform,
//!   commit, toggle or jump
//! - **Lifted state**: The history record ([`LiftedState`]): action log, staged
//!   ids, skip set, committed baseline, cursor and the computed-states cache
//! - **Unlifted state**: The real application state at the cursor
//!   ([`unlift_state`])
//!
//! ## Data Flow
//!
//! ```text
//! app action ──► PerformAction ──► LiftedReducer ──► recompute_states
//!                                        │
//!                                        ▼
//!                                  LiftedState ──► unlift_state ──► app
//! ```
//!
//! ## Example
//!
//! ```
//! use rewind_core::{
//!     unlift_state, Action, Lifecycle, LiftOptions, LiftedAction, LiftedReducer, Reducer,
//!     ReducerError,
//! };
//!
//! #[derive(Clone, Debug)]
//! enum CounterAction {
//!     Increment,
//!     Lifecycle(Lifecycle),
//! }
//!
//! impl Action for CounterAction {
//!     fn action_type(&self) -> &str {
//!         match self {
//!             Self::Increment => "increment",
//!             Self::Lifecycle(kind) => kind.action_type(),
//!         }
//!     }
//!
//!     fn lifecycle(kind: Lifecycle) -> Self {
//!         Self::Lifecycle(kind)
//!     }
//! }
//!
//! struct Counter;
//!
//! impl Reducer for Counter {
//!     type State = i64;
//!     type Action = CounterAction;
//!
//!     fn reduce(&self, state: &mut i64, action: &CounterAction) -> Result<(), ReducerError> {
//!         if matches!(action, CounterAction::Increment) {
//!             *state += 1;
//!         }
//!         Ok(())
//!     }
//! }
//!
//! let options = LiftOptions::default();
//! let lifted = LiftedReducer::new(0, None, options.clone());
//! let mut state = lifted.reduce(&Counter, lifted.initial_state(), &LiftedAction::Init);
//!
//! let perform = LiftedAction::perform(CounterAction::Increment, options.clock.as_ref())?;
//! state = lifted.reduce(&Counter, state, &perform);
//! assert_eq!(*unlift_state(&state), 1);
//! assert_eq!(state.staged_action_ids, vec![0, 1]);
//! # Ok::<(), rewind_core::DevtoolsError>(())
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};

/// Action model: application actions and lifted debugger commands
pub mod action;

/// Error types for the devtools engine
pub mod error;

/// Lifted reducer state machine
pub mod lifted;

/// Incremental recomputation of the computed-states cache
pub mod recompute;

/// Lifted state (history record) and its projections
pub mod state;

/// Reducer module - the application's state transition function
///
/// The lifted reducer replays recorded actions through a [`Reducer`](reducer::Reducer)
/// many times over, so reducers must be deterministic: the same state and action
/// always produce the same next state.
pub mod reducer {
    use thiserror::Error;

    /// Error returned by a wrapped reducer
    ///
    /// A reducer error does not abort replay. It is recorded on the affected
    /// history entry and blocks every later entry until the history is
    /// truncated by a commit, rollback or reset.
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    #[error("{0}")]
    pub struct ReducerError(String);

    impl ReducerError {
        /// Create a reducer error from any message
        #[must_use]
        pub fn new(message: impl Into<String>) -> Self {
            Self(message.into())
        }

        /// The error message
        #[must_use]
        pub fn message(&self) -> &str {
            &self.0
        }
    }

    impl From<String> for ReducerError {
        fn from(message: String) -> Self {
            Self(message)
        }
    }

    impl From<&str> for ReducerError {
        fn from(message: &str) -> Self {
            Self(message.to_string())
        }
    }

    /// The Reducer trait - the application's business logic
    ///
    /// # Type Parameters
    ///
    /// - `State`: The application state
    /// - `Action`: The application action type
    ///
    /// # Example
    ///
    /// ```ignore
    /// impl Reducer for TodoReducer {
    ///     type State = TodoState;
    ///     type Action = TodoAction;
    ///
    ///     fn reduce(&self, state: &mut TodoState, action: &TodoAction) -> Result<(), ReducerError> {
    ///         match action {
    ///             TodoAction::Add { title } => {
    ///                 state.items.push(title.clone());
    ///                 Ok(())
    ///             }
    ///             TodoAction::Remove { index } if *index >= state.items.len() => {
    ///                 Err(ReducerError::new("index out of range"))
    ///             }
    ///             _ => Ok(()),
    ///         }
    ///     }
    /// }
    /// ```
    pub trait Reducer: Send + Sync {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// Apply an action to the state in place
        ///
        /// On error the engine discards whatever was written to `state`; the
        /// previous state is kept for the failed entry.
        ///
        /// # Errors
        ///
        /// Returns [`ReducerError`] when the action cannot be applied.
        fn reduce(&self, state: &mut Self::State, action: &Self::Action)
        -> Result<(), ReducerError>;
    }

    impl<R> Reducer for std::sync::Arc<R>
    where
        R: Reducer + ?Sized,
    {
        type State = R::State;
        type Action = R::Action;

        fn reduce(
            &self,
            state: &mut Self::State,
            action: &Self::Action,
        ) -> Result<(), ReducerError> {
            (**self).reduce(state, action)
        }
    }
}

/// Environment module - injected dependencies
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// Lifted actions carry a timestamp taken from the clock at the moment
    /// they are created.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// // Test - fixed time for deterministic tests
    /// struct FixedClock { time: DateTime<Utc> }
    /// impl Clock for FixedClock {
    ///     fn now(&self) -> DateTime<Utc> {
    ///         self.time
    ///     }
    /// }
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}

pub use action::{Action, ActionId, Lifecycle, LiftedAction, PerformAction};
pub use environment::{Clock, SystemClock};
pub use error::{DevtoolsError, Result};
pub use lifted::{LiftOptions, LiftedReducer, MonitorReducer, noop_monitor};
pub use recompute::{INTERRUPTED_BY_ERROR, recompute_states};
pub use reducer::{Reducer, ReducerError};
pub use state::{ComputedState, ImportPayload, LiftedState, lift_initial_state, unlift_state};
