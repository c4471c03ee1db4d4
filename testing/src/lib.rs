//! # Rewind Testing
//!
//! Testing utilities and fixtures for Rewind.
//!
//! This crate provides:
//! - A fixed [`Clock`] for deterministic timestamps
//! - A counter reducer fixture
//! - A Given-When-Then harness for the lifted reducer
//! - An in-memory panel connection
//! - proptest strategies for application actions
//!
//! ## Example
//!
//! ```
//! use rewind_core::LiftedAction;
//! use rewind_testing::{CounterAction, CounterReducer, CounterState, LiftedReducerTest};
//!
//! LiftedReducerTest::new(CounterReducer)
//!     .given_state(CounterState::default())
//!     .given_actions(vec![CounterAction::Increment; 3])
//!     .when(LiftedAction::ToggleAction { id: 2 })
//!     .then_state(|state| assert_eq!(state.count, 2))
//!     .then_lifted(|lifted| assert_eq!(lifted.staged_action_ids, vec![0, 1, 2, 3]))
//!     .run();
//! ```

use chrono::{DateTime, Utc};
use rewind_core::environment::Clock;

/// Given-When-Then harness for the lifted reducer
pub mod lifted_test;

/// In-memory panel connection
pub mod extension_mocks;

/// Mock implementations of environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, so exported lifted states compare equal
    /// across runs.
    ///
    /// # Example
    ///
    /// ```
    /// use rewind_testing::mocks::FixedClock;
    /// use rewind_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// The time has whole milliseconds, so it survives the panel's
    /// millisecond timestamp encoding unchanged.
    ///
    /// # Panics
    ///
    /// Panics if the hardcoded timestamp is out of range, which cannot happen.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::from_timestamp_millis(1_735_689_600_000)
                .expect("hardcoded timestamp should always be in range"),
        )
    }
}

/// Counter reducer used across the test suites
pub mod fixtures {
    use rewind_core::{Action, Lifecycle, Reducer, ReducerError};
    use serde::{Deserialize, Serialize};

    /// Counter state
    #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct CounterState {
        /// Current count
        pub count: i64,
    }

    impl CounterState {
        /// A state holding `count`
        #[must_use]
        pub const fn new(count: i64) -> Self {
            Self { count }
        }
    }

    /// Counter actions, tagged by `type` on the wire
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(tag = "type", rename_all = "camelCase")]
    pub enum CounterAction {
        /// Add one
        Increment,
        /// Subtract one
        Decrement,
        /// Add `amount`
        Add {
            /// Amount to add
            amount: i64,
        },
        /// Always fails in the reducer
        Jam,
        /// Store initialization
        #[serde(rename = "@rewind/store/init")]
        Init,
        /// Reducer replaced
        #[serde(rename = "@rewind/store/update-reducers")]
        UpdateReducers,
        /// Recording paused
        #[serde(rename = "@rewind/devtools/pause")]
        Pause,
    }

    impl Action for CounterAction {
        fn action_type(&self) -> &str {
            match self {
                Self::Increment => "increment",
                Self::Decrement => "decrement",
                Self::Add { .. } => "add",
                Self::Jam => "jam",
                Self::Init => Lifecycle::Init.action_type(),
                Self::UpdateReducers => Lifecycle::Update.action_type(),
                Self::Pause => Lifecycle::Pause.action_type(),
            }
        }

        fn lifecycle(kind: Lifecycle) -> Self {
            match kind {
                Lifecycle::Init => Self::Init,
                Lifecycle::Update => Self::UpdateReducers,
                Lifecycle::Pause => Self::Pause,
            }
        }
    }

    /// Error message produced by [`CounterAction::Jam`]
    pub const JAMMED: &str = "counter jammed";

    /// Counter reducer
    #[derive(Debug, Clone, Copy, Default)]
    pub struct CounterReducer;

    impl Reducer for CounterReducer {
        type State = CounterState;
        type Action = CounterAction;

        fn reduce(
            &self,
            state: &mut CounterState,
            action: &CounterAction,
        ) -> Result<(), ReducerError> {
            match action {
                CounterAction::Increment => state.count += 1,
                CounterAction::Decrement => state.count -= 1,
                CounterAction::Add { amount } => state.count += amount,
                CounterAction::Jam => return Err(ReducerError::new(JAMMED)),
                CounterAction::Init | CounterAction::UpdateReducers | CounterAction::Pause => {},
            }
            Ok(())
        }
    }

    /// Counter reducer that counts twice; used to test reducer replacement
    #[derive(Debug, Clone, Copy, Default)]
    pub struct DoublingReducer;

    impl Reducer for DoublingReducer {
        type State = CounterState;
        type Action = CounterAction;

        fn reduce(
            &self,
            state: &mut CounterState,
            action: &CounterAction,
        ) -> Result<(), ReducerError> {
            CounterReducer.reduce(state, action)?;
            CounterReducer.reduce(state, action)
        }
    }
}

/// Async test helpers
pub mod helpers {
    use std::time::Duration;

    /// Install a `tracing` subscriber that writes through the test harness
    ///
    /// Safe to call from every test; only the first call installs.
    pub fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    }

    /// Poll `check` until it holds, for at most one second
    ///
    /// # Panics
    ///
    /// Panics if `check` never holds.
    #[allow(clippy::panic)]
    pub async fn eventually<F>(mut check: F)
    where
        F: FnMut() -> bool,
    {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
        while !check() {
            assert!(
                tokio::time::Instant::now() < deadline,
                "condition not reached within one second"
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

/// Property-based testing utilities
pub mod properties {
    use super::fixtures::CounterAction;
    use proptest::prelude::*;

    /// Any counter action that does not fail
    pub fn counter_action() -> impl Strategy<Value = CounterAction> {
        prop_oneof![
            Just(CounterAction::Increment),
            Just(CounterAction::Decrement),
            (-5_i64..=5).prop_map(|amount| CounterAction::Add { amount }),
        ]
    }

    /// Any counter action, including the failing [`CounterAction::Jam`]
    pub fn counter_action_or_jam() -> impl Strategy<Value = CounterAction> {
        prop_oneof![
            9 => counter_action(),
            1 => Just(CounterAction::Jam),
        ]
    }

    /// Between `1` and `max` successful counter actions
    pub fn counter_actions(max: usize) -> impl Strategy<Value = Vec<CounterAction>> {
        proptest::collection::vec(counter_action(), 1..=max)
    }
}

// Re-export commonly used items
pub use extension_mocks::{MockExtensionConnection, SentMessage};
pub use fixtures::{CounterAction, CounterReducer, CounterState, DoublingReducer};
pub use lifted_test::LiftedReducerTest;
pub use mocks::{FixedClock, test_clock};

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use rewind_core::{Action, Lifecycle, Reducer};
    use serde_json::json;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
        assert_eq!(clock.now().timestamp_subsec_nanos() % 1_000_000, 0);
    }

    #[test]
    fn counter_actions_use_type_tags() {
        assert_eq!(
            serde_json::to_value(CounterAction::Add { amount: 2 }).unwrap(),
            json!({ "type": "add", "amount": 2 })
        );
        let init: CounterAction = serde_json::from_value(json!({ "type": "@rewind/store/init" })).unwrap();
        assert_eq!(init, CounterAction::lifecycle(Lifecycle::Init));
    }

    #[test]
    fn counter_reducer_counts() {
        let mut state = CounterState::default();
        CounterReducer.reduce(&mut state, &CounterAction::Increment).unwrap();
        CounterReducer.reduce(&mut state, &CounterAction::Add { amount: 4 }).unwrap();
        assert_eq!(state, CounterState::new(5));
        assert!(CounterReducer.reduce(&mut state, &CounterAction::Jam).is_err());

        DoublingReducer.reduce(&mut state, &CounterAction::Increment).unwrap();
        assert_eq!(state.count, 7);
    }
}
