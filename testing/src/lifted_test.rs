//! Ergonomic testing utilities for the lifted reducer
//!
//! This module provides a fluent API for testing devtools transitions with
//! readable Given-When-Then syntax.

#![allow(clippy::module_name_repetitions)] // LiftedReducerTest is the natural name

use crate::mocks::test_clock;
use rewind_core::{Action, LiftOptions, LiftedAction, LiftedReducer, LiftedState, Reducer};
use std::sync::Arc;

/// Type alias for lifted state assertion functions
type LiftedAssertion<S, A> = Box<dyn FnOnce(&LiftedState<S, A>)>;

/// Type alias for application state assertion functions
type StateAssertion<S> = Box<dyn FnOnce(&S)>;

/// Fluent API for testing the lifted reducer with Given-When-Then syntax
///
/// The history always starts with the INIT transition applied. `given_*`
/// steps build history; `when` steps are the commands under test. Both are
/// applied in order. Timestamps come from [`test_clock`] unless other options
/// are set.
///
/// # Example
///
/// ```
/// use rewind_core::LiftedAction;
/// use rewind_testing::{CounterAction, CounterReducer, CounterState, LiftedReducerTest};
///
/// LiftedReducerTest::new(CounterReducer)
///     .given_state(CounterState::new(10))
///     .given_actions(vec![CounterAction::Increment, CounterAction::Increment])
///     .when(LiftedAction::JumpToState { index: 1 })
///     .then_state(|state| assert_eq!(state.count, 11))
///     .run();
/// ```
pub struct LiftedReducerTest<R>
where
    R: Reducer,
{
    reducer: R,
    options: LiftOptions,
    initial_state: Option<R::State>,
    given: Vec<LiftedAction<R::State, R::Action>>,
    when: Vec<LiftedAction<R::State, R::Action>>,
    lifted_assertions: Vec<LiftedAssertion<R::State, R::Action>>,
    state_assertions: Vec<StateAssertion<R::State>>,
}

impl<R> LiftedReducerTest<R>
where
    R: Reducer,
    R::State: Clone,
    R::Action: Action,
{
    /// Create a new test around the given application reducer
    #[must_use]
    pub fn new(reducer: R) -> Self {
        Self {
            reducer,
            options: LiftOptions::default().with_clock(Arc::new(test_clock())),
            initial_state: None,
            given: Vec::new(),
            when: Vec::new(),
            lifted_assertions: Vec::new(),
            state_assertions: Vec::new(),
        }
    }

    /// Set the engine options (history cap, clock)
    #[must_use]
    pub fn with_options(mut self, options: LiftOptions) -> Self {
        self.options = options;
        self
    }

    /// Set the initial committed state (Given)
    #[must_use]
    pub fn given_state(mut self, state: R::State) -> Self {
        self.initial_state = Some(state);
        self
    }

    /// Record application actions (Given)
    ///
    /// # Panics
    ///
    /// Panics if an action has an empty type.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn given_actions(mut self, actions: Vec<R::Action>) -> Self {
        for action in actions {
            let lifted = LiftedAction::perform(action, self.options.clock.as_ref())
                .expect("given actions must have a type");
            self.given.push(lifted);
        }
        self
    }

    /// Apply a lifted action before the one under test (Given)
    #[must_use]
    pub fn given(mut self, action: LiftedAction<R::State, R::Action>) -> Self {
        self.given.push(action);
        self
    }

    /// Add a lifted action under test (When)
    #[must_use]
    pub fn when(mut self, action: LiftedAction<R::State, R::Action>) -> Self {
        self.when.push(action);
        self
    }

    /// Add an application action under test (When)
    ///
    /// # Panics
    ///
    /// Panics if the action has an empty type.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn when_action(mut self, action: R::Action) -> Self {
        let lifted = LiftedAction::perform(action, self.options.clock.as_ref())
            .expect("actions under test must have a type");
        self.when.push(lifted);
        self
    }

    /// Add an assertion about the resulting lifted state (Then)
    #[must_use]
    pub fn then_lifted<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&LiftedState<R::State, R::Action>) + 'static,
    {
        self.lifted_assertions.push(Box::new(assertion));
        self
    }

    /// Add an assertion about the application state at the cursor (Then)
    #[must_use]
    pub fn then_state<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&R::State) + 'static,
    {
        self.state_assertions.push(Box::new(assertion));
        self
    }

    /// Run the test, execute all assertions and return the final lifted state
    ///
    /// # Panics
    ///
    /// Panics if the initial state is not set, or if any assertion fails.
    #[allow(clippy::expect_used)]
    pub fn run(self) -> LiftedState<R::State, R::Action> {
        let initial_state = self
            .initial_state
            .expect("Initial state must be set with given_state()");

        let engine = LiftedReducer::new(initial_state, None, self.options);
        let started = engine.reduce(&self.reducer, engine.initial_state(), &LiftedAction::Init);

        let lifted = self
            .given
            .iter()
            .chain(&self.when)
            .fold(started, |lifted, action| engine.reduce(&self.reducer, lifted, action));

        for assertion in self.lifted_assertions {
            assertion(&lifted);
        }
        for assertion in self.state_assertions {
            assertion(lifted.current_state());
        }

        lifted
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::fixtures::{CounterAction, CounterReducer, CounterState, JAMMED};

    #[test]
    fn given_actions_are_recorded() {
        LiftedReducerTest::new(CounterReducer)
            .given_state(CounterState::default())
            .given_actions(vec![CounterAction::Increment, CounterAction::Add { amount: 3 }])
            .then_lifted(|lifted| {
                assert_eq!(lifted.staged_action_ids, vec![0, 1, 2]);
                assert_eq!(lifted.current_state_index, 2);
            })
            .then_state(|state| assert_eq!(state.count, 4))
            .run();
    }

    #[test]
    fn when_action_records_one_more_entry() {
        let lifted = LiftedReducerTest::new(CounterReducer)
            .given_state(CounterState::new(1))
            .when_action(CounterAction::Jam)
            .then_state(|state| assert_eq!(state.count, 1))
            .run();

        assert_eq!(lifted.computed_states[1].error.as_deref(), Some(JAMMED));
    }

    #[test]
    fn options_are_applied() {
        LiftedReducerTest::new(CounterReducer)
            .with_options(
                LiftOptions::default()
                    .with_clock(Arc::new(test_clock()))
                    .with_max_age(2)
                    .unwrap(),
            )
            .given_state(CounterState::default())
            .given_actions(vec![CounterAction::Increment; 4])
            .then_lifted(|lifted| {
                assert_eq!(lifted.staged_action_ids, vec![0, 4]);
                assert_eq!(lifted.committed_state.count, 3);
            })
            .run();
    }
}
