//! # Rewind Runtime
//!
//! Asynchronous controller for the Rewind time-travel debugger.
//!
//! This crate owns the single running instance of the lifted state machine
//! from `rewind-core` and connects it to the application and to an external
//! devtools panel.
//!
//! ## Core Components
//!
//! - **`StoreDevtools`**: Actor loop that folds every lifted action, in order,
//!   into the current lifted state and publishes the result
//! - **`DevtoolsDispatcher`**: Cloneable handle for issuing debugger commands
//! - **`DevtoolsExtension`**: Bridge to the external panel (windowed inbound
//!   commands, best-effort outbound updates)
//! - **`DevtoolsConfig`**: History cap, sanitizers, monitor and clock
//!
//! ## Data Flow
//!
//! ```text
//! app actions ─────┐
//! panel actions ───┤                 ┌──► watch: LiftedState
//! panel commands ──┼─► mpsc queue ─► fold ──► panel notify
//! dispatcher ──────┘                 └──► scanned actions (real actions only)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use rewind_runtime::{DevtoolsConfig, DevtoolsExtension, StoreDevtools};
//!
//! let (scanned_tx, mut scanned_rx) = tokio::sync::mpsc::unbounded_channel();
//! let devtools = StoreDevtools::new(
//!     app_actions,                 // stream whose first item is the store's INIT
//!     Arc::new(CounterReducer),
//!     DevtoolsExtension::detached(),
//!     scanned_tx,
//!     CounterState::default(),
//!     DevtoolsConfig::default(),
//! )?;
//!
//! devtools.dispatcher().toggle_action(2)?;
//! devtools.flush().await?;
//! println!("{:?}", devtools.state());
//!
//! devtools.shutdown(Duration::from_secs(1)).await?;
//! ```

/// Devtools configuration
pub mod config;

/// Bridge to an external devtools panel
pub mod extension;

/// Prometheus metrics for observability
pub mod metrics;

/// Error types for the devtools runtime
pub mod error {
    use rewind_core::DevtoolsError;
    use thiserror::Error;

    /// Errors returned by the devtools controller
    #[derive(Error, Debug)]
    pub enum StoreError {
        /// The configuration violates an invariant
        #[error("Invalid devtools configuration: {0}")]
        Config(DevtoolsError),

        /// A command failed its preconditions (e.g. an action without a type)
        #[error("Action rejected: {0}")]
        Rejected(#[from] DevtoolsError),

        /// The fold loop task panicked or was cancelled
        #[error("Devtools task failed: {0}")]
        TaskJoinError(#[from] tokio::task::JoinError),

        /// Shutdown has started; no new commands are accepted
        #[error("Devtools is shutting down")]
        ShutdownInProgress,

        /// The fold loop is gone
        #[error("Devtools command channel closed")]
        ChannelClosed,

        /// The fold loop did not stop within the shutdown timeout
        #[error("Timed out waiting for the devtools loop to stop")]
        Timeout,
    }
}

/// The devtools controller
pub mod store {
    use super::config::DevtoolsConfig;
    use super::error::StoreError;
    use super::extension::{DevtoolsExtension, ExtensionEvent};
    use super::metrics::TransitionMetrics;
    use futures::stream::{self, BoxStream, Stream, StreamExt};
    use rewind_core::{
        Action, ActionId, Clock, ImportPayload, LiftedAction, LiftedReducer, LiftedState, Reducer,
        unlift_state,
    };
    use serde::Serialize;
    use serde::de::DeserializeOwned;
    use std::fmt;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::{Duration, Instant};
    use tokio::sync::{mpsc, oneshot, watch};
    use tokio::task::JoinHandle;

    /// An application reducer shared with the fold loop
    pub type SharedReducer<S, A> = Arc<dyn Reducer<State = S, Action = A>>;

    /// Work items of the fold loop, processed strictly in arrival order
    enum Command<S, A> {
        Lifted(LiftedAction<S, A>),
        ReplaceReducer(SharedReducer<S, A>),
        PanelStarted,
        Flush(oneshot::Sender<()>),
        Shutdown,
    }

    /// Cloneable handle for issuing debugger commands
    ///
    /// Every method only enqueues; the command is applied by the fold loop
    /// after everything queued before it. Use
    /// [`flush`](DevtoolsDispatcher::flush) to wait for it.
    pub struct DevtoolsDispatcher<S, A> {
        commands: mpsc::UnboundedSender<Command<S, A>>,
        clock: Arc<dyn Clock>,
        shutdown: Arc<AtomicBool>,
    }

    impl<S, A> Clone for DevtoolsDispatcher<S, A> {
        fn clone(&self) -> Self {
            Self {
                commands: self.commands.clone(),
                clock: Arc::clone(&self.clock),
                shutdown: Arc::clone(&self.shutdown),
            }
        }
    }

    impl<S, A> fmt::Debug for DevtoolsDispatcher<S, A> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("DevtoolsDispatcher")
                .field("shutdown", &self.shutdown.load(Ordering::Acquire))
                .finish_non_exhaustive()
        }
    }

    impl<S, A: Action> DevtoolsDispatcher<S, A> {
        /// Enqueue any lifted action
        ///
        /// # Errors
        ///
        /// - [`StoreError::Rejected`] if the action fails its preconditions
        /// - [`StoreError::ShutdownInProgress`] after shutdown started
        /// - [`StoreError::ChannelClosed`] if the fold loop is gone
        #[tracing::instrument(skip_all, fields(action = action.kind()), name = "devtools_dispatch")]
        pub fn dispatch(&self, action: LiftedAction<S, A>) -> Result<(), StoreError> {
            action.validate()?;
            self.send(Command::Lifted(action))
        }

        /// Record and apply a real application action
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::Rejected`] if the action has an empty type,
        /// otherwise as [`dispatch`](Self::dispatch).
        pub fn perform_action(&self, action: A) -> Result<(), StoreError> {
            let lifted = LiftedAction::perform(action, self.clock.as_ref())?;
            self.send(Command::Lifted(lifted))
        }

        /// Drop all history and return to the initial state
        ///
        /// # Errors
        ///
        /// As [`dispatch`](Self::dispatch).
        pub fn reset(&self) -> Result<(), StoreError> {
            self.dispatch(LiftedAction::Reset {
                timestamp: self.clock.now(),
            })
        }

        /// Discard uncommitted actions
        ///
        /// # Errors
        ///
        /// As [`dispatch`](Self::dispatch).
        pub fn rollback(&self) -> Result<(), StoreError> {
            self.dispatch(LiftedAction::Rollback {
                timestamp: self.clock.now(),
            })
        }

        /// Squash history into the state at the cursor
        ///
        /// # Errors
        ///
        /// As [`dispatch`](Self::dispatch).
        pub fn commit(&self) -> Result<(), StoreError> {
            self.dispatch(LiftedAction::Commit {
                timestamp: self.clock.now(),
            })
        }

        /// Remove skipped actions from history
        ///
        /// # Errors
        ///
        /// As [`dispatch`](Self::dispatch).
        pub fn sweep(&self) -> Result<(), StoreError> {
            self.dispatch(LiftedAction::Sweep)
        }

        /// Flip whether an action is skipped
        ///
        /// # Errors
        ///
        /// As [`dispatch`](Self::dispatch).
        pub fn toggle_action(&self, id: ActionId) -> Result<(), StoreError> {
            self.dispatch(LiftedAction::ToggleAction { id })
        }

        /// Skip or un-skip the id range `[start, end)`
        ///
        /// # Errors
        ///
        /// As [`dispatch`](Self::dispatch).
        pub fn set_actions_active(
            &self,
            start: ActionId,
            end: ActionId,
            active: bool,
        ) -> Result<(), StoreError> {
            self.dispatch(LiftedAction::SetActionsActive { start, end, active })
        }

        /// Move the cursor to a history index
        ///
        /// # Errors
        ///
        /// As [`dispatch`](Self::dispatch).
        pub fn jump_to_state(&self, index: usize) -> Result<(), StoreError> {
            self.dispatch(LiftedAction::JumpToState { index })
        }

        /// Move the cursor to a recorded action
        ///
        /// # Errors
        ///
        /// As [`dispatch`](Self::dispatch).
        pub fn jump_to_action(&self, action_id: ActionId) -> Result<(), StoreError> {
            self.dispatch(LiftedAction::JumpToAction { action_id })
        }

        /// Replace history with a previously exported lifted state
        ///
        /// # Errors
        ///
        /// As [`dispatch`](Self::dispatch).
        pub fn import_state(&self, state: LiftedState<S, A>) -> Result<(), StoreError> {
            self.dispatch(LiftedAction::ImportState {
                next_lifted_state: ImportPayload::State(Box::new(state)),
            })
        }

        /// Replace history with one recorded entry per action
        ///
        /// # Errors
        ///
        /// As [`dispatch`](Self::dispatch).
        pub fn import_actions(&self, actions: Vec<A>) -> Result<(), StoreError> {
            self.dispatch(LiftedAction::ImportState {
                next_lifted_state: ImportPayload::Actions(actions),
            })
        }

        /// Ignore new actions while `status` is `true`
        ///
        /// # Errors
        ///
        /// As [`dispatch`](Self::dispatch).
        pub fn lock_changes(&self, status: bool) -> Result<(), StoreError> {
            self.dispatch(LiftedAction::LockChanges { status })
        }

        /// Stop recording new actions while `status` is `true`
        ///
        /// # Errors
        ///
        /// As [`dispatch`](Self::dispatch).
        pub fn pause_recording(&self, status: bool) -> Result<(), StoreError> {
            self.dispatch(LiftedAction::PauseRecording { status })
        }

        /// Swap the application reducer
        ///
        /// History is replayed through the new reducer (an UPDATE transition)
        /// unless hot reload is disabled in the config.
        ///
        /// # Errors
        ///
        /// As [`dispatch`](Self::dispatch).
        pub fn replace_reducer(&self, reducer: SharedReducer<S, A>) -> Result<(), StoreError> {
            self.send(Command::ReplaceReducer(reducer))
        }

        /// Wait until every command queued before this call has been applied
        ///
        /// # Errors
        ///
        /// As [`dispatch`](Self::dispatch).
        pub async fn flush(&self) -> Result<(), StoreError> {
            let (ack, done) = oneshot::channel();
            self.send(Command::Flush(ack))?;
            done.await.map_err(|_| StoreError::ChannelClosed)
        }

        fn send(&self, command: Command<S, A>) -> Result<(), StoreError> {
            if self.shutdown.load(Ordering::Acquire) {
                return Err(StoreError::ShutdownInProgress);
            }
            self.commands
                .send(command)
                .map_err(|_| StoreError::ChannelClosed)
        }
    }

    /// The single running instance of the lifted state machine
    ///
    /// All lifted-action sources (the application's action stream, the
    /// panel, and [`DevtoolsDispatcher`] handles) feed one FIFO queue. A
    /// single task folds the queue into the lifted state, so transitions never
    /// interleave. After each transition the controller:
    /// 1. notifies the panel,
    /// 2. publishes the new lifted state,
    /// 3. forwards the real action of a `PerformAction` to the scanned-actions
    ///    sink.
    ///
    /// # Type Parameters
    ///
    /// - `S`: Application state
    /// - `A`: Application action
    pub struct StoreDevtools<S, A> {
        dispatcher: DevtoolsDispatcher<S, A>,
        lifted_state: watch::Receiver<Arc<LiftedState<S, A>>>,
        extension: Arc<DevtoolsExtension>,
        fold_task: Option<JoinHandle<()>>,
        source_tasks: Vec<JoinHandle<()>>,
    }

    impl<S, A> StoreDevtools<S, A>
    where
        S: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
        A: Action + Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        /// Start the devtools controller
        ///
        /// The history starts with the INIT transition already applied.
        ///
        /// # Arguments
        ///
        /// - `actions`: The application's action stream. Its first item is the
        ///   store's own INIT and is skipped (INIT is always recorded as id `0`)
        /// - `reducer`: The application reducer
        /// - `extension`: Panel bridge; [`DevtoolsExtension::detached`] if none
        /// - `scanned_actions`: Receives every recorded real action, in order
        /// - `initial_state`: The application's initial state
        /// - `config`: Devtools configuration
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::Config`] if the configuration is invalid.
        ///
        /// # Panics
        ///
        /// Must be called within a tokio runtime.
        pub fn new<St>(
            actions: St,
            reducer: SharedReducer<S, A>,
            extension: DevtoolsExtension,
            scanned_actions: mpsc::UnboundedSender<A>,
            initial_state: S,
            config: DevtoolsConfig<S, A>,
        ) -> Result<Self, StoreError>
        where
            St: Stream<Item = A> + Send + 'static,
        {
            config.validate().map_err(StoreError::Config)?;

            let lifted_reducer =
                LiftedReducer::new(initial_state, config.monitor.clone(), config.lift_options());
            let initial = lifted_reducer.reduce(
                reducer.as_ref(),
                lifted_reducer.initial_state(),
                &LiftedAction::Init,
            );

            let (commands, queue) = mpsc::unbounded_channel();
            let (publish, lifted_state) = watch::channel(Arc::new(initial.clone()));
            let extension = Arc::new(extension);
            let dispatcher = DevtoolsDispatcher {
                commands,
                clock: Arc::clone(&config.clock),
                shutdown: Arc::new(AtomicBool::new(false)),
            };

            let fold = FoldLoop {
                lifted_reducer,
                reducer,
                extension: Arc::clone(&extension),
                publish,
                scanned_actions,
                should_hot_reload: config.should_hot_reload,
            };
            let fold_task = tokio::spawn(fold.run(initial, queue));

            let source_tasks = vec![
                tokio::spawn(forward_app_actions(actions, dispatcher.clone())),
                tokio::spawn(forward_panel_events(
                    extension.events::<S, A>(),
                    dispatcher.clone(),
                )),
            ];

            tracing::info!(
                name = %config.name,
                max_age = ?config.max_age,
                panel = extension.is_connected(),
                "Devtools started"
            );

            Ok(Self {
                dispatcher,
                lifted_state,
                extension,
                fold_task: Some(fold_task),
                source_tasks,
            })
        }

        /// Handle for issuing debugger commands
        #[must_use]
        pub const fn dispatcher(&self) -> &DevtoolsDispatcher<S, A> {
            &self.dispatcher
        }

        /// The latest published lifted state
        #[must_use]
        pub fn lifted_state(&self) -> Arc<LiftedState<S, A>> {
            Arc::clone(&self.lifted_state.borrow())
        }

        /// The application state at the cursor of the latest lifted state
        #[must_use]
        pub fn state(&self) -> S {
            unlift_state(&self.lifted_state.borrow()).clone()
        }

        /// Watch every published lifted state
        #[must_use]
        pub fn subscribe(&self) -> watch::Receiver<Arc<LiftedState<S, A>>> {
            self.lifted_state.clone()
        }

        /// Stream of application states: the current one, then one per
        /// published transition (intermediate values may be coalesced)
        ///
        /// Ends after shutdown.
        #[must_use]
        pub fn state_stream(&self) -> BoxStream<'static, S> {
            stream::unfold(
                (self.lifted_state.clone(), true),
                |(mut receiver, first)| async move {
                    if !first && receiver.changed().await.is_err() {
                        return None;
                    }
                    let state = unlift_state(&receiver.borrow_and_update()).clone();
                    Some((state, (receiver, false)))
                },
            )
            .boxed()
        }

        /// Wait until every command queued so far has been applied
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownInProgress`] or
        /// [`StoreError::ChannelClosed`] once the controller is stopping.
        pub async fn flush(&self) -> Result<(), StoreError> {
            self.dispatcher.flush().await
        }

        /// Stop the controller
        ///
        /// Stops accepting commands, disconnects the panel, applies whatever
        /// was already queued, then ends the lifted-state and scanned-action
        /// publications.
        ///
        /// # Errors
        ///
        /// - [`StoreError::Timeout`] if the queue is not drained within `timeout`
        /// - [`StoreError::TaskJoinError`] if the fold loop panicked
        pub async fn shutdown(mut self, timeout: Duration) -> Result<(), StoreError> {
            tracing::info!(name = %self.extension.name(), "Shutting down devtools");
            self.dispatcher.shutdown.store(true, Ordering::Release);

            for task in self.source_tasks.drain(..) {
                task.abort();
            }
            self.extension.disconnect();

            let Some(mut fold_task) = self.fold_task.take() else {
                return Ok(());
            };
            // Bypasses the shutdown flag; lands after everything already queued.
            let _ = self.dispatcher.commands.send(Command::Shutdown);

            match tokio::time::timeout(timeout, &mut fold_task).await {
                Ok(joined) => {
                    joined?;
                    tracing::info!("Devtools shutdown complete");
                    Ok(())
                },
                Err(_) => {
                    fold_task.abort();
                    tracing::error!(timeout_ms = timeout.as_millis(), "Devtools shutdown timed out");
                    Err(StoreError::Timeout)
                },
            }
        }
    }

    impl<S, A> Drop for StoreDevtools<S, A> {
        fn drop(&mut self) {
            for task in self.source_tasks.drain(..) {
                task.abort();
            }
            if let Some(fold_task) = self.fold_task.take() {
                fold_task.abort();
                self.extension.disconnect();
            }
        }
    }

    impl<S, A> fmt::Debug for StoreDevtools<S, A> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("StoreDevtools")
                .field("extension", &self.extension)
                .field("running", &self.fold_task.is_some())
                .finish_non_exhaustive()
        }
    }

    /// Sole writer of the lifted state
    struct FoldLoop<S, A> {
        lifted_reducer: LiftedReducer<S, A>,
        reducer: SharedReducer<S, A>,
        extension: Arc<DevtoolsExtension>,
        publish: watch::Sender<Arc<LiftedState<S, A>>>,
        scanned_actions: mpsc::UnboundedSender<A>,
        should_hot_reload: bool,
    }

    impl<S, A> FoldLoop<S, A>
    where
        S: Clone + Serialize,
        A: Action + Serialize,
    {
        async fn run(
            mut self,
            mut lifted: LiftedState<S, A>,
            mut queue: mpsc::UnboundedReceiver<Command<S, A>>,
        ) {
            while let Some(command) = queue.recv().await {
                match command {
                    Command::Lifted(action) => lifted = self.apply(lifted, action),
                    Command::ReplaceReducer(reducer) => {
                        tracing::info!(hot_reload = self.should_hot_reload, "Replacing reducer");
                        self.reducer = reducer;
                        if self.should_hot_reload {
                            lifted = self.apply(lifted, LiftedAction::Update);
                        }
                    },
                    Command::PanelStarted => self.extension.send_lifted_state(&lifted),
                    Command::Flush(ack) => {
                        let _ = ack.send(());
                    },
                    Command::Shutdown => break,
                }
            }
            tracing::debug!("Devtools fold loop stopped");
        }

        fn apply(&self, lifted: LiftedState<S, A>, action: LiftedAction<S, A>) -> LiftedState<S, A> {
            let started = Instant::now();
            let next = self
                .lifted_reducer
                .reduce(self.reducer.as_ref(), lifted, &action);

            self.extension.notify(&action, &next);
            TransitionMetrics::record(action.kind(), started.elapsed(), next.staged_action_ids.len());

            // Subscribers get their own snapshot; the loop keeps the owned value.
            self.publish.send_replace(Arc::new(next.clone()));

            if let LiftedAction::PerformAction(perform) = action {
                TransitionMetrics::record_scanned();
                if self.scanned_actions.send(perform.into_action()).is_err() {
                    tracing::debug!("Scanned actions receiver dropped");
                }
            }

            next
        }
    }

    async fn forward_app_actions<St, S, A>(actions: St, dispatcher: DevtoolsDispatcher<S, A>)
    where
        St: Stream<Item = A>,
        A: Action,
    {
        // The first value is the store's own INIT, already recorded as action 0.
        let mut actions = Box::pin(actions.skip(1));
        while let Some(action) = actions.next().await {
            match dispatcher.perform_action(action) {
                Ok(()) => {},
                Err(StoreError::Rejected(err)) => {
                    tracing::error!(error = %err, "Rejected application action");
                },
                Err(_) => break,
            }
        }
    }

    async fn forward_panel_events<S, A>(
        mut events: BoxStream<'static, ExtensionEvent<S, A>>,
        dispatcher: DevtoolsDispatcher<S, A>,
    ) where
        A: Action,
    {
        while let Some(event) = events.next().await {
            let sent = match event {
                ExtensionEvent::Started => dispatcher.send(Command::PanelStarted),
                ExtensionEvent::Stopped => Ok(()),
                ExtensionEvent::Lifted(action) => dispatcher.dispatch(action),
                ExtensionEvent::Action(action) => dispatcher.perform_action(action),
            };
            match sent {
                Ok(()) => {},
                Err(StoreError::Rejected(err)) => {
                    tracing::warn!(error = %err, "Rejected panel command");
                },
                Err(_) => break,
            }
        }
    }
}

pub use config::{DevtoolsConfig, Sanitizer};
pub use error::StoreError;
pub use extension::{
    DevtoolsExtension, ExtensionConnection, ExtensionEvent, ExtensionMessage, ExtensionMessageType,
};
pub use store::{DevtoolsDispatcher, SharedReducer, StoreDevtools};
