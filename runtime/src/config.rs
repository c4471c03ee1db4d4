//! Devtools configuration.

use rewind_core::{Clock, DevtoolsError, LiftOptions, MonitorReducer, SystemClock};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Redaction hook applied to values sent to the panel
///
/// Receives the value and its action id (for actions) or history index (for
/// states). Only the outbound copy is affected; recorded history never is.
pub type Sanitizer = Arc<dyn Fn(&Value, usize) -> Value + Send + Sync>;

/// Default display name
pub const DEFAULT_NAME: &str = "Rewind DevTools";

/// Configuration for a [`StoreDevtools`](crate::StoreDevtools) instance
///
/// # Example
///
/// ```
/// use rewind_runtime::DevtoolsConfig;
/// use serde_json::{json, Value};
///
/// let config = DevtoolsConfig::<i64, Value>::default()
///     .with_max_age(25)?
///     .with_name("Checkout")
///     .with_state_sanitizer(|_state: &Value, _index: usize| json!("<redacted>"));
///
/// assert_eq!(config.max_age, Some(25));
/// # Ok::<(), rewind_core::DevtoolsError>(())
/// ```
pub struct DevtoolsConfig<S, A> {
    /// Maximum number of staged actions (INIT included); `None` (the
    /// default) keeps every action until it is committed
    pub max_age: Option<usize>,
    /// Display name shown by the panel
    pub name: String,
    /// Send outbound payloads as JSON text instead of JSON values
    pub serialize: bool,
    /// Redaction hook for actions sent to the panel
    pub action_sanitizer: Option<Sanitizer>,
    /// Redaction hook for states sent to the panel
    pub state_sanitizer: Option<Sanitizer>,
    /// Reducer for auxiliary monitor state; `None` keeps it `null`
    pub monitor: Option<MonitorReducer<S, A>>,
    /// Run an UPDATE transition when the application reducer is replaced
    pub should_hot_reload: bool,
    /// Source of timestamps for recorded actions
    pub clock: Arc<dyn Clock>,
}

impl<S, A> DevtoolsConfig<S, A> {
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

    /// Keep unbounded history
    #[must_use]
    pub fn without_max_age(mut self) -> Self {
        self.max_age = None;
        self
    }

    /// Set the display name
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Send outbound payloads as JSON text
    #[must_use]
    pub fn with_serialize(mut self, serialize: bool) -> Self {
        self.serialize = serialize;
        self
    }

    /// Redact actions before they reach the panel
    #[must_use]
    pub fn with_action_sanitizer<F>(mut self, sanitizer: F) -> Self
    where
        F: Fn(&Value, usize) -> Value + Send + Sync + 'static,
    {
        self.action_sanitizer = Some(Arc::new(sanitizer));
        self
    }

    /// Redact states before they reach the panel
    #[must_use]
    pub fn with_state_sanitizer<F>(mut self, sanitizer: F) -> Self
    where
        F: Fn(&Value, usize) -> Value + Send + Sync + 'static,
    {
        self.state_sanitizer = Some(Arc::new(sanitizer));
        self
    }

    /// Use a monitor reducer
    #[must_use]
    pub fn with_monitor(mut self, monitor: MonitorReducer<S, A>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Whether replacing the reducer triggers an UPDATE transition
    #[must_use]
    pub fn with_hot_reload(mut self, should_hot_reload: bool) -> Self {
        self.should_hot_reload = should_hot_reload;
        self
    }

    /// Use a different clock
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Re-check invariants of a config whose fields were set directly
    ///
    /// # Errors
    ///
    /// Returns [`DevtoolsError::InvalidMaxAge`] if `max_age` is below 2.
    pub fn validate(&self) -> Result<(), DevtoolsError> {
        match self.max_age {
            Some(max_age) if max_age < 2 => Err(DevtoolsError::InvalidMaxAge(max_age)),
            _ => Ok(()),
        }
    }

    /// The engine options this config implies
    #[must_use]
    pub fn lift_options(&self) -> LiftOptions {
        LiftOptions {
            max_age: self.max_age,
            clock: Arc::clone(&self.clock),
        }
    }
}

/// Unbounded history, no sanitizers, no monitor, hot reload on, system clock
impl<S, A> Default for DevtoolsConfig<S, A> {
    fn default() -> Self {
        Self {
            max_age: None,
            name: DEFAULT_NAME.to_string(),
            serialize: false,
            action_sanitizer: None,
            state_sanitizer: None,
            monitor: None,
            should_hot_reload: true,
            clock: Arc::new(SystemClock),
        }
    }
}

impl<S, A> Clone for DevtoolsConfig<S, A> {
    fn clone(&self) -> Self {
        Self {
            max_age: self.max_age,
            name: self.name.clone(),
            serialize: self.serialize,
            action_sanitizer: self.action_sanitizer.clone(),
            state_sanitizer: self.state_sanitizer.clone(),
            monitor: self.monitor.clone(),
            should_hot_reload: self.should_hot_reload,
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<S, A> fmt::Debug for DevtoolsConfig<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DevtoolsConfig")
            .field("max_age", &self.max_age)
            .field("name", &self.name)
            .field("serialize", &self.serialize)
            .field("action_sanitizer", &self.action_sanitizer.is_some())
            .field("state_sanitizer", &self.state_sanitizer.is_some())
            .field("monitor", &self.monitor.is_some())
            .field("should_hot_reload", &self.should_hot_reload)
            .finish_non_exhaustive()
    }
}
