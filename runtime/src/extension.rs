//! Bridge to an external devtools panel.
//!
//! The panel speaks a small message protocol over an
//! [`ExtensionConnection`]: inbound messages carry a `type` of `START`,
//! `DISPATCH`, `STOP` or `ACTION`; outbound traffic is a `send(action, state)`
//! call per transition.
//!
//! Inbound commands are windowed: `DISPATCH` and `ACTION` messages are only
//! forwarded between a `START` and the next `STOP`. Anything received outside
//! a window is dropped. A fresh `START` re-arms the window.
//!
//! Every operation degrades to a no-op (or an empty stream) when no panel is
//! attached.

use crate::config::{DevtoolsConfig, Sanitizer};
use futures::future;
use futures::stream::{self, BoxStream, StreamExt};
use rewind_core::{
    Action, DevtoolsError, LiftedAction, LiftedState, PerformAction, unlift_state,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Message type tag of the panel protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExtensionMessageType {
    /// The panel opened; start forwarding commands
    Start,
    /// A lifted command from the panel
    Dispatch,
    /// The panel closed; stop forwarding commands
    Stop,
    /// A real application action typed into the panel
    Action,
    /// Any other protocol message; ignored
    #[serde(other)]
    Other,
}

impl ExtensionMessageType {
    /// The wire name, used as a metrics label
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "START",
            Self::Dispatch => "DISPATCH",
            Self::Stop => "STOP",
            Self::Action => "ACTION",
            Self::Other => "OTHER",
        }
    }
}

/// Raw message received from the panel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtensionMessage {
    /// Message discriminant
    #[serde(rename = "type")]
    pub kind: ExtensionMessageType,
    /// Command payload; either an object or its JSON text
    #[serde(default)]
    pub payload: Value,
}

impl ExtensionMessage {
    /// Create a message
    #[must_use]
    pub const fn new(kind: ExtensionMessageType, payload: Value) -> Self {
        Self { kind, payload }
    }

    /// A `START` message
    #[must_use]
    pub const fn start() -> Self {
        Self::new(ExtensionMessageType::Start, Value::Null)
    }

    /// A `STOP` message
    #[must_use]
    pub const fn stop() -> Self {
        Self::new(ExtensionMessageType::Stop, Value::Null)
    }

    /// A `DISPATCH` message carrying a lifted command
    #[must_use]
    pub const fn dispatch(payload: Value) -> Self {
        Self::new(ExtensionMessageType::Dispatch, payload)
    }

    /// An `ACTION` message carrying an application action
    #[must_use]
    pub const fn action(payload: Value) -> Self {
        Self::new(ExtensionMessageType::Action, payload)
    }
}

/// Connection to an external devtools panel
///
/// Implementations wrap whatever transport the panel uses (a browser
/// extension port, a websocket, an in-memory channel in tests).
pub trait ExtensionConnection: Send + Sync {
    /// Start receiving panel messages
    ///
    /// The stream ends when the connection closes.
    fn subscribe(&self) -> BoxStream<'static, ExtensionMessage>;

    /// Stop receiving panel messages and release the transport
    fn unsubscribe(&self);

    /// Push an update to the panel
    ///
    /// `action` is the recorded application action for a plain dispatch and
    /// `None` when `state` is a whole lifted state snapshot.
    fn send(&self, action: Option<Value>, state: Value);
}

/// Event derived from the panel's message stream
#[derive(Debug, Clone, PartialEq)]
pub enum ExtensionEvent<S, A> {
    /// The panel opened
    Started,
    /// The panel closed
    Stopped,
    /// A lifted command to apply
    Lifted(LiftedAction<S, A>),
    /// A real application action to perform
    Action(A),
}

/// Panel bridge used by the devtools controller
pub struct DevtoolsExtension {
    connection: Option<Arc<dyn ExtensionConnection>>,
    name: String,
    serialize: bool,
    action_sanitizer: Option<Sanitizer>,
    state_sanitizer: Option<Sanitizer>,
}

impl DevtoolsExtension {
    /// Create a bridge over `connection`, or a detached bridge for `None`
    #[must_use]
    pub fn new<S, A>(
        connection: Option<Arc<dyn ExtensionConnection>>,
        config: &DevtoolsConfig<S, A>,
    ) -> Self {
        Self {
            connection,
            name: config.name.clone(),
            serialize: config.serialize,
            action_sanitizer: config.action_sanitizer.clone(),
            state_sanitizer: config.state_sanitizer.clone(),
        }
    }

    /// A bridge with no panel attached
    #[must_use]
    pub fn detached() -> Self {
        Self {
            connection: None,
            name: String::new(),
            serialize: false,
            action_sanitizer: None,
            state_sanitizer: None,
        }
    }

    /// Whether a panel connection is present
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Display name of this devtools instance
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Push the result of one transition to the panel
    ///
    /// A recorded dispatch sends the action and the current application state.
    /// Every other command sends the whole lifted state. Nothing is sent for a
    /// dispatch that was not recorded (changes locked or recording paused).
    pub fn notify<S, A>(&self, action: &LiftedAction<S, A>, state: &LiftedState<S, A>)
    where
        S: Serialize,
        A: Serialize,
    {
        let Some(connection) = &self.connection else {
            return;
        };

        let outcome = match action {
            LiftedAction::PerformAction(perform) => {
                if state.is_locked || state.is_paused {
                    return;
                }
                self.encode_perform(perform, state)
                    .map(|(action, app_state)| connection.send(Some(action), app_state))
            },
            _ => self
                .encode_lifted(state)
                .map(|lifted| connection.send(None, lifted)),
        };

        if let Err(err) = outcome {
            tracing::warn!(error = %err, "Failed to encode devtools update");
        }
    }

    /// Push the whole lifted state to the panel
    pub fn send_lifted_state<S, A>(&self, state: &LiftedState<S, A>)
    where
        S: Serialize,
        A: Serialize,
    {
        let Some(connection) = &self.connection else {
            return;
        };
        match self.encode_lifted(state) {
            Ok(lifted) => connection.send(None, lifted),
            Err(err) => tracing::warn!(error = %err, "Failed to encode lifted state"),
        }
    }

    /// Release the panel connection
    pub fn disconnect(&self) {
        if let Some(connection) = &self.connection {
            tracing::info!(name = %self.name, "Disconnecting devtools panel");
            connection.unsubscribe();
        }
    }

    /// Events derived from the panel's message stream
    ///
    /// Empty when no panel is attached. Undecodable payloads are logged and
    /// dropped.
    pub fn events<S, A>(&self) -> BoxStream<'static, ExtensionEvent<S, A>>
    where
        S: DeserializeOwned + Send + 'static,
        A: Action + DeserializeOwned + Send + 'static,
    {
        let Some(connection) = &self.connection else {
            return stream::empty().boxed();
        };

        connection
            .subscribe()
            .scan(false, |window_open, message| {
                future::ready(Some(gate(window_open, message)))
            })
            .filter_map(future::ready)
            .boxed()
    }

    fn encode_perform<S, A>(
        &self,
        perform: &PerformAction<A>,
        state: &LiftedState<S, A>,
    ) -> Result<(Value, Value), DevtoolsError>
    where
        S: Serialize,
        A: Serialize,
    {
        let action_id = state.next_action_id.saturating_sub(1);
        let mut action = serde_json::to_value(perform)?;
        if let (Some(sanitize), Some(inner)) = (&self.action_sanitizer, action.get_mut("action")) {
            *inner = sanitize(inner, action_id);
        }

        let mut app_state = serde_json::to_value(unlift_state(state))?;
        if let Some(sanitize) = &self.state_sanitizer {
            app_state = sanitize(&app_state, state.current_state_index);
        }

        Ok((self.encode(action)?, self.encode(app_state)?))
    }

    fn encode_lifted<S, A>(&self, state: &LiftedState<S, A>) -> Result<Value, DevtoolsError>
    where
        S: Serialize,
        A: Serialize,
    {
        let mut lifted = state.export()?;

        if let Some(sanitize) = &self.action_sanitizer {
            if let Some(Value::Object(actions)) = lifted.get_mut("actionsById") {
                for (id, entry) in actions.iter_mut() {
                    let id = id.parse().unwrap_or_default();
                    if let Some(action) = entry.get_mut("action") {
                        *action = sanitize(action, id);
                    }
                }
            }
        }

        if let Some(sanitize) = &self.state_sanitizer {
            if let Some(Value::Array(computed)) = lifted.get_mut("computedStates") {
                for (index, entry) in computed.iter_mut().enumerate() {
                    if let Some(app_state) = entry.get_mut("state") {
                        *app_state = sanitize(app_state, index);
                    }
                }
            }
        }

        self.encode(lifted)
    }

    fn encode(&self, value: Value) -> Result<Value, DevtoolsError> {
        if self.serialize {
            Ok(Value::String(serde_json::to_string(&value)?))
        } else {
            Ok(value)
        }
    }
}

impl fmt::Debug for DevtoolsExtension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DevtoolsExtension")
            .field("connected", &self.connection.is_some())
            .field("name", &self.name)
            .field("serialize", &self.serialize)
            .finish_non_exhaustive()
    }
}

/// Apply the START/STOP window to one message
fn gate<S, A>(window_open: &mut bool, message: ExtensionMessage) -> Option<ExtensionEvent<S, A>>
where
    S: DeserializeOwned,
    A: Action + DeserializeOwned,
{
    let kind = message.kind;
    metrics::counter!("devtools_extension_messages_total", "type" => kind.as_str()).increment(1);

    match kind {
        ExtensionMessageType::Start => {
            tracing::info!("Devtools panel started");
            *window_open = true;
            Some(ExtensionEvent::Started)
        },
        ExtensionMessageType::Stop => {
            tracing::info!("Devtools panel stopped");
            *window_open = false;
            Some(ExtensionEvent::Stopped)
        },
        ExtensionMessageType::Dispatch | ExtensionMessageType::Action if !*window_open => {
            tracing::debug!(kind = kind.as_str(), "Dropping panel message outside of a session");
            metrics::counter!("devtools_extension_dropped_total").increment(1);
            None
        },
        ExtensionMessageType::Dispatch => {
            match decode_payload::<LiftedAction<S, A>>(message.payload)
                .and_then(|lifted| lifted.validate().map(|()| lifted))
            {
                Ok(lifted) => Some(ExtensionEvent::Lifted(lifted)),
                Err(err) => drop_undecodable(kind, &err),
            }
        },
        ExtensionMessageType::Action => {
            match decode_payload::<A>(message.payload).and_then(|action| {
                if action.action_type().is_empty() {
                    Err(DevtoolsError::MissingActionType)
                } else {
                    Ok(action)
                }
            }) {
                Ok(action) => Some(ExtensionEvent::Action(action)),
                Err(err) => drop_undecodable(kind, &err),
            }
        },
        ExtensionMessageType::Other => None,
    }
}

fn drop_undecodable<T>(kind: ExtensionMessageType, err: &DevtoolsError) -> Option<T> {
    tracing::warn!(kind = kind.as_str(), error = %err, "Dropping undecodable panel message");
    metrics::counter!("devtools_extension_dropped_total").increment(1);
    None
}

/// Decode a payload that may arrive as an object or as its JSON text
///
/// # Errors
///
/// Returns [`DevtoolsError::InvalidPayload`] if the payload does not decode
/// into `T`.
pub fn decode_payload<T: DeserializeOwned>(payload: Value) -> Result<T, DevtoolsError> {
    let decoded = match payload {
        Value::String(text) => serde_json::from_str(&text),
        other => serde_json::from_value(other),
    };
    decoded.map_err(|err| DevtoolsError::InvalidPayload(err.to_string()))
}
