//! In-memory panel connection for testing the extension bridge
//!
//! [`MockExtensionConnection`] plays the panel side: tests push protocol
//! messages into it and inspect what the devtools sent back.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Panics only on a poisoned lock

use futures::stream::{self, BoxStream, StreamExt};
use rewind_runtime::extension::{ExtensionConnection, ExtensionMessage};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// One `send(action, state)` call received by the panel
#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    /// The recorded action, for a plain dispatch
    pub action: Option<Value>,
    /// The application state, or the whole lifted state when `action` is `None`
    pub state: Value,
}

/// In-memory panel connection
///
/// # Example
///
/// ```
/// use rewind_runtime::extension::ExtensionConnection;
/// use rewind_testing::MockExtensionConnection;
/// use serde_json::json;
///
/// let panel = MockExtensionConnection::new();
/// panel.send(None, json!({ "stagedActionIds": [0] }));
///
/// assert_eq!(panel.sent().len(), 1);
/// assert!(panel.last_sent().unwrap().action.is_none());
/// ```
#[derive(Debug)]
pub struct MockExtensionConnection {
    inbound: mpsc::UnboundedSender<ExtensionMessage>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<ExtensionMessage>>>,
    sent: Mutex<Vec<SentMessage>>,
    unsubscribed: AtomicBool,
}

impl MockExtensionConnection {
    /// Create a new panel connection
    #[must_use]
    pub fn new() -> Arc<Self> {
        let (inbound, receiver) = mpsc::unbounded_channel();
        Arc::new(Self {
            inbound,
            receiver: Mutex::new(Some(receiver)),
            sent: Mutex::new(Vec::new()),
            unsubscribed: AtomicBool::new(false),
        })
    }

    /// Deliver a raw protocol message to the devtools
    pub fn push(&self, message: ExtensionMessage) {
        // The receiver is gone once the bridge stops listening.
        let _ = self.inbound.send(message);
    }

    /// Open a panel session
    pub fn start(&self) {
        self.push(ExtensionMessage::start());
    }

    /// Close the panel session
    pub fn stop(&self) {
        self.push(ExtensionMessage::stop());
    }

    /// Send a lifted command, e.g. `{"type":"JUMP_TO_STATE","index":1}`
    pub fn dispatch(&self, command: Value) {
        self.push(ExtensionMessage::dispatch(command));
    }

    /// Send a real application action
    pub fn action(&self, action: Value) {
        self.push(ExtensionMessage::action(action));
    }

    /// Everything the devtools sent so far
    #[must_use]
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    /// The most recent message the devtools sent
    #[must_use]
    pub fn last_sent(&self) -> Option<SentMessage> {
        self.sent.lock().unwrap().last().cloned()
    }

    /// Forget recorded messages (for test isolation)
    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }

    /// Whether the devtools released the connection
    #[must_use]
    pub fn is_unsubscribed(&self) -> bool {
        self.unsubscribed.load(Ordering::Acquire)
    }
}

impl ExtensionConnection for MockExtensionConnection {
    fn subscribe(&self) -> BoxStream<'static, ExtensionMessage> {
        match self.receiver.lock().unwrap().take() {
            Some(receiver) => stream::unfold(receiver, |mut receiver| async move {
                receiver.recv().await.map(|message| (message, receiver))
            })
            .boxed(),
            None => stream::empty().boxed(),
        }
    }

    fn unsubscribe(&self) {
        self.unsubscribed.store(true, Ordering::Release);
    }

    fn send(&self, action: Option<Value>, state: Value) {
        self.sent.lock().unwrap().push(SentMessage { action, state });
    }
}
