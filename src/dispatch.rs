//! MAVLink Message Dispatcher
//!
//! Routes incoming MAVLink messages to the handlers registered for their
//! message id.
//!
//! # Architecture
//!
//! Protocol state machines register handlers while a transfer is active and
//! drop them once it finishes. Every handler is tagged with a
//! [`HandlerOwner`], so a finished transfer can remove all of its handlers
//! with one [`MessageDispatcher::unregister_all`] call.
//!
//! # Design Principles
//!
//! - **Snapshot dispatch**: the handler list is copied and the lock released
//!   before any handler runs, so handlers may register or unregister freely
//! - **Registration order**: handlers for the same id run in the order they
//!   were added
//! - **Fire and forget**: handlers return nothing, they forward what they
//!   need into their owner's event queue

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use mavlink::common::MavMessage;
use mavlink::{MavHeader, Message};
use tracing::trace;

/// Handler invoked for every matching message.
pub type MessageCallback = Arc<dyn Fn(&MavHeader, &MavMessage) + Send + Sync>;

/// Opaque identity tagging the handlers of one registrant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerOwner(u64);

struct HandlerEntry {
    message_id: u32,
    owner: HandlerOwner,
    callback: MessageCallback,
}

#[derive(Default)]
struct HandlerTable {
    entries: Vec<HandlerEntry>,
    next_owner: u64,
}

/// Message-id keyed handler table.
#[derive(Default)]
pub struct MessageDispatcher {
    table: Mutex<HandlerTable>,
}

impl MessageDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a fresh owner identity.
    pub fn allocate_owner(&self) -> HandlerOwner {
        let mut table = self.lock();
        let owner = HandlerOwner(table.next_owner);
        table.next_owner += 1;
        owner
    }

    /// Register `callback` for `message_id` on behalf of `owner`.
    pub fn register<F>(&self, message_id: u32, owner: HandlerOwner, callback: F)
    where
        F: Fn(&MavHeader, &MavMessage) + Send + Sync + 'static,
    {
        self.lock().entries.push(HandlerEntry {
            message_id,
            owner,
            callback: Arc::new(callback),
        });
    }

    /// Remove the handlers `owner` registered for `message_id`.
    pub fn unregister(&self, message_id: u32, owner: HandlerOwner) {
        self.lock()
            .entries
            .retain(|e| !(e.message_id == message_id && e.owner == owner));
    }

    /// Remove every handler registered by `owner`.
    pub fn unregister_all(&self, owner: HandlerOwner) {
        self.lock().entries.retain(|e| e.owner != owner);
    }

    /// Invoke every handler registered for the message's id.
    ///
    /// Returns the number of handlers that ran.
    pub fn dispatch(&self, header: &MavHeader, message: &MavMessage) -> usize {
        let message_id = message.message_id();
        let handlers: Vec<MessageCallback> = self
            .lock()
            .entries
            .iter()
            .filter(|e| e.message_id == message_id)
            .map(|e| Arc::clone(&e.callback))
            .collect();

        if handlers.is_empty() {
            trace!(message_id, "no handler registered");
        }

        for handler in &handlers {
            handler(header, message);
        }
        handlers.len()
    }

    /// Total number of registered handlers.
    pub fn handler_count(&self) -> usize {
        self.lock().entries.len()
    }

    fn lock(&self) -> MutexGuard<'_, HandlerTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
