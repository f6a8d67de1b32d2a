//! Single-slot handoff of the most recently received message.
//!
//! Writers never block: a new message replaces one that was not read yet.
//! Readers block until a message is present and take it out.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use tracing::trace;

/// Capacity-one, overwrite-on-full message slot.
#[derive(Debug, Default)]
pub struct Recorder {
    slot: Mutex<Option<Bytes>>,
    ready: Condvar,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `message`, dropping an unread previous one.
    pub fn add(&self, message: Bytes) {
        let mut slot = self.lock();
        if let Some(dropped) = slot.replace(message) {
            trace!(bytes = dropped.len(), "Dropping unread message");
        }
        drop(slot);
        self.ready.notify_one();
    }

    /// Wait for a message and take it.
    pub fn take(&self) -> Bytes {
        let slot = self.lock();
        let mut slot = self
            .ready
            .wait_while(slot, |slot| slot.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        slot.take().unwrap_or_default()
    }

    /// Wait up to `timeout` for a message and take it.
    pub fn take_timeout(&self, timeout: Duration) -> Option<Bytes> {
        let slot = self.lock();
        let (mut slot, _) = self
            .ready
            .wait_timeout_while(slot, timeout, |slot| slot.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        slot.take()
    }

    /// Take the message if one is present.
    pub fn try_take(&self) -> Option<Bytes> {
        self.lock().take()
    }

    /// True when a message is waiting.
    pub fn is_full(&self) -> bool {
        self.lock().is_some()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Bytes>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
