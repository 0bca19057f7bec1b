//! Per-chat FIFO queues.
//!
//! Updates for one `(platform, chat)` pair must be processed to completion
//! in arrival order; updates for different chats are independent. The relay
//! keeps one in-memory queue per busy chat: the first update for an idle
//! chat tells the caller to start a drain worker, later updates just queue
//! behind it, and the worker removes the key when the queue runs dry.
//!
//! A map entry exists exactly while a worker is active for that key; both
//! enqueue and pop happen under the same lock, so a worker observing an
//! empty queue and a concurrent enqueue cannot both decide nobody drains.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use crate::types::{ChatKey, InboundMessage};

/// Keyed FIFO queues with worker-lifecycle bookkeeping.
#[derive(Default)]
pub struct ChatQueues {
    inner: Mutex<HashMap<ChatKey, VecDeque<InboundMessage>>>,
}

impl ChatQueues {
    /// Create an empty queue set.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ChatKey, VecDeque<InboundMessage>>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Queue a message for its chat.
    ///
    /// Returns `true` when the chat was idle and the caller must spawn a
    /// drain worker for this key; `false` when an active worker will pick
    /// the message up.
    pub fn enqueue(&self, key: &ChatKey, msg: InboundMessage) -> bool {
        let mut map = self.lock();
        match map.get_mut(key) {
            Some(queue) => {
                queue.push_back(msg);
                false
            }
            None => {
                let mut queue = VecDeque::new();
                queue.push_back(msg);
                map.insert(key.clone(), queue);
                true
            }
        }
    }

    /// Pop the next message for a key.
    ///
    /// Returns `None` when the queue is empty; the key is removed in the
    /// same critical section, so the calling worker must exit afterwards.
    pub fn next(&self, key: &ChatKey) -> Option<InboundMessage> {
        let mut map = self.lock();
        let queue = map.get_mut(key)?;
        match queue.pop_front() {
            Some(msg) => Some(msg),
            None => {
                map.remove(key);
                None
            }
        }
    }

    /// Number of chats with an active worker.
    pub fn active_chats(&self) -> usize {
        self.lock().len()
    }
}
