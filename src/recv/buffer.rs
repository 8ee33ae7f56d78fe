//! Unbounded, ordered handoff of inbound messages to one stream reader.
//!
//! Producers never block: a message goes straight into a single-slot
//! rendezvous channel when it is free and nothing is queued ahead of it,
//! otherwise into the backlog. The consumer promotes the next backlog entry
//! with [`RecvBuffer::load`] after taking one from the slot.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};

use super::{RecvMsg, StreamError};

#[derive(Debug, Default)]
struct Backlog {
    queue: VecDeque<RecvMsg>,
    // Set once a terminal message has been accepted.
    terminated: bool,
}

/// Producer side of a stream's inbound queue.
#[derive(Debug)]
pub struct RecvBuffer {
    slot: mpsc::Sender<RecvMsg>,
    backlog: Mutex<Backlog>,
}

/// Consumer side of the rendezvous slot. Exactly one per buffer.
#[derive(Debug)]
pub struct RecvSlot {
    rx: mpsc::Receiver<RecvMsg>,
}

impl RecvBuffer {
    /// Create a buffer and its single consumer handle.
    pub fn channel() -> (Arc<Self>, RecvSlot) {
        let (slot, rx) = mpsc::channel(1);
        let buf = Arc::new(Self {
            slot,
            backlog: Mutex::new(Backlog::default()),
        });
        (buf, RecvSlot { rx })
    }

    /// Enqueue `msg`.
    ///
    /// Once a terminal message has been accepted, every later message is
    /// dropped.
    pub fn put(&self, msg: RecvMsg) {
        let mut state = self.backlog.lock();
        if state.terminated {
            return;
        }
        state.terminated = msg.is_terminal();

        let msg = if state.queue.is_empty() {
            match self.slot.try_send(msg) {
                Ok(()) => return,
                Err(TrySendError::Full(msg)) => msg,
                // Reader is gone.
                Err(TrySendError::Closed(_)) => return,
            }
        } else {
            msg
        };
        state.queue.push_back(msg);
    }

    /// Move the oldest backlog entry into the slot if the slot is free.
    pub fn load(&self) {
        let mut state = self.backlog.lock();
        let Some(msg) = state.queue.pop_front() else {
            return;
        };
        match self.slot.try_send(msg) {
            Ok(()) => {}
            Err(TrySendError::Full(msg)) => state.queue.push_front(msg),
            Err(TrySendError::Closed(_)) => state.queue.clear(),
        }
    }

    /// Messages waiting behind the slot.
    pub fn backlog_len(&self) -> usize {
        self.backlog.lock().queue.len()
    }

    /// Whether a terminal message has been accepted.
    pub fn is_terminated(&self) -> bool {
        self.backlog.lock().terminated
    }
}

impl RecvSlot {
    /// Wait for the next message in the slot.
    ///
    /// Cancel safe. After taking a message the caller must call
    /// [`RecvBuffer::load`].
    pub async fn get(&mut self) -> RecvMsg {
        match self.rx.recv().await {
            Some(msg) => msg,
            None => RecvMsg::Terminal(StreamError::transport("receive buffer dropped")),
        }
    }

    /// Take the slot's message if one is ready.
    pub fn try_get(&mut self) -> Option<RecvMsg> {
        self.rx.try_recv().ok()
    }
}
