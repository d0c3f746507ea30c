//! The throttled, priority-ordered command queue behind the manager.
//!
//! A stable priority queue: higher priority first, ties resolved
//! oldest-first by a monotonic enqueue sequence. The remaining items are
//! re-sorted before each dispatch, so priorities injected mid-drain take
//! effect immediately.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::oneshot;

use unihub_domain::command::{DeviceCommand, SceneCommand};
use unihub_domain::error::UnihubError;
use unihub_domain::id::{AdapterId, TicketId};
use unihub_domain::time::Timestamp;

/// A queued, not-yet-dispatched command.
pub(crate) struct QueuedItem {
    pub ticket: TicketId,
    pub kind: QueuedKind,
    pub adapter_id: AdapterId,
    pub priority: i32,
    pub enqueued_at: Timestamp,
    seq: u64,
    pub responder: oneshot::Sender<Result<(), UnihubError>>,
}

pub(crate) enum QueuedKind {
    Device(DeviceCommand),
    Scene(SceneCommand),
}

/// Awaitable handle for a queued command, settled individually when the
/// command completes, fails, or is cleared.
pub struct CommandTicket {
    pub id: TicketId,
    rx: oneshot::Receiver<Result<(), UnihubError>>,
}

impl CommandTicket {
    /// Wait for the queued command to settle.
    ///
    /// # Errors
    ///
    /// Returns the dispatch failure, [`UnihubError::QueueCleared`] when the
    /// queue was cleared before dispatch, or [`UnihubError::Command`] when
    /// the dispatcher stopped.
    pub async fn wait(self) -> Result<(), UnihubError> {
        self.rx
            .await
            .unwrap_or_else(|_| Err(UnihubError::Command("command dispatcher stopped".into())))
    }
}

/// Bounded FIFO-with-priorities buffer. Rejects synchronously at capacity.
pub(crate) struct CommandQueue {
    items: Mutex<Vec<QueuedItem>>,
    next_seq: AtomicU64,
    capacity: usize,
}

impl CommandQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            items: Mutex::new(Vec::new()),
            next_seq: AtomicU64::new(0),
            capacity,
        }
    }

    /// Enqueue a command. Fails immediately when the queue is at capacity.
    pub(crate) fn push(
        &self,
        kind: QueuedKind,
        adapter_id: AdapterId,
        priority: i32,
    ) -> Result<CommandTicket, UnihubError> {
        let mut items = self.items.lock().expect("queue lock poisoned");
        if items.len() >= self.capacity {
            return Err(UnihubError::QueueFull {
                capacity: self.capacity,
            });
        }

        let ticket = TicketId::new();
        let (tx, rx) = oneshot::channel();
        items.push(QueuedItem {
            ticket,
            kind,
            adapter_id,
            priority,
            enqueued_at: unihub_domain::time::now(),
            seq: self.next_seq.fetch_add(1, Ordering::SeqCst),
            responder: tx,
        });
        Ok(CommandTicket { id: ticket, rx })
    }

    /// Re-sort the remaining items (priority descending, enqueue order
    /// ascending) and take the head.
    pub(crate) fn take_next(&self) -> Option<QueuedItem> {
        let mut items = self.items.lock().expect("queue lock poisoned");
        if items.is_empty() {
            return None;
        }
        items.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.seq.cmp(&b.seq)));
        Some(items.remove(0))
    }

    /// Reject every pending item with [`UnihubError::QueueCleared`] and
    /// empty the queue. Returns how many items were rejected.
    pub(crate) fn clear(&self) -> usize {
        let drained: Vec<QueuedItem> = {
            let mut items = self.items.lock().expect("queue lock poisoned");
            items.drain(..).collect()
        };
        let count = drained.len();
        for item in drained {
            let _ = item.responder.send(Err(UnihubError::QueueCleared));
        }
        count
    }

    pub(crate) fn len(&self) -> usize {
        self.items.lock().expect("queue lock poisoned").len()
    }
}
