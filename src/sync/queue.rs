use parking_lot::Mutex;
use std::collections::VecDeque;
use tokio::sync::Semaphore;

/// Unbounded multi-producer / multi-consumer hand-off queue.
///
/// Every enqueued item adds exactly one permit, and a consumer takes one permit before it
/// pops, so N enqueues allow exactly N dequeues before consumers block again. Duplicates
/// are kept. The lock is only held to push or pop, never across an await.
pub struct WorkQueue<T> {
    items: Mutex<VecDeque<T>>,
    available: Semaphore,
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> WorkQueue<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            available: Semaphore::new(0),
        }
    }

    pub fn enqueue(&self, item: T) {
        self.items.lock().push_back(item);
        self.available.add_permits(1);
    }

    /// Pushes a batch; each item becomes available as soon as the batch is in. Returns how
    /// many were added.
    pub fn enqueue_many<I>(&self, items: I) -> usize
    where
        I: IntoIterator<Item = T>,
    {
        let added = {
            let mut guard = self.items.lock();
            let before = guard.len();
            guard.extend(items);
            guard.len() - before
        };
        if added > 0 {
            self.available.add_permits(added);
        }
        added
    }

    /// Waits for the next item. `None` once the queue is closed.
    ///
    /// Cancel-safe: dropping the future before it resolves never loses an item.
    pub async fn dequeue(&self) -> Option<T> {
        let permit = self.available.acquire().await.ok()?;
        permit.forget();
        self.items.lock().pop_front()
    }

    pub fn try_dequeue(&self) -> Option<T> {
        let permit = self.available.try_acquire().ok()?;
        permit.forget();
        self.items.lock().pop_front()
    }

    /// Wakes every waiting consumer with `None`. Items still queued are dropped with the queue.
    pub fn close(&self) {
        self.available.close();
    }

    pub fn is_closed(&self) -> bool {
        self.available.is_closed()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}
