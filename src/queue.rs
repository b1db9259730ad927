use std::collections::VecDeque;

use tokio::sync::{Mutex, Notify};

/// FIFO queue of pending submission ids.
///
/// Replaces a busy re-scan of the pool with a wake-on-push: idle workers park
/// in `pop` until `push` signals them. Pops happen under the queue mutex, so
/// an id is handed to exactly one worker and ids come out in submission order.
pub struct SubmissionQueue {
    queue: Mutex<VecDeque<String>>,
    notify: Notify,
}

impl SubmissionQueue {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    pub async fn push(&self, id: String) {
        self.queue.lock().await.push_back(id);
        self.notify.notify_one();
    }

    pub async fn pop(&self) -> String {
        loop {
            if let Some(id) = self.queue.lock().await.pop_front() {
                return id;
            }
            self.notify.notified().await;
        }
    }

    pub async fn len(&self) -> usize {
        self.queue.lock().await.len()
    }
}
