use parking_lot::Mutex;

use crate::queue::SubmissionQueue;

/// Occupancy of one pool slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotState {
    Idle,
    Occupied(String),
}

/// Owns the pending queue and the occupancy registry of every worker slot.
///
/// All pool/queue state lives here and is only touched through these methods;
/// workers never mutate it directly. `submit` never reports an error back to
/// the intake caller: a submission's fate is only visible through the result
/// store.
pub struct Dispatcher {
    queue: SubmissionQueue,
    slots: Mutex<Vec<SlotState>>,
}

impl Dispatcher {
    pub fn new(pool_size: usize) -> Self {
        Self {
            queue: SubmissionQueue::new(),
            slots: Mutex::new(vec![SlotState::Idle; pool_size]),
        }
    }

    pub fn pool_size(&self) -> usize {
        self.slots.lock().len()
    }

    /// Enqueue a submission and wake an idle worker, FIFO.
    pub async fn submit(&self, id: String) {
        log::info!("submission {id} queued");
        self.queue.push(id).await;
    }

    /// Block until a submission is available. Called from worker tasks only.
    pub async fn next_submission(&self) -> String {
        self.queue.pop().await
    }

    /// Mark a slot Occupied with the submission it now holds.
    ///
    /// Assigning to an already-occupied slot is a dispatcher bug, not a
    /// user-facing condition, and aborts.
    pub fn assign(&self, worker: usize, id: &str) {
        let mut slots = self.slots.lock();
        match &slots[worker] {
            SlotState::Idle => slots[worker] = SlotState::Occupied(id.to_string()),
            SlotState::Occupied(held) => {
                panic!("worker {worker} assigned {id} while still holding {held}")
            }
        }
    }

    /// Return a slot to Idle once its pipeline has finished.
    pub fn release(&self, worker: usize) {
        let mut slots = self.slots.lock();
        match &slots[worker] {
            SlotState::Occupied(_) => slots[worker] = SlotState::Idle,
            SlotState::Idle => panic!("worker {worker} released while idle"),
        }
    }

    pub fn occupied_count(&self) -> usize {
        self.slots
            .lock()
            .iter()
            .filter(|s| matches!(s, SlotState::Occupied(_)))
            .count()
    }

    pub fn slot_states(&self) -> Vec<SlotState> {
        self.slots.lock().clone()
    }

    pub async fn pending(&self) -> usize {
        self.queue.len().await
    }
}
