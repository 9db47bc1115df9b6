use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

/// One unit of pending work: a URL and the page it was found on.
/// The seed has an empty referrer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontierEntry {
    pub url: String,
    pub referrer: String,
}

#[derive(Default)]
struct FrontierState {
    queue: VecDeque<FrontierEntry>,
    discovered: HashSet<String>,
}

/// Shared work queue with "join" semantics.
///
/// Every pushed entry stays *unsettled* until the worker that dequeued it
/// calls [`Frontier::task_done`] (or drops the guard from
/// [`Frontier::settle_on_drop`]). [`Frontier::join`] resolves once the queue
/// is empty and nothing is unsettled, which is the crawl's termination
/// condition.
///
/// A URL is accepted at most once over the frontier's lifetime: the
/// membership check and the insertion happen under one lock.
pub struct Frontier {
    state: Mutex<FrontierState>,
    unsettled: watch::Sender<usize>,
}

impl Frontier {
    pub fn new() -> Self {
        let (unsettled, _) = watch::channel(0);
        Self {
            state: Mutex::new(FrontierState::default()),
            unsettled,
        }
    }

    fn state(&self) -> MutexGuard<'_, FrontierState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues `url` unless it has been seen before. Returns whether it was queued.
    pub fn push(&self, url: &str, referrer: &str) -> bool {
        let mut state = self.state();
        if !state.discovered.insert(url.to_string()) {
            return false;
        }
        // Counted before it becomes visible so a fast consumer can't settle it first.
        self.unsettled.send_modify(|unsettled| *unsettled += 1);
        state.queue.push_back(FrontierEntry {
            url: url.to_string(),
            referrer: referrer.to_string(),
        });
        true
    }

    pub fn is_known(&self, url: &str) -> bool {
        self.state().discovered.contains(url)
    }

    pub fn try_next(&self) -> Option<FrontierEntry> {
        self.state().queue.pop_front()
    }

    /// Next entry, waiting while the queue is empty but other work is still
    /// unsettled. `None` once the frontier is drained and settled.
    pub async fn next(&self) -> Option<FrontierEntry> {
        let mut changes = self.unsettled.subscribe();
        loop {
            let unsettled = *changes.borrow_and_update();
            if let Some(entry) = self.try_next() {
                return Some(entry);
            }
            if unsettled == 0 {
                return None;
            }
            if changes.changed().await.is_err() {
                return None;
            }
        }
    }

    pub fn task_done(&self) {
        self.unsettled
            .send_modify(|unsettled| *unsettled = unsettled.saturating_sub(1));
    }

    /// Settles the current entry when the returned guard is dropped,
    /// including when the owning task unwinds or is aborted.
    pub fn settle_on_drop(&self) -> SettleGuard<'_> {
        SettleGuard { frontier: self }
    }

    /// Removes every queued entry without processing it. Returns how many
    /// were removed.
    pub fn drain(&self) -> usize {
        let drained = {
            let mut state = self.state();
            let drained = state.queue.len();
            state.queue.clear();
            drained
        };
        if drained > 0 {
            self.unsettled
                .send_modify(|unsettled| *unsettled = unsettled.saturating_sub(drained));
        }
        drained
    }

    pub async fn join(&self) {
        let mut changes = self.unsettled.subscribe();
        loop {
            if *changes.borrow_and_update() == 0 {
                return;
            }
            if changes.changed().await.is_err() {
                return;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.state().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn unsettled(&self) -> usize {
        *self.unsettled.borrow()
    }

    pub fn discovered(&self) -> usize {
        self.state().discovered.len()
    }
}

impl Default for Frontier {
    fn default() -> Self {
        Self::new()
    }
}

pub struct SettleGuard<'a> {
    frontier: &'a Frontier,
}

impl Drop for SettleGuard<'_> {
    fn drop(&mut self) {
        self.frontier.task_done();
    }
}
