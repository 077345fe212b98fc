//! Deferred work polled from the game loop
//!
//! Nothing here runs on its own: the owner calls [`Scheduler::due`] once per
//! tick and acts on what comes back. Entries can be cancelled any time before
//! they fire.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

#[derive(Debug)]
struct Entry<T> {
    id: TaskId,
    at: Duration,
    task: T,
}

#[derive(Debug)]
pub struct Scheduler<T> {
    next_id: u64,
    entries: Vec<Entry<T>>,
}

impl<T> Scheduler<T> {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            entries: Vec::new(),
        }
    }

    pub fn schedule(&mut self, at: Duration, task: T) -> TaskId {
        let id = TaskId(self.next_id);
        self.next_id += 1;
        self.entries.push(Entry { id, at, task });
        id
    }

    /// Removes a pending task. Returns false if it already fired or never existed.
    pub fn cancel(&mut self, id: TaskId) -> bool {
        match self.entries.iter().position(|e| e.id == id) {
            Some(index) => {
                self.entries.swap_remove(index);
                true
            }
            None => false,
        }
    }

    /// Takes every task whose time has come, earliest first.
    pub fn due(&mut self, now: Duration) -> Vec<T> {
        let mut ready = Vec::new();
        let mut i = 0;
        while i < self.entries.len() {
            if self.entries[i].at <= now {
                ready.push(self.entries.swap_remove(i));
            } else {
                i += 1;
            }
        }
        ready.sort_by_key(|e| (e.at, e.id));
        ready.into_iter().map(|e| e.task).collect()
    }

    pub fn is_scheduled(&self, id: TaskId) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<T> Default for Scheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}
