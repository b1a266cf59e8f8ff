//! Min-heap timer used for idle-connection eviction.
//!
//! A fixed-capacity binary heap can't support the O(log n) arbitrary-key
//! update this needs (a connection's deadline moves forward on every byte
//! it sends or receives), so this keeps its own `Vec`-backed heap plus an
//! `id -> index` side map, same shape as a textbook indexed priority queue.

use std::collections::HashMap;
use std::time::{Duration, Instant};

pub struct TimerTask {
    pub id: usize,
    pub deadline: Instant,
    pub callback: Box<dyn FnOnce() + Send>,
}

pub struct Timer {
    heap: Vec<TimerTask>,
    index: HashMap<usize, usize>,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            heap: Vec::with_capacity(64),
            index: HashMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Add a task, or reschedule it in place if `id` is already tracked.
    pub fn add(&mut self, id: usize, deadline: Instant, callback: Box<dyn FnOnce() + Send>) {
        if self.index.contains_key(&id) {
            self.update(id, deadline);
            return;
        }
        self.heap.push(TimerTask {
            id,
            deadline,
            callback,
        });
        let i = self.heap.len() - 1;
        self.index.insert(id, i);
        self.sift_up(i);
    }

    /// Push `id`'s deadline out without touching its callback.
    pub fn update(&mut self, id: usize, deadline: Instant) {
        let Some(&i) = self.index.get(&id) else {
            return;
        };
        self.heap[i].deadline = deadline;
        self.sift_up(i);
        self.sift_down(i);
    }

    pub fn remove(&mut self, id: usize) {
        let Some(&i) = self.index.get(&id) else {
            return;
        };
        self.swap(i, self.heap.len() - 1);
        self.index.remove(&id);
        self.heap.pop();
        if i < self.heap.len() {
            self.sift_down(i);
            self.sift_up(i);
        }
    }

    /// Run every task whose deadline has passed, then return how long (in
    /// milliseconds) the caller should wait before calling this again.
    /// `None` means no task is scheduled at all.
    pub fn next_tick(&mut self) -> Option<u64> {
        let now = Instant::now();
        while let Some(top) = self.heap.first() {
            if top.deadline > now {
                break;
            }
            self.pop_due(now);
        }
        self.heap.first().map(|t| {
            t.deadline
                .saturating_duration_since(now)
                .as_millis()
                .min(u64::MAX as u128) as u64
        })
    }

    fn pop_due(&mut self, _now: Instant) {
        let last = self.heap.len() - 1;
        self.swap(0, last);
        let task = self.heap.pop().expect("heap non-empty");
        self.index.remove(&task.id);
        if !self.heap.is_empty() {
            self.sift_down(0);
        }
        (task.callback)();
    }

    fn swap(&mut self, i: usize, j: usize) {
        self.heap.swap(i, j);
        self.index.insert(self.heap[i].id, i);
        self.index.insert(self.heap[j].id, j);
    }

    fn sift_up(&mut self, mut i: usize) {
        while i > 0 {
            let parent = (i - 1) / 2;
            if self.heap[parent].deadline <= self.heap[i].deadline {
                break;
            }
            self.swap(i, parent);
            i = parent;
        }
    }

    fn sift_down(&mut self, mut i: usize) {
        loop {
            let mut smallest = i;
            let left = i * 2 + 1;
            let right = i * 2 + 2;
            if left < self.heap.len() && self.heap[left].deadline < self.heap[smallest].deadline {
                smallest = left;
            }
            if right < self.heap.len() && self.heap[right].deadline < self.heap[smallest].deadline
            {
                smallest = right;
            }
            if smallest == i {
                break;
            }
            self.swap(i, smallest);
            i = smallest;
        }
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

pub fn deadline_in(ms: u64) -> Instant {
    Instant::now() + Duration::from_millis(ms)
}
