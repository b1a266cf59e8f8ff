//! Fixed-size worker thread pool draining a shared FIFO task queue.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

type Job = Box<dyn FnOnce() + Send + 'static>;

struct Shared {
    queue: Mutex<VecDeque<Job>>,
    condvar: Condvar,
    shutdown: Mutex<bool>,
}

pub struct WorkerPool {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(thread_count: usize) -> Self {
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            condvar: Condvar::new(),
            shutdown: Mutex::new(false),
        });

        let workers = (0..thread_count.max(1))
            .map(|_| {
                let shared = shared.clone();
                thread::spawn(move || Self::run(shared))
            })
            .collect();

        Self { shared, workers }
    }

    fn run(shared: Arc<Shared>) {
        loop {
            let mut queue = shared.queue.lock().unwrap();
            while queue.is_empty() && !*shared.shutdown.lock().unwrap() {
                queue = shared.condvar.wait(queue).unwrap();
            }
            let Some(job) = queue.pop_front() else {
                return; // shutdown and drained
            };
            drop(queue);
            job();
        }
    }

    pub fn submit<F: FnOnce() + Send + 'static>(&self, job: F) {
        self.shared.queue.lock().unwrap().push_back(Box::new(job));
        self.shared.condvar.notify_one();
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        *self.shared.shutdown.lock().unwrap() = true;
        self.shared.condvar.notify_all();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn runs_every_submitted_job() {
        let pool = WorkerPool::new(4);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..100 {
            let counter = counter.clone();
            pool.submit(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        drop(pool); // joins all workers, draining the queue first
        assert_eq!(counter.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn jobs_run_concurrently_across_workers() {
        let pool = WorkerPool::new(2);
        let started = Arc::new(AtomicUsize::new(0));
        for _ in 0..2 {
            let started = started.clone();
            pool.submit(move || {
                started.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(50));
            });
        }
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(started.load(Ordering::SeqCst), 2);
    }
}
