//! A fixed worker-thread pool draining one FIFO task queue.
//!
//! Grounded in `original_source/.../types/work_manager.hpp`'s
//! `WorkManager`: `addTask`/`startAndJoinAll` become [`WorkPool::submit`]/
//! [`WorkPool::run_to_completion`]. Workers dequeue until the queue is
//! drained then join — no task suspension points, no cancellation, since
//! the engines are short batch jobs (spec.md §5).

use std::sync::mpsc;
use std::thread;

type Task = Box<dyn FnOnce() + Send + 'static>;

/// A pool of worker threads draining one FIFO queue of closures.
pub struct WorkPool {
    sender: Option<mpsc::Sender<Task>>,
    workers: Vec<thread::JoinHandle<()>>,
}

impl WorkPool {
    /// Build a pool with `hardware_concurrency` workers (or 1, if the
    /// platform can't report a concurrency hint).
    pub fn new() -> Self {
        let n = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self::with_workers(n)
    }

    /// Build a pool with exactly `workers` worker threads.
    pub fn with_workers(workers: usize) -> Self {
        let workers = workers.max(1);
        let (sender, receiver) = mpsc::channel::<Task>();
        let receiver = std::sync::Arc::new(std::sync::Mutex::new(receiver));
        let handles = (0..workers)
            .map(|_| {
                let receiver = std::sync::Arc::clone(&receiver);
                thread::spawn(move || loop {
                    let task = {
                        let guard = receiver.lock().expect("work queue mutex poisoned");
                        guard.recv()
                    };
                    match task {
                        Ok(task) => task(),
                        Err(_) => break, // sender dropped, queue drained
                    }
                })
            })
            .collect();
        WorkPool {
            sender: Some(sender),
            workers: handles,
        }
    }

    /// Number of worker threads in this pool.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Enqueue a task. Non-blocking: returns as soon as the task is
    /// queued, without waiting for it to run.
    pub fn submit<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let sender = self
            .sender
            .as_ref()
            .expect("submit called after run_to_completion");
        sender
            .send(Box::new(task))
            .expect("worker threads outlive the sender while the pool is alive");
    }

    /// Close the task queue and block until every worker has drained it
    /// and joined. The pool cannot be reused afterwards — build a new one
    /// for the next sweep's wave of tasks, the way the engines do between
    /// sweeps to get a strict happens-before barrier.
    pub fn run_to_completion(mut self) {
        drop(self.sender.take());
        for worker in self.workers.drain(..) {
            worker.join().expect("worker thread panicked");
        }
    }
}

impl Default for WorkPool {
    fn default() -> Self {
        WorkPool::new()
    }
}

/// Split `0..len` into `chunks` contiguous, roughly-equal-size ranges, the
/// way the engines partition the outermost sweep index across workers.
pub fn chunk_ranges(len: usize, chunks: usize) -> Vec<std::ops::Range<usize>> {
    if len == 0 || chunks == 0 {
        return Vec::new();
    }
    let chunks = chunks.min(len).max(1);
    let base = len / chunks;
    let extra = len % chunks;
    let mut ranges = Vec::with_capacity(chunks);
    let mut start = 0;
    for i in 0..chunks {
        let size = base + if i < extra { 1 } else { 0 };
        ranges.push(start..start + size);
        start += size;
    }
    ranges
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn run_to_completion_runs_every_task() {
        let pool = WorkPool::with_workers(4);
        let sum = Arc::new(Mutex::new(0.0_f64));
        for _ in 0..1000 {
            let sum = Arc::clone(&sum);
            pool.submit(move || {
                *sum.lock().expect("sum mutex poisoned") += 1.0;
            });
        }
        pool.run_to_completion();
        assert_eq!(*sum.lock().expect("sum mutex poisoned"), 1000.0);
    }

    #[test]
    fn chunk_ranges_covers_full_span_without_overlap() {
        let ranges = chunk_ranges(10, 3);
        let total: usize = ranges.iter().map(|r| r.len()).sum();
        assert_eq!(total, 10);
        assert_eq!(ranges.first().unwrap().start, 0);
        assert_eq!(ranges.last().unwrap().end, 10);
        for w in ranges.windows(2) {
            assert_eq!(w[0].end, w[1].start);
        }
    }

    #[test]
    fn chunk_ranges_handles_more_chunks_than_items() {
        let ranges = chunk_ranges(2, 8);
        assert_eq!(ranges.len(), 2);
    }
}
