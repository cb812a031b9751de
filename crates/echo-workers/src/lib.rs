// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Echo Workers
//!
//! A fixed-size pool of background threads for fire-and-forget auxiliary work
//! (file appends, flushes). Submitting never blocks; jobs are pulled from a
//! shared queue in submission order by whichever worker is free.
//!
//! A job that panics is logged and discarded; the worker keeps serving the
//! queue. Dropping the pool (or calling [`WorkerPool::shutdown`]) closes the
//! queue, lets the workers drain what was already submitted, and joins them.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use tracing::{error, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed-size background worker pool.
pub struct WorkerPool {
    sender: Option<Sender<Job>>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `workers` threads named `{name}-{n}`. At least one worker is
    /// always started.
    pub fn new(name: &str, workers: usize) -> Self {
        let (sender, receiver) = mpsc::channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));
        let handles = (0..workers.max(1))
            .filter_map(|n| {
                let rx = Arc::clone(&receiver);
                std::thread::Builder::new()
                    .name(format!("{name}-{n}"))
                    .spawn(move || worker_loop(&rx))
                    .map_err(|err| warn!(?err, "failed to spawn worker thread"))
                    .ok()
            })
            .collect();
        Self {
            sender: Some(sender),
            handles,
        }
    }

    /// Number of live worker threads.
    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Queues `job` for execution. Returns false if the pool has no workers
    /// left to run it (the job is dropped).
    pub fn submit<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        match &self.sender {
            Some(tx) if !self.handles.is_empty() => tx.send(Box::new(job)).is_ok(),
            _ => false,
        }
    }

    /// Closes the queue, runs every job already submitted, and joins the workers.
    pub fn shutdown(mut self) {
        self.close();
    }

    fn close(&mut self) {
        // Dropping the only sender ends every worker's recv loop once drained.
        self.sender.take();
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                error!("worker thread terminated abnormally");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.close();
    }
}

fn worker_loop(rx: &Mutex<Receiver<Job>>) {
    loop {
        let job = {
            let guard = rx.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            guard.recv()
        };
        let Ok(job) = job else {
            return;
        };
        if catch_unwind(AssertUnwindSafe(job)).is_err() {
            error!("background job panicked");
        }
    }
}
