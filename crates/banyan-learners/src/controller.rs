//! Dispatch of independent learner tasks.
//!
//! Parallelism is coarse-grained: whole learner runs go to workers,
//! workers share nothing after launch, and results come back by value.

use crate::Learner;
use crate::result::LearnerResult;
use banyan_error::BanyanResult;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;

type Job = Box<dyn FnOnce() + Send + 'static>;

enum Message {
    Work(Job),
    Terminate,
}

/// Handle for a job submitted to the pool; `result()` blocks until the
/// job has run.
pub struct WorkResult<T> {
    receiver: mpsc::Receiver<T>,
}

impl<T> WorkResult<T> {
    pub fn result(&self) -> T {
        self.receiver.recv().unwrap()
    }
}

struct Worker {
    handle: Option<thread::JoinHandle<()>>,
}

impl Worker {
    fn new(receiver: Arc<Mutex<mpsc::Receiver<Message>>>) -> Self {
        let handle = thread::spawn(move || {
            loop {
                let message = {
                    let guard = receiver.lock().unwrap();
                    guard.recv()
                };
                match message {
                    Ok(Message::Work(job)) => job(),
                    Ok(Message::Terminate) | Err(_) => break,
                }
            }
        });
        Worker {
            handle: Some(handle),
        }
    }
}

/// Fixed-size pool of worker threads fed through a shared channel.
pub struct ThreadPool {
    sender: mpsc::Sender<Message>,
    workers: Vec<Worker>,
}

impl ThreadPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        let (sender, receiver) = mpsc::channel();
        let receiver = Arc::new(Mutex::new(receiver));
        ThreadPool {
            sender,
            workers: (0..size)
                .map(|_| Worker::new(Arc::clone(&receiver)))
                .collect(),
        }
    }

    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    pub fn submit<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let _ = self.sender.send(Message::Work(Box::new(job)));
    }

    pub fn submit_with_result<F, R>(&self, job: F) -> WorkResult<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        self.submit(move || {
            let _ = tx.send(job());
        });
        WorkResult { receiver: rx }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        for _ in &self.workers {
            let _ = self.sender.send(Message::Terminate);
        }
        for worker in &mut self.workers {
            if let Some(handle) = worker.handle.take() {
                let _ = handle.join();
            }
        }
    }
}

/// Where jobs run: inline on the calling thread, or on a worker pool.
pub enum Executor {
    Serial,
    WorkerPool(ThreadPool),
}

impl Executor {
    pub fn serial() -> Self {
        Executor::Serial
    }

    pub fn worker_pool(num_workers: usize) -> Self {
        Executor::WorkerPool(ThreadPool::new(num_workers))
    }

    pub fn execute_batch<F, R>(&self, jobs: Vec<F>) -> Vec<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        match self {
            Executor::Serial => jobs.into_iter().map(|job| job()).collect(),
            Executor::WorkerPool(pool) => {
                let handles: Vec<WorkResult<R>> = jobs
                    .into_iter()
                    .map(|job| pool.submit_with_result(job))
                    .collect();
                handles.into_iter().map(|handle| handle.result()).collect()
            }
        }
    }
}

/// Runs a batch of learners and hands their results back in submission
/// order.
pub struct TaskController {
    executor: Executor,
}

impl TaskController {
    pub fn serial() -> Self {
        TaskController {
            executor: Executor::serial(),
        }
    }

    pub fn threaded(num_workers: usize) -> Self {
        TaskController {
            executor: Executor::worker_pool(num_workers),
        }
    }

    pub fn run(
        &self,
        tasks: Vec<Box<dyn Learner + Send>>,
    ) -> Vec<BanyanResult<LearnerResult>> {
        let jobs: Vec<_> = tasks
            .into_iter()
            .map(|mut task| move || task.run())
            .collect();
        self.executor.execute_batch(jobs)
    }
}
