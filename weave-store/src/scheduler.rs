//! Owner-thread scheduler.
//!
//! Every committing mutation in a store runs on one dedicated thread, the
//! owner thread. The scheduler owns that thread and a priority queue of
//! units of work: Immediate before Normal before Background, FIFO within a
//! class. Synchronous callers block on a oneshot completion channel;
//! asynchronous callers fire and forget, with faults forwarded to the
//! store's background-fault channel.

use crate::error::{StoreError, StoreResult};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle, ThreadId};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use weave_types::Priority;

/// An action executed on the owner thread.
pub type UnitOfWork = Box<dyn FnOnce() -> StoreResult<()> + Send + 'static>;

/// A fault raised inside an asynchronously scheduled unit of work.
///
/// Faults never propagate into the submitting caller's stack; they arrive
/// on the store's fault channel, labelled with the unit that raised them.
#[derive(Debug)]
pub struct BackgroundFault {
    pub label: String,
    pub error: StoreError,
}

struct Job {
    priority: Priority,
    seq: u64,
    label: String,
    action: UnitOfWork,
    done: Option<oneshot::Sender<StoreResult<()>>>,
}

impl PartialEq for Job {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for Job {}

impl PartialOrd for Job {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Job {
    // BinaryHeap pops the greatest element; make "greatest" mean the most
    // urgent class, earliest sequence number within it.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then(other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct JobQueue {
    heap: BinaryHeap<Job>,
    next_seq: u64,
}

struct SchedulerInner {
    queue: Mutex<JobQueue>,
    available: Condvar,
    running: AtomicBool,
    fault_tx: mpsc::UnboundedSender<BackgroundFault>,
}

/// Executes submitted units of work exclusively on one owner thread.
pub struct OwnerScheduler {
    inner: Arc<SchedulerInner>,
    owner: ThreadId,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl OwnerScheduler {
    /// Spawns the owner thread. Faults from submitted work arrive on the
    /// returned receiver.
    pub(crate) fn spawn(
        thread_name: &str,
    ) -> (Self, mpsc::UnboundedReceiver<BackgroundFault>) {
        let (fault_tx, fault_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(SchedulerInner {
            queue: Mutex::new(JobQueue::default()),
            available: Condvar::new(),
            running: AtomicBool::new(true),
            fault_tx,
        });

        let worker_inner = Arc::clone(&inner);
        let handle = thread::Builder::new()
            .name(thread_name.to_string())
            .spawn(move || run_loop(&worker_inner))
            .expect("failed to spawn owner thread");
        let owner = handle.thread().id();
        info!(thread = thread_name, "owner thread started");

        (
            Self {
                inner,
                owner,
                handle: Mutex::new(Some(handle)),
            },
            fault_rx,
        )
    }

    /// Returns true when called from the owner thread.
    #[must_use]
    pub fn is_owner_thread(&self) -> bool {
        thread::current().id() == self.owner
    }

    /// Schedules a unit of work and returns immediately.
    ///
    /// A fault inside the action is forwarded to the fault channel, never
    /// to the caller.
    pub fn submit(&self, priority: Priority, label: impl Into<String>, action: UnitOfWork) {
        self.push(Job {
            priority,
            seq: 0,
            label: label.into(),
            action,
            done: None,
        });
    }

    /// Executes a unit of work on the owner thread and waits for it.
    ///
    /// Called from the owner thread itself, the action runs inline — the
    /// exactly-once guarantee holds and the caller cannot deadlock on its
    /// own queue.
    pub fn run_blocking(
        &self,
        label: impl Into<String>,
        action: UnitOfWork,
    ) -> StoreResult<()> {
        if self.is_owner_thread() {
            return action();
        }
        let (done_tx, done_rx) = oneshot::channel();
        self.push(Job {
            priority: Priority::Immediate,
            seq: 0,
            label: label.into(),
            action,
            done: Some(done_tx),
        });
        done_rx.blocking_recv().unwrap_or(Err(StoreError::SchedulerDown))
    }

    fn push(&self, mut job: Job) {
        let mut queue = self.inner.queue.lock().unwrap_or_else(|e| e.into_inner());
        job.seq = queue.next_seq;
        queue.next_seq += 1;
        queue.heap.push(job);
        self.inner.available.notify_one();
    }
}

impl Drop for OwnerScheduler {
    fn drop(&mut self) {
        self.inner.running.store(false, AtomicOrdering::SeqCst);
        self.inner.available.notify_all();
        let handle = self.handle.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            // The last store handle can die inside a drained job, on the
            // owner thread itself; a self-join would panic.
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

fn run_loop(inner: &Arc<SchedulerInner>) {
    loop {
        let job = {
            let mut queue = inner.queue.lock().unwrap_or_else(|e| e.into_inner());
            loop {
                if let Some(job) = queue.heap.pop() {
                    break job;
                }
                if !inner.running.load(AtomicOrdering::SeqCst) {
                    debug!("owner thread draining complete; exiting");
                    return;
                }
                queue = inner
                    .available
                    .wait(queue)
                    .unwrap_or_else(|e| e.into_inner());
            }
        };

        debug!(label = %job.label, priority = ?job.priority, "executing unit of work");
        let result = (job.action)();
        match job.done {
            Some(done) => {
                // Receiver gone means the blocked caller vanished; the work
                // itself already ran exactly once.
                let _ = done.send(result);
            }
            None => {
                if let Err(error) = result {
                    warn!(label = %job.label, %error, "background unit of work failed");
                    let _ = inner.fault_tx.send(BackgroundFault {
                        label: job.label,
                        error,
                    });
                }
            }
        }
    }
}
