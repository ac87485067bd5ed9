//! Cross-thread work queue feeding the scripting thread
//!
//! Any thread may push; only the scripting thread drains. A drain takes the
//! whole backlog under one lock acquisition. Each push wakes the consumer at
//! least once: the wake signal is rearmed at the start of every drain, so a
//! push that races with a drain either lands in it or triggers a new wake.

use crate::config::QueueConfig;
use flume::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Duration;
use tracing::{debug, trace};

/// Consumer-side wake source (a run-loop source in a host application)
pub trait WakeTarget: Send + Sync {
    fn wake(&self);
}

/// Multi-producer, single-consumer message queue
pub struct ConcurrentQueue<M> {
    messages: Mutex<VecDeque<M>>,
    target: Mutex<Option<Arc<dyn WakeTarget>>>,
    armed: AtomicBool,
    terminated: AtomicBool,
    coalescing: bool,
}

impl<M: Send> ConcurrentQueue<M> {
    pub fn new() -> Self {
        Self::with_coalescing(true)
    }

    /// `coalescing = false` wakes on every push instead of once per drain
    pub fn with_coalescing(coalescing: bool) -> Self {
        Self {
            messages: Mutex::new(VecDeque::new()),
            target: Mutex::new(None),
            armed: AtomicBool::new(true),
            terminated: AtomicBool::new(false),
            coalescing,
        }
    }

    pub fn from_config(config: &QueueConfig) -> Self {
        Self::with_coalescing(config.wake_coalescing)
    }

    /// Attach the consumer's wake source
    pub fn initialize(&self, target: Arc<dyn WakeTarget>) {
        *self.target.lock() = Some(target);
        self.armed.store(true, Ordering::Release);
        debug!(event = "queue_initialized", coalescing = self.coalescing, "queue ready");
    }

    /// Enqueue a message; `false` once the queue is terminated
    pub fn push(&self, message: M) -> bool {
        if self.terminated.load(Ordering::Acquire) {
            trace!(event = "queue_push_dropped", "push after terminate");
            return false;
        }
        {
            let mut messages = self.messages.lock();
            messages.push_back(message);
        }

        if !self.coalescing || self.armed.swap(false, Ordering::AcqRel) {
            self.signal();
        }
        true
    }

    /// Take every queued message in push order
    pub fn pop_all(&self) -> Vec<M> {
        // Rearm first so pushes after the swap below wake again
        self.armed.store(true, Ordering::Release);
        let drained: Vec<M> = std::mem::take(&mut *self.messages.lock()).into();
        if !drained.is_empty() {
            trace!(event = "queue_drained", count = drained.len(), "drained");
        }
        drained
    }

    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    /// Stop wake delivery, then discard pending messages
    pub fn terminate(&self) {
        self.terminated.store(true, Ordering::Release);
        let target = self.target.lock().take();
        drop(target);
        let discarded = std::mem::take(&mut *self.messages.lock());
        debug!(event = "queue_terminated", discarded = discarded.len(), "queue terminated");
    }

    fn signal(&self) {
        // Clone out so the wake runs without holding the lock
        let target = self.target.lock().clone();
        if let Some(target) = target {
            target.wake();
        }
    }
}

impl<M: Send> Default for ConcurrentQueue<M> {
    fn default() -> Self {
        Self::new()
    }
}

/// Wake source backed by a one-slot channel; pending wakes coalesce
#[derive(Clone)]
pub struct ChannelWaker {
    tx: Sender<()>,
}

/// Consumer end of a `ChannelWaker`
pub struct WakeReceiver {
    rx: Receiver<()>,
}

impl ChannelWaker {
    pub fn new() -> (Arc<Self>, WakeReceiver) {
        let (tx, rx) = flume::bounded(1);
        (Arc::new(Self { tx }), WakeReceiver { rx })
    }
}

impl WakeTarget for ChannelWaker {
    fn wake(&self) {
        match self.tx.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => {}
            Err(TrySendError::Disconnected(())) => {
                trace!(event = "wake_dropped", "consumer is gone");
            }
        }
    }
}

impl WakeReceiver {
    /// Block until woken; `false` if every waker is gone
    pub fn wait(&self) -> bool {
        self.rx.recv().is_ok()
    }

    /// `true` if woken within `timeout`
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.rx.recv_timeout(timeout).is_ok()
    }

    /// Consume a pending wake without blocking
    pub fn try_wait(&self) -> bool {
        self.rx.try_recv().is_ok()
    }
}

type Task = Box<dyn FnOnce() + Send>;

/// Runs closures on the thread that owns the scripting runtime
pub struct MainThreadDispatcher {
    owner: ThreadId,
    queue: ConcurrentQueue<Task>,
}

impl MainThreadDispatcher {
    /// Dispatcher owned by the calling thread
    pub fn new(target: Arc<dyn WakeTarget>) -> Self {
        let queue = ConcurrentQueue::new();
        queue.initialize(target);
        Self {
            owner: thread::current().id(),
            queue,
        }
    }

    pub fn is_owner_thread(&self) -> bool {
        thread::current().id() == self.owner
    }

    /// Run now on the owner thread, otherwise queue for `run_pending`
    pub fn execute<F>(&self, task: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_owner_thread() {
            task();
            true
        } else {
            self.queue.push(Box::new(task))
        }
    }

    /// Run every queued task in order; returns how many ran
    pub fn run_pending(&self) -> usize {
        let tasks = self.queue.pop_all();
        let count = tasks.len();
        for task in tasks {
            task();
        }
        count
    }

    pub fn terminate(&self) {
        self.queue.terminate();
    }
}
