//! Producer/consumer synchronization over the bounded job queue, plus the
//! quiesce/reactivate idle-wait machinery.
//!
//! This is the piece the spec calls "dual back-pressure": producers block
//! when the queue is full *or* the pool is quiescent, consumers block when
//! the queue is empty *or* the pool is quiescent, and both sides wake on
//! `notify_all` (never `notify_one`) at every boundary transition — see the
//! module doc rationale replicated from spec.md §4.3/§9: a `notify_one` can
//! be consumed by a thread that loses the subsequent lock race and does not
//! proceed, starving the thread actually meant to wake. Broadcasting is
//! safe here because every predicate is rechecked under the lock
//! (`Condvar::wait_while`).

mod idle;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};

use crate::error::PoolError;
use crate::queue::{Job, JobQueue};
use idle::IdleGate;

struct QueueState<T> {
    queue: JobQueue<T>,
    /// Cleared by `wait` on success, set by `reactivate`. Producers and
    /// consumers both block while this is false.
    active: bool,
}

pub(crate) struct SyncState<T> {
    queue: Mutex<QueueState<T>>,
    not_full: Condvar,
    not_empty: Condvar,
    idle: IdleGate,
    /// True from construction until `shutdown`. Read outside the lock to
    /// short-circuit the wait predicates; always rechecked under the lock
    /// before acting on it.
    keepalive: AtomicBool,
    num_threads_working: AtomicUsize,
    num_threads_alive: AtomicUsize,
}

impl<T> SyncState<T> {
    pub(crate) fn new(max_len: usize) -> Self {
        Self {
            queue: Mutex::new(QueueState {
                queue: JobQueue::new(max_len),
                active: true,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            idle: IdleGate::new(),
            keepalive: AtomicBool::new(true),
            num_threads_working: AtomicUsize::new(0),
            num_threads_alive: AtomicUsize::new(0),
        }
    }

    pub(crate) fn is_keepalive(&self) -> bool {
        self.keepalive.load(Ordering::Acquire)
    }

    /// Push a job, blocking while the queue is full or the pool is
    /// quiesced. Returns `Cancelled` if the pool starts shutting down while
    /// blocked (or is already shutting down).
    pub(crate) fn put_job(&self, job: Job<T>) -> Result<(), PoolError> {
        let mut guard = self
            .not_full
            .wait_while(self.queue.lock().unwrap(), |s| {
                self.keepalive.load(Ordering::Acquire) && (!s.active || s.queue.is_full())
            })
            .unwrap();
        if !self.keepalive.load(Ordering::Acquire) {
            return Err(PoolError::Cancelled);
        }
        let was_empty = guard.queue.len() == 0;
        guard.queue.push(job);
        drop(guard);
        if was_empty {
            self.not_empty.notify_all();
        }
        Ok(())
    }

    /// Pull a job, blocking while the queue is empty or the pool is
    /// quiesced. Returns `None` if the pool is shutting down (the worker
    /// loop treats this as "exit").
    pub(crate) fn get_job(&self) -> Option<Job<T>> {
        let mut guard = self
            .not_empty
            .wait_while(self.queue.lock().unwrap(), |s| {
                self.keepalive.load(Ordering::Acquire) && (s.queue.len() == 0 || !s.active)
            })
            .unwrap();
        if !self.keepalive.load(Ordering::Acquire) {
            return None;
        }
        let max_len = guard.queue.max_len();
        let was_at_capacity = max_len > 0 && guard.queue.len() >= max_len;
        let job = guard.queue.pop_front();
        drop(guard);
        if was_at_capacity {
            self.not_full.notify_all();
        }
        job
    }

    /// Block until the queue is empty and no worker is running a task, then
    /// mark the pool quiesced (`active = false`) so subsequent `add_work`
    /// calls block until `reactivate`.
    ///
    /// Lock order: all-idle mutex first, queue mutex nested inside it, per
    /// §5's locking discipline.
    pub(crate) fn wait_until_idle(&self) {
        let mut idle_guard = self.idle.mutex.lock().unwrap();
        loop {
            let mut q = self.queue.lock().unwrap();
            if q.queue.len() != 0 || self.num_threads_working.load(Ordering::Acquire) != 0 {
                drop(q);
                idle_guard = self.idle.condvar.wait(idle_guard).unwrap();
                continue;
            }
            q.active = false;
            break;
        }
    }

    pub(crate) fn reactivate(&self) {
        {
            let mut guard = self.queue.lock().unwrap();
            guard.active = true;
        }
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }

    /// Clear `keepalive` and `active`, then wake every blocked producer and
    /// consumer so they observe the shutdown and return `Cancelled`/`None`.
    pub(crate) fn begin_shutdown(&self) {
        self.keepalive.store(false, Ordering::Release);
        {
            let mut guard = self.queue.lock().unwrap();
            guard.active = false;
        }
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }

    pub(crate) fn clear_queue(&self) {
        self.queue.lock().unwrap().queue.clear();
    }

    pub(crate) fn queue_len(&self) -> usize {
        self.queue.lock().unwrap().queue.len()
    }

    pub(crate) fn incr_alive(&self) {
        self.num_threads_alive.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn decr_alive(&self) {
        self.num_threads_alive.fetch_sub(1, Ordering::AcqRel);
    }

    pub(crate) fn num_threads_alive(&self) -> usize {
        self.num_threads_alive.load(Ordering::Acquire)
    }

    pub(crate) fn num_threads_working(&self) -> usize {
        self.num_threads_working.load(Ordering::Acquire)
    }

    pub(crate) fn start_task(&self) {
        self.num_threads_working.fetch_add(1, Ordering::AcqRel);
    }

    /// Decrement the working count; if it just reached zero, broadcast the
    /// idle condvar (a `wait_until_idle` caller is guaranteed to observe
    /// this, even if it samples the counter a moment before the broadcast —
    /// see spec.md §9, Open Question 2).
    pub(crate) fn finish_task(&self) {
        let previous = self.num_threads_working.fetch_sub(1, Ordering::AcqRel);
        if previous == 1 {
            let _guard = self.idle.mutex.lock().unwrap();
            self.idle.condvar.notify_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn put_then_get_preserves_fifo_order() {
        let sync: SyncState<()> = SyncState::new(0);
        for i in 0..5u32 {
            sync.put_job(Box::new(move |_| { let _ = i; })).unwrap();
        }
        assert_eq!(sync.queue_len(), 5);
    }

    #[test]
    fn get_job_blocks_until_pushed() {
        let sync = Arc::new(SyncState::<()>::new(0));
        let sync2 = Arc::clone(&sync);
        let handle = thread::spawn(move || sync2.get_job().is_some());
        thread::sleep(Duration::from_millis(50));
        sync.put_job(Box::new(|_| {})).unwrap();
        assert!(handle.join().unwrap());
    }

    #[test]
    fn put_job_blocks_when_full() {
        let sync = Arc::new(SyncState::<()>::new(1));
        sync.put_job(Box::new(|_| {})).unwrap();
        let sync2 = Arc::clone(&sync);
        let done = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let done2 = Arc::clone(&done);
        let handle = thread::spawn(move || {
            sync2.put_job(Box::new(|_| {})).unwrap();
            done2.store(true, Ordering::Release);
        });
        thread::sleep(Duration::from_millis(50));
        assert!(!done.load(Ordering::Acquire));
        sync.get_job();
        handle.join().unwrap();
        assert!(done.load(Ordering::Acquire));
    }

    #[test]
    fn shutdown_cancels_blocked_producer_and_consumer() {
        let sync = Arc::new(SyncState::<()>::new(1));
        sync.put_job(Box::new(|_| {})).unwrap();
        let producer_sync = Arc::clone(&sync);
        let producer = thread::spawn(move || producer_sync.put_job(Box::new(|_| {})));
        thread::sleep(Duration::from_millis(50));
        sync.begin_shutdown();
        assert!(matches!(producer.join().unwrap(), Err(PoolError::Cancelled)));
    }

    #[test]
    fn wait_until_idle_returns_once_queue_drains() {
        let sync = Arc::new(SyncState::<()>::new(0));
        sync.start_task();
        let sync2 = Arc::clone(&sync);
        let handle = thread::spawn(move || sync2.wait_until_idle());
        thread::sleep(Duration::from_millis(50));
        sync.finish_task();
        handle.join().unwrap();
    }
}
