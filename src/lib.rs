//! A lifecycle-safe worker thread pool.
//!
//! A fixed set of worker threads consumes tasks from a bounded FIFO queue.
//! The pool's lifecycle — bound, alive, quiescing, shut down, being
//! destroyed, destroyed — is tracked by a monotonic state machine carried on
//! a [`Passport`], so a caller racing with [`ThreadPool::destroy`] observes
//! a clean failure instead of touching freed state.
//!
//! ```
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//! use thpool::{ThreadPool, ThreadPoolConfig};
//!
//! let pool: ThreadPool<()> = ThreadPool::new(ThreadPoolConfig::new("demo", 4)).unwrap();
//!
//! let counter = Arc::new(AtomicUsize::new(0));
//! for _ in 0..40 {
//!     let counter = Arc::clone(&counter);
//!     pool.add_work(move |_worker| {
//!         counter.fetch_add(1, Ordering::Relaxed);
//!     })
//!     .unwrap();
//! }
//!
//! pool.wait().unwrap();
//! assert_eq!(counter.load(Ordering::Relaxed), 40);
//!
//! pool.shutdown().unwrap();
//! pool.destroy().unwrap();
//! ```
//!
//! Three subsystems do the hard work, each with its own module here:
//! the lifecycle state machine ([`passport`]), the bounded job queue with
//! dual back-pressure ([`queue`], [`sync`]), and the per-worker context plus
//! shared-callback-argument refcounting ([`worker`]).
//!
//! Deliberately out of scope: task prioritisation, cancelling an individual
//! already-queued task, work stealing, dynamic resizing of the worker set,
//! persistence, and distribution across processes.

mod config;
mod error;
mod passport;
mod pool;
mod queue;
mod sync;
mod worker;

pub use config::ThreadPoolConfig;
pub use error::PoolError;
pub use passport::{LifecycleState, Passport};
pub use pool::{
    add_work_via_passport, num_threads_working_via_passport, reactivate_via_passport,
    shutdown_via_passport, wait_via_passport, ThreadPool,
};
pub use queue::Job;
pub use worker::Worker;
