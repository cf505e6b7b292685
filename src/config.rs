//! Pool configuration. A plain builder struct, not a file format — there is
//! no wire/config-file surface to this crate (spec.md §6).

use std::sync::Arc;

use crate::passport::Passport;
use crate::worker::Worker;

/// Configuration consumed by [`crate::ThreadPool::new`]. Only needed for
/// the duration of that call.
pub struct ThreadPoolConfig<T> {
    pub(crate) thread_name_prefix: String,
    pub(crate) num_threads: usize,
    /// 0 means unbounded.
    pub(crate) work_num_max: usize,
    pub(crate) thread_start_cb: Option<Arc<dyn Fn(&Worker<T>) + Send + Sync>>,
    pub(crate) thread_end_cb: Option<Arc<dyn Fn(&Worker<T>) + Send + Sync>>,
    pub(crate) callback_arg: Option<Arc<T>>,
    pub(crate) passport: Option<Passport<T>>,
}

impl<T> ThreadPoolConfig<T> {
    /// `thread_name_prefix` longer than 6 visible characters is truncated
    /// (see [`crate::worker::make_thread_name`]). `num_threads` must be
    /// positive; this is enforced by `ThreadPool::new`, not here, so that
    /// invalid configuration is reported uniformly as `PoolError`.
    pub fn new(thread_name_prefix: impl Into<String>, num_threads: usize) -> Self {
        Self {
            thread_name_prefix: thread_name_prefix.into(),
            num_threads,
            work_num_max: 0,
            thread_start_cb: None,
            thread_end_cb: None,
            callback_arg: None,
            passport: None,
        }
    }

    /// Bound the job queue. 0 (the default) means unlimited.
    pub fn with_work_num_max(mut self, work_num_max: usize) -> Self {
        self.work_num_max = work_num_max;
        self
    }

    /// Called once by each worker immediately after it starts, before it
    /// pulls its first job.
    pub fn with_start_callback(
        mut self,
        cb: impl Fn(&Worker<T>) + Send + Sync + 'static,
    ) -> Self {
        self.thread_start_cb = Some(Arc::new(cb));
        self
    }

    /// Called once by each worker immediately before it exits.
    pub fn with_end_callback(mut self, cb: impl Fn(&Worker<T>) + Send + Sync + 'static) -> Self {
        self.thread_end_cb = Some(Arc::new(cb));
        self
    }

    /// A datum shared across every worker. Its lifetime is governed by this
    /// `Arc`'s own strong count; `T::drop` is the destructor from spec.md
    /// §4.5.
    pub fn with_callback_arg(mut self, arg: Arc<T>) -> Self {
        self.callback_arg = Some(arg);
        self
    }

    /// Supply a user-owned passport. It survives `destroy`, so a caller
    /// that raced with `destroy` can still observe the pool's final state
    /// instead of nothing.
    pub fn with_passport(mut self, passport: Passport<T>) -> Self {
        self.passport = Some(passport);
        self
    }
}
