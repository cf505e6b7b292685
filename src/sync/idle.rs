//! The "all-idle" mutex/condvar pair used by `wait` and the worker loop's
//! idle signal.
//!
//! Kept as its own small type, in the spirit of the teacher's
//! `sync::simple_latch`/`sync::count_down_latch` modules: a condvar wrapped
//! around a mutex that protects nothing but the condvar's own wakeup,
//! leaving the actual predicate (queue length, `num_threads_working`) to be
//! checked under the separate queue mutex. Lock order is always
//! `all-idle -> queue`, never the reverse.
use std::sync::{Condvar, Mutex};

pub(crate) struct IdleGate {
    pub(crate) mutex: Mutex<()>,
    pub(crate) condvar: Condvar,
}

impl IdleGate {
    pub(crate) fn new() -> Self {
        Self {
            mutex: Mutex::new(()),
            condvar: Condvar::new(),
        }
    }
}
