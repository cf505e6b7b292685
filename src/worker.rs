//! Worker threads: naming, the per-worker context slot, the re-entrancy
//! guard, and the worker loop itself.

use std::any::Any;
use std::cell::Cell;
use std::sync::Arc;

use atomic_refcell::AtomicRefCell;
use log::{debug, trace};

use crate::sync::SyncState;

std::thread_local! {
    /// Identifies the pool owning the worker running on this thread, if
    /// any. Installed at worker start, read by `wait`/`shutdown`/`destroy`
    /// to refuse a re-entrant call from within a worker of the same pool
    /// (such a call would deadlock against itself).
    static CURRENT_POOL_ID: Cell<Option<u64>> = const { Cell::new(None) };
}

pub(crate) fn is_worker_of(pool_id: u64) -> bool {
    CURRENT_POOL_ID.with(|cell| cell.get() == Some(pool_id))
}

fn set_current_pool_id(pool_id: u64) {
    CURRENT_POOL_ID.with(|cell| cell.set(Some(pool_id)));
}

/// Build the worker's OS thread name: `"<prefix>-<hex id>"`, truncated to
/// 15 visible characters (16 bytes including the implementation's NUL
/// terminator is the common OS limit; `std::thread::Builder::name` is the
/// portable substitute for the original's per-platform `prctl`/
/// `pthread_setname_np` ladder, which is out of scope here).
pub(crate) fn make_thread_name(prefix: &str, id: usize) -> String {
    let prefix: String = prefix.chars().take(6).collect();
    let mut name = format!("{prefix}-{id:x}");
    name.truncate(15);
    name
}

/// The handle passed to every task and to the start/end callbacks.
///
/// Exclusively owned by the worker thread it runs on; never shared across
/// threads. The context slot and callback-argument slot use
/// [`atomic_refcell::AtomicRefCell`] rather than a plain `Cell`/`RefCell`
/// because they are reached through a shared `&Worker<T>` from inside
/// arbitrary user closures — `AtomicRefCell` turns a reentrant double-borrow
/// into a panic instead of silent unsoundness, the same trade the teacher
/// makes for its per-thread task slot in `pools/bounded.rs`.
pub struct Worker<T> {
    id: usize,
    name: String,
    context: AtomicRefCell<Option<Box<dyn Any + Send>>>,
    callback_arg: AtomicRefCell<Option<Arc<T>>>,
}

impl<T> Worker<T> {
    fn new(id: usize, name: String, callback_arg: Option<Arc<T>>) -> Self {
        Self {
            id,
            name,
            context: AtomicRefCell::new(None),
            callback_arg: AtomicRefCell::new(callback_arg),
        }
    }

    /// This worker's id in `0..num_threads`.
    pub fn id(&self) -> usize {
        self.id
    }

    /// This worker's OS thread name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Store a value in this worker's context slot, typically from the
    /// start callback.
    pub fn set_context<C: Send + 'static>(&self, value: C) {
        *self.context.borrow_mut() = Some(Box::new(value));
    }

    /// Clear the context slot, typically from the end callback.
    pub fn clear_context(&self) {
        *self.context.borrow_mut() = None;
    }

    /// Run `f` with the context slot downcast to `C`, or `None` if the slot
    /// is empty or holds a different type.
    pub fn with_context<C: 'static, R>(&self, f: impl FnOnce(Option<&C>) -> R) -> R {
        let guard = self.context.borrow();
        f(guard.as_ref().and_then(|b| b.downcast_ref::<C>()))
    }

    /// The shared callback argument, if one was configured and this worker
    /// has not already released it.
    pub fn callback_arg(&self) -> Option<Arc<T>> {
        self.callback_arg.borrow().clone()
    }

    /// Release this worker's reference to the shared callback argument
    /// early. Idempotent: a second call is a no-op because the slot is
    /// already empty.
    pub fn release_callback_arg(&self) {
        self.callback_arg.borrow_mut().take();
    }
}

pub(crate) struct WorkerCallbacks<T> {
    pub(crate) start: Option<Arc<dyn Fn(&Worker<T>) + Send + Sync>>,
    pub(crate) end: Option<Arc<dyn Fn(&Worker<T>) + Send + Sync>>,
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn spawn_worker<T>(
    id: usize,
    name: String,
    pool_id: u64,
    sync: Arc<SyncState<T>>,
    callback_arg: Option<Arc<T>>,
    callbacks: WorkerCallbacks<T>,
) -> std::io::Result<std::thread::JoinHandle<()>>
where
    T: Send + Sync + 'static,
{
    std::thread::Builder::new()
        .name(name.clone())
        .spawn(move || run_worker_loop(id, name, pool_id, sync, callback_arg, callbacks))
}

fn run_worker_loop<T>(
    id: usize,
    name: String,
    pool_id: u64,
    sync: Arc<SyncState<T>>,
    callback_arg: Option<Arc<T>>,
    callbacks: WorkerCallbacks<T>,
) {
    set_current_pool_id(pool_id);
    // `num_threads_alive` is incremented before the start callback runs, so
    // `ThreadPool::new` can return while start callbacks are still
    // in-flight (spec.md §9, Open Question 1).
    sync.incr_alive();
    trace!("worker {name} (id {id}) starting");

    let worker = Worker::new(id, name, callback_arg);
    if let Some(start) = &callbacks.start {
        start(&worker);
    }

    loop {
        let job = match sync.get_job() {
            Some(job) => job,
            None => break,
        };
        sync.start_task();
        job(&worker);
        sync.finish_task();
    }

    if let Some(end) = &callbacks.end {
        end(&worker);
    }
    debug!("worker {} (id {}) exiting", worker.name(), worker.id());
    sync.decr_alive();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_name_truncates_prefix_and_total_length() {
        let name = make_thread_name("toolongprefix", 0);
        assert!(name.len() <= 15);
        assert!(name.starts_with("toolon-"));
    }

    #[test]
    fn context_slot_roundtrips() {
        let w: Worker<()> = Worker::new(0, "w".into(), None);
        w.set_context(42u32);
        w.with_context::<u32, _>(|v| assert_eq!(v, Some(&42)));
        w.clear_context();
        w.with_context::<u32, _>(|v| assert_eq!(v, None));
    }

    #[test]
    fn release_callback_arg_is_idempotent() {
        let arg = Arc::new(5u32);
        let w: Worker<u32> = Worker::new(0, "w".into(), Some(Arc::clone(&arg)));
        assert!(w.callback_arg().is_some());
        w.release_callback_arg();
        assert!(w.callback_arg().is_none());
        w.release_callback_arg();
        assert!(w.callback_arg().is_none());
    }

    #[test]
    fn not_a_worker_thread_by_default() {
        assert!(!is_worker_of(1));
    }
}
