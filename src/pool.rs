//! The pool itself: `init`/`add_work`/`wait`/`reactivate`/`shutdown`/
//! `destroy`, and the passport-mediated free functions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use log::{debug, error, info, warn};
use once_cell::sync::Lazy;

use crate::config::ThreadPoolConfig;
use crate::error::PoolError;
use crate::passport::{LifecycleState, Passport};
use crate::queue::Job;
use crate::sync::SyncState;
use crate::worker::{self, Worker, WorkerCallbacks};

/// Process-wide pool id counter, so a passport's `bound_pool_id` is never
/// ambiguous between two pools that happen to exist at the same address at
/// different times.
static NEXT_POOL_ID: Lazy<AtomicU64> = Lazy::new(|| AtomicU64::new(1));

const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(1);

pub(crate) struct PoolShared<T> {
    id: u64,
    sync: Arc<SyncState<T>>,
    passport: Passport<T>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

/// A lifecycle-safe worker thread pool.
///
/// Not `Clone`: there is exactly one owning handle, and `destroy` consumes
/// it. A [`Passport`] gives a second, weaker kind of handle that survives
/// `destroy` for diagnostic purposes (see spec.md §3, §9).
pub struct ThreadPool<T> {
    shared: Arc<PoolShared<T>>,
}

impl<T: Send + Sync + 'static> ThreadPool<T> {
    /// Validate `config`, bind (or adopt) a passport, spawn the worker set,
    /// and block until every spawned worker reports alive.
    ///
    /// As long as at least one worker spawns successfully the pool is
    /// considered initialised (the spawn failures are logged); if every
    /// worker fails to spawn, the bind is rolled back and an error is
    /// returned.
    pub fn new(mut config: ThreadPoolConfig<T>) -> Result<Self, PoolError> {
        if config.num_threads == 0 {
            return Err(PoolError::InvalidArgument(
                "num_threads must be positive".into(),
            ));
        }

        let passport = config.passport.take().unwrap_or_default();
        let id = NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed);
        let sync = Arc::new(SyncState::new(config.work_num_max));

        let shared = Arc::new(PoolShared {
            id,
            sync: Arc::clone(&sync),
            passport: passport.clone(),
            handles: Mutex::new(Vec::new()),
        });

        // UNBIND -> ALIVE; fails if this passport is already bound elsewhere.
        passport.bind(id, Arc::downgrade(&shared))?;

        let mut handles = Vec::with_capacity(config.num_threads);
        let mut spawned = 0usize;
        for worker_id in 0..config.num_threads {
            let name = worker::make_thread_name(&config.thread_name_prefix, worker_id);
            // one Arc<T> clone earmarked for this worker; dropped unstarted
            // if the spawn itself fails (spec.md §4.1 step 6).
            let callback_arg = config.callback_arg.clone();
            let callbacks = WorkerCallbacks {
                start: config.thread_start_cb.clone(),
                end: config.thread_end_cb.clone(),
            };
            match worker::spawn_worker(worker_id, name, id, Arc::clone(&sync), callback_arg, callbacks) {
                Ok(handle) => {
                    handles.push(handle);
                    spawned += 1;
                }
                Err(e) => warn!("pool {id}: worker {worker_id} failed to spawn: {e}"),
            }
        }
        // init's own Arc<T> clone is dropped here, once every spawn attempt
        // has concluded (spec.md §4.1 step 7).
        drop(config.callback_arg.take());

        if spawned == 0 {
            passport.rollback_bind();
            return Err(PoolError::InvalidArgument(
                "no worker threads could be spawned".into(),
            ));
        }
        if spawned < config.num_threads {
            warn!("pool {id}: only {spawned}/{} workers spawned", config.num_threads);
        }

        *shared.handles.lock().unwrap() = handles;

        while shared.sync.num_threads_alive() < spawned {
            std::thread::sleep(SHUTDOWN_POLL_INTERVAL);
        }

        info!("pool {id} initialised with {spawned} worker(s)");
        Ok(Self { shared })
    }

    /// Submit a task. Blocks while the queue is full or the pool is
    /// quiesced; fails with `Cancelled` if `shutdown` starts while blocked.
    pub fn add_work(&self, job: impl FnOnce(&Worker<T>) + Send + 'static) -> Result<(), PoolError> {
        add_work_impl(&self.shared, Box::new(job))
    }

    /// Block until the queue is empty and no worker is running a task, then
    /// quiesce the pool (subsequent `add_work` blocks until `reactivate`).
    pub fn wait(&self) -> Result<(), PoolError> {
        refuse_reentrant(self.shared.id, "wait")?;
        wait_impl(&self.shared)
    }

    /// Un-quiesce the pool after `wait`.
    pub fn reactivate(&self) -> Result<(), PoolError> {
        reactivate_impl(&self.shared)
    }

    /// Number of workers currently executing a task.
    pub fn num_threads_working(&self) -> Result<usize, PoolError> {
        num_threads_working_impl(&self.shared)
    }

    /// Stop accepting new work and wake every blocked caller; blocks until
    /// every worker has exited and every in-flight public call has
    /// returned.
    pub fn shutdown(&self) -> Result<(), PoolError> {
        refuse_reentrant(self.shared.id, "shutdown")?;
        shutdown_impl(&self.shared)
    }

    /// Release all resources. Consumes the handle: there is no use for a
    /// `ThreadPool` after this returns. If called on a still-`ALIVE` pool,
    /// performs an internal `shutdown` first (and logs a warning, per
    /// spec.md §8's boundary behaviour).
    pub fn destroy(self) -> Result<(), PoolError> {
        refuse_reentrant(self.shared.id, "destroy")?;
        let shared = Arc::clone(&self.shared);

        loop {
            match shared.passport.state() {
                LifecycleState::Alive => {
                    warn!(
                        "pool {}: destroy called while ALIVE; shutting down first",
                        shared.id
                    );
                    shutdown_impl(&shared)?;
                    break;
                }
                LifecycleState::ShuttingDown => {
                    std::thread::sleep(SHUTDOWN_POLL_INTERVAL);
                }
                LifecycleState::Shutdown => break,
                other => {
                    return Err(PoolError::InvalidArgument(format!(
                        "cannot destroy pool in state {other}"
                    )))
                }
            }
        }

        shared
            .passport
            .transition(LifecycleState::Shutdown, LifecycleState::Destroying)
            .expect("invariant violation: pool left SHUTDOWN state unexpectedly");

        let handles: Vec<_> = shared.handles.lock().unwrap().drain(..).collect();
        for handle in handles {
            let _ = handle.join();
        }

        shared
            .passport
            .transition(LifecycleState::Destroying, LifecycleState::Destroyed)
            .expect("invariant violation: pool left DESTROYING state unexpectedly");

        info!("pool {} destroyed", shared.id);
        Ok(())
    }
}

/// Falling out of scope without calling `destroy` must not leak the worker
/// threads: shut down and join them here, the same way
/// `ParallelismBoundedThreadPool::drop` delegates to `join_internal` instead
/// of requiring its own `join(self)` to have been called. A pool that was
/// already destroyed (or shut down, or never reached ALIVE) is a no-op.
impl<T> Drop for ThreadPool<T> {
    fn drop(&mut self) {
        if worker::is_worker_of(self.shared.id) {
            error!(
                "pool {}: dropped from within one of its own workers; skipping shutdown/join to avoid self-deadlock",
                self.shared.id
            );
            return;
        }

        let shared = Arc::clone(&self.shared);
        loop {
            match shared.passport.state() {
                LifecycleState::Alive => {
                    if let Err(e) = shutdown_impl(&shared) {
                        error!("pool {}: shutdown during drop failed: {e}", shared.id);
                        return;
                    }
                    break;
                }
                LifecycleState::ShuttingDown => std::thread::sleep(SHUTDOWN_POLL_INTERVAL),
                LifecycleState::Shutdown => break,
                LifecycleState::Unbind | LifecycleState::Destroying | LifecycleState::Destroyed => {
                    return;
                }
            }
        }

        let handles: Vec<_> = shared.handles.lock().unwrap().drain(..).collect();
        for handle in handles {
            let _ = handle.join();
        }

        // `destroy` may have already raced us to DESTROYING via a concurrent
        // passport-mediated call; only finish the transition if we actually
        // own it.
        if shared
            .passport
            .transition(LifecycleState::Shutdown, LifecycleState::Destroying)
            .is_ok()
        {
            shared
                .passport
                .transition(LifecycleState::Destroying, LifecycleState::Destroyed)
                .expect("invariant violation: pool left DESTROYING state unexpectedly");
            info!("pool {} destroyed via drop", shared.id);
        }
    }
}

fn refuse_reentrant(pool_id: u64, op: &str) -> Result<(), PoolError> {
    if worker::is_worker_of(pool_id) {
        return Err(PoolError::InvalidArgument(format!(
            "{op} called re-entrantly from a worker of this pool"
        )));
    }
    Ok(())
}

fn add_work_impl<T>(shared: &Arc<PoolShared<T>>, job: Job<T>) -> Result<(), PoolError> {
    shared.passport.enter()?;
    let result = shared.sync.put_job(job);
    shared.passport.leave();
    result
}

fn wait_impl<T>(shared: &Arc<PoolShared<T>>) -> Result<(), PoolError> {
    shared.passport.enter()?;
    shared.sync.wait_until_idle();
    shared.passport.leave();
    Ok(())
}

fn reactivate_impl<T>(shared: &Arc<PoolShared<T>>) -> Result<(), PoolError> {
    shared.passport.enter()?;
    shared.sync.reactivate();
    shared.passport.leave();
    Ok(())
}

fn num_threads_working_impl<T>(shared: &Arc<PoolShared<T>>) -> Result<usize, PoolError> {
    shared.passport.enter()?;
    let n = shared.sync.num_threads_working();
    shared.passport.leave();
    Ok(n)
}

fn shutdown_impl<T>(shared: &Arc<PoolShared<T>>) -> Result<(), PoolError> {
    shared
        .passport
        .transition(LifecycleState::Alive, LifecycleState::ShuttingDown)?;
    shared.sync.begin_shutdown();
    while shared.sync.num_threads_alive() > 0 {
        std::thread::sleep(SHUTDOWN_POLL_INTERVAL);
    }
    while shared.passport.inflight() > 0 {
        std::thread::sleep(SHUTDOWN_POLL_INTERVAL);
    }
    shared.sync.clear_queue();
    shared
        .passport
        .transition(LifecycleState::ShuttingDown, LifecycleState::Shutdown)
        .expect("invariant violation: pool left SHUTTING_DOWN state unexpectedly");
    debug!("pool {} shut down", shared.id);
    Ok(())
}

/// Submit a task via a passport rather than a live `ThreadPool` handle.
/// Fails with `InvalidArgument` if the passport's pool is not `ALIVE` —
/// including after the pool has been destroyed, which this can observe
/// without touching freed memory (spec.md §3, scenario S6).
pub fn add_work_via_passport<T: Send + Sync + 'static>(
    passport: &Passport<T>,
    job: impl FnOnce(&Worker<T>) + Send + 'static,
) -> Result<(), PoolError> {
    let shared = enter_and_upgrade(passport)?;
    let result = shared.sync.put_job(Box::new(job));
    passport.leave();
    result
}

pub fn wait_via_passport<T: Send + Sync + 'static>(passport: &Passport<T>) -> Result<(), PoolError> {
    let shared = enter_and_upgrade(passport)?;
    if let Err(e) = refuse_reentrant(shared.id, "wait") {
        passport.leave();
        return Err(e);
    }
    shared.sync.wait_until_idle();
    passport.leave();
    Ok(())
}

pub fn reactivate_via_passport<T: Send + Sync + 'static>(
    passport: &Passport<T>,
) -> Result<(), PoolError> {
    let shared = enter_and_upgrade(passport)?;
    shared.sync.reactivate();
    passport.leave();
    Ok(())
}

pub fn shutdown_via_passport<T: Send + Sync + 'static>(passport: &Passport<T>) -> Result<(), PoolError> {
    let shared = upgrade_or_gone(passport)?;
    refuse_reentrant(shared.id, "shutdown")?;
    shutdown_impl(&shared)
}

pub fn num_threads_working_via_passport<T: Send + Sync + 'static>(
    passport: &Passport<T>,
) -> Result<usize, PoolError> {
    let shared = enter_and_upgrade(passport)?;
    let n = shared.sync.num_threads_working();
    passport.leave();
    Ok(n)
}

/// `passport.enter()` followed by `upgrade_or_gone`, with `leave()` called on
/// every failure path so the in-flight count never leaks when the pool's
/// `Arc` has already gone (e.g. a `ThreadPool` dropped without `destroy`).
/// Callers that receive `Ok` still own the matching `leave()` once done.
fn enter_and_upgrade<T>(passport: &Passport<T>) -> Result<Arc<PoolShared<T>>, PoolError> {
    passport.enter()?;
    match upgrade_or_gone(passport) {
        Ok(shared) => Ok(shared),
        Err(e) => {
            passport.leave();
            Err(e)
        }
    }
}

fn upgrade_or_gone<T>(passport: &Passport<T>) -> Result<Arc<PoolShared<T>>, PoolError> {
    let shared = passport.upgrade().ok_or_else(|| {
        error!("passport bound to pool {} but the pool no longer exists", passport.bound_pool_id());
        PoolError::InvalidArgument("pool no longer exists".into())
    })?;
    assert_eq!(
        shared.id,
        passport.bound_pool_id(),
        "invariant violation: passport's Weak target does not match its stashed pool id"
    );
    Ok(shared)
}
