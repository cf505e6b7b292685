//! The lifecycle state machine and its `Arc`-backed carrier, the passport.
//!
//! A passport may be created implicitly by [`crate::ThreadPool::new`]
//! (library-owned: the pool holds the only strong reference and drops it in
//! `destroy`), or constructed explicitly by a caller and handed to
//! [`crate::ThreadPoolConfig::passport`] (user-owned: the caller's own clone
//! keeps the state block alive after `destroy`, so a racing caller reads
//! `DESTROYED` instead of touching freed memory).

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::error::PoolError;
use crate::pool::PoolShared;

/// Strictly monotonic lifecycle states, per the ordering
/// `Unbind -> Alive -> ShuttingDown -> Shutdown -> Destroying -> Destroyed`.
/// The sole permitted backward transition is `Alive -> Unbind`, taken only
/// when `ThreadPool::new` fails to spawn any worker after a successful bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LifecycleState {
    Unbind = 0,
    Alive = 1,
    ShuttingDown = 2,
    Shutdown = 3,
    Destroying = 4,
    Destroyed = 5,
}

impl LifecycleState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Unbind,
            1 => Self::Alive,
            2 => Self::ShuttingDown,
            3 => Self::Shutdown,
            4 => Self::Destroying,
            5 => Self::Destroyed,
            other => unreachable!("passport observed an impossible state discriminant {other}"),
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unbind => "UNBIND",
            Self::Alive => "ALIVE",
            Self::ShuttingDown => "SHUTTING_DOWN",
            Self::Shutdown => "SHUTDOWN",
            Self::Destroying => "DESTROYING",
            Self::Destroyed => "DESTROYED",
        };
        f.write_str(name)
    }
}

pub(crate) struct PassportInner<T> {
    state: AtomicU8,
    /// Count of in-flight public-entry calls currently admitted through this
    /// passport. `shutdown` polls this to zero before clearing the queue.
    inflight: AtomicUsize,
    /// Id of the pool this passport is bound to, 0 meaning unbound. Ids are
    /// handed out from a process-wide counter in `pool`, so an id is never
    /// reused while any passport still references it.
    bound_pool_id: AtomicU64,
    pool: Mutex<Option<Weak<PoolShared<T>>>>,
}

/// A passport: the authoritative carrier of a pool's lifecycle state.
///
/// Cloning a `Passport` clones the handle, not the state; all clones observe
/// the same underlying state block. This is what lets a passport outlive the
/// pool it was bound to.
pub struct Passport<T> {
    pub(crate) inner: Arc<PassportInner<T>>,
}

impl<T> Clone for Passport<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for Passport<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Passport<T> {
    /// Construct a fresh, unbound passport. Hand it to
    /// [`crate::ThreadPoolConfig::passport`] to obtain a user-owned passport
    /// that survives `destroy`.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(PassportInner {
                state: AtomicU8::new(LifecycleState::Unbind as u8),
                inflight: AtomicUsize::new(0),
                bound_pool_id: AtomicU64::new(0),
                pool: Mutex::new(None),
            }),
        }
    }

    /// The current lifecycle state. Safe to call at any time, including
    /// after the bound pool has been destroyed.
    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    pub(crate) fn bound_pool_id(&self) -> u64 {
        self.inner.bound_pool_id.load(Ordering::Acquire)
    }

    /// Bind this passport to `pool_id`, transitioning `UNBIND -> ALIVE`.
    /// Fails with `InvalidArgument` if the passport is already bound to a
    /// pool (testable property: "a passport can be bound to at most one
    /// pool at a time").
    pub(crate) fn bind(&self, pool_id: u64, pool: Weak<PoolShared<T>>) -> Result<(), PoolError> {
        self.inner
            .state
            .compare_exchange(
                LifecycleState::Unbind as u8,
                LifecycleState::Alive as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map_err(|observed| {
                PoolError::InvalidArgument(format!(
                    "passport is already bound (observed state {})",
                    LifecycleState::from_u8(observed)
                ))
            })?;
        self.inner.bound_pool_id.store(pool_id, Ordering::Release);
        *self.inner.pool.lock().unwrap() = Some(pool);
        Ok(())
    }

    /// Roll back a bind after every worker failed to spawn:
    /// `ALIVE -> UNBIND`. The only backward transition the state machine
    /// permits.
    pub(crate) fn rollback_bind(&self) {
        self.inner
            .state
            .compare_exchange(
                LifecycleState::Alive as u8,
                LifecycleState::Unbind as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .expect("rollback_bind called from a state other than ALIVE");
        self.inner.bound_pool_id.store(0, Ordering::Release);
        *self.inner.pool.lock().unwrap() = None;
    }

    pub(crate) fn transition(&self, from: LifecycleState, to: LifecycleState) -> Result<(), PoolError> {
        self.inner
            .state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|observed| {
                PoolError::InvalidArgument(format!(
                    "cannot transition {from} -> {to}: observed state {}",
                    LifecycleState::from_u8(observed)
                ))
            })
    }

    /// Upgrade the passport's weak pool reference, used by the
    /// passport-mediated free functions in `pool`. Returns `None` if the
    /// pool has already been dropped.
    pub(crate) fn upgrade(&self) -> Option<Arc<PoolShared<T>>> {
        self.inner.pool.lock().unwrap().as_ref()?.upgrade()
    }

    pub(crate) fn enter(&self) -> Result<(), PoolError> {
        self.inner.inflight.fetch_add(1, Ordering::AcqRel);
        if self.state() != LifecycleState::Alive {
            self.inner.inflight.fetch_sub(1, Ordering::AcqRel);
            return Err(PoolError::InvalidArgument(format!(
                "pool is not ALIVE (observed state {})",
                self.state()
            )));
        }
        Ok(())
    }

    pub(crate) fn leave(&self) {
        self.inner.inflight.fetch_sub(1, Ordering::AcqRel);
    }

    pub(crate) fn inflight(&self) -> usize {
        self.inner.inflight.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_passport_is_unbind() {
        let p: Passport<()> = Passport::new();
        assert_eq!(p.state(), LifecycleState::Unbind);
    }

    #[test]
    fn bind_then_bind_again_fails() {
        let p: Passport<()> = Passport::new();
        p.bind(1, Weak::new()).unwrap();
        assert_eq!(p.state(), LifecycleState::Alive);
        let err = p.bind(2, Weak::new()).unwrap_err();
        assert!(matches!(err, PoolError::InvalidArgument(_)));
    }

    #[test]
    fn rollback_returns_to_unbind() {
        let p: Passport<()> = Passport::new();
        p.bind(1, Weak::new()).unwrap();
        p.rollback_bind();
        assert_eq!(p.state(), LifecycleState::Unbind);
        // and can be rebound afterwards
        p.bind(2, Weak::new()).unwrap();
        assert_eq!(p.state(), LifecycleState::Alive);
    }

    #[test]
    fn monotonic_transitions_are_strict() {
        let p: Passport<()> = Passport::new();
        p.bind(1, Weak::new()).unwrap();
        p.transition(LifecycleState::Alive, LifecycleState::ShuttingDown)
            .unwrap();
        // repeating the same transition now fails: state is no longer ALIVE
        assert!(p
            .transition(LifecycleState::Alive, LifecycleState::ShuttingDown)
            .is_err());
        p.transition(LifecycleState::ShuttingDown, LifecycleState::Shutdown)
            .unwrap();
        p.transition(LifecycleState::Shutdown, LifecycleState::Destroying)
            .unwrap();
        p.transition(LifecycleState::Destroying, LifecycleState::Destroyed)
            .unwrap();
        assert_eq!(p.state(), LifecycleState::Destroyed);
    }

    #[test]
    fn clone_shares_state() {
        let p: Passport<()> = Passport::new();
        let q = p.clone();
        p.bind(1, Weak::new()).unwrap();
        assert_eq!(q.state(), LifecycleState::Alive);
    }
}
