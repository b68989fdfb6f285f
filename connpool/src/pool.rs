//! Permission pool: bounded checkout, idle reuse and timed waiting.
//!
//! All bookkeeping (outstanding count, idle cache, wait registry, id counter)
//! lives behind one mutex that is never held across an `.await`. A saturated
//! acquire registers a oneshot hand-off and waits outside the lock; release
//! delivers capacity straight to the oldest waiter before it considers the
//! idle cache.
//!
//! Capacity accounting keeps `outstanding + idle <= capacity`. Release does
//! not check which permission the caller holds; it only moves counts.

use std::collections::VecDeque;
use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::config::PoolConfig;
use crate::error::AcquireError;
use crate::permission::{Permission, PermissionId};

/// What a single release did with the capacity it returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// Capacity went directly to a blocked acquire.
    HandedOff(PermissionId),
    /// A fresh permission was parked in the idle cache.
    Cached(PermissionId),
    /// Idle cache full; capacity returned without caching.
    Returned,
    /// Nothing was checked out.
    Nothing,
}

impl ReleaseOutcome {
    pub fn is_released(&self) -> bool {
        !matches!(self, ReleaseOutcome::Nothing)
    }
}

/// Snapshot of pool bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub capacity: usize,
    pub idle_limit: usize,
    pub outstanding: usize,
    pub idle: usize,
    pub waiting: usize,
    /// Last id handed out by the allocator (0 before the first).
    pub last_id: u64,
}

struct Waiter {
    id: PermissionId,
    tx: oneshot::Sender<Permission>,
}

struct PoolState {
    outstanding: usize,
    idle: VecDeque<Permission>,
    waiters: VecDeque<Waiter>,
    last_id: u64,
}

impl PoolState {
    fn allocate_id(&mut self) -> PermissionId {
        self.last_id += 1;
        PermissionId::new(self.last_id)
    }

    fn remove_waiter(&mut self, id: PermissionId) -> bool {
        match self.waiters.iter().position(|w| w.id == id) {
            Some(index) => {
                self.waiters.remove(index);
                true
            }
            None => false,
        }
    }
}

/// Pool of interchangeable permissions.
pub struct PermissionPool {
    config: PoolConfig,
    state: Mutex<PoolState>,
}

impl PermissionPool {
    pub fn new(config: PoolConfig) -> Self {
        tracing::debug!(
            max_conn = config.max_conn,
            max_idle = config.max_idle,
            acquire_timeout = ?config.acquire_timeout,
            "Creating permission pool"
        );
        Self {
            state: Mutex::new(PoolState {
                outstanding: 0,
                idle: VecDeque::with_capacity(config.max_idle.min(config.max_conn)),
                waiters: VecDeque::new(),
                last_id: 0,
            }),
            config,
        }
    }

    /// Create a pool ready to be shared between tasks.
    pub fn prepare(config: PoolConfig) -> Arc<Self> {
        Arc::new(Self::new(config))
    }

    // Every critical section leaves the state consistent, so a panic in
    // another holder does not invalidate it.
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Acquire a permission.
    ///
    /// Served from the idle cache first, then by minting a new permission
    /// while under capacity. A saturated pool parks the caller until a
    /// release hands it capacity, the acquire timeout passes, `cancel`
    /// fires, or the pool is [closed](Self::close).
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<Permission, AcquireError> {
        if cancel.is_cancelled() {
            return Err(AcquireError::Canceled);
        }

        let pending = {
            let mut state = self.lock();

            if let Some(permission) = state.idle.pop_front() {
                state.outstanding += 1;
                tracing::debug!(
                    id = %permission.id(),
                    outstanding = state.outstanding,
                    idle = state.idle.len(),
                    "Reusing idle permission"
                );
                return Ok(permission);
            }

            let id = state.allocate_id();
            if state.outstanding < self.config.max_conn {
                state.outstanding += 1;
                tracing::debug!(%id, outstanding = state.outstanding, "Created permission");
                drop(state);
                return Ok(Permission::granted(id, self.config.max_lifetime));
            }

            let (tx, rx) = oneshot::channel();
            state.waiters.push_back(Waiter { id, tx });
            tracing::debug!(%id, waiting = state.waiters.len(), "Pool saturated, waiting");
            PendingAcquire {
                pool: self,
                id,
                rx,
                settled: false,
            }
        };

        pending.wait(cancel, self.config.acquire_timeout).await
    }

    /// Acquire a permission that releases itself when dropped.
    pub async fn acquire_owned(
        self: &Arc<Self>,
        cancel: &CancellationToken,
    ) -> Result<PooledPermission, AcquireError> {
        let permission = self.acquire(cancel).await?;
        Ok(PooledPermission {
            permission,
            pool: Arc::clone(self),
            detached: false,
        })
    }

    /// Return one unit of capacity. Never blocks and never fails.
    ///
    /// Takes no cancellation token: release completes in a single pass
    /// under the lock, so there is nothing to cancel. Returns `false` when
    /// nothing was checked out.
    pub fn release(&self) -> bool {
        self.release_outcome().is_released()
    }

    /// Like [`release`](Self::release), reporting where the capacity went.
    pub fn release_outcome(&self) -> ReleaseOutcome {
        let mut state = self.lock();
        self.release_locked(&mut state)
    }

    fn release_locked(&self, state: &mut PoolState) -> ReleaseOutcome {
        while let Some(Waiter { id, tx }) = state.waiters.pop_front() {
            let permission = Permission::granted(id, self.config.max_lifetime);
            match tx.send(permission) {
                Ok(()) => {
                    tracing::debug!(
                        %id,
                        outstanding = state.outstanding,
                        waiting = state.waiters.len(),
                        "Handed permission to waiter"
                    );
                    return ReleaseOutcome::HandedOff(id);
                }
                Err(_) => {
                    tracing::warn!(%id, "Waiter went away before hand-off, trying next");
                }
            }
        }

        if state.outstanding == 0 {
            tracing::debug!("Release with nothing outstanding");
            return ReleaseOutcome::Nothing;
        }

        state.outstanding -= 1;
        if state.idle.len() < self.config.max_idle {
            let id = state.allocate_id();
            state
                .idle
                .push_back(Permission::granted(id, self.config.max_lifetime));
            tracing::debug!(
                %id,
                outstanding = state.outstanding,
                idle = state.idle.len(),
                "Cached released permission"
            );
            ReleaseOutcome::Cached(id)
        } else {
            tracing::debug!(outstanding = state.outstanding, "Idle cache full, capacity returned");
            ReleaseOutcome::Returned
        }
    }

    /// Fail every currently blocked acquire with [`AcquireError::NoAvailableSlot`].
    ///
    /// Returns the number of waiters dropped. The pool stays usable.
    pub fn close(&self) -> usize {
        let waiters = std::mem::take(&mut self.lock().waiters);
        if !waiters.is_empty() {
            tracing::warn!(waiters = waiters.len(), "Closing wait queue");
        }
        waiters.len()
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.lock();
        PoolStats {
            capacity: self.config.max_conn,
            idle_limit: self.config.max_idle,
            outstanding: state.outstanding,
            idle: state.idle.len(),
            waiting: state.waiters.len(),
            last_id: state.last_id,
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn capacity(&self) -> usize {
        self.config.max_conn
    }

    pub fn idle_limit(&self) -> usize {
        self.config.max_idle
    }

    pub fn outstanding(&self) -> usize {
        self.lock().outstanding
    }

    pub fn idle_len(&self) -> usize {
        self.lock().idle.len()
    }

    pub fn waiting(&self) -> usize {
        self.lock().waiters.len()
    }
}

impl Default for PermissionPool {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}

enum Wake {
    Delivered(Result<Permission, oneshot::error::RecvError>),
    Canceled,
    TimedOut,
}

/// A registered waiter. Deregisters itself if dropped before settling, and
/// gives back capacity that was delivered to it too late.
struct PendingAcquire<'a> {
    pool: &'a PermissionPool,
    id: PermissionId,
    rx: oneshot::Receiver<Permission>,
    settled: bool,
}

impl PendingAcquire<'_> {
    async fn wait(
        mut self,
        cancel: &CancellationToken,
        timeout: Duration,
    ) -> Result<Permission, AcquireError> {
        let wake = tokio::select! {
            delivered = &mut self.rx => Wake::Delivered(delivered),
            () = cancel.cancelled() => Wake::Canceled,
            () = tokio::time::sleep(timeout) => Wake::TimedOut,
        };
        self.settle(wake)
    }

    fn settle(&mut self, wake: Wake) -> Result<Permission, AcquireError> {
        self.settled = true;
        let error = match wake {
            Wake::Delivered(Ok(permission)) => {
                tracing::debug!(id = %permission.id(), "Received released permission");
                return Ok(permission);
            }
            Wake::Delivered(Err(_)) => {
                tracing::debug!(id = %self.id, "Wait channel closed without a permission");
                return Err(AcquireError::NoAvailableSlot);
            }
            Wake::Canceled => AcquireError::Canceled,
            Wake::TimedOut => AcquireError::AcquireTimeout(self.pool.config.acquire_timeout),
        };

        if self.pool.lock().remove_waiter(self.id) {
            if let AcquireError::AcquireTimeout(after) = &error {
                tracing::warn!(id = %self.id, ?after, "Acquire timed out");
            } else {
                tracing::debug!(id = %self.id, "Acquire canceled while waiting");
            }
            return Err(error);
        }

        // A release served this waiter between wake-up and deregistration;
        // the permission is already in the channel.
        match self.rx.try_recv() {
            Ok(permission) => {
                tracing::debug!(id = %permission.id(), "Permission arrived while giving up, keeping it");
                Ok(permission)
            }
            Err(_) => Err(AcquireError::NoAvailableSlot),
        }
    }
}

impl Drop for PendingAcquire<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut state = self.pool.lock();
        if state.remove_waiter(self.id) {
            tracing::debug!(id = %self.id, "Abandoned acquire deregistered");
            return;
        }
        if let Ok(permission) = self.rx.try_recv() {
            tracing::debug!(id = %permission.id(), "Abandoned acquire returning delivered permission");
            self.pool.release_locked(&mut state);
        }
    }
}

/// A permission that calls [`PermissionPool::release`] when dropped.
pub struct PooledPermission {
    permission: Permission,
    pool: Arc<PermissionPool>,
    detached: bool,
}

impl PooledPermission {
    /// Detach the permission; the caller becomes responsible for releasing.
    pub fn into_inner(mut self) -> Permission {
        self.detached = true;
        self.permission.clone()
    }
}

impl Deref for PooledPermission {
    type Target = Permission;

    fn deref(&self) -> &Permission {
        &self.permission
    }
}

impl Drop for PooledPermission {
    fn drop(&mut self) {
        if self.detached {
            return;
        }
        let outcome = self.pool.release_outcome();
        tracing::debug!(id = %self.permission.id(), ?outcome, "Pooled permission released");
    }
}
