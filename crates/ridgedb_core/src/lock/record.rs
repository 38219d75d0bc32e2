use crate::config::LockConfig;
use crate::error::{CoreError, CoreResult};
use crate::lock::{LockMode, LockOutcome, LockState, RecordKey};
use crate::types::TransactionId;
use parking_lot::{Condvar, Mutex};
use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

#[derive(Debug)]
struct Request {
    txn: TransactionId,
    held: Option<LockMode>,
    wanted: LockMode,
}

impl Request {
    fn is_waiting(&self) -> bool {
        self.held != Some(self.wanted)
    }
}

/// Requests on one resource in arrival order.
#[derive(Debug, Default)]
struct Queue {
    requests: Vec<Request>,
}

impl Queue {
    fn position(&self, txn: TransactionId) -> Option<usize> {
        self.requests.iter().position(|r| r.txn == txn)
    }

    /// A request is grantable when no other transaction holds an
    /// incompatible lock and, for a fresh request, no incompatible request
    /// is queued ahead of it. Upgrades only wait for holders.
    fn grantable(&self, slot: usize) -> bool {
        let request = &self.requests[slot];
        self.requests.iter().enumerate().all(|(i, other)| {
            if other.txn == request.txn {
                return true;
            }
            if let Some(held) = other.held {
                if !held.is_compatible(request.wanted) {
                    return false;
                }
            }
            !(i < slot
                && request.held.is_none()
                && other.is_waiting()
                && !other.wanted.is_compatible(request.wanted))
        })
    }

    fn promote(&mut self) -> Vec<TransactionId> {
        let mut promoted = Vec::new();
        for slot in 0..self.requests.len() {
            if self.requests[slot].is_waiting() && self.grantable(slot) {
                let request = &mut self.requests[slot];
                request.held = Some(request.wanted);
                promoted.push(request.txn);
            }
        }
        promoted
    }
}

#[derive(Debug, Default)]
struct Inner {
    queues: HashMap<RecordKey, Queue>,
    owned: HashMap<TransactionId, BTreeSet<RecordKey>>,
}

impl Inner {
    fn request(&mut self, txn: TransactionId, resource: &RecordKey, mode: LockMode) -> LockOutcome {
        let queue = self.queues.entry(resource.clone()).or_default();
        let slot = match queue.position(txn) {
            Some(slot) => {
                let request = &mut queue.requests[slot];
                if request.held.is_some_and(|held| held.max(mode) == held) {
                    return LockOutcome::Granted;
                }
                request.wanted = request.wanted.max(mode);
                if !request.is_waiting() {
                    return LockOutcome::Granted;
                }
                slot
            }
            None => {
                queue.requests.push(Request {
                    txn,
                    held: None,
                    wanted: mode,
                });
                self.owned.entry(txn).or_default().insert(resource.clone());
                queue.requests.len() - 1
            }
        };

        if queue.grantable(slot) {
            let request = &mut queue.requests[slot];
            request.held = Some(request.wanted);
            trace!(txn = %txn, resource = %resource, mode = %request.wanted, "record lock granted");
            LockOutcome::Granted
        } else {
            debug!(txn = %txn, resource = %resource, mode = %mode, "record lock waiting");
            LockOutcome::Waiting
        }
    }

    fn state(&self, txn: TransactionId, resource: &RecordKey) -> LockState {
        let request = self
            .queues
            .get(resource)
            .and_then(|q| q.position(txn).map(|slot| &q.requests[slot]));
        match request {
            Some(r) if r.is_waiting() => LockState::Waiting,
            Some(_) => LockState::Granted,
            None => LockState::Released,
        }
    }

    /// Drops a waiting request, or the pending upgrade of a held one.
    fn withdraw(&mut self, txn: TransactionId, resource: &RecordKey) -> Vec<(TransactionId, RecordKey)> {
        let Some(queue) = self.queues.get_mut(resource) else {
            return Vec::new();
        };
        let Some(slot) = queue.position(txn) else {
            return Vec::new();
        };
        match queue.requests[slot].held {
            Some(held) => queue.requests[slot].wanted = held,
            None => {
                queue.requests.remove(slot);
                if let Some(owned) = self.owned.get_mut(&txn) {
                    owned.remove(resource);
                }
            }
        }
        let promoted = queue.promote();
        if queue.requests.is_empty() {
            self.queues.remove(resource);
        }
        promoted
            .into_iter()
            .map(|t| (t, resource.clone()))
            .collect()
    }
}

/// Record locks over `(table, index, key)` resources.
///
/// Shared locks coexist; an exclusive lock excludes every other
/// transaction. Conflicting requests queue in arrival order and are promoted
/// when the blocking transactions release.
#[derive(Debug)]
pub struct RecordLockManager {
    inner: Mutex<Inner>,
    changed: Condvar,
    config: LockConfig,
}

impl RecordLockManager {
    /// Creates an empty lock table.
    #[must_use]
    pub fn new(config: LockConfig) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            changed: Condvar::new(),
            config,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    /// Requests `mode` on `resource` for `txn` without blocking.
    ///
    /// Re-requesting a held lock is a no-op; requesting `Exclusive` while
    /// holding `Shared` upgrades, waiting if other transactions share the
    /// lock. A `Waiting` request stays queued until it is promoted by a
    /// release or withdrawn by the transaction's own release.
    pub fn lock(&self, txn: TransactionId, resource: &RecordKey, mode: LockMode) -> LockOutcome {
        self.inner.lock().request(txn, resource, mode)
    }

    /// Requests `mode` and blocks until granted or the configured wait
    /// timeout passes.
    ///
    /// # Errors
    ///
    /// Returns `LockWaitTimeout` on timeout; the request is then withdrawn.
    pub fn lock_wait(&self, txn: TransactionId, resource: &RecordKey, mode: LockMode) -> CoreResult<()> {
        self.lock_wait_timeout(txn, resource, mode, self.config.wait_timeout)
    }

    /// Like [`RecordLockManager::lock_wait`] with an explicit timeout.
    ///
    /// # Errors
    ///
    /// Returns `LockWaitTimeout` on timeout; the request is then withdrawn.
    pub fn lock_wait_timeout(
        &self,
        txn: TransactionId,
        resource: &RecordKey,
        mode: LockMode,
        timeout: Duration,
    ) -> CoreResult<()> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        if inner.request(txn, resource, mode).is_granted() {
            return Ok(());
        }

        loop {
            let timed_out = self.changed.wait_until(&mut inner, deadline).timed_out();
            match inner.state(txn, resource) {
                LockState::Granted => return Ok(()),
                LockState::Released => {
                    return Err(CoreError::invalid_operation(format!(
                        "lock request of {txn} on {resource} was released while waiting"
                    )))
                }
                LockState::Waiting if !timed_out => {}
                LockState::Waiting => {
                    let promoted = inner.withdraw(txn, resource);
                    drop(inner);
                    if !promoted.is_empty() {
                        self.changed.notify_all();
                    }
                    debug!(txn = %txn, resource = %resource, ?timeout, "record lock wait timed out");
                    return Err(CoreError::LockWaitTimeout {
                        resource: resource.to_string(),
                    });
                }
            }
        }
    }

    /// Returns where `txn`'s request on `resource` stands.
    #[must_use]
    pub fn lock_state(&self, txn: TransactionId, resource: &RecordKey) -> LockState {
        self.inner.lock().state(txn, resource)
    }

    /// Returns the transactions holding `resource` and their modes.
    #[must_use]
    pub fn holders(&self, resource: &RecordKey) -> Vec<(TransactionId, LockMode)> {
        self.inner
            .lock()
            .queues
            .get(resource)
            .map(|q| {
                q.requests
                    .iter()
                    .filter_map(|r| r.held.map(|m| (r.txn, m)))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns the transactions with a waiting request on `resource`, in
    /// arrival order.
    #[must_use]
    pub fn waiters(&self, resource: &RecordKey) -> Vec<TransactionId> {
        self.inner
            .lock()
            .queues
            .get(resource)
            .map(|q| {
                q.requests
                    .iter()
                    .filter(|r| r.is_waiting())
                    .map(|r| r.txn)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns the resources `txn` holds, sorted.
    #[must_use]
    pub fn locks_held(&self, txn: TransactionId) -> Vec<RecordKey> {
        let inner = self.inner.lock();
        inner
            .owned
            .get(&txn)
            .map(|owned| {
                owned
                    .iter()
                    .filter(|r| inner.state(txn, r) == LockState::Granted)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Releases every lock and waiting request of `txn`.
    ///
    /// Returns the requests promoted as a result, resource by resource in
    /// key order and in arrival order within a resource.
    pub fn release_all(&self, txn: TransactionId) -> Vec<(TransactionId, RecordKey)> {
        let mut inner = self.inner.lock();
        let Some(owned) = inner.owned.remove(&txn) else {
            return Vec::new();
        };

        let mut promoted = Vec::new();
        for resource in owned {
            let Some(queue) = inner.queues.get_mut(&resource) else {
                continue;
            };
            queue.requests.retain(|r| r.txn != txn);
            for waiter in queue.promote() {
                debug!(txn = %waiter, resource = %resource, "record lock promoted");
                promoted.push((waiter, resource.clone()));
            }
            if queue.requests.is_empty() {
                inner.queues.remove(&resource);
            }
        }
        drop(inner);

        if !promoted.is_empty() {
            self.changed.notify_all();
        }
        trace!(txn = %txn, promoted = promoted.len(), "released record locks");
        promoted
    }

    /// Returns the number of resources with at least one request.
    #[must_use]
    pub fn resource_count(&self) -> usize {
        self.inner.lock().queues.len()
    }
}

impl Default for RecordLockManager {
    fn default() -> Self {
        Self::new(LockConfig::default())
    }
}
