//! Table locking: shared/exclusive holders, a FIFO waiter queue so lock
//! grants cannot starve, upgrade by the sole shared holder, and deadlock
//! detection over the session wait-for graph.
//!
//! Lock state is only mutated under the table's monitor. In
//! multi-threaded mode each table has its own monitor; in single-threaded
//! mode every table shares the database-wide one. Waiters sleep on the
//! monitor's condvar in bounded slices so deadlock detection runs
//! frequently; detection itself is serialized database-wide.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};

use kestrel_common::config::LockMode;
use kestrel_common::error::{DbError, DbResult};
use kestrel_common::types::SessionId;

use crate::session::Session;
use crate::table::Table;

/// Bounded sleep between acquisition attempts, so deadlock detection and
/// timeout checks run frequently.
const DEADLOCK_CHECK_INTERVAL: Duration = Duration::from_millis(100);

/// The pair a table's waiters block on: a mutex guarding the lock state
/// transitions and the condvar signalled on every release.
pub struct LockMonitor {
    mutex: Mutex<()>,
    cond: Condvar,
}

impl Default for LockMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl LockMonitor {
    pub fn new() -> Self {
        Self { mutex: Mutex::new(()), cond: Condvar::new() }
    }
}

#[derive(Default)]
struct LockInner {
    exclusive: Option<Arc<Session>>,
    shared: HashMap<SessionId, Arc<Session>>,
    /// Arrival order; only the head may attempt acquisition.
    waiters: VecDeque<SessionId>,
}

/// Per-table lock state. `exclusive_sid` mirrors the exclusive holder for
/// lock-free re-entrance checks; everything else lives behind `inner` and
/// is only touched under the monitor.
pub(crate) struct TableLockState {
    monitor: Arc<LockMonitor>,
    inner: Mutex<LockInner>,
    exclusive_sid: AtomicU64,
}

impl TableLockState {
    pub(crate) fn new(monitor: Arc<LockMonitor>) -> Self {
        Self {
            monitor,
            inner: Mutex::new(LockInner::default()),
            exclusive_sid: AtomicU64::new(0),
        }
    }

    fn is_shared_holder(&self, id: SessionId) -> bool {
        self.inner.lock().shared.contains_key(&id)
    }

    fn head_waiter(&self) -> Option<SessionId> {
        self.inner.lock().waiters.front().copied()
    }

    fn push_waiter(&self, id: SessionId) {
        self.inner.lock().waiters.push_back(id);
    }

    fn remove_waiter(&self, id: SessionId) {
        self.inner.lock().waiters.retain(|w| *w != id);
    }

    /// Clone the holder sets out so the deadlock walk never recurses while
    /// holding the state mutex.
    fn holders_snapshot(&self) -> (Vec<Arc<Session>>, Option<Arc<Session>>) {
        let inner = self.inner.lock();
        (inner.shared.values().cloned().collect(), inner.exclusive.clone())
    }
}

fn trace_lock(session: &Session, exclusive: bool, action: &str, table: &str) {
    tracing::debug!(
        "{} {} {} {}",
        session.id(),
        if exclusive { "exclusive write lock" } else { "shared read lock" },
        action,
        table
    );
}

impl Table {
    /// Acquire a table lock for `session`.
    ///
    /// Under MVCC (and without `force`), write operations downgrade to
    /// shared locks and plain reads acquire nothing unless a writer holds
    /// the table exclusively. Re-entrant acquires return immediately.
    /// Otherwise the session joins the FIFO waiter queue and loops:
    /// only the queue head attempts acquisition, sleeping in bounded
    /// slices between attempts, arming deadlock detection after the first
    /// failure and timing out per the session's `lock_timeout`.
    pub fn lock(self: &Arc<Self>, session: &Arc<Session>, exclusive: bool, force: bool) -> DbResult<()> {
        let settings = self.db.settings();
        if settings.lock_mode == LockMode::Off {
            return Ok(());
        }
        let mut exclusive = exclusive;
        if !force && settings.mvcc {
            if exclusive {
                // row-level versioning isolates writers; a shared table
                // lock is enough
                exclusive = false;
            } else if self.locks.exclusive_sid.load(Ordering::Acquire) == 0 {
                return Ok(());
            }
        }
        if self.locks.exclusive_sid.load(Ordering::Acquire) == session.id().0 {
            return Ok(());
        }
        if !exclusive && self.locks.is_shared_holder(session.id()) {
            return Ok(());
        }

        let monitor = Arc::clone(&self.locks.monitor);
        let mut guard = monitor.mutex.lock();
        if !exclusive && self.locks.is_shared_holder(session.id()) {
            return Ok(());
        }
        session.set_wait_for(Some(Arc::downgrade(self)));
        self.locks.push_waiter(session.id());
        let result = self.lock_loop(&monitor, &mut guard, session, exclusive);
        session.set_wait_for(None);
        self.locks.remove_waiter(session.id());
        result
    }

    fn lock_loop(
        self: &Arc<Self>,
        monitor: &LockMonitor,
        guard: &mut MutexGuard<'_, ()>,
        session: &Arc<Session>,
        exclusive: bool,
    ) -> DbResult<()> {
        trace_lock(session, exclusive, "requesting for", self.name());
        let mut deadline: Option<Instant> = None;
        let mut check_deadlock = false;
        loop {
            if self.locks.head_waiter() == Some(session.id())
                && self.try_acquire(session, exclusive)
            {
                return Ok(());
            }
            if check_deadlock {
                if let Some(details) = self.find_deadlock(session, exclusive) {
                    tracing::warn!("deadlock detected:{}", details);
                    return Err(DbError::Deadlock(details));
                }
            } else {
                // tolerate brief contention: arm detection after the
                // first unsuccessful attempt
                check_deadlock = true;
            }
            let now = Instant::now();
            let limit = *deadline
                .get_or_insert_with(|| now + Duration::from_millis(session.lock_timeout_ms()));
            if now >= limit {
                trace_lock(session, exclusive, "timeout waiting for", self.name());
                tracing::warn!(
                    "{} timed out after {}ms waiting for {}",
                    session.id(),
                    session.lock_timeout_ms(),
                    self.name()
                );
                return Err(DbError::LockTimeout(self.name().to_string()));
            }
            let mut sleep = DEADLOCK_CHECK_INTERVAL.min(limit - now);
            if sleep.is_zero() {
                sleep = Duration::from_millis(1);
            }
            trace_lock(session, exclusive, "waiting for", self.name());
            // spurious and interrupt wake-ups just loop again
            let _ = monitor.cond.wait_for(guard, sleep);
        }
    }

    fn try_acquire(self: &Arc<Self>, session: &Arc<Session>, exclusive: bool) -> bool {
        let settings = self.db.settings();
        let mut inner = self.locks.inner.lock();
        if exclusive {
            if inner.exclusive.is_none() {
                if inner.shared.is_empty() {
                    inner.exclusive = Some(Arc::clone(session));
                    self.locks.exclusive_sid.store(session.id().0, Ordering::Release);
                    session.add_lock(self);
                    trace_lock(session, true, "added for", self.name());
                    return true;
                }
                if inner.shared.len() == 1 && inner.shared.contains_key(&session.id()) {
                    // sole shared holder upgrades in place; a session is
                    // never in both holder sets
                    inner.shared.remove(&session.id());
                    inner.exclusive = Some(Arc::clone(session));
                    self.locks.exclusive_sid.store(session.id().0, Ordering::Release);
                    trace_lock(session, true, "upgraded for", self.name());
                    return true;
                }
            }
            false
        } else {
            if inner.exclusive.is_none() {
                if settings.lock_mode == LockMode::ReadCommitted
                    && !settings.multi_threaded
                    && !settings.mvcc
                {
                    // single-threaded read committed: row-level semantics,
                    // the shared lock is a no-op
                    return true;
                }
                if !inner.shared.contains_key(&session.id()) {
                    inner.shared.insert(session.id(), Arc::clone(session));
                    session.add_lock(self);
                    trace_lock(session, false, "ok", self.name());
                }
                return true;
            }
            false
        }
    }

    /// Release whatever lock `session` holds on this table and wake the
    /// waiter queue.
    pub fn unlock(&self, session: &Session) {
        trace_lock(
            session,
            self.locks.exclusive_sid.load(Ordering::Acquire) == session.id().0,
            "unlock",
            self.name(),
        );
        session.forget_lock(self);
        let monitor = &self.locks.monitor;
        let _guard = monitor.mutex.lock();
        let has_waiters;
        {
            let mut inner = self.locks.inner.lock();
            if inner.exclusive.as_ref().map(|s| s.id()) == Some(session.id()) {
                inner.exclusive = None;
                self.locks.exclusive_sid.store(0, Ordering::Release);
            }
            inner.shared.remove(&session.id());
            has_waiters = !inner.waiters.is_empty();
        }
        if has_waiters {
            monitor.cond.notify_all();
        }
    }

    pub fn is_locked_exclusively(&self) -> bool {
        self.locks.exclusive_sid.load(Ordering::Acquire) != 0
    }

    pub fn is_locked_exclusively_by(&self, session: &Session) -> bool {
        self.locks.exclusive_sid.load(Ordering::Acquire) == session.id().0
    }

    /// Sessions currently holding the table in shared mode (diagnostics).
    pub fn shared_lock_holders(&self) -> Vec<SessionId> {
        self.locks.inner.lock().shared.keys().copied().collect()
    }

    /// Number of sessions queued for this table (diagnostics).
    pub fn lock_waiter_count(&self) -> usize {
        self.locks.inner.lock().waiters.len()
    }

    // ── Deadlock detection ───────────────────────────────────────────

    /// One detection at a time across the whole database. On a positive
    /// result the initiator's wait-for edge is cleared before the
    /// detection lock is released, so overlapping detections by the other
    /// ring members no longer see a cycle.
    fn find_deadlock(self: &Arc<Self>, session: &Arc<Session>, exclusive: bool) -> Option<String> {
        let _detection = self.db.deadlock_lock().lock();
        let mut visited = HashSet::new();
        let ring = self.check_deadlock(session, session, &mut visited, true)?;
        let details = deadlock_details(&ring, exclusive);
        session.set_wait_for(None);
        Some(details)
    }

    /// Walk `session → holders of this table → their wait-for tables → …`.
    /// Returning to the initiating session (`clash`) is the cycle signal;
    /// `visited` only prunes non-initiating sessions, which will discover
    /// their own cycles themselves.
    pub(crate) fn check_deadlock(
        self: &Arc<Self>,
        session: &Arc<Session>,
        clash: &Arc<Session>,
        visited: &mut HashSet<SessionId>,
        initial: bool,
    ) -> Option<Vec<Arc<Session>>> {
        if !initial {
            if session.id() == clash.id() {
                return Some(Vec::new());
            }
            if visited.contains(&session.id()) {
                return None;
            }
        }
        visited.insert(session.id());
        let (shared, exclusive) = self.locks.holders_snapshot();
        for holder in shared {
            if holder.id() == session.id() {
                // already holding the table ourselves is not an edge
                continue;
            }
            if let Some(table) = holder.wait_for_table() {
                if let Some(mut ring) = table.check_deadlock(&holder, clash, visited, false) {
                    ring.push(Arc::clone(session));
                    return Some(ring);
                }
            }
        }
        if let Some(holder) = exclusive {
            if let Some(table) = holder.wait_for_table() {
                if let Some(mut ring) = table.check_deadlock(&holder, clash, visited, false) {
                    ring.push(Arc::clone(session));
                    return Some(ring);
                }
            }
        }
        None
    }
}

/// Render the detected ring with each participant's wait target and held
/// locks, for the error detail.
fn deadlock_details(ring: &[Arc<Session>], exclusive: bool) -> String {
    let mode = if exclusive { "exclusive" } else { "shared" };
    let mut buf = String::new();
    for session in ring {
        let waiting = session
            .wait_for_table()
            .map_or_else(|| "<none>".to_string(), |t| t.name().to_string());
        buf.push_str(&format!(
            "\n{} is waiting to lock {} ({}) while locking ",
            session.id(),
            waiting,
            mode
        ));
        for (i, table) in session.held_locks().iter().enumerate() {
            if i > 0 {
                buf.push_str(", ");
            }
            let held_mode = if table.is_locked_exclusively_by(session) {
                "exclusive"
            } else {
                "shared"
            };
            buf.push_str(&format!("{} ({})", table.name(), held_mode));
        }
        buf.push('.');
    }
    buf
}
