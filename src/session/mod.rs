//! Connection-scoped owner of prepared-statement handles.
//!
//! A [`Session`] wraps one [`ProtocolConnection`] behind a FIFO `tokio::sync::Mutex`, so every
//! prepare, execute and deallocate issued by the statements sharing it reaches the server one at a
//! time and in submission order. The session tracks which handles are live, counts prepare
//! attempts, executions and deallocations, and releases every remaining handle on close.
//!
//! A transport failure, including an operation timeout, breaks the session: the connection is
//! dropped mid-conversation, and every later operation fails with `TransportError`.

mod state;

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::config::SessionOptions;
use crate::error::CrudMiddlewareError;
use crate::handle::{HandleId, PreparedHandle};
use crate::protocol::{ProtocolConnection, ShapeDescriptor};
use crate::results::ResultSet;
use crate::types::RowValues;

pub use state::SessionCounters;
use state::SessionState;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Result of asking the server to prepare a shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrepareOutcome {
    Prepared(PreparedHandle),
    /// The server refused (capacity exhausted or unpreparable shape).
    Rejected(String),
}

/// Snapshot of a session's handle table and lifetime counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    pub active_handle_count: usize,
    pub prepare_attempts: u64,
    pub executes: u64,
    pub deallocations: u64,
    pub learned_capacity: Option<usize>,
    /// Handles of dropped statements not yet released.
    pub pending_release: usize,
    pub closed: bool,
    /// Closed by a transport failure rather than by `close()`.
    pub broken: bool,
}

struct SessionInner {
    id: u64,
    options: SessionOptions,
    state: Mutex<SessionState>,
    released: std::sync::Mutex<Vec<HandleId>>,
}

/// One connection plus the prepared statements allocated on it.
///
/// Cloning is cheap and yields another reference to the same session.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    pub fn new(conn: impl ProtocolConnection + 'static, options: SessionOptions) -> Self {
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        debug!(session = id, label = %options.label, "session opened");
        Self {
            inner: Arc::new(SessionInner {
                id,
                options,
                state: Mutex::new(SessionState::new(Box::new(conn))),
                released: std::sync::Mutex::new(Vec::new()),
            }),
        }
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    #[must_use]
    pub fn options(&self) -> &SessionOptions {
        &self.inner.options
    }

    async fn call<T, F>(&self, fut: F) -> Result<T, CrudMiddlewareError>
    where
        F: Future<Output = Result<T, CrudMiddlewareError>>,
    {
        match self.inner.options.operation_timeout {
            Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| {
                CrudMiddlewareError::TransportError(format!(
                    "operation timed out after {limit:?}"
                ))
            })?,
            None => fut.await,
        }
    }

    /// Break the session if `result` is a transport failure. A connection whose last call was
    /// cut off cannot be trusted with the next one.
    fn settle<T>(
        &self,
        state: &mut SessionState,
        result: Result<T, CrudMiddlewareError>,
    ) -> Result<T, CrudMiddlewareError> {
        if let Err(CrudMiddlewareError::TransportError(reason)) = &result {
            let dropped = state.break_connection(reason.clone());
            self.take_released();
            warn!(
                session = self.id(),
                dropped_handles = dropped,
                error = %reason,
                "transport failure; session is no longer usable"
            );
        }
        result
    }

    fn take_released(&self) -> Vec<HandleId> {
        let mut queue = match self.inner.released.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::take(&mut *queue)
    }

    async fn release_locked(&self, state: &mut SessionState, id: HandleId) {
        if !state.active.remove(&id) {
            debug!(session = self.id(), handle = %id, "ignoring release of stale handle");
            return;
        }
        state.counters.deallocations += 1;
        let Some(conn) = state.conn.as_mut() else {
            return;
        };
        let result = self.call(conn.deallocate(id)).await;
        match self.settle(state, result) {
            Ok(()) => debug!(session = self.id(), handle = %id, "deallocated"),
            Err(err) => warn!(session = self.id(), handle = %id, error = %err, "deallocate failed"),
        }
    }

    /// Lock the session, failing fast once closed or broken, and release handles of dropped
    /// statements.
    async fn lock_open(&self) -> Result<MutexGuard<'_, SessionState>, CrudMiddlewareError> {
        let mut guard = self.inner.state.lock().await;
        if let Some(err) = guard.broken_error() {
            return Err(err);
        }
        if guard.conn.is_none() {
            return Err(CrudMiddlewareError::SessionClosed);
        }
        for id in self.take_released() {
            self.release_locked(&mut guard, id).await;
        }
        // A queued release can itself break the connection
        match guard.broken_error() {
            Some(err) => Err(err),
            None => Ok(guard),
        }
    }

    fn check_owner(&self, handle: &PreparedHandle) -> Result<(), CrudMiddlewareError> {
        if handle.session_id() == self.id() {
            Ok(())
        } else {
            Err(CrudMiddlewareError::ExecutionError(format!(
                "prepared statement {} belongs to session {}, not {}",
                handle.id(),
                handle.session_id(),
                self.id()
            )))
        }
    }

    /// Try to allocate a prepared statement for `shape`.
    ///
    /// # Errors
    /// Only transport failures and a closed session are errors; any other refusal is reported as
    /// [`PrepareOutcome::Rejected`].
    pub async fn prepare(
        &self,
        shape: &ShapeDescriptor,
    ) -> Result<PrepareOutcome, CrudMiddlewareError> {
        let mut guard = self.lock_open().await?;
        let state = &mut *guard;
        state.counters.prepare_attempts += 1;
        let conn = state.conn.as_mut().ok_or(CrudMiddlewareError::SessionClosed)?;

        let result = self.call(conn.prepare(shape)).await;
        match self.settle(state, result) {
            Ok(id) => {
                state.active.insert(id);
                debug!(session = self.id(), handle = %id, sql = %shape.sql, "prepared");
                Ok(PrepareOutcome::Prepared(PreparedHandle::new(id, self.id())))
            }
            Err(err) if err.is_transport() => Err(err),
            Err(err) => {
                let capacity = state.record_refusal();
                warn!(
                    session = self.id(),
                    live_handles = state.active.len(),
                    learned_capacity = capacity,
                    error = %err,
                    "prepare refused; falling back to one-off execution"
                );
                Ok(PrepareOutcome::Rejected(err.to_string()))
            }
        }
    }

    /// Execute through a live handle.
    ///
    /// # Errors
    /// Returns `ExecutionError` if the handle belongs to another session or is no longer live,
    /// and any error the server reports for the run.
    pub async fn execute_prepared(
        &self,
        handle: &PreparedHandle,
        params: &[RowValues],
    ) -> Result<ResultSet, CrudMiddlewareError> {
        self.check_owner(handle)?;
        let mut guard = self.lock_open().await?;
        let state = &mut *guard;
        if !state.active.contains(&handle.id()) {
            return Err(CrudMiddlewareError::ExecutionError(format!(
                "prepared statement {} is not live",
                handle.id()
            )));
        }
        state.counters.executes += 1;
        let conn = state.conn.as_mut().ok_or(CrudMiddlewareError::SessionClosed)?;
        let result = self.call(conn.execute_prepared(handle.id(), params)).await;
        self.settle(state, result)
    }

    /// Execute without a separate prepare step.
    ///
    /// # Errors
    /// Returns any error the server or transport reports for the run.
    pub async fn execute_one_off(
        &self,
        shape: &ShapeDescriptor,
        params: &[RowValues],
    ) -> Result<ResultSet, CrudMiddlewareError> {
        let mut guard = self.lock_open().await?;
        let state = &mut *guard;
        state.counters.executes += 1;
        let conn = state.conn.as_mut().ok_or(CrudMiddlewareError::SessionClosed)?;
        let result = self.call(conn.execute_one_off(shape, params)).await;
        self.settle(state, result)
    }

    /// Release a handle. Stale handles and closed sessions are tolerated as no-ops and server
    /// failures are logged, not returned.
    pub async fn deallocate(&self, handle: PreparedHandle) {
        if self.check_owner(&handle).is_err() {
            warn!(session = self.id(), handle = %handle.id(), "refusing to release foreign handle");
            return;
        }
        let mut guard = self.inner.state.lock().await;
        if guard.conn.is_none() {
            return;
        }
        self.release_locked(&mut guard, handle.id()).await;
    }

    /// Queue a handle for release by the next session operation. Used where awaiting is not
    /// possible, such as `Drop`.
    pub(crate) fn queue_release(&self, handle: &PreparedHandle) {
        if handle.session_id() != self.id() {
            return;
        }
        let mut queue = match self.inner.released.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        queue.push(handle.id());
    }

    /// Release handles queued by dropped statements.
    ///
    /// # Errors
    /// Returns `SessionClosed` if the session has been closed, `TransportError` if it is broken.
    pub async fn release_dropped(&self) -> Result<(), CrudMiddlewareError> {
        self.lock_open().await.map(drop)
    }

    /// Deallocate every live handle (best effort) and close the connection.
    ///
    /// Later operations fail with `SessionClosed`. Closing twice, or closing a broken session, is
    /// a no-op.
    ///
    /// # Errors
    /// Returns the error reported while closing the connection itself.
    pub async fn close(&self) -> Result<(), CrudMiddlewareError> {
        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;
        let Some(mut conn) = state.conn.take() else {
            return Ok(());
        };
        self.take_released();

        let handles = std::mem::take(&mut state.active);
        for id in &handles {
            state.counters.deallocations += 1;
            if let Err(err) = self.call(conn.deallocate(*id)).await {
                warn!(session = self.id(), handle = %id, error = %err, "deallocate on close failed");
            }
        }
        info!(
            session = self.id(),
            released = handles.len(),
            counters = ?state.counters,
            "session closed"
        );
        self.call(conn.close()).await
    }

    pub async fn is_closed(&self) -> bool {
        self.inner.state.lock().await.conn.is_none()
    }

    pub async fn stats(&self) -> SessionStats {
        let pending_release = match self.inner.released.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        };
        let state = self.inner.state.lock().await;
        SessionStats {
            active_handle_count: state.active.len(),
            prepare_attempts: state.counters.prepare_attempts,
            executes: state.counters.executes,
            deallocations: state.counters.deallocations,
            learned_capacity: state.learned_capacity,
            pending_release,
            closed: state.conn.is_none(),
            broken: state.broken.is_some(),
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("label", &self.inner.options.label)
            .finish()
    }
}
