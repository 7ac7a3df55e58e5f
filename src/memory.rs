//! In-process protocol server.
//!
//! `MemoryServer` models the part of a database server this crate talks to: a prepared-statement
//! table shared by all connections with an optional global capacity, plus one-off execution. It
//! never interprets statement text; results come from a pluggable responder. Every call is
//! logged so tests can assert on the exact sequence of protocol operations.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::CrudMiddlewareError;
use crate::handle::HandleId;
use crate::protocol::{ProtocolConnection, ShapeDescriptor};
use crate::results::ResultSet;
use crate::types::RowValues;

/// Produces the result of an execution from the statement and its values.
pub type Responder =
    Arc<dyn Fn(&ShapeDescriptor, &[RowValues]) -> Result<ResultSet, String> + Send + Sync>;

/// One protocol operation received by the server.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerCall {
    Prepare { conn: u64, sql: String },
    ExecutePrepared { conn: u64, id: HandleId, params: Vec<RowValues> },
    ExecuteOneOff { conn: u64, sql: String, params: Vec<RowValues> },
    Deallocate { conn: u64, id: HandleId },
    Close { conn: u64 },
}

impl ServerCall {
    #[must_use]
    pub fn is_prepare(&self) -> bool {
        matches!(self, ServerCall::Prepare { .. })
    }

    #[must_use]
    pub fn is_one_off(&self) -> bool {
        matches!(self, ServerCall::ExecuteOneOff { .. })
    }

    #[must_use]
    pub fn is_deallocate(&self) -> bool {
        matches!(self, ServerCall::Deallocate { .. })
    }

    #[must_use]
    pub fn is_execute_prepared(&self) -> bool {
        matches!(self, ServerCall::ExecutePrepared { .. })
    }
}

#[derive(Default)]
struct ServerState {
    capacity: Option<usize>,
    prepared: BTreeMap<(u64, HandleId), ShapeDescriptor>,
    next_conn: u64,
    calls: Vec<ServerCall>,
    forced_prepare_failures: usize,
    unpreparable: Vec<String>,
    severed: HashSet<u64>,
    latency: Option<Duration>,
    in_flight: usize,
    max_in_flight: usize,
    responder: Option<Responder>,
}

/// Shared in-memory server. Clones refer to the same server.
#[derive(Clone, Default)]
pub struct MemoryServer {
    inner: Arc<Mutex<ServerState>>,
}

impl MemoryServer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Server whose prepared-statement table holds at most `capacity` entries across all
    /// connections.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let server = Self::default();
        server.lock().capacity = Some(capacity);
        server
    }

    fn lock(&self) -> MutexGuard<'_, ServerState> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Open a new connection.
    #[must_use]
    pub fn connect(&self) -> MemoryConnection {
        let mut state = self.lock();
        state.next_conn += 1;
        MemoryConnection {
            server: self.clone(),
            conn: state.next_conn,
            next_id: 0,
        }
    }

    pub fn set_capacity(&self, capacity: Option<usize>) {
        self.lock().capacity = capacity;
    }

    pub fn set_responder<F>(&self, responder: F)
    where
        F: Fn(&ShapeDescriptor, &[RowValues]) -> Result<ResultSet, String> + Send + Sync + 'static,
    {
        self.lock().responder = Some(Arc::new(responder));
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.lock().latency = latency;
    }

    /// Refuse the next `count` prepare requests.
    pub fn fail_next_prepares(&self, count: usize) {
        self.lock().forced_prepare_failures = count;
    }

    /// Refuse to prepare any statement whose text contains `fragment`.
    pub fn reject_prepares_containing(&self, fragment: impl Into<String>) {
        self.lock().unpreparable.push(fragment.into());
    }

    /// Drop a prepared statement behind the client's back.
    pub fn invalidate(&self, conn: u64, id: HandleId) -> bool {
        self.lock().prepared.remove(&(conn, id)).is_some()
    }

    /// Make every later call on connection `conn` fail with a transport error.
    pub fn sever(&self, conn: u64) {
        self.lock().severed.insert(conn);
    }

    /// Prepared statements currently allocated, across all connections.
    #[must_use]
    pub fn live_prepared_count(&self) -> usize {
        self.lock().prepared.len()
    }

    #[must_use]
    pub fn calls(&self) -> Vec<ServerCall> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Highest number of calls observed in flight at once.
    #[must_use]
    pub fn max_in_flight(&self) -> usize {
        self.lock().max_in_flight
    }

    async fn enter(&self, conn: u64, call: ServerCall) -> Result<(), CrudMiddlewareError> {
        let latency = {
            let mut state = self.lock();
            if state.severed.contains(&conn) {
                return Err(CrudMiddlewareError::TransportError(format!(
                    "connection {conn} reset by peer"
                )));
            }
            state.calls.push(call);
            state.in_flight += 1;
            state.max_in_flight = state.max_in_flight.max(state.in_flight);
            state.latency
        };
        // Held across the await so an abandoned call still leaves the server
        let _in_flight = InFlight { server: self };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        Ok(())
    }

    fn respond(
        &self,
        shape: &ShapeDescriptor,
        params: &[RowValues],
    ) -> Result<ResultSet, CrudMiddlewareError> {
        let responder = self.lock().responder.clone();
        match responder {
            Some(responder) => {
                responder(shape, params).map_err(CrudMiddlewareError::ExecutionError)
            }
            None if shape.returns_rows => Ok(ResultSet::default()),
            None => Ok(ResultSet::affected(0)),
        }
    }
}

struct InFlight<'a> {
    server: &'a MemoryServer,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut state = self.server.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
    }
}

/// One connection to a [`MemoryServer`].
///
/// Dropping the connection discards its prepared statements, as a server does on disconnect.
pub struct MemoryConnection {
    server: MemoryServer,
    conn: u64,
    next_id: u32,
}

impl MemoryConnection {
    /// Server-side connection id, as recorded in [`ServerCall`]s.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.conn
    }

    fn forget_statements(&self) {
        let conn = self.conn;
        self.server
            .lock()
            .prepared
            .retain(|(owner, _), _| *owner != conn);
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.forget_statements();
    }
}

#[async_trait]
impl ProtocolConnection for MemoryConnection {
    async fn prepare(&mut self, shape: &ShapeDescriptor) -> Result<HandleId, CrudMiddlewareError> {
        self.server
            .enter(
                self.conn,
                ServerCall::Prepare {
                    conn: self.conn,
                    sql: shape.sql.to_string(),
                },
            )
            .await?;

        let mut state = self.server.lock();
        if state.forced_prepare_failures > 0 {
            state.forced_prepare_failures -= 1;
            return Err(CrudMiddlewareError::ExecutionError(
                "prepare failed".into(),
            ));
        }
        if state
            .unpreparable
            .iter()
            .any(|fragment| shape.sql.contains(fragment.as_str()))
        {
            return Err(CrudMiddlewareError::ExecutionError(format!(
                "statement cannot be prepared: {}",
                shape.sql
            )));
        }
        if let Some(capacity) = state.capacity
            && state.prepared.len() >= capacity
        {
            return Err(CrudMiddlewareError::ExecutionError(format!(
                "can't create more than max_prepared_stmt_count statements (current value: {capacity})"
            )));
        }

        self.next_id = self.next_id.checked_add(1).ok_or_else(|| {
            CrudMiddlewareError::ExecutionError(format!(
                "connection {} has no prepared statement ids left",
                self.conn
            ))
        })?;
        let id = HandleId(self.next_id);
        state.prepared.insert((self.conn, id), shape.clone());
        Ok(id)
    }

    async fn execute_prepared(
        &mut self,
        id: HandleId,
        params: &[RowValues],
    ) -> Result<ResultSet, CrudMiddlewareError> {
        self.server
            .enter(
                self.conn,
                ServerCall::ExecutePrepared {
                    conn: self.conn,
                    id,
                    params: params.to_vec(),
                },
            )
            .await?;

        let shape = self.server.lock().prepared.get(&(self.conn, id)).cloned();
        match shape {
            Some(shape) => self.server.respond(&shape, params),
            None => Err(CrudMiddlewareError::ExecutionError(format!(
                "unknown prepared statement {id}"
            ))),
        }
    }

    async fn execute_one_off(
        &mut self,
        shape: &ShapeDescriptor,
        params: &[RowValues],
    ) -> Result<ResultSet, CrudMiddlewareError> {
        self.server
            .enter(
                self.conn,
                ServerCall::ExecuteOneOff {
                    conn: self.conn,
                    sql: shape.sql.to_string(),
                    params: params.to_vec(),
                },
            )
            .await?;
        self.server.respond(shape, params)
    }

    async fn deallocate(&mut self, id: HandleId) -> Result<(), CrudMiddlewareError> {
        self.server
            .enter(self.conn, ServerCall::Deallocate { conn: self.conn, id })
            .await?;
        self.server.lock().prepared.remove(&(self.conn, id));
        Ok(())
    }

    async fn close(&mut self) -> Result<(), CrudMiddlewareError> {
        self.server
            .enter(self.conn, ServerCall::Close { conn: self.conn })
            .await?;
        self.forget_statements();
        Ok(())
    }
}
