#![allow(dead_code)]

use crud_middleware::memory::{MemoryServer, ServerCall};
use crud_middleware::prelude::*;

/// Route library logs to the test harness; repeat calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Open a session on `server`, returning it with the server-side connection id.
pub fn open(server: &MemoryServer, options: SessionOptions) -> (Session, u64) {
    init_tracing();
    let conn = server.connect();
    let conn_id = conn.id();
    (Session::new(conn, options), conn_id)
}

pub fn open_default(server: &MemoryServer) -> (Session, u64) {
    open(server, SessionOptions::default())
}

pub fn prepares(server: &MemoryServer) -> usize {
    server.calls().iter().filter(|c| c.is_prepare()).count()
}

pub fn one_offs(server: &MemoryServer) -> usize {
    server.calls().iter().filter(|c| c.is_one_off()).count()
}

/// Parameters sent by the most recent execution, prepared or one-off.
pub fn last_params(server: &MemoryServer) -> Vec<RowValues> {
    server
        .calls()
        .iter()
        .rev()
        .find_map(|call| match call {
            ServerCall::ExecutePrepared { params, .. } | ServerCall::ExecuteOneOff { params, .. } => {
                Some(params.clone())
            }
            _ => None,
        })
        .unwrap_or_default()
}
