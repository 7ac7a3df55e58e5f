use std::collections::BTreeSet;

use crate::error::CrudMiddlewareError;
use crate::handle::HandleId;
use crate::protocol::ProtocolConnection;

/// Lifetime counters of one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionCounters {
    pub prepare_attempts: u64,
    pub executes: u64,
    pub deallocations: u64,
}

/// Everything guarded by the session's serialization point.
pub(super) struct SessionState {
    /// `None` once the session is closed or broken.
    pub(super) conn: Option<Box<dyn ProtocolConnection>>,
    /// Transport failure that broke the connection.
    pub(super) broken: Option<String>,
    pub(super) active: BTreeSet<HandleId>,
    pub(super) counters: SessionCounters,
    /// Fewest live handles observed at a refused prepare.
    pub(super) learned_capacity: Option<usize>,
}

impl SessionState {
    pub(super) fn new(conn: Box<dyn ProtocolConnection>) -> Self {
        Self {
            conn: Some(conn),
            broken: None,
            active: BTreeSet::new(),
            counters: SessionCounters::default(),
            learned_capacity: None,
        }
    }

    pub(super) fn record_refusal(&mut self) -> usize {
        let live = self.active.len();
        let capacity = self.learned_capacity.map_or(live, |known| known.min(live));
        self.learned_capacity = Some(capacity);
        capacity
    }

    /// Drop the connection after a transport failure. Its server-side statements go with it, so
    /// the live set is cleared. Returns how many handles were live.
    pub(super) fn break_connection(&mut self, reason: String) -> usize {
        self.conn = None;
        self.broken = Some(reason);
        let live = self.active.len();
        self.active.clear();
        live
    }

    pub(super) fn broken_error(&self) -> Option<CrudMiddlewareError> {
        self.broken.as_ref().map(|reason| {
            CrudMiddlewareError::TransportError(format!(
                "session broken by an earlier failure: {reason}"
            ))
        })
    }
}
