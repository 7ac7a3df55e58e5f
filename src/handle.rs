use std::fmt;

/// Server-assigned prepared-statement id, unique within one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(pub u32);

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A live prepared statement owned by one statement builder.
///
/// Carries the id of the session that allocated it so a handle can never be executed or
/// released through a different connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedHandle {
    id: HandleId,
    session_id: u64,
    executions: u64,
}

impl PreparedHandle {
    pub(crate) fn new(id: HandleId, session_id: u64) -> Self {
        Self {
            id,
            session_id,
            executions: 0,
        }
    }

    #[must_use]
    pub fn id(&self) -> HandleId {
        self.id
    }

    #[must_use]
    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// Executions issued through this handle since it was prepared.
    #[must_use]
    pub fn executions(&self) -> u64 {
        self.executions
    }

    pub(crate) fn record_execution(&mut self) {
        self.executions += 1;
    }
}
