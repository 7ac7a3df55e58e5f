use std::sync::Arc;

use async_trait::async_trait;

use crate::error::CrudMiddlewareError;
use crate::handle::HandleId;
use crate::results::ResultSet;
use crate::types::RowValues;

/// Rendered statement text handed to the protocol layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeDescriptor {
    pub sql: Arc<str>,
    /// Whether execution yields rows (finds) or an affected-row count (mutations).
    pub returns_rows: bool,
}

impl ShapeDescriptor {
    #[must_use]
    pub fn new(sql: impl Into<Arc<str>>, returns_rows: bool) -> Self {
        Self {
            sql: sql.into(),
            returns_rows,
        }
    }
}

/// One connection's prepare/execute/deallocate surface.
///
/// Implementations return `TransportError` when the connection itself failed; any other error
/// from `prepare` is treated by the session as a refusal to prepare.
#[async_trait]
pub trait ProtocolConnection: Send {
    async fn prepare(&mut self, shape: &ShapeDescriptor) -> Result<HandleId, CrudMiddlewareError>;

    async fn execute_prepared(
        &mut self,
        id: HandleId,
        params: &[RowValues],
    ) -> Result<ResultSet, CrudMiddlewareError>;

    async fn execute_one_off(
        &mut self,
        shape: &ShapeDescriptor,
        params: &[RowValues],
    ) -> Result<ResultSet, CrudMiddlewareError>;

    /// Release a prepared statement. Unknown ids are not an error.
    async fn deallocate(&mut self, id: HandleId) -> Result<(), CrudMiddlewareError>;

    async fn close(&mut self) -> Result<(), CrudMiddlewareError> {
        Ok(())
    }
}
