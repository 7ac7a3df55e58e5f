use std::collections::HashMap;
use std::error::Error as _;

use async_trait::async_trait;
use tokio_postgres::{Client, Statement};

use super::params::Params;
use super::query::{build_result_set_from_rows, build_result_set_from_statement};
use crate::error::CrudMiddlewareError;
use crate::handle::HandleId;
use crate::protocol::{ProtocolConnection, ShapeDescriptor};
use crate::results::ResultSet;
use crate::types::RowValues;

/// Map a driver error onto the crate taxonomy: database errors are execution errors, a closed
/// connection or an I/O failure is a transport error.
fn classify(context: &str, err: &tokio_postgres::Error) -> CrudMiddlewareError {
    if err.as_db_error().is_some() {
        return CrudMiddlewareError::ExecutionError(format!("postgres {context} error: {err}"));
    }
    let io_failure = err
        .source()
        .is_some_and(|source| source.downcast_ref::<std::io::Error>().is_some());
    if err.is_closed() || io_failure {
        CrudMiddlewareError::TransportError(format!("postgres {context} error: {err}"))
    } else {
        CrudMiddlewareError::ExecutionError(format!("postgres {context} error: {err}"))
    }
}

fn affected(rows: u64) -> Result<ResultSet, CrudMiddlewareError> {
    usize::try_from(rows).map(ResultSet::affected).map_err(|e| {
        CrudMiddlewareError::ExecutionError(format!(
            "postgres affected rows conversion error: {e}"
        ))
    })
}

struct PreparedEntry {
    statement: Statement,
    returns_rows: bool,
}

/// [`ProtocolConnection`] over one `tokio_postgres` client.
///
/// Prepared statements are named server-side statements owned by this adapter; dropping a
/// `Statement` makes the driver send `Close` for it, which is how handles are deallocated.
pub struct PostgresProtocol {
    client: Client,
    statements: HashMap<HandleId, PreparedEntry>,
    next_id: u32,
}

impl PostgresProtocol {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            client,
            statements: HashMap::new(),
            next_id: 0,
        }
    }

    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl ProtocolConnection for PostgresProtocol {
    async fn prepare(&mut self, shape: &ShapeDescriptor) -> Result<HandleId, CrudMiddlewareError> {
        let next_id = self.next_id.checked_add(1).ok_or_else(|| {
            CrudMiddlewareError::ExecutionError("no prepared statement ids left".into())
        })?;
        let statement = self
            .client
            .prepare(&shape.sql)
            .await
            .map_err(|e| classify("prepare", &e))?;
        self.next_id = next_id;
        let id = HandleId(next_id);
        self.statements.insert(
            id,
            PreparedEntry {
                statement,
                returns_rows: shape.returns_rows,
            },
        );
        Ok(id)
    }

    async fn execute_prepared(
        &mut self,
        id: HandleId,
        params: &[RowValues],
    ) -> Result<ResultSet, CrudMiddlewareError> {
        let entry = self.statements.get(&id).ok_or_else(|| {
            CrudMiddlewareError::ExecutionError(format!("unknown prepared statement {id}"))
        })?;
        let converted = Params::convert(params);
        if entry.returns_rows {
            let rows = self
                .client
                .query(&entry.statement, converted.as_refs())
                .await
                .map_err(|e| classify("select", &e))?;
            build_result_set_from_statement(&entry.statement, &rows)
        } else {
            let rows = self
                .client
                .execute(&entry.statement, converted.as_refs())
                .await
                .map_err(|e| classify("execute", &e))?;
            affected(rows)
        }
    }

    async fn execute_one_off(
        &mut self,
        shape: &ShapeDescriptor,
        params: &[RowValues],
    ) -> Result<ResultSet, CrudMiddlewareError> {
        let converted = Params::convert(params);
        if shape.returns_rows {
            let rows = self
                .client
                .query(shape.sql.as_ref(), converted.as_refs())
                .await
                .map_err(|e| classify("select", &e))?;
            build_result_set_from_rows(&rows)
        } else {
            let rows = self
                .client
                .execute(shape.sql.as_ref(), converted.as_refs())
                .await
                .map_err(|e| classify("execute", &e))?;
            affected(rows)
        }
    }

    async fn deallocate(&mut self, id: HandleId) -> Result<(), CrudMiddlewareError> {
        self.statements.remove(&id);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), CrudMiddlewareError> {
        self.statements.clear();
        Ok(())
    }
}
