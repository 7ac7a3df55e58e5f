//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types and functions
//! to make it easier to get started with the library.

pub use crate::config::{PrepareMode, SessionOptions, SessionOptionsBuilder};
pub use crate::error::CrudMiddlewareError;
pub use crate::handle::HandleId;
pub use crate::protocol::{ProtocolConnection, ShapeDescriptor};
pub use crate::results::{CustomDbRow, ResultSet};
pub use crate::session::{Session, SessionStats};
pub use crate::statement::{
    FindStatement, InsertStatement, ModifyStatement, RemoveStatement, StatementStats, Table,
};
pub use crate::types::RowValues;

#[cfg(feature = "postgres")]
pub use crate::postgres::PostgresOptions;
