//! Adaptive prepared-statement execution for reusable CRUD statements.
//!
//! Statements are built per table from a [`Session`], bound and executed repeatedly. The first
//! execution of a shape runs one-off; a second execution of the unchanged shape prepares it on the
//! server and later executions reuse the handle. Structural changes (criteria, sort, projection,
//! grouping, operations, rows, the first use of a limit) release the handle and start over.
//!
//! ```no_run
//! # use crud_middleware::prelude::*;
//! # async fn demo(session: Session) -> Result<(), CrudMiddlewareError> {
//! let docs = session.table("docs")?;
//! let mut find = docs.find("owner = :owner")?;
//! for owner in ["ann", "bob", "cid"] {
//!     let rows = find.bind("owner", owner).execute().await?;
//!     println!("{owner}: {}", rows.results.len());
//! }
//! session.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod binder;
pub mod config;
pub mod error;
pub(crate) mod executor;
pub mod handle;
pub mod memory;
pub mod placeholders;
pub mod planner;
pub mod prelude;
pub mod protocol;
pub mod render;
pub mod results;
pub mod session;
pub mod shape;
pub mod statement;
pub mod types;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "test-utils-postgres")]
pub mod test_utils;

pub use config::{PrepareMode, SessionOptions, SessionOptionsBuilder};
pub use error::CrudMiddlewareError;
pub use handle::{HandleId, PreparedHandle};
pub use protocol::{ProtocolConnection, ShapeDescriptor};
pub use results::{CustomDbRow, ResultSet};
pub use session::{PrepareOutcome, Session, SessionStats};
pub use statement::{
    FindStatement, InsertStatement, ModifyStatement, PreparableStatement, RemoveStatement,
    StatementStats, Table,
};
pub use types::RowValues;

#[cfg(feature = "postgres")]
pub use postgres::{PostgresOptions, PostgresProtocol};
