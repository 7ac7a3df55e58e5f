// Postgres protocol adapter, split into:
// - config: connection options and session construction
// - params: binding `RowValues` to Postgres parameters
// - query: converting Postgres rows into result sets
// - protocol: the prepare/execute/deallocate surface over `tokio_postgres`

pub mod config;
pub mod params;
pub mod protocol;
pub mod query;

pub use config::PostgresOptions;
pub use params::Params;
pub use protocol::PostgresProtocol;
pub use query::{build_result_set_from_rows, build_result_set_from_statement};
