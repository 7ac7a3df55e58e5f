use postgresql_embedded::PostgreSQL;

use super::super::SHARED_RUNTIME;
use crate::postgres::PostgresOptions;

/// Represents a running embedded `PostgreSQL` instance.
pub struct EmbeddedPostgres {
    pub postgresql: PostgreSQL,
    pub port: u16,
    pub database_url: String,
    /// Connection options with the instance's actual host, port and credentials
    pub options: PostgresOptions,
}

/// Set up an embedded `PostgreSQL` instance and create `dbname` on it.
///
/// Runs on a shared runtime, so call it from a plain `#[test]`, not from inside another runtime.
///
/// # Errors
/// Returns an error if the embedded server cannot be set up or started, if the database cannot
/// be created, or if the post-start connectivity check fails.
pub fn setup_postgres_embedded(
    dbname: &str,
) -> Result<EmbeddedPostgres, Box<dyn std::error::Error>> {
    SHARED_RUNTIME.block_on(async {
        let mut postgresql = PostgreSQL::default();

        // Bundled binaries, so no download
        postgresql.setup().await?;
        postgresql.start().await?;
        postgresql.create_database(dbname).await?;

        let settings = postgresql.settings();
        let port = settings.port;
        let host = settings.host.clone();
        let user = settings.username.clone();
        let password = settings.password.clone();
        let database_url = format!("postgres://{user}:{password}@{host}:{port}/{dbname}");

        let options = PostgresOptions {
            dbname: Some(dbname.to_string()),
            host: Some(host),
            port: Some(port),
            user: Some(user),
            password: Some(password),
            label: Some(format!("embedded:{dbname}")),
            ..PostgresOptions::default()
        };

        // Quick connection test
        let session = options.connect().await?;
        session.close().await?;
        println!("PostgreSQL started on port {port}");

        Ok(EmbeddedPostgres {
            postgresql,
            port,
            database_url,
            options,
        })
    })
}

/// Stop a previously started embedded `PostgreSQL` instance.
pub fn stop_postgres_embedded(postgres: EmbeddedPostgres) {
    let EmbeddedPostgres { postgresql, .. } = postgres;
    SHARED_RUNTIME.block_on(async move {
        let _ = postgresql.stop().await;
    });
}
