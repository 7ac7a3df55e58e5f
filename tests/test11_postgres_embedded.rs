#![cfg(feature = "test-utils-postgres")]

use crud_middleware::prelude::*;
use crud_middleware::test_utils::{setup_postgres_embedded, stop_postgres_embedded};
use tokio_postgres::NoTls;

/// Prepared statements currently allocated on the session's connection. The counting query runs
/// one-off through a fresh statement, so it adds the same constant to every reading.
async fn server_prepared_count(session: &Session) -> Result<i64, CrudMiddlewareError> {
    let mut count = session.table("pg_prepared_statements")?.find_all();
    count.fields(["count(*) AS n"])?;
    let rs = count.execute().await?;
    rs.results
        .first()
        .and_then(|row| row.get("n"))
        .and_then(RowValues::as_int)
        .copied()
        .ok_or_else(|| CrudMiddlewareError::Other("no count returned".into()))
}

#[test]
fn test11_postgres_statement_lifecycle() -> Result<(), Box<dyn std::error::Error>> {
    let pg = setup_postgres_embedded("crud_test")?;
    let options = pg.options.clone();
    let database_url = pg.database_url.clone();

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        // DDL stays outside the statement builders.
        let (client, connection) = tokio_postgres::connect(&database_url, NoTls).await?;
        let driver = tokio::spawn(connection);
        client
            .batch_execute("CREATE TABLE docs (_id BIGINT PRIMARY KEY, owner TEXT, ord BIGINT);")
            .await?;
        drop(client);
        let _ = driver.await;

        let session = options.connect().await?;
        let docs = session.table("docs")?;
        let baseline = server_prepared_count(&session).await?;

        let mut insert = docs.insert(["_id", "owner", "ord"])?;
        insert
            .values([RowValues::Int(1), RowValues::from("ann"), RowValues::Int(1)])?
            .values([RowValues::Int(2), RowValues::from("ann"), RowValues::Int(2)])?
            .values([RowValues::Int(3), RowValues::from("bob"), RowValues::Int(3)])?;
        assert_eq!(insert.execute().await?.rows_affected, 3);

        let mut find = docs.find("owner = :owner")?;
        find.sort(["_id"])?;
        let rows = find.bind("owner", "ann").execute().await?;
        assert_eq!(rows.results.len(), 2);
        let rows = find.bind("owner", "bob").execute().await?;
        assert_eq!(rows.results.len(), 1);
        assert!(find.stats().is_prepared);
        assert_eq!(server_prepared_count(&session).await?, baseline + 1);

        let rows = find.bind("owner", "ann").limit(1).execute().await?;
        assert_eq!(rows.results.len(), 1);
        assert_eq!(rows.results[0].get("_id").and_then(RowValues::as_int), Some(&1));
        let rows = find.offset(1).execute().await?;
        assert_eq!(rows.results[0].get("_id").and_then(RowValues::as_int), Some(&2));
        assert_eq!(find.stats().exec_count_under_current_handle, 2);
        assert_eq!(server_prepared_count(&session).await?, baseline + 1);

        let mut modify = docs.modify("owner = :owner")?;
        modify.set("ord", "ord * :factor")?.bind("factor", 10);
        assert_eq!(modify.bind("owner", "ann").execute().await?.rows_affected, 2);
        assert_eq!(modify.bind("owner", "bob").execute().await?.rows_affected, 1);
        assert_eq!(server_prepared_count(&session).await?, baseline + 2);

        let mut remove = docs.remove("ord >= :min")?;
        remove.sort(["_id"])?.limit(1).bind("min", 10);
        assert_eq!(remove.execute().await?.rows_affected, 1);
        assert_eq!(remove.execute().await?.rows_affected, 1);
        assert!(remove.stats().is_prepared);

        let missing = session.table("missing_docs")?.find_all().execute().await;
        assert!(matches!(missing, Err(CrudMiddlewareError::ExecutionError(_))));

        find.deallocate().await;
        drop(modify);
        drop(remove);
        session.release_dropped().await?;
        assert_eq!(server_prepared_count(&session).await?, baseline);

        session.close().await?;
        assert!(matches!(
            find.execute().await,
            Err(CrudMiddlewareError::SessionClosed)
        ));
        Ok::<_, Box<dyn std::error::Error>>(())
    })?;

    stop_postgres_embedded(pg);
    Ok(())
}
