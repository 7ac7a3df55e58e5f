mod common;

use crud_middleware::memory::{MemoryServer, ServerCall};
use crud_middleware::prelude::*;

#[tokio::test]
async fn test03_first_limit_reprepares_then_limits_rebind() -> Result<(), CrudMiddlewareError> {
    let server = MemoryServer::new();
    let (session, conn) = common::open_default(&server);
    let mut find = session.table("docs")?.find("owner = :owner")?;
    find.bind("owner", "ann");

    find.execute().await?;
    find.execute().await?;
    let unlimited = find.stats().handle_id.expect("prepared");

    server.clear_calls();
    find.limit(1).execute().await?;
    let limited = find.stats().handle_id.expect("re-prepared with a limit");
    assert_ne!(unlimited, limited);
    assert_eq!(find.stats().exec_count_under_current_handle, 1);
    assert_eq!(
        server.calls(),
        vec![
            ServerCall::Deallocate { conn, id: unlimited },
            ServerCall::Prepare {
                conn,
                sql: "SELECT * FROM docs WHERE owner = $1 LIMIT $2 OFFSET $3".into(),
            },
            ServerCall::ExecutePrepared {
                conn,
                id: limited,
                params: vec![RowValues::Text("ann".into()), RowValues::Int(1), RowValues::Int(0)],
            },
        ]
    );

    server.clear_calls();
    find.limit(2).execute().await?;
    find.offset(5).execute().await?;
    assert_eq!(common::prepares(&server), 0);
    assert_eq!(common::one_offs(&server), 0);
    assert_eq!(find.stats().handle_id, Some(limited));
    assert_eq!(find.stats().exec_count_under_current_handle, 3);
    assert_eq!(
        common::last_params(&server),
        vec![RowValues::Text("ann".into()), RowValues::Int(2), RowValues::Int(5)]
    );
    Ok(())
}

#[tokio::test]
async fn test03_limit_before_first_prepare_is_a_plain_shape_change() -> Result<(), CrudMiddlewareError> {
    let server = MemoryServer::new();
    let (session, _) = common::open_default(&server);
    let mut find = session.table("docs")?.find_all();

    find.execute().await?;
    find.limit(10).execute().await?;
    assert_eq!(find.stats().state, "not_prepared");
    assert_eq!(common::prepares(&server), 0);

    find.execute().await?;
    assert!(find.stats().is_prepared);
    Ok(())
}

#[tokio::test]
async fn test03_limited_modify_and_remove_pick_rows_by_subquery() -> Result<(), CrudMiddlewareError> {
    let server = MemoryServer::new();
    let (session, _) = common::open_default(&server);
    let docs = session.table("docs")?;

    let mut modify = docs.modify("owner = :owner")?;
    modify.set("ord", ":ord")?.sort(["_id"])?.limit(1);
    assert_eq!(
        modify.sql()?,
        "UPDATE docs SET ord = $1 WHERE ctid IN (SELECT ctid FROM docs WHERE owner = $2 ORDER BY _id LIMIT $3)"
    );
    modify.bind_map([("owner", RowValues::from("ann")), ("ord", RowValues::from(7))]);
    modify.execute().await?;
    assert_eq!(
        common::last_params(&server),
        vec![RowValues::Int(7), RowValues::Text("ann".into()), RowValues::Int(1)]
    );

    let mut remove = docs.remove("owner = :owner")?;
    remove.limit(3).bind("owner", "bob");
    remove.execute().await?;
    assert_eq!(
        remove.sql()?,
        "DELETE FROM docs WHERE ctid IN (SELECT ctid FROM docs WHERE owner = $1 LIMIT $2)"
    );
    Ok(())
}
