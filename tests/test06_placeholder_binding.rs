mod common;

use crud_middleware::memory::MemoryServer;
use crud_middleware::prelude::*;

#[tokio::test]
async fn test06_name_list_and_map_bind_identically() -> Result<(), CrudMiddlewareError> {
    let server = MemoryServer::new();
    let (session, _) = common::open_default(&server);
    let mut find = session.table("docs")?.find("owner = :owner AND ord > :min")?;
    let expected = vec![RowValues::Text("ann".into()), RowValues::Int(3)];

    find.bind("owner", "ann").bind("min", 3).execute().await?;
    assert_eq!(common::last_params(&server), expected);

    find.clear_bindings()
        .bind_list([RowValues::from("ann"), RowValues::from(3)])
        .execute()
        .await?;
    assert_eq!(common::last_params(&server), expected);

    find.clear_bindings()
        .bind_map([("min", RowValues::from(3)), ("owner", RowValues::from("ann"))])
        .execute()
        .await?;
    assert_eq!(common::last_params(&server), expected);

    // A name binding shadows a position binding of the same parameter.
    find.bind_at(1, 4).execute().await?;
    assert_eq!(common::last_params(&server), expected);
    assert_eq!(common::prepares(&server), 1);
    Ok(())
}

#[tokio::test]
async fn test06_positional_and_repeated_placeholders() -> Result<(), CrudMiddlewareError> {
    let server = MemoryServer::new();
    let (session, _) = common::open_default(&server);
    let docs = session.table("docs")?;

    let mut positional = docs.find("owner = ? AND ord > ?")?;
    positional.bind_list([RowValues::from("bob"), RowValues::from(1)]);
    positional.execute().await?;
    assert_eq!(
        common::last_params(&server),
        vec![RowValues::Text("bob".into()), RowValues::Int(1)]
    );
    positional.bind_at(0, "dee").execute().await?;
    assert_eq!(
        common::last_params(&server),
        vec![RowValues::Text("dee".into()), RowValues::Int(1)]
    );

    let mut repeated = docs.find("owner = :who OR note = :who OR kind::text = ':who'")?;
    assert_eq!(
        repeated.sql()?,
        "SELECT * FROM docs WHERE owner = $1 OR note = $1 OR kind::text = ':who'"
    );
    repeated.bind("who", "cid").execute().await?;
    assert_eq!(
        common::last_params(&server),
        vec![RowValues::Text("cid".into())]
    );
    Ok(())
}

#[tokio::test]
async fn test06_missing_binding_fails_before_any_round_trip() -> Result<(), CrudMiddlewareError> {
    let server = MemoryServer::new();
    let (session, _) = common::open_default(&server);
    let mut find = session.table("docs")?.find("owner = :owner AND ord > :min")?;
    find.bind("owner", "ann");

    let err = find.execute().await.unwrap_err();
    assert!(matches!(err, CrudMiddlewareError::MissingBinding(_)));
    assert!(err.to_string().contains(":min"));
    assert!(server.calls().is_empty());

    // The failed attempt consumed nothing; the next run is still a first run.
    find.bind("min", 0).execute().await?;
    assert_eq!(find.stats().state, "not_prepared");
    assert_eq!(session.stats().await.executes, 1);
    Ok(())
}

#[tokio::test]
async fn test06_malformed_input_is_rejected_up_front() -> Result<(), CrudMiddlewareError> {
    let server = MemoryServer::new();
    let (session, _) = common::open_default(&server);
    let docs = session.table("docs")?;

    assert!(docs.find("_id = $1").unwrap_err().is_validation());
    assert!(docs.find("   ").unwrap_err().is_validation());
    assert!(docs.find("owner = 'unterminated").unwrap_err().is_validation());
    assert!(docs.remove("").unwrap_err().is_validation());
    assert!(session.table("docs; drop table docs").unwrap_err().is_validation());
    assert!(docs.insert(Vec::<String>::new()).unwrap_err().is_validation());
    assert!(docs.insert(["_id"])?.values([1, 2]).unwrap_err().is_validation());

    let mut modify = docs.modify("_id = 1")?;
    assert!(modify.execute().await.unwrap_err().is_validation());
    assert!(modify.set("bad column", "1").unwrap_err().is_validation());

    let mut insert = docs.insert(["_id"])?;
    assert!(insert.execute().await.unwrap_err().is_validation());

    assert!(server.calls().is_empty());
    Ok(())
}
