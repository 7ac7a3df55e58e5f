mod common;

use crud_middleware::memory::MemoryServer;
use crud_middleware::prelude::*;

#[tokio::test]
async fn test04_refused_prepare_falls_back_and_sticks() -> Result<(), CrudMiddlewareError> {
    let server = MemoryServer::with_capacity(1);
    let (session, _) = common::open_default(&server);
    let docs = session.table("docs")?;
    let mut a = docs.find("owner = 'ann'")?;
    let mut b = docs.find("owner = 'bob'")?;

    a.execute().await?;
    a.execute().await?;
    assert!(a.stats().is_prepared);

    b.execute().await?;
    let fallback = b.execute().await;
    assert!(fallback.is_ok(), "a refused prepare must not surface: {fallback:?}");
    assert_eq!(b.stats().state, "failed_for_shape");
    assert_eq!(session.stats().await.prepare_attempts, 2);
    assert_eq!(session.stats().await.learned_capacity, Some(1));

    // Capacity frees up, but the refusal holds until the shape changes.
    a.deallocate().await;
    for _ in 0..3 {
        b.execute().await?;
    }
    assert_eq!(session.stats().await.prepare_attempts, 2);
    assert!(!b.stats().is_prepared);

    b.sort(["_id"])?.execute().await?;
    assert_eq!(b.stats().state, "not_prepared");
    b.execute().await?;
    assert!(b.stats().is_prepared);
    assert_eq!(session.stats().await.prepare_attempts, 3);
    assert_eq!(server.live_prepared_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test04_unpreparable_shapes_still_execute() -> Result<(), CrudMiddlewareError> {
    let server = MemoryServer::new();
    server.reject_prepares_containing("pg_sleep");
    let (session, _) = common::open_default(&server);
    let mut find = session.table("docs")?.find("pg_sleep(0) IS NOT NULL")?;

    for _ in 0..4 {
        find.execute().await?;
    }
    assert_eq!(common::prepares(&server), 1);
    assert_eq!(common::one_offs(&server), 4);
    assert_eq!(session.stats().await.active_handle_count, 0);
    Ok(())
}

#[tokio::test]
async fn test04_learned_capacity_tracks_the_smallest_refusal_point() -> Result<(), CrudMiddlewareError> {
    let server = MemoryServer::with_capacity(2);
    let (session, _) = common::open_default(&server);
    let docs = session.table("docs")?;

    let mut held = Vec::new();
    for owner in ["ann", "bob", "cid"] {
        let mut find = docs.find(&format!("owner = '{owner}'"))?;
        find.execute().await?;
        find.execute().await?;
        held.push(find);
    }
    assert_eq!(session.stats().await.learned_capacity, Some(2));

    server.fail_next_prepares(1);
    held.truncate(1);
    session.release_dropped().await?;
    let mut late = docs.find("owner = 'dee'")?;
    late.execute().await?;
    late.execute().await?;

    let stats = session.stats().await;
    assert_eq!(stats.learned_capacity, Some(1));
    assert_eq!(stats.active_handle_count, 1);
    assert_eq!(late.stats().state, "failed_for_shape");
    Ok(())
}
