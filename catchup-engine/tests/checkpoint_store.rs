use catchup_domain::checkpoint::{CheckpointStore, checkpoint_stream_name};
use catchup_domain::error::DomainResult;
use catchup_domain::log::{EventFilter, EventLog, ReadOptions};
use catchup_domain::position::Position;
use catchup_domain::subscription::SubscriptionId;
use catchup_engine::checkpoint::{EventLogCheckpointStore, InMemoryCheckpointStore};
use catchup_engine::log::InMemoryEventLog;
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;

async fn last_write_wins(store: &dyn CheckpointStore) -> DomainResult<()> {
    let orders: SubscriptionId = "orders".into();
    let users: SubscriptionId = "users".into();

    store.store(&orders, Position::new(5)).await?;
    store.store(&orders, Position::new(3)).await?;
    assert_eq!(store.load(&orders).await?, Some(Position::new(3)));

    store.store(&orders, Position::new(9)).await?;
    store.store(&orders, Position::new(9)).await?;
    assert_eq!(store.load(&orders).await?, Some(Position::new(9)));

    store.store(&users, Position::new(1)).await?;
    assert_eq!(store.load(&users).await?, Some(Position::new(1)));
    assert_eq!(store.load(&orders).await?, Some(Position::new(9)));
    assert_eq!(store.load(&"carts".into()).await?, None);
    Ok(())
}

#[tokio::test]
async fn in_memory_store_is_last_write_wins() -> DomainResult<()> {
    last_write_wins(&InMemoryCheckpointStore::new()).await
}

#[tokio::test]
async fn log_backed_store_is_last_write_wins() -> DomainResult<()> {
    let log = Arc::new(InMemoryEventLog::default());
    last_write_wins(&EventLogCheckpointStore::new(log.clone())).await?;

    for id in ["orders", "users"] {
        let stream = checkpoint_stream_name(&id.into());
        assert_eq!(log.read_stream(&stream).len(), 1);
    }
    Ok(())
}

#[tokio::test]
async fn checkpoint_streams_are_hidden_from_default_filter() -> DomainResult<()> {
    let log = Arc::new(InMemoryEventLog::default());
    let store = EventLogCheckpointStore::new(log.clone());
    store.store(&"orders".into(), Position::new(4)).await?;

    let mut hidden = log.read_live(None, &ReadOptions::default()).await?;
    let none = tokio::time::timeout(Duration::from_millis(50), hidden.next()).await;
    assert!(none.is_err());

    let options = ReadOptions::builder().filter(EventFilter::all()).build();
    let mut visible = log.read_live(None, &options).await?;
    let record = visible.next().await.expect("checkpoint record")?;
    assert_eq!(record.stream_id(), "checkpoint_orders");
    Ok(())
}
