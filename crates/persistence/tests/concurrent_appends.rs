//! Appends racing on one instance must never lose a turn.

use std::sync::Arc;

use advisor_core::{ChatHistoryStore, ChatTurn};
use advisor_persistence::InMemoryChatHistory;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_appends_are_serialized() {
    let store = Arc::new(InMemoryChatHistory::new(100));
    store
        .append("u1", Some("busy"), ChatTurn::user("start"))
        .await
        .unwrap();

    let tasks = (0..40).map(|i| {
        let store = store.clone();
        tokio::spawn(async move {
            store
                .append("u1", Some("busy"), ChatTurn::user(format!("message {}", i)))
                .await
        })
    });
    for result in futures::future::join_all(tasks).await {
        assert_eq!(result.unwrap().unwrap(), "busy");
    }

    let instance = store.get_instance("busy").await.unwrap().unwrap();
    assert_eq!(instance.turns.len(), 41);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_messages_without_instance_open_separate_instances() {
    let store = Arc::new(InMemoryChatHistory::default());

    let tasks = (0..10).map(|i| {
        let store = store.clone();
        tokio::spawn(async move {
            store
                .append("u1", None, ChatTurn::user(format!("q{}", i)))
                .await
        })
    });
    let mut ids: Vec<String> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap().unwrap())
        .collect();
    ids.sort();
    ids.dedup();

    assert_eq!(ids.len(), 10);
    assert_eq!(store.len(), 10);
}
