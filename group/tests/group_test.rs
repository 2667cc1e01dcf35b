// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! Group tests under concurrent access.

use actor::{
    Error as ActorError, Handler, Node, ServerConfig, SyncPool, trace,
};
use group::{Error, Group};
use store::{
    backend::MemoryBackend, durable::DurableStore, memory::MemoryStore,
};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use std::{sync::Arc, time::Duration};

// Defines the order state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Order {
    items: Vec<String>,
}

fn add_item(order: &mut Order, item: String) -> Result<usize, ActorError> {
    order.items.push(item);
    Ok(order.items.len())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_access_spawns_one_server() {
    let group = Arc::new(Group::new(
        "order",
        MemoryStore::<u64, Order>::new(),
    ));

    let mut tasks = Vec::new();
    for index in 0..32 {
        let group = group.clone();
        tasks.push(tokio::spawn(async move {
            group.call(&1, format!("item-{}", index), add_item).await
        }));
    }
    let mut counts = Vec::new();
    for task in tasks {
        counts.push(task.await.unwrap().unwrap());
    }

    // Each call observed a distinct length, so all went through one state.
    counts.sort();
    assert_eq!(counts, (1..=32).collect::<Vec<_>>());
    assert_eq!(group.len(), 1);
    assert_eq!(group.list().unwrap()[0].items.len(), 32);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_servers_share_the_group_pool() {
    let pool = Arc::new(SyncPool::<Node<Handler<Order>>>::new());
    let config = ServerConfig::new()
        .with_deadlock_timeout(Duration::from_secs(5))
        .with_message_pool(pool.clone());
    let group = Arc::new(Group::with_config(
        "order",
        MemoryStore::<u64, Order>::new(),
        config,
    ));

    let mut tasks = Vec::new();
    for id in 0..10u64 {
        let group = group.clone();
        tasks.push(tokio::spawn(async move {
            for item in 0..10 {
                group.cast(&id, format!("{}", item), |order: &mut Order, item| {
                    order.items.push(item);
                    Ok(())
                })?;
            }
            group.call(&id, "last".to_owned(), add_item).await
        }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), 11);
    }

    group.stop(&CancellationToken::new()).await.unwrap();
    let stats = pool.stats();
    assert_eq!(stats.acquired, 10 * 12);
    assert_eq!(stats.outstanding(), 0);
}

#[tokio::test]
async fn test_group_over_durable_store() {
    let backend = Arc::new(MemoryBackend::new("orders"));
    let group = Group::new(
        "order",
        DurableStore::<String, Order, _>::new(backend.clone()),
    );
    let id = "cart-1".to_owned();
    group.begin(id.clone(), Order::default()).unwrap();
    group.call(&id, "book".to_owned(), add_item).await.unwrap();
    group.call(&id, "pen".to_owned(), add_item).await.unwrap();
    group.stop(&CancellationToken::new()).await.unwrap();

    // A new group over the same backend sees the stored order.
    let group = Group::new(
        "order",
        DurableStore::<String, Order, _>::new(backend),
    );
    assert!(group.has(&id).unwrap());
    assert!(matches!(
        group.begin(id.clone(), Order::default()),
        Err(Error::AlreadyExists { .. })
    ));
    assert_eq!(group.call(&id, "ink".to_owned(), add_item).await.unwrap(), 3);
    assert_eq!(
        group.list().unwrap(),
        vec![Order {
            items: vec!["book".to_owned(), "pen".to_owned(), "ink".to_owned()]
        }]
    );
}

#[tokio::test]
async fn test_failed_server_stays_dead() {
    let group = Group::new("order", MemoryStore::<u64, Order>::new());
    let error = group
        .call(&5, (), |_: &mut Order, _| -> Result<(), ActorError> {
            Err(ActorError::Functional("out of stock".to_owned()))
        })
        .await
        .unwrap_err();
    assert_eq!(
        error,
        Error::Actor(ActorError::Functional("out of stock".to_owned()))
    );

    let server = group.server(&5).unwrap();
    server.terminated().await;
    assert!(matches!(
        group.call(&5, "late".to_owned(), add_item).await,
        Err(Error::Actor(ActorError::DeadActor { .. }))
    ));

    // Stop skips the terminated server.
    group.stop(&CancellationToken::new()).await.unwrap();
}

async fn wait_for_exit(marker: &str) {
    tokio::time::timeout(Duration::from_secs(1), async {
        while trace::find(&trace::dump(), marker).is_some() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_stopped_and_dropped_groups_release_workers() {
    let group = Group::new("basket", MemoryStore::<u64, Order>::new());
    group.call(&1, "apple".to_owned(), add_item).await.unwrap();
    group.stop(&CancellationToken::new()).await.unwrap();
    // The stopped server stays registered but its worker is gone.
    assert_eq!(group.len(), 1);
    assert!(trace::find(&trace::dump(), &trace::marker("basket", 1)).is_none());

    let group = Group::new("crate", MemoryStore::<u64, Order>::new());
    for id in 0..3u64 {
        group.call(&id, "pear".to_owned(), add_item).await.unwrap();
    }
    for id in 0..3u64 {
        let marker = trace::marker("crate", id);
        assert!(trace::find(&trace::dump(), &marker).is_some());
    }
    drop(group);
    for id in 0..3u64 {
        wait_for_exit(&trace::marker("crate", id)).await;
    }
}
