// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

// Integrations tests for the server runtime

use actor::{Error, Server, ServerConfig, ShutdownReason, StateFn, StateMutator};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

// Defines the counter state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Counter {
    pub current: u64,
}

// Defines the log state, used to check ordering
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Journal {
    pub entries: Vec<usize>,
}

fn add(counter: &mut Counter, amount: u64) -> Result<u64, Error> {
    counter.current += amount;
    Ok(counter.current)
}

fn increment(counter: &mut Counter, amount: u64) -> Result<(), Error> {
    counter.current += amount;
    Ok(())
}

// Mutator over a shared mutex
fn shared<S: Send + 'static>(state: Arc<Mutex<S>>) -> impl StateMutator<S> {
    move |apply: StateFn<'_, S>| {
        let mut guard = state.lock();
        apply(&mut *guard)
    }
}

fn no_finalizer<S>(_: &S, _: ShutdownReason) -> Result<(), Error> {
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_casts_are_all_applied() {
    let state = Arc::new(Mutex::new(Counter::default()));
    let server = Server::spawn(
        "counter",
        "concurrent".to_owned(),
        shared(state.clone()),
        ServerConfig::default(),
    );

    let mut tasks = Vec::new();
    for _ in 0..100 {
        let server = server.clone();
        tasks.push(tokio::spawn(async move { server.cast(1, increment) }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(server.call(0, add).await.unwrap(), 100);
    assert_eq!(server.get().await.unwrap().current, 100);
}

#[tokio::test]
async fn test_messages_from_one_sender_keep_their_order() {
    let state = Arc::new(Mutex::new(Journal::default()));
    let server = Server::spawn(
        "journal",
        1u64,
        shared(state.clone()),
        ServerConfig::default(),
    );

    for entry in 0..500 {
        if entry % 10 == 0 {
            server
                .call(entry, |journal: &mut Journal, entry| {
                    journal.entries.push(entry);
                    Ok(())
                })
                .await
                .unwrap();
        } else {
            server
                .cast(entry, |journal: &mut Journal, entry| {
                    journal.entries.push(entry);
                    Ok(())
                })
                .unwrap();
        }
    }

    let journal = server.get().await.unwrap();
    assert_eq!(journal.entries, (0..500).collect::<Vec<_>>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_handlers_never_overlap() {
    let inside = Arc::new(AtomicBool::new(false));
    let overlaps = Arc::new(AtomicUsize::new(0));
    let state = Arc::new(Mutex::new(Counter::default()));

    let (flag, count, storage) = (inside.clone(), overlaps.clone(), state.clone());
    let mutator = move |apply: StateFn<'_, Counter>| {
        if flag.swap(true, Ordering::SeqCst) {
            count.fetch_add(1, Ordering::SeqCst);
        }
        let applied = apply(&mut *storage.lock());
        flag.store(false, Ordering::SeqCst);
        applied
    };
    let server =
        Server::spawn("counter", 7u32, mutator, ServerConfig::default());

    let mut tasks = Vec::new();
    for task in 0..16 {
        let server = server.clone();
        tasks.push(tokio::spawn(async move {
            for round in 0..50 {
                if (task + round) % 2 == 0 {
                    server.call(1, add).await.map(|_| ())?;
                } else {
                    server.cast(1, increment)?;
                }
            }
            Ok::<(), Error>(())
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(server.get().await.unwrap().current, 800);
    assert_eq!(overlaps.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_shutdown_is_final() {
    let state = Arc::new(Mutex::new(Journal::default()));
    let server = Server::new(
        "journal",
        2u64,
        shared(state.clone()),
        ServerConfig::default(),
    );
    let record = |journal: &mut Journal, entry: usize| -> Result<(), Error> {
        journal.entries.push(entry);
        Ok(())
    };

    // Queue two messages, then the shutdown, then a late message.
    server.cast(1, record).unwrap();
    server.cast(2, record).unwrap();

    let finalized = Arc::new(Mutex::new(None));
    let seen = finalized.clone();
    let stopping = server.clone();
    let shutdown = tokio::spawn(async move {
        stopping
            .shutdown(
                ShutdownReason::Normal,
                move |journal: &Journal, reason| {
                    *seen.lock() = Some((journal.entries.clone(), reason));
                    Ok(())
                },
                &CancellationToken::new(),
            )
            .await
    });
    while server.queued() < 3 {
        tokio::task::yield_now().await;
    }
    server.cast(3, record).unwrap();

    server.start();
    shutdown.await.unwrap().unwrap();

    assert!(server.is_terminated());
    assert_eq!(
        *finalized.lock(),
        Some((vec![1, 2], ShutdownReason::Normal))
    );
    assert_eq!(state.lock().entries, vec![1, 2]);
    assert!(matches!(
        server.cast(4, record),
        Err(Error::DeadActor { .. })
    ));
    assert!(matches!(
        server.call(5, record).await,
        Err(Error::DeadActor { .. })
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_shutdown_requests() {
    let state = Arc::new(Mutex::new(Counter::default()));
    let server = Server::spawn(
        "counter",
        3u32,
        shared(state),
        ServerConfig::default(),
    );
    let finalized = Arc::new(AtomicUsize::new(0));

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let server = server.clone();
        let finalized = finalized.clone();
        tasks.push(tokio::spawn(async move {
            server
                .shutdown(
                    ShutdownReason::BrutalKill,
                    move |_: &Counter, _| {
                        finalized.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    },
                    &CancellationToken::new(),
                )
                .await
        }));
    }

    let mut stopped = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(()) => stopped += 1,
            Err(Error::DeadActor { .. }) => {}
            Err(error) => panic!("unexpected error {}", error),
        }
    }

    assert!(stopped >= 1);
    assert_eq!(finalized.load(Ordering::SeqCst), 1);
    assert!(server.is_terminated());
}

#[tokio::test]
async fn test_shutdown_wait_can_be_abandoned() {
    let state = Arc::new(Mutex::new(Counter::default()));
    let server = Server::new(
        "counter",
        4u32,
        shared(state),
        ServerConfig::default(),
    );

    let until = CancellationToken::new();
    let cancel = until.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
    });

    let error = server
        .shutdown(ShutdownReason::Normal, no_finalizer::<Counter>, &until)
        .await
        .unwrap_err();
    assert_eq!(
        error,
        Error::ShutdownIncomplete {
            kind: "counter".to_owned(),
            id: "4".to_owned()
        }
    );
    assert!(!server.is_terminated());

    // The request stays queued and completes once the worker runs.
    server.start();
    tokio::time::timeout(Duration::from_secs(1), server.terminated())
        .await
        .unwrap();
}
