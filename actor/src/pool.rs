// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Object pool
//!
//! Recycling pool for boxed values. Mailboxes take their queue nodes from a
//! pool on every send and give them back on every receive, so a busy server
//! keeps reusing the same allocations instead of allocating one per message.
//! A single pool may be shared by any number of mailboxes.
//!

use parking_lot::Mutex;

use std::sync::atomic::{AtomicU64, Ordering};

/// Default number of idle values retained by a [`SyncPool`].
pub const DEFAULT_MAX_IDLE: usize = 1024;

/// Pool contract consumed by the mailbox.
pub trait Pool<T>: Send + Sync {
    /// Takes a value from the pool, allocating a fresh one if none is free.
    fn get(&self) -> Box<T>;

    /// Returns a value to the pool for reuse.
    fn put(&self, item: Box<T>);
}

/// Counters kept by a [`SyncPool`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Values created because the free list was empty.
    pub allocated: u64,
    /// Calls to `get`.
    pub acquired: u64,
    /// Calls to `put`.
    pub released: u64,
}

impl PoolStats {
    /// Values handed out and not yet returned.
    pub fn outstanding(&self) -> u64 {
        self.acquired.saturating_sub(self.released)
    }
}

/// Thread-safe free-list pool.
pub struct SyncPool<T> {
    free: Mutex<Vec<Box<T>>>,
    max_idle: usize,
    allocated: AtomicU64,
    acquired: AtomicU64,
    released: AtomicU64,
}

impl<T: Default> SyncPool<T> {
    /// Creates an empty pool retaining up to [`DEFAULT_MAX_IDLE`] idle values.
    pub fn new() -> Self {
        Self::with_max_idle(DEFAULT_MAX_IDLE)
    }

    /// Creates an empty pool retaining up to `max_idle` idle values. Values
    /// returned beyond that bound are dropped.
    pub fn with_max_idle(max_idle: usize) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            max_idle,
            allocated: AtomicU64::new(0),
            acquired: AtomicU64::new(0),
            released: AtomicU64::new(0),
        }
    }

    /// Number of idle values ready for reuse.
    pub fn idle(&self) -> usize {
        self.free.lock().len()
    }

    /// Snapshot of the pool counters.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            allocated: self.allocated.load(Ordering::Relaxed),
            acquired: self.acquired.load(Ordering::Relaxed),
            released: self.released.load(Ordering::Relaxed),
        }
    }
}

impl<T: Default> Default for SyncPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Default + Send> Pool<T> for SyncPool<T> {
    fn get(&self) -> Box<T> {
        self.acquired.fetch_add(1, Ordering::Relaxed);
        if let Some(item) = self.free.lock().pop() {
            return item;
        }
        self.allocated.fetch_add(1, Ordering::Relaxed);
        Box::default()
    }

    fn put(&self, item: Box<T>) {
        self.released.fetch_add(1, Ordering::Relaxed);
        let mut free = self.free.lock();
        if free.len() < self.max_idle {
            free.push(item);
        }
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn test_reuses_returned_values() {
        let pool = SyncPool::<Vec<u8>>::new();
        let mut item = pool.get();
        item.reserve(64);
        let address = &*item as *const Vec<u8>;
        pool.put(item);
        assert_eq!(pool.idle(), 1);

        let item = pool.get();
        assert_eq!(&*item as *const Vec<u8>, address);
        assert!(item.capacity() >= 64);
        let stats = pool.stats();
        assert_eq!(stats.allocated, 1);
        assert_eq!(stats.acquired, 2);
        assert_eq!(stats.outstanding(), 1);
    }

    #[test]
    fn test_max_idle() {
        let pool = SyncPool::<u64>::with_max_idle(2);
        let items: Vec<_> = (0..4).map(|_| pool.get()).collect();
        for item in items {
            pool.put(item);
        }
        assert_eq!(pool.idle(), 2);
        assert_eq!(pool.stats().outstanding(), 0);
        assert_eq!(pool.stats().allocated, 4);
    }

    #[test]
    fn test_concurrent_use() {
        let pool = std::sync::Arc::new(SyncPool::<u64>::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = pool.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        let item = pool.get();
                        pool.put(item);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let stats = pool.stats();
        assert_eq!(stats.acquired, 800);
        assert_eq!(stats.outstanding(), 0);
        assert!(stats.allocated <= 8);
    }
}
