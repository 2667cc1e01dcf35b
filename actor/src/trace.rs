// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Worker diagnostics
//!
//! Process-wide registry of running server workers. Each worker publishes
//! what it is doing (waiting on its mailbox, or applying a given handler since
//! a given instant). When a call times out the caller dumps the registry and
//! looks for the block belonging to the server it was waiting on, which tells
//! which handler the worker is stuck in.
//!
//! A dump is a list of blocks separated by a blank line, each starting with
//! the server marker:
//!
//! ```text
//! server id 7 [counter]: applying call for 1.204s
//!     handler: my_app::counter::add
//!     processed: 12 messages
//!     running for: 35.010s
//! ```
//!

use dashmap::DashMap;
use once_cell::sync::Lazy;
use parking_lot::RwLock;

use std::{
    backtrace::Backtrace,
    fmt::{self, Display, Write},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Instant,
};

static WORKERS: Lazy<DashMap<u64, Arc<Frame>>> = Lazy::new(DashMap::new);

static NEXT_WORKER: AtomicU64 = AtomicU64::new(1);

/// Marker opening the dump block of a server.
pub fn marker(kind: &str, id: impl Display) -> String {
    format!("server id {} [{}]", id, kind)
}

enum Activity {
    Waiting,
    Applying {
        variant: &'static str,
        label: &'static str,
        since: Instant,
    },
}

struct Frame {
    marker: String,
    started: Instant,
    processed: AtomicU64,
    activity: RwLock<Activity>,
}

impl Frame {
    fn render(&self, out: &mut String) -> fmt::Result {
        let activity = self.activity.read();
        match &*activity {
            Activity::Waiting => {
                writeln!(out, "{}: waiting on mailbox", self.marker)?;
            }
            Activity::Applying {
                variant,
                label,
                since,
            } => {
                writeln!(
                    out,
                    "{}: applying {} for {:.3?}",
                    self.marker,
                    variant,
                    since.elapsed()
                )?;
                writeln!(out, "    handler: {}", label)?;
            }
        }
        drop(activity);
        writeln!(
            out,
            "    processed: {} messages",
            self.processed.load(Ordering::Relaxed)
        )?;
        write!(out, "    running for: {:.3?}", self.started.elapsed())
    }
}

/// Registration of one worker. Dropping it removes the worker from dumps.
pub(crate) struct WorkerFrame {
    key: u64,
    frame: Arc<Frame>,
}

impl WorkerFrame {
    /// Registers a worker under `marker`.
    pub(crate) fn register(marker: String) -> Self {
        let key = NEXT_WORKER.fetch_add(1, Ordering::Relaxed);
        let frame = Arc::new(Frame {
            marker,
            started: Instant::now(),
            processed: AtomicU64::new(0),
            activity: RwLock::new(Activity::Waiting),
        });
        WORKERS.insert(key, frame.clone());
        Self { key, frame }
    }

    /// Records the handler the worker is about to apply.
    pub(crate) fn applying(&self, variant: &'static str, label: &'static str) {
        *self.frame.activity.write() = Activity::Applying {
            variant,
            label,
            since: Instant::now(),
        };
    }

    /// Records that the worker went back to its mailbox.
    pub(crate) fn waiting(&self) {
        self.frame.processed.fetch_add(1, Ordering::Relaxed);
        *self.frame.activity.write() = Activity::Waiting;
    }
}

impl Drop for WorkerFrame {
    fn drop(&mut self) {
        WORKERS.remove(&self.key);
    }
}

/// Snapshot of every registered worker, oldest first.
pub fn dump() -> String {
    let mut frames: Vec<(u64, Arc<Frame>)> = WORKERS
        .iter()
        .map(|entry| (*entry.key(), entry.value().clone()))
        .collect();
    frames.sort_by_key(|(key, _)| *key);

    let mut out = String::new();
    for (index, (_, frame)) in frames.iter().enumerate() {
        if index > 0 {
            out.push_str("\n\n");
        }
        // Writing into a String does not fail.
        let _ = frame.render(&mut out);
    }
    out
}

/// Finds the block opened by `marker` in a [`dump`].
pub fn find(dump: &str, marker: &str) -> Option<String> {
    let prefix = format!("{}:", marker);
    dump.split("\n\n")
        .find(|block| block.starts_with(&prefix))
        .map(str::to_owned)
}

/// Backtrace of the calling thread.
pub fn caller() -> String {
    Backtrace::force_capture().to_string()
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn test_registered_worker_shows_in_dump() {
        let marker = marker("trace-test", "alpha");
        let frame = WorkerFrame::register(marker.clone());

        let block = find(&dump(), &marker).unwrap();
        assert!(block.starts_with("server id alpha [trace-test]: waiting on mailbox"));

        frame.applying("cast", "trace::tests::work");
        let block = find(&dump(), &marker).unwrap();
        assert!(block.contains("applying cast for"));
        assert!(block.contains("handler: trace::tests::work"));

        frame.waiting();
        let block = find(&dump(), &marker).unwrap();
        assert!(block.contains("processed: 1 messages"));

        drop(frame);
        assert!(find(&dump(), &marker).is_none());
    }

    #[test]
    fn test_marker_does_not_match_longer_ids() {
        let dump = "server id 12 [counter]: waiting on mailbox\n    processed: 0 messages\
            \n\nserver id 1 [counter]: applying call for 1s\n    handler: add";
        let block = find(dump, &marker("counter", 1)).unwrap();
        assert!(block.contains("handler: add"));
        assert!(find(dump, &marker("counter", 2)).is_none());
        assert!(find(dump, &marker("other", 1)).is_none());
    }

    #[test]
    fn test_caller_trace_is_not_empty() {
        assert!(!caller().is_empty());
    }
}
