// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Rush GenServer
//!
//! An in-process server runtime. A server owns one piece of state and applies
//! requests to it one at a time, in arrival order, from its own worker thread.
//! Callers interact with the state only by queueing handlers on the server:
//!
//! - **Call**: run a handler and wait for its result, bounded by a deadlock
//!   timeout.
//! - **Cast**: queue a handler and return immediately.
//! - **Shutdown**: queue a finalizer and wait for the worker to exit.
//!
//! ## State access
//!
//! The server does not hold its state. It is given a [`StateMutator`], an
//! access point that finds and locks the real storage and runs a function
//! against it. This keeps the server agnostic of where state lives: a closure
//! over a shared mutex, an in-memory map or a durable backend all fit.
//!
//! ## Termination
//!
//! A server stops for good when it dequeues a shutdown request or when a
//! handler returns an error. Its mailbox is closed first: anything still
//! queued is discarded and later requests fail with [`Error::DeadActor`].
//!
//! ## Deadlock diagnostics
//!
//! Every running worker publishes what it is doing in a process-wide registry
//! (see [`trace`]). When a call times out the caller looks up the block of the
//! server it was waiting on, so the returned [`CallTimeout`] names the handler
//! the worker is stuck in. If no block matches, the caller's own backtrace is
//! attached instead.
//!
//! ## Getting started
//!
//! ```ignore
//! use actor::{Error, Server, ServerConfig, ShutdownReason, StateFn};
//! use parking_lot::Mutex;
//! use tokio_util::sync::CancellationToken;
//! use std::sync::Arc;
//!
//! #[derive(Clone, Default)]
//! struct Counter {
//!     current: u64,
//! }
//!
//! fn add(counter: &mut Counter, amount: u64) -> Result<u64, Error> {
//!     counter.current += amount;
//!     Ok(counter.current)
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     let state = Arc::new(Mutex::new(Counter::default()));
//!     let server = Server::spawn(
//!         "counter",
//!         1u32,
//!         move |apply: StateFn<'_, Counter>| apply(&mut *state.lock()),
//!         ServerConfig::default(),
//!     );
//!
//!     assert_eq!(server.call(2, add).await?, 2);
//!     server.cast(3, |counter: &mut Counter, amount| {
//!         counter.current += amount;
//!         Ok(())
//!     })?;
//!     assert_eq!(server.get().await?.current, 5);
//!
//!     server
//!         .shutdown(
//!             ShutdownReason::Normal,
//!             |counter: &Counter, _| {
//!                 println!("final value {}", counter.current);
//!                 Ok(())
//!             },
//!             &CancellationToken::new(),
//!         )
//!         .await
//! }
//! ```
//!

mod config;
mod error;
mod handler;
mod mailbox;
mod pool;
mod server;

pub mod trace;

//
// Server
//

/// Handle to a running (or not yet started) server.
///
/// See the crate documentation for the request kinds and termination rules.
pub use server::Server;

/// Bound required from server identifiers.
pub use server::ServerId;

/// Options applied when a server is built: deadlock timeout, deadlock
/// callback and mailbox node pool.
pub use config::{
    DEFAULT_DEADLOCK_TIMEOUT, DeadlockCallback, MessagePool, ServerConfig,
};

//
// Handlers and state access
//

/// Queued request and the pieces produced when it is applied.
pub use handler::{
    Applied, Delivery, Handler, ResultSender, ShutdownReason, StateFn,
    StateMutator,
};

//
// Mailbox and pooling
//

/// Unbounded FIFO mailbox with pooled nodes.
pub use mailbox::{Mail, Mailbox, Node, NodePool, Received};

/// Object pool used for mailbox nodes.
pub use pool::{DEFAULT_MAX_IDLE, Pool, PoolStats, SyncPool};

//
// Errors
//

/// Runtime errors and the diagnostic attached to call timeouts.
pub use error::{CallTimeout, Error, Trace};
