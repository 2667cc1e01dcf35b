// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! Core library for the Rush GenServer framework.
//! Provides in-process servers that own a piece of state and apply requests
//! to it one at a time, plus keyed stores and groups to run one server per
//! identifier.

pub use actor::{
    CallTimeout, DEFAULT_DEADLOCK_TIMEOUT, Delivery, Error as ActorError,
    Handler, Mail, Mailbox, Pool, PoolStats, Server, ServerConfig, ServerId,
    ShutdownReason, StateFn, StateMutator, SyncPool, Trace, trace,
};

pub use store::{
    Error as StoreError,
    backend::{Backend, MemoryBackend},
    durable::{DurableState, DurableStore},
    memory::{BoundState, MemoryStore},
    store::{Store, StoreId},
};

pub use group::{Error as GroupError, Group};

#[cfg(feature = "sqlite")]
pub use sqlite_db::SqliteBackend;
