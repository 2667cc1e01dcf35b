// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Errors module
//!

use serde::{Deserialize, Serialize};
use thiserror::Error;

use std::fmt;

/// Error type for the server runtime.
#[derive(Clone, Debug, Error, PartialEq, Serialize, Deserialize)]
pub enum Error {
    /// The server mailbox is closed, the message was not enqueued.
    #[error("send to dead actor {kind} `{id}`")]
    DeadActor { kind: String, id: String },
    /// A call did not get its result before the deadlock timeout.
    #[error(transparent)]
    CallTimeout(CallTimeout),
    /// The shutdown wait was cancelled before the server terminated.
    #[error("{kind} `{id}` did not finish shutting down")]
    ShutdownIncomplete { kind: String, id: String },
    /// The message was dropped without being processed.
    #[error("message to {kind} `{id}` was discarded before being processed")]
    Discarded { kind: String, id: String },
    /// A handler or state mutator panicked.
    #[error("handler panicked: {0}")]
    Panicked(String),
    /// Error returned by a message handler.
    #[error("Error: {0}")]
    Functional(String),
    /// Store  Error.
    #[error("Store error: {0}")]
    Store(String),
    /// Entry not found error.
    #[error("Entry not found: {0}")]
    EntryNotFound(String),
}

/// Where the trace attached to a [`CallTimeout`] was taken from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Trace {
    /// Block describing what the server worker was doing.
    Server(String),
    /// Backtrace of the caller, used when no worker block matched.
    Caller(String),
}

impl Trace {
    /// The trace text.
    pub fn text(&self) -> &str {
        match self {
            Trace::Server(text) | Trace::Caller(text) => text,
        }
    }

    /// True if the trace describes the server worker.
    pub fn is_server(&self) -> bool {
        matches!(self, Trace::Server(_))
    }
}

/// Call timeout with the diagnostic captured when the deadline expired.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CallTimeout {
    pub kind: String,
    pub id: String,
    pub trace: Trace,
}

impl fmt::Display for CallTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.trace {
            Trace::Server(trace) => write!(
                f,
                "GenServer WARNING timeout in {}, id {}\nGenServer stuck in\n{}\n",
                self.kind, self.id, trace
            ),
            Trace::Caller(trace) => write!(
                f,
                "GenServer WARNING timeout in {}, id {}\nGenServer couldn't find Server stacktrace\nClient Stacktrace:\n{}\n",
                self.kind, self.id, trace
            ),
        }
    }
}

impl std::error::Error for CallTimeout {}
