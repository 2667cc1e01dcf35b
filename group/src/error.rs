// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Group errors
//!

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for server groups.
#[derive(Clone, Debug, Error, PartialEq, Serialize, Deserialize)]
pub enum Error {
    /// `begin` on an identifier that already has a running server.
    #[error("Begin({kind}): already tracking identifier `{id}`")]
    AlreadyTracking { kind: String, id: String },
    /// `begin` on an identifier whose state is already stored.
    #[error(
        "Begin({kind}): cannot initiate a state for identifier `{id}` that already exists"
    )]
    AlreadyExists { kind: String, id: String },
    /// The store failed while looking up or creating a state.
    #[error("{kind}: failed to check if state for `{id}` exists: {error}")]
    Store {
        kind: String,
        id: String,
        error: store::Error,
    },
    /// Error from the server the request was routed to.
    #[error(transparent)]
    Actor(#[from] actor::Error),
}
