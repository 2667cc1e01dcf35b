// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Store error types
//!
//! Errors raised by stores and byte backends. When a store error happens
//! inside a state mutator it is converted into [`actor::Error`], which stops
//! the server the mutator belongs to.
//!
//! - **CreateStore**: a backend could not be opened or initialized.
//! - **Get**: a read from a backend failed.
//! - **EntryNotFound**: no state exists for the requested identifier.
//! - **Store**: a write or any other backend operation failed.
//! - **Serialize** / **Deserialize**: a state could not be encoded or decoded.
//!

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for stores and backends.
#[derive(Clone, Debug, Error, Serialize, Deserialize, PartialEq)]
pub enum Error {
    /// Backend creation or initialization failure.
    #[error("Can't create store: {0}")]
    CreateStore(String),
    /// Read failure.
    #[error("Get error: {0}")]
    Get(String),
    /// Missing entry. Often a normal condition, e.g. before a state is
    /// created.
    #[error("Entry not found: {0}")]
    EntryNotFound(String),
    /// Write or generic backend failure.
    #[error("Store error: {0}")]
    Store(String),
    /// State encoding failure.
    #[error("Can't serialize state: {0}")]
    Serialize(String),
    /// State decoding failure.
    #[error("Can't deserialize state: {0}")]
    Deserialize(String),
}

impl From<Error> for actor::Error {
    fn from(error: Error) -> Self {
        match error {
            Error::EntryNotFound(entry) => actor::Error::EntryNotFound(entry),
            error => actor::Error::Store(error.to_string()),
        }
    }
}
