// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! SQLite backend for durable server state.
//!

mod sqlite;

pub use sqlite::{SqliteBackend, open};
