// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! Group module.
//!
//! Routes requests by identifier to lazily spawned servers sharing one store.
//!

mod error;
mod group;

pub use error::Error;
pub use group::Group;
