// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! Store module.
//!
//! Keyed state storage for servers. A store hands out state mutators bound to
//! one identifier; a server built on such a mutator applies its messages to
//! the stored state.
//!
//! - [`memory::MemoryStore`] keeps states in memory.
//! - [`durable::DurableStore`] keeps states encoded in a [`backend::Backend`].
//!

pub mod backend;
pub mod durable;
pub mod error;
pub mod memory;
pub mod store;

pub use error::Error;
