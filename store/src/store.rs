// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Store contract
//!
//! A [`Store`] keeps one state per identifier and hands out state mutators
//! bound to a single identifier. Servers built on such a mutator never hold
//! the state themselves; each message is applied by locating the state in the
//! store, locking it and running the handler against it.
//!

use crate::error::Error;

use actor::{ServerId, StateMutator};

use std::hash::Hash;

/// Bound for identifiers used as store keys.
pub trait StoreId: ServerId + Clone + Eq + Hash {}

impl<T> StoreId for T where T: ServerId + Clone + Eq + Hash {}

/// Keyed state storage.
pub trait Store<Id: StoreId, S>: Send + Sync + 'static {
    /// Mutator bound to one identifier.
    type Mutator: StateMutator<S>;

    /// True if a state exists for `id`.
    fn has(&self, id: &Id) -> Result<bool, Error>;

    /// Copies of every stored state, in no particular order.
    fn list(&self) -> Result<Vec<S>, Error>;

    /// Stores `initial` for `id` unless a state already exists.
    ///
    /// # Returns
    ///
    /// Returns true if a state already existed, in which case `initial` is
    /// dropped and the stored state is left untouched.
    ///
    fn create_if_not_exist(&self, id: &Id, initial: S) -> Result<bool, Error>;

    /// Mutator for the state of `id`. The state does not need to exist yet;
    /// mutating a missing state fails with [`Error::EntryNotFound`].
    fn mutator(&self, id: &Id) -> Self::Mutator;
}
