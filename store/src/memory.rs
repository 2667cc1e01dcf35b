// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! Memory store implementation.
//!

use crate::{
    error::Error,
    store::{Store, StoreId},
};

use actor::{Applied, Delivery, StateFn, StateMutator};

use dashmap::{DashMap, mapref::entry::Entry};
use parking_lot::Mutex;

use std::sync::Arc;

type MemoryData<Id, S> = Arc<DashMap<Id, Arc<Mutex<S>>>>;

/// A store that keeps each state in memory behind its own lock.
pub struct MemoryStore<Id, S> {
    states: MemoryData<Id, S>,
}

impl<Id: StoreId, S> MemoryStore<Id, S> {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            states: Arc::new(DashMap::new()),
        }
    }

    /// Number of stored states.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// True if no state is stored.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

impl<Id: StoreId, S> Default for MemoryStore<Id, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Id, S> Clone for MemoryStore<Id, S> {
    fn clone(&self) -> Self {
        Self {
            states: self.states.clone(),
        }
    }
}

impl<Id, S> Store<Id, S> for MemoryStore<Id, S>
where
    Id: StoreId,
    S: Clone + Send + 'static,
{
    type Mutator = BoundState<Id, S>;

    fn has(&self, id: &Id) -> Result<bool, Error> {
        Ok(self.states.contains_key(id))
    }

    fn list(&self) -> Result<Vec<S>, Error> {
        let cells: Vec<Arc<Mutex<S>>> = self
            .states
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        Ok(cells.iter().map(|cell| cell.lock().clone()).collect())
    }

    fn create_if_not_exist(&self, id: &Id, initial: S) -> Result<bool, Error> {
        match self.states.entry(id.clone()) {
            Entry::Occupied(_) => Ok(true),
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(Mutex::new(initial)));
                Ok(false)
            }
        }
    }

    fn mutator(&self, id: &Id) -> BoundState<Id, S> {
        BoundState {
            states: self.states.clone(),
            id: id.clone(),
        }
    }
}

/// State of one identifier in a [`MemoryStore`].
pub struct BoundState<Id, S> {
    states: MemoryData<Id, S>,
    id: Id,
}

impl<Id: StoreId, S> BoundState<Id, S> {
    /// Identifier the state is bound to.
    pub fn id(&self) -> &Id {
        &self.id
    }

    fn cell(&self) -> Result<Arc<Mutex<S>>, Error> {
        // Clone the cell out so the map shard is not held while applying.
        self.states
            .get(&self.id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| {
                Error::EntryNotFound(format!(
                    "Could not load state for ID {}",
                    self.id
                ))
            })
    }

    /// Copy of the current state.
    pub fn get(&self) -> Result<S, Error>
    where
        S: Clone,
    {
        let cell = self.cell()?;
        let state = cell.lock().clone();
        Ok(state)
    }
}

impl<Id, S> StateMutator<S> for BoundState<Id, S>
where
    Id: StoreId,
    S: Send + 'static,
{
    fn mutate(&self, apply: StateFn<'_, S>) -> Applied {
        let cell = match self.cell() {
            Ok(cell) => cell,
            Err(error) => return (Delivery::none(), Err(error.into())),
        };
        let mut state = cell.lock();
        apply(&mut *state)
    }
}

impl<Id: Clone, S> Clone for BoundState<Id, S> {
    fn clone(&self) -> Self {
        Self {
            states: self.states.clone(),
            id: self.id.clone(),
        }
    }
}
