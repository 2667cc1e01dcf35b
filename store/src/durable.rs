// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Durable store
//!
//! Keeps every state encoded with `bincode` in a [`Backend`], keyed by the
//! identifier's display form. Mutating a state decodes it, applies the
//! handler, encodes the result and writes it back, all under a lock private
//! to the identifier. If the write fails the handler's delivery is dropped,
//! so a waiting call fails instead of observing a result that was not stored.
//!

use crate::{
    backend::Backend,
    error::Error,
    store::{Store, StoreId},
};

use actor::{Applied, Delivery, StateFn, StateMutator};

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, error};

use std::{marker::PhantomData, sync::Arc};

struct Shared<Id, B> {
    backend: B,
    locks: DashMap<Id, Arc<Mutex<()>>>,
}

impl<Id: StoreId, B: Backend> Shared<Id, B> {
    fn lock_for(&self, id: &Id) -> Arc<Mutex<()>> {
        self.locks.entry(id.clone()).or_default().value().clone()
    }
}

fn encode<S: Serialize>(state: &S) -> Result<Vec<u8>, Error> {
    bincode::serialize(state).map_err(|e| {
        error!("Can't serialize state: {}", e);
        Error::Serialize(e.to_string())
    })
}

fn decode<S: DeserializeOwned>(bytes: &[u8]) -> Result<S, Error> {
    bincode::deserialize(bytes).map_err(|e| {
        error!("Can't deserialize state: {}", e);
        Error::Deserialize(e.to_string())
    })
}

/// Store persisting states in a [`Backend`].
pub struct DurableStore<Id, S, B> {
    shared: Arc<Shared<Id, B>>,
    _state: PhantomData<fn() -> S>,
}

impl<Id, S, B> DurableStore<Id, S, B>
where
    Id: StoreId,
    S: Serialize + DeserializeOwned + Send + 'static,
    B: Backend,
{
    /// Creates a store over `backend`. States already in the backend are
    /// visible right away.
    pub fn new(backend: B) -> Self {
        debug!("Creating durable store over `{}`.", backend.name());
        Self {
            shared: Arc::new(Shared {
                backend,
                locks: DashMap::new(),
            }),
            _state: PhantomData,
        }
    }

    /// The underlying backend.
    pub fn backend(&self) -> &B {
        &self.shared.backend
    }
}

impl<Id, S, B> Clone for DurableStore<Id, S, B> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            _state: PhantomData,
        }
    }
}

impl<Id, S, B> Store<Id, S> for DurableStore<Id, S, B>
where
    Id: StoreId,
    S: Serialize + DeserializeOwned + Send + 'static,
    B: Backend,
{
    type Mutator = DurableState<Id, S, B>;

    fn has(&self, id: &Id) -> Result<bool, Error> {
        self.shared.backend.contains(&id.to_string())
    }

    fn list(&self) -> Result<Vec<S>, Error> {
        self.shared
            .backend
            .values()?
            .iter()
            .map(|bytes| decode(bytes))
            .collect()
    }

    fn create_if_not_exist(&self, id: &Id, initial: S) -> Result<bool, Error> {
        let lock = self.shared.lock_for(id);
        let _guard = lock.lock();

        let key = id.to_string();
        if self.shared.backend.contains(&key)? {
            return Ok(true);
        }
        self.shared.backend.put(&key, &encode(&initial)?)?;
        Ok(false)
    }

    fn mutator(&self, id: &Id) -> DurableState<Id, S, B> {
        DurableState {
            shared: self.shared.clone(),
            id: id.clone(),
            _state: PhantomData,
        }
    }
}

/// State of one identifier in a [`DurableStore`].
pub struct DurableState<Id, S, B> {
    shared: Arc<Shared<Id, B>>,
    id: Id,
    _state: PhantomData<fn() -> S>,
}

impl<Id, S, B> DurableState<Id, S, B>
where
    Id: StoreId,
    S: Serialize + DeserializeOwned + Send + 'static,
    B: Backend,
{
    /// Identifier the state is bound to.
    pub fn id(&self) -> &Id {
        &self.id
    }

    /// Decoded copy of the stored state.
    pub fn get(&self) -> Result<S, Error> {
        let bytes = self.read()?;
        decode(&bytes)
    }

    fn read(&self) -> Result<Vec<u8>, Error> {
        self.shared.backend.get(&self.id.to_string()).map_err(|e| match e {
            Error::EntryNotFound(_) => Error::EntryNotFound(format!(
                "Could not load state for ID {}",
                self.id
            )),
            e => e,
        })
    }

    fn apply_stored(&self, apply: StateFn<'_, S>) -> Result<Applied, Error> {
        let lock = self.shared.lock_for(&self.id);
        let _guard = lock.lock();

        let mut state: S = decode(&self.read()?)?;
        let (delivery, status) = apply(&mut state);
        let bytes = encode(&state)?;
        self.shared.backend.put(&self.id.to_string(), &bytes)?;
        Ok((delivery, status))
    }
}

impl<Id, S, B> StateMutator<S> for DurableState<Id, S, B>
where
    Id: StoreId,
    S: Serialize + DeserializeOwned + Send + 'static,
    B: Backend,
{
    fn mutate(&self, apply: StateFn<'_, S>) -> Applied {
        match self.apply_stored(apply) {
            Ok(applied) => applied,
            Err(error) => {
                error!("Can't persist state for ID {}: {}", self.id, error);
                (Delivery::none(), Err(error.into()))
            }
        }
    }
}
