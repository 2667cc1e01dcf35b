// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Server group
//!
//! A [`Group`] routes requests by identifier to one server per identifier,
//! all of the same kind and all backed by the same [`Store`]. Servers are
//! spawned on first use and share one mailbox node pool. Dropping the group
//! drops its handles, which stops every server still running.
//!

use crate::error::Error;

use actor::{
    Error as ActorError, MessagePool, Node, Server, ServerConfig,
    ShutdownReason, SyncPool,
};
use store::store::{Store, StoreId};

use dashmap::{DashMap, mapref::entry::Entry};
use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use std::{marker::PhantomData, sync::Arc};

/// Keyed registry of servers over a shared store.
pub struct Group<Id, S, St> {
    kind: String,
    store: St,
    config: ServerConfig<Id, S>,
    servers: DashMap<Id, Server<Id, S>>,
    _state: PhantomData<fn() -> S>,
}

impl<Id, S, St> Group<Id, S, St>
where
    Id: StoreId,
    S: Send + 'static,
    St: Store<Id, S>,
{
    /// Creates an empty group with the default server configuration.
    pub fn new(kind: &str, store: St) -> Self {
        Self::with_config(kind, store, ServerConfig::default())
    }

    /// Creates an empty group whose servers are built from `config`. If
    /// `config` has no message pool, the group creates one shared by all its
    /// servers.
    pub fn with_config(
        kind: &str,
        store: St,
        config: ServerConfig<Id, S>,
    ) -> Self {
        let config = if config.message_pool().is_some() {
            config
        } else {
            let pool: MessagePool<S> =
                Arc::new(SyncPool::<Node<actor::Handler<S>>>::new());
            config.with_message_pool(pool)
        };
        Self {
            kind: kind.to_owned(),
            store,
            config,
            servers: DashMap::new(),
            _state: PhantomData,
        }
    }

    /// Kind given to every server of the group.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The backing store.
    pub fn store(&self) -> &St {
        &self.store
    }

    /// Number of servers spawned so far.
    pub fn len(&self) -> usize {
        self.servers.len()
    }

    /// True if no server has been spawned.
    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    /// Stores `initial` for `id` and starts its server.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyTracking`] if a server for `id` exists and
    /// [`Error::AlreadyExists`] if a state for `id` is already stored.
    ///
    pub fn begin(&self, id: Id, initial: S) -> Result<(), Error> {
        if self.servers.contains_key(&id) {
            return Err(Error::AlreadyTracking {
                kind: self.kind.clone(),
                id: id.to_string(),
            });
        }

        let existed = self
            .store
            .create_if_not_exist(&id, initial)
            .map_err(|e| self.store_error(&id, e))?;
        if existed {
            return Err(Error::AlreadyExists {
                kind: self.kind.clone(),
                id: id.to_string(),
            });
        }

        self.load_or_create(&id);
        Ok(())
    }

    /// True if a server for `id` is running or a state for `id` is stored.
    pub fn has(&self, id: &Id) -> Result<bool, Error> {
        if self.servers.contains_key(id) {
            return Ok(true);
        }
        self.store.has(id).map_err(|e| self.store_error(id, e))
    }

    /// Every stored state.
    pub fn list(&self) -> Result<Vec<S>, Error> {
        self.store.list().map_err(|e| Error::Store {
            kind: self.kind.clone(),
            id: String::new(),
            error: e,
        })
    }

    /// Mutator for the stored state of `id`, bypassing its server.
    pub fn get(&self, id: &Id) -> St::Mutator {
        self.store.mutator(id)
    }

    /// The server for `id`, if one was spawned.
    pub fn server(&self, id: &Id) -> Option<Server<Id, S>> {
        self.servers.get(id).map(|entry| entry.value().clone())
    }

    /// Calls the server for `id`, creating a default state and spawning the
    /// server first if needed.
    pub async fn call<M, R, F>(
        &self,
        id: &Id,
        message: M,
        handler: F,
    ) -> Result<R, Error>
    where
        S: Default,
        M: Send + 'static,
        R: Send + 'static,
        F: FnOnce(&mut S, M) -> Result<R, ActorError> + Send + 'static,
    {
        let server = self.server_for(id)?;
        Ok(server.call(message, handler).await?)
    }

    /// Casts to the server for `id`, creating a default state and spawning
    /// the server first if needed.
    pub fn cast<M, F>(&self, id: &Id, message: M, handler: F) -> Result<(), Error>
    where
        S: Default,
        M: Send + 'static,
        F: FnOnce(&mut S, M) -> Result<(), ActorError> + Send + 'static,
    {
        let server = self.server_for(id)?;
        Ok(server.cast(message, handler)?)
    }

    /// Shuts down every server of the group with a normal reason, waiting
    /// until each one exits or `until` is cancelled. Servers that already
    /// stopped are skipped. Stopped servers stay registered, so later
    /// requests for their identifiers fail with a dead actor error. Their
    /// worker threads are gone once this returns `Ok`.
    ///
    /// # Errors
    ///
    /// Returns the first error reported by a shutdown.
    ///
    pub async fn stop(&self, until: &CancellationToken) -> Result<(), Error> {
        let running: Vec<Server<Id, S>> = self
            .servers
            .iter()
            .map(|entry| entry.value().clone())
            .filter(|server| !server.is_terminated())
            .collect();
        debug!("Stopping {} servers of group {}.", running.len(), &self.kind);

        let results = join_all(running.iter().map(|server| {
            server.shutdown(ShutdownReason::Normal, |_: &S, _| Ok(()), until)
        }))
        .await;

        for result in results {
            match result {
                Ok(()) | Err(ActorError::DeadActor { .. }) => {}
                Err(error) => return Err(error.into()),
            }
        }
        Ok(())
    }

    fn server_for(&self, id: &Id) -> Result<Server<Id, S>, Error>
    where
        S: Default,
    {
        if let Some(server) = self.server(id) {
            return Ok(server);
        }
        self.store
            .create_if_not_exist(id, S::default())
            .map_err(|e| self.store_error(id, e))?;
        Ok(self.load_or_create(id))
    }

    fn load_or_create(&self, id: &Id) -> Server<Id, S> {
        let (server, created) = match self.servers.entry(id.clone()) {
            Entry::Occupied(entry) => (entry.get().clone(), false),
            Entry::Vacant(entry) => {
                let server = Server::new(
                    self.kind.clone(),
                    id.clone(),
                    self.store.mutator(id),
                    self.config.clone(),
                );
                entry.insert(server.clone());
                (server, true)
            }
        };

        if created {
            debug!("Spawned server {} `{}`.", &self.kind, id);
            server.start();
        }
        server
    }

    fn store_error(&self, id: &Id, error: store::Error) -> Error {
        Error::Store {
            kind: self.kind.clone(),
            id: id.to_string(),
            error,
        }
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    use store::memory::MemoryStore;
    use tracing_test::traced_test;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Tally {
        votes: u32,
    }

    fn vote(tally: &mut Tally, count: u32) -> Result<u32, ActorError> {
        tally.votes += count;
        Ok(tally.votes)
    }

    fn tally_group() -> Group<String, Tally, MemoryStore<String, Tally>> {
        Group::new("tally", MemoryStore::new())
    }

    #[tokio::test]
    #[traced_test]
    async fn test_begin() {
        let group = tally_group();
        let id = "north".to_owned();
        group.begin(id.clone(), Tally { votes: 3 }).unwrap();
        assert!(logs_contain("Spawned server tally `north`."));
        assert_eq!(group.len(), 1);

        assert_eq!(
            group.begin(id.clone(), Tally::default()),
            Err(Error::AlreadyTracking {
                kind: "tally".to_owned(),
                id: "north".to_owned()
            })
        );
        assert_eq!(group.call(&id, 2, vote).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_begin_on_stored_state() {
        let store = MemoryStore::<String, Tally>::new();
        let id = "south".to_owned();
        store.create_if_not_exist(&id, Tally { votes: 9 }).unwrap();
        let group = Group::new("tally", store);

        assert!(group.has(&id).unwrap());
        assert!(group.is_empty());
        assert_eq!(
            group.begin(id.clone(), Tally::default()),
            Err(Error::AlreadyExists {
                kind: "tally".to_owned(),
                id: "south".to_owned()
            })
        );

        // The stored state is picked up on first use.
        assert_eq!(group.call(&id, 1, vote).await.unwrap(), 10);
        assert_eq!(group.get(&id).get().unwrap(), Tally { votes: 10 });
    }

    #[tokio::test]
    async fn test_lazy_spawn_with_default_state() {
        let group = tally_group();
        let id = "east".to_owned();
        assert!(!group.has(&id).unwrap());

        group.cast(&id, 4, |tally: &mut Tally, count| {
            tally.votes += count;
            Ok(())
        })
        .unwrap();
        assert!(group.has(&id).unwrap());
        assert!(group.server(&id).is_some());
        assert_eq!(group.call(&id, 0, vote).await.unwrap(), 4);
        assert_eq!(group.list().unwrap(), vec![Tally { votes: 4 }]);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_stop() {
        let group = tally_group();
        for id in ["a", "b", "c"] {
            group.call(&id.to_owned(), 1, vote).await.unwrap();
        }

        group.stop(&CancellationToken::new()).await.unwrap();
        assert!(logs_contain("Stopping 3 servers of group tally."));
        for id in ["a", "b", "c"] {
            assert!(group.server(&id.to_owned()).unwrap().is_terminated());
        }

        // Stopping again finds nothing to do.
        group.stop(&CancellationToken::new()).await.unwrap();
        assert!(logs_contain("Stopping 0 servers of group tally."));

        let error = group.call(&"a".to_owned(), 1, vote).await.unwrap_err();
        assert!(matches!(
            error,
            Error::Actor(ActorError::DeadActor { .. })
        ));
    }
}
