// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Byte backends
//!
//! A [`Backend`] is a flat key/value table of encoded states. The
//! [`DurableStore`](crate::durable::DurableStore) handles encoding and
//! per-key locking on top of it, so a backend only has to be safe for
//! concurrent use by itself.
//!

use crate::error::Error;

use parking_lot::RwLock;

use std::{collections::BTreeMap, sync::Arc};

/// Key/value table of encoded states.
pub trait Backend: Send + Sync + 'static {
    /// Name of the table.
    fn name(&self) -> &str;

    /// Bytes stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EntryNotFound`] if nothing is stored under `key`.
    ///
    fn get(&self, key: &str) -> Result<Vec<u8>, Error>;

    /// Stores `data` under `key`, replacing any previous value.
    fn put(&self, key: &str, data: &[u8]) -> Result<(), Error>;

    /// True if something is stored under `key`.
    fn contains(&self, key: &str) -> Result<bool, Error>;

    /// Every stored value, ordered by key.
    fn values(&self) -> Result<Vec<Vec<u8>>, Error>;
}

impl<B: Backend> Backend for Arc<B> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, Error> {
        (**self).get(key)
    }

    fn put(&self, key: &str, data: &[u8]) -> Result<(), Error> {
        (**self).put(key, data)
    }

    fn contains(&self, key: &str) -> Result<bool, Error> {
        (**self).contains(key)
    }

    fn values(&self) -> Result<Vec<Vec<u8>>, Error> {
        (**self).values()
    }
}

/// A backend that keeps encoded states in memory.
#[derive(Default)]
pub struct MemoryBackend {
    name: String,
    data: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    /// Creates an empty table.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            data: RwLock::new(BTreeMap::new()),
        }
    }
}

impl Backend for MemoryBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, Error> {
        match self.data.read().get(key) {
            Some(value) => Ok(value.clone()),
            None => {
                Err(Error::EntryNotFound("Query returned no rows".to_owned()))
            }
        }
    }

    fn put(&self, key: &str, data: &[u8]) -> Result<(), Error> {
        self.data.write().insert(key.to_owned(), data.to_vec());
        Ok(())
    }

    fn contains(&self, key: &str) -> Result<bool, Error> {
        Ok(self.data.read().contains_key(key))
    }

    fn values(&self) -> Result<Vec<Vec<u8>>, Error> {
        Ok(self.data.read().values().cloned().collect())
    }
}

/// Generates the shared test suite for a [`Backend`] implementation.
///
/// `$constructor` is an expression evaluating to a fresh, empty backend named
/// `test`.
#[macro_export]
macro_rules! test_backend_trait {
    ($name:ident: $constructor:expr) => {
        #[cfg(test)]
        mod $name {
            use super::*;
            use $crate::{backend::Backend, error::Error};

            #[test]
            fn test_name() {
                let backend = $constructor;
                assert_eq!(Backend::name(&backend), "test");
            }

            #[test]
            fn test_put_get() {
                let backend = $constructor;
                Backend::put(&backend, "key", b"value").unwrap();
                assert_eq!(Backend::get(&backend, "key").unwrap(), b"value");
                assert!(Backend::contains(&backend, "key").unwrap());
            }

            #[test]
            fn test_put_replaces() {
                let backend = $constructor;
                Backend::put(&backend, "key", b"first").unwrap();
                Backend::put(&backend, "key", b"second").unwrap();
                assert_eq!(Backend::get(&backend, "key").unwrap(), b"second");
                assert_eq!(Backend::values(&backend).unwrap().len(), 1);
            }

            #[test]
            fn test_missing_key() {
                let backend = $constructor;
                assert!(!Backend::contains(&backend, "missing").unwrap());
                assert!(matches!(
                    Backend::get(&backend, "missing"),
                    Err(Error::EntryNotFound(_))
                ));
            }

            #[test]
            fn test_values_in_key_order() {
                let backend = $constructor;
                Backend::put(&backend, "b", b"2").unwrap();
                Backend::put(&backend, "c", b"3").unwrap();
                Backend::put(&backend, "a", b"1").unwrap();
                assert_eq!(
                    Backend::values(&backend).unwrap(),
                    vec![b"1".to_vec(), b"2".to_vec(), b"3".to_vec()]
                );
            }
        }
    };
}
