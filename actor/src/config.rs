// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Server configuration
//!

use crate::{
    handler::Handler,
    mailbox::{Node, NodePool},
    server::Server,
};

use std::{sync::Arc, time::Duration};

/// Default time a call waits for its result.
pub const DEFAULT_DEADLOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// Callback invoked when a call times out, with the server and the trace text.
pub type DeadlockCallback<Id, S> =
    Arc<dyn Fn(&Server<Id, S>, &str) + Send + Sync + 'static>;

/// Node pool for server mailboxes holding handlers over `S`.
pub type MessagePool<S> = NodePool<Handler<S>>;

/// Options applied when a server is built.
pub struct ServerConfig<Id, S> {
    pub(crate) deadlock_timeout: Duration,
    pub(crate) deadlock_callback: Option<DeadlockCallback<Id, S>>,
    pub(crate) message_pool: Option<MessagePool<S>>,
}

impl<Id, S> ServerConfig<Id, S> {
    /// Configuration with the default deadlock timeout, no callback and a
    /// private message pool.
    pub fn new() -> Self {
        Self {
            deadlock_timeout: DEFAULT_DEADLOCK_TIMEOUT,
            deadlock_callback: None,
            message_pool: None,
        }
    }

    /// Sets how long a call waits before it is reported as a deadlock.
    pub fn with_deadlock_timeout(mut self, timeout: Duration) -> Self {
        self.deadlock_timeout = timeout;
        self
    }

    /// Sets the callback invoked on call timeouts.
    pub fn with_deadlock_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Server<Id, S>, &str) + Send + Sync + 'static,
    {
        self.deadlock_callback = Some(Arc::new(callback));
        self
    }

    /// Makes the mailbox take its nodes from `pool`, which may be shared with
    /// other servers.
    pub fn with_message_pool(mut self, pool: MessagePool<S>) -> Self {
        self.message_pool = Some(pool);
        self
    }

    /// The configured deadlock timeout.
    pub fn deadlock_timeout(&self) -> Duration {
        self.deadlock_timeout
    }

    /// The shared message pool, if one was set.
    pub fn message_pool(&self) -> Option<&MessagePool<S>> {
        self.message_pool.as_ref()
    }
}

impl<Id, S> Default for ServerConfig<Id, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Id, S> Clone for ServerConfig<Id, S> {
    fn clone(&self) -> Self {
        Self {
            deadlock_timeout: self.deadlock_timeout,
            deadlock_callback: self.deadlock_callback.clone(),
            message_pool: self.message_pool.clone(),
        }
    }
}

/// Shorthand used by constructors that need a fresh node pool.
pub(crate) fn private_pool<S: 'static>() -> MessagePool<S> {
    Arc::new(crate::pool::SyncPool::<Node<Handler<S>>>::new())
}
