// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Server
//!
//! A [`Server`] owns one piece of state through a [`StateMutator`] and applies
//! every request to it from a single worker thread, in the order the requests
//! were sent. Callers never lock the state; they queue handlers:
//!
//! - [`Server::call`] waits for the handler result, up to the configured
//!   deadlock timeout.
//! - [`Server::cast`] queues the handler and returns.
//! - [`Server::shutdown`] queues a finalizer and waits for the worker to exit.
//!
//! The worker stops for good after a shutdown request is dequeued or after a
//! handler fails. In both cases the mailbox is closed first, so whatever is
//! still queued is discarded and later sends fail.
//!
//! Handlers are plain synchronous closures. Each started server runs them on
//! its own OS thread, so a stalled handler never holds an async runtime
//! thread and the caller's deadlock timer always fires. Dropping the last
//! handle to a running server queues a normal shutdown without finalizer.
//!

use crate::{
    Error,
    config::ServerConfig,
    error::{CallTimeout, Trace},
    handler::{Applied, Delivery, Handler, ShutdownReason, StateMutator},
    mailbox::Mailbox,
    trace::{self, WorkerFrame},
};

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, error, warn};

use std::{
    any::Any,
    fmt::{self, Display},
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
};

/// Bound for server identifiers.
pub trait ServerId: Display + Send + Sync + 'static {}

impl<T> ServerId for T where T: Display + Send + Sync + 'static {}

struct Inner<Id, S> {
    kind: String,
    id: Id,
    mutator: Box<dyn StateMutator<S>>,
    mailbox: Mailbox<Handler<S>>,
    terminated: CancellationToken,
    started: AtomicBool,
    config: ServerConfig<Id, S>,
}

/// Handle to a server. Clones address the same server.
pub struct Server<Id, S> {
    inner: Arc<Inner<Id, S>>,
    release: Arc<Release>,
}

/// Runs its hook when the last handle of a server is dropped.
struct Release(Option<Box<dyn FnOnce() + Send + Sync>>);

impl Drop for Release {
    fn drop(&mut self) {
        if let Some(release) = self.0.take() {
            release();
        }
    }
}

impl<Id, S> Server<Id, S>
where
    Id: ServerId,
    S: Send + 'static,
{
    /// Creates a server without starting its worker. Messages sent before
    /// [`Server::start`] wait in the mailbox.
    ///
    /// # Arguments
    ///
    /// * `kind` - Category of the server, used in logs and diagnostics.
    /// * `id` - Identifier of the server within its kind.
    /// * `mutator` - Access point to the state.
    /// * `config` - Deadlock timeout, deadlock callback and node pool.
    ///
    pub fn new(
        kind: impl Into<String>,
        id: Id,
        mutator: impl StateMutator<S>,
        config: ServerConfig<Id, S>,
    ) -> Self {
        let pool = config
            .message_pool
            .clone()
            .unwrap_or_else(crate::config::private_pool::<S>);
        let inner = Inner {
            kind: kind.into(),
            id,
            mutator: Box::new(mutator),
            mailbox: Mailbox::new(pool),
            terminated: CancellationToken::new(),
            started: AtomicBool::new(false),
            config,
        };
        debug!("Creating server {} `{}`.", &inner.kind, &inner.id);

        let inner = Arc::new(inner);
        // Only a running worker keeps `inner` alive past the last handle.
        let worker = Arc::downgrade(&inner);
        let release = Release(Some(Box::new(move || {
            if let Some(inner) = worker.upgrade() {
                inner.release();
            }
        })));
        Self {
            inner,
            release: Arc::new(release),
        }
    }

    /// Creates a server and starts its worker.
    pub fn spawn(
        kind: impl Into<String>,
        id: Id,
        mutator: impl StateMutator<S>,
        config: ServerConfig<Id, S>,
    ) -> Self {
        let server = Self::new(kind, id, mutator, config);
        server.start();
        server
    }

    /// Starts the worker thread. Only the first call has an effect.
    ///
    /// The worker logs under the span that is current when this is called.
    /// If the thread cannot be spawned, the server is closed and terminated.
    pub fn start(&self) {
        if self.inner.started.swap(true, Ordering::AcqRel) {
            warn!(
                "Server {} `{}` already started.",
                &self.inner.kind, &self.inner.id
            );
            return;
        }

        let inner = self.inner.clone();
        let span = Span::current();
        let spawned = thread::Builder::new()
            .name("server-worker".to_owned())
            .spawn(move || {
                futures::executor::block_on(inner.run().instrument(span))
            });
        if let Err(error) = spawned {
            error!(
                "Can't start server {} `{}`: {}",
                &self.inner.kind, &self.inner.id, error
            );
            self.inner.mailbox.close();
            self.inner.terminated.cancel();
        }
    }

    /// Server identifier.
    pub fn id(&self) -> &Id {
        &self.inner.id
    }

    /// Server kind.
    pub fn kind(&self) -> &str {
        &self.inner.kind
    }

    /// Number of messages waiting in the mailbox.
    pub fn queued(&self) -> usize {
        self.inner.mailbox.len()
    }

    /// True once the worker has exited.
    pub fn is_terminated(&self) -> bool {
        self.inner.terminated.is_cancelled()
    }

    /// Waits until the worker has exited.
    pub async fn terminated(&self) {
        self.inner.terminated.cancelled().await;
    }

    /// Queues `handler` to be applied with `message`, without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeadActor`] if the mailbox is closed.
    ///
    pub fn cast<M, F>(&self, message: M, handler: F) -> Result<(), Error>
    where
        M: Send + 'static,
        F: FnOnce(&mut S, M) -> Result<(), Error> + Send + 'static,
    {
        if !self.inner.mailbox.send(Handler::cast(message, handler)) {
            debug!("Cast to dead server {}.", self.marker());
            return Err(self.dead());
        }
        Ok(())
    }

    /// Queues `handler` to be applied with `message` and waits for its result.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeadActor`] if the mailbox is closed,
    /// [`Error::Discarded`] if the handler was dropped without running,
    /// [`Error::CallTimeout`] if no result arrived within the deadlock
    /// timeout, or the handler's own error.
    ///
    pub async fn call<M, R, F>(&self, message: M, handler: F) -> Result<R, Error>
    where
        M: Send + 'static,
        R: Send + 'static,
        F: FnOnce(&mut S, M) -> Result<R, Error> + Send + 'static,
    {
        let (rsvp, response) = oneshot::channel();
        if !self.inner.mailbox.send(Handler::call(message, handler, rsvp)) {
            debug!("Call to dead server {}.", self.marker());
            return Err(self.dead());
        }

        match tokio::time::timeout(self.inner.config.deadlock_timeout, response)
            .await
        {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::Discarded {
                kind: self.inner.kind.clone(),
                id: self.inner.id.to_string(),
            }),
            Err(_) => Err(self.handle_timeout()),
        }
    }

    /// Asks the server to stop and waits until its worker exits or `until` is
    /// cancelled. Messages queued before the request are applied first; the
    /// finalizer then sees the final state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeadActor`] if the mailbox is already closed and
    /// [`Error::ShutdownIncomplete`] if `until` fires first. In the latter case
    /// the server may still stop in the background.
    ///
    pub async fn shutdown<F>(
        &self,
        reason: ShutdownReason,
        finalizer: F,
        until: &CancellationToken,
    ) -> Result<(), Error>
    where
        F: FnOnce(&S, ShutdownReason) -> Result<(), Error> + Send + 'static,
    {
        if !self.inner.mailbox.send(Handler::shutdown(reason, finalizer)) {
            debug!("Shutdown of dead server {}.", self.marker());
            return Err(self.dead());
        }

        tokio::select! {
            biased;
            _ = self.inner.terminated.cancelled() => Ok(()),
            _ = until.cancelled() => Err(Error::ShutdownIncomplete {
                kind: self.inner.kind.clone(),
                id: self.inner.id.to_string(),
            }),
        }
    }

    /// Copy of the current state.
    pub async fn get(&self) -> Result<S, Error>
    where
        S: Clone,
    {
        self.call((), |state: &mut S, _| Ok(state.clone())).await
    }

    fn marker(&self) -> String {
        trace::marker(&self.inner.kind, &self.inner.id)
    }

    fn dead(&self) -> Error {
        Error::DeadActor {
            kind: self.inner.kind.clone(),
            id: self.inner.id.to_string(),
        }
    }

    fn handle_timeout(&self) -> Error {
        let trace = match trace::find(&trace::dump(), &self.marker()) {
            Some(block) => Trace::Server(block),
            None => Trace::Caller(trace::caller()),
        };
        warn!(
            "Call to {} timed out after {:?}.",
            self.marker(),
            self.inner.config.deadlock_timeout
        );

        if let Some(callback) = &self.inner.config.deadlock_callback {
            callback(self, trace.text());
        }
        Error::CallTimeout(CallTimeout {
            kind: self.inner.kind.clone(),
            id: self.inner.id.to_string(),
            trace,
        })
    }
}

impl<Id, S> Inner<Id, S>
where
    Id: ServerId,
    S: Send + 'static,
{
    async fn run(self: Arc<Self>) {
        debug!("Running server {} `{}`.", &self.kind, &self.id);
        let frame = WorkerFrame::register(trace::marker(&self.kind, &self.id));

        while let Some(handler) = self.mailbox.receive().await {
            if handler.is_shutdown() {
                debug!("Stopping server {} `{}`.", &self.kind, &self.id);
                self.mailbox.close();
            }

            frame.applying(handler.variant(), handler.label());
            let (delivery, result) = self.apply(handler);
            frame.waiting();

            if let Err(error) = result {
                error!(
                    "Processing message in {} `{}`: {}",
                    &self.kind, &self.id, error
                );
                self.mailbox.close();
            }
            delivery.run();
        }

        drop(frame);
        debug!("Server {} `{}` is terminated.", &self.kind, &self.id);
        self.terminated.cancel();
    }

    fn release(&self) {
        let stop = Handler::shutdown(
            ShutdownReason::Normal,
            |_: &S, _: ShutdownReason| -> Result<(), Error> { Ok(()) },
        );
        if self.mailbox.send(stop) {
            debug!(
                "Last handle to server {} `{}` dropped, stopping it.",
                &self.kind, &self.id
            );
        }
    }

    fn apply(&self, handler: Handler<S>) -> Applied {
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            self.mutator
                .mutate(Box::new(move |state: &mut S| handler.apply(state)))
        }));
        outcome.unwrap_or_else(|panic| {
            (Delivery::none(), Err(Error::Panicked(panic_message(&*panic))))
        })
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_owned()
    }
}

impl<Id, S> Clone for Server<Id, S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            release: self.release.clone(),
        }
    }
}

impl<Id: Display, S> fmt::Debug for Server<Id, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("kind", &self.inner.kind)
            .field("id", &self.inner.id.to_string())
            .field("terminated", &self.inner.terminated.is_cancelled())
            .finish()
    }
}
