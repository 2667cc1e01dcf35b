// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Message handlers
//!
//! Every message queued for a server is a [`Handler`]: a call, a cast or a
//! shutdown request. The payload and result types of each request are erased
//! into boxed closures when the handler is built, so one mailbox carries all
//! three variants for a given state type.
//!
//! Applying a handler yields a [`Delivery`], the side effect to run once the
//! state has been released (publishing a call result), and the status of the
//! application itself.
//!

use crate::{Error, mailbox::Mail};

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::debug;

use std::{any::type_name, fmt};

/// Result of applying a handler to the state.
pub type Applied = (Delivery, Result<(), Error>);

/// Function handed to a [`StateMutator`], to be run against the state.
pub type StateFn<'a, S> = Box<dyn FnOnce(&mut S) -> Applied + 'a>;

/// Sender side of a call result channel.
pub type ResultSender<R> = oneshot::Sender<Result<R, Error>>;

type CallApply<S> = Box<dyn FnOnce(&mut S) -> Applied + Send>;
type CastApply<S> = Box<dyn FnOnce(&mut S) -> Result<(), Error> + Send>;
type Finalizer<S> =
    Box<dyn FnOnce(&S, ShutdownReason) -> Result<(), Error> + Send>;

/// Access point to the state owned by a server.
///
/// The server worker never touches its state directly. It hands the
/// application of each message to the mutator, which finds and locks the
/// real storage, runs `apply` on it and returns what `apply` returned. If the
/// state can not be reached the mutator returns an error without running
/// `apply`.
pub trait StateMutator<S>: Send + Sync + 'static {
    /// Runs `apply` against the state.
    fn mutate(&self, apply: StateFn<'_, S>) -> Applied;
}

impl<S, F> StateMutator<S> for F
where
    F: for<'a> Fn(StateFn<'a, S>) -> Applied + Send + Sync + 'static,
{
    fn mutate(&self, apply: StateFn<'_, S>) -> Applied {
        self(apply)
    }
}

/// Side effect produced by a handler, run by the worker after the state
/// mutator returns.
#[derive(Default)]
pub struct Delivery(Option<Box<dyn FnOnce() + Send>>);

impl Delivery {
    /// A delivery that does nothing.
    pub fn none() -> Self {
        Self(None)
    }

    /// Wraps a side effect.
    pub fn new(effect: impl FnOnce() + Send + 'static) -> Self {
        Self(Some(Box::new(effect)))
    }

    /// Runs the side effect, if any.
    pub fn run(self) {
        if let Some(effect) = self.0 {
            effect();
        }
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Delivery").field(&self.0.is_some()).finish()
    }
}

/// Why a server is asked to stop. The runtime treats both values the same
/// way; the finalizer decides what they mean.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub enum ShutdownReason {
    /// Graceful stop.
    #[default]
    Normal,
    /// Forced stop.
    BrutalKill,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::Normal => write!(f, "normal"),
            ShutdownReason::BrutalKill => write!(f, "brutal kill"),
        }
    }
}

/// Message queued in a server mailbox.
pub enum Handler<S> {
    /// Request expecting a result.
    Call {
        label: &'static str,
        apply: CallApply<S>,
    },
    /// Fire-and-forget request.
    Cast {
        label: &'static str,
        apply: CastApply<S>,
    },
    /// Stop request carrying the finalizer.
    Shutdown {
        label: &'static str,
        reason: ShutdownReason,
        finalizer: Finalizer<S>,
    },
}

impl<S> Handler<S> {
    /// Builds a call. The outcome of `handler` is published on `rsvp` by the
    /// delivery step; an error is also reported to the worker.
    pub fn call<M, R, F>(message: M, handler: F, rsvp: ResultSender<R>) -> Self
    where
        M: Send + 'static,
        R: Send + 'static,
        F: FnOnce(&mut S, M) -> Result<R, Error> + Send + 'static,
    {
        Handler::Call {
            label: type_name::<F>(),
            apply: Box::new(move |state| {
                let result = handler(state, message);
                let status = match &result {
                    Ok(_) => Ok(()),
                    Err(error) => Err(error.clone()),
                };
                let delivery = Delivery::new(move || {
                    if rsvp.send(result).is_err() {
                        debug!("Caller stopped waiting, result dropped.");
                    }
                });
                (delivery, status)
            }),
        }
    }

    /// Builds a cast.
    pub fn cast<M, F>(message: M, handler: F) -> Self
    where
        M: Send + 'static,
        F: FnOnce(&mut S, M) -> Result<(), Error> + Send + 'static,
    {
        Handler::Cast {
            label: type_name::<F>(),
            apply: Box::new(move |state| handler(state, message)),
        }
    }

    /// Builds a shutdown request.
    pub fn shutdown<F>(reason: ShutdownReason, finalizer: F) -> Self
    where
        F: FnOnce(&S, ShutdownReason) -> Result<(), Error> + Send + 'static,
    {
        Handler::Shutdown {
            label: type_name::<F>(),
            reason,
            finalizer: Box::new(finalizer),
        }
    }

    /// True for shutdown requests.
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Handler::Shutdown { .. })
    }

    /// Variant name, used in diagnostics.
    pub fn variant(&self) -> &'static str {
        match self {
            Handler::Call { .. } => "call",
            Handler::Cast { .. } => "cast",
            Handler::Shutdown { .. } => "shutdown",
        }
    }

    /// Type name of the function carried by the handler.
    pub fn label(&self) -> &'static str {
        match self {
            Handler::Call { label, .. }
            | Handler::Cast { label, .. }
            | Handler::Shutdown { label, .. } => label,
        }
    }

    /// Applies the handler to the state.
    pub fn apply(self, state: &mut S) -> Applied {
        match self {
            Handler::Call { apply, .. } => apply(state),
            Handler::Cast { apply, .. } => (Delivery::none(), apply(state)),
            Handler::Shutdown {
                reason, finalizer, ..
            } => (Delivery::none(), finalizer(state, reason)),
        }
    }
}

impl<S: 'static> Mail for Handler<S> {}

impl<S> fmt::Debug for Handler<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("variant", &self.variant())
            .field("label", &self.label())
            .finish()
    }
}
