// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Mailbox
//!
//! Unbounded FIFO queue feeding a server worker. Senders never wait for
//! capacity, only for the short critical section guarding the queue. The
//! receiving side suspends while the mailbox is open and empty.
//!
//! Queue nodes come from a [`Pool`] and go back to it as soon as their message
//! is taken out, either by [`Mailbox::receive`] or by [`Mailbox::close`].
//!

use crate::pool::{Pool, SyncPool};

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, error};

use std::{collections::VecDeque, sync::Arc};

/// Message that can travel through a [`Mailbox`].
///
/// A mailbox refuses the "zero" value of its message type. Types without a
/// meaningful zero value keep the default implementation.
pub trait Mail: Send + 'static {
    /// True if this value is the empty message of its type.
    fn is_zero(&self) -> bool {
        false
    }
}

macro_rules! zero_mail {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Mail for $ty {
                fn is_zero(&self) -> bool {
                    *self == <$ty>::default()
                }
            }
        )*
    };
}

zero_mail!(
    bool, char, u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize,
    String, &'static str
);

impl<T: Send + 'static> Mail for Option<T> {
    fn is_zero(&self) -> bool {
        self.is_none()
    }
}

/// Pooled queue node holding one message.
pub struct Node<T> {
    message: Option<T>,
}

impl<T> Default for Node<T> {
    fn default() -> Self {
        Self { message: None }
    }
}

/// Shared node pool for mailboxes carrying `T`.
pub type NodePool<T> = Arc<dyn Pool<Node<T>>>;

/// Outcome of a non-blocking receive.
#[derive(Debug, PartialEq, Eq)]
pub enum Received<T> {
    /// The head message.
    Message(T),
    /// Open but nothing queued.
    Empty,
    /// Closed and nothing queued.
    Closed,
}

struct Queue<T> {
    nodes: VecDeque<Box<Node<T>>>,
    open: bool,
}

/// Unbounded multi-producer mailbox.
pub struct Mailbox<T> {
    queue: Mutex<Queue<T>>,
    signal: Notify,
    pool: NodePool<T>,
}

impl<T: Mail> Mailbox<T> {
    /// Creates an open mailbox taking nodes from `pool`.
    pub fn new(pool: NodePool<T>) -> Self {
        Self {
            queue: Mutex::new(Queue {
                nodes: VecDeque::new(),
                open: true,
            }),
            signal: Notify::new(),
            pool,
        }
    }

    /// Enqueues `message` as the new tail.
    ///
    /// # Returns
    ///
    /// Returns false, dropping the message, if the message is the zero value
    /// of its type or if the mailbox is closed.
    ///
    pub fn send(&self, message: T) -> bool {
        if message.is_zero() {
            debug!("Rejecting empty message.");
            return false;
        }

        let mut queue = self.queue.lock();
        if !queue.open {
            return false;
        }
        let mut node = self.pool.get();
        node.message = Some(message);
        queue.nodes.push_back(node);
        drop(queue);

        self.signal.notify_one();
        true
    }

    /// Takes the head message without waiting.
    pub fn try_receive(&self) -> Received<T> {
        loop {
            let mut queue = self.queue.lock();
            let Some(mut node) = queue.nodes.pop_front() else {
                return if queue.open {
                    Received::Empty
                } else {
                    Received::Closed
                };
            };
            drop(queue);

            let message = node.message.take();
            self.pool.put(node);
            debug_assert!(
                message.is_some(),
                "mailbox node queued without a message"
            );
            match message {
                Some(message) => return Received::Message(message),
                None => {
                    error!("Skipping mailbox node queued without a message.")
                }
            }
        }
    }

    /// Waits for the head message.
    ///
    /// # Returns
    ///
    /// Returns `None` once the mailbox is closed and no message is left.
    ///
    pub async fn receive(&self) -> Option<T> {
        loop {
            let notified = self.signal.notified();
            tokio::pin!(notified);
            // Register before looking at the queue so a send or close racing
            // with the check still wakes this receiver.
            notified.as_mut().enable();

            match self.try_receive() {
                Received::Message(message) => return Some(message),
                Received::Closed => return None,
                Received::Empty => notified.await,
            }
        }
    }

    /// Closes the mailbox. Queued messages are dropped and their nodes go back
    /// to the pool. Calling it again does nothing.
    pub fn close(&self) {
        let drained = {
            let mut queue = self.queue.lock();
            if !queue.open {
                return;
            }
            queue.open = false;
            std::mem::take(&mut queue.nodes)
        };

        if !drained.is_empty() {
            debug!("Discarding {} queued messages.", drained.len());
        }
        for mut node in drained {
            node.message = None;
            self.pool.put(node);
        }
        self.signal.notify_waiters();
    }

    /// True once [`Mailbox::close`] has been called.
    pub fn is_closed(&self) -> bool {
        !self.queue.lock().open
    }

    /// Number of queued messages.
    pub fn len(&self) -> usize {
        self.queue.lock().nodes.len()
    }

    /// True if no message is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Mail> Default for Mailbox<T> {
    fn default() -> Self {
        Self::new(Arc::new(SyncPool::<Node<T>>::new()))
    }
}
