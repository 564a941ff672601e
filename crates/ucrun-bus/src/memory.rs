// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! In-process bus
//!
//! [`MemoryBus`] is a complete [`Transport`] that never leaves the process.
//! Clones share one bus: hand one clone to the host as its transport and keep
//! another to issue calls, await registrations and force disconnects.

use crate::attr::Table;
use crate::error::{BusError, Result};
use crate::message::{ObjectSpec, Reply, Request, RequestId, Status};
use crate::transport::{Connection, Transport};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Notify};

/// Shared in-process bus
#[derive(Clone, Default)]
pub struct MemoryBus {
    inner: Arc<Shared>,
}

#[derive(Default)]
struct Shared {
    state: Mutex<State>,
    changed: Notify,
}

#[derive(Default)]
struct State {
    objects: HashMap<String, Registration>,
    /// Waiting callers, keyed by request id and tagged with the serving connection
    pending: HashMap<RequestId, (usize, oneshot::Sender<Reply>)>,
    next_id: RequestId,
    connects: usize,
}

struct Registration {
    owner: usize,
    methods: Vec<String>,
    requests: mpsc::UnboundedSender<Request>,
}

impl MemoryBus {
    /// Create an empty bus
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of connections opened so far
    pub fn connect_count(&self) -> usize {
        self.inner.state.lock().connects
    }

    /// Methods exported by `object`, if it is registered
    pub fn object(&self, object: &str) -> Option<Vec<String>> {
        self.inner
            .state
            .lock()
            .objects
            .get(object)
            .map(|r| r.methods.clone())
    }

    /// Wait until `object` is registered and return its methods
    pub async fn wait_for_object(&self, object: &str) -> Vec<String> {
        loop {
            let notified = self.inner.changed.notified();
            if let Some(methods) = self.object(object) {
                return methods;
            }
            notified.await;
        }
    }

    /// Drop every connection, as if the bus daemon restarted
    ///
    /// Outstanding calls fail with [`BusError::Disconnected`].
    pub fn disconnect_all(&self) {
        let mut state = self.inner.state.lock();
        state.objects.clear();
        state.pending.clear();
        drop(state);
        self.inner.changed.notify_waiters();
    }

    /// Invoke `method` on `object` and wait for the reply
    pub async fn call(&self, object: &str, method: &str, data: Option<Table>) -> Result<Reply> {
        let rx = {
            let mut state = self.inner.state.lock();
            let id = state.next_id;

            let Some(registration) = state.objects.get(object) else {
                return Err(BusError::NoSuchObject(object.to_string()));
            };
            if !registration.methods.iter().any(|m| m == method) {
                return Ok(Reply::status(id, Status::MethodNotFound));
            }

            let request = Request {
                id,
                object: object.to_string(),
                method: method.to_string(),
                data,
            };
            if registration.requests.send(request).is_err() {
                return Err(BusError::Disconnected);
            }

            let owner = registration.owner;
            let (tx, rx) = oneshot::channel();
            state.next_id = state.next_id.wrapping_add(1);
            state.pending.insert(id, (owner, tx));
            rx
        };

        rx.await.map_err(|_| BusError::Disconnected)
    }
}

#[async_trait]
impl Transport for MemoryBus {
    async fn connect(&self) -> Result<Box<dyn Connection>> {
        let id = {
            let mut state = self.inner.state.lock();
            state.connects += 1;
            state.connects
        };
        let (tx, rx) = mpsc::unbounded_channel();
        Ok(Box::new(MemoryConnection {
            id,
            bus: self.clone(),
            requests: rx,
            sender: Some(tx),
        }))
    }
}

struct MemoryConnection {
    id: usize,
    bus: MemoryBus,
    requests: mpsc::UnboundedReceiver<Request>,
    /// Handed to the registration; the bus owns the only sender afterwards
    sender: Option<mpsc::UnboundedSender<Request>>,
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn add_object(&mut self, object: &ObjectSpec) -> Result<()> {
        let Some(sender) = self.sender.take() else {
            return Err(BusError::Disconnected);
        };
        self.bus.inner.state.lock().objects.insert(
            object.name.clone(),
            Registration {
                owner: self.id,
                methods: object.methods.clone(),
                requests: sender,
            },
        );
        self.bus.inner.changed.notify_waiters();
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<Request>> {
        Ok(self.requests.recv().await)
    }

    async fn reply(&mut self, reply: Reply) -> Result<()> {
        let waiter = self.bus.inner.state.lock().pending.remove(&reply.id);
        if let Some((_, waiter)) = waiter {
            let _ = waiter.send(reply);
        }
        Ok(())
    }
}

impl Drop for MemoryConnection {
    /// Unregister this connection's objects and fail the calls it never answered
    fn drop(&mut self) {
        let mut state = self.bus.inner.state.lock();
        state.objects.retain(|_, r| r.owner != self.id);
        state.pending.retain(|_, (owner, _)| *owner != self.id);
        drop(state);
        self.bus.inner.changed.notify_waiters();
    }
}
