// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Auto-reconnecting bus session
//!
//! The session runs as a background task: connect, register the object,
//! announce [`BusEvent::Connected`], then shuttle calls to the owner and
//! replies back to the bus until the connection drops. After a drop it
//! announces [`BusEvent::Disconnected`], waits the retry interval and starts
//! over, re-registering the same object.
//!
//! Calls handed to the owner carry session-local ids. A reply is only
//! written if its call came from the connection that is still open; replies
//! to calls from an earlier connection are discarded.

use crate::message::{BusEvent, ObjectSpec, Reply, RequestId};
use crate::transport::{Connection, Transport};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Owner side of an auto-connecting session
#[derive(Debug)]
pub struct BusLink {
    replies: Option<mpsc::UnboundedSender<Reply>>,
    task: Option<JoinHandle<()>>,
}

impl BusLink {
    /// Queue a reply for the current connection
    ///
    /// Returns `false` when the session is gone.
    pub fn reply(&self, reply: Reply) -> bool {
        self.replies
            .as_ref()
            .is_some_and(|replies| replies.send(reply).is_ok())
    }

    /// Stop the session after it has written every queued reply
    ///
    /// The session is aborted if it does not finish within `grace`.
    pub async fn close(mut self, grace: Duration) {
        self.replies = None;
        let Some(mut task) = self.task.take() else {
            return;
        };
        if tokio::time::timeout(grace, &mut task).await.is_err() {
            tracing::warn!("Bus session did not finish in time, aborting");
            task.abort();
        }
    }

    /// Tear the session down at once, dropping queued replies
    pub fn shutdown(mut self) {
        self.abort();
    }

    fn abort(&mut self) {
        self.replies = None;
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for BusLink {
    fn drop(&mut self) {
        self.abort();
    }
}

/// Entry point for auto-connecting sessions
pub struct AutoConnection;

impl AutoConnection {
    /// Spawn a session publishing `object` through `transport`
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        transport: Arc<dyn Transport>,
        object: ObjectSpec,
        retry: Duration,
    ) -> (BusLink, mpsc::UnboundedReceiver<BusEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();

        let session = Session {
            transport,
            object,
            events: event_tx,
            replies: reply_rx,
            retry,
            next_id: 0,
            in_flight: HashMap::new(),
        };
        let task = tokio::spawn(session.run());

        (
            BusLink {
                replies: Some(reply_tx),
                task: Some(task),
            },
            event_rx,
        )
    }
}

/// How a served connection ended
enum Ended {
    /// The bus side hung up; reconnect
    Dropped,
    /// The owner is gone; stop
    Closed,
}

struct Session {
    transport: Arc<dyn Transport>,
    object: ObjectSpec,
    events: mpsc::UnboundedSender<BusEvent>,
    replies: mpsc::UnboundedReceiver<Reply>,
    retry: Duration,
    next_id: RequestId,
    /// Session id to bus id, for calls on the current connection
    in_flight: HashMap<RequestId, RequestId>,
}

impl Session {
    async fn run(mut self) {
        loop {
            match self.transport.connect().await {
                Ok(mut conn) => match conn.add_object(&self.object).await {
                    Ok(()) => {
                        tracing::info!(object = %self.object.name, "Connected to bus");
                        if self.events.send(BusEvent::Connected).is_err() {
                            return;
                        }

                        let ended = self.serve(conn.as_mut()).await;
                        self.in_flight.clear();
                        if let Ended::Closed = ended {
                            return;
                        }

                        tracing::info!(object = %self.object.name, "Lost bus connection");
                        if self.events.send(BusEvent::Disconnected).is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(object = %self.object.name, error = %e, "Failed to register object");
                    }
                },
                Err(e) => {
                    tracing::debug!(error = %e, "Bus connect failed");
                }
            }

            if let Ended::Closed = self.wait_retry().await {
                return;
            }
        }
    }

    /// Serve one connection until either side goes away
    async fn serve(&mut self, conn: &mut dyn Connection) -> Ended {
        loop {
            tokio::select! {
                biased;
                reply = self.replies.recv() => match reply {
                    Some(reply) => {
                        if let Err(e) = self.send_reply(conn, reply).await {
                            tracing::warn!(error = %e, "Failed to send reply");
                            return Ended::Dropped;
                        }
                    }
                    None => return Ended::Closed,
                },
                request = conn.recv() => match request {
                    Ok(Some(mut request)) => {
                        let local = self.next_id;
                        self.next_id = self.next_id.wrapping_add(1);
                        self.in_flight.insert(local, request.id);

                        tracing::debug!(id = request.id, local, method = %request.method, "Inbound call");
                        request.id = local;
                        if self.events.send(BusEvent::Call(request)).is_err() {
                            return Ended::Closed;
                        }
                    }
                    Ok(None) => return Ended::Dropped,
                    Err(e) => {
                        tracing::warn!(error = %e, "Bus receive failed");
                        return Ended::Dropped;
                    }
                },
            }
        }
    }

    async fn send_reply(&mut self, conn: &mut dyn Connection, mut reply: Reply) -> crate::Result<()> {
        let Some(bus_id) = self.in_flight.remove(&reply.id) else {
            tracing::debug!(id = reply.id, "Dropping reply to a call from a closed connection");
            return Ok(());
        };
        reply.id = bus_id;
        conn.reply(reply).await
    }

    /// Sleep out the retry interval, discarding replies that have no connection
    async fn wait_retry(&mut self) -> Ended {
        let sleep = tokio::time::sleep(self.retry);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return Ended::Dropped,
                reply = self.replies.recv() => match reply {
                    Some(reply) => {
                        tracing::debug!(id = reply.id, "Dropping reply while disconnected");
                    }
                    None => return Ended::Closed,
                },
            }
        }
    }
}
