// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Bus service published on behalf of the script

pub mod declaration;
pub mod dispatch;

pub use declaration::{MethodDecl, ServiceDeclaration};
pub use dispatch::{dispatch, Dispatch};

use crate::error::ScriptError;
use crate::vm::Vm;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use ucrun_bus::{AutoConnection, BusEvent, BusLink, Reply, Request, Status, Transport};

/// How long [`RpcService::close`] waits for pending replies to be written
const CLOSE_GRACE: Duration = Duration::from_millis(500);

/// An active service: the declaration plus its bus session
pub struct RpcService {
    declaration: ServiceDeclaration,
    link: BusLink,
}

impl RpcService {
    /// Start publishing `declaration` through `transport`
    ///
    /// Returns the service and the session's event stream.
    pub fn activate(
        declaration: ServiceDeclaration,
        transport: Arc<dyn Transport>,
        retry: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<BusEvent>) {
        let object = declaration.exported();
        tracing::info!(object = %object.name, methods = ?object.methods, "Publishing bus object");

        let (link, events) = AutoConnection::spawn(transport, object, retry);
        (Self { declaration, link }, events)
    }

    /// Bus object name
    pub fn object(&self) -> &str {
        &self.declaration.object
    }

    /// Run the connect hook, if any
    pub fn on_connect(&self, vm: &Vm) -> Option<ScriptError> {
        let hook = self.declaration.connect.as_ref()?;
        vm.call(hook, ()).err()
    }

    /// Dispatch an inbound call and send the answer
    pub fn handle_call(&self, vm: &Vm, request: Request) -> Option<ScriptError> {
        let result = if request.object == self.declaration.object {
            dispatch(vm, &self.declaration, &request.method, request.data.as_ref())
        } else {
            Dispatch {
                status: Status::NotFound,
                reply: None,
                error: None,
            }
        };

        tracing::debug!(
            id = request.id,
            method = %request.method,
            status = %result.status,
            reply = result.reply.is_some(),
            "Call dispatched"
        );

        let sent = self.link.reply(Reply {
            id: request.id,
            status: result.status,
            data: result.reply,
        });
        if !sent {
            tracing::warn!(id = request.id, "Bus session gone, reply dropped");
        }

        result.error
    }

    /// Disconnect from the bus, dropping replies not yet written
    pub fn shutdown(self) {
        tracing::debug!(object = %self.declaration.object, "Closing bus object");
        self.link.shutdown();
    }

    /// Write pending replies, then disconnect from the bus
    pub async fn close(self) {
        tracing::debug!(object = %self.declaration.object, "Closing bus object");
        self.link.close(CLOSE_GRACE).await;
    }
}
