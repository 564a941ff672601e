// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Inbound call dispatch

use crate::bridge;
use crate::error::ScriptError;
use crate::rpc::declaration::ServiceDeclaration;
use crate::vm::Vm;
use ucrun_bus::{Status, Table};

/// Result of dispatching one call
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    /// Transport status
    pub status: Status,
    /// Reply payload; `None` means no reply frame
    pub reply: Option<Table>,
    /// Failure raised by the method, already answered with `Ok`
    pub error: Option<ScriptError>,
}

impl Dispatch {
    fn status(status: Status) -> Self {
        Self {
            status,
            reply: None,
            error: None,
        }
    }
}

/// Invoke `method` with `data` and build the answer
///
/// The reply table is built fresh for each call.
pub fn dispatch(vm: &Vm, decl: &ServiceDeclaration, method: &str, data: Option<&Table>) -> Dispatch {
    let Some(callback) = decl.method(method).and_then(|m| m.callback.as_ref()) else {
        return Dispatch::status(Status::MethodNotFound);
    };

    let result = match data {
        Some(data) => vm.call(callback, (bridge::table_to_dynamic(data),)),
        None => vm.call(callback, ()),
    };

    match result {
        Ok(value) => Dispatch {
            status: Status::Ok,
            reply: bridge::dynamic_to_table(&value).filter(|t| !t.is_empty()),
            error: None,
        },
        Err(e) => Dispatch {
            status: Status::Ok,
            reply: None,
            error: Some(e),
        },
    }
}
