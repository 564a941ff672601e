// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Requests, replies and object registration

use crate::attr::Table;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Correlation id of an inbound call, unique per connection
pub type RequestId = u32;

/// Transport-level status of a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Call handled
    Ok,
    /// Malformed command
    InvalidCommand,
    /// Malformed argument
    InvalidArgument,
    /// The object has no such method
    MethodNotFound,
    /// No such object
    NotFound,
    /// Call produced no data
    NoData,
    /// Caller is not allowed to invoke the method
    PermissionDenied,
    /// Call timed out
    Timeout,
    /// Operation is not supported
    NotSupported,
    /// Unclassified failure
    UnknownError,
    /// Bus connection failed
    ConnectionFailed,
}

impl Status {
    /// Numeric code as used by the system bus
    pub fn code(self) -> i32 {
        match self {
            Status::Ok => 0,
            Status::InvalidCommand => 1,
            Status::InvalidArgument => 2,
            Status::MethodNotFound => 3,
            Status::NotFound => 4,
            Status::NoData => 5,
            Status::PermissionDenied => 6,
            Status::Timeout => 7,
            Status::NotSupported => 8,
            Status::UnknownError => 9,
            Status::ConnectionFailed => 10,
        }
    }

    /// Whether the call succeeded
    pub fn is_ok(self) -> bool {
        self == Status::Ok
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Status::Ok => "success",
            Status::InvalidCommand => "invalid command",
            Status::InvalidArgument => "invalid argument",
            Status::MethodNotFound => "method not found",
            Status::NotFound => "not found",
            Status::NoData => "no response",
            Status::PermissionDenied => "permission denied",
            Status::Timeout => "request timed out",
            Status::NotSupported => "operation not supported",
            Status::UnknownError => "unknown error",
            Status::ConnectionFailed => "connection failed",
        };
        write!(f, "{} ({})", text, self.code())
    }
}

/// An inbound method call
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Correlation id, echoed in the reply
    pub id: RequestId,
    /// Target object name
    pub object: String,
    /// Method name
    pub method: String,
    /// Call payload, if the caller sent one
    pub data: Option<Table>,
}

/// Answer to a [`Request`]
///
/// `status` is always delivered; `data` only when a reply frame is due.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    /// Correlation id of the request being answered
    pub id: RequestId,
    /// Transport status
    pub status: Status,
    /// Reply payload
    pub data: Option<Table>,
}

impl Reply {
    /// Status-only reply
    pub fn status(id: RequestId, status: Status) -> Self {
        Self {
            id,
            status,
            data: None,
        }
    }
}

/// Object published on the bus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectSpec {
    /// Bus-visible object name
    pub name: String,
    /// Exported method names
    pub methods: Vec<String>,
}

impl ObjectSpec {
    /// Whether `method` is exported
    pub fn has_method(&self, method: &str) -> bool {
        self.methods.iter().any(|m| m == method)
    }
}

/// Lifecycle and call notifications from an auto-connecting session
#[derive(Debug, Clone, PartialEq)]
pub enum BusEvent {
    /// The connection came up and the object is registered
    Connected,
    /// The connection dropped; a reconnect is pending
    Disconnected,
    /// An inbound call awaiting a [`Reply`]
    Call(Request),
}
