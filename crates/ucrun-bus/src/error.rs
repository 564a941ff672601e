// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Error types for the bus client

use thiserror::Error;

/// Result type for bus operations
pub type Result<T> = std::result::Result<T, BusError>;

/// Errors that can occur talking to the bus
#[derive(Debug, Error)]
pub enum BusError {
    /// Socket error
    #[error("Bus I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A frame could not be encoded or decoded
    #[error("Malformed bus frame: {0}")]
    Frame(#[from] serde_json::Error),

    /// The connection went away
    #[error("Bus connection closed")]
    Disconnected,

    /// Call addressed to an object nobody registered
    #[error("No such object '{0}'")]
    NoSuchObject(String),
}
