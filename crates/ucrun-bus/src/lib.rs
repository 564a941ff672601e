// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # ucrun-bus
//!
//! Client side of the system message bus used by the ucrun script host.
//!
//! ## Layers
//!
//! - [`attr`]: ordered attribute tables carried by calls and replies
//! - [`transport`]: how a connection is opened and driven
//! - [`auto`]: a background session that keeps an object published across
//!   bus restarts
//! - [`unix`] and [`memory`]: concrete transports

#![warn(missing_docs)]

pub mod attr;
pub mod auto;
pub mod error;
pub mod memory;
pub mod message;
pub mod transport;
pub mod unix;

pub use attr::{AttrValue, Table};
pub use auto::{AutoConnection, BusLink};
pub use error::{BusError, Result};
pub use memory::MemoryBus;
pub use message::{BusEvent, ObjectSpec, Reply, Request, RequestId, Status};
pub use transport::{Connection, Transport};
pub use unix::UnixTransport;
