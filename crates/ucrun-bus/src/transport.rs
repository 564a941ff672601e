// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Transport abstraction
//!
//! A [`Transport`] knows how to reach the bus; each successful connect yields
//! a [`Connection`] that carries one object registration and its calls until
//! the peer hangs up.

use crate::error::Result;
use crate::message::{ObjectSpec, Reply, Request};
use async_trait::async_trait;

/// Something that can open bus connections
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a new connection
    async fn connect(&self) -> Result<Box<dyn Connection>>;
}

/// One live bus connection
#[async_trait]
pub trait Connection: Send {
    /// Publish `object` on this connection
    async fn add_object(&mut self, object: &ObjectSpec) -> Result<()>;

    /// Wait for the next inbound call; `None` once the peer hung up
    ///
    /// Must be cancel-safe: it is raced against outgoing replies.
    async fn recv(&mut self) -> Result<Option<Request>>;

    /// Answer a call
    async fn reply(&mut self, reply: Reply) -> Result<()>;
}
