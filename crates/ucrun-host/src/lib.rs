// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # ucrun-host
//!
//! Host runtime for long-running service scripts. A script is an ordinary
//! [rhai](https://rhai.rs) program that defines a `start` function, and
//! optionally `stop`, and uses a few natives to schedule work:
//!
//! - `uloop_timeout(cb, ms[, private])` - one-shot timer; returning an
//!   integer from `cb` rearms it
//! - `uloop_process(cb, argv[, private])` - run a command, `cb` gets the
//!   exit status
//! - `uloop_end()` - leave the event loop
//! - `ulog_info`, `ulog_note`, `ulog_warn`, `ulog_err` - logging
//! - `exit([code])` - terminate with a status
//!
//! A global `ubus` object publishes methods on the system bus and a global
//! `ulog` object selects log channels.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ucrun_host::{HostConfig, Runtime};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let runtime = Runtime::new(HostConfig::new("service.rhai"));
//!     std::process::exit(runtime.run_to_completion().await);
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bridge;
pub mod config;
pub mod error;
pub mod globals;
pub mod rpc;
pub mod runtime;
pub mod table;
pub mod vm;

// Re-exports
pub use config::HostConfig;
pub use error::{DeclarationError, HostError, Result, ScriptError};
pub use runtime::{Phase, Runtime, StopHandle};

/// Version of the host runtime
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
