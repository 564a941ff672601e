// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Host configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default bus daemon socket
pub const DEFAULT_BUS_SOCKET: &str = "/var/run/ubus/ubus.sock";

/// Default delay between bus reconnect attempts
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_millis(1000);

/// Settings for one host run
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Script to load
    pub script: PathBuf,
    /// Arguments exposed to the script as `ARGV`
    pub args: Vec<String>,
    /// Bus daemon socket
    pub bus_socket: PathBuf,
    /// Delay between bus reconnect attempts
    pub reconnect_interval: Duration,
    /// Send `SIGTERM` to children still running at shutdown
    pub terminate_children: bool,
}

impl HostConfig {
    /// Defaults for running `script`
    pub fn new(script: impl AsRef<Path>) -> Self {
        Self {
            script: script.as_ref().to_path_buf(),
            args: Vec::new(),
            bus_socket: PathBuf::from(DEFAULT_BUS_SOCKET),
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            terminate_children: true,
        }
    }

    /// Set the script arguments
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Set the bus socket
    pub fn with_bus_socket(mut self, path: impl AsRef<Path>) -> Self {
        self.bus_socket = path.as_ref().to_path_buf();
        self
    }

    /// Set the reconnect interval
    pub fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    /// Choose whether children still running at shutdown are terminated
    pub fn with_terminate_children(mut self, terminate: bool) -> Self {
        self.terminate_children = terminate;
        self
    }
}
