// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! ucrun - run a service script under the host runtime
//!
//! ```bash
//! ucrun service.rhai --flag value
//! UCRUN_BUS_SOCKET=/tmp/bus.sock ucrun -v service.rhai
//! ```

use clap::error::ErrorKind;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use ucrun_host::error::report;
use ucrun_host::{HostConfig, HostError, Runtime, VERSION};

#[derive(Parser)]
#[command(
    name = "ucrun",
    about = "Run a service script with timers, child processes, bus methods and logging",
    version = VERSION,
    author = "Pegasus Heavy Industries"
)]
struct Cli {
    /// Script file to run
    script: PathBuf,

    /// Arguments passed to the script as ARGV
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,

    /// Bus daemon socket
    #[arg(long, env = "UCRUN_BUS_SOCKET", default_value = ucrun_host::config::DEFAULT_BUS_SOCKET)]
    bus_socket: PathBuf,

    /// Delay between bus reconnect attempts, in milliseconds
    #[arg(long, env = "UCRUN_RECONNECT_MS", default_value_t = 1000)]
    reconnect_interval: u64,

    /// Leave children running when the host exits
    #[arg(long)]
    keep_children: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn into_config(self) -> HostConfig {
        HostConfig::new(self.script)
            .with_args(self.args)
            .with_bus_socket(self.bus_socket)
            .with_reconnect_interval(Duration::from_millis(self.reconnect_interval))
            .with_terminate_children(!self.keep_children)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = e.print();
            std::process::exit(0);
        }
        Err(e) => {
            let error = HostError::usage(&e.to_string());
            std::process::exit(report(&error));
        }
    };

    // Initialize logging
    let default_filter = if cli.verbose {
        "ucrun=debug,ucrun_host=debug,ucrun_bus=debug"
    } else {
        "ucrun=warn,ucrun_host=warn,ucrun_bus=warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = cli.into_config();
    tracing::debug!(script = %config.script.display(), args = ?config.args, "Starting host");
    let runtime = Runtime::new(config);
    std::process::exit(runtime.run_to_completion().await);
}
