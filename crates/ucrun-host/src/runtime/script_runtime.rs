// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Script runtime orchestration
//!
//! [`Runtime`] drives one script through its lifecycle:
//!
//! 1. compile the file
//! 2. run the top level once, then apply the `ulog` declaration
//! 3. call `start`
//! 4. publish the `ubus` declaration and run the event loop
//! 5. call `stop` unless the script crashed
//! 6. tear down timers, children, logging, the bus session and the program
//!
//! [`Runtime::run_to_completion`] runs all of it and returns the process
//! exit status.

use crate::config::HostConfig;
use crate::error::{HostError, Result, ScriptError};
use crate::globals::log::{LogDeclaration, Logger};
use crate::globals::{self, timers::TimerId};
use crate::rpc::{RpcService, ServiceDeclaration};
use crate::runtime::context::HostContext;
use crate::runtime::event_loop::{EventLoop, LoopEvent, StopHandle};
use crate::vm::{EntryPoint, Vm};
use nix::unistd::Pid;
use rhai::Engine;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;
use ucrun_bus::{BusEvent, Transport, UnixTransport};

/// How long children get to exit after `SIGTERM` before they are killed
const TERMINATE_GRACE: Duration = Duration::from_millis(100);

/// Lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Nothing loaded
    Uninitialized,
    /// Program compiled
    Compiled,
    /// Top-level code has run
    TopLevelExecuted,
    /// `start` returned
    Started,
    /// Inside the event loop
    Running,
    /// Event loop left
    StopRequested,
    /// Everything released
    TornDown,
}

/// A script host instance
pub struct Runtime {
    config: HostConfig,
    vm: Vm,
    ctx: Rc<HostContext>,
    event_loop: EventLoop,
    transport: Arc<dyn Transport>,
    rpc: Option<RpcService>,
    phase: Phase,
    crashed: bool,
}

impl Runtime {
    /// Create a runtime for `config`
    pub fn new(config: HostConfig) -> Self {
        let ctx = Rc::new(HostContext::new());
        let mut vm = Vm::new();
        globals::register_natives(vm.engine_mut(), &ctx);

        let transport: Arc<dyn Transport> = Arc::new(UnixTransport::new(&config.bus_socket));
        let event_loop = EventLoop::new(ctx.stop.clone());

        Self {
            config,
            vm,
            ctx,
            event_loop,
            transport,
            rpc: None,
            phase: Phase::Uninitialized,
            crashed: false,
        }
    }

    /// Use `transport` instead of the configured unix socket
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    /// Engine access, for registering additional natives before loading
    pub fn engine_mut(&mut self) -> &mut Engine {
        self.vm.engine_mut()
    }

    /// Handle that ends the event loop
    pub fn stop_handle(&self) -> StopHandle {
        self.ctx.stop.clone()
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Whether an unhandled exception ended script execution
    pub fn crashed(&self) -> bool {
        self.crashed
    }

    /// Host state shared with the natives
    pub fn context(&self) -> &HostContext {
        &self.ctx
    }

    fn expect_phase(&self, expected: Phase, operation: &'static str) -> Result<()> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(HostError::Phase {
                operation,
                phase: self.phase,
            })
        }
    }

    /// Read and compile the script
    pub fn load(&mut self) -> Result<()> {
        self.expect_phase(Phase::Uninitialized, "load")?;
        self.vm.compile_file(&self.config.script)?;
        tracing::debug!(script = %self.config.script.display(), "Script compiled");
        self.phase = Phase::Compiled;
        Ok(())
    }

    /// Run top-level code once and apply the logging declaration
    ///
    /// Returns `Some(code)` if the script called `exit`.
    pub fn execute(&mut self) -> Result<Option<i32>> {
        self.expect_phase(Phase::Compiled, "execute")?;
        self.vm.bind_args(&self.config.args);

        let outcome = self.vm.execute();
        self.phase = Phase::TopLevelExecuted;
        match outcome {
            Ok(_) => {}
            Err(ScriptError::Exit(code)) => return Ok(Some(code)),
            Err(ScriptError::Compile(msg)) => {
                self.crashed = true;
                return Err(HostError::Compile(msg));
            }
            Err(ScriptError::Exception(msg)) => {
                self.crashed = true;
                return Err(HostError::Runtime(msg));
            }
        }

        self.activate_logging();
        Ok(None)
    }

    fn activate_logging(&mut self) {
        let Some(value) = self.vm.global("ulog") else {
            return;
        };
        match LogDeclaration::from_global(&value) {
            Ok(decl) => {
                tracing::debug!(identity = %decl.identity, channels = ?decl.channels, "Opening script log");
                *self.ctx.logger.borrow_mut() = Logger::open(&decl);
            }
            Err(e) => tracing::warn!(error = %e, "Ignoring log declaration"),
        }
    }

    /// Call the `start` entry point
    ///
    /// Returns `Some(code)` if the script called `exit`.
    pub fn start(&mut self) -> Result<Option<i32>> {
        self.expect_phase(Phase::TopLevelExecuted, "start")?;

        let start = match self.vm.entry_point("start") {
            EntryPoint::Callable(f) => f,
            EntryPoint::Missing => return Err(HostError::MissingStart),
            EntryPoint::NotCallable => return Err(HostError::InvalidStart),
        };

        match self.vm.call(&start, ()) {
            Ok(_) => {
                self.phase = Phase::Started;
                Ok(None)
            }
            Err(ScriptError::Exit(code)) => {
                self.phase = Phase::Started;
                Ok(Some(code))
            }
            Err(e) => {
                self.crashed = true;
                Err(HostError::StartFailed(e.to_string()))
            }
        }
    }

    /// Publish the bus service and dispatch events until stopped
    pub async fn run(&mut self) -> Result<()> {
        self.expect_phase(Phase::Started, "run")?;
        self.activate_rpc();
        self.phase = Phase::Running;

        while let Some(event) = self.event_loop.next_event(&self.ctx).await {
            self.dispatch_event(event);
        }

        self.phase = Phase::StopRequested;
        Ok(())
    }

    fn activate_rpc(&mut self) {
        let Some(value) = self.vm.global("ubus") else {
            return;
        };
        match ServiceDeclaration::from_global(&value) {
            Ok(decl) => {
                let (service, events) = RpcService::activate(
                    decl,
                    Arc::clone(&self.transport),
                    self.config.reconnect_interval,
                );
                self.event_loop.attach_bus(events);
                self.rpc = Some(service);
            }
            Err(e) => tracing::warn!(error = %e, "Ignoring bus declaration"),
        }
    }

    fn dispatch_event(&mut self, event: LoopEvent) {
        match event {
            LoopEvent::Timer(id) => self.fire_timer(id),
            LoopEvent::ChildExited { pid, status } => self.child_exited(pid, status),
            LoopEvent::Bus(BusEvent::Connected) => {
                if let Some(rpc) = &self.rpc {
                    if let Some(e) = rpc.on_connect(&self.vm) {
                        self.report("connect hook", e);
                    }
                }
            }
            LoopEvent::Bus(BusEvent::Disconnected) => {
                tracing::info!("Bus connection lost, reconnecting");
            }
            LoopEvent::Bus(BusEvent::Call(request)) => {
                let error = match &self.rpc {
                    Some(rpc) => rpc.handle_call(&self.vm, request),
                    None => None,
                };
                if let Some(e) = error {
                    self.report("bus method", e);
                }
            }
        }
    }

    fn fire_timer(&mut self, id: TimerId) {
        let Some((callback, private)) = self
            .ctx
            .timers
            .borrow()
            .get(id)
            .map(|t| (t.callback.clone(), t.private.clone()))
        else {
            return;
        };

        let result = match private {
            Some(private) => self.vm.call(&callback, (private,)),
            None => self.vm.call(&callback, ()),
        };

        match result {
            Ok(value) => match value.as_int() {
                Ok(delay) => {
                    self.ctx.timers.borrow_mut().rearm(id, delay);
                }
                Err(_) => {
                    self.ctx.timers.borrow_mut().remove(id);
                }
            },
            Err(e) => {
                self.ctx.timers.borrow_mut().remove(id);
                self.report("timer callback", e);
            }
        }
    }

    fn child_exited(&mut self, pid: Pid, status: i32) {
        let Some(entry) = self.ctx.processes.borrow_mut().take(pid) else {
            return;
        };

        let result = match entry.private.clone() {
            Some(private) => self.vm.call(&entry.callback, (i64::from(status), private)),
            None => self.vm.call(&entry.callback, (i64::from(status),)),
        };
        drop(entry);

        if let Err(e) = result {
            self.report("process callback", e);
        }
    }

    /// Handle a failure from a callback; only an exit request stops the loop
    fn report(&self, site: &str, error: ScriptError) {
        match error {
            ScriptError::Exit(code) => {
                tracing::debug!(code, "Exit requested from {}", site);
                self.ctx.request_exit(code);
            }
            e => tracing::error!(error = %e, "Unhandled exception in {}", site),
        }
    }

    /// Call `stop` unless the script crashed; returns the exit status
    pub fn shutdown(&mut self) -> Result<i32> {
        self.expect_phase(Phase::StopRequested, "shutdown")?;

        if !self.crashed {
            match self.vm.entry_point("stop") {
                EntryPoint::Callable(stop) => match self.vm.call(&stop, ()) {
                    Ok(_) => {}
                    Err(ScriptError::Exit(code)) => self.ctx.request_exit(code),
                    Err(e) => tracing::error!(error = %e, "Unhandled exception in stop"),
                },
                EntryPoint::NotCallable => tracing::warn!("stop is not a callable function"),
                EntryPoint::Missing => {}
            }
        }

        Ok(self.ctx.exit_code().unwrap_or(0))
    }

    /// Release every resource in reverse order of acquisition
    ///
    /// Replies not yet written to the bus are dropped; [`Runtime::close`]
    /// writes them first.
    pub fn teardown(&mut self) {
        if self.phase == Phase::TornDown {
            return;
        }

        let (timers, children) = self.release_local();
        if let Some(rpc) = self.rpc.take() {
            rpc.shutdown();
        }
        self.finish_teardown(timers, children);
    }

    /// Like [`Runtime::teardown`], but lets the bus session write the
    /// replies still queued for it before disconnecting
    pub async fn close(&mut self) {
        if self.phase == Phase::TornDown {
            return;
        }

        let (timers, children) = self.release_local();
        if let Some(rpc) = self.rpc.take() {
            rpc.close().await;
        }
        self.finish_teardown(timers, children);
    }

    /// Drop timers and children and close the log
    fn release_local(&mut self) -> (usize, usize) {
        let timers = self.ctx.timers.borrow_mut().clear();

        let children = {
            let mut processes = self.ctx.processes.borrow_mut();
            if self.config.terminate_children {
                processes.terminate_all(TERMINATE_GRACE);
            }
            processes.clear()
        };

        self.ctx.logger.borrow_mut().close();
        (timers, children)
    }

    fn finish_teardown(&mut self, timers: usize, children: usize) {
        self.event_loop.shutdown();
        self.vm.release();
        tracing::debug!(timers, children, "Runtime torn down");
        self.phase = Phase::TornDown;
    }

    async fn drive(&mut self) -> Result<i32> {
        self.load()?;
        if let Some(code) = self.execute()? {
            return Ok(code);
        }
        if let Some(code) = self.start()? {
            return Ok(code);
        }
        self.run().await?;
        self.shutdown()
    }

    /// Run the whole lifecycle and return the process exit status
    ///
    /// Fatal errors are printed to stderr.
    pub async fn run_to_completion(mut self) -> i32 {
        let code = match self.drive().await {
            Ok(code) => code,
            Err(e) => crate::error::report(&e),
        };
        self.close().await;
        code
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.teardown();
    }
}
