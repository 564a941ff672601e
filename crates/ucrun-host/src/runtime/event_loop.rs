// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Event loop
//!
//! Waits for the next timer deadline, child exit, bus event or stop request
//! and hands events to the runtime one at a time. The runtime dispatches
//! each event into the interpreter before asking for the next, so script
//! code never runs concurrently with itself.

use crate::globals::timers::TimerId;
use crate::runtime::context::HostContext;
use nix::unistd::Pid;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::sync::{mpsc, Notify};
use ucrun_bus::BusEvent;

/// Requests the event loop to stop
///
/// Cloneable and `Send`; may be triggered from any thread.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    inner: Arc<StopState>,
}

#[derive(Debug, Default)]
struct StopState {
    requested: AtomicBool,
    notify: Notify,
}

impl StopHandle {
    /// Create a handle that has not been triggered
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the loop to stop after the current event
    pub fn request(&self) {
        self.inner.requested.store(true, Ordering::SeqCst);
        self.inner.notify.notify_one();
    }

    /// Whether a stop was requested
    pub fn is_requested(&self) -> bool {
        self.inner.requested.load(Ordering::SeqCst)
    }

    async fn wait(&self) {
        while !self.is_requested() {
            self.inner.notify.notified().await;
        }
    }
}

/// One unit of work for the runtime
#[derive(Debug)]
pub enum LoopEvent {
    /// A timer deadline elapsed
    Timer(TimerId),
    /// A watched child exited
    ChildExited {
        /// Child process id
        pid: Pid,
        /// Exit code, or 128 + signal number
        status: i32,
    },
    /// Bus session notification
    Bus(BusEvent),
}

enum Wake {
    Stop,
    Signal,
    Child,
    Deadline,
    Bus(Option<BusEvent>),
}

/// The host event loop
pub struct EventLoop {
    stop: StopHandle,
    bus: Option<mpsc::UnboundedReceiver<BusEvent>>,
    child: Option<Signal>,
    interrupt: Option<Signal>,
    terminate: Option<Signal>,
    started: bool,
    ready: VecDeque<LoopEvent>,
}

impl EventLoop {
    /// Create a loop stopped by `stop`
    pub fn new(stop: StopHandle) -> Self {
        Self {
            stop,
            bus: None,
            child: None,
            interrupt: None,
            terminate: None,
            started: false,
            ready: VecDeque::new(),
        }
    }

    /// Feed bus session events into the loop
    pub fn attach_bus(&mut self, events: mpsc::UnboundedReceiver<BusEvent>) {
        self.bus = Some(events);
    }

    /// Install signal listeners; children that exited earlier are collected
    fn start(&mut self, ctx: &HostContext) {
        self.started = true;
        self.child = listen(SignalKind::child());
        self.interrupt = listen(SignalKind::interrupt());
        self.terminate = listen(SignalKind::terminate());
        self.collect_exits(ctx);
    }

    fn collect_exits(&mut self, ctx: &HostContext) {
        let exits = ctx.processes.borrow().reap();
        for (pid, status) in exits {
            tracing::debug!(pid = pid.as_raw(), status, "Child exited");
            self.ready.push_back(LoopEvent::ChildExited { pid, status });
        }
    }

    /// Wait for the next event; `None` once a stop was requested
    pub async fn next_event(&mut self, ctx: &HostContext) -> Option<LoopEvent> {
        if !self.started {
            self.start(ctx);
        }

        loop {
            if self.stop.is_requested() {
                return None;
            }
            if let Some(event) = self.ready.pop_front() {
                return Some(event);
            }
            if let Some(id) = ctx.timers.borrow_mut().pop_expired(Instant::now()) {
                return Some(LoopEvent::Timer(id));
            }
            let deadline = ctx.timers.borrow_mut().next_deadline();

            let wake = tokio::select! {
                biased;
                _ = self.stop.wait() => Wake::Stop,
                _ = next_signal(&mut self.interrupt) => Wake::Signal,
                _ = next_signal(&mut self.terminate) => Wake::Signal,
                _ = next_signal(&mut self.child) => Wake::Child,
                _ = sleep_until(deadline) => Wake::Deadline,
                event = next_bus(&mut self.bus) => Wake::Bus(event),
            };

            match wake {
                Wake::Stop => return None,
                Wake::Signal => {
                    tracing::info!("Termination signal received");
                    self.stop.request();
                    return None;
                }
                Wake::Child => self.collect_exits(ctx),
                Wake::Deadline => {}
                Wake::Bus(Some(event)) => return Some(LoopEvent::Bus(event)),
                Wake::Bus(None) => self.bus = None,
            }
        }
    }

    /// Drop listeners and anything not yet dispatched
    pub fn shutdown(&mut self) {
        self.bus = None;
        self.child = None;
        self.interrupt = None;
        self.terminate = None;
        self.ready.clear();
    }
}

fn listen(kind: SignalKind) -> Option<Signal> {
    match signal(kind) {
        Ok(signal) => Some(signal),
        Err(e) => {
            tracing::warn!(error = %e, "Cannot install signal listener");
            None
        }
    }
}

async fn next_signal(signal: &mut Option<Signal>) {
    if let Some(signal) = signal {
        if signal.recv().await.is_some() {
            return;
        }
    }
    std::future::pending::<()>().await
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at.into()).await,
        None => std::future::pending::<()>().await,
    }
}

async fn next_bus(bus: &mut Option<mpsc::UnboundedReceiver<BusEvent>>) -> Option<BusEvent> {
    match bus {
        Some(events) => events.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rhai::FnPtr;
    use std::time::Duration;

    #[tokio::test]
    async fn test_stop_before_run() {
        let ctx = HostContext::new();
        let mut event_loop = EventLoop::new(ctx.stop.clone());
        ctx.stop.request();
        assert!(event_loop.next_event(&ctx).await.is_none());
    }

    #[tokio::test]
    async fn test_timer_event() {
        let ctx = HostContext::new();
        let mut event_loop = EventLoop::new(ctx.stop.clone());
        let started = Instant::now();
        let id = ctx
            .timers
            .borrow_mut()
            .schedule(FnPtr::new("f").unwrap(), 5, None);

        match event_loop.next_event(&ctx).await {
            Some(LoopEvent::Timer(fired)) => assert_eq!(fired, id),
            other => panic!("unexpected event {:?}", other),
        }
        assert!(started.elapsed() >= Duration::from_millis(5));
    }

    #[tokio::test]
    async fn test_stop_from_another_task() {
        let ctx = HostContext::new();
        let mut event_loop = EventLoop::new(ctx.stop.clone());
        let stop = ctx.stop.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            stop.request();
        });
        assert!(event_loop.next_event(&ctx).await.is_none());
    }

    #[tokio::test]
    async fn test_bus_events_forwarded() {
        let ctx = HostContext::new();
        let mut event_loop = EventLoop::new(ctx.stop.clone());
        let (tx, rx) = mpsc::unbounded_channel();
        event_loop.attach_bus(rx);
        tx.send(BusEvent::Connected).unwrap();

        assert!(matches!(
            event_loop.next_event(&ctx).await,
            Some(LoopEvent::Bus(BusEvent::Connected))
        ));
    }
}
