// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Shared helpers for host integration tests

#![allow(dead_code)]

use rhai::Dynamic;
use std::cell::{Cell, RefCell};
use std::io::Write;
use std::rc::{Rc, Weak};
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;
use ucrun_host::{HostConfig, Runtime};

/// Write `source` to a temporary script file
pub fn script(source: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".rhai")
        .tempfile()
        .unwrap();
    file.write_all(source.as_bytes()).unwrap();
    file
}

/// Config for `file` with a short bus retry
pub fn config(file: &NamedTempFile) -> HostConfig {
    HostConfig::new(file.path()).with_reconnect_interval(Duration::from_millis(10))
}

/// Values passed to the script's `record(value)` native, with arrival times
#[derive(Clone, Default)]
pub struct Recorder(Rc<RefCell<Vec<(Instant, Dynamic)>>>);

impl Recorder {
    /// Register `record` on `runtime`
    pub fn install(runtime: &mut Runtime) -> Self {
        let recorder = Recorder::default();
        let sink = Rc::clone(&recorder.0);
        runtime
            .engine_mut()
            .register_fn("record", move |value: Dynamic| {
                sink.borrow_mut().push((Instant::now(), value.flatten()));
            });
        recorder
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn values(&self) -> Vec<Dynamic> {
        self.0.borrow().iter().map(|(_, v)| v.clone()).collect()
    }

    pub fn ints(&self) -> Vec<i64> {
        self.0
            .borrow()
            .iter()
            .map(|(_, v)| v.as_int().unwrap())
            .collect()
    }

    pub fn strings(&self) -> Vec<String> {
        self.0
            .borrow()
            .iter()
            .map(|(_, v)| v.clone().into_string().unwrap())
            .collect()
    }

    pub fn times(&self) -> Vec<Instant> {
        self.0.borrow().iter().map(|(t, _)| *t).collect()
    }

    /// Yield until at least `count` values arrived
    pub async fn wait_for(&self, count: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while self.len() < count {
            assert!(Instant::now() < deadline, "timed out waiting for {} records", count);
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

/// Build a runtime for `source` with `record` installed
pub fn host(source: &str) -> (NamedTempFile, Runtime, Recorder) {
    let file = script(source);
    let mut runtime = Runtime::new(config(&file));
    let recorder = Recorder::install(&mut runtime);
    (file, runtime, recorder)
}

/// Value handed out by the script's `tracked()` native
#[derive(Clone)]
pub struct Tracked(#[allow(dead_code)] Rc<()>);

/// Counts `tracked()` values still alive anywhere in the runtime
///
/// The script can read the count through `live()`.
#[derive(Clone, Default)]
pub struct Tracker {
    token: Rc<()>,
    created: Rc<Cell<usize>>,
}

impl Tracker {
    /// Register `tracked` and `live` on `runtime`
    pub fn install(runtime: &mut Runtime) -> Self {
        let tracker = Tracker::default();

        let token = Rc::downgrade(&tracker.token);
        let created = Rc::clone(&tracker.created);
        runtime.engine_mut().register_fn("tracked", move || {
            created.set(created.get() + 1);
            Tracked(token.upgrade().unwrap())
        });

        let token = Rc::downgrade(&tracker.token);
        runtime
            .engine_mut()
            .register_fn("live", move || live_count(&token) as i64);

        tracker
    }

    /// Values created so far
    pub fn created(&self) -> usize {
        self.created.get()
    }

    /// Values not yet released
    pub fn live(&self) -> usize {
        Rc::strong_count(&self.token) - 1
    }
}

fn live_count(token: &Weak<()>) -> usize {
    token.strong_count().saturating_sub(1)
}
