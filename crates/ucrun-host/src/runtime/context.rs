// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! State shared between the orchestrator and the natives

use crate::globals::log::Logger;
use crate::globals::process::ProcessList;
use crate::globals::timers::TimerList;
use crate::runtime::event_loop::StopHandle;
use std::cell::{Cell, RefCell};

/// Host-side state of one runtime
///
/// Natives hold an `Rc` to it. No borrow is ever held across a call into
/// the interpreter.
#[derive(Default)]
pub struct HostContext {
    /// Pending timers
    pub timers: RefCell<TimerList>,
    /// Watched children
    pub processes: RefCell<ProcessList>,
    /// Script logging channels
    pub logger: RefCell<Logger>,
    /// Ends the event loop
    pub stop: StopHandle,
    exit_code: Cell<Option<i32>>,
}

impl HostContext {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an exit status requested by the script and stop the loop
    pub fn request_exit(&self, code: i32) {
        self.exit_code.set(Some(code));
        self.stop.request();
    }

    /// Exit status requested by the script, if any
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code.get()
    }
}
