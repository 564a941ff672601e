// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Native functions visible to scripts
//!
//! Implements:
//! - `uloop_timeout` - Timers
//! - `uloop_process` - Child processes
//! - `uloop_end` - Leave the event loop
//! - `ulog_info`, `ulog_note`, `ulog_warn`, `ulog_err` - Logging
//! - `exit` - Terminate the host with a status

pub mod log;
pub mod process;
pub mod timers;

use crate::runtime::HostContext;
use rhai::{Dynamic, Engine, EvalAltResult, Position, INT};
use std::rc::Rc;

/// Register every native against `ctx`
pub fn register_natives(engine: &mut Engine, ctx: &Rc<HostContext>) {
    timers::register(engine, ctx);
    process::register(engine, ctx);
    log::register(engine, ctx);

    let c = Rc::clone(ctx);
    engine.register_fn("uloop_end", move || c.stop.request());

    engine.register_fn("exit", || -> Result<(), Box<EvalAltResult>> { Err(terminate(0)) });
    engine.register_fn("exit", |code: INT| -> Result<(), Box<EvalAltResult>> {
        Err(terminate(code))
    });
}

/// Unwinds the interpreter back to the host, which exits with `code`
fn terminate(code: INT) -> Box<EvalAltResult> {
    EvalAltResult::ErrorTerminated(Dynamic::from_int(code), Position::NONE).into()
}
