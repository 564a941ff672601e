// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Timers: `uloop_timeout`
//!
//! A timer fires once. Its callback keeps it alive by returning an integer,
//! which rearms the same entry with that many milliseconds. There is no
//! explicit cancel; pending entries are dropped by the shutdown sweep.

use crate::runtime::HostContext;
use crate::vm::as_callback;
use rhai::{Dynamic, Engine, FnPtr, INT};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Unique identifier for a timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

/// One pending callback
#[derive(Debug)]
pub struct TimerEntry {
    /// Timer ID
    pub id: TimerId,
    /// Function invoked on expiry
    pub callback: FnPtr,
    /// Value passed through to the callback
    pub private: Option<Dynamic>,
    /// Current arming; stale heap slots carry an older one
    seq: u64,
}

/// Native deadline registration
#[derive(Debug)]
struct Deadline {
    at: Instant,
    seq: u64,
    id: TimerId,
}

impl PartialEq for Deadline {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl Eq for Deadline {}

impl PartialOrd for Deadline {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Deadline {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap; ties fire in arming order
        (other.at, other.seq).cmp(&(self.at, self.seq))
    }
}

/// Live timers and their deadlines
#[derive(Debug, Default)]
pub struct TimerList {
    entries: Vec<TimerEntry>,
    deadlines: BinaryHeap<Deadline>,
    next_id: u64,
    next_seq: u64,
}

impl TimerList {
    /// Create an empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Link a new entry due in `delay_ms` (negative delays fire at once)
    pub fn schedule(&mut self, callback: FnPtr, delay_ms: INT, private: Option<Dynamic>) -> TimerId {
        self.next_id += 1;
        let id = TimerId(self.next_id);
        let seq = self.arm(id, delay_ms);
        self.entries.push(TimerEntry {
            id,
            callback,
            private,
            seq,
        });
        id
    }

    /// Give a live entry a new deadline
    pub fn rearm(&mut self, id: TimerId, delay_ms: INT) -> bool {
        if !self.contains(id) {
            return false;
        }
        let seq = self.arm(id, delay_ms);
        if let Some(entry) = self.entries.iter_mut().find(|e| e.id == id) {
            entry.seq = seq;
        }
        true
    }

    fn arm(&mut self, id: TimerId, delay_ms: INT) -> u64 {
        self.next_seq += 1;
        let delay = Duration::from_millis(u64::try_from(delay_ms).unwrap_or(0));
        self.deadlines.push(Deadline {
            at: Instant::now() + delay,
            seq: self.next_seq,
            id,
        });
        self.next_seq
    }

    /// Look up a live entry
    pub fn get(&self, id: TimerId) -> Option<&TimerEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Whether `id` is still linked
    pub fn contains(&self, id: TimerId) -> bool {
        self.get(id).is_some()
    }

    /// Unlink an entry, handing back its references
    pub fn remove(&mut self, id: TimerId) -> Option<TimerEntry> {
        let index = self.entries.iter().position(|e| e.id == id)?;
        Some(self.entries.remove(index))
    }

    fn is_current(&self, deadline: &Deadline) -> bool {
        self.get(deadline.id).is_some_and(|e| e.seq == deadline.seq)
    }

    /// Pop the next timer whose deadline is at or before `now`
    pub fn pop_expired(&mut self, now: Instant) -> Option<TimerId> {
        while let Some(deadline) = self.deadlines.peek() {
            if !self.is_current(deadline) {
                self.deadlines.pop();
                continue;
            }
            if deadline.at > now {
                return None;
            }
            let id = deadline.id;
            self.deadlines.pop();
            return Some(id);
        }
        None
    }

    /// Earliest pending deadline
    pub fn next_deadline(&mut self) -> Option<Instant> {
        while let Some(deadline) = self.deadlines.peek() {
            if self.is_current(deadline) {
                return Some(deadline.at);
            }
            self.deadlines.pop();
        }
        None
    }

    /// Deregister every deadline and release every entry
    pub fn clear(&mut self) -> usize {
        self.deadlines.clear();
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no timer is pending
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Register `uloop_timeout(cb, ms[, private])`
///
/// Returns the timer id, or -1 when `cb` is not a function or `ms` not an
/// integer.
pub fn register(engine: &mut Engine, ctx: &Rc<HostContext>) {
    let c = Rc::clone(ctx);
    engine.register_fn("uloop_timeout", move |cb: Dynamic, ms: Dynamic| -> INT {
        schedule(&c, &cb, &ms, None)
    });

    let c = Rc::clone(ctx);
    engine.register_fn(
        "uloop_timeout",
        move |cb: Dynamic, ms: Dynamic, private: Dynamic| -> INT {
            schedule(&c, &cb, &ms, Some(private))
        },
    );
}

fn schedule(ctx: &HostContext, cb: &Dynamic, ms: &Dynamic, private: Option<Dynamic>) -> INT {
    let (Some(callback), Ok(delay)) = (as_callback(cb), ms.as_int()) else {
        return -1;
    };

    let id = ctx.timers.borrow_mut().schedule(callback, delay, private);
    tracing::debug!(timer = id.0, delay, "Timer scheduled");
    INT::try_from(id.0).unwrap_or(-1)
}
