// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Child processes: `uloop_process`
//!
//! The child is started with fork/exec. The parent keeps a [`ProcessEntry`]
//! per pid; the event loop reaps exits and the entry is dropped once its
//! callback has seen the status.

use crate::runtime::HostContext;
use crate::vm::as_callback;
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{fork, ForkResult, Pid};
use rhai::{Array, Dynamic, Engine, FnPtr, INT};
use std::ffi::CString;
use std::os::raw::c_char;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Exit status reported when the command could not be executed
pub const EXEC_FAILED: i32 = 127;

const TERMINATE_POLL: Duration = Duration::from_millis(5);

/// One tracked child
#[derive(Debug)]
pub struct ProcessEntry {
    /// Child process id
    pub pid: Pid,
    /// Function invoked with the exit status
    pub callback: FnPtr,
    /// Value passed through to the callback
    pub private: Option<Dynamic>,
}

/// Live child watches
#[derive(Debug, Default)]
pub struct ProcessList {
    entries: Vec<ProcessEntry>,
}

impl ProcessList {
    /// Create an empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Link a new entry; a pid already being watched is replaced
    pub fn track(&mut self, entry: ProcessEntry) {
        self.entries.retain(|e| e.pid != entry.pid);
        self.entries.push(entry);
    }

    /// Unlink the entry for `pid`
    pub fn take(&mut self, pid: Pid) -> Option<ProcessEntry> {
        let index = self.entries.iter().position(|e| e.pid == pid)?;
        Some(self.entries.remove(index))
    }

    /// Whether `pid` is being watched
    pub fn contains(&self, pid: Pid) -> bool {
        self.entries.iter().any(|e| e.pid == pid)
    }

    /// Tracked pids
    pub fn pids(&self) -> Vec<Pid> {
        self.entries.iter().map(|e| e.pid).collect()
    }

    /// Collect exits of tracked children without blocking
    ///
    /// Entries stay linked; the caller takes them when dispatching.
    pub fn reap(&self) -> Vec<(Pid, i32)> {
        self.entries
            .iter()
            .filter_map(|entry| match waitpid(entry.pid, Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::Exited(pid, code)) => Some((pid, code)),
                Ok(WaitStatus::Signaled(pid, signal, _)) => Some((pid, 128 + signal as i32)),
                Ok(_) => None,
                Err(Errno::ECHILD) => {
                    // Reaped by someone else; the status is lost
                    tracing::warn!(pid = entry.pid.as_raw(), "Child status unavailable");
                    Some((entry.pid, -1))
                }
                Err(err) => {
                    tracing::warn!(pid = entry.pid.as_raw(), error = %err, "waitpid failed");
                    None
                }
            })
            .collect()
    }

    /// Stop every tracked child and reap it
    ///
    /// Children get `SIGTERM` and `grace` to exit; those still running after
    /// that are killed. No zombie is left behind.
    pub fn terminate_all(&self, grace: Duration) {
        let mut running: Vec<Pid> = self
            .entries
            .iter()
            .map(|e| e.pid)
            .filter(|&pid| match kill(pid, Signal::SIGTERM) {
                Ok(()) => true,
                Err(e) => {
                    tracing::debug!(pid = pid.as_raw(), error = %e, "Could not signal child");
                    // A zombie still answers kill; only a missing pid lands here
                    false
                }
            })
            .collect();

        let deadline = Instant::now() + grace;
        loop {
            running.retain(|&pid| {
                matches!(
                    waitpid(pid, Some(WaitPidFlag::WNOHANG)),
                    Ok(WaitStatus::StillAlive)
                )
            });
            if running.is_empty() || Instant::now() >= deadline {
                break;
            }
            std::thread::sleep(TERMINATE_POLL);
        }

        for pid in running {
            tracing::warn!(pid = pid.as_raw(), "Child ignored SIGTERM, killing");
            let _ = kill(pid, Signal::SIGKILL);
            let _ = waitpid(pid, None);
        }
    }

    /// Release every entry without touching the processes
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no child is being watched
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Fork and exec `argv`, returning the child's pid
///
/// In the child, a failed exec exits with [`EXEC_FAILED`].
pub fn fork_exec(argv: &[String]) -> nix::Result<Pid> {
    let args = argv
        .iter()
        .map(|a| CString::new(a.as_str()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| Errno::EINVAL)?;
    if args.is_empty() {
        return Err(Errno::EINVAL);
    }

    // Pointer table is built before forking so the child only execs
    let mut ptrs: Vec<*const c_char> = args.iter().map(|a| a.as_ptr()).collect();
    ptrs.push(std::ptr::null());

    // SAFETY: the child calls only async-signal-safe functions before exec
    match unsafe { fork() }? {
        ForkResult::Parent { child } => Ok(child),
        ForkResult::Child => unsafe {
            libc::execvp(ptrs[0], ptrs.as_ptr());
            libc::_exit(EXEC_FAILED)
        },
    }
}

/// Register `uloop_process(cb, argv[, private])`
///
/// Returns 0 once the child is running, or -1 on bad arguments or fork
/// failure.
pub fn register(engine: &mut Engine, ctx: &Rc<HostContext>) {
    let c = Rc::clone(ctx);
    engine.register_fn("uloop_process", move |cb: Dynamic, argv: Dynamic| -> INT {
        spawn(&c, &cb, &argv, None)
    });

    let c = Rc::clone(ctx);
    engine.register_fn(
        "uloop_process",
        move |cb: Dynamic, argv: Dynamic, private: Dynamic| -> INT {
            spawn(&c, &cb, &argv, Some(private))
        },
    );
}

fn spawn(ctx: &HostContext, cb: &Dynamic, argv: &Dynamic, private: Option<Dynamic>) -> INT {
    let Some(callback) = as_callback(cb) else {
        return -1;
    };
    let Some(argv) = argv.flatten_clone().try_cast::<Array>() else {
        return -1;
    };
    let argv: Vec<String> = argv
        .into_iter()
        .map(|a| if a.is_string() { a.into_string().unwrap_or_default() } else { a.to_string() })
        .collect();

    match fork_exec(&argv) {
        Ok(pid) => {
            tracing::debug!(pid = pid.as_raw(), command = %argv[0], "Spawned child");
            ctx.processes.borrow_mut().track(ProcessEntry {
                pid,
                callback,
                private,
            });
            0
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to spawn child");
            -1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wait_exit(list: &ProcessList, pid: Pid) -> i32 {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some((_, status)) = list.reap().into_iter().find(|(p, _)| *p == pid) {
                return status;
            }
            assert!(Instant::now() < deadline, "child did not exit");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    fn entry(pid: Pid) -> ProcessEntry {
        ProcessEntry {
            pid,
            callback: FnPtr::new("done").unwrap(),
            private: None,
        }
    }

    #[test]
    fn test_exit_status_reported() {
        let pid = fork_exec(&["sh".into(), "-c".into(), "exit 3".into()]).unwrap();
        let mut list = ProcessList::new();
        list.track(entry(pid));

        assert_eq!(wait_exit(&list, pid), 3);
        assert!(list.take(pid).is_some());
        assert!(list.is_empty());
    }

    #[test]
    fn test_exec_failure_is_127() {
        let pid = fork_exec(&["/nonexistent/binary".into()]).unwrap();
        let mut list = ProcessList::new();
        list.track(entry(pid));
        assert_eq!(wait_exit(&list, pid), EXEC_FAILED);
    }

    #[test]
    fn test_terminated_child_reports_signal() {
        let pid = fork_exec(&["sleep".into(), "5".into()]).unwrap();
        let mut list = ProcessList::new();
        list.track(entry(pid));
        kill(pid, Signal::SIGKILL).unwrap();
        assert_eq!(wait_exit(&list, pid), 128 + Signal::SIGKILL as i32);
    }

    fn assert_reaped(pid: Pid) {
        assert_eq!(waitpid(pid, Some(WaitPidFlag::WNOHANG)), Err(Errno::ECHILD));
    }

    #[test]
    fn test_terminate_all_reaps_children() {
        let pid = fork_exec(&["sleep".into(), "30".into()]).unwrap();
        let mut list = ProcessList::new();
        list.track(entry(pid));

        list.terminate_all(Duration::from_secs(5));
        assert_reaped(pid);
    }

    #[test]
    fn test_terminate_all_kills_stubborn_children() {
        let pid = fork_exec(&[
            "sh".into(),
            "-c".into(),
            "trap '' TERM; exec sleep 30".into(),
        ])
        .unwrap();
        let mut list = ProcessList::new();
        list.track(entry(pid));
        std::thread::sleep(Duration::from_millis(100));

        let started = Instant::now();
        list.terminate_all(Duration::from_millis(50));
        assert_reaped(pid);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_empty_argv_rejected() {
        assert_eq!(fork_exec(&[]), Err(Errno::EINVAL));
        assert_eq!(fork_exec(&["a\0b".into()]), Err(Errno::EINVAL));
    }
}
