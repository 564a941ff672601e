// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Script logging: `ulog_info`, `ulog_note`, `ulog_warn`, `ulog_err`
//!
//! The entry points always exist. Records only go somewhere once the script
//! declares a `ulog` object naming an identity and its channels:
//!
//! ```text
//! let ulog = #{ identity: "myservice", channels: ["syslog", "stdio"] };
//! ```

use crate::error::DeclarationError;
use crate::runtime::HostContext;
use rhai::{Array, Dynamic, Engine, Map};
use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::rc::Rc;

/// Kernel log device
const KMSG_PATH: &str = "/dev/kmsg";

/// Record severity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Informational
    Info,
    /// Normal but significant
    Notice,
    /// Warning
    Warning,
    /// Error
    Error,
}

impl Severity {
    /// Syslog priority
    pub fn priority(self) -> libc::c_int {
        match self {
            Severity::Info => libc::LOG_INFO,
            Severity::Notice => libc::LOG_NOTICE,
            Severity::Warning => libc::LOG_WARNING,
            Severity::Error => libc::LOG_ERR,
        }
    }
}

/// Output channels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Channels {
    /// Kernel log
    pub kmsg: bool,
    /// System log
    pub syslog: bool,
    /// Standard error
    pub stdio: bool,
}

impl Channels {
    /// Parse channel names; unknown names are ignored
    pub fn parse<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut channels = Channels::default();
        for name in names {
            match name {
                "kmsg" => channels.kmsg = true,
                "syslog" => channels.syslog = true,
                "stdio" => channels.stdio = true,
                other => tracing::debug!(channel = other, "Ignoring unknown log channel"),
            }
        }
        channels
    }

    /// Whether no channel is selected
    pub fn is_empty(&self) -> bool {
        !(self.kmsg || self.syslog || self.stdio)
    }
}

/// The script's `ulog` object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogDeclaration {
    /// Tag for every record
    pub identity: String,
    /// Where records go
    pub channels: Channels,
}

impl LogDeclaration {
    /// Read a declaration from its global value
    pub fn from_global(value: &Dynamic) -> Result<Self, DeclarationError> {
        let map = value
            .flatten_clone()
            .try_cast::<Map>()
            .ok_or(DeclarationError::NotAMap("ulog"))?;

        let identity = map
            .get("identity")
            .ok_or(DeclarationError::MissingField {
                decl: "ulog",
                field: "identity",
            })?
            .clone()
            .into_string()
            .map_err(|_| DeclarationError::WrongType {
                decl: "ulog",
                field: "identity",
                expected: "a string",
            })?;

        let names = map
            .get("channels")
            .ok_or(DeclarationError::MissingField {
                decl: "ulog",
                field: "channels",
            })?
            .flatten_clone()
            .try_cast::<Array>()
            .ok_or(DeclarationError::WrongType {
                decl: "ulog",
                field: "channels",
                expected: "an array of strings",
            })?;
        let names: Vec<String> = names
            .into_iter()
            .filter_map(|n| n.into_string().ok())
            .collect();

        Ok(Self {
            identity,
            channels: Channels::parse(names.iter().map(String::as_str)),
        })
    }
}

/// Open log channels
pub struct Logger {
    identity: Option<CString>,
    channels: Channels,
    kmsg: Option<File>,
    stdio: Option<Box<dyn Write>>,
}

impl Logger {
    /// Logger with no channels; records are dropped
    pub fn closed() -> Self {
        Self {
            identity: None,
            channels: Channels::default(),
            kmsg: None,
            stdio: None,
        }
    }

    /// Open the channels named by `decl`
    pub fn open(decl: &LogDeclaration) -> Self {
        Self::open_with(decl, Box::new(io::stderr()))
    }

    pub(crate) fn open_with(decl: &LogDeclaration, stdio: Box<dyn Write>) -> Self {
        let identity = CString::new(decl.identity.replace('\0', "")).unwrap_or_default();
        let mut channels = decl.channels;

        let kmsg = if channels.kmsg {
            match OpenOptions::new().write(true).open(KMSG_PATH) {
                Ok(file) => Some(file),
                Err(e) => {
                    tracing::warn!(error = %e, "Cannot open kernel log");
                    channels.kmsg = false;
                    None
                }
            }
        } else {
            None
        };

        if channels.syslog {
            // SAFETY: `identity` is kept alive until closelog in close()
            unsafe { libc::openlog(identity.as_ptr(), libc::LOG_PID, libc::LOG_DAEMON) };
        }

        Self {
            identity: Some(identity),
            channels,
            kmsg,
            stdio: channels.stdio.then_some(stdio),
        }
    }

    /// Whether a declaration has been applied
    pub fn is_open(&self) -> bool {
        self.identity.is_some()
    }

    /// Emit one record on every open channel
    pub fn emit(&mut self, severity: Severity, message: &str) {
        let Some(identity) = &self.identity else {
            return;
        };
        let ident = identity.to_string_lossy();

        if let Some(kmsg) = &mut self.kmsg {
            let _ = writeln!(kmsg, "<{}>{}: {}", severity.priority(), ident, message);
        }

        if self.channels.syslog {
            let text = CString::new(message.replace('\0', "")).unwrap_or_default();
            // SAFETY: constant format string with one C string argument
            unsafe { libc::syslog(severity.priority(), c"%s".as_ptr(), text.as_ptr()) };
        }

        if let Some(stdio) = &mut self.stdio {
            let _ = writeln!(stdio, "{}: {}", ident, message);
        }
    }

    /// Close every channel
    pub fn close(&mut self) {
        if self.identity.is_none() {
            return;
        }
        if self.channels.syslog {
            unsafe { libc::closelog() };
        }
        self.kmsg = None;
        self.stdio = None;
        self.channels = Channels::default();
        self.identity = None;
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::closed()
    }
}

impl Drop for Logger {
    fn drop(&mut self) {
        self.close();
    }
}

/// Register the four severity entry points
pub fn register(engine: &mut Engine, ctx: &Rc<HostContext>) {
    for (name, severity) in [
        ("ulog_info", Severity::Info),
        ("ulog_note", Severity::Notice),
        ("ulog_warn", Severity::Warning),
        ("ulog_err", Severity::Error),
    ] {
        let c = Rc::clone(ctx);
        engine.register_fn(name, move |message: Dynamic| {
            let text = if message.is_string() {
                message.into_string().unwrap_or_default()
            } else {
                message.to_string()
            };
            c.logger.borrow_mut().emit(severity, &text);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Clone, Default)]
    struct Capture(Rc<RefCell<Vec<u8>>>);

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Capture {
        fn text(&self) -> String {
            String::from_utf8(self.0.borrow().clone()).unwrap()
        }
    }

    fn declaration(source: &str) -> Result<LogDeclaration, DeclarationError> {
        let value: Dynamic = Engine::new().eval(source).unwrap();
        LogDeclaration::from_global(&value)
    }

    #[test]
    fn test_channel_parsing() {
        let channels = Channels::parse(["stdio", "bogus", "kmsg"]);
        assert!(channels.stdio && channels.kmsg && !channels.syslog);
        assert!(Channels::parse([]).is_empty());
    }

    #[test]
    fn test_declaration() {
        let decl = declaration(r#"#{ identity: "svc", channels: ["stdio", 5, "syslog"] }"#).unwrap();
        assert_eq!(decl.identity, "svc");
        assert!(decl.channels.stdio && decl.channels.syslog && !decl.channels.kmsg);
    }

    #[test]
    fn test_malformed_declarations() {
        assert_eq!(declaration("42"), Err(DeclarationError::NotAMap("ulog")));
        assert!(matches!(
            declaration(r#"#{ channels: [] }"#),
            Err(DeclarationError::MissingField { field: "identity", .. })
        ));
        assert!(matches!(
            declaration(r#"#{ identity: 1, channels: [] }"#),
            Err(DeclarationError::WrongType { field: "identity", .. })
        ));
        assert!(matches!(
            declaration(r#"#{ identity: "x", channels: "stdio" }"#),
            Err(DeclarationError::WrongType { field: "channels", .. })
        ));
    }

    #[test]
    fn test_stdio_channel() {
        let capture = Capture::default();
        let decl = LogDeclaration {
            identity: "svc".to_string(),
            channels: Channels::parse(["stdio"]),
        };
        let mut logger = Logger::open_with(&decl, Box::new(capture.clone()));
        assert!(logger.is_open());

        logger.emit(Severity::Warning, "disk low");
        logger.close();
        logger.emit(Severity::Error, "dropped");

        assert_eq!(capture.text(), "svc: disk low\n");
        assert!(!logger.is_open());
    }

    #[test]
    fn test_closed_logger_drops_records() {
        let mut logger = Logger::closed();
        logger.emit(Severity::Info, "nowhere");
        assert!(!logger.is_open());
    }

    #[test]
    fn test_priorities() {
        assert_eq!(Severity::Info.priority(), 6);
        assert_eq!(Severity::Notice.priority(), 5);
        assert_eq!(Severity::Warning.priority(), 4);
        assert_eq!(Severity::Error.priority(), 3);
    }
}
