// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Error types for the script host

use owo_colors::OwoColorize;
use rhai::EvalAltResult;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for host operations
pub type Result<T> = std::result::Result<T, HostError>;

/// Process exit status for usage, load and compile failures
pub const EXIT_COMPILE: i32 = -1;

/// Process exit status for runtime failures and a missing or broken `start`
pub const EXIT_RUNTIME: i32 = -2;

/// Fatal errors that end the host process
#[derive(Debug, Error)]
pub enum HostError {
    /// Bad command line
    #[error("Usage error: {0}")]
    Usage(String),

    /// Script file could not be read
    #[error("Load error: cannot read '{}': {source}", path.display())]
    Load {
        /// Script path
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// Script failed to compile
    #[error("Compile error: {0}")]
    Compile(String),

    /// Unhandled exception in top-level code
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// No `start` entry point
    #[error("Runtime error: script does not define a start function")]
    MissingStart,

    /// `start` exists but cannot be called
    #[error("Runtime error: start is not a callable function")]
    InvalidStart,

    /// Unhandled exception raised from `start`
    #[error("Runtime error: exception in start: {0}")]
    StartFailed(String),

    /// Lifecycle operation invoked out of order
    #[error("Runtime error: cannot {operation} in phase {phase:?}")]
    Phase {
        /// Attempted operation
        operation: &'static str,
        /// Phase the runtime was in
        phase: crate::runtime::Phase,
    },
}

impl HostError {
    /// Usage error from a command line parser message
    ///
    /// Keeps the first line and drops a leading `error: `.
    pub fn usage(message: &str) -> Self {
        let line = message.lines().next().unwrap_or_default().trim();
        let line = line.strip_prefix("error:").map(str::trim_start).unwrap_or(line);
        HostError::Usage(line.to_string())
    }

    /// Process exit status for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            HostError::Usage(_) | HostError::Load { .. } | HostError::Compile(_) => EXIT_COMPILE,
            _ => EXIT_RUNTIME,
        }
    }
}

/// Print a fatal error to stderr and return its exit status
pub fn report(error: &HostError) -> i32 {
    eprintln!("{}: {}", "Error".red().bold(), error);
    error.exit_code()
}

/// Outcome of a failed interpreter call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    /// The script asked to terminate the process
    #[error("exit requested with status {0}")]
    Exit(i32),

    /// Compile-stage failure surfaced while running
    #[error("Compile error: {0}")]
    Compile(String),

    /// Unhandled exception
    #[error("{0}")]
    Exception(String),
}

impl From<Box<EvalAltResult>> for ScriptError {
    fn from(err: Box<EvalAltResult>) -> Self {
        fn classify(err: &EvalAltResult) -> Option<ScriptError> {
            match err {
                EvalAltResult::ErrorTerminated(code, _) => Some(ScriptError::Exit(
                    code.as_int().ok().and_then(|c| i32::try_from(c).ok()).unwrap_or(0),
                )),
                EvalAltResult::ErrorParsing(..) => Some(ScriptError::Compile(err.to_string())),
                EvalAltResult::ErrorInFunctionCall(_, _, inner, _) => classify(inner),
                _ => None,
            }
        }

        classify(&err).unwrap_or_else(|| ScriptError::Exception(err.to_string()))
    }
}

/// Malformed script declaration; the subsystem it configures stays inactive
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeclarationError {
    /// The declaration is not an object map
    #[error("'{0}' must be an object map")]
    NotAMap(&'static str),

    /// A required field is absent
    #[error("'{decl}' is missing the '{field}' field")]
    MissingField {
        /// Declaration name
        decl: &'static str,
        /// Field name
        field: &'static str,
    },

    /// A field has the wrong type
    #[error("'{decl}.{field}' must be {expected}")]
    WrongType {
        /// Declaration name
        decl: &'static str,
        /// Field name
        field: &'static str,
        /// Expected type
        expected: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use rhai::{Dynamic, Position};

    #[test]
    fn test_exit_codes() {
        assert_eq!(HostError::Usage("x".into()).exit_code(), -1);
        assert_eq!(HostError::Compile("x".into()).exit_code(), -1);
        assert_eq!(HostError::MissingStart.exit_code(), -2);
        assert_eq!(HostError::StartFailed("x".into()).exit_code(), -2);
    }

    #[test]
    fn test_usage_from_parser_message() {
        let err = HostError::usage(
            "error: the following required arguments were not provided:\n  <SCRIPT>\n\nUsage: ucrun <SCRIPT>\n",
        );
        assert_eq!(
            err.to_string(),
            "Usage error: the following required arguments were not provided:"
        );
        assert_eq!(report(&err), EXIT_COMPILE);

        let plain = HostError::usage("unexpected argument '--bogus'");
        assert!(matches!(plain, HostError::Usage(msg) if msg == "unexpected argument '--bogus'"));
    }

    #[test]
    fn test_terminate_classified_as_exit() {
        let err: Box<EvalAltResult> =
            EvalAltResult::ErrorTerminated(Dynamic::from_int(5), Position::NONE).into();
        assert_eq!(ScriptError::from(err), ScriptError::Exit(5));
    }

    #[test]
    fn test_nested_terminate_is_unwrapped() {
        let inner: Box<EvalAltResult> =
            EvalAltResult::ErrorTerminated(Dynamic::from_int(9), Position::NONE).into();
        let err: Box<EvalAltResult> = EvalAltResult::ErrorInFunctionCall(
            "cb".into(),
            String::new(),
            inner,
            Position::NONE,
        )
        .into();
        assert_eq!(ScriptError::from(err), ScriptError::Exit(9));
    }

    #[test]
    fn test_runtime_error_is_exception() {
        let err: Box<EvalAltResult> =
            EvalAltResult::ErrorRuntime(Dynamic::from("boom".to_string()), Position::NONE).into();
        assert!(matches!(ScriptError::from(err), ScriptError::Exception(msg) if msg.contains("boom")));
    }
}
