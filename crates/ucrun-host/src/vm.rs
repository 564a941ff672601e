// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Interpreter wrapper
//!
//! [`Vm`] owns the engine, the compiled program and the global scope. The
//! host only ever talks to the interpreter through the handful of
//! operations here: compile, run the top level once, read a global, and
//! call a function value.

use crate::error::{HostError, Result, ScriptError};
use rhai::{Array, Dynamic, Engine, FnPtr, FuncArgs, Scope, AST};
use std::path::Path;

/// Nesting limit for top-level expressions
const MAX_EXPR_DEPTH: usize = 128;

/// Nesting limit inside functions and closures
const MAX_FUNCTION_EXPR_DEPTH: usize = 64;

/// Result of looking up an entry point
#[derive(Debug, Clone)]
pub enum EntryPoint {
    /// No global or function of that name
    Missing,
    /// Defined, but not a zero-argument function
    NotCallable,
    /// Ready to call
    Callable(FnPtr),
}

/// The embedded interpreter
pub struct Vm {
    engine: Engine,
    ast: AST,
    scope: Scope<'static>,
}

impl Vm {
    /// Interpreter with no program loaded
    pub fn new() -> Self {
        let mut engine = Engine::new();
        engine.set_max_expr_depths(MAX_EXPR_DEPTH, MAX_FUNCTION_EXPR_DEPTH);
        crate::table::register(&mut engine);
        engine.on_debug(|text, source, pos| {
            tracing::debug!(source = source.unwrap_or(""), position = %pos, "{}", text);
        });

        Self {
            engine,
            ast: AST::empty(),
            scope: Scope::new(),
        }
    }

    /// Engine access for registering natives
    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }

    /// Read and compile a script file
    pub fn compile_file(&mut self, path: &Path) -> Result<()> {
        let source = std::fs::read_to_string(path).map_err(|source| HostError::Load {
            path: path.to_path_buf(),
            source,
        })?;
        self.compile(&source)
    }

    /// Compile script source
    pub fn compile(&mut self, source: &str) -> Result<()> {
        self.ast = self
            .engine
            .compile(source)
            .map_err(|e| HostError::Compile(e.to_string()))?;
        Ok(())
    }

    /// Expose script arguments as the `ARGV` constant
    pub fn bind_args(&mut self, args: &[String]) {
        let argv: Array = args.iter().cloned().map(Dynamic::from).collect();
        self.scope.push_constant("ARGV", argv);
    }

    /// Run the program's top-level statements
    pub fn execute(&mut self) -> std::result::Result<Dynamic, ScriptError> {
        self.engine
            .eval_ast_with_scope::<Dynamic>(&mut self.scope, &self.ast)
            .map_err(ScriptError::from)
    }

    /// Value of a global variable
    pub fn global(&self, name: &str) -> Option<Dynamic> {
        self.scope.get_value::<Dynamic>(name)
    }

    /// Locate a zero-argument entry point by name
    ///
    /// A global variable shadows a script function of the same name.
    pub fn entry_point(&self, name: &str) -> EntryPoint {
        if let Some(value) = self.global(name) {
            return match as_callback(&value) {
                Some(f) => EntryPoint::Callable(f),
                None => EntryPoint::NotCallable,
            };
        }

        let mut found = false;
        for f in self.ast.iter_functions().filter(|f| f.name == name) {
            if f.params.is_empty() {
                return match FnPtr::new(name) {
                    Ok(f) => EntryPoint::Callable(f),
                    Err(_) => EntryPoint::NotCallable,
                };
            }
            found = true;
        }

        if found {
            EntryPoint::NotCallable
        } else {
            EntryPoint::Missing
        }
    }

    /// Call a function value
    pub fn call(
        &self,
        callback: &FnPtr,
        args: impl FuncArgs,
    ) -> std::result::Result<Dynamic, ScriptError> {
        callback
            .call::<Dynamic>(&self.engine, &self.ast, args)
            .map_err(ScriptError::from)
    }

    /// Drop the program and every global
    pub fn release(&mut self) {
        self.scope.clear();
        self.ast = AST::empty();
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

/// The function pointer held by `value`, if it is one
pub fn as_callback(value: &Dynamic) -> Option<FnPtr> {
    value.flatten_clone().try_cast::<FnPtr>()
}
