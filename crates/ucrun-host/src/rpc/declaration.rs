// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The script's `ubus` service declaration
//!
//! ```text
//! let ubus = #{
//!     object: "demo",
//!     connect: || ulog_info("connected"),
//!     methods: #{
//!         hello: #{ cb: |req| #{ greeting: "hi " + req.name } },
//!     },
//! };
//! ```

use crate::error::DeclarationError;
use crate::vm::as_callback;
use rhai::{Dynamic, FnPtr, Map};
use ucrun_bus::ObjectSpec;

/// One declared method
#[derive(Debug, Clone)]
pub struct MethodDecl {
    /// Method name
    pub name: String,
    /// Bound function; `None` when `cb` is missing or not a function
    pub callback: Option<FnPtr>,
}

/// A service object declared by the script
#[derive(Debug, Clone)]
pub struct ServiceDeclaration {
    /// Bus object name
    pub object: String,
    /// Declared methods, in declaration-map order
    pub methods: Vec<MethodDecl>,
    /// Called with no arguments on every (re)connect
    pub connect: Option<FnPtr>,
}

impl ServiceDeclaration {
    /// Read a declaration from its global value
    pub fn from_global(value: &Dynamic) -> Result<Self, DeclarationError> {
        let map = value
            .flatten_clone()
            .try_cast::<Map>()
            .ok_or(DeclarationError::NotAMap("ubus"))?;

        let object = map
            .get("object")
            .ok_or(DeclarationError::MissingField {
                decl: "ubus",
                field: "object",
            })?
            .clone()
            .into_string()
            .map_err(|_| DeclarationError::WrongType {
                decl: "ubus",
                field: "object",
                expected: "a string",
            })?;

        let methods = map
            .get("methods")
            .ok_or(DeclarationError::MissingField {
                decl: "ubus",
                field: "methods",
            })?
            .flatten_clone()
            .try_cast::<Map>()
            .ok_or(DeclarationError::WrongType {
                decl: "ubus",
                field: "methods",
                expected: "an object map",
            })?;

        let methods = methods
            .iter()
            .map(|(name, spec)| MethodDecl {
                name: name.to_string(),
                callback: spec
                    .flatten_clone()
                    .try_cast::<Map>()
                    .and_then(|spec| spec.get("cb").and_then(as_callback)),
            })
            .collect();

        let connect = map.get("connect").and_then(as_callback);

        Ok(Self {
            object,
            methods,
            connect,
        })
    }

    /// Method declared under `name`
    pub fn method(&self, name: &str) -> Option<&MethodDecl> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// Bus registration: only methods bound to a function are exported
    pub fn exported(&self) -> ObjectSpec {
        ObjectSpec {
            name: self.object.clone(),
            methods: self
                .methods
                .iter()
                .filter(|m| m.callback.is_some())
                .map(|m| m.name.clone())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rhai::Engine;

    fn parse(source: &str) -> Result<ServiceDeclaration, DeclarationError> {
        let value: Dynamic = Engine::new().eval(source).unwrap();
        ServiceDeclaration::from_global(&value)
    }

    #[test]
    fn test_full_declaration() {
        let decl = parse(
            r#"#{
                object: "demo",
                connect: || 1,
                methods: #{
                    hello: #{ cb: |req| req },
                    broken: #{ cb: 42 },
                    bare: 1,
                },
            }"#,
        )
        .unwrap();

        assert_eq!(decl.object, "demo");
        assert!(decl.connect.is_some());
        assert_eq!(decl.methods.len(), 3);
        assert!(decl.method("hello").unwrap().callback.is_some());
        assert!(decl.method("broken").unwrap().callback.is_none());
        assert!(decl.method("bare").unwrap().callback.is_none());
        assert_eq!(decl.exported().methods, vec!["hello".to_string()]);
    }

    #[test]
    fn test_connect_is_optional() {
        let decl = parse(r#"#{ object: "demo", methods: #{} }"#).unwrap();
        assert!(decl.connect.is_none());
        assert!(decl.exported().methods.is_empty());
    }

    #[test]
    fn test_incomplete_declarations() {
        assert_eq!(parse("\"demo\"").unwrap_err(), DeclarationError::NotAMap("ubus"));
        assert!(matches!(
            parse("#{ methods: #{} }"),
            Err(DeclarationError::MissingField { field: "object", .. })
        ));
        assert!(matches!(
            parse(r#"#{ object: "demo" }"#),
            Err(DeclarationError::MissingField { field: "methods", .. })
        ));
        assert!(matches!(
            parse(r#"#{ object: 5, methods: #{} }"#),
            Err(DeclarationError::WrongType { field: "object", .. })
        ));
        assert!(matches!(
            parse(r#"#{ object: "demo", methods: [] }"#),
            Err(DeclarationError::WrongType { field: "methods", .. })
        ));
    }
}
