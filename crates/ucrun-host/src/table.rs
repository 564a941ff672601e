// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Insertion-ordered tables for scripts
//!
//! Object maps in the interpreter are sorted by key. Bus payloads are not, so
//! inbound payloads reach the script as a `table`, which keeps fields in the
//! order they arrived. Fields read like map properties (`req.name`,
//! `req["name"]`); a missing field reads as `()`.
//!
//! Scripts that need a specific reply order build one explicitly:
//!
//! ```text
//! table().set("b", "x").set("a", 1)
//! table([["b", "x"], ["a", 1]])
//! ```

use rhai::{Array, Dynamic, Engine, EvalAltResult, ImmutableString, Map, INT};
use std::fmt;

/// Script-visible type name
pub const TYPE_NAME: &str = "table";

/// Ordered name/value pairs with unique names
#[derive(Debug, Clone, Default)]
pub struct ScriptTable {
    entries: Vec<(ImmutableString, Dynamic)>,
}

impl ScriptTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of `name`
    pub fn get(&self, name: &str) -> Option<&Dynamic> {
        self.entries
            .iter()
            .find(|(n, _)| n.as_str() == name)
            .map(|(_, v)| v)
    }

    /// Set `name`, keeping its position if it already exists
    pub fn insert(&mut self, name: impl Into<ImmutableString>, value: Dynamic) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Append `name` unless it is already present
    pub fn insert_new(&mut self, name: impl Into<ImmutableString>, value: impl FnOnce() -> Dynamic) {
        let name = name.into();
        if !self.entries.iter().any(|(n, _)| *n == name) {
            self.entries.push((name, value()));
        }
    }

    /// Remove `name`, returning its value
    pub fn remove(&mut self, name: &str) -> Option<Dynamic> {
        let index = self.entries.iter().position(|(n, _)| n.as_str() == name)?;
        Some(self.entries.remove(index).1)
    }

    /// Fields in order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Dynamic)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Field names in order
    pub fn keys(&self) -> Vec<&str> {
        self.entries.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no fields
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Build from `[name, value]` pairs
    pub fn from_pairs(pairs: Array) -> Result<Self, Box<EvalAltResult>> {
        let mut table = Self::new();
        for pair in pairs {
            let pair = pair
                .try_cast::<Array>()
                .filter(|p| p.len() == 2)
                .ok_or("table() expects [name, value] pairs")?;
            let mut pair = pair.into_iter();
            let (Some(name), Some(value)) = (pair.next(), pair.next()) else {
                continue;
            };
            let name = name
                .into_immutable_string()
                .map_err(|kind| format!("table() field name must be a string, not {}", kind))?;
            table.insert(name, value);
        }
        Ok(table)
    }
}

impl From<Map> for ScriptTable {
    fn from(map: Map) -> Self {
        Self {
            entries: map.into_iter().map(|(n, v)| (n.into(), v)).collect(),
        }
    }
}

impl From<&ScriptTable> for Map {
    fn from(table: &ScriptTable) -> Self {
        table
            .entries
            .iter()
            .map(|(n, v)| (n.as_str().into(), v.clone()))
            .collect()
    }
}

impl fmt::Display for ScriptTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{{")?;
        for (i, (name, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, " {}: {:?}", name, value)?;
        }
        if !self.entries.is_empty() {
            write!(f, " ")?;
        }
        write!(f, "}}")
    }
}

/// Register the `table` type and its functions
pub fn register(engine: &mut Engine) {
    engine
        .register_type_with_name::<ScriptTable>(TYPE_NAME)
        .register_fn("table", ScriptTable::new)
        .register_fn("table", ScriptTable::from_pairs)
        .register_fn("table", |map: Map| ScriptTable::from(map))
        .register_indexer_get(|t: &mut ScriptTable, name: ImmutableString| -> Dynamic {
            t.get(&name).cloned().unwrap_or(Dynamic::UNIT)
        })
        .register_indexer_set(|t: &mut ScriptTable, name: ImmutableString, value: Dynamic| {
            t.insert(name, value)
        })
        .register_fn(
            "set",
            |t: &mut ScriptTable, name: ImmutableString, value: Dynamic| -> ScriptTable {
                t.insert(name, value);
                t.clone()
            },
        )
        .register_fn("contains", |t: &mut ScriptTable, name: ImmutableString| {
            t.get(&name).is_some()
        })
        .register_fn("remove", |t: &mut ScriptTable, name: ImmutableString| {
            t.remove(&name).unwrap_or(Dynamic::UNIT)
        })
        .register_fn("len", |t: &mut ScriptTable| t.len() as INT)
        .register_fn("is_empty", |t: &mut ScriptTable| t.is_empty())
        .register_fn("keys", |t: &mut ScriptTable| -> Array {
            t.keys().into_iter().map(|k| Dynamic::from(k.to_string())).collect()
        })
        .register_fn("values", |t: &mut ScriptTable| -> Array {
            t.iter().map(|(_, v)| v.clone()).collect()
        })
        .register_fn("to_map", |t: &mut ScriptTable| Map::from(&*t))
        .register_fn("to_string", |t: &mut ScriptTable| t.to_string())
        .register_fn("to_debug", |t: &mut ScriptTable| t.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> Engine {
        let mut engine = Engine::new();
        register(&mut engine);
        engine
    }

    #[test]
    fn test_builders_keep_order() {
        let engine = engine();
        let t: ScriptTable = engine
            .eval(r#"table().set("b", "x").set("a", 1).set("b", "y")"#)
            .unwrap();
        assert_eq!(t.keys(), vec!["b", "a"]);
        assert_eq!(t.get("b").unwrap().clone().into_string().unwrap(), "y");

        let t: ScriptTable = engine.eval(r#"table([["z", 1], ["y", 2]])"#).unwrap();
        assert_eq!(t.keys(), vec!["z", "y"]);
    }

    #[test]
    fn test_property_and_index_access() {
        let engine = engine();
        let result: Array = engine
            .eval(
                r#"
                let t = table([["n", 1]]);
                t.n += 1;
                t["m"] = "x";
                [t.n, t.m, t.missing, "n" in t, t.len(), t.keys()]
                "#,
            )
            .unwrap();

        assert_eq!(result[0].as_int().unwrap(), 2);
        assert_eq!(result[1].clone().into_string().unwrap(), "x");
        assert!(result[2].is_unit());
        assert!(result[3].as_bool().unwrap());
        assert_eq!(result[4].as_int().unwrap(), 2);
        assert_eq!(result[5].clone().into_array().unwrap().len(), 2);
    }

    #[test]
    fn test_remove_and_convert() {
        let engine = engine();
        let text: String = engine
            .eval(
                r#"
                let t = table([["b", 1], ["a", "s"], ["c", true]]);
                t.remove("c");
                type_of(t) + " " + t.to_string()
                "#,
            )
            .unwrap();
        assert_eq!(text, r#"table #{ b: 1, a: "s" }"#);
    }

    #[test]
    fn test_bad_pairs_raise() {
        let engine = engine();
        assert!(engine.eval::<ScriptTable>(r#"table([1, 2])"#).is_err());
        assert!(engine.eval::<ScriptTable>(r#"table([[1, 2]])"#).is_err());
    }

    #[test]
    fn test_first_insert_wins_with_insert_new() {
        let mut t = ScriptTable::new();
        t.insert_new("k", || Dynamic::from_int(1));
        t.insert_new("k", || Dynamic::from_int(2));
        assert_eq!(t.len(), 1);
        assert_eq!(t.get("k").unwrap().as_int().unwrap(), 1);
    }
}
