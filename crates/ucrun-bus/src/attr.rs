// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Structured message attributes
//!
//! A bus payload is a [`Table`]: an ordered sequence of named attributes.
//! Attribute values are scalars (boolean, 16/32/64-bit signed integers,
//! doubles, strings) or nested containers (arrays and tables). Field order
//! is significant and preserved through every conversion.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single attribute value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AttrValue {
    /// Boolean flag
    Bool(bool),
    /// 16-bit signed integer
    Int16(i16),
    /// 32-bit signed integer
    Int32(i32),
    /// 64-bit signed integer
    Int64(i64),
    /// IEEE double
    Double(f64),
    /// UTF-8 string
    String(String),
    /// Ordered list of unnamed values
    Array(Vec<AttrValue>),
    /// Ordered list of named values
    Table(Table),
    /// Placeholder carrying no value
    Unspec,
    /// Any attribute kind this client does not understand
    #[serde(other)]
    Unknown,
}

impl AttrValue {
    /// Name of the attribute kind, as used on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            AttrValue::Bool(_) => "bool",
            AttrValue::Int16(_) => "int16",
            AttrValue::Int32(_) => "int32",
            AttrValue::Int64(_) => "int64",
            AttrValue::Double(_) => "double",
            AttrValue::String(_) => "string",
            AttrValue::Array(_) => "array",
            AttrValue::Table(_) => "table",
            AttrValue::Unspec => "unspec",
            AttrValue::Unknown => "unknown",
        }
    }

    /// Narrowest integer attribute able to hold `value`
    pub fn integer(value: i64) -> Self {
        match i32::try_from(value) {
            Ok(v) => AttrValue::Int32(v),
            Err(_) => AttrValue::Int64(value),
        }
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        AttrValue::Bool(value)
    }
}

impl From<i32> for AttrValue {
    fn from(value: i32) -> Self {
        AttrValue::Int32(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::Int64(value)
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        AttrValue::Double(value)
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::String(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::String(value)
    }
}

impl From<Vec<AttrValue>> for AttrValue {
    fn from(value: Vec<AttrValue>) -> Self {
        AttrValue::Array(value)
    }
}

impl From<Table> for AttrValue {
    fn from(value: Table) -> Self {
        AttrValue::Table(value)
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Bool(b) => write!(f, "{}", b),
            AttrValue::Int16(i) => write!(f, "{}", i),
            AttrValue::Int32(i) => write!(f, "{}", i),
            AttrValue::Int64(i) => write!(f, "{}", i),
            AttrValue::Double(d) => write!(f, "{}", d),
            AttrValue::String(s) => write!(f, "{:?}", s),
            AttrValue::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            AttrValue::Table(table) => write!(f, "{}", table),
            AttrValue::Unspec => write!(f, "null"),
            AttrValue::Unknown => write!(f, "<unknown>"),
        }
    }
}

/// Ordered table of named attributes
///
/// Duplicate names are allowed, as on the wire; lookups return the first match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Table(Vec<(String, AttrValue)>);

impl Table {
    /// Create an empty table
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Append a field, keeping insertion order
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<AttrValue>) {
        self.0.push((name.into(), value.into()));
    }

    /// Builder-style [`Table::push`]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.push(name, value);
        self
    }

    /// First value stored under `name`
    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        self.0.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    /// Iterate fields in order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttrValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Field names in order
    pub fn names(&self) -> Vec<&str> {
        self.0.iter().map(|(k, _)| k.as_str()).collect()
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the table has no fields
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, AttrValue)> for Table {
    fn from_iter<I: IntoIterator<Item = (String, AttrValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Table {
    type Item = (String, AttrValue);
    type IntoIter = std::vec::IntoIter<(String, AttrValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, value)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{:?}: {}", name, value)?;
        }
        write!(f, "}}")
    }
}
