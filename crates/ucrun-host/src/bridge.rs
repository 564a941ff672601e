// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Conversions between bus attributes and interpreter values
//!
//! Every conversion builds fresh containers; nothing aliases the source.
//! Attribute kinds the interpreter cannot represent become unit, and
//! interpreter values the bus cannot carry (unit, function pointers, custom
//! types) are left out of the converted table or array.
//!
//! Tables become [`ScriptTable`] values, so fields keep the order they
//! arrived in and a reply built from a `table` goes out in its own order.
//! Object map literals are sorted by key inside the interpreter; a reply
//! given as a map goes out in key order.
//!
//! Integers carry no width inside the interpreter. Outbound integers are
//! `Int32` when they fit and `Int64` otherwise, so an inbound `Int16` or a
//! small `Int64` comes back as `Int32`.

use crate::table::ScriptTable;
use rhai::{Array, Dynamic, Map};
use ucrun_bus::{AttrValue, Table};

/// Convert one attribute into an interpreter value
pub fn attr_to_dynamic(value: &AttrValue) -> Dynamic {
    match value {
        AttrValue::Bool(b) => Dynamic::from_bool(*b),
        AttrValue::Int16(i) => Dynamic::from_int(i64::from(*i)),
        AttrValue::Int32(i) => Dynamic::from_int(i64::from(*i)),
        AttrValue::Int64(i) => Dynamic::from_int(*i),
        AttrValue::Double(d) => Dynamic::from_float(*d),
        AttrValue::String(s) => Dynamic::from(s.clone()),
        AttrValue::Array(items) => {
            Dynamic::from_array(items.iter().map(attr_to_dynamic).collect::<Array>())
        }
        AttrValue::Table(table) => table_to_dynamic(table),
        AttrValue::Unspec | AttrValue::Unknown => Dynamic::UNIT,
    }
}

/// Convert a message payload into a script table
///
/// When a name repeats, the first field wins.
pub fn table_to_dynamic(table: &Table) -> Dynamic {
    let mut out = ScriptTable::new();
    for (name, value) in table.iter() {
        out.insert_new(name, || attr_to_dynamic(value));
    }
    Dynamic::from(out)
}

/// Convert an interpreter value into an attribute, if the bus can carry it
pub fn dynamic_to_attr(value: &Dynamic) -> Option<AttrValue> {
    let value = value.flatten_clone();

    if value.is_unit() {
        return None;
    }
    if let Ok(b) = value.as_bool() {
        return Some(AttrValue::Bool(b));
    }
    if let Ok(i) = value.as_int() {
        return Some(AttrValue::integer(i));
    }
    if let Ok(f) = value.as_float() {
        return Some(AttrValue::Double(f));
    }
    if let Ok(c) = value.as_char() {
        return Some(AttrValue::String(c.to_string()));
    }
    if value.is_string() {
        return value.into_string().ok().map(AttrValue::String);
    }
    if value.is_array() {
        return value
            .into_array()
            .ok()
            .map(|items| AttrValue::Array(items.iter().filter_map(dynamic_to_attr).collect()));
    }
    if value.is::<ScriptTable>() {
        return value
            .try_cast::<ScriptTable>()
            .map(|table| AttrValue::Table(fields_to_table(table.iter())));
    }
    if value.is_map() {
        return value
            .try_cast::<Map>()
            .map(|map| AttrValue::Table(fields_to_table(map.iter().map(|(n, v)| (n.as_str(), v)))));
    }

    None
}

/// Convert a table or object map into a reply payload; `None` for anything else
pub fn dynamic_to_table(value: &Dynamic) -> Option<Table> {
    match dynamic_to_attr(value)? {
        AttrValue::Table(table) => Some(table),
        _ => None,
    }
}

fn fields_to_table<'a>(fields: impl Iterator<Item = (&'a str, &'a Dynamic)>) -> Table {
    fields
        .filter_map(|(name, value)| dynamic_to_attr(value).map(|v| (name.to_string(), v)))
        .collect()
}
