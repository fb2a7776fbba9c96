// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Rows and column metadata of decoded results

use serde::Deserialize;
use serde_json::{Map, Value};

/// Column metadata of a result.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type", default)]
    pub data_type: Option<String>,
}

impl Column {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: None,
        }
    }

    pub fn with_type(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: Some(data_type.into()),
        }
    }
}

/// A row of a decoded result.
#[derive(Debug, Clone, PartialEq)]
pub enum Row {
    /// Values keyed by column name, in column order.
    Record(Map<String, Value>),
    /// Positional values, as `JSONCompact` sends them.
    Values(Vec<Value>),
    /// An undecoded delimited line from `CSV`/`TSV`.
    Raw(String),
}

impl Row {
    pub(crate) fn from_json(value: Value) -> Self {
        match value {
            Value::Object(record) => Row::Record(record),
            Value::Array(values) => Row::Values(values),
            Value::String(line) => Row::Raw(line),
            other => Row::Values(vec![other]),
        }
    }

    /// Value of the column, only available for records.
    pub fn column(&self, name: &str) -> Option<&Value> {
        match self {
            Row::Record(record) => record.get(name),
            Row::Values(_) | Row::Raw(_) => None,
        }
    }

    pub fn as_raw(&self) -> Option<&str> {
        match self {
            Row::Raw(line) => Some(line),
            Row::Record(_) | Row::Values(_) => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Row::Record(record) => Value::Object(record.clone()),
            Row::Values(values) => Value::Array(values.clone()),
            Row::Raw(line) => Value::String(line.clone()),
        }
    }
}

/// Minimums and maximums of the result columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extremes {
    pub min: Option<Row>,
    pub max: Option<Row>,
}

/// Rows re-keyed by the values of some columns, see
/// [`Statement::rows_as_tree`](crate::model::statement::Statement::rows_as_tree).
pub type RowTree = Map<String, Value>;

fn tree_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Nest a row under the values of the `path` columns.
///
/// The rightmost path segment becomes the innermost key. A segment the row
/// has no value for is used literally.
pub(crate) fn row_to_tree(row: &Row, path: &[&str]) -> Option<RowTree> {
    let mut tree = row.to_json();
    for segment in path.iter().rev() {
        let key = row
            .column(segment)
            .map(tree_key)
            .unwrap_or_else(|| segment.to_string());
        let mut level = Map::with_capacity(1);
        level.insert(key, tree);
        tree = Value::Object(level);
    }

    match tree {
        Value::Object(tree) => Some(tree),
        _ => None,
    }
}

/// Merge `incoming` into `acc`.
///
/// Keys only in `incoming` are added and nested objects are merged
/// recursively; on any other conflict the value already in `acc` is kept.
pub(crate) fn merge_tree(acc: &mut RowTree, incoming: RowTree) {
    for (key, value) in incoming {
        match acc.get_mut(&key) {
            None => {
                acc.insert(key, value);
            }
            Some(Value::Object(existing)) => {
                if let Value::Object(incoming) = value {
                    merge_tree(existing, incoming);
                }
            }
            Some(_) => {}
        }
    }
}
