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

//! Rewriters applied to the sql text before it is sent.

use std::{collections::HashMap, fmt::Debug, sync::OnceLock};

use regex::{Captures, Regex};
use serde_json::Value;

use crate::util::quote_value;

/// A pure rewrite of sql text.
pub trait Transform: Send + Sync {
    fn process(&self, sql: String) -> String;
}

impl<F> Transform for F
where
    F: Fn(String) -> String + Send + Sync,
{
    fn process(&self, sql: String) -> String {
        self(sql)
    }
}

/// Substitutes `:name` placeholders with sql literals and `{name}`
/// placeholders with the raw text of the value.
///
/// Placeholders without a bound value are left untouched.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    values: HashMap<String, Value>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}|:([A-Za-z_][A-Za-z0-9_]*)")
            .expect("placeholder pattern is valid")
    })
}

impl Transform for Bindings {
    fn process(&self, sql: String) -> String {
        if self.values.is_empty() {
            return sql;
        }

        placeholder_pattern()
            .replace_all(&sql, |caps: &Captures| {
                if let Some(name) = caps.get(1) {
                    return match self.values.get(name.as_str()) {
                        Some(Value::String(raw)) => raw.clone(),
                        Some(value) => quote_value(value),
                        None => caps[0].to_string(),
                    };
                }

                match caps.get(2).and_then(|name| self.values.get(name.as_str())) {
                    Some(value) => quote_value(value),
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }
}
