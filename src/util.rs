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

use serde_json::Value;

/// Http status code.
#[allow(dead_code)]
#[derive(Debug, Clone, Copy)]
pub enum StatusCode {
    Ok = 200,
    BadRequest = 400,
    NotFound = 404,
    InternalError = 500,
}

impl StatusCode {
    pub fn as_u16(&self) -> u16 {
        *self as u16
    }
}

#[inline]
pub fn is_ok(code: u16) -> bool {
    code == StatusCode::Ok.as_u16()
}

/// Render a value as a sql literal.
///
/// Arrays are rendered as a comma separated list without brackets, so they
/// can be placed into `IN (...)`.
pub fn quote_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(v) => if *v { "1" } else { "0" }.to_string(),
        Value::Number(v) => v.to_string(),
        Value::String(v) => quote_string(v),
        Value::Array(values) => values
            .iter()
            .map(quote_value)
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => quote_string(&value.to_string()),
    }
}

pub fn quote_string(s: &str) -> String {
    let mut quoted = String::with_capacity(s.len() + 2);
    quoted.push('\'');
    for c in s.chars() {
        match c {
            '\\' => quoted.push_str("\\\\"),
            '\'' => quoted.push_str("\\'"),
            '\n' => quoted.push_str("\\n"),
            '\t' => quoted.push_str("\\t"),
            '\0' => quoted.push_str("\\0"),
            c => quoted.push(c),
        }
    }
    quoted.push('\'');
    quoted
}

pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "\\`"))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_quote_value() {
        let cases = vec![
            (json!(null), "NULL"),
            (json!(true), "1"),
            (json!(42), "42"),
            (json!(-1.5), "-1.5"),
            (json!("it's"), r"'it\'s'"),
            (json!("a\\b\nc"), r"'a\\b\nc'"),
            (json!([1, "x", null]), "1,'x',NULL"),
            (json!({"k": 1}), r#"'{"k":1}'"#),
        ];

        for (value, expect) in cases {
            assert_eq!(expect, quote_value(&value));
        }
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!("`site_id`", quote_identifier("site_id"));
        assert_eq!("`we\\`ird`", quote_identifier("we`ird"));
    }
}
