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

//! Display for decoded statements

use std::fmt::Display;

use serde_json::Value;

use crate::{
    errors::Result,
    model::statement::{Column, Row, Statement},
};

/// Display the rows of a [`Statement`] in csv format.
pub struct CsvFormatter<'a> {
    columns: &'a [Column],
    rows: &'a [Row],
}

impl<'a> CsvFormatter<'a> {
    pub fn try_new(statement: &'a Statement) -> Result<Self> {
        Ok(Self {
            columns: statement.meta()?,
            rows: statement.rows()?,
        })
    }
}

fn csv_field(value: &Value) -> String {
    let raw = match value {
        Value::Null => return String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };

    if raw.contains(|c: char| c == ',' || c == '"' || c == '\n') {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw
    }
}

impl Display for CsvFormatter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.columns.is_empty() {
            let header = self
                .columns
                .iter()
                .map(|column| csv_field(&Value::String(column.name.clone())))
                .collect::<Vec<_>>();
            writeln!(f, "{}", header.join(","))?;
        }

        for row in self.rows {
            let fields = match row {
                Row::Record(record) if !self.columns.is_empty() => self
                    .columns
                    .iter()
                    .map(|column| record.get(&column.name).map(csv_field).unwrap_or_default())
                    .collect::<Vec<_>>(),
                Row::Record(record) => record.values().map(csv_field).collect(),
                Row::Values(values) => values.iter().map(csv_field).collect(),
                // Already delimited.
                Row::Raw(line) => vec![line.clone()],
            };
            writeln!(f, "{}", fields.join(","))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use serde_json::json;

    use super::*;
    use crate::{
        model::query::{Format, Query},
        transport::{RawResponse, ResponseInfo},
    };

    fn decoded_statement(format: Format, body: &str) -> Statement {
        let stmt = Statement::new(&Query::new("SELECT *").unwrap().format(format).prepare());
        stmt.complete(Ok(RawResponse {
            status: 200,
            body: Bytes::from(body.to_string()),
            info: ResponseInfo::default(),
        }));
        stmt
    }

    #[test]
    fn test_csv_display() {
        let stmt = decoded_statement(
            Format::JsonEachRow,
            concat!(
                r#"{"id":1,"name":"a,b","note":null}"#,
                "\n",
                r#"{"id":2,"name":"say \"hi\"","note":"x"}"#
            ),
        );
        let formatter = CsvFormatter::try_new(&stmt).unwrap();
        assert_eq!(
            "id,name,note\n1,\"a,b\",\n2,\"say \"\"hi\"\"\",x\n",
            formatter.to_string()
        );
    }

    #[test]
    fn test_csv_display_reads_back() {
        let stmt = decoded_statement(
            Format::JsonEachRow,
            r#"{"id":1,"name":"a,b"}
{"id":2,"name":"x\"y,z"}"#,
        );
        let csv = CsvFormatter::try_new(&stmt).unwrap().to_string();

        let reread = decoded_statement(Format::CsvWithNames, &csv);
        let names: Vec<_> = reread
            .rows()
            .unwrap()
            .iter()
            .map(|row| row.column("name").cloned())
            .collect();
        assert_eq!(vec![Some(json!("a,b")), Some(json!("x\"y,z"))], names);
    }

    #[test]
    fn test_csv_display_raw_lines() {
        let stmt = decoded_statement(Format::Csv, "1,\"a\"\n2,\"b\"\n");
        let formatter = CsvFormatter::try_new(&stmt).unwrap();
        assert_eq!("1,\"a\"\n2,\"b\"\n", formatter.to_string());
    }
}
