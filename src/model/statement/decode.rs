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

//! Turns response bodies into rows, one parser per [`Layout`].

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::{
    errors::{Error, Result},
    model::{
        query::{Format, Layout},
        statement::row::{Column, Extremes, Row},
    },
};

/// Everything decoded from one response.
#[derive(Debug, Default)]
pub(crate) struct Decoded {
    pub meta: Vec<Column>,
    pub rows: Vec<Row>,
    pub count: usize,
    pub rows_before_limit_at_least: Option<u64>,
    pub totals: Option<Row>,
    pub extremes: Option<Extremes>,
    pub statistics: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    meta: Option<Vec<Column>>,
    data: Option<Vec<Value>>,
    rows: Option<u64>,
    rows_before_limit_at_least: Option<u64>,
    totals: Option<Value>,
    extremes: Option<EnvelopeExtremes>,
    statistics: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct EnvelopeExtremes {
    min: Option<Value>,
    max: Option<Value>,
}

pub(crate) fn decode_body(format: Option<Format>, body: &[u8]) -> Result<Decoded> {
    let text = String::from_utf8_lossy(body);
    // An empty body carries no rows whatever the format is.
    if text.trim().is_empty() {
        return Ok(Decoded::default());
    }

    let layout = format.map(|f| f.layout()).unwrap_or(Layout::Opaque);
    let decoded = match layout {
        Layout::NamesHeader {
            delimiter,
            with_types,
        } => decode_names_header(&text, delimiter, with_types),
        Layout::EachRow => decode_each_row(&text)?,
        Layout::Lines => decode_lines(&text),
        Layout::Envelope => decode_envelope(&text)?,
        Layout::Opaque => Decoded::default(),
    };

    // Only the headerless line formats may come without metadata.
    if decoded.meta.is_empty() && layout != Layout::Lines {
        return Err(Error::MissingMetadata);
    }

    debug!(
        "Decoded response, format:{:?}, columns:{}, rows:{}",
        format,
        decoded.meta.len(),
        decoded.count
    );

    Ok(decoded)
}

fn lines(text: &str) -> impl Iterator<Item = &str> {
    text.trim_matches(|c: char| c == '\n' || c == '\r')
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
}

fn decode_names_header(text: &str, delimiter: char, with_types: bool) -> Decoded {
    let mut records = if delimiter == '\t' {
        tsv_records(text)
    } else {
        csv_records(text, delimiter)
    }
    .into_iter();

    let mut meta: Vec<_> = records
        .next()
        .map(|header| header.into_iter().map(|name| Column::new(cell_text(name))).collect())
        .unwrap_or_default();

    if with_types {
        if let Some(types) = records.next() {
            for (column, data_type) in meta.iter_mut().zip(types) {
                column.data_type = Some(cell_text(data_type));
            }
        }
    }

    let rows: Vec<_> = records
        .map(|record| {
            let record = record
                .into_iter()
                .enumerate()
                .map(|(idx, value)| {
                    let name = meta
                        .get(idx)
                        .map(|column| column.name.clone())
                        .unwrap_or_else(|| idx.to_string());
                    (name, value)
                })
                .collect::<Map<_, _>>();
            Row::Record(record)
        })
        .collect();

    Decoded {
        meta,
        count: rows.len(),
        rows,
        ..Default::default()
    }
}

fn decode_each_row(text: &str) -> Result<Decoded> {
    let rows = lines(text)
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            serde_json::from_str::<Value>(line)
                .map(Row::from_json)
                .map_err(|e| Error::Decode(format!("invalid json row:{}, err:{}", line, e)))
        })
        .collect::<Result<Vec<_>>>()?;

    // Columns come from the keys of the first row.
    let meta = match rows.first() {
        Some(Row::Record(first)) => first.keys().map(Column::new).collect(),
        _ => Vec::new(),
    };

    Ok(Decoded {
        meta,
        count: rows.len(),
        rows,
        ..Default::default()
    })
}

fn decode_lines(text: &str) -> Decoded {
    let rows: Vec<_> = lines(text).map(|line| Row::Raw(line.to_string())).collect();

    Decoded {
        count: rows.len(),
        rows,
        ..Default::default()
    }
}

fn non_empty_row(value: Option<Value>) -> Option<Row> {
    match value? {
        Value::Null => None,
        Value::Object(record) if record.is_empty() => None,
        Value::Array(values) if values.is_empty() => None,
        value => Some(Row::from_json(value)),
    }
}

fn decode_envelope(text: &str) -> Result<Decoded> {
    let envelope: Envelope = serde_json::from_str(text)
        .map_err(|e| Error::Decode(format!("invalid json document, err:{}", e)))?;

    let rows: Vec<_> = envelope
        .data
        .unwrap_or_default()
        .into_iter()
        .map(Row::from_json)
        .collect();
    let count = envelope
        .rows
        .map(|rows| rows as usize)
        .unwrap_or(rows.len());
    let extremes = envelope.extremes.map(|extremes| Extremes {
        min: non_empty_row(extremes.min),
        max: non_empty_row(extremes.max),
    });

    Ok(Decoded {
        meta: envelope.meta.unwrap_or_default(),
        rows,
        count,
        rows_before_limit_at_least: envelope.rows_before_limit_at_least,
        totals: non_empty_row(envelope.totals),
        extremes,
        statistics: envelope.statistics,
    })
}

fn unescape_tsv(cell: &str) -> Value {
    if cell == "\\N" {
        return Value::Null;
    }
    if !cell.contains('\\') {
        return Value::String(cell.to_string());
    }

    let mut unescaped = String::with_capacity(cell.len());
    let mut chars = cell.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            unescaped.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => unescaped.push('\n'),
            Some('t') => unescaped.push('\t'),
            Some('r') => unescaped.push('\r'),
            Some('0') => unescaped.push('\0'),
            Some('b') => unescaped.push('\u{8}'),
            Some('f') => unescaped.push('\u{c}'),
            Some(other) => unescaped.push(other),
            None => unescaped.push('\\'),
        }
    }

    Value::String(unescaped)
}

fn tsv_records(text: &str) -> Vec<Vec<Value>> {
    lines(text)
        .map(|line| line.split('\t').map(unescape_tsv).collect())
        .collect()
}

/// Split csv text into records of cells.
///
/// Quoted cells may hold the delimiter, line breaks and `""` escaped quotes.
/// An unquoted `\N` is null.
fn csv_records(text: &str, delimiter: char) -> Vec<Vec<Value>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut cell = String::new();
    let mut quoted = false;
    let mut in_quotes = false;

    let mut chars = text
        .trim_matches(|c: char| c == '\n' || c == '\r')
        .chars()
        .peekable();
    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    cell.push('"');
                }
                '"' => in_quotes = false,
                c => cell.push(c),
            }
            continue;
        }

        match c {
            '"' if cell.is_empty() && !quoted => {
                quoted = true;
                in_quotes = true;
            }
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                record.push(csv_cell(std::mem::take(&mut cell), std::mem::take(&mut quoted)));
                records.push(std::mem::take(&mut record));
            }
            c if c == delimiter => {
                record.push(csv_cell(std::mem::take(&mut cell), std::mem::take(&mut quoted)));
            }
            c => cell.push(c),
        }
    }
    record.push(csv_cell(cell, quoted));
    records.push(record);

    records
}

fn csv_cell(cell: String, quoted: bool) -> Value {
    if !quoted && cell == "\\N" {
        Value::Null
    } else {
        Value::String(cell)
    }
}

fn cell_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}
