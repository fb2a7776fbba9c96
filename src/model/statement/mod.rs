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

//! Lazily decoded result of one request

mod decode;
pub mod display;
pub mod row;

use std::{
    sync::{Arc, Mutex, MutexGuard, OnceLock},
    time::Duration,
};

use bytes::Bytes;
use serde_json::{Map, Value};
use tracing::warn;

pub use self::row::{Column, Extremes, Row, RowTree};
use self::{
    decode::{decode_body, Decoded},
    row::{merge_tree, row_to_tree},
};
use crate::{
    errors::{parse_server_error, Error, Result, ServerError},
    model::query::{Format, Layout, PreparedQuery},
    transport::{RawResponse, ResponseInfo},
    util::is_ok,
};

/// Result of one dispatched request.
///
/// Nothing is readable before the request completes: every accessor fails
/// with [`Error::NoResponse`] until then. The body is decoded once, on the
/// first accessor that needs rows or metadata, and kept for later calls.
///
/// Clones share the same request and decoded result.
#[derive(Clone)]
pub struct Statement {
    inner: Arc<Inner>,
}

struct Inner {
    sql: String,
    format: Option<Format>,
    response: OnceLock<Completed>,
    /// Empty while pending, set once decoded.
    decoded: OnceLock<Decoded>,
}

struct Completed {
    status: u16,
    /// Set when no response was received.
    transport_error: Option<String>,
    info: ResponseInfo,
    /// Dropped once a line based format has been decoded.
    body: Mutex<Option<Bytes>>,
}

impl Completed {
    fn body(&self) -> MutexGuard<'_, Option<Bytes>> {
        self.body
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Statement {
    pub(crate) fn new(prepared: &PreparedQuery) -> Self {
        Self {
            inner: Arc::new(Inner {
                sql: prepared.sql.clone(),
                format: prepared.format,
                response: OnceLock::new(),
                decoded: OnceLock::new(),
            }),
        }
    }

    /// Bind the outcome of the request, later calls are ignored.
    pub(crate) fn complete(&self, result: Result<RawResponse>) {
        let completed = match result {
            Ok(resp) => Completed {
                status: resp.status,
                transport_error: None,
                info: resp.info,
                body: Mutex::new(Some(resp.body)),
            },
            Err(e) => {
                warn!("Request got no response, sql:{}, err:{}", self.inner.sql, e);
                Completed {
                    status: 0,
                    transport_error: Some(e.to_string()),
                    info: ResponseInfo::default(),
                    body: Mutex::new(None),
                }
            }
        };

        let _ = self.inner.response.set(completed);
    }

    pub fn sql(&self) -> &str {
        &self.inner.sql
    }

    /// Format of the response, as requested or declared in the sql.
    pub fn format(&self) -> Option<Format> {
        self.inner.format
    }

    /// Whether the request has completed.
    pub fn is_ready(&self) -> bool {
        self.inner.response.get().is_some()
    }

    /// Whether the request completed with a failure.
    pub fn is_error(&self) -> Result<bool> {
        let completed = self.completed()?;
        Ok(completed.transport_error.is_some() || !is_ok(completed.status))
    }

    fn completed(&self) -> Result<&Completed> {
        self.inner.response.get().ok_or(Error::NoResponse)
    }

    /// Surface the failure of the request, if any, without decoding.
    pub fn check(&self) -> Result<()> {
        self.checked().map(|_| ())
    }

    fn checked(&self) -> Result<&Completed> {
        let completed = self.completed()?;

        if let Some(msg) = &completed.transport_error {
            return Err(Error::QueryFailed {
                code: completed.status as u32,
                message: msg.clone(),
            });
        }

        if !is_ok(completed.status) {
            let body = completed
                .body()
                .as_ref()
                .map(|body| String::from_utf8_lossy(body).into_owned())
                .unwrap_or_default();

            if let Some((code, message)) = parse_server_error(&body) {
                return Err(Error::Database(ServerError {
                    code,
                    message,
                    sql: self.inner.sql.clone(),
                }));
            }

            return Err(Error::QueryFailed {
                code: completed.status as u32,
                message: format!("HttpCode:{} ; {}", completed.status, body),
            });
        }

        Ok(completed)
    }

    fn decoded(&self) -> Result<&Decoded> {
        if let Some(decoded) = self.inner.decoded.get() {
            return Ok(decoded);
        }

        let completed = self.checked()?;
        // Holding the body lock makes concurrent first reads decode once.
        let mut body = completed.body();
        if let Some(decoded) = self.inner.decoded.get() {
            return Ok(decoded);
        }

        let decoded = decode_body(self.inner.format, body.as_deref().unwrap_or_default())?;
        let line_based = matches!(
            self.inner.format.map(|f| f.layout()),
            Some(Layout::NamesHeader { .. } | Layout::EachRow | Layout::Lines)
        );
        if line_based {
            *body = None;
        }

        Ok(self.inner.decoded.get_or_init(|| decoded))
    }

    /// The raw body.
    ///
    /// It is `None` once a line based format has been decoded into rows.
    pub fn raw_data(&self) -> Result<Option<Bytes>> {
        let completed = self.checked()?;
        let body = completed.body().as_ref().cloned();
        Ok(body)
    }

    pub fn info(&self) -> Result<ResponseInfo> {
        Ok(self.checked()?.info)
    }

    pub fn total_time(&self) -> Result<Duration> {
        Ok(self.info()?.total_time)
    }

    pub fn meta(&self) -> Result<&[Column]> {
        Ok(&self.decoded()?.meta)
    }

    pub fn rows(&self) -> Result<&[Row]> {
        Ok(&self.decoded()?.rows)
    }

    /// Number of rows in the result.
    pub fn count(&self) -> Result<usize> {
        Ok(self.decoded()?.count)
    }

    /// Number of rows the query would return without `LIMIT`, if reported.
    pub fn count_all(&self) -> Result<Option<u64>> {
        Ok(self.decoded()?.rows_before_limit_at_least)
    }

    pub fn totals(&self) -> Result<Option<&Row>> {
        Ok(self.decoded()?.totals.as_ref())
    }

    pub fn extremes(&self) -> Result<Option<&Extremes>> {
        Ok(self.decoded()?.extremes.as_ref())
    }

    pub fn extremes_min(&self) -> Result<Option<&Row>> {
        Ok(self.extremes()?.and_then(|extremes| extremes.min.as_ref()))
    }

    pub fn extremes_max(&self) -> Result<Option<&Row>> {
        Ok(self.extremes()?.and_then(|extremes| extremes.max.as_ref()))
    }

    pub fn statistics(&self) -> Result<Option<&Map<String, Value>>> {
        Ok(self.decoded()?.statistics.as_ref())
    }

    pub fn statistic(&self, key: &str) -> Result<Option<&Value>> {
        Ok(self.statistics()?.and_then(|statistics| statistics.get(key)))
    }

    pub fn fetch_one(&self) -> Result<Option<&Row>> {
        Ok(self.decoded()?.rows.first())
    }

    /// Value of a column in the first row.
    ///
    /// Positional rows are resolved through the column metadata.
    pub fn fetch_one_column(&self, key: &str) -> Result<Option<&Value>> {
        let decoded = self.decoded()?;
        let value = match decoded.rows.first() {
            Some(Row::Values(values)) => decoded
                .meta
                .iter()
                .position(|column| column.name == key)
                .and_then(|idx| values.get(idx)),
            Some(row) => row.column(key),
            None => None,
        };

        Ok(value)
    }

    /// Rows keyed by the values of the `path` columns, outermost first.
    ///
    /// Rows sharing a key are merged, and values from earlier rows win
    /// over later ones.
    pub fn rows_as_tree(&self, path: &[&str]) -> Result<RowTree> {
        let mut tree = RowTree::new();
        for row in self.rows()? {
            if let Some(row_tree) = row_to_tree(row, path) {
                merge_tree(&mut tree, row_tree);
            }
        }

        Ok(tree)
    }

    /// Same as [`rows_as_tree`](Self::rows_as_tree) with a dotted path like
    /// `"site.url"`.
    pub fn rows_as_tree_by(&self, dotted_path: &str) -> Result<RowTree> {
        let path: Vec<_> = dotted_path.split('.').filter(|s| !s.is_empty()).collect();
        self.rows_as_tree(&path)
    }
}

impl std::fmt::Debug for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Statement")
            .field("sql", &self.inner.sql)
            .field("format", &self.inner.format)
            .field("ready", &self.is_ready())
            .field("decoded", &self.inner.decoded.get().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::model::query::Query;

    fn statement(sql: &str, format: Format) -> Statement {
        Statement::new(&Query::new(sql).unwrap().format(format).prepare())
    }

    fn reply(status: u16, body: &str) -> Result<RawResponse> {
        Ok(RawResponse {
            status,
            body: Bytes::from(body.to_string()),
            info: ResponseInfo {
                total_time: Duration::from_millis(5),
                starttransfer_time: Duration::from_millis(2),
                size_upload: 10,
                size_download: body.len(),
            },
        })
    }

    #[test]
    fn test_no_response() {
        let stmt = statement("SELECT 1", Format::Json);
        assert!(!stmt.is_ready());
        assert!(matches!(stmt.rows(), Err(Error::NoResponse)));
        assert!(matches!(stmt.check(), Err(Error::NoResponse)));
        assert!(matches!(stmt.raw_data(), Err(Error::NoResponse)));
        assert!(matches!(stmt.is_error(), Err(Error::NoResponse)));
    }

    #[test]
    fn test_decode_once() {
        let stmt = statement("SELECT a, b FROM t", Format::TsvWithNamesAndTypes);
        stmt.complete(reply(200, "a\tb\nInt32\tString\n1\tx\n2\ty"));

        let first = stmt.rows().unwrap().as_ptr();
        assert_eq!(2, stmt.count().unwrap());
        assert_eq!(
            &[Column::with_type("a", "Int32"), Column::with_type("b", "String")][..],
            stmt.meta().unwrap()
        );
        assert_eq!(first, stmt.rows().unwrap().as_ptr());
        // The body of a line based format is dropped after decoding.
        assert!(stmt.raw_data().unwrap().is_none());

        let cloned = stmt.clone();
        assert_eq!(first, cloned.rows().unwrap().as_ptr());
    }

    #[test]
    fn test_envelope_keeps_raw_body() {
        let body = concat!(
            r#"{"meta":[{"name":"a","type":"UInt8"}],"data":[{"a":1}],"#,
            r#""rows":1,"statistics":{"elapsed":0.5}}"#
        );
        let stmt = statement("SELECT 1 AS a", Format::Json);
        stmt.complete(reply(200, body));

        assert_eq!(1, stmt.count().unwrap());
        assert_eq!(Some(&json!(0.5)), stmt.statistic("elapsed").unwrap());
        assert_eq!(None, stmt.statistic("rows_read").unwrap());
        assert_eq!(Some(&json!(1)), stmt.fetch_one_column("a").unwrap());
        assert_eq!(body.as_bytes(), &stmt.raw_data().unwrap().unwrap()[..]);
        assert_eq!(Duration::from_millis(5), stmt.total_time().unwrap());
    }

    #[test]
    fn test_fetch_one_positional() {
        let body = concat!(
            r#"{"meta":[{"name":"a","type":"UInt8"},{"name":"b","type":"String"}],"#,
            r#""data":[[1,"x"]]}"#
        );
        let stmt = statement("SELECT 1 AS a, 'x' AS b", Format::JsonCompact);
        stmt.complete(reply(200, body));

        assert_eq!(Some(&json!("x")), stmt.fetch_one_column("b").unwrap());
        assert_eq!(None, stmt.fetch_one_column("c").unwrap());
        assert_eq!(Some(&Row::Values(vec![json!(1), json!("x")])), stmt.fetch_one().unwrap());
    }

    #[test]
    fn test_database_exception() {
        let body = "Code: 60, e.displayText() = DB::Exception: Table default.nope doesn't exist., \
                    e.what() = DB::Exception\n";
        let stmt = statement("SELECT * FROM nope", Format::Json);
        stmt.complete(reply(404, body));

        assert!(stmt.is_error().unwrap());
        match stmt.rows() {
            Err(Error::Database(err)) => {
                assert_eq!(60, err.code);
                assert_eq!("Table default.nope doesn't exist.", err.message);
                assert_eq!("SELECT * FROM nope FORMAT JSON", err.sql);
            }
            other => panic!("unexpected result:{:?}", other),
        }
        // Failures are not memoized.
        assert!(matches!(stmt.count(), Err(Error::Database(_))));
    }

    #[test]
    fn test_query_failed() {
        let stmt = statement("SELECT 1", Format::Json);
        stmt.complete(reply(502, "Bad Gateway"));
        match stmt.check() {
            Err(Error::QueryFailed { code, message }) => {
                assert_eq!(502, code);
                assert_eq!("HttpCode:502 ; Bad Gateway", message);
            }
            other => panic!("unexpected result:{:?}", other),
        }

        let stmt = statement("SELECT 1", Format::Json);
        stmt.complete(Err(Error::Transport("connection refused".to_string())));
        assert!(matches!(stmt.rows(), Err(Error::QueryFailed { code: 0, .. })));
    }

    #[test]
    fn test_rows_as_tree() {
        let stmt = statement("SELECT site, url, v FROM t", Format::JsonEachRow);
        stmt.complete(reply(
            200,
            "{\"site\":\"a\",\"url\":\"/x\",\"v\":1}\n{\"site\":\"a\",\"url\":\"/y\",\"v\":2}",
        ));

        let tree = stmt.rows_as_tree(&["site", "url"]).unwrap();
        assert_eq!(
            json!({"a": {
                "/x": {"site": "a", "url": "/x", "v": 1},
                "/y": {"site": "a", "url": "/y", "v": 2}
            }}),
            Value::Object(tree)
        );
        assert_eq!(
            stmt.rows_as_tree(&["site", "url"]).unwrap(),
            stmt.rows_as_tree_by("site.url").unwrap()
        );
    }

    #[test]
    fn test_extremes_and_totals() {
        let body = r#"{"meta":[{"name":"v","type":"UInt64"}],"data":[{"v":"1"},{"v":"3"}],
            "totals":{"v":"4"},"extremes":{"min":{"v":"1"},"max":{"v":"3"}},
            "rows_before_limit_at_least":9}"#;
        let stmt = statement("SELECT v FROM t", Format::Json);
        stmt.complete(reply(200, body));

        assert_eq!(Some(&json!("4")), stmt.totals().unwrap().unwrap().column("v"));
        assert_eq!(Some(&json!("1")), stmt.extremes_min().unwrap().unwrap().column("v"));
        assert_eq!(Some(&json!("3")), stmt.extremes_max().unwrap().unwrap().column("v"));
        assert_eq!(Some(9), stmt.count_all().unwrap());
    }
}
