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

//! Model for query text

mod format;
mod transform;

use std::{fmt, sync::Arc};

pub use format::Format;
pub(crate) use format::Layout;
pub use transform::{Bindings, Transform};

use crate::errors::{Error, Result};

/// Sql text with the desired output format and the rewriters to apply.
///
/// It is immutable after construction and can be prepared many times.
#[derive(Clone)]
pub struct Query {
    sql: String,
    format: Option<Format>,
    transforms: Vec<Arc<dyn Transform>>,
}

/// Final sql ready for dispatch, with the format its response will use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedQuery {
    pub sql: String,
    pub format: Option<Format>,
}

impl Query {
    pub fn new(sql: impl Into<String>) -> Result<Self> {
        let sql = sql.into();
        if sql.trim().is_empty() {
            return Err(Error::InvalidQuery("Empty Query".to_string()));
        }

        Ok(Self {
            sql,
            format: None,
            transforms: Vec::new(),
        })
    }

    #[must_use]
    pub fn format(mut self, format: Format) -> Self {
        self.format = Some(format);
        self
    }

    #[must_use]
    pub fn transform(mut self, transform: impl Transform + 'static) -> Self {
        self.transforms.push(Arc::new(transform));
        self
    }

    #[must_use]
    pub fn bind(self, bindings: Bindings) -> Self {
        if bindings.is_empty() {
            return self;
        }
        self.transform(bindings)
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// The requested format, if any.
    pub fn requested_format(&self) -> Option<Format> {
        self.format
    }

    pub(crate) fn with_default_format(mut self, format: Format) -> Self {
        if self.format.is_none() {
            self.format = Some(format);
        }
        self
    }

    /// Produce the final sql.
    ///
    /// A `FORMAT` clause already present in the sql overrides the requested
    /// format, otherwise `FORMAT <requested>` is appended. The transforms run
    /// afterwards in the order they were added.
    pub fn prepare(&self) -> PreparedQuery {
        let (mut sql, format) = match (Format::declared_in(&self.sql), self.format) {
            (Some(declared), _) => (self.sql.clone(), Some(declared)),
            (None, Some(requested)) => (
                format!("{} FORMAT {}", self.sql, requested),
                Some(requested),
            ),
            (None, None) => (self.sql.clone(), None),
        };

        for transform in &self.transforms {
            sql = transform.process(sql);
        }

        PreparedQuery { sql, format }
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("sql", &self.sql)
            .field("format", &self.format)
            .field("transforms", &self.transforms.len())
            .finish()
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.prepare().sql)
    }
}

/// Conversion into a [`Query`], so sql text can be passed where a query is
/// expected.
pub trait IntoQuery {
    fn into_query(self) -> Result<Query>;
}

impl IntoQuery for Query {
    fn into_query(self) -> Result<Query> {
        Ok(self)
    }
}

impl IntoQuery for &str {
    fn into_query(self) -> Result<Query> {
        Query::new(self)
    }
}

impl IntoQuery for String {
    fn into_query(self) -> Result<Query> {
        Query::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reject_empty_sql() {
        for sql in ["", "   ", "\n\t"] {
            assert!(matches!(Query::new(sql), Err(Error::InvalidQuery(_))));
        }
    }

    #[test]
    fn test_append_requested_format() {
        for format in Format::ALL {
            let prepared = Query::new("SELECT * FROM t").unwrap().format(format).prepare();
            assert_eq!(format!("SELECT * FROM t FORMAT {}", format.name()), prepared.sql);
            assert_eq!(Some(format), prepared.format);
        }
    }

    #[test]
    fn test_declared_format_wins() {
        let cases = vec![
            ("SELECT 1 FORMAT TSV", Format::Tsv),
            ("SELECT 1 FORMAT TSVWithNames", Format::TsvWithNames),
            ("SELECT 1 FORMAT TSVWithNamesAndTypes", Format::TsvWithNamesAndTypes),
            ("SELECT 1 format csvwithnames", Format::CsvWithNames),
        ];

        for (sql, declared) in cases {
            let prepared = Query::new(sql).unwrap().format(Format::Json).prepare();
            assert_eq!(sql, prepared.sql);
            assert_eq!(Some(declared), prepared.format);
        }
    }

    #[test]
    fn test_no_format() {
        let prepared = Query::new("INSERT INTO t VALUES (1)").unwrap().prepare();
        assert_eq!("INSERT INTO t VALUES (1)", prepared.sql);
        assert_eq!(None, prepared.format);
    }

    #[test]
    fn test_transforms_in_order() {
        let prepared = Query::new("SELECT :a")
            .unwrap()
            .format(Format::Json)
            .transform(|sql: String| sql.replace(":a", ":b"))
            .transform(|sql: String| sql.replace(":b", "42"))
            .prepare();
        assert_eq!("SELECT 42 FORMAT JSON", prepared.sql);
    }

    #[test]
    fn test_prepare_is_repeatable() {
        let query = Query::new("SELECT :x")
            .unwrap()
            .format(Format::JsonEachRow)
            .bind(Bindings::new().bind("x", "y"));
        assert_eq!(query.prepare(), query.prepare());
        assert_eq!("SELECT 'y' FORMAT JSONEachRow", query.to_string());
    }
}
