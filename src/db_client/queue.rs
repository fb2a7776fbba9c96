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

//! Queue of async operations

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use futures::{future::join_all, stream, StreamExt};
use tokio::fs::File;
use tracing::debug;

use crate::{
    errors::{Error, Result},
    model::{
        query::{Format, Query},
        statement::Statement,
    },
    transport::{HttpRequest, Transport, Upload},
    util::quote_identifier,
};

/// Kind of a queued operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Select,
    Insert,
    Execute,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    Empty,
    Queued(usize),
    Flushing,
}

struct QueueEntry {
    kind: OperationKind,
    request: HttpRequest,
    statement: Statement,
}

/// Owner of the operations queued for concurrent execution.
///
/// Operations are only sent by [`flush`](Queue::flush); their statements
/// fail with [`Error::NoResponse`] until then. A batch load needs an empty
/// queue, so it can't race with operations queued before it.
pub struct Queue {
    transport: Arc<dyn Transport>,
    entries: Vec<QueueEntry>,
    flushing: bool,
    max_concurrency: usize,
}

/// Resets the flushing flag, also when the flush future is dropped.
struct FlushingGuard<'a>(&'a mut bool);

impl<'a> FlushingGuard<'a> {
    fn new(flag: &'a mut bool) -> Self {
        *flag = true;
        Self(flag)
    }
}

impl Drop for FlushingGuard<'_> {
    fn drop(&mut self) {
        *self.0 = false;
    }
}

impl Queue {
    /// `max_concurrency` of 0 means all queued requests are sent at once.
    pub fn new(transport: Arc<dyn Transport>, max_concurrency: usize) -> Self {
        Self {
            transport,
            entries: Vec::new(),
            flushing: false,
            max_concurrency,
        }
    }

    pub fn state(&self) -> QueueState {
        if self.flushing {
            QueueState::Flushing
        } else if self.entries.is_empty() {
            QueueState::Empty
        } else {
            QueueState::Queued(self.entries.len())
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state() == QueueState::Empty
    }

    /// Queue an operation, the returned statement is bound to it.
    pub fn enqueue(&mut self, kind: OperationKind, query: &Query) -> Statement {
        let prepared = query.prepare();
        let statement = Statement::new(&prepared);
        debug!(
            "Enqueue operation, kind:{:?}, queued:{}, sql:{}",
            kind,
            self.entries.len(),
            prepared.sql
        );

        self.entries.push(QueueEntry {
            kind,
            request: HttpRequest::sql(prepared.sql),
            statement: statement.clone(),
        });

        statement
    }

    pub fn enqueue_select(&mut self, query: &Query) -> Statement {
        self.enqueue(OperationKind::Select, query)
    }

    pub fn enqueue_insert(&mut self, query: &Query) -> Statement {
        self.enqueue(OperationKind::Insert, query)
    }

    pub fn enqueue_execute(&mut self, query: &Query) -> Statement {
        self.enqueue(OperationKind::Execute, query)
    }

    /// Send every queued operation concurrently and wait for all of them.
    ///
    /// Operations fail independently, each failure is reported by its own
    /// statement. Returns the number of operations sent.
    pub async fn flush(&mut self) -> usize {
        let entries = std::mem::take(&mut self.entries);
        if entries.is_empty() {
            return 0;
        }

        let num_entries = entries.len();
        let transport = self.transport.clone();
        let max_concurrency = self.max_concurrency;
        let _flushing = FlushingGuard::new(&mut self.flushing);
        debug!(
            "Flush queue, operations:{}, max_concurrency:{}",
            num_entries, max_concurrency
        );

        let futures = entries.into_iter().map(|entry| {
            let transport = transport.clone();
            async move {
                let result = transport.execute(entry.request).await;
                if let Err(e) = &result {
                    debug!("Queued {:?} operation failed, err:{}", entry.kind, e);
                }
                entry.statement.complete(result);
            }
        });

        if max_concurrency == 0 {
            join_all(futures).await;
        } else {
            stream::iter(futures)
                .buffer_unordered(max_concurrency)
                .collect::<Vec<_>>()
                .await;
        }

        num_entries
    }

    /// Fails with [`Error::QueueNotEmpty`] if operations are still queued.
    pub fn ensure_empty(&self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(Error::QueueNotEmpty)
        }
    }

    /// Load files into `table`, one request per file.
    ///
    /// The queue must be empty. The loads don't go through the queue: they
    /// are sent concurrently and all of them have completed when this
    /// returns. Files are streamed, never read into memory as a whole.
    /// Statements are returned in the order of `files`.
    pub async fn batch_load(
        &self,
        table: &str,
        files: &[PathBuf],
        columns: &[&str],
        format: Format,
    ) -> Result<Vec<Statement>> {
        self.ensure_empty()?;

        let sql = insert_sql(table, columns, format)?;
        let query = Query::new(sql)?;
        let prepared = query.prepare();

        // Open every file first, so nothing is sent if one can't be read.
        let mut uploads = Vec::with_capacity(files.len());
        for file in files {
            let upload = open_upload(file).await?;
            uploads.push((
                Statement::new(&prepared),
                HttpRequest::upload(prepared.sql.clone(), upload),
            ));
        }
        debug!("Batch load, table:{}, files:{}", table, uploads.len());

        let futures = uploads.into_iter().map(|(statement, request)| {
            let transport = self.transport.clone();
            async move {
                statement.complete(transport.execute(request).await);
                statement
            }
        });

        Ok(join_all(futures).await)
    }
}

async fn open_upload(path: &Path) -> Result<Upload> {
    let file = File::open(path).await.map_err(|e| {
        Error::Client(format!("failed to open file:{}, err:{}", path.display(), e))
    })?;

    Upload::from_file(file).await.map_err(|e| {
        Error::Client(format!("failed to stat file:{}, err:{}", path.display(), e))
    })
}

/// `INSERT INTO <table> (<columns>) FORMAT <format>`, columns are optional.
pub(crate) fn insert_sql(table: &str, columns: &[&str], format: Format) -> Result<String> {
    if table.trim().is_empty() {
        return Err(Error::InvalidQuery("Empty table name".to_string()));
    }

    if columns.is_empty() {
        return Ok(format!("INSERT INTO {} FORMAT {}", table, format));
    }

    let columns = columns
        .iter()
        .map(|column| quote_identifier(column))
        .collect::<Vec<_>>()
        .join(", ");
    Ok(format!("INSERT INTO {} ({}) FORMAT {}", table, columns, format))
}

#[cfg(test)]
mod tests {
    use std::{io::Write, time::Duration};

    use super::*;
    use crate::transport::{MockResponse, MockTransport};

    const SELECT_SQL: &str = "SELECT * FROM summing_url_views LIMIT 1 FORMAT JSONEachRow";
    const LOAD_SQL: &str = "INSERT INTO summing_url_views (`event_time`, `site_id`) FORMAT CSV";

    fn select_query() -> Query {
        Query::new("SELECT * FROM summing_url_views LIMIT 1")
            .unwrap()
            .format(Format::JsonEachRow)
    }

    fn data_file(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn test_read_before_flush() {
        let transport = Arc::new(MockTransport::new());
        transport.respond(SELECT_SQL, MockResponse::ok("{\"site_id\":1}\n"));
        let mut queue = Queue::new(transport.clone(), 0);

        let stmt = queue.enqueue_select(&select_query());
        assert_eq!(QueueState::Queued(1), queue.state());
        assert!(matches!(stmt.rows(), Err(Error::NoResponse)));
        assert_eq!(0, transport.executed_times(SELECT_SQL));

        assert_eq!(1, queue.flush().await);
        assert_eq!(QueueState::Empty, queue.state());
        assert_eq!(1, stmt.count().unwrap());
        let first = stmt.rows().unwrap().as_ptr();
        assert_eq!(first, stmt.rows().unwrap().as_ptr());
        assert_eq!(1, transport.executed_times(SELECT_SQL));
    }

    #[tokio::test]
    async fn test_batch_load_needs_empty_queue() {
        let transport = Arc::new(MockTransport::new());
        let mut queue = Queue::new(transport.clone(), 0);
        let file = data_file("2024-01-01 00:00:00,1\n");
        let files = vec![file.path().to_path_buf()];

        let _stmt1 = queue.enqueue_select(&select_query());
        let _stmt2 = queue.enqueue_select(&select_query());
        let res = queue
            .batch_load("summing_url_views", &files, &["event_time", "site_id"], Format::Csv)
            .await;
        assert!(matches!(res, Err(Error::QueueNotEmpty)));
        assert_eq!(0, transport.executed_times(LOAD_SQL));

        queue.flush().await;
        let stmts = queue
            .batch_load("summing_url_views", &files, &["event_time", "site_id"], Format::Csv)
            .await
            .unwrap();
        assert_eq!(1, stmts.len());
        assert!(stmts[0].is_ready());
        stmts[0].check().unwrap();
        assert_eq!(22, stmts[0].info().unwrap().size_upload);
        assert_eq!(1, transport.executed_times(LOAD_SQL));
    }

    #[tokio::test]
    async fn test_batch_load_many_files() {
        let transport = Arc::new(MockTransport::new());
        let queue = Queue::new(transport.clone(), 0);
        let file1 = data_file("1\n");
        let file2 = data_file("2\n3\n");
        let files = vec![file1.path().to_path_buf(), file2.path().to_path_buf()];

        let stmts = queue.batch_load("t", &files, &[], Format::Tsv).await.unwrap();
        assert_eq!(2, stmts.len());
        assert_eq!(2, stmts[0].info().unwrap().size_upload);
        assert_eq!(4, stmts[1].info().unwrap().size_upload);
        assert_eq!(Some(Format::Tsv), stmts[1].format());
        assert_eq!(2, transport.executed_times("INSERT INTO t FORMAT TSV"));
    }

    #[tokio::test]
    async fn test_batch_load_streams_large_file() {
        let transport = Arc::new(MockTransport::new());
        let queue = Queue::new(transport.clone(), 0);
        let content = "2024-01-01 00:00:00,1\n".repeat(5_000);
        let file = data_file(&content);

        let stmts = queue
            .batch_load("t", &[file.path().to_path_buf()], &[], Format::Csv)
            .await
            .unwrap();
        assert_eq!(content.len(), stmts[0].info().unwrap().size_upload);
        assert_eq!(content.len(), transport.uploaded_bytes("INSERT INTO t FORMAT CSV"));
    }

    #[tokio::test]
    async fn test_batch_load_sends_nothing_on_unreadable_file() {
        let transport = Arc::new(MockTransport::new());
        let queue = Queue::new(transport.clone(), 0);
        let file = data_file("1\n");
        let files = vec![
            file.path().to_path_buf(),
            PathBuf::from("/nonexistent/clickhouse_batch.data"),
        ];

        let res = queue.batch_load("t", &files, &[], Format::Csv).await;
        assert!(matches!(res, Err(Error::Client(_))));
        assert_eq!(0, transport.executed_times("INSERT INTO t FORMAT CSV"));
    }

    #[tokio::test]
    async fn test_batch_load_missing_file() {
        let queue = Queue::new(Arc::new(MockTransport::new()), 0);
        let files = vec![PathBuf::from("/nonexistent/clickhouse_batch.data")];
        let res = queue.batch_load("t", &files, &[], Format::Csv).await;
        assert!(matches!(res, Err(Error::Client(_))));
    }

    #[tokio::test]
    async fn test_flush_failures_are_independent() {
        let transport = Arc::new(MockTransport::new());
        transport.respond("SELECT 1 FORMAT JSON", MockResponse::Unreachable("timeout".to_string()));
        transport.respond(
            "SELECT 2 FORMAT JSON",
            MockResponse::ok(r#"{"meta":[{"name":"2","type":"UInt8"}],"data":[{"2":2}],"rows":1}"#),
        );
        let mut queue = Queue::new(transport, 0);

        let failed = queue.enqueue_select(&Query::new("SELECT 1").unwrap().format(Format::Json));
        let ok = queue.enqueue_select(&Query::new("SELECT 2").unwrap().format(Format::Json));
        let create = Query::new("CREATE TABLE x (a UInt8) ENGINE = Memory").unwrap();
        let write = queue.enqueue_execute(&create);
        assert_eq!(3, queue.flush().await);

        assert!(matches!(failed.rows(), Err(Error::QueryFailed { .. })));
        assert_eq!(1, ok.count().unwrap());
        write.check().unwrap();
    }

    #[tokio::test]
    async fn test_flush_respects_max_concurrency() {
        let transport = Arc::new(MockTransport::new().with_delay(Duration::from_millis(20)));
        let mut queue = Queue::new(transport.clone(), 2);

        let stmts: Vec<_> = (0..6)
            .map(|i| queue.enqueue_select(&Query::new(format!("SELECT {}", i)).unwrap()))
            .collect();
        assert_eq!(6, queue.flush().await);

        assert!(stmts.iter().all(|stmt| stmt.is_ready()));
        assert_eq!(2, transport.max_in_flight());
    }

    #[tokio::test]
    async fn test_flush_is_concurrent() {
        let transport = Arc::new(MockTransport::new().with_delay(Duration::from_millis(20)));
        let mut queue = Queue::new(transport.clone(), 0);
        for i in 0..4 {
            queue.enqueue_insert(&Query::new(format!("INSERT INTO t VALUES ({})", i)).unwrap());
        }

        queue.flush().await;
        assert_eq!(4, transport.max_in_flight());
        assert_eq!(0, queue.flush().await);
    }

    #[test]
    fn test_insert_sql() {
        assert_eq!(
            "INSERT INTO db.t (`a`, `b`) FORMAT CSVWithNames",
            insert_sql("db.t", &["a", "b"], Format::CsvWithNames).unwrap()
        );
        assert_eq!(
            "INSERT INTO t FORMAT CSV",
            insert_sql("t", &[], Format::Csv).unwrap()
        );
        assert!(matches!(insert_sql(" ", &[], Format::Csv), Err(Error::InvalidQuery(_))));
    }
}
