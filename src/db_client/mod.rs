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

//! Client session over the http interface

mod builder;
mod queue;

use std::{path::PathBuf, sync::Arc};

pub use builder::Builder;
pub use queue::{OperationKind, Queue, QueueState};
use serde_json::Value;
use tracing::debug;

use crate::{
    errors::{Error, Result},
    model::{
        query::{Format, IntoQuery, Query},
        statement::Statement,
    },
    transport::{HttpRequest, Transport},
    util::{quote_identifier, quote_value},
};

/// Client session.
///
/// It owns the [`Queue`] of async operations, so queueing and flushing need
/// exclusive access; share a client between tasks behind a lock.
pub struct Client {
    transport: Arc<dyn Transport>,
    queue: Queue,
    default_format: Format,
}

impl Client {
    pub fn new(transport: Arc<dyn Transport>, max_concurrency: usize) -> Self {
        Self {
            queue: Queue::new(transport.clone(), max_concurrency),
            transport,
            default_format: Format::Json,
        }
    }

    /// Format used by selects which neither request nor declare one.
    ///
    /// Default is `JSON`.
    #[must_use]
    pub fn default_format(mut self, format: Format) -> Self {
        self.default_format = format;
        self
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    async fn dispatch(&self, query: &Query) -> Statement {
        let prepared = query.prepare();
        let statement = Statement::new(&prepared);
        debug!("Dispatch query, sql:{}", prepared.sql);

        let result = self.transport.execute(HttpRequest::sql(prepared.sql)).await;
        statement.complete(result);
        statement
    }

    fn select_query(&self, query: impl IntoQuery) -> Result<Query> {
        Ok(query.into_query()?.with_default_format(self.default_format))
    }

    /// Run a select and wait for it.
    ///
    /// Failures of the query itself surface from the statement accessors.
    pub async fn select(&self, query: impl IntoQuery) -> Result<Statement> {
        let query = self.select_query(query)?;
        Ok(self.dispatch(&query).await)
    }

    /// Run a statement which returns no rows, failing if it failed.
    pub async fn write(&self, query: impl IntoQuery) -> Result<Statement> {
        let query = query.into_query()?;
        let statement = self.dispatch(&query).await;
        statement.check()?;
        Ok(statement)
    }

    /// Insert rows of values, in the order of `columns`.
    pub async fn insert(
        &self,
        table: &str,
        rows: &[Vec<Value>],
        columns: &[&str],
    ) -> Result<Statement> {
        let query = Query::new(insert_values_sql(table, rows, columns)?)?;
        let statement = self.dispatch(&query).await;
        statement.check()?;
        Ok(statement)
    }

    /// Check the server answers.
    pub async fn ping(&self) -> Result<bool> {
        let statement = self
            .select(Query::new("SELECT 1 as ping")?.format(Format::JsonEachRow))
            .await?;
        let pong = statement.fetch_one_column("ping")?;
        Ok(pong == Some(&Value::from(1)))
    }

    /// Queue a select, the statement becomes readable after
    /// [`execute_async`](Client::execute_async).
    pub fn select_async(&mut self, query: impl IntoQuery) -> Result<Statement> {
        let query = self.select_query(query)?;
        Ok(self.queue.enqueue_select(&query))
    }

    pub fn insert_async(
        &mut self,
        table: &str,
        rows: &[Vec<Value>],
        columns: &[&str],
    ) -> Result<Statement> {
        let query = Query::new(insert_values_sql(table, rows, columns)?)?;
        Ok(self.queue.enqueue_insert(&query))
    }

    pub fn write_async(&mut self, query: impl IntoQuery) -> Result<Statement> {
        let query = query.into_query()?;
        Ok(self.queue.enqueue_execute(&query))
    }

    /// Flush the queue: send all queued operations concurrently and wait
    /// for them.
    pub async fn execute_async(&mut self) -> usize {
        self.queue.flush().await
    }

    /// Load csv files into `table`, see [`Queue::batch_load`].
    pub async fn insert_batch_files(
        &self,
        table: &str,
        files: &[PathBuf],
        columns: &[&str],
    ) -> Result<Vec<Statement>> {
        self.insert_batch_files_with_format(table, files, columns, Format::Csv)
            .await
    }

    pub async fn insert_batch_files_with_format(
        &self,
        table: &str,
        files: &[PathBuf],
        columns: &[&str],
        format: Format,
    ) -> Result<Vec<Statement>> {
        self.queue.batch_load(table, files, columns, format).await
    }
}

fn insert_values_sql(table: &str, rows: &[Vec<Value>], columns: &[&str]) -> Result<String> {
    if table.trim().is_empty() {
        return Err(Error::InvalidQuery("Empty table name".to_string()));
    }
    if rows.is_empty() {
        return Err(Error::InvalidQuery("Nothing to insert".to_string()));
    }

    let values = rows
        .iter()
        .map(|row| {
            if !columns.is_empty() && row.len() != columns.len() {
                return Err(Error::InvalidQuery(format!(
                    "row has {} values but {} columns are given",
                    row.len(),
                    columns.len()
                )));
            }
            let row = row.iter().map(quote_value).collect::<Vec<_>>().join(", ");
            Ok(format!("({})", row))
        })
        .collect::<Result<Vec<_>>>()?
        .join(", ");

    if columns.is_empty() {
        return Ok(format!("INSERT INTO {} VALUES {}", table, values));
    }

    let columns = columns
        .iter()
        .map(|column| quote_identifier(column))
        .collect::<Vec<_>>()
        .join(", ");
    Ok(format!("INSERT INTO {} ({}) VALUES {}", table, columns, values))
}
