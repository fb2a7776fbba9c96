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

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use futures::StreamExt;

use crate::{
    errors::{Error, Result},
    transport::{HttpRequest, RawResponse, RequestBody, ResponseInfo, Transport},
};

/// Canned outcome of a request.
#[derive(Debug, Clone)]
pub enum MockResponse {
    Reply { status: u16, body: String },
    /// No response is received.
    Unreachable(String),
}

impl MockResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        MockResponse::Reply {
            status: 200,
            body: body.into(),
        }
    }

    pub fn status(status: u16, body: impl Into<String>) -> Self {
        MockResponse::Reply {
            status,
            body: body.into(),
        }
    }
}

/// Transport used for testing.
///
/// Responses are looked up by the final sql; unknown sql gets an empty
/// `200` reply.
#[derive(Default)]
pub struct MockTransport {
    pub responses: Arc<DashMap<String, MockResponse>>,
    /// How many times each sql was executed.
    pub executed: Arc<DashMap<String, usize>>,
    /// Bytes of uploaded data received for each sql.
    pub uploaded: Arc<DashMap<String, usize>>,
    /// Latency of every request.
    pub delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn respond(&self, sql: impl Into<String>, response: MockResponse) {
        self.responses.insert(sql.into(), response);
    }

    pub fn executed_times(&self, sql: &str) -> usize {
        self.executed.get(sql).map(|count| *count.value()).unwrap_or(0)
    }

    pub fn uploaded_bytes(&self, sql: &str) -> usize {
        self.uploaded.get(sql).map(|size| *size.value()).unwrap_or(0)
    }

    /// The max number of requests seen in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute(&self, req: HttpRequest) -> Result<RawResponse> {
        let HttpRequest { sql, body, .. } = req;
        let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);
        *self.executed.entry(sql.clone()).or_insert(0) += 1;

        let size_upload = match body {
            RequestBody::Sql => sql.len(),
            RequestBody::Data(upload) => {
                let mut stream = upload.into_stream();
                let mut size = 0;
                while let Some(chunk) = stream.next().await {
                    let chunk = chunk.map_err(|e| {
                        self.in_flight.fetch_sub(1, Ordering::SeqCst);
                        Error::Transport(format!("failed to read upload, err:{}", e))
                    })?;
                    size += chunk.len();
                }
                *self.uploaded.entry(sql.clone()).or_insert(0) += size;
                size
            }
        };

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let response = self
            .responses
            .get(&sql)
            .map(|resp| resp.value().clone())
            .unwrap_or_else(|| MockResponse::ok(""));

        match response {
            MockResponse::Reply { status, body } => Ok(RawResponse {
                status,
                info: ResponseInfo {
                    total_time: self.delay.unwrap_or_default(),
                    starttransfer_time: self.delay.unwrap_or_default(),
                    size_upload,
                    size_download: body.len(),
                },
                body: Bytes::from(body),
            }),
            MockResponse::Unreachable(msg) => Err(Error::Transport(msg)),
        }
    }
}
