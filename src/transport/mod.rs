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

mod hyper_transport;
mod mock_transport;

use std::{fmt, io, pin::Pin, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use futures::{future, stream, Stream};
pub use hyper_transport::HyperTransport;
pub use mock_transport::{MockResponse, MockTransport};
use tokio::fs::File;
use tokio_util::io::ReaderStream;

use crate::errors::Result;

pub type UploadStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send + Sync>>;

/// Data uploaded as a request body, read chunk by chunk while it is sent.
pub struct Upload {
    stream: UploadStream,
    len: u64,
}

impl Upload {
    /// `len` must be the total number of bytes the stream yields.
    pub fn new<S>(stream: S, len: u64) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + Sync + 'static,
    {
        Self {
            stream: Box::pin(stream),
            len,
        }
    }

    pub fn from_bytes(data: Bytes) -> Self {
        let len = data.len() as u64;
        Self::new(stream::once(future::ready(Ok(data))), len)
    }

    /// Stream an opened file, its length is taken from the metadata.
    pub async fn from_file(file: File) -> io::Result<Self> {
        let len = file.metadata().await?.len();
        Ok(Self::new(ReaderStream::new(file), len))
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn into_stream(self) -> UploadStream {
        self.stream
    }
}

impl fmt::Debug for Upload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Upload").field("len", &self.len).finish()
    }
}

/// What is sent along with the sql.
#[derive(Debug)]
pub enum RequestBody {
    /// The sql itself is the body.
    Sql,
    /// The sql goes into the `query` url parameter and the data is the body.
    Data(Upload),
}

/// A request against the http interface.
#[derive(Debug)]
pub struct HttpRequest {
    pub sql: String,
    pub body: RequestBody,
    /// Extra url parameters for this request only.
    pub params: Vec<(String, String)>,
}

impl HttpRequest {
    pub fn sql(sql: String) -> Self {
        Self {
            sql,
            body: RequestBody::Sql,
            params: Vec::new(),
        }
    }

    pub fn upload(sql: String, data: Upload) -> Self {
        Self {
            sql,
            body: RequestBody::Data(data),
            params: Vec::new(),
        }
    }

    #[must_use]
    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    pub fn upload_len(&self) -> usize {
        match &self.body {
            RequestBody::Sql => self.sql.len(),
            RequestBody::Data(data) => data.len() as usize,
        }
    }
}

/// Timing and size metrics of one request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResponseInfo {
    pub total_time: Duration,
    /// Time until the response headers arrived.
    pub starttransfer_time: Duration,
    pub size_upload: usize,
    pub size_download: usize,
}

impl ResponseInfo {
    /// Average upload speed in bytes per second.
    pub fn speed_upload(&self) -> f64 {
        bytes_per_sec(self.size_upload, self.total_time)
    }

    /// Average download speed in bytes per second.
    pub fn speed_download(&self) -> f64 {
        bytes_per_sec(self.size_download, self.total_time)
    }
}

fn bytes_per_sec(size: usize, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs == 0.0 {
        0.0
    } else {
        size as f64 / secs
    }
}

/// Raw response of the http interface.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: Bytes,
    pub info: ResponseInfo,
}

/// The network layer the client issues its requests through.
///
/// An `Err` means no response was received at all; a response with a
/// failing status is still `Ok`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, req: HttpRequest) -> Result<RawResponse>;
}

#[cfg(test)]
mod tests {
    use futures::{StreamExt, TryStreamExt};
    use tokio::io::AsyncWriteExt;

    use super::*;

    #[test]
    fn test_response_speed() {
        let info = ResponseInfo {
            total_time: Duration::from_millis(500),
            starttransfer_time: Duration::from_millis(100),
            size_upload: 100,
            size_download: 2048,
        };
        assert_eq!(200.0, info.speed_upload());
        assert_eq!(4096.0, info.speed_download());
        assert_eq!(0.0, ResponseInfo::default().speed_download());
    }

    #[tokio::test]
    async fn test_upload_from_file() {
        let data = "1,2\n".repeat(10_000);
        let path = tempfile::NamedTempFile::new().unwrap().into_temp_path();
        let mut file = File::create(&path).await.unwrap();
        file.write_all(data.as_bytes()).await.unwrap();
        file.flush().await.unwrap();

        let upload = Upload::from_file(File::open(&path).await.unwrap()).await.unwrap();
        assert_eq!(data.len() as u64, upload.len());

        let chunks: Vec<Bytes> = upload.into_stream().try_collect().await.unwrap();
        assert!(chunks.len() > 1);
        assert_eq!(data.as_bytes(), &chunks.concat()[..]);
    }

    #[tokio::test]
    async fn test_upload_from_bytes() {
        let upload = Upload::from_bytes(Bytes::from_static(b"abc"));
        assert_eq!(3, upload.len());
        let chunks: Vec<_> = upload.into_stream().collect().await;
        assert_eq!(1, chunks.len());
    }
}
