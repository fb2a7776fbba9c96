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

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use hyper::{
    client::HttpConnector,
    header::{AUTHORIZATION, CONTENT_LENGTH},
    Body, Client, Method, Request, Uri,
};
use tokio::time::Instant;
use tracing::{debug, warn};
use url::form_urlencoded;

use crate::{
    config::HttpConfig,
    errors::{Error, Result},
    transport::{HttpRequest, RawResponse, RequestBody, ResponseInfo, Transport},
};

/// The implementation for [`Transport`] based on a hyper http/1 client.
///
/// Connections are pooled by hyper and shared by concurrent requests.
#[derive(Clone)]
pub struct HyperTransport {
    client: Client<HttpConnector>,
    config: HttpConfig,
    auth_header: Option<String>,
}

impl HyperTransport {
    pub fn new(config: HttpConfig) -> Result<Self> {
        if config.https {
            return Err(Error::Client(format!(
                "https is not supported by the plain http transport, endpoint:{}",
                config.endpoint
            )));
        }

        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(config.connect_timeout));
        let client = Client::builder().build(connector);

        let auth_header = config.authorization.as_ref().map(|auth| {
            let credentials = format!("{}:{}", auth.username, auth.password);
            format!("Basic {}", BASE64_STANDARD.encode(credentials))
        });

        Ok(Self {
            client,
            config,
            auth_header,
        })
    }

    fn make_uri(&self, req: &HttpRequest) -> Result<Uri> {
        let mut params = form_urlencoded::Serializer::new(String::new());
        params.append_pair("database", &self.config.database);
        for (name, value) in &self.config.settings {
            params.append_pair(name, value);
        }
        for (name, value) in &req.params {
            params.append_pair(name, value);
        }
        if let RequestBody::Data(_) = req.body {
            params.append_pair("query", &req.sql);
        }

        let raw_uri = format!("{}?{}", self.config.base_url(), params.finish());
        raw_uri
            .parse()
            .map_err(|e| Error::Client(format!("invalid uri:{}, err:{}", raw_uri, e)))
    }

    fn make_request(&self, req: HttpRequest) -> Result<Request<Body>> {
        let uri = self.make_uri(&req)?;
        let size_upload = req.upload_len();
        let body = match req.body {
            RequestBody::Sql => Body::from(req.sql),
            RequestBody::Data(upload) => Body::wrap_stream(upload.into_stream()),
        };

        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(CONTENT_LENGTH, size_upload);
        if let Some(auth) = &self.auth_header {
            builder = builder.header(AUTHORIZATION, auth.as_str());
        }

        builder
            .body(body)
            .map_err(|e| Error::Client(format!("failed to build request, err:{}", e)))
    }
}

#[async_trait]
impl Transport for HyperTransport {
    async fn execute(&self, req: HttpRequest) -> Result<RawResponse> {
        let size_upload = req.upload_len();
        let request = self.make_request(req)?;

        let begin = Instant::now();
        let exchange = async {
            let resp = self.client.request(request).await?;
            let starttransfer_time = begin.elapsed();
            let status = resp.status().as_u16();
            let body = hyper::body::to_bytes(resp.into_body()).await?;
            Ok::<_, hyper::Error>((status, starttransfer_time, body))
        };

        let timeout = self.config.query_timeout;
        let (status, starttransfer_time, body) = tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| {
                warn!(
                    "Request timeout, endpoint:{}, timeout:{:?}",
                    self.config.endpoint, timeout
                );
                Error::Transport(format!("request timeout after {:?}", timeout))
            })?
            .map_err(|e| Error::Transport(e.to_string()))?;

        let info = ResponseInfo {
            total_time: begin.elapsed(),
            starttransfer_time,
            size_upload,
            size_download: body.len(),
        };
        debug!("Request finished, status:{}, info:{:?}", status, info);

        Ok(RawResponse { status, body, info })
    }
}
