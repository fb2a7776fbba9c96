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

use std::{collections::BTreeMap, fmt, str::FromStr, time::Duration};

use crate::errors::Error;

/// Port of the http interface when the endpoint doesn't name one.
pub const DEFAULT_HTTP_PORT: u16 = 8123;

/// Address of the http interface.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Parses `host` or `host:port`, bracketed ipv6 hosts need a port.
impl FromStr for Endpoint {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        let (host, port) = match s.rsplit_once(':') {
            Some((host, raw_port)) if !host.is_empty() && !raw_port.contains(']') => {
                let port = raw_port.parse::<u16>().map_err(|e| {
                    Error::Client(format!("invalid port in endpoint:{}, err:{}", s, e))
                })?;
                (host, port)
            }
            Some(_) => return Err(Error::Client(format!("invalid endpoint:{}", s))),
            None => (s, DEFAULT_HTTP_PORT),
        };

        if host.is_empty() || host.contains(char::is_whitespace) {
            return Err(Error::Client(format!("invalid host in endpoint:{}", s)));
        }

        Ok(Endpoint::new(host, port))
    }
}

/// Config for the underlying http client
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Address of the server's http interface.
    ///
    /// Default value is `127.0.0.1:8123`.
    pub endpoint: Endpoint,
    /// Use https instead of http.
    ///
    /// Https needs a tls-capable connector and is rejected by
    /// [`HyperTransport`](crate::transport::HyperTransport), which only
    /// speaks plain http.
    pub https: bool,
    /// The database used when the sql doesn't qualify table names.
    ///
    /// Default value is `default`.
    pub database: String,
    /// Credentials passed through to the server.
    pub authorization: Option<Authorization>,
    /// Timeout for connection.
    ///
    /// Default value is 3s.
    pub connect_timeout: Duration,
    /// Timeout for a whole request, including reading the body.
    ///
    /// Default value is 60s.
    pub query_timeout: Duration,
    /// The max number of requests in flight while flushing the queue.
    ///
    /// 0 means unlimited, and it is the default value.
    pub max_concurrency: usize,
    /// Server settings sent as url parameters with every request.
    pub settings: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct Authorization {
    pub username: String,
    pub password: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::new("127.0.0.1", DEFAULT_HTTP_PORT),
            https: false,
            database: "default".to_string(),
            authorization: None,
            connect_timeout: Duration::from_secs(3),
            query_timeout: Duration::from_secs(60),
            max_concurrency: 0,
            settings: BTreeMap::new(),
        }
    }
}

impl HttpConfig {
    pub fn setting(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings.insert(name.into(), value.into());
        self
    }

    /// Base url of the http interface, e.g. `http://127.0.0.1:8123/`.
    pub fn base_url(&self) -> String {
        let scheme = if self.https { "https" } else { "http" };
        format!("{}://{}/", scheme, self.endpoint)
    }
}
