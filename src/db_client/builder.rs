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

use std::{sync::Arc, time::Duration};

use crate::{
    config::{Authorization, Endpoint, HttpConfig},
    db_client::Client,
    errors::Result,
    model::query::Format,
    transport::HyperTransport,
};

/// Client builder, has set the default value of configs.
///
/// The only required argument is the endpoint of the http interface, and
/// it should be given in [`new`].
///
/// [`new`]: Builder::new
pub struct Builder {
    endpoint: String,
    http_config: HttpConfig,
    default_format: Format,
}

impl Builder {
    /// `endpoint` is like `127.0.0.1:8123`, the port defaults to 8123.
    pub fn new(endpoint: String) -> Self {
        Self {
            endpoint,
            http_config: HttpConfig::default(),
            default_format: Format::Json,
        }
    }

    #[inline]
    pub fn http_config(mut self, http_config: HttpConfig) -> Self {
        self.http_config = http_config;
        self
    }

    #[inline]
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.http_config.database = database.into();
        self
    }

    #[inline]
    pub fn authorization(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.http_config.authorization = Some(Authorization {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    #[inline]
    pub fn setting(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.http_config = self.http_config.setting(name, value);
        self
    }

    #[inline]
    pub fn query_timeout(mut self, timeout: Duration) -> Self {
        self.http_config.query_timeout = timeout;
        self
    }

    #[inline]
    pub fn max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.http_config.max_concurrency = max_concurrency;
        self
    }

    #[inline]
    pub fn default_format(mut self, format: Format) -> Self {
        self.default_format = format;
        self
    }

    pub fn build(self) -> Result<Client> {
        let mut http_config = self.http_config;
        http_config.endpoint = self.endpoint.parse::<Endpoint>()?;
        let max_concurrency = http_config.max_concurrency;
        let transport = HyperTransport::new(http_config)?;

        Ok(Client::new(Arc::new(transport), max_concurrency).default_format(self.default_format))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Error;

    #[tokio::test]
    async fn test_build() {
        let client = Builder::new("127.0.0.1:8123".to_string())
            .database("metrics")
            .authorization("default", "secret")
            .setting("max_execution_time", "10")
            .max_concurrency(4)
            .build()
            .unwrap();
        assert!(client.queue().is_empty());

        let err = Builder::new("nowhere:port".to_string()).build();
        assert!(matches!(err, Err(Error::Client(_))));

        let mut config = HttpConfig::default();
        config.https = true;
        let err = Builder::new("127.0.0.1:8443".to_string())
            .http_config(config)
            .build();
        assert!(matches!(err, Err(Error::Client(_))));
    }
}
