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

//! Client for the http interface of ClickHouse, with lazily decoded
//! statements and a queue of concurrent async operations.

pub mod config;
pub mod db_client;
pub mod errors;
pub mod model;
pub mod transport;
mod util;

pub use crate::{
    config::{Authorization, Endpoint, HttpConfig},
    db_client::{Builder, Client, OperationKind, Queue, QueueState},
    errors::{Error, Result, ServerError},
    model::{
        query::{Bindings, Format, IntoQuery, Query, Transform},
        statement::{display::CsvFormatter, Column, Row, Statement},
    },
    transport::{HyperTransport, MockResponse, MockTransport, Transport, Upload},
};
