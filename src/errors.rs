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

use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum Error {
    /// Empty or malformed query text, rejected before reaching the network.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// A batch load was requested while async operations were still queued.
    #[error("queue must be empty before a batch load, call execute_async (flush) first")]
    QueueNotEmpty,

    /// The statement was read before its request completed.
    #[error("not have response, the request has not been executed yet")]
    NoResponse,

    /// The response was decoded but carries no column metadata.
    #[error("can't find meta in the response")]
    MissingMetadata,

    /// Exception reported by the running server.
    #[error("database exception, code:{}, msg:{}", .0.code, .0.message)]
    Database(ServerError),

    /// Failure without a structured server error.
    ///
    /// `code` is the http status, or the transport error code when the
    /// request never got a response.
    #[error("query failed, code:{code}, msg:{message}")]
    QueryFailed { code: u32, message: String },

    /// Malformed body for a json based format.
    #[error("failed to decode response body, err:{0}")]
    Decode(String),

    /// The request could not be sent or its response could not be read.
    #[error("transport error:{0}")]
    Transport(String),

    /// Error from the client and basically the request has not been sent yet.
    #[error("client error:{0}")]
    Client(String),
}

/// Error parsed from the body of a failed response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerError {
    pub code: u32,
    pub message: String,
    /// The sql which caused the error.
    pub sql: String,
}

pub type Result<T> = std::result::Result<T, Error>;

fn server_error_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        // Code: 60, e.displayText() = DB::Exception: <message>, e.what() = DB::Exception
        Regex::new(concat!(
            r"(?is)Code: (\d+),\se\.displayText\(\) =\s*",
            r"DB::Exception\s*:\s*(.*),\s*e\.what.*"
        ))
        .expect("server error pattern is valid")
    })
}

/// Extract `(code, message)` from a server exception body.
pub fn parse_server_error(body: &str) -> Option<(u32, String)> {
    let captures = server_error_pattern().captures(body.trim())?;
    let code = captures.get(1)?.as_str().parse().ok()?;
    let message = captures.get(2)?.as_str().to_string();

    Some((code, message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_server_error() {
        let cases = vec![
            (
                "Code: 115, e.displayText() = DB::Exception: Unknown setting readonly[0], \
                 e.what() = DB::Exception",
                115,
                "Unknown setting readonly[0]",
            ),
            (
                "Code: 192, e.displayText() = DB::Exception: Unknown user x, \
                 e.what() = DB::Exception\n",
                192,
                "Unknown user x",
            ),
            (
                "  code: 60, E.DISPLAYTEXT() = db::exception: Table default.ZZZZZ doesn't exist., \
                 e.what() = DB::Exception",
                60,
                "Table default.ZZZZZ doesn't exist.",
            ),
        ];

        for (body, code, message) in cases {
            let (parsed_code, parsed_message) = parse_server_error(body).unwrap();
            assert_eq!(code, parsed_code);
            assert_eq!(message, parsed_message);
        }
    }

    #[test]
    fn test_parse_server_error_multiline() {
        let body = "Code: 62, e.displayText() = DB::Exception: Syntax error:\n\
                    failed at position 1, e.what() = DB::Exception";
        let (code, message) = parse_server_error(body).unwrap();
        assert_eq!(62, code);
        assert_eq!("Syntax error:\nfailed at position 1", message);
    }

    #[test]
    fn test_parse_unstructured_body() {
        assert!(parse_server_error("Bad Gateway").is_none());
        assert!(parse_server_error("").is_none());
    }
}
