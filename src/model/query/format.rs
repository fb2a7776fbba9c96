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

//! Wire formats understood by the client.

use std::{fmt::Display, str::FromStr};

use crate::errors::Error;

/// Output format of a query, as named in the `FORMAT <Name>` clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    TabSeparatedWithNamesAndTypes,
    TabSeparatedWithNames,
    TabSeparatedRaw,
    TabSeparated,
    TsvWithNamesAndTypes,
    TsvWithNames,
    TsvRaw,
    Tsv,
    Tskv,
    JsonCompact,
    JsonEachRow,
    BlockTabSeparated,
    CsvWithNames,
    Csv,
    Json,
    Vertical,
}

/// How the body of a response in some format is turned into rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Layout {
    /// First line holds the column names, the second one the types if
    /// `with_types`, the rest are delimited rows.
    NamesHeader { delimiter: char, with_types: bool },
    /// One json object per line.
    EachRow,
    /// Delimited lines without any header, kept undecoded.
    Lines,
    /// A single json document with `meta`, `data` and friends.
    Envelope,
    /// No row parser.
    Opaque,
}

impl Format {
    /// All supported formats in declaration order.
    pub const ALL: [Format; 16] = [
        Format::TabSeparatedWithNamesAndTypes,
        Format::TabSeparatedWithNames,
        Format::TabSeparatedRaw,
        Format::TabSeparated,
        Format::TsvWithNamesAndTypes,
        Format::TsvWithNames,
        Format::TsvRaw,
        Format::Tsv,
        Format::Tskv,
        Format::JsonCompact,
        Format::JsonEachRow,
        Format::BlockTabSeparated,
        Format::CsvWithNames,
        Format::Csv,
        Format::Json,
        Format::Vertical,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Format::TabSeparatedWithNamesAndTypes => "TabSeparatedWithNamesAndTypes",
            Format::TabSeparatedWithNames => "TabSeparatedWithNames",
            Format::TabSeparatedRaw => "TabSeparatedRaw",
            Format::TabSeparated => "TabSeparated",
            Format::TsvWithNamesAndTypes => "TSVWithNamesAndTypes",
            Format::TsvWithNames => "TSVWithNames",
            Format::TsvRaw => "TSVRaw",
            Format::Tsv => "TSV",
            Format::Tskv => "TSKV",
            Format::JsonCompact => "JSONCompact",
            Format::JsonEachRow => "JSONEachRow",
            Format::BlockTabSeparated => "BlockTabSeparated",
            Format::CsvWithNames => "CSVWithNames",
            Format::Csv => "CSV",
            Format::Json => "JSON",
            Format::Vertical => "Vertical",
        }
    }

    /// Formats ordered by descending name length.
    ///
    /// A name must be tried before any shorter name it starts with, otherwise
    /// `TSV` would win over `TSVWithNames`.
    pub fn longest_first() -> [Format; 16] {
        let mut formats = Self::ALL;
        // Stable, so equally long names keep declaration order.
        formats.sort_by(|a, b| b.name().len().cmp(&a.name().len()));
        formats
    }

    /// Find the format a `FORMAT <Name>` clause in the sql declares.
    ///
    /// The leftmost clause wins, and the name only needs to be a
    /// case-insensitive prefix of the word following `FORMAT`.
    pub fn declared_in(sql: &str) -> Option<Format> {
        let candidates = Self::longest_first();
        let bytes = sql.as_bytes();

        let mut pos = 0;
        while let Some(offset) = find_keyword(&sql[pos..]) {
            let keyword_end = pos + offset + FORMAT_KEYWORD.len();
            let name_start = keyword_end
                + bytes[keyword_end..]
                    .iter()
                    .take_while(|b| b.is_ascii_whitespace())
                    .count();

            // `FORMAT` must be followed by whitespace.
            if name_start > keyword_end {
                let rest = &sql[name_start..];
                let found = candidates.iter().find(|format| {
                    rest.get(..format.name().len())
                        .map(|prefix| prefix.eq_ignore_ascii_case(format.name()))
                        .unwrap_or(false)
                });
                if let Some(format) = found {
                    return Some(*format);
                }
            }

            pos = keyword_end;
        }

        None
    }

    pub(crate) fn layout(&self) -> Layout {
        match self {
            Format::TabSeparatedWithNamesAndTypes | Format::TsvWithNamesAndTypes => {
                Layout::NamesHeader {
                    delimiter: '\t',
                    with_types: true,
                }
            }
            Format::TabSeparatedWithNames | Format::TsvWithNames => Layout::NamesHeader {
                delimiter: '\t',
                with_types: false,
            },
            Format::CsvWithNames => Layout::NamesHeader {
                delimiter: ',',
                with_types: false,
            },
            Format::JsonEachRow => Layout::EachRow,
            Format::Csv | Format::Tsv | Format::TabSeparated => Layout::Lines,
            Format::Json | Format::JsonCompact => Layout::Envelope,
            Format::TabSeparatedRaw
            | Format::TsvRaw
            | Format::Tskv
            | Format::BlockTabSeparated
            | Format::Vertical => Layout::Opaque,
        }
    }
}

const FORMAT_KEYWORD: &str = "FORMAT";

fn find_keyword(s: &str) -> Option<usize> {
    s.as_bytes()
        .windows(FORMAT_KEYWORD.len())
        .position(|window| window.eq_ignore_ascii_case(FORMAT_KEYWORD.as_bytes()))
}

impl Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Format {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|format| format.name().eq_ignore_ascii_case(s.trim()))
            .copied()
            .ok_or_else(|| Error::Client(format!("unsupported format:{}", s)))
    }
}
