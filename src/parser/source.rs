//! Header + rows from delimited UTF-8 text

use serde::Deserialize;
use std::io::{BufRead, BufReader, Read};

use crate::error::{Error, Result};

/// Field separator of a delimited source
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Delimiter {
    /// Sniff from the first line
    #[default]
    Auto,
    Comma,
    Tab,
    Semicolon,
    Pipe,
}

impl Delimiter {
    fn byte(self) -> Option<u8> {
        match self {
            Delimiter::Auto => None,
            Delimiter::Comma => Some(b','),
            Delimiter::Tab => Some(b'\t'),
            Delimiter::Semicolon => Some(b';'),
            Delimiter::Pipe => Some(b'|'),
        }
    }

    /// Pick a separator from the first line: tab, then semicolon, then pipe,
    /// otherwise comma.
    pub fn sniff(first_line: &[u8]) -> u8 {
        let line = match first_line.iter().position(|&b| b == b'\n') {
            Some(end) => &first_line[..end],
            None => first_line,
        };
        [b'\t', b';', b'|']
            .into_iter()
            .find(|sep| line.contains(sep))
            .unwrap_or(b',')
    }
}

/// How to read a delimited source
#[derive(Debug, Clone, Default)]
pub struct SourceFormat {
    pub delimiter: Delimiter,
    /// Column names for sources without a header line
    pub header: Option<Vec<String>>,
}

impl SourceFormat {
    pub fn with_delimiter(delimiter: Delimiter) -> Self {
        Self {
            delimiter,
            header: None,
        }
    }
}

/// One data row as raw text fields
#[derive(Debug, Clone)]
pub struct RawRow {
    /// 1-based line number in the source
    pub line: u64,
    pub fields: csv::StringRecord,
}

/// Streaming reader over a delimited source.
///
/// Yields `MalformedRow` for rows that cannot be decoded and
/// `SourceUnavailable` when the underlying reader fails.
pub struct DelimitedSource<R: Read> {
    name: String,
    reader: csv::Reader<BufReader<R>>,
    header: Vec<String>,
    record: csv::StringRecord,
    failed: bool,
}

impl<R: Read> DelimitedSource<R> {
    pub fn new(name: impl Into<String>, input: R, format: &SourceFormat) -> Result<Self> {
        let name = name.into();
        let mut input = BufReader::new(input);

        let delimiter = match format.delimiter.byte() {
            Some(byte) => byte,
            None => {
                let peeked = input.fill_buf().map_err(|e| Error::SourceUnavailable {
                    source_name: name.clone(),
                    reason: e.to_string(),
                })?;
                Delimiter::sniff(peeked)
            }
        };

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(format.header.is_none())
            .flexible(true) // Column counts are checked against the header by the caller
            .from_reader(input);

        let header: Vec<String> = match &format.header {
            Some(explicit) => explicit.iter().map(|h| h.trim().to_string()).collect(),
            None => reader
                .headers()
                .map_err(|e| Error::SourceUnavailable {
                    source_name: name.clone(),
                    reason: format!("failed to read header: {}", e),
                })?
                .iter()
                .map(|h| h.trim().to_string())
                .collect(),
        };

        if header.iter().all(|h| h.is_empty()) {
            return Err(Error::SourceUnavailable {
                source_name: name,
                reason: "missing header row".to_string(),
            });
        }

        Ok(Self {
            name,
            reader,
            header,
            record: csv::StringRecord::new(),
            failed: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Trimmed column names, in source order
    pub fn header(&self) -> &[String] {
        &self.header
    }
}

impl<R: Read> Iterator for DelimitedSource<R> {
    type Item = Result<RawRow>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        loop {
            match self.reader.read_record(&mut self.record) {
                // Whitespace-only lines
                Ok(true) if self.record.iter().all(|f| f.trim().is_empty()) => continue,
                Ok(true) => {
                    return Some(Ok(RawRow {
                        line: self.record.position().map(|p| p.line()).unwrap_or_default(),
                        fields: self.record.clone(),
                    }))
                }
                Ok(false) => return None,
                Err(err) => {
                    let line = err.position().map(|p| p.line()).unwrap_or_default();
                    return match err.into_kind() {
                        csv::ErrorKind::Io(io) => {
                            self.failed = true;
                            Some(Err(Error::SourceUnavailable {
                                source_name: self.name.clone(),
                                reason: io.to_string(),
                            }))
                        }
                        kind => Some(Err(Error::MalformedRow {
                            line,
                            reason: format!("{:?}", kind),
                        })),
                    };
                }
            }
        }
    }
}
