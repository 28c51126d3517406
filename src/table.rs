//! Caller-supplied table names.
//!
//! Table names arrive in request payloads and end up inside SQL text, so they
//! are parsed into dotted identifier segments and always emitted quoted.

use std::fmt;

use thiserror::Error;

const MAX_SEGMENTS: usize = 3;
const MAX_SEGMENT_LEN: usize = 128;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TableNameError {
    #[error("table name is empty")]
    Empty,
    #[error("invalid segment {segment:?} in table name {name:?}")]
    InvalidSegment { name: String, segment: String },
    #[error("table name {0:?} has more than three parts")]
    TooManyParts(String),
    #[error("table {0:?} is not in the allowed table list")]
    NotAllowed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableName {
    raw: String,
    segments: Vec<String>,
}

impl TableName {
    pub fn parse(raw: &str) -> Result<Self, TableNameError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(TableNameError::Empty);
        }

        let segments: Vec<String> = raw.split('.').map(ToOwned::to_owned).collect();
        if segments.len() > MAX_SEGMENTS {
            return Err(TableNameError::TooManyParts(raw.to_string()));
        }
        for segment in &segments {
            if !is_identifier(segment) {
                return Err(TableNameError::InvalidSegment {
                    name: raw.to_string(),
                    segment: segment.clone(),
                });
            }
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    /// Parses `raw` and, when `allowed` is non-empty, requires a
    /// case-insensitive match against one of its entries.
    pub fn parse_allowed(raw: &str, allowed: &[String]) -> Result<Self, TableNameError> {
        let name = Self::parse(raw)?;
        if !allowed.is_empty() && !allowed.iter().any(|a| a.eq_ignore_ascii_case(&name.raw)) {
            return Err(TableNameError::NotAllowed(name.raw));
        }
        Ok(name)
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// SQL form with every segment double-quoted.
    pub fn quoted(&self) -> String {
        self.segments
            .iter()
            .map(|s| quote_ident(s))
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn is_identifier(segment: &str) -> bool {
    let mut chars = segment.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    segment.len() <= MAX_SEGMENT_LEN
        && (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
