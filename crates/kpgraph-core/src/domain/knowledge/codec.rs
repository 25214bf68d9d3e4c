//! Edge-list codec
//!
//! Maps an ordered list of knowledge point ids to the text stored in an edge
//! column and back. Writes are always a JSON array. Reads never fail: a cell
//! that cannot be understood is treated as "no edges" and logged.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Accepted on-disk representations when decoding
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeListFormat {
    /// JSON arrays only
    #[default]
    Json,
    /// JSON arrays, plus comma-separated ids written by older imports
    JsonWithLegacyCsv,
}

/// Why a cell could not be decoded
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("edge list is not a JSON array of ids: {0}")]
    InvalidJson(String),

    #[error("edge list token {0:?} is not an id")]
    InvalidToken(String),
}

/// Encoder/decoder for edge-list cells
#[derive(Debug, Clone, Copy, Default)]
pub struct EdgeListCodec {
    format: EdgeListFormat,
}

impl EdgeListCodec {
    pub fn new(format: EdgeListFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> EdgeListFormat {
        self.format
    }

    /// Encode ids as a JSON array. The empty list is `"[]"`, never NULL.
    pub fn encode(&self, ids: &[i64]) -> String {
        let body = ids
            .iter()
            .map(i64::to_string)
            .collect::<Vec<_>>()
            .join(",");
        format!("[{}]", body)
    }

    /// Decode a stored cell, reporting why it could not be read
    pub fn try_decode(&self, raw: Option<&str>) -> Result<Vec<i64>, CodecError> {
        let text = match raw.map(str::trim) {
            None | Some("") | Some("null") => return Ok(Vec::new()),
            Some(text) => text,
        };

        if text.starts_with('[') {
            return serde_json::from_str::<Vec<i64>>(text)
                .map_err(|e| CodecError::InvalidJson(e.to_string()));
        }

        match self.format {
            EdgeListFormat::Json => Err(CodecError::InvalidJson(format!(
                "expected '[' at start of {:?}",
                truncate(text)
            ))),
            EdgeListFormat::JsonWithLegacyCsv => decode_csv(text),
        }
    }

    /// Decode a stored cell; anything unreadable becomes an empty list
    pub fn decode(&self, raw: Option<&str>) -> Vec<i64> {
        match self.try_decode(raw) {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, "Unreadable edge list treated as empty");
                debug!(raw = ?raw.map(truncate), "Unreadable edge list content");
                Vec::new()
            }
        }
    }
}

fn decode_csv(text: &str) -> Result<Vec<i64>, CodecError> {
    text.split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(|token| {
            token
                .parse::<i64>()
                .map_err(|_| CodecError::InvalidToken(token.to_string()))
        })
        .collect()
}

fn truncate(text: &str) -> &str {
    match text.char_indices().nth(64) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
