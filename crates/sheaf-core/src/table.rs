//! Decoding and parsing of downloaded CSV payloads.

use csv::{ReaderBuilder, StringRecord};

use crate::error::AppError;
use crate::headers;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Decodes raw bytes into text.
///
/// UTF-8 is tried first (with a leading BOM stripped). Anything else is read
/// as Latin-1, which maps every byte to a char and therefore never fails.
pub fn decode_text(raw: &[u8]) -> String {
    let body = raw.strip_prefix(UTF8_BOM).unwrap_or(raw);
    match std::str::from_utf8(body) {
        Ok(text) => text.to_string(),
        Err(_) => body.iter().map(|&b| b as char).collect(),
    }
}

/// A parsed CSV payload: the original header row plus data records.
#[derive(Debug, Clone)]
pub struct CsvPayload {
    pub raw_headers: Vec<String>,
    pub rows: Vec<StringRecord>,
}

impl CsvPayload {
    /// Decodes and parses a downloaded payload.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Parse` if the payload is empty, has no header row,
    /// or contains a record whose field count differs from the header.
    pub fn parse(raw: &[u8]) -> Result<Self, AppError> {
        let text = decode_text(raw);
        if text.trim().is_empty() {
            return Err(AppError::Parse("empty payload".to_string()));
        }

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .from_reader(text.as_bytes());

        let raw_headers: Vec<String> = reader
            .headers()
            .map_err(|e| AppError::Parse(format!("unreadable header row: {e}")))?
            .iter()
            .map(str::to_string)
            .collect();

        let mut rows = Vec::new();
        for (i, record) in reader.records().enumerate() {
            let record = record.map_err(|e| AppError::Parse(format!("record {}: {e}", i + 1)))?;
            rows.push(record);
        }

        Ok(Self { raw_headers, rows })
    }

    /// Header row in normalized, de-duplicated form.
    pub fn normalized_headers(&self) -> Vec<String> {
        headers::normalize_all(&self.raw_headers)
    }
}
