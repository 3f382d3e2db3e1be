use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MapperError {
    #[error("Configuration error at '{key}': {details}")]
    ConfigError { key: String, details: String },

    #[error("Could not find the {role} column for format '{format}'. Headers seen: {headers:?}")]
    ColumnNotFound {
        format: String,
        role: &'static str,
        headers: Vec<String>,
    },

    #[error("Invalid amount '{value}': {reason}")]
    ValueParseError { value: String, reason: String },

    #[error("Unsupported text encoding: {0}")]
    UnsupportedEncoding(String),

    #[error("Failed to decode {path} as {encoding}: the file contains malformed byte sequences")]
    DecodeError { path: PathBuf, encoding: String },

    #[error("Output contains characters that cannot be represented in {encoding}")]
    EncodeError { encoding: String },

    #[error("Header row {header_row} is beyond the end of {path} ({line_count} lines)")]
    HeaderRowOutOfRange {
        path: PathBuf,
        header_row: usize,
        line_count: usize,
    },

    #[error("File error on {path}: {source}")]
    FileError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl MapperError {
    pub fn config(key: impl Into<String>, details: impl Into<String>) -> Self {
        Self::ConfigError {
            key: key.into(),
            details: details.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MapperError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_message_names_key() {
        let err = MapperError::config("input.delimiter", "empty");
        assert!(matches!(err, MapperError::ConfigError { ref key, .. } if key == "input.delimiter"));
        assert_eq!(err.to_string(), "Configuration error at 'input.delimiter': empty");
    }

    #[test]
    fn test_column_not_found_message_names_format_and_headers() {
        let err = MapperError::ColumnNotFound {
            format: "jpcrp".to_string(),
            role: "value",
            headers: vec!["項目名".to_string()],
        };
        let message = err.to_string();
        assert!(message.contains("jpcrp"));
        assert!(message.contains("value"));
        assert!(message.contains("項目名"));
    }
}
