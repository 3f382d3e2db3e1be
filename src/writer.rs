use crate::encoding::TextEncoding;
use crate::error::{MapperError, Result};
use csv::{QuoteStyle, WriterBuilder};
use log::info;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

/// A table ready for serialization. `headers` is `None` for layouts without a header row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputTable {
    pub headers: Option<Vec<String>>,
    pub rows: Vec<Vec<String>>,
}

impl OutputTable {
    pub fn with_headers(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self {
            headers: Some(headers),
            rows,
        }
    }

    pub fn headerless(rows: Vec<Vec<String>>) -> Self {
        Self { headers: None, rows }
    }
}

/// Serializes the table to encoded bytes.
pub fn render(table: &OutputTable, encoding: TextEncoding, delimiter: u8) -> Result<Vec<u8>> {
    let mut writer = WriterBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .quote_style(QuoteStyle::Necessary)
        .from_writer(Vec::new());

    if let Some(headers) = &table.headers {
        writer.write_record(headers)?;
    }
    for row in &table.rows {
        writer.write_record(row)?;
    }

    let utf8 = writer
        .into_inner()
        .map_err(|e| MapperError::IoError(e.into_error()))?;
    let text = String::from_utf8_lossy(&utf8);

    encoding.encode(&text).ok_or_else(|| MapperError::EncodeError {
        encoding: encoding.name().to_string(),
    })
}

/// Writes the table to a new file. An existing file at `path` is never overwritten.
pub fn write(path: &Path, table: &OutputTable, encoding: TextEncoding, delimiter: u8) -> Result<()> {
    let bytes = render(table, encoding, delimiter)?;

    let file_error = |source| MapperError::FileError {
        path: path.to_path_buf(),
        source,
    };
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(file_error)?;
    file.write_all(&bytes).map_err(file_error)?;

    info!(
        "Wrote {} rows to {} ({})",
        table.rows.len(),
        path.display(),
        encoding.name()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utf8() -> TextEncoding {
        TextEncoding::for_label("utf-8").unwrap()
    }

    fn table() -> OutputTable {
        OutputTable::with_headers(
            vec!["項目名".to_string(), "値".to_string()],
            vec![
                vec!["現金及び預金".to_string(), "1,000".to_string()],
                vec!["預金".to_string(), "500".to_string()],
            ],
        )
    }

    #[test]
    fn test_render_quotes_only_when_needed() {
        let bytes = render(&table(), utf8(), b',').unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "項目名,値\n現金及び預金,\"1,000\"\n預金,500\n"
        );

        let tabbed = render(&table(), utf8(), b'\t').unwrap();
        assert_eq!(
            String::from_utf8(tabbed).unwrap(),
            "項目名\t値\n現金及び預金\t1,000\n預金\t500\n"
        );
    }

    #[test]
    fn test_headerless_render() {
        let rows = OutputTable::headerless(vec![vec!["a".to_string(), String::new(), "b".to_string()]]);
        assert_eq!(String::from_utf8(render(&rows, utf8(), b',').unwrap()).unwrap(), "a,,b\n");
    }

    #[test]
    fn test_unencodable_output_is_an_error() {
        let sjis = TextEncoding::for_label("shift_jis").unwrap();
        let table = OutputTable::headerless(vec![vec!["😀".to_string()]]);
        assert!(matches!(render(&table, sjis, b','), Err(MapperError::EncodeError { .. })));
    }

    #[test]
    fn test_write_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");

        write(&path, &table(), utf8(), b',').unwrap();
        let first = std::fs::read(&path).unwrap();

        let second = write(&path, &OutputTable::default(), utf8(), b',');
        assert!(matches!(second, Err(MapperError::FileError { .. })));
        assert_eq!(std::fs::read(&path).unwrap(), first);
    }
}
