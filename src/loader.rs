use crate::encoding::TextEncoding;
use crate::error::{MapperError, Result};
use csv::ReaderBuilder;
use log::{debug, info};
use std::path::Path;

/// One data row as read from the source file. `index` is its 0-based position among data rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    pub index: usize,
    pub cells: Vec<String>,
}

impl RawRow {
    pub fn new(index: usize, cells: Vec<String>) -> Self {
        Self { index, cells }
    }

    pub fn cell(&self, column: usize) -> &str {
        self.cells.get(column).map(String::as_str).unwrap_or("")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
}

impl Table {
    pub fn shape(&self) -> (usize, usize) {
        (self.rows.len(), self.headers.len())
    }
}

pub fn load(
    path: &Path,
    encoding: TextEncoding,
    delimiter: u8,
    header_row: usize,
) -> Result<Table> {
    let bytes = std::fs::read(path).map_err(|source| MapperError::FileError {
        path: path.to_path_buf(),
        source,
    })?;

    let text = encoding
        .decode(&bytes)
        .ok_or_else(|| MapperError::DecodeError {
            path: path.to_path_buf(),
            encoding: encoding.name().to_string(),
        })?;

    let body = skip_preamble(&text, header_row).ok_or_else(|| MapperError::HeaderRowOutOfRange {
        path: path.to_path_buf(),
        header_row,
        line_count: text.lines().count(),
    })?;

    let table = parse_table(body, delimiter)?;
    if table.headers.is_empty() {
        return Err(MapperError::HeaderRowOutOfRange {
            path: path.to_path_buf(),
            header_row,
            line_count: text.lines().count(),
        });
    }

    let (row_count, column_count) = table.shape();
    info!("Loaded {}: {} rows x {} columns", path.display(), row_count, column_count);
    info!("Columns: {:?}", table.headers);

    Ok(table)
}

/// Returns the text starting at the 1-based `header_row` line, or `None` if the file has no such line.
fn skip_preamble(text: &str, header_row: usize) -> Option<&str> {
    let body = if header_row <= 1 {
        text
    } else {
        let (offset, _) = text.match_indices('\n').nth(header_row - 2)?;
        &text[offset + 1..]
    };

    if body.trim().is_empty() {
        None
    } else {
        Some(body)
    }
}

pub fn parse_table(body: &str, delimiter: u8) -> Result<Table> {
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(body.as_bytes());

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|header| header.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }

        let mut cells: Vec<String> = record.iter().map(str::to_string).collect();
        if cells.len() > headers.len() {
            debug!(
                "Row {} has {} cells but the header has {}; extra cells ignored",
                rows.len(),
                cells.len(),
                headers.len()
            );
        }
        cells.resize(headers.len(), String::new());

        rows.push(RawRow::new(rows.len(), cells));
    }

    Ok(Table { headers, rows })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_tab_separated_table() {
        let table = parse_table("科目\t金額\n現金\t1,000\n預金\t\"2,000\"\n", b'\t').unwrap();
        assert_eq!(table.headers, vec!["科目", "金額"]);
        assert_eq!(table.shape(), (2, 2));
        assert_eq!(table.rows[1].cell(1), "2,000");
        assert_eq!(table.rows[1].index, 1);
        assert_eq!(table.rows[0].cell(0), "現金");
    }

    #[test]
    fn test_short_rows_are_padded_and_blank_rows_skipped() {
        let table = parse_table("a,b,c\n1\n,,\n4,5,6,7\n", b',').unwrap();
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].cells, vec!["1", "", ""]);
        assert_eq!(table.rows[1].cells, vec!["4", "5", "6"]);
        assert_eq!(table.rows[1].index, 1);
    }

    #[test]
    fn test_preamble_lines_are_skipped_as_raw_text() {
        let text = "title \"unbalanced\nsecond line\n科目,金額\n現金,1\n";
        let body = skip_preamble(text, 3).unwrap();
        let table = parse_table(body, b',').unwrap();
        assert_eq!(table.headers, vec!["科目", "金額"]);
        assert_eq!(table.rows.len(), 1);
    }

    #[test]
    fn test_header_row_beyond_end_of_file() {
        assert!(skip_preamble("a,b\n1,2\n", 5).is_none());
        assert!(skip_preamble("a,b\n1,2\n", 3).is_none());
        assert!(skip_preamble("a,b\n1,2\n", 2).is_some());
    }

    #[test]
    fn test_load_utf16_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let encoding = TextEncoding::for_label("utf-16").unwrap();
        file.write_all(&encoding.encode("項目名\t値\n現金及び預金\t500\n").unwrap())
            .unwrap();

        let table = load(file.path(), encoding, b'\t', 1).unwrap();
        assert_eq!(table.headers, vec!["項目名", "値"]);
        assert_eq!(table.rows[0].cells, vec!["現金及び預金", "500"]);
    }

    #[test]
    fn test_load_reports_missing_file_and_bad_encoding() {
        let encoding = TextEncoding::for_label("utf-8").unwrap();
        let missing = load(Path::new("/nonexistent/input.csv"), encoding, b',', 1);
        assert!(matches!(missing, Err(MapperError::FileError { .. })));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0x61, 0x2C, 0xFF, 0x0A]).unwrap();
        let undecodable = load(file.path(), encoding, b',', 1);
        assert!(matches!(undecodable, Err(MapperError::DecodeError { .. })));
    }
}
