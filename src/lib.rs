//! # Statement Mapper
//!
//! Maps the account items of accounting-statement CSV exports onto a standard vocabulary and,
//! optionally, reshapes the mapped rows into a fixed 25-column hierarchical balance sheet.
//!
//! ## Pipeline
//!
//! - **Load**: decode the file with the configured encoding, skip to the header row, split cells
//! - **Discover**: find the item-name, value and (for `jpcrp`) period/context columns
//! - **Filter**: keep only the current reporting period when one is configured
//! - **Map**: replace raw item names with canonical names from `account_mapping`
//! - **Transform** (`bs` output only): classify canonical names into balance-sheet leaves and
//!   sum their amounts
//! - **Write**: serialize with the output encoding and delimiter, never overwriting a file
//!
//! ## Example
//!
//! ```rust,ignore
//! use statement_mapper::*;
//! use std::path::Path;
//!
//! let config = MapperConfig::from_path(Path::new("config.json"))?;
//! let summary = StatementProcessor::new(&config)?.run(
//!     Path::new("jpcrp030000-asr-001.csv"),
//!     Path::new("balance_sheet.csv"),
//!     &RunOptions::default(),
//! )?;
//! println!("{} rows written", summary.rows_written);
//! ```

pub mod amount;
pub mod columns;
pub mod encoding;
pub mod error;
pub mod hierarchy;
pub mod loader;
pub mod mapping;
pub mod schema;
pub mod transformer;
pub mod writer;

pub use amount::{format_amount, parse_amount, ParsedAmount};
pub use columns::{discover, filter_rows, ColumnLayout, ColumnSelector, PeriodFilter};
pub use encoding::TextEncoding;
pub use error::{MapperError, Result};
pub use hierarchy::{default_structure, BalanceSheetLayout, HierarchyLeaf};
pub use loader::{load, RawRow, Table};
pub use mapping::{map_row, AccountMap, AccountMapper, MappedRow, MappingStats};
pub use schema::*;
pub use transformer::{BalanceSheetReport, BalanceSheetTransformer, ExcludedValue, BS_COLUMNS};
pub use writer::{render, write, OutputTable};

use log::{debug, info, warn};
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Load, discover, filter and map, but build no balance sheet and write nothing.
    pub dry_run: bool,
}

/// Counts for one run. Row counts refer to data rows (the header row is not counted).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub rows_read: usize,
    pub rows_outside_period: usize,
    pub mapped: usize,
    pub passed_through: usize,
    pub dropped_unmapped: usize,
    pub dropped_blank: usize,
    /// Mapped rows whose canonical name belongs to no balance-sheet leaf (`bs` output only).
    pub unclassified: usize,
    /// Rows left out of a balance-sheet total because their amount did not parse.
    pub excluded_values: usize,
    pub rows_written: usize,
    pub dry_run: bool,
    pub unmapped_names: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessedTable {
    pub output: OutputTable,
    pub summary: RunSummary,
    pub excluded: Vec<ExcludedValue>,
}

pub struct StatementProcessor<'a> {
    config: &'a MapperConfig,
    account_map: AccountMap,
    balance_sheet: BalanceSheetLayout,
    column_selector: Option<ColumnSelector>,
}

impl<'a> StatementProcessor<'a> {
    /// Validates the config and builds both lookup tables, so mapping conflicts surface
    /// before any file is read.
    pub fn new(config: &'a MapperConfig) -> Result<Self> {
        config.validate()?;
        let account_map = AccountMap::build(&config.account_mapping)?;
        let balance_sheet = BalanceSheetLayout::build(&config.balance_sheet)?;
        let column_selector = config
            .processing_columns
            .as_ref()
            .map(ColumnSelector::from_config)
            .transpose()?;

        debug!(
            "Account mapping: {} entries ({} distinct raw names) across {} categories",
            config.mapping_entry_count(),
            account_map.len(),
            config.account_mapping.len()
        );

        Ok(Self {
            config,
            account_map,
            balance_sheet,
            column_selector,
        })
    }

    pub fn run(&self, input: &Path, output: &Path, options: &RunOptions) -> Result<RunSummary> {
        let input_config = &self.config.input;
        info!(
            "Processing {} as {} -> {} output",
            input.display(),
            input_config.format,
            self.config.output.format
        );

        let table = loader::load(
            input,
            input_config.encoding()?,
            input_config.delimiter_byte()?,
            input_config.header_row,
        )?;

        let mut processed = self.process_table(table, options.dry_run)?;

        if options.dry_run {
            info!("Dry run: nothing written to {}", output.display());
        } else {
            writer::write(
                output,
                &processed.output,
                self.config.output.encoding()?,
                self.config.output.delimiter_byte()?,
            )?;
            processed.summary.rows_written = processed.output.rows.len();
        }

        self.log_summary(&processed);
        Ok(processed.summary)
    }

    /// Runs discovery, period filtering, mapping and (for `bs` output) the balance-sheet
    /// transform on an already loaded table.
    pub fn process_table(&self, table: Table, dry_run: bool) -> Result<ProcessedTable> {
        let format = self.config.input.format;
        let layout = columns::discover(&table.headers, format)?;

        let rows_read = table.rows.len();
        let filter = PeriodFilter::from_config(&self.config.input, format);
        let (rows, rows_outside_period) = columns::filter_rows(table.rows, &layout, &filter, &table.headers)?;

        let mapper = AccountMapper::new(
            &self.account_map,
            layout.item_col,
            self.config.output.include_unmapped,
        );
        let (mapped_rows, stats) = mapper.map_rows(rows);

        let mut summary = RunSummary {
            rows_read,
            rows_outside_period,
            mapped: stats.mapped,
            passed_through: stats.passed_through,
            dropped_unmapped: stats.dropped_unmapped,
            dropped_blank: stats.dropped_blank,
            dry_run,
            unmapped_names: stats.unmapped_names.into_iter().collect(),
            ..RunSummary::default()
        };

        if dry_run {
            return Ok(ProcessedTable {
                summary,
                ..ProcessedTable::default()
            });
        }

        let (output, excluded) = match self.config.output.format {
            OutputFormat::Standard => {
                let extra_cols = self.extra_mapped_columns(&table.headers, layout.item_col);
                let mut extra_mapped = 0;
                let rows = mapped_rows
                    .into_iter()
                    .map(|mapped| {
                        let mut cells = mapped.row.cells;
                        cells[layout.item_col] = mapped.canonical_name;
                        for &column in &extra_cols {
                            if let Some(canonical) = self.account_map.lookup(&cells[column]) {
                                cells[column] = canonical.to_string();
                                extra_mapped += 1;
                            }
                        }
                        cells
                    })
                    .collect();
                if !extra_cols.is_empty() {
                    debug!("{} cells mapped outside the item-name column", extra_mapped);
                }
                (OutputTable::with_headers(table.headers, rows), Vec::new())
            }
            OutputFormat::Bs => {
                let transformer = BalanceSheetTransformer::new(
                    &self.balance_sheet,
                    &layout,
                    self.config.balance_sheet.layout,
                    self.config.balance_sheet.negative_style,
                );
                let report = transformer.transform(&mapped_rows);
                summary.unclassified = report.aggregation.unclassified_rows;
                summary.excluded_values = report.aggregation.excluded.len();
                (OutputTable::headerless(report.rows), report.aggregation.excluded)
            }
        };

        Ok(ProcessedTable {
            output,
            summary,
            excluded,
        })
    }

    /// Columns besides the item-name column selected by `processing_columns`.
    fn extra_mapped_columns(&self, headers: &[String], item_col: usize) -> Vec<usize> {
        let Some(selector) = &self.column_selector else {
            return Vec::new();
        };
        let columns: Vec<usize> = selector
            .select(headers)
            .into_iter()
            .filter(|column| *column != item_col)
            .collect();
        info!(
            "Also mapping columns: {:?}",
            columns.iter().map(|column| headers[*column].as_str()).collect::<Vec<_>>()
        );
        columns
    }

    fn log_summary(&self, processed: &ProcessedTable) {
        let summary = &processed.summary;
        let logging = &self.config.logging;

        info!(
            "Read {} rows, {} outside the current period, {} rows written",
            summary.rows_read, summary.rows_outside_period, summary.rows_written
        );

        info!(
            "Dropped {} unmapped rows and {} rows with blank item names",
            summary.dropped_unmapped, summary.dropped_blank
        );
        if self.config.output.format == OutputFormat::Bs && !summary.dry_run {
            info!("Balance sheet: {} rows not classified into any leaf", summary.unclassified);
        }

        if logging.show_mapping_stats {
            info!(
                "Mapping: {} mapped, {} passed through unmapped",
                summary.mapped, summary.passed_through
            );
        }

        if logging.show_unmapped_items && !summary.unmapped_names.is_empty() {
            warn!("{} distinct item names have no mapping entry:", summary.unmapped_names.len());
            for name in &summary.unmapped_names {
                warn!("  {}", name);
            }
        }

        if summary.excluded_values > 0 {
            warn!(
                "{} rows were excluded from balance-sheet totals because their amounts did not parse",
                summary.excluded_values
            );
            for excluded in &processed.excluded {
                debug!(
                    "  row {} ({}): '{}' {}",
                    excluded.row_index, excluded.account, excluded.value, excluded.reason
                );
            }
        }
    }
}

pub fn process_file(
    config: &MapperConfig,
    input: &Path,
    output: &Path,
    options: &RunOptions,
) -> Result<RunSummary> {
    StatementProcessor::new(config)?.run(input, output, options)
}
