use crate::error::{MapperError, Result};
use crate::loader::RawRow;
use crate::schema::{InputConfig, InputFormat, ProcessingColumns};
use log::{debug, info};
use regex::{Regex, RegexBuilder};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderPattern {
    Exact(&'static str),
    /// Case-insensitive substring match.
    Contains(&'static str),
}

impl HeaderPattern {
    pub fn matches(&self, header: &str) -> bool {
        match self {
            Self::Exact(expected) => header == *expected,
            Self::Contains(fragment) => header.to_lowercase().contains(&fragment.to_lowercase()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodColumnKind {
    /// XBRL context id, e.g. `CurrentYearInstant`.
    Context,
    /// Relative fiscal year label, e.g. `当期末`.
    RelativeYear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodColumn {
    pub index: usize,
    pub kind: PeriodColumnKind,
}

pub struct FormatCandidates {
    pub item: &'static [HeaderPattern],
    pub value: &'static [HeaderPattern],
    pub period: &'static [(HeaderPattern, PeriodColumnKind)],
}

use HeaderPattern::{Contains, Exact};
use PeriodColumnKind::{Context, RelativeYear};

const PERIOD_CANDIDATES: &[(HeaderPattern, PeriodColumnKind)] = &[
    (Exact("コンテキストID"), Context),
    (Contains("コンテキスト"), Context),
    (Contains("Context"), Context),
    (Exact("相対年度"), RelativeYear),
    (Contains("RelativeYear"), RelativeYear),
];

const BALANCE_SEAT: FormatCandidates = FormatCandidates {
    item: &[
        Exact("勘定科目"),
        Exact("科目名"),
        Exact("科目"),
        Exact("項目名"),
        Exact("AccountName"),
        Exact("Account"),
        Contains("科目"),
        Contains("項目"),
        Contains("勘定"),
        Contains("Account"),
    ],
    value: &[
        Exact("当期末残高"),
        Exact("残高"),
        Exact("金額"),
        Exact("値"),
        Exact("Balance"),
        Exact("Amount"),
        Exact("Value"),
        Contains("残高"),
        Contains("金額"),
        Contains("値"),
        Contains("Balance"),
        Contains("Amount"),
        Contains("Value"),
    ],
    period: PERIOD_CANDIDATES,
};

const JPCRP: FormatCandidates = FormatCandidates {
    item: &[
        Exact("項目名"),
        Exact("要素名"),
        Exact("ElementName"),
        Exact("Element"),
        Contains("項目"),
        Contains("Element"),
    ],
    value: &[
        Exact("値"),
        Exact("Value"),
        Exact("金額"),
        Exact("Amount"),
        Contains("値"),
        Contains("Value"),
    ],
    period: PERIOD_CANDIDATES,
};

pub fn candidates(format: InputFormat) -> &'static FormatCandidates {
    match format {
        InputFormat::BalanceSeat => &BALANCE_SEAT,
        InputFormat::Jpcrp => &JPCRP,
    }
}

/// Where the interesting columns of a loaded table are.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnLayout {
    pub format: InputFormat,
    pub item_col: usize,
    pub value_col: usize,
    /// Period/context columns in header order. Used for filtering only with `jpcrp` input.
    pub period_cols: Vec<PeriodColumn>,
}

impl ColumnLayout {
    pub fn first_period_value<'a>(&self, row: &'a RawRow, kind: PeriodColumnKind) -> Option<&'a str> {
        self.period_cols
            .iter()
            .filter(|column| column.kind == kind)
            .map(|column| row.cell(column.index).trim())
            .find(|value| !value.is_empty())
    }
}

pub fn discover(headers: &[String], format: InputFormat) -> Result<ColumnLayout> {
    let candidates = candidates(format);
    let not_found = |role: &'static str| MapperError::ColumnNotFound {
        format: format.to_string(),
        role,
        headers: headers.to_vec(),
    };

    let item_col = find_column(headers, candidates.item, &[]).ok_or_else(|| not_found("item name"))?;
    let value_col =
        find_column(headers, candidates.value, &[item_col]).ok_or_else(|| not_found("value"))?;

    let period_cols = headers
        .iter()
        .enumerate()
        .filter(|(index, _)| *index != item_col && *index != value_col)
        .filter_map(|(index, header)| {
            candidates
                .period
                .iter()
                .find(|(pattern, _)| pattern.matches(header))
                .map(|(_, kind)| PeriodColumn { index, kind: *kind })
        })
        .collect::<Vec<_>>();

    info!(
        "Discovered columns for {}: item='{}', value='{}', period={:?}",
        format,
        headers[item_col],
        headers[value_col],
        period_cols
            .iter()
            .map(|column| headers[column.index].as_str())
            .collect::<Vec<_>>()
    );

    Ok(ColumnLayout {
        format,
        item_col,
        value_col,
        period_cols,
    })
}

/// First header matching the highest-priority pattern wins.
fn find_column(headers: &[String], patterns: &[HeaderPattern], exclude: &[usize]) -> Option<usize> {
    patterns.iter().find_map(|pattern| {
        headers
            .iter()
            .enumerate()
            .find(|(index, header)| !exclude.contains(index) && pattern.matches(header))
            .map(|(index, _)| index)
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeriodFilter {
    All,
    Exact(String),
    Inferred,
}

impl PeriodFilter {
    /// Period filtering only applies to `jpcrp` input.
    pub fn from_config(input: &InputConfig, format: InputFormat) -> Self {
        if format != InputFormat::Jpcrp {
            return Self::All;
        }
        match input.current_period.as_deref().map(str::trim) {
            Some(marker) if !marker.is_empty() => Self::Exact(marker.to_string()),
            _ if input.infer_current_period => Self::Inferred,
            _ => Self::All,
        }
    }

    pub fn retains(&self, row: &RawRow, layout: &ColumnLayout) -> bool {
        match self {
            Self::All => true,
            Self::Exact(marker) => layout
                .period_cols
                .iter()
                .any(|column| row.cell(column.index).trim() == marker),
            Self::Inferred => {
                let has_context = layout.period_cols.iter().any(|c| c.kind == Context);
                let kind = if has_context { Context } else { RelativeYear };
                layout
                    .period_cols
                    .iter()
                    .filter(|column| column.kind == kind)
                    .any(|column| is_current_period(row.cell(column.index).trim(), kind))
            }
        }
    }
}

fn is_current_period(value: &str, kind: PeriodColumnKind) -> bool {
    match kind {
        Context => value.to_lowercase().contains("current"),
        RelativeYear => value == "当期" || value == "当期末",
    }
}

/// Keeps the rows of the configured period. Returns the kept rows and how many were left out.
pub fn filter_rows(
    rows: Vec<RawRow>,
    layout: &ColumnLayout,
    filter: &PeriodFilter,
    headers: &[String],
) -> Result<(Vec<RawRow>, usize)> {
    if *filter == PeriodFilter::All {
        return Ok((rows, 0));
    }
    if layout.period_cols.is_empty() {
        return Err(MapperError::ColumnNotFound {
            format: layout.format.to_string(),
            role: "period/context",
            headers: headers.to_vec(),
        });
    }

    let total = rows.len();
    let kept: Vec<RawRow> = rows
        .into_iter()
        .filter(|row| {
            let retained = filter.retains(row, layout);
            if !retained {
                debug!("Row {} is outside the current period", row.index);
            }
            retained
        })
        .collect();
    let excluded = total - kept.len();

    info!("Period filter {:?}: kept {} of {} rows", filter, kept.len(), total);
    Ok((kept, excluded))
}

/// Picks the additional `standard`-output columns whose values go through the account mapping.
///
/// Patterns are case-insensitive regular expressions searched anywhere in the header.
/// Exclusions win; an empty target list selects every column not excluded.
#[derive(Debug, Clone)]
pub struct ColumnSelector {
    target: Vec<Regex>,
    exclude: Vec<Regex>,
}

impl ColumnSelector {
    pub fn from_config(config: &ProcessingColumns) -> Result<Self> {
        Ok(Self {
            target: compile_patterns("processing_columns.target_columns", &config.target_columns)?,
            exclude: compile_patterns("processing_columns.exclude_columns", &config.exclude_columns)?,
        })
    }

    pub fn matches(&self, header: &str) -> bool {
        if self.exclude.iter().any(|pattern| pattern.is_match(header)) {
            return false;
        }
        self.target.is_empty() || self.target.iter().any(|pattern| pattern.is_match(header))
    }

    /// Indices of the selected headers, in header order.
    pub fn select(&self, headers: &[String]) -> Vec<usize> {
        headers
            .iter()
            .enumerate()
            .filter(|(_, header)| self.matches(header))
            .map(|(index, _)| index)
            .collect()
    }
}

fn compile_patterns(key: &str, patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|pattern| {
            RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map_err(|e| MapperError::config(key, format!("invalid pattern '{}': {}", pattern, e)))
        })
        .collect()
}
