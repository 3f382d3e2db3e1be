use crate::amount::{format_amount, parse_amount};
use crate::columns::{ColumnLayout, PeriodColumnKind};
use crate::hierarchy::{BalanceSheetLayout, LeafId, TemplateLine};
use crate::mapping::MappedRow;
use crate::schema::{NegativeStyle, SheetLayout};
use log::{debug, info};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

/// Width of every balance-sheet output row.
pub const BS_COLUMNS: usize = 25;

const COL_MAJOR: usize = 0;
const COL_MIDDLE: usize = 1;
const COL_MINOR: usize = 2;
const COL_LABEL: usize = 3;
const COL_LEVEL: usize = 4;
const COL_NOTES: usize = 5;
const COL_ROW_COUNT: usize = 6;
const COL_AMOUNT: usize = 8;
const COL_PERIOD: usize = 9;
const COL_CONTEXT: usize = 10;

/// A row whose amount could not be parsed; it is left out of its leaf's total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExcludedValue {
    pub row_index: usize,
    pub account: String,
    pub value: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafTotal {
    pub leaf: LeafId,
    pub amount: Decimal,
    pub row_count: usize,
    pub notes: Vec<String>,
    pub period: String,
    pub context: String,
}

/// Per-leaf totals in first-seen order, plus what could not be aggregated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Aggregation {
    pub totals: Vec<LeafTotal>,
    pub classified_rows: usize,
    pub unclassified_rows: usize,
    pub unclassified_names: BTreeSet<String>,
    pub excluded: Vec<ExcludedValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BalanceSheetReport {
    pub rows: Vec<Vec<String>>,
    pub aggregation: Aggregation,
}

pub struct BalanceSheetTransformer<'a> {
    layout: &'a BalanceSheetLayout,
    columns: &'a ColumnLayout,
    sheet_layout: SheetLayout,
    negative_style: NegativeStyle,
}

impl<'a> BalanceSheetTransformer<'a> {
    pub fn new(
        layout: &'a BalanceSheetLayout,
        columns: &'a ColumnLayout,
        sheet_layout: SheetLayout,
        negative_style: NegativeStyle,
    ) -> Self {
        Self {
            layout,
            columns,
            sheet_layout,
            negative_style,
        }
    }

    pub fn transform(&self, rows: &[MappedRow]) -> BalanceSheetReport {
        let aggregation = self.aggregate(rows);
        let rows = match self.sheet_layout {
            SheetLayout::Leaves => self.emit_leaves(&aggregation.totals),
            SheetLayout::Template => self.emit_template(&aggregation.totals),
        };

        info!(
            "Balance sheet: {} rows classified into {} leaves, {} unclassified, {} values excluded",
            aggregation.classified_rows,
            aggregation.totals.len(),
            aggregation.unclassified_rows,
            aggregation.excluded.len()
        );

        BalanceSheetReport { rows, aggregation }
    }

    /// Classifies each row and sums amounts per leaf.
    pub fn aggregate(&self, rows: &[MappedRow]) -> Aggregation {
        let mut aggregation = Aggregation::default();
        let mut position_by_leaf: HashMap<LeafId, usize> = HashMap::new();

        for mapped in rows {
            let Some(leaf) = self.layout.classify(&mapped.canonical_name) else {
                debug!(
                    "Row {}: '{}' is not part of the balance sheet",
                    mapped.row.index, mapped.canonical_name
                );
                aggregation.unclassified_rows += 1;
                aggregation.unclassified_names.insert(mapped.canonical_name.clone());
                continue;
            };
            aggregation.classified_rows += 1;

            let raw_value = mapped.row.cell(self.columns.value_col);
            let parsed = match parse_amount(raw_value) {
                Ok(parsed) => parsed,
                Err(e) => {
                    debug!("Row {}: {}; excluded from '{}'", mapped.row.index, e, mapped.canonical_name);
                    aggregation.excluded.push(ExcludedValue {
                        row_index: mapped.row.index,
                        account: mapped.canonical_name.clone(),
                        value: raw_value.to_string(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            let position = *position_by_leaf.entry(leaf).or_insert_with(|| {
                aggregation.totals.push(LeafTotal {
                    leaf,
                    amount: Decimal::ZERO,
                    row_count: 0,
                    notes: Vec::new(),
                    period: self.period_value(mapped, PeriodColumnKind::RelativeYear),
                    context: self.period_value(mapped, PeriodColumnKind::Context),
                });
                aggregation.totals.len() - 1
            });

            let total = &mut aggregation.totals[position];
            let Some(sum) = total.amount.checked_add(parsed.value) else {
                debug!(
                    "Row {}: adding '{}' to '{}' overflows; excluded",
                    mapped.row.index, raw_value, mapped.canonical_name
                );
                aggregation.excluded.push(ExcludedValue {
                    row_index: mapped.row.index,
                    account: mapped.canonical_name.clone(),
                    value: raw_value.to_string(),
                    reason: "sum overflows".to_string(),
                });
                continue;
            };
            total.amount = sum;
            total.row_count += 1;
            if let Some(note) = parsed.note {
                if !total.notes.contains(&note) {
                    total.notes.push(note);
                }
            }
        }

        aggregation
    }

    fn period_value(&self, mapped: &MappedRow, kind: PeriodColumnKind) -> String {
        self.columns
            .first_period_value(&mapped.row, kind)
            .unwrap_or_default()
            .to_string()
    }

    fn emit_leaves(&self, totals: &[LeafTotal]) -> Vec<Vec<String>> {
        totals
            .iter()
            .map(|total| {
                let leaf = self.layout.leaf(total.leaf);
                let mut row = blank_row();
                row[COL_MAJOR] = leaf.major.clone();
                row[COL_MIDDLE] = leaf.middle.clone();
                row[COL_MINOR] = leaf.minor.clone();
                row[COL_LABEL] = leaf.label.clone();
                row[COL_LEVEL] = leaf.level().to_string();
                row[COL_NOTES] = total.notes.join(" ");
                row[COL_ROW_COUNT] = total.row_count.to_string();
                row[COL_AMOUNT] = format_amount(total.amount, self.negative_style);
                row[COL_PERIOD] = total.period.clone();
                row[COL_CONTEXT] = total.context.clone();
                row
            })
            .collect()
    }

    /// The whole structure as a printable sheet: header rows for each group, leaf labels
    /// indented by depth, amounts where a leaf received contributions.
    fn emit_template(&self, totals: &[LeafTotal]) -> Vec<Vec<String>> {
        let by_leaf: HashMap<LeafId, &LeafTotal> = totals.iter().map(|t| (t.leaf, t)).collect();

        self.layout
            .template()
            .iter()
            .map(|line| {
                let mut row = blank_row();
                match line {
                    TemplateLine::Section(name) => row[0] = name.clone(),
                    TemplateLine::Category(name) => row[1] = name.clone(),
                    TemplateLine::SubCategory(name) => row[2] = name.clone(),
                    TemplateLine::SectionBreak => {}
                    TemplateLine::Leaf(id) => {
                        let leaf = self.layout.leaf(*id);
                        let indent = match leaf.level() {
                            1 => 0,
                            level => level,
                        };
                        row[indent] = leaf.label.clone();
                        if let Some(total) = by_leaf.get(id) {
                            row[COL_NOTES] = total.notes.join(" ");
                            row[COL_AMOUNT] = format_amount(total.amount, self.negative_style);
                        }
                    }
                }
                row
            })
            .collect()
    }
}

fn blank_row() -> Vec<String> {
    vec![String::new(); BS_COLUMNS]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::columns::discover;
    use crate::loader::RawRow;
    use crate::schema::{AccountNames, BalanceSheetConfig, InputFormat};

    fn layout() -> BalanceSheetLayout {
        let mut config = BalanceSheetConfig::default();
        for (key, names) in [
            ("現金及び預金", vec!["現金", "預金"]),
            ("受取手形及び売掛金", vec!["売掛金"]),
            ("土地", vec!["土地"]),
            ("資産合計", vec!["資産合計"]),
            ("流動負債/リース債務", vec!["リース債務（流動）"]),
        ] {
            config.account_mapping.insert(
                key.to_string(),
                AccountNames::Many(names.into_iter().map(String::from).collect()),
            );
        }
        BalanceSheetLayout::build(&config).unwrap()
    }

    fn columns() -> ColumnLayout {
        let headers: Vec<String> = ["項目名", "コンテキストID", "相対年度", "値"]
            .iter()
            .map(|h| h.to_string())
            .collect();
        discover(&headers, InputFormat::Jpcrp).unwrap()
    }

    fn mapped(index: usize, canonical: &str, value: &str) -> MappedRow {
        MappedRow {
            row: RawRow::new(
                index,
                vec![
                    canonical.to_string(),
                    "CurrentYearInstant".to_string(),
                    "当期末".to_string(),
                    value.to_string(),
                ],
            ),
            canonical_name: canonical.to_string(),
            was_mapped: true,
        }
    }

    fn leaves_transformer<'a>(
        layout: &'a BalanceSheetLayout,
        columns: &'a ColumnLayout,
    ) -> BalanceSheetTransformer<'a> {
        BalanceSheetTransformer::new(layout, columns, SheetLayout::Leaves, NegativeStyle::Minus)
    }

    #[test]
    fn test_rows_for_one_leaf_are_summed() {
        let (layout, columns) = (layout(), columns());
        let report = leaves_transformer(&layout, &columns)
            .transform(&[mapped(0, "現金", "500"), mapped(1, "預金", "300")]);

        assert_eq!(report.rows.len(), 1);
        let row = &report.rows[0];
        assert_eq!(row.len(), BS_COLUMNS);
        assert_eq!(row[0], "資産の部");
        assert_eq!(row[1], "流動資産");
        assert_eq!(row[2], "");
        assert_eq!(row[3], "現金及び預金");
        assert_eq!(row[4], "2");
        assert_eq!(row[6], "2");
        assert_eq!(row[8], "800");
        assert_eq!(row[9], "当期末");
        assert_eq!(row[10], "CurrentYearInstant");
        assert!(row[11..].iter().all(String::is_empty));
    }

    #[test]
    fn test_dash_counts_as_zero() {
        let (layout, columns) = (layout(), columns());
        let report = leaves_transformer(&layout, &columns)
            .transform(&[mapped(0, "現金", "－"), mapped(1, "売掛金", "1,200")]);

        assert_eq!(report.rows.len(), 2);
        assert_eq!(report.rows[0][3], "現金及び預金");
        assert_eq!(report.rows[0][8], "0");
        assert!(report.aggregation.excluded.is_empty());
    }

    #[test]
    fn test_unparseable_value_is_excluded_with_warning() {
        let (layout, columns) = (layout(), columns());
        let report = leaves_transformer(&layout, &columns).transform(&[
            mapped(0, "現金", "100"),
            mapped(1, "預金", "n/a"),
            mapped(2, "売掛金", "abc"),
        ]);

        assert_eq!(report.rows.len(), 1);
        assert_eq!(report.rows[0][8], "100");
        assert_eq!(report.rows[0][6], "1");
        let excluded = &report.aggregation.excluded;
        assert_eq!(excluded.len(), 2);
        assert_eq!(excluded[0].row_index, 1);
        assert_eq!(excluded[0].account, "預金");
        assert_eq!(excluded[1].value, "abc");
    }

    #[test]
    fn test_overflowing_sum_excludes_the_row() {
        let (layout, columns) = (layout(), columns());
        let report = leaves_transformer(&layout, &columns).transform(&[
            mapped(0, "現金", "79,228,162,514,264,337,593,543,950,335"),
            mapped(1, "預金", "1"),
            mapped(2, "預金", "△5"),
        ]);

        assert_eq!(report.rows.len(), 1);
        assert_eq!(report.rows[0][6], "2");
        assert_eq!(report.rows[0][8], "79,228,162,514,264,337,593,543,950,330");
        let excluded = &report.aggregation.excluded;
        assert_eq!(excluded.len(), 1);
        assert_eq!(excluded[0].row_index, 1);
        assert_eq!(excluded[0].reason, "sum overflows");
    }

    #[test]
    fn test_first_seen_order_and_commutative_sums() {
        let (layout, columns) = (layout(), columns());
        let transformer = leaves_transformer(&layout, &columns);
        let forward = vec![
            mapped(0, "土地", "1,000"),
            mapped(1, "現金", "(200)"),
            mapped(2, "土地", "△300"),
            mapped(3, "預金", "50"),
        ];
        let mut backward = forward.clone();
        backward.reverse();

        let first = transformer.transform(&forward);
        let labels: Vec<&str> = first.rows.iter().map(|r| r[3].as_str()).collect();
        assert_eq!(labels, vec!["土地", "現金及び預金"]);
        assert_eq!(first.rows[0][8], "700");
        assert_eq!(first.rows[0][4], "3");
        assert_eq!(first.rows[1][8], "-150");

        let second = transformer.transform(&backward);
        let labels: Vec<&str> = second.rows.iter().map(|r| r[3].as_str()).collect();
        assert_eq!(labels, vec!["現金及び預金", "土地"]);
        assert_eq!(second.rows[1][8], "700");
        assert_eq!(second.rows[0][8], "-150");
    }

    #[test]
    fn test_transform_is_repeatable() {
        let (layout, columns) = (layout(), columns());
        let transformer = leaves_transformer(&layout, &columns);
        let rows = vec![mapped(0, "現金", "1"), mapped(1, "資産合計", "9")];
        assert_eq!(transformer.transform(&rows), transformer.transform(&rows));
    }

    #[test]
    fn test_unclassified_names_are_skipped() {
        let (layout, columns) = (layout(), columns());
        let report = leaves_transformer(&layout, &columns)
            .transform(&[mapped(0, "売上高", "10"), mapped(1, "現金", "5")]);
        assert_eq!(report.rows.len(), 1);
        assert_eq!(report.aggregation.unclassified_rows, 1);
        assert!(report.aggregation.unclassified_names.contains("売上高"));
    }

    #[test]
    fn test_notes_and_triangle_negatives() {
        let (layout, columns) = (layout(), columns());
        let transformer =
            BalanceSheetTransformer::new(&layout, &columns, SheetLayout::Leaves, NegativeStyle::Triangle);
        let report = transformer.transform(&[mapped(0, "リース債務（流動）", "※3 △1,500")]);
        assert_eq!(report.rows[0][1], "流動負債");
        assert_eq!(report.rows[0][5], "※3");
        assert_eq!(report.rows[0][8], "△1,500");
    }

    #[test]
    fn test_template_layout_renders_whole_structure() {
        let (layout, columns) = (layout(), columns());
        let transformer =
            BalanceSheetTransformer::new(&layout, &columns, SheetLayout::Template, NegativeStyle::Minus);
        let report = transformer.transform(&[mapped(0, "現金", "500"), mapped(1, "資産合計", "500")]);

        assert_eq!(report.rows.len(), layout.template().len());
        assert_eq!(report.rows[0][0], "資産の部");
        assert_eq!(report.rows[1][1], "流動資産");

        let cash = report.rows.iter().find(|r| r[2] == "現金及び預金").unwrap();
        assert_eq!(cash[8], "500");
        let land = report.rows.iter().find(|r| r[3] == "土地").unwrap();
        assert_eq!(land[8], "");
        let total = report.rows.iter().find(|r| r[0] == "資産合計").unwrap();
        assert_eq!(total[8], "500");

        assert!(report.rows.iter().any(|r| r.iter().all(String::is_empty)));
    }
}
