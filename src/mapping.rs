use crate::error::{MapperError, Result};
use crate::loader::RawRow;
use log::debug;
use serde::Serialize;
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Flat raw-name to canonical-name lookup built from the category-grouped config table.
#[derive(Debug, Clone, Default)]
pub struct AccountMap {
    entries: HashMap<String, Target>,
}

#[derive(Debug, Clone)]
struct Target {
    canonical: String,
    category: String,
}

impl AccountMap {
    /// Flattens `category -> (raw -> canonical)`. A raw name listed under several categories
    /// must name the same canonical account each time.
    pub fn build(grouped: &BTreeMap<String, BTreeMap<String, String>>) -> Result<Self> {
        let mut entries: HashMap<String, Target> = HashMap::new();

        for (category, names) in grouped {
            for (raw, canonical) in names {
                let raw = raw.trim();
                let canonical = canonical.trim();
                let key = format!("account_mapping.{}.{}", category, raw);
                if raw.is_empty() {
                    return Err(MapperError::config(
                        format!("account_mapping.{}", category),
                        "raw account names must not be blank",
                    ));
                }
                if canonical.is_empty() {
                    return Err(MapperError::config(key, "canonical account name must not be blank"));
                }

                match entries.entry(raw.to_string()) {
                    Entry::Vacant(entry) => {
                        entry.insert(Target {
                            canonical: canonical.to_string(),
                            category: category.clone(),
                        });
                    }
                    Entry::Occupied(entry) if entry.get().canonical == canonical => {
                        debug!(
                            "'{}' is listed under both '{}' and '{}' with the same target",
                            raw,
                            entry.get().category,
                            category
                        );
                    }
                    Entry::Occupied(entry) => {
                        return Err(MapperError::config(
                            key,
                            format!(
                                "'{}' maps to '{}' here but to '{}' under '{}'",
                                raw,
                                canonical,
                                entry.get().canonical,
                                entry.get().category
                            ),
                        ));
                    }
                }
            }
        }

        Ok(Self { entries })
    }

    pub fn lookup(&self, raw_name: &str) -> Option<&str> {
        self.entries
            .get(raw_name.trim())
            .map(|target| target.canonical.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedRow {
    pub row: RawRow,
    /// The canonical name, or the original (trimmed) name when the row was passed through.
    pub canonical_name: String,
    pub was_mapped: bool,
}

/// Maps one row. Returns `None` when the row is dropped: a blank item name, or an unmapped
/// name with `include_unmapped` off.
pub fn map_row(
    row: RawRow,
    item_col: usize,
    account_map: &AccountMap,
    include_unmapped: bool,
) -> Option<MappedRow> {
    let item = row.cell(item_col).trim();
    if item.is_empty() {
        return None;
    }

    match account_map.lookup(item) {
        Some(canonical) => Some(MappedRow {
            canonical_name: canonical.to_string(),
            was_mapped: true,
            row,
        }),
        None if include_unmapped => Some(MappedRow {
            canonical_name: item.to_string(),
            was_mapped: false,
            row,
        }),
        None => None,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MappingStats {
    pub mapped: usize,
    pub passed_through: usize,
    pub dropped_unmapped: usize,
    pub dropped_blank: usize,
    /// Distinct item names with no mapping entry, whether passed through or dropped.
    pub unmapped_names: BTreeSet<String>,
}

impl MappingStats {
    pub fn total(&self) -> usize {
        self.mapped + self.passed_through + self.dropped_unmapped + self.dropped_blank
    }
}

/// Runs [`map_row`] over a row sequence, preserving order and counting outcomes.
pub struct AccountMapper<'a> {
    account_map: &'a AccountMap,
    item_col: usize,
    include_unmapped: bool,
}

impl<'a> AccountMapper<'a> {
    pub fn new(account_map: &'a AccountMap, item_col: usize, include_unmapped: bool) -> Self {
        Self {
            account_map,
            item_col,
            include_unmapped,
        }
    }

    pub fn map_rows(&self, rows: Vec<RawRow>) -> (Vec<MappedRow>, MappingStats) {
        let mut stats = MappingStats::default();
        let mut mapped_rows = Vec::with_capacity(rows.len());

        for row in rows {
            let item = row.cell(self.item_col).trim().to_string();
            let index = row.index;

            match map_row(row, self.item_col, self.account_map, self.include_unmapped) {
                Some(mapped) if mapped.was_mapped => {
                    stats.mapped += 1;
                    mapped_rows.push(mapped);
                }
                Some(mapped) => {
                    stats.passed_through += 1;
                    stats.unmapped_names.insert(item);
                    mapped_rows.push(mapped);
                }
                None if item.is_empty() => {
                    debug!("Row {} has a blank item name; dropped", index);
                    stats.dropped_blank += 1;
                }
                None => {
                    debug!("Row {} ('{}') has no mapping entry; dropped", index, item);
                    stats.dropped_unmapped += 1;
                    stats.unmapped_names.insert(item);
                }
            }
        }

        (mapped_rows, stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grouped(entries: &[(&str, &[(&str, &str)])]) -> BTreeMap<String, BTreeMap<String, String>> {
        entries
            .iter()
            .map(|(category, names)| {
                (
                    category.to_string(),
                    names
                        .iter()
                        .map(|(raw, canonical)| (raw.to_string(), canonical.to_string()))
                        .collect(),
                )
            })
            .collect()
    }

    fn row(index: usize, item: &str, value: &str) -> RawRow {
        RawRow::new(index, vec![item.to_string(), value.to_string()])
    }

    #[test]
    fn test_mapped_name_is_replaced() {
        let map = AccountMap::build(&grouped(&[(
            "流動負債",
            &[("支払手形", "支払手形、設備関係支手（...）")],
        )]))
        .unwrap();

        let mapped = map_row(row(0, "支払手形", "1,000"), 0, &map, true).unwrap();
        assert_eq!(mapped.canonical_name, "支払手形、設備関係支手（...）");
        assert!(mapped.was_mapped);
        assert_eq!(mapped.row.cell(1), "1,000");
    }

    #[test]
    fn test_lookup_ignores_category_and_surrounding_whitespace() {
        let map = AccountMap::build(&grouped(&[
            ("資産", &[("現金", "現金及び預金")]),
            ("負債", &[("買掛金", "支払手形及び買掛金")]),
        ]))
        .unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.lookup(" 買掛金\t"), Some("支払手形及び買掛金"));
        assert_eq!(map.lookup("買掛"), None);
    }

    #[test]
    fn test_unmapped_policy() {
        let map = AccountMap::default();
        let kept = map_row(row(0, "雑収入", "10"), 0, &map, true).unwrap();
        assert_eq!(kept.canonical_name, "雑収入");
        assert!(!kept.was_mapped);

        assert!(map_row(row(0, "雑収入", "10"), 0, &map, false).is_none());
    }

    #[test]
    fn test_blank_item_is_always_dropped() {
        let map = AccountMap::default();
        assert!(map_row(row(0, "  ", "10"), 0, &map, true).is_none());
        assert!(map_row(row(0, "", "10"), 0, &map, false).is_none());
    }

    #[test]
    fn test_conflicting_targets_are_rejected() {
        let err = AccountMap::build(&grouped(&[
            ("資産", &[("預金", "現金及び預金")]),
            ("その他", &[("預金", "銀行業における預金")]),
        ]))
        .unwrap_err();
        assert!(matches!(err, MapperError::ConfigError { .. }));

        let same = AccountMap::build(&grouped(&[
            ("資産", &[("預金", "現金及び預金")]),
            ("その他", &[("預金", "現金及び預金")]),
        ]))
        .unwrap();
        assert_eq!(same.len(), 1);
    }

    #[test]
    fn test_blank_raw_name_is_rejected() {
        assert!(AccountMap::build(&grouped(&[("資産", &[(" ", "現金")])])).is_err());
    }

    #[test]
    fn test_mapper_preserves_order_and_counts() {
        let map = AccountMap::build(&grouped(&[("資産", &[("現金", "現金及び預金")])])).unwrap();
        let rows = vec![
            row(0, "未知", "1"),
            row(1, "現金", "2"),
            row(2, "", "3"),
            row(3, "未知", "4"),
            row(4, "現金", "5"),
        ];

        let (mapped, stats) = AccountMapper::new(&map, 0, false).map_rows(rows.clone());
        assert_eq!(mapped.iter().map(|m| m.row.index).collect::<Vec<_>>(), vec![1, 4]);
        assert_eq!(stats.mapped, 2);
        assert_eq!(stats.dropped_unmapped, 2);
        assert_eq!(stats.dropped_blank, 1);
        assert_eq!(stats.total(), 5);
        assert_eq!(stats.unmapped_names.iter().collect::<Vec<_>>(), vec!["未知"]);

        let (kept, stats) = AccountMapper::new(&map, 0, true).map_rows(rows);
        assert_eq!(kept.iter().map(|m| m.row.index).collect::<Vec<_>>(), vec![0, 1, 3, 4]);
        assert_eq!(stats.passed_through, 2);
        assert_eq!(stats.dropped_unmapped, 0);
    }
}
