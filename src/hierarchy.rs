use crate::error::{MapperError, Result};
use crate::schema::{BalanceSheetConfig, StructureNode};
use log::debug;
use std::collections::hash_map::Entry;
use std::collections::HashMap;

pub type LeafId = usize;

/// A balance-sheet position: section, category, optional sub-category, and the label itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HierarchyLeaf {
    pub major: String,
    pub middle: String,
    pub minor: String,
    pub label: String,
}

impl HierarchyLeaf {
    /// 1 for a leaf directly under a section, 2 under a category, 3 under a sub-category.
    pub fn level(&self) -> usize {
        if !self.minor.is_empty() {
            3
        } else if !self.middle.is_empty() {
            2
        } else {
            1
        }
    }

    pub fn ancestors(&self) -> Vec<&str> {
        [&self.major, &self.middle, &self.minor]
            .into_iter()
            .filter(|name| !name.is_empty())
            .map(String::as_str)
            .collect()
    }

    pub fn path(&self) -> String {
        let mut segments = self.ancestors();
        segments.push(&self.label);
        segments.join("/")
    }
}

/// The structure flattened in declaration order, for template rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateLine {
    Section(String),
    Category(String),
    SubCategory(String),
    Leaf(LeafId),
    SectionBreak,
}

#[derive(Debug, Clone)]
pub struct BalanceSheetLayout {
    leaves: Vec<HierarchyLeaf>,
    template: Vec<TemplateLine>,
    owner_by_account: HashMap<String, LeafId>,
}

impl BalanceSheetLayout {
    pub fn build(config: &BalanceSheetConfig) -> Result<Self> {
        let mut layout = Self {
            leaves: Vec::new(),
            template: Vec::new(),
            owner_by_account: HashMap::new(),
        };
        layout.flatten_structure(&config.structure)?;

        for (key, names) in &config.account_mapping {
            let leaf_id = layout.resolve_key(key)?;
            for name in names.iter() {
                layout.claim(key, name.trim(), leaf_id)?;
            }
        }

        debug!(
            "Balance sheet layout: {} leaves, {} canonical accounts classified",
            layout.leaves.len(),
            layout.owner_by_account.len()
        );
        Ok(layout)
    }

    fn flatten_structure(&mut self, structure: &[StructureNode]) -> Result<()> {
        for (position, section) in structure.iter().enumerate() {
            let StructureNode::Group { name, children } = section else {
                return Err(MapperError::config(
                    "balance_sheet.structure",
                    format!("top-level entry '{}' must be a section with children", section.name()),
                ));
            };
            if position > 0 {
                self.template.push(TemplateLine::SectionBreak);
            }
            self.template.push(TemplateLine::Section(checked_name(name)?));

            for child in children {
                match child {
                    StructureNode::Leaf(label) => self.push_leaf(name, "", "", label)?,
                    StructureNode::Group { name: middle, children } => {
                        self.template.push(TemplateLine::Category(checked_name(middle)?));
                        for grandchild in children {
                            match grandchild {
                                StructureNode::Leaf(label) => self.push_leaf(name, middle, "", label)?,
                                StructureNode::Group { name: minor, children } => {
                                    self.template.push(TemplateLine::SubCategory(checked_name(minor)?));
                                    for leaf in children {
                                        let StructureNode::Leaf(label) = leaf else {
                                            return Err(MapperError::config(
                                                "balance_sheet.structure",
                                                format!(
                                                    "'{}' is nested deeper than section/category/sub-category",
                                                    leaf.name()
                                                ),
                                            ));
                                        };
                                        self.push_leaf(name, middle, minor, label)?;
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn push_leaf(&mut self, major: &str, middle: &str, minor: &str, label: &str) -> Result<()> {
        let leaf = HierarchyLeaf {
            major: major.trim().to_string(),
            middle: middle.trim().to_string(),
            minor: minor.trim().to_string(),
            label: checked_name(label)?,
        };
        if self.leaves.contains(&leaf) {
            return Err(MapperError::config(
                "balance_sheet.structure",
                format!("'{}' is declared twice", leaf.path()),
            ));
        }
        self.template.push(TemplateLine::Leaf(self.leaves.len()));
        self.leaves.push(leaf);
        Ok(())
    }

    /// Resolves a mapping key: a leaf label, or a `/`-separated path suffix ending in the label.
    pub fn resolve_key(&self, key: &str) -> Result<LeafId> {
        let mut segments: Vec<&str> = key.split('/').map(str::trim).collect();
        let label = segments.pop().unwrap_or_default();
        let config_key = format!("balance_sheet.account_mapping.{}", key);

        let matches: Vec<LeafId> = self
            .leaves
            .iter()
            .enumerate()
            .filter(|(_, leaf)| leaf.label == label && leaf.ancestors().ends_with(&segments))
            .map(|(id, _)| id)
            .collect();

        match matches.as_slice() {
            [id] => Ok(*id),
            [] => Err(MapperError::config(
                config_key,
                format!("no balance-sheet leaf matches '{}'", key),
            )),
            ids => Err(MapperError::config(
                config_key,
                format!(
                    "'{}' is ambiguous; qualify it with its category, one of: {}",
                    key,
                    ids.iter()
                        .map(|id| self.leaves[*id].path())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            )),
        }
    }

    fn claim(&mut self, key: &str, account: &str, leaf_id: LeafId) -> Result<()> {
        if account.is_empty() {
            return Err(MapperError::config(
                format!("balance_sheet.account_mapping.{}", key),
                "account names must not be blank",
            ));
        }
        match self.owner_by_account.entry(account.to_string()) {
            Entry::Vacant(entry) => {
                entry.insert(leaf_id);
                Ok(())
            }
            Entry::Occupied(entry) if *entry.get() == leaf_id => Ok(()),
            Entry::Occupied(entry) => Err(MapperError::config(
                format!("balance_sheet.account_mapping.{}", key),
                format!(
                    "account '{}' is claimed by both '{}' and '{}'",
                    account,
                    self.leaves[*entry.get()].path(),
                    self.leaves[leaf_id].path()
                ),
            )),
        }
    }

    /// Reverse lookup: the leaf a canonical account name rolls up into.
    pub fn classify(&self, canonical_name: &str) -> Option<LeafId> {
        self.owner_by_account.get(canonical_name).copied()
    }

    pub fn leaf(&self, id: LeafId) -> &HierarchyLeaf {
        &self.leaves[id]
    }

    pub fn leaves(&self) -> &[HierarchyLeaf] {
        &self.leaves
    }

    pub fn template(&self) -> &[TemplateLine] {
        &self.template
    }
}

fn checked_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(MapperError::config(
            "balance_sheet.structure",
            "structure names must not be blank",
        ));
    }
    Ok(name.to_string())
}

fn leaves(labels: &[&str]) -> Vec<StructureNode> {
    labels.iter().map(|label| StructureNode::leaf(label)).collect()
}

/// Consolidated balance sheet layout used when the config does not define one.
pub fn default_structure() -> Vec<StructureNode> {
    use StructureNode as N;

    vec![
        N::group(
            "資産の部",
            vec![
                N::group(
                    "流動資産",
                    leaves(&[
                        "現金及び預金",
                        "コールローン",
                        "受取手形及び売掛金",
                        "有価証券",
                        "棚卸資産",
                        "営業貸付金",
                        "銀行業における貸出金",
                        "その他",
                        "貸倒引当金",
                        "流動資産合計",
                    ]),
                ),
                N::group(
                    "固定資産",
                    vec![
                        N::group(
                            "有形固定資産",
                            leaves(&[
                                "建物及び構築物（純額）",
                                "工具、器具及び備品（純額）",
                                "土地",
                                "リース資産（純額）",
                                "建設仮勘定",
                                "その他（純額）",
                                "有形固定資産合計",
                            ]),
                        ),
                        N::group(
                            "無形固定資産",
                            leaves(&["のれん", "ソフトウエア", "リース資産", "その他", "無形固定資産合計"]),
                        ),
                        N::group(
                            "投資その他の資産",
                            leaves(&[
                                "投資有価証券",
                                "退職給付に係る資産",
                                "繰延税金資産",
                                "差入保証金",
                                "店舗賃借仮勘定",
                                "その他",
                                "貸倒引当金",
                                "投資その他の資産合計",
                            ]),
                        ),
                    ],
                ),
                N::leaf("固定資産合計"),
                N::leaf("資産合計"),
            ],
        ),
        N::group(
            "負債の部",
            vec![
                N::group(
                    "流動負債",
                    leaves(&[
                        "支払手形及び買掛金",
                        "銀行業における預金",
                        "短期借入金",
                        "1年内返済予定の長期借入金",
                        "1年内償還予定の社債",
                        "コマーシャル・ペーパー",
                        "リース債務",
                        "未払法人税等",
                        "契約負債",
                        "賞与引当金",
                        "店舗閉鎖損失引当金",
                        "ポイント引当金",
                        "設備関係支払手形",
                        "その他",
                        "流動負債合計",
                    ]),
                ),
                N::group(
                    "固定負債",
                    leaves(&[
                        "社債",
                        "長期借入金",
                        "リース債務",
                        "繰延税金負債",
                        "役員退職慰労引当金",
                        "店舗閉鎖損失引当金",
                        "偶発損失引当金",
                        "利息返還損失引当金",
                        "退職給付に係る負債",
                        "資産除去債務",
                        "長期預り保証金",
                        "保険契約準備金",
                        "その他",
                        "固定負債合計",
                    ]),
                ),
                N::leaf("負債合計"),
            ],
        ),
        N::group(
            "純資産の部",
            vec![
                N::group(
                    "株主資本",
                    leaves(&["資本金", "資本剰余金", "利益剰余金", "自己株式", "株主資本合計"]),
                ),
                N::group(
                    "その他の包括利益累計額",
                    leaves(&[
                        "その他有価証券評価差額金",
                        "繰延ヘッジ損益",
                        "為替換算調整勘定",
                        "退職給付に係る調整累計額",
                        "その他の包括利益累計額合計",
                    ]),
                ),
                N::leaf("新株予約権"),
                N::leaf("非支配株主持分"),
                N::leaf("純資産合計"),
                N::leaf("負債純資産合計"),
            ],
        ),
    ]
}
