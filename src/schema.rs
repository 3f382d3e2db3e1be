use crate::encoding::TextEncoding;
use crate::error::{MapperError, Result};
use crate::hierarchy::default_structure;
use log::LevelFilter;
use schemars::JsonSchema;
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum InputFormat {
    #[schemars(description = "Balance sheet export with one account item per row (科目/金額 style headers)")]
    BalanceSeat,

    #[schemars(
        description = "EDINET XBRL-to-CSV export (要素ID, 項目名, コンテキストID, 相対年度, ..., 値) with one row per element and context"
    )]
    Jpcrp,
}

impl Default for InputFormat {
    fn default() -> Self {
        Self::BalanceSeat
    }
}

impl fmt::Display for InputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BalanceSeat => write!(f, "balance_seat"),
            Self::Jpcrp => write!(f, "jpcrp"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[schemars(description = "Same columns as the input, with item names replaced by canonical names")]
    Standard,

    #[schemars(description = "Fixed 25-column balance-sheet layout without a header row")]
    Bs,
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::Standard
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standard => write!(f, "standard"),
            Self::Bs => write!(f, "bs"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct InputConfig {
    #[schemars(description = "Text encoding label of the input file (e.g. 'utf-16', 'utf-8', 'shift_jis')")]
    pub file_encoding: String,

    #[schemars(description = "Single-character field delimiter. Defaults to a tab.")]
    pub delimiter: String,

    #[schemars(description = "1-based line number of the header row. Lines before it are skipped.")]
    pub header_row: usize,

    #[schemars(description = "Layout of the input file, used to discover the item and value columns")]
    pub format: InputFormat,

    #[schemars(
        description = "jpcrp only: keep rows whose period/context value equals this marker (e.g. 'CurrentYearInstant')"
    )]
    pub current_period: Option<String>,

    #[schemars(
        description = "jpcrp only: when no current_period is given, keep rows whose context id mentions 'Current' or whose relative year is 当期/当期末"
    )]
    pub infer_current_period: bool,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            file_encoding: "utf-8".to_string(),
            delimiter: "\t".to_string(),
            header_row: 1,
            format: InputFormat::default(),
            current_period: None,
            infer_current_period: false,
        }
    }
}

impl InputConfig {
    pub fn delimiter_byte(&self) -> Result<u8> {
        delimiter_byte("input.delimiter", &self.delimiter)
    }

    pub fn encoding(&self) -> Result<TextEncoding> {
        TextEncoding::for_label(&self.file_encoding)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct OutputConfig {
    #[schemars(description = "Text encoding label of the output file")]
    pub file_encoding: String,

    #[schemars(description = "Single-character field delimiter. Defaults to a comma.")]
    pub delimiter: String,

    #[schemars(
        description = "Keep rows whose item name has no mapping entry (unchanged). When false they are dropped."
    )]
    pub include_unmapped: bool,

    #[schemars(description = "Output layout. Can be overridden on the command line.")]
    pub format: OutputFormat,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            file_encoding: "utf-8".to_string(),
            delimiter: ",".to_string(),
            include_unmapped: true,
            format: OutputFormat::default(),
        }
    }
}

impl OutputConfig {
    pub fn delimiter_byte(&self) -> Result<u8> {
        delimiter_byte("output.delimiter", &self.delimiter)
    }

    pub fn encoding(&self) -> Result<TextEncoding> {
        TextEncoding::for_label(&self.file_encoding)
    }
}

/// One canonical name or a list of them, as written in `balance_sheet.account_mapping`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(untagged)]
pub enum AccountNames {
    One(String),
    Many(Vec<String>),
}

impl AccountNames {
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        let names: &[String] = match self {
            Self::One(name) => std::slice::from_ref(name),
            Self::Many(names) => names.as_slice(),
        };
        names.iter().map(String::as_str)
    }
}

/// A node of the balance-sheet structure: either a leaf label or a named group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(untagged)]
pub enum StructureNode {
    Leaf(String),
    Group {
        name: String,
        children: Vec<StructureNode>,
    },
}

impl StructureNode {
    pub fn leaf(label: &str) -> Self {
        Self::Leaf(label.to_string())
    }

    pub fn group(name: &str, children: Vec<StructureNode>) -> Self {
        Self::Group {
            name: name.to_string(),
            children,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Leaf(label) => label,
            Self::Group { name, .. } => name,
        }
    }
}

/// The structure as a JSON object: `{"資産の部": {"流動資産": [...], "固定資産": {...}, "資産合計": null}}`.
/// Keys keep their document order. A list holds leaf labels, an object nests one level
/// deeper and `null` marks a leaf (usually a total) at that position.
struct StructureObject(Vec<StructureNode>);

#[derive(Deserialize)]
#[serde(untagged)]
enum ObjectChild {
    Leaf(()),
    Leaves(Vec<String>),
    Nested(StructureObject),
}

impl<'de> Deserialize<'de> for StructureObject {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct StructureObjectVisitor;

        impl<'de> Visitor<'de> for StructureObjectVisitor {
            type Value = StructureObject;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an object of structure groups")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Self::Value, A::Error> {
                let mut nodes = Vec::new();
                while let Some((name, child)) = map.next_entry::<String, ObjectChild>()? {
                    nodes.push(match child {
                        ObjectChild::Leaf(()) => StructureNode::Leaf(name),
                        ObjectChild::Leaves(labels) => StructureNode::Group {
                            name,
                            children: labels.into_iter().map(StructureNode::Leaf).collect(),
                        },
                        ObjectChild::Nested(StructureObject(children)) => StructureNode::Group { name, children },
                    });
                }
                Ok(StructureObject(nodes))
            }
        }

        deserializer.deserialize_map(StructureObjectVisitor)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StructureInput {
    List(Vec<StructureNode>),
    Object(StructureObject),
}

fn deserialize_structure<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Vec<StructureNode>, D::Error> {
    Ok(match StructureInput::deserialize(deserializer)? {
        StructureInput::List(nodes) => nodes,
        StructureInput::Object(StructureObject(nodes)) => nodes,
    })
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SheetLayout {
    #[schemars(description = "One row per hierarchy leaf that received at least one amount, in first-seen order")]
    Leaves,

    #[schemars(description = "The full structure with section and category header rows, amounts filled where present")]
    Template,
}

impl Default for SheetLayout {
    fn default() -> Self {
        Self::Leaves
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum NegativeStyle {
    #[schemars(description = "-1,000")]
    Minus,

    #[schemars(description = "△1,000")]
    Triangle,
}

impl Default for NegativeStyle {
    fn default() -> Self {
        Self::Minus
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct BalanceSheetConfig {
    #[schemars(
        description = "Leaf label (or 'category/label' path suffix when the label repeats) -> canonical account names rolling up into it"
    )]
    pub account_mapping: BTreeMap<String, AccountNames>,

    #[schemars(
        description = "Ordered section -> category -> (sub-category) -> leaf tree. Also accepted as a nested object whose lists hold leaves and whose null values are leaves."
    )]
    #[serde(deserialize_with = "deserialize_structure")]
    pub structure: Vec<StructureNode>,

    pub layout: SheetLayout,

    pub negative_style: NegativeStyle,
}

impl Default for BalanceSheetConfig {
    fn default() -> Self {
        Self {
            account_mapping: BTreeMap::new(),
            structure: default_structure(),
            layout: SheetLayout::default(),
            negative_style: NegativeStyle::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct LoggingConfig {
    #[schemars(description = "DEBUG, INFO, WARNING or ERROR. --verbose forces DEBUG.")]
    pub level: String,

    pub show_mapping_stats: bool,

    pub show_unmapped_items: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            show_mapping_stats: true,
            show_unmapped_items: true,
        }
    }
}

impl LoggingConfig {
    pub fn level_filter(&self) -> Result<LevelFilter> {
        match self.level.trim().to_ascii_uppercase().as_str() {
            "TRACE" => Ok(LevelFilter::Trace),
            "DEBUG" => Ok(LevelFilter::Debug),
            "INFO" => Ok(LevelFilter::Info),
            "WARN" | "WARNING" => Ok(LevelFilter::Warn),
            "ERROR" | "CRITICAL" => Ok(LevelFilter::Error),
            "OFF" => Ok(LevelFilter::Off),
            other => Err(MapperError::config(
                "logging.level",
                format!("unknown log level '{}'", other),
            )),
        }
    }
}

/// Extra columns whose values are mapped in `standard` output, matched by header.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ProcessingColumns {
    #[schemars(
        description = "Case-insensitive regular expressions; a header matching any of them is mapped. Empty means every column."
    )]
    pub target_columns: Vec<String>,

    #[schemars(description = "Case-insensitive regular expressions; a matching header is never mapped")]
    pub exclude_columns: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct MapperConfig {
    pub input: InputConfig,

    pub output: OutputConfig,

    #[schemars(
        description = "Category -> (raw account name -> canonical account name). Categories only group entries; lookup is by raw name across all of them."
    )]
    pub account_mapping: BTreeMap<String, BTreeMap<String, String>>,

    #[schemars(
        description = "standard output only: further columns to map besides the item-name column. Omitted means only the item-name column."
    )]
    pub processing_columns: Option<ProcessingColumns>,

    pub balance_sheet: BalanceSheetConfig,

    pub logging: LoggingConfig,
}

impl MapperConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|source| MapperError::FileError {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Checks the settings that can be validated without looking at the mapping tables.
    pub fn validate(&self) -> Result<()> {
        self.input.delimiter_byte()?;
        self.output.delimiter_byte()?;
        self.input.encoding().map_err(|e| encoding_config_error("input.file_encoding", e))?;
        self.output.encoding().map_err(|e| encoding_config_error("output.file_encoding", e))?;

        if self.input.header_row == 0 {
            return Err(MapperError::config(
                "input.header_row",
                "header_row is 1-based and must be at least 1",
            ));
        }

        self.logging.level_filter()?;
        Ok(())
    }

    pub fn mapping_entry_count(&self) -> usize {
        self.account_mapping.values().map(BTreeMap::len).sum()
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(MapperConfig)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}

fn encoding_config_error(key: &str, err: MapperError) -> MapperError {
    MapperError::config(key, err.to_string())
}

fn delimiter_byte(key: &str, delimiter: &str) -> Result<u8> {
    let mut chars = delimiter.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii() => Ok(c as u8),
        _ => Err(MapperError::config(
            key,
            format!(
                "delimiter must be a single ASCII character, got {:?}",
                delimiter
            ),
        )),
    }
}
