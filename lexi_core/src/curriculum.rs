//! Curriculum reference data and import (Excel and CSV)

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use calamine::{open_workbook, Data, Reader, Xlsx};
use csv::ReaderBuilder;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{LexiError, LexiResult};

/// Expression categories, each with its own stage track per level
pub const EXPRESSION_CATEGORIES: [&str; 6] = [
    "daily_conversation",
    "business_english",
    "travel_phrases",
    "academic_english",
    "social_interaction",
    "professional_communication",
];

/// Category reported for vocabulary items and stages
pub const VOCABULARY_CATEGORY: &str = "vocabulary";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Beginner,
    Intermediate,
    Advanced,
}

impl Level {
    pub const ALL: [Level; 3] = [Level::Beginner, Level::Intermediate, Level::Advanced];

    pub fn as_str(self) -> &'static str {
        match self {
            Level::Beginner => "beginner",
            Level::Intermediate => "intermediate",
            Level::Advanced => "advanced",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = LexiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "beginner" | "초급" => Ok(Level::Beginner),
            "intermediate" | "중급" => Ok(Level::Intermediate),
            "advanced" | "고급" => Ok(Level::Advanced),
            other => Err(LexiError::InvalidValue(format!("unknown level '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Expression,
    Vocabulary,
}

impl ItemType {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemType::Expression => "expression",
            ItemType::Vocabulary => "vocabulary",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemType {
    type Err = LexiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "expression" | "expressions" => Ok(ItemType::Expression),
            "vocabulary" | "word" | "words" => Ok(ItemType::Vocabulary),
            other => Err(LexiError::InvalidValue(format!("unknown item type '{}'", other))),
        }
    }
}

/// One expression or vocabulary word the learner practises
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearningItem {
    pub id: String,
    pub english_text: String,
    pub korean_text: String,
    pub level: Level,
    /// Expression category; `None` for vocabulary
    pub category: Option<String>,
    pub item_type: ItemType,
    pub stage: u32,
}

impl LearningItem {
    pub fn category_or_default(&self) -> &str {
        match self.item_type {
            ItemType::Vocabulary => VOCABULARY_CATEGORY,
            ItemType::Expression => self.category.as_deref().unwrap_or(EXPRESSION_CATEGORIES[0]),
        }
    }
}

type StageIndex = (ItemType, Level, String, u32);

/// Static item table keyed by (type, level, category, stage)
#[derive(Debug, Clone, Default)]
pub struct Curriculum {
    stages: BTreeMap<StageIndex, Vec<LearningItem>>,
}

impl Curriculum {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_items(items: impl IntoIterator<Item = LearningItem>) -> Self {
        let mut curriculum = Self::new();
        for item in items {
            curriculum.insert(item);
        }
        curriculum
    }

    pub fn insert(&mut self, item: LearningItem) {
        let index = (
            item.item_type,
            item.level,
            item.category_or_default().to_string(),
            item.stage,
        );
        self.stages.entry(index).or_default().push(item);
    }

    /// Ordered items of one stage; vocabulary ignores `category`
    pub fn items_for_stage(
        &self,
        level: Level,
        category: &str,
        stage: u32,
        item_type: ItemType,
    ) -> &[LearningItem] {
        let category = match item_type {
            ItemType::Vocabulary => VOCABULARY_CATEGORY,
            ItemType::Expression => category,
        };
        self.stages
            .get(&(item_type, level, category.to_string(), stage))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn find(&self, item_type: ItemType, id: &str) -> Option<&LearningItem> {
        self.items().find(|item| item.item_type == item_type && item.id == id)
    }

    /// Case-insensitive substring match on the English or Korean text
    pub fn search(&self, query: &str) -> Vec<&LearningItem> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        self.items()
            .filter(|item| {
                item.english_text.to_lowercase().contains(&needle) || item.korean_text.contains(query.trim())
            })
            .collect()
    }

    pub fn items(&self) -> impl Iterator<Item = &LearningItem> {
        self.stages.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.stages.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

/// Load a curriculum file, picking the parser from the extension
pub fn parse_file(file_path: &Path) -> LexiResult<Curriculum> {
    let extension = file_path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    let curriculum = match extension.as_str() {
        "xlsx" | "xls" => parse_excel(file_path)?,
        "csv" => parse_csv(file_path)?,
        _ => return Err(LexiError::Import(format!("unsupported file format: .{}", extension))),
    };

    info!("Loaded {} curriculum items from {}", curriculum.len(), file_path.display());
    Ok(curriculum)
}

/// Column index mapping
#[derive(Debug, Default, Clone)]
struct ColumnMapping {
    english: usize,
    level: usize,
    stage: usize,
    id: Option<usize>,
    korean: Option<usize>,
    category: Option<usize>,
    item_type: Option<usize>,
}

/// Detect column indices from header names
fn detect_columns(headers: &[String]) -> LexiResult<ColumnMapping> {
    let mut english = None;
    let mut level = None;
    let mut stage = None;
    let mut mapping = ColumnMapping::default();

    for (i, header) in headers.iter().enumerate() {
        match header.trim().to_lowercase().as_str() {
            "english" | "english_text" | "expression" | "word" => english = Some(i),
            "level" => level = Some(i),
            "stage" => stage = Some(i),
            "id" => mapping.id = Some(i),
            "korean" | "korean_text" | "meaning" => mapping.korean = Some(i),
            "category" => mapping.category = Some(i),
            "type" | "item_type" => mapping.item_type = Some(i),
            _ => {}
        }
    }

    let missing = |name: &str| LexiError::Import(format!("missing required '{}' column in header", name));
    mapping.english = english.ok_or_else(|| missing("english"))?;
    mapping.level = level.ok_or_else(|| missing("level"))?;
    mapping.stage = stage.ok_or_else(|| missing("stage"))?;

    Ok(mapping)
}

/// Build items from header-mapped rows; error row numbers count the header as row 1
fn build_items<I>(rows: I, mapping: &ColumnMapping) -> LexiResult<Vec<LearningItem>>
where
    I: IntoIterator<Item = Vec<String>>,
{
    let mut items = Vec::new();
    let mut per_stage: BTreeMap<(ItemType, Level, u32), usize> = BTreeMap::new();

    for (offset, row) in rows.into_iter().enumerate() {
        let row_number = offset + 2;
        let cell = |i: usize| row.get(i).map(|s| s.trim()).unwrap_or("");
        let optional = |i: Option<usize>| i.map(cell).filter(|s| !s.is_empty());

        let english = cell(mapping.english);
        if english.is_empty() {
            debug!("Skipping row {} with empty english text", row_number);
            continue;
        }

        let level: Level = cell(mapping.level)
            .parse()
            .map_err(|e| LexiError::Import(format!("row {}: {}", row_number, e)))?;
        let stage: u32 = cell(mapping.stage)
            .parse()
            .ok()
            .filter(|s| *s > 0)
            .ok_or_else(|| LexiError::Import(format!("row {}: invalid stage '{}'", row_number, cell(mapping.stage))))?;
        let item_type = match optional(mapping.item_type) {
            Some(raw) => raw
                .parse()
                .map_err(|e| LexiError::Import(format!("row {}: {}", row_number, e)))?,
            None if optional(mapping.category).is_some() => ItemType::Expression,
            None => ItemType::Vocabulary,
        };

        let position = per_stage.entry((item_type, level, stage)).or_insert(0);
        *position += 1;
        let id = optional(mapping.id)
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}_{}_{}", level, stage, position));

        items.push(LearningItem {
            id,
            english_text: english.to_string(),
            korean_text: optional(mapping.korean).unwrap_or_default().to_string(),
            level,
            category: match item_type {
                ItemType::Expression => optional(mapping.category).map(str::to_string),
                ItemType::Vocabulary => None,
            },
            item_type,
            stage,
        });
    }

    Ok(items)
}

/// Parse the first sheet of an Excel workbook
pub fn parse_excel(file_path: &Path) -> LexiResult<Curriculum> {
    let mut workbook: Xlsx<_> = open_workbook(file_path)?;

    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| LexiError::Import("no sheets found in Excel file".to_string()))?;
    let range = workbook.worksheet_range(&sheet_name)?;

    let mut rows = range.rows().map(|row| row.iter().map(cell_to_string).collect::<Vec<_>>());
    let headers = rows
        .next()
        .ok_or_else(|| LexiError::Import("empty file - no header row".to_string()))?;
    let mapping = detect_columns(&headers)?;

    Ok(Curriculum::from_items(build_items(rows, &mapping)?))
}

/// Parse a CSV file with a header row
pub fn parse_csv(file_path: &Path) -> LexiResult<Curriculum> {
    let reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(file_path)?;
    parse_csv_reader(reader)
}

/// Parse CSV text already in memory
pub fn parse_csv_str(contents: &str) -> LexiResult<Curriculum> {
    let reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(contents.as_bytes());
    parse_csv_reader(reader)
}

fn parse_csv_reader<R: std::io::Read>(mut reader: csv::Reader<R>) -> LexiResult<Curriculum> {
    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let mapping = detect_columns(&headers)?;

    let rows = reader
        .records()
        .map(|record| record.map(|r| r.iter().map(str::to_string).collect::<Vec<_>>()))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Curriculum::from_items(build_items(rows, &mapping)?))
}

/// Excel stores stage numbers as floats; render whole floats without a fraction
fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) if f.fract() == 0.0 => format!("{}", *f as i64),
        Data::Empty | Data::Error(_) => String::new(),
        other => other.to_string(),
    }
}
