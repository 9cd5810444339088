//! Core data model: extracted content items, chunks and findings.
//!
//! Items and chunks live for one run only. Findings survive until the
//! annotated copy and the structured result have been produced.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// What an extracted item holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ItemKind {
    /// A table detected on a PDF page; payload is the cell matrix.
    Table,
    /// The full plain text of a PDF page; payload is a string (possibly empty).
    Text,
    /// A whole spreadsheet sheet; payload is the row/column cell matrix.
    RowGroup,
}

/// Where an item came from in the source document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// 1-indexed PDF page.
    Page(u32),
    /// Spreadsheet sheet with its 1-indexed position in the workbook.
    Sheet { index: u32, name: String },
}

impl Origin {
    /// The page number a reviewer should report for this origin.
    pub fn page_number(&self) -> u32 {
        match self {
            Origin::Page(p) => *p,
            Origin::Sheet { index, .. } => *index,
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Page(p) => write!(f, "page {p}"),
            Origin::Sheet { index, name } => write!(f, "sheet {index} ({name})"),
        }
    }
}

/// One unit of extracted content. Immutable once extracted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub kind: ItemKind,
    pub origin: Origin,
    pub payload: Value,
}

impl ContentItem {
    pub fn text(page: u32, text: impl Into<String>) -> Self {
        Self {
            kind: ItemKind::Text,
            origin: Origin::Page(page),
            payload: Value::String(text.into()),
        }
    }

    pub fn table(page: u32, cells: Vec<Vec<String>>) -> Self {
        Self {
            kind: ItemKind::Table,
            origin: Origin::Page(page),
            payload: matrix_value(cells.into_iter().map(|row| row.into_iter().map(Value::String))),
        }
    }

    pub fn sheet(index: u32, name: impl Into<String>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            kind: ItemKind::RowGroup,
            origin: Origin::Sheet {
                index,
                name: name.into(),
            },
            payload: matrix_value(rows),
        }
    }
}

fn matrix_value<R, C>(rows: R) -> Value
where
    R: IntoIterator<Item = C>,
    C: IntoIterator<Item = Value>,
{
    Value::Array(
        rows.into_iter()
            .map(|row| Value::Array(row.into_iter().collect()))
            .collect(),
    )
}

/// An ordered, non-empty run of items sent to the reviewer as one unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk {
    /// 0-indexed position in the chunk sequence.
    pub index: usize,
    pub items: Vec<ContentItem>,
    /// Sum of the items' canonical token counts.
    pub token_count: usize,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// A single item that alone exceeds the budget.
    pub fn is_oversized(&self, budget: usize) -> bool {
        self.items.len() == 1 && self.token_count > budget
    }
}

/// Optional severity a reviewer may attach to a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" | "minor" | "info" => Some(Severity::Low),
            "medium" | "moderate" => Some(Severity::Medium),
            "high" | "major" => Some(Severity::High),
            "critical" | "severe" => Some(Severity::Critical),
            _ => None,
        }
    }
}

/// A reported deviation, tied to a 1-indexed source page.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Finding {
    pub page: u32,
    pub issue: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
}

impl Finding {
    pub fn new(page: u32, issue: impl Into<String>) -> Self {
        Self {
            page,
            issue: issue.into(),
            severity: None,
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }
}
