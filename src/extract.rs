use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::fmt;

/// CSS selectors identifying the interesting parts of the exported report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorMarkers {
    /// Paragraph holding the examiner name, e.g. `Jan Jansen (jjansen)`.
    pub name_block: String,
    /// Course code leaf inside the table following a name block.
    pub course_cell: String,
}

impl Default for ExtractorMarkers {
    fn default() -> Self {
        Self {
            name_block: "p.c51".to_string(),
            course_cell: "td.c62 span.c64".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExaminerRecord {
    pub employee: String,
    pub course: String,
}

impl ExaminerRecord {
    pub fn new(employee: impl Into<String>, course: impl Into<String>) -> Self {
        Self {
            employee: employee.into(),
            course: course.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid selector {selector:?}: {message}")]
pub struct SelectorError {
    pub selector: String,
    pub message: String,
}

#[derive(Debug, PartialEq, Eq)]
enum BlockSkip {
    Empty,
    NotParenthesized(String),
    NoTable(String),
}

impl fmt::Display for BlockSkip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockSkip::Empty => write!(f, "name block has no text"),
            BlockSkip::NotParenthesized(tok) => {
                write!(f, "trailing token {tok:?} is not a (user id)")
            }
            BlockSkip::NoTable(emp) => write!(f, "no table follows the block for {emp}"),
        }
    }
}

pub struct Extractor {
    name_block: Selector,
    course_cell: Selector,
}

fn parse_selector(sel: &str) -> Result<Selector, SelectorError> {
    Selector::parse(sel).map_err(|e| SelectorError {
        selector: sel.to_string(),
        message: format!("{e:?}"),
    })
}

impl Extractor {
    pub fn new(markers: &ExtractorMarkers) -> Result<Self, SelectorError> {
        Ok(Self {
            name_block: parse_selector(&markers.name_block)?,
            course_cell: parse_selector(&markers.course_cell)?,
        })
    }

    /// Best-effort: a block that does not fit the expected shape is logged
    /// and skipped, never fatal for the rest of the document.
    pub fn extract(&self, html: &str) -> Vec<ExaminerRecord> {
        let doc = Html::parse_document(html);
        let mut out = Vec::new();
        for (i, block) in doc.select(&self.name_block).enumerate() {
            match self.extract_block(block) {
                Ok(rows) => out.extend(rows),
                Err(skip) => tracing::debug!(block = i, "skipped name block: {skip}"),
            }
        }
        tracing::info!(records = out.len(), "extracted examiner records");
        out
    }

    fn extract_block(&self, block: ElementRef<'_>) -> Result<Vec<ExaminerRecord>, BlockSkip> {
        let text: String = block.text().collect();
        let employee = employee_id(&text)?;
        let table = following_table(block).ok_or_else(|| BlockSkip::NoTable(employee.clone()))?;
        Ok(table
            .select(&self.course_cell)
            .map(|cell| cell.text().collect::<String>().trim().to_string())
            .map(|course| ExaminerRecord::new(employee.clone(), course))
            .collect())
    }
}

/// Extracts with the default markers.
pub fn extract(html: &str) -> Vec<ExaminerRecord> {
    match Extractor::new(&ExtractorMarkers::default()) {
        Ok(x) => x.extract(html),
        Err(e) => {
            tracing::error!(error = %e, "default markers rejected");
            Vec::new()
        }
    }
}

fn employee_id(text: &str) -> Result<String, BlockSkip> {
    let token = text.split_whitespace().last().ok_or(BlockSkip::Empty)?;
    let inner = token
        .strip_prefix('(')
        .and_then(|t| t.strip_suffix(')'))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| BlockSkip::NotParenthesized(token.to_string()))?;
    Ok(inner.to_string())
}

fn following_table(block: ElementRef<'_>) -> Option<ElementRef<'_>> {
    block
        .next_siblings()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name().eq_ignore_ascii_case("table"))
}
