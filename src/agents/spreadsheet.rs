//! Spreadsheet agent
//!
//! Works on CSV sheets in the workspace: reading and setting cells by
//! spreadsheet-style references ("B2"), and summing columns. Sheets load
//! fully into memory; these are small voice-managed tables, not datasets.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::agents::Agent;
use crate::session::TurnId;
use crate::{Error, Result};

const KEYWORDS: &[&str] = &["spreadsheet", "sheet", "cell", "column", "row", "csv", "table"];

/// Zero-based cell reference parsed from "B2" style text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CellRef {
    row: usize,
    col: usize,
}

/// Spreadsheet operation parsed from a request
#[derive(Debug, PartialEq)]
enum SheetOp {
    ReadCell { sheet: String, cell: CellRef },
    SetCell { sheet: String, cell: CellRef, value: String },
    SumColumn { sheet: String, col: usize },
    RowCount { sheet: String },
}

/// Agent for CSV sheet operations
pub struct SpreadsheetAgent {
    workspace: PathBuf,
}

impl SpreadsheetAgent {
    /// Create an agent rooted at `workspace`
    #[must_use]
    pub fn new(workspace: PathBuf) -> Self {
        Self { workspace }
    }

    fn sheet_path(&self, sheet: &str) -> Result<PathBuf> {
        let name = if Path::new(sheet).extension().is_some() {
            sheet.to_string()
        } else {
            format!("{sheet}.csv")
        };
        if name.contains("..") || name.contains('/') {
            return Err(Error::Agent(format!("invalid sheet name: {sheet}")));
        }
        Ok(self.workspace.join(name))
    }

    async fn load(&self, sheet: &str) -> Result<Vec<Vec<String>>> {
        let path = self.sheet_path(sheet)?;
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| Error::Agent(format!("cannot open sheet {sheet}: {e}")))?;

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(bytes.as_slice());

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect());
        }
        Ok(rows)
    }

    async fn store(&self, sheet: &str, rows: &[Vec<String>]) -> Result<()> {
        let path = self.sheet_path(sheet)?;
        let mut writer = csv::WriterBuilder::new()
            .flexible(true)
            .from_writer(Vec::new());

        // Short rows are padded to the sheet's width; a fully empty row
        // would serialize as a blank line, which readers skip
        let width = rows.iter().map(Vec::len).max().unwrap_or(0).max(1);
        let mut padded = Vec::with_capacity(width);
        for row in rows {
            padded.clear();
            padded.extend(row.iter().map(String::as_str));
            padded.resize(width, "");
            writer.write_record(&padded)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| Error::Agent(format!("cannot serialize sheet {sheet}: {e}")))?;
        tokio::fs::write(&path, bytes).await?;
        Ok(())
    }

    async fn read_cell(&self, sheet: &str, cell: CellRef) -> Result<String> {
        let rows = self.load(sheet).await?;
        let value = rows
            .get(cell.row)
            .and_then(|r| r.get(cell.col))
            .cloned()
            .unwrap_or_default();

        if value.is_empty() {
            Ok(format!("{} in {sheet} is empty.", format_cell(cell)))
        } else {
            Ok(format!("{} in {sheet} is {value}.", format_cell(cell)))
        }
    }

    async fn set_cell(&self, sheet: &str, cell: CellRef, value: &str) -> Result<String> {
        let mut rows = self.load(sheet).await.unwrap_or_default();

        while rows.len() <= cell.row {
            rows.push(Vec::new());
        }
        let row = &mut rows[cell.row];
        while row.len() <= cell.col {
            row.push(String::new());
        }
        row[cell.col] = value.to_string();

        self.store(sheet, &rows).await?;
        Ok(format!("Set {} in {sheet} to {value}.", format_cell(cell)))
    }

    async fn sum_column(&self, sheet: &str, col: usize) -> Result<String> {
        let rows = self.load(sheet).await?;
        let mut sum = 0.0_f64;
        let mut counted = 0usize;
        for row in &rows {
            if let Some(value) = row.get(col)
                && let Ok(n) = value.trim().parse::<f64>()
            {
                sum += n;
                counted += 1;
            }
        }

        if counted == 0 {
            Ok(format!(
                "Column {} in {sheet} has no numeric values.",
                column_name(col)
            ))
        } else {
            Ok(format!(
                "Column {} in {sheet} sums to {sum}.",
                column_name(col)
            ))
        }
    }

    async fn row_count(&self, sheet: &str) -> Result<String> {
        let rows = self.load(sheet).await?;
        Ok(format!("{sheet} has {} rows.", rows.len()))
    }
}

/// Parse "B2" into a zero-based reference
fn parse_cell_ref(token: &str) -> Option<CellRef> {
    let token = token.trim_matches(|c: char| !c.is_alphanumeric());
    let letters: String = token.chars().take_while(char::is_ascii_alphabetic).collect();
    let digits: String = token.chars().skip(letters.len()).collect();

    if letters.is_empty() || letters.len() > 2 || digits.is_empty() {
        return None;
    }
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let mut col = 0usize;
    for c in letters.to_ascii_uppercase().chars() {
        col = col * 26 + (c as usize - 'A' as usize + 1);
    }
    let row: usize = digits.parse().ok()?;
    if row == 0 {
        return None;
    }

    Some(CellRef {
        row: row - 1,
        col: col - 1,
    })
}

/// Render a zero-based reference back to "B2" form
fn format_cell(cell: CellRef) -> String {
    format!("cell {}{}", column_name(cell.col), cell.row + 1)
}

fn column_name(col: usize) -> String {
    let mut n = col + 1;
    let mut name = String::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        #[allow(clippy::cast_possible_truncation)]
        name.insert(0, (b'A' + rem as u8) as char);
        n = (n - 1) / 26;
    }
    name
}

/// Find the sheet name in a request: a csv token, or the word after
/// "sheet"/"spreadsheet"/"in"
fn extract_sheet(words: &[&str]) -> Option<String> {
    if let Some(csv) = words.iter().find(|w| w.ends_with(".csv")) {
        return Some((*csv).to_string());
    }
    for marker in ["spreadsheet", "sheet", "in"] {
        if let Some(i) = words.iter().position(|w| *w == marker)
            && let Some(next) = words.get(i + 1)
            && !KEYWORDS.contains(next)
            && parse_cell_ref(next).is_none()
        {
            return Some((*next).to_string());
        }
    }
    None
}

/// Parse a spoken request into a sheet operation
fn parse_op(text: &str) -> Option<SheetOp> {
    let lower = text.to_lowercase();
    let words: Vec<&str> = lower
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric() && c != '.'))
        .filter(|w| !w.is_empty())
        .collect();

    let sheet = extract_sheet(&words)?;

    if lower.contains("how many rows") || lower.contains("row count") {
        return Some(SheetOp::RowCount { sheet });
    }

    if lower.contains("sum") || lower.contains("total") || lower.contains("add up") {
        if let Some(i) = words.iter().position(|w| *w == "column")
            && let Some(token) = words.get(i + 1)
            && token.len() <= 2
            && token.chars().all(|c| c.is_ascii_alphabetic())
        {
            let mut col = 0usize;
            for c in token.to_ascii_uppercase().chars() {
                col = col * 26 + (c as usize - 'A' as usize + 1);
            }
            return Some(SheetOp::SumColumn {
                sheet,
                col: col - 1,
            });
        }
        return None;
    }

    let cell = words.iter().find_map(|w| parse_cell_ref(w))?;

    if lower.contains("set") || lower.contains("put") || lower.contains("write") {
        // Value is whatever follows "to"
        let value = lower
            .split(" to ")
            .nth(1)
            .map(str::trim)
            .filter(|v| !v.is_empty())?;
        return Some(SheetOp::SetCell {
            sheet,
            cell,
            value: value.to_string(),
        });
    }

    if lower.contains("read") || lower.contains("what") || lower.contains("tell me") {
        return Some(SheetOp::ReadCell { sheet, cell });
    }

    None
}

#[async_trait]
impl Agent for SpreadsheetAgent {
    fn name(&self) -> &str {
        "spreadsheet"
    }

    fn can_handle(&self, text: &str) -> f32 {
        let lower = text.to_lowercase();
        let hits = KEYWORDS.iter().filter(|k| lower.contains(*k)).count();
        match hits {
            0 => 0.0,
            1 => 0.6,
            _ => 0.95,
        }
    }

    async fn execute(
        &self,
        turn_id: TurnId,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let op = parse_op(text)
            .ok_or_else(|| Error::Agent(format!("could not understand sheet request: {text}")))?;

        tracing::info!(turn = %turn_id, ?op, "spreadsheet operation");

        if cancel.is_cancelled() {
            return Err(Error::Agent("cancelled".to_string()));
        }

        match op {
            SheetOp::ReadCell { sheet, cell } => self.read_cell(&sheet, cell).await,
            SheetOp::SetCell { sheet, cell, value } => self.set_cell(&sheet, cell, &value).await,
            SheetOp::SumColumn { sheet, col } => self.sum_column(&sheet, col).await,
            SheetOp::RowCount { sheet } => self.row_count(&sheet).await,
        }
    }
}
