//! In-memory workbook grid decoupled from the on-disk spreadsheet format.
//!
//! Loading goes through [calamine], so `.xlsx`, `.xls` and `.ods` files are
//! all accepted. Extraction and tests work on [`Workbook`] values directly,
//! which keeps fixture construction free of file IO.

use crate::error::Result;
use calamine::{open_workbook_auto, open_workbook_auto_from_rs, Data, Range, Reader, Sheets};
use std::io::{Read, Seek};
use std::path::Path;

/// A single cell value, reduced to the shapes the extractor cares about.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Number(f64),
    Bool(bool),
    Error(String),
    Empty,
}

impl Cell {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    fn from_data(data: &Data) -> Cell {
        match data {
            Data::Empty => Cell::Empty,
            Data::String(s) => Cell::Text(s.clone()),
            Data::Float(f) => Cell::Number(*f),
            Data::Int(i) => Cell::Number(*i as f64),
            Data::Bool(b) => Cell::Bool(*b),
            // Serial date numbers are kept as-is; period columns are located
            // by header label, not by cell type.
            Data::DateTime(dt) => Cell::Number(dt.as_f64()),
            Data::DateTimeIso(s) => Cell::Text(s.clone()),
            Data::DurationIso(s) => Cell::Text(s.clone()),
            Data::Error(e) => Cell::Error(format!("{e:?}")),
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Text(s.to_string())
    }
}

impl From<String> for Cell {
    fn from(s: String) -> Self {
        Cell::Text(s)
    }
}

impl From<f64> for Cell {
    fn from(v: f64) -> Self {
        Cell::Number(v)
    }
}

impl From<i64> for Cell {
    fn from(v: i64) -> Self {
        Cell::Number(v as f64)
    }
}

/// One worksheet as a dense row-major grid. Row and column indices are
/// 0-based and absolute: the grid is padded so that index (0, 0) is the
/// spreadsheet's cell A1 even when the stored range starts lower.
#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    pub name: String,
    pub rows: Vec<Vec<Cell>>,
}

impl Sheet {
    pub fn new(name: impl Into<String>, rows: Vec<Vec<Cell>>) -> Self {
        Sheet {
            name: name.into(),
            rows,
        }
    }

    /// Returns the cell at (row, col), or [`Cell::Empty`] when the
    /// coordinates fall outside the stored grid.
    pub fn cell(&self, row: usize, col: usize) -> &Cell {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&Cell::Empty)
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }
}

/// An ordered collection of sheets, as read from one spreadsheet file.
#[derive(Debug, Clone, PartialEq)]
pub struct Workbook {
    sheets: Vec<Sheet>,
}

impl Workbook {
    pub fn from_sheets(sheets: Vec<Sheet>) -> Self {
        Workbook { sheets }
    }

    /// Opens a spreadsheet file, detecting the format from its contents.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let mut book = open_workbook_auto(path.as_ref())?;
        Ok(Workbook {
            sheets: collect_sheets(&mut book)?,
        })
    }

    /// Reads a spreadsheet from any seekable reader, e.g. a
    /// `Cursor<Vec<u8>>` holding an uploaded file. Format auto-detection
    /// needs `Clone` to hand each candidate parser a fresh reader.
    pub fn from_reader<RS: Read + Seek + Clone>(rs: RS) -> Result<Self> {
        let mut book = open_workbook_auto_from_rs(rs)?;
        Ok(Workbook {
            sheets: collect_sheets(&mut book)?,
        })
    }

    pub fn sheets(&self) -> &[Sheet] {
        &self.sheets
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }

    /// Looks a sheet up by its exact tab name.
    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name == name)
    }
}

fn collect_sheets<RS: Read + Seek>(book: &mut Sheets<RS>) -> Result<Vec<Sheet>> {
    let names = book.sheet_names().to_vec();
    let mut sheets = Vec::with_capacity(names.len());
    for name in names {
        let range = book.worksheet_range(&name)?;
        sheets.push(Sheet {
            rows: convert_range(&range),
            name,
        });
    }
    Ok(sheets)
}

// calamine trims leading empty rows/columns from the stored range; pad the
// grid back out so indices match what the operator sees in the spreadsheet.
fn convert_range(range: &Range<Data>) -> Vec<Vec<Cell>> {
    let (row_offset, col_offset) = match range.start() {
        Some((r, c)) => (r as usize, c as usize),
        None => return Vec::new(),
    };

    let mut rows = Vec::with_capacity(row_offset + range.height());
    rows.resize(row_offset, Vec::new());
    for row in range.rows() {
        let mut cells = Vec::with_capacity(col_offset + row.len());
        cells.resize(col_offset, Cell::Empty);
        cells.extend(row.iter().map(Cell::from_data));
        rows.push(cells);
    }
    rows
}
