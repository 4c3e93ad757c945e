//! Pulls typed tables out of raw sheet grids.
//!
//! Three shapes cover the whole workbook: a month matrix (DRE, cash flow,
//! expense projection, tax inputs), a label/value scalar list (assumptions)
//! and an anchored matrix with arbitrary columns (the costing sheet).
//! Row labels are matched against configured patterns in two tiers: exact
//! folded equality first, folded substring second. A pattern hitting two
//! rows within the winning tier is an error, never a silent pick.

use crate::error::{BudgetError, Result};
use crate::schema::{RowSpec, SheetSchema};
use crate::utils::{column_label, fold_label};
use crate::workbook::{Cell, Sheet};
use log::debug;

/// A canonical row located in a sheet, with its values in period order.
#[derive(Debug, Clone)]
pub struct MatchedSeries {
    pub key: String,
    /// Label as written in the sheet.
    pub label: String,
    /// 0-based sheet row the series came from.
    pub row: usize,
    pub values: Vec<f64>,
    /// Per cell: the source text carried a literal '%', so the value is
    /// already a fraction.
    pub percent_cells: Vec<bool>,
}

/// A labeled row no pattern claimed, kept as detail.
#[derive(Debug, Clone)]
pub struct ExtraSeries {
    pub label: String,
    pub row: usize,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct MonthTable {
    pub sheet: String,
    pub matched: Vec<MatchedSeries>,
    pub extras: Vec<ExtraSeries>,
}

impl MonthTable {
    pub fn series(&self, key: &str) -> Option<&MatchedSeries> {
        self.matched.iter().find(|m| m.key == key)
    }
}

#[derive(Debug, Clone)]
pub struct MatchedScalar {
    pub key: String,
    pub label: String,
    pub row: usize,
    pub value: f64,
    /// The source text carried a literal '%', so the value is already a
    /// fraction.
    pub percent: bool,
}

#[derive(Debug, Clone)]
pub struct ExtraScalar {
    pub label: String,
    pub row: usize,
    pub value: f64,
}

#[derive(Debug, Clone)]
pub struct ScalarTable {
    pub sheet: String,
    pub matched: Vec<MatchedScalar>,
    pub extras: Vec<ExtraScalar>,
}

impl ScalarTable {
    pub fn scalar(&self, key: &str) -> Option<&MatchedScalar> {
        self.matched.iter().find(|m| m.key == key)
    }
}

#[derive(Debug, Clone)]
pub struct MatrixColumn {
    pub label: String,
    pub col: usize,
}

#[derive(Debug, Clone)]
pub struct MatrixRow {
    pub label: String,
    pub row: usize,
    pub cells: Vec<Cell>,
}

/// A header-anchored table: one labeled column on the left, arbitrary
/// labeled columns to its right, data rows until the first blank label.
#[derive(Debug, Clone)]
pub struct MatrixTable {
    pub sheet: String,
    pub header_row: usize,
    pub columns: Vec<MatrixColumn>,
    pub rows: Vec<MatrixRow>,
}

struct LabeledRow {
    row: usize,
    label_col: usize,
    label: String,
    folded: String,
}

/// Extracts a statement laid out as rows of labels against month columns.
pub fn extract_month_table(
    sheet: &Sheet,
    schema: &SheetSchema,
    month_labels: &[String],
) -> Result<MonthTable> {
    if month_labels.is_empty() {
        return Err(BudgetError::PeriodMismatch {
            sheet: sheet.name.clone(),
            detail: "no period labels configured".to_string(),
        });
    }

    let (header_row, month_cols) = find_period_header(sheet, month_labels)?;
    let label_bound = month_cols.iter().copied().min().unwrap_or(0);
    let rows = labeled_rows(sheet, header_row + 1, label_bound);

    let mut matched = Vec::new();
    let mut consumed = vec![false; rows.len()];

    for spec in &schema.rows {
        match select_row(&rows, spec, &sheet.name)? {
            Some(idx) => {
                let row = &rows[idx];
                consumed[idx] = true;
                let mut values = Vec::with_capacity(month_cols.len());
                let mut percent_cells = Vec::with_capacity(month_cols.len());
                for &col in &month_cols {
                    let cell = sheet.cell(row.row, col);
                    let numeric = if spec.required {
                        coerce_required(&sheet.name, row.row, col, cell)?
                    } else {
                        coerce_optional(&sheet.name, row.row, col, cell)?
                    };
                    values.push(numeric.value);
                    percent_cells.push(numeric.percent);
                }
                matched.push(MatchedSeries {
                    key: spec.key.clone(),
                    label: row.label.clone(),
                    row: row.row,
                    values,
                    percent_cells,
                });
            }
            None => {
                if spec.required {
                    return Err(BudgetError::LineItemNotFound {
                        sheet: sheet.name.clone(),
                        item: spec.key.clone(),
                        patterns: spec.patterns.clone(),
                    });
                }
            }
        }
    }

    let mut extras = Vec::new();
    if schema.collect_extras {
        for (idx, row) in rows.iter().enumerate() {
            if consumed[idx] {
                continue;
            }
            let mut values = Vec::with_capacity(month_cols.len());
            let mut numeric = 0usize;
            for &col in &month_cols {
                match sheet.cell(row.row, col) {
                    Cell::Number(v) => {
                        values.push(*v);
                        numeric += 1;
                    }
                    Cell::Text(s) => match parse_number_text(s) {
                        Some(parsed) => {
                            values.push(parsed.value);
                            numeric += 1;
                        }
                        None => values.push(0.0),
                    },
                    _ => values.push(0.0),
                }
            }
            // Rows without a single numeric cell are banners or status
            // markers, not data.
            if numeric == 0 {
                continue;
            }
            extras.push(ExtraSeries {
                label: row.label.clone(),
                row: row.row,
                values,
            });
        }
    }

    debug!(
        "sheet '{}': {} canonical rows, {} detail rows",
        sheet.name,
        matched.len(),
        extras.len()
    );

    Ok(MonthTable {
        sheet: sheet.name.clone(),
        matched,
        extras,
    })
}

/// Extracts a label/value sheet: each row's value is the first numeric
/// cell to the right of its label.
pub fn extract_scalar_list(sheet: &Sheet, schema: &SheetSchema) -> Result<ScalarTable> {
    let rows = labeled_rows(sheet, 0, usize::MAX);

    let mut matched = Vec::new();
    let mut consumed = vec![false; rows.len()];

    for spec in &schema.rows {
        match select_row(&rows, spec, &sheet.name)? {
            Some(idx) => {
                let row = &rows[idx];
                consumed[idx] = true;
                match first_numeric_right(sheet, row) {
                    Some(numeric) => matched.push(MatchedScalar {
                        key: spec.key.clone(),
                        label: row.label.clone(),
                        row: row.row,
                        value: numeric.value,
                        percent: numeric.percent,
                    }),
                    None if spec.required => {
                        return Err(BudgetError::MalformedCell {
                            sheet: sheet.name.clone(),
                            row: row.row + 1,
                            column: column_label(row.label_col),
                            detail: format!(
                                "no numeric value found right of label '{}'",
                                row.label
                            ),
                        });
                    }
                    // A matched row without a value falls back to the
                    // configured default, same as an absent row.
                    None => {}
                }
            }
            None => {
                if spec.required {
                    return Err(BudgetError::LineItemNotFound {
                        sheet: sheet.name.clone(),
                        item: spec.key.clone(),
                        patterns: spec.patterns.clone(),
                    });
                }
            }
        }
    }

    let mut extras = Vec::new();
    if schema.collect_extras {
        for (idx, row) in rows.iter().enumerate() {
            if consumed[idx] {
                continue;
            }
            if let Some(numeric) = first_numeric_right(sheet, row) {
                extras.push(ExtraScalar {
                    label: row.label.clone(),
                    row: row.row,
                    value: numeric.value,
                });
            }
        }
    }

    Ok(ScalarTable {
        sheet: sheet.name.clone(),
        matched,
        extras,
    })
}

/// Finds the table whose label column is headed by one of `anchors` and
/// reads it until the first blank label. Cells are returned raw; the
/// caller decides column meanings.
pub fn extract_matrix(sheet: &Sheet, anchors: &[String]) -> Result<MatrixTable> {
    let folded_anchors: Vec<String> = anchors
        .iter()
        .map(|a| fold_label(a))
        .filter(|a| !a.is_empty())
        .collect();

    let mut header: Option<(usize, usize)> = None;
    'search: for (r, row) in sheet.rows.iter().enumerate() {
        for (c, cell) in row.iter().enumerate() {
            if let Cell::Text(text) = cell {
                let folded = fold_label(text);
                if folded.is_empty() {
                    continue;
                }
                if folded_anchors.iter().any(|a| folded.contains(a.as_str())) {
                    // A header needs at least one labeled column to its right.
                    let has_columns = row
                        .iter()
                        .skip(c + 1)
                        .any(|cell| matches!(cell, Cell::Text(t) if !t.trim().is_empty()));
                    if has_columns {
                        header = Some((r, c));
                        break 'search;
                    }
                }
                // Only the first labeled cell of a row can anchor a table.
                break;
            }
        }
    }

    let (header_row, anchor_col) = header.ok_or_else(|| BudgetError::LineItemNotFound {
        sheet: sheet.name.clone(),
        item: anchors.first().cloned().unwrap_or_default(),
        patterns: anchors.to_vec(),
    })?;

    let mut columns = Vec::new();
    if let Some(row) = sheet.rows.get(header_row) {
        for (c, cell) in row.iter().enumerate().skip(anchor_col + 1) {
            if let Cell::Text(text) = cell {
                let label = text.trim();
                if !label.is_empty() {
                    columns.push(MatrixColumn {
                        label: label.to_string(),
                        col: c,
                    });
                }
            }
        }
    }

    let mut rows = Vec::new();
    for r in header_row + 1..sheet.height() {
        let label = match sheet.cell(r, anchor_col) {
            Cell::Text(text) if !text.trim().is_empty() => text.trim().to_string(),
            _ => break,
        };
        if label.starts_with('_') {
            continue;
        }
        let cells = columns
            .iter()
            .map(|mc| sheet.cell(r, mc.col).clone())
            .collect();
        rows.push(MatrixRow {
            label,
            row: r,
            cells,
        });
    }

    debug!(
        "sheet '{}': matrix under '{}' has {} columns, {} rows",
        sheet.name,
        anchors.first().map(String::as_str).unwrap_or(""),
        columns.len(),
        rows.len()
    );

    Ok(MatrixTable {
        sheet: sheet.name.clone(),
        header_row,
        columns,
        rows,
    })
}

/// Finds the first row where at least three period labels (or all of them,
/// if fewer are configured) claim a column by folded prefix, and maps every
/// label to exactly one column.
fn find_period_header(sheet: &Sheet, month_labels: &[String]) -> Result<(usize, Vec<usize>)> {
    let folded_labels: Vec<String> = month_labels.iter().map(|l| fold_label(l)).collect();
    let needed = month_labels.len().min(3);

    for (r, row) in sheet.rows.iter().enumerate() {
        let mut claims: Vec<Vec<usize>> = vec![Vec::new(); folded_labels.len()];
        for (c, cell) in row.iter().enumerate() {
            if let Cell::Text(text) = cell {
                let folded = fold_label(text);
                if folded.is_empty() {
                    continue;
                }
                for (i, label) in folded_labels.iter().enumerate() {
                    if !label.is_empty() && folded.starts_with(label.as_str()) {
                        claims[i].push(c);
                    }
                }
            }
        }

        let distinct = claims.iter().filter(|cols| !cols.is_empty()).count();
        if distinct < needed {
            continue;
        }

        // This is the period header; every label must now resolve cleanly.
        let mut month_cols = Vec::with_capacity(folded_labels.len());
        for (i, cols) in claims.iter().enumerate() {
            match cols.len() {
                0 => {
                    return Err(BudgetError::PeriodMismatch {
                        sheet: sheet.name.clone(),
                        detail: format!("missing period column '{}'", month_labels[i]),
                    });
                }
                1 => month_cols.push(cols[0]),
                _ => {
                    let letters: Vec<String> =
                        cols.iter().map(|&c| column_label(c)).collect();
                    return Err(BudgetError::PeriodMismatch {
                        sheet: sheet.name.clone(),
                        detail: format!(
                            "period label '{}' matched columns {}",
                            month_labels[i],
                            letters.join(", ")
                        ),
                    });
                }
            }
        }

        let mut sorted = month_cols.clone();
        sorted.sort_unstable();
        sorted.dedup();
        if sorted.len() != month_cols.len() {
            return Err(BudgetError::PeriodMismatch {
                sheet: sheet.name.clone(),
                detail: "one column claimed by multiple period labels".to_string(),
            });
        }

        return Ok((r, month_cols));
    }

    Err(BudgetError::PeriodMismatch {
        sheet: sheet.name.clone(),
        detail: "no header row containing period labels".to_string(),
    })
}

/// Collects rows carrying a label: the first non-blank text cell left of
/// `before_col`. Rows whose raw label starts with '_' are hidden helper
/// rows and are skipped.
fn labeled_rows(sheet: &Sheet, from_row: usize, before_col: usize) -> Vec<LabeledRow> {
    let mut out = Vec::new();
    for r in from_row..sheet.height() {
        let Some(row) = sheet.rows.get(r) else { continue };
        for (c, cell) in row.iter().enumerate() {
            if c >= before_col {
                break;
            }
            if let Cell::Text(text) = cell {
                let label = text.trim();
                if label.is_empty() {
                    continue;
                }
                if label.starts_with('_') {
                    break;
                }
                let folded = fold_label(label);
                if !folded.is_empty() {
                    out.push(LabeledRow {
                        row: r,
                        label_col: c,
                        label: label.to_string(),
                        folded,
                    });
                }
                break;
            }
        }
    }
    out
}

/// Two-tier row selection for one spec. Exact folded matches shadow
/// substring matches; two hits in the winning tier is an error.
fn select_row(rows: &[LabeledRow], spec: &RowSpec, sheet: &str) -> Result<Option<usize>> {
    let folded_patterns: Vec<String> = spec
        .patterns
        .iter()
        .map(|p| fold_label(p))
        .filter(|p| !p.is_empty())
        .collect();

    let exact: Vec<usize> = rows
        .iter()
        .enumerate()
        .filter(|(_, row)| folded_patterns.iter().any(|p| row.folded == *p))
        .map(|(i, _)| i)
        .collect();

    let hits = if exact.is_empty() {
        rows.iter()
            .enumerate()
            .filter(|(_, row)| folded_patterns.iter().any(|p| row.folded.contains(p.as_str())))
            .map(|(i, _)| i)
            .collect()
    } else {
        exact
    };

    match hits.len() {
        0 => Ok(None),
        1 => Ok(Some(hits[0])),
        _ => Err(BudgetError::DuplicateLineItem {
            sheet: sheet.to_string(),
            item: spec.key.clone(),
            rows: hits.iter().map(|&i| rows[i].row + 1).collect(),
        }),
    }
}

fn first_numeric_right(sheet: &Sheet, row: &LabeledRow) -> Option<Numeric> {
    let cells = sheet.rows.get(row.row)?;
    for cell in cells.iter().skip(row.label_col + 1) {
        match cell {
            Cell::Number(v) => return Some(Numeric::plain(*v)),
            Cell::Text(s) => {
                if let Some(parsed) = parse_number_text(s) {
                    return Some(parsed);
                }
            }
            _ => {}
        }
    }
    None
}

pub(crate) fn coerce_required(sheet: &str, row: usize, col: usize, cell: &Cell) -> Result<Numeric> {
    match cell {
        Cell::Number(v) => Ok(Numeric::plain(*v)),
        Cell::Text(s) => parse_number_text(s).ok_or_else(|| {
            malformed(sheet, row, col, format!("text '{}' is not numeric", s))
        }),
        Cell::Empty => Err(malformed(sheet, row, col, "empty cell in a required row".to_string())),
        Cell::Bool(b) => Err(malformed(
            sheet,
            row,
            col,
            format!("boolean {} where a number was expected", b),
        )),
        Cell::Error(e) => Err(malformed(sheet, row, col, format!("spreadsheet error {}", e))),
    }
}

/// Like [`coerce_required`], but an empty cell reads as zero.
pub(crate) fn coerce_optional(sheet: &str, row: usize, col: usize, cell: &Cell) -> Result<Numeric> {
    match cell {
        Cell::Empty => Ok(Numeric::plain(0.0)),
        other => coerce_required(sheet, row, col, other),
    }
}

fn malformed(sheet: &str, row: usize, col: usize, detail: String) -> BudgetError {
    BudgetError::MalformedCell {
        sheet: sheet.to_string(),
        row: row + 1,
        column: column_label(col),
        detail,
    }
}

/// A numeric cell value, plus whether the source text carried a literal
/// '%' (already folded into the value as a fraction).
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Numeric {
    pub value: f64,
    pub percent: bool,
}

impl Numeric {
    fn plain(value: f64) -> Self {
        Numeric {
            value,
            percent: false,
        }
    }
}

/// Parses pt-BR formatted numbers: "R$ 1.234,56", "(500)", "4,5%", "-12".
/// A dot is only treated as a thousands separator when a decimal comma is
/// present. A trailing '%' makes the value a fraction ("4,5%" reads as
/// 0.045) and is flagged so percent-style rescaling skips the cell.
pub(crate) fn parse_number_text(raw: &str) -> Option<Numeric> {
    let mut s: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if s.is_empty() {
        return None;
    }

    let negative = s.starts_with('(') && s.ends_with(')');
    if negative {
        s = s[1..s.len() - 1].to_string();
    }
    if let Some(rest) = s.strip_prefix("R$").or_else(|| s.strip_prefix("r$")) {
        s = rest.to_string();
    }
    let percent = s.ends_with('%');
    if let Some(rest) = s.strip_suffix('%') {
        s = rest.to_string();
    }
    if s.contains(',') {
        s = s.replace('.', "").replace(',', ".");
    }

    s.parse::<f64>().ok().map(|v| {
        let v = if negative { -v } else { v };
        Numeric {
            value: if percent { v / 100.0 } else { v },
            percent,
        }
    })
}
