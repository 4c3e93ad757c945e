use chrono::{Datelike, Days, NaiveDate};

pub fn last_day_of_month(year: i32, month: u32) -> NaiveDate {
    let next_month = if month == 12 { 1 } else { month + 1 };
    let next_year = if month == 12 { year + 1 } else { year };

    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .unwrap()
        .checked_sub_days(Days::new(1))
        .unwrap()
}

pub fn next_month_end(date: NaiveDate) -> NaiveDate {
    let year = if date.month() == 12 {
        date.year() + 1
    } else {
        date.year()
    };

    let month = if date.month() == 12 {
        1
    } else {
        date.month() + 1
    };

    last_day_of_month(year, month)
}

/// Builds the canonical period axis: `count` consecutive month-end dates
/// starting at `start_month` of `fiscal_year`.
pub fn period_ends(fiscal_year: i32, start_month: u32, count: usize) -> Vec<NaiveDate> {
    let mut periods = Vec::with_capacity(count);
    let mut current = last_day_of_month(fiscal_year, start_month);
    for _ in 0..count {
        periods.push(current);
        current = next_month_end(current);
    }
    periods
}

/// Folds a label for matching: lowercase, accents stripped, punctuation
/// collapsed to single spaces. "(-) Custos Variáveis " and
/// "custos variaveis" fold to the same string.
pub fn fold_label(label: &str) -> String {
    let mut folded = String::with_capacity(label.len());
    let mut last_was_space = true;

    for c in label.chars() {
        for lower in c.to_lowercase() {
            let mapped = fold_char(lower);
            if mapped.is_alphanumeric() {
                folded.push(mapped);
                last_was_space = false;
            } else if !last_was_space {
                folded.push(' ');
                last_was_space = true;
            }
        }
    }

    while folded.ends_with(' ') {
        folded.pop();
    }
    folded
}

// Covers the accented characters that occur in pt-BR financial sheets.
fn fold_char(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'ç' => 'c',
        'ñ' => 'n',
        other => other,
    }
}

/// Spreadsheet-style column letters for a 0-based column index
/// (0 -> "A", 25 -> "Z", 26 -> "AA").
pub fn column_label(col: usize) -> String {
    let mut label = String::new();
    let mut n = col;
    loop {
        label.insert(0, (b'A' + (n % 26) as u8) as char);
        if n < 26 {
            break;
        }
        n = n / 26 - 1;
    }
    label
}
