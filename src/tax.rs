//! Simples Nacional assessment.
//!
//! Each month is assessed on RBT12, the rolling gross revenue of the
//! twelve months up to and including the assessed one (shorter at the
//! start of the window). The payroll-to-revenue ratio (fator R) picks the
//! annex, the RBT12 picks the bracket, and the effective rate follows the
//! progressive formula `(rbt12 * nominal - deduction) / rbt12`.

use crate::config::{TaxBracket, TaxTables};
use crate::error::{BudgetError, Result};
use crate::model::{TaxAnnex, TaxAssessment};
use chrono::NaiveDate;
use log::{debug, warn};

/// Builds the month-by-month tax schedule. `revenue` and `payroll` must be
/// aligned to `periods`; extra entries are ignored.
pub fn build_schedule(
    periods: &[NaiveDate],
    revenue: &[f64],
    payroll: &[f64],
    tables: &TaxTables,
) -> Result<Vec<TaxAssessment>> {
    let mut schedule = Vec::with_capacity(periods.len());

    for (t, period) in periods.iter().enumerate() {
        if t >= revenue.len() || t >= payroll.len() {
            break;
        }
        let window_start = t.saturating_sub(11);
        let rbt12: f64 = revenue[window_start..=t].iter().sum();
        let payroll_12m: f64 = payroll[window_start..=t].iter().sum();

        let fator_r = if rbt12 > 0.0 { payroll_12m / rbt12 } else { 0.0 };
        let annex = if fator_r >= tables.fator_r_threshold {
            TaxAnnex::AnnexIii
        } else {
            TaxAnnex::AnnexV
        };

        let brackets = brackets_for(tables, annex);
        let (bracket, clamped) = select_bracket(brackets, rbt12).ok_or_else(|| {
            BudgetError::InvalidConfig(format!("{} table has no brackets", annex))
        })?;
        if clamped {
            warn!(
                "{}: RBT12 {:.2} exceeds the {} table ceiling; top bracket applied",
                period, rbt12, annex
            );
        }

        let effective_rate = if rbt12 > 0.0 {
            (rbt12 * bracket.nominal_rate - bracket.deduction) / rbt12
        } else {
            0.0
        };
        let das = revenue[t] * effective_rate;

        debug!(
            "{}: rbt12 {:.2}, fator R {:.4}, {} at {:.4} effective",
            period, rbt12, fator_r, annex, effective_rate
        );

        schedule.push(TaxAssessment {
            period: *period,
            rbt12,
            payroll_12m,
            fator_r,
            annex,
            nominal_rate: bracket.nominal_rate,
            deduction: bracket.deduction,
            effective_rate,
            das,
        });
    }

    Ok(schedule)
}

pub(crate) fn brackets_for(tables: &TaxTables, annex: TaxAnnex) -> &[TaxBracket] {
    match annex {
        TaxAnnex::AnnexIii => &tables.annex_iii,
        TaxAnnex::AnnexV => &tables.annex_v,
    }
}

// Revenue above the last bracket's ceiling clamps to the last bracket;
// the caller surfaces a warning for it.
fn select_bracket(brackets: &[TaxBracket], rbt12: f64) -> Option<(&TaxBracket, bool)> {
    for bracket in brackets {
        if rbt12 <= bracket.upper_limit {
            return Some((bracket, false));
        }
    }
    brackets.last().map(|b| (b, true))
}
