//! Reconciliation checks over an assembled model.
//!
//! The workbook carries its own subtotal rows, so the model can be checked
//! against itself: every accounting identity the statements promise must
//! hold within the configured tolerance, and every monthly series must
//! cover the full fiscal window. Violations are collected rather than
//! short-circuited so a broken workbook reports everything wrong at once.

use crate::error::{BudgetError, Result};
use crate::model::{BudgetModel, LineItem};
use crate::schema::LogicalSheet;
use chrono::NaiveDate;
use log::debug;
use serde::Serialize;
use std::fmt;

/// One failed reconciliation check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    pub statement: String,
    /// Month-end the check applies to, or `None` for structural checks.
    pub period: Option<NaiveDate>,
    pub check: String,
    pub expected: f64,
    pub actual: f64,
    pub tolerance: f64,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.period {
            Some(period) => write!(
                f,
                "{} [{}] {}: expected {:.2}, found {:.2}",
                self.statement, period, self.check, self.expected, self.actual
            ),
            None => write!(
                f,
                "{} {}: expected {:.0}, found {:.0}",
                self.statement, self.check, self.expected, self.actual
            ),
        }
    }
}

pub struct ModelValidator<'a> {
    model: &'a BudgetModel,
    tolerance: f64,
}

impl<'a> ModelValidator<'a> {
    pub fn new(model: &'a BudgetModel, tolerance: f64) -> Self {
        ModelValidator { model, tolerance }
    }

    /// Runs every check and returns the violations found, possibly none.
    pub fn collect_violations(&self) -> Vec<Violation> {
        let mut violations = Vec::new();
        self.check_series_lengths(&mut violations);
        self.check_income_identities(&mut violations);
        self.check_cash_identities(&mut violations);
        debug!(
            "validated model for {}: {} violation(s)",
            self.model.company,
            violations.len()
        );
        violations
    }

    pub fn verify(&self) -> Result<()> {
        let violations = self.collect_violations();
        if violations.is_empty() {
            Ok(())
        } else {
            Err(BudgetError::ModelValidation { violations })
        }
    }

    fn check_series_lengths(&self, out: &mut Vec<Violation>) {
        let n = self.model.periods.len();
        let mut length = |statement: LogicalSheet, label: &str, len: usize| {
            if len != n {
                out.push(Violation {
                    statement: statement.to_string(),
                    period: None,
                    check: format!("period count for '{}'", label),
                    expected: n as f64,
                    actual: len as f64,
                    tolerance: 0.0,
                });
            }
        };

        let income = &self.model.income_statement;
        for item in income_series(income) {
            length(LogicalSheet::IncomeStatement, &item.label, item.values.len());
        }
        let cash = &self.model.cash_flow;
        for item in cash_series(cash) {
            length(LogicalSheet::CashFlow, &item.label, item.values.len());
        }
        for item in &self.model.expenses.items {
            length(LogicalSheet::ExpenseProjection, &item.label, item.values.len());
        }
        if let Some(total) = &self.model.expenses.total {
            length(LogicalSheet::ExpenseProjection, &total.label, total.values.len());
        }
        for activity in &self.model.cost_model.activities {
            length(
                LogicalSheet::CostModel,
                &activity.name,
                activity.monthly_cost.len(),
            );
        }
        let taxes = &self.model.taxes;
        length(
            LogicalSheet::Taxes,
            &taxes.monthly_revenue.label,
            taxes.monthly_revenue.values.len(),
        );
        length(
            LogicalSheet::Taxes,
            &taxes.monthly_payroll.label,
            taxes.monthly_payroll.values.len(),
        );
        length(LogicalSheet::Taxes, "tax schedule", taxes.schedule.len());
    }

    fn check_income_identities(&self, out: &mut Vec<Violation>) {
        let income = &self.model.income_statement;
        for (t, period) in self.model.periods.iter().enumerate() {
            if let (Some(gross), Some(deductions)) = (&income.gross_revenue, &income.deductions) {
                self.identity(
                    out,
                    LogicalSheet::IncomeStatement,
                    *period,
                    "gross revenue - deductions = net revenue",
                    value_at(gross, t) - value_at(deductions, t),
                    value_at(&income.revenue, t),
                );
            }
            self.identity(
                out,
                LogicalSheet::IncomeStatement,
                *period,
                "net revenue - direct costs = gross result",
                value_at(&income.revenue, t) - value_at(&income.direct_costs, t),
                value_at(&income.gross_result, t),
            );
            self.identity(
                out,
                LogicalSheet::IncomeStatement,
                *period,
                "gross result - operating expenses = operating result",
                value_at(&income.gross_result, t) - value_at(&income.operating_expenses, t),
                value_at(&income.operating_result, t),
            );
            self.identity(
                out,
                LogicalSheet::IncomeStatement,
                *period,
                "operating result + financial result = net result",
                value_at(&income.operating_result, t) + value_at(&income.financial_result, t),
                value_at(&income.net_result, t),
            );
            // Each subtotal row may drift within tolerance on its own; the
            // statement must still reconcile end to end.
            self.identity(
                out,
                LogicalSheet::IncomeStatement,
                *period,
                "net revenue - direct costs - operating expenses + financial result = net result",
                value_at(&income.revenue, t) - value_at(&income.direct_costs, t)
                    - value_at(&income.operating_expenses, t)
                    + value_at(&income.financial_result, t),
                value_at(&income.net_result, t),
            );
        }
    }

    fn check_cash_identities(&self, out: &mut Vec<Violation>) {
        let cash = &self.model.cash_flow;
        let opt = |item: &Option<LineItem>, t: usize| -> f64 {
            item.as_ref().map(|i| value_at(i, t)).unwrap_or(0.0)
        };

        for (t, period) in self.model.periods.iter().enumerate() {
            let net = value_at(&cash.inflows, t) - value_at(&cash.outflows, t)
                + opt(&cash.investment_inflows, t)
                - opt(&cash.investment_outflows, t);
            self.identity(
                out,
                LogicalSheet::CashFlow,
                *period,
                "inflows - outflows +/- investments = net movement",
                net,
                value_at(&cash.net_movement, t),
            );

            // The running balance anchors on the configured opening cash.
            let prior = if t == 0 {
                self.model.assumptions.opening_cash
            } else {
                value_at(&cash.ending_balance, t - 1)
            };
            self.identity(
                out,
                LogicalSheet::CashFlow,
                *period,
                "prior balance + net movement = ending balance",
                prior + value_at(&cash.net_movement, t),
                value_at(&cash.ending_balance, t),
            );

            if let Some(opening) = &cash.opening_balance {
                let check = if t == 0 {
                    "opening balance matches configured opening cash"
                } else {
                    "opening balance carries the prior ending balance"
                };
                self.identity(
                    out,
                    LogicalSheet::CashFlow,
                    *period,
                    check,
                    prior,
                    value_at(opening, t),
                );
            }
        }
    }

    fn identity(
        &self,
        out: &mut Vec<Violation>,
        statement: LogicalSheet,
        period: NaiveDate,
        check: &str,
        expected: f64,
        actual: f64,
    ) {
        if (expected - actual).abs() > self.tolerance {
            out.push(Violation {
                statement: statement.to_string(),
                period: Some(period),
                check: check.to_string(),
                expected,
                actual,
                tolerance: self.tolerance,
            });
        }
    }
}

/// Checks every identity and series length; the error carries all
/// violations at once.
pub fn validate_model(model: &BudgetModel, tolerance: f64) -> Result<()> {
    ModelValidator::new(model, tolerance).verify()
}

fn value_at(item: &LineItem, t: usize) -> f64 {
    item.values.get(t).copied().unwrap_or(0.0)
}

fn income_series(income: &crate::model::IncomeStatement) -> Vec<&LineItem> {
    let mut series: Vec<&LineItem> = vec![
        &income.revenue,
        &income.direct_costs,
        &income.gross_result,
        &income.operating_expenses,
        &income.operating_result,
        &income.financial_result,
        &income.net_result,
    ];
    series.extend(income.gross_revenue.iter());
    series.extend(income.deductions.iter());
    series.extend(income.revenue_items.iter());
    series.extend(income.deduction_items.iter());
    series.extend(income.direct_cost_items.iter());
    series.extend(income.operating_expense_items.iter());
    series.extend(income.financial_items.iter());
    series
}

fn cash_series(cash: &crate::model::CashFlow) -> Vec<&LineItem> {
    let mut series: Vec<&LineItem> = vec![
        &cash.inflows,
        &cash.outflows,
        &cash.net_movement,
        &cash.ending_balance,
    ];
    series.extend(cash.investment_outflows.iter());
    series.extend(cash.investment_inflows.iter());
    series.extend(cash.opening_balance.iter());
    series.extend(cash.inflow_items.iter());
    series.extend(cash.outflow_items.iter());
    series
}
