//! The validated budget model produced by ingestion. Every collection of
//! monthly values is aligned to [`BudgetModel::periods`]; the validator
//! rejects any statement whose series diverge from that axis.

use crate::schema::Unit;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One labeled monthly series, e.g. a DRE row or a cash-flow detail line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    /// Label as written in the workbook (or the category name for rows
    /// synthesized from configured defaults).
    pub label: String,
    pub unit: Unit,
    pub values: Vec<f64>,
}

impl LineItem {
    pub fn new(label: impl Into<String>, unit: Unit, values: Vec<f64>) -> Self {
        LineItem {
            label: label.into(),
            unit,
            values,
        }
    }

    pub fn zeros(label: impl Into<String>, unit: Unit, periods: usize) -> Self {
        LineItem::new(label, unit, vec![0.0; periods])
    }

    pub fn total(&self) -> f64 {
        self.values.iter().sum()
    }
}

/// A labeled single value from a scalar sheet (assumptions).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedScalar {
    pub label: String,
    pub value: f64,
}

/// The DRE, normalized to positive-magnitude aggregates: costs and
/// deductions are held positive, so Revenue - DirectCosts - OperatingExpenses
/// + FinancialResult = NetResult.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomeStatement {
    /// Revenue before deductions, when the sheet carries it.
    pub gross_revenue: Option<LineItem>,
    /// Taxes and card fees deducted from gross revenue, positive.
    pub deductions: Option<LineItem>,
    /// Net revenue; the denominator for every margin.
    pub revenue: LineItem,
    pub direct_costs: LineItem,
    /// Contribution margin subtotal as stated in the sheet.
    pub gross_result: LineItem,
    pub operating_expenses: LineItem,
    /// EBITDA subtotal as stated in the sheet.
    pub operating_result: LineItem,
    pub financial_result: LineItem,
    pub net_result: LineItem,

    /// Detail rows feeding each aggregate, kept for drill-down.
    pub revenue_items: Vec<LineItem>,
    pub deduction_items: Vec<LineItem>,
    pub direct_cost_items: Vec<LineItem>,
    pub operating_expense_items: Vec<LineItem>,
    pub financial_items: Vec<LineItem>,
}

/// The monthly cash flow. Outflows are positive magnitudes;
/// `net_movement = inflows - outflows + investment_inflows - investment_outflows`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashFlow {
    pub inflows: LineItem,
    pub outflows: LineItem,
    /// Cash moved into financial investments this month, when tracked.
    pub investment_outflows: Option<LineItem>,
    /// Cash redeemed from financial investments this month, when tracked.
    pub investment_inflows: Option<LineItem>,
    pub opening_balance: Option<LineItem>,
    pub net_movement: LineItem,
    pub ending_balance: LineItem,

    pub inflow_items: Vec<LineItem>,
    pub outflow_items: Vec<LineItem>,
}

/// Detail expense budget, one row per expense line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseProjection {
    pub items: Vec<LineItem>,
    pub total: Option<LineItem>,
}

/// Macro and operational assumptions. Rates are fractions (0.045 = 4.5%).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssumptionSet {
    /// Cash balance at the start of the budget window, in BRL.
    pub opening_cash: f64,
    pub inflation_ipca: f64,
    pub inflation_igpm: f64,
    /// Annual collective wage adjustment (dissídio).
    pub wage_adjustment: f64,
    pub tariff_adjustment: f64,
    pub contract_adjustment: f64,
    pub credit_card_fee: f64,
    pub debit_card_fee: f64,
    /// Fee charged to settle card receivables early.
    pub prepayment_fee: f64,
    /// Scalar rows the schema does not bind, kept verbatim.
    pub extras: Vec<NamedScalar>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum CostBehavior {
    Fixed,
    Variable,
}

/// One activity of the time-driven costing model: its classified cost
/// pool, and the practical capacity used to unit-cost it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub name: String,
    pub behavior: CostBehavior,
    /// Practical monthly capacity in hours.
    pub capacity_hours: f64,
    pub monthly_cost: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityConsumption {
    pub activity: String,
    /// Hours of the activity one month of the service consumes.
    pub hours: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceUsage {
    pub name: String,
    pub consumption: Vec<ActivityConsumption>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostModel {
    pub activities: Vec<Activity>,
    pub services: Vec<ServiceUsage>,
}

impl CostModel {
    pub fn activity(&self, name: &str) -> Option<&Activity> {
        self.activities.iter().find(|a| a.name == name)
    }
}

/// Which Simples Nacional annex a month is taxed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaxAnnex {
    #[serde(rename = "III")]
    AnnexIii,
    #[serde(rename = "V")]
    AnnexV,
}

impl fmt::Display for TaxAnnex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaxAnnex::AnnexIii => write!(f, "Anexo III"),
            TaxAnnex::AnnexV => write!(f, "Anexo V"),
        }
    }
}

/// One month of the Simples Nacional schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxAssessment {
    pub period: NaiveDate,
    /// Rolling 12-month gross revenue, including the assessed month.
    pub rbt12: f64,
    /// Rolling 12-month payroll, including the assessed month.
    pub payroll_12m: f64,
    pub fator_r: f64,
    pub annex: TaxAnnex,
    pub nominal_rate: f64,
    pub deduction: f64,
    pub effective_rate: f64,
    /// Tax due for the month: monthly revenue times the effective rate.
    pub das: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxComputation {
    pub monthly_revenue: LineItem,
    pub monthly_payroll: LineItem,
    pub schedule: Vec<TaxAssessment>,
}

/// The whole validated workbook: six statements on one period axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetModel {
    pub company: String,
    pub branch: String,
    pub fiscal_year: i32,
    /// Month-end dates of the budget window, in order.
    pub periods: Vec<NaiveDate>,
    pub income_statement: IncomeStatement,
    pub cash_flow: CashFlow,
    pub expenses: ExpenseProjection,
    pub assumptions: AssumptionSet,
    pub cost_model: CostModel,
    pub taxes: TaxComputation,
}

impl BudgetModel {
    pub fn n_periods(&self) -> usize {
        self.periods.len()
    }
}
