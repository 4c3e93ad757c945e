use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable keys for the canonical rows the extractor binds sheet labels to.
/// Configuration files refer to rows by these keys, so they are part of the
/// public contract and never localized.
pub mod keys {
    // Income statement (DRE).
    pub const GROSS_REVENUE: &str = "gross_revenue";
    pub const DEDUCTIONS: &str = "deductions";
    pub const REVENUE: &str = "revenue";
    pub const DIRECT_COSTS: &str = "direct_costs";
    pub const GROSS_RESULT: &str = "gross_result";
    pub const OPERATING_EXPENSES: &str = "operating_expenses";
    pub const OPERATING_RESULT: &str = "operating_result";
    pub const FINANCIAL_RESULT: &str = "financial_result";
    pub const NET_RESULT: &str = "net_result";

    // Cash flow.
    pub const INFLOWS: &str = "inflows";
    pub const OUTFLOWS: &str = "outflows";
    pub const INVESTMENT_OUTFLOWS: &str = "investment_outflows";
    pub const INVESTMENT_INFLOWS: &str = "investment_inflows";
    pub const OPENING_BALANCE: &str = "opening_balance";
    pub const NET_MOVEMENT: &str = "net_movement";
    pub const ENDING_BALANCE: &str = "ending_balance";

    // Expense projection.
    pub const EXPENSE_TOTAL: &str = "expense_total";

    // Assumptions.
    pub const OPENING_CASH: &str = "opening_cash";
    pub const INFLATION_IPCA: &str = "inflation_ipca";
    pub const INFLATION_IGPM: &str = "inflation_igpm";
    pub const WAGE_ADJUSTMENT: &str = "wage_adjustment";
    pub const TARIFF_ADJUSTMENT: &str = "tariff_adjustment";
    pub const CONTRACT_ADJUSTMENT: &str = "contract_adjustment";
    pub const CREDIT_CARD_FEE: &str = "credit_card_fee";
    pub const DEBIT_CARD_FEE: &str = "debit_card_fee";
    pub const PREPAYMENT_FEE: &str = "prepayment_fee";

    // Tax simulation.
    pub const TAX_REVENUE: &str = "tax_revenue";
    pub const PAYROLL: &str = "payroll";
}

/// The six statements the engine knows how to read. Each one is bound to a
/// physical sheet by the locator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LogicalSheet {
    IncomeStatement,
    CashFlow,
    ExpenseProjection,
    Assumptions,
    CostModel,
    Taxes,
}

impl LogicalSheet {
    pub const ALL: [LogicalSheet; 6] = [
        LogicalSheet::IncomeStatement,
        LogicalSheet::CashFlow,
        LogicalSheet::ExpenseProjection,
        LogicalSheet::Assumptions,
        LogicalSheet::CostModel,
        LogicalSheet::Taxes,
    ];
}

impl fmt::Display for LogicalSheet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogicalSheet::IncomeStatement => "DRE",
            LogicalSheet::CashFlow => "Fluxo de Caixa",
            LogicalSheet::ExpenseProjection => "Projeção de Despesas",
            LogicalSheet::Assumptions => "Premissas",
            LogicalSheet::CostModel => "TDABC",
            LogicalSheet::Taxes => "Simples Nacional",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum Unit {
    #[schemars(description = "Monetary amount in the workbook's currency (BRL)")]
    Currency,

    #[schemars(description = "A rate or ratio; see PercentStyle for how cell values are scaled")]
    Percentage,

    #[schemars(description = "A capacity or consumption measured in hours")]
    Hours,

    #[schemars(description = "A plain count (sessions, patients, headcount)")]
    Count,
}

/// How percentage cells are written in the workbook.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum PercentStyle {
    #[schemars(description = "Cells hold fractions: 4.5% appears as 0.045")]
    Fraction,

    #[schemars(description = "Cells hold whole points: 4.5% appears as 4.5 and is divided by 100 on read")]
    WholePoints,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum SignConvention {
    #[schemars(description = "Cell values are stored with the sign the model expects")]
    AsIs,

    #[schemars(
        description = "Cell values are negated on read. Used for rows the workbook stores as negative outflows (e.g. '(-) Total Custos Fixos') that the model holds as positive magnitudes."
    )]
    Negated,
}

/// Describes one canonical row of a statement: the key the model knows it
/// by, the labels that may name it in the sheet, and how to interpret the
/// cells once found.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct RowSpec {
    #[schemars(description = "Canonical key this row binds to (see the keys module)")]
    pub key: String,

    #[schemars(
        description = "Label patterns to match against sheet rows, tried case-, accent- and punctuation-insensitively. Exact folded matches win over substring matches."
    )]
    pub patterns: Vec<String>,

    #[serde(default = "default_required")]
    #[schemars(description = "Whether ingestion fails when no row matches. Defaults to true.")]
    pub required: bool,

    #[serde(default = "default_unit")]
    #[schemars(description = "Unit of the row's cells. Defaults to Currency.")]
    pub unit: Unit,

    #[serde(default = "default_sign")]
    #[schemars(description = "Sign convention applied to the row's cells. Defaults to AsIs.")]
    pub sign: SignConvention,

    #[serde(default)]
    #[schemars(
        description = "Value assumed for every period when an optional row is absent. Leave unset to record the row as absent instead."
    )]
    pub default: Option<f64>,
}

fn default_required() -> bool {
    true
}

fn default_unit() -> Unit {
    Unit::Currency
}

fn default_sign() -> SignConvention {
    SignConvention::AsIs
}

impl RowSpec {
    pub fn new(key: &str, patterns: &[&str]) -> Self {
        RowSpec {
            key: key.to_string(),
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
            required: true,
            unit: Unit::Currency,
            sign: SignConvention::AsIs,
            default: None,
        }
    }
}

/// Row plan for one statement sheet. Used both for month-matrix sheets
/// (DRE, cash flow, tax) and for label/value scalar sheets (assumptions).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct SheetSchema {
    #[schemars(description = "Canonical rows to locate in the sheet")]
    pub rows: Vec<RowSpec>,

    #[serde(default)]
    #[schemars(
        description = "Whether labeled rows that match no canonical pattern are kept as detail items instead of being ignored"
    )]
    pub collect_extras: bool,
}

impl SheetSchema {
    pub fn row(&self, key: &str) -> Option<&RowSpec> {
        self.rows.iter().find(|r| r.key == key)
    }
}

/// Layout hints for the cost-model sheet, which holds two side-by-side
/// tables instead of a label/period matrix.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct CostModelSchema {
    #[schemars(description = "Header labels that anchor the activity table (its label column)")]
    pub activity_anchor: Vec<String>,

    #[schemars(description = "Header labels that anchor the service consumption table")]
    pub service_anchor: Vec<String>,

    #[schemars(description = "Header labels of the activity cost-behavior column")]
    pub behavior_column: Vec<String>,

    #[schemars(description = "Header labels of the activity monthly-capacity column")]
    pub capacity_column: Vec<String>,

    #[schemars(description = "Cell values classifying an activity's pool as fixed")]
    pub fixed_values: Vec<String>,

    #[schemars(description = "Cell values classifying an activity's pool as variable")]
    pub variable_values: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_spec_serde_defaults() {
        let json = r#"{ "key": "revenue", "patterns": ["receita líquida"] }"#;
        let spec: RowSpec = serde_json::from_str(json).unwrap();
        assert!(spec.required);
        assert_eq!(spec.unit, Unit::Currency);
        assert_eq!(spec.sign, SignConvention::AsIs);
        assert_eq!(spec.default, None);
    }

    #[test]
    fn test_row_spec_round_trip() {
        let spec = RowSpec {
            required: false,
            sign: SignConvention::Negated,
            default: Some(0.0),
            ..RowSpec::new(keys::DIRECT_COSTS, &["total custos variaveis"])
        };
        let json = serde_json::to_string(&spec).unwrap();
        let back: RowSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(back, spec);
    }

    #[test]
    fn test_logical_sheet_display_names() {
        assert_eq!(LogicalSheet::IncomeStatement.to_string(), "DRE");
        assert_eq!(LogicalSheet::CashFlow.to_string(), "Fluxo de Caixa");
        assert_eq!(LogicalSheet::Taxes.to_string(), "Simples Nacional");
        assert_eq!(LogicalSheet::ALL.len(), 6);
    }
}
