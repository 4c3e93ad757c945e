use crate::error::{BudgetError, Result};
use crate::schema::{
    keys, CostModelSchema, LogicalSheet, PercentStyle, RowSpec, SheetSchema, SignConvention, Unit,
};
use crate::utils::{fold_label, period_ends};
use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How one logical statement is bound to a physical sheet tab.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct SheetRule {
    #[schemars(
        description = "Tab names to try, in order of preference. Matched exactly first, then case/accent-insensitively, then as a substring."
    )]
    pub candidates: Vec<String>,

    #[serde(default = "default_sheet_required")]
    #[schemars(description = "Whether ingestion fails when no tab matches. Defaults to true.")]
    pub required: bool,
}

fn default_sheet_required() -> bool {
    true
}

impl SheetRule {
    fn new(candidates: &[&str], required: bool) -> Self {
        SheetRule {
            candidates: candidates.iter().map(|c| c.to_string()).collect(),
            required,
        }
    }
}

/// Sheet bindings for all six statements.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(default)]
pub struct SheetBindings {
    pub income_statement: SheetRule,
    pub cash_flow: SheetRule,
    pub expense_projection: SheetRule,
    pub assumptions: SheetRule,
    pub cost_model: SheetRule,
    pub taxes: SheetRule,
}

impl SheetBindings {
    pub fn rule(&self, sheet: LogicalSheet) -> &SheetRule {
        match sheet {
            LogicalSheet::IncomeStatement => &self.income_statement,
            LogicalSheet::CashFlow => &self.cash_flow,
            LogicalSheet::ExpenseProjection => &self.expense_projection,
            LogicalSheet::Assumptions => &self.assumptions,
            LogicalSheet::CostModel => &self.cost_model,
            LogicalSheet::Taxes => &self.taxes,
        }
    }
}

impl Default for SheetBindings {
    fn default() -> Self {
        SheetBindings {
            income_statement: SheetRule::new(&["DRE"], true),
            cash_flow: SheetRule::new(&["9_Fluxo_Caixa", "Fluxo de Caixa"], true),
            expense_projection: SheetRule::new(
                &["Projeção Despesas", "Projecao Despesas"],
                false,
            ),
            assumptions: SheetRule::new(&["Premissas Metas", "Premissas"], true),
            cost_model: SheetRule::new(&["TDABC"], true),
            taxes: SheetRule::new(&["Simples Nacional"], true),
        }
    }
}

/// Row plans for every statement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(default)]
pub struct StatementSchemas {
    pub income_statement: SheetSchema,
    pub cash_flow: SheetSchema,
    pub expense_projection: SheetSchema,
    pub assumptions: SheetSchema,
    pub taxes: SheetSchema,
    pub cost_model: CostModelSchema,
}

impl Default for StatementSchemas {
    fn default() -> Self {
        StatementSchemas {
            income_statement: default_income_schema(),
            cash_flow: default_cash_flow_schema(),
            expense_projection: default_expense_schema(),
            assumptions: default_assumptions_schema(),
            taxes: default_tax_schema(),
            cost_model: default_cost_model_schema(),
        }
    }
}

fn default_income_schema() -> SheetSchema {
    SheetSchema {
        rows: vec![
            RowSpec {
                required: false,
                ..RowSpec::new(
                    keys::GROSS_REVENUE,
                    &["total da receita bruta", "receita bruta total"],
                )
            },
            RowSpec {
                required: false,
                sign: SignConvention::Negated,
                ..RowSpec::new(keys::DEDUCTIONS, &["total deduções"])
            },
            RowSpec::new(keys::REVENUE, &["receita líquida"]),
            RowSpec {
                sign: SignConvention::Negated,
                ..RowSpec::new(keys::DIRECT_COSTS, &["total custos variáveis"])
            },
            RowSpec::new(keys::GROSS_RESULT, &["margem de contribuição"]),
            RowSpec {
                sign: SignConvention::Negated,
                ..RowSpec::new(keys::OPERATING_EXPENSES, &["total custos fixos"])
            },
            RowSpec::new(keys::OPERATING_RESULT, &["ebitda", "resultado operacional"]),
            RowSpec {
                required: false,
                default: Some(0.0),
                ..RowSpec::new(
                    keys::FINANCIAL_RESULT,
                    &["resultado financeiro líquido", "resultado financeiro"],
                )
            },
            RowSpec::new(keys::NET_RESULT, &["resultado líquido", "lucro líquido"]),
        ],
        collect_extras: true,
    }
}

fn default_cash_flow_schema() -> SheetSchema {
    SheetSchema {
        rows: vec![
            RowSpec::new(keys::INFLOWS, &["total entradas"]),
            RowSpec {
                sign: SignConvention::Negated,
                ..RowSpec::new(keys::OUTFLOWS, &["total saídas"])
            },
            RowSpec {
                required: false,
                ..RowSpec::new(keys::INVESTMENT_OUTFLOWS, &["aportes aplicações"])
            },
            RowSpec {
                required: false,
                ..RowSpec::new(keys::INVESTMENT_INFLOWS, &["resgates aplicações"])
            },
            RowSpec {
                required: false,
                ..RowSpec::new(keys::OPENING_BALANCE, &["saldo inicial"])
            },
            RowSpec::new(keys::NET_MOVEMENT, &["variação"]),
            RowSpec::new(keys::ENDING_BALANCE, &["saldo final"]),
        ],
        collect_extras: true,
    }
}

fn default_expense_schema() -> SheetSchema {
    SheetSchema {
        rows: vec![RowSpec {
            required: false,
            ..RowSpec::new(keys::EXPENSE_TOTAL, &["total despesas", "total geral"])
        }],
        collect_extras: true,
    }
}

// Percentage defaults are fractions regardless of the configured
// PercentStyle; the style only rescales values read from cells.
fn default_assumptions_schema() -> SheetSchema {
    let pct = |key: &str, patterns: &[&str], default: f64| RowSpec {
        required: false,
        unit: Unit::Percentage,
        default: Some(default),
        ..RowSpec::new(key, patterns)
    };

    SheetSchema {
        rows: vec![
            RowSpec::new(keys::OPENING_CASH, &["caixa inicial", "saldo inicial de caixa"]),
            pct(keys::INFLATION_IPCA, &["ipca"], 0.045),
            pct(keys::INFLATION_IGPM, &["igp-m", "igpm"], 0.05),
            pct(keys::WAGE_ADJUSTMENT, &["dissídio"], 0.06),
            pct(keys::TARIFF_ADJUSTMENT, &["reajuste tarifas", "reajuste de tarifas"], 0.04),
            pct(
                keys::CONTRACT_ADJUSTMENT,
                &["reajuste contratos", "reajuste de contratos"],
                0.08,
            ),
            pct(keys::CREDIT_CARD_FEE, &["taxa cartão crédito", "taxa cartão de crédito"], 0.0354),
            pct(keys::DEBIT_CARD_FEE, &["taxa cartão débito", "taxa cartão de débito"], 0.0211),
            pct(keys::PREPAYMENT_FEE, &["taxa antecipação", "taxa de antecipação"], 0.05),
        ],
        collect_extras: true,
    }
}

fn default_tax_schema() -> SheetSchema {
    SheetSchema {
        rows: vec![
            RowSpec::new(keys::TAX_REVENUE, &["receita bruta mensal", "receita"]),
            RowSpec::new(keys::PAYROLL, &["folha de pagamento", "folha"]),
        ],
        collect_extras: false,
    }
}

fn default_cost_model_schema() -> CostModelSchema {
    CostModelSchema {
        activity_anchor: vec!["atividade".to_string()],
        service_anchor: vec!["serviço".to_string()],
        behavior_column: vec!["tipo".to_string(), "comportamento".to_string()],
        capacity_column: vec!["capacidade".to_string()],
        fixed_values: vec!["fixo".to_string(), "fixa".to_string()],
        variable_values: vec!["variável".to_string()],
    }
}

/// One progressive bracket of a Simples Nacional annex table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct TaxBracket {
    #[schemars(description = "Upper bound of rolling 12-month revenue (RBT12) for this bracket, inclusive")]
    pub upper_limit: f64,

    #[schemars(description = "Nominal rate applied within the bracket, as a fraction")]
    pub nominal_rate: f64,

    #[schemars(description = "Fixed deduction (parcela a deduzir) in BRL")]
    pub deduction: f64,
}

impl TaxBracket {
    fn new(upper_limit: f64, nominal_rate: f64, deduction: f64) -> Self {
        TaxBracket {
            upper_limit,
            nominal_rate,
            deduction,
        }
    }
}

/// Simples Nacional schedule tables. Defaults carry the Anexo III and
/// Anexo V tables in force since 2018; override in configuration when the
/// statute changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(default)]
pub struct TaxTables {
    #[schemars(description = "Progressive brackets of Anexo III, ordered by upper limit")]
    pub annex_iii: Vec<TaxBracket>,

    #[schemars(description = "Progressive brackets of Anexo V, ordered by upper limit")]
    pub annex_v: Vec<TaxBracket>,

    #[schemars(
        description = "Payroll-to-revenue ratio (fator R) at or above which Anexo III applies instead of Anexo V. Defaults to 0.28."
    )]
    pub fator_r_threshold: f64,
}

impl Default for TaxTables {
    fn default() -> Self {
        TaxTables {
            annex_iii: vec![
                TaxBracket::new(180_000.0, 0.06, 0.0),
                TaxBracket::new(360_000.0, 0.112, 9_360.0),
                TaxBracket::new(720_000.0, 0.132, 17_640.0),
                TaxBracket::new(1_800_000.0, 0.16, 35_640.0),
                TaxBracket::new(3_600_000.0, 0.21, 125_640.0),
                TaxBracket::new(4_800_000.0, 0.33, 648_000.0),
            ],
            annex_v: vec![
                TaxBracket::new(180_000.0, 0.155, 0.0),
                TaxBracket::new(360_000.0, 0.18, 4_500.0),
                TaxBracket::new(720_000.0, 0.195, 9_900.0),
                TaxBracket::new(1_800_000.0, 0.205, 17_100.0),
                TaxBracket::new(3_600_000.0, 0.23, 62_100.0),
                TaxBracket::new(4_800_000.0, 0.305, 540_000.0),
            ],
            fator_r_threshold: 0.28,
        }
    }
}

/// Everything ingestion needs to know about a workbook template: the
/// fiscal window, sheet bindings, row plans, tax tables and numeric
/// tolerance. Defaults describe the consultancy's standard clinic
/// template; load a JSON file to adapt to a reworked workbook.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct IngestConfig {
    #[schemars(description = "Calendar year the budget window starts in")]
    pub fiscal_year: i32,

    #[serde(default = "default_start_month")]
    #[schemars(description = "First month of the budget window (1-12). Defaults to January.")]
    pub start_month: u32,

    #[serde(default = "default_month_labels")]
    #[schemars(
        description = "Period column headers in sheet order. Cells match by folded prefix, so 'Jan' claims 'Jan/26'. Defaults to the twelve pt-BR month abbreviations."
    )]
    pub month_labels: Vec<String>,

    #[serde(default = "default_tolerance")]
    #[schemars(description = "Absolute tolerance for reconciliation checks, in BRL. Defaults to 0.01.")]
    pub tolerance: f64,

    #[serde(default = "default_percent_style")]
    #[schemars(
        description = "How percentage cells are written in this workbook. Configured defaults are always fractions."
    )]
    pub percent_style: PercentStyle,

    #[serde(default)]
    pub sheets: SheetBindings,

    #[serde(default)]
    pub statements: StatementSchemas,

    #[serde(default)]
    pub tax: TaxTables,
}

fn default_start_month() -> u32 {
    1
}

fn default_month_labels() -> Vec<String> {
    ["Jan", "Fev", "Mar", "Abr", "Mai", "Jun", "Jul", "Ago", "Set", "Out", "Nov", "Dez"]
        .iter()
        .map(|m| m.to_string())
        .collect()
}

fn default_tolerance() -> f64 {
    0.01
}

fn default_percent_style() -> PercentStyle {
    PercentStyle::Fraction
}

impl IngestConfig {
    /// Standard template configuration for a budget window starting in
    /// January of `fiscal_year`.
    pub fn for_year(fiscal_year: i32) -> Self {
        IngestConfig {
            fiscal_year,
            start_month: default_start_month(),
            month_labels: default_month_labels(),
            tolerance: default_tolerance(),
            percent_style: default_percent_style(),
            sheets: SheetBindings::default(),
            statements: StatementSchemas::default(),
            tax: TaxTables::default(),
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: IngestConfig = serde_json::from_str(&raw)?;
        Ok(config)
    }

    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Month-end dates of the budget window, one per configured label.
    pub fn periods(&self) -> Vec<NaiveDate> {
        period_ends(self.fiscal_year, self.start_month, self.month_labels.len())
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=12).contains(&self.start_month) {
            return Err(BudgetError::InvalidConfig(format!(
                "start_month {} out of range 1-12",
                self.start_month
            )));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(BudgetError::InvalidConfig(format!(
                "tolerance {} must be a positive number",
                self.tolerance
            )));
        }
        if self.month_labels.is_empty() {
            return Err(BudgetError::InvalidConfig(
                "month_labels must not be empty".to_string(),
            ));
        }
        let mut folded: Vec<String> = self.month_labels.iter().map(|l| fold_label(l)).collect();
        folded.sort();
        folded.dedup();
        if folded.len() != self.month_labels.len() {
            return Err(BudgetError::InvalidConfig(
                "month_labels contain duplicates after folding".to_string(),
            ));
        }

        for sheet in LogicalSheet::ALL {
            let rule = self.sheets.rule(sheet);
            if rule.required && rule.candidates.is_empty() {
                return Err(BudgetError::InvalidConfig(format!(
                    "no sheet candidates configured for required statement '{}'",
                    sheet
                )));
            }
        }

        let schemas = [
            ("income_statement", &self.statements.income_statement),
            ("cash_flow", &self.statements.cash_flow),
            ("expense_projection", &self.statements.expense_projection),
            ("assumptions", &self.statements.assumptions),
            ("taxes", &self.statements.taxes),
        ];
        for (name, schema) in schemas {
            for row in &schema.rows {
                if row.key.is_empty() {
                    return Err(BudgetError::InvalidConfig(format!(
                        "{}: row with empty key",
                        name
                    )));
                }
                if row.patterns.iter().all(|p| fold_label(p).is_empty()) {
                    return Err(BudgetError::InvalidConfig(format!(
                        "{}: row '{}' has no usable patterns",
                        name, row.key
                    )));
                }
            }
        }

        if self.statements.cost_model.activity_anchor.is_empty()
            || self.statements.cost_model.service_anchor.is_empty()
        {
            return Err(BudgetError::InvalidConfig(
                "cost_model anchors must not be empty".to_string(),
            ));
        }

        validate_tax_table("annex_iii", &self.tax.annex_iii)?;
        validate_tax_table("annex_v", &self.tax.annex_v)?;
        if !(0.0..=1.0).contains(&self.tax.fator_r_threshold) {
            return Err(BudgetError::InvalidConfig(format!(
                "fator_r_threshold {} out of range 0-1",
                self.tax.fator_r_threshold
            )));
        }

        Ok(())
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(IngestConfig)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}

fn validate_tax_table(name: &str, brackets: &[TaxBracket]) -> Result<()> {
    if brackets.is_empty() {
        return Err(BudgetError::InvalidConfig(format!(
            "{} has no brackets",
            name
        )));
    }
    let mut prev = 0.0;
    for bracket in brackets {
        if bracket.upper_limit <= prev {
            return Err(BudgetError::InvalidConfig(format!(
                "{} brackets must be in strictly increasing order of upper_limit",
                name
            )));
        }
        if !(0.0..=1.0).contains(&bracket.nominal_rate) {
            return Err(BudgetError::InvalidConfig(format!(
                "{} nominal rate {} out of range 0-1",
                name, bracket.nominal_rate
            )));
        }
        if bracket.deduction < 0.0 {
            return Err(BudgetError::InvalidConfig(format!(
                "{} deduction {} must not be negative",
                name, bracket.deduction
            )));
        }
        prev = bracket.upper_limit;
    }
    Ok(())
}
