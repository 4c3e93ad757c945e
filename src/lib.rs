//! # Budget Engine
//!
//! A library for ingesting consultancy budget workbooks (XLSX) into a
//! validated financial model with derived management indicators.
//!
//! ## Core Concepts
//!
//! - **Logical sheets**: the six statements a budget workbook carries (income
//!   statement, cash flow, expense projection, assumptions, activity cost
//!   model, Simples Nacional simulation), each bound to a physical tab by
//!   configurable candidate names
//! - **Schemas**: pattern-driven row bindings with units and sign
//!   conventions, so renamed or reordered rows keep resolving
//! - **BudgetModel**: sign-normalized monthly statements over the fiscal
//!   window, with costs and outflows held as positive magnitudes
//! - **Validation**: the workbook's own subtotal rows are reconciled against
//!   the accounting identities within a configurable tolerance
//! - **Indicators**: margins, break-even, time-driven service costing, cash
//!   trajectory and the Simples Nacional tax schedule
//!
//! ## Example
//!
//! ```rust,ignore
//! use budget_engine::*;
//!
//! let config = IngestConfig::for_year(2026);
//! let workbook = Workbook::from_path("orcamento_2026.xlsx")?;
//! let (model, indicators) =
//!     ingest_and_derive(&workbook, &config, "Clínica Exemplo", "Matriz")?;
//!
//! println!("annual net result: {:.2}", indicators.annual.net_result);
//! for assessment in &model.taxes.schedule {
//!     println!("{}: DAS {:.2} ({})", assessment.period, assessment.das, assessment.annex);
//! }
//! ```

pub mod config;
pub mod error;
pub mod extract;
pub mod locator;
pub mod metrics;
pub mod model;
pub mod normalize;
pub mod schema;
pub mod tax;
pub mod utils;
pub mod validate;
pub mod workbook;

pub use config::{IngestConfig, SheetBindings, SheetRule, StatementSchemas, TaxBracket, TaxTables};
pub use error::{BudgetError, Result};
pub use extract::{MatrixTable, MonthTable, ScalarTable};
pub use locator::{locate_sheets, ResolvedSheets};
pub use metrics::{
    derive_indicators, AnnualSummary, CashPoint, IndicatorSet, ResultWaterfall, RevenueShare,
    RiskLevel, ServiceProfit, StepKind, WaterfallStep,
};
pub use model::*;
pub use normalize::{build_model, ExtractedWorkbook};
pub use schema::{
    keys, CostModelSchema, LogicalSheet, PercentStyle, RowSpec, SheetSchema, SignConvention, Unit,
};
pub use validate::{validate_model, ModelValidator, Violation};
pub use workbook::{Cell, Sheet, Workbook};

use log::info;

/// Drives the full pipeline: locate the statement tabs, extract their
/// tables, assemble the sign-normalized model and reconcile it.
pub struct BudgetIngestor<'a> {
    config: &'a IngestConfig,
}

impl<'a> BudgetIngestor<'a> {
    pub fn new(config: &'a IngestConfig) -> Self {
        BudgetIngestor { config }
    }

    pub fn ingest(
        &self,
        workbook: &Workbook,
        company: &str,
        branch: &str,
    ) -> Result<BudgetModel> {
        self.config.validate()?;

        info!(
            "Ingesting budget workbook for {} / {} ({} tabs)",
            company,
            branch,
            workbook.sheets().len()
        );

        let resolved = locate_sheets(workbook, self.config)?;
        let schemas = &self.config.statements;
        let labels = &self.config.month_labels;

        let income_statement = extract::extract_month_table(
            self.bound_sheet(workbook, &resolved, LogicalSheet::IncomeStatement)?,
            &schemas.income_statement,
            labels,
        )?;
        let cash_flow = extract::extract_month_table(
            self.bound_sheet(workbook, &resolved, LogicalSheet::CashFlow)?,
            &schemas.cash_flow,
            labels,
        )?;
        let expense_projection = match resolved.name(LogicalSheet::ExpenseProjection) {
            Some(_) => Some(extract::extract_month_table(
                self.bound_sheet(workbook, &resolved, LogicalSheet::ExpenseProjection)?,
                &schemas.expense_projection,
                labels,
            )?),
            None => None,
        };
        let assumptions = extract::extract_scalar_list(
            self.bound_sheet(workbook, &resolved, LogicalSheet::Assumptions)?,
            &schemas.assumptions,
        )?;
        let cost_sheet = self.bound_sheet(workbook, &resolved, LogicalSheet::CostModel)?;
        let activities = extract::extract_matrix(cost_sheet, &schemas.cost_model.activity_anchor)?;
        let services = extract::extract_matrix(cost_sheet, &schemas.cost_model.service_anchor)?;
        let taxes = extract::extract_month_table(
            self.bound_sheet(workbook, &resolved, LogicalSheet::Taxes)?,
            &schemas.taxes,
            labels,
        )?;

        let model = normalize::build_model(
            ExtractedWorkbook {
                company: company.to_string(),
                branch: branch.to_string(),
                income_statement,
                cash_flow,
                expense_projection,
                assumptions,
                activities,
                services,
                taxes,
            },
            self.config,
        )?;

        validate::validate_model(&model, self.config.tolerance)?;

        info!(
            "Budget model for {} reconciled over {} periods",
            company,
            model.n_periods()
        );
        Ok(model)
    }

    pub fn ingest_and_derive(
        &self,
        workbook: &Workbook,
        company: &str,
        branch: &str,
    ) -> Result<(BudgetModel, IndicatorSet)> {
        let model = self.ingest(workbook, company, branch)?;
        let indicators = metrics::derive_indicators(&model, self.config);
        Ok((model, indicators))
    }

    fn bound_sheet<'w>(
        &self,
        workbook: &'w Workbook,
        resolved: &ResolvedSheets,
        statement: LogicalSheet,
    ) -> Result<&'w Sheet> {
        let missing = || BudgetError::SheetNotFound {
            statement: statement.to_string(),
            tried: self.config.sheets.rule(statement).candidates.clone(),
        };
        let name = resolved.name(statement).ok_or_else(missing)?;
        workbook.sheet(name).ok_or_else(missing)
    }
}

pub fn ingest_workbook(
    workbook: &Workbook,
    config: &IngestConfig,
    company: &str,
    branch: &str,
) -> Result<BudgetModel> {
    BudgetIngestor::new(config).ingest(workbook, company, branch)
}

pub fn ingest_and_derive(
    workbook: &Workbook,
    config: &IngestConfig,
    company: &str,
    branch: &str,
) -> Result<(BudgetModel, IndicatorSet)> {
    BudgetIngestor::new(config).ingest_and_derive(workbook, company, branch)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> Cell {
        Cell::from(s)
    }

    fn n(v: f64) -> Cell {
        Cell::from(v)
    }

    fn two_month_config() -> IngestConfig {
        let mut config = IngestConfig::for_year(2026);
        config.month_labels = vec!["Jan".to_string(), "Fev".to_string()];
        config
    }

    fn clinic_workbook() -> Workbook {
        let dre = Sheet::new(
            "DRE",
            vec![
                vec![t(""), t("Jan"), t("Fev")],
                vec![t("Pilates"), n(60.0), n(60.0)],
                vec![t("Fisioterapia"), n(40.0), n(40.0)],
                vec![t("Receita Líquida"), n(100.0), n(100.0)],
                vec![t("(-) Materiais"), n(-60.0), n(-60.0)],
                vec![t("Total Custos Variáveis"), n(-60.0), n(-60.0)],
                vec![t("Margem de Contribuição"), n(40.0), n(40.0)],
                vec![t("(-) Aluguel"), n(-30.0), n(-30.0)],
                vec![t("Total Custos Fixos"), n(-30.0), n(-30.0)],
                vec![t("EBITDA"), n(10.0), n(10.0)],
                vec![t("Resultado Financeiro Líquido"), n(0.0), n(0.0)],
                vec![t("Resultado Líquido"), n(10.0), n(10.0)],
            ],
        );
        let cash = Sheet::new(
            "9_Fluxo_Caixa",
            vec![
                vec![t(""), t("Jan"), t("Fev")],
                vec![t("(+) Recebimentos"), n(100.0), n(100.0)],
                vec![t("Total Entradas"), n(100.0), n(100.0)],
                vec![t("(-) Pagamentos"), n(-90.0), n(-90.0)],
                vec![t("Total Saídas"), n(-90.0), n(-90.0)],
                vec![t("(+/-) Variação"), n(10.0), n(10.0)],
                vec![t("Saldo Final"), n(60.0), n(70.0)],
            ],
        );
        let expenses = Sheet::new(
            "Projeção Despesas",
            vec![
                vec![t(""), t("Jan"), t("Fev")],
                vec![t("Aluguel"), n(18.0), n(18.0)],
                vec![t("Energia"), n(12.0), n(12.0)],
                vec![t("Total Despesas"), n(30.0), n(30.0)],
            ],
        );
        let assumptions = Sheet::new(
            "Premissas Metas",
            vec![
                vec![t("Caixa Inicial"), n(50.0)],
                vec![t("IPCA"), n(0.045)],
            ],
        );
        let tdabc = Sheet::new(
            "TDABC",
            vec![
                vec![t("Atividade"), t("Tipo"), t("Capacidade"), t("Jan"), t("Fev")],
                vec![t("Atendimento"), t("Variável"), n(160.0), n(60.0), n(60.0)],
                vec![t("Estrutura"), t("Fixo"), n(160.0), n(30.0), n(30.0)],
                vec![],
                vec![t("Serviço"), t("Atendimento"), t("Estrutura")],
                vec![t("Pilates"), n(80.0), n(40.0)],
                vec![t("Fisioterapia"), n(40.0), n(20.0)],
            ],
        );
        let simples = Sheet::new(
            "Simples Nacional",
            vec![
                vec![t(""), t("Jan"), t("Fev")],
                vec![t("Receita Bruta Mensal"), n(100.0), n(100.0)],
                vec![t("Folha de Pagamento"), n(30.0), n(30.0)],
            ],
        );
        Workbook::from_sheets(vec![dre, cash, expenses, assumptions, tdabc, simples])
    }

    #[test]
    fn test_end_to_end_ingestion() {
        let config = two_month_config();
        let workbook = clinic_workbook();

        let (model, indicators) =
            ingest_and_derive(&workbook, &config, "Clínica Exemplo", "Matriz").unwrap();

        assert_eq!(model.n_periods(), 2);
        assert_eq!(model.income_statement.net_result.values, vec![10.0, 10.0]);
        assert_eq!(model.income_statement.direct_costs.values, vec![60.0, 60.0]);
        assert_eq!(model.cash_flow.ending_balance.values, vec![60.0, 70.0]);
        assert_eq!(model.expenses.items.len(), 2);
        assert_eq!(model.cost_model.activities.len(), 2);
        assert_eq!(model.cost_model.services.len(), 2);
        assert_eq!(model.taxes.schedule.len(), 2);

        assert!((indicators.annual.das - 12.0).abs() < 1e-9);
        assert_eq!(indicators.revenue_mix.len(), 2);
        assert!((indicators.revenue_mix[0].share.unwrap() - 0.6).abs() < 1e-9);
        assert_eq!(indicators.safety_risk[0], Some(RiskLevel::Moderate));
    }

    #[test]
    fn test_missing_required_sheet() {
        let config = two_month_config();
        let mut sheets: Vec<Sheet> = clinic_workbook().sheets().to_vec();
        sheets.retain(|s| s.name != "9_Fluxo_Caixa");
        let workbook = Workbook::from_sheets(sheets);

        let err = ingest_workbook(&workbook, &config, "Clínica", "Matriz").unwrap_err();
        match err {
            BudgetError::SheetNotFound { statement, .. } => {
                assert_eq!(statement, "Fluxo de Caixa");
            }
            other => panic!("expected SheetNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_config_is_rejected_before_reading() {
        let mut config = two_month_config();
        config.tolerance = 0.0;

        let err = ingest_workbook(&clinic_workbook(), &config, "Clínica", "Matriz").unwrap_err();
        assert!(matches!(err, BudgetError::InvalidConfig(_)));
    }
}
