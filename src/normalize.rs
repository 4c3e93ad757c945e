//! Builds the typed model from extracted tables.
//!
//! Normalization is all-or-nothing: any missing binding, malformed cell or
//! unknown activity fails the whole ingestion rather than producing a
//! partially filled model. Sign conventions are applied here, so the model
//! holds costs and outflows as positive magnitudes, and detail rows are
//! bucketed under the nearest canonical row that follows them in the sheet.

use crate::config::{IngestConfig, TaxTables};
use crate::error::{BudgetError, Result};
use crate::extract::{
    coerce_optional, coerce_required, ExtraSeries, MatchedSeries, MatrixTable, MonthTable,
    ScalarTable,
};
use crate::model::{
    Activity, ActivityConsumption, AssumptionSet, BudgetModel, CashFlow, CostBehavior, CostModel,
    ExpenseProjection, IncomeStatement, LineItem, NamedScalar, ServiceUsage, TaxComputation,
};
use crate::schema::{keys, CostModelSchema, PercentStyle, RowSpec, SheetSchema, SignConvention, Unit};
use crate::utils::{column_label, fold_label};
use crate::workbook::Cell;
use chrono::NaiveDate;
use log::debug;

/// The raw tables pulled from one workbook, ready to be assembled.
#[derive(Debug, Clone)]
pub struct ExtractedWorkbook {
    pub company: String,
    pub branch: String,
    pub income_statement: MonthTable,
    pub cash_flow: MonthTable,
    pub expense_projection: Option<MonthTable>,
    pub assumptions: ScalarTable,
    pub activities: MatrixTable,
    pub services: MatrixTable,
    pub taxes: MonthTable,
}

pub fn build_model(input: ExtractedWorkbook, config: &IngestConfig) -> Result<BudgetModel> {
    let periods = config.periods();
    let n = periods.len();
    let style = config.percent_style;

    let income_statement = normalize_income(
        &input.income_statement,
        &config.statements.income_statement,
        style,
        n,
    )?;
    let cash_flow = normalize_cash_flow(&input.cash_flow, &config.statements.cash_flow, style)?;
    let expenses = normalize_expenses(
        input.expense_projection.as_ref(),
        &config.statements.expense_projection,
        style,
    )?;
    let assumptions =
        normalize_assumptions(&input.assumptions, &config.statements.assumptions, style)?;
    let cost_model = normalize_cost_model(
        &input.activities,
        &input.services,
        &config.statements.cost_model,
        &config.month_labels,
    )?;
    let taxes = normalize_taxes(
        &input.taxes,
        &config.statements.taxes,
        style,
        &periods,
        &config.tax,
    )?;

    debug!(
        "assembled model for {} / {} over {} periods",
        input.company, input.branch, n
    );

    Ok(BudgetModel {
        company: input.company,
        branch: input.branch,
        fiscal_year: config.fiscal_year,
        periods,
        income_statement,
        cash_flow,
        expenses,
        assumptions,
        cost_model,
        taxes,
    })
}

fn line_item(series: &MatchedSeries, spec: &RowSpec, style: PercentStyle) -> LineItem {
    let mut values = series.values.clone();
    if spec.sign == SignConvention::Negated {
        for v in values.iter_mut() {
            *v = -*v;
        }
    }
    if spec.unit == Unit::Percentage && style == PercentStyle::WholePoints {
        // Cells written with a literal '%' left the extractor as fractions
        // already and must not be divided twice.
        for (v, &percent) in values.iter_mut().zip(&series.percent_cells) {
            if !percent {
                *v /= 100.0;
            }
        }
    }
    LineItem::new(series.label.clone(), spec.unit, values)
}

fn required_item(
    table: &MonthTable,
    schema: &SheetSchema,
    key: &str,
    style: PercentStyle,
) -> Result<LineItem> {
    let spec = schema.row(key).ok_or_else(|| {
        BudgetError::InvalidConfig(format!(
            "schema for sheet '{}' lacks required row '{}'",
            table.sheet, key
        ))
    })?;
    let series = table.series(key).ok_or_else(|| BudgetError::LineItemNotFound {
        sheet: table.sheet.clone(),
        item: key.to_string(),
        patterns: spec.patterns.clone(),
    })?;
    Ok(line_item(series, spec, style))
}

/// An optional row: present in the sheet or not at all.
fn present_item(
    table: &MonthTable,
    schema: &SheetSchema,
    key: &str,
    style: PercentStyle,
) -> Option<LineItem> {
    let spec = schema.row(key)?;
    table.series(key).map(|series| line_item(series, spec, style))
}

/// An optional row that falls back to a synthesized constant series when
/// the sheet does not carry it.
fn item_or_default(
    table: &MonthTable,
    schema: &SheetSchema,
    key: &str,
    style: PercentStyle,
    label: &str,
    n: usize,
) -> LineItem {
    match schema.row(key) {
        None => LineItem::zeros(label, Unit::Currency, n),
        Some(spec) => match table.series(key) {
            Some(series) => line_item(series, spec, style),
            None => LineItem::new(label, spec.unit, vec![spec.default.unwrap_or(0.0); n]),
        },
    }
}

fn normalize_income(
    table: &MonthTable,
    schema: &SheetSchema,
    style: PercentStyle,
    n: usize,
) -> Result<IncomeStatement> {
    let revenue = required_item(table, schema, keys::REVENUE, style)?;
    let direct_costs = required_item(table, schema, keys::DIRECT_COSTS, style)?;
    let gross_result = required_item(table, schema, keys::GROSS_RESULT, style)?;
    let operating_expenses = required_item(table, schema, keys::OPERATING_EXPENSES, style)?;
    let operating_result = required_item(table, schema, keys::OPERATING_RESULT, style)?;
    let net_result = required_item(table, schema, keys::NET_RESULT, style)?;
    let financial_result =
        item_or_default(table, schema, keys::FINANCIAL_RESULT, style, "Financial result", n);
    let gross_revenue = present_item(table, schema, keys::GROSS_REVENUE, style);
    let deductions = present_item(table, schema, keys::DEDUCTIONS, style);

    let has_gross = gross_revenue.is_some();
    let mut revenue_items = Vec::new();
    let mut deduction_items = Vec::new();
    let mut direct_cost_items = Vec::new();
    let mut operating_expense_items = Vec::new();
    let mut financial_items = Vec::new();

    let bounds = canonical_bounds(table);
    for extra in &table.extras {
        let Some(key) = bucket_key(&bounds, extra.row) else {
            debug!(
                "sheet '{}': detail row '{}' sits below every canonical row; dropped",
                table.sheet, extra.label
            );
            continue;
        };
        match key {
            keys::GROSS_REVENUE => revenue_items.push(detail(extra, false)),
            keys::DEDUCTIONS => deduction_items.push(detail(extra, true)),
            // Without a gross revenue row, net revenue tops the statement
            // and the rows above it are the service revenue lines.
            keys::REVENUE if has_gross => deduction_items.push(detail(extra, true)),
            keys::REVENUE => revenue_items.push(detail(extra, false)),
            keys::DIRECT_COSTS | keys::GROSS_RESULT => {
                direct_cost_items.push(detail(extra, true))
            }
            keys::OPERATING_EXPENSES | keys::OPERATING_RESULT => {
                operating_expense_items.push(detail(extra, true))
            }
            keys::FINANCIAL_RESULT | keys::NET_RESULT => {
                financial_items.push(detail(extra, false))
            }
            other => {
                debug!(
                    "sheet '{}': detail row '{}' precedes unbucketed row '{}'; dropped",
                    table.sheet, extra.label, other
                );
            }
        }
    }

    Ok(IncomeStatement {
        gross_revenue,
        deductions,
        revenue,
        direct_costs,
        gross_result,
        operating_expenses,
        operating_result,
        financial_result,
        net_result,
        revenue_items,
        deduction_items,
        direct_cost_items,
        operating_expense_items,
        financial_items,
    })
}

fn normalize_cash_flow(
    table: &MonthTable,
    schema: &SheetSchema,
    style: PercentStyle,
) -> Result<CashFlow> {
    let inflows = required_item(table, schema, keys::INFLOWS, style)?;
    let outflows = required_item(table, schema, keys::OUTFLOWS, style)?;
    let net_movement = required_item(table, schema, keys::NET_MOVEMENT, style)?;
    let ending_balance = required_item(table, schema, keys::ENDING_BALANCE, style)?;
    let investment_outflows = present_item(table, schema, keys::INVESTMENT_OUTFLOWS, style);
    let investment_inflows = present_item(table, schema, keys::INVESTMENT_INFLOWS, style);
    let opening_balance = present_item(table, schema, keys::OPENING_BALANCE, style);

    let mut inflow_items = Vec::new();
    let mut outflow_items = Vec::new();

    let bounds = canonical_bounds(table);
    for extra in &table.extras {
        match bucket_key(&bounds, extra.row) {
            Some(keys::INFLOWS) => inflow_items.push(detail(extra, false)),
            Some(keys::OUTFLOWS) => outflow_items.push(detail(extra, true)),
            _ => debug!(
                "sheet '{}': row '{}' is neither an inflow nor an outflow detail; dropped",
                table.sheet, extra.label
            ),
        }
    }

    Ok(CashFlow {
        inflows,
        outflows,
        investment_outflows,
        investment_inflows,
        opening_balance,
        net_movement,
        ending_balance,
        inflow_items,
        outflow_items,
    })
}

fn normalize_expenses(
    table: Option<&MonthTable>,
    schema: &SheetSchema,
    style: PercentStyle,
) -> Result<ExpenseProjection> {
    let Some(table) = table else {
        return Ok(ExpenseProjection {
            items: Vec::new(),
            total: None,
        });
    };

    let total = present_item(table, schema, keys::EXPENSE_TOTAL, style);
    let items = table.extras.iter().map(|e| detail(e, false)).collect();
    Ok(ExpenseProjection { items, total })
}

fn normalize_assumptions(
    table: &ScalarTable,
    schema: &SheetSchema,
    style: PercentStyle,
) -> Result<AssumptionSet> {
    let value = |key: &str| -> Result<f64> {
        let spec = schema.row(key).ok_or_else(|| {
            BudgetError::InvalidConfig(format!(
                "schema for sheet '{}' lacks assumption '{}'",
                table.sheet, key
            ))
        })?;
        match table.scalar(key) {
            Some(m) => Ok(apply_scalar(m.value, m.percent, spec, style)),
            None => spec.default.ok_or_else(|| BudgetError::LineItemNotFound {
                sheet: table.sheet.clone(),
                item: key.to_string(),
                patterns: spec.patterns.clone(),
            }),
        }
    };

    Ok(AssumptionSet {
        opening_cash: value(keys::OPENING_CASH)?,
        inflation_ipca: value(keys::INFLATION_IPCA)?,
        inflation_igpm: value(keys::INFLATION_IGPM)?,
        wage_adjustment: value(keys::WAGE_ADJUSTMENT)?,
        tariff_adjustment: value(keys::TARIFF_ADJUSTMENT)?,
        contract_adjustment: value(keys::CONTRACT_ADJUSTMENT)?,
        credit_card_fee: value(keys::CREDIT_CARD_FEE)?,
        debit_card_fee: value(keys::DEBIT_CARD_FEE)?,
        prepayment_fee: value(keys::PREPAYMENT_FEE)?,
        extras: table
            .extras
            .iter()
            .map(|e| NamedScalar {
                label: e.label.clone(),
                value: e.value,
            })
            .collect(),
    })
}

// An explicit '%' in the source text already made the value a fraction.
fn apply_scalar(value: f64, percent: bool, spec: &RowSpec, style: PercentStyle) -> f64 {
    if spec.unit == Unit::Percentage && style == PercentStyle::WholePoints && !percent {
        value / 100.0
    } else {
        value
    }
}

fn normalize_cost_model(
    activities: &MatrixTable,
    services: &MatrixTable,
    cfg: &CostModelSchema,
    month_labels: &[String],
) -> Result<CostModel> {
    let behavior_idx = find_matrix_column(activities, &cfg.behavior_column)?;
    let capacity_idx = find_matrix_column(activities, &cfg.capacity_column)?;
    let month_idx = matrix_month_columns(activities, month_labels)?;

    let fixed: Vec<String> = cfg.fixed_values.iter().map(|v| fold_label(v)).collect();
    let variable: Vec<String> = cfg.variable_values.iter().map(|v| fold_label(v)).collect();

    let mut parsed_activities: Vec<Activity> = Vec::new();
    let mut seen_activities: Vec<(String, usize)> = Vec::new();
    for row in &activities.rows {
        let folded = fold_label(&row.label);
        if folded.starts_with("total") {
            continue;
        }
        if let Some((_, first)) = seen_activities.iter().find(|(f, _)| *f == folded) {
            return Err(BudgetError::DuplicateLineItem {
                sheet: activities.sheet.clone(),
                item: row.label.clone(),
                rows: vec![first + 1, row.row + 1],
            });
        }
        seen_activities.push((folded, row.row));

        let behavior = parse_behavior(activities, row.row, behavior_idx, &row.cells, &fixed, &variable)?;
        let capacity_col = activities.columns[capacity_idx].col;
        let capacity_hours = coerce_required(
            &activities.sheet,
            row.row,
            capacity_col,
            &row.cells[capacity_idx],
        )?
        .value;
        let mut monthly_cost = Vec::with_capacity(month_idx.len());
        for &idx in &month_idx {
            let col = activities.columns[idx].col;
            monthly_cost.push(
                coerce_required(&activities.sheet, row.row, col, &row.cells[idx])?.value,
            );
        }

        parsed_activities.push(Activity {
            name: row.label.clone(),
            behavior,
            capacity_hours,
            monthly_cost,
        });
    }

    // Service table columns must each name a declared activity.
    let mut column_activity: Vec<Option<String>> = Vec::with_capacity(services.columns.len());
    for column in &services.columns {
        let folded = fold_label(&column.label);
        if folded == "total" {
            column_activity.push(None);
            continue;
        }
        match parsed_activities
            .iter()
            .find(|a| fold_label(&a.name) == folded)
        {
            Some(activity) => column_activity.push(Some(activity.name.clone())),
            None => {
                return Err(BudgetError::UnknownActivity {
                    sheet: services.sheet.clone(),
                    activity: column.label.clone(),
                });
            }
        }
    }

    let mut parsed_services: Vec<ServiceUsage> = Vec::new();
    let mut seen_services: Vec<(String, usize)> = Vec::new();
    for row in &services.rows {
        let folded = fold_label(&row.label);
        if folded.starts_with("total") {
            continue;
        }
        if let Some((_, first)) = seen_services.iter().find(|(f, _)| *f == folded) {
            return Err(BudgetError::DuplicateLineItem {
                sheet: services.sheet.clone(),
                item: row.label.clone(),
                rows: vec![first + 1, row.row + 1],
            });
        }
        seen_services.push((folded, row.row));

        let mut consumption = Vec::new();
        for (idx, activity) in column_activity.iter().enumerate() {
            let Some(activity) = activity else { continue };
            let col = services.columns[idx].col;
            let hours = coerce_optional(&services.sheet, row.row, col, &row.cells[idx])?.value;
            consumption.push(ActivityConsumption {
                activity: activity.clone(),
                hours,
            });
        }

        parsed_services.push(ServiceUsage {
            name: row.label.clone(),
            consumption,
        });
    }

    Ok(CostModel {
        activities: parsed_activities,
        services: parsed_services,
    })
}

fn parse_behavior(
    table: &MatrixTable,
    row: usize,
    behavior_idx: usize,
    cells: &[Cell],
    fixed: &[String],
    variable: &[String],
) -> Result<CostBehavior> {
    let col = table.columns[behavior_idx].col;
    let text = match &cells[behavior_idx] {
        Cell::Text(s) => s.trim(),
        other => {
            return Err(BudgetError::MalformedCell {
                sheet: table.sheet.clone(),
                row: row + 1,
                column: column_label(col),
                detail: format!("expected a cost behavior label, found {:?}", other),
            });
        }
    };
    let folded = fold_label(text);
    if fixed.iter().any(|v| *v == folded) {
        Ok(CostBehavior::Fixed)
    } else if variable.iter().any(|v| *v == folded) {
        Ok(CostBehavior::Variable)
    } else {
        Err(BudgetError::MalformedCell {
            sheet: table.sheet.clone(),
            row: row + 1,
            column: column_label(col),
            detail: format!("unrecognized cost behavior '{}'", text),
        })
    }
}

fn find_matrix_column(table: &MatrixTable, patterns: &[String]) -> Result<usize> {
    let folded: Vec<String> = patterns
        .iter()
        .map(|p| fold_label(p))
        .filter(|p| !p.is_empty())
        .collect();
    table
        .columns
        .iter()
        .position(|c| {
            let label = fold_label(&c.label);
            folded.iter().any(|p| label == *p || label.contains(p.as_str()))
        })
        .ok_or_else(|| BudgetError::LineItemNotFound {
            sheet: table.sheet.clone(),
            item: patterns.first().cloned().unwrap_or_default(),
            patterns: patterns.to_vec(),
        })
}

fn matrix_month_columns(table: &MatrixTable, month_labels: &[String]) -> Result<Vec<usize>> {
    let mut out = Vec::with_capacity(month_labels.len());
    for label in month_labels {
        let folded = fold_label(label);
        let hits: Vec<usize> = table
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| fold_label(&c.label).starts_with(folded.as_str()))
            .map(|(i, _)| i)
            .collect();
        match hits.len() {
            0 => {
                return Err(BudgetError::PeriodMismatch {
                    sheet: table.sheet.clone(),
                    detail: format!("missing period column '{}' in the activity table", label),
                });
            }
            1 => out.push(hits[0]),
            _ => {
                return Err(BudgetError::PeriodMismatch {
                    sheet: table.sheet.clone(),
                    detail: format!("period label '{}' matched several activity columns", label),
                });
            }
        }
    }
    Ok(out)
}

fn normalize_taxes(
    table: &MonthTable,
    schema: &SheetSchema,
    style: PercentStyle,
    periods: &[NaiveDate],
    tables: &TaxTables,
) -> Result<TaxComputation> {
    let monthly_revenue = required_item(table, schema, keys::TAX_REVENUE, style)?;
    let monthly_payroll = required_item(table, schema, keys::PAYROLL, style)?;
    let schedule = crate::tax::build_schedule(
        periods,
        &monthly_revenue.values,
        &monthly_payroll.values,
        tables,
    )?;
    Ok(TaxComputation {
        monthly_revenue,
        monthly_payroll,
        schedule,
    })
}

/// Canonical rows in sheet order, used to assign detail rows to buckets.
fn canonical_bounds(table: &MonthTable) -> Vec<(usize, String)> {
    let mut bounds: Vec<(usize, String)> = table
        .matched
        .iter()
        .map(|m| (m.row, m.key.clone()))
        .collect();
    bounds.sort_by_key(|(row, _)| *row);
    bounds
}

/// The canonical row nearest below a detail row decides its bucket.
fn bucket_key(bounds: &[(usize, String)], extra_row: usize) -> Option<&str> {
    bounds
        .iter()
        .find(|(row, _)| *row > extra_row)
        .map(|(_, key)| key.as_str())
}

fn detail(extra: &ExtraSeries, negate: bool) -> LineItem {
    let values = if negate {
        extra.values.iter().map(|v| -v).collect()
    } else {
        extra.values.clone()
    };
    LineItem::new(extra.label.clone(), Unit::Currency, values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IngestConfig;
    use crate::extract::{ExtraScalar, ExtraSeries, MatchedScalar, MatrixColumn, MatrixRow};

    fn series(key: &str, label: &str, row: usize, values: Vec<f64>) -> MatchedSeries {
        let percent_cells = vec![false; values.len()];
        MatchedSeries {
            key: key.to_string(),
            label: label.to_string(),
            row,
            values,
            percent_cells,
        }
    }

    fn extra(label: &str, row: usize, values: Vec<f64>) -> ExtraSeries {
        ExtraSeries {
            label: label.to_string(),
            row,
            values,
        }
    }

    fn income_table() -> MonthTable {
        MonthTable {
            sheet: "DRE".to_string(),
            matched: vec![
                series(keys::GROSS_REVENUE, "Total da Receita Bruta", 4, vec![110.0, 110.0]),
                series(keys::DEDUCTIONS, "Total Deduções", 7, vec![-10.0, -10.0]),
                series(keys::REVENUE, "Receita Líquida", 8, vec![100.0, 100.0]),
                series(keys::DIRECT_COSTS, "Total Custos Variáveis", 11, vec![-60.0, -60.0]),
                series(keys::GROSS_RESULT, "Margem de Contribuição", 12, vec![40.0, 40.0]),
                series(keys::OPERATING_EXPENSES, "Total Custos Fixos", 15, vec![-30.0, -30.0]),
                series(keys::OPERATING_RESULT, "EBITDA", 16, vec![10.0, 10.0]),
                series(keys::NET_RESULT, "Resultado Líquido", 20, vec![10.0, 10.0]),
            ],
            extras: vec![
                extra("Pilates", 2, vec![66.0, 66.0]),
                extra("Fisioterapia", 3, vec![44.0, 44.0]),
                extra("(-) Simples Nacional", 5, vec![-6.0, -6.0]),
                extra("(-) Taxa Cartão", 6, vec![-4.0, -4.0]),
                extra("(-) Materiais", 9, vec![-35.0, -35.0]),
                extra("(-) Comissões", 10, vec![-25.0, -25.0]),
                extra("(-) Aluguel", 13, vec![-18.0, -18.0]),
                extra("(-) Pessoal", 14, vec![-12.0, -12.0]),
                extra("(+) Rendimentos", 18, vec![1.0, 1.0]),
                extra("Dividendos", 25, vec![5.0, 5.0]),
            ],
        }
    }

    #[test]
    fn test_income_normalization() {
        let config = IngestConfig::for_year(2026);
        let statement = normalize_income(
            &income_table(),
            &config.statements.income_statement,
            PercentStyle::Fraction,
            2,
        )
        .unwrap();

        assert_eq!(statement.revenue.values, vec![100.0, 100.0]);
        // Negated rows come back as positive magnitudes.
        assert_eq!(statement.direct_costs.values, vec![60.0, 60.0]);
        assert_eq!(statement.operating_expenses.values, vec![30.0, 30.0]);
        assert_eq!(statement.deductions.as_ref().unwrap().values, vec![10.0, 10.0]);
        assert_eq!(statement.gross_revenue.as_ref().unwrap().values, vec![110.0, 110.0]);
        // Absent financial row synthesizes zeros.
        assert_eq!(statement.financial_result.values, vec![0.0, 0.0]);

        let names = |items: &[LineItem]| -> Vec<String> {
            items.iter().map(|i| i.label.clone()).collect()
        };
        assert_eq!(names(&statement.revenue_items), vec!["Pilates", "Fisioterapia"]);
        assert_eq!(
            names(&statement.deduction_items),
            vec!["(-) Simples Nacional", "(-) Taxa Cartão"]
        );
        assert_eq!(
            names(&statement.direct_cost_items),
            vec!["(-) Materiais", "(-) Comissões"]
        );
        assert_eq!(
            names(&statement.operating_expense_items),
            vec!["(-) Aluguel", "(-) Pessoal"]
        );
        assert_eq!(names(&statement.financial_items), vec!["(+) Rendimentos"]);
        // Cost detail rows are positive magnitudes too.
        assert_eq!(statement.direct_cost_items[0].values, vec![35.0, 35.0]);
        assert_eq!(statement.financial_items[0].values, vec![1.0, 1.0]);
        // "Dividendos" sits below the last canonical row and is dropped.
    }

    #[test]
    fn test_income_without_gross_revenue_buckets_services_as_revenue() {
        let mut table = income_table();
        table.matched.retain(|m| {
            m.key != keys::GROSS_REVENUE && m.key != keys::DEDUCTIONS
        });
        table.extras.retain(|e| e.row != 5 && e.row != 6);

        let config = IngestConfig::for_year(2026);
        let statement = normalize_income(
            &table,
            &config.statements.income_statement,
            PercentStyle::Fraction,
            2,
        )
        .unwrap();

        assert!(statement.gross_revenue.is_none());
        let labels: Vec<_> = statement
            .revenue_items
            .iter()
            .map(|i| i.label.as_str())
            .collect();
        assert_eq!(labels, vec!["Pilates", "Fisioterapia"]);
        assert!(statement.deduction_items.is_empty());
    }

    #[test]
    fn test_cash_flow_normalization() {
        let config = IngestConfig::for_year(2026);
        let table = MonthTable {
            sheet: "9_Fluxo_Caixa".to_string(),
            matched: vec![
                series(keys::INFLOWS, "Total Entradas", 4, vec![100.0, 100.0]),
                series(keys::OUTFLOWS, "Total Saídas", 8, vec![-90.0, -90.0]),
                series(keys::INVESTMENT_OUTFLOWS, "(-) Aportes Aplicações", 9, vec![2.0, 2.0]),
                series(keys::INVESTMENT_INFLOWS, "(+) Resgates Aplicações", 10, vec![1.0, 1.0]),
                series(keys::OPENING_BALANCE, "Saldo Inicial", 11, vec![50.0, 59.0]),
                series(keys::NET_MOVEMENT, "(+/-) Variação", 12, vec![9.0, 9.0]),
                series(keys::ENDING_BALANCE, "Saldo Final", 13, vec![59.0, 68.0]),
            ],
            extras: vec![
                extra("(+) Recebimentos", 2, vec![95.0, 95.0]),
                extra("(+) Outras Entradas", 3, vec![5.0, 5.0]),
                extra("(-) Fornecedores", 6, vec![-70.0, -70.0]),
                extra("(-) Impostos", 7, vec![-20.0, -20.0]),
            ],
        };

        let cash = normalize_cash_flow(
            &table,
            &config.statements.cash_flow,
            PercentStyle::Fraction,
        )
        .unwrap();

        assert_eq!(cash.inflows.values, vec![100.0, 100.0]);
        assert_eq!(cash.outflows.values, vec![90.0, 90.0]);
        assert_eq!(cash.investment_outflows.as_ref().unwrap().values, vec![2.0, 2.0]);
        assert_eq!(cash.opening_balance.as_ref().unwrap().values, vec![50.0, 59.0]);
        assert_eq!(cash.inflow_items.len(), 2);
        assert_eq!(cash.outflow_items.len(), 2);
        assert_eq!(cash.outflow_items[0].values, vec![70.0, 70.0]);
    }

    #[test]
    fn test_assumptions_defaults_and_percent_style() {
        let config = IngestConfig::for_year(2026);
        let table = ScalarTable {
            sheet: "Premissas Metas".to_string(),
            matched: vec![
                MatchedScalar {
                    key: keys::OPENING_CASH.to_string(),
                    label: "Caixa Inicial".to_string(),
                    row: 1,
                    value: 50_000.0,
                    percent: false,
                },
                MatchedScalar {
                    key: keys::INFLATION_IPCA.to_string(),
                    label: "IPCA".to_string(),
                    row: 2,
                    value: 4.5,
                    percent: false,
                },
            ],
            extras: vec![ExtraScalar {
                label: "Meta Sessões".to_string(),
                row: 9,
                value: 900.0,
            }],
        };

        let assumptions = normalize_assumptions(
            &table,
            &config.statements.assumptions,
            PercentStyle::WholePoints,
        )
        .unwrap();

        assert_eq!(assumptions.opening_cash, 50_000.0);
        // Sheet value rescaled, configured defaults untouched.
        assert!((assumptions.inflation_ipca - 0.045).abs() < 1e-12);
        assert!((assumptions.inflation_igpm - 0.05).abs() < 1e-12);
        assert!((assumptions.credit_card_fee - 0.0354).abs() < 1e-12);
        assert_eq!(assumptions.extras.len(), 1);
        assert_eq!(assumptions.extras[0].label, "Meta Sessões");
    }

    #[test]
    fn test_explicit_percent_text_is_not_rescaled() {
        let config = IngestConfig::for_year(2026);
        let table = ScalarTable {
            sheet: "Premissas Metas".to_string(),
            matched: vec![
                MatchedScalar {
                    key: keys::OPENING_CASH.to_string(),
                    label: "Caixa Inicial".to_string(),
                    row: 1,
                    value: 50_000.0,
                    percent: false,
                },
                // Written "4,5%" in the sheet: already a fraction.
                MatchedScalar {
                    key: keys::INFLATION_IPCA.to_string(),
                    label: "IPCA".to_string(),
                    row: 2,
                    value: 0.045,
                    percent: true,
                },
            ],
            extras: vec![],
        };

        let assumptions = normalize_assumptions(
            &table,
            &config.statements.assumptions,
            PercentStyle::WholePoints,
        )
        .unwrap();

        assert!((assumptions.inflation_ipca - 0.045).abs() < 1e-12);
    }

    #[test]
    fn test_percent_cells_skip_whole_point_scaling_per_cell() {
        let spec = RowSpec {
            unit: Unit::Percentage,
            ..RowSpec::new("occupancy", &["ocupacao"])
        };
        let row = MatchedSeries {
            key: "occupancy".to_string(),
            label: "Ocupação".to_string(),
            row: 3,
            values: vec![0.72, 68.0],
            percent_cells: vec![true, false],
        };

        let item = line_item(&row, &spec, PercentStyle::WholePoints);
        assert!((item.values[0] - 0.72).abs() < 1e-12);
        assert!((item.values[1] - 0.68).abs() < 1e-12);
    }

    fn cost_matrices() -> (MatrixTable, MatrixTable) {
        let activities = MatrixTable {
            sheet: "TDABC".to_string(),
            header_row: 1,
            columns: vec![
                MatrixColumn { label: "Tipo".to_string(), col: 1 },
                MatrixColumn { label: "Capacidade (h)".to_string(), col: 2 },
                MatrixColumn { label: "Jan".to_string(), col: 3 },
                MatrixColumn { label: "Fev".to_string(), col: 4 },
            ],
            rows: vec![
                MatrixRow {
                    label: "Atendimento".to_string(),
                    row: 2,
                    cells: vec![
                        Cell::Text("Variável".to_string()),
                        Cell::Number(160.0),
                        Cell::Number(60.0),
                        Cell::Number(60.0),
                    ],
                },
                MatrixRow {
                    label: "Estrutura".to_string(),
                    row: 3,
                    cells: vec![
                        Cell::Text("Fixo".to_string()),
                        Cell::Number(160.0),
                        Cell::Number(30.0),
                        Cell::Number(30.0),
                    ],
                },
                MatrixRow {
                    label: "Total".to_string(),
                    row: 4,
                    cells: vec![
                        Cell::Empty,
                        Cell::Empty,
                        Cell::Number(90.0),
                        Cell::Number(90.0),
                    ],
                },
            ],
        };
        let services = MatrixTable {
            sheet: "TDABC".to_string(),
            header_row: 6,
            columns: vec![
                MatrixColumn { label: "Atendimento".to_string(), col: 1 },
                MatrixColumn { label: "Estrutura".to_string(), col: 2 },
            ],
            rows: vec![
                MatrixRow {
                    label: "Pilates".to_string(),
                    row: 7,
                    cells: vec![Cell::Number(80.0), Cell::Number(40.0)],
                },
                MatrixRow {
                    label: "Fisioterapia".to_string(),
                    row: 8,
                    cells: vec![Cell::Number(40.0), Cell::Empty],
                },
            ],
        };
        (activities, services)
    }

    #[test]
    fn test_cost_model_normalization() {
        let config = IngestConfig::for_year(2026);
        let labels = vec!["Jan".to_string(), "Fev".to_string()];
        let (activities, services) = cost_matrices();

        let model = normalize_cost_model(
            &activities,
            &services,
            &config.statements.cost_model,
            &labels,
        )
        .unwrap();

        assert_eq!(model.activities.len(), 2, "the Total row is not an activity");
        let atendimento = model.activity("Atendimento").unwrap();
        assert_eq!(atendimento.behavior, CostBehavior::Variable);
        assert_eq!(atendimento.capacity_hours, 160.0);
        assert_eq!(atendimento.monthly_cost, vec![60.0, 60.0]);

        assert_eq!(model.services.len(), 2);
        let fisio = &model.services[1];
        assert_eq!(fisio.consumption[0].hours, 40.0);
        // Empty consumption cells read as zero hours.
        assert_eq!(fisio.consumption[1].hours, 0.0);
    }

    #[test]
    fn test_unknown_service_column() {
        let config = IngestConfig::for_year(2026);
        let labels = vec!["Jan".to_string(), "Fev".to_string()];
        let (activities, mut services) = cost_matrices();
        services.columns[1].label = "Recepção".to_string();

        let err = normalize_cost_model(
            &activities,
            &services,
            &config.statements.cost_model,
            &labels,
        )
        .unwrap_err();
        match err {
            BudgetError::UnknownActivity { activity, .. } => assert_eq!(activity, "Recepção"),
            other => panic!("expected UnknownActivity, got {other:?}"),
        }
    }

    #[test]
    fn test_unrecognized_behavior_cell() {
        let config = IngestConfig::for_year(2026);
        let labels = vec!["Jan".to_string(), "Fev".to_string()];
        let (mut activities, services) = cost_matrices();
        activities.rows[0].cells[0] = Cell::Text("Misto".to_string());

        let err = normalize_cost_model(
            &activities,
            &services,
            &config.statements.cost_model,
            &labels,
        )
        .unwrap_err();
        assert!(matches!(err, BudgetError::MalformedCell { .. }));
    }

    #[test]
    fn test_tax_normalization_builds_schedule() {
        let config = IngestConfig::for_year(2026);
        let periods = crate::utils::period_ends(2026, 1, 2);
        let table = MonthTable {
            sheet: "Simples Nacional".to_string(),
            matched: vec![
                series(keys::TAX_REVENUE, "Receita Bruta Mensal", 1, vec![100.0, 100.0]),
                series(keys::PAYROLL, "Folha de Pagamento", 2, vec![30.0, 30.0]),
            ],
            extras: vec![],
        };

        let taxes = normalize_taxes(
            &table,
            &config.statements.taxes,
            PercentStyle::Fraction,
            &periods,
            &config.tax,
        )
        .unwrap();

        assert_eq!(taxes.schedule.len(), 2);
        assert!((taxes.schedule[0].das - 6.0).abs() < 1e-9);
        assert!((taxes.schedule[1].rbt12 - 200.0).abs() < 1e-9);
    }
}
