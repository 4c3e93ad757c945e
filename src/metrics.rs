//! Indicators derived from a validated model.
//!
//! Everything here is a pure function of the model: margins, break-even
//! analysis from the activity cost pools, service profitability under the
//! time-driven costing model, cash trajectory and the per-month result
//! waterfall. Ratios against a near-zero denominator come back as `None`
//! instead of an arbitrary number.

use crate::config::IngestConfig;
use crate::model::{BudgetModel, CostBehavior};
use crate::tax::brackets_for;
use crate::utils::fold_label;
use chrono::NaiveDate;
use log::warn;
use serde::{Deserialize, Serialize};

/// How exposed a month is, read off its margin of safety.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Moderate,
    Elevated,
    Critical,
}

impl RiskLevel {
    pub fn from_margin_of_safety(margin: f64) -> RiskLevel {
        if margin >= 0.30 {
            RiskLevel::Low
        } else if margin >= 0.15 {
            RiskLevel::Moderate
        } else if margin >= 0.05 {
            RiskLevel::Elevated
        } else {
            RiskLevel::Critical
        }
    }
}

/// The month with the least cash on hand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashPoint {
    pub period: NaiveDate,
    pub balance: f64,
}

/// One revenue line's slice of the annual total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevenueShare {
    pub label: String,
    pub total: f64,
    /// Share of the summed detail rows, `None` when the total is ~zero.
    pub share: Option<f64>,
}

/// A service line costed through the activity pools it consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceProfit {
    pub service: String,
    pub revenue: Vec<f64>,
    pub allocated_costs: Vec<f64>,
    pub profit: Vec<f64>,
    pub margin: Vec<Option<f64>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepKind {
    /// A flow added to or subtracted from the running result.
    Delta,
    /// A stated subtotal row, kept for cross-checking the flows.
    Subtotal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaterfallStep {
    pub label: String,
    pub kind: StepKind,
    pub value: f64,
}

/// Revenue-to-net-result bridge for one month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultWaterfall {
    pub period: NaiveDate,
    pub steps: Vec<WaterfallStep>,
    /// Net result minus the sum of the delta steps. ~Zero for a model
    /// that passed validation.
    pub residual: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnualSummary {
    pub revenue: f64,
    pub operating_result: f64,
    pub net_result: f64,
    pub net_margin: Option<f64>,
    pub das: f64,
    /// Total DAS over total taxed revenue.
    pub effective_tax_rate: Option<f64>,
}

/// Every derived figure, one entry per period unless noted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSet {
    pub periods: Vec<NaiveDate>,
    pub gross_margin: Vec<Option<f64>>,
    pub operating_margin: Vec<Option<f64>>,
    pub net_margin: Vec<Option<f64>>,
    /// Summed activity pools flagged as fixed.
    pub fixed_costs: Vec<f64>,
    /// Summed activity pools flagged as variable.
    pub variable_costs: Vec<f64>,
    pub contribution_margin: Vec<f64>,
    pub contribution_margin_ratio: Vec<Option<f64>>,
    pub break_even_revenue: Vec<Option<f64>>,
    pub margin_of_safety: Vec<Option<f64>>,
    pub safety_risk: Vec<Option<RiskLevel>>,
    pub operating_leverage: Vec<Option<f64>>,
    pub cash_balance: Vec<f64>,
    pub net_cash_movement: Vec<f64>,
    pub lowest_cash: Option<CashPoint>,
    pub revenue_mix: Vec<RevenueShare>,
    /// Ranked best to worst by annual profit.
    pub service_profitability: Vec<ServiceProfit>,
    pub waterfalls: Vec<ResultWaterfall>,
    pub effective_tax_rate: Vec<f64>,
    pub annual: AnnualSummary,
    pub warnings: Vec<String>,
}

pub fn derive_indicators(model: &BudgetModel, config: &IngestConfig) -> IndicatorSet {
    let n = model.periods.len();
    let tolerance = config.tolerance;
    let mut warnings = Vec::new();

    let income = &model.income_statement;
    let revenue = &income.revenue.values;

    let ratio_to_revenue = |series: &[f64]| -> Vec<Option<f64>> {
        (0..n)
            .map(|t| {
                let rev = at(revenue, t);
                if rev.abs() <= tolerance {
                    None
                } else {
                    Some(at(series, t) / rev)
                }
            })
            .collect()
    };

    let gross_margin = ratio_to_revenue(&income.gross_result.values);
    let operating_margin = ratio_to_revenue(&income.operating_result.values);
    let net_margin = ratio_to_revenue(&income.net_result.values);

    let mut fixed_costs = vec![0.0; n];
    let mut variable_costs = vec![0.0; n];
    for activity in &model.cost_model.activities {
        let pool = match activity.behavior {
            CostBehavior::Fixed => &mut fixed_costs,
            CostBehavior::Variable => &mut variable_costs,
        };
        for t in 0..n {
            pool[t] += at(&activity.monthly_cost, t);
        }
    }

    let contribution_margin: Vec<f64> =
        (0..n).map(|t| at(revenue, t) - variable_costs[t]).collect();
    let contribution_margin_ratio: Vec<Option<f64>> = (0..n)
        .map(|t| {
            let rev = at(revenue, t);
            if rev.abs() <= tolerance {
                None
            } else {
                Some(contribution_margin[t] / rev)
            }
        })
        .collect();

    let mut undefined_break_even = 0usize;
    let break_even_revenue: Vec<Option<f64>> = (0..n)
        .map(|t| match contribution_margin_ratio[t] {
            Some(ratio) if ratio > 0.0 => Some(fixed_costs[t] / ratio),
            _ => {
                undefined_break_even += 1;
                None
            }
        })
        .collect();
    if undefined_break_even > 0 {
        push_warning(
            &mut warnings,
            format!(
                "break-even revenue is undefined for {} month(s): contribution margin ratio is not positive",
                undefined_break_even
            ),
        );
    }

    let margin_of_safety: Vec<Option<f64>> = (0..n)
        .map(|t| {
            let rev = at(revenue, t);
            match break_even_revenue[t] {
                Some(be) if rev.abs() > tolerance => Some((rev - be) / rev),
                _ => None,
            }
        })
        .collect();
    let safety_risk: Vec<Option<RiskLevel>> = margin_of_safety
        .iter()
        .map(|m| m.map(RiskLevel::from_margin_of_safety))
        .collect();

    // Degree of operating leverage, contribution margin over operating result.
    let operating_leverage: Vec<Option<f64>> = (0..n)
        .map(|t| {
            let result = at(&income.operating_result.values, t);
            if result > tolerance {
                Some(at(&income.gross_result.values, t) / result)
            } else {
                None
            }
        })
        .collect();

    let cash_balance = model.cash_flow.ending_balance.values.clone();
    let net_cash_movement = model.cash_flow.net_movement.values.clone();
    let lowest_cash = model
        .periods
        .iter()
        .zip(cash_balance.iter())
        .min_by(|a, b| a.1.total_cmp(b.1))
        .map(|(period, balance)| CashPoint {
            period: *period,
            balance: *balance,
        });

    let revenue_mix = build_revenue_mix(model, tolerance, &mut warnings);
    let service_profitability = build_service_profitability(model, n, tolerance, &mut warnings);
    let waterfalls = build_waterfalls(model, n, tolerance, &mut warnings);

    let effective_tax_rate: Vec<f64> = model
        .taxes
        .schedule
        .iter()
        .map(|a| a.effective_rate)
        .collect();

    let ceiling_months = model
        .taxes
        .schedule
        .iter()
        .filter(|a| {
            brackets_for(&config.tax, a.annex)
                .last()
                .is_some_and(|b| a.rbt12 > b.upper_limit)
        })
        .count();
    if ceiling_months > 0 {
        push_warning(
            &mut warnings,
            format!(
                "trailing-twelve-month revenue exceeds the Simples Nacional ceiling in {} month(s); the top bracket was applied",
                ceiling_months
            ),
        );
    }

    let annual_revenue: f64 = revenue.iter().sum();
    let annual_das: f64 = model.taxes.schedule.iter().map(|a| a.das).sum();
    let taxed_revenue: f64 = model.taxes.monthly_revenue.values.iter().sum();
    let annual = AnnualSummary {
        revenue: annual_revenue,
        operating_result: income.operating_result.values.iter().sum(),
        net_result: income.net_result.values.iter().sum(),
        net_margin: if annual_revenue.abs() > tolerance {
            Some(income.net_result.values.iter().sum::<f64>() / annual_revenue)
        } else {
            None
        },
        das: annual_das,
        effective_tax_rate: if taxed_revenue.abs() > tolerance {
            Some(annual_das / taxed_revenue)
        } else {
            None
        },
    };

    IndicatorSet {
        periods: model.periods.clone(),
        gross_margin,
        operating_margin,
        net_margin,
        fixed_costs,
        variable_costs,
        contribution_margin,
        contribution_margin_ratio,
        break_even_revenue,
        margin_of_safety,
        safety_risk,
        operating_leverage,
        cash_balance,
        net_cash_movement,
        lowest_cash,
        revenue_mix,
        service_profitability,
        waterfalls,
        effective_tax_rate,
        annual,
        warnings,
    }
}

fn build_revenue_mix(
    model: &BudgetModel,
    tolerance: f64,
    warnings: &mut Vec<String>,
) -> Vec<RevenueShare> {
    let items = &model.income_statement.revenue_items;
    if items.is_empty() {
        push_warning(
            warnings,
            "income statement has no revenue detail rows; revenue mix unavailable".to_string(),
        );
        return Vec::new();
    }

    let totals: Vec<f64> = items.iter().map(|i| i.total()).collect();
    let grand: f64 = totals.iter().sum();
    items
        .iter()
        .zip(totals)
        .map(|(item, total)| RevenueShare {
            label: item.label.clone(),
            total,
            share: if grand.abs() > tolerance {
                Some(total / grand)
            } else {
                None
            },
        })
        .collect()
}

fn build_service_profitability(
    model: &BudgetModel,
    n: usize,
    tolerance: f64,
    warnings: &mut Vec<String>,
) -> Vec<ServiceProfit> {
    // Hourly rate per activity pool; zero-capacity pools cannot be costed.
    let mut unit_costs: Vec<(String, Vec<f64>)> = Vec::new();
    for activity in &model.cost_model.activities {
        if activity.capacity_hours <= 0.0 {
            push_warning(
                warnings,
                format!(
                    "activity '{}' has no practical capacity; excluded from service costing",
                    activity.name
                ),
            );
            continue;
        }
        let rates = (0..n)
            .map(|t| at(&activity.monthly_cost, t) / activity.capacity_hours)
            .collect();
        unit_costs.push((fold_label(&activity.name), rates));
    }

    let mut out = Vec::new();
    for service in &model.cost_model.services {
        let mut allocated = vec![0.0; n];
        for consumption in &service.consumption {
            let folded = fold_label(&consumption.activity);
            if let Some((_, rates)) = unit_costs.iter().find(|(name, _)| *name == folded) {
                for t in 0..n {
                    allocated[t] += consumption.hours * rates[t];
                }
            }
        }

        let revenue = match revenue_for_service(model, &service.name) {
            Some(values) => values,
            None => {
                push_warning(
                    warnings,
                    format!(
                        "no revenue row matches service '{}'; its profitability assumes zero revenue",
                        service.name
                    ),
                );
                vec![0.0; n]
            }
        };

        let profit: Vec<f64> = (0..n).map(|t| at(&revenue, t) - allocated[t]).collect();
        let margin: Vec<Option<f64>> = (0..n)
            .map(|t| {
                let rev = at(&revenue, t);
                if rev.abs() <= tolerance {
                    None
                } else {
                    Some(profit[t] / rev)
                }
            })
            .collect();

        out.push(ServiceProfit {
            service: service.name.clone(),
            revenue,
            allocated_costs: allocated,
            profit,
            margin,
        });
    }

    out.sort_by(|a, b| {
        let pa: f64 = a.profit.iter().sum();
        let pb: f64 = b.profit.iter().sum();
        pb.total_cmp(&pa)
    });
    out
}

fn revenue_for_service(model: &BudgetModel, service: &str) -> Option<Vec<f64>> {
    let folded = fold_label(service);
    let items = &model.income_statement.revenue_items;
    if let Some(item) = items.iter().find(|i| fold_label(&i.label) == folded) {
        return Some(item.values.clone());
    }
    items
        .iter()
        .find(|i| {
            let label = fold_label(&i.label);
            label.contains(folded.as_str()) || folded.contains(label.as_str())
        })
        .map(|i| i.values.clone())
}

fn build_waterfalls(
    model: &BudgetModel,
    n: usize,
    tolerance: f64,
    warnings: &mut Vec<String>,
) -> Vec<ResultWaterfall> {
    let income = &model.income_statement;
    let mut open_months = 0usize;
    let waterfalls = (0..n)
        .map(|t| {
            let revenue = at(&income.revenue.values, t);
            let direct = at(&income.direct_costs.values, t);
            let opex = at(&income.operating_expenses.values, t);
            let financial = at(&income.financial_result.values, t);
            let net = at(&income.net_result.values, t);

            let steps = vec![
                step("Revenue", StepKind::Delta, revenue),
                step("Direct costs", StepKind::Delta, -direct),
                step(
                    "Gross result",
                    StepKind::Subtotal,
                    at(&income.gross_result.values, t),
                ),
                step("Operating expenses", StepKind::Delta, -opex),
                step(
                    "Operating result",
                    StepKind::Subtotal,
                    at(&income.operating_result.values, t),
                ),
                step("Financial result", StepKind::Delta, financial),
                step("Net result", StepKind::Subtotal, net),
            ];
            let residual = net - (revenue - direct - opex + financial);
            if residual.abs() > tolerance {
                open_months += 1;
            }
            ResultWaterfall {
                period: model.periods[t],
                steps,
                residual,
            }
        })
        .collect();
    if open_months > 0 {
        push_warning(
            warnings,
            format!("result waterfall does not close in {} month(s)", open_months),
        );
    }
    waterfalls
}

fn step(label: &str, kind: StepKind, value: f64) -> WaterfallStep {
    WaterfallStep {
        label: label.to_string(),
        kind,
        value,
    }
}

fn push_warning(warnings: &mut Vec<String>, message: String) {
    warn!("{}", message);
    warnings.push(message);
}

fn at(values: &[f64], t: usize) -> f64 {
    values.get(t).copied().unwrap_or(0.0)
}
