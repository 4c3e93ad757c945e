//! Binds logical statements to physical sheet tabs.
//!
//! Matching runs in three tiers: exact tab name, folded equality, then
//! folded substring in either direction. Within a tier, configured
//! candidates are tried in order of preference; a single candidate hitting
//! two tabs is an error rather than a guess.

use crate::config::IngestConfig;
use crate::error::{BudgetError, Result};
use crate::schema::LogicalSheet;
use crate::utils::fold_label;
use crate::workbook::Workbook;
use log::debug;
use std::collections::BTreeMap;

/// The tab name chosen for each logical statement.
#[derive(Debug, Clone)]
pub struct ResolvedSheets {
    bound: BTreeMap<LogicalSheet, String>,
}

impl ResolvedSheets {
    pub fn name(&self, sheet: LogicalSheet) -> Option<&str> {
        self.bound.get(&sheet).map(|s| s.as_str())
    }
}

pub fn locate_sheets(workbook: &Workbook, config: &IngestConfig) -> Result<ResolvedSheets> {
    let names = workbook.sheet_names();
    let mut bound = BTreeMap::new();

    for sheet in LogicalSheet::ALL {
        let rule = config.sheets.rule(sheet);
        match locate_one(&names, &rule.candidates) {
            Ok(Some(name)) => {
                debug!("statement '{}' bound to sheet '{}'", sheet, name);
                bound.insert(sheet, name);
            }
            Ok(None) => {
                if rule.required {
                    return Err(BudgetError::SheetNotFound {
                        statement: sheet.to_string(),
                        tried: rule.candidates.clone(),
                    });
                }
                debug!("optional statement '{}' has no sheet; skipping", sheet);
            }
            Err(candidates) => {
                return Err(BudgetError::AmbiguousSheet {
                    statement: sheet.to_string(),
                    candidates,
                });
            }
        }
    }

    Ok(ResolvedSheets { bound })
}

fn locate_one(
    names: &[&str],
    candidates: &[String],
) -> std::result::Result<Option<String>, Vec<String>> {
    let folded_names: Vec<String> = names.iter().map(|n| fold_label(n)).collect();

    for tier in 0..3 {
        for candidate in candidates {
            let folded_candidate = fold_label(candidate);
            if folded_candidate.is_empty() {
                continue;
            }

            let matches: Vec<String> = names
                .iter()
                .zip(folded_names.iter())
                .filter(|(name, folded)| match tier {
                    0 => **name == candidate.as_str(),
                    1 => folded.as_str() == folded_candidate,
                    _ => {
                        folded.contains(&folded_candidate)
                            || folded_candidate.contains(folded.as_str())
                    }
                })
                .map(|(name, _)| name.to_string())
                .collect();

            match matches.len() {
                0 => continue,
                1 => return Ok(matches.into_iter().next()),
                _ => return Err(matches),
            }
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workbook::Sheet;

    fn workbook_with(tabs: &[&str]) -> Workbook {
        Workbook::from_sheets(tabs.iter().map(|t| Sheet::new(*t, vec![])).collect())
    }

    fn standard_workbook() -> Workbook {
        workbook_with(&[
            "DRE",
            "9_Fluxo_Caixa",
            "Projeção Despesas",
            "Premissas Metas",
            "TDABC",
            "Simples Nacional",
        ])
    }

    #[test]
    fn test_locates_all_standard_tabs() {
        let config = IngestConfig::for_year(2026);
        let resolved = locate_sheets(&standard_workbook(), &config).unwrap();
        assert_eq!(resolved.name(LogicalSheet::IncomeStatement), Some("DRE"));
        assert_eq!(resolved.name(LogicalSheet::CashFlow), Some("9_Fluxo_Caixa"));
        assert_eq!(resolved.name(LogicalSheet::CostModel), Some("TDABC"));
        assert_eq!(resolved.name(LogicalSheet::Taxes), Some("Simples Nacional"));
    }

    #[test]
    fn test_folded_and_substring_fallbacks() {
        let config = IngestConfig::for_year(2026);
        let workbook = workbook_with(&[
            "dre",
            "Fluxo de Caixa 2026",
            "premissas metas",
            "Custeio TDABC",
            "simples nacional",
        ]);
        let resolved = locate_sheets(&workbook, &config).unwrap();
        assert_eq!(resolved.name(LogicalSheet::IncomeStatement), Some("dre"));
        assert_eq!(
            resolved.name(LogicalSheet::CashFlow),
            Some("Fluxo de Caixa 2026")
        );
        assert_eq!(resolved.name(LogicalSheet::CostModel), Some("Custeio TDABC"));
        // Optional statement without a tab resolves to nothing.
        assert_eq!(resolved.name(LogicalSheet::ExpenseProjection), None);
    }

    #[test]
    fn test_candidate_preference_order() {
        let config = IngestConfig::for_year(2026);
        let workbook = workbook_with(&[
            "DRE",
            "Fluxo de Caixa",
            "9_Fluxo_Caixa",
            "Premissas Metas",
            "TDABC",
            "Simples Nacional",
        ]);
        let resolved = locate_sheets(&workbook, &config).unwrap();
        assert_eq!(resolved.name(LogicalSheet::CashFlow), Some("9_Fluxo_Caixa"));
    }

    #[test]
    fn test_missing_required_sheet() {
        let config = IngestConfig::for_year(2026);
        let workbook = workbook_with(&["DRE", "Premissas Metas", "TDABC", "Simples Nacional"]);
        let err = locate_sheets(&workbook, &config).unwrap_err();
        match err {
            BudgetError::SheetNotFound { statement, tried } => {
                assert_eq!(statement, "Fluxo de Caixa");
                assert!(tried.contains(&"9_Fluxo_Caixa".to_string()));
            }
            other => panic!("expected SheetNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_ambiguous_substring_match() {
        let mut config = IngestConfig::for_year(2026);
        config.sheets.cash_flow.candidates = vec!["Fluxo".to_string()];
        let workbook = workbook_with(&[
            "DRE",
            "Fluxo Matriz",
            "Fluxo Filial",
            "Premissas Metas",
            "TDABC",
            "Simples Nacional",
        ]);
        let err = locate_sheets(&workbook, &config).unwrap_err();
        match err {
            BudgetError::AmbiguousSheet {
                statement,
                candidates,
            } => {
                assert_eq!(statement, "Fluxo de Caixa");
                assert_eq!(candidates.len(), 2);
            }
            other => panic!("expected AmbiguousSheet, got {other:?}"),
        }
    }
}
