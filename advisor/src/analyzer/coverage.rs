//! Index and statistics coverage checks.
//!
//! Pure functions over the injected [`SchemaFacts`]: the core never reaches
//! out to a database. Marks suggestions already covered by an existing
//! index, flags stale statistics, and surfaces multi-column statistics
//! opportunities. Staleness is measured against the facts' capture
//! timestamp, keeping the pass deterministic.

use std::collections::HashSet;

use crate::config::CoverageConfig;
use crate::models::{
    normalize_identifier, CoverageReport, ExistingIndex, ExistingStatistics, IndexSuggestion,
    SchemaFacts, StaleStatistic, StatisticsOpportunity,
};

pub struct CoverageAnalyzer;

impl CoverageAnalyzer {
    /// Fill `covered_by` on the suggestions and build the coverage report.
    pub fn analyze(
        suggestions: &mut [IndexSuggestion],
        facts: &SchemaFacts,
        config: &CoverageConfig,
    ) -> CoverageReport {
        for suggestion in suggestions.iter_mut() {
            if let Some(table_facts) = facts.table(&suggestion.table) {
                suggestion.covered_by = table_facts
                    .indexes
                    .iter()
                    .find(|idx| Self::index_covers(idx, suggestion))
                    .map(|idx| idx.name.clone());
            }
        }

        let mut report = CoverageReport::default();
        for (table, table_facts) in &facts.tables {
            for stats in &table_facts.statistics {
                if let Some(reason) = Self::stale_reason(stats, facts, config) {
                    report.stale_statistics.push(StaleStatistic {
                        table: table.clone(),
                        name: stats.name.clone(),
                        last_updated: stats.last_updated,
                        rows: stats.rows,
                        modifications: stats.modification_counter,
                        reason,
                    });
                }
            }
        }
        report.stale_statistics.sort_by(|a, b| b.modifications.cmp(&a.modifications));

        report.statistics_opportunities = Self::statistics_opportunities(suggestions, facts);
        report
    }

    /// Key/include subset matching: every suggested key column must appear
    /// among the index keys, and every include column among keys or includes.
    fn index_covers(index: &ExistingIndex, suggestion: &IndexSuggestion) -> bool {
        let keys: HashSet<String> = index
            .key_columns
            .iter()
            .map(|k| normalize_identifier(&k.name))
            .collect();
        let mut reachable = keys.clone();
        reachable.extend(index.include_columns.iter().map(|c| normalize_identifier(c)));

        suggestion
            .key_columns
            .iter()
            .all(|c| keys.contains(&normalize_identifier(c)))
            && suggestion
                .include_columns
                .iter()
                .all(|c| reachable.contains(&normalize_identifier(c)))
    }

    fn stale_reason(
        stats: &ExistingStatistics,
        facts: &SchemaFacts,
        config: &CoverageConfig,
    ) -> Option<String> {
        let mods = stats.modification_counter;

        if let Some(rows) = stats.rows.filter(|r| *r > 0) {
            let ratio = mods as f64 / rows as f64;
            if ratio >= config.stale_modification_ratio && mods >= config.stale_min_modifications {
                return Some(format!(
                    "{mods} modifications against {rows} rows ({:.0}% churn)",
                    ratio * 100.0
                ));
            }
        }

        if let Some(last_updated) = stats.last_updated {
            let age_days = (facts.captured_at - last_updated).num_days();
            if age_days >= config.stale_age_days && mods >= config.stale_age_min_modifications {
                return Some(format!("not updated for {age_days} days with {mods} modifications"));
            }
        }

        None
    }

    /// Multi-column combinations (from the suggestions' key sets) that no
    /// existing statistics object covers with its column prefix.
    fn statistics_opportunities(
        suggestions: &[IndexSuggestion],
        facts: &SchemaFacts,
    ) -> Vec<StatisticsOpportunity> {
        let mut opportunities = Vec::new();
        let mut seen: HashSet<(String, Vec<String>)> = HashSet::new();

        for suggestion in suggestions {
            let combo: Vec<String> = suggestion
                .key_columns
                .iter()
                .map(|c| normalize_identifier(c))
                .collect();
            if combo.len() < 2 {
                continue;
            }

            let table_key = normalize_identifier(&suggestion.table);
            if !seen.insert((table_key, combo.clone())) {
                continue;
            }

            let covered = facts.table(&suggestion.table).is_some_and(|table_facts| {
                table_facts.statistics.iter().any(|stats| {
                    if stats.columns.len() < combo.len() {
                        return false;
                    }
                    let prefix: HashSet<String> = stats.columns[..combo.len()]
                        .iter()
                        .map(|c| normalize_identifier(c))
                        .collect();
                    combo.iter().all(|c| prefix.contains(c))
                })
            });

            if !covered {
                opportunities.push(StatisticsOpportunity {
                    table: suggestion.table.clone(),
                    columns: suggestion.key_columns.clone(),
                });
            }
        }
        opportunities
    }
}
