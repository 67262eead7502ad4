//! Cardinality estimate analysis.
//!
//! Compares estimated and actual row counts per operator, flags mismatches
//! past the configured thresholds, scores them for ranking, and attributes
//! likely causes from what the node itself shows (access path, predicates,
//! rebinds, warnings).

use std::collections::{HashMap, HashSet};

use crate::config::AnalysisConfig;
use crate::models::{
    AccessKind, CardinalityIssue, EstimateDirection, OperatorNode, PlanDocument,
    SargabilityIssue, StatementCardinalitySummary,
};

/// Symmetric estimate-vs-actual ratio.
///
/// Both zero means no mismatch; exactly one zero is an unbounded miss; both
/// positive yields the larger directional ratio, so `ratio(a, b) == ratio(b, a)`.
pub fn mismatch_ratio(estimated: f64, actual: f64) -> (f64, EstimateDirection) {
    let est_zero = estimated <= 0.0;
    let act_zero = actual <= 0.0;
    match (est_zero, act_zero) {
        (true, true) => (1.0, EstimateDirection::Exact),
        (true, false) => (f64::INFINITY, EstimateDirection::UnderEstimate),
        (false, true) => (f64::INFINITY, EstimateDirection::OverEstimate),
        (false, false) => {
            if actual > estimated {
                (actual / estimated, EstimateDirection::UnderEstimate)
            } else if estimated > actual {
                (estimated / actual, EstimateDirection::OverEstimate)
            } else {
                (1.0, EstimateDirection::Exact)
            }
        },
    }
}

/// Estimate-vs-actual analysis over the whole document.
pub struct CardinalityAnalyzer;

impl CardinalityAnalyzer {
    /// All flagged operators, most severe first, plus the per-statement
    /// roll-up. Sargability issues feed the cause attribution, so the
    /// predicate scan runs first.
    pub fn analyze(
        doc: &PlanDocument,
        config: &AnalysisConfig,
        sargability: &[SargabilityIssue],
    ) -> (Vec<CardinalityIssue>, Vec<StatementCardinalitySummary>) {
        let flagged_nodes: HashSet<(i32, i32)> = sargability
            .iter()
            .map(|i| (i.statement_id, i.node_id))
            .collect();

        let mut issues = Vec::new();
        for (statement, node) in doc.operators() {
            if let Some(issue) = Self::evaluate(statement.id, node, config, &flagged_nodes) {
                issues.push(issue);
            }
        }
        issues.sort_by(|a, b| b.severity.total_cmp(&a.severity));

        let summaries = Self::summarize(&issues);
        (issues, summaries)
    }

    fn evaluate(
        statement_id: i32,
        node: &OperatorNode,
        config: &AnalysisConfig,
        sargable_flags: &HashSet<(i32, i32)>,
    ) -> Option<CardinalityIssue> {
        let estimated = node.est_rows?;
        let runtime = node.runtime.as_ref()?;
        let actual = node.actual_rows()?;

        // Operators that never ran carry meaningless zero counters.
        if runtime.executions == 0 && actual == 0 {
            return None;
        }

        let (ratio, direction) = mismatch_ratio(estimated, actual as f64);
        let scale = estimated.max(actual as f64);
        if ratio < config.cardinality.mismatch_ratio || scale < config.cardinality.min_rows {
            return None;
        }

        let severity =
            ratio.log10() * ((scale + 1.0).log10() + 1.0) * (1.0 + node.est_cost.unwrap_or(0.0));

        Some(CardinalityIssue {
            statement_id,
            node_id: node.node_id,
            operator: node.physical_op.clone(),
            estimated_rows: estimated,
            actual_rows: actual,
            ratio,
            direction,
            severity,
            likely_causes: Self::likely_causes(statement_id, node, sargable_flags),
        })
    }

    /// Best-effort cause attribution from the node's own evidence.
    fn likely_causes(
        statement_id: i32,
        node: &OperatorNode,
        sargable_flags: &HashSet<(i32, i32)>,
    ) -> Vec<String> {
        let mut causes = Vec::new();

        if sargable_flags.contains(&(statement_id, node.node_id)) {
            causes.push("non-sargable predicate prevents accurate selectivity estimation".to_string());
        }

        match node.access.kind {
            AccessKind::Scan | AccessKind::TableScan => {
                if node.access.residual_predicate.is_some() {
                    causes.push(
                        "residual predicate filtered during a scan; estimate depends on column statistics"
                            .to_string(),
                    );
                } else {
                    causes.push("scan access; estimate comes from table-level statistics".to_string());
                }
            },
            _ => {},
        }

        if node.is_join() {
            causes.push("join output estimation; correlated join keys often mislead it".to_string());
        }

        if let Some(rt) = &node.runtime {
            let returned = rt.rows_out.unwrap_or(rt.rows_work);
            if returned > 0 && rt.rows_read_work >= returned.saturating_mul(10) {
                causes.push(format!(
                    "read {} rows to return {}; predicate applied late",
                    rt.rows_read_work, returned
                ));
            }
            if rt.rebinds > 1 {
                causes.push(format!("rebound {} times inside a loop", rt.rebinds));
            }
        }

        for warning in &node.warnings {
            let kind = warning.kind.to_uppercase();
            if kind.contains("NOSTATISTICS") || kind.contains("COLUMNSWITHNOSTATISTICS") {
                causes.push("columns referenced without statistics".to_string());
            }
            if kind.contains("PLANAFFECTINGCONVERT") {
                causes.push("type conversion affected cardinality estimation".to_string());
            }
        }

        causes
    }

    /// Worst node and flagged-node count per statement, ranked by the worst
    /// severity.
    fn summarize(issues: &[CardinalityIssue]) -> Vec<StatementCardinalitySummary> {
        let mut per_statement: HashMap<i32, (usize, &CardinalityIssue)> = HashMap::new();
        for issue in issues {
            per_statement
                .entry(issue.statement_id)
                .and_modify(|(count, worst)| {
                    *count += 1;
                    if issue.severity > worst.severity {
                        *worst = issue;
                    }
                })
                .or_insert((1, issue));
        }

        let mut summaries: Vec<StatementCardinalitySummary> = per_statement
            .into_iter()
            .map(|(statement_id, (flagged_nodes, worst))| StatementCardinalitySummary {
                statement_id,
                flagged_nodes,
                worst: worst.clone(),
            })
            .collect();
        summaries.sort_by(|a, b| b.worst.severity.total_cmp(&a.worst.severity));
        summaries
    }
}
