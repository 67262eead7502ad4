//! Text rendering of the analysis report.

use std::io::{self, Write};

use crate::models::{AnalysisReport, EstimateDirection, RankedOperator, Severity};

/// Write the sectioned text report.
pub fn render_text(report: &AnalysisReport, out: &mut impl Write) -> io::Result<()> {
    section(out, "Statements")?;
    for stmt in &report.statements {
        let marker = if stmt.chosen { "*" } else { " " };
        writeln!(
            out,
            " {marker} [{}] cost {}  params {}  {}",
            stmt.id,
            stmt.subtree_cost.map(|c| format!("{c:.4}")).unwrap_or_else(|| "?".to_string()),
            stmt.parameter_count,
            ellipsize(&stmt.text, 100)
        )?;
    }
    if let Some(dop) = report.degree_of_parallelism {
        writeln!(out, "   degree of parallelism: {dop}")?;
    }
    if let Some(grant) = &report.memory_grant {
        writeln!(
            out,
            "   memory grant: requested {} KB, granted {} KB, max used {} KB, waited {} s",
            opt(grant.requested_kb),
            opt(grant.granted_kb),
            opt(grant.max_used_kb),
            opt(grant.grant_wait_seconds)
        )?;
    }
    for hit in &report.spill_keyword_hits {
        writeln!(out, "   raw document: \"{}\" appears {} times", hit.keyword, hit.count)?;
    }

    section(out, "Top operators by total cost")?;
    for entry in &report.top_cost_operators {
        ranked_line(out, entry, entry.est_cost)?;
    }

    section(out, "Top operators by self cost")?;
    for entry in report.top_self_cost_operators.iter().filter(|e| !e.in_total_top) {
        ranked_line(out, entry, entry.est_self_cost)?;
    }

    if !report.cardinality_issues.is_empty() {
        section(out, "Cardinality estimate issues")?;
        for issue in &report.cardinality_issues {
            let direction = match issue.direction {
                EstimateDirection::UnderEstimate => "under-estimate",
                EstimateDirection::OverEstimate => "over-estimate",
                EstimateDirection::Exact => "exact",
            };
            writeln!(
                out,
                "   [{}/{}] {}: est {:.0} vs actual {} ({direction}, ratio {:.1}, severity {:.1})",
                issue.statement_id,
                issue.node_id,
                issue.operator,
                issue.estimated_rows,
                issue.actual_rows,
                issue.ratio,
                issue.severity
            )?;
            for cause in &issue.likely_causes {
                writeln!(out, "       - {cause}")?;
            }
        }
    }

    if !report.sargability_issues.is_empty() {
        section(out, "Non-sargable predicates")?;
        for issue in &report.sargability_issues {
            writeln!(
                out,
                "   [{}/{}] {:?}: {} -- {}",
                issue.statement_id,
                issue.node_id,
                issue.kind,
                issue.detail,
                ellipsize(&issue.expression, 90)
            )?;
        }
    }

    if !report.index_suggestions.is_empty() {
        section(out, "Missing index suggestions")?;
        for suggestion in &report.index_suggestions {
            write!(out, "   impact {:.1}", suggestion.impact)?;
            if suggestion.duplicate_count > 1 {
                write!(out, " (x{})", suggestion.duplicate_count)?;
            }
            if let Some(covered_by) = &suggestion.covered_by {
                write!(out, " [covered by {covered_by}]")?;
            }
            writeln!(out, "  {}", suggestion.create_statement)?;
        }
    }

    if !report.parameter_sensitivity.is_empty() {
        section(out, "Parameter sensitivity")?;
        for entry in &report.parameter_sensitivity {
            writeln!(
                out,
                "   [{}] {} compiled {} -> runtime {}{}{}",
                entry.statement_id,
                entry.name,
                entry.compiled_value.as_deref().unwrap_or("?"),
                entry.runtime_value.as_deref().unwrap_or("?"),
                entry
                    .ratio
                    .map(|r| format!(" (ratio {r:.0})"))
                    .unwrap_or_default(),
                if entry.changed { "  CHANGED" } else { "" }
            )?;
        }
    }

    if !report.detections.is_empty() {
        section(out, "Detector signals")?;
        for det in &report.detections {
            let severity = match det.severity {
                Severity::Error => "ERROR",
                Severity::Warning => "WARN ",
                Severity::Info => "info ",
            };
            writeln!(
                out,
                "   {severity} {} [{}/{}] {}: {}",
                det.rule_id, det.statement_id, det.node_id, det.rule_name, det.detail
            )?;
        }
    }

    if let Some(coverage) = &report.coverage {
        if !coverage.stale_statistics.is_empty() {
            section(out, "Stale statistics")?;
            for stale in &coverage.stale_statistics {
                writeln!(out, "   {} on {}: {}", stale.name, stale.table, stale.reason)?;
            }
        }
        if !coverage.statistics_opportunities.is_empty() {
            section(out, "Multi-column statistics opportunities")?;
            for opp in &coverage.statistics_opportunities {
                writeln!(out, "   {} ({})", opp.table, opp.columns.join(", "))?;
            }
        }
    }

    Ok(())
}

fn section(out: &mut impl Write, title: &str) -> io::Result<()> {
    writeln!(out, "\n== {title} ==")
}

fn ranked_line(out: &mut impl Write, entry: &RankedOperator, cost: f64) -> io::Result<()> {
    writeln!(
        out,
        "   {cost:>10.4}  [{}/{}] {} ({}){}",
        entry.statement_id,
        entry.node_id,
        entry.physical_op,
        entry.logical_op,
        entry
            .objects
            .first()
            .map(|o| format!("  {o}"))
            .unwrap_or_default()
    )
}

fn ellipsize(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut prefix: String = s.chars().take(max).collect();
        prefix.push_str("...");
        prefix
    }
}

fn opt(v: Option<u64>) -> String {
    v.map(|v| v.to_string()).unwrap_or_else(|| "?".to_string())
}
