//! Plan analysis passes.
//!
//! Every pass is an independent read-only walk over the loaded document;
//! none of them mutates the tree or depends on another pass having run,
//! except that cardinality consumes the sargability findings for its cause
//! attribution. [`analyze_plan`] composes them into the report structure the
//! rendering layer consumes.

pub mod cardinality;
pub mod cost;
pub mod coverage;
pub mod missing_index;
pub mod parameters;
pub mod rules;
pub mod sargability;

#[cfg(test)]
mod tests;

pub use rules::RuleEngine;

use crate::config::AnalysisConfig;
use crate::models::{AnalysisReport, PlanDocument, SchemaFacts, StatementSummary};

/// Run every analysis pass over a loaded document.
///
/// `facts` is the optional result of the external index/statistics lookup;
/// `None` (collaborator not requested, or unavailable) skips the coverage
/// checks and nothing else.
pub fn analyze_plan(
    doc: &PlanDocument,
    config: &AnalysisConfig,
    facts: Option<&SchemaFacts>,
) -> AnalysisReport {
    let (top_cost_operators, top_self_cost_operators) = cost::CostAnalyzer::rank(doc, config);

    let sargability_issues = sargability::SargabilityAnalyzer::analyze(doc);
    let (cardinality_issues, statement_cardinality) =
        cardinality::CardinalityAnalyzer::analyze(doc, config, &sargability_issues);

    let (missing_indexes, mut index_suggestions) = missing_index::MissingIndexAnalyzer::analyze(doc);
    let parameter_sensitivity = parameters::ParameterAnalyzer::analyze(doc);
    let detections = RuleEngine::new().run(doc, &config.heuristics);

    let coverage = facts.map(|facts| {
        coverage::CoverageAnalyzer::analyze(&mut index_suggestions, facts, &config.coverage)
    });

    let statements = doc
        .statements
        .iter()
        .enumerate()
        .map(|(position, s)| StatementSummary {
            id: s.id,
            text: s.text.clone(),
            subtree_cost: s.subtree_cost,
            chosen: position == doc.chosen,
            parameter_count: s.parameters.len(),
        })
        .collect();

    tracing::debug!(
        cardinality = cardinality_issues.len(),
        sargability = sargability_issues.len(),
        suggestions = index_suggestions.len(),
        detections = detections.len(),
        "analysis complete"
    );

    AnalysisReport {
        statements,
        degree_of_parallelism: doc.degree_of_parallelism,
        memory_grant: doc.memory_grant.clone(),
        spill_keyword_hits: doc.spill_keyword_hits.clone(),
        top_cost_operators,
        top_self_cost_operators,
        cardinality_issues,
        statement_cardinality,
        sargability_issues,
        missing_indexes,
        index_suggestions,
        parameter_sensitivity,
        detections,
        coverage,
    }
}
