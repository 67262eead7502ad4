//! Execution plan analysis engine.
//!
//! Parses a ShowPlan XML document into an immutable operator tree and runs a
//! set of independent diagnostic passes over it: cost and self-cost ranking,
//! cardinality estimate checks, non-sargable predicate detection, missing
//! index extraction, parameter sensitivity, and a family of heuristic
//! detectors (joins, spills, skew, spools, conversions, bitmaps).
//!
//! # Usage
//!
//! ```no_run
//! use sqlplan_advisor::{analyze_plan_text, AnalysisConfig};
//!
//! let xml = std::fs::read_to_string("plan.sqlplan")?;
//! let report = analyze_plan_text(&xml, &AnalysisConfig::default(), None)?;
//! for issue in &report.cardinality_issues {
//!     println!("node {}: est {} vs actual {}", issue.node_id, issue.estimated_rows, issue.actual_rows);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! The engine never connects to a database. The optional index/statistics
//! facts are injected as a plain value ([`models::SchemaFacts`]); their
//! absence only skips the coverage checks.

pub mod analyzer;
pub mod config;
pub mod error;
pub mod models;
pub mod parser;
pub mod render;

pub use analyzer::analyze_plan;
pub use config::AnalysisConfig;
pub use error::{AdvisorError, AdvisorResult};
pub use models::{AnalysisReport, PlanDocument, SchemaFacts};
pub use parser::PlanComposer;

/// Parse and analyze a plan document in one step.
pub fn analyze_plan_text(
    xml: &str,
    config: &AnalysisConfig,
    facts: Option<&SchemaFacts>,
) -> AdvisorResult<AnalysisReport> {
    let composer =
        PlanComposer::new().with_spill_keywords(config.heuristics.spill_keywords.clone());
    let doc = composer.parse(xml)?;
    Ok(analyze_plan(&doc, config, facts))
}
