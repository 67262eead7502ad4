//! Heuristic detector rules.
//!
//! Independent, stateless rules over the operator tree, organized by detector
//! family. Every threshold comes from [`HeuristicsConfig`], never from an
//! embedded constant.

pub mod bitmap;
pub mod conversion;
pub mod join;
pub mod operator;
pub mod parallelism;
pub mod spill;

use std::collections::HashSet;

use crate::config::HeuristicsConfig;
use crate::models::{Detection, DetectionKind, OperatorNode, PlanDocument, Severity, Statement};

// ============================================================================
// Rule Trait and Context
// ============================================================================

/// Context for rule evaluation.
pub struct RuleContext<'a> {
    pub statement: &'a Statement,
    pub node: &'a OperatorNode,
    pub config: &'a HeuristicsConfig,
    /// Whether the statement's tree contains any sort operator.
    pub statement_has_sort: bool,
}

impl RuleContext<'_> {
    /// Row count a size check should use: actual when available, estimate
    /// otherwise.
    pub fn output_rows(&self) -> Option<f64> {
        self.node
            .actual_rows()
            .map(|r| r as f64)
            .or(self.node.est_rows)
    }

    pub fn node_label(&self) -> String {
        format!("{} (node {})", self.node.physical_op, self.node.node_id)
    }
}

/// Trait for heuristic detector rules.
pub trait HeuristicRule: Send + Sync {
    /// Rule ID (e.g. "J001", "OP002").
    fn id(&self) -> &'static str;

    /// Rule name.
    fn name(&self) -> &'static str;

    /// Detector family this rule reports under.
    fn kind(&self) -> DetectionKind;

    /// Cheap pre-filter on the node.
    fn applicable_to(&self, node: &OperatorNode) -> bool;

    /// Evaluate the rule and return a detection if triggered.
    fn evaluate(&self, ctx: &RuleContext) -> Option<Detection>;
}

/// Build a detection with the rule's identity filled in.
pub(crate) fn detection(
    rule: &dyn HeuristicRule,
    ctx: &RuleContext,
    severity: Severity,
    detail: String,
) -> Detection {
    Detection {
        rule_id: rule.id().to_string(),
        rule_name: rule.name().to_string(),
        kind: rule.kind(),
        severity,
        statement_id: ctx.statement.id,
        node_id: ctx.node.node_id,
        detail,
    }
}

// ============================================================================
// Rule Registry
// ============================================================================

/// Get all registered rules.
pub fn get_all_rules() -> Vec<Box<dyn HeuristicRule>> {
    let mut rules: Vec<Box<dyn HeuristicRule>> = Vec::new();

    // Join checks (J001-J005)
    rules.extend(join::get_rules());

    // Spill detection (SP001)
    rules.extend(spill::get_rules());

    // Parallelism skew (PX001)
    rules.extend(parallelism::get_rules());

    // Plan-affecting conversions (CV001)
    rules.extend(conversion::get_rules());

    // Bitmap / index intersection (BM001-BM002)
    rules.extend(bitmap::get_rules());

    // Operator red flags (OP001-OP006)
    rules.extend(operator::get_rules());

    rules
}

// ============================================================================
// Rule Engine
// ============================================================================

/// Runs every registered rule over every operator of every statement.
pub struct RuleEngine {
    rules: Vec<Box<dyn HeuristicRule>>,
}

impl RuleEngine {
    pub fn new() -> Self {
        Self { rules: get_all_rules() }
    }

    /// Evaluate all rules; results are deduplicated per (rule, statement,
    /// node) and sorted most severe first.
    pub fn run(&self, doc: &PlanDocument, config: &HeuristicsConfig) -> Vec<Detection> {
        let mut detections = Vec::new();
        let mut seen: HashSet<(String, i32, i32)> = HashSet::new();

        for statement in &doc.statements {
            let statement_has_sort = statement.root.walk().any(|n| n.is_sort());
            for node in statement.root.walk() {
                let ctx = RuleContext { statement, node, config, statement_has_sort };
                for rule in &self.rules {
                    if !rule.applicable_to(node) {
                        continue;
                    }
                    if let Some(det) = rule.evaluate(&ctx) {
                        if seen.insert((det.rule_id.clone(), det.statement_id, det.node_id)) {
                            detections.push(det);
                        }
                    }
                }
            }
        }

        detections.sort_by(|a, b| b.severity.cmp(&a.severity));
        detections
    }
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new()
    }
}
