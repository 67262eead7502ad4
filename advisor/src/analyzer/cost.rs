//! Operator cost analysis.
//!
//! Self cost is derived from the declared total-subtree costs: a node's self
//! cost is its total minus the largest child total, clamped at zero. A
//! childless node owns its full total. A node whose children all lack a cost
//! gets zero rather than its full total, which would double count the
//! subtree.

use crate::config::AnalysisConfig;
use crate::models::{OperatorNode, PlanDocument, RankedOperator, Statement};

/// Derive `est_self_cost` for the whole subtree. Called once by the loader
/// before the tree is frozen.
pub fn derive_self_cost(node: &mut OperatorNode) {
    for child in &mut node.children {
        derive_self_cost(child);
    }

    node.est_self_cost = match node.est_cost {
        None => None,
        Some(total) if node.children.is_empty() => Some(total),
        Some(total) => {
            let max_child = node
                .children
                .iter()
                .filter_map(|c| c.est_cost)
                .fold(None::<f64>, |acc, c| Some(acc.map_or(c, |a| a.max(c))));
            match max_child {
                Some(max) => Some((total - max).max(0.0)),
                None => Some(0.0),
            }
        },
    };
}

/// Ranks operators by total cost and separately by self cost.
pub struct CostAnalyzer;

impl CostAnalyzer {
    /// Top-N lists over every statement of the document. Self-cost entries
    /// that also appear in the total-cost list are marked so renderers can
    /// suppress the duplicates.
    pub fn rank(doc: &PlanDocument, config: &AnalysisConfig) -> (Vec<RankedOperator>, Vec<RankedOperator>) {
        let top_n = config.report.top_operators;

        let mut by_total: Vec<RankedOperator> = doc
            .operators()
            .filter(|(_, n)| n.est_cost.is_some())
            .map(|(s, n)| Self::entry(s, n))
            .collect();
        by_total.sort_by(|a, b| b.est_cost.total_cmp(&a.est_cost));
        by_total.truncate(top_n);

        let mut by_self: Vec<RankedOperator> = doc
            .operators()
            .filter(|(_, n)| n.est_self_cost.is_some())
            .map(|(s, n)| Self::entry(s, n))
            .collect();
        by_self.sort_by(|a, b| b.est_self_cost.total_cmp(&a.est_self_cost));
        by_self.truncate(top_n);

        for entry in &mut by_self {
            entry.in_total_top = by_total
                .iter()
                .any(|t| t.statement_id == entry.statement_id && t.node_id == entry.node_id);
        }

        (by_total, by_self)
    }

    fn entry(statement: &Statement, node: &OperatorNode) -> RankedOperator {
        RankedOperator {
            statement_id: statement.id,
            node_id: node.node_id,
            physical_op: node.physical_op.clone(),
            logical_op: node.logical_op.clone(),
            est_cost: node.est_cost.unwrap_or(0.0),
            est_self_cost: node.est_self_cost.unwrap_or(0.0),
            est_rows: node.est_rows,
            actual_rows: node.actual_rows(),
            objects: node.object_names.clone(),
            in_total_top: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AccessDescriptor;

    fn op(id: i32, cost: Option<f64>, children: Vec<OperatorNode>) -> OperatorNode {
        OperatorNode {
            node_id: id,
            physical_op: "Op".to_string(),
            logical_op: "Op".to_string(),
            parallel: false,
            est_rows: None,
            est_cost: cost,
            est_self_cost: None,
            access: AccessDescriptor::default(),
            object_names: vec![],
            sort_keys: vec![],
            predicate: None,
            join_predicate: None,
            scalar_exprs: vec![],
            warnings: vec![],
            many_to_many: false,
            runtime: None,
            children,
        }
    }

    #[test]
    fn leaf_self_cost_equals_total() {
        let mut leaf = op(0, Some(0.42), vec![]);
        derive_self_cost(&mut leaf);
        assert_eq!(leaf.est_self_cost, Some(0.42));
    }

    #[test]
    fn self_cost_subtracts_largest_child() {
        let mut root = op(0, Some(1.0), vec![op(1, Some(0.3), vec![]), op(2, Some(0.6), vec![])]);
        derive_self_cost(&mut root);
        assert!((root.est_self_cost.unwrap() - 0.4).abs() < 1e-9);
        assert_eq!(root.children[0].est_self_cost, Some(0.3));
    }

    #[test]
    fn self_cost_clamps_at_zero() {
        let mut root = op(0, Some(0.5), vec![op(1, Some(0.9), vec![])]);
        derive_self_cost(&mut root);
        assert_eq!(root.est_self_cost, Some(0.0));
    }

    #[test]
    fn unknown_children_yield_zero_not_total() {
        let mut root = op(0, Some(0.8), vec![op(1, None, vec![])]);
        derive_self_cost(&mut root);
        assert_eq!(root.est_self_cost, Some(0.0));
    }

    #[test]
    fn unknown_total_stays_unknown() {
        let mut root = op(0, None, vec![op(1, Some(0.1), vec![])]);
        derive_self_cost(&mut root);
        assert_eq!(root.est_self_cost, None);
    }
}
