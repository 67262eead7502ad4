//! Spill detection (SP001).

use super::{detection, HeuristicRule, RuleContext};
use crate::models::{Detection, DetectionKind, OperatorNode, Severity};

/// SP001: Sort or hash operator that spilled to tempdb.
pub struct Sp001OperatorSpill;

impl HeuristicRule for Sp001OperatorSpill {
    fn id(&self) -> &'static str { "SP001" }
    fn name(&self) -> &'static str { "Operator spilled to tempdb" }
    fn kind(&self) -> DetectionKind { DetectionKind::Spill }

    fn applicable_to(&self, node: &OperatorNode) -> bool {
        node.is_sort() || node.is_hash()
    }

    fn evaluate(&self, ctx: &RuleContext) -> Option<Detection> {
        let warning = ctx
            .node
            .warnings
            .iter()
            .find(|w| w.kind.to_uppercase().contains("SPILL"))?;

        let mut detail = format!(
            "{} exceeded its memory grant and spilled ({})",
            ctx.node_label(),
            warning.kind
        );
        if let Some(extra) = &warning.detail {
            detail.push_str(&format!(": {extra}"));
        }

        Some(detection(self, ctx, Severity::Error, detail))
    }
}

/// Get all spill rules.
pub fn get_rules() -> Vec<Box<dyn HeuristicRule>> {
    vec![Box::new(Sp001OperatorSpill)]
}
