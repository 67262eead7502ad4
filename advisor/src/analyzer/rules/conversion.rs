//! Plan-affecting conversion detection (CV001).
//!
//! Engine-emitted conversion annotations; authoritative where present,
//! independent of the best-effort predicate text scan.

use super::{detection, HeuristicRule, RuleContext};
use crate::models::{Detection, DetectionKind, OperatorNode, Severity};

/// CV001: The engine flagged a type conversion as affecting the plan.
pub struct Cv001PlanAffectingConvert;

impl HeuristicRule for Cv001PlanAffectingConvert {
    fn id(&self) -> &'static str { "CV001" }
    fn name(&self) -> &'static str { "Plan-affecting implicit conversion" }
    fn kind(&self) -> DetectionKind { DetectionKind::ImplicitConvert }

    fn applicable_to(&self, node: &OperatorNode) -> bool {
        node.has_warning("PlanAffectingConvert")
    }

    fn evaluate(&self, ctx: &RuleContext) -> Option<Detection> {
        let warning = ctx
            .node
            .warnings
            .iter()
            .find(|w| w.kind.to_uppercase().contains("PLANAFFECTINGCONVERT"))?;

        let detail = match &warning.detail {
            Some(extra) => format!(
                "{}: the engine reports a conversion that constrained the plan ({extra})",
                ctx.node_label()
            ),
            None => format!(
                "{}: the engine reports a conversion that constrained the plan",
                ctx.node_label()
            ),
        };

        Some(detection(self, ctx, Severity::Warning, detail))
    }
}

/// Get all conversion rules.
pub fn get_rules() -> Vec<Box<dyn HeuristicRule>> {
    vec![Box::new(Cv001PlanAffectingConvert)]
}
