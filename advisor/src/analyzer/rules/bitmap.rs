//! Bitmap and index-intersection detection (BM001-BM002).

use super::{detection, HeuristicRule, RuleContext};
use crate::models::{Detection, DetectionKind, OperatorNode, Severity};

/// BM001: Bitmap filter operator in the tree.
pub struct Bm001BitmapOperator;

impl HeuristicRule for Bm001BitmapOperator {
    fn id(&self) -> &'static str { "BM001" }
    fn name(&self) -> &'static str { "Bitmap filter operator" }
    fn kind(&self) -> DetectionKind { DetectionKind::IndexIntersection }

    fn applicable_to(&self, node: &OperatorNode) -> bool {
        node.is_bitmap()
    }

    fn evaluate(&self, ctx: &RuleContext) -> Option<Detection> {
        Some(detection(
            self,
            ctx,
            Severity::Info,
            format!(
                "{} builds a bitmap filter; the optimizer is compensating for a large semi-join or an index intersection",
                ctx.node_label()
            ),
        ))
    }
}

/// BM002: Bitmap probe referenced inside a scalar expression.
pub struct Bm002BitmapProbe;

impl HeuristicRule for Bm002BitmapProbe {
    fn id(&self) -> &'static str { "BM002" }
    fn name(&self) -> &'static str { "Bitmap probe in predicate" }
    fn kind(&self) -> DetectionKind { DetectionKind::IndexIntersection }

    fn applicable_to(&self, node: &OperatorNode) -> bool {
        !node.is_bitmap()
    }

    fn evaluate(&self, ctx: &RuleContext) -> Option<Detection> {
        let expr = ctx
            .node
            .scalar_exprs
            .iter()
            .chain(ctx.node.access.residual_predicate.iter())
            .find(|e| e.to_uppercase().contains("PROBE("))?;

        Some(detection(
            self,
            ctx,
            Severity::Info,
            format!("{} applies a bitmap probe: {}", ctx.node_label(), expr),
        ))
    }
}

/// Get all bitmap rules.
pub fn get_rules() -> Vec<Box<dyn HeuristicRule>> {
    vec![Box::new(Bm001BitmapOperator), Box::new(Bm002BitmapProbe)]
}
