//! Join strategy checks (J001-J005).

use super::{detection, HeuristicRule, RuleContext};
use crate::models::{Detection, DetectionKind, OperatorNode, Severity};

/// J001: Nested-loop join with a large output.
pub struct J001NestedLoopLargeOutput;

impl HeuristicRule for J001NestedLoopLargeOutput {
    fn id(&self) -> &'static str { "J001" }
    fn name(&self) -> &'static str { "Nested loops over large row count" }
    fn kind(&self) -> DetectionKind { DetectionKind::JoinCheck }

    fn applicable_to(&self, node: &OperatorNode) -> bool {
        node.physical_op.to_uppercase().contains("NESTED LOOPS")
    }

    fn evaluate(&self, ctx: &RuleContext) -> Option<Detection> {
        let rows = ctx.output_rows()?;
        if rows < ctx.config.nested_loop_rows as f64 {
            return None;
        }
        Some(detection(
            self,
            ctx,
            Severity::Warning,
            format!(
                "{} produces {:.0} rows; nested loops degrade past {} rows and a hash or merge join usually wins",
                ctx.node_label(),
                rows,
                ctx.config.nested_loop_rows
            ),
        ))
    }
}

/// J002: Merge join co-occurring with explicit sorts.
pub struct J002MergeJoinWithSorts;

impl HeuristicRule for J002MergeJoinWithSorts {
    fn id(&self) -> &'static str { "J002" }
    fn name(&self) -> &'static str { "Merge join fed by sorts" }
    fn kind(&self) -> DetectionKind { DetectionKind::JoinCheck }

    fn applicable_to(&self, node: &OperatorNode) -> bool {
        node.physical_op.to_uppercase().contains("MERGE JOIN")
    }

    fn evaluate(&self, ctx: &RuleContext) -> Option<Detection> {
        if !ctx.statement_has_sort {
            return None;
        }
        Some(detection(
            self,
            ctx,
            Severity::Info,
            format!(
                "{} appears alongside sort operators; the sorts likely exist only to feed the merge, check whether an index provides the order",
                ctx.node_label()
            ),
        ))
    }
}

/// J003: Hash match with a large output.
pub struct J003HashMatchLargeOutput;

impl HeuristicRule for J003HashMatchLargeOutput {
    fn id(&self) -> &'static str { "J003" }
    fn name(&self) -> &'static str { "Hash match over large row count" }
    fn kind(&self) -> DetectionKind { DetectionKind::JoinCheck }

    fn applicable_to(&self, node: &OperatorNode) -> bool {
        node.physical_op.to_uppercase().contains("HASH MATCH")
    }

    fn evaluate(&self, ctx: &RuleContext) -> Option<Detection> {
        let rows = ctx.output_rows()?;
        if rows < ctx.config.hash_join_rows as f64 {
            return None;
        }
        Some(detection(
            self,
            ctx,
            Severity::Warning,
            format!(
                "{} produces {:.0} rows; a hash build at this scale is memory hungry and spills easily",
                ctx.node_label(),
                rows
            ),
        ))
    }
}

/// J004: Adaptive join present. Flagged regardless of size, since it marks a
/// spot where the optimizer could not settle on a strategy.
pub struct J004AdaptiveJoin;

impl HeuristicRule for J004AdaptiveJoin {
    fn id(&self) -> &'static str { "J004" }
    fn name(&self) -> &'static str { "Adaptive join" }
    fn kind(&self) -> DetectionKind { DetectionKind::JoinCheck }

    fn applicable_to(&self, node: &OperatorNode) -> bool {
        node.physical_op.to_uppercase().contains("ADAPTIVE JOIN")
    }

    fn evaluate(&self, ctx: &RuleContext) -> Option<Detection> {
        Some(detection(
            self,
            ctx,
            Severity::Info,
            format!(
                "{} defers the join strategy to runtime, which points at fragile cardinality estimates upstream",
                ctx.node_label()
            ),
        ))
    }
}

/// J005: Merge join explicitly marked many-to-many.
pub struct J005ManyToManyMerge;

impl HeuristicRule for J005ManyToManyMerge {
    fn id(&self) -> &'static str { "J005" }
    fn name(&self) -> &'static str { "Many-to-many merge join" }
    fn kind(&self) -> DetectionKind { DetectionKind::ManyToManyMerge }

    fn applicable_to(&self, node: &OperatorNode) -> bool {
        node.many_to_many
    }

    fn evaluate(&self, ctx: &RuleContext) -> Option<Detection> {
        Some(detection(
            self,
            ctx,
            Severity::Warning,
            format!(
                "{} runs many-to-many and buffers duplicates in a worktable; a unique index on either input would remove it",
                ctx.node_label()
            ),
        ))
    }
}

/// Get all join rules.
pub fn get_rules() -> Vec<Box<dyn HeuristicRule>> {
    vec![
        Box::new(J001NestedLoopLargeOutput),
        Box::new(J002MergeJoinWithSorts),
        Box::new(J003HashMatchLargeOutput),
        Box::new(J004AdaptiveJoin),
        Box::new(J005ManyToManyMerge),
    ]
}
