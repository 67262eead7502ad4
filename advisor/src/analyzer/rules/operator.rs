//! Operator red flags (OP001-OP006).

use super::{detection, HeuristicRule, RuleContext};
use crate::models::{Detection, DetectionKind, OperatorNode, Severity};

/// OP001: Large sort.
pub struct Op001LargeSort;

impl HeuristicRule for Op001LargeSort {
    fn id(&self) -> &'static str { "OP001" }
    fn name(&self) -> &'static str { "Large sort" }
    fn kind(&self) -> DetectionKind { DetectionKind::OperatorRedFlag }

    fn applicable_to(&self, node: &OperatorNode) -> bool {
        node.is_sort()
    }

    fn evaluate(&self, ctx: &RuleContext) -> Option<Detection> {
        let rows = ctx.output_rows()?;
        if rows < ctx.config.big_sort_rows as f64 {
            return None;
        }
        let keys = if ctx.node.sort_keys.is_empty() {
            String::new()
        } else {
            format!(" on ({})", ctx.node.sort_keys.join(", "))
        };
        Some(detection(
            self,
            ctx,
            Severity::Warning,
            format!("{} orders {:.0} rows{}; an index providing the order would remove it", ctx.node_label(), rows, keys),
        ))
    }
}

/// OP002: Any spool.
pub struct Op002Spool;

impl HeuristicRule for Op002Spool {
    fn id(&self) -> &'static str { "OP002" }
    fn name(&self) -> &'static str { "Spool operator" }
    fn kind(&self) -> DetectionKind { DetectionKind::OperatorRedFlag }

    fn applicable_to(&self, node: &OperatorNode) -> bool {
        node.is_spool()
    }

    fn evaluate(&self, ctx: &RuleContext) -> Option<Detection> {
        Some(detection(
            self,
            ctx,
            Severity::Info,
            format!(
                "{} materializes intermediate rows in tempdb; spools usually stand in for a missing index or a correlated subquery",
                ctx.node_label()
            ),
        ))
    }
}

/// OP003: Table spool re-executed many times.
pub struct Op003SpoolRebinds;

impl HeuristicRule for Op003SpoolRebinds {
    fn id(&self) -> &'static str { "OP003" }
    fn name(&self) -> &'static str { "High-rebind table spool" }
    fn kind(&self) -> DetectionKind { DetectionKind::OperatorRedFlag }

    fn applicable_to(&self, node: &OperatorNode) -> bool {
        node.physical_op.to_uppercase().contains("TABLE SPOOL")
    }

    fn evaluate(&self, ctx: &RuleContext) -> Option<Detection> {
        let rt = ctx.node.runtime.as_ref()?;
        if rt.executions < ctx.config.spool_executions {
            return None;
        }
        Some(detection(
            self,
            ctx,
            Severity::Warning,
            format!(
                "{} executed {} times ({} rebinds, {} rewinds); the outer loop replays it far too often",
                ctx.node_label(),
                rt.executions,
                rt.rebinds,
                rt.rewinds
            ),
        ))
    }
}

/// OP004: Large hash operator (join, aggregate, or union).
pub struct Op004LargeHash;

impl HeuristicRule for Op004LargeHash {
    fn id(&self) -> &'static str { "OP004" }
    fn name(&self) -> &'static str { "Large hash operator" }
    fn kind(&self) -> DetectionKind { DetectionKind::OperatorRedFlag }

    fn applicable_to(&self, node: &OperatorNode) -> bool {
        node.is_hash()
    }

    fn evaluate(&self, ctx: &RuleContext) -> Option<Detection> {
        let rows = ctx.output_rows()?;
        if rows < ctx.config.big_hash_rows as f64 {
            return None;
        }
        Some(detection(
            self,
            ctx,
            Severity::Warning,
            format!(
                "{} hashes {:.0} rows; watch its memory grant and consider pre-filtering the build side",
                ctx.node_label(),
                rows
            ),
        ))
    }
}

/// OP005: Bitmap usage as a red flag on the operator list.
pub struct Op005BitmapUsage;

impl HeuristicRule for Op005BitmapUsage {
    fn id(&self) -> &'static str { "OP005" }
    fn name(&self) -> &'static str { "Bitmap usage" }
    fn kind(&self) -> DetectionKind { DetectionKind::OperatorRedFlag }

    fn applicable_to(&self, node: &OperatorNode) -> bool {
        node.is_bitmap()
    }

    fn evaluate(&self, ctx: &RuleContext) -> Option<Detection> {
        Some(detection(
            self,
            ctx,
            Severity::Info,
            format!("{} relies on bitmap filtering", ctx.node_label()),
        ))
    }
}

/// OP006: Key/RID lookup executed a large number of times.
pub struct Op006ExpensiveLookup;

impl HeuristicRule for Op006ExpensiveLookup {
    fn id(&self) -> &'static str { "OP006" }
    fn name(&self) -> &'static str { "Expensive bookmark lookup" }
    fn kind(&self) -> DetectionKind { DetectionKind::OperatorRedFlag }

    fn applicable_to(&self, node: &OperatorNode) -> bool {
        node.access.lookup || node.physical_op.to_uppercase().contains("RID LOOKUP")
    }

    fn evaluate(&self, ctx: &RuleContext) -> Option<Detection> {
        let rt = ctx.node.runtime.as_ref()?;
        if rt.executions < ctx.config.lookup_executions {
            return None;
        }
        let table = ctx.node.object_names.first().map(String::as_str).unwrap_or("the base table");
        Some(detection(
            self,
            ctx,
            Severity::Warning,
            format!(
                "{} fetched from {} {} times; covering the query with INCLUDE columns removes the lookup",
                ctx.node_label(),
                table,
                rt.executions
            ),
        ))
    }
}

/// Get all operator red-flag rules.
pub fn get_rules() -> Vec<Box<dyn HeuristicRule>> {
    vec![
        Box::new(Op001LargeSort),
        Box::new(Op002Spool),
        Box::new(Op003SpoolRebinds),
        Box::new(Op004LargeHash),
        Box::new(Op005BitmapUsage),
        Box::new(Op006ExpensiveLookup),
    ]
}
