//! Parallelism skew detection (PX001).

use super::{detection, HeuristicRule, RuleContext};
use crate::models::{Detection, DetectionKind, OperatorNode, Severity};

/// PX001: Uneven row distribution across worker threads.
pub struct Px001WorkerSkew;

impl HeuristicRule for Px001WorkerSkew {
    fn id(&self) -> &'static str { "PX001" }
    fn name(&self) -> &'static str { "Parallel worker skew" }
    fn kind(&self) -> DetectionKind { DetectionKind::ParallelSkew }

    fn applicable_to(&self, node: &OperatorNode) -> bool {
        node.runtime.as_ref().is_some_and(|rt| rt.skew.is_some())
    }

    fn evaluate(&self, ctx: &RuleContext) -> Option<Detection> {
        let rt = ctx.node.runtime.as_ref()?;
        let skew = rt.skew.as_ref()?;

        if skew.threads < 2
            || rt.rows_work < ctx.config.skew_min_rows
            || skew.max_avg_ratio < ctx.config.skew_ratio
        {
            return None;
        }

        Some(detection(
            self,
            ctx,
            Severity::Warning,
            format!(
                "{}: the busiest of {} workers handled {} rows against an average of {:.0} (max/avg {:.1}); the parallel scan degenerates to one thread's pace",
                ctx.node_label(),
                skew.threads,
                skew.max_rows,
                skew.avg_rows,
                skew.max_avg_ratio
            ),
        ))
    }
}

/// Get all parallelism rules.
pub fn get_rules() -> Vec<Box<dyn HeuristicRule>> {
    vec![Box::new(Px001WorkerSkew)]
}
