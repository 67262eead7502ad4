//! Per-thread runtime counter aggregation.
//!
//! Every raw counter is summed across threads into the "work" figures. The
//! output row count is only trusted when the operator's execution is provably
//! single-stream: a serial operator, or a Gather Streams exchange reporting
//! on thread 0. Worker skew is computed over the worker threads alone,
//! ignoring idle workers whenever any thread produced rows.

use roxmltree::Node;

use super::{is_element, ValueParser};
use crate::models::{RuntimeStats, SkewStats, ThreadCounters};

/// Parser/aggregator for `RunTimeInformation` blocks.
pub struct RuntimeParser;

impl RuntimeParser {
    /// Parse one operator's runtime block; `None` when no thread reported.
    pub fn parse(
        ns: &str,
        runtime_el: Node<'_, '_>,
        parallel: bool,
        gather_streams: bool,
    ) -> Option<RuntimeStats> {
        let per_thread: Vec<ThreadCounters> = runtime_el
            .children()
            .filter(|c| is_element(*c, ns, "RunTimeCountersPerThread"))
            .map(Self::parse_thread)
            .collect();

        if per_thread.is_empty() {
            return None;
        }
        Some(Self::aggregate(per_thread, parallel, gather_streams))
    }

    fn parse_thread(el: Node<'_, '_>) -> ThreadCounters {
        ThreadCounters {
            thread: ValueParser::opt_i32(el, "Thread").unwrap_or(0),
            actual_rows: ValueParser::opt_u64(el, "ActualRows").unwrap_or(0),
            actual_rows_read: ValueParser::opt_u64(el, "ActualRowsRead").unwrap_or(0),
            actual_executions: ValueParser::opt_u64(el, "ActualExecutions").unwrap_or(0),
            rebinds: ValueParser::opt_u64(el, "ActualRebinds").unwrap_or(0),
            rewinds: ValueParser::opt_u64(el, "ActualRewinds").unwrap_or(0),
            end_of_scans: ValueParser::opt_u64(el, "ActualEndOfScans").unwrap_or(0),
        }
    }

    /// Combine per-thread counters into per-operator figures.
    pub fn aggregate(
        per_thread: Vec<ThreadCounters>,
        parallel: bool,
        gather_streams: bool,
    ) -> RuntimeStats {
        let rows_work = per_thread.iter().map(|t| t.actual_rows).sum();
        let rows_read_work = per_thread.iter().map(|t| t.actual_rows_read).sum();
        let executions = per_thread.iter().map(|t| t.actual_executions).sum();
        let rebinds = per_thread.iter().map(|t| t.rebinds).sum();
        let rewinds = per_thread.iter().map(|t| t.rewinds).sum();

        let rows_out = if !parallel || gather_streams {
            per_thread.iter().find(|t| t.thread == 0).map(|t| t.actual_rows)
        } else {
            None
        };

        let skew = Self::worker_skew(&per_thread);

        RuntimeStats {
            per_thread,
            rows_work,
            rows_read_work,
            executions,
            rebinds,
            rewinds,
            rows_out,
            skew,
        }
    }

    /// Row distribution over worker threads (thread 0 excluded). Idle workers
    /// are dropped whenever any thread produced rows, so they cannot distort
    /// the ratios.
    fn worker_skew(per_thread: &[ThreadCounters]) -> Option<SkewStats> {
        let workers: Vec<&ThreadCounters> =
            per_thread.iter().filter(|t| t.thread != 0).collect();
        if workers.is_empty() {
            return None;
        }

        let any_rows = workers.iter().any(|t| t.actual_rows > 0);
        let counted: Vec<u64> = workers
            .iter()
            .filter(|t| !any_rows || t.actual_rows > 0)
            .map(|t| t.actual_rows)
            .collect();
        if counted.is_empty() {
            return None;
        }

        let min_rows = counted.iter().copied().min().unwrap_or(0);
        let max_rows = counted.iter().copied().max().unwrap_or(0);
        let avg_rows = counted.iter().sum::<u64>() as f64 / counted.len() as f64;
        let max_avg_ratio = if avg_rows > 0.0 { max_rows as f64 / avg_rows } else { 1.0 };
        let max_min_ratio = if min_rows > 0 { max_rows as f64 / min_rows as f64 } else { 1.0 };

        Some(SkewStats {
            threads: counted.len(),
            min_rows,
            max_rows,
            avg_rows,
            max_avg_ratio,
            max_min_ratio,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thread(id: i32, rows: u64) -> ThreadCounters {
        ThreadCounters { thread: id, actual_rows: rows, actual_executions: 1, ..Default::default() }
    }

    #[test]
    fn serial_operator_trusts_thread_zero_output() {
        let stats = RuntimeParser::aggregate(vec![thread(0, 42)], false, false);
        assert_eq!(stats.rows_out, Some(42));
        assert_eq!(stats.rows_work, 42);
        assert!(stats.skew.is_none());
    }

    #[test]
    fn gather_streams_exchange_trusts_thread_zero() {
        let stats = RuntimeParser::aggregate(
            vec![thread(0, 100), thread(1, 60), thread(2, 40)],
            true,
            true,
        );
        assert_eq!(stats.rows_out, Some(100));
        assert_eq!(stats.rows_work, 200);
    }

    #[test]
    fn parallel_non_gather_leaves_output_unset() {
        // Three workers {10, 10, 10000}, coordinator reports 0.
        let stats = RuntimeParser::aggregate(
            vec![thread(0, 0), thread(1, 10), thread(2, 10), thread(3, 10_000)],
            true,
            false,
        );
        assert_eq!(stats.rows_out, None);
        assert_eq!(stats.rows_work, 10_020);

        let skew = stats.skew.unwrap();
        assert_eq!(skew.threads, 3);
        assert_eq!(skew.max_rows, 10_000);
        assert!((skew.max_avg_ratio - 3.0).abs() < 0.01);
        assert!((skew.max_min_ratio - 1000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn idle_workers_are_excluded_when_others_have_rows() {
        let stats = RuntimeParser::aggregate(
            vec![thread(0, 0), thread(1, 0), thread(2, 500), thread(3, 500)],
            true,
            false,
        );
        let skew = stats.skew.unwrap();
        assert_eq!(skew.threads, 2);
        assert_eq!(skew.min_rows, 500);
        assert!((skew.max_avg_ratio - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn all_idle_workers_report_no_imbalance() {
        let stats =
            RuntimeParser::aggregate(vec![thread(0, 0), thread(1, 0), thread(2, 0)], true, false);
        let skew = stats.skew.unwrap();
        assert_eq!(skew.max_rows, 0);
        assert!((skew.max_avg_ratio - 1.0).abs() < f64::EPSILON);
    }
}
