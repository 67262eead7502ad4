//! Fixture-driven tests for the analysis passes.
//!
//! Fixtures live under `tests/fixtures/plans/` and are small but complete
//! plan documents: an actual plan with runtime counters, an estimated-only
//! plan, and a serial merge/spool plan.

use crate::analyzer::analyze_plan;
use crate::config::AnalysisConfig;
use crate::models::*;
use crate::parser::PlanComposer;
use chrono::Utc;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

fn fixture_path(filename: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests/fixtures/plans");
    path.push(filename);
    path
}

fn load_plan(filename: &str) -> PlanDocument {
    let path = fixture_path(filename);
    let xml = fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("failed to load fixture {}: {}", path.display(), e));
    PlanComposer::new()
        .parse(&xml)
        .unwrap_or_else(|e| panic!("failed to parse fixture {}: {:?}", path.display(), e))
}

fn find_node<'a>(doc: &'a PlanDocument, statement_id: i32, node_id: i32) -> &'a OperatorNode {
    doc.operators()
        .find(|(s, n)| s.id == statement_id && n.node_id == node_id)
        .map(|(_, n)| n)
        .unwrap_or_else(|| panic!("node {node_id} of statement {statement_id} not found"))
}

// ============================================================================
// Loader
// ============================================================================

mod loader_tests {
    use super::*;

    #[test]
    fn warehouse_document_structure() {
        let doc = load_plan("warehouse_actual.xml");

        assert_eq!(doc.statements.len(), 2);
        assert_eq!(doc.degree_of_parallelism, Some(8));

        let grant = doc.memory_grant.as_ref().unwrap();
        assert_eq!(grant.requested_kb, Some(10_240));
        assert_eq!(grant.granted_kb, Some(10_240));
        assert_eq!(grant.max_used_kb, Some(9_800));
        assert_eq!(grant.grant_wait_seconds, Some(2));
        assert!(grant.feedback.as_deref().unwrap().starts_with("No"));
    }

    #[test]
    fn chosen_statement_has_the_changed_parameter() {
        let doc = load_plan("warehouse_actual.xml");
        let chosen = doc.chosen_statement();
        assert_eq!(chosen.id, 1);
        assert_eq!(chosen.changed_parameters().count(), 1);
        assert!(chosen.text.len() <= 220);
    }

    #[test]
    fn operator_tree_nesting_resolves_wrappers() {
        let doc = load_plan("warehouse_actual.xml");
        let root = &doc.chosen_statement().root;

        // Gather Streams -> Hash Match -> (Index Scan, Sort -> Nested Loops -> 2 seeks)
        assert_eq!(root.node_id, 0);
        assert!(root.is_gather_streams());
        assert_eq!(root.children.len(), 1);

        let hash = &root.children[0];
        assert_eq!(hash.node_id, 1);
        assert_eq!(hash.children.len(), 2);

        let sort = &hash.children[1];
        assert_eq!(sort.node_id, 3);
        assert_eq!(sort.sort_keys, vec!["Total DESC".to_string()]);

        let loops = &sort.children[0];
        assert_eq!(loops.node_id, 4);
        assert_eq!(loops.children.len(), 2);
        assert!(loops.children[1].access.lookup);
    }

    #[test]
    fn runtime_aggregation_on_the_parallel_scan() {
        let doc = load_plan("warehouse_actual.xml");
        let scan = find_node(&doc, 1, 2);
        let rt = scan.runtime.as_ref().unwrap();

        assert_eq!(rt.rows_work, 600_000);
        assert_eq!(rt.rows_out, None, "parallel non-gather output must stay unset");

        let skew = rt.skew.as_ref().unwrap();
        assert_eq!(skew.threads, 6);
        assert_eq!(skew.max_rows, 500_000);
        assert!((skew.max_avg_ratio - 5.0).abs() < 1e-9);
    }

    #[test]
    fn gather_streams_trusts_the_coordinator() {
        let doc = load_plan("warehouse_actual.xml");
        let gather = find_node(&doc, 1, 0);
        assert_eq!(gather.runtime.as_ref().unwrap().rows_out, Some(253_000));
    }

    #[test]
    fn spill_keywords_are_scanned_from_the_raw_text() {
        let doc = load_plan("warehouse_actual.xml");
        let hit = doc.spill_keyword_hits.iter().find(|h| h.keyword == "Spill").unwrap();
        assert!(hit.count >= 2);
    }

    #[test]
    fn estimated_only_plan_loads_without_runtime() {
        let doc = load_plan("estimated_only.xml");
        assert!(doc.operators().all(|(_, n)| n.runtime.is_none()));
    }
}

// ============================================================================
// Cost
// ============================================================================

mod cost_tests {
    use super::*;

    #[test]
    fn self_cost_invariants_hold_for_every_operator() {
        for fixture in ["warehouse_actual.xml", "estimated_only.xml", "merge_spool.xml"] {
            let doc = load_plan(fixture);
            for (_, node) in doc.operators() {
                let Some(total) = node.est_cost else { continue };
                let self_cost = node.est_self_cost.unwrap();
                assert!(self_cost >= 0.0);

                if node.children.is_empty() {
                    assert_eq!(self_cost, total);
                } else {
                    let known: Vec<f64> =
                        node.children.iter().filter_map(|c| c.est_cost).collect();
                    if known.is_empty() {
                        assert_eq!(self_cost, 0.0);
                    } else {
                        let max = known.iter().cloned().fold(f64::MIN, f64::max);
                        assert!((self_cost - (total - max).max(0.0)).abs() < 1e-9);
                    }
                }
            }
        }
    }

    #[test]
    fn scan_dominates_self_cost_ranking() {
        let doc = load_plan("warehouse_actual.xml");
        let report = analyze_plan(&doc, &AnalysisConfig::default(), None);

        // Node 2 spends 20.0 on itself, more than any other operator.
        assert_eq!(report.top_self_cost_operators[0].node_id, 2);
        assert_eq!(report.top_cost_operators[0].node_id, 0);

        // The total-cost list descends.
        let costs: Vec<f64> = report.top_cost_operators.iter().map(|r| r.est_cost).collect();
        assert!(costs.windows(2).all(|w| w[0] >= w[1]));

        // Duplicates between the two lists are marked for suppression.
        assert!(report
            .top_self_cost_operators
            .iter()
            .filter(|r| r.in_total_top)
            .count() > 0);
    }
}

// ============================================================================
// Cardinality
// ============================================================================

mod cardinality_tests {
    use super::*;

    #[test]
    fn parallel_scan_underestimate_is_the_worst_issue() {
        let doc = load_plan("warehouse_actual.xml");
        let report = analyze_plan(&doc, &AnalysisConfig::default(), None);

        let scan_issue = report
            .cardinality_issues
            .iter()
            .find(|i| i.node_id == 2 && i.statement_id == 1)
            .unwrap();
        assert_eq!(scan_issue.direction, EstimateDirection::UnderEstimate);
        assert!((scan_issue.ratio - 1200.0).abs() < 1e-6);
        assert!(scan_issue
            .likely_causes
            .iter()
            .any(|c| c.contains("non-sargable")));

        let summary = report
            .statement_cardinality
            .iter()
            .find(|s| s.statement_id == 1)
            .unwrap();
        assert!(summary.flagged_nodes >= 3);
        assert!(summary.worst.severity >= scan_issue.severity);
    }

    #[test]
    fn lookup_issue_attributes_read_to_return_and_rebinds() {
        let doc = load_plan("warehouse_actual.xml");
        let report = analyze_plan(&doc, &AnalysisConfig::default(), None);

        let lookup_issue = report
            .cardinality_issues
            .iter()
            .find(|i| i.node_id == 6 && i.statement_id == 1)
            .unwrap();
        assert!(lookup_issue.likely_causes.iter().any(|c| c.contains("read")));
        assert!(lookup_issue.likely_causes.iter().any(|c| c.contains("rebound")));
    }

    #[test]
    fn estimated_only_plan_yields_no_cardinality_issues() {
        let doc = load_plan("estimated_only.xml");
        let report = analyze_plan(&doc, &AnalysisConfig::default(), None);
        assert!(report.cardinality_issues.is_empty());
        assert!(report.statement_cardinality.is_empty());
    }

    #[test]
    fn near_exact_estimates_stay_quiet() {
        let doc = load_plan("merge_spool.xml");
        let report = analyze_plan(&doc, &AnalysisConfig::default(), None);
        assert!(report.cardinality_issues.is_empty());
    }
}

// ============================================================================
// Sargability
// ============================================================================

mod sargability_tests {
    use super::*;

    #[test]
    fn implicit_conversion_on_the_scan_yields_one_issue() {
        let doc = load_plan("warehouse_actual.xml");
        let report = analyze_plan(&doc, &AnalysisConfig::default(), None);

        let implicit: Vec<_> = report
            .sargability_issues
            .iter()
            .filter(|i| i.node_id == 2 && i.kind == SargabilityKind::ImplicitConversion)
            .collect();
        assert_eq!(implicit.len(), 1);
    }

    #[test]
    fn parameterized_leading_wildcard_is_inferred_from_the_bound_value() {
        let doc = load_plan("warehouse_actual.xml");
        let report = analyze_plan(&doc, &AnalysisConfig::default(), None);

        assert!(report
            .sargability_issues
            .iter()
            .any(|i| i.node_id == 5 && i.kind == SargabilityKind::LeadingWildcard));
    }

    #[test]
    fn explicit_convert_on_column_in_estimated_plan() {
        let doc = load_plan("estimated_only.xml");
        let report = analyze_plan(&doc, &AnalysisConfig::default(), None);

        assert!(report
            .sargability_issues
            .iter()
            .any(|i| i.kind == SargabilityKind::ConvertOnColumn));
    }
}

// ============================================================================
// Missing Indexes
// ============================================================================

mod missing_index_tests {
    use super::*;

    #[test]
    fn duplicate_groups_collapse_with_rollup() {
        let doc = load_plan("warehouse_actual.xml");
        let report = analyze_plan(&doc, &AnalysisConfig::default(), None);

        assert_eq!(report.missing_indexes.len(), 3);
        assert_eq!(report.index_suggestions.len(), 2);

        let orders = report
            .index_suggestions
            .iter()
            .find(|s| s.table.contains("Orders"))
            .unwrap();
        assert_eq!(orders.duplicate_count, 2);
        assert_eq!(orders.impact, 95.5);
        assert_eq!(
            orders.key_columns,
            vec!["[CustomerId]".to_string(), "[OrderDate]".to_string()]
        );
        assert!(orders.create_statement.contains("INCLUDE ([Total])"));
        assert!(orders.name.starts_with("ix_Orders_"));

        // Impact ranking puts Orders ahead of Customers.
        assert_eq!(report.index_suggestions[0].table, orders.table);
    }
}

// ============================================================================
// Heuristic Detections
// ============================================================================

mod detection_tests {
    use super::*;

    fn detections_for<'a>(report: &'a AnalysisReport, rule_id: &str) -> Vec<&'a Detection> {
        report.detections.iter().filter(|d| d.rule_id == rule_id).collect()
    }

    #[test]
    fn warehouse_plan_triggers_the_expected_rules() {
        let doc = load_plan("warehouse_actual.xml");
        let report = analyze_plan(&doc, &AnalysisConfig::default(), None);

        // Nested loops at 210k rows.
        let j001 = detections_for(&report, "J001");
        assert_eq!(j001.len(), 1);
        assert_eq!(j001[0].node_id, 4);

        // Hash match at 253k rows, both as a join check and a red flag.
        assert_eq!(detections_for(&report, "J003").len(), 1);
        assert_eq!(detections_for(&report, "OP004").len(), 1);

        // Sort: spilled and large.
        let sp001 = detections_for(&report, "SP001");
        assert_eq!(sp001.len(), 1);
        assert_eq!(sp001[0].severity, Severity::Error);
        assert_eq!(detections_for(&report, "OP001").len(), 1);

        // Parallel scan skew.
        let px = detections_for(&report, "PX001");
        assert_eq!(px.len(), 1);
        assert_eq!(px[0].node_id, 2);

        // Bookmark lookup at 15k executions.
        let op006 = detections_for(&report, "OP006");
        assert_eq!(op006.len(), 1);
        assert_eq!(op006[0].node_id, 6);

        // Errors sort ahead of the rest.
        assert_eq!(report.detections[0].severity, Severity::Error);
    }

    #[test]
    fn merge_spool_plan_triggers_merge_and_bitmap_rules() {
        let doc = load_plan("merge_spool.xml");
        let report = analyze_plan(&doc, &AnalysisConfig::default(), None);

        assert_eq!(detections_for(&report, "J002").len(), 1, "merge join fed by sorts");
        assert_eq!(detections_for(&report, "J005").len(), 1, "many-to-many merge");
        assert_eq!(detections_for(&report, "OP003").len(), 1, "high-rebind table spool");
        assert!(!detections_for(&report, "OP002").is_empty(), "spool red flag");
        assert_eq!(detections_for(&report, "BM001").len(), 1, "bitmap operator");
        assert_eq!(detections_for(&report, "BM002").len(), 1, "bitmap probe");
        assert!(!detections_for(&report, "OP005").is_empty(), "bitmap red flag");

        let kinds: Vec<DetectionKind> = report
            .detections
            .iter()
            .filter(|d| d.rule_id == "J005")
            .map(|d| d.kind)
            .collect();
        assert_eq!(kinds, vec![DetectionKind::ManyToManyMerge]);
    }

    #[test]
    fn thresholds_come_from_configuration() {
        let doc = load_plan("warehouse_actual.xml");
        let mut config = AnalysisConfig::default();
        config.heuristics.nested_loop_rows = 1_000_000;
        config.heuristics.skew_ratio = 50.0;

        let report = analyze_plan(&doc, &config, None);
        assert!(detections_for(&report, "J001").is_empty());
        assert!(detections_for(&report, "PX001").is_empty());
    }

    #[test]
    fn plan_affecting_convert_is_reported_from_engine_annotations() {
        let doc = load_plan("estimated_only.xml");
        let report = analyze_plan(&doc, &AnalysisConfig::default(), None);

        let cv = detections_for(&report, "CV001");
        assert_eq!(cv.len(), 1);
        assert!(cv[0].detail.contains("Seek Plan"));
    }
}

// ============================================================================
// Parameters and Coverage
// ============================================================================

mod parameter_tests {
    use super::*;

    #[test]
    fn drifted_parameter_leads_the_sensitivity_list() {
        let doc = load_plan("warehouse_actual.xml");
        let report = analyze_plan(&doc, &AnalysisConfig::default(), None);

        let first = &report.parameter_sensitivity[0];
        assert_eq!(first.name, "@MinTotal");
        assert!(first.changed);
        assert!((first.ratio.unwrap() - 10_000.0).abs() < 1e-6);
    }
}

mod coverage_tests {
    use super::*;

    fn facts_covering_orders() -> SchemaFacts {
        let mut tables = HashMap::new();
        tables.insert(
            "Sales.dbo.Orders".to_string(),
            TableFacts {
                indexes: vec![ExistingIndex {
                    name: "IX_Orders_Customer_Date".to_string(),
                    key_columns: vec![
                        IndexKeyColumn { name: "CustomerId".to_string(), descending: false },
                        IndexKeyColumn { name: "OrderDate".to_string(), descending: false },
                    ],
                    include_columns: vec!["Total".to_string()],
                    unique: false,
                    filter: None,
                    user_seeks: 120,
                    user_scans: 4,
                    user_lookups: 0,
                    user_updates: 300,
                }],
                statistics: vec![ExistingStatistics {
                    name: "stat_orders_status".to_string(),
                    columns: vec!["Status".to_string()],
                    last_updated: Some(Utc::now()),
                    rows: Some(1_000),
                    modification_counter: 900,
                }],
            },
        );
        SchemaFacts { captured_at: Utc::now(), tables }
    }

    #[test]
    fn facts_mark_covered_suggestions_and_stale_statistics() {
        let doc = load_plan("warehouse_actual.xml");
        let report = analyze_plan(&doc, &AnalysisConfig::default(), Some(&facts_covering_orders()));

        let orders = report
            .index_suggestions
            .iter()
            .find(|s| s.table.contains("Orders"))
            .unwrap();
        assert_eq!(orders.covered_by.as_deref(), Some("IX_Orders_Customer_Date"));

        let coverage = report.coverage.as_ref().unwrap();
        assert_eq!(coverage.stale_statistics.len(), 1);
        assert_eq!(coverage.stale_statistics[0].name, "stat_orders_status");

        // CustomerId+OrderDate is not covered by any statistics prefix.
        assert!(coverage
            .statistics_opportunities
            .iter()
            .any(|o| o.table.contains("Orders")));
    }

    #[test]
    fn absent_facts_skip_coverage_only() {
        let doc = load_plan("warehouse_actual.xml");
        let report = analyze_plan(&doc, &AnalysisConfig::default(), None);
        assert!(report.coverage.is_none());
        assert!(!report.index_suggestions.is_empty());
        assert!(!report.detections.is_empty());
    }
}

// ============================================================================
// Report Contract
// ============================================================================

mod report_tests {
    use super::*;

    #[test]
    fn report_round_trips_through_json() {
        let doc = load_plan("warehouse_actual.xml");
        let report = analyze_plan(&doc, &AnalysisConfig::default(), None);

        let json = serde_json::to_string(&report).unwrap();
        let back: AnalysisReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back.statements.len(), report.statements.len());
        assert_eq!(back.detections.len(), report.detections.len());
    }

    #[test]
    fn statement_rollup_marks_the_chosen_statement() {
        let doc = load_plan("warehouse_actual.xml");
        let report = analyze_plan(&doc, &AnalysisConfig::default(), None);

        assert_eq!(report.statements.len(), 2);
        assert!(report.statements[0].chosen);
        assert!(!report.statements[1].chosen);
    }
}
