//! Plan analysis data models
//!
//! These models represent the structured data extracted from a ShowPlan XML
//! document plus every diagnostic value the analysis passes produce. The plan
//! tree is built once by the loader and never mutated afterwards; analyzers
//! only read it and emit the side structures defined at the bottom of this
//! file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// Plan Document
// ============================================================================

/// Complete parsed plan document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanDocument {
    pub statements: Vec<Statement>,
    /// Index into `statements` of the chosen statement for root-scoped queries.
    pub chosen: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degree_of_parallelism: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_grant: Option<MemoryGrant>,
    /// Case-insensitive keyword hits over the raw document text.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub spill_keyword_hits: Vec<KeywordHit>,
}

impl PlanDocument {
    /// The statement selected by the loader's tie-break rules.
    pub fn chosen_statement(&self) -> &Statement {
        &self.statements[self.chosen]
    }

    /// Iterate every operator of every statement as (statement, node) pairs.
    pub fn operators(&self) -> impl Iterator<Item = (&Statement, &OperatorNode)> {
        self.statements
            .iter()
            .flat_map(|s| s.root.walk().map(move |n| (s, n)))
    }
}

/// One keyword scan result over the raw document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordHit {
    pub keyword: String,
    pub count: usize,
}

/// Memory grant summary from the plan header, in kilobytes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryGrant {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_kb: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub granted_kb: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used_kb: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_used_kb: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grant_wait_seconds: Option<u64>,
    /// Raw memory-grant-feedback annotation, when the engine emitted one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

// ============================================================================
// Statements and Parameters
// ============================================================================

/// A single statement with its operator tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statement {
    pub id: i32,
    /// Statement text, truncated by the loader.
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtree_cost: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub parameters: Vec<Parameter>,
    /// Index-suggestion groups attached to this statement, in document order.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub missing_indexes: Vec<MissingIndexCandidate>,
    pub root: OperatorNode,
}

impl Statement {
    /// Parameters whose runtime value differs from the compiled value.
    pub fn changed_parameters(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter().filter(|p| p.is_changed())
    }
}

/// A statement parameter with compile-time and runtime values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compiled_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime_value: Option<String>,
    /// max(compiled/runtime, runtime/compiled) when both parse as numbers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensitivity_ratio: Option<f64>,
}

impl Parameter {
    pub fn is_changed(&self) -> bool {
        match (&self.compiled_value, &self.runtime_value) {
            (Some(c), Some(r)) => c != r,
            _ => false,
        }
    }
}

// ============================================================================
// Operator Tree
// ============================================================================

/// Access path classification for an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AccessKind {
    Seek,
    Scan,
    TableScan,
    #[default]
    None,
}

/// Index/heap access details for an operator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessDescriptor {
    pub kind: AccessKind,
    /// Set when the access is a bookmark (key/RID) lookup.
    #[serde(default)]
    pub lookup: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seek_predicate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub residual_predicate: Option<String>,
}

/// An engine-emitted warning attached to an operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanWarning {
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// One node of the operator tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorNode {
    /// Unique within a statement, not globally.
    pub node_id: i32,
    pub physical_op: String,
    pub logical_op: String,
    #[serde(default)]
    pub parallel: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub est_rows: Option<f64>,
    /// Declared total subtree cost.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub est_cost: Option<f64>,
    /// Derived at load time, never source data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub est_self_cost: Option<f64>,
    pub access: AccessDescriptor,
    /// Referenced object names, deduplicated, at most two.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub object_names: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub sort_keys: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predicate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub join_predicate: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub scalar_exprs: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub warnings: Vec<PlanWarning>,
    /// Merge join explicitly marked many-to-many.
    #[serde(default)]
    pub many_to_many: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime: Option<RuntimeStats>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub children: Vec<OperatorNode>,
}

impl OperatorNode {
    /// Depth-first walk over this node and all descendants.
    pub fn walk(&self) -> OperatorWalk<'_> {
        OperatorWalk { stack: vec![self] }
    }

    pub fn is_join(&self) -> bool {
        let p = self.physical_op.to_uppercase();
        p.contains("JOIN") || p.contains("NESTED LOOPS") || self.logical_op.to_uppercase().contains("JOIN")
    }

    pub fn is_sort(&self) -> bool {
        self.physical_op.to_uppercase().contains("SORT")
    }

    pub fn is_hash(&self) -> bool {
        self.physical_op.to_uppercase().contains("HASH")
    }

    pub fn is_spool(&self) -> bool {
        self.physical_op.to_uppercase().contains("SPOOL")
    }

    pub fn is_bitmap(&self) -> bool {
        self.physical_op.to_uppercase().contains("BITMAP")
            || self.logical_op.to_uppercase().contains("BITMAP")
    }

    pub fn is_exchange(&self) -> bool {
        self.physical_op.to_uppercase().contains("PARALLELISM")
    }

    pub fn is_gather_streams(&self) -> bool {
        self.is_exchange() && self.logical_op.to_uppercase().contains("GATHER STREAMS")
    }

    /// Canonical actual row count: trusted output when available, the summed
    /// work figure otherwise.
    pub fn actual_rows(&self) -> Option<u64> {
        let rt = self.runtime.as_ref()?;
        Some(rt.rows_out.unwrap_or(rt.rows_work))
    }

    pub fn has_warning(&self, needle: &str) -> bool {
        let needle = needle.to_uppercase();
        self.warnings.iter().any(|w| w.kind.to_uppercase().contains(&needle))
    }
}

/// Iterator state for [`OperatorNode::walk`].
pub struct OperatorWalk<'a> {
    stack: Vec<&'a OperatorNode>,
}

impl<'a> Iterator for OperatorWalk<'a> {
    type Item = &'a OperatorNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

// ============================================================================
// Runtime Counters
// ============================================================================

/// Raw counters reported by one execution thread.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThreadCounters {
    pub thread: i32,
    pub actual_rows: u64,
    pub actual_rows_read: u64,
    pub actual_executions: u64,
    pub rebinds: u64,
    pub rewinds: u64,
    pub end_of_scans: u64,
}

/// Worker-thread row distribution, computed excluding the coordinator thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkewStats {
    pub threads: usize,
    pub min_rows: u64,
    pub max_rows: u64,
    pub avg_rows: f64,
    pub max_avg_ratio: f64,
    pub max_min_ratio: f64,
}

/// Aggregated runtime statistics for one operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeStats {
    pub per_thread: Vec<ThreadCounters>,
    /// Rows summed across every thread: the "work" figure.
    pub rows_work: u64,
    pub rows_read_work: u64,
    pub executions: u64,
    pub rebinds: u64,
    pub rewinds: u64,
    /// Trusted output row count; unset for genuinely parallel, non-gathering
    /// operators where only the work figure is reliable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_out: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skew: Option<SkewStats>,
}

// ============================================================================
// Missing Indexes
// ============================================================================

/// One index suggestion group read from the plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissingIndexCandidate {
    pub statement_id: i32,
    /// Fully qualified table name.
    pub table: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub equality_columns: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub inequality_columns: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub include_columns: Vec<String>,
    pub impact: f64,
}

impl MissingIndexCandidate {
    /// Key columns in canonical order: equality first, then inequality, each
    /// in document order.
    pub fn key_columns(&self) -> Vec<String> {
        let mut keys = self.equality_columns.clone();
        keys.extend(self.inequality_columns.iter().cloned());
        keys
    }

    /// Deterministic dedup signature over table and ordered column lists.
    pub fn signature(&self) -> String {
        format!(
            "{}|k:{}|i:{}",
            self.table.to_lowercase(),
            self.key_columns().join(",").to_lowercase(),
            self.include_columns.join(",").to_lowercase()
        )
    }
}

/// A deduplicated, ranked index suggestion with generated definition text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSuggestion {
    pub table: String,
    pub key_columns: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub include_columns: Vec<String>,
    /// Deterministic generated name (stable hash of the signature).
    pub name: String,
    pub create_statement: String,
    pub impact: f64,
    /// How many raw candidates collapsed into this suggestion.
    pub duplicate_count: usize,
    /// Existing index that already covers this suggestion, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub covered_by: Option<String>,
}

// ============================================================================
// Diagnostic Signals
// ============================================================================

/// Direction of a cardinality misestimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EstimateDirection {
    UnderEstimate,
    OverEstimate,
    Exact,
}

/// A flagged estimate-vs-actual mismatch on one operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardinalityIssue {
    pub statement_id: i32,
    pub node_id: i32,
    pub operator: String,
    pub estimated_rows: f64,
    pub actual_rows: u64,
    /// max(est/act, act/est); +infinity when exactly one side is zero.
    pub ratio: f64,
    pub direction: EstimateDirection,
    /// Ranking score only, not an absolute unit.
    pub severity: f64,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub likely_causes: Vec<String>,
}

/// Per-statement cardinality roll-up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatementCardinalitySummary {
    pub statement_id: i32,
    pub flagged_nodes: usize,
    pub worst: CardinalityIssue,
}

/// Normalized non-sargable pattern categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SargabilityKind {
    ImplicitConversion,
    FunctionOnColumn,
    LeadingWildcard,
    ConvertOnColumn,
}

/// A predicate pattern that defeats index seeks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SargabilityIssue {
    pub statement_id: i32,
    pub node_id: i32,
    pub kind: SargabilityKind,
    pub expression: String,
    pub detail: String,
}

/// Detector family of a heuristic signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetectionKind {
    JoinCheck,
    Spill,
    ParallelSkew,
    ManyToManyMerge,
    ImplicitConvert,
    IndexIntersection,
    OperatorRedFlag,
}

/// Severity level for heuristic detections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Info = 0,
    Warning = 1,
    Error = 2,
}

/// A heuristic-rule hit on one operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub rule_id: String,
    pub rule_name: String,
    pub kind: DetectionKind,
    pub severity: Severity,
    pub statement_id: i32,
    pub node_id: i32,
    pub detail: String,
}

// ============================================================================
// Ranked Operators and Parameter Sensitivity
// ============================================================================

/// One entry of a cost-ranked operator list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedOperator {
    pub statement_id: i32,
    pub node_id: i32,
    pub physical_op: String,
    pub logical_op: String,
    pub est_cost: f64,
    pub est_self_cost: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub est_rows: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_rows: Option<u64>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub objects: Vec<String>,
    /// Set on self-cost entries that also appear in the total-cost top list,
    /// so renderers can suppress the duplicate.
    #[serde(default)]
    pub in_total_top: bool,
}

/// A parameter whose runtime value diverged from the compiled value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSensitivity {
    pub statement_id: i32,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compiled_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ratio: Option<f64>,
    pub changed: bool,
}

// ============================================================================
// Schema Facts (external lookup collaborator)
// ============================================================================

/// Index and statistics facts for the tables a plan references, captured by
/// the out-of-core lookup collaborator and injected as a plain value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaFacts {
    /// When the lookup ran; staleness is computed against this instant.
    pub captured_at: DateTime<Utc>,
    /// Keyed by fully qualified table name.
    pub tables: HashMap<String, TableFacts>,
}

impl SchemaFacts {
    /// Case/bracket-insensitive table lookup.
    pub fn table(&self, name: &str) -> Option<&TableFacts> {
        let wanted = normalize_identifier(name);
        self.tables
            .iter()
            .find(|(k, _)| normalize_identifier(k) == wanted)
            .map(|(_, v)| v)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableFacts {
    #[serde(default)]
    pub indexes: Vec<ExistingIndex>,
    #[serde(default)]
    pub statistics: Vec<ExistingStatistics>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexKeyColumn {
    pub name: String,
    #[serde(default)]
    pub descending: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExistingIndex {
    pub name: String,
    pub key_columns: Vec<IndexKeyColumn>,
    #[serde(default)]
    pub include_columns: Vec<String>,
    #[serde(default)]
    pub unique: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    #[serde(default)]
    pub user_seeks: u64,
    #[serde(default)]
    pub user_scans: u64,
    #[serde(default)]
    pub user_lookups: u64,
    #[serde(default)]
    pub user_updates: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExistingStatistics {
    pub name: String,
    pub columns: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<u64>,
    #[serde(default)]
    pub modification_counter: u64,
}

/// Strip brackets/quotes and lowercase, for identifier comparison.
pub fn normalize_identifier(s: &str) -> String {
    s.trim()
        .trim_matches(|c| c == '[' || c == ']' || c == '"')
        .replace("].[", ".")
        .replace(['[', ']'], "")
        .to_lowercase()
}

// ============================================================================
// Coverage Report
// ============================================================================

/// A statistics object flagged as stale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaleStatistic {
    pub table: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<u64>,
    pub modifications: u64,
    pub reason: String,
}

/// A multi-column statistics opportunity not covered by any existing
/// statistics column prefix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatisticsOpportunity {
    pub table: String,
    pub columns: Vec<String>,
}

/// Results of merging the external index/statistics lookup into the analysis.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoverageReport {
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub stale_statistics: Vec<StaleStatistic>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub statistics_opportunities: Vec<StatisticsOpportunity>,
}

// ============================================================================
// Report Aggregate
// ============================================================================

/// One line of the statement roll-up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatementSummary {
    pub id: i32,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtree_cost: Option<f64>,
    pub chosen: bool,
    pub parameter_count: usize,
}

/// Complete analysis output: the contract consumed by the rendering layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub statements: Vec<StatementSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degree_of_parallelism: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_grant: Option<MemoryGrant>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub spill_keyword_hits: Vec<KeywordHit>,
    pub top_cost_operators: Vec<RankedOperator>,
    pub top_self_cost_operators: Vec<RankedOperator>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub cardinality_issues: Vec<CardinalityIssue>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub statement_cardinality: Vec<StatementCardinalitySummary>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub sargability_issues: Vec<SargabilityIssue>,
    /// Raw candidates in impact order; duplicates retained on purpose.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub missing_indexes: Vec<MissingIndexCandidate>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub index_suggestions: Vec<IndexSuggestion>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub parameter_sensitivity: Vec<ParameterSensitivity>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub detections: Vec<Detection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coverage: Option<CoverageReport>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(id: i32) -> OperatorNode {
        OperatorNode {
            node_id: id,
            physical_op: "Index Seek".to_string(),
            logical_op: "Index Seek".to_string(),
            parallel: false,
            est_rows: Some(1.0),
            est_cost: Some(0.1),
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
            children: vec![],
        }
    }

    #[test]
    fn walk_visits_every_node_once() {
        let mut root = leaf(0);
        let mut mid = leaf(1);
        mid.children.push(leaf(2));
        root.children.push(mid);
        root.children.push(leaf(3));

        let ids: Vec<i32> = root.walk().map(|n| n.node_id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
    }

    #[test]
    fn candidate_signature_is_order_sensitive_per_class() {
        let a = MissingIndexCandidate {
            statement_id: 1,
            table: "[db].[dbo].[T]".to_string(),
            equality_columns: vec!["[A]".to_string(), "[B]".to_string()],
            inequality_columns: vec!["[C]".to_string()],
            include_columns: vec!["[D]".to_string()],
            impact: 90.0,
        };
        let mut b = a.clone();
        assert_eq!(a.signature(), b.signature());

        b.inequality_columns = vec!["[X]".to_string()];
        assert_ne!(a.signature(), b.signature());
    }

    #[test]
    fn normalize_identifier_strips_brackets() {
        assert_eq!(normalize_identifier("[db].[dbo].[Orders]"), "db.dbo.orders");
        assert_eq!(normalize_identifier("db.dbo.Orders"), "db.dbo.orders");
    }
}
