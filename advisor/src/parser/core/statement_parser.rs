//! Statement parsing and chosen-statement selection.

use roxmltree::Node;

use super::{is_element, MissingIndexParser, OperatorParser, ValueParser};
use crate::models::{MemoryGrant, Parameter, Statement};

/// Statement text is kept short in the model; renderers show the prefix only.
const STATEMENT_TEXT_MAX: usize = 220;

/// One statement plus the plan-header values that end up on the document.
#[derive(Debug)]
pub struct ParsedStatement {
    pub statement: Statement,
    pub degree_of_parallelism: Option<u32>,
    pub memory_grant: Option<MemoryGrant>,
}

/// Parser for `Stmt*` elements.
pub struct StatementParser;

impl StatementParser {
    /// Parse one statement element. Returns `None` when the element carries
    /// no operator tree (SET/USE and similar non-plan statements).
    pub fn parse(ns: &str, stmt: Node<'_, '_>, fallback_id: i32) -> Option<ParsedStatement> {
        let query_plan = Self::scoped_query_plan(ns, stmt)?;

        let mut roots = OperatorParser::child_operators(ns, query_plan);
        if roots.is_empty() {
            return None;
        }
        if roots.len() > 1 {
            tracing::warn!(
                statement = ValueParser::opt_i32(stmt, "StatementId").unwrap_or(fallback_id),
                roots = roots.len(),
                "statement has more than one root operator, keeping the first"
            );
        }
        let root = OperatorParser::parse_tree(ns, roots.remove(0));

        let id = ValueParser::opt_i32(stmt, "StatementId").unwrap_or(fallback_id);
        let text = ValueParser::truncate(
            ValueParser::attr(stmt, "StatementText").unwrap_or_default(),
            STATEMENT_TEXT_MAX,
        );
        let subtree_cost = ValueParser::opt_f64(stmt, "StatementSubTreeCost");
        let parameters = Self::parse_parameters(ns, query_plan);
        let missing_indexes = MissingIndexParser::parse(ns, query_plan, id);

        let statement = Statement { id, text, subtree_cost, parameters, missing_indexes, root };

        Some(ParsedStatement {
            statement,
            degree_of_parallelism: ValueParser::opt_u32(query_plan, "DegreeOfParallelism"),
            memory_grant: Self::parse_memory_grant(ns, query_plan),
        })
    }

    /// Select the chosen statement: most changed parameters, then most
    /// runtime-valued parameters, then highest declared cost; ties keep
    /// document order.
    pub fn choose(statements: &[Statement]) -> usize {
        let mut best = 0;
        for candidate in 1..statements.len() {
            if Self::outranks(&statements[candidate], &statements[best]) {
                best = candidate;
            }
        }
        best
    }

    fn outranks(a: &Statement, b: &Statement) -> bool {
        let changed_a = a.changed_parameters().count();
        let changed_b = b.changed_parameters().count();
        if changed_a != changed_b {
            return changed_a > changed_b;
        }

        let runtime_a = a.parameters.iter().filter(|p| p.runtime_value.is_some()).count();
        let runtime_b = b.parameters.iter().filter(|p| p.runtime_value.is_some()).count();
        if runtime_a != runtime_b {
            return runtime_a > runtime_b;
        }

        a.subtree_cost.unwrap_or(0.0) > b.subtree_cost.unwrap_or(0.0)
    }

    /// The statement's own `QueryPlan`: found without descending into nested
    /// statement elements, which own their plans.
    fn scoped_query_plan<'a, 'i>(ns: &str, stmt: Node<'a, 'i>) -> Option<Node<'a, 'i>> {
        fn walk<'a, 'i>(ns: &str, node: Node<'a, 'i>) -> Option<Node<'a, 'i>> {
            for child in node.children().filter(|c| c.is_element()) {
                if child.tag_name().name().starts_with("Stmt") {
                    continue;
                }
                if is_element(child, ns, "QueryPlan") {
                    return Some(child);
                }
                if let Some(found) = walk(ns, child) {
                    return Some(found);
                }
            }
            None
        }
        walk(ns, stmt)
    }

    fn parse_parameters(ns: &str, query_plan: Node<'_, '_>) -> Vec<Parameter> {
        let Some(list) = query_plan
            .descendants()
            .find(|d| is_element(*d, ns, "ParameterList"))
        else {
            return Vec::new();
        };

        list.children()
            .filter(|c| is_element(*c, ns, "ColumnReference"))
            .map(|c| {
                let compiled_value = c.attribute("ParameterCompiledValue").map(str::to_string);
                let runtime_value = c.attribute("ParameterRuntimeValue").map(str::to_string);
                let sensitivity_ratio =
                    Self::sensitivity_ratio(compiled_value.as_deref(), runtime_value.as_deref());
                Parameter {
                    name: c.attribute("Column").unwrap_or_default().to_string(),
                    data_type: c.attribute("ParameterDataType").map(str::to_string),
                    compiled_value,
                    runtime_value,
                    sensitivity_ratio,
                }
            })
            .collect()
    }

    /// max(compiled/runtime, runtime/compiled) when both values are numeric
    /// and non-zero.
    fn sensitivity_ratio(compiled: Option<&str>, runtime: Option<&str>) -> Option<f64> {
        let c = ValueParser::numeric_literal(compiled?)?;
        let r = ValueParser::numeric_literal(runtime?)?;
        if c == 0.0 || r == 0.0 {
            return None;
        }
        Some((c / r).abs().max((r / c).abs()))
    }

    fn parse_memory_grant(ns: &str, query_plan: Node<'_, '_>) -> Option<MemoryGrant> {
        let info = query_plan
            .children()
            .find(|c| is_element(*c, ns, "MemoryGrantInfo"))?;
        Some(MemoryGrant {
            requested_kb: ValueParser::opt_u64(info, "RequestedMemory"),
            granted_kb: ValueParser::opt_u64(info, "GrantedMemory"),
            used_kb: ValueParser::opt_u64(info, "UsedMemory"),
            max_used_kb: ValueParser::opt_u64(info, "MaxUsedMemory"),
            grant_wait_seconds: ValueParser::opt_u64(info, "GrantWaitTime"),
            feedback: info.attribute("IsMemoryGrantFeedbackAdjusted").map(str::to_string),
        })
    }
}
