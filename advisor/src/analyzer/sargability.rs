//! Non-sargable predicate detection.
//!
//! Scans every predicate-bearing string on an operator (seek predicate,
//! residual predicate, generic predicate, scalar expressions) for patterns
//! that defeat index seeks. Duplicate findings for the same node, category,
//! and expression are suppressed.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

use crate::models::{
    OperatorNode, PlanDocument, SargabilityIssue, SargabilityKind, Statement,
};
use crate::parser::core::ValueParser;

static IMPLICIT_CONVERT_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"CONVERT_IMPLICIT").unwrap());

// Date/string functions whose application to a column blocks a seek.
static FUNCTION_ON_COLUMN_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(DATEPART|DATEADD|DATEDIFF|DATENAME|YEAR|MONTH|DAY|UPPER|LOWER|LTRIM|RTRIM|TRIM|SUBSTRING|LEFT|RIGHT|REPLACE|ISNULL|COALESCE|ABS)\s*\(\s*[^()]*\[",
    )
    .unwrap()
});

// Explicit conversions; CONVERT_IMPLICIT never matches because the
// underscore breaks the word boundary before the parenthesis.
static CONVERT_ON_COLUMN_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(TRY_CONVERT|TRY_CAST|CONVERT|CAST)\s*\(\s*[^()]*\[").unwrap()
});

static LEADING_WILDCARD_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\blike\s+N?'%").unwrap());

static PARAMETERIZED_LIKE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\blike\s+(@\w+)").unwrap());

/// Predicate pattern scanner.
pub struct SargabilityAnalyzer;

impl SargabilityAnalyzer {
    /// Scan every operator of every statement.
    pub fn analyze(doc: &PlanDocument) -> Vec<SargabilityIssue> {
        let mut issues = Vec::new();
        let mut seen: HashSet<(i32, i32, SargabilityKind, String)> = HashSet::new();

        for (statement, node) in doc.operators() {
            for expr in Self::expressions(node) {
                Self::scan_expression(statement, node, expr, &mut seen, &mut issues);
            }
        }
        issues
    }

    fn expressions(node: &OperatorNode) -> impl Iterator<Item = &str> {
        node.access
            .seek_predicate
            .iter()
            .chain(node.access.residual_predicate.iter())
            .chain(node.predicate.iter())
            .map(String::as_str)
            .chain(node.scalar_exprs.iter().map(String::as_str))
    }

    fn scan_expression(
        statement: &Statement,
        node: &OperatorNode,
        expr: &str,
        seen: &mut HashSet<(i32, i32, SargabilityKind, String)>,
        issues: &mut Vec<SargabilityIssue>,
    ) {
        let mut push = |kind: SargabilityKind, detail: String| {
            if seen.insert((statement.id, node.node_id, kind, expr.to_string())) {
                issues.push(SargabilityIssue {
                    statement_id: statement.id,
                    node_id: node.node_id,
                    kind,
                    expression: expr.to_string(),
                    detail,
                });
            }
        };

        if IMPLICIT_CONVERT_REGEX.is_match(expr) {
            push(
                SargabilityKind::ImplicitConversion,
                "implicit type conversion inside a predicate".to_string(),
            );
        }

        if let Some(caps) = CONVERT_ON_COLUMN_REGEX.captures(expr) {
            push(
                SargabilityKind::ConvertOnColumn,
                format!("{} applied to a column reference", caps[1].to_uppercase()),
            );
        }

        if let Some(caps) = FUNCTION_ON_COLUMN_REGEX.captures(expr) {
            push(
                SargabilityKind::FunctionOnColumn,
                format!("{}() wraps a column reference", caps[1].to_uppercase()),
            );
        }

        if LEADING_WILDCARD_REGEX.is_match(expr) {
            push(
                SargabilityKind::LeadingWildcard,
                "LIKE pattern starts with a wildcard".to_string(),
            );
        } else if let Some(caps) = PARAMETERIZED_LIKE_REGEX.captures(expr) {
            // A parameterized pattern is a leading wildcard when the bound
            // value itself starts with one.
            if Self::parameter_starts_with_wildcard(statement, &caps[1]) {
                push(
                    SargabilityKind::LeadingWildcard,
                    format!("LIKE {} bound to a value starting with a wildcard", &caps[1]),
                );
            }
        }
    }

    fn parameter_starts_with_wildcard(statement: &Statement, name: &str) -> bool {
        statement
            .parameters
            .iter()
            .filter(|p| p.name.eq_ignore_ascii_case(name))
            .filter_map(|p| p.runtime_value.as_deref().or(p.compiled_value.as_deref()))
            .any(|v| {
                let literal = ValueParser::unquote_literal(v);
                literal.starts_with('%') || literal.starts_with('_')
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AccessDescriptor, Parameter};

    fn statement_with(node: OperatorNode, parameters: Vec<Parameter>) -> Statement {
        Statement {
            id: 1,
            text: String::new(),
            subtree_cost: None,
            parameters,
            missing_indexes: vec![],
            root: node,
        }
    }

    fn scan_node(node: OperatorNode, parameters: Vec<Parameter>) -> Vec<SargabilityIssue> {
        let statement = statement_with(node, parameters);
        let doc = PlanDocument {
            statements: vec![statement],
            chosen: 0,
            degree_of_parallelism: None,
            memory_grant: None,
            spill_keyword_hits: vec![],
        };
        SargabilityAnalyzer::analyze(&doc)
    }

    fn node_with_predicate(expr: &str) -> OperatorNode {
        OperatorNode {
            node_id: 3,
            physical_op: "Index Scan".to_string(),
            logical_op: "Index Scan".to_string(),
            parallel: false,
            est_rows: None,
            est_cost: None,
            est_self_cost: None,
            access: AccessDescriptor {
                residual_predicate: Some(expr.to_string()),
                ..Default::default()
            },
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
    fn implicit_conversion_yields_exactly_one_issue() {
        let issues = scan_node(
            node_with_predicate("CONVERT_IMPLICIT(int,[db].[dbo].[T].[Status],0)=(1)"),
            vec![],
        );
        let implicit: Vec<_> = issues
            .iter()
            .filter(|i| i.kind == SargabilityKind::ImplicitConversion)
            .collect();
        assert_eq!(implicit.len(), 1);
    }

    #[test]
    fn explicit_convert_on_column_is_its_own_category() {
        let issues = scan_node(
            node_with_predicate("CONVERT(date,[db].[dbo].[T].[CreatedAt])=@d"),
            vec![],
        );
        assert!(issues.iter().any(|i| i.kind == SargabilityKind::ConvertOnColumn));
        assert!(!issues.iter().any(|i| i.kind == SargabilityKind::ImplicitConversion));
    }

    #[test]
    fn convert_on_literal_is_not_flagged() {
        let issues = scan_node(node_with_predicate("[T].[Id]=CONVERT(int,(42))"), vec![]);
        assert!(issues.iter().all(|i| i.kind != SargabilityKind::ConvertOnColumn));
    }

    #[test]
    fn date_function_on_column_is_flagged() {
        let issues =
            scan_node(node_with_predicate("DATEPART(year,[db].[dbo].[T].[OrderDate])=(2024)"), vec![]);
        assert!(issues.iter().any(|i| i.kind == SargabilityKind::FunctionOnColumn));
    }

    #[test]
    fn literal_leading_wildcard_is_flagged() {
        let issues =
            scan_node(node_with_predicate("[db].[dbo].[T].[Name] like N'%smith'"), vec![]);
        assert!(issues.iter().any(|i| i.kind == SargabilityKind::LeadingWildcard));
    }

    #[test]
    fn parameterized_wildcard_uses_bound_value() {
        let param = Parameter {
            name: "@pattern".to_string(),
            data_type: None,
            compiled_value: Some("N'%smith'".to_string()),
            runtime_value: None,
            sensitivity_ratio: None,
        };
        let issues = scan_node(
            node_with_predicate("[db].[dbo].[T].[Name] like @pattern"),
            vec![param],
        );
        assert!(issues.iter().any(|i| i.kind == SargabilityKind::LeadingWildcard));

        let benign = Parameter {
            name: "@pattern".to_string(),
            data_type: None,
            compiled_value: Some("N'smith%'".to_string()),
            runtime_value: None,
            sensitivity_ratio: None,
        };
        let issues = scan_node(
            node_with_predicate("[db].[dbo].[T].[Name] like @pattern"),
            vec![benign],
        );
        assert!(issues.iter().all(|i| i.kind != SargabilityKind::LeadingWildcard));
    }

    #[test]
    fn duplicate_expressions_are_suppressed() {
        let mut node = node_with_predicate("CONVERT_IMPLICIT(int,[T].[A],0)=(1)");
        node.scalar_exprs.push("CONVERT_IMPLICIT(int,[T].[A],0)=(1)".to_string());
        let issues = scan_node(node, vec![]);
        assert_eq!(
            issues.iter().filter(|i| i.kind == SargabilityKind::ImplicitConversion).count(),
            1
        );
    }
}
