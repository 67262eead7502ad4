//! Operator tree construction.
//!
//! Operators may be nested arbitrarily deep inside wrapper elements, so both
//! child discovery and per-operator detail extraction resolve the *nearest
//! operator ancestor*, never the immediate element parent: the walks below
//! descend through wrappers but stop at `RelOp` boundaries.

use roxmltree::Node;

use super::{is_element, RuntimeParser, ValueParser};
use crate::models::{AccessDescriptor, AccessKind, OperatorNode, PlanWarning};

/// Parser for `RelOp` subtrees.
pub struct OperatorParser;

impl OperatorParser {
    /// Build the typed operator tree rooted at `rel_op`.
    pub fn parse_tree(ns: &str, rel_op: Node<'_, '_>) -> OperatorNode {
        let node_id = ValueParser::opt_i32(rel_op, "NodeId").unwrap_or(-1);
        let physical_op =
            ValueParser::attr(rel_op, "PhysicalOp").unwrap_or("Unknown").to_string();
        let logical_op = ValueParser::attr(rel_op, "LogicalOp").unwrap_or_default().to_string();
        let parallel = ValueParser::flag(rel_op, "Parallel");
        let est_rows = ValueParser::opt_f64(rel_op, "EstimateRows");
        let est_cost = ValueParser::opt_f64(rel_op, "EstimatedTotalSubtreeCost");

        let scoped = Self::scoped_elements(ns, rel_op);

        let access = Self::parse_access(ns, &scoped);
        let object_names = Self::parse_objects(&scoped, ns);
        let sort_keys = Self::parse_sort_keys(ns, &scoped);
        let predicate = Self::parse_generic_predicate(ns, rel_op, &scoped);
        let scalar_exprs = Self::parse_scalar_strings(ns, &scoped);
        let warnings = Self::parse_warnings(ns, &scoped);
        let many_to_many = scoped
            .iter()
            .any(|e| is_element(*e, ns, "Merge") && ValueParser::flag(*e, "ManyToMany"));

        let is_gather = physical_op.to_uppercase().contains("PARALLELISM")
            && logical_op.to_uppercase().contains("GATHER STREAMS");
        let runtime = scoped
            .iter()
            .find(|e| is_element(**e, ns, "RunTimeInformation"))
            .and_then(|e| RuntimeParser::parse(ns, *e, parallel, is_gather));

        let is_join_op = physical_op.to_uppercase().contains("JOIN")
            || physical_op.to_uppercase().contains("NESTED LOOPS")
            || logical_op.to_uppercase().contains("JOIN");
        let join_predicate = if is_join_op { predicate.clone() } else { None };

        let children = Self::child_operators(ns, rel_op)
            .into_iter()
            .map(|c| Self::parse_tree(ns, c))
            .collect();

        OperatorNode {
            node_id,
            physical_op,
            logical_op,
            parallel,
            est_rows,
            est_cost,
            est_self_cost: None,
            access,
            object_names,
            sort_keys,
            predicate,
            join_predicate,
            scalar_exprs,
            warnings,
            many_to_many,
            runtime,
            children,
        }
    }

    /// Descendant operator elements whose nearest operator ancestor is `node`.
    pub fn child_operators<'a, 'i>(ns: &str, node: Node<'a, 'i>) -> Vec<Node<'a, 'i>> {
        let mut out = Vec::new();
        Self::collect_child_operators(ns, node, &mut out);
        out
    }

    fn collect_child_operators<'a, 'i>(ns: &str, node: Node<'a, 'i>, out: &mut Vec<Node<'a, 'i>>) {
        for child in node.children().filter(|c| c.is_element()) {
            if is_element(child, ns, "RelOp") {
                out.push(child);
            } else {
                Self::collect_child_operators(ns, child, out);
            }
        }
    }

    /// Every element scoped to this operator: descendants reached without
    /// crossing into a nested `RelOp`.
    fn scoped_elements<'a, 'i>(ns: &str, rel_op: Node<'a, 'i>) -> Vec<Node<'a, 'i>> {
        let mut out = Vec::new();
        Self::collect_scoped(ns, rel_op, &mut out);
        out
    }

    fn collect_scoped<'a, 'i>(ns: &str, node: Node<'a, 'i>, out: &mut Vec<Node<'a, 'i>>) {
        for child in node.children().filter(|c| c.is_element()) {
            if is_element(child, ns, "RelOp") {
                continue;
            }
            out.push(child);
            Self::collect_scoped(ns, child, out);
        }
    }

    fn parse_access(ns: &str, scoped: &[Node<'_, '_>]) -> AccessDescriptor {
        let index_access = scoped.iter().find(|e| is_element(**e, ns, "IndexScan"));
        let table_access = scoped.iter().find(|e| is_element(**e, ns, "TableScan"));

        let Some(access_el) = index_access.or(table_access) else {
            return AccessDescriptor::default();
        };

        let seek_predicate = access_el
            .descendants()
            .find(|d| is_element(*d, ns, "SeekPredicates"))
            .and_then(|sp| Self::first_scalar_string(ns, sp));

        let kind = if table_access.is_some() {
            AccessKind::TableScan
        } else if seek_predicate.is_some() {
            AccessKind::Seek
        } else {
            AccessKind::Scan
        };

        let residual_predicate = access_el
            .children()
            .find(|d| is_element(*d, ns, "Predicate"))
            .and_then(|p| Self::first_scalar_string(ns, p));

        AccessDescriptor {
            kind,
            lookup: ValueParser::flag(*access_el, "Lookup"),
            seek_predicate,
            residual_predicate,
        }
    }

    fn first_scalar_string(ns: &str, under: Node<'_, '_>) -> Option<String> {
        under
            .descendants()
            .filter(|d| is_element(*d, ns, "ScalarOperator"))
            .find_map(|d| d.attribute("ScalarString"))
            .map(str::to_string)
    }

    fn parse_objects(scoped: &[Node<'_, '_>], ns: &str) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for object in scoped.iter().filter(|e| is_element(**e, ns, "Object")) {
            let mut parts: Vec<&str> = Vec::new();
            for attr in ["Database", "Schema", "Table"] {
                if let Some(v) = object.attribute(attr) {
                    parts.push(v);
                }
            }
            if parts.is_empty() {
                continue;
            }
            let mut name = parts.join(".");
            if let Some(index) = object.attribute("Index") {
                name.push_str(&format!(" ({index})"));
            }
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names.truncate(2);
        names
    }

    fn parse_sort_keys(ns: &str, scoped: &[Node<'_, '_>]) -> Vec<String> {
        let mut keys = Vec::new();
        for order_by in scoped.iter().filter(|e| is_element(**e, ns, "OrderByColumn")) {
            let Some(column) = order_by
                .children()
                .find(|c| is_element(*c, ns, "ColumnReference"))
                .and_then(|c| c.attribute("Column"))
            else {
                continue;
            };
            let ascending = order_by.attribute("Ascending").map(str::trim);
            if matches!(ascending, Some("0") | Some("false")) {
                keys.push(format!("{column} DESC"));
            } else {
                keys.push(column.to_string());
            }
        }
        keys
    }

    /// The operator's own predicate: the first `Predicate` element that does
    /// not belong to the access descriptor (whose residual is kept separately).
    fn parse_generic_predicate(
        ns: &str,
        rel_op: Node<'_, '_>,
        scoped: &[Node<'_, '_>],
    ) -> Option<String> {
        scoped
            .iter()
            .filter(|e| is_element(**e, ns, "Predicate"))
            .find(|e| {
                !e.ancestors()
                    .take_while(|a| *a != rel_op)
                    .any(|a| is_element(a, ns, "IndexScan") || is_element(a, ns, "TableScan"))
            })
            .and_then(|p| Self::first_scalar_string(ns, *p))
    }

    fn parse_scalar_strings(ns: &str, scoped: &[Node<'_, '_>]) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        let mut exprs = Vec::new();
        for op in scoped.iter().filter(|e| is_element(**e, ns, "ScalarOperator")) {
            if let Some(s) = op.attribute("ScalarString") {
                if seen.insert(s) {
                    exprs.push(s.to_string());
                }
            }
        }
        exprs
    }

    fn parse_warnings(ns: &str, scoped: &[Node<'_, '_>]) -> Vec<PlanWarning> {
        let mut warnings = Vec::new();
        for warn_el in scoped.iter().filter(|e| is_element(**e, ns, "Warnings")) {
            // Flag-style attributes on the Warnings element itself.
            for attr in warn_el.attributes() {
                let v = attr.value().trim();
                if v == "1" || v.eq_ignore_ascii_case("true") {
                    warnings.push(PlanWarning { kind: attr.name().to_string(), detail: None });
                }
            }
            // Structured warning children, details folded into one string.
            for child in warn_el.children().filter(|c| c.is_element()) {
                let detail: Vec<String> = child
                    .attributes()
                    .map(|a| format!("{}={}", a.name(), a.value()))
                    .collect();
                warnings.push(PlanWarning {
                    kind: child.tag_name().name().to_string(),
                    detail: if detail.is_empty() { None } else { Some(detail.join(", ")) },
                });
            }
        }
        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NS: &str = "http://schemas.microsoft.com/sqlserver/2004/07/showplan";

    fn parse_first(xml: &str) -> OperatorNode {
        let doc = roxmltree::Document::parse(xml).unwrap();
        let rel_op = doc
            .descendants()
            .find(|n| n.is_element() && n.tag_name().name() == "RelOp")
            .unwrap();
        OperatorParser::parse_tree(NS, rel_op)
    }

    #[test]
    fn children_resolve_through_wrapper_elements() {
        let xml = format!(
            r#"<Root xmlns="{NS}">
              <RelOp NodeId="0" PhysicalOp="Nested Loops" LogicalOp="Inner Join"
                     EstimateRows="10" EstimatedTotalSubtreeCost="1.0">
                <NestedLoops Optimized="false">
                  <RelOp NodeId="1" PhysicalOp="Index Seek" LogicalOp="Index Seek"
                         EstimateRows="5" EstimatedTotalSubtreeCost="0.2"/>
                  <Wrapper>
                    <RelOp NodeId="2" PhysicalOp="Index Seek" LogicalOp="Index Seek"
                           EstimateRows="5" EstimatedTotalSubtreeCost="0.3"/>
                  </Wrapper>
                </NestedLoops>
              </RelOp>
            </Root>"#
        );
        let root = parse_first(&xml);
        assert_eq!(root.node_id, 0);
        let ids: Vec<i32> = root.children.iter().map(|c| c.node_id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn nested_operator_details_stay_with_their_operator() {
        // The inner seek's predicate must not leak into the outer join node.
        let xml = format!(
            r#"<Root xmlns="{NS}">
              <RelOp NodeId="0" PhysicalOp="Nested Loops" LogicalOp="Inner Join"
                     EstimateRows="10" EstimatedTotalSubtreeCost="1.0">
                <NestedLoops Optimized="false">
                  <RelOp NodeId="1" PhysicalOp="Index Seek" LogicalOp="Index Seek"
                         EstimateRows="5" EstimatedTotalSubtreeCost="0.2">
                    <IndexScan Ordered="true">
                      <SeekPredicates>
                        <SeekPredicateNew>
                          <ScalarOperator ScalarString="[t].[id]=[u].[id]"/>
                        </SeekPredicateNew>
                      </SeekPredicates>
                    </IndexScan>
                  </RelOp>
                </NestedLoops>
              </RelOp>
            </Root>"#
        );
        let root = parse_first(&xml);
        assert_eq!(root.access.kind, AccessKind::None);
        assert_eq!(root.children[0].access.kind, AccessKind::Seek);
        assert_eq!(
            root.children[0].access.seek_predicate.as_deref(),
            Some("[t].[id]=[u].[id]")
        );
    }

    #[test]
    fn access_kind_and_residual() {
        let xml = format!(
            r#"<Root xmlns="{NS}">
              <RelOp NodeId="3" PhysicalOp="Index Scan" LogicalOp="Index Scan"
                     EstimateRows="100" EstimatedTotalSubtreeCost="0.5">
                <IndexScan Ordered="false">
                  <Object Database="[db]" Schema="[dbo]" Table="[Orders]" Index="[IX_Status]"/>
                  <Predicate>
                    <ScalarOperator ScalarString="CONVERT_IMPLICIT(int,[db].[dbo].[Orders].[Status],0)=(1)"/>
                  </Predicate>
                </IndexScan>
              </RelOp>
            </Root>"#
        );
        let node = parse_first(&xml);
        assert_eq!(node.access.kind, AccessKind::Scan);
        assert!(node.access.residual_predicate.as_deref().unwrap().contains("CONVERT_IMPLICIT"));
        assert_eq!(node.object_names, vec!["[db].[dbo].[Orders] ([IX_Status])".to_string()]);
        // Residual predicates belong to the access path, not the generic slot.
        assert!(node.predicate.is_none());
    }

    #[test]
    fn warnings_collect_flags_and_children() {
        let xml = format!(
            r#"<Root xmlns="{NS}">
              <RelOp NodeId="4" PhysicalOp="Sort" LogicalOp="Sort"
                     EstimateRows="100" EstimatedTotalSubtreeCost="0.5">
                <Warnings NoJoinPredicate="true">
                  <SpillToTempDb SpillLevel="1" SpilledThreadCount="4"/>
                </Warnings>
              </RelOp>
            </Root>"#
        );
        let node = parse_first(&xml);
        assert!(node.has_warning("NoJoinPredicate"));
        assert!(node.has_warning("SpillToTempDb"));
        let spill = node.warnings.iter().find(|w| w.kind == "SpillToTempDb").unwrap();
        assert!(spill.detail.as_deref().unwrap().contains("SpillLevel=1"));
    }

    #[test]
    fn many_to_many_merge_is_flagged() {
        let xml = format!(
            r#"<Root xmlns="{NS}">
              <RelOp NodeId="5" PhysicalOp="Merge Join" LogicalOp="Inner Join"
                     EstimateRows="100" EstimatedTotalSubtreeCost="0.5">
                <Merge ManyToMany="1"/>
              </RelOp>
            </Root>"#
        );
        assert!(parse_first(&xml).many_to_many);
    }
}
