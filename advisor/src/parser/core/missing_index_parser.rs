//! Missing-index group extraction.

use roxmltree::Node;

use super::{is_element, ValueParser};
use crate::models::MissingIndexCandidate;

/// Parser for the plan's `MissingIndexes` block.
pub struct MissingIndexParser;

impl MissingIndexParser {
    /// Read every index-suggestion group under `query_plan`, in document
    /// order. Duplicates are kept; deduplication is the extractor's job.
    pub fn parse(ns: &str, query_plan: Node<'_, '_>, statement_id: i32) -> Vec<MissingIndexCandidate> {
        let Some(block) = query_plan
            .children()
            .find(|c| is_element(*c, ns, "MissingIndexes"))
        else {
            return Vec::new();
        };

        let mut candidates = Vec::new();
        for group in block.children().filter(|c| is_element(*c, ns, "MissingIndexGroup")) {
            let impact = ValueParser::opt_f64(group, "Impact").unwrap_or(0.0);
            for index in group.children().filter(|c| is_element(*c, ns, "MissingIndex")) {
                if let Some(candidate) = Self::parse_index(ns, index, statement_id, impact) {
                    candidates.push(candidate);
                }
            }
        }
        candidates
    }

    fn parse_index(
        ns: &str,
        index: Node<'_, '_>,
        statement_id: i32,
        impact: f64,
    ) -> Option<MissingIndexCandidate> {
        let parts: Vec<&str> = ["Database", "Schema", "Table"]
            .iter()
            .filter_map(|a| index.attribute(*a))
            .collect();
        if parts.is_empty() {
            tracing::warn!(statement_id, "missing-index group without a target table, skipping");
            return None;
        }

        let mut equality_columns = Vec::new();
        let mut inequality_columns = Vec::new();
        let mut include_columns = Vec::new();

        for group in index.children().filter(|c| is_element(*c, ns, "ColumnGroup")) {
            let usage = group.attribute("Usage").unwrap_or_default().to_uppercase();
            let target = match usage.as_str() {
                "EQUALITY" => &mut equality_columns,
                "INEQUALITY" => &mut inequality_columns,
                "INCLUDE" => &mut include_columns,
                other => {
                    tracing::warn!(statement_id, usage = other, "unknown column usage, skipping");
                    continue;
                },
            };
            for column in group.children().filter(|c| is_element(*c, ns, "Column")) {
                if let Some(name) = column.attribute("Name") {
                    target.push(name.to_string());
                }
            }
        }

        Some(MissingIndexCandidate {
            statement_id,
            table: parts.join("."),
            equality_columns,
            inequality_columns,
            include_columns,
            impact,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NS: &str = "http://schemas.microsoft.com/sqlserver/2004/07/showplan";

    #[test]
    fn parses_groups_with_usage_classes() {
        let xml = format!(
            r#"<QueryPlan xmlns="{NS}">
              <MissingIndexes>
                <MissingIndexGroup Impact="92.4">
                  <MissingIndex Database="[db]" Schema="[dbo]" Table="[Orders]">
                    <ColumnGroup Usage="EQUALITY">
                      <Column Name="[CustomerId]" ColumnId="2"/>
                    </ColumnGroup>
                    <ColumnGroup Usage="INEQUALITY">
                      <Column Name="[OrderDate]" ColumnId="3"/>
                    </ColumnGroup>
                    <ColumnGroup Usage="INCLUDE">
                      <Column Name="[Total]" ColumnId="4"/>
                    </ColumnGroup>
                  </MissingIndex>
                </MissingIndexGroup>
              </MissingIndexes>
            </QueryPlan>"#
        );
        let doc = roxmltree::Document::parse(&xml).unwrap();
        let candidates = MissingIndexParser::parse(NS, doc.root_element(), 1);

        assert_eq!(candidates.len(), 1);
        let c = &candidates[0];
        assert_eq!(c.table, "[db].[dbo].[Orders]");
        assert_eq!(c.impact, 92.4);
        assert_eq!(c.equality_columns, vec!["[CustomerId]".to_string()]);
        assert_eq!(c.inequality_columns, vec!["[OrderDate]".to_string()]);
        assert_eq!(c.include_columns, vec!["[Total]".to_string()]);
        assert_eq!(c.key_columns(), vec!["[CustomerId]".to_string(), "[OrderDate]".to_string()]);
    }

    #[test]
    fn absent_block_yields_no_candidates() {
        let xml = format!(r#"<QueryPlan xmlns="{NS}"/>"#);
        let doc = roxmltree::Document::parse(&xml).unwrap();
        assert!(MissingIndexParser::parse(NS, doc.root_element(), 1).is_empty());
    }
}
