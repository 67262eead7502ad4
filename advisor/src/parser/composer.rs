//! Plan document composer.
//!
//! Orchestrates the core parsers into one immutable [`PlanDocument`]:
//! namespace resolution, statement collection, chosen-statement selection,
//! header values, and the raw-text spill keyword scan. Self costs are derived
//! here as the final construction step, so the tree never changes afterwards.

use crate::analyzer::cost;
use crate::models::{KeywordHit, PlanDocument};
use crate::parser::core::StatementParser;
use crate::parser::error::{ParseError, ParseResult};

const DEFAULT_SPILL_KEYWORDS: &[&str] = &["Spill", "SpillToTempDb", "SpillOccurred"];

/// Builder for [`PlanDocument`].
pub struct PlanComposer {
    spill_keywords: Vec<String>,
}

impl PlanComposer {
    pub fn new() -> Self {
        Self {
            spill_keywords: DEFAULT_SPILL_KEYWORDS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Override the keyword list scanned over the raw document text.
    pub fn with_spill_keywords(mut self, keywords: Vec<String>) -> Self {
        self.spill_keywords = keywords;
        self
    }

    /// Parse a plan document.
    ///
    /// Fails with a schema error when the root element carries no namespace,
    /// and with a malformed-plan error when no statement holds an operator
    /// tree. Individual value failures degrade to absent fields instead.
    pub fn parse(&self, xml: &str) -> ParseResult<PlanDocument> {
        let doc = roxmltree::Document::parse(xml)?;
        let root = doc.root_element();
        let ns = root
            .tag_name()
            .namespace()
            .filter(|ns| !ns.is_empty())
            .ok_or_else(|| {
                ParseError::Schema(format!(
                    "root element <{}> has no namespace",
                    root.tag_name().name()
                ))
            })?
            .to_string();

        let stmt_nodes: Vec<_> = root
            .descendants()
            .filter(|n| {
                let name = n.tag_name().name();
                n.is_element()
                    && n.tag_name().namespace() == Some(ns.as_str())
                    && name.starts_with("Stmt")
                    // The <Statements> wrapper is not a statement node.
                    && name != "Statements"
            })
            .collect();
        if stmt_nodes.is_empty() {
            return Err(ParseError::MalformedPlan("document contains no statement nodes".into()));
        }

        let mut statements = Vec::new();
        let mut headers = Vec::new();
        for (position, stmt_node) in stmt_nodes.iter().enumerate() {
            if let Some(parsed) = StatementParser::parse(&ns, *stmt_node, position as i32 + 1) {
                headers.push((parsed.degree_of_parallelism, parsed.memory_grant));
                statements.push(parsed.statement);
            }
        }
        if statements.is_empty() {
            return Err(ParseError::MalformedPlan(
                "no statement carries a query plan".into(),
            ));
        }

        for statement in &mut statements {
            cost::derive_self_cost(&mut statement.root);
        }

        let chosen = StatementParser::choose(&statements);
        let (degree_of_parallelism, memory_grant) = headers.swap_remove(chosen);

        tracing::debug!(
            statements = statements.len(),
            chosen = statements[chosen].id,
            "plan document loaded"
        );

        Ok(PlanDocument {
            statements,
            chosen,
            degree_of_parallelism,
            memory_grant,
            spill_keyword_hits: self.scan_keywords(xml),
        })
    }

    fn scan_keywords(&self, xml: &str) -> Vec<KeywordHit> {
        let haystack = xml.to_lowercase();
        self.spill_keywords
            .iter()
            .map(|keyword| KeywordHit {
                keyword: keyword.clone(),
                count: haystack.matches(&keyword.to_lowercase()).count(),
            })
            .filter(|hit| hit.count > 0)
            .collect()
    }
}

impl Default for PlanComposer {
    fn default() -> Self {
        Self::new()
    }
}
