//! Missing-index extraction and ranking.
//!
//! Dedupes the raw candidates by canonical signature, keeps the duplicate
//! count as signal, ranks by impact, and generates the suggested index
//! definition. Generated names are a stable hash of the signature so output
//! is reproducible across runs.

use std::collections::HashMap;

use crate::models::{IndexSuggestion, MissingIndexCandidate, PlanDocument};

/// Missing-index candidate processor.
pub struct MissingIndexAnalyzer;

impl MissingIndexAnalyzer {
    /// Returns the raw candidate list (impact-ranked, duplicates retained)
    /// and the deduplicated, ranked suggestions.
    pub fn analyze(doc: &PlanDocument) -> (Vec<MissingIndexCandidate>, Vec<IndexSuggestion>) {
        let mut raw: Vec<MissingIndexCandidate> = doc
            .statements
            .iter()
            .flat_map(|s| s.missing_indexes.iter().cloned())
            .collect();
        raw.sort_by(|a, b| b.impact.total_cmp(&a.impact));

        let mut order: Vec<String> = Vec::new();
        let mut grouped: HashMap<String, (MissingIndexCandidate, usize, f64)> = HashMap::new();
        for candidate in &raw {
            let signature = candidate.signature();
            match grouped.get_mut(&signature) {
                Some((_, count, max_impact)) => {
                    *count += 1;
                    *max_impact = max_impact.max(candidate.impact);
                },
                None => {
                    order.push(signature.clone());
                    grouped.insert(signature, (candidate.clone(), 1, candidate.impact));
                },
            }
        }

        let mut suggestions: Vec<IndexSuggestion> = order
            .into_iter()
            .filter_map(|sig| grouped.remove(&sig))
            .map(|(candidate, duplicate_count, max_impact)| {
                Self::suggestion(&candidate, duplicate_count, max_impact)
            })
            .collect();
        suggestions.sort_by(|a, b| b.impact.total_cmp(&a.impact));

        (raw, suggestions)
    }

    fn suggestion(
        candidate: &MissingIndexCandidate,
        duplicate_count: usize,
        impact: f64,
    ) -> IndexSuggestion {
        let key_columns = candidate.key_columns();
        let name = Self::index_name(candidate);

        let mut create_statement = format!(
            "CREATE NONCLUSTERED INDEX [{}] ON {} ({})",
            name,
            candidate.table,
            key_columns.join(", ")
        );
        if !candidate.include_columns.is_empty() {
            create_statement.push_str(&format!(
                " INCLUDE ({})",
                candidate.include_columns.join(", ")
            ));
        }
        create_statement.push(';');

        IndexSuggestion {
            table: candidate.table.clone(),
            key_columns,
            include_columns: candidate.include_columns.clone(),
            name,
            create_statement,
            impact,
            duplicate_count,
            covered_by: None,
        }
    }

    /// Deterministic name: table leaf plus the first 8 hex chars of the
    /// signature hash.
    fn index_name(candidate: &MissingIndexCandidate) -> String {
        let table_leaf = candidate
            .table
            .rsplit('.')
            .next()
            .unwrap_or(&candidate.table)
            .trim_matches(|c| c == '[' || c == ']');
        let digest = blake3::hash(candidate.signature().as_bytes());
        let hex = digest.to_hex();
        format!("ix_{}_{}", table_leaf, &hex.as_str()[..8])
    }
}
