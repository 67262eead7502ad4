//! Parameter sensitivity analysis.
//!
//! A cached plan compiled for one parameter value and reused for a very
//! different one is the classic sniffing hazard; the entries here surface
//! every parameter that carries a runtime value, ranked by how far it drifted
//! from the compiled value.

use crate::models::{ParameterSensitivity, PlanDocument};

pub struct ParameterAnalyzer;

impl ParameterAnalyzer {
    pub fn analyze(doc: &PlanDocument) -> Vec<ParameterSensitivity> {
        let mut entries: Vec<ParameterSensitivity> = doc
            .statements
            .iter()
            .flat_map(|statement| {
                statement
                    .parameters
                    .iter()
                    .filter(|p| p.runtime_value.is_some())
                    .map(move |p| ParameterSensitivity {
                        statement_id: statement.id,
                        name: p.name.clone(),
                        compiled_value: p.compiled_value.clone(),
                        runtime_value: p.runtime_value.clone(),
                        ratio: p.sensitivity_ratio,
                        changed: p.is_changed(),
                    })
            })
            .collect();

        // Changed parameters first, widest numeric drift on top.
        entries.sort_by(|a, b| {
            b.changed
                .cmp(&a.changed)
                .then_with(|| b.ratio.unwrap_or(1.0).total_cmp(&a.ratio.unwrap_or(1.0)))
        });
        entries
    }
}
