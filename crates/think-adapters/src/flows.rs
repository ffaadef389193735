//! Definiciones de flujo incluidas y su catálogo de plantillas.
//!
//! Dos pipelines de referencia:
//! - `deep_thinking`: descomposición -> evidencia por sub-pregunta (for-each)
//!   -> evaluación -> síntesis.
//! - `quick_analysis`: análisis directo -> conclusión.

use serde_json::json;

use think_core::{DefinitionRegistry, FlowDefinition, StepDescriptor};

use crate::templates::CatalogTemplateProvider;

pub const DEEP_THINKING: &str = "deep_thinking";
pub const QUICK_ANALYSIS: &str = "quick_analysis";

/// Registro con las definiciones incluidas.
pub fn builtin_definitions() -> DefinitionRegistry {
    let mut registry = DefinitionRegistry::new();
    registry.register(deep_thinking());
    registry.register(quick_analysis());
    registry
}

fn deep_thinking() -> FlowDefinition {
    FlowDefinition::new(DEEP_THINKING)
        .with_step(StepDescriptor::new("decompose", "Decompose question", "decomposition", "decompose_question"))
        .with_step(StepDescriptor::new("evidence", "Gather evidence", "evidence", "gather_evidence")
            .with_dependencies(vec!["decompose".into()])
            .with_config(json!({ "for_each": "decompose.sub_questions" })))
        .with_step(StepDescriptor::new("evaluate", "Evaluate evidence", "evaluation", "evaluate_evidence")
            .with_dependencies(vec!["evidence".into()]))
        .with_step(StepDescriptor::new("synthesize", "Synthesize answer", "synthesis", "synthesize_answer")
            .with_dependencies(vec!["evaluate".into()])
            .with_config(json!({ "critical": true })))
}

fn quick_analysis() -> FlowDefinition {
    FlowDefinition::new(QUICK_ANALYSIS)
        .with_step(StepDescriptor::new("analyze", "Quick analysis", "analysis", "quick_analyze"))
        .with_step(StepDescriptor::new("conclude", "Draw conclusion", "synthesis", "draw_conclusion")
            .with_dependencies(vec!["analyze".into()]))
}

/// Catálogo de plantillas que acompaña a las definiciones incluidas. Incluye
/// variantes por complejidad donde el paso lo amerita.
pub fn default_templates() -> CatalogTemplateProvider {
    CatalogTemplateProvider::new()
        .with_template("decompose_question",
                       "Break the question \"{question}\" into 2-4 focused sub-questions. \
                        Respond as JSON: {\"sub_questions\": [...]}")
        .with_template("decompose_question_high",
                       "Break the question \"{question}\" into 4-8 focused sub-questions, covering \
                        mechanisms, evidence and counterarguments. \
                        Respond as JSON: {\"sub_questions\": [...]}")
        .with_template("gather_evidence",
                       "Gather concrete evidence for the sub-question: {current_item}. \
                        Cite sources where possible.")
        .with_template("evaluate_evidence",
                       "Evaluate the collected evidence for \"{question}\". \
                        Rate reliability and note contradictions.")
        .with_template("synthesize_answer",
                       "Synthesize a final answer to \"{question}\" from the evaluated evidence.")
        .with_template("quick_analyze", "Analyze \"{question}\" directly and note the key factors.")
        .with_template("draw_conclusion", "State a concise conclusion for \"{question}\".")
}

#[cfg(test)]
mod tests {
    use super::*;
    use think_core::{FlowStatus, TemplateProvider};

    #[test]
    fn builtin_definitions_materialize_cleanly() {
        let registry = builtin_definitions();
        assert_eq!(registry.names(), vec![DEEP_THINKING, QUICK_ANALYSIS]);

        let flow = registry.materialize(DEEP_THINKING, "session-x").unwrap();
        assert_eq!(flow.status, FlowStatus::Initialized);
        assert_eq!(flow.step_order(), vec!["decompose", "evidence", "evaluate", "synthesize"]);
        assert_eq!(flow.steps.get("evidence").unwrap().for_each_ref(), Some("decompose.sub_questions"));
    }

    #[test]
    fn default_catalog_covers_every_builtin_template() {
        let templates = default_templates();
        let registry = builtin_definitions();
        for name in registry.names() {
            let definition = registry.get(name).unwrap();
            for step in &definition.steps {
                assert!(templates.has_template(&step.template_name),
                        "template {} missing for step {}",
                        step.template_name,
                        step.step_id);
            }
        }
        // variante de complejidad disponible para la descomposición
        assert!(templates.has_template("decompose_question_high"));
    }
}
