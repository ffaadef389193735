//! Proveedor de plantillas en memoria.
//!
//! El renderizado es sustitución literal: cada `{clave}` presente en el
//! cuerpo se reemplaza por el parámetro escalar homónimo (strings sin
//! comillas, el resto con su forma JSON). Los placeholders sin parámetro se
//! conservan tal cual; el caller externo decide qué hacer con ellos.

use indexmap::IndexMap;
use serde_json::{Map, Value};

use think_core::{FlowCoreError, TemplateProvider};

#[derive(Debug, Clone, Default)]
pub struct CatalogTemplateProvider {
    templates: IndexMap<String, String>,
}

impl CatalogTemplateProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, body: impl Into<String>) {
        self.templates.insert(name.into(), body.into());
    }

    pub fn with_template(mut self, name: impl Into<String>, body: impl Into<String>) -> Self {
        self.register(name, body);
        self
    }

    pub fn names(&self) -> Vec<&str> {
        self.templates.keys().map(|k| k.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    fn render(body: &str, params: &Map<String, Value>) -> String {
        let mut out = body.to_string();
        for (key, value) in params {
            let placeholder = format!("{{{key}}}");
            if !out.contains(&placeholder) {
                continue;
            }
            let rendered = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            out = out.replace(&placeholder, &rendered);
        }
        out
    }
}

impl TemplateProvider for CatalogTemplateProvider {
    fn get_template(&self, name: &str, params: &Map<String, Value>) -> Result<String, FlowCoreError> {
        let body = self.templates
                       .get(name)
                       .ok_or_else(|| FlowCoreError::TemplateMissing { template_name: name.to_string() })?;
        Ok(Self::render(body, params))
    }

    fn has_template(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn renders_scalars_and_keeps_unknown_placeholders() {
        let catalog = CatalogTemplateProvider::new().with_template("greet", "Analyze {question} at depth {depth} {missing}");
        let body = catalog.get_template("greet", &params(&[("question", json!("why?")), ("depth", json!(3))]))
                          .unwrap();
        assert_eq!(body, "Analyze why? at depth 3 {missing}");
    }

    #[test]
    fn missing_template_is_an_error() {
        let catalog = CatalogTemplateProvider::new();
        let err = catalog.get_template("nope", &Map::new()).unwrap_err();
        assert!(matches!(err, FlowCoreError::TemplateMissing { .. }));
        assert!(!catalog.has_template("nope"));
    }
}
