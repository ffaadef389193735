//! think-adapters: catálogo concreto sobre el núcleo de flujos
//!
//! Este crate provee:
//! - `CatalogTemplateProvider`: proveedor de plantillas en memoria con
//!   sustitución de `{placeholder}` por parámetros escalares.
//! - Definiciones de flujo listas para usar (`deep_thinking`,
//!   `quick_analysis`) y el catálogo de plantillas que las acompaña.
//!
//! El núcleo sólo conoce los traits; aquí vive el contenido.

pub mod flows;
pub mod templates;

pub use flows::{builtin_definitions, default_templates};
pub use templates::CatalogTemplateProvider;
