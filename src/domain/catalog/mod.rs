//! Catalog module - static plan, persona and model tables.
//!
//! # Module Structure
//!
//! - `plan` - Plan tiers, quotas and history windows
//! - `persona` - Personas, task kinds and emotional tones
//! - `model` - Model descriptors mapping models to providers
//! - `tables` - The `Catalog` aggregate with built-in defaults and YAML loading

mod model;
mod persona;
mod plan;
mod tables;

pub use model::ModelDescriptor;
pub use persona::{EmotionalTone, Persona, TaskKind};
pub use plan::{PlanDefinition, PlanTier};
pub use tables::{Catalog, CatalogError, ModelSelection, ModelSource};
