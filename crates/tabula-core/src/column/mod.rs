//! Column model and the build-time column registry.

mod definition;
mod kind;
mod registry;

pub use definition::ColumnDefinition;
pub use kind::{ColumnKind, CORE_OPTIONS};
pub use registry::ColumnRegistry;
